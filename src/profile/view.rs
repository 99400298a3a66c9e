//! Read-side façade over the canonical schema: cheap typed views backed by
//! the protobuf message, no copies.
//!
//! Views index straight into the backing tables and panic on dangling ids;
//! run the profile through [`crate::validate::validate_profile`] first when
//! the bytes come from outside.

use crate::schema::{
    label, InlineChain, Profile, Sample, SampleKey, SourceLine, Stack, StackKind, Thread,
};
use std::convert::TryFrom;

#[derive(Clone, Copy)]
pub struct ProfileView<'a> {
    profile: &'a Profile,
}

impl<'a> ProfileView<'a> {
    pub fn new(profile: &'a Profile) -> Self {
        Self { profile }
    }

    pub fn string(&self, sid: u32) -> &'a str {
        &self.profile.string_table[sid as usize]
    }

    pub fn value_types(&self) -> impl Iterator<Item = ValueTypeView<'a>> + '_ {
        let view = *self;
        self.profile
            .value_types
            .iter()
            .map(move |vt| ValueTypeView { view, r#type: vt.r#type, unit: vt.unit })
    }

    pub fn samples(&self) -> impl Iterator<Item = SampleView<'a>> + '_ {
        let view = *self;
        self.profile
            .samples
            .iter()
            .map(move |sample| SampleView { view, sample })
    }

    pub fn stack(&self, id: u32) -> StackView<'a> {
        StackView {
            view: *self,
            stack: &self.profile.stacks[id as usize],
        }
    }

    pub fn thread(&self, id: u32) -> ThreadView<'a> {
        ThreadView {
            view: *self,
            thread: &self.profile.threads[id as usize],
        }
    }

    fn sample_key(&self, id: u32) -> &'a SampleKey {
        &self.profile.sample_keys[id as usize]
    }
}

#[derive(Clone, Copy)]
pub struct ValueTypeView<'a> {
    view: ProfileView<'a>,
    r#type: u32,
    unit: u32,
}

impl<'a> ValueTypeView<'a> {
    pub fn r#type(&self) -> &'a str {
        self.view.string(self.r#type)
    }

    pub fn unit(&self) -> &'a str {
        self.view.string(self.unit)
    }
}

#[derive(Clone, Copy)]
pub struct SampleView<'a> {
    view: ProfileView<'a>,
    sample: &'a Sample,
}

impl<'a> SampleView<'a> {
    pub fn values(&self) -> &'a [u64] {
        &self.sample.values
    }

    pub fn key(&self) -> SampleKeyView<'a> {
        SampleKeyView {
            view: self.view,
            key: self.view.sample_key(self.sample.key_id),
        }
    }

    pub fn value_types(&self) -> impl Iterator<Item = ValueTypeView<'a>> + '_ {
        self.view.value_types()
    }
}

#[derive(Clone, Copy)]
pub struct SampleKeyView<'a> {
    view: ProfileView<'a>,
    key: &'a SampleKey,
}

impl<'a> SampleKeyView<'a> {
    /// Nanoseconds past the epoch; 0 means the sample carries no timestamp.
    pub fn timestamp_ns(&self) -> i64 {
        self.key.timestamp_ns
    }

    pub fn thread(&self) -> ThreadView<'a> {
        self.view.thread(self.key.thread_id)
    }

    pub fn stacks(&self) -> impl Iterator<Item = StackView<'a>> + '_ {
        let view = self.view;
        self.key.stack_ids.iter().map(move |&id| view.stack(id))
    }

    pub fn labels(&self) -> impl Iterator<Item = LabelView<'a>> + '_ {
        let view = self.view;
        self.key.label_ids.iter().map(move |&id| LabelView {
            view,
            label: &view.profile.labels[id as usize],
        })
    }
}

#[derive(Clone, Copy)]
pub struct LabelView<'a> {
    view: ProfileView<'a>,
    label: &'a crate::schema::Label,
}

impl<'a> LabelView<'a> {
    pub fn key(&self) -> &'a str {
        self.view.string(self.label.key)
    }

    pub fn value(&self) -> Option<LabelValueView<'a>> {
        Some(match self.label.value.as_ref()? {
            label::Value::Str(sid) => LabelValueView::Str(self.view.string(*sid)),
            label::Value::Num(num) => LabelValueView::Num(*num),
            label::Value::Real(real) => LabelValueView::Real(*real),
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum LabelValueView<'a> {
    Str(&'a str),
    Num(i64),
    Real(f64),
}

#[derive(Clone, Copy)]
pub struct ThreadView<'a> {
    view: ProfileView<'a>,
    thread: &'a Thread,
}

impl<'a> ThreadView<'a> {
    pub fn thread_id(&self) -> u64 {
        self.thread.thread_id
    }

    pub fn process_id(&self) -> u64 {
        self.thread.process_id
    }

    pub fn thread_name(&self) -> &'a str {
        self.view.string(self.thread.thread_name)
    }

    pub fn process_name(&self) -> &'a str {
        self.view.string(self.thread.process_name)
    }

    pub fn containers(&self) -> impl Iterator<Item = &'a str> + '_ {
        let view = self.view;
        self.thread.containers.iter().map(move |&sid| view.string(sid))
    }
}

#[derive(Clone, Copy)]
pub struct StackView<'a> {
    view: ProfileView<'a>,
    stack: &'a Stack,
}

impl<'a> StackView<'a> {
    pub fn kind(&self) -> StackKind {
        StackKind::try_from(self.stack.kind).unwrap_or(StackKind::Other)
    }

    pub fn runtime_name(&self) -> &'a str {
        self.view.string(self.stack.runtime_name)
    }

    /// Frames innermost first: the terminal frames, then each segment.
    pub fn frames(&self) -> impl Iterator<Item = FrameView<'a>> + '_ {
        let view = self.view;
        let segment_frames = self
            .stack
            .segment_ids
            .iter()
            .flat_map(move |&id| view.profile.stack_segments[id as usize].frame_ids.iter());
        self.stack
            .frame_ids
            .iter()
            .chain(segment_frames)
            .map(move |&id| FrameView {
                view,
                frame: &view.profile.frames[id as usize],
            })
    }

    pub fn frame_count(&self) -> usize {
        self.stack.frame_ids.len()
            + self
                .stack
                .segment_ids
                .iter()
                .map(|&id| self.view.profile.stack_segments[id as usize].frame_ids.len())
                .sum::<usize>()
    }
}

#[derive(Clone, Copy)]
pub struct FrameView<'a> {
    view: ProfileView<'a>,
    frame: &'a crate::schema::StackFrame,
}

impl<'a> FrameView<'a> {
    pub fn binary(&self) -> BinaryView<'a> {
        BinaryView {
            view: self.view,
            binary: &self.view.profile.binaries[self.frame.binary_id as usize],
        }
    }

    pub fn binary_offset(&self) -> i64 {
        self.frame.binary_offset
    }

    pub fn inline_chain(&self) -> InlineChainView<'a> {
        InlineChainView {
            view: self.view,
            chain: &self.view.profile.inline_chains[self.frame.inline_chain_id as usize],
        }
    }
}

#[derive(Clone, Copy)]
pub struct BinaryView<'a> {
    view: ProfileView<'a>,
    binary: &'a crate::schema::Binary,
}

impl<'a> BinaryView<'a> {
    pub fn path(&self) -> &'a str {
        self.view.string(self.binary.path)
    }

    pub fn build_id(&self) -> &'a str {
        self.view.string(self.binary.build_id)
    }
}

#[derive(Clone, Copy)]
pub struct InlineChainView<'a> {
    view: ProfileView<'a>,
    chain: &'a InlineChain,
}

impl<'a> InlineChainView<'a> {
    pub fn line_count(&self) -> usize {
        self.chain.lines.len()
    }

    /// Source lines innermost first.
    pub fn lines(&self) -> impl Iterator<Item = LineView<'a>> + '_ {
        let view = self.view;
        self.chain.lines.iter().map(move |line| LineView { view, line })
    }
}

#[derive(Clone, Copy)]
pub struct LineView<'a> {
    view: ProfileView<'a>,
    line: &'a SourceLine,
}

impl<'a> LineView<'a> {
    pub fn line(&self) -> u32 {
        self.line.line
    }

    pub fn column(&self) -> u32 {
        self.line.column
    }

    pub fn function(&self) -> FunctionView<'a> {
        FunctionView {
            view: self.view,
            function: &self.view.profile.functions[self.line.function_id as usize],
        }
    }
}

#[derive(Clone, Copy)]
pub struct FunctionView<'a> {
    view: ProfileView<'a>,
    function: &'a crate::schema::Function,
}

impl<'a> FunctionView<'a> {
    pub fn name(&self) -> &'a str {
        self.view.string(self.function.name)
    }

    pub fn system_name(&self) -> &'a str {
        self.view.string(self.function.system_name)
    }

    pub fn file_name(&self) -> &'a str {
        self.view.string(self.function.file_name)
    }

    pub fn start_line(&self) -> u32 {
        self.function.start_line
    }
}
