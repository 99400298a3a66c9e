//! Write-side façade over the canonical schema: one interner per table,
//! sample accumulation, and materialization of the final protobuf message.

use crate::compact_map::CompactIntegerSet;
use crate::profile::interner::Interner;
use crate::schema::{
    label, Binary, Function, InlineChain, Label, Profile, Sample, SampleKey, SourceLine, Stack,
    StackFrame, StackKind, StackSegment, Thread, ValueType,
};
use rustc_hash::FxHashMap;

/// Stacks are re-segmented into chunks of this many frames, aligned from
/// the outermost end so shared suffixes intern to shared segments.
const STACK_SEGMENT_LEN: usize = 16;

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
struct BinaryKey {
    path: u32,
    build_id: u32,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
struct FunctionKey {
    name: u32,
    system_name: u32,
    file_name: u32,
    start_line: u32,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
struct LineKey {
    function_id: u32,
    line: u32,
    column: u32,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
struct FrameKey {
    binary_id: u32,
    binary_offset: i64,
    inline_chain_id: u32,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
struct StackKey {
    kind: i32,
    runtime_name: u32,
    /// The full flattened frame sequence, innermost first. Identity of a
    /// stack does not depend on how it was segmented.
    frames: Vec<u32>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
struct ThreadKey {
    thread_id: u64,
    thread_name: u32,
    process_id: u64,
    process_name: u32,
    /// Sorted ascending, deduplicated: container identity is a set.
    containers: Vec<u32>,
}

/// Label payload with a hashable stand-in for `f64` values.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LabelValue {
    Str(u32),
    Num(i64),
    /// Bit pattern of the f64; identity of a real-valued label is its bits.
    Real(u64),
}

impl LabelValue {
    pub(crate) fn from_proto(value: &label::Value) -> Self {
        match *value {
            label::Value::Str(sid) => LabelValue::Str(sid),
            label::Value::Num(num) => LabelValue::Num(num),
            label::Value::Real(real) => LabelValue::Real(real.to_bits()),
        }
    }

    fn to_proto(self) -> label::Value {
        match self {
            LabelValue::Str(sid) => label::Value::Str(sid),
            LabelValue::Num(num) => label::Value::Num(num),
            LabelValue::Real(bits) => label::Value::Real(f64::from_bits(bits)),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
struct LabelKey {
    key: u32,
    value: Option<LabelValue>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
struct SampleKeyKey {
    stack_ids: Vec<u32>,
    thread_id: u32,
    timestamp_ns: i64,
    label_ids: Vec<u32>,
}

/// Builds one canonical profile. Every table is append-only and fronted by
/// an interner seeded with the sentinel record at id 0; ids handed out are
/// permanent for the lifetime of the builder.
#[derive(Clone, Debug)]
pub struct ProfileBuilder {
    strings: Interner<String>,
    binaries: Interner<BinaryKey>,
    functions: Interner<FunctionKey>,
    inline_chains: Interner<Vec<LineKey>>,
    frames: Interner<FrameKey>,
    segments: Interner<Vec<u32>>,
    stacks: Interner<StackKey>,
    /// Segmented form of each interned stack, parallel to `stacks`.
    stack_records: Vec<Stack>,
    threads: Interner<ThreadKey>,
    labels: Interner<LabelKey>,
    sample_keys: Interner<SampleKeyKey>,
    value_types: Vec<ValueType>,
    value_type_index: FxHashMap<(u32, u32), u32>,
    samples: Vec<Sample>,
    sample_index: FxHashMap<u32, usize>,
    comments: Vec<u32>,
    seen_comments: CompactIntegerSet<u32>,
    default_value_type_index: u32,
    period_value_type_index: u32,
    period: u64,
}

impl Default for ProfileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ProfileBuilder {
    pub fn new() -> Self {
        Self {
            strings: Interner::with_sentinel(String::new()),
            binaries: Interner::with_sentinel(BinaryKey::default()),
            functions: Interner::with_sentinel(FunctionKey::default()),
            inline_chains: Interner::with_sentinel(Vec::new()),
            frames: Interner::with_sentinel(FrameKey::default()),
            segments: Interner::with_sentinel(Vec::new()),
            stacks: Interner::with_sentinel(StackKey::default()),
            stack_records: vec![Stack::default()],
            threads: Interner::with_sentinel(ThreadKey::default()),
            labels: Interner::with_sentinel(LabelKey::default()),
            sample_keys: Interner::with_sentinel(SampleKeyKey::default()),
            value_types: Vec::new(),
            value_type_index: FxHashMap::default(),
            samples: Vec::new(),
            sample_index: FxHashMap::default(),
            comments: Vec::new(),
            seen_comments: CompactIntegerSet::with_little_size(1024),
            default_value_type_index: 0,
            period_value_type_index: 0,
            period: 0,
        }
    }

    pub fn intern_string(&mut self, s: &str) -> u32 {
        if s.is_empty() {
            return 0;
        }
        self.strings.intern(s.to_owned())
    }

    pub fn intern_binary(&mut self, path: u32, build_id: u32) -> u32 {
        self.binaries.intern(BinaryKey { path, build_id })
    }

    pub fn intern_function(
        &mut self,
        name: u32,
        system_name: u32,
        file_name: u32,
        start_line: u32,
    ) -> u32 {
        self.functions.intern(FunctionKey {
            name,
            system_name,
            file_name,
            start_line,
        })
    }

    /// Interns an inline chain given its source lines, innermost first.
    pub fn intern_inline_chain(&mut self, lines: &[SourceLine]) -> u32 {
        if lines.is_empty() {
            return 0;
        }
        let key = lines
            .iter()
            .map(|line| LineKey {
                function_id: line.function_id,
                line: line.line,
                column: line.column,
            })
            .collect();
        self.inline_chains.intern(key)
    }

    pub fn intern_frame(&mut self, binary_id: u32, binary_offset: i64, inline_chain_id: u32) -> u32 {
        self.frames.intern(FrameKey {
            binary_id,
            binary_offset,
            inline_chain_id,
        })
    }

    /// Interns a stack given its full flattened frame sequence, innermost
    /// first. The stored record is re-segmented so that equal suffixes of
    /// distinct stacks share segments.
    pub fn intern_stack(&mut self, kind: StackKind, runtime_name: u32, frames: Vec<u32>) -> u32 {
        let key = StackKey {
            kind: kind as i32,
            runtime_name,
            frames,
        };
        if let Some(id) = self.stacks.lookup(&key) {
            return id;
        }

        let terminal_len = key.frames.len() % STACK_SEGMENT_LEN;
        let (terminal, rest) = key.frames.split_at(terminal_len);
        let segment_ids = rest
            .chunks(STACK_SEGMENT_LEN)
            .map(|chunk| self.segments.intern(chunk.to_vec()))
            .collect();
        let record = Stack {
            kind: key.kind,
            runtime_name: key.runtime_name,
            frame_ids: terminal.to_vec(),
            segment_ids,
        };

        let id = self.stacks.intern(key);
        debug_assert_eq!(id as usize, self.stack_records.len());
        self.stack_records.push(record);
        id
    }

    pub fn intern_thread(
        &mut self,
        thread_id: u64,
        thread_name: u32,
        process_id: u64,
        process_name: u32,
        mut containers: Vec<u32>,
    ) -> u32 {
        containers.sort_unstable();
        containers.dedup();
        self.threads.intern(ThreadKey {
            thread_id,
            thread_name,
            process_id,
            process_name,
            containers,
        })
    }

    pub fn intern_label(&mut self, key: u32, value: LabelValue) -> u32 {
        self.labels.intern(LabelKey {
            key,
            value: Some(value),
        })
    }

    /// String id of an interned label's key.
    pub fn label_key(&self, label_id: u32) -> u32 {
        self.labels.get(label_id).map(|label| label.key).unwrap_or(0)
    }

    /// Interns a sample key. Labels are canonicalized: sorted by key string
    /// id (then label id) with exact duplicates collapsed.
    pub fn intern_sample_key(
        &mut self,
        stack_ids: Vec<u32>,
        thread_id: u32,
        timestamp_ns: i64,
        mut label_ids: Vec<u32>,
    ) -> u32 {
        label_ids.sort_unstable_by_key(|&id| (self.label_key(id), id));
        label_ids.dedup();
        self.sample_keys.intern(SampleKeyKey {
            stack_ids,
            thread_id,
            timestamp_ns,
            label_ids,
        })
    }

    /// Index of the value type, appending it when unseen.
    pub fn ensure_value_type(&mut self, r#type: u32, unit: u32) -> u32 {
        if let Some(&index) = self.value_type_index.get(&(r#type, unit)) {
            return index;
        }
        let index = self.value_types.len() as u32;
        self.value_types.push(ValueType { r#type, unit });
        self.value_type_index.insert((r#type, unit), index);
        index
    }

    pub fn value_type_index_of(&self, r#type: u32, unit: u32) -> Option<u32> {
        self.value_type_index.get(&(r#type, unit)).copied()
    }

    pub fn value_type_count(&self) -> usize {
        self.value_types.len()
    }

    pub fn value_types(&self) -> &[ValueType] {
        &self.value_types
    }

    /// Folds values into the sample with the given key, creating it on
    /// first sight. `values` must already be ordered like the builder's
    /// value-type list. Sums saturate at `u64::MAX`.
    pub fn accumulate_sample(&mut self, key_id: u32, values: &[u64]) {
        debug_assert_eq!(values.len(), self.value_types.len());
        match self.sample_index.get(&key_id) {
            Some(&index) => {
                let sample = &mut self.samples[index];
                for (slot, &value) in sample.values.iter_mut().zip(values) {
                    *slot = slot.saturating_add(value);
                }
            }
            None => {
                self.sample_index.insert(key_id, self.samples.len());
                self.samples.push(Sample {
                    key_id,
                    values: values.to_vec(),
                });
            }
        }
    }

    pub fn add_comment(&mut self, sid: u32) {
        if self.seen_comments.contains(sid) {
            return;
        }
        self.seen_comments.insert(sid);
        self.comments.push(sid);
    }

    pub fn has_value_types(&self) -> bool {
        !self.value_types.is_empty()
    }

    pub fn set_metadata(&mut self, default_index: u32, period_index: u32, period: u64) {
        self.default_value_type_index = default_index;
        self.period_value_type_index = period_index;
        self.period = period;
    }

    /// Materializes the canonical protobuf message. The builder is spent.
    pub fn finish(self) -> Profile {
        let inline_chains = self
            .inline_chains
            .iter()
            .map(|lines| InlineChain {
                lines: lines
                    .iter()
                    .map(|line| SourceLine {
                        function_id: line.function_id,
                        line: line.line,
                        column: line.column,
                    })
                    .collect(),
            })
            .collect();

        Profile {
            string_table: self.strings.iter().cloned().collect(),
            binaries: self
                .binaries
                .iter()
                .map(|binary| Binary {
                    path: binary.path,
                    build_id: binary.build_id,
                })
                .collect(),
            functions: self
                .functions
                .iter()
                .map(|function| Function {
                    name: function.name,
                    system_name: function.system_name,
                    file_name: function.file_name,
                    start_line: function.start_line,
                })
                .collect(),
            inline_chains,
            frames: self
                .frames
                .iter()
                .map(|frame| StackFrame {
                    binary_id: frame.binary_id,
                    binary_offset: frame.binary_offset,
                    inline_chain_id: frame.inline_chain_id,
                })
                .collect(),
            stack_segments: self
                .segments
                .iter()
                .map(|frame_ids| StackSegment {
                    frame_ids: frame_ids.clone(),
                })
                .collect(),
            stacks: self.stack_records,
            threads: self
                .threads
                .iter()
                .map(|thread| Thread {
                    thread_id: thread.thread_id,
                    thread_name: thread.thread_name,
                    process_id: thread.process_id,
                    process_name: thread.process_name,
                    containers: thread.containers.clone(),
                })
                .collect(),
            labels: self
                .labels
                .iter()
                .map(|label| Label {
                    key: label.key,
                    value: label.value.map(LabelValue::to_proto),
                })
                .collect(),
            sample_keys: self
                .sample_keys
                .iter()
                .map(|key| SampleKey {
                    stack_ids: key.stack_ids.clone(),
                    thread_id: key.thread_id,
                    timestamp_ns: key.timestamp_ns,
                    label_ids: key.label_ids.clone(),
                })
                .collect(),
            value_types: self.value_types,
            samples: self.samples,
            comments: self.comments,
            default_value_type_index: self.default_value_type_index,
            period_value_type_index: self.period_value_type_index,
            period: self.period,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_builder_finishes_into_sentinel_only_profile() {
        let profile = ProfileBuilder::new().finish();
        assert_eq!(profile.string_table, vec![String::new()]);
        assert_eq!(profile.binaries.len(), 1);
        assert_eq!(profile.functions.len(), 1);
        assert_eq!(profile.inline_chains.len(), 1);
        assert_eq!(profile.frames.len(), 1);
        assert_eq!(profile.stack_segments.len(), 1);
        assert_eq!(profile.stacks.len(), 1);
        assert_eq!(profile.threads.len(), 1);
        assert_eq!(profile.labels.len(), 1);
        assert_eq!(profile.sample_keys.len(), 1);
        assert!(profile.value_types.is_empty());
        assert!(profile.samples.is_empty());
    }

    #[test]
    fn stacks_share_suffix_segments() {
        let mut builder = ProfileBuilder::new();
        let binary = builder.intern_binary(1, 2);
        let frames: Vec<u32> = (0..40)
            .map(|i| builder.intern_frame(binary, i, 0))
            .collect();

        // Same 32-frame tail, different innermost remainders.
        let long = builder.intern_stack(StackKind::Native, 0, frames.clone());
        let short = builder.intern_stack(StackKind::Native, 0, frames[8..].to_vec());
        assert_ne!(long, short);

        let profile = builder.finish();
        let long = &profile.stacks[long as usize];
        let short = &profile.stacks[short as usize];
        assert_eq!(long.frame_ids.len(), 8);
        assert!(short.frame_ids.is_empty());
        assert_eq!(long.segment_ids, short.segment_ids);
    }

    #[test]
    fn sample_key_labels_are_sorted_and_unique() {
        let mut builder = ProfileBuilder::new();
        let zebra = builder.intern_string("zebra");
        let alpha = builder.intern_string("alpha");
        let l1 = builder.intern_label(zebra, LabelValue::Num(1));
        let l2 = builder.intern_label(alpha, LabelValue::Num(2));
        let key = builder.intern_sample_key(vec![], 0, 0, vec![l1, l2, l1]);

        let profile = builder.finish();
        assert_eq!(profile.sample_keys[key as usize].label_ids, vec![l2, l1]);
    }

    #[test]
    fn accumulated_values_saturate() {
        let mut builder = ProfileBuilder::new();
        builder.ensure_value_type(1, 2);
        builder.accumulate_sample(1, &[u64::MAX - 1]);
        builder.accumulate_sample(1, &[5]);
        let profile = builder.finish();
        assert_eq!(profile.samples.len(), 1);
        assert_eq!(profile.samples[0].values, vec![u64::MAX]);
    }
}
