//! Incremental merging of canonical profiles.
//!
//! A [`ProfileMerger`] folds an arbitrary sequence of input profiles into
//! one canonicalized union profile. It is single-threaded and not thread
//! safe; the parallel pipeline in [`parallel`] runs several of them over
//! disjoint input shards and tree-reduces the partial outputs.

pub mod manager;
pub mod parallel;

use crate::compact_map::CompactIntegerMap;
use crate::error::{ProfileError, Result};
use crate::profile::{LabelValue, ProfileBuilder};
use crate::schema::{MergeOptions, Profile, SourceLine, StackKind};
use rustc_hash::FxHashSet;
use std::convert::TryFrom;
use tracing::debug;

/// Merges profiles one `add` at a time; `finish` consumes the merger and
/// yields the output profile.
///
/// The first error other than `Misuse` poisons the merger: later `add`s
/// report [`ProfileError::Misuse`] and `finish` returns the original error.
pub struct ProfileMerger {
    builder: ProfileBuilder,
    filter: CompiledLabelFilter,
    options: MergeOptions,
    poisoned: Option<ProfileError>,
    inputs: usize,
}

impl ProfileMerger {
    pub fn new(options: MergeOptions) -> Self {
        Self {
            builder: ProfileBuilder::new(),
            filter: CompiledLabelFilter::new(&options),
            options,
            poisoned: None,
            inputs: 0,
        }
    }

    /// Merges one profile into the output.
    pub fn add(&mut self, profile: &Profile) -> Result<()> {
        if self.poisoned.is_some() {
            return Err(ProfileError::Misuse);
        }
        match self.add_inner(profile) {
            Ok(()) => Ok(()),
            Err(err) => {
                self.poisoned = Some(err.clone());
                Err(err)
            }
        }
    }

    /// Finalizes the merge and returns the output profile. The merger is
    /// spent.
    pub fn finish(self) -> Result<Profile> {
        if let Some(err) = self.poisoned {
            return Err(err);
        }
        debug!("Finished merging {} profiles", self.inputs);
        Ok(self.builder.finish())
    }

    pub(crate) fn poison(&mut self, err: ProfileError) {
        if self.poisoned.is_none() {
            self.poisoned = Some(err);
        }
    }

    fn add_inner(&mut self, profile: &Profile) -> Result<()> {
        let mut translation =
            Translation::new(profile, &mut self.builder, &self.options, &self.filter);

        // The first input that declares value types fixes the output list;
        // inputs without any (e.g. drained-empty intermediate profiles from
        // the parallel pipeline) leave it open.
        let first = !translation.out.has_value_types();
        let value_type_map = translation.map_value_types(first)?;

        for (index, sample) in profile.samples.iter().enumerate() {
            if sample.values.len() != profile.value_types.len() {
                return Err(ProfileError::Invariant(format!(
                    "sample {}: {} values, expected {}",
                    index,
                    sample.values.len(),
                    profile.value_types.len()
                )));
            }
            let key_id = translation.translate_sample_key(sample.key_id)?;

            let mut values = vec![0u64; translation.out.value_type_count()];
            for (input_index, &value) in sample.values.iter().enumerate() {
                if let Some(output_index) = value_type_map[input_index] {
                    let slot = &mut values[output_index as usize];
                    *slot = slot.saturating_add(value);
                }
            }
            translation.out.accumulate_sample(key_id, &values);
        }

        for &comment in &profile.comments {
            let sid = translation.translate_string(comment)?;
            translation.out.add_comment(sid);
        }

        if first {
            let default_index = value_type_map
                .get(profile.default_value_type_index as usize)
                .copied()
                .flatten()
                .unwrap_or(0);
            let period_index = value_type_map
                .get(profile.period_value_type_index as usize)
                .copied()
                .flatten()
                .unwrap_or(0);
            self.builder
                .set_metadata(default_index, period_index, profile.period);
        }

        self.inputs += 1;
        Ok(())
    }
}

/// Convenience wrapper for a small number of profiles. Prefer driving a
/// [`ProfileMerger`] directly to avoid keeping every input in memory.
pub fn merge_profiles(profiles: &[Profile], options: &MergeOptions) -> Result<Profile> {
    let mut merger = ProfileMerger::new(options.clone());
    for profile in profiles {
        merger.add(profile)?;
    }
    merger.finish()
}

struct CompiledLabelFilter {
    skipped_prefixes: Vec<String>,
    allowed_keys: FxHashSet<String>,
}

impl CompiledLabelFilter {
    fn new(options: &MergeOptions) -> Self {
        let filter = options.label_filter.clone().unwrap_or_default();
        Self {
            skipped_prefixes: filter.skipped_key_prefixes,
            allowed_keys: filter.allowed_keys.into_iter().collect(),
        }
    }

    fn keeps(&self, key: &str) -> bool {
        if self
            .skipped_prefixes
            .iter()
            .any(|prefix| key.starts_with(prefix.as_str()))
        {
            return false;
        }
        self.allowed_keys.is_empty() || self.allowed_keys.contains(key)
    }
}

/// Strips a trailing `-?\d+` suffix from a thread name, collapsing names
/// like "worker-7" and "worker-12".
fn cleanup_thread_name(name: &str) -> &str {
    let stripped = name.trim_end_matches(|c: char| c.is_ascii_digit());
    if stripped.len() == name.len() {
        return name;
    }
    stripped.strip_suffix('-').unwrap_or(stripped)
}

/// Per-`add` translation state: one input-id to output-id table per
/// canonical table, filled lazily on first reference.
struct Translation<'a> {
    input: &'a Profile,
    out: &'a mut ProfileBuilder,
    options: &'a MergeOptions,
    filter: &'a CompiledLabelFilter,
    strings: CompactIntegerMap<u32, u32>,
    binaries: CompactIntegerMap<u32, u32>,
    functions: CompactIntegerMap<u32, u32>,
    inline_chains: CompactIntegerMap<u32, u32>,
    frames: CompactIntegerMap<u32, u32>,
    /// Input segment id to its translated frame sequence; the output
    /// re-segments stacks by content.
    segments: CompactIntegerMap<u32, Vec<u32>>,
    stacks: CompactIntegerMap<u32, u32>,
    threads: CompactIntegerMap<u32, u32>,
    /// `None` records a label dropped by the filter.
    labels: CompactIntegerMap<u32, Option<u32>>,
    sample_keys: CompactIntegerMap<u32, u32>,
}

impl<'a> Translation<'a> {
    fn new(
        input: &'a Profile,
        out: &'a mut ProfileBuilder,
        options: &'a MergeOptions,
        filter: &'a CompiledLabelFilter,
    ) -> Self {
        Self {
            input,
            out,
            options,
            filter,
            strings: CompactIntegerMap::with_little_size(input.string_table.len()),
            binaries: CompactIntegerMap::with_little_size(input.binaries.len()),
            functions: CompactIntegerMap::with_little_size(input.functions.len()),
            inline_chains: CompactIntegerMap::with_little_size(input.inline_chains.len()),
            frames: CompactIntegerMap::with_little_size(input.frames.len()),
            segments: CompactIntegerMap::with_little_size(input.stack_segments.len()),
            stacks: CompactIntegerMap::with_little_size(input.stacks.len()),
            threads: CompactIntegerMap::with_little_size(input.threads.len()),
            labels: CompactIntegerMap::with_little_size(input.labels.len()),
            sample_keys: CompactIntegerMap::with_little_size(input.sample_keys.len()),
        }
    }

    fn dangling<T>(table: &str, id: u32) -> Result<T> {
        Err(ProfileError::Invariant(format!(
            "dangling {} id {}",
            table, id
        )))
    }

    /// Maps each input value-type index to an output index, registering
    /// the types when this is the first input. A type unknown to a fixed
    /// output list fails with `IncompatibleValueTypes`.
    fn map_value_types(&mut self, first: bool) -> Result<Vec<Option<u32>>> {
        let input = self.input;
        let mut map = Vec::with_capacity(input.value_types.len());
        for value_type in &input.value_types {
            let r#type = self.translate_string(value_type.r#type)?;
            let unit = self.translate_string(value_type.unit)?;
            if first {
                map.push(Some(self.out.ensure_value_type(r#type, unit)));
            } else {
                match self.out.value_type_index_of(r#type, unit) {
                    Some(index) => map.push(Some(index)),
                    None => {
                        return Err(ProfileError::IncompatibleValueTypes(format!(
                            "value type {}.{} not present in the merged profile",
                            input.string_table.get(value_type.r#type as usize).map(String::as_str).unwrap_or(""),
                            input.string_table.get(value_type.unit as usize).map(String::as_str).unwrap_or(""),
                        )))
                    }
                }
            }
        }
        Ok(map)
    }

    fn input_string(&self, id: u32) -> Result<&'a str> {
        match self.input.string_table.get(id as usize) {
            Some(s) => Ok(s),
            None => Self::dangling("string", id),
        }
    }

    fn translate_string(&mut self, id: u32) -> Result<u32> {
        if id == 0 {
            return Ok(0);
        }
        if let Some(&sid) = self.strings.get(id) {
            return Ok(sid);
        }
        let input = self.input;
        let text = match input.string_table.get(id as usize) {
            Some(s) => s,
            None => return Self::dangling("string", id),
        };
        let sid = self.out.intern_string(text);
        self.strings.try_emplace(id, sid);
        Ok(sid)
    }

    fn translate_binary(&mut self, id: u32) -> Result<u32> {
        if id == 0 {
            return Ok(0);
        }
        if let Some(&out_id) = self.binaries.get(id) {
            return Ok(out_id);
        }
        let input = self.input;
        let binary = match input.binaries.get(id as usize) {
            Some(binary) => binary,
            None => return Self::dangling("binary", id),
        };
        let path = self.translate_string(binary.path)?;
        let build_id = self.translate_string(binary.build_id)?;
        let out_id = self.out.intern_binary(path, build_id);
        self.binaries.try_emplace(id, out_id);
        Ok(out_id)
    }

    fn translate_function(&mut self, id: u32) -> Result<u32> {
        if id == 0 {
            return Ok(0);
        }
        if let Some(&out_id) = self.functions.get(id) {
            return Ok(out_id);
        }
        let input = self.input;
        let function = match input.functions.get(id as usize) {
            Some(function) => function,
            None => return Self::dangling("function", id),
        };
        let name = self.translate_string(function.name)?;
        let system_name = self.translate_string(function.system_name)?;
        let file_name = self.translate_string(function.file_name)?;
        let out_id = self
            .out
            .intern_function(name, system_name, file_name, function.start_line);
        self.functions.try_emplace(id, out_id);
        Ok(out_id)
    }

    fn translate_inline_chain(&mut self, id: u32) -> Result<u32> {
        if id == 0 {
            return Ok(0);
        }
        if let Some(&out_id) = self.inline_chains.get(id) {
            return Ok(out_id);
        }
        let input = self.input;
        let chain = match input.inline_chains.get(id as usize) {
            Some(chain) => chain,
            None => return Self::dangling("inline chain", id),
        };
        let mut lines = Vec::with_capacity(chain.lines.len());
        for line in &chain.lines {
            lines.push(SourceLine {
                function_id: self.translate_function(line.function_id)?,
                line: line.line,
                column: line.column,
            });
        }
        let out_id = self.out.intern_inline_chain(&lines);
        self.inline_chains.try_emplace(id, out_id);
        Ok(out_id)
    }

    fn translate_frame(&mut self, id: u32) -> Result<u32> {
        if id == 0 {
            return Ok(0);
        }
        if let Some(&out_id) = self.frames.get(id) {
            return Ok(out_id);
        }
        let input = self.input;
        let frame = match input.frames.get(id as usize) {
            Some(frame) => frame,
            None => return Self::dangling("frame", id),
        };
        let binary_id = self.translate_binary(frame.binary_id)?;
        let inline_chain_id = self.translate_inline_chain(frame.inline_chain_id)?;
        let out_id = self
            .out
            .intern_frame(binary_id, frame.binary_offset, inline_chain_id);
        self.frames.try_emplace(id, out_id);
        Ok(out_id)
    }

    fn translate_segment_frames(&mut self, id: u32) -> Result<Vec<u32>> {
        if let Some(frames) = self.segments.get(id) {
            return Ok(frames.clone());
        }
        let input = self.input;
        let segment = match input.stack_segments.get(id as usize) {
            Some(segment) => segment,
            None => return Self::dangling("segment", id),
        };
        let mut frames = Vec::with_capacity(segment.frame_ids.len());
        for &frame_id in &segment.frame_ids {
            frames.push(self.translate_frame(frame_id)?);
        }
        self.segments.try_emplace(id, frames.clone());
        Ok(frames)
    }

    fn translate_stack(&mut self, id: u32) -> Result<u32> {
        if id == 0 {
            return Ok(0);
        }
        if let Some(&out_id) = self.stacks.get(id) {
            return Ok(out_id);
        }
        let input = self.input;
        let stack = match input.stacks.get(id as usize) {
            Some(stack) => stack,
            None => return Self::dangling("stack", id),
        };
        let mut frames = Vec::new();
        for &frame_id in &stack.frame_ids {
            frames.push(self.translate_frame(frame_id)?);
        }
        for &segment_id in &stack.segment_ids {
            frames.extend(self.translate_segment_frames(segment_id)?);
        }
        let kind = StackKind::try_from(stack.kind).unwrap_or(StackKind::Other);
        let runtime_name = self.translate_string(stack.runtime_name)?;
        let out_id = self.out.intern_stack(kind, runtime_name, frames);
        self.stacks.try_emplace(id, out_id);
        Ok(out_id)
    }

    fn translate_thread(&mut self, id: u32) -> Result<u32> {
        if let Some(&out_id) = self.threads.get(id) {
            return Ok(out_id);
        }
        let input = self.input;
        let thread = match input.threads.get(id as usize) {
            Some(thread) => thread,
            None => return Self::dangling("thread", id),
        };

        let (thread_id, thread_name) = if self.options.ignore_thread_ids {
            (0, 0)
        } else if self.options.cleanup_thread_names && thread.thread_name != 0 {
            let name = cleanup_thread_name(self.input_string(thread.thread_name)?);
            let sid = self.out.intern_string(name);
            (thread.thread_id, sid)
        } else {
            (thread.thread_id, self.translate_string(thread.thread_name)?)
        };
        let (process_id, process_name) = if self.options.ignore_process_ids {
            (0, 0)
        } else {
            (thread.process_id, self.translate_string(thread.process_name)?)
        };
        let mut containers = Vec::with_capacity(thread.containers.len());
        for &container in &thread.containers {
            containers.push(self.translate_string(container)?);
        }

        let out_id = self
            .out
            .intern_thread(thread_id, thread_name, process_id, process_name, containers);
        self.threads.try_emplace(id, out_id);
        Ok(out_id)
    }

    /// Translates a label, applying the label filter first. `Ok(None)`
    /// means the label was dropped.
    fn translate_label(&mut self, id: u32) -> Result<Option<u32>> {
        if id == 0 {
            return Ok(Some(0));
        }
        if let Some(out_id) = self.labels.get(id) {
            return Ok(*out_id);
        }
        let input = self.input;
        let label = match input.labels.get(id as usize) {
            Some(label) => label,
            None => return Self::dangling("label", id),
        };

        let out_id = if !self.filter.keeps(self.input_string(label.key)?) {
            None
        } else {
            let key = self.translate_string(label.key)?;
            let value = match label.value.as_ref() {
                Some(value) => LabelValue::from_proto(value),
                None => return Self::dangling("label value", id),
            };
            let value = match value {
                LabelValue::Str(sid) => LabelValue::Str(self.translate_string(sid)?),
                other => other,
            };
            Some(self.out.intern_label(key, value))
        };
        self.labels.try_emplace(id, out_id);
        Ok(out_id)
    }

    fn translate_sample_key(&mut self, id: u32) -> Result<u32> {
        if id == 0 {
            return Ok(0);
        }
        if let Some(&out_id) = self.sample_keys.get(id) {
            return Ok(out_id);
        }
        let input = self.input;
        let key = match input.sample_keys.get(id as usize) {
            Some(key) => key,
            None => return Self::dangling("sample key", id),
        };

        let mut stack_ids = Vec::with_capacity(key.stack_ids.len());
        for &stack_id in &key.stack_ids {
            stack_ids.push(self.translate_stack(stack_id)?);
        }
        let thread_id = self.translate_thread(key.thread_id)?;
        let timestamp_ns = if self.options.ignore_timestamps {
            0
        } else {
            key.timestamp_ns
        };
        let mut label_ids = Vec::with_capacity(key.label_ids.len());
        for &label_id in &key.label_ids {
            if let Some(out_label) = self.translate_label(label_id)? {
                label_ids.push(out_label);
            }
        }

        let out_id = self
            .out
            .intern_sample_key(stack_ids, thread_id, timestamp_ns, label_ids);
        self.sample_keys.try_emplace(id, out_id);
        Ok(out_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thread_name_cleanup_strips_numeric_suffixes() {
        assert_eq!(cleanup_thread_name("worker-12"), "worker");
        assert_eq!(cleanup_thread_name("worker12"), "worker");
        assert_eq!(cleanup_thread_name("worker-"), "worker-");
        assert_eq!(cleanup_thread_name("worker"), "worker");
        assert_eq!(cleanup_thread_name("-7"), "");
        assert_eq!(cleanup_thread_name(""), "");
    }

    #[test]
    fn label_filter_prefixes_and_allow_list() {
        let options = MergeOptions {
            label_filter: Some(crate::schema::LabelFilter {
                skipped_key_prefixes: vec!["tls:".to_string(), "cgroup".to_string()],
                allowed_keys: vec![],
            }),
            ..MergeOptions::default()
        };
        let filter = CompiledLabelFilter::new(&options);
        assert!(!filter.keeps("tls:foo"));
        assert!(!filter.keeps("cgroup"));
        assert!(!filter.keeps("cgroup2"));
        assert!(filter.keeps("svc"));

        let options = MergeOptions {
            label_filter: Some(crate::schema::LabelFilter {
                skipped_key_prefixes: vec![],
                allowed_keys: vec!["svc".to_string()],
            }),
            ..MergeOptions::default()
        };
        let filter = CompiledLabelFilter::new(&options);
        assert!(filter.keeps("svc"));
        assert!(!filter.keeps("other"));
    }

    #[test]
    fn merge_of_nothing_is_the_empty_profile() {
        let merged = merge_profiles(&[], &MergeOptions::default()).unwrap();
        assert_eq!(merged.string_table.len(), 1);
        assert!(merged.samples.is_empty());
        assert!(merged.value_types.is_empty());
    }

    #[test]
    fn poisoned_merger_reports_misuse_then_first_error() {
        let mut bad = Profile::default();
        bad.value_types.push(crate::schema::ValueType { r#type: 0, unit: 0 });
        bad.samples.push(crate::schema::Sample {
            key_id: 0,
            values: vec![],
        });
        // Not even a sentinel string table; the first add must fail.
        let mut merger = ProfileMerger::new(MergeOptions::default());
        let err = merger.add(&bad).unwrap_err();
        assert!(matches!(err, ProfileError::Invariant(_)));
        assert_eq!(
            merger.add(&Profile::default()).unwrap_err(),
            ProfileError::Misuse
        );
        assert_eq!(merger.finish().unwrap_err(), err);
    }
}
