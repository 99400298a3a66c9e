//! Lossy, order-independent flattening of a profile to
//! `{sample key -> {value type -> count}}`, used to compare profiles for
//! semantic equivalence independent of id assignment.
//!
//! The sample key is the literal JSON text of the sample's labels, thread
//! metadata and stack, rendered with deterministic field ordering.

use crate::compact_map::CompactIntegerMap;
use crate::error::{ProfileError, Result};
use crate::profile::view::{LabelValueView, ProfileView};
use crate::schema::{pprof, Profile};
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashSet};
use std::convert::TryFrom;
use std::io::Write;

#[derive(Clone, Debug)]
pub struct FlatDiffableOptions {
    pub print_timestamps: bool,
    pub print_addresses: bool,
    pub print_build_ids: bool,
    /// Labels with these keys are dropped from the rendered key.
    pub label_blacklist: HashSet<String>,
}

impl Default for FlatDiffableOptions {
    fn default() -> Self {
        Self {
            print_timestamps: true,
            print_addresses: true,
            print_build_ids: true,
            label_blacklist: HashSet::new(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FlatDiffableProfile {
    samples: BTreeMap<String, BTreeMap<String, u64>>,
}

impl FlatDiffableProfile {
    /// Flattens a canonical profile.
    pub fn from_profile(profile: &Profile, options: &FlatDiffableOptions) -> Result<Self> {
        crate::validate::validate_profile(
            profile,
            crate::validate::ValidateOptions { check_indices: true },
        )?;

        let view = ProfileView::new(profile);
        let mut flat = Self::default();

        for sample in view.samples() {
            let mut builder = FlatKeyBuilder::new(options);
            let key = sample.key();

            if key.timestamp_ns() != 0 {
                builder.set_timestamp_micros((key.timestamp_ns() / 1000) as u64);
            }

            for label in key.labels() {
                match label.value() {
                    Some(LabelValueView::Str(value)) => builder.add_label(label.key(), json!(value)),
                    Some(LabelValueView::Num(value)) => builder.add_label(label.key(), json!(value)),
                    Some(LabelValueView::Real(value)) => builder.add_label(label.key(), json!(value)),
                    None => {}
                }
            }

            let thread = key.thread();
            if thread.thread_id() != 0 {
                builder.add_label("tid", json!(thread.thread_id()));
            }
            if !thread.thread_name().is_empty() {
                builder.add_label("thread_comm", json!(thread.thread_name()));
            }
            if thread.process_id() != 0 {
                builder.add_label("pid", json!(thread.process_id()));
            }
            if !thread.process_name().is_empty() {
                builder.add_label("process_comm", json!(thread.process_name()));
            }
            for container in thread.containers() {
                builder.add_label("workload", json!(container));
            }

            for stack in key.stacks() {
                for frame in stack.frames() {
                    let binary = frame.binary();
                    let chain = frame.inline_chain();
                    if chain.line_count() == 0 {
                        builder.add_frame(
                            binary.build_id(),
                            binary.path(),
                            frame.binary_offset() as u64,
                            "",
                            "",
                            0,
                        );
                    } else {
                        for line in chain.lines() {
                            builder.add_frame(
                                binary.build_id(),
                                binary.path(),
                                frame.binary_offset() as u64,
                                line.function().file_name(),
                                line.function().name(),
                                line.line(),
                            );
                        }
                    }
                }
            }

            let values = flat.samples.entry(builder.finish()).or_default();
            for (&value, value_type) in sample.values().iter().zip(sample.value_types()) {
                let key = format!("{}.{}", value_type.r#type(), value_type.unit());
                let slot = values.entry(key).or_insert(0);
                *slot = slot.saturating_add(value);
            }
        }

        Ok(flat)
    }

    /// Flattens a legacy pprof profile.
    pub fn from_pprof(profile: &pprof::Profile, options: &FlatDiffableOptions) -> Result<Self> {
        let functions = enumerate_entities(profile.function.iter().map(|f| f.id), "function")?;
        let mappings = enumerate_entities(profile.mapping.iter().map(|m| m.id), "mapping")?;
        let locations = enumerate_entities(profile.location.iter().map(|l| l.id), "location")?;


        let default_mapping = pprof::Mapping::default();
        let default_location = pprof::Location::default();
        let default_function = pprof::Function::default();

        let mut flat = Self::default();
        for sample in &profile.sample {
            let mut builder = FlatKeyBuilder::new(options);

            for label in &sample.label {
                // A nonzero num is a numeric label, anything else reads as
                // a string label.
                if label.num != 0 {
                    builder.add_label(pprof_str(profile, label.key)?, json!(label.num));
                } else {
                    builder.add_label(pprof_str(profile, label.key)?, json!(pprof_str(profile, label.str)?));
                }
            }

            for &location_id in &sample.location_id {
                let location = match locations.get(location_id) {
                    Some(&index) => &profile.location[index],
                    None if location_id == 0 => &default_location,
                    None => {
                        return Err(ProfileError::Invariant(format!(
                            "unknown location id {}",
                            location_id
                        )))
                    }
                };
                let mapping = match mappings.get(location.mapping_id) {
                    Some(&index) => &profile.mapping[index],
                    None if location.mapping_id == 0 => &default_mapping,
                    None => {
                        return Err(ProfileError::Invariant(format!(
                            "unknown mapping id {}",
                            location.mapping_id
                        )))
                    }
                };
                let address = (location.address as i64)
                    .wrapping_add(mapping.file_offset as i64)
                    .wrapping_sub(mapping.memory_start as i64);

                if location.line.is_empty() {
                    builder.add_frame(
                        pprof_str(profile, mapping.build_id)?,
                        pprof_str(profile, mapping.filename)?,
                        address as u64,
                        "",
                        "",
                        0,
                    );
                } else {
                    for line in &location.line {
                        let function = match functions.get(line.function_id) {
                            Some(&index) => &profile.function[index],
                            None if line.function_id == 0 => &default_function,
                            None => {
                                return Err(ProfileError::Invariant(format!(
                                    "unknown function id {}",
                                    line.function_id
                                )))
                            }
                        };
                        builder.add_frame(
                            pprof_str(profile, mapping.build_id)?,
                            pprof_str(profile, mapping.filename)?,
                            address as u64,
                            pprof_str(profile, function.filename)?,
                            pprof_str(profile, function.name)?,
                            line.line as u32,
                        );
                    }
                }
            }

            let values = flat.samples.entry(builder.finish()).or_default();
            for (&value, value_type) in sample.value.iter().zip(&profile.sample_type) {
                let key = format!("{}.{}", pprof_str(profile, value_type.r#type)?, pprof_str(profile, value_type.unit)?);
                let slot = values.entry(key).or_insert(0);
                *slot = slot.saturating_add(value as u64);
            }
        }

        Ok(flat)
    }

    pub fn samples(&self) -> &BTreeMap<String, BTreeMap<String, u64>> {
        &self.samples
    }

    /// Per value-type sums over every sample, a coarse equality check used
    /// by the golden tests.
    pub fn event_totals(&self) -> BTreeMap<String, u64> {
        let mut totals = BTreeMap::new();
        for values in self.samples.values() {
            for (key, &value) in values {
                let slot = totals.entry(key.clone()).or_insert(0u64);
                *slot = slot.saturating_add(value);
            }
        }
        totals
    }

    /// Renders `key\ttype.unit=value,...` lines in sorted key order.
    pub fn write_to<W: Write>(&self, out: &mut W) -> std::io::Result<()> {
        for (key, values) in &self.samples {
            out.write_all(key.as_bytes())?;
            out.write_all(b"\t")?;
            let mut sep = "";
            for (value_key, value) in values {
                write!(out, "{}{}={}", sep, value_key, value)?;
                sep = ",";
            }
            out.write_all(b"\n")?;
        }
        Ok(())
    }
}

/// Text of a pprof string-table entry; indexes past the table are a
/// structural error.
fn pprof_str(profile: &pprof::Profile, sid: i64) -> Result<&str> {
    if sid == 0 {
        return Ok("");
    }
    usize::try_from(sid)
        .ok()
        .and_then(|index| profile.string_table.get(index))
        .map(String::as_str)
        .ok_or_else(|| ProfileError::Invariant(format!("string index {} out of range", sid)))
}

/// pprof tables are keyed by opaque ids; map each id to its index.
fn enumerate_entities(
    ids: impl Iterator<Item = u64>,
    what: &str,
) -> Result<CompactIntegerMap<u64, usize>> {
    let mut map = CompactIntegerMap::new();
    for (index, id) in ids.enumerate() {
        if !map.try_emplace(id, index) {
            return Err(ProfileError::Invariant(format!("duplicate {} id {}", what, id)));
        }
    }
    Ok(map)
}

struct FlatKeyBuilder<'a> {
    options: &'a FlatDiffableOptions,
    timestamp: Option<u64>,
    labels: Map<String, Value>,
    stack: Vec<Value>,
}

impl<'a> FlatKeyBuilder<'a> {
    fn new(options: &'a FlatDiffableOptions) -> Self {
        Self {
            options,
            timestamp: None,
            labels: Map::new(),
            stack: Vec::new(),
        }
    }

    fn set_timestamp_micros(&mut self, micros: u64) {
        if self.options.print_timestamps {
            self.timestamp = Some(micros);
        }
    }

    fn add_label(&mut self, key: &str, value: Value) {
        if self.options.label_blacklist.contains(key) {
            return;
        }
        match self.labels.get_mut(key) {
            Some(Value::Array(values)) => values.push(value),
            Some(previous) => {
                let previous = previous.take();
                self.labels
                    .insert(key.to_string(), Value::Array(vec![previous, value]));
            }
            None => {
                self.labels.insert(key.to_string(), value);
            }
        }
    }

    fn add_frame(
        &mut self,
        build_id: &str,
        path: &str,
        offset: u64,
        source_file: &str,
        source_function: &str,
        line: u32,
    ) {
        let mut frame = Map::new();
        let mut binary = Map::new();
        if !build_id.is_empty() && self.options.print_build_ids {
            binary.insert("buildid".to_string(), json!(build_id));
        }
        if !path.is_empty() {
            binary.insert("path".to_string(), json!(path));
        }
        if !binary.is_empty() {
            frame.insert("binary".to_string(), Value::Object(binary));
        }
        if !build_id.is_empty() && self.options.print_addresses {
            frame.insert("address".to_string(), json!(offset));
        }
        if !source_file.is_empty() {
            frame.insert("file".to_string(), json!(source_file));
        }
        frame.insert("line".to_string(), json!(line));
        frame.insert("function".to_string(), json!(source_function));
        self.stack.push(Value::Object(frame));
    }

    fn finish(self) -> String {
        let mut key = Map::new();
        if let Some(timestamp) = self.timestamp {
            key.insert("timestamp".to_string(), json!(timestamp));
        }
        if !self.labels.is_empty() {
            key.insert("labels".to_string(), Value::Object(self.labels));
        }
        if !self.stack.is_empty() {
            key.insert("stack".to_string(), Value::Array(self.stack));
        }
        Value::Object(key).to_string()
    }
}
