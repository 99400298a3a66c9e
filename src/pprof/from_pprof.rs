//! Rewrites a legacy pprof profile into canonical form.

use crate::compact_map::CompactIntegerMap;
use crate::error::{ProfileError, Result};
use crate::pprof::{
    KERNEL_MAPPING_PREFIX, LABEL_KEY_PID, LABEL_KEY_PROCESS_NAME, LABEL_KEY_RUNTIME,
    LABEL_KEY_THREAD_NAME, LABEL_KEY_TID, LABEL_KEY_WORKLOAD,
};
use crate::profile::{LabelValue, ProfileBuilder};
use crate::schema::{pprof, Profile, SourceLine, StackKind};
use std::convert::TryFrom;
use tracing::debug;

/// Canonical leftovers of a pprof mapping, keyed by its opaque id.
#[derive(Clone, Copy, Debug)]
struct MappingRecord {
    binary_id: u32,
    memory_start: u64,
    file_offset: u64,
    kernel: bool,
}

/// Canonical leftovers of a pprof location, keyed by its opaque id.
#[derive(Clone, Copy, Debug)]
struct LocationRecord {
    frame_id: u32,
    kernel: bool,
}

/// Rewrite table from pprof string indices to canonical string ids.
struct StringRewrite(Vec<u32>);

impl StringRewrite {
    fn get(&self, sid: i64) -> Result<u32> {
        if sid == 0 {
            return Ok(0);
        }
        usize::try_from(sid)
            .ok()
            .and_then(|index| self.0.get(index).copied())
            .ok_or_else(|| ProfileError::Invariant(format!("string index {} out of range", sid)))
    }
}

/// Text of a pprof string-table entry, "" for anything out of range.
fn pprof_str(profile: &pprof::Profile, sid: i64) -> &str {
    usize::try_from(sid)
        .ok()
        .and_then(|index| profile.string_table.get(index))
        .map(String::as_str)
        .unwrap_or("")
}

pub fn convert_from_pprof(src: &pprof::Profile) -> Result<Profile> {
    let mut builder = ProfileBuilder::new();

    let strings = StringRewrite(
        src.string_table
            .iter()
            .map(|s| builder.intern_string(s))
            .collect(),
    );

    let mut mappings = CompactIntegerMap::<u64, MappingRecord>::new();
    for mapping in &src.mapping {
        let record = MappingRecord {
            binary_id: builder
                .intern_binary(strings.get(mapping.filename)?, strings.get(mapping.build_id)?),
            memory_start: mapping.memory_start,
            file_offset: mapping.file_offset,
            kernel: pprof_str(src, mapping.filename).starts_with(KERNEL_MAPPING_PREFIX),
        };
        if !mappings.try_emplace(mapping.id, record) {
            return Err(ProfileError::Invariant(format!(
                "duplicate mapping id {}",
                mapping.id
            )));
        }
    }

    let mut functions = CompactIntegerMap::<u64, u32>::new();
    for function in &src.function {
        let id = builder.intern_function(
            strings.get(function.name)?,
            strings.get(function.system_name)?,
            strings.get(function.filename)?,
            function.start_line as u32,
        );
        if !functions.try_emplace(function.id, id) {
            return Err(ProfileError::Invariant(format!(
                "duplicate function id {}",
                function.id
            )));
        }
    }

    let mut locations = CompactIntegerMap::<u64, LocationRecord>::new();
    for location in &src.location {
        let (binary_id, binary_offset, kernel) = if location.mapping_id != 0 {
            let mapping = mappings.get(location.mapping_id).ok_or_else(|| {
                ProfileError::Invariant(format!("unknown mapping id {}", location.mapping_id))
            })?;
            // The runtime address becomes a file offset; malformed mappings
            // may push it negative and the sign is preserved.
            let offset = (location.address as i64)
                .wrapping_add(mapping.file_offset as i64)
                .wrapping_sub(mapping.memory_start as i64);
            (mapping.binary_id, offset, mapping.kernel)
        } else {
            (0, location.address as i64, false)
        };

        let mut lines = Vec::with_capacity(location.line.len());
        for line in &location.line {
            let function_id = if line.function_id == 0 {
                0
            } else {
                *functions.get(line.function_id).ok_or_else(|| {
                    ProfileError::Invariant(format!("unknown function id {}", line.function_id))
                })?
            };
            lines.push(SourceLine {
                function_id,
                line: line.line as u32,
                column: 0,
            });
        }
        // A location with no lines is un-symbolized: chain id 0, explicit
        // absent.
        let chain_id = builder.intern_inline_chain(&lines);
        let record = LocationRecord {
            frame_id: builder.intern_frame(binary_id, binary_offset, chain_id),
            kernel,
        };
        if !locations.try_emplace(location.id, record) {
            return Err(ProfileError::Invariant(format!(
                "duplicate location id {}",
                location.id
            )));
        }
    }

    for value_type in &src.sample_type {
        builder.ensure_value_type(strings.get(value_type.r#type)?, strings.get(value_type.unit)?);
    }

    for sample in &src.sample {
        if sample.value.len() != src.sample_type.len() {
            return Err(ProfileError::Invariant(format!(
                "sample has {} values, expected {}",
                sample.value.len(),
                src.sample_type.len()
            )));
        }

        let mut thread_id = 0u64;
        let mut process_id = 0u64;
        let mut thread_name = 0u32;
        let mut process_name = 0u32;
        let mut containers = Vec::new();
        let mut runtime = "";
        let mut label_ids = Vec::new();

        for label in &sample.label {
            let key = pprof_str(src, label.key);
            match key {
                LABEL_KEY_TID if label.num != 0 => thread_id = label.num as u64,
                LABEL_KEY_PID if label.num != 0 => process_id = label.num as u64,
                LABEL_KEY_THREAD_NAME if label.num == 0 && label.str != 0 => {
                    thread_name = strings.get(label.str)?;
                }
                LABEL_KEY_PROCESS_NAME if label.num == 0 && label.str != 0 => {
                    process_name = strings.get(label.str)?;
                }
                LABEL_KEY_WORKLOAD if label.num == 0 && label.str != 0 => {
                    containers.push(strings.get(label.str)?);
                }
                _ => {
                    if key == LABEL_KEY_RUNTIME && label.num == 0 {
                        runtime = pprof_str(src, label.str);
                    }
                    // A label with a nonzero num is numeric, anything else
                    // is a string label, matching how the flat view reads
                    // pprof labels.
                    let value = if label.num != 0 {
                        LabelValue::Num(label.num)
                    } else {
                        LabelValue::Str(strings.get(label.str)?)
                    };
                    label_ids.push(builder.intern_label(strings.get(label.key)?, value));
                }
            }
        }

        let canonical_thread = if thread_id == 0
            && process_id == 0
            && thread_name == 0
            && process_name == 0
            && containers.is_empty()
        {
            0
        } else {
            builder.intern_thread(thread_id, thread_name, process_id, process_name, containers)
        };

        let mut frames = Vec::with_capacity(sample.location_id.len());
        let mut kernel = false;
        for &location_id in &sample.location_id {
            if location_id == 0 {
                frames.push(0);
                continue;
            }
            let record = locations.get(location_id).ok_or_else(|| {
                ProfileError::Invariant(format!("unknown location id {}", location_id))
            })?;
            frames.push(record.frame_id);
            // The outermost frame decides whether this is a kernel stack.
            kernel = record.kernel;
        }

        let (kind, runtime_name) = if kernel {
            (StackKind::Kernel, 0)
        } else {
            match runtime {
                "" => (StackKind::Native, 0),
                "python" => (StackKind::Python, builder.intern_string(runtime)),
                "php" => (StackKind::Php, builder.intern_string(runtime)),
                other => (StackKind::Other, builder.intern_string(other)),
            }
        };
        let stack = builder.intern_stack(kind, runtime_name, frames);

        let key_id = builder.intern_sample_key(vec![stack], canonical_thread, 0, label_ids);
        let values: Vec<u64> = sample.value.iter().map(|&value| value as u64).collect();
        builder.accumulate_sample(key_id, &values);
    }

    for &comment in &src.comment {
        let sid = strings.get(comment)?;
        builder.add_comment(sid);
    }

    let default_index = if src.default_sample_type != 0 {
        let target = strings.get(src.default_sample_type)?;
        builder
            .value_types()
            .iter()
            .position(|vt| vt.r#type == target)
            .map(|index| index as u32)
            .unwrap_or(0)
    } else {
        0
    };
    let period_index = src
        .period_type
        .as_ref()
        .and_then(|period_type| {
            let r#type = strings.get(period_type.r#type).ok()?;
            let unit = strings.get(period_type.unit).ok()?;
            builder.value_type_index_of(r#type, unit)
        })
        .unwrap_or(0);
    builder.set_metadata(default_index, period_index, src.period.max(0) as u64);

    let profile = builder.finish();
    debug!(
        "Converted pprof profile: {} samples, {} stacks, {} strings",
        profile.samples.len(),
        profile.stacks.len(),
        profile.string_table.len()
    );
    Ok(profile)
}
