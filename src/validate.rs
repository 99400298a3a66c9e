//! Structural and index-range invariant checking for canonical profiles.

use crate::error::{ProfileError, Result};
use crate::schema::Profile;

#[derive(Clone, Copy, Debug, Default)]
pub struct ValidateOptions {
    /// Also check that every id reference lands inside its target table
    /// and that the sentinels at index 0 are well formed.
    pub check_indices: bool,
}

/// Checks the profile against the invariants of the canonical schema and
/// reports the first violation. Does not mutate the profile.
pub fn validate_profile(profile: &Profile, options: ValidateOptions) -> Result<()> {
    check_structure(profile)?;
    if options.check_indices {
        check_indices(profile)?;
    }
    Ok(())
}

fn invariant(message: String) -> ProfileError {
    ProfileError::Invariant(message)
}

fn check_structure(profile: &Profile) -> Result<()> {
    let value_type_count = profile.value_types.len();
    for (index, sample) in profile.samples.iter().enumerate() {
        if sample.values.len() != value_type_count {
            return Err(invariant(format!(
                "sample {}: {} values, expected {}",
                index,
                sample.values.len(),
                value_type_count
            )));
        }
    }

    for (index, key) in profile.sample_keys.iter().enumerate() {
        let mut previous: Option<(u32, u32)> = None;
        for &label_id in &key.label_ids {
            let key_sid = profile
                .labels
                .get(label_id as usize)
                .map(|label| label.key)
                .unwrap_or(0);
            if let Some(prev) = previous {
                if prev >= (key_sid, label_id) {
                    return Err(invariant(format!(
                        "sample key {}: labels not sorted or not unique",
                        index
                    )));
                }
            }
            previous = Some((key_sid, label_id));
        }
    }

    for (index, stack) in profile.stacks.iter().enumerate() {
        for &segment_id in &stack.segment_ids {
            let segment = profile
                .stack_segments
                .get(segment_id as usize)
                .ok_or_else(|| {
                    invariant(format!("stack {}: dangling segment {}", index, segment_id))
                })?;
            if segment.frame_ids.is_empty() {
                return Err(invariant(format!(
                    "stack {}: references empty segment {}",
                    index, segment_id
                )));
            }
        }
    }

    Ok(())
}

fn check_indices(profile: &Profile) -> Result<()> {
    let strings = profile.string_table.len();
    let check_sid = |what: &str, index: usize, sid: u32| -> Result<()> {
        if sid as usize >= strings {
            return Err(invariant(format!(
                "{} {}: string id {} out of range",
                what, index, sid
            )));
        }
        Ok(())
    };

    if profile.string_table.first().map(String::as_str) != Some("") {
        return Err(invariant("string table must start with \"\"".to_string()));
    }

    for (index, binary) in profile.binaries.iter().enumerate() {
        check_sid("binary", index, binary.path)?;
        check_sid("binary", index, binary.build_id)?;
    }

    for (index, function) in profile.functions.iter().enumerate() {
        check_sid("function", index, function.name)?;
        check_sid("function", index, function.system_name)?;
        check_sid("function", index, function.file_name)?;
    }

    for (index, chain) in profile.inline_chains.iter().enumerate() {
        for line in &chain.lines {
            if line.function_id as usize >= profile.functions.len() {
                return Err(invariant(format!(
                    "inline chain {}: function id {} out of range",
                    index, line.function_id
                )));
            }
        }
    }

    for (index, frame) in profile.frames.iter().enumerate() {
        if frame.binary_id as usize >= profile.binaries.len() {
            return Err(invariant(format!(
                "frame {}: binary id {} out of range",
                index, frame.binary_id
            )));
        }
        if frame.inline_chain_id as usize >= profile.inline_chains.len() {
            return Err(invariant(format!(
                "frame {}: inline chain id {} out of range",
                index, frame.inline_chain_id
            )));
        }
    }

    for (index, segment) in profile.stack_segments.iter().enumerate() {
        for &frame_id in &segment.frame_ids {
            if frame_id as usize >= profile.frames.len() {
                return Err(invariant(format!(
                    "segment {}: frame id {} out of range",
                    index, frame_id
                )));
            }
        }
    }

    for (index, stack) in profile.stacks.iter().enumerate() {
        check_sid("stack", index, stack.runtime_name)?;
        for &frame_id in &stack.frame_ids {
            if frame_id as usize >= profile.frames.len() {
                return Err(invariant(format!(
                    "stack {}: frame id {} out of range",
                    index, frame_id
                )));
            }
        }
        for &segment_id in &stack.segment_ids {
            if segment_id as usize >= profile.stack_segments.len() {
                return Err(invariant(format!(
                    "stack {}: segment id {} out of range",
                    index, segment_id
                )));
            }
        }
    }

    for (index, thread) in profile.threads.iter().enumerate() {
        check_sid("thread", index, thread.thread_name)?;
        check_sid("thread", index, thread.process_name)?;
        for &container in &thread.containers {
            check_sid("thread", index, container)?;
        }
    }

    for (index, label) in profile.labels.iter().enumerate() {
        check_sid("label", index, label.key)?;
        if let Some(crate::schema::label::Value::Str(sid)) = label.value {
            check_sid("label", index, sid)?;
        }
    }

    for (index, key) in profile.sample_keys.iter().enumerate() {
        if key.thread_id as usize >= profile.threads.len() {
            return Err(invariant(format!(
                "sample key {}: thread id {} out of range",
                index, key.thread_id
            )));
        }
        for &stack_id in &key.stack_ids {
            if stack_id as usize >= profile.stacks.len() {
                return Err(invariant(format!(
                    "sample key {}: stack id {} out of range",
                    index, stack_id
                )));
            }
        }
        for &label_id in &key.label_ids {
            if label_id as usize >= profile.labels.len() {
                return Err(invariant(format!(
                    "sample key {}: label id {} out of range",
                    index, label_id
                )));
            }
        }
    }

    for (index, value_type) in profile.value_types.iter().enumerate() {
        check_sid("value type", index, value_type.r#type)?;
        check_sid("value type", index, value_type.unit)?;
    }

    for (index, sample) in profile.samples.iter().enumerate() {
        if sample.key_id as usize >= profile.sample_keys.len() {
            return Err(invariant(format!(
                "sample {}: key id {} out of range",
                index, sample.key_id
            )));
        }
    }

    for (index, &comment) in profile.comments.iter().enumerate() {
        check_sid("comment", index, comment)?;
    }

    if !profile.value_types.is_empty() {
        for (what, index) in [
            ("default_value_type_index", profile.default_value_type_index),
            ("period_value_type_index", profile.period_value_type_index),
        ] {
            if index as usize >= profile.value_types.len() {
                return Err(invariant(format!("{} {} out of range", what, index)));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Sample, SampleKey, Stack, ValueType};

    fn minimal_profile() -> Profile {
        let mut builder = crate::profile::ProfileBuilder::new();
        builder.ensure_value_type(0, 0);
        builder.accumulate_sample(0, &[1]);
        builder.finish()
    }

    #[test]
    fn accepts_builder_output() {
        let profile = minimal_profile();
        validate_profile(&profile, ValidateOptions::default()).unwrap();
        validate_profile(&profile, ValidateOptions { check_indices: true }).unwrap();
    }

    #[test]
    fn rejects_value_count_mismatch() {
        let mut profile = minimal_profile();
        profile.value_types.push(ValueType { r#type: 0, unit: 0 });
        let err = validate_profile(&profile, ValidateOptions::default()).unwrap_err();
        assert!(err.to_string().contains("sample 0"));
    }

    #[test]
    fn rejects_unsorted_labels() {
        let mut profile = minimal_profile();
        profile.sample_keys.push(SampleKey {
            label_ids: vec![0, 0],
            ..SampleKey::default()
        });
        let err = validate_profile(&profile, ValidateOptions::default()).unwrap_err();
        assert!(err.to_string().contains("not sorted"));
    }

    #[test]
    fn rejects_dangling_references() {
        let mut profile = minimal_profile();
        profile.samples.push(Sample {
            key_id: 17,
            values: vec![0],
        });
        assert!(validate_profile(&profile, ValidateOptions::default()).is_ok());
        let err =
            validate_profile(&profile, ValidateOptions { check_indices: true }).unwrap_err();
        assert!(err.to_string().contains("key id 17"));
    }

    #[test]
    fn rejects_empty_referenced_segment() {
        let mut profile = minimal_profile();
        profile.stacks.push(Stack {
            segment_ids: vec![0],
            ..Stack::default()
        });
        let err = validate_profile(&profile, ValidateOptions::default()).unwrap_err();
        assert!(err.to_string().contains("empty segment"));
    }
}
