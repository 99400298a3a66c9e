//! Rewrites a canonical profile into the legacy pprof schema.
//!
//! Fresh dense pprof ids are assigned starting at 1 (pprof reserves 0 as
//! absent). Canonical ids are already dense, so every table translates by
//! index; stacks sharing segments are flattened into independent
//! `location_id` sequences.

use crate::pprof::{
    LABEL_KEY_PID, LABEL_KEY_PROCESS_NAME, LABEL_KEY_THREAD_NAME, LABEL_KEY_TID,
    LABEL_KEY_WORKLOAD,
};
use crate::profile::Interner;
use crate::schema::{label, pprof, Profile};

struct PProfStrings(Interner<String>);

impl PProfStrings {
    fn intern(&mut self, s: &str) -> i64 {
        if s.is_empty() {
            return 0;
        }
        i64::from(self.0.intern(s.to_owned()))
    }
}

fn canonical_str(profile: &Profile, sid: u32) -> &str {
    &profile.string_table[sid as usize]
}

pub fn convert_to_pprof(src: &Profile) -> pprof::Profile {
    let mut out = pprof::Profile::default();
    let mut strings = PProfStrings(Interner::with_sentinel(String::new()));

    // Canonical binaries map to synthetic mappings with memory_start and
    // file_offset both 0, so the pprof address equals the binary offset.
    // Mapping id == binary id, function id == function id, location id ==
    // frame id; the sentinel at 0 maps to "absent" on the pprof side.
    for (index, binary) in src.binaries.iter().enumerate().skip(1) {
        out.mapping.push(pprof::Mapping {
            id: index as u64,
            filename: strings.intern(canonical_str(src, binary.path)),
            build_id: strings.intern(canonical_str(src, binary.build_id)),
            ..pprof::Mapping::default()
        });
    }

    for (index, function) in src.functions.iter().enumerate().skip(1) {
        out.function.push(pprof::Function {
            id: index as u64,
            name: strings.intern(canonical_str(src, function.name)),
            system_name: strings.intern(canonical_str(src, function.system_name)),
            filename: strings.intern(canonical_str(src, function.file_name)),
            start_line: i64::from(function.start_line),
        });
    }

    for (index, frame) in src.frames.iter().enumerate().skip(1) {
        let chain = &src.inline_chains[frame.inline_chain_id as usize];
        out.location.push(pprof::Location {
            id: index as u64,
            mapping_id: u64::from(frame.binary_id),
            address: frame.binary_offset as u64,
            line: chain
                .lines
                .iter()
                .map(|line| pprof::Line {
                    function_id: u64::from(line.function_id),
                    line: i64::from(line.line),
                })
                .collect(),
            is_folded: false,
        });
    }

    for value_type in &src.value_types {
        out.sample_type.push(pprof::ValueType {
            r#type: strings.intern(canonical_str(src, value_type.r#type)),
            unit: strings.intern(canonical_str(src, value_type.unit)),
        });
    }

    for sample in &src.samples {
        let key = &src.sample_keys[sample.key_id as usize];

        let mut location_id = Vec::new();
        for &stack_id in &key.stack_ids {
            let stack = &src.stacks[stack_id as usize];
            location_id.extend(stack.frame_ids.iter().map(|&id| u64::from(id)));
            for &segment_id in &stack.segment_ids {
                let segment = &src.stack_segments[segment_id as usize];
                location_id.extend(segment.frame_ids.iter().map(|&id| u64::from(id)));
            }
        }

        let mut labels = Vec::new();
        for &label_id in &key.label_ids {
            let entry = &src.labels[label_id as usize];
            let key_sid = strings.intern(canonical_str(src, entry.key));
            let mut out_label = pprof::Label {
                key: key_sid,
                ..pprof::Label::default()
            };
            match entry.value {
                Some(label::Value::Str(value)) => out_label.str = strings.intern(canonical_str(src, value)),
                Some(label::Value::Num(num)) => out_label.num = num,
                // pprof has no floating-point labels; the value is truncated.
                Some(label::Value::Real(real)) => out_label.num = real as i64,
                None => {}
            }
            labels.push(out_label);
        }

        let thread = &src.threads[key.thread_id as usize];
        if thread.thread_id != 0 {
            labels.push(pprof::Label {
                key: strings.intern(LABEL_KEY_TID),
                num: thread.thread_id as i64,
                ..pprof::Label::default()
            });
        }
        if thread.thread_name != 0 {
            labels.push(pprof::Label {
                key: strings.intern(LABEL_KEY_THREAD_NAME),
                str: strings.intern(canonical_str(src, thread.thread_name)),
                ..pprof::Label::default()
            });
        }
        if thread.process_id != 0 {
            labels.push(pprof::Label {
                key: strings.intern(LABEL_KEY_PID),
                num: thread.process_id as i64,
                ..pprof::Label::default()
            });
        }
        if thread.process_name != 0 {
            labels.push(pprof::Label {
                key: strings.intern(LABEL_KEY_PROCESS_NAME),
                str: strings.intern(canonical_str(src, thread.process_name)),
                ..pprof::Label::default()
            });
        }
        for &container in &thread.containers {
            labels.push(pprof::Label {
                key: strings.intern(LABEL_KEY_WORKLOAD),
                str: strings.intern(canonical_str(src, container)),
                ..pprof::Label::default()
            });
        }

        out.sample.push(pprof::Sample {
            location_id,
            value: sample.values.iter().map(|&value| value as i64).collect(),
            label: labels,
        });
    }

    for &comment in &src.comments {
        let text = strings.intern(canonical_str(src, comment));
        out.comment.push(text);
    }

    if let Some(value_type) = src.value_types.get(src.default_value_type_index as usize) {
        if src.default_value_type_index != 0 {
            out.default_sample_type = strings.intern(canonical_str(src, value_type.r#type));
        }
    }
    if src.period != 0 {
        out.period = src.period as i64;
        if let Some(value_type) = src.value_types.get(src.period_value_type_index as usize) {
            out.period_type = Some(pprof::ValueType {
                r#type: strings.intern(canonical_str(src, value_type.r#type)),
                unit: strings.intern(canonical_str(src, value_type.unit)),
            });
        }
    }

    out.string_table = strings.0.iter().cloned().collect();
    out
}
