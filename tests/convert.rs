mod common;

use common::{alloc_profile, cpu_profile, cpu_profile_disjoint, cpu_profile_reordered_types};
use pretty_assertions::assert_eq;
use profmerge::flat::{FlatDiffableOptions, FlatDiffableProfile};
use profmerge::schema::pprof;
use profmerge::validate::{validate_profile, ValidateOptions};
use profmerge::{convert_from_pprof, convert_to_pprof};

fn fixtures() -> Vec<pprof::Profile> {
    vec![
        cpu_profile(),
        cpu_profile_disjoint(),
        cpu_profile_reordered_types(),
        alloc_profile(),
        pprof::Profile::default(),
    ]
}

#[test]
fn conversion_preserves_the_flat_view() {
    let options = FlatDiffableOptions::default();
    for (index, pprof) in fixtures().iter().enumerate() {
        let converted = convert_from_pprof(pprof).unwrap();
        let lhs = FlatDiffableProfile::from_pprof(pprof, &options).unwrap();
        let rhs = FlatDiffableProfile::from_profile(&converted, &options).unwrap();
        assert_eq!(lhs, rhs, "fixture {}", index);
    }
}

#[test]
fn round_trip_preserves_the_flat_view() {
    let options = FlatDiffableOptions::default();
    for (index, pprof) in fixtures().iter().enumerate() {
        let converted = convert_from_pprof(pprof).unwrap();
        let round_tripped = convert_to_pprof(&converted);
        let lhs = FlatDiffableProfile::from_pprof(pprof, &options).unwrap();
        let rhs = FlatDiffableProfile::from_pprof(&round_tripped, &options).unwrap();
        assert_eq!(lhs, rhs, "fixture {}", index);
    }
}

#[test]
fn converted_profiles_validate() {
    for pprof in &fixtures() {
        let converted = convert_from_pprof(pprof).unwrap();
        validate_profile(&converted, ValidateOptions::default()).unwrap();
        validate_profile(&converted, ValidateOptions { check_indices: true }).unwrap();
    }
}

#[test]
fn conversion_combines_equal_sample_keys() {
    // The fixture carries two samples with identical stack, thread and
    // labels; canonical form folds them into one.
    let pprof = cpu_profile();
    let converted = convert_from_pprof(&pprof).unwrap();
    assert_eq!(converted.samples.len(), pprof.sample.len() - 1);

    let flat = FlatDiffableProfile::from_profile(&converted, &FlatDiffableOptions::default())
        .unwrap();
    let totals = flat.event_totals();
    assert_eq!(totals["samples.count"], 5 + 3 + 1 + 2 + 7);
    assert_eq!(totals["cpu.nanoseconds"], 1000 + 600 + 100 + 50 + 1400);
}

#[test]
fn unsymbolized_locations_keep_an_absent_inline_chain() {
    let pprof = cpu_profile();
    let converted = convert_from_pprof(&pprof).unwrap();
    let unsymbolized: Vec<_> = converted
        .frames
        .iter()
        .skip(1)
        .filter(|frame| frame.inline_chain_id == 0)
        .collect();
    assert_eq!(unsymbolized.len(), 1);
    let frame = unsymbolized[0];
    // address 0x7f1040 + file offset 0x2000 - memory start 0x7f0000
    assert_eq!(frame.binary_offset, 0x3040);
}

#[test]
fn kernel_mappings_mark_kernel_stacks() {
    use profmerge::schema::StackKind;

    let converted = convert_from_pprof(&cpu_profile()).unwrap();
    let kinds: Vec<i32> = converted.stacks.iter().skip(1).map(|stack| stack.kind).collect();
    assert!(kinds.contains(&(StackKind::Kernel as i32)));
    assert!(kinds.contains(&(StackKind::Native as i32)));
}

#[test]
fn thread_metadata_moves_into_thread_records() {
    let converted = convert_from_pprof(&cpu_profile()).unwrap();
    let strings = &converted.string_table;

    let named: Vec<_> = converted
        .threads
        .iter()
        .filter(|thread| thread.thread_id == 101)
        .collect();
    assert_eq!(named.len(), 1);
    assert_eq!(strings[named[0].thread_name as usize], "worker-1");

    // No leftover tid/thread_comm labels.
    for label in converted.labels.iter().skip(1) {
        let key = &strings[label.key as usize];
        assert_ne!(key, "tid");
        assert_ne!(key, "thread_comm");
        assert_ne!(key, "pid");
        assert_ne!(key, "workload");
    }
}

#[test]
fn negative_binary_offsets_survive() {
    let mut b = common::PProfBuilder::new(&[("samples", "count")]);
    // memory_start past the address pushes the file offset negative.
    let mapping = b.mapping(1, 0x9000, 0, "/usr/bin/app", "4884cafe");
    let location = b.location(1, mapping, 0x8f00, &[]);
    b.sample(&[location], &[1], vec![]);
    let pprof = b.build();

    let converted = convert_from_pprof(&pprof).unwrap();
    assert_eq!(converted.frames[1].binary_offset, -0x100);

    let options = FlatDiffableOptions::default();
    assert_eq!(
        FlatDiffableProfile::from_pprof(&pprof, &options).unwrap(),
        FlatDiffableProfile::from_profile(&converted, &options).unwrap(),
    );
}

#[test]
fn flat_view_options_drop_fields() {
    let pprof = cpu_profile();
    let converted = convert_from_pprof(&pprof).unwrap();

    let stripped = FlatDiffableOptions {
        print_addresses: false,
        print_build_ids: false,
        ..FlatDiffableOptions::default()
    };
    let flat = FlatDiffableProfile::from_profile(&converted, &stripped).unwrap();
    for key in flat.samples().keys() {
        assert!(!key.contains("address"), "{}", key);
        assert!(!key.contains("buildid"), "{}", key);
    }

    let mut blacklist = FlatDiffableOptions::default();
    blacklist.label_blacklist.insert("svc".to_string());
    let flat = FlatDiffableProfile::from_profile(&converted, &blacklist).unwrap();
    for key in flat.samples().keys() {
        assert!(!key.contains("svc"), "{}", key);
    }
}

#[test]
fn flat_view_renders_stable_text() {
    let converted = convert_from_pprof(&cpu_profile()).unwrap();
    let flat = FlatDiffableProfile::from_profile(&converted, &FlatDiffableOptions::default())
        .unwrap();

    let mut first = Vec::new();
    flat.write_to(&mut first).unwrap();
    let mut second = Vec::new();
    flat.write_to(&mut second).unwrap();
    assert_eq!(first, second);

    let text = String::from_utf8(first).unwrap();
    assert_eq!(text.lines().count(), flat.samples().len());
    assert!(text.contains("cpu.nanoseconds="));
}

#[test]
fn gzipped_captures_decompress_and_parse() {
    // Profile captures are conventionally stored gzipped; the library
    // takes uncompressed bytes, the caller decompresses.
    use flate2::read::GzDecoder;
    use flate2::{write::GzEncoder, Compression};
    use prost::Message;
    use std::io::{Read, Write};

    let pprof = cpu_profile();
    let mut gzip = GzEncoder::new(Vec::new(), Compression::default());
    gzip.write_all(&pprof.encode_to_vec()).unwrap();
    let compressed = gzip.finish().unwrap();

    let mut bytes = Vec::new();
    GzDecoder::new(&*compressed).read_to_end(&mut bytes).unwrap();
    let parsed = profmerge::parse_pprof(&bytes).unwrap();

    let options = FlatDiffableOptions::default();
    assert_eq!(
        FlatDiffableProfile::from_pprof(&pprof, &options).unwrap(),
        FlatDiffableProfile::from_pprof(&parsed, &options).unwrap(),
    );
}

#[test]
fn parse_rejects_garbage() {
    let err = profmerge::parse_pprof(b"not a protobuf").unwrap_err();
    assert!(matches!(err, profmerge::ProfileError::Parse(_)));
}

#[test]
fn serialized_profiles_parse_back() {
    let converted = convert_from_pprof(&cpu_profile()).unwrap();
    let bytes = profmerge::serialize_profile(&converted);
    let parsed = profmerge::parse_profile(&bytes).unwrap();
    assert_eq!(converted, parsed);

    let pprof = convert_to_pprof(&converted);
    let bytes = profmerge::serialize_pprof(&pprof);
    let parsed = profmerge::parse_pprof(&bytes).unwrap();
    assert_eq!(pprof, parsed);
}
