use criterion::{black_box, criterion_group, criterion_main, Criterion};
use profmerge::schema::{pprof, MergeOptions, Profile};
use profmerge::{convert_from_pprof, merge_profiles, ParallelMergerOptions, ParallelProfileMerger};

/// A synthetic CPU profile with `samples` distinct stacks.
fn synthetic_profile(seed: u64, samples: u64) -> Profile {
    let mut profile = pprof::Profile {
        string_table: vec![
            String::new(),
            "samples".into(),
            "count".into(),
            "/usr/bin/app".into(),
            "4884cafe".into(),
        ],
        sample_type: vec![pprof::ValueType { r#type: 1, unit: 2 }],
        mapping: vec![pprof::Mapping {
            id: 1,
            memory_start: 0x1000,
            filename: 3,
            build_id: 4,
            ..pprof::Mapping::default()
        }],
        ..pprof::Profile::default()
    };

    for index in 0..samples {
        let string_id = profile.string_table.len() as i64;
        profile
            .string_table
            .push(format!("func_{}_{}", seed, index));
        profile.function.push(pprof::Function {
            id: index + 1,
            name: string_id,
            system_name: string_id,
            filename: 3,
            start_line: 1,
        });
        profile.location.push(pprof::Location {
            id: index + 1,
            mapping_id: 1,
            address: 0x1000 + seed * 0x100 + index,
            line: vec![pprof::Line {
                function_id: index + 1,
                line: (index % 500) as i64,
            }],
            is_folded: false,
        });
        profile.sample.push(pprof::Sample {
            location_id: vec![index + 1],
            value: vec![(seed + index) as i64 % 97 + 1],
            label: vec![],
        });
    }

    convert_from_pprof(&profile).unwrap()
}

pub fn merge_small_profiles(c: &mut Criterion) {
    let profiles: Vec<Profile> = (0..8).map(|seed| synthetic_profile(seed, 200)).collect();

    c.bench_function("merge_serial", |b| {
        b.iter(|| merge_profiles(black_box(&profiles), &MergeOptions::default()).unwrap())
    });
}

pub fn merge_parallel_profiles(c: &mut Criterion) {
    let profiles: Vec<Profile> = (0..8).map(|seed| synthetic_profile(seed, 200)).collect();

    c.bench_function("merge_parallel", |b| {
        b.iter(|| {
            let mut merger = ParallelProfileMerger::new(ParallelMergerOptions {
                merge_options: MergeOptions::default(),
                concurrency_level: 4,
                buffer_size: 8,
            });
            for profile in &profiles {
                merger.add(black_box(profile.clone())).unwrap();
            }
            merger.finish().unwrap()
        })
    });
}

criterion_group!(benches, merge_small_profiles, merge_parallel_profiles);

criterion_main!(benches);
