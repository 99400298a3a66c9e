//! Deterministic synthetic profiles for the integration tests, standing in
//! for the golden pprof captures of the original service.
#![allow(dead_code)]

use profmerge::schema::pprof;
use std::collections::HashMap;

pub struct PProfBuilder {
    profile: pprof::Profile,
    strings: HashMap<String, i64>,
}

impl PProfBuilder {
    pub fn new(sample_types: &[(&str, &str)]) -> Self {
        let mut builder = Self {
            profile: pprof::Profile {
                string_table: vec![String::new()],
                ..pprof::Profile::default()
            },
            strings: HashMap::new(),
        };
        for &(r#type, unit) in sample_types {
            let r#type = builder.str_id(r#type);
            let unit = builder.str_id(unit);
            builder
                .profile
                .sample_type
                .push(pprof::ValueType { r#type, unit });
        }
        builder
    }

    pub fn str_id(&mut self, s: &str) -> i64 {
        if s.is_empty() {
            return 0;
        }
        if let Some(&id) = self.strings.get(s) {
            return id;
        }
        let id = self.profile.string_table.len() as i64;
        self.profile.string_table.push(s.to_string());
        self.strings.insert(s.to_string(), id);
        id
    }

    pub fn mapping(
        &mut self,
        id: u64,
        memory_start: u64,
        file_offset: u64,
        filename: &str,
        build_id: &str,
    ) -> u64 {
        let filename = self.str_id(filename);
        let build_id = self.str_id(build_id);
        self.profile.mapping.push(pprof::Mapping {
            id,
            memory_start,
            memory_limit: memory_start + 0x10000,
            file_offset,
            filename,
            build_id,
            ..pprof::Mapping::default()
        });
        id
    }

    pub fn function(&mut self, id: u64, name: &str, filename: &str, start_line: i64) -> u64 {
        let name_id = self.str_id(name);
        let filename = self.str_id(filename);
        self.profile.function.push(pprof::Function {
            id,
            name: name_id,
            system_name: name_id,
            filename,
            start_line,
        });
        id
    }

    /// `lines` are (function id, line number) pairs, innermost first.
    pub fn location(&mut self, id: u64, mapping_id: u64, address: u64, lines: &[(u64, i64)]) -> u64 {
        self.profile.location.push(pprof::Location {
            id,
            mapping_id,
            address,
            line: lines
                .iter()
                .map(|&(function_id, line)| pprof::Line { function_id, line })
                .collect(),
            is_folded: false,
        });
        id
    }

    pub fn num_label(&mut self, key: &str, num: i64) -> pprof::Label {
        pprof::Label {
            key: self.str_id(key),
            num,
            ..pprof::Label::default()
        }
    }

    pub fn str_label(&mut self, key: &str, value: &str) -> pprof::Label {
        pprof::Label {
            key: self.str_id(key),
            str: self.str_id(value),
            ..pprof::Label::default()
        }
    }

    pub fn sample(&mut self, location_ids: &[u64], values: &[i64], labels: Vec<pprof::Label>) {
        self.profile.sample.push(pprof::Sample {
            location_id: location_ids.to_vec(),
            value: values.to_vec(),
            label: labels,
        });
    }

    pub fn period(&mut self, r#type: &str, unit: &str, period: i64) {
        let r#type = self.str_id(r#type);
        let unit = self.str_id(unit);
        self.profile.period_type = Some(pprof::ValueType { r#type, unit });
        self.profile.period = period;
    }

    pub fn comment(&mut self, text: &str) {
        let id = self.str_id(text);
        self.profile.comment.push(id);
    }

    pub fn build(self) -> pprof::Profile {
        self.profile
    }
}

/// A CPU profile with inline chains, an un-symbolized libc frame, a kernel
/// stack, thread metadata labels and a duplicate sample key.
pub fn cpu_profile() -> pprof::Profile {
    let mut b = PProfBuilder::new(&[("samples", "count"), ("cpu", "nanoseconds")]);

    let app = b.mapping(1, 0x1000, 0, "/usr/bin/app", "4884cafe");
    let libc = b.mapping(2, 0x7f0000, 0x2000, "/lib/x86_64/libc.so.6", "deadbeef");
    let kernel = b.mapping(3, 0xffff8000, 0, "[kernel.kallsyms]", "");

    let main_fn = b.function(1, "main", "app.c", 10);
    let compute = b.function(2, "compute", "compute.c", 1);
    let helper = b.function(3, "helper", "compute.c", 50);
    let do_irq = b.function(4, "do_IRQ", "irq.c", 7);

    let loc_main = b.location(1, app, 0x1234, &[(main_fn, 42)]);
    // compute() inlined into helper(): two lines at one site.
    let loc_inline = b.location(2, app, 0x1300, &[(compute, 11), (helper, 61)]);
    let loc_unsym = b.location(3, libc, 0x7f1040, &[]);
    let loc_irq = b.location(4, kernel, 0xffff8100, &[(do_irq, 12)]);

    let tid = b.num_label("tid", 101);
    let comm = b.str_label("thread_comm", "worker-1");
    let svc = b.str_label("svc", "web");
    b.sample(&[loc_main], &[5, 1000], vec![tid.clone(), comm.clone(), svc.clone()]);

    let tid2 = b.num_label("tid", 102);
    let pid = b.num_label("pid", 40);
    let tls = b.str_label("tls:cert", "corp");
    b.sample(
        &[loc_inline, loc_main],
        &[3, 600],
        vec![tid2, pid, svc.clone(), tls],
    );

    let workload = b.str_label("workload", "pod-a");
    b.sample(&[loc_unsym, loc_inline, loc_main], &[1, 100], vec![workload]);

    b.sample(&[loc_irq], &[2, 50], vec![]);

    // Same key as the first sample: combines on conversion.
    b.sample(&[loc_main], &[7, 1400], vec![tid, comm, svc]);

    b.period("cpu", "nanoseconds", 10000);
    b.comment("synthetic cpu capture");
    b.build()
}

/// A second CPU profile with the same value types but disjoint strings,
/// functions and stacks.
pub fn cpu_profile_disjoint() -> pprof::Profile {
    let mut b = PProfBuilder::new(&[("samples", "count"), ("cpu", "nanoseconds")]);

    let server = b.mapping(1, 0x4000, 0, "/opt/server/bin/serverd", "00ff00ff");
    let handle = b.function(1, "handle_request", "server.rs", 100);
    let parse = b.function(2, "parse_header", "http.rs", 5);

    let loc_handle = b.location(1, server, 0x4abc, &[(handle, 120)]);
    let loc_parse = b.location(2, server, 0x4def, &[(parse, 17)]);

    let env = b.str_label("env", "staging");
    b.sample(&[loc_parse, loc_handle], &[4, 800], vec![env]);
    b.sample(&[loc_handle], &[9, 1800], vec![]);

    b.build()
}

/// Same value types as `cpu_profile` but declared in the opposite order.
pub fn cpu_profile_reordered_types() -> pprof::Profile {
    let mut b = PProfBuilder::new(&[("cpu", "nanoseconds"), ("samples", "count")]);

    let app = b.mapping(1, 0x1000, 0, "/usr/bin/app", "4884cafe");
    let main_fn = b.function(1, "main", "app.c", 10);
    let loc_main = b.location(1, app, 0x1234, &[(main_fn, 42)]);

    b.sample(&[loc_main], &[300, 2], vec![]);
    b.build()
}

/// A profile whose value types cannot be merged into a CPU profile.
pub fn alloc_profile() -> pprof::Profile {
    let mut b = PProfBuilder::new(&[("allocations", "count")]);
    let app = b.mapping(1, 0x1000, 0, "/usr/bin/app", "4884cafe");
    let malloc = b.function(1, "malloc", "alloc.c", 1);
    let loc = b.location(1, app, 0x1500, &[(malloc, 33)]);
    b.sample(&[loc], &[12], vec![]);
    b.build()
}
