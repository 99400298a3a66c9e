#![no_main]
use libfuzzer_sys::fuzz_target;
use profmerge::{convert_from_pprof, parse_pprof, parse_profile};

fuzz_target!(|data: &[u8]| {
    if let Ok(pprof) = parse_pprof(data) {
        let _ = convert_from_pprof(&pprof);
    }
    let _ = parse_profile(data);
});
