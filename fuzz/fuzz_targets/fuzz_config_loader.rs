#![no_main]

use std::path::Path;

use libfuzzer_sys::fuzz_target;
use phasetrack::config::{ConfigLoader, LoaderOptions};

fuzz_target!(|data: &[u8]| {
    if let Ok(yaml_str) = std::str::from_utf8(data) {
        let loader = ConfigLoader::new(LoaderOptions::default());
        // Must not panic; errors are expected
        let _ = loader.load_str(yaml_str, Path::new("fuzz.yaml"));
    }
});
