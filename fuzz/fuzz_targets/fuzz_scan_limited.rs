#![no_main]
use libfuzzer_sys::fuzz_target;
use zenmeta_parse::{ScanConfig, Source};

// Tight limits and an unknown stream length, as for a network upload
fuzz_target!(|data: &[u8]| {
    let config = ScanConfig::default()
        .with_max_items(64)
        .with_max_xmp_bytes(16 * 1024)
        .with_max_jpeg_scan_bytes(64 * 1024)
        .lenient(true);
    let _ = zenmeta_parse::scan_with_config(&mut Source::new(data), &config, &enough::Unstoppable);
});
