#![no_main]
use libfuzzer_sys::fuzz_target;
use zenmeta_parse::Source;

fuzz_target!(|data: &[u8]| {
    if let Ok(md) = zenmeta_parse::scan(&mut Source::from_slice(data)) {
        for exif in &md.exif {
            assert!(exif.is_valid());
        }
    }
    let _ = zenmeta_parse::xmp::decode(data);
});
