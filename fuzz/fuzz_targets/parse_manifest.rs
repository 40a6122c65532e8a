#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let data = if data.len() > 64 * 1024 {
        &data[..64 * 1024]
    } else {
        data
    };

    if let Ok(loaded) = ktreg_catalog::manifest::parse_manifest(data) {
        // Every accepted catalog must partition its domain without gaps.
        for table in loaded.catalog.tables() {
            let Some((first, last)) = loaded.catalog.domain(table.variant) else {
                continue;
            };
            if last - first > 4096 {
                continue;
            }
            let cases = loaded.catalog.cases_in_range(&[table.variant], first, last);
            assert_eq!(cases.len() as u64, u64::from(last - first) + 1);
        }
    }
});
