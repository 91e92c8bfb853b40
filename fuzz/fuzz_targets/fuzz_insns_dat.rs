#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Fuzz the whole generator pipeline — reader, expanders, byte-code
    // compiler, pool, disassembly index.  Must never panic, only return
    // Ok/Err.
    let _ = oxasm_tables::generate(data, "fuzz.dat");
});
