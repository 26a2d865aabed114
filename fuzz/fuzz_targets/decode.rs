#![no_main]
use libfuzzer_sys::fuzz_target;

const KEY: &str = "aabc";

// Decode must never panic on attacker-controlled bytes, regardless of
// whether they happen to carry a valid signature.
fuzz_target!(|data: &[u8]| {
    let _ = rndc::decode(KEY, data);
});
