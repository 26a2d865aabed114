#![no_main]
use libfuzzer_sys::fuzz_target;
use rndc::{decode, encode, Packet, Table, Value};

const KEY: &str = "aabc";

// Any binary payload we construct ourselves must encode and then decode
// back out intact.
fuzz_target!(|data: &[u8]| {
    let mut body = Table::new();
    body.insert("payload", Value::Binary(data.to_vec()));

    let packet = Packet::new(Some(1), body).expect("a binary payload always constructs");
    let wire = encode(KEY, &packet).expect("encoding our own packet cannot fail");
    let decoded = decode(KEY, &wire).expect("decoding our own output must succeed");

    assert_eq!(
        decoded.data().get("payload").and_then(Value::as_bytes),
        Some(data)
    );
});
