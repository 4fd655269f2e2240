#![no_main]

use libfuzzer_sys::fuzz_target;
use regwatch::{ValueType, codec};

fuzz_target!(|data: (u8, &[u8])| {
    let (code, bytes) = data;
    let Some(ty) = ValueType::from_code(u32::from(code % 12)) else {
        return;
    };

    // Decoding arbitrary stored bytes should never panic
    let Ok(value) = codec::decode(bytes, ty) else {
        return;
    };
    let _ = format!("{value}");
    let _ = format!("{value:?}");

    // A decoded value re-encodes under its own type and decodes the same
    let encoded = codec::encode(&value, ty).expect("decoded value must re-encode");
    let again = codec::decode(&encoded, ty).expect("re-encoded value must decode");
    assert!(codec::equals(&value, &again, ty), "decode/encode drifted for {ty}");
});
