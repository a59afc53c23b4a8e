#![no_main]
use libfuzzer_sys::fuzz_target;
use oximerge::{merge, whole};

fuzz_target!(|data: &[u8]| {
    // Split the input into two candidate deltas; whenever both decode,
    // merging must not panic, and a successful merge must produce a
    // structurally valid whole-state of the input's length.
    if data.len() < 2 {
        return;
    }
    let (left, right) = data.split_at(data.len() / 2);
    let (Ok(a), Ok(b)) = (whole::decode_whole(left), whole::decode_whole(right)) else {
        return;
    };

    if let Ok(merged) = merge::merge(&a, &b) {
        merged.validate(None).unwrap();
        assert_eq!(merged.length(), b.length());
    }
});
