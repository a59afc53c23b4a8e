#![no_main]
use libfuzzer_sys::fuzz_target;
use oximerge::whole;

fuzz_target!(|data: &[u8]| {
    // Whole-state decoding of arbitrary bytes must never panic — only
    // return errors.  Anything that does decode must satisfy the
    // structural invariants.
    if let Ok(state) = whole::decode_whole(data) {
        state.validate(None).unwrap();
    }
});
