//! Fuzz test for fragment planning and the split transform
//!
//! Any payload, key and thread count must either be rejected cleanly or
//! produce a plan whose fragmented transform equals the single-pass one.

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use xorshard_core::{plan_fragments, split_fragments, transform_in_place, xor_range};

#[derive(Debug, Arbitrary)]
struct Input {
    threads: u16,
    key: Vec<u8>,
    data: Vec<u8>,
}

fuzz_target!(|input: Input| {
    let threads = usize::from(input.threads);

    let plan = match plan_fragments(input.data.len(), threads) {
        Ok(plan) => plan,
        Err(_) => {
            assert!(input.data.is_empty() || threads == 0);
            return;
        }
    };

    assert_eq!(plan.len(), threads);
    assert_eq!(plan.iter().map(|f| f.len()).sum::<usize>(), input.data.len());

    let mut split = input.data.clone();
    let fragments = match split_fragments(&mut split, &input.key, &plan) {
        Ok(fragments) => fragments,
        Err(_) => {
            assert!(input.key.is_empty());
            return;
        }
    };
    for fragment in fragments {
        let (bytes, offset, key) = fragment.into_parts();
        xor_range(bytes, offset, key);
    }

    let mut whole = input.data.clone();
    transform_in_place(&mut whole, &input.key);
    assert_eq!(split, whole);
});
