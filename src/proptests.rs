// src/proptests.rs

//! Model check: arbitrary push/pop interleavings against a VecDeque.

use std::collections::VecDeque;

use proptest::prelude::*;

use crate::ring::testutil::TestRing;
use crate::ring::{IndexMode, RingConfig};

#[derive(Debug, Clone)]
enum Op {
    Push(Vec<u8>),
    Pop(usize),
}

fn ops(max_len: usize) -> impl Strategy<Value = Vec<Op>> {
    let op = prop_oneof![
        proptest::collection::vec(any::<u8>(), 0..max_len).prop_map(Op::Push),
        (0..max_len).prop_map(Op::Pop),
    ];
    proptest::collection::vec(op, 1..200)
}

fn check(requested: u32, config: RingConfig, ops: Vec<Op>) {
    let test = TestRing::new(requested, config);
    let ring = test.ring();
    let capacity = ring.capacity();
    let mut model: VecDeque<u8> = VecDeque::new();

    for op in ops {
        match op {
            Op::Push(bytes) => {
                let head = ring.head();
                let tail = ring.tail();
                let accepted = ring.push(&bytes).is_ok();
                let fits = !bytes.is_empty()
                    && capacity as usize - model.len() > bytes.len();

                if bytes.is_empty() {
                    assert!(accepted);
                } else {
                    assert_eq!(accepted, fits);
                }
                if accepted {
                    model.extend(bytes.iter());
                } else {
                    // Rejection is observable-mutation-free.
                    assert_eq!(ring.head(), head);
                    assert_eq!(ring.tail(), tail);
                }
            }
            Op::Pop(len) => {
                let mut out = vec![0u8; len];
                let head = ring.head();
                let tail = ring.tail();
                let accepted = ring.pop(&mut out).is_ok();

                if len == 0 {
                    assert!(accepted);
                } else {
                    assert_eq!(accepted, model.len() >= len);
                }
                if accepted {
                    for byte in out {
                        assert_eq!(byte, model.pop_front().unwrap());
                    }
                } else {
                    assert_eq!(ring.head(), head);
                    assert_eq!(ring.tail(), tail);
                }
            }
        }

        // Occupancy invariants hold at every step.
        assert_eq!(ring.used() as usize, model.len());
        assert!(ring.used() <= capacity - 1);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn plain_modulo_matches_model(ops in ops(24)) {
        check(50, RingConfig::default(), ops);
    }

    #[test]
    fn pow2_mask_matches_model(ops in ops(24)) {
        let config = RingConfig { index: IndexMode::PowerOfTwoMask, ..RingConfig::default() };
        check(50, config, ops);
    }

    #[test]
    fn fifo_bytes_survive_interleaving(records in proptest::collection::vec(
        proptest::collection::vec(any::<u8>(), 1..16), 1..40))
    {
        let test = TestRing::new(64, RingConfig::default());
        let ring = test.ring();
        let mut expected: VecDeque<Vec<u8>> = VecDeque::new();

        for record in records {
            while ring.push(&record).is_err() {
                let want = expected.pop_front().unwrap();
                let mut out = vec![0u8; want.len()];
                ring.pop(&mut out).unwrap();
                prop_assert_eq!(out, want);
            }
            expected.push_back(record);
        }

        while let Some(want) = expected.pop_front() {
            let mut out = vec![0u8; want.len()];
            ring.pop(&mut out).unwrap();
            prop_assert_eq!(out, want);
        }
        prop_assert!(ring.is_empty());
    }
}
