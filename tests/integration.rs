// Integration tests exercising real named shared-memory segments: two
// independent mappings of one segment in a single process, standing in for
// the owner and peer processes.

use std::sync::atomic::{AtomicU64, Ordering};

use shmring::{
    IndexMode, RingConfig, Role, Segment, SegmentError, SyncMode, WouldOverflow, pop_with_retry,
    push_with_retry,
};

// Unique name per test so parallel test threads never collide on a segment.
fn unique_name(tag: &str) -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let id = COUNTER.fetch_add(1, Ordering::SeqCst);
    format!("/shmring-it-{}-{}-{}", tag, std::process::id(), id)
}

#[test]
fn two_mappings_share_one_ring() {
    let name = unique_name("pair");
    let owner = Segment::create(&name, 100, RingConfig::default()).unwrap();
    let peer = Segment::attach(&name).unwrap();

    // Producer side pushes through one mapping, consumer pops through the
    // other; the indices travel through the shared header.
    let producer = peer.ring();
    let consumer = owner.ring();

    producer.push(b"over the wall").unwrap();
    assert_eq!(consumer.used(), 13);

    let mut out = [0u8; 13];
    consumer.pop(&mut out).unwrap();
    assert_eq!(&out, b"over the wall");
    assert!(producer.is_empty());

    peer.destroy().unwrap();
    owner.destroy().unwrap();
}

#[test]
fn records_cross_the_wrap_boundary_between_mappings() {
    let name = unique_name("wrap");
    let owner = Segment::create(&name, 16, RingConfig::default()).unwrap();
    let peer = Segment::attach(&name).unwrap();

    let producer = owner.ring();
    let consumer = peer.ring();

    // Park the indices at 12, then push a record that must split 4 + 4.
    producer.push(&[0u8; 12]).unwrap();
    let mut sink = [0u8; 12];
    consumer.pop(&mut sink).unwrap();

    let record: Vec<u8> = (100..108).collect();
    producer.push(&record).unwrap();
    assert_eq!(producer.tail(), 4);

    let mut out = [0u8; 8];
    consumer.pop(&mut out).unwrap();
    assert_eq!(&out[..], &record[..]);

    peer.destroy().unwrap();
    owner.destroy().unwrap();
}

#[test]
fn peer_inherits_modes_from_header() {
    let name = unique_name("modes");
    let config = RingConfig {
        sync: SyncMode::SpinLocked,
        index: IndexMode::PowerOfTwoMask,
        fenced: true,
    };
    let owner = Segment::create(&name, 100, config).unwrap();
    let peer = Segment::attach(&name).unwrap();

    // The peer passed no config; it reads what the owner resolved.
    assert_eq!(peer.ring().config(), config);
    assert_eq!(peer.ring().capacity(), 128);

    peer.destroy().unwrap();
    owner.destroy().unwrap();
}

#[test]
fn create_or_attach_maps_roles() {
    let name = unique_name("roles");
    let config = RingConfig::default();

    let owner = Segment::create_or_attach(&name, 64, config, Role::Owner).unwrap();
    let peer = Segment::create_or_attach(&name, 0, config, Role::Peer).unwrap();
    assert_eq!(owner.role(), Role::Owner);
    assert_eq!(peer.role(), Role::Peer);
    assert_eq!(peer.ring().capacity(), 64);

    peer.destroy().unwrap();
    owner.destroy().unwrap();
}

#[test]
fn owner_teardown_then_recreate_is_fresh() {
    let name = unique_name("fresh");
    let owner = Segment::create(&name, 128, RingConfig::default()).unwrap();
    owner.ring().push(&[42u8; 100]).unwrap();
    owner.destroy().unwrap();

    let reborn = Segment::create(&name, 128, RingConfig::default()).unwrap();
    let ring = reborn.ring();
    assert_eq!(ring.used(), 0);
    assert_eq!(ring.head(), 0);
    assert_eq!(ring.tail(), 0);
    reborn.destroy().unwrap();
}

#[test]
fn spsc_stream_between_mappings() {
    let name = unique_name("stream");
    let owner = Segment::create(&name, 4096, RingConfig::default()).unwrap();
    let peer = Segment::attach(&name).unwrap();

    const RECORD: usize = 64;
    const COUNT: u32 = 5_000;

    let producer = std::thread::spawn(move || {
        let ring = peer.ring();
        let mut record = [0u8; RECORD];
        for i in 0..COUNT {
            record[..4].copy_from_slice(&i.to_le_bytes());
            push_with_retry(&ring, &record, None).unwrap();
        }
        peer.destroy().unwrap();
    });

    let ring = owner.ring();
    let mut out = [0u8; RECORD];
    for i in 0..COUNT {
        pop_with_retry(&ring, &mut out, None).unwrap();
        assert_eq!(u32::from_le_bytes(out[..4].try_into().unwrap()), i);
    }

    producer.join().unwrap();
    assert!(ring.is_empty());
    owner.destroy().unwrap();
}

#[test]
fn spinlocked_producers_across_mappings_do_not_tear() {
    let name = unique_name("locked");
    let config = RingConfig {
        sync: SyncMode::SpinLocked,
        ..RingConfig::default()
    };
    let owner = Segment::create(&name, 512, config).unwrap();

    const RECORD: usize = 32;
    const PER_PRODUCER: usize = 400;

    let producers: Vec<_> = [0xAAu8, 0xBB]
        .into_iter()
        .map(|fill| {
            let name = name.clone();
            std::thread::spawn(move || {
                // Each producer gets its own mapping, as a real process would.
                let seg = Segment::attach(&name).unwrap();
                let ring = seg.ring();
                let record = [fill; RECORD];
                let mut sent = 0;
                while sent < PER_PRODUCER {
                    if ring.push(&record).is_ok() {
                        sent += 1;
                    } else {
                        std::thread::yield_now();
                    }
                }
                seg.destroy().unwrap();
            })
        })
        .collect();

    let ring = owner.ring();
    let mut out = [0u8; RECORD];
    let mut counts = [0usize; 2];
    for _ in 0..2 * PER_PRODUCER {
        pop_with_retry(&ring, &mut out, None).unwrap();
        // A torn record would mix the two fill patterns.
        assert!(out.iter().all(|&b| b == out[0]));
        match out[0] {
            0xAA => counts[0] += 1,
            0xBB => counts[1] += 1,
            other => panic!("unexpected fill byte {:#x}", other),
        }
    }
    assert_eq!(counts, [PER_PRODUCER, PER_PRODUCER]);

    for p in producers {
        p.join().unwrap();
    }
    owner.destroy().unwrap();
}

#[test]
fn overflow_rejection_is_stable_across_mappings() {
    let name = unique_name("reject");
    let owner = Segment::create(&name, 10, RingConfig::default()).unwrap();
    let peer = Segment::attach(&name).unwrap();

    owner.ring().push(&[1u8; 6]).unwrap();
    assert_eq!(peer.ring().push(&[2u8; 4]), Err(WouldOverflow));
    assert_eq!(peer.ring().used(), 6);

    peer.destroy().unwrap();
    owner.destroy().unwrap();
}

#[test]
fn attach_without_owner_times_out_distinctly() {
    let name = unique_name("orphan");
    let err = Segment::attach(&name).unwrap_err();
    assert!(matches!(err, SegmentError::HandshakeTimedOut));
}
