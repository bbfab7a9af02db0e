//! End-to-end checks of the encode → wire → decode pipeline plus the
//! fan-out and gating behaviour around it, driven purely through the
//! public API.

use inkstream_core::delta::{self, Span};
use inkstream_core::input::{EV_ABS, TOUCH_X_AXIS};
use inkstream_core::wire::{self, FrameHeader, PIXEL_BYTES};
use inkstream_core::{
    DeltaEncoder, EventBus, EventFilter, EventSource, FrameDecoder, InputEvent, SwipeDetector,
};

// ── Helpers ──────────────────────────────────────────────────────

/// Deterministic pseudo-random bytes (64-bit LCG), so the sequence tests
/// are reproducible without a random-number dependency.
struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> u64 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        self.0
    }

    fn byte(&mut self) -> u8 {
        (self.next() >> 56) as u8
    }

    fn below(&mut self, bound: usize) -> usize {
        (self.next() % bound as u64) as usize
    }
}

fn encode(enc: &mut DeltaEncoder, frame: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    let written = enc.encode(frame, &mut out).unwrap();
    assert_eq!(written, out.len());
    out
}

fn x_event(value: i32, timestamp_us: u64) -> InputEvent {
    InputEvent {
        source: EventSource::Touch,
        event_type: EV_ABS,
        code: TOUCH_X_AXIS,
        value,
        timestamp_us,
    }
}

// ── Wire-exact scenarios ─────────────────────────────────────────

#[test]
fn first_frame_is_a_zstd_full_frame() {
    let mut enc = DeltaEncoder::new().unwrap();
    let out = encode(&mut enc, &vec![0u8; 1600]);

    let header = FrameHeader::decode(&out).unwrap();
    assert_eq!(header.kind, wire::FRAME_FULL_ZSTD);
    assert_eq!(out[3], 0, "payload fits in two length bytes");
    assert_eq!(header.payload_len, out.len() - 4);
    assert_eq!(zstd::decode_all(&out[4..]).unwrap(), vec![0u8; 1600]);
}

#[test]
fn unchanged_frame_costs_exactly_four_bytes() {
    let mut enc = DeltaEncoder::new().unwrap();
    let frame = vec![0u8; 1600];
    encode(&mut enc, &frame);
    assert_eq!(encode(&mut enc, &frame), vec![0x01, 0x00, 0x00, 0x00]);
}

#[test]
fn single_pixel_change_wire_bytes() {
    let mut enc = DeltaEncoder::new().unwrap();
    let frame = vec![0u8; 1600];
    encode(&mut enc, &frame);

    let mut changed = frame.clone();
    changed[0..4].fill(0xFF);
    assert_eq!(
        encode(&mut enc, &changed),
        vec![0x01, 0x07, 0x00, 0x00, 0x01, 0x00, 0x00, 0xFF, 0xFF, 0xFF, 0xFF]
    );
}

#[test]
fn threshold_crossing_emits_compressed_full() {
    let mut enc = DeltaEncoder::with_threshold(0.10).unwrap();
    let frame = vec![0u8; 400];
    encode(&mut enc, &frame);

    let mut changed = frame.clone();
    changed[..200].fill(0xFF);
    let out = encode(&mut enc, &changed);
    assert_eq!(out[0], wire::FRAME_FULL_ZSTD);
}

#[test]
fn deep_offset_long_run_decodes_back() {
    let mut enc = DeltaEncoder::new().unwrap();
    let mut dec = FrameDecoder::new();

    let frame = vec![0u8; 80_000];
    dec.apply(&encode(&mut enc, &frame)).unwrap();

    let mut changed = frame.clone();
    changed[70_000..70_800].fill(0xEE);
    let out = encode(&mut enc, &changed);

    let run = wire::decode_run_header(&out[4..]).unwrap();
    assert!(out[4] & 0x80 != 0, "long run must set the high bit");
    assert_eq!(run.pixel_count, 200);
    assert_eq!(run.relative_offset, 70_000);

    assert_eq!(dec.apply(&out).unwrap(), changed.as_slice());
}

// ── Round trip over frame sequences ──────────────────────────────

#[test]
fn random_sequence_reconstructs_exactly() {
    const FRAME: usize = 1600;
    let mut rng = Lcg(0xDEC0DE);
    let mut enc = DeltaEncoder::new().unwrap();
    let mut dec = FrameDecoder::new();

    let mut frame = vec![0u8; FRAME];
    for round in 0..100 {
        match round % 5 {
            // Sparse scribble: a few random pixels.
            0 | 1 | 2 => {
                for _ in 0..rng.below(8) {
                    let pixel = rng.below(FRAME / 4);
                    for b in &mut frame[pixel * 4..pixel * 4 + 4] {
                        *b = rng.byte();
                    }
                }
            }
            // Page turn: everything changes.
            3 => frame.iter_mut().for_each(|b| *b = rng.byte()),
            // Nothing happens.
            _ => {}
        }

        let out = encode(&mut enc, &frame);
        assert_eq!(
            dec.apply(&out).unwrap(),
            frame.as_slice(),
            "mirror diverged at round {round}"
        );
    }
}

#[test]
fn emission_never_exceeds_the_cheaper_encoding() {
    // Full-entropy baseline: zstd cannot beat a sparse delta here, so the
    // emitted frame must meet the 4 + min(delta, zstd) bound exactly.
    const FRAME: usize = 1600;
    let mut rng = Lcg(0xBEEF);
    let mut enc = DeltaEncoder::new().unwrap();

    let mut previous: Vec<u8> = (0..FRAME).map(|_| rng.byte()).collect();
    encode(&mut enc, &previous);

    for _ in 0..50 {
        let mut current = previous.clone();
        for _ in 0..1 + rng.below(40) {
            let pixel = rng.below(FRAME / 4);
            for b in &mut current[pixel * 4..pixel * 4 + 4] {
                *b = rng.byte();
            }
        }

        let mut spans = Vec::new();
        delta::scan_spans(&previous, &current, &mut spans);
        let delta_size = delta::delta_wire_size(&spans);
        let zstd_size = zstd::bulk::compress(&current, 1).unwrap().len();

        let out = encode(&mut enc, &current);
        assert!(
            out.len() <= 4 + delta_size.min(zstd_size),
            "emitted {} > 4 + min(delta {delta_size}, zstd {zstd_size})",
            out.len()
        );
        previous = current;
    }
}

#[test]
fn emitted_runs_are_pixel_aligned() {
    const FRAME: usize = 4096;
    let mut rng = Lcg(7);
    let mut enc = DeltaEncoder::new().unwrap();

    let mut frame = vec![0u8; FRAME];
    encode(&mut enc, &frame);

    for _ in 0..30 {
        // Byte-granular mutations, deliberately unaligned.
        for _ in 0..1 + rng.below(6) {
            let at = rng.below(FRAME);
            frame[at] = rng.byte();
        }

        let out = encode(&mut enc, &frame);
        if out[0] != wire::FRAME_DELTA {
            continue;
        }

        let payload = &out[4..];
        let mut cursor = 0usize;
        let mut pos = 0usize;
        while pos < payload.len() {
            let run = wire::decode_run_header(&payload[pos..]).unwrap();
            let start = cursor + run.relative_offset;
            assert_eq!(start % PIXEL_BYTES, 0, "run start must be pixel-aligned");
            let len = run.pixel_count * PIXEL_BYTES;
            cursor = start + len;
            pos += run.header_len + len;
        }
        assert_eq!(pos, payload.len(), "payload must be exactly consumed");
    }
}

#[test]
fn oversized_regions_chunk_and_still_roundtrip() {
    // A contiguous change longer than one run's 15-bit pixel field.
    const FRAME: usize = 40_000 * PIXEL_BYTES + 4096;
    let mut enc = DeltaEncoder::with_threshold(1.0).unwrap();
    let mut dec = FrameDecoder::new();

    let frame = vec![0u8; FRAME];
    dec.apply(&encode(&mut enc, &frame)).unwrap();

    let mut changed = frame.clone();
    changed[..40_000 * PIXEL_BYTES].fill(0x3C);
    let out = encode(&mut enc, &changed);

    let expected = delta::delta_wire_size(&[Span {
        start: 0,
        end: 40_000 * PIXEL_BYTES,
    }]);
    if out[0] == wire::FRAME_DELTA {
        assert_eq!(out.len(), 4 + expected);
    }
    assert_eq!(dec.apply(&out).unwrap(), changed.as_slice());
}

// ── Bus timing and gesture flow ──────────────────────────────────

#[test]
fn publish_stays_fast_with_a_stuck_subscriber() {
    let bus = EventBus::new();
    let _stuck = bus.subscribe(None); // never drained

    let event = x_event(0, 0);
    for _ in 0..1_000 {
        let start = std::time::Instant::now();
        bus.publish(event);
        assert!(
            start.elapsed() < std::time::Duration::from_millis(10),
            "publish must complete in bounded time"
        );
    }
    assert!(bus.dropped_events() > 0);
}

#[tokio::test]
async fn swipes_flow_from_bus_to_detector() {
    let bus = EventBus::new();
    let mut touch_abs = bus.subscribe(Some(EventFilter {
        source: Some(EventSource::Touch),
        event_type: Some(EV_ABS),
    }));

    // Scenario: 100, 110, …, 400 spaced 1 ms apart, then mirrored.
    for (i, value) in (0..=30).map(|i| 100 + i * 10).enumerate() {
        bus.publish(x_event(value, i as u64 * 1_000));
    }
    for (i, value) in (0..=30).map(|i| 400 - i * 10).enumerate() {
        bus.publish(x_event(value, 100_000 + i as u64 * 1_000));
    }

    let mut detector = SwipeDetector::new();
    let mut swipes = Vec::new();
    while let Some(event) = touch_abs.try_recv() {
        if let Some(direction) = detector.feed(&event) {
            swipes.push(direction.to_string());
        }
    }
    assert_eq!(swipes, vec!["Swipe Right", "Swipe Left"]);
}
