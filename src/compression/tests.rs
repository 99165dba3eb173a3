// In: src/compression/tests.rs

use super::permutations::{self, PermutationCache};
use super::*;
use crate::sub_block::ppm::{PpmChannel, PpmSubBlock, CHANNELS};
use crate::types::word::DataFormat;
use rand::Rng;

//==================================================================================
// Helpers
//==================================================================================

fn compressed(format: DataFormat, seqno: u32) -> PpmSubBlock {
    let mut sub = PpmSubBlock::new();
    sub.set_ppm_header(1, format, seqno, 2, 7, 5, 1);
    sub
}

fn channel(lut: u32, bcid_lut: u32, fadc: [u32; 5]) -> PpmChannel {
    PpmChannel {
        lut: vec![lut],
        bcid_lut: vec![bcid_lut],
        fadc: fadc.to_vec(),
        bcid_fadc: vec![0; 5],
    }
}

/// Packs `sub`, writes it out and unpacks the words into a fresh sub-block
/// with the same settings.
fn round_trip(sub: &mut PpmSubBlock) -> PpmSubBlock {
    assert!(sub.pack(), "pack failed: {:?}", sub.core().unpack_error());
    let mut words = Vec::new();
    sub.core().write(&mut words);

    let mut out = PpmSubBlock::new();
    out.set_pedestal(sub.pedestal());
    out.set_fadc_baseline(sub.fadc_baseline());
    out.set_fadc_threshold(sub.fadc_threshold());
    assert_eq!(out.core_mut().read(&words), words.len());
    assert!(out.unpack(), "unpack failed: {:?}", out.core().unpack_error());
    out
}

/// Random channel within the field widths. `tie_trigger` keeps the triggered
/// FADC BCID equal to the low LUT BCID bit, which V00 and V01 do not transmit.
fn random_channel<R: Rng>(rng: &mut R, tie_trigger: bool) -> PpmChannel {
    let mut data = PpmChannel::zeroed(1, 5);
    match rng.random_range(0..4) {
        // Quiet channel around the usual pedestal.
        0 => {
            for f in data.fadc.iter_mut() {
                *f = rng.random_range(18..26);
            }
        }
        // Small pulse with a peak-finder LUT.
        1 => {
            data.lut[0] = rng.random_range(0..8);
            data.bcid_lut[0] = 4;
            for f in data.fadc.iter_mut() {
                *f = rng.random_range(15..31);
            }
        }
        // Anything goes.
        _ => {
            data.lut[0] = rng.random_range(0..256);
            data.bcid_lut[0] = rng.random_range(0..8);
            for (f, b) in data.fadc.iter_mut().zip(data.bcid_fadc.iter_mut()) {
                *f = rng.random_range(0..1024);
                *b = rng.random_range(0..2);
            }
        }
    }
    if tie_trigger {
        data.bcid_fadc[2] = data.bcid_lut[0] & 0x1;
    }
    data
}

fn assert_same_channels(a: &PpmSubBlock, b: &PpmSubBlock) {
    for chan in 0..CHANNELS {
        assert_eq!(a.ppm_data(chan), b.ppm_data(chan), "channel {}", chan);
    }
}

//==================================================================================
// 1. Round Trips
//==================================================================================

#[test]
fn test_v00_random_round_trip() {
    let mut rng = rand::rng();
    for _ in 0..20 {
        let mut sub = compressed(DataFormat::Compressed, 0);
        for chan in 0..CHANNELS {
            sub.fill_ppm_data(chan, &random_channel(&mut rng, true));
        }
        let out = round_trip(&mut sub);
        assert_same_channels(&sub, &out);
    }
}

#[test]
fn test_v01_random_round_trip() {
    let mut rng = rand::rng();
    for _ in 0..20 {
        let mut sub = compressed(DataFormat::Compressed, 1);
        for chan in 0..CHANNELS {
            sub.fill_ppm_data(chan, &random_channel(&mut rng, true));
        }
        let out = round_trip(&mut sub);
        assert_same_channels(&sub, &out);
    }
}

#[test]
fn test_v02_random_round_trip_any_bcid() {
    let mut rng = rand::rng();
    for _ in 0..20 {
        let mut sub = compressed(DataFormat::Compressed, 2);
        sub.set_fadc_baseline(rng.random_range(0..40));
        for chan in 0..CHANNELS {
            sub.fill_ppm_data(chan, &random_channel(&mut rng, false));
        }
        let out = round_trip(&mut sub);
        assert_same_channels(&sub, &out);
    }
}

#[test]
fn test_flat_channel_in_pedestal_window() {
    // V00 places the window by pedestal.
    let mut sub = compressed(DataFormat::Compressed, 0);
    sub.set_pedestal(20);
    sub.fill_ppm_data(0, &channel(0, 0, [20; 5]));
    let out = round_trip(&mut sub);
    assert_eq!(out.ppm_data(0).fadc, vec![20; 5]);
    assert_eq!(out.comp_stats().count(0), 1);

    // V01 and V02 have a dedicated format for constant channels.
    for seqno in [1, 2] {
        let mut sub = compressed(DataFormat::Compressed, seqno);
        for chan in 0..CHANNELS {
            sub.fill_ppm_data(chan, &channel(0, 0, [20; 5]));
        }
        let out = round_trip(&mut sub);
        assert_eq!(out.comp_stats().count(6), CHANNELS as u32);
        assert_eq!(out.ppm_data(63).fadc, vec![20; 5]);
    }
}

#[test]
fn test_near_flat_channel_uses_small_format() {
    let samples = [20, 21, 20, 22, 20];
    let mut v01 = compressed(DataFormat::Compressed, 1);
    v01.fill_ppm_data(0, &channel(0, 0, samples));
    let out = round_trip(&mut v01);
    assert_eq!(out.ppm_data(0).fadc, samples.to_vec());
    assert_eq!(out.comp_stats().count(0), 1);

    let mut v02 = compressed(DataFormat::Compressed, 2);
    v02.set_fadc_baseline(10);
    v02.fill_ppm_data(0, &channel(0, 0, samples));
    let out = round_trip(&mut v02);
    assert_eq!(out.ppm_data(0).fadc, samples.to_vec());
    assert_eq!(out.comp_stats().count(0), 1);
}

//==================================================================================
// 2. Format Selection
//==================================================================================

#[test]
fn test_format_selection_v01() {
    let cases = [
        (channel(0, 0, [20, 21, 20, 22, 20]), 0),
        (channel(0, 0, [20, 27, 20, 22, 20]), 1),
        (channel(5, 4, [20, 30, 25, 20, 21]), 2),
        (channel(100, 0, [20, 60, 40, 30, 20]), 3),
        (channel(100, 0, [20, 200, 40, 30, 20]), 4),
        (channel(100, 0, [20, 900, 40, 30, 20]), 5),
        (channel(0, 0, [300, 310, 305, 302, 301]), 5),
        (channel(0, 0, [37; 5]), 6),
    ];
    for (data, format) in cases {
        let mut sub = compressed(DataFormat::Compressed, 1);
        sub.fill_ppm_data(0, &data);
        let out = round_trip(&mut sub);
        assert_eq!(out.ppm_data(0), data, "format {}", format);
        // The 63 empty channels are constant zero.
        assert_eq!(out.comp_stats().count(6), 63 + (format == 6) as u32);
        assert_eq!(out.comp_stats().count(format), 1 + 63 * (format == 6) as u32);
        assert_eq!(sub.comp_stats(), out.comp_stats());
    }
}

#[test]
fn test_v00_has_no_constant_format() {
    let mut sub = compressed(DataFormat::Compressed, 0);
    let out = round_trip(&mut sub);
    assert_eq!(out.comp_stats().counts().len(), 6);
    assert_eq!(out.comp_stats().total(), CHANNELS as u32);
    assert_eq!(out.comp_stats().count(6), 0);
}

#[test]
fn test_v02_unexpected_trigger_bcid_forces_all_bcids() {
    let mut data = channel(0, 0, [20, 21, 20, 22, 20]);
    data.bcid_fadc = vec![0, 0, 1, 0, 0];
    let mut sub = compressed(DataFormat::Compressed, 2);
    sub.set_fadc_baseline(10);
    sub.fill_ppm_data(0, &data);
    let out = round_trip(&mut sub);
    assert_eq!(out.ppm_data(0), data);
    assert_eq!(out.comp_stats().count(3), 1);
}

#[test]
fn test_packing_is_deterministic() {
    let mut rng = rand::rng();
    let mut sub = compressed(DataFormat::Compressed, 2);
    for chan in 0..CHANNELS {
        sub.fill_ppm_data(chan, &random_channel(&mut rng, false));
    }
    assert!(sub.pack());
    let first = sub.core().payload().to_vec();
    assert!(sub.pack());
    assert_eq!(sub.core().payload(), first.as_slice());
}

#[test]
fn test_streamed_words_keep_top_bit_clear() {
    let mut rng = rand::rng();
    let mut sub = compressed(DataFormat::Compressed, 2);
    for chan in 0..CHANNELS {
        sub.fill_ppm_data(chan, &random_channel(&mut rng, false));
    }
    assert!(sub.pack());
    assert!(sub.core().payload().iter().all(|&w| w & 0x8000_0000 == 0));
}

//==================================================================================
// 3. Super-Compression & Pin Errors
//==================================================================================

#[test]
fn test_super_compressed_skips_absent_channels() {
    let mut sparse = compressed(DataFormat::SuperCompressed, 2);
    let mut dense = compressed(DataFormat::Compressed, 2);
    let pulse = channel(40, 4, [22, 60, 140, 80, 30]);
    for sub in [&mut sparse, &mut dense] {
        sub.fill_ppm_data(5, &pulse);
        sub.fill_ppm_data(49, &pulse);
    }
    let out = round_trip(&mut sparse);
    assert!(dense.pack());
    assert!(sparse.core().data_words() < dense.core().data_words());
    assert_eq!(out.comp_stats().total(), 2);
    assert_eq!(out.ppm_data(5), pulse);
    assert_eq!(out.ppm_data(49), pulse);
    assert_eq!(out.ppm_data(6), PpmChannel::zeroed(1, 5));
}

#[test]
fn test_super_compressed_threshold() {
    let mut sub = compressed(DataFormat::SuperCompressed, 0);
    sub.set_fadc_threshold(25);
    sub.fill_ppm_data(0, &channel(0, 0, [20, 21, 24, 22, 20]));
    sub.fill_ppm_data(1, &channel(0, 0, [20, 21, 25, 22, 20]));
    assert!(!v02::channel_present(&sub.ppm_data(0), 25));
    assert!(v02::channel_present(&sub.ppm_data(1), 25));

    let out = round_trip(&mut sub);
    assert_eq!(out.comp_stats().total(), 1);
    assert_eq!(out.ppm_data(0).fadc, vec![0; 5]);
    assert_eq!(out.ppm_data(1).fadc, vec![20, 21, 25, 22, 20]);
}

#[test]
fn test_pin_errors_round_trip() {
    for seqno in [1, 2] {
        let mut sub = compressed(DataFormat::Compressed, seqno);
        sub.fill_ppm_pin_error(3, 0x7ff);
        sub.fill_ppm_pin_error(9, 0x010);
        sub.fill_ppm_pin_error(12, 0x400);
        let out = round_trip(&mut sub);
        for pin in 0..GLINK_PINS {
            assert_eq!(out.ppm_pin_error(pin), sub.ppm_pin_error(pin), "pin {}", pin);
        }
    }
}

#[test]
fn test_v00_drops_pin_errors() {
    let mut sub = compressed(DataFormat::Compressed, 0);
    sub.fill_ppm_pin_error(3, 0x7ff);
    let out = round_trip(&mut sub);
    assert_eq!(out.ppm_pin_error(3), 0);
}

//==================================================================================
// 4. Failure Modes
//==================================================================================

#[test]
fn test_wrong_slice_counts_are_rejected() {
    let mut sub = PpmSubBlock::new();
    sub.set_ppm_header(1, DataFormat::Compressed, 1, 0, 0, 7, 1);
    assert!(!sub.pack());
    assert_eq!(
        sub.core().unpack_error(),
        Some(UnpackErrorKind::CompressionSlices)
    );
}

#[test]
fn test_unknown_compression_version_is_rejected() {
    let mut sub = compressed(DataFormat::Compressed, 3);
    assert!(!sub.pack());
    assert_eq!(
        sub.core().unpack_error(),
        Some(UnpackErrorKind::CompressionVersion)
    );
}

#[test]
fn test_truncated_compressed_payload() {
    let mut rng = rand::rng();
    let mut sub = compressed(DataFormat::Compressed, 1);
    for chan in 0..CHANNELS {
        sub.fill_ppm_data(chan, &random_channel(&mut rng, true));
    }
    assert!(sub.pack());
    let mut words = Vec::new();
    sub.core().write(&mut words);
    words.truncate(words.len() / 2);

    let mut out = PpmSubBlock::new();
    out.core_mut().read(&words);
    assert!(!out.unpack());
    assert_eq!(out.core().unpack_error(), Some(UnpackErrorKind::DataTruncated));
}

//==================================================================================
// 5. Statistics & Versions
//==================================================================================

#[test]
fn test_version_seqno_mapping() {
    for version in [
        CompressionVersion::V00,
        CompressionVersion::V01,
        CompressionVersion::V02,
    ] {
        assert_eq!(CompressionVersion::from_seqno(version.seqno()), Some(version));
    }
    assert_eq!(CompressionVersion::from_seqno(3), None);
    assert_eq!(CompressionVersion::V00.formats(), 6);
    assert_eq!(CompressionVersion::V02.formats(), 7);
}

#[test]
fn test_stats_merge_and_serialize() {
    let mut a = CompressionStats::new(6);
    a.record(0);
    a.record(3);
    let mut b = CompressionStats::new(7);
    b.record(6);
    b.record(3);
    a.merge(&b);
    assert_eq!(a.counts(), &[1, 0, 0, 2, 0, 0, 1]);
    assert_eq!(a.total(), 4);

    let json = serde_json::to_string(&a).unwrap();
    let back: CompressionStats = serde_json::from_str(&json).unwrap();
    assert_eq!(back, a);
}

//==================================================================================
// 6. Sorted-Delta Encoding (experimental)
//==================================================================================

/// Sorting the samples first makes every delta non-negative and usually
/// smaller; the order is recoverable from a single permutation code.
#[test]
fn test_sorted_delta_encoding() {
    let cache = PermutationCache::new();
    let mut rng = rand::rng();
    for _ in 0..100 {
        let samples: Vec<u32> = (0..5).map(|_| rng.random_range(0..1024)).collect();
        let order = permutations::sort_order(&samples);
        let code = cache.sort_code(&samples);
        assert!(code < permutations::total(5));

        let sorted = permutations::apply(&samples, &order);
        let deltas: Vec<u32> = sorted.windows(2).map(|w| w[1] - w[0]).collect();

        let mut rebuilt = vec![sorted[0]];
        for d in &deltas {
            let last = rebuilt[rebuilt.len() - 1];
            rebuilt.push(last + d);
        }
        let decoded_order = cache.vector(code, 5).unwrap();
        assert_eq!(permutations::unapply(&rebuilt, &decoded_order), samples);
    }
}
