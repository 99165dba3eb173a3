// In: src/sub_block/tests.rs

use super::*;
use crate::error::UnpackErrorKind;
use crate::types::word::{self as header, DataFormat, SubBlockTrailer};
use rand::Rng;

//==================================================================================
// Helpers
//==================================================================================

/// Packs `block`, writes it out and reads the words back into `out`.
fn transfer<T: SubBlockCodec>(block: &mut T, out: &mut T) -> Vec<u32> {
    assert!(block.pack(), "pack failed: {:?}", block.unpack_error());
    let mut words = Vec::new();
    block.write(&mut words);
    assert_eq!(out.read(&words), words.len());
    words
}

fn random_ppm_channel<R: Rng>(rng: &mut R, slices_lut: usize, slices_fadc: usize) -> PpmChannel {
    let mut data = PpmChannel::zeroed(slices_lut, slices_fadc);
    for (lut, bcid) in data.lut.iter_mut().zip(data.bcid_lut.iter_mut()) {
        *lut = rng.random_range(0..256);
        *bcid = rng.random_range(0..8);
    }
    for (fadc, bcid) in data.fadc.iter_mut().zip(data.bcid_fadc.iter_mut()) {
        *fadc = rng.random_range(0..1024);
        *bcid = rng.random_range(0..2);
    }
    data
}

fn ppm_neutral_block<R: Rng>(rng: &mut R) -> PpmSubBlock {
    let mut ppm = PpmSubBlock::new();
    ppm.set_ppm_header(1, DataFormat::Neutral, 0, 3, 9, 5, 1);
    for chan in 0..ppm::CHANNELS {
        let data = random_ppm_channel(rng, 1, 5);
        ppm.fill_ppm_data(chan, &data);
    }
    for pin in 0..ppm::GLINK_PINS {
        ppm.fill_ppm_pin_error(pin, rng.random_range(0..0x400));
    }
    ppm.core_mut().set_bunch_crossing(0xabc);
    ppm
}

//==================================================================================
// PPM
//==================================================================================

#[test]
fn test_ppm_neutral_round_trip() {
    let mut rng = rand::rng();
    let mut ppm = ppm_neutral_block(&mut rng);
    let mut out = PpmSubBlock::new();
    transfer(&mut ppm, &mut out);

    assert!(out.unpack(), "unpack failed: {:?}", out.core().unpack_error());
    assert_eq!(out.slices_lut(), 1);
    assert_eq!(out.slices_fadc(), 5);
    assert_eq!(out.core().bunch_crossing(), 0xabc);
    assert!(out.core().parity_errors().is_empty());
    for chan in 0..ppm::CHANNELS {
        assert_eq!(out.ppm_data(chan), ppm.ppm_data(chan), "channel {}", chan);
    }
    for pin in 0..ppm::GLINK_PINS {
        assert_eq!(out.ppm_pin_error(pin), ppm.ppm_pin_error(pin), "pin {}", pin);
    }
}

#[test]
fn test_ppm_neutral_parity_flip_is_reported() {
    let mut rng = rand::rng();
    let mut ppm = ppm_neutral_block(&mut rng);
    assert!(ppm.pack());
    let mut words = Vec::new();
    ppm.core().write(&mut words);
    // Word 0 is the header and payload word 0 carries the bunch crossing;
    // bit 0 of the next word is the first data bit of pin 0.
    words[2] ^= 0x1;

    let mut out = PpmSubBlock::new();
    out.core_mut().read(&words);
    assert!(out.unpack());
    assert_eq!(out.core().parity_errors(), &[ParityError { slice: 0, pin: 0 }]);
    assert!(out.has_error(0, ppm::PpmErrorBit::GlinkPinParity));
    assert!(!out.has_error(1, ppm::PpmErrorBit::GlinkPinParity));
    assert_eq!(out.ppm_data(0).lut[0], ppm.ppm_data(0).lut[0] ^ 0x1);
    assert_eq!(out.ppm_data(1), ppm.ppm_data(1));
}

#[test]
fn test_ppm_uncompressed_round_trip() {
    let mut rng = rand::rng();
    let mut ppm = PpmSubBlock::new();
    ppm.set_ppm_header(1, DataFormat::Uncompressed, 16, 1, 4, 5, 1);
    assert_eq!(ppm.channels_per_sub_block(), 16);
    let channels: Vec<PpmChannel> = (0..16).map(|_| random_ppm_channel(&mut rng, 1, 5)).collect();
    for (i, data) in channels.iter().enumerate() {
        ppm.fill_ppm_data(16 + i, data);
    }
    let mut out = PpmSubBlock::new();
    transfer(&mut ppm, &mut out);
    // Two 16-bit data words per payload word.
    assert_eq!(out.core().data_words(), 16 * 6 / 2);
    assert!(out.unpack());
    for (i, data) in channels.iter().enumerate() {
        assert_eq!(&out.ppm_data(16 + i), data);
    }
}

#[test]
fn test_ppm_uncompressed_truncated_by_one_word() {
    let mut ppm = PpmSubBlock::new();
    ppm.set_ppm_header(1, DataFormat::Uncompressed, 0, 0, 0, 5, 1);
    let data = PpmChannel {
        lut: vec![77],
        bcid_lut: vec![4],
        fadc: vec![30, 35, 80, 40, 32],
        bcid_fadc: vec![0, 0, 1, 0, 0],
    };
    ppm.fill_ppm_data(0, &data);
    ppm.fill_ppm_data(15, &data);
    assert!(ppm.pack());
    let mut words = Vec::new();
    ppm.core().write(&mut words);
    words.pop();

    let mut out = PpmSubBlock::new();
    out.core_mut().read(&words);
    assert!(!out.unpack());
    assert_eq!(out.core().unpack_error(), Some(UnpackErrorKind::DataTruncated));
    // Slice-major order: only the last FADC slice of the last channels is lost.
    assert_eq!(out.ppm_data(0), data);
    let last = out.ppm_data(15);
    assert_eq!(last.lut, data.lut);
    assert_eq!(last.fadc[..4], data.fadc[..4]);
    assert_eq!(last.fadc[4], 0);
}

#[test]
fn test_ppm_error_block_round_trip() {
    let mut ppm = PpmSubBlock::new();
    ppm.set_ppm_error_header(1, 2, 11, 5, 1);
    assert!(PpmSubBlock::is_error_block(ppm.core().header_word()));
    // Channel 17 sits on pin 1 of ASIC 1: disabled plus MCM absent.
    ppm.fill_ppm_error(17, 0b11);
    ppm.fill_ppm_pin_error(9, ppm::TIMEOUT.put(1) | ppm::ASIC_FULL.put(1));

    let mut out = PpmSubBlock::new();
    transfer(&mut ppm, &mut out);
    assert_eq!(out.core().data_words(), 8);
    assert!(out.unpack());
    assert!(out.has_error(17, ppm::PpmErrorBit::ChannelDisabled));
    assert!(!out.has_error(1, ppm::PpmErrorBit::ChannelDisabled));
    assert!(out.has_error(1, ppm::PpmErrorBit::McmAbsent));
    assert!(out.has_error(9, ppm::PpmErrorBit::Timeout));
    assert!(out.any_error(ppm::PpmErrorBit::AsicFull));
    assert!(!out.any_error(ppm::PpmErrorBit::FpgaCorrupt));
    assert_eq!(out.ppm_pin_error(9), ppm.ppm_pin_error(9));
}

#[test]
fn test_ppm_trailer_survives_transfer() {
    let mut ppm = PpmSubBlock::new();
    ppm.set_ppm_header(1, DataFormat::Uncompressed, 0, 0, 0, 1, 1);
    ppm.core_mut().set_status(SubBlockTrailer {
        daq_overflow: true,
        failing_bcn: 5,
        ..Default::default()
    });
    let mut out = PpmSubBlock::new();
    let words = transfer(&mut ppm, &mut out);
    assert_eq!(header::word_type(*words.last().unwrap()), header::WordType::Status);
    let trailer = out.core().trailer().unwrap();
    assert!(trailer.daq_overflow);
    assert_eq!(trailer.failing_bcn, 5);
}

//==================================================================================
// CPM
//==================================================================================

fn cpm_with_tower(format: DataFormat) -> CpmSubBlock {
    let mut cpm = CpmSubBlock::new();
    cpm.set_cpm_header(1, format, 0, 2, 6, 1);
    cpm.fill_tower_data(0, 5, 10, 3, 1, 0);
    cpm
}

#[test]
fn test_cpm_tower_round_trip_both_formats() {
    for format in [DataFormat::Uncompressed, DataFormat::Neutral] {
        let mut cpm = cpm_with_tower(format);
        cpm.set_hits(0, 0x12_3456, 0xab_cdef);
        let mut out = CpmSubBlock::new();
        transfer(&mut cpm, &mut out);
        assert!(out.unpack(), "{:?}: {:?}", format, out.core().unpack_error());
        assert_eq!(out.em_data(0, 5), 10);
        assert_eq!(out.had_data(0, 5), 3);
        assert_eq!(out.em_error(0, 5), 1);
        assert_eq!(out.had_error(0, 5), 0);
        assert_eq!(out.em_data(0, 4), 0);
        assert_eq!(out.hits0(0), 0x12_3456);
        assert_eq!(out.hits1(0), 0xab_cdef);
    }
}

#[test]
fn test_cpm_uncompressed_sends_only_non_zero_words() {
    let mut cpm = cpm_with_tower(DataFormat::Uncompressed);
    assert!(cpm.pack());
    // EM and hadronic halves of channel 5 land in two tower words.
    assert_eq!(cpm.core().data_words(), 2);
}

#[test]
fn test_cpm_neutral_bunch_crossing_and_pins() {
    let mut cpm = cpm_with_tower(DataFormat::Neutral);
    cpm.core_mut().set_bunch_crossing(0xfed);
    assert!(cpm.pack());
    for pin in 0..cpm::GLINK_PINS {
        assert_eq!(cpm.core().neutral_pin_bits(pin), 84);
    }
    let mut out = CpmSubBlock::new();
    transfer(&mut cpm, &mut out);
    assert!(out.unpack());
    assert_eq!(out.core().bunch_crossing(), 0xfed);
}

#[test]
fn test_unsupported_combinations_are_rejected() {
    let mut cpm = cpm_with_tower(DataFormat::Compressed);
    assert!(!cpm.pack());
    assert_eq!(cpm.core().unpack_error(), Some(UnpackErrorKind::UnsupportedFormat));

    let mut jem = JemSubBlock::new();
    jem.set_jem_header(2, DataFormat::Neutral, 0, 0, 1, 1);
    assert!(!jem.unpack());
    assert_eq!(jem.core().unpack_error(), Some(UnpackErrorKind::UnsupportedVersion));
}

/// Re-packs a packed block under a modified header and checks the refusal
/// leaves the earlier payload in place.
fn assert_refused_pack_keeps_payload<T: SubBlockCodec>(
    block: &mut T,
    edit: impl FnOnce(&mut header::SubBlockHeader),
    kind: UnpackErrorKind,
) {
    assert!(block.pack(), "pack failed: {:?}", block.unpack_error());
    let before = block.core().payload().to_vec();
    assert!(!before.is_empty());
    let mut edited = block.core().header();
    edit(&mut edited);
    block.core_mut().set_header(edited);
    assert!(!block.pack());
    assert_eq!(block.unpack_error(), Some(kind));
    assert_eq!(block.core().payload(), &before[..]);
}

#[test]
fn test_refused_pack_keeps_payload() {
    let mut cpm = cpm_with_tower(DataFormat::Uncompressed);
    assert_refused_pack_keeps_payload(
        &mut cpm,
        |h| h.version = 2,
        UnpackErrorKind::UnsupportedVersion,
    );

    let mut cpm = cpm_with_tower(DataFormat::Neutral);
    assert_refused_pack_keeps_payload(
        &mut cpm,
        |h| h.format = DataFormat::Compressed.code(),
        UnpackErrorKind::UnsupportedFormat,
    );

    let mut rng = rand::rng();
    let mut ppm = ppm_neutral_block(&mut rng);
    assert_refused_pack_keeps_payload(
        &mut ppm,
        |h| {
            h.format = DataFormat::Compressed.code();
            h.seqno = 7;
        },
        UnpackErrorKind::CompressionVersion,
    );

    let mut ppm = ppm_neutral_block(&mut rng);
    assert_refused_pack_keeps_payload(
        &mut ppm,
        |h| {
            h.format = DataFormat::SuperCompressed.code();
            h.slices2 = 3;
        },
        UnpackErrorKind::CompressionSlices,
    );

    let mut energy = energy_block();
    assert_refused_pack_keeps_payload(
        &mut energy,
        |h| h.format = DataFormat::SuperCompressed.code(),
        UnpackErrorKind::UnsupportedFormat,
    );
}

//==================================================================================
// JEM
//==================================================================================

#[test]
fn test_jem_round_trip_both_formats() {
    let mut rng = rand::rng();
    for format in [DataFormat::Neutral, DataFormat::Uncompressed] {
        let mut jem = JemSubBlock::new();
        jem.set_jem_header(1, format, 0, 1, 3, 1);
        let elements: Vec<JetElement> = (0..jem::CHANNELS)
            .map(|channel| JetElement {
                channel,
                em_data: rng.random_range(0..512),
                had_data: rng.random_range(0..512),
                em_parity: rng.random_range(0..2),
                had_parity: rng.random_range(0..2),
                link_error: rng.random_range(0..4),
            })
            .collect();
        for element in &elements {
            jem.fill_jet_element(0, element);
        }
        jem.set_jet_hits(0, 0x76_5432);
        jem.set_energy_subsums(0, 0x11, 0x22, 0x33);

        let mut out = JemSubBlock::new();
        transfer(&mut jem, &mut out);
        assert!(out.unpack(), "{:?}: {:?}", format, out.core().unpack_error());
        for element in &elements {
            let got = out.jet_element(0, element.channel);
            if element.word() == 0 {
                assert_eq!(got.word(), 0);
            } else {
                assert_eq!(&got, element);
            }
        }
        assert_eq!(out.jet_hits(0), 0x76_5432);
        assert_eq!((out.ex(0), out.ey(0), out.et(0)), (0x11, 0x22, 0x33));
    }
}

//==================================================================================
// CMM
//==================================================================================

#[test]
fn test_cmm_cp_neutral_round_trip() {
    let mut rng = rand::rng();
    let mut cmm = CmmCpSubBlock::new();
    cmm.set_cmm_header(1, DataFormat::Neutral, 0, 2, cmm::CRATE_SUMMING, cmm::LEFT, 3);
    let mut expected = Vec::new();
    for slice in 0..3 {
        for source in 1..=cmm_cp::TOTAL {
            let (hits, error) = (rng.random_range(0..1 << 24), rng.random_range(0..2));
            cmm.set_hits(slice, source, hits, error);
            expected.push((slice, source, hits, error));
        }
    }
    cmm.core_mut().set_bunch_crossing(0x5a5);
    let mut out = CmmCpSubBlock::new();
    transfer(&mut cmm, &mut out);
    assert!(out.unpack());
    assert_eq!(out.timeslices(), 3);
    assert_eq!(out.core().bunch_crossing(), 0x5a5);
    for (slice, source, hits, error) in expected {
        assert_eq!(out.hits(slice, source), hits);
        assert_eq!(out.hits_error(slice, source), error);
    }
}

#[test]
fn test_cmm_cp_uncompressed_round_trip_and_bad_source() {
    let mut cmm = CmmCpSubBlock::new();
    cmm.set_cmm_header(1, DataFormat::Uncompressed, 0, 1, cmm::SYSTEM_SUMMING, cmm::RIGHT, 1);
    cmm.set_hits(0, 4, 0x1234, 0);
    cmm.set_hits(0, cmm_cp::LOCAL, 0xff_ffff, 1);
    let mut out = CmmCpSubBlock::new();
    transfer(&mut cmm, &mut out);
    assert_eq!(out.core().data_words(), 2);
    assert!(out.unpack());
    assert_eq!(out.hits(0, 4), 0x1234);
    assert_eq!(out.hits(0, cmm_cp::LOCAL), 0xff_ffff);
    assert_eq!(out.hits_error(0, cmm_cp::LOCAL), 1);
    assert_eq!(cmm::summing(out.core()), cmm::SYSTEM_SUMMING);

    out.core_mut().payload_mut().push(cmm::SOURCE_ID.put(25) | 0x7);
    assert!(!out.unpack());
    assert_eq!(out.core().unpack_error(), Some(UnpackErrorKind::SourceId));
}

#[test]
fn test_cmm_jet_neutral_round_trip() {
    let mut rng = rand::rng();
    let mut cmm = CmmJetSubBlock::new();
    cmm.set_cmm_header(1, DataFormat::Neutral, 0, 0, cmm::SYSTEM_SUMMING, cmm::LEFT, 2);
    for slice in 0..2 {
        for source in 0..=cmm_jet::TOTAL_MAIN {
            cmm.set_jet_hits(slice, source, rng.random_range(0..1 << 24), rng.random_range(0..2));
        }
        cmm.set_jet_hits(slice, cmm_jet::REMOTE_FORWARD, 0xbeef, 1);
        cmm.set_jet_hits(slice, cmm_jet::LOCAL_FORWARD, 0x1234, 0);
        cmm.set_jet_hits(slice, cmm_jet::TOTAL_FORWARD, 0xa55a, 0);
        cmm.set_jet_et_map(slice, 0xd);
    }
    assert!(cmm.pack());
    for pin in 0..20 {
        assert_eq!(cmm.core().neutral_pin_bits(pin), 2 * 35, "pin {}", pin);
    }
    let mut out = CmmJetSubBlock::new();
    transfer(&mut cmm, &mut out);
    assert!(out.unpack());
    for slice in 0..2 {
        for source in 0..=cmm_jet::TOTAL_FORWARD {
            assert_eq!(out.jet_hits(slice, source), cmm.jet_hits(slice, source));
            assert_eq!(out.jet_hits_error(slice, source), cmm.jet_hits_error(slice, source));
        }
        assert_eq!(out.jet_hits(slice, cmm_jet::TOTAL_FORWARD), 0xa55a);
        assert_eq!(out.jet_et_map(slice), 0xd);
    }
}

#[test]
fn test_cmm_timeslices_from_payload_when_header_is_zero() {
    let mut cmm = CmmJetSubBlock::new();
    cmm.set_cmm_header(1, DataFormat::Neutral, 0, 0, 0, 0, 2);
    cmm.set_jet_hits(1, 3, 0x77, 0);
    assert!(cmm.pack());
    let mut words = Vec::new();
    cmm.core().write(&mut words);
    words[0] = header::SLICES1.set(words[0], 0);

    let mut out = CmmJetSubBlock::new();
    out.core_mut().read(&words);
    assert_eq!(out.timeslices(), 2);
    assert!(out.unpack());
    assert_eq!(out.jet_hits(1, 3), 0x77);
}

fn energy_block() -> CmmEnergySubBlock {
    let mut cmm = CmmEnergySubBlock::new();
    cmm.set_cmm_header(1, DataFormat::Neutral, 0, 1, cmm::CRATE_SUMMING, cmm::RIGHT, 1);
    for jem in 0..16 {
        let v = jem as u32;
        cmm.set_subsums(0, jem, 0x10 + v, 0x40 + v, 0x80 + v, 0, 0, v & 1);
    }
    cmm.set_subsums(0, cmm_energy::LOCAL, 0x7abc, 0x1234, 0x2fff, 1, 0, 1);
    cmm.set_subsums(0, cmm_energy::TOTAL, 0x4321, 0x0bcd, 0x7ff0, 0, 1, 1);
    cmm.set_missing_et_hits(0, 0xa5);
    cmm.set_sum_et_hits(0, 0x3c);
    cmm
}

#[test]
fn test_cmm_energy_neutral_round_trip() {
    let mut cmm = energy_block();
    cmm.set_subsums(0, cmm_energy::REMOTE, 0x5555, 0x2aaa, 0x1234, 2, 3, 2);
    let mut out = CmmEnergySubBlock::new();
    transfer(&mut cmm, &mut out);
    assert!(out.unpack(), "{:?}", out.core().unpack_error());
    for jem in 0..16 {
        assert_eq!(out.ex(0, jem), cmm.ex(0, jem));
        assert_eq!(out.ey(0, jem), cmm.ey(0, jem));
        assert_eq!(out.et(0, jem), cmm.et(0, jem));
        assert_eq!(out.et_error(0, jem), cmm.et_error(0, jem));
    }
    for source in [cmm_energy::REMOTE, cmm_energy::LOCAL, cmm_energy::TOTAL] {
        assert_eq!(out.ex(0, source), cmm.ex(0, source));
        assert_eq!(out.ey(0, source), cmm.ey(0, source));
        assert_eq!(out.et(0, source), cmm.et(0, source));
        assert_eq!(out.ex_error(0, source), cmm.ex_error(0, source));
        assert_eq!(out.ey_error(0, source), cmm.ey_error(0, source));
        assert_eq!(out.et_error(0, source), cmm.et_error(0, source));
    }
    assert_eq!(out.missing_et_hits(0), 0xa5);
    assert_eq!(out.sum_et_hits(0), 0x3c);
    assert!(out.core().parity_errors().is_empty());
}

/// Pin 16 carries the remote sums twice: once in the JEM section, once at
/// full width. It is the only pin longer than the 35-bit slice.
#[test]
fn test_cmm_energy_remote_pin_overflows_slice_budget() {
    let mut cmm = energy_block();
    assert!(cmm.pack());
    let core = cmm.core();
    for pin in 0..20 {
        let expected = if pin == cmm_energy::REMOTE {
            cmm_energy::NEUTRAL_BITS_PER_SLICE
        } else {
            cmm_energy::NEUTRAL_PIN_BITS_PER_SLICE
        };
        assert_eq!(core.neutral_pin_bits(pin), expected, "pin {}", pin);
    }
    assert_eq!(core.data_words(), cmm_energy::NEUTRAL_BITS_PER_SLICE);
}

/// The JEM-section copy of the remote sums carries one error bit, the low
/// bit of the remote Et error, and unpacking merges it into all three.
#[test]
fn test_cmm_energy_remote_et_error_leaks_into_ex_and_ey() {
    let mut cmm = energy_block();
    cmm.set_subsums(0, cmm_energy::REMOTE, 0x0100, 0x0200, 0x0300, 0, 2, 1);
    let mut out = CmmEnergySubBlock::new();
    transfer(&mut cmm, &mut out);
    assert!(out.unpack());
    assert_eq!(out.ex_error(0, cmm_energy::REMOTE), 1);
    assert_eq!(out.ey_error(0, cmm_energy::REMOTE), 3);
    assert_eq!(out.et_error(0, cmm_energy::REMOTE), 1);
    assert_eq!(out.ex(0, cmm_energy::REMOTE), 0x0100);

    // An even Et error leaves the others alone.
    let mut cmm = energy_block();
    cmm.set_subsums(0, cmm_energy::REMOTE, 0x0100, 0x0200, 0x0300, 0, 0, 2);
    let mut out = CmmEnergySubBlock::new();
    transfer(&mut cmm, &mut out);
    assert!(out.unpack());
    assert_eq!(out.ex_error(0, cmm_energy::REMOTE), 0);
    assert_eq!(out.et_error(0, cmm_energy::REMOTE), 2);
}

#[test]
fn test_cmm_energy_uncompressed_round_trip() {
    let mut cmm = CmmEnergySubBlock::new();
    cmm.set_cmm_header(1, DataFormat::Uncompressed, 0, 1, cmm::SYSTEM_SUMMING, cmm::LEFT, 1);
    cmm.set_subsums(0, 7, 0x12, 0x34, 0x56, 1, 0, 0);
    cmm.set_subsums(0, cmm_energy::REMOTE, 0x7fff, 0x1, 0x2, 3, 0, 0);
    cmm.set_sum_et_hits(0, 0x81);
    let mut out = CmmEnergySubBlock::new();
    transfer(&mut cmm, &mut out);
    assert!(out.unpack());
    assert_eq!((out.ex(0, 7), out.ey(0, 7), out.et(0, 7)), (0x12, 0x34, 0x56));
    assert_eq!(out.et_error(0, 7), 1);
    assert_eq!(out.ex(0, cmm_energy::REMOTE), 0x7fff);
    assert_eq!(out.ex_error(0, cmm_energy::REMOTE), 3);
    assert_eq!(out.sum_et_hits(0), 0x81);
}

//==================================================================================
// RoI
//==================================================================================

#[test]
fn test_cpm_roi_round_trip() {
    let mut roi = CpmRoiSubBlock::new();
    roi.set_roi_header(1, 3, 12);
    let stored = [
        CpmRoi { crate_id: 3, cpm: 12, chip: 0, location: 1, hits: 0x8001, error: 0 },
        CpmRoi { crate_id: 3, cpm: 12, chip: 5, location: 0, hits: 0x00ff, error: 3 },
    ];
    for r in stored {
        roi.fill_roi(r);
    }
    roi.core_mut().set_bunch_crossing(0x123);
    let mut out = CpmRoiSubBlock::new();
    transfer(&mut roi, &mut out);
    assert!(out.unpack());
    assert_eq!(out.rois().len(), 2);
    for r in stored {
        assert_eq!(out.roi(r.chip, r.location), r);
    }
    assert_eq!(out.roi(7, 1), CpmRoi::default());
    assert_eq!(out.core().bunch_crossing(), 0x123);
}

#[test]
fn test_jem_roi_round_trip() {
    let mut roi = JemRoiSubBlock::new();
    roi.set_roi_header(1, 1, 8);
    let r = JemRoi {
        crate_id: 1,
        jem: 8,
        frame: 6,
        location: 2,
        forward: true,
        hits: 0x3f,
        saturation: 1,
    };
    roi.fill_roi(r);
    roi.core_mut().set_bunch_crossing(0xfff);
    let mut out = JemRoiSubBlock::new();
    transfer(&mut roi, &mut out);
    assert!(out.unpack());
    assert_eq!(out.roi(6), r);
    assert_eq!(out.rois().len(), 1);
    assert_eq!(out.core().bunch_crossing(), 0xfff);
}

//==================================================================================
// Dispatch
//==================================================================================

#[test]
fn test_for_header_picks_the_concrete_type() {
    let config = crate::config::PpmConfig::default();
    let energy = cmm::cmm_header(1, DataFormat::Neutral, 0, 0, 0, CmmFirmware::Energy, 0, 1);
    let block = SubBlock::for_header(energy.encode(), ModuleFamily::Cp, &config).unwrap();
    assert_eq!(block.name(), "cmm_energy");

    let unknown = cmm::cmm_header(1, DataFormat::Neutral, 0, 0, 0, CmmFirmware::Unknown, 0, 1);
    assert_eq!(
        SubBlock::for_header(unknown.encode(), ModuleFamily::Jep, &config).unwrap_err(),
        RodErrorKind::CmmType
    );

    let mut cpm = cpm_with_tower(DataFormat::Uncompressed);
    assert!(cpm.pack());
    let mut words = Vec::new();
    cpm.core().write(&mut words);
    let mut block = SubBlock::for_header(words[0], ModuleFamily::Cp, &config).unwrap();
    assert_eq!(block.name(), "cpm");
    assert_eq!(block.read(&words), words.len());
    assert!(block.unpack());
    match block {
        SubBlock::Cpm(cpm) => assert_eq!(cpm.em_data(0, 5), 10),
        other => panic!("unexpected {}", other.name()),
    }
}
