//! Compression V02: the window starts at a configurable baseline, all FADC
//! BCIDs are sent when any is unexpected, and the super-compressed format
//! prefixes every 16 channels with a presence map.

use super::channel::Dialect;
use super::{
    pack_pin_errors, pack_presence, prepare, unpack_pin_errors, unpack_presence, CompressionStats,
    PresenceMap,
};
use crate::sub_block::ppm::{PpmChannel, PpmSubBlock, GLINK_PINS};
use crate::types::word::DataFormat;

pub(crate) const DIALECT: Dialect = Dialect {
    formats: 7,
    swap_minimum: true,
    constant_format: true,
    all_fadc_bcids: true,
};

/// A channel is worth sending if it has a LUT value, any BCID bit, or an
/// FADC sample at or above `threshold`.
pub fn channel_present(data: &PpmChannel, threshold: u32) -> bool {
    data.lut.first().is_some_and(|&l| l != 0)
        || data.bcid_lut.first().is_some_and(|&b| b != 0)
        || data.fadc.iter().any(|&f| f >= threshold)
        || data.bcid_fadc.iter().any(|&b| b != 0)
}

fn super_compressed(sub: &PpmSubBlock) -> bool {
    sub.core().data_format() == Some(DataFormat::SuperCompressed)
}

pub fn pack(sub: &mut PpmSubBlock) -> bool {
    let base = sub.fadc_baseline() as i32;
    let Some(codec) = prepare(sub, DIALECT, base) else {
        return false;
    };
    let sparse = super_compressed(sub);
    let threshold = sub.fadc_threshold();
    let mut stats = CompressionStats::new(DIALECT.formats);
    let mut present = PresenceMap::ZERO;
    for chan in 0..sub.channels_per_sub_block() {
        let pin = chan % GLINK_PINS;
        if sparse {
            if pin == 0 {
                for p in 0..GLINK_PINS {
                    present.set(p, channel_present(&sub.ppm_data(chan + p), threshold));
                }
                pack_presence(sub.core_mut(), &present);
            }
            if !present[pin] {
                continue;
            }
        }
        let data = sub.ppm_data(chan);
        stats.record(codec.encode(sub.core_mut(), &data));
    }
    pack_pin_errors(sub);
    sub.core_mut().packer_flush();
    sub.set_comp_stats(stats);
    true
}

pub fn unpack(sub: &mut PpmSubBlock) -> bool {
    let base = sub.fadc_baseline() as i32;
    let Some(codec) = prepare(sub, DIALECT, base) else {
        return false;
    };
    let sparse = super_compressed(sub);
    sub.core_mut().unpacker_init();
    sub.reset_datamap();
    let mut stats = CompressionStats::new(DIALECT.formats);
    let mut present = PresenceMap::ZERO;
    for chan in 0..sub.channels_per_sub_block() {
        let pin = chan % GLINK_PINS;
        if sparse {
            if pin == 0 {
                present = unpack_presence(sub.core_mut());
            }
            if !present[pin] {
                continue;
            }
        }
        let (data, format) = codec.decode(sub.core_mut());
        sub.fill_ppm_data(chan, &data);
        stats.record(format);
    }
    unpack_pin_errors(sub);
    sub.set_comp_stats(stats);
    sub.core_mut().finish_unpack()
}
