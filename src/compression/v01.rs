//! Compression V01: adds format 6 for flat channels, a fixed small-signal
//! window around 20 counts, and the pin status/error trailer.

use super::channel::Dialect;
use super::{pack_pin_errors, prepare, unpack_pin_errors, CompressionStats};
use crate::sub_block::ppm::PpmSubBlock;

pub(crate) const DIALECT: Dialect = Dialect {
    formats: 7,
    swap_minimum: true,
    constant_format: true,
    all_fadc_bcids: false,
};

const PEDESTAL: i32 = 20;
const LOWER_RANGE: i32 = 12;

pub fn pack(sub: &mut PpmSubBlock) -> bool {
    let Some(codec) = prepare(sub, DIALECT, PEDESTAL - LOWER_RANGE) else {
        return false;
    };
    let mut stats = CompressionStats::new(DIALECT.formats);
    for chan in 0..sub.channels_per_sub_block() {
        let data = sub.ppm_data(chan);
        stats.record(codec.encode(sub.core_mut(), &data));
    }
    pack_pin_errors(sub);
    sub.core_mut().packer_flush();
    sub.set_comp_stats(stats);
    true
}

pub fn unpack(sub: &mut PpmSubBlock) -> bool {
    let Some(codec) = prepare(sub, DIALECT, PEDESTAL - LOWER_RANGE) else {
        return false;
    };
    sub.core_mut().unpacker_init();
    sub.reset_datamap();
    let mut stats = CompressionStats::new(DIALECT.formats);
    for chan in 0..sub.channels_per_sub_block() {
        let (data, format) = codec.decode(sub.core_mut());
        sub.fill_ppm_data(chan, &data);
        stats.record(format);
    }
    unpack_pin_errors(sub);
    sub.set_comp_stats(stats);
    sub.core_mut().finish_unpack()
}
