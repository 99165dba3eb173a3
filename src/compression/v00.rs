//! Compression V00: formats 0..=5, window placed by the sub-block pedestal,
//! deltas taken in slice order around the minimum. No pin error words.

use super::channel::Dialect;
use super::{prepare, CompressionStats};
use crate::sub_block::ppm::PpmSubBlock;

pub(crate) const DIALECT: Dialect = Dialect {
    formats: 6,
    swap_minimum: false,
    constant_format: false,
    all_fadc_bcids: false,
};

const LOWER_RANGE: i32 = 12;

fn base(sub: &PpmSubBlock) -> i32 {
    sub.pedestal() as i32 - LOWER_RANGE
}

pub fn pack(sub: &mut PpmSubBlock) -> bool {
    let base = base(sub);
    let Some(codec) = prepare(sub, DIALECT, base) else {
        return false;
    };
    let mut stats = CompressionStats::new(DIALECT.formats);
    for chan in 0..sub.channels_per_sub_block() {
        let data = sub.ppm_data(chan);
        stats.record(codec.encode(sub.core_mut(), &data));
    }
    sub.core_mut().packer_flush();
    sub.set_comp_stats(stats);
    true
}

pub fn unpack(sub: &mut PpmSubBlock) -> bool {
    let base = base(sub);
    let Some(codec) = prepare(sub, DIALECT, base) else {
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
    sub.set_comp_stats(stats);
    sub.core_mut().finish_unpack()
}
