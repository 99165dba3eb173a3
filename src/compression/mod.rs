//! PPM compression, versions V00, V01 and V02.
//!
//! Each version packs every channel of a 64-channel PPM sub-block through
//! the shared layout catalogue in `channel`, then (V01 onwards) the G-Link
//! pin status and error words. V02 additionally has a super-compressed mode
//! in which absent channels are skipped entirely.
//!
//! The version is carried in the sub-block sequence number.

use bitvec::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::UnpackErrorKind;
use crate::sub_block::core::SubBlockCore;
use crate::sub_block::ppm::{PpmSubBlock, GLINK_PINS};

mod channel;
pub mod permutations;
pub mod v00;
pub mod v01;
pub mod v02;

use channel::{ChannelCodec, Dialect, SLICES_FADC, SLICES_LUT};

//==================================================================================
// 1. Versions & Statistics
//==================================================================================

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CompressionVersion {
    V00,
    V01,
    V02,
}

impl CompressionVersion {
    pub fn from_seqno(seqno: u32) -> Option<Self> {
        match seqno {
            0 => Some(CompressionVersion::V00),
            1 => Some(CompressionVersion::V01),
            2 => Some(CompressionVersion::V02),
            _ => None,
        }
    }

    pub fn seqno(self) -> u32 {
        match self {
            CompressionVersion::V00 => 0,
            CompressionVersion::V01 => 1,
            CompressionVersion::V02 => 2,
        }
    }

    /// Number of channel formats the version can produce.
    pub fn formats(self) -> usize {
        match self {
            CompressionVersion::V00 => v00::DIALECT.formats,
            CompressionVersion::V01 => v01::DIALECT.formats,
            CompressionVersion::V02 => v02::DIALECT.formats,
        }
    }
}

/// Histogram of channel formats seen by one pack or unpack pass.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct CompressionStats {
    counts: Vec<u32>,
}

impl CompressionStats {
    pub fn new(formats: usize) -> Self {
        Self {
            counts: vec![0; formats],
        }
    }

    pub fn record(&mut self, format: usize) {
        if format >= self.counts.len() {
            self.counts.resize(format + 1, 0);
        }
        self.counts[format] += 1;
    }

    pub fn count(&self, format: usize) -> u32 {
        self.counts.get(format).copied().unwrap_or(0)
    }

    pub fn counts(&self) -> &[u32] {
        &self.counts
    }

    pub fn total(&self) -> u32 {
        self.counts.iter().sum()
    }

    /// Adds another histogram into this one.
    pub fn merge(&mut self, other: &CompressionStats) {
        if other.counts.len() > self.counts.len() {
            self.counts.resize(other.counts.len(), 0);
        }
        for (slot, &n) in self.counts.iter_mut().zip(&other.counts) {
            *slot += n;
        }
    }
}

//==================================================================================
// 2. Dispatch
//==================================================================================

pub fn pack(sub: &mut PpmSubBlock, version: CompressionVersion) -> bool {
    let ok = match version {
        CompressionVersion::V00 => v00::pack(sub),
        CompressionVersion::V01 => v01::pack(sub),
        CompressionVersion::V02 => v02::pack(sub),
    };
    if ok {
        log_metric!(
            "event" = "ppm_compress",
            "version" = version.seqno(),
            "words" = sub.core().data_words(),
            "formats" = format!("{:?}", sub.comp_stats().counts())
        );
    }
    ok
}

pub fn unpack(sub: &mut PpmSubBlock, version: CompressionVersion) -> bool {
    match version {
        CompressionVersion::V00 => v00::unpack(sub),
        CompressionVersion::V01 => v01::unpack(sub),
        CompressionVersion::V02 => v02::unpack(sub),
    }
}

//==================================================================================
// 3. Shared Helpers
//==================================================================================

/// Compressed formats only carry one LUT slice and five FADC slices.
pub(crate) fn slices_supported(sub: &PpmSubBlock) -> bool {
    sub.slices_lut() == SLICES_LUT && sub.slices_fadc() == SLICES_FADC
}

/// Checks the slice counts, selects streamed words and builds the codec.
fn prepare(sub: &mut PpmSubBlock, dialect: Dialect, base: i32) -> Option<ChannelCodec> {
    if !slices_supported(sub) {
        sub.core_mut().reject(UnpackErrorKind::CompressionSlices);
        return None;
    }
    let trig = sub.fadc_offset();
    sub.core_mut().set_streamed();
    Some(ChannelCodec {
        dialect,
        base,
        trig,
    })
}

type PresenceMap = BitArr!(for 16, in u16, Lsb0);

fn pack_presence(core: &mut SubBlockCore, map: &PresenceMap) {
    core.packer(map.as_raw_slice()[0] as u32, GLINK_PINS as u32);
}

fn unpack_presence(core: &mut SubBlockCore) -> PresenceMap {
    let raw = core.unpacker(GLINK_PINS as u32) as u16;
    BitArray::new([raw])
}

const STATUS_BITS: u32 = 5;
const ERROR_BITS: u32 = 6;
const STATUS_MASK: u32 = 0x1f;

/// Packs the G-Link pin status/error words: two summary flags, then a pin
/// presence map and the fields of the pins that have anything set.
fn pack_pin_errors(sub: &mut PpmSubBlock) {
    let words: Vec<u32> = (0..GLINK_PINS).map(|pin| sub.ppm_pin_error(pin)).collect();
    let status: Vec<u32> = words.iter().map(|w| w & STATUS_MASK).collect();
    let error: Vec<u32> = words.iter().map(|w| w >> STATUS_BITS).collect();
    let status_bit = status.iter().any(|&s| s != 0);
    let error_bit = error.iter().any(|&e| e != 0);
    let core = sub.core_mut();
    core.packer(status_bit as u32, 1);
    core.packer(error_bit as u32, 1);
    if status_bit || error_bit {
        let mut present = PresenceMap::ZERO;
        for pin in 0..GLINK_PINS {
            present.set(pin, status[pin] != 0 || error[pin] != 0);
        }
        pack_presence(core, &present);
        for pin in present.iter_ones() {
            if status_bit {
                core.packer(status[pin], STATUS_BITS);
            }
            if error_bit {
                core.packer(error[pin], ERROR_BITS);
            }
        }
    }
}

fn unpack_pin_errors(sub: &mut PpmSubBlock) {
    let core = sub.core_mut();
    let status_bit = core.unpacker(1) == 1;
    let error_bit = core.unpacker(1) == 1;
    if !(status_bit || error_bit) {
        return;
    }
    let present = unpack_presence(core);
    let mut fills = Vec::new();
    for pin in present.iter_ones() {
        let status = if status_bit { core.unpacker(STATUS_BITS) } else { 0 };
        let error = if error_bit { core.unpacker(ERROR_BITS) } else { 0 };
        fills.push((pin, (error << STATUS_BITS) | status));
    }
    for (pin, word) in fills {
        sub.fill_ppm_pin_error(pin, word);
    }
}

#[cfg(test)]
mod tests;
