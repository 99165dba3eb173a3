//! Pieces shared by the three CMM sub-block kinds.
//!
//! A CMM header reuses the module field for three sub-fields: whether the
//! CMM does crate or system summing, which firmware it runs, and whether it
//! sits left or right in the crate. The firmware decides the concrete
//! sub-block type.

use serde::{Deserialize, Serialize};

use crate::sub_block::core::SubBlockCore;
use crate::types::layout::{BitField, WordLayout};
use crate::types::word::{self, DataFormat, SubBlockHeader, CMM_WORD_ID};

pub const POSITION: BitField = BitField::new("position", 0, 1);
pub const FIRMWARE: BitField = BitField::new("firmware", 1, 2);
pub const SUMMING: BitField = BitField::new("summing", 3, 1);

pub static MODULE_FIELD_LAYOUT: WordLayout =
    WordLayout::new("cmm_module_field", &[POSITION, FIRMWARE, SUMMING]);

pub const CRATE_SUMMING: u32 = 0;
pub const SYSTEM_SUMMING: u32 = 1;
pub const LEFT: u32 = 0;
pub const RIGHT: u32 = 1;

/// Data-word id of every CMM data word.
pub(crate) const DATA_WORD_ID: u32 = 0;
pub(crate) const DATA_ID: BitField = BitField::new("data_id", 30, 2);
pub(crate) const SOURCE_ID: BitField = BitField::new("source_id", 25, 5);
pub(crate) const WORD_LEN: u32 = 32;
pub(crate) const BUNCH_CROSSING_BITS: usize = 12;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CmmFirmware {
    Cp,
    Jet,
    Energy,
    Unknown,
}

impl CmmFirmware {
    pub fn code(self) -> u32 {
        match self {
            CmmFirmware::Cp => 0,
            CmmFirmware::Jet => 1,
            CmmFirmware::Energy => 2,
            CmmFirmware::Unknown => 3,
        }
    }

    pub fn from_code(code: u32) -> Self {
        match code {
            0 => CmmFirmware::Cp,
            1 => CmmFirmware::Jet,
            2 => CmmFirmware::Energy,
            _ => CmmFirmware::Unknown,
        }
    }
}

/// Firmware type named by a CMM header word.
pub fn cmm_type(header: u32) -> CmmFirmware {
    CmmFirmware::from_code(FIRMWARE.get(word::module(header)))
}

#[allow(clippy::too_many_arguments)]
pub fn cmm_header(
    version: u32,
    format: DataFormat,
    slice: u32,
    crate_id: u32,
    summing: u32,
    firmware: CmmFirmware,
    position: u32,
    timeslices: u32,
) -> SubBlockHeader {
    SubBlockHeader {
        word_id: CMM_WORD_ID,
        version,
        format: format.code(),
        seqno: slice,
        crate_id,
        module: SUMMING.put(summing) | FIRMWARE.put(firmware.code()) | POSITION.put(position),
        slices2: 0,
        slices1: timeslices,
    }
}

pub fn summing(core: &SubBlockCore) -> u32 {
    SUMMING.get(core.module())
}

pub fn firmware(core: &SubBlockCore) -> CmmFirmware {
    CmmFirmware::from_code(FIRMWARE.get(core.module()))
}

pub fn position(core: &SubBlockCore) -> u32 {
    POSITION.get(core.module())
}

/// Slice bookkeeping for sub-blocks whose data are one flat array of
/// `per_slice` source words per timeslice.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SourceGrid {
    pub per_slice: usize,
    pub glink_bits_per_slice: usize,
}

impl SourceGrid {
    pub fn neutral(core: &SubBlockCore) -> bool {
        core.data_format() == Some(DataFormat::Neutral)
    }

    pub fn timeslices(&self, core: &SubBlockCore) -> usize {
        let slices = core.slices1() as usize;
        if slices == 0 && Self::neutral(core) {
            core.data_words() / self.glink_bits_per_slice
        } else {
            slices
        }
    }

    pub fn index(&self, core: &SubBlockCore, slice: usize, source: usize) -> usize {
        if Self::neutral(core) {
            source + slice * self.per_slice
        } else {
            source
        }
    }

    pub fn size(&self, core: &SubBlockCore) -> usize {
        if Self::neutral(core) {
            self.per_slice * self.timeslices(core)
        } else {
            self.per_slice
        }
    }

    /// Word at (`slice`, `source`), zero when out of range.
    pub fn get(&self, core: &SubBlockCore, data: &[u32], slice: usize, source: usize) -> u32 {
        if slice >= self.timeslices(core) || source >= self.per_slice {
            return 0;
        }
        data.get(self.index(core, slice, source)).copied().unwrap_or(0)
    }

    /// Slot for (`slice`, `source`), sizing `data` first if it is empty.
    pub fn slot<'a>(
        &self,
        core: &SubBlockCore,
        data: &'a mut Vec<u32>,
        slice: usize,
        source: usize,
    ) -> Option<&'a mut u32> {
        if slice >= self.timeslices(core) || source >= self.per_slice {
            return None;
        }
        if data.is_empty() {
            data.resize(self.size(core), 0);
        }
        data.get_mut(self.index(core, slice, source))
    }
}

/// Packs the non-zero words of `data` at full width.
pub(crate) fn pack_words(core: &mut SubBlockCore, data: &[u32]) -> bool {
    for &word in data.iter().filter(|&&w| w != 0) {
        core.packer(word, WORD_LEN);
    }
    core.packer_flush();
    true
}

/// Reads every payload word into `data` by its source id. `source_of` maps
/// the raw source field to a storage index.
pub(crate) fn unpack_words<F>(core: &mut SubBlockCore, data: &mut [u32], source_of: F) -> bool
where
    F: Fn(u32) -> usize,
{
    core.unpacker_init();
    for _ in 0..core.data_words() {
        let word = core.unpacker(WORD_LEN);
        match data.get_mut(source_of(SOURCE_ID.get(word))) {
            Some(slot) => *slot = word,
            None => return core.reject(crate::error::UnpackErrorKind::SourceId),
        }
    }
    core.finish_unpack()
}
