//! CMM-CP sub-block: EM/tau hit counts from the fourteen CPMs of a crate
//! plus the remote, local and total sums.

use crate::error::UnpackErrorKind;
use crate::sub_block::cmm::{
    self, CmmFirmware, SourceGrid, BUNCH_CROSSING_BITS, DATA_ID, DATA_WORD_ID, SOURCE_ID,
};
use crate::sub_block::core::SubBlockCore;
use crate::types::layout::{BitField, WordLayout};
use crate::types::word::DataFormat;

pub const HITS: BitField = BitField::new("hits", 0, 24);
pub const HITS_ERROR: BitField = BitField::new("hits_error", 24, 1);

pub static HITS_WORD_LAYOUT: WordLayout =
    WordLayout::new("cmm_cp_hits_word", &[HITS, HITS_ERROR, SOURCE_ID, DATA_ID]);

/// Hit sources. CPMs are 1 to 14.
pub const REMOTE_0: usize = 15;
pub const REMOTE_1: usize = 16;
pub const REMOTE_2: usize = 17;
pub const LOCAL: usize = 18;
pub const TOTAL: usize = 19;
const MAX_SOURCE_ID: usize = 20;
const MAX_HITS: usize = 19;

const HITS_BITS: u32 = 24;
const HITS_ERROR_BITS: u32 = 1;
const PADDING_BITS: u32 = 12;

const GRID: SourceGrid = SourceGrid {
    per_slice: MAX_HITS,
    glink_bits_per_slice: 39,
};

#[derive(Debug, Clone, Default)]
pub struct CmmCpSubBlock {
    core: SubBlockCore,
    hits_data: Vec<u32>,
}

impl CmmCpSubBlock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn core(&self) -> &SubBlockCore {
        &self.core
    }

    pub fn core_mut(&mut self) -> &mut SubBlockCore {
        &mut self.core
    }

    pub fn clear(&mut self) {
        self.core.clear();
        self.hits_data.clear();
    }

    pub fn set_cmm_header(
        &mut self,
        version: u32,
        format: DataFormat,
        slice: u32,
        crate_id: u32,
        summing: u32,
        position: u32,
        timeslices: u32,
    ) {
        self.core.set_header(cmm::cmm_header(
            version,
            format,
            slice,
            crate_id,
            summing,
            CmmFirmware::Cp,
            position,
            timeslices,
        ));
    }

    pub fn timeslices(&self) -> usize {
        GRID.timeslices(&self.core)
    }

    /// Storage index of a source; sources start at 1.
    fn slot_of(source: usize) -> Option<usize> {
        source.checked_sub(1)
    }

    pub fn hits(&self, slice: usize, source: usize) -> u32 {
        Self::slot_of(source).map_or(0, |s| {
            HITS.get(GRID.get(&self.core, &self.hits_data, slice, s))
        })
    }

    pub fn hits_error(&self, slice: usize, source: usize) -> u32 {
        Self::slot_of(source).map_or(0, |s| {
            HITS_ERROR.get(GRID.get(&self.core, &self.hits_data, slice, s))
        })
    }

    pub fn set_hits(&mut self, slice: usize, source: usize, hits: u32, error: u32) {
        let Some(s) = Self::slot_of(source) else {
            return;
        };
        if hits == 0 && error == 0 {
            return;
        }
        if let Some(word) = GRID.slot(&self.core, &mut self.hits_data, slice, s) {
            *word |= HITS.put(hits)
                | HITS_ERROR.put(error)
                | SOURCE_ID.put(s as u32)
                | DATA_ID.put(DATA_WORD_ID);
        }
    }

    pub fn pack(&mut self) -> bool {
        if self.core.version() != 1 {
            return self.core.reject(UnpackErrorKind::UnsupportedVersion);
        }
        let pack: fn(&mut Self) -> bool = match self.core.data_format() {
            Some(DataFormat::Neutral) => Self::pack_neutral,
            Some(DataFormat::Uncompressed) => |sub: &mut Self| cmm::pack_words(&mut sub.core, &sub.hits_data),
            _ => return self.core.reject(UnpackErrorKind::UnsupportedFormat),
        };
        self.core.begin_pack();
        pack(self)
    }

    pub fn unpack(&mut self) -> bool {
        if self.core.version() != 1 {
            return self.core.reject(UnpackErrorKind::UnsupportedVersion);
        }
        match self.core.data_format() {
            Some(DataFormat::Neutral) => self.unpack_neutral(),
            Some(DataFormat::Uncompressed) => {
                self.hits_data = vec![0; GRID.size(&self.core)];
                cmm::unpack_words(&mut self.core, &mut self.hits_data, |s| s as usize)
            }
            _ => self.core.reject(UnpackErrorKind::UnsupportedFormat),
        }
    }

    fn pack_neutral(&mut self) -> bool {
        let bunch_crossing = self.core.bunch_crossing();
        for slice in 0..self.timeslices() {
            for source in 1..MAX_SOURCE_ID {
                let pin = source - 1;
                let hits = self.hits(slice, source);
                let error = self.hits_error(slice, source);
                self.core.packer_neutral(pin, hits, HITS_BITS);
                self.core.packer_neutral(pin, error, HITS_ERROR_BITS);
                // Bunch crossing number, then the FIFO overflow slot
                let bc = if pin < BUNCH_CROSSING_BITS {
                    bunch_crossing >> pin
                } else {
                    0
                };
                self.core.packer_neutral(pin, bc, 1);
                self.core.packer_neutral(pin, 0, PADDING_BITS);
                self.core.packer_neutral_parity(pin);
            }
        }
        true
    }

    fn unpack_neutral(&mut self) -> bool {
        self.core.unpacker_init();
        self.hits_data = vec![0; GRID.size(&self.core)];
        for slice in 0..self.timeslices() {
            let mut bunch_crossing = 0;
            for source in 1..MAX_SOURCE_ID {
                let pin = source - 1;
                let hits = self.core.unpacker_neutral(pin, HITS_BITS);
                let error = self.core.unpacker_neutral(pin, HITS_ERROR_BITS);
                self.set_hits(slice, source, hits, error);
                let bc = self.core.unpacker_neutral(pin, 1);
                if pin < BUNCH_CROSSING_BITS {
                    bunch_crossing |= bc << pin;
                }
                self.core.unpacker_neutral(pin, PADDING_BITS);
                self.core.check_neutral_parity(slice, pin);
            }
            self.core.set_bunch_crossing(bunch_crossing);
        }
        self.core.finish_unpack()
    }
}
