//! CMM-Jet sub-block: jet hit multiplicities from the sixteen JEMs of a
//! crate, the main and forward sums, and the jet ET map.

use crate::error::UnpackErrorKind;
use crate::sub_block::cmm::{
    self, CmmFirmware, SourceGrid, BUNCH_CROSSING_BITS, DATA_ID, DATA_WORD_ID, SOURCE_ID,
};
use crate::sub_block::core::SubBlockCore;
use crate::types::layout::{BitField, WordLayout};
use crate::types::word::DataFormat;

pub const MAIN_HITS: BitField = BitField::new("main_hits", 0, 24);
pub const MAIN_ERROR: BitField = BitField::new("main_error", 24, 1);
pub const FORWARD_HITS: BitField = BitField::new("forward_hits", 0, 16);
pub const FORWARD_ERROR: BitField = BitField::new("forward_error", 16, 1);
pub const ET_MAP: BitField = BitField::new("et_map", 16, 4);

pub static MAIN_WORD_LAYOUT: WordLayout = WordLayout::new(
    "cmm_jet_main_word",
    &[MAIN_HITS, MAIN_ERROR, SOURCE_ID, DATA_ID],
);
pub static FORWARD_WORD_LAYOUT: WordLayout = WordLayout::new(
    "cmm_jet_forward_word",
    &[FORWARD_HITS, FORWARD_ERROR, SOURCE_ID, DATA_ID],
);
/// The total-forward word shares its slot with the ET map.
pub static ET_MAP_WORD_LAYOUT: WordLayout = WordLayout::new(
    "cmm_jet_et_map_word",
    &[FORWARD_HITS, ET_MAP, SOURCE_ID, DATA_ID],
);

/// Hit sources. JEMs are 0 to 15.
pub const REMOTE_MAIN: usize = 16;
pub const LOCAL_MAIN: usize = 17;
pub const TOTAL_MAIN: usize = 18;
pub const REMOTE_FORWARD: usize = 19;
pub const LOCAL_FORWARD: usize = 20;
pub const TOTAL_FORWARD: usize = 21;
const MAX_HITS: usize = 22;

const JET_HITS_BITS: u32 = 24;
const JET_HITS_ERROR_BITS: u32 = 1;
const FORWARD_HITS_BITS: u32 = 16;
const PADDING_BITS: u32 = 8;
/// Total-forward hits are split across two pins at this bit.
const RIGHT_BIT: u32 = 8;
const FORWARD_PIN: usize = TOTAL_MAIN + 1;

const GRID: SourceGrid = SourceGrid {
    per_slice: MAX_HITS,
    glink_bits_per_slice: 35,
};

#[derive(Debug, Clone, Default)]
pub struct CmmJetSubBlock {
    core: SubBlockCore,
    hits_data: Vec<u32>,
}

impl CmmJetSubBlock {
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
            CmmFirmware::Jet,
            position,
            timeslices,
        ));
    }

    pub fn timeslices(&self) -> usize {
        GRID.timeslices(&self.core)
    }

    fn word(&self, slice: usize, source: usize) -> u32 {
        GRID.get(&self.core, &self.hits_data, slice, source)
    }

    /// Hit counts of a JEM or sum source. Forward sums are 16 bits wide.
    pub fn jet_hits(&self, slice: usize, source: usize) -> u32 {
        let word = self.word(slice, source);
        if source <= TOTAL_MAIN {
            MAIN_HITS.get(word)
        } else {
            FORWARD_HITS.get(word)
        }
    }

    /// Only the main sums and the remote forward sum carry an error bit.
    pub fn jet_hits_error(&self, slice: usize, source: usize) -> u32 {
        let word = self.word(slice, source);
        match source {
            s if s <= TOTAL_MAIN => MAIN_ERROR.get(word),
            REMOTE_FORWARD => FORWARD_ERROR.get(word),
            _ => 0,
        }
    }

    pub fn jet_et_map(&self, slice: usize) -> u32 {
        ET_MAP.get(self.word(slice, TOTAL_FORWARD))
    }

    pub fn set_jet_hits(&mut self, slice: usize, source: usize, hits: u32, error: u32) {
        if hits == 0 && error == 0 {
            return;
        }
        let (hits_field, error_field) = if source <= TOTAL_MAIN {
            (MAIN_HITS, MAIN_ERROR)
        } else {
            (FORWARD_HITS, FORWARD_ERROR)
        };
        if let Some(word) = GRID.slot(&self.core, &mut self.hits_data, slice, source) {
            *word |= hits_field.put(hits)
                | error_field.put(error)
                | SOURCE_ID.put(source as u32)
                | DATA_ID.put(DATA_WORD_ID);
        }
    }

    pub fn set_jet_et_map(&mut self, slice: usize, map: u32) {
        if map == 0 {
            return;
        }
        if let Some(word) = GRID.slot(&self.core, &mut self.hits_data, slice, TOTAL_FORWARD) {
            *word |= ET_MAP.put(map)
                | SOURCE_ID.put(TOTAL_FORWARD as u32)
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
            for pin in 0..=TOTAL_MAIN {
                let hits = self.jet_hits(slice, pin);
                let error = self.jet_hits_error(slice, pin);
                self.core.packer_neutral(pin, hits, JET_HITS_BITS);
                self.core.packer_neutral(pin, error, JET_HITS_ERROR_BITS);
                let bc = if pin < BUNCH_CROSSING_BITS {
                    bunch_crossing >> pin
                } else {
                    0
                };
                self.core.packer_neutral(pin, bc, 1);
                if pin < REMOTE_MAIN {
                    self.core.packer_neutral(pin, 0, PADDING_BITS);
                }
            }
            // The sum pins carry the ET map and both halves of the total forward hits
            let et_map = self.jet_et_map(slice);
            let total_forward = self.jet_hits(slice, TOTAL_FORWARD);
            self.core.packer_neutral(REMOTE_MAIN, et_map, PADDING_BITS);
            self.core.packer_neutral(LOCAL_MAIN, total_forward, PADDING_BITS);
            self.core
                .packer_neutral(TOTAL_MAIN, total_forward >> RIGHT_BIT, PADDING_BITS);

            let remote = self.jet_hits(slice, REMOTE_FORWARD);
            let remote_error = self.jet_hits_error(slice, REMOTE_FORWARD);
            let local = self.jet_hits(slice, LOCAL_FORWARD);
            self.core.packer_neutral(FORWARD_PIN, remote, FORWARD_HITS_BITS);
            self.core
                .packer_neutral(FORWARD_PIN, remote_error, JET_HITS_ERROR_BITS);
            self.core.packer_neutral(FORWARD_PIN, 0, 1);
            self.core.packer_neutral(FORWARD_PIN, local, FORWARD_HITS_BITS);

            for pin in 0..=FORWARD_PIN {
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
            for pin in 0..=TOTAL_MAIN {
                let hits = self.core.unpacker_neutral(pin, JET_HITS_BITS);
                let error = self.core.unpacker_neutral(pin, JET_HITS_ERROR_BITS);
                self.set_jet_hits(slice, pin, hits, error);
                let bc = self.core.unpacker_neutral(pin, 1);
                if pin < BUNCH_CROSSING_BITS {
                    bunch_crossing |= bc << pin;
                }
                if pin < REMOTE_MAIN {
                    self.core.unpacker_neutral(pin, PADDING_BITS);
                }
            }
            self.core.set_bunch_crossing(bunch_crossing);

            let et_map = self.core.unpacker_neutral(REMOTE_MAIN, PADDING_BITS);
            self.set_jet_et_map(slice, et_map);
            let mut total_forward = self.core.unpacker_neutral(LOCAL_MAIN, PADDING_BITS);
            total_forward |= self.core.unpacker_neutral(TOTAL_MAIN, PADDING_BITS) << RIGHT_BIT;
            self.set_jet_hits(slice, TOTAL_FORWARD, total_forward, 0);

            let remote = self.core.unpacker_neutral(FORWARD_PIN, FORWARD_HITS_BITS);
            let remote_error = self.core.unpacker_neutral(FORWARD_PIN, JET_HITS_ERROR_BITS);
            self.set_jet_hits(slice, REMOTE_FORWARD, remote, remote_error);
            self.core.unpacker_neutral(FORWARD_PIN, 1);
            let local = self.core.unpacker_neutral(FORWARD_PIN, FORWARD_HITS_BITS);
            self.set_jet_hits(slice, LOCAL_FORWARD, local, 0);

            for pin in 0..=FORWARD_PIN {
                self.core.check_neutral_parity(slice, pin);
            }
        }
        self.core.finish_unpack()
    }
}
