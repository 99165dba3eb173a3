//! CPM RoI sub-block (neutral format only) and the CPM RoI word.
//!
//! Each of the eight CP chips reports a left and a right region of interest,
//! one per G-Link pin. Outside a sub-block the same data travel as bare RoI
//! words.

use serde::{Deserialize, Serialize};

use crate::error::UnpackErrorKind;
use crate::sub_block::core::SubBlockCore;
use crate::types::layout::{BitField, WordLayout};
use crate::types::word::{DataFormat, SubBlockHeader, MODULE_WORD_ID};

pub const HITS: BitField = BitField::new("hits", 0, 16);
pub const ERROR: BitField = BitField::new("error", 16, 2);
pub const LOCATION: BitField = BitField::new("location", 18, 2);
pub const CHIP: BitField = BitField::new("chip", 20, 3);
pub const CPM: BitField = BitField::new("cpm", 23, 4);
pub const CRATE: BitField = BitField::new("crate", 27, 2);

pub static ROI_WORD_LAYOUT: WordLayout =
    WordLayout::new("cpm_roi_word", &[HITS, ERROR, LOCATION, CHIP, CPM, CRATE]);

const GLINK_PINS: usize = 16;
const HITS_LEN: u32 = 16;
const ERROR_LEN: u32 = 2;
const LOCATION_LEN: u32 = 2;
const BUNCH_CROSSING_BITS: usize = 12;

/// A decoded CPM RoI word.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CpmRoi {
    pub crate_id: u32,
    pub cpm: u32,
    pub chip: u32,
    pub location: u32,
    pub hits: u32,
    pub error: u32,
}

impl CpmRoi {
    pub fn from_word(word: u32) -> Self {
        Self {
            crate_id: CRATE.get(word),
            cpm: CPM.get(word),
            chip: CHIP.get(word),
            location: LOCATION.get(word),
            hits: HITS.get(word),
            error: ERROR.get(word),
        }
    }

    pub fn word(&self) -> u32 {
        CRATE.put(self.crate_id)
            | CPM.put(self.cpm)
            | CHIP.put(self.chip)
            | LOCATION.put(self.location)
            | HITS.put(self.hits)
            | ERROR.put(self.error)
    }

    /// A bare RoI word has its two top bits clear.
    pub fn is_roi_word(word: u32) -> bool {
        word >> 29 == 0
    }

    fn pin(&self) -> usize {
        (self.chip * 2 + (self.location & 1)) as usize
    }
}

#[derive(Debug, Clone, Default)]
pub struct CpmRoiSubBlock {
    core: SubBlockCore,
    rois: Vec<CpmRoi>,
}

impl CpmRoiSubBlock {
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
        self.rois.clear();
    }

    pub fn set_roi_header(&mut self, version: u32, crate_id: u32, module: u32) {
        self.core.set_header(SubBlockHeader {
            word_id: MODULE_WORD_ID,
            version,
            format: DataFormat::Neutral.code(),
            seqno: 0,
            crate_id,
            module,
            slices2: 0,
            slices1: 1,
        });
    }

    pub fn fill_roi(&mut self, roi: CpmRoi) {
        self.rois.push(roi);
    }

    /// RoI for a chip and location (0 left, 1 right); empty if none was stored.
    pub fn roi(&self, chip: u32, location: u32) -> CpmRoi {
        self.rois
            .iter()
            .find(|r| r.chip == chip && (r.location & 1) == location)
            .copied()
            .unwrap_or_default()
    }

    pub fn rois(&self) -> &[CpmRoi] {
        &self.rois
    }

    pub fn pack(&mut self) -> bool {
        if self.core.version() != 1 {
            return self.core.reject(UnpackErrorKind::UnsupportedVersion);
        }
        if self.core.data_format() != Some(DataFormat::Neutral) {
            return self.core.reject(UnpackErrorKind::UnsupportedFormat);
        }
        self.core.begin_pack();
        let mut by_pin = [CpmRoi::default(); GLINK_PINS];
        for roi in &self.rois {
            if let Some(slot) = by_pin.get_mut(roi.pin()) {
                *slot = *roi;
            }
        }
        let bunch_crossing = self.core.bunch_crossing();
        for (pin, roi) in by_pin.iter().enumerate() {
            self.core.packer_neutral(pin, roi.hits, HITS_LEN);
            self.core.packer_neutral(pin, roi.error, ERROR_LEN);
            self.core.packer_neutral(pin, roi.location, LOCATION_LEN);
            let bc = if pin < BUNCH_CROSSING_BITS {
                bunch_crossing >> pin
            } else {
                0
            };
            self.core.packer_neutral(pin, bc, 1);
            self.core.packer_neutral_parity(pin);
        }
        true
    }

    pub fn unpack(&mut self) -> bool {
        if self.core.version() != 1 {
            return self.core.reject(UnpackErrorKind::UnsupportedVersion);
        }
        if self.core.data_format() != Some(DataFormat::Neutral) {
            return self.core.reject(UnpackErrorKind::UnsupportedFormat);
        }
        self.core.unpacker_init();
        self.rois.clear();
        let (crate_id, cpm) = (self.core.crate_id(), self.core.module());
        let mut bunch_crossing = 0;
        for pin in 0..GLINK_PINS {
            let hits = self.core.unpacker_neutral(pin, HITS_LEN);
            let error = self.core.unpacker_neutral(pin, ERROR_LEN);
            let location = self.core.unpacker_neutral(pin, LOCATION_LEN);
            let bc = self.core.unpacker_neutral(pin, 1);
            if pin < BUNCH_CROSSING_BITS {
                bunch_crossing |= bc << pin;
            }
            self.core.check_neutral_parity(0, pin);
            if hits != 0 || error != 0 {
                self.rois.push(CpmRoi {
                    crate_id,
                    cpm,
                    chip: (pin / 2) as u32,
                    location,
                    hits,
                    error,
                });
            }
        }
        self.core.set_bunch_crossing(bunch_crossing);
        self.core.finish_unpack()
    }
}
