//! JEM RoI sub-block (neutral format only) and the JEM RoI word.
//!
//! A JEM reports up to eight jet RoI frames. Frames 0 to 3 ride on pin 0 and
//! 4 to 7 on pin 1; pin 2 carries the bunch crossing number.

use serde::{Deserialize, Serialize};

use crate::error::UnpackErrorKind;
use crate::sub_block::core::SubBlockCore;
use crate::sub_block::jem;
use crate::types::layout::{BitField, WordLayout};
use crate::types::word::{DataFormat, SubBlockHeader, MODULE_WORD_ID};

pub const HITS: BitField = BitField::new("hits", 0, 8);
pub const SATURATION: BitField = BitField::new("saturation", 12, 1);
pub const LOCATION: BitField = BitField::new("location", 16, 2);
pub const FRAME: BitField = BitField::new("frame", 18, 3);
pub const JEM: BitField = BitField::new("jem", 21, 4);
pub const CRATE: BitField = BitField::new("crate", 25, 1);
pub const FORWARD: BitField = BitField::new("forward", 26, 1);
pub const WORD_ID: BitField = BitField::new("word_id", 29, 3);

pub static ROI_WORD_LAYOUT: WordLayout = WordLayout::new(
    "jem_roi_word",
    &[HITS, SATURATION, LOCATION, FRAME, JEM, CRATE, FORWARD, WORD_ID],
);

pub const ROI_WORD_ID: u32 = 0b100;

const FRAMES: usize = 8;
const FRAMES_PER_PIN: usize = 4;
const BUNCH_CROSSING_PIN: usize = 2;
const HITS_BITS: u32 = 8;
const LOCATION_BITS: u32 = 2;
const SATURATION_BITS: u32 = 1;
const BUNCH_CROSSING_BITS: u32 = 12;
const PADDING_BITS: u32 = 32;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct JemRoi {
    pub crate_id: u32,
    pub jem: u32,
    pub frame: u32,
    pub location: u32,
    pub forward: bool,
    pub hits: u32,
    pub saturation: u32,
}

impl JemRoi {
    pub fn from_word(word: u32) -> Self {
        Self {
            crate_id: CRATE.get(word),
            jem: JEM.get(word),
            frame: FRAME.get(word),
            location: LOCATION.get(word),
            forward: FORWARD.get(word) != 0,
            hits: HITS.get(word),
            saturation: SATURATION.get(word),
        }
    }

    pub fn word(&self) -> u32 {
        WORD_ID.put(ROI_WORD_ID)
            | CRATE.put(self.crate_id)
            | JEM.put(self.jem)
            | FRAME.put(self.frame)
            | LOCATION.put(self.location)
            | FORWARD.put(self.forward as u32)
            | HITS.put(self.hits)
            | SATURATION.put(self.saturation)
    }

    pub fn is_roi_word(word: u32) -> bool {
        WORD_ID.get(word) == ROI_WORD_ID
    }
}

#[derive(Debug, Clone, Default)]
pub struct JemRoiSubBlock {
    core: SubBlockCore,
    rois: Vec<JemRoi>,
}

impl JemRoiSubBlock {
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

    pub fn fill_roi(&mut self, roi: JemRoi) {
        self.rois.push(roi);
    }

    /// RoI of a frame; empty if none was stored.
    pub fn roi(&self, frame: u32) -> JemRoi {
        self.rois
            .iter()
            .find(|r| r.frame == frame)
            .copied()
            .unwrap_or_default()
    }

    pub fn rois(&self) -> &[JemRoi] {
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
        let mut frames = [JemRoi::default(); FRAMES];
        for roi in &self.rois {
            if let Some(slot) = frames.get_mut(roi.frame as usize) {
                *slot = *roi;
            }
        }
        for (frame, roi) in frames.iter().enumerate() {
            let pin = frame / FRAMES_PER_PIN;
            self.core.packer_neutral(pin, roi.hits, HITS_BITS);
            self.core.packer_neutral(pin, roi.location, LOCATION_BITS);
            self.core.packer_neutral(pin, roi.saturation, SATURATION_BITS);
        }
        let bunch_crossing = self.core.bunch_crossing();
        self.core
            .packer_neutral(BUNCH_CROSSING_PIN, bunch_crossing, BUNCH_CROSSING_BITS);
        self.core.packer_neutral(BUNCH_CROSSING_PIN, 0, PADDING_BITS);
        for pin in 0..=BUNCH_CROSSING_PIN {
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
        let (crate_id, module) = (self.core.crate_id(), self.core.module());
        for frame in 0..FRAMES {
            let pin = frame / FRAMES_PER_PIN;
            let hits = self.core.unpacker_neutral(pin, HITS_BITS);
            let location = self.core.unpacker_neutral(pin, LOCATION_BITS);
            let saturation = self.core.unpacker_neutral(pin, SATURATION_BITS);
            if hits != 0 || saturation != 0 {
                self.rois.push(JemRoi {
                    crate_id,
                    jem: module,
                    frame: frame as u32,
                    location,
                    forward: jem::is_forward(module),
                    hits,
                    saturation,
                });
            }
        }
        let bunch_crossing = self
            .core
            .unpacker_neutral(BUNCH_CROSSING_PIN, BUNCH_CROSSING_BITS);
        self.core.set_bunch_crossing(bunch_crossing);
        self.core.unpacker_neutral(BUNCH_CROSSING_PIN, PADDING_BITS);
        for pin in 0..=BUNCH_CROSSING_PIN {
            self.core.check_neutral_parity(0, pin);
        }
        self.core.finish_unpack()
    }
}
