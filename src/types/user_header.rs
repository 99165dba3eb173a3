//! The per-fragment user header word.
//!
//! Carries the triggered-slice offset of each module family in one nibble
//! apiece, plus the number of user header words.

use super::layout::{BitField, WordLayout};

pub const MARKER: BitField = BitField::new("marker", 28, 4);
pub const JEP_CMM: BitField = BitField::new("jep_cmm", 24, 4);
pub const CP_CMM: BitField = BitField::new("cp_cmm", 20, 4);
pub const JEM: BitField = BitField::new("jem", 16, 4);
pub const CPM: BitField = BitField::new("cpm", 12, 4);
pub const PPM_LUT: BitField = BitField::new("ppm_lut", 8, 4);
pub const PPM_FADC: BitField = BitField::new("ppm_fadc", 4, 4);
pub const WORDS: BitField = BitField::new("words", 0, 4);

pub static USER_HEADER_LAYOUT: WordLayout = WordLayout::new(
    "user_header",
    &[MARKER, JEP_CMM, CP_CMM, JEM, CPM, PPM_LUT, PPM_FADC, WORDS],
);

const MARKER_VALUE: u32 = 0xf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserHeader {
    word: u32,
}

impl Default for UserHeader {
    fn default() -> Self {
        Self {
            word: MARKER.put(MARKER_VALUE) | WORDS.put(1),
        }
    }
}

impl UserHeader {
    pub fn from_word(word: u32) -> Self {
        Self { word }
    }

    pub fn is_valid(word: u32) -> bool {
        MARKER.get(word) == MARKER_VALUE
    }

    pub fn word(&self) -> u32 {
        self.word
    }

    pub fn words(&self) -> u32 {
        WORDS.get(self.word)
    }

    pub fn jep_cmm(&self) -> u32 {
        JEP_CMM.get(self.word)
    }

    pub fn cp_cmm(&self) -> u32 {
        CP_CMM.get(self.word)
    }

    pub fn jem(&self) -> u32 {
        JEM.get(self.word)
    }

    pub fn cpm(&self) -> u32 {
        CPM.get(self.word)
    }

    pub fn ppm_lut(&self) -> u32 {
        PPM_LUT.get(self.word)
    }

    pub fn ppm_fadc(&self) -> u32 {
        PPM_FADC.get(self.word)
    }

    pub fn set_jep_cmm(&mut self, offset: u32) {
        self.word = JEP_CMM.set(self.word, offset);
    }

    pub fn set_cp_cmm(&mut self, offset: u32) {
        self.word = CP_CMM.set(self.word, offset);
    }

    pub fn set_jem(&mut self, offset: u32) {
        self.word = JEM.set(self.word, offset);
    }

    pub fn set_cpm(&mut self, offset: u32) {
        self.word = CPM.set(self.word, offset);
    }

    pub fn set_ppm_lut(&mut self, offset: u32) {
        self.word = PPM_LUT.set(self.word, offset);
    }

    pub fn set_ppm_fadc(&mut self, offset: u32) {
        self.word = PPM_FADC.set(self.word, offset);
    }
}
