//! Jet/energy module (JEM) sub-block: 44 jet elements, the jet hit counts and
//! the three energy subsums.

use crate::error::UnpackErrorKind;
use crate::kernels::neutral::parity_bit;
use crate::sub_block::core::SubBlockCore;
use crate::types::layout::{BitField, WordLayout};
use crate::types::word::{DataFormat, SubBlockHeader, MODULE_WORD_ID};

//==================================================================================
// 1. Layouts & Constants
//==================================================================================

pub const EM_DATA: BitField = BitField::new("em_data", 0, 9);
pub const HAD_DATA: BitField = BitField::new("had_data", 9, 9);
pub const EM_PARITY: BitField = BitField::new("em_parity", 18, 1);
pub const HAD_PARITY: BitField = BitField::new("had_parity", 19, 1);
pub const LINK_ERROR: BitField = BitField::new("link_error", 20, 2);
pub const PAIR: BitField = BitField::new("pair", 22, 2);
pub const PIN: BitField = BitField::new("pin", 24, 4);
pub const DATA_ID: BitField = BitField::new("data_id", 30, 2);

pub static JET_ELEMENT_LAYOUT: WordLayout = WordLayout::new(
    "jem_jet_element",
    &[EM_DATA, HAD_DATA, EM_PARITY, HAD_PARITY, LINK_ERROR, PAIR, PIN, DATA_ID],
);

pub const JET_HITS: BitField = BitField::new("jet_hits", 0, 24);
/// Zero in hit words, one in energy words.
pub const SUM_TYPE: BitField = BitField::new("sum_type", 24, 1);
pub const SOURCE_ID: BitField = BitField::new("source_id", 25, 5);

pub static HITS_WORD_LAYOUT: WordLayout =
    WordLayout::new("jem_hits_word", &[JET_HITS, SUM_TYPE, SOURCE_ID, DATA_ID]);

pub const EX: BitField = BitField::new("ex", 0, 8);
pub const EY: BitField = BitField::new("ey", 8, 8);
pub const ET: BitField = BitField::new("et", 16, 8);

pub static ENERGY_WORD_LAYOUT: WordLayout =
    WordLayout::new("jem_energy_word", &[EX, EY, ET, SUM_TYPE, SOURCE_ID, DATA_ID]);

const JET_ELEMENT_WORD_ID: u32 = 0x1;
const SUMS_WORD_ID: u32 = 0x2;
const MAIN_HITS_ID: u32 = 20;
const FORWARD_HITS_ID: u32 = 21;
const SUBSUM_ID: u32 = 22;

pub const CHANNELS: usize = 44;
const PAIRS_PER_PIN: usize = 3;
const JET_ELEMENT_BITS: u32 = 9;
const JE_PADDING_BITS: u32 = 22;
const JET_HITS_BITS: u32 = 24;
const ENERGY_BITS: u32 = 8;
const BUNCH_CROSSING_BITS: u32 = 12;
const HIT_PADDING_BITS: u32 = 4;
const GLINK_BITS_PER_SLICE: usize = 67;
const WORD_LEN: u32 = 32;

/// Modules 0 and 7 of each crate half see the forward calorimeter.
pub fn is_forward(module: u32) -> bool {
    matches!(module % 8, 0 | 7)
}

//==================================================================================
// 2. Jet Element
//==================================================================================

/// One jet element as carried in a JEM data word.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JetElement {
    pub channel: usize,
    pub em_data: u32,
    pub had_data: u32,
    pub em_parity: u32,
    pub had_parity: u32,
    pub link_error: u32,
}

impl JetElement {
    pub fn from_word(word: u32) -> Self {
        Self {
            channel: (PIN.get(word) as usize) * PAIRS_PER_PIN + PAIR.get(word) as usize,
            em_data: EM_DATA.get(word),
            had_data: HAD_DATA.get(word),
            em_parity: EM_PARITY.get(word),
            had_parity: HAD_PARITY.get(word),
            link_error: LINK_ERROR.get(word),
        }
    }

    /// Data word, or zero when the element carries nothing.
    pub fn word(&self) -> u32 {
        let payload = EM_DATA.put(self.em_data)
            | HAD_DATA.put(self.had_data)
            | EM_PARITY.put(self.em_parity)
            | HAD_PARITY.put(self.had_parity)
            | LINK_ERROR.put(self.link_error);
        if payload == 0 {
            return 0;
        }
        payload
            | PAIR.put((self.channel % PAIRS_PER_PIN) as u32)
            | PIN.put((self.channel / PAIRS_PER_PIN) as u32)
            | DATA_ID.put(JET_ELEMENT_WORD_ID)
    }
}

//==================================================================================
// 3. The Sub-Block
//==================================================================================

#[derive(Debug, Clone, Default)]
pub struct JemSubBlock {
    core: SubBlockCore,
    je_data: Vec<u32>,
    jet_hits: Vec<u32>,
    energy_subsums: Vec<u32>,
}

impl JemSubBlock {
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
        self.je_data.clear();
        self.jet_hits.clear();
        self.energy_subsums.clear();
    }

    pub fn set_jem_header(
        &mut self,
        version: u32,
        format: DataFormat,
        slice: u32,
        crate_id: u32,
        module: u32,
        timeslices: u32,
    ) {
        self.core.set_header(SubBlockHeader {
            word_id: MODULE_WORD_ID,
            version,
            format: format.code(),
            seqno: slice,
            crate_id,
            module,
            slices2: 0,
            slices1: timeslices,
        });
    }

    pub fn timeslices(&self) -> usize {
        let slices = self.core.slices1() as usize;
        if slices == 0 && self.neutral() {
            self.core.data_words() / GLINK_BITS_PER_SLICE
        } else {
            slices
        }
    }

    fn neutral(&self) -> bool {
        self.core.data_format() == Some(DataFormat::Neutral)
    }

    fn index(&self, slice: usize) -> usize {
        if self.neutral() {
            slice
        } else {
            0
        }
    }

    fn sized(&self, per_slice: usize) -> usize {
        if self.neutral() {
            per_slice * self.timeslices()
        } else {
            per_slice
        }
    }

    fn reset_data(&mut self) {
        self.je_data = vec![0; self.sized(CHANNELS)];
        self.jet_hits = vec![0; self.sized(1)];
        self.energy_subsums = vec![0; self.sized(1)];
    }

    //==============================================================================
    // 4. Data Access
    //==============================================================================

    pub fn fill_jet_element(&mut self, slice: usize, element: &JetElement) {
        let word = element.word();
        if word == 0 || element.channel >= CHANNELS {
            return;
        }
        if self.je_data.is_empty() {
            self.je_data.resize(self.sized(CHANNELS), 0);
        }
        let ix = self.index(slice) * CHANNELS + element.channel;
        if let Some(slot) = self.je_data.get_mut(ix) {
            *slot = word;
        }
    }

    pub fn set_jet_hits(&mut self, slice: usize, hits: u32) {
        if hits == 0 {
            return;
        }
        let source = if is_forward(self.core.module()) {
            FORWARD_HITS_ID
        } else {
            MAIN_HITS_ID
        };
        let word = JET_HITS.put(hits) | SOURCE_ID.put(source) | DATA_ID.put(SUMS_WORD_ID);
        if self.jet_hits.is_empty() {
            self.jet_hits.resize(self.sized(1), 0);
        }
        let ix = self.index(slice);
        if let Some(slot) = self.jet_hits.get_mut(ix) {
            *slot = word;
        }
    }

    pub fn set_energy_subsums(&mut self, slice: usize, ex: u32, ey: u32, et: u32) {
        let sums = EX.put(ex) | EY.put(ey) | ET.put(et);
        if sums == 0 {
            return;
        }
        let word = sums | SUM_TYPE.put(1) | SOURCE_ID.put(SUBSUM_ID) | DATA_ID.put(SUMS_WORD_ID);
        if self.energy_subsums.is_empty() {
            self.energy_subsums.resize(self.sized(1), 0);
        }
        let ix = self.index(slice);
        if let Some(slot) = self.energy_subsums.get_mut(ix) {
            *slot = word;
        }
    }

    pub fn jet_element(&self, slice: usize, channel: usize) -> JetElement {
        let word = if slice < self.timeslices() && channel < CHANNELS {
            self.je_data
                .get(self.index(slice) * CHANNELS + channel)
                .copied()
                .unwrap_or(0)
        } else {
            0
        };
        JetElement {
            channel,
            ..JetElement::from_word(word)
        }
    }

    fn sum_word(&self, words: &[u32], slice: usize) -> u32 {
        if slice >= self.timeslices() {
            return 0;
        }
        words.get(self.index(slice)).copied().unwrap_or(0)
    }

    pub fn jet_hits(&self, slice: usize) -> u32 {
        JET_HITS.get(self.sum_word(&self.jet_hits, slice))
    }

    pub fn ex(&self, slice: usize) -> u32 {
        EX.get(self.sum_word(&self.energy_subsums, slice))
    }

    pub fn ey(&self, slice: usize) -> u32 {
        EY.get(self.sum_word(&self.energy_subsums, slice))
    }

    pub fn et(&self, slice: usize) -> u32 {
        ET.get(self.sum_word(&self.energy_subsums, slice))
    }

    //==============================================================================
    // 5. Pack / Unpack
    //==============================================================================

    /// Refused combinations leave the payload as it was.
    pub fn pack(&mut self) -> bool {
        if self.core.version() != 1 {
            return self.core.reject(UnpackErrorKind::UnsupportedVersion);
        }
        let pack: fn(&mut Self) -> bool = match self.core.data_format() {
            Some(DataFormat::Neutral) => Self::pack_neutral,
            Some(DataFormat::Uncompressed) => Self::pack_uncompressed,
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
            Some(DataFormat::Uncompressed) => self.unpack_uncompressed(),
            _ => self.core.reject(UnpackErrorKind::UnsupportedFormat),
        }
    }

    fn pack_neutral(&mut self) -> bool {
        let last_pin = (CHANNELS - 1) / PAIRS_PER_PIN;
        let sums_pin = last_pin + 1;
        let bunch_crossing = self.core.bunch_crossing();
        for slice in 0..self.timeslices() {
            for channel in 0..CHANNELS {
                let pin = channel / PAIRS_PER_PIN;
                let je = self.jet_element(slice, channel);
                self.core.packer_neutral(pin, je.em_data, JET_ELEMENT_BITS);
                self.core.packer_neutral(pin, je.em_parity, 1);
                self.core.packer_neutral(pin, je.link_error, 1);
                self.core.packer_neutral(pin, je.had_data, JET_ELEMENT_BITS);
                self.core.packer_neutral(pin, je.had_parity, 1);
                self.core.packer_neutral(pin, je.link_error >> 1, 1);
            }
            self.core.packer_neutral(last_pin, 0, JE_PADDING_BITS);

            let hits = self.jet_hits(slice);
            self.core.packer_neutral(sums_pin, hits, JET_HITS_BITS);
            self.core
                .packer_neutral(sums_pin, parity_bit(1, hits, JET_HITS_BITS), 1);
            let (ex, ey, et) = (self.ex(slice), self.ey(slice), self.et(slice));
            let mut parity = 1;
            for sum in [ex, ey, et] {
                self.core.packer_neutral(sums_pin, sum, ENERGY_BITS);
                parity = parity_bit(parity, sum, ENERGY_BITS);
            }
            self.core.packer_neutral(sums_pin, parity, 1);
            self.core
                .packer_neutral(sums_pin, bunch_crossing, BUNCH_CROSSING_BITS);
            self.core.packer_neutral(sums_pin, 0, HIT_PADDING_BITS);
            for pin in 0..=sums_pin {
                self.core.packer_neutral_parity(pin);
            }
        }
        true
    }

    fn pack_uncompressed(&mut self) -> bool {
        let words: Vec<u32> = self
            .je_data
            .iter()
            .chain(self.jet_hits.first())
            .chain(self.energy_subsums.first())
            .copied()
            .filter(|&w| w != 0)
            .collect();
        for word in words {
            self.core.packer(word, WORD_LEN);
        }
        self.core.packer_flush();
        true
    }

    fn unpack_neutral(&mut self) -> bool {
        self.core.unpacker_init();
        self.reset_data();
        let last_pin = (CHANNELS - 1) / PAIRS_PER_PIN;
        let sums_pin = last_pin + 1;
        for slice in 0..self.timeslices() {
            for channel in 0..CHANNELS {
                let pin = channel / PAIRS_PER_PIN;
                let em_data = self.core.unpacker_neutral(pin, JET_ELEMENT_BITS);
                let em_parity = self.core.unpacker_neutral(pin, 1);
                let mut link_error = self.core.unpacker_neutral(pin, 1);
                let had_data = self.core.unpacker_neutral(pin, JET_ELEMENT_BITS);
                let had_parity = self.core.unpacker_neutral(pin, 1);
                link_error |= self.core.unpacker_neutral(pin, 1) << 1;
                self.fill_jet_element(
                    slice,
                    &JetElement {
                        channel,
                        em_data,
                        had_data,
                        em_parity,
                        had_parity,
                        link_error,
                    },
                );
            }
            self.core.unpacker_neutral(last_pin, JE_PADDING_BITS);

            let hits = self.core.unpacker_neutral(sums_pin, JET_HITS_BITS);
            self.set_jet_hits(slice, hits);
            self.core.unpacker_neutral(sums_pin, 1);
            let ex = self.core.unpacker_neutral(sums_pin, ENERGY_BITS);
            let ey = self.core.unpacker_neutral(sums_pin, ENERGY_BITS);
            let et = self.core.unpacker_neutral(sums_pin, ENERGY_BITS);
            self.set_energy_subsums(slice, ex, ey, et);
            self.core.unpacker_neutral(sums_pin, 1);
            let bc = self.core.unpacker_neutral(sums_pin, BUNCH_CROSSING_BITS);
            self.core.set_bunch_crossing(bc);
            self.core.unpacker_neutral(sums_pin, HIT_PADDING_BITS);
            for pin in 0..=sums_pin {
                self.core.check_neutral_parity(slice, pin);
            }
        }
        self.core.finish_unpack()
    }

    fn unpack_uncompressed(&mut self) -> bool {
        self.core.unpacker_init();
        self.reset_data();
        for _ in 0..self.core.data_words() {
            let word = self.core.unpacker(WORD_LEN);
            match DATA_ID.get(word) {
                JET_ELEMENT_WORD_ID => {
                    let channel = JetElement::from_word(word).channel;
                    match self.je_data.get_mut(channel) {
                        Some(slot) => *slot = word,
                        None => return self.core.reject(UnpackErrorKind::DataId),
                    }
                }
                SUMS_WORD_ID => match SOURCE_ID.get(word) {
                    MAIN_HITS_ID | FORWARD_HITS_ID => self.jet_hits[0] = word,
                    SUBSUM_ID => self.energy_subsums[0] = word,
                    _ => return self.core.reject(UnpackErrorKind::SourceId),
                },
                _ => return self.core.reject(UnpackErrorKind::DataId),
            }
        }
        self.core.finish_unpack()
    }
}
