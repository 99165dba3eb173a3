//! Cluster processor module (CPM) sub-block.
//!
//! Eighty trigger-tower channels, each with an EM and a hadronic value plus
//! two error bits (parity, link down), and two 24-bit hit-count words. In
//! uncompressed format one tower word holds a pair of channels on one G-Link
//! pin and only non-zero words are sent. In neutral format every pin carries
//! four pairs, three hit or bunch-crossing bits and a parity bit per slice.

use crate::error::UnpackErrorKind;
use crate::sub_block::core::SubBlockCore;
use crate::types::layout::{BitField, WordLayout};
use crate::types::word::{DataFormat, SubBlockHeader, MODULE_WORD_ID};

//==================================================================================
// 1. Layouts & Constants
//==================================================================================

pub const TT_DATA_A: BitField = BitField::new("tt_data_a", 0, 8);
pub const PARITY_A: BitField = BitField::new("parity_a", 8, 1);
pub const TT_DATA_B: BitField = BitField::new("tt_data_b", 9, 8);
pub const PARITY_B: BitField = BitField::new("parity_b", 17, 1);
pub const LINK_DOWN_A: BitField = BitField::new("link_down_a", 18, 1);
pub const LINK_DOWN_B: BitField = BitField::new("link_down_b", 19, 1);
pub const PAIR: BitField = BitField::new("pair", 20, 2);
pub const FPGA: BitField = BitField::new("fpga", 22, 5);
pub const DATA_ID: BitField = BitField::new("data_id", 30, 2);

pub static TOWER_WORD_LAYOUT: WordLayout = WordLayout::new(
    "cpm_tower_word",
    &[
        TT_DATA_A,
        PARITY_A,
        TT_DATA_B,
        PARITY_B,
        LINK_DOWN_A,
        LINK_DOWN_B,
        PAIR,
        FPGA,
        DATA_ID,
    ],
);

pub const HITS: BitField = BitField::new("hits", 0, 24);
pub const INDICATOR: BitField = BitField::new("indicator", 27, 1);

pub static HITS_WORD_LAYOUT: WordLayout =
    WordLayout::new("cpm_hits_word", &[HITS, INDICATOR, DATA_ID]);

/// Pair and pin read together: the tower's storage position.
const PAIR_PIN: BitField = BitField::new("pair_pin", 20, 7);

const TOWER_WORD_ID: u32 = 0;
const HITS_WORD_ID: u32 = 1;

pub const CHANNELS: usize = 80;
pub const GLINK_PINS: usize = 20;
const PAIRS_PER_PIN: usize = 4;
const WORDS_PER_PIN: usize = 8;
const TT_BITS: u32 = 8;
const ERR_BITS: u32 = 2;
const HIT_BITS: u32 = 3;
const HIT_WORDS: usize = 8;
const GLINK_BITS_PER_SLICE: usize = 84;
const WORD_LEN: u32 = 32;

/// Fields of one half (A for even channels, B for odd) of a tower word.
struct TowerHalf {
    data: BitField,
    parity: BitField,
    link_down: BitField,
}

const HALF_A: TowerHalf = TowerHalf {
    data: TT_DATA_A,
    parity: PARITY_A,
    link_down: LINK_DOWN_A,
};

const HALF_B: TowerHalf = TowerHalf {
    data: TT_DATA_B,
    parity: PARITY_B,
    link_down: LINK_DOWN_B,
};

fn half(channel: usize) -> &'static TowerHalf {
    if channel % 2 == 0 {
        &HALF_A
    } else {
        &HALF_B
    }
}

/// Pin and pair of a channel; `offset` 0 is EM, 1 is hadronic.
fn pin_pair(channel: usize, offset: usize) -> (usize, usize) {
    let pin = 2 * (channel / WORDS_PER_PIN) + offset;
    let pair = (channel % WORDS_PER_PIN) / 2;
    (pin, pair)
}

//==================================================================================
// 2. The Sub-Block
//==================================================================================

#[derive(Debug, Clone, Default)]
pub struct CpmSubBlock {
    core: SubBlockCore,
    tower_data: Vec<u32>,
    hit_data: Vec<u32>,
}

impl CpmSubBlock {
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
        self.tower_data.clear();
        self.hit_data.clear();
    }

    pub fn set_cpm_header(
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

    /// Neutral format holds every slice; the others hold one.
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

    fn ensure_sizes(&mut self) {
        if self.tower_data.is_empty() {
            self.tower_data.resize(self.sized(CHANNELS), 0);
        }
        if self.hit_data.is_empty() {
            self.hit_data.resize(self.sized(2), 0);
        }
    }

    //==============================================================================
    // 3. Tower & Hit Data
    //==============================================================================

    pub fn fill_tower_data(
        &mut self,
        slice: usize,
        channel: usize,
        em: u32,
        had: u32,
        em_err: u32,
        had_err: u32,
    ) {
        if channel >= CHANNELS || (em | had | em_err | had_err) == 0 {
            return;
        }
        if self.tower_data.is_empty() {
            self.tower_data.resize(self.sized(CHANNELS), 0);
        }
        let base = self.index(slice) * CHANNELS;
        let fields = half(channel);
        for (offset, (data, err)) in [(em, em_err), (had, had_err)].into_iter().enumerate() {
            if data == 0 && err == 0 {
                continue;
            }
            let (pin, pair) = pin_pair(channel, offset);
            let Some(word) = self.tower_data.get_mut(base + pin * PAIRS_PER_PIN + pair) else {
                continue;
            };
            *word |= fields.data.put(data)
                | fields.parity.put(err)
                | fields.link_down.put(err >> 1)
                | PAIR.put(pair as u32)
                | FPGA.put(pin as u32)
                | DATA_ID.put(TOWER_WORD_ID);
        }
    }

    pub fn set_hits(&mut self, slice: usize, hit0: u32, hit1: u32) {
        if hit0 == 0 && hit1 == 0 {
            return;
        }
        if self.hit_data.is_empty() {
            self.hit_data.resize(self.sized(2), 0);
        }
        let ix = self.index(slice) * 2;
        for (indicator, hits) in [hit0, hit1].into_iter().enumerate() {
            if hits == 0 {
                continue;
            }
            if let Some(word) = self.hit_data.get_mut(ix + indicator) {
                *word = HITS.put(hits) | INDICATOR.put(indicator as u32) | DATA_ID.put(HITS_WORD_ID);
            }
        }
    }

    fn tower_word(&self, slice: usize, channel: usize, offset: usize) -> Option<u32> {
        if slice >= self.timeslices() || channel >= CHANNELS {
            return None;
        }
        let (pin, pair) = pin_pair(channel, offset);
        self.tower_data
            .get(self.index(slice) * CHANNELS + pin * PAIRS_PER_PIN + pair)
            .copied()
    }

    fn data(&self, slice: usize, channel: usize, offset: usize) -> u32 {
        self.tower_word(slice, channel, offset)
            .map_or(0, |w| half(channel).data.get(w))
    }

    fn error(&self, slice: usize, channel: usize, offset: usize) -> u32 {
        self.tower_word(slice, channel, offset).map_or(0, |w| {
            let fields = half(channel);
            fields.parity.get(w) | (fields.link_down.get(w) << 1)
        })
    }

    pub fn em_data(&self, slice: usize, channel: usize) -> u32 {
        self.data(slice, channel, 0)
    }

    pub fn had_data(&self, slice: usize, channel: usize) -> u32 {
        self.data(slice, channel, 1)
    }

    pub fn em_error(&self, slice: usize, channel: usize) -> u32 {
        self.error(slice, channel, 0)
    }

    pub fn had_error(&self, slice: usize, channel: usize) -> u32 {
        self.error(slice, channel, 1)
    }

    fn hits(&self, slice: usize, offset: usize) -> u32 {
        if slice >= self.timeslices() {
            return 0;
        }
        self.hit_data
            .get(self.index(slice) * 2 + offset)
            .map_or(0, |&w| HITS.get(w))
    }

    pub fn hits0(&self, slice: usize) -> u32 {
        self.hits(slice, 0)
    }

    pub fn hits1(&self, slice: usize) -> u32 {
        self.hits(slice, 1)
    }

    //==============================================================================
    // 4. Pack / Unpack
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
        self.ensure_sizes();
        let bunch_crossing = self.core.bunch_crossing();
        for slice in 0..self.timeslices() {
            let hit0 = self.hits0(slice);
            let hit1 = self.hits1(slice);
            for pin in 0..GLINK_PINS {
                for pair in 0..PAIRS_PER_PIN {
                    for i in 0..2 {
                        let channel = WORDS_PER_PIN * (pin / 2) + 2 * pair + i;
                        // Odd pins carry hadronic towers, even pins EM.
                        let offset = pin & 0x1;
                        let data = self.data(slice, channel, offset);
                        let error = self.error(slice, channel, offset);
                        self.core.packer_neutral(pin, data, TT_BITS);
                        self.core.packer_neutral(pin, error, ERR_BITS);
                    }
                }
                let extra = if pin < HIT_WORDS {
                    hit0 >> (pin as u32 * HIT_BITS)
                } else if pin < 2 * HIT_WORDS {
                    hit1 >> ((pin - HIT_WORDS) as u32 * HIT_BITS)
                } else {
                    bunch_crossing >> ((pin - 2 * HIT_WORDS) as u32 * HIT_BITS)
                };
                self.core.packer_neutral(pin, extra, HIT_BITS);
                self.core.packer_neutral_parity(pin);
            }
        }
        true
    }

    fn pack_uncompressed(&mut self) -> bool {
        let words: Vec<u32> = self
            .tower_data
            .iter()
            .chain(self.hit_data.iter())
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
        self.tower_data.clear();
        self.hit_data.clear();
        self.ensure_sizes();
        for slice in 0..self.timeslices() {
            let mut hit0 = 0;
            let mut hit1 = 0;
            let mut bunch_crossing = 0;
            for pin in 0..GLINK_PINS {
                for pair in 0..PAIRS_PER_PIN {
                    for i in 0..2 {
                        let channel = WORDS_PER_PIN * (pin / 2) + 2 * pair + i;
                        let data = self.core.unpacker_neutral(pin, TT_BITS);
                        let error = self.core.unpacker_neutral(pin, ERR_BITS);
                        if pin & 0x1 == 1 {
                            self.fill_tower_data(slice, channel, 0, data, 0, error);
                        } else {
                            self.fill_tower_data(slice, channel, data, 0, error, 0);
                        }
                    }
                }
                let extra = self.core.unpacker_neutral(pin, HIT_BITS);
                if pin < HIT_WORDS {
                    hit0 |= extra << (pin as u32 * HIT_BITS);
                } else if pin < 2 * HIT_WORDS {
                    hit1 |= extra << ((pin - HIT_WORDS) as u32 * HIT_BITS);
                } else {
                    bunch_crossing |= extra << ((pin - 2 * HIT_WORDS) as u32 * HIT_BITS);
                }
                self.core.check_neutral_parity(slice, pin);
            }
            self.set_hits(slice, hit0, hit1);
            self.core.set_bunch_crossing(bunch_crossing);
        }
        self.core.finish_unpack()
    }

    /// Words are self-describing, so the payload is read to its end.
    fn unpack_uncompressed(&mut self) -> bool {
        self.core.unpacker_init();
        self.tower_data.clear();
        self.hit_data.clear();
        self.ensure_sizes();
        for _ in 0..self.core.data_words() {
            let word = self.core.unpacker(WORD_LEN);
            match DATA_ID.get(word) {
                TOWER_WORD_ID => {
                    let ix = PAIR_PIN.get(word) as usize;
                    match self.tower_data.get_mut(ix) {
                        Some(slot) => *slot = word,
                        None => return self.core.reject(UnpackErrorKind::DataId),
                    }
                }
                HITS_WORD_ID => {
                    self.hit_data[INDICATOR.get(word) as usize] = word;
                }
                _ => return self.core.reject(UnpackErrorKind::DataId),
            }
        }
        self.core.finish_unpack()
    }
}
