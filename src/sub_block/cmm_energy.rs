//! CMM-Energy sub-block: Ex/Ey/Et subsums from the sixteen JEMs of a crate,
//! the remote, local and total sums, and the missing-ET and sum-ET hit maps.
//!
//! JEM subsums are 8 bits per component with one shared error bit. Sum
//! sources take three consecutive slots (Ex, Ey, Et) of 15-bit values, and
//! the two hit maps ride in the upper bits of the total Ey and Et slots.
//!
//! The neutral layout iterates the JEM section over pins 0 to 16, so the
//! remote sums also go out once in the JEM form before their full-width
//! copy. Pin 16 therefore runs to 61 bits per slice against 35 on every
//! other pin, and on unpack the low bit of the remote Et error is merged
//! into the remote Ex and Ey errors. Both effects are part of the format.

use crate::error::UnpackErrorKind;
use crate::sub_block::cmm::{
    self, CmmFirmware, SourceGrid, BUNCH_CROSSING_BITS, DATA_ID, DATA_WORD_ID, SOURCE_ID,
};
use crate::sub_block::core::SubBlockCore;
use crate::types::layout::{BitField, WordLayout};
use crate::types::word::DataFormat;

pub const JEM_EX: BitField = BitField::new("ex", 0, 8);
pub const JEM_EY: BitField = BitField::new("ey", 8, 8);
pub const JEM_ET: BitField = BitField::new("et", 16, 8);
pub const JEM_ERROR: BitField = BitField::new("jem_error", 24, 1);
pub const SUM: BitField = BitField::new("sum", 0, 15);
pub const SUM_ERROR: BitField = BitField::new("sum_error", 15, 1);
/// Remote sums keep two error bits, overlapping bit 16 of the word.
pub const REMOTE_SUM_ERROR: BitField = BitField::new("remote_sum_error", 15, 2);
pub const HITS_MAP: BitField = BitField::new("hits_map", 16, 8);

pub static JEM_WORD_LAYOUT: WordLayout = WordLayout::new(
    "cmm_energy_jem_word",
    &[JEM_EX, JEM_EY, JEM_ET, JEM_ERROR, SOURCE_ID, DATA_ID],
);
pub static SUM_WORD_LAYOUT: WordLayout = WordLayout::new(
    "cmm_energy_sum_word",
    &[SUM, REMOTE_SUM_ERROR, SOURCE_ID, DATA_ID],
);
pub static HITS_MAP_WORD_LAYOUT: WordLayout = WordLayout::new(
    "cmm_energy_hits_map_word",
    &[SUM, SUM_ERROR, HITS_MAP, SOURCE_ID, DATA_ID],
);

/// Sum sources. JEMs are 0 to 15; each sum occupies three slots.
pub const REMOTE: usize = 16;
pub const LOCAL: usize = 19;
pub const TOTAL: usize = 22;
const MAX_SUMS: usize = 25;
const MAX_JEMS: usize = 16;

const MISSING_ET_SLOT: usize = TOTAL + 1;
const SUM_ET_SLOT: usize = TOTAL + 2;

const JEM_SUM_BITS: u32 = 8;
const SUM_BITS: u32 = 15;
const PADDING_BITS: u32 = 8;

/// Widest pin in the neutral layout; see the module docs.
pub const NEUTRAL_BITS_PER_SLICE: usize = 61;
pub const NEUTRAL_PIN_BITS_PER_SLICE: usize = 35;

const GRID: SourceGrid = SourceGrid {
    per_slice: MAX_SUMS,
    glink_bits_per_slice: NEUTRAL_BITS_PER_SLICE,
};

/// Which component of a subsum an accessor reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Component {
    Ex = 0,
    Ey = 1,
    Et = 2,
}

impl Component {
    fn jem_field(self) -> BitField {
        match self {
            Component::Ex => JEM_EX,
            Component::Ey => JEM_EY,
            Component::Et => JEM_ET,
        }
    }
}

fn is_sum(source: usize) -> bool {
    matches!(source, REMOTE | LOCAL | TOTAL)
}

fn sum_error_field(source: usize) -> BitField {
    if source == REMOTE {
        REMOTE_SUM_ERROR
    } else {
        SUM_ERROR
    }
}

#[derive(Debug, Clone, Default)]
pub struct CmmEnergySubBlock {
    core: SubBlockCore,
    sums_data: Vec<u32>,
}

impl CmmEnergySubBlock {
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
        self.sums_data.clear();
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
            CmmFirmware::Energy,
            position,
            timeslices,
        ));
    }

    pub fn timeslices(&self) -> usize {
        GRID.timeslices(&self.core)
    }

    fn word(&self, slice: usize, slot: usize) -> u32 {
        GRID.get(&self.core, &self.sums_data, slice, slot)
    }

    fn component(&self, slice: usize, source: usize, c: Component) -> u32 {
        if source < MAX_JEMS {
            c.jem_field().get(self.word(slice, source))
        } else if is_sum(source) {
            SUM.get(self.word(slice, source + c as usize))
        } else {
            0
        }
    }

    fn component_error(&self, slice: usize, source: usize, c: Component) -> u32 {
        if source < MAX_JEMS {
            JEM_ERROR.get(self.word(slice, source))
        } else if is_sum(source) {
            sum_error_field(source).get(self.word(slice, source + c as usize))
        } else {
            0
        }
    }

    pub fn ex(&self, slice: usize, source: usize) -> u32 {
        self.component(slice, source, Component::Ex)
    }

    pub fn ey(&self, slice: usize, source: usize) -> u32 {
        self.component(slice, source, Component::Ey)
    }

    pub fn et(&self, slice: usize, source: usize) -> u32 {
        self.component(slice, source, Component::Et)
    }

    pub fn ex_error(&self, slice: usize, source: usize) -> u32 {
        self.component_error(slice, source, Component::Ex)
    }

    pub fn ey_error(&self, slice: usize, source: usize) -> u32 {
        self.component_error(slice, source, Component::Ey)
    }

    pub fn et_error(&self, slice: usize, source: usize) -> u32 {
        self.component_error(slice, source, Component::Et)
    }

    pub fn missing_et_hits(&self, slice: usize) -> u32 {
        HITS_MAP.get(self.word(slice, MISSING_ET_SLOT))
    }

    pub fn sum_et_hits(&self, slice: usize) -> u32 {
        HITS_MAP.get(self.word(slice, SUM_ET_SLOT))
    }

    /// Stores the subsums of a JEM or a sum source. A JEM keeps a single
    /// error bit, the OR of the three errors.
    #[allow(clippy::too_many_arguments)]
    pub fn set_subsums(
        &mut self,
        slice: usize,
        source: usize,
        ex: u32,
        ey: u32,
        et: u32,
        ex_error: u32,
        ey_error: u32,
        et_error: u32,
    ) {
        if ex | ey | et | ex_error | ey_error | et_error == 0 {
            return;
        }
        if source < MAX_JEMS {
            if let Some(word) = GRID.slot(&self.core, &mut self.sums_data, slice, source) {
                *word = JEM_EX.put(ex)
                    | JEM_EY.put(ey)
                    | JEM_ET.put(et)
                    | JEM_ERROR.put(ex_error)
                    | JEM_ERROR.put(ey_error)
                    | JEM_ERROR.put(et_error)
                    | SOURCE_ID.put(source as u32)
                    | DATA_ID.put(DATA_WORD_ID);
            }
            return;
        }
        if !is_sum(source) {
            return;
        }
        let error_field = sum_error_field(source);
        for (i, (sum, error)) in [(ex, ex_error), (ey, ey_error), (et, et_error)]
            .into_iter()
            .enumerate()
        {
            if sum == 0 && error == 0 {
                continue;
            }
            let slot = source + i;
            if let Some(word) = GRID.slot(&self.core, &mut self.sums_data, slice, slot) {
                *word |= SUM.put(sum)
                    | error_field.put(error)
                    | SOURCE_ID.put(slot as u32)
                    | DATA_ID.put(DATA_WORD_ID);
            }
        }
    }

    pub fn set_missing_et_hits(&mut self, slice: usize, map: u32) {
        self.set_hits_map(slice, MISSING_ET_SLOT, map);
    }

    pub fn set_sum_et_hits(&mut self, slice: usize, map: u32) {
        self.set_hits_map(slice, SUM_ET_SLOT, map);
    }

    fn set_hits_map(&mut self, slice: usize, slot: usize, map: u32) {
        if map == 0 {
            return;
        }
        if let Some(word) = GRID.slot(&self.core, &mut self.sums_data, slice, slot) {
            *word |= HITS_MAP.put(map) | SOURCE_ID.put(slot as u32) | DATA_ID.put(DATA_WORD_ID);
        }
    }

    pub fn pack(&mut self) -> bool {
        if self.core.version() != 1 {
            return self.core.reject(UnpackErrorKind::UnsupportedVersion);
        }
        let pack: fn(&mut Self) -> bool = match self.core.data_format() {
            Some(DataFormat::Neutral) => Self::pack_neutral,
            Some(DataFormat::Uncompressed) => |sub: &mut Self| cmm::pack_words(&mut sub.core, &sub.sums_data),
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
                self.sums_data = vec![0; GRID.size(&self.core)];
                cmm::unpack_words(&mut self.core, &mut self.sums_data, |s| s as usize)
            }
            _ => self.core.reject(UnpackErrorKind::UnsupportedFormat),
        }
    }

    /// Packs `(sum, error)` pairs onto one pin with the given widths.
    fn pack_pair(&mut self, pin: usize, pairs: [(u32, u32); 2], sum_bits: u32, error_bits: u32) {
        for (sum, error) in pairs {
            self.core.packer_neutral(pin, sum, sum_bits);
            self.core.packer_neutral(pin, error, error_bits);
        }
    }

    fn pack_neutral(&mut self) -> bool {
        let bunch_crossing = self.core.bunch_crossing();
        for slice in 0..self.timeslices() {
            for pin in 0..=MAX_JEMS {
                let (ex, ey, et) = (self.ex(slice, pin), self.ey(slice, pin), self.et(slice, pin));
                let error = self.et_error(slice, pin);
                self.core.packer_neutral(pin, ex, JEM_SUM_BITS);
                self.core.packer_neutral(pin, ey, JEM_SUM_BITS);
                self.core.packer_neutral(pin, et, JEM_SUM_BITS);
                self.core.packer_neutral(pin, error, 1);
                if pin < BUNCH_CROSSING_BITS {
                    self.core.packer_neutral(pin, bunch_crossing >> pin, 1);
                    self.core.packer_neutral(pin, 0, PADDING_BITS);
                } else {
                    self.core.packer_neutral(pin, 0, 1);
                }
            }

            let mut pin = BUNCH_CROSSING_BITS;
            let et_total = self.et(slice, TOTAL);
            let et_total_error = self.et_error(slice, TOTAL);
            self.core.packer_neutral(pin, et_total, PADDING_BITS);
            pin += 1;
            self.core
                .packer_neutral(pin, et_total >> PADDING_BITS, PADDING_BITS - 1);
            self.core.packer_neutral(pin, et_total_error, 1);
            pin += 1;
            let sum_et_hits = self.sum_et_hits(slice);
            self.core.packer_neutral(pin, sum_et_hits, PADDING_BITS);
            pin += 1;
            let missing_et_hits = self.missing_et_hits(slice);
            self.core.packer_neutral(pin, missing_et_hits, PADDING_BITS);

            for source in [REMOTE, LOCAL, TOTAL] {
                pin += 1;
                let pairs = [
                    (self.ex(slice, source), self.ex_error(slice, source)),
                    (self.ey(slice, source), self.ey_error(slice, source)),
                ];
                self.pack_pair(pin, pairs, SUM_BITS, 2);
            }

            pin += 1;
            let pairs = [
                (self.et(slice, REMOTE), self.et_error(slice, REMOTE)),
                (self.et(slice, LOCAL), self.et_error(slice, LOCAL)),
            ];
            self.pack_pair(pin, pairs, SUM_BITS - 1, 3);

            for p in 0..=pin {
                self.core.packer_neutral_parity(p);
            }
        }
        true
    }

    fn unpack_neutral(&mut self) -> bool {
        self.core.unpacker_init();
        self.sums_data = vec![0; GRID.size(&self.core)];
        for slice in 0..self.timeslices() {
            let mut bunch_crossing = 0;
            for pin in 0..=MAX_JEMS {
                let ex = self.core.unpacker_neutral(pin, JEM_SUM_BITS);
                let ey = self.core.unpacker_neutral(pin, JEM_SUM_BITS);
                let et = self.core.unpacker_neutral(pin, JEM_SUM_BITS);
                let error = self.core.unpacker_neutral(pin, 1);
                self.set_subsums(slice, pin, ex, ey, et, error, error, error);
                if pin < BUNCH_CROSSING_BITS {
                    bunch_crossing |= self.core.unpacker_neutral(pin, 1) << pin;
                    self.core.unpacker_neutral(pin, PADDING_BITS);
                } else {
                    self.core.unpacker_neutral(pin, 1);
                }
            }
            self.core.set_bunch_crossing(bunch_crossing);

            let mut pin = BUNCH_CROSSING_BITS;
            let mut et_total = self.core.unpacker_neutral(pin, PADDING_BITS);
            pin += 1;
            et_total |= self.core.unpacker_neutral(pin, PADDING_BITS - 1) << PADDING_BITS;
            let et_total_error = self.core.unpacker_neutral(pin, 1);
            pin += 1;
            let sum_et_hits = self.core.unpacker_neutral(pin, PADDING_BITS);
            self.set_sum_et_hits(slice, sum_et_hits);
            pin += 1;
            let missing_et_hits = self.core.unpacker_neutral(pin, PADDING_BITS);
            self.set_missing_et_hits(slice, missing_et_hits);

            // Remote errors are two bits wide; local and total keep one and skip one
            pin += 1;
            let ex_remote = self.core.unpacker_neutral(pin, SUM_BITS);
            let ex_remote_error = self.core.unpacker_neutral(pin, 2);
            let ey_remote = self.core.unpacker_neutral(pin, SUM_BITS);
            let ey_remote_error = self.core.unpacker_neutral(pin, 2);

            pin += 1;
            let (ex_local, ex_local_error) = self.unpack_sum(pin, SUM_BITS, 1, 1);
            let (ey_local, ey_local_error) = self.unpack_sum(pin, SUM_BITS, 1, 1);
            pin += 1;
            let (ex_total, ex_total_error) = self.unpack_sum(pin, SUM_BITS, 1, 1);
            let (ey_total, ey_total_error) = self.unpack_sum(pin, SUM_BITS, 1, 1);

            pin += 1;
            let (et_remote, et_remote_error) = self.unpack_sum(pin, SUM_BITS - 1, 2, 1);
            let (et_local, et_local_error) = self.unpack_sum(pin, SUM_BITS - 1, 1, 2);

            self.set_subsums(
                slice,
                REMOTE,
                ex_remote,
                ey_remote,
                et_remote,
                ex_remote_error,
                ey_remote_error,
                et_remote_error,
            );
            self.set_subsums(
                slice,
                LOCAL,
                ex_local,
                ey_local,
                et_local,
                ex_local_error,
                ey_local_error,
                et_local_error,
            );
            self.set_subsums(
                slice,
                TOTAL,
                ex_total,
                ey_total,
                et_total,
                ex_total_error,
                ey_total_error,
                et_total_error,
            );

            for p in 0..=pin {
                self.core.check_neutral_parity(slice, p);
            }
        }
        self.core.finish_unpack()
    }

    /// Reads a sum, `error_bits` of error, then skips `skip_bits`.
    fn unpack_sum(
        &mut self,
        pin: usize,
        sum_bits: u32,
        error_bits: u32,
        skip_bits: u32,
    ) -> (u32, u32) {
        let sum = self.core.unpacker_neutral(pin, sum_bits);
        let error = self.core.unpacker_neutral(pin, error_bits);
        self.core.unpacker_neutral(pin, skip_bits);
        (sum, error)
    }
}
