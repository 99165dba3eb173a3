//! Word layouts as data.
//!
//! Every fixed-layout word on the wire is described by a [`WordLayout`]: a
//! named list of [`BitField`]s. Codecs read and write through the fields, and
//! `registered_layouts()` lets the tests check that no layout overlaps itself
//! or spills past bit 31.

/// One contiguous field of a 32-bit word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitField {
    pub name: &'static str,
    pub bit: u32,
    pub width: u32,
}

impl BitField {
    pub const fn new(name: &'static str, bit: u32, width: u32) -> Self {
        Self { name, bit, width }
    }

    pub const fn mask(&self) -> u32 {
        if self.width >= 32 {
            u32::MAX
        } else {
            (1u32 << self.width) - 1
        }
    }

    /// Extracts the field from `word`.
    #[inline]
    pub const fn get(&self, word: u32) -> u32 {
        (word >> self.bit) & self.mask()
    }

    /// `value` masked and shifted into position.
    #[inline]
    pub const fn put(&self, value: u32) -> u32 {
        (value & self.mask()) << self.bit
    }

    /// `word` with the field replaced by `value`.
    #[inline]
    pub const fn set(&self, word: u32, value: u32) -> u32 {
        (word & !(self.mask() << self.bit)) | self.put(value)
    }

    pub const fn span(&self) -> u32 {
        self.mask() << self.bit
    }
}

#[derive(Debug, Clone, Copy)]
pub struct WordLayout {
    pub name: &'static str,
    pub fields: &'static [BitField],
}

impl WordLayout {
    pub const fn new(name: &'static str, fields: &'static [BitField]) -> Self {
        Self { name, fields }
    }

    pub fn field(&self, name: &str) -> Option<&BitField> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Bits claimed by any field.
    pub fn used_bits(&self) -> u32 {
        self.fields.iter().fold(0, |acc, f| acc | f.span())
    }

    /// Checks that every field fits in 32 bits and that no two fields share a bit.
    pub fn validate(&self) -> Result<(), String> {
        let mut used = 0u32;
        for field in self.fields {
            if field.width == 0 || field.bit + field.width > 32 {
                return Err(format!(
                    "{}.{} does not fit in a word (bit {}, width {})",
                    self.name, field.name, field.bit, field.width
                ));
            }
            if used & field.span() != 0 {
                return Err(format!("{}.{} overlaps another field", self.name, field.name));
            }
            used |= field.span();
        }
        Ok(())
    }
}

/// Every word layout the crate reads or writes.
pub fn registered_layouts() -> Vec<&'static WordLayout> {
    use crate::sub_block::{cmm, cmm_cp, cmm_energy, cmm_jet, cpm, cpm_roi, jem, jem_roi, ppm};
    use crate::types::{user_header, word};
    vec![
        &word::HEADER_LAYOUT,
        &word::TRAILER_LAYOUT,
        &user_header::USER_HEADER_LAYOUT,
        &ppm::LUT_WORD_LAYOUT,
        &ppm::FADC_WORD_LAYOUT,
        &ppm::ERROR_WORD_LAYOUT,
        &cpm::TOWER_WORD_LAYOUT,
        &cpm::HITS_WORD_LAYOUT,
        &jem::JET_ELEMENT_LAYOUT,
        &jem::HITS_WORD_LAYOUT,
        &jem::ENERGY_WORD_LAYOUT,
        &cmm::MODULE_FIELD_LAYOUT,
        &cmm_cp::HITS_WORD_LAYOUT,
        &cmm_jet::MAIN_WORD_LAYOUT,
        &cmm_jet::FORWARD_WORD_LAYOUT,
        &cmm_jet::ET_MAP_WORD_LAYOUT,
        &cmm_energy::JEM_WORD_LAYOUT,
        &cmm_energy::SUM_WORD_LAYOUT,
        &cmm_energy::HITS_MAP_WORD_LAYOUT,
        &cpm_roi::ROI_WORD_LAYOUT,
        &jem_roi::ROI_WORD_LAYOUT,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_get_put_set() {
        let f = BitField::new("f", 4, 3);
        assert_eq!(f.mask(), 0x7);
        assert_eq!(f.put(0xf), 0x70);
        assert_eq!(f.get(0x1234_56f0), 0x7);
        assert_eq!(f.set(0xffff_ffff, 0), 0xffff_ff8f);
        assert_eq!(BitField::new("w", 0, 32).mask(), u32::MAX);
    }

    #[test]
    fn test_overlap_is_reported() {
        static FIELDS: [BitField; 2] = [BitField::new("a", 0, 4), BitField::new("b", 3, 2)];
        let layout = WordLayout::new("bad", &FIELDS);
        assert!(layout.validate().is_err());
    }

    #[test]
    fn test_registered_layouts_are_disjoint() {
        let layouts = registered_layouts();
        assert!(layouts.len() >= 20);
        for layout in layouts {
            if let Err(e) = layout.validate() {
                panic!("{}", e);
            }
        }
    }
}
