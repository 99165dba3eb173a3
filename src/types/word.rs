//! Sub-block header and trailer words.
//!
//! The header is always the first word of a sub-block. The trailer (a
//! "status" word) is optional and only written when it carries an error.
//! The free functions classify a bare word so a reader can pick the concrete
//! sub-block type before consuming anything.

use serde::{Deserialize, Serialize};

use super::layout::{BitField, WordLayout};

//==================================================================================
// 1. Word Classification
//==================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WordType {
    Header,
    Status,
    Data,
}

const HEADER_PATTERN: BitField = BitField::new("header_pattern", 30, 2);
const STATUS_FLAG: BitField = BitField::new("status_flag", 28, 1);
const HEADER_PATTERN_VALUE: u32 = 0x3;
const STATUS_FLAG_VALUE: u32 = 0x1;

/// Sequence number reserved for the PPM error block.
pub const ERROR_MARKER: u32 = 63;

/// Word id of PPM, CPM and JEM sub-blocks.
pub const MODULE_WORD_ID: u32 = 0xc;
/// Word id of CMM sub-blocks.
pub const CMM_WORD_ID: u32 = 0xe;

/// Classifies a word from its top nibble alone.
pub fn word_type(word: u32) -> WordType {
    if HEADER_PATTERN.get(word) == HEADER_PATTERN_VALUE {
        if STATUS_FLAG.get(word) == STATUS_FLAG_VALUE {
            WordType::Status
        } else {
            WordType::Header
        }
    } else {
        WordType::Data
    }
}

/// Supported data formats. Codes 4..=7 are legal in the header but have no codec.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DataFormat {
    Neutral = 0,
    Uncompressed = 1,
    Compressed = 2,
    SuperCompressed = 3,
}

impl DataFormat {
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(DataFormat::Neutral),
            1 => Some(DataFormat::Uncompressed),
            2 => Some(DataFormat::Compressed),
            3 => Some(DataFormat::SuperCompressed),
            _ => None,
        }
    }

    pub fn code(self) -> u32 {
        self as u32
    }
}

//==================================================================================
// 2. Header
//==================================================================================

pub const WORD_ID: BitField = BitField::new("word_id", 28, 4);
pub const VERSION: BitField = BitField::new("version", 25, 3);
pub const FORMAT: BitField = BitField::new("format", 22, 3);
pub const SEQNO: BitField = BitField::new("seqno", 16, 6);
pub const CRATE: BitField = BitField::new("crate", 12, 4);
pub const MODULE: BitField = BitField::new("module", 8, 4);
pub const SLICES2: BitField = BitField::new("slices2", 4, 4);
pub const SLICES1: BitField = BitField::new("slices1", 0, 4);

pub static HEADER_LAYOUT: WordLayout = WordLayout::new(
    "sub_block_header",
    &[WORD_ID, VERSION, FORMAT, SEQNO, CRATE, MODULE, SLICES2, SLICES1],
);

/// Decoded sub-block header. `format` is kept raw so unsupported codes survive
/// a decode and can be reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SubBlockHeader {
    pub word_id: u32,
    pub version: u32,
    pub format: u32,
    pub seqno: u32,
    pub crate_id: u32,
    pub module: u32,
    pub slices2: u32,
    pub slices1: u32,
}

impl SubBlockHeader {
    pub fn decode(word: u32) -> Self {
        Self {
            word_id: WORD_ID.get(word),
            version: VERSION.get(word),
            format: FORMAT.get(word),
            seqno: SEQNO.get(word),
            crate_id: CRATE.get(word),
            module: MODULE.get(word),
            slices2: SLICES2.get(word),
            slices1: SLICES1.get(word),
        }
    }

    pub fn encode(&self) -> u32 {
        WORD_ID.put(self.word_id)
            | VERSION.put(self.version)
            | FORMAT.put(self.format)
            | SEQNO.put(self.seqno)
            | CRATE.put(self.crate_id)
            | MODULE.put(self.module)
            | SLICES2.put(self.slices2)
            | SLICES1.put(self.slices1)
    }

    pub fn data_format(&self) -> Option<DataFormat> {
        DataFormat::from_code(self.format)
    }

    pub fn is_cmm(&self) -> bool {
        self.word_id == CMM_WORD_ID
    }

    /// PPM error block: uncompressed format with the error marker as seqno.
    pub fn is_error_block(&self) -> bool {
        self.format == DataFormat::Uncompressed.code() && self.seqno == ERROR_MARKER
    }
}

pub fn word_id(word: u32) -> u32 {
    WORD_ID.get(word)
}

pub fn version(word: u32) -> u32 {
    VERSION.get(word)
}

pub fn format(word: u32) -> u32 {
    FORMAT.get(word)
}

pub fn seqno(word: u32) -> u32 {
    SEQNO.get(word)
}

pub fn crate_id(word: u32) -> u32 {
    CRATE.get(word)
}

pub fn module(word: u32) -> u32 {
    MODULE.get(word)
}

pub fn is_cmm_block(word: u32) -> bool {
    word_id(word) == CMM_WORD_ID
}

//==================================================================================
// 3. Trailer
//==================================================================================

pub const TRAILER_ID: BitField = BitField::new("word_id_status", 28, 4);
pub const FAILING_BCN: BitField = BitField::new("failing_bcn", 22, 6);
pub const TRAILER_SEQNO: BitField = BitField::new("seqno", 16, 6);
pub const TRAILER_CRATE: BitField = BitField::new("crate", 12, 4);
pub const TRAILER_MODULE: BitField = BitField::new("module", 8, 4);
pub const GLINK_TIMEOUT: BitField = BitField::new("glink_timeout", 7, 1);
pub const GLINK_DOWN: BitField = BitField::new("glink_down", 6, 1);
pub const UPSTREAM_ERROR: BitField = BitField::new("upstream_error", 4, 1);
pub const DAQ_OVERFLOW: BitField = BitField::new("daq_overflow", 3, 1);
pub const BCN_MISMATCH: BitField = BitField::new("bcn_mismatch", 2, 1);
pub const GLINK_PROTOCOL: BitField = BitField::new("glink_protocol", 1, 1);
pub const GLINK_PARITY: BitField = BitField::new("glink_parity", 0, 1);

pub static TRAILER_LAYOUT: WordLayout = WordLayout::new(
    "sub_block_trailer",
    &[
        TRAILER_ID,
        FAILING_BCN,
        TRAILER_SEQNO,
        TRAILER_CRATE,
        TRAILER_MODULE,
        GLINK_TIMEOUT,
        GLINK_DOWN,
        UPSTREAM_ERROR,
        DAQ_OVERFLOW,
        BCN_MISMATCH,
        GLINK_PROTOCOL,
        GLINK_PARITY,
    ],
);

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SubBlockTrailer {
    pub failing_bcn: u32,
    pub glink_timeout: bool,
    pub glink_down: bool,
    pub upstream_error: bool,
    pub daq_overflow: bool,
    pub bcn_mismatch: bool,
    pub glink_protocol: bool,
    pub glink_parity: bool,
}

impl SubBlockTrailer {
    /// The error payload of the word, without the copied header fields.
    fn error_bits(&self) -> u32 {
        FAILING_BCN.put(self.failing_bcn)
            | GLINK_TIMEOUT.put(self.glink_timeout as u32)
            | GLINK_DOWN.put(self.glink_down as u32)
            | UPSTREAM_ERROR.put(self.upstream_error as u32)
            | DAQ_OVERFLOW.put(self.daq_overflow as u32)
            | BCN_MISMATCH.put(self.bcn_mismatch as u32)
            | GLINK_PROTOCOL.put(self.glink_protocol as u32)
            | GLINK_PARITY.put(self.glink_parity as u32)
    }

    pub fn is_error(&self) -> bool {
        self.error_bits() != 0
    }

    /// Trailer word for a sub-block with `header`, or zero when nothing is set.
    pub fn encode(&self, header: &SubBlockHeader) -> u32 {
        let bits = self.error_bits();
        if bits == 0 {
            return 0;
        }
        bits | TRAILER_ID.put(header.word_id | STATUS_FLAG_VALUE)
            | TRAILER_SEQNO.put(header.seqno)
            | TRAILER_CRATE.put(header.crate_id)
            | TRAILER_MODULE.put(header.module)
    }

    pub fn decode(word: u32) -> Self {
        Self {
            failing_bcn: FAILING_BCN.get(word),
            glink_timeout: GLINK_TIMEOUT.get(word) != 0,
            glink_down: GLINK_DOWN.get(word) != 0,
            upstream_error: UPSTREAM_ERROR.get(word) != 0,
            daq_overflow: DAQ_OVERFLOW.get(word) != 0,
            bcn_mismatch: BCN_MISMATCH.get(word) != 0,
            glink_protocol: GLINK_PROTOCOL.get(word) != 0,
            glink_parity: GLINK_PARITY.get(word) != 0,
        }
    }
}
