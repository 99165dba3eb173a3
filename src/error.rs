// In: src/error.rs

//! This module defines the single, unified error type for the l1calo bytestream library.
//! It uses the `thiserror` crate to provide ergonomic, context-aware error handling.
//!
//! Codec-level failures inside a sub-block are flag based (`pack()`/`unpack()`
//! return `false`) and the reason is kept as an [`UnpackErrorKind`]. Only the
//! fragment layer turns failures into `Result::Err`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a sub-block failed to pack or unpack.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum UnpackErrorKind {
    UnsupportedVersion,
    UnsupportedFormat,
    CompressionVersion,
    CompressionSlices,
    DataTruncated,
    DataId,
    SourceId,
}

impl UnpackErrorKind {
    pub const ALL: [UnpackErrorKind; 7] = [
        UnpackErrorKind::UnsupportedVersion,
        UnpackErrorKind::UnsupportedFormat,
        UnpackErrorKind::CompressionVersion,
        UnpackErrorKind::CompressionSlices,
        UnpackErrorKind::DataTruncated,
        UnpackErrorKind::DataId,
        UnpackErrorKind::SourceId,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            UnpackErrorKind::UnsupportedVersion => "unsupported sub-block version",
            UnpackErrorKind::UnsupportedFormat => "unsupported data format",
            UnpackErrorKind::CompressionVersion => "unsupported compression version",
            UnpackErrorKind::CompressionSlices => "unsupported compression slice count",
            UnpackErrorKind::DataTruncated => "data truncated",
            UnpackErrorKind::DataId => "invalid data word id",
            UnpackErrorKind::SourceId => "invalid source id",
        }
    }
}

/// Structural problems found while walking a ROD fragment.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RodErrorKind {
    /// A data word appeared where a sub-block header was expected.
    MissingHeader,
    /// A module's sub-block sequence ended early or out of order.
    MissingSubBlock,
    CrateNumber,
    ModuleNumber,
    UserHeader,
    /// CMM header whose firmware field names no known CMM type.
    CmmType,
}

impl std::fmt::Display for RodErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RodErrorKind::MissingHeader => "missing sub-block header",
            RodErrorKind::MissingSubBlock => "missing sub-block",
            RodErrorKind::CrateNumber => "inconsistent crate number",
            RodErrorKind::ModuleNumber => "inconsistent module number",
            RodErrorKind::UserHeader => "invalid user header",
            RodErrorKind::CmmType => "unknown CMM firmware type",
        };
        f.write_str(s)
    }
}

impl std::fmt::Display for UnpackErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum L1CaloError {
    // =========================================================================
    // === High-Level, Semantic Errors
    // =========================================================================
    #[error("Fragment 0x{source_id:08x} rejected at word {position}: {kind}")]
    Structural {
        source_id: u32,
        position: usize,
        kind: RodErrorKind,
    },

    #[error("Sub-block unpack failed in fragment 0x{source_id:08x}: {kind}")]
    Unpack {
        source_id: u32,
        kind: UnpackErrorKind,
    },

    #[error("Sub-block pack failed: {0}")]
    Pack(UnpackErrorKind),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Internal logic error (this is a bug): {0}")]
    InternalError(String),

    // =========================================================================
    // === External Error Wrappers (Using #[from] for automatic conversion)
    // =========================================================================
    /// An error from the Serde JSON library, typically while reading a config.
    #[error("Serde JSON error: {0}")]
    SerdeJson(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An error from a safe byte-casting operation failing.
    #[error("Byte slice casting error: {0}")]
    PodCast(String), // Manual `From` impl is needed as bytemuck::PodCastError doesn't impl Error

    #[error("Buffer length mismatch: expected a multiple of {0}, got {1}")]
    BufferMismatch(usize, usize),
}

// =============================================================================
// === Manual `From` Implementations ===
// =============================================================================

impl From<bytemuck::PodCastError> for L1CaloError {
    fn from(err: bytemuck::PodCastError) -> Self {
        L1CaloError::PodCast(err.to_string())
    }
}
