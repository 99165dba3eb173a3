// In: src/bridge/status.rs

//! Monitoring summaries for decoded fragments.
//!
//! A [`FragmentStatus`] is filled while one fragment is walked. A
//! [`RodStatusSummary`] folds many of them together, plus the fragments that
//! were rejected outright, and serialises to JSON for downstream monitoring.

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use crate::compression::CompressionStats;
use crate::error::{L1CaloError, RodErrorKind, UnpackErrorKind};
use crate::sub_block::SubBlock;
use crate::types::word::SubBlockTrailer;

/// Number of sub-blocks whose trailer raised each flag.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrailerCounts {
    pub glink_timeout: u32,
    pub glink_down: u32,
    pub upstream_error: u32,
    pub daq_overflow: u32,
    pub bcn_mismatch: u32,
    pub glink_protocol: u32,
    pub glink_parity: u32,
}

impl TrailerCounts {
    pub fn record(&mut self, trailer: &SubBlockTrailer) {
        self.glink_timeout += trailer.glink_timeout as u32;
        self.glink_down += trailer.glink_down as u32;
        self.upstream_error += trailer.upstream_error as u32;
        self.daq_overflow += trailer.daq_overflow as u32;
        self.bcn_mismatch += trailer.bcn_mismatch as u32;
        self.glink_protocol += trailer.glink_protocol as u32;
        self.glink_parity += trailer.glink_parity as u32;
    }

    pub fn merge(&mut self, other: &TrailerCounts) {
        self.glink_timeout += other.glink_timeout;
        self.glink_down += other.glink_down;
        self.upstream_error += other.upstream_error;
        self.daq_overflow += other.daq_overflow;
        self.bcn_mismatch += other.bcn_mismatch;
        self.glink_protocol += other.glink_protocol;
        self.glink_parity += other.glink_parity;
    }

    pub fn total(&self) -> u32 {
        self.glink_timeout
            + self.glink_down
            + self.upstream_error
            + self.daq_overflow
            + self.bcn_mismatch
            + self.glink_protocol
            + self.glink_parity
    }
}

/// What one fragment decode ran into.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct FragmentStatus {
    pub source_id: u32,
    pub sub_blocks: u32,
    pub rois: u32,
    pub parity_errors: u32,
    /// Crate/module inconsistencies tolerated because structure checks were
    /// relaxed.
    pub structural: HashMap<RodErrorKind, u32>,
    /// Sub-blocks that failed to unpack but were kept.
    pub unpack_failures: HashMap<UnpackErrorKind, u32>,
    pub trailers: TrailerCounts,
    pub compression: CompressionStats,
}

impl FragmentStatus {
    pub fn new(source_id: u32) -> Self {
        Self {
            source_id,
            ..Self::default()
        }
    }

    pub(crate) fn record_sub_block(&mut self, block: &SubBlock) {
        self.sub_blocks += 1;
        self.parity_errors += block.core().parity_errors().len() as u32;
        if let Some(trailer) = block.core().trailer() {
            self.trailers.record(&trailer);
        }
        if let SubBlock::Ppm(ppm) = block {
            self.compression.merge(ppm.comp_stats());
        }
    }

    pub(crate) fn record_structural(&mut self, kind: RodErrorKind) {
        *self.structural.entry(kind).or_insert(0) += 1;
    }

    pub(crate) fn record_unpack_failure(&mut self, kind: UnpackErrorKind) {
        *self.unpack_failures.entry(kind).or_insert(0) += 1;
    }

    /// True when nothing at all was flagged.
    pub fn is_clean(&self) -> bool {
        self.parity_errors == 0
            && self.structural.is_empty()
            && self.unpack_failures.is_empty()
            && self.trailers.total() == 0
    }
}

/// Per-event (or per-run) roll-up of fragment statuses.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct RodStatusSummary {
    pub fragments: u32,
    pub decoded: u32,
    pub skipped: u32,
    pub sub_blocks: u32,
    pub rois: u32,
    pub parity_errors: u32,
    pub structural: HashMap<RodErrorKind, u32>,
    pub unpack_failures: HashMap<UnpackErrorKind, u32>,
    pub trailers: TrailerCounts,
    pub compression: CompressionStats,
}

impl RodStatusSummary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds in a fragment that decoded.
    pub fn record(&mut self, status: &FragmentStatus) {
        self.fragments += 1;
        self.decoded += 1;
        self.sub_blocks += status.sub_blocks;
        self.rois += status.rois;
        self.parity_errors += status.parity_errors;
        for (kind, count) in &status.structural {
            *self.structural.entry(*kind).or_insert(0) += count;
        }
        for (kind, count) in &status.unpack_failures {
            *self.unpack_failures.entry(*kind).or_insert(0) += count;
        }
        self.trailers.merge(&status.trailers);
        self.compression.merge(&status.compression);
    }

    /// Folds in a fragment that was rejected.
    pub fn record_failure(&mut self, error: &L1CaloError) {
        self.fragments += 1;
        self.skipped += 1;
        match error {
            L1CaloError::Structural { kind, .. } => {
                *self.structural.entry(*kind).or_insert(0) += 1;
            }
            L1CaloError::Unpack { kind, .. } => {
                *self.unpack_failures.entry(*kind).or_insert(0) += 1;
            }
            _ => {}
        }
    }

    pub fn to_json(&self) -> Result<String, L1CaloError> {
        Ok(serde_json::to_string(self)?)
    }
}
