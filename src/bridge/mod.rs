// In: src/bridge/mod.rs

// ====================================================================================
// ARCHITECTURAL OVERVIEW: The Bridge Layer
// ====================================================================================
//
// The `bridge` is the fragment-level API of the library. Sub-blocks know how to
// pack and unpack themselves; the bridge knows how they are strung together in
// a ROD fragment and turns codec flags into `Result`s and status counters.
//
// Data Flow (Decoding):
//
//   1. [decode_event]     -> Receives (RodFragment, ModuleFamily) pairs
//         |
//         `-> calls for each fragment ->
//
//   2. [decode_fragment]  -> Checks the user header, then walks the words:
//         |
//         `-> a. Bare RoI words (RoI families only)
//         |
//         `-> b. PPM modules: data sub-blocks in seqno order + optional error block
//         |
//         `-> c. Everything else: one sub-block typed by `SubBlock::for_header`
//
//   3. [DecodedFragment]  -> Sub-blocks, RoIs and a `FragmentStatus`
//
//   4. [RodStatusSummary] -> Folded over all fragments, skipped ones included
//
//
// Data Flow (Encoding):
//
//   1. [PpmModuleWriter]  -> 64 channels + error words -> packed PPM sub-blocks
//                            with trailers derived from the error map
//
//   2. [encode_fragment]  -> User header + every sub-block, packed and written
//
// ====================================================================================
pub mod decoder;
pub mod encoder;
pub mod status;

use serde::{Deserialize, Serialize};

pub use crate::sub_block::ModuleFamily;
pub use decoder::{decode_event, decode_fragment, DecodedFragment};
pub use encoder::{encode_fragment, PpmModuleWriter};
pub use status::{FragmentStatus, RodStatusSummary, TrailerCounts};

/// The words of one ROD fragment, as handed over by the readout.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct RodFragment {
    pub source_id: u32,
    pub words: Vec<u32>,
}

impl RodFragment {
    pub fn new(source_id: u32, words: Vec<u32>) -> Self {
        Self { source_id, words }
    }

    /// Builds a fragment from its little-endian byte image.
    pub fn from_bytes(source_id: u32, bytes: &[u8]) -> Result<Self, crate::error::L1CaloError> {
        Ok(Self::new(source_id, crate::utils::bytes_to_words(bytes)?))
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        crate::utils::words_to_bytes(&self.words)
    }
}
