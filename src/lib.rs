//! This file is the root of the `l1calo_bytestream` Rust crate.
//!
//! Its responsibilities are strictly limited to:
//! 1.  Declaring all the top-level modules of our library (`kernels`,
//!     `sub_block`, `compression`, `bridge`, etc.) so the Rust compiler knows
//!     they exist.
//! 2.  Re-exporting the handful of types most callers need.

//==================================================================================
// 0. Constants
//==================================================================================
/// The crate version, automatically set from Cargo.toml at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
//==================================================================================
// 1. Module Declarations
//==================================================================================
#[macro_use]
mod observability; // Make macros available throughout the crate

pub mod bridge;
pub mod compression;
pub mod config;
pub mod error;
pub mod kernels;
pub mod sub_block;
pub mod traits;
pub mod types;
pub mod utils;

//==================================================================================
// 2. Public Surface
//==================================================================================
pub use bridge::{
    decode_event, decode_fragment, encode_fragment, DecodedFragment, FragmentStatus,
    PpmModuleWriter, RodFragment, RodStatusSummary,
};
pub use config::CodecConfig;
pub use error::{L1CaloError, RodErrorKind, UnpackErrorKind};
pub use observability::enable_verbose_logging;
pub use sub_block::{ModuleFamily, SubBlock};
pub use traits::SubBlockCodec;
pub use types::{DataFormat, SubBlockHeader, SubBlockTrailer, UserHeader};
