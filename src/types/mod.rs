//! This module defines the word-level data representations shared by every
//! sub-block: layout descriptors, the header/trailer codec and the user header.

pub mod layout;
pub mod user_header;
pub mod word;

// Re-export the main type(s) for easier access.
pub use layout::{BitField, WordLayout};
pub use user_header::UserHeader;
pub use word::{word_type, DataFormat, SubBlockHeader, SubBlockTrailer, WordType};
