//! Bit-level kernels shared by every sub-block type.

pub mod bitstream;
pub mod neutral;
