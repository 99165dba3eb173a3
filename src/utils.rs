//! Word/byte conversions for raw fragments.
//!
//! Readout buffers arrive as little-endian bytes; the codecs work on `u32`
//! words. `bytemuck` does the casting without hand-written shifts.

use crate::error::L1CaloError;

/// Copies a word slice into its little-endian byte image.
pub fn words_to_bytes(words: &[u32]) -> Vec<u8> {
    bytemuck::cast_slice(words).to_vec()
}

/// Reads a byte buffer as 32-bit words. The buffer need not be aligned but
/// its length must be a multiple of 4.
pub fn bytes_to_words(bytes: &[u8]) -> Result<Vec<u32>, L1CaloError> {
    let size = std::mem::size_of::<u32>();
    if bytes.len() % size != 0 {
        return Err(L1CaloError::BufferMismatch(size, bytes.len()));
    }
    match bytemuck::try_cast_slice::<u8, u32>(bytes) {
        Ok(words) => Ok(words.to_vec()),
        Err(_) => Ok(bytes
            .chunks_exact(size)
            .map(bytemuck::pod_read_unaligned::<u32>)
            .collect()),
    }
}
