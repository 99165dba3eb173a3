//! Serial bit packing over a sequence of 32-bit payload words.
//!
//! Values are appended least-significant bit first. A value that does not fit
//! in the current word spills its high bits into the next one. In streamed
//! mode only the low 31 bits of each word carry data; bit 31 is always zero
//! so a streamed payload word can never be mistaken for a header.

use num_traits::{PrimInt, Unsigned};

//==================================================================================
// 1. Helpers
//==================================================================================

pub const MAX_WORD_BITS: u32 = 32;
pub const MAX_STREAMED_BITS: u32 = 31;
const MAX_WORD_MASK: u32 = 0xffff_ffff;
const MAX_STREAMED_MASK: u32 = 0x7fff_ffff;

/// Mask of the low `nbits` bits. `mask(32)` is all ones.
#[inline]
pub fn mask(nbits: u32) -> u32 {
    if nbits >= 32 {
        u32::MAX
    } else {
        (1u32 << nbits) - 1
    }
}

/// Smallest field width able to hold `value`; zero for zero.
#[inline]
pub fn min_bits<T: PrimInt + Unsigned>(value: T) -> u32 {
    (std::mem::size_of::<T>() as u32 * 8) - value.leading_zeros()
}

fn limits(streamed: bool) -> (u32, u32) {
    if streamed {
        (MAX_STREAMED_BITS, MAX_STREAMED_MASK)
    } else {
        (MAX_WORD_BITS, MAX_WORD_MASK)
    }
}

//==================================================================================
// 2. Packer
//==================================================================================

#[derive(Debug, Clone)]
pub struct Packer {
    bitword: u32,
    current_bit: u32,
    max_bits: u32,
    max_mask: u32,
}

impl Default for Packer {
    fn default() -> Self {
        Self::new(false)
    }
}

impl Packer {
    pub fn new(streamed: bool) -> Self {
        let (max_bits, max_mask) = limits(streamed);
        Self {
            bitword: 0,
            current_bit: 0,
            max_bits,
            max_mask,
        }
    }

    /// Switches between 32-bit and 31-bit words. Must precede any packing.
    pub fn set_streamed(&mut self, streamed: bool) {
        let (max_bits, max_mask) = limits(streamed);
        self.max_bits = max_bits;
        self.max_mask = max_mask;
    }

    pub fn is_streamed(&self) -> bool {
        self.max_bits == MAX_STREAMED_BITS
    }

    pub fn reset(&mut self) {
        self.bitword = 0;
        self.current_bit = 0;
    }

    /// Bits waiting in the accumulator.
    pub fn pending_bits(&self) -> u32 {
        self.current_bit
    }

    /// Appends the low `nbits` of `datum` to `out`.
    pub fn pack(&mut self, out: &mut Vec<u32>, datum: u32, nbits: u32) {
        if nbits == 0 {
            return;
        }
        let nbits = nbits.min(MAX_WORD_BITS);
        let datum = datum & mask(nbits);
        self.bitword |= datum.checked_shl(self.current_bit).unwrap_or(0);
        self.current_bit += nbits;
        if self.current_bit >= self.max_bits {
            out.push(self.bitword & self.max_mask);
            let bits_left = self.current_bit - self.max_bits;
            if bits_left > 0 {
                self.bitword = datum.checked_shr(nbits - bits_left).unwrap_or(0);
                self.current_bit = bits_left;
            } else {
                self.bitword = 0;
                self.current_bit = 0;
            }
        }
    }

    /// Emits the partially filled accumulator, if any.
    pub fn flush(&mut self, out: &mut Vec<u32>) {
        if self.current_bit > 0 {
            out.push(self.bitword & self.max_mask);
            self.bitword = 0;
            self.current_bit = 0;
        }
    }
}

//==================================================================================
// 3. Unpacker
//==================================================================================

/// Mirror of [`Packer`]. Running off the end of the payload clears a sticky
/// success flag and yields zeros instead of panicking.
#[derive(Debug, Clone)]
pub struct Unpacker {
    bitword: u32,
    current_bit: u32,
    position: usize,
    max_bits: u32,
    success: bool,
}

impl Default for Unpacker {
    fn default() -> Self {
        Self::new(false)
    }
}

impl Unpacker {
    pub fn new(streamed: bool) -> Self {
        Self {
            bitword: 0,
            current_bit: 0,
            position: 0,
            max_bits: limits(streamed).0,
            success: true,
        }
    }

    pub fn set_streamed(&mut self, streamed: bool) {
        self.max_bits = limits(streamed).0;
    }

    /// Rewinds to the start of `data`.
    pub fn init(&mut self, data: &[u32]) {
        self.current_bit = 0;
        self.position = 0;
        self.bitword = data.first().copied().unwrap_or(0);
        self.success = true;
    }

    pub fn success(&self) -> bool {
        self.success
    }

    /// Index of the payload word the cursor is in.
    pub fn position(&self) -> usize {
        self.position
    }

    pub fn unpack(&mut self, data: &[u32], nbits: u32) -> u32 {
        if nbits == 0 {
            return 0;
        }
        if self.position >= data.len() {
            self.success = false;
            return 0;
        }
        let nbits = nbits.min(MAX_WORD_BITS);
        let nbits_done = nbits.min(self.max_bits - self.current_bit);
        let mut word = (self.bitword >> self.current_bit) & mask(nbits_done);
        self.current_bit += nbits;
        let mut bits_left = 0;
        if self.current_bit >= self.max_bits {
            self.bitword = 0;
            self.position += 1;
            if let Some(&next) = data.get(self.position) {
                self.bitword = next;
            }
            self.current_bit = 0;
            bits_left = nbits - nbits_done;
        }
        if bits_left > 0 {
            if self.position >= data.len() {
                self.success = false;
                return word;
            }
            word |= (self.bitword & mask(bits_left)) << nbits_done;
            self.current_bit = bits_left;
        }
        word
    }
}

//==================================================================================
// Unit Tests
//==================================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn test_min_bits_full_domain() {
        assert_eq!(min_bits(0u32), 0);
        assert_eq!(min_bits(1u32), 1);
        for n in 1..32u32 {
            assert_eq!(min_bits((1u32 << n) - 1), n);
            assert_eq!(min_bits(1u32 << n), n + 1);
        }
        assert_eq!(min_bits(u32::MAX), 32);

        let mut rng = rand::rng();
        for _ in 0..10_000 {
            let v: u32 = rng.random();
            let n = min_bits(v);
            assert!((v as u64) < (1u64 << n));
            assert!(n == 0 || (v as u64) >= (1u64 << (n - 1)));
        }
    }

    #[test]
    fn test_min_bits_other_widths() {
        assert_eq!(min_bits(0x3ffu16), 10);
        assert_eq!(min_bits(255u8), 8);
    }

    #[test]
    fn test_pack_crosses_word_boundary() {
        let mut out = Vec::new();
        let mut packer = Packer::new(false);
        packer.pack(&mut out, 0xabc, 12);
        packer.pack(&mut out, 0x12345, 20);
        packer.pack(&mut out, 0x3, 2);
        packer.flush(&mut out);
        assert_eq!(out, vec![0x1234_5abc, 0x3]);
    }

    #[test]
    fn test_streamed_words_keep_top_bit_clear() {
        let mut out = Vec::new();
        let mut packer = Packer::new(true);
        for _ in 0..40 {
            packer.pack(&mut out, 0xffff_ffff, 32);
        }
        packer.flush(&mut out);
        assert!(out.iter().all(|w| w & 0x8000_0000 == 0));

        let mut unpacker = Unpacker::new(true);
        unpacker.init(&out);
        for _ in 0..40 {
            assert_eq!(unpacker.unpack(&out, 32), 0xffff_ffff);
        }
        assert!(unpacker.success());
    }

    #[test]
    fn test_random_widths_round_trip() {
        let mut rng = rand::rng();
        for streamed in [false, true] {
            let fields: Vec<(u32, u32)> = (0..500)
                .map(|_| {
                    let n = rng.random_range(0..=32u32);
                    (rng.random::<u32>() & mask(n), n)
                })
                .collect();
            let mut out = Vec::new();
            let mut packer = Packer::new(streamed);
            for &(v, n) in &fields {
                packer.pack(&mut out, v, n);
            }
            packer.flush(&mut out);

            let mut unpacker = Unpacker::new(streamed);
            unpacker.init(&out);
            for &(v, n) in &fields {
                assert_eq!(unpacker.unpack(&out, n), v);
            }
            assert!(unpacker.success());
        }
    }

    #[test]
    fn test_truncation_is_sticky() {
        let data = vec![0xffff_ffffu32];
        let mut unpacker = Unpacker::new(false);
        unpacker.init(&data);
        assert_eq!(unpacker.unpack(&data, 16), 0xffff);
        assert!(unpacker.success());
        assert_eq!(unpacker.unpack(&data, 24), 0xffff);
        assert!(!unpacker.success());
        assert_eq!(unpacker.unpack(&data, 4), 0);
        assert!(!unpacker.success());
    }

    #[test]
    fn test_empty_payload_fails_on_first_read() {
        let mut unpacker = Unpacker::default();
        unpacker.init(&[]);
        assert!(unpacker.success());
        assert_eq!(unpacker.unpack(&[], 0), 0);
        assert!(unpacker.success());
        unpacker.unpack(&[], 1);
        assert!(!unpacker.success());
    }
}
