//! The neutral-format multiplexer.
//!
//! Up to 20 pins stream bits independently. Bit `b` of pin `p` is bit `p` of
//! payload word `cursor(p) + b`, so each pin is a column through the payload.
//! Every pin keeps a running odd parity that the writer appends as a trailing
//! bit and the reader checks.

use bitvec::prelude::*;

/// Number of pin columns available in a payload word.
pub const MAX_PINS: usize = 20;

/// Fill value for payload words created by the multiplexer.
pub const DATA_VALID_MARKER: u32 = 0x0040_0000;

/// Odd parity of `nbits` of `datum`, folded onto `init`.
#[inline]
pub fn parity_bit(init: u32, datum: u32, nbits: u32) -> u32 {
    let bits = datum & crate::kernels::bitstream::mask(nbits);
    (init ^ bits.count_ones()) & 0x1
}

#[derive(Debug, Clone)]
pub struct NeutralMux {
    current_pin_bit: [usize; MAX_PINS],
    odd_parity: [u32; MAX_PINS],
    data_words: usize,
    success: bool,
}

impl Default for NeutralMux {
    fn default() -> Self {
        Self {
            current_pin_bit: [0; MAX_PINS],
            odd_parity: [1; MAX_PINS],
            data_words: 0,
            success: true,
        }
    }
}

impl NeutralMux {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Rewinds every pin for reading a payload of `data_words` words.
    pub fn init_unpack(&mut self, data_words: usize) {
        self.reset();
        self.data_words = data_words;
    }

    pub fn success(&self) -> bool {
        self.success
    }

    /// Bits written to or read from `pin` so far.
    pub fn pin_bits(&self, pin: usize) -> usize {
        self.current_pin_bit.get(pin).copied().unwrap_or(0)
    }

    /// Writes `nbits` of `datum` down the column of `pin`, growing `out` with
    /// marker words as needed.
    pub fn pack(&mut self, out: &mut Vec<u32>, pin: usize, datum: u32, nbits: u32) {
        if pin >= MAX_PINS || nbits == 0 {
            return;
        }
        let nbits = nbits.min(32) as usize;
        let start = self.current_pin_bit[pin];
        if out.len() < start + nbits {
            out.resize(start + nbits, DATA_VALID_MARKER);
        }
        for (offset, bit) in datum.view_bits::<Lsb0>()[..nbits].iter().by_vals().enumerate() {
            if bit {
                out[start + offset] |= 1 << pin;
                self.odd_parity[pin] ^= 1;
            }
        }
        self.current_pin_bit[pin] += nbits;
        self.data_words = self.data_words.max(out.len());
    }

    /// Appends the running parity of `pin` and restarts it.
    pub fn pack_parity(&mut self, out: &mut Vec<u32>, pin: usize) {
        if pin >= MAX_PINS {
            return;
        }
        let parity = self.odd_parity[pin];
        self.pack(out, pin, parity, 1);
        self.odd_parity[pin] = 1;
    }

    pub fn unpack(&mut self, data: &[u32], pin: usize, nbits: u32) -> u32 {
        if nbits == 0 {
            return 0;
        }
        let nbits = nbits.min(32) as usize;
        let limit = self.data_words.min(data.len());
        if pin >= MAX_PINS || self.current_pin_bit[pin] + nbits > limit {
            self.success = false;
            return 0;
        }
        let start = self.current_pin_bit[pin];
        let mut word = 0u32;
        {
            let bits = word.view_bits_mut::<Lsb0>();
            for (offset, source) in data[start..start + nbits].iter().enumerate() {
                bits.set(offset, (source >> pin) & 0x1 == 1);
            }
        }
        self.current_pin_bit[pin] += nbits;
        self.odd_parity[pin] = parity_bit(self.odd_parity[pin], word, nbits as u32);
        word
    }

    /// Reads the parity bit of `pin` and reports whether it disagrees with the
    /// parity computed over the bits read since the last check.
    pub fn unpack_parity_error(&mut self, data: &[u32], pin: usize) -> bool {
        if pin >= MAX_PINS {
            return true;
        }
        let expected = self.odd_parity[pin];
        let received = self.unpack(data, pin, 1);
        self.odd_parity[pin] = 1;
        received != expected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pins_are_columns() {
        let mut out = Vec::new();
        let mut mux = NeutralMux::default();
        mux.pack(&mut out, 0, 0b101, 3);
        mux.pack(&mut out, 3, 0b011, 3);
        assert_eq!(out.len(), 3);
        assert_eq!(out[0], DATA_VALID_MARKER | 0b1001);
        assert_eq!(out[1], DATA_VALID_MARKER | 0b1000);
        assert_eq!(out[2], DATA_VALID_MARKER | 0b0001);
    }

    #[test]
    fn test_parity_detects_single_flips() {
        let mut out = Vec::new();
        let mut mux = NeutralMux::default();
        for pin in 0..MAX_PINS {
            mux.pack(&mut out, pin, 0x2a5 ^ pin as u32, 11);
            mux.pack_parity(&mut out, pin);
        }

        let mut reader = NeutralMux::default();
        reader.init_unpack(out.len());
        for pin in 0..MAX_PINS {
            assert_eq!(reader.unpack(&out, pin, 11), 0x2a5 ^ pin as u32);
            assert!(!reader.unpack_parity_error(&out, pin));
        }
        assert!(reader.success());

        for pin in [0usize, 7, 19] {
            for bit in 0..12 {
                let mut corrupted = out.clone();
                corrupted[bit] ^= 1 << pin;
                let mut reader = NeutralMux::default();
                reader.init_unpack(corrupted.len());
                reader.unpack(&corrupted, pin, 11);
                assert!(reader.unpack_parity_error(&corrupted, pin));
            }
        }
    }

    #[test]
    fn test_parity_restarts_after_check() {
        let mut out = Vec::new();
        let mut mux = NeutralMux::default();
        mux.pack(&mut out, 2, 1, 1);
        mux.pack_parity(&mut out, 2);
        mux.pack(&mut out, 2, 0, 1);
        mux.pack_parity(&mut out, 2);
        assert_eq!(out[1] >> 2 & 1, 0);
        assert_eq!(out[3] >> 2 & 1, 1);
    }

    #[test]
    fn test_reading_past_end_fails() {
        let out = vec![DATA_VALID_MARKER; 4];
        let mut reader = NeutralMux::default();
        reader.init_unpack(out.len());
        reader.unpack(&out, 1, 4);
        assert!(reader.success());
        assert_eq!(reader.unpack(&out, 1, 1), 0);
        assert!(!reader.success());
    }

    #[test]
    fn test_parity_bit_helper() {
        assert_eq!(parity_bit(1, 0, 8), 1);
        assert_eq!(parity_bit(1, 0b111, 8), 0);
        assert_eq!(parity_bit(0, 0x1ff, 8), 0);
    }
}
