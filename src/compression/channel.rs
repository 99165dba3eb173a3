//! The per-channel layout catalogue shared by all compression versions.
//!
//! One channel is one LUT sample plus five FADC samples, each with BCID bits.
//! The encoder picks the first layout whose preconditions hold:
//!
//! | format | header        | used when                                           |
//! |--------|---------------|-----------------------------------------------------|
//! | 0, 1   | 0..=9         | LUT zero, no BCIDs, minimum in window, deltas < 8    |
//! | 2      | 10..=14       | LUT ≤ 3 bits (peak-only BCID), deltas ≤ 4 bits      |
//! | 3..=5  | 10..=14       | everything else; delta width 6, 8 or 10 bits        |
//! | 6      | 15            | LUT zero, all samples equal, no BCIDs (V01+)        |
//!
//! The versions differ in details captured by [`Dialect`].

use crate::kernels::bitstream::min_bits;
use crate::sub_block::core::SubBlockCore;
use crate::sub_block::ppm::PpmChannel;

pub(crate) const SLICES_LUT: usize = 1;
pub(crate) const SLICES_FADC: usize = 5;

const FADC_RANGE: i32 = 15;
const PEAK_ONLY: u32 = 4;
const LUT_DATA_BITS: u32 = 8;
const LUT_BCID_BITS: u32 = 3;
const FADC_DATA_BITS: u32 = 10;
const HEADER_BITS: u32 = 4;
const FORMAT_BITS: u32 = 2;
const SMALL_DELTA_BITS: u32 = 4;
const RANGED_HEADER: u32 = 10;
const CONSTANT_HEADER: u32 = 15;

/// Version-specific behaviour of the channel codec.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Dialect {
    /// Size of the format histogram.
    pub formats: usize,
    /// Swap the minimum sample into slot 0 before taking deltas.
    pub swap_minimum: bool,
    /// Format 6 exists.
    pub constant_format: bool,
    /// All five FADC BCIDs are sent, and a trigger BCID that disagrees with
    /// the LUT BCID forces them out.
    pub all_fadc_bcids: bool,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct ChannelCodec {
    pub dialect: Dialect,
    /// Lower edge of the small-signal window; may be negative.
    pub base: i32,
    /// Triggered FADC slice.
    pub trig: usize,
}

impl ChannelCodec {
    fn in_range(&self, value: i32) -> bool {
        value >= self.base && value <= self.base + FADC_RANGE
    }

    /// Packs one channel and returns the format used.
    pub fn encode(&self, core: &mut SubBlockCore, data: &PpmChannel) -> usize {
        let lut = data.lut.first().copied().unwrap_or(0);
        let lut_bcid = data.bcid_lut.first().copied().unwrap_or(0);
        let mut fadc = [0i32; SLICES_FADC];
        let mut fadc_bcid = [0u32; SLICES_FADC];
        for sl in 0..SLICES_FADC {
            fadc[sl] = data.fadc.get(sl).copied().unwrap_or(0) as i32;
            fadc_bcid[sl] = data.bcid_fadc.get(sl).copied().unwrap_or(0);
        }

        let mut min_fadc = fadc[0];
        let mut min_offset = 0;
        for (sl, &f) in fadc.iter().enumerate().skip(1) {
            if f < min_fadc {
                min_fadc = f;
                min_offset = sl;
            }
        }
        let fadc_same = fadc.iter().all(|&f| f == fadc[0]) && fadc_bcid.iter().all(|&b| b == 0);
        let no_lut = lut == 0 && lut_bcid == 0;

        // Format 6
        if self.dialect.constant_format && no_lut && fadc_same {
            core.packer(CONSTANT_HEADER, HEADER_BITS);
            if fadc[0] != 0 {
                core.packer(1, 1);
                core.packer(fadc[0] as u32, FADC_DATA_BITS);
            } else {
                core.packer(0, 1);
            }
            return 6;
        }

        let others: Vec<i32> = if self.dialect.swap_minimum {
            let mut swapped = fadc;
            swapped.swap(0, min_offset);
            swapped[1..].to_vec()
        } else {
            (0..SLICES_FADC)
                .filter(|&sl| sl != min_offset)
                .map(|sl| fadc[sl])
                .collect()
        };
        let deltas: Vec<u32> = others.iter().map(|&f| (f - min_fadc) as u32).collect();
        let lens: Vec<u32> = deltas.iter().map(|&d| min_bits(d)).collect();
        let mut max_len = lens.iter().copied().max().unwrap_or(0);

        let any_fadc_bcid = (0..SLICES_FADC).any(|sl| {
            if sl != self.trig {
                fadc_bcid[sl] != 0
            } else {
                self.dialect.all_fadc_bcids && fadc_bcid[sl] != (lut_bcid & 0x1)
            }
        });
        let min_in_range = self.in_range(min_fadc);

        // Formats 0, 1
        if no_lut && !any_fadc_bcid && min_in_range && max_len < 4 {
            let header = min_offset as u32 + if max_len == 3 { 5 } else { 0 };
            core.packer(header, HEADER_BITS);
            core.packer((min_fadc - self.base) as u32, SMALL_DELTA_BITS);
            let width = max_len.max(2);
            for &d in &deltas {
                core.packer(d, width);
            }
            return (width - 2) as usize;
        }

        // Format 2
        let peak_only = lut > 0 && lut_bcid == PEAK_ONLY;
        if min_bits(lut) <= 3
            && (no_lut || peak_only)
            && !any_fadc_bcid
            && min_in_range
            && max_len <= 4
        {
            core.packer(min_offset as u32 + RANGED_HEADER, HEADER_BITS);
            core.packer(0, FORMAT_BITS);
            if lut != 0 {
                core.packer(1, 1);
                core.packer(lut, 3);
            } else {
                core.packer(0, 1);
            }
            core.packer((min_fadc - self.base) as u32, SMALL_DELTA_BITS);
            for &d in &deltas {
                core.packer(d, SMALL_DELTA_BITS);
            }
            return 2;
        }

        // Formats 3, 4, 5
        core.packer(min_offset as u32 + RANGED_HEADER, HEADER_BITS);
        if !min_in_range {
            max_len = max_len.max(min_bits(min_fadc as u32));
        }
        let format: u32 = if max_len <= 6 {
            3
        } else if max_len <= 8 {
            4
        } else {
            5
        };
        core.packer(format - 2, FORMAT_BITS);
        let any_lut = !no_lut;
        core.packer(any_lut as u32, 1);
        core.packer(any_fadc_bcid as u32, 1);
        if any_lut {
            core.packer(lut, LUT_DATA_BITS);
            core.packer(lut_bcid, LUT_BCID_BITS);
        }
        if any_fadc_bcid {
            for sl in 0..SLICES_FADC {
                if self.dialect.all_fadc_bcids || sl != self.trig {
                    core.packer(fadc_bcid[sl], 1);
                }
            }
        }
        if min_in_range {
            core.packer(0, 1);
            core.packer((min_fadc - self.base) as u32, SMALL_DELTA_BITS);
        } else {
            core.packer(1, 1);
            core.packer(min_fadc as u32, format * 2);
        }
        for (&d, &len) in deltas.iter().zip(&lens) {
            if len <= SMALL_DELTA_BITS {
                core.packer(0, 1);
                core.packer(d, SMALL_DELTA_BITS);
            } else {
                core.packer(1, 1);
                core.packer(d, format * 2);
            }
        }
        format as usize
    }

    /// Unpacks one channel and returns it with the format it was sent in.
    pub fn decode(&self, core: &mut SubBlockCore) -> (PpmChannel, usize) {
        let mut data = PpmChannel::zeroed(SLICES_LUT, SLICES_FADC);
        let header = core.unpacker(HEADER_BITS);
        let format;
        let fadc;
        if header < RANGED_HEADER {
            let min_offset = (header % 5) as usize;
            format = header / 5;
            let min = core.unpacker(SMALL_DELTA_BITS) as i32 + self.base;
            fadc = self.place(core, min_offset, min, |core| core.unpacker(format + 2));
        } else if header < CONSTANT_HEADER || !self.dialect.constant_format {
            let min_offset = (header - RANGED_HEADER) as usize;
            format = core.unpacker(FORMAT_BITS) + 2;
            let any_lut = core.unpacker(1) == 1;
            if format == 2 {
                if any_lut {
                    data.lut[0] = core.unpacker(3);
                    data.bcid_lut[0] = PEAK_ONLY;
                }
                let min = core.unpacker(SMALL_DELTA_BITS) as i32 + self.base;
                fadc = self.place(core, min_offset, min, |core| core.unpacker(SMALL_DELTA_BITS));
            } else {
                let any_bcid = core.unpacker(1) == 1;
                if any_lut {
                    data.lut[0] = core.unpacker(LUT_DATA_BITS);
                    data.bcid_lut[0] = core.unpacker(LUT_BCID_BITS);
                }
                let trig_bcid = data.bcid_lut[0] & 0x1;
                for sl in 0..SLICES_FADC {
                    data.bcid_fadc[sl] = if self.dialect.all_fadc_bcids {
                        if any_bcid {
                            core.unpacker(1)
                        } else if sl == self.trig {
                            trig_bcid
                        } else {
                            0
                        }
                    } else if sl == self.trig {
                        trig_bcid
                    } else if any_bcid {
                        core.unpacker(1)
                    } else {
                        0
                    };
                }
                let min = if core.unpacker(1) == 1 {
                    core.unpacker(format * 2) as i32
                } else {
                    core.unpacker(SMALL_DELTA_BITS) as i32 + self.base
                };
                fadc = self.place(core, min_offset, min, |core| {
                    let len = if core.unpacker(1) == 1 {
                        format * 2
                    } else {
                        SMALL_DELTA_BITS
                    };
                    core.unpacker(len)
                });
            }
        } else {
            format = 6;
            let value = if core.unpacker(1) == 1 {
                core.unpacker(FADC_DATA_BITS) as i32
            } else {
                0
            };
            fadc = [value; SLICES_FADC];
        }
        for (slot, f) in data.fadc.iter_mut().zip(fadc) {
            *slot = f.max(0) as u32;
        }
        (data, format as usize)
    }

    /// Rebuilds the five samples from the minimum and the deltas in wire order.
    fn place<F>(&self, core: &mut SubBlockCore, min_offset: usize, min: i32, mut next: F) -> [i32; SLICES_FADC]
    where
        F: FnMut(&mut SubBlockCore) -> u32,
    {
        let mut fadc = [min; SLICES_FADC];
        if self.dialect.swap_minimum {
            for slot in fadc.iter_mut().skip(1) {
                *slot = next(core) as i32 + min;
            }
            if min_offset < SLICES_FADC {
                fadc.swap(0, min_offset);
            }
        } else {
            for (sl, slot) in fadc.iter_mut().enumerate() {
                if sl != min_offset {
                    *slot = next(core) as i32 + min;
                }
            }
        }
        fadc
    }
}
