//! Preprocessor module (PPM) sub-block.
//!
//! A PPM sub-block carries LUT and FADC samples for 16 channels
//! (uncompressed) or all 64 channels of a module (neutral and compressed
//! formats), plus an error word per G-Link pin. Samples are kept in a flat
//! "datamap" of 11-bit words: LUT slices first, then FADC slices, per channel.

use crate::compression::{self, CompressionStats, CompressionVersion};
use crate::config::PpmConfig;
use crate::error::UnpackErrorKind;
use crate::sub_block::core::SubBlockCore;
use crate::types::layout::{BitField, WordLayout};
use crate::types::word::{DataFormat, SubBlockHeader, ERROR_MARKER, MODULE_WORD_ID};

//==================================================================================
// 1. Layouts & Constants
//==================================================================================

pub const LUT: BitField = BitField::new("lut", 0, 8);
pub const BCID_LUT: BitField = BitField::new("bcid_lut", 8, 3);
pub const BCID_FADC: BitField = BitField::new("bcid_fadc", 0, 1);
pub const FADC: BitField = BitField::new("fadc", 1, 10);

pub static LUT_WORD_LAYOUT: WordLayout = WordLayout::new("ppm_lut_word", &[LUT, BCID_LUT]);
pub static FADC_WORD_LAYOUT: WordLayout = WordLayout::new("ppm_fadc_word", &[BCID_FADC, FADC]);

pub const CHANNEL_DISABLED: BitField = BitField::new("channel_disabled", 0, 4);
pub const MCM_ABSENT: BitField = BitField::new("mcm_absent", 4, 1);
pub const TIMEOUT: BitField = BitField::new("timeout", 5, 1);
pub const ASIC_FULL: BitField = BitField::new("asic_full", 6, 1);
pub const EVENT_MISMATCH: BitField = BitField::new("event_mismatch", 7, 1);
pub const BUNCH_MISMATCH: BitField = BitField::new("bunch_mismatch", 8, 1);
pub const FPGA_CORRUPT: BitField = BitField::new("fpga_corrupt", 9, 1);
pub const GLINK_PIN_PARITY: BitField = BitField::new("glink_pin_parity", 10, 1);

pub static ERROR_WORD_LAYOUT: WordLayout = WordLayout::new(
    "ppm_pin_error_word",
    &[
        CHANNEL_DISABLED,
        MCM_ABSENT,
        TIMEOUT,
        ASIC_FULL,
        EVENT_MISMATCH,
        BUNCH_MISMATCH,
        FPGA_CORRUPT,
        GLINK_PIN_PARITY,
    ],
);

const ERROR_MASK: u32 = 0x7ff;
const WORD_LEN: u32 = 16;

pub const GLINK_PINS: usize = 16;
pub const ASIC_CHANNELS: usize = 4;
pub const CHANNELS: usize = GLINK_PINS * ASIC_CHANNELS;
const DATA_BITS: u32 = 11;
const ERROR_BITS: u32 = 10;
const BUNCH_CROSSING_BITS: usize = 12;

/// One error condition of a PPM G-Link pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PpmErrorBit {
    ChannelDisabled,
    McmAbsent,
    Timeout,
    AsicFull,
    EventMismatch,
    BunchMismatch,
    FpgaCorrupt,
    GlinkPinParity,
}

impl PpmErrorBit {
    /// Bit position in the per-channel error word returned by `ppm_error`.
    fn channel_bit(self) -> u32 {
        match self {
            PpmErrorBit::ChannelDisabled => 0,
            other => other.pin_field().bit - 3,
        }
    }

    fn pin_field(self) -> BitField {
        match self {
            PpmErrorBit::ChannelDisabled => CHANNEL_DISABLED,
            PpmErrorBit::McmAbsent => MCM_ABSENT,
            PpmErrorBit::Timeout => TIMEOUT,
            PpmErrorBit::AsicFull => ASIC_FULL,
            PpmErrorBit::EventMismatch => EVENT_MISMATCH,
            PpmErrorBit::BunchMismatch => BUNCH_MISMATCH,
            PpmErrorBit::FpgaCorrupt => FPGA_CORRUPT,
            PpmErrorBit::GlinkPinParity => GLINK_PIN_PARITY,
        }
    }
}

/// Samples of one channel, one entry per slice.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PpmChannel {
    pub lut: Vec<u32>,
    pub fadc: Vec<u32>,
    pub bcid_lut: Vec<u32>,
    pub bcid_fadc: Vec<u32>,
}

impl PpmChannel {
    pub fn zeroed(slices_lut: usize, slices_fadc: usize) -> Self {
        Self {
            lut: vec![0; slices_lut],
            fadc: vec![0; slices_fadc],
            bcid_lut: vec![0; slices_lut],
            bcid_fadc: vec![0; slices_fadc],
        }
    }
}

#[inline]
fn asic(chan: usize) -> usize {
    chan / GLINK_PINS
}

#[inline]
fn pin(chan: usize) -> usize {
    chan % GLINK_PINS
}

//==================================================================================
// 2. The Sub-Block
//==================================================================================

#[derive(Debug, Clone)]
pub struct PpmSubBlock {
    core: SubBlockCore,
    datamap: Vec<u32>,
    errormap: Vec<u32>,
    lut_offset: Option<usize>,
    fadc_offset: Option<usize>,
    pedestal: u32,
    fadc_baseline: u32,
    fadc_threshold: u32,
    comp_stats: CompressionStats,
}

impl Default for PpmSubBlock {
    fn default() -> Self {
        Self::with_config(&PpmConfig::default())
    }
}

impl PpmSubBlock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: &PpmConfig) -> Self {
        Self {
            core: SubBlockCore::new(),
            datamap: Vec::new(),
            errormap: Vec::new(),
            lut_offset: config.lut_offset,
            fadc_offset: config.fadc_offset,
            pedestal: config.pedestal,
            fadc_baseline: config.fadc_baseline,
            fadc_threshold: config.fadc_threshold,
            comp_stats: CompressionStats::default(),
        }
    }

    pub fn core(&self) -> &SubBlockCore {
        &self.core
    }

    pub fn core_mut(&mut self) -> &mut SubBlockCore {
        &mut self.core
    }

    /// Resets data and offsets. Pedestal, baseline and threshold are settings
    /// and survive.
    pub fn clear(&mut self) {
        self.core.clear();
        self.datamap.clear();
        self.errormap.clear();
        self.lut_offset = None;
        self.fadc_offset = None;
        self.comp_stats = CompressionStats::default();
    }

    #[allow(clippy::too_many_arguments)]
    pub fn set_ppm_header(
        &mut self,
        version: u32,
        format: DataFormat,
        seqno: u32,
        crate_id: u32,
        module: u32,
        slices_fadc: u32,
        slices_lut: u32,
    ) {
        self.core.set_header(SubBlockHeader {
            word_id: MODULE_WORD_ID,
            version,
            format: format.code(),
            seqno,
            crate_id,
            module,
            slices2: slices_fadc,
            slices1: slices_lut,
        });
    }

    pub fn set_ppm_error_header(
        &mut self,
        version: u32,
        crate_id: u32,
        module: u32,
        slices_fadc: u32,
        slices_lut: u32,
    ) {
        self.set_ppm_header(
            version,
            DataFormat::Uncompressed,
            ERROR_MARKER,
            crate_id,
            module,
            slices_fadc,
            slices_lut,
        );
    }

    /// True if `word` is the header of a PPM error block.
    pub fn is_error_block(word: u32) -> bool {
        SubBlockHeader::decode(word).is_error_block()
    }

    pub fn slices_lut(&self) -> usize {
        let slices = self.core.slices1() as usize;
        if slices == 0 && self.core.data_format() == Some(DataFormat::Neutral) {
            1
        } else {
            slices
        }
    }

    pub fn slices_fadc(&self) -> usize {
        let slices = self.core.slices2() as usize;
        if slices == 0 && self.core.data_format() == Some(DataFormat::Neutral) {
            let per_slice = ASIC_CHANNELS * DATA_BITS as usize;
            (self.core.data_words() / per_slice).saturating_sub(self.slices_lut())
        } else {
            slices
        }
    }

    /// Channels carried by one sub-block of the given version and format.
    pub fn channels_for(version: u32, format: u32) -> usize {
        if version != 1 {
            return 0;
        }
        match DataFormat::from_code(format) {
            Some(DataFormat::Uncompressed) => CHANNELS / ASIC_CHANNELS,
            Some(_) => CHANNELS,
            None => 0,
        }
    }

    pub fn channels_per_sub_block(&self) -> usize {
        Self::channels_for(self.core.version(), self.core.format())
    }

    //==============================================================================
    // 3. Settings
    //==============================================================================

    pub fn set_lut_offset(&mut self, offset: usize) {
        self.lut_offset = Some(offset);
    }

    pub fn set_fadc_offset(&mut self, offset: usize) {
        self.fadc_offset = Some(offset);
    }

    /// Triggered LUT slice.
    pub fn lut_offset(&self) -> usize {
        self.lut_offset.unwrap_or(self.slices_lut() / 2)
    }

    /// Triggered FADC slice.
    pub fn fadc_offset(&self) -> usize {
        self.fadc_offset.unwrap_or(self.slices_fadc() / 2)
    }

    pub fn set_pedestal(&mut self, pedestal: u32) {
        self.pedestal = pedestal;
    }

    pub fn pedestal(&self) -> u32 {
        self.pedestal
    }

    pub fn set_fadc_baseline(&mut self, baseline: u32) {
        self.fadc_baseline = baseline;
    }

    pub fn fadc_baseline(&self) -> u32 {
        self.fadc_baseline
    }

    pub fn set_fadc_threshold(&mut self, threshold: u32) {
        self.fadc_threshold = threshold;
    }

    pub fn fadc_threshold(&self) -> u32 {
        self.fadc_threshold
    }

    pub fn comp_stats(&self) -> &CompressionStats {
        &self.comp_stats
    }

    pub(crate) fn set_comp_stats(&mut self, stats: CompressionStats) {
        self.comp_stats = stats;
    }

    //==============================================================================
    // 4. Channel Data
    //==============================================================================

    /// Stores one channel's samples for packing. Missing slices are zero.
    pub fn fill_ppm_data(&mut self, chan: usize, data: &PpmChannel) {
        let slices_lut = self.slices_lut();
        let slices_fadc = self.slices_fadc();
        let slices = slices_lut + slices_fadc;
        let per_block = self.channels_per_sub_block();
        if per_block == 0 {
            return;
        }
        if self.datamap.is_empty() {
            self.datamap.resize(slices * per_block, 0);
        }
        let offset = (chan % per_block) * slices;
        if offset + slices > self.datamap.len() {
            return;
        }
        for pos in 0..slices_lut {
            let lut = data.lut.get(pos).copied().unwrap_or(0);
            let bcid = data.bcid_lut.get(pos).copied().unwrap_or(0);
            self.datamap[offset + pos] = LUT.put(lut) | BCID_LUT.put(bcid);
        }
        let offset = offset + slices_lut;
        for pos in 0..slices_fadc {
            let fadc = data.fadc.get(pos).copied().unwrap_or(0);
            let bcid = data.bcid_fadc.get(pos).copied().unwrap_or(0);
            self.datamap[offset + pos] = FADC.put(fadc) | BCID_FADC.put(bcid);
        }
    }

    /// Samples of one channel; all zero when the channel was never filled.
    pub fn ppm_data(&self, chan: usize) -> PpmChannel {
        let slices_lut = self.slices_lut();
        let slices_fadc = self.slices_fadc();
        let per_block = self.channels_per_sub_block();
        let mut data = PpmChannel::zeroed(slices_lut, slices_fadc);
        if per_block == 0 {
            return data;
        }
        let beg = (chan % per_block) * (slices_lut + slices_fadc);
        if beg + slices_lut + slices_fadc > self.datamap.len() {
            return data;
        }
        for (pos, &w) in self.datamap[beg..beg + slices_lut].iter().enumerate() {
            data.lut[pos] = LUT.get(w);
            data.bcid_lut[pos] = BCID_LUT.get(w);
        }
        let beg = beg + slices_lut;
        for (pos, &w) in self.datamap[beg..beg + slices_fadc].iter().enumerate() {
            data.fadc[pos] = FADC.get(w);
            data.bcid_fadc[pos] = BCID_FADC.get(w);
        }
        data
    }

    //==============================================================================
    // 5. Errors
    //==============================================================================

    fn ensure_errormap(&mut self) {
        if self.errormap.is_empty() {
            self.errormap.resize(GLINK_PINS, 0);
        }
    }

    /// Merges a per-channel error word (channel-disabled in bit 0, pin
    /// errors above) into the error word of the channel's pin.
    pub fn fill_ppm_error(&mut self, chan: usize, error_word: u32) {
        self.ensure_errormap();
        let disabled = (error_word & 0x1) << asic(chan);
        self.errormap[pin(chan)] |=
            (((error_word >> 1) << ASIC_CHANNELS) | disabled) & ERROR_MASK;
    }

    pub fn fill_ppm_pin_error(&mut self, pin: usize, error_word: u32) {
        self.ensure_errormap();
        if let Some(slot) = self.errormap.get_mut(pin) {
            *slot = error_word & ERROR_MASK;
        }
    }

    /// Error word of a channel: the pin errors with the single channel-disabled
    /// bit of this channel in bit 0.
    pub fn ppm_error(&self, chan: usize) -> u32 {
        match self.errormap.get(pin(chan)) {
            Some(&w) => (((w & ERROR_MASK) >> ASIC_CHANNELS) << 1) | self.channel_disabled(chan) as u32,
            None => 0,
        }
    }

    pub fn ppm_pin_error(&self, pin: usize) -> u32 {
        self.errormap.get(pin).map_or(0, |w| w & ERROR_MASK)
    }

    fn channel_disabled(&self, chan: usize) -> bool {
        self.errormap
            .get(pin(chan))
            .is_some_and(|w| (w >> asic(chan)) & 0x1 == 1)
    }

    /// Whether `bit` is set for this channel.
    pub fn has_error(&self, chan: usize, bit: PpmErrorBit) -> bool {
        (self.ppm_error(chan) >> bit.channel_bit()) & 0x1 == 1
    }

    /// Whether `bit` is set on any pin of the sub-block.
    pub fn any_error(&self, bit: PpmErrorBit) -> bool {
        let global = self.errormap.iter().fold(0, |acc, w| acc | w);
        bit.pin_field().get(global) != 0
    }

    //==============================================================================
    // 6. Pack / Unpack Dispatch
    //==============================================================================

    /// Header combinations `pack` cannot encode, checked before the payload
    /// is touched.
    fn pack_support(&self) -> Result<(), UnpackErrorKind> {
        if self.core.version() != 1 {
            return Err(UnpackErrorKind::UnsupportedVersion);
        }
        match self.core.data_format() {
            None => Err(UnpackErrorKind::UnsupportedFormat),
            Some(DataFormat::Compressed)
                if CompressionVersion::from_seqno(self.core.seqno()).is_none() =>
            {
                Err(UnpackErrorKind::CompressionVersion)
            }
            Some(DataFormat::Compressed | DataFormat::SuperCompressed)
                if !compression::slices_supported(self) =>
            {
                Err(UnpackErrorKind::CompressionSlices)
            }
            _ => Ok(()),
        }
    }

    /// Refused combinations leave the payload as it was.
    pub fn pack(&mut self) -> bool {
        if let Err(kind) = self.pack_support() {
            return self.core.reject(kind);
        }
        self.core.begin_pack();
        match self.core.data_format() {
            Some(DataFormat::Neutral) => self.pack_neutral(),
            Some(DataFormat::Uncompressed) if self.core.seqno() == ERROR_MARKER => {
                self.pack_uncompressed_errors()
            }
            Some(DataFormat::Uncompressed) => self.pack_uncompressed_data(),
            Some(DataFormat::Compressed) => match CompressionVersion::from_seqno(self.core.seqno()) {
                Some(version) => compression::pack(self, version),
                None => self.core.reject(UnpackErrorKind::CompressionVersion),
            },
            Some(DataFormat::SuperCompressed) => compression::pack(self, CompressionVersion::V02),
            None => self.core.reject(UnpackErrorKind::UnsupportedFormat),
        }
    }

    pub fn unpack(&mut self) -> bool {
        if self.core.version() != 1 {
            return self.core.reject(UnpackErrorKind::UnsupportedVersion);
        }
        match self.core.data_format() {
            Some(DataFormat::Neutral) => self.unpack_neutral(),
            Some(DataFormat::Uncompressed) if self.core.seqno() == ERROR_MARKER => {
                self.unpack_uncompressed_errors()
            }
            Some(DataFormat::Uncompressed) => self.unpack_uncompressed_data(),
            Some(DataFormat::Compressed) => match CompressionVersion::from_seqno(self.core.seqno()) {
                Some(version) => compression::unpack(self, version),
                None => self.core.reject(UnpackErrorKind::CompressionVersion),
            },
            Some(DataFormat::SuperCompressed) => compression::unpack(self, CompressionVersion::V02),
            None => self.core.reject(UnpackErrorKind::UnsupportedFormat),
        }
    }

    /// Clears decoded samples before a compressed unpack refills them.
    pub(crate) fn reset_datamap(&mut self) {
        self.datamap.clear();
    }

    //==============================================================================
    // 7. Neutral Format
    //==============================================================================

    fn pack_neutral(&mut self) -> bool {
        let slices = self.slices_lut() + self.slices_fadc();
        if self.datamap.is_empty() {
            self.datamap.resize(slices * CHANNELS, 0);
        }
        let bunch_crossing = self.core.bunch_crossing();
        for pin in 0..GLINK_PINS {
            let bc = if pin < BUNCH_CROSSING_BITS {
                (bunch_crossing >> pin) & 0x1
            } else {
                0
            };
            self.core.packer_neutral(pin, bc, 1);
        }
        let mut words = self.datamap.iter().copied();
        for _asic in 0..ASIC_CHANNELS {
            for pin in 0..GLINK_PINS {
                for _sl in 0..slices {
                    let datum = words.next().unwrap_or(0);
                    self.core.packer_neutral(pin, datum, DATA_BITS);
                }
            }
        }
        self.ensure_errormap();
        for pin in 0..GLINK_PINS {
            let error = self.errormap[pin];
            self.core.packer_neutral(pin, error, ERROR_BITS);
            self.core.packer_neutral_parity(pin);
        }
        true
    }

    fn unpack_neutral(&mut self) -> bool {
        let slices = self.slices_lut() + self.slices_fadc();
        self.core.unpacker_init();
        self.datamap.clear();
        let mut bunch_crossing = 0;
        for pin in 0..GLINK_PINS {
            let bc = self.core.unpacker_neutral(pin, 1);
            if pin < BUNCH_CROSSING_BITS {
                bunch_crossing |= bc << pin;
            }
        }
        self.core.set_bunch_crossing(bunch_crossing);
        for _asic in 0..ASIC_CHANNELS {
            for pin in 0..GLINK_PINS {
                for _sl in 0..slices {
                    let datum = self.core.unpacker_neutral(pin, DATA_BITS);
                    self.datamap.push(datum);
                }
            }
        }
        // Truncated error words do not invalidate the samples.
        let rc = self.core.finish_unpack();
        self.errormap.clear();
        for pin in 0..GLINK_PINS {
            let mut error = self.core.unpacker_neutral(pin, ERROR_BITS);
            if self.core.check_neutral_parity(0, pin) {
                error |= GLINK_PIN_PARITY.put(1);
            }
            self.errormap.push(error);
        }
        rc
    }

    //==============================================================================
    // 8. Uncompressed Format
    //==============================================================================

    fn pack_uncompressed_data(&mut self) -> bool {
        let slices = self.slices_lut() + self.slices_fadc();
        let channels = self.channels_per_sub_block();
        if self.datamap.is_empty() {
            self.datamap.resize(slices * channels, 0);
        }
        for sl in 0..slices {
            for chan in 0..channels {
                let datum = self.datamap[sl + chan * slices];
                self.core.packer(datum, WORD_LEN);
            }
        }
        self.core.packer_flush();
        true
    }

    fn pack_uncompressed_errors(&mut self) -> bool {
        self.ensure_errormap();
        for pin in 0..GLINK_PINS {
            let error = self.errormap[pin];
            self.core.packer(error, WORD_LEN);
        }
        self.core.packer_flush();
        true
    }

    fn unpack_uncompressed_data(&mut self) -> bool {
        let slices = self.slices_lut() + self.slices_fadc();
        let channels = self.channels_per_sub_block();
        self.datamap.clear();
        self.datamap.resize(slices * channels, 0);
        self.core.unpacker_init();
        for sl in 0..slices {
            for chan in 0..channels {
                self.datamap[sl + chan * slices] = self.core.unpacker(WORD_LEN);
            }
        }
        self.core.finish_unpack()
    }

    fn unpack_uncompressed_errors(&mut self) -> bool {
        self.core.unpacker_init();
        self.errormap.clear();
        for _pin in 0..GLINK_PINS {
            let error = self.core.unpacker(WORD_LEN);
            self.errormap.push(error);
        }
        self.core.finish_unpack()
    }
}
