// In: src/bridge/encoder.rs

//! Fragment writing: a user header followed by packed sub-blocks.

use crate::bridge::RodFragment;
use crate::config::{CodecConfig, PpmConfig};
use crate::error::{L1CaloError, UnpackErrorKind};
use crate::sub_block::ppm::{PpmErrorBit, CHANNELS};
use crate::sub_block::{PpmChannel, PpmSubBlock, SubBlock};
use crate::types::user_header::UserHeader;
use crate::types::word::{DataFormat, SubBlockTrailer};

const PPM_VERSION: u32 = 1;

/// Packs every sub-block and writes them after `user_header`. Trailers set
/// on the sub-blocks are kept.
pub fn encode_fragment(
    source_id: u32,
    user_header: UserHeader,
    sub_blocks: &mut [SubBlock],
) -> Result<RodFragment, L1CaloError> {
    let mut words = vec![user_header.word()];
    for block in sub_blocks.iter_mut() {
        if !block.pack() {
            let kind = block
                .core()
                .unpack_error()
                .unwrap_or(UnpackErrorKind::UnsupportedFormat);
            log::debug!("{} sub-block failed to pack: {}", block.name(), kind);
            return Err(L1CaloError::Pack(kind));
        }
        block.write(&mut words);
    }
    Ok(RodFragment { source_id, words })
}

/// Collects the 64 channels of one PPM and turns them into the sub-blocks a
/// ROD would send for it.
///
/// Uncompressed data go out as four blocks of 16 channels followed by a
/// separate error block; every other format uses one block with the errors
/// inline. The trailer of the last data block (and of the error block)
/// summarises the error map.
#[derive(Debug, Clone)]
pub struct PpmModuleWriter {
    config: PpmConfig,
    format: DataFormat,
    compression_version: u32,
    crate_id: u32,
    module: u32,
    slices_lut: usize,
    slices_fadc: usize,
    lut_offset: Option<usize>,
    fadc_offset: Option<usize>,
    channels: Vec<PpmChannel>,
    errors: Vec<u32>,
}

impl PpmModuleWriter {
    pub fn new(
        config: &CodecConfig,
        crate_id: u32,
        module: u32,
        slices_lut: usize,
        slices_fadc: usize,
    ) -> Self {
        Self {
            config: config.ppm.clone(),
            format: config.default_format,
            compression_version: config.compression_version,
            crate_id,
            module,
            slices_lut,
            slices_fadc,
            lut_offset: config.ppm.lut_offset,
            fadc_offset: config.ppm.fadc_offset,
            channels: vec![PpmChannel::default(); CHANNELS],
            errors: vec![0; CHANNELS],
        }
    }

    pub fn with_format(mut self, format: DataFormat) -> Self {
        self.format = format;
        self
    }

    pub fn set_offsets(&mut self, lut_offset: usize, fadc_offset: usize) {
        self.lut_offset = Some(lut_offset);
        self.fadc_offset = Some(fadc_offset);
    }

    pub fn lut_offset(&self) -> usize {
        self.lut_offset.unwrap_or(self.slices_lut / 2)
    }

    pub fn fadc_offset(&self) -> usize {
        self.fadc_offset.unwrap_or(self.slices_fadc / 2)
    }

    /// Writes the triggered-slice offsets into a fragment's user header, so a
    /// reader unpacks with the same offsets.
    pub fn apply_offsets(&self, user_header: &mut UserHeader) {
        user_header.set_ppm_lut(self.lut_offset() as u32);
        user_header.set_ppm_fadc(self.fadc_offset() as u32);
    }

    pub fn fill_channel(&mut self, chan: usize, data: PpmChannel) {
        if let Some(slot) = self.channels.get_mut(chan) {
            *slot = data;
        }
    }

    /// Per-channel error word: channel-disabled in bit 0, pin errors above.
    pub fn fill_error(&mut self, chan: usize, error_word: u32) {
        if let Some(slot) = self.errors.get_mut(chan) {
            *slot = error_word;
        }
    }

    fn new_block(&self, seqno: u32) -> PpmSubBlock {
        let mut block = PpmSubBlock::with_config(&self.config);
        block.set_ppm_header(
            PPM_VERSION,
            self.format,
            seqno,
            self.crate_id,
            self.module,
            self.slices_fadc as u32,
            self.slices_lut as u32,
        );
        block.set_lut_offset(self.lut_offset());
        block.set_fadc_offset(self.fadc_offset());
        block
    }

    fn pack(block: &mut PpmSubBlock) -> Result<(), L1CaloError> {
        if block.pack() {
            Ok(())
        } else {
            Err(L1CaloError::Pack(
                block
                    .core()
                    .unpack_error()
                    .unwrap_or(UnpackErrorKind::UnsupportedFormat),
            ))
        }
    }

    /// Packed sub-blocks, ready for [`encode_fragment`] or direct writing.
    pub fn sub_blocks(&self) -> Result<Vec<SubBlock>, L1CaloError> {
        let per_block = PpmSubBlock::channels_for(PPM_VERSION, self.format.code());
        if per_block == 0 {
            return Err(L1CaloError::Pack(UnpackErrorKind::UnsupportedFormat));
        }
        let uncompressed = self.format == DataFormat::Uncompressed;
        let mut error_block = uncompressed.then(|| {
            let mut block = PpmSubBlock::with_config(&self.config);
            block.set_ppm_error_header(
                PPM_VERSION,
                self.crate_id,
                self.module,
                self.slices_fadc as u32,
                self.slices_lut as u32,
            );
            block
        });

        let mut upstream_error = false;
        let mut blocks = Vec::with_capacity(CHANNELS / per_block);
        for first in (0..CHANNELS).step_by(per_block) {
            let seqno = match self.format {
                DataFormat::Compressed | DataFormat::SuperCompressed => self.compression_version,
                _ => first as u32,
            };
            let mut block = self.new_block(seqno);
            for chan in first..first + per_block {
                block.fill_ppm_data(chan, &self.channels[chan]);
                let error = self.errors[chan];
                if error == 0 {
                    continue;
                }
                match error_block.as_mut() {
                    Some(errors) => errors.fill_ppm_error(chan, error),
                    None => block.fill_ppm_error(chan, error),
                }
                // Anything above mcm-absent comes from the ASICs.
                upstream_error |= error >> 2 != 0;
            }
            Self::pack(&mut block)?;
            blocks.push(block);
        }

        let trailer = {
            let source = match (&error_block, blocks.last()) {
                (Some(errors), _) => errors,
                (None, Some(last)) => last,
                (None, None) => return Err(L1CaloError::InternalError("no PPM sub-blocks".into())),
            };
            SubBlockTrailer {
                glink_timeout: source.any_error(PpmErrorBit::McmAbsent)
                    || source.any_error(PpmErrorBit::Timeout),
                upstream_error,
                daq_overflow: source.any_error(PpmErrorBit::AsicFull)
                    || source.any_error(PpmErrorBit::FpgaCorrupt),
                bcn_mismatch: source.any_error(PpmErrorBit::EventMismatch)
                    || source.any_error(PpmErrorBit::BunchMismatch),
                glink_parity: source.any_error(PpmErrorBit::GlinkPinParity),
                ..SubBlockTrailer::default()
            }
        };
        if let Some(last) = blocks.last_mut() {
            last.core_mut().set_status(trailer);
        }
        if let Some(mut errors) = error_block {
            Self::pack(&mut errors)?;
            errors.core_mut().set_status(trailer);
            blocks.push(errors);
        }
        log::debug!(
            "PPM crate {} module {}: {} sub-blocks, trailer error {}",
            self.crate_id,
            self.module,
            blocks.len(),
            trailer.is_error()
        );
        Ok(blocks.into_iter().map(SubBlock::Ppm).collect())
    }
}
