// In: src/bridge/decoder.rs

//! Walks a ROD fragment: user header, then sub-blocks until the words run out.
//!
//! Structural problems end the walk with `Err`. Crate/module mismatches and
//! sub-block unpack failures are errors only when `strict_structure` is set;
//! otherwise they are counted in the fragment's status and decoding goes on.

use crate::bridge::status::{FragmentStatus, RodStatusSummary};
use crate::bridge::RodFragment;
use crate::config::CodecConfig;
use crate::error::{L1CaloError, RodErrorKind, UnpackErrorKind};
use crate::sub_block::ppm::CHANNELS;
use crate::sub_block::{CpmRoi, JemRoi, ModuleFamily, PpmSubBlock, SubBlock};
use crate::traits::SubBlockCodec;
use crate::types::user_header::UserHeader;
use crate::types::word::{self, word_type, WordType};

/// Everything recovered from one fragment, in stream order.
#[derive(Debug, Clone)]
pub struct DecodedFragment {
    pub source_id: u32,
    pub user_header: UserHeader,
    pub sub_blocks: Vec<SubBlock>,
    /// Bare RoI words found outside any sub-block.
    pub cpm_rois: Vec<CpmRoi>,
    pub jem_rois: Vec<JemRoi>,
    pub status: FragmentStatus,
}

impl DecodedFragment {
    fn new(source_id: u32, user_header: UserHeader) -> Self {
        Self {
            source_id,
            user_header,
            sub_blocks: Vec::new(),
            cpm_rois: Vec::new(),
            jem_rois: Vec::new(),
            status: FragmentStatus::new(source_id),
        }
    }

    /// The PPM sub-blocks (data and error blocks) of one module.
    pub fn ppm_blocks(&self, module: u32) -> impl Iterator<Item = &PpmSubBlock> {
        self.sub_blocks.iter().filter_map(move |block| match block {
            SubBlock::Ppm(ppm) if ppm.core().module() == module => Some(ppm),
            _ => None,
        })
    }
}

struct FragmentDecoder<'a> {
    fragment: &'a RodFragment,
    family: ModuleFamily,
    config: &'a CodecConfig,
    decoded: DecodedFragment,
    crate_id: Option<u32>,
    pos: usize,
}

impl<'a> FragmentDecoder<'a> {
    fn words(&self) -> &'a [u32] {
        &self.fragment.words
    }

    fn structural(&self, position: usize, kind: RodErrorKind) -> L1CaloError {
        log::debug!(
            "fragment 0x{:08x}: {} at word {}",
            self.fragment.source_id,
            kind,
            position
        );
        L1CaloError::Structural {
            source_id: self.fragment.source_id,
            position,
            kind,
        }
    }

    /// A field that must match: an error when strict, a count otherwise.
    fn expect_equal(
        &mut self,
        position: usize,
        expected: u32,
        actual: u32,
        kind: RodErrorKind,
    ) -> Result<(), L1CaloError> {
        if expected == actual {
            return Ok(());
        }
        if self.config.strict_structure {
            return Err(self.structural(position, kind));
        }
        log::warn!(
            "fragment 0x{:08x}: {} at word {} ({} != {}), kept",
            self.fragment.source_id,
            kind,
            position,
            actual,
            expected
        );
        self.decoded.status.record_structural(kind);
        Ok(())
    }

    fn expect_crate(&mut self, position: usize, crate_id: u32) -> Result<(), L1CaloError> {
        match self.crate_id {
            None => {
                self.crate_id = Some(crate_id);
                Ok(())
            }
            Some(expected) => {
                self.expect_equal(position, expected, crate_id, RodErrorKind::CrateNumber)
            }
        }
    }

    /// Unpacks a sub-block that carries data and records what it reported.
    fn unpack(&mut self, block: &mut SubBlock) -> Result<(), L1CaloError> {
        if block.core().data_words() > 0 && !block.unpack() {
            let kind = block
                .core()
                .unpack_error()
                .unwrap_or(UnpackErrorKind::DataTruncated);
            log::debug!(
                "fragment 0x{:08x}: {} sub-block 0x{:08x} failed to unpack: {}",
                self.fragment.source_id,
                block.name(),
                block.core().header_word(),
                kind
            );
            if self.config.strict_structure {
                return Err(L1CaloError::Unpack {
                    source_id: self.fragment.source_id,
                    kind,
                });
            }
            self.decoded.status.record_unpack_failure(kind);
        }
        let parity = block.core().parity_errors();
        if !parity.is_empty() {
            log::debug!(
                "fragment 0x{:08x}: {} parity errors in {} sub-block",
                self.fragment.source_id,
                parity.len(),
                block.name()
            );
        }
        self.decoded.status.record_sub_block(block);
        Ok(())
    }

    fn run(mut self) -> Result<DecodedFragment, L1CaloError> {
        let words = self.words();
        while self.pos < words.len() {
            let word = words[self.pos];
            match word_type(word) {
                WordType::Header => {
                    if self.family == ModuleFamily::Ppm {
                        self.ppm_module()?;
                    } else {
                        self.single()?;
                    }
                }
                WordType::Data if self.family == ModuleFamily::CpRoi && CpmRoi::is_roi_word(word) => {
                    self.decoded.cpm_rois.push(CpmRoi::from_word(word));
                    self.decoded.status.rois += 1;
                    self.pos += 1;
                }
                WordType::Data if self.family == ModuleFamily::JepRoi && JemRoi::is_roi_word(word) => {
                    self.decoded.jem_rois.push(JemRoi::from_word(word));
                    self.decoded.status.rois += 1;
                    self.pos += 1;
                }
                _ => return Err(self.structural(self.pos, RodErrorKind::MissingHeader)),
            }
        }
        Ok(self.decoded)
    }

    /// One self-contained sub-block: CPM, JEM, CMM or RoI.
    fn single(&mut self) -> Result<(), L1CaloError> {
        let words = self.words();
        let start = self.pos;
        let mut block = SubBlock::for_header(words[start], self.family, &self.config.ppm)
            .map_err(|kind| self.structural(start, kind))?;
        self.pos += block.read(&words[start..]);
        self.expect_crate(start, block.core().crate_id())?;
        self.unpack(&mut block)?;
        self.decoded.sub_blocks.push(block);
        Ok(())
    }

    /// All data sub-blocks of one PPM plus its optional error block.
    fn ppm_module(&mut self) -> Result<(), L1CaloError> {
        let words = self.words();
        let first = words[self.pos];
        let per_block = PpmSubBlock::channels_for(word::version(first), word::format(first));
        // Unsupported combinations are read as a single block and fail on unpack.
        let blocks = if per_block == 0 { 1 } else { CHANNELS / per_block };
        let user_header = self.decoded.user_header;
        let mut module = None;

        for index in 0..blocks {
            let start = self.pos;
            let Some(&header) = words.get(start) else {
                return Err(self.structural(start, RodErrorKind::MissingSubBlock));
            };
            if word_type(header) != WordType::Header
                || word::is_cmm_block(header)
                || PpmSubBlock::is_error_block(header)
            {
                return Err(self.structural(start, RodErrorKind::MissingHeader));
            }
            if blocks > 1 && word::seqno(header) as usize != index * per_block {
                return Err(self.structural(start, RodErrorKind::MissingSubBlock));
            }
            let mut ppm = PpmSubBlock::with_config(&self.config.ppm);
            self.pos += ppm.read(&words[start..]);
            ppm.set_lut_offset(user_header.ppm_lut() as usize);
            ppm.set_fadc_offset(user_header.ppm_fadc() as usize);
            self.expect_crate(start, ppm.core().crate_id())?;
            match module {
                None => module = Some(ppm.core().module()),
                Some(expected) => self.expect_equal(
                    start,
                    expected,
                    ppm.core().module(),
                    RodErrorKind::ModuleNumber,
                )?,
            }
            let mut block = SubBlock::Ppm(ppm);
            self.unpack(&mut block)?;
            self.decoded.sub_blocks.push(block);
        }

        let start = self.pos;
        if let Some(&header) = words.get(start) {
            if word_type(header) == WordType::Header
                && !word::is_cmm_block(header)
                && PpmSubBlock::is_error_block(header)
            {
                let mut errors = PpmSubBlock::with_config(&self.config.ppm);
                self.pos += errors.read(&words[start..]);
                self.expect_crate(start, errors.core().crate_id())?;
                if let Some(expected) = module {
                    self.expect_equal(
                        start,
                        expected,
                        errors.core().module(),
                        RodErrorKind::ModuleNumber,
                    )?;
                }
                let mut block = SubBlock::Ppm(errors);
                self.unpack(&mut block)?;
                self.decoded.sub_blocks.push(block);
            }
        }
        Ok(())
    }
}

/// Decodes one ROD fragment of the given module family.
pub fn decode_fragment(
    fragment: &RodFragment,
    family: ModuleFamily,
    config: &CodecConfig,
) -> Result<DecodedFragment, L1CaloError> {
    let source_id = fragment.source_id;
    let user_header_error = |position| L1CaloError::Structural {
        source_id,
        position,
        kind: RodErrorKind::UserHeader,
    };
    let first = *fragment.words.first().ok_or_else(|| user_header_error(0))?;
    if !UserHeader::is_valid(first) {
        log::debug!("fragment 0x{:08x}: bad user header 0x{:08x}", source_id, first);
        return Err(user_header_error(0));
    }
    let user_header = UserHeader::from_word(first);
    let header_words = (user_header.words() as usize).max(1);
    if header_words > fragment.words.len() {
        return Err(user_header_error(fragment.words.len()));
    }

    let decoder = FragmentDecoder {
        fragment,
        family,
        config,
        decoded: DecodedFragment::new(source_id, user_header),
        crate_id: None,
        pos: header_words,
    };
    let decoded = decoder.run()?;
    log_metric!(
        "source_id" = format!("0x{:08x}", source_id),
        "sub_blocks" = decoded.status.sub_blocks,
        "rois" = decoded.status.rois,
        "parity_errors" = decoded.status.parity_errors
    );
    Ok(decoded)
}

/// Decodes every fragment of an event. Fragments that fail are dropped and
/// counted; the rest come back with the summary.
pub fn decode_event(
    fragments: &[(RodFragment, ModuleFamily)],
    config: &CodecConfig,
) -> (Vec<DecodedFragment>, RodStatusSummary) {
    let mut summary = RodStatusSummary::new();
    let mut decoded = Vec::with_capacity(fragments.len());
    for (fragment, family) in fragments {
        match decode_fragment(fragment, *family, config) {
            Ok(fragment) => {
                summary.record(&fragment.status);
                decoded.push(fragment);
            }
            Err(err) => {
                log::info!("skipping fragment 0x{:08x}: {}", fragment.source_id, err);
                summary.record_failure(&err);
            }
        }
    }
    log_metric!(
        "fragments" = summary.fragments,
        "decoded" = summary.decoded,
        "skipped" = summary.skipped
    );
    (decoded, summary)
}
