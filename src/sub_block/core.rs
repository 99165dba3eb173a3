//! State shared by every concrete sub-block: header, payload, optional
//! trailer, and the cursors of the serial and neutral codecs.

use crate::error::UnpackErrorKind;
use crate::kernels::bitstream::{self, Packer, Unpacker};
use crate::kernels::neutral::NeutralMux;
use crate::types::word::{word_type, DataFormat, SubBlockHeader, SubBlockTrailer, WordType};

/// A neutral-format parity failure on one pin of one slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParityError {
    pub slice: usize,
    pub pin: usize,
}

#[derive(Debug, Clone, Default)]
pub struct SubBlockCore {
    header: u32,
    trailer: u32,
    payload: Vec<u32>,
    packer: Packer,
    unpacker: Unpacker,
    neutral: NeutralMux,
    streamed: bool,
    bunch_crossing: u32,
    parity_errors: Vec<ParityError>,
    unpack_error: Option<UnpackErrorKind>,
}

impl SubBlockCore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    //==============================================================================
    // 1. Header & Trailer
    //==============================================================================

    pub fn set_header(&mut self, header: SubBlockHeader) {
        self.header = header.encode();
    }

    pub fn header(&self) -> SubBlockHeader {
        SubBlockHeader::decode(self.header)
    }

    pub fn header_word(&self) -> u32 {
        self.header
    }

    pub fn version(&self) -> u32 {
        self.header().version
    }

    pub fn format(&self) -> u32 {
        self.header().format
    }

    pub fn data_format(&self) -> Option<DataFormat> {
        self.header().data_format()
    }

    pub fn seqno(&self) -> u32 {
        self.header().seqno
    }

    pub fn crate_id(&self) -> u32 {
        self.header().crate_id
    }

    pub fn module(&self) -> u32 {
        self.header().module
    }

    pub fn slices1(&self) -> u32 {
        self.header().slices1
    }

    pub fn slices2(&self) -> u32 {
        self.header().slices2
    }

    pub fn set_status(&mut self, trailer: SubBlockTrailer) {
        self.trailer = trailer.encode(&self.header());
    }

    pub fn trailer(&self) -> Option<SubBlockTrailer> {
        (self.trailer != 0).then(|| SubBlockTrailer::decode(self.trailer))
    }

    pub fn trailer_word(&self) -> u32 {
        self.trailer
    }

    //==============================================================================
    // 2. Raw Read & Write
    //==============================================================================

    /// Consumes a sub-block from the front of `words` and returns how many
    /// words were taken. Stops before a second header.
    pub fn read(&mut self, words: &[u32]) -> usize {
        self.payload.clear();
        self.trailer = 0;
        self.streamed = false;
        let mut seen_header = false;
        for (pos, &word) in words.iter().enumerate() {
            match word_type(word) {
                WordType::Header if seen_header => return pos,
                WordType::Header => {
                    self.header = word;
                    seen_header = true;
                }
                WordType::Status => self.trailer = word,
                WordType::Data => self.payload.push(word),
            }
        }
        words.len()
    }

    /// Appends header, payload and (if set) trailer to `out`.
    pub fn write(&self, out: &mut Vec<u32>) {
        out.push(self.header);
        out.extend_from_slice(&self.payload);
        if self.trailer != 0 {
            out.push(self.trailer);
        }
    }

    pub fn payload(&self) -> &[u32] {
        &self.payload
    }

    pub fn data_words(&self) -> usize {
        self.payload.len()
    }

    #[cfg(test)]
    pub(crate) fn payload_mut(&mut self) -> &mut Vec<u32> {
        &mut self.payload
    }

    //==============================================================================
    // 3. Serial Packing
    //==============================================================================

    /// Drops any previous payload and rewinds every writer cursor.
    pub fn begin_pack(&mut self) {
        self.payload.clear();
        self.packer = Packer::new(false);
        self.neutral.reset();
        self.streamed = false;
        self.unpack_error = None;
    }

    /// Selects 31-bit payload words for both directions.
    pub fn set_streamed(&mut self) {
        self.streamed = true;
        self.packer.set_streamed(true);
        self.unpacker.set_streamed(true);
    }

    pub fn packer(&mut self, datum: u32, nbits: u32) {
        self.packer.pack(&mut self.payload, datum, nbits);
    }

    pub fn packer_flush(&mut self) {
        self.packer.flush(&mut self.payload);
    }

    pub fn min_bits(datum: u32) -> u32 {
        bitstream::min_bits(datum)
    }

    //==============================================================================
    // 4. Serial Unpacking
    //==============================================================================

    /// Rewinds both readers and forgets errors from a previous pass.
    pub fn unpacker_init(&mut self) {
        self.unpacker = Unpacker::new(self.streamed);
        self.unpacker.init(&self.payload);
        self.neutral.init_unpack(self.payload.len());
        self.parity_errors.clear();
        self.unpack_error = None;
    }

    pub fn unpacker(&mut self, nbits: u32) -> u32 {
        self.unpacker.unpack(&self.payload, nbits)
    }

    /// False once any serial or neutral read ran past the payload.
    pub fn unpacker_success(&self) -> bool {
        self.unpacker.success() && self.neutral.success()
    }

    //==============================================================================
    // 5. Neutral Format
    //==============================================================================

    pub fn packer_neutral(&mut self, pin: usize, datum: u32, nbits: u32) {
        self.neutral.pack(&mut self.payload, pin, datum, nbits);
    }

    pub fn packer_neutral_parity(&mut self, pin: usize) {
        self.neutral.pack_parity(&mut self.payload, pin);
    }

    pub fn unpacker_neutral(&mut self, pin: usize, nbits: u32) -> u32 {
        self.neutral.unpack(&self.payload, pin, nbits)
    }

    pub fn unpacker_neutral_parity_error(&mut self, pin: usize) -> bool {
        self.neutral.unpack_parity_error(&self.payload, pin)
    }

    /// Checks the parity bit of `pin` and records a failure against `slice`.
    pub fn check_neutral_parity(&mut self, slice: usize, pin: usize) -> bool {
        let error = self.unpacker_neutral_parity_error(pin);
        if error {
            log::debug!(
                "parity error: crate {} module {} slice {} pin {}",
                self.crate_id(),
                self.module(),
                slice,
                pin
            );
            self.parity_errors.push(ParityError { slice, pin });
        }
        error
    }

    pub fn neutral_pin_bits(&self, pin: usize) -> usize {
        self.neutral.pin_bits(pin)
    }

    pub fn parity_errors(&self) -> &[ParityError] {
        &self.parity_errors
    }

    pub fn bunch_crossing(&self) -> u32 {
        self.bunch_crossing
    }

    pub fn set_bunch_crossing(&mut self, bc: u32) {
        self.bunch_crossing = bc;
    }

    //==============================================================================
    // 6. Failure Bookkeeping
    //==============================================================================

    pub fn set_unpack_error(&mut self, kind: UnpackErrorKind) {
        self.unpack_error = Some(kind);
    }

    pub fn unpack_error(&self) -> Option<UnpackErrorKind> {
        self.unpack_error
    }

    /// Closes an unpack pass: marks truncation and reports success.
    pub fn finish_unpack(&mut self) -> bool {
        let ok = self.unpacker_success();
        if !ok && self.unpack_error.is_none() {
            self.unpack_error = Some(UnpackErrorKind::DataTruncated);
        }
        ok && self.unpack_error.is_none()
    }

    /// Records an unsupported combination and returns `false`.
    pub fn reject(&mut self, kind: UnpackErrorKind) -> bool {
        log::debug!(
            "sub-block 0x{:08x} rejected: {} (version {}, format {})",
            self.header,
            kind,
            self.version(),
            self.format()
        );
        self.unpack_error = Some(kind);
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::word::MODULE_WORD_ID;

    fn header() -> SubBlockHeader {
        SubBlockHeader {
            word_id: MODULE_WORD_ID,
            version: 1,
            format: DataFormat::Uncompressed.code(),
            crate_id: 3,
            module: 9,
            slices1: 1,
            ..Default::default()
        }
    }

    #[test]
    fn test_read_stops_at_next_header() {
        let mut core = SubBlockCore::new();
        core.set_header(header());
        core.packer(0xdead, 16);
        core.packer_flush();
        core.set_status(SubBlockTrailer {
            glink_timeout: true,
            ..Default::default()
        });
        let mut words = Vec::new();
        core.write(&mut words);
        core.write(&mut words);
        assert_eq!(words.len(), 6);

        let mut reader = SubBlockCore::new();
        assert_eq!(reader.read(&words), 3);
        assert_eq!(reader.header(), header());
        assert_eq!(reader.payload(), &[0xdead]);
        assert!(reader.trailer().is_some_and(|t| t.glink_timeout));
        assert_eq!(reader.read(&words[3..]), 3);
    }

    #[test]
    fn test_no_trailer_without_errors() {
        let mut core = SubBlockCore::new();
        core.set_header(header());
        core.set_status(SubBlockTrailer::default());
        let mut words = Vec::new();
        core.write(&mut words);
        assert_eq!(words, vec![header().encode()]);
        assert!(core.trailer().is_none());
    }

    #[test]
    fn test_finish_unpack_marks_truncation() {
        let mut core = SubBlockCore::new();
        core.unpacker_init();
        core.unpacker(4);
        assert!(!core.finish_unpack());
        assert_eq!(core.unpack_error(), Some(UnpackErrorKind::DataTruncated));
    }
}
