// In: src/traits.rs

//! The behavioral contract shared by every concrete sub-block type.
//!
//! Each type owns a [`SubBlockCore`] and adds its own bit layout on top. The
//! fragment layer only needs the contract below: read raw words, unpack,
//! pack, write raw words. Failures are flag based, so `pack`/`unpack` return
//! `false` and leave the reason in the core.

use crate::error::UnpackErrorKind;
use crate::sub_block::core::{ParityError, SubBlockCore};

pub trait SubBlockCodec {
    fn core(&self) -> &SubBlockCore;

    fn core_mut(&mut self) -> &mut SubBlockCore;

    /// Resets header, payload and every decoded field.
    fn clear(&mut self);

    /// Encodes the stored fields into the payload according to the header.
    fn pack(&mut self) -> bool;

    /// Decodes the payload into fields according to the header.
    fn unpack(&mut self) -> bool;

    /// Consumes one sub-block from the front of `words`.
    fn read(&mut self, words: &[u32]) -> usize {
        self.core_mut().read(words)
    }

    fn write(&self, out: &mut Vec<u32>) {
        self.core().write(out)
    }

    fn unpack_error(&self) -> Option<UnpackErrorKind> {
        self.core().unpack_error()
    }

    fn parity_errors(&self) -> &[ParityError] {
        self.core().parity_errors()
    }
}

/// Implements [`SubBlockCodec`] by forwarding to the type's inherent methods.
macro_rules! impl_sub_block_codec {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl $crate::traits::SubBlockCodec for $ty {
                fn core(&self) -> &$crate::sub_block::core::SubBlockCore {
                    <$ty>::core(self)
                }

                fn core_mut(&mut self) -> &mut $crate::sub_block::core::SubBlockCore {
                    <$ty>::core_mut(self)
                }

                fn clear(&mut self) {
                    <$ty>::clear(self)
                }

                fn pack(&mut self) -> bool {
                    <$ty>::pack(self)
                }

                fn unpack(&mut self) -> bool {
                    <$ty>::unpack(self)
                }
            }
        )+
    };
}

pub(crate) use impl_sub_block_codec;
