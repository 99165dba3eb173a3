//! Concrete sub-block types, one per hardware module family, and the
//! [`SubBlock`] sum type the fragment layer works with.

pub mod cmm;
pub mod cmm_cp;
pub mod cmm_energy;
pub mod cmm_jet;
pub mod core;
pub mod cpm;
pub mod cpm_roi;
pub mod jem;
pub mod jem_roi;
pub mod ppm;

#[cfg(test)]
mod tests;

use serde::{Deserialize, Serialize};

use crate::config::PpmConfig;
use crate::error::RodErrorKind;
use crate::traits::{impl_sub_block_codec, SubBlockCodec};
use crate::types::word;

pub use self::core::{ParityError, SubBlockCore};
pub use cmm::CmmFirmware;
pub use cmm_cp::CmmCpSubBlock;
pub use cmm_energy::CmmEnergySubBlock;
pub use cmm_jet::CmmJetSubBlock;
pub use cpm::CpmSubBlock;
pub use cpm_roi::{CpmRoi, CpmRoiSubBlock};
pub use jem::{JemSubBlock, JetElement};
pub use jem_roi::{JemRoi, JemRoiSubBlock};
pub use ppm::{PpmChannel, PpmSubBlock};

impl_sub_block_codec!(
    PpmSubBlock,
    CpmSubBlock,
    CpmRoiSubBlock,
    JemSubBlock,
    JemRoiSubBlock,
    CmmCpSubBlock,
    CmmJetSubBlock,
    CmmEnergySubBlock,
);

/// The kind of ROD a fragment comes from. It decides how a module header
/// (word id `0xc`) is interpreted; CMM headers are typed by their firmware.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ModuleFamily {
    Ppm,
    Cp,
    Jep,
    CpRoi,
    JepRoi,
}

#[derive(Debug, Clone)]
pub enum SubBlock {
    Ppm(PpmSubBlock),
    Cpm(CpmSubBlock),
    CpmRoi(CpmRoiSubBlock),
    Jem(JemSubBlock),
    JemRoi(JemRoiSubBlock),
    CmmCp(CmmCpSubBlock),
    CmmJet(CmmJetSubBlock),
    CmmEnergy(CmmEnergySubBlock),
}

impl SubBlock {
    /// An empty sub-block of the type named by `header` in a `family` ROD.
    pub fn for_header(
        header: u32,
        family: ModuleFamily,
        ppm: &PpmConfig,
    ) -> Result<Self, RodErrorKind> {
        if word::is_cmm_block(header) {
            return match cmm::cmm_type(header) {
                CmmFirmware::Cp => Ok(SubBlock::CmmCp(CmmCpSubBlock::new())),
                CmmFirmware::Jet => Ok(SubBlock::CmmJet(CmmJetSubBlock::new())),
                CmmFirmware::Energy => Ok(SubBlock::CmmEnergy(CmmEnergySubBlock::new())),
                CmmFirmware::Unknown => Err(RodErrorKind::CmmType),
            };
        }
        Ok(match family {
            ModuleFamily::Ppm => SubBlock::Ppm(PpmSubBlock::with_config(ppm)),
            ModuleFamily::Cp => SubBlock::Cpm(CpmSubBlock::new()),
            ModuleFamily::Jep => SubBlock::Jem(JemSubBlock::new()),
            ModuleFamily::CpRoi => SubBlock::CpmRoi(CpmRoiSubBlock::new()),
            ModuleFamily::JepRoi => SubBlock::JemRoi(JemRoiSubBlock::new()),
        })
    }

    pub fn codec(&self) -> &dyn SubBlockCodec {
        match self {
            SubBlock::Ppm(b) => b,
            SubBlock::Cpm(b) => b,
            SubBlock::CpmRoi(b) => b,
            SubBlock::Jem(b) => b,
            SubBlock::JemRoi(b) => b,
            SubBlock::CmmCp(b) => b,
            SubBlock::CmmJet(b) => b,
            SubBlock::CmmEnergy(b) => b,
        }
    }

    pub fn codec_mut(&mut self) -> &mut dyn SubBlockCodec {
        match self {
            SubBlock::Ppm(b) => b,
            SubBlock::Cpm(b) => b,
            SubBlock::CpmRoi(b) => b,
            SubBlock::Jem(b) => b,
            SubBlock::JemRoi(b) => b,
            SubBlock::CmmCp(b) => b,
            SubBlock::CmmJet(b) => b,
            SubBlock::CmmEnergy(b) => b,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SubBlock::Ppm(_) => "ppm",
            SubBlock::Cpm(_) => "cpm",
            SubBlock::CpmRoi(_) => "cpm_roi",
            SubBlock::Jem(_) => "jem",
            SubBlock::JemRoi(_) => "jem_roi",
            SubBlock::CmmCp(_) => "cmm_cp",
            SubBlock::CmmJet(_) => "cmm_jet",
            SubBlock::CmmEnergy(_) => "cmm_energy",
        }
    }

    pub fn core(&self) -> &SubBlockCore {
        self.codec().core()
    }

    pub fn core_mut(&mut self) -> &mut SubBlockCore {
        self.codec_mut().core_mut()
    }

    pub fn clear(&mut self) {
        self.codec_mut().clear()
    }

    pub fn pack(&mut self) -> bool {
        self.codec_mut().pack()
    }

    pub fn unpack(&mut self) -> bool {
        self.codec_mut().unpack()
    }

    pub fn read(&mut self, words: &[u32]) -> usize {
        self.codec_mut().read(words)
    }

    pub fn write(&self, out: &mut Vec<u32>) {
        self.codec().write(out)
    }
}
