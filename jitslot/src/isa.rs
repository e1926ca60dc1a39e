//! Host target ISA construction.

use cranelift_codegen::isa::{self, OwnedTargetIsa};
use cranelift_codegen::settings::{self, Configurable};
use serde::{Deserialize, Serialize};
use target_lexicon::Triple;

use crate::error::{ConverterError, Result};

/// Cranelift optimization level for generated writers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptLevel {
    None,
    #[default]
    Speed,
    SpeedAndSize,
}

impl OptLevel {
    fn as_setting(self) -> &'static str {
        match self {
            OptLevel::None => "none",
            OptLevel::Speed => "speed",
            OptLevel::SpeedAndSize => "speed_and_size",
        }
    }
}

/// Build a Cranelift ISA for the host with the given optimization level.
///
/// The IR verifier is always enabled so a malformed writer surfaces as a
/// construction error instead of bad machine code.
pub fn host_isa(opt_level: OptLevel) -> Result<OwnedTargetIsa> {
    let mut flag_builder = settings::builder();
    flag_builder
        .set("opt_level", opt_level.as_setting())
        .map_err(|e| ConverterError::Codegen(e.to_string()))?;
    flag_builder
        .set("enable_verifier", "true")
        .map_err(|e| ConverterError::Codegen(e.to_string()))?;

    let isa_builder = isa::lookup(Triple::host()).map_err(|e| ConverterError::Codegen(e.to_string()))?;

    isa_builder
        .finish(settings::Flags::new(flag_builder))
        .map_err(|e| ConverterError::Codegen(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_isa_builds() {
        for level in [OptLevel::None, OptLevel::Speed, OptLevel::SpeedAndSize] {
            let isa = host_isa(level).unwrap();
            assert_eq!(isa.triple(), &Triple::host());
        }
    }
}
