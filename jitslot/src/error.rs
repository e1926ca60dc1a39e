//! Construction errors.
//!
//! Only generation can fail. A compiled writer reports per-row problems
//! through its boolean result and never produces one of these.

use thiserror::Error;

use crate::types::SlotType;

/// Result alias for slot-writer construction.
pub type Result<T> = std::result::Result<T, ConverterError>;

/// Reasons a slot writer could not be built.
///
/// All variants are deterministic for a given slot type, layout and
/// configuration, so retrying the same request yields the same error.
#[derive(Debug, Error)]
pub enum ConverterError {
    /// The slot type has no generated write path.
    #[error("{0} isn't supported for generated slot writers")]
    UnsupportedType(SlotType),

    /// No capability is registered for the requested operation.
    #[error("no {capability} capability registered for {ty}")]
    MissingParser {
        capability: &'static str,
        ty: SlotType,
    },

    /// Slot addressing facts could not be derived from the tuple layout.
    #[error("tuple layout unavailable: {0}")]
    LayoutUnavailable(String),

    /// The generated function was rejected by the IR verifier.
    #[error("generated slot writer failed verification: {0}")]
    Verification(String),

    /// ISA construction or machine-code emission failed.
    #[error("codegen error: {0}")]
    Codegen(String),

    /// Declaring, defining or linking the function failed.
    #[error("module error: {0}")]
    Module(String),

    #[error("invalid converter config: {0}")]
    InvalidConfig(String),
}
