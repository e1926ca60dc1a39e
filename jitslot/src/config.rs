//! Query-scoped converter configuration.
//!
//! Like the scan parameters it sits next to, every field here ends up baked
//! into generated code: the sentinel becomes an immediate address (or selects
//! the specialized `\N` check), `check_null` decides whether the null branch
//! exists at all, and `strict_mode` decides whether overflow joins the
//! failure branch.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{ConverterError, Result};

/// Text conversion settings, supplied once per query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConverterConfig {
    /// Escape character for field text; `None` disables unescaping.
    pub escape_char: Option<char>,

    /// Field text that represents SQL NULL.
    pub null_col_val: String,

    /// Whether fields are compared against `null_col_val` at all.
    pub check_null: bool,

    /// Treat numeric overflow as a parse failure.
    pub strict_mode: bool,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            escape_char: Some('\\'),
            null_col_val: String::from("\\N"),
            check_null: true,
            strict_mode: false,
        }
    }
}

impl ConverterConfig {
    /// Parse and validate a JSON configuration object.
    ///
    /// Missing keys take their default values.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ConverterError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.escape_byte().map(|_| ())
    }

    /// Escape character as a byte, if configured.
    pub fn escape_byte(&self) -> Result<Option<u8>> {
        self.escape_char
            .map(|c| {
                u8::try_from(c).ok().filter(u8::is_ascii).ok_or_else(|| {
                    ConverterError::InvalidConfig(format!(
                        "escape character {c:?} is not a single byte"
                    ))
                })
            })
            .transpose()
    }

    pub fn null_sentinel(&self) -> NullSentinel {
        NullSentinel::new(self.null_col_val.as_bytes(), self.check_null)
    }
}

/// Configured null text plus its enable flag.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NullSentinel {
    bytes: Arc<[u8]>,
    enabled: bool,
}

impl NullSentinel {
    pub fn new(bytes: &[u8], enabled: bool) -> Self {
        Self {
            bytes: Arc::from(bytes),
            enabled,
        }
    }

    /// Null checking switched off.
    pub fn disabled() -> Self {
        Self::new(b"\\N", false)
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Shared handle to the sentinel storage, kept alive by writers whose
    /// code embeds its address.
    pub(crate) fn shared_bytes(&self) -> &Arc<[u8]> {
        &self.bytes
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// True for the two-byte `\N` default, which has a specialized check.
    pub fn is_default(&self) -> bool {
        &*self.bytes == b"\\N"
    }

    /// Whether `field` is the sentinel. Always false when disabled.
    #[inline]
    pub fn matches(&self, field: &[u8]) -> bool {
        self.enabled && field == &*self.bytes
    }
}

impl Default for NullSentinel {
    fn default() -> Self {
        Self::new(b"\\N", true)
    }
}
