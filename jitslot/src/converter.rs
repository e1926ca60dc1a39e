//! Text-to-slot conversion: interpreted write path and generator entry point.
//!
//! [`TextConverter`] carries one query's conversion settings. It writes
//! fields either through [`TextConverter::write_slot`], which walks the same
//! decision procedure as the generated code on every call, or hands the
//! settings to a [`CodegenContext`] to produce a [`CompiledSlotWriter`] per
//! slot. The interpreted path also covers what generated writers do not:
//! CHAR slots, and copying or unescaping string bytes into a [`MemPool`].

use std::sync::Arc;

use crate::config::{ConverterConfig, NullSentinel};
use crate::engine::CodegenContext;
use crate::error::Result;
use crate::escape;
use crate::layout::{SlotDescriptor, Tuple, TupleLayout};
use crate::parse::{string_to_bool, string_to_double, string_to_float, string_to_int};
use crate::pool::MemPool;
use crate::slot_writer::CompiledSlotWriter;
use crate::types::{Parsed, SlotType};

/// Where string slot bytes end up on the interpreted path.
#[derive(Clone, Copy)]
pub enum StringMode<'a> {
    /// Point at the field bytes directly.
    Alias,
    /// Copy the field bytes into the pool.
    Copy(&'a MemPool),
    /// Unescape the field bytes into the pool.
    Unescape(&'a MemPool),
}

/// Per-query text conversion settings.
#[derive(Debug, Clone)]
pub struct TextConverter {
    escape_char: Option<u8>,
    null: NullSentinel,
    strict_mode: bool,
}

impl TextConverter {
    pub fn new(config: &ConverterConfig) -> Result<Self> {
        Ok(Self {
            escape_char: config.escape_byte()?,
            null: config.null_sentinel(),
            strict_mode: config.strict_mode,
        })
    }

    pub fn escape_char(&self) -> Option<u8> {
        self.escape_char
    }

    pub fn null_sentinel(&self) -> &NullSentinel {
        &self.null
    }

    pub fn strict_mode(&self) -> bool {
        self.strict_mode
    }

    /// Unescape `src` into `dst` with this converter's escape character.
    /// Without one, bytes are copied up to the same bound.
    pub fn unescape_string(&self, src: &[u8], dst: &mut [u8], max_len: i64) -> usize {
        match self.escape_char {
            Some(esc) => escape::unescape(src, esc, dst, max_len),
            None => {
                let bound = if max_len > 0 {
                    usize::try_from(max_len).unwrap_or(usize::MAX)
                } else {
                    src.len()
                };
                let n = bound.min(src.len()).min(dst.len());
                dst[..n].copy_from_slice(&src[..n]);
                n
            }
        }
    }

    /// Generate the native writer for `slot_id`.
    pub fn codegen_write_slot(
        &self,
        ctx: &mut CodegenContext,
        layout: &Arc<TupleLayout>,
        slot_id: usize,
    ) -> Result<CompiledSlotWriter> {
        ctx.compile_slot_writer(layout, slot_id, &self.null, self.strict_mode)
    }

    /// Write one field into `slot` without generated code.
    ///
    /// Same return contract as [`CompiledSlotWriter::write`].
    pub fn write_slot<'a>(
        &self,
        slot: &SlotDescriptor,
        tuple: &mut Tuple<'a>,
        data: &'a [u8],
        strings: StringMode<'a>,
    ) -> bool {
        self.write_slot_inner(slot, tuple, data, strings, true)
    }

    /// `write_slot` for text that was already unescaped: its raw form was
    /// checked against the sentinel, so the unescaped bytes are not.
    pub(crate) fn write_unescaped_slot<'a>(
        &self,
        slot: &SlotDescriptor,
        tuple: &mut Tuple<'a>,
        data: &'a [u8],
    ) -> bool {
        self.write_slot_inner(slot, tuple, data, StringMode::Alias, false)
    }

    fn write_slot_inner<'a>(
        &self,
        slot: &SlotDescriptor,
        tuple: &mut Tuple<'a>,
        data: &'a [u8],
        strings: StringMode<'a>,
        check_sentinel: bool,
    ) -> bool {
        let is_sentinel = check_sentinel && self.null.matches(data);
        if is_sentinel || (!slot.ty.is_var_len_string() && data.is_empty()) {
            tuple.set_null(slot.id);
            return true;
        }

        match slot.ty {
            SlotType::String | SlotType::Varchar(_) => {
                let max_len = match slot.ty {
                    SlotType::Varchar(n) => n as usize,
                    _ => usize::MAX,
                };
                let bytes = match strings {
                    StringMode::Alias => data,
                    StringMode::Copy(pool) => pool.copy(&data[..data.len().min(max_len)]),
                    StringMode::Unescape(pool) => match self.escape_char {
                        Some(esc) => pool.unescape(data, esc, max_len_arg(max_len)),
                        None => pool.copy(&data[..data.len().min(max_len)]),
                    },
                };
                tuple.write_string(slot, &bytes[..bytes.len().min(max_len)]);
                true
            }
            SlotType::Char(n) => {
                match (strings, self.escape_char) {
                    (StringMode::Unescape(_), Some(esc)) => {
                        let mut buf = vec![0u8; n as usize];
                        let len = escape::unescape(data, esc, &mut buf, i64::from(n));
                        tuple.write_char(slot, &buf[..len]);
                    }
                    _ => tuple.write_char(slot, data),
                }
                true
            }
            SlotType::Boolean => {
                self.store(slot, tuple, string_to_bool(data).map_value(u8::from))
            }
            SlotType::TinyInt => self.store(slot, tuple, string_to_int::<i8>(data)),
            SlotType::SmallInt => self.store(slot, tuple, string_to_int::<i16>(data)),
            SlotType::Int => self.store(slot, tuple, string_to_int::<i32>(data)),
            SlotType::BigInt => self.store(slot, tuple, string_to_int::<i64>(data)),
            SlotType::Float => self.store(slot, tuple, string_to_float(data)),
            SlotType::Double => self.store(slot, tuple, string_to_double(data)),
        }
    }

    fn store<T: Copy>(&self, slot: &SlotDescriptor, tuple: &mut Tuple<'_>, parsed: Parsed<T>) -> bool {
        match parsed {
            Parsed::Success(v) => {
                tuple.write_value(slot, v);
                true
            }
            Parsed::Overflow(v) if !self.strict_mode => {
                tuple.write_value(slot, v);
                true
            }
            Parsed::Overflow(_) | Parsed::Failure => {
                tuple.set_null(slot.id);
                false
            }
        }
    }
}

fn max_len_arg(max_len: usize) -> i64 {
    i64::try_from(max_len).unwrap_or(0)
}
