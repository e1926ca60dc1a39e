//! Capability registry: named native symbols that generated writers call.
//!
//! Generated code never parses text itself. It calls parse and null-check
//! functions through Cranelift imports, and the JIT module resolves those
//! imports against the symbols a [`ParserRegistry`] hands out when the
//! [`CodegenContext`](crate::CodegenContext) is built.
//!
//! Calling conventions (all `extern "C"`):
//! - parse: `fn(data: *const u8, len: usize, out: *mut T) -> u32` where the
//!   result is a [`ParseResult`](crate::ParseResult) code and `out` is only
//!   written on success or overflow.
//! - null check: `fn(data: *const u8, len: usize) -> u8`
//! - generic null check:
//!   `fn(data: *const u8, len: usize, sentinel: *const u8, sentinel_len: usize) -> u8`

use crate::parse;
use crate::types::SlotType;

/// A native function exported to generated code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Symbol {
    pub name: &'static str,
    pub addr: *const u8,
}

/// Source of parse and null-check capabilities.
///
/// Returned addresses must stay valid for as long as any writer generated
/// against them is alive.
pub trait ParserRegistry: Send + Sync {
    /// Parse function for a scalar slot type.
    fn parse_fn(&self, ty: SlotType) -> Option<Symbol>;

    /// Specialized check for the default `\N` sentinel.
    fn is_null_string_fn(&self) -> Option<Symbol>;

    /// Check against an arbitrary sentinel passed by address and length.
    fn generic_is_null_string_fn(&self) -> Option<Symbol>;

    /// Every symbol to register with the JIT linker.
    fn symbols(&self) -> Vec<Symbol> {
        SlotType::SCALARS
            .iter()
            .filter_map(|&ty| self.parse_fn(ty))
            .chain(self.is_null_string_fn())
            .chain(self.generic_is_null_string_fn())
            .collect()
    }
}

/// Registry backed by the parsers in [`crate::parse`].
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultParsers;

impl ParserRegistry for DefaultParsers {
    fn parse_fn(&self, ty: SlotType) -> Option<Symbol> {
        let (name, addr) = match ty {
            SlotType::Boolean => ("jitslot_parse_bool", parse::parse_bool_trampoline as *const u8),
            SlotType::TinyInt => ("jitslot_parse_i8", parse::parse_i8_trampoline as *const u8),
            SlotType::SmallInt => ("jitslot_parse_i16", parse::parse_i16_trampoline as *const u8),
            SlotType::Int => ("jitslot_parse_i32", parse::parse_i32_trampoline as *const u8),
            SlotType::BigInt => ("jitslot_parse_i64", parse::parse_i64_trampoline as *const u8),
            SlotType::Float => ("jitslot_parse_f32", parse::parse_f32_trampoline as *const u8),
            SlotType::Double => ("jitslot_parse_f64", parse::parse_f64_trampoline as *const u8),
            SlotType::String | SlotType::Varchar(_) | SlotType::Char(_) => return None,
        };
        Some(Symbol { name, addr })
    }

    fn is_null_string_fn(&self) -> Option<Symbol> {
        Some(Symbol {
            name: "jitslot_is_null_string",
            addr: parse::is_null_string_trampoline as *const u8,
        })
    }

    fn generic_is_null_string_fn(&self) -> Option<Symbol> {
        Some(Symbol {
            name: "jitslot_generic_is_null_string",
            addr: parse::generic_is_null_string_trampoline as *const u8,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_registry_covers_scalars() {
        let registry = DefaultParsers;
        for ty in SlotType::SCALARS {
            let sym = registry.parse_fn(ty).unwrap();
            assert!(!sym.addr.is_null());
        }
        assert!(registry.parse_fn(SlotType::String).is_none());
        assert!(registry.parse_fn(SlotType::Char(4)).is_none());
    }

    #[test]
    fn test_symbol_names_unique() {
        let symbols = DefaultParsers.symbols();
        assert_eq!(symbols.len(), 9);
        let mut names: Vec<_> = symbols.iter().map(|s| s.name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), 9);
    }
}
