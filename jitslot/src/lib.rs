//! # jitslot: text fields to tuple slots via Cranelift JIT
//!
//! `jitslot` turns a slot's type, layout position and the query's null and
//! overflow settings into a native function that converts one raw text field
//! and writes it into a row buffer. The decision procedure is fixed at query
//! setup; per row there is no type dispatch and no config lookup.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use jitslot::{CodegenContext, ConverterConfig, SlotType, TextConverter, Tuple, TupleLayout};
//!
//! let mut ctx = CodegenContext::new()?;
//! let layout = Arc::new(TupleLayout::new(&[SlotType::Int, SlotType::Varchar(8)]));
//! let converter = TextConverter::new(&ConverterConfig::default())?;
//!
//! let id = converter.codegen_write_slot(&mut ctx, &layout, 0)?;
//! let name = converter.codegen_write_slot(&mut ctx, &layout, 1)?;
//!
//! let line = b"42|ferris";
//! let mut tuple = Tuple::new(&layout);
//! assert!(id.write(&mut tuple, &line[..2]));
//! assert!(name.write(&mut tuple, &line[3..]));
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ConverterConfig + TupleLayout + SlotType
//!       │
//!       ▼
//! CodegenContext::compile_slot_writer
//!       │   resolve parse / null-check symbols (ParserRegistry)
//!       ▼
//! Cranelift IR builder  →  CLIF IR  →  verifier
//!       │
//!       ▼
//! Cranelift codegen  →  native machine code
//!       │
//!       ▼
//! CompiledSlotWriter  →  cached in the context by everything baked in
//! ```
//!
//! Values baked as immediates:
//! - slot offset, null byte and null mask → load/store displacements
//! - null sentinel → address + length operands (or the `\N` fast check)
//! - `strict_mode` → whether OVERFLOW is compared into the failure branch
//! - VARCHAR max length → compare/select immediate
//!
//! Slots the generator does not handle (CHAR) and configurations where code
//! generation is off use [`TextConverter::write_slot`], which runs the same
//! decision procedure without generated code. [`RowWriter`] mixes both per
//! slot.

pub mod config;
pub mod converter;
pub mod engine;
pub mod error;
pub mod escape;
pub mod isa;
pub mod layout;
pub mod parse;
pub mod pool;
pub mod registry;
pub mod row;
pub mod slot_writer;
pub mod types;

// Re-exports
pub use config::{ConverterConfig, NullSentinel};
pub use converter::{StringMode, TextConverter};
pub use engine::{CodegenContext, CodegenContextBuilder};
pub use error::{ConverterError, Result};
pub use escape::{unescape, unescape_to_vec};
pub use isa::OptLevel;
pub use layout::{SlotDescriptor, StringValue, Tuple, TupleLayout};
pub use pool::MemPool;
pub use registry::{DefaultParsers, ParserRegistry, Symbol};
pub use row::RowWriter;
pub use slot_writer::CompiledSlotWriter;
pub use types::{ParseResult, Parsed, SlotType};
