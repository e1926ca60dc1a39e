//! Code emission context: Cranelift infrastructure.
//!
//! The `CodegenContext` owns Cranelift's JIT module, compiles slot writers to
//! native code, and caches them by everything that was baked into them. It is
//! created once per query setup phase and passed by `&mut` to whoever
//! generates writers; nothing about it is global.
//!
//! Parse and null-check capabilities come from a [`ParserRegistry`] and are
//! registered as JIT symbols at build time. Generated code calls them through
//! Cranelift's normal call mechanism.

use std::collections::HashMap;
use std::sync::Arc;

use cranelift_codegen::ir::types;
use cranelift_codegen::ir::{AbiParam, Signature, UserFuncName};
use cranelift_jit::{JITBuilder, JITModule};
use cranelift_module::{FuncId, Linkage, Module};
use tracing::debug;

use crate::config::NullSentinel;
use crate::error::{ConverterError, Result};
use crate::isa::{host_isa, OptLevel};
use crate::layout::TupleLayout;
use crate::registry::{DefaultParsers, ParserRegistry, Symbol};
use crate::slot_writer::{build_write_slot_ir, CompiledSlotWriter, NullCheck, WriteSlotIr};
use crate::types::SlotType;

/// Builder for a codegen context with a custom parser registry.
///
/// The registry must be chosen before the context exists because the JIT
/// module resolves symbols at link time.
pub struct CodegenContextBuilder {
    registry: Arc<dyn ParserRegistry>,
    opt_level: OptLevel,
}

impl CodegenContextBuilder {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(DefaultParsers),
            opt_level: OptLevel::default(),
        }
    }

    /// Replace the parse/null-check capabilities.
    ///
    /// # Safety
    ///
    /// Every address the registry returns must be a function with the
    /// calling convention documented in [`crate::registry`], valid for the
    /// lifetime of all writers generated from the context.
    pub unsafe fn registry(mut self, registry: Arc<dyn ParserRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn opt_level(mut self, opt_level: OptLevel) -> Self {
        self.opt_level = opt_level;
        self
    }

    /// Build the context and register every capability symbol.
    pub fn build(self) -> Result<CodegenContext> {
        let isa = host_isa(self.opt_level)?;
        let mut builder = JITBuilder::with_isa(isa, cranelift_module::default_libcall_names());
        for Symbol { name, addr } in self.registry.symbols() {
            builder.symbol(name, addr);
        }
        let module = JITModule::new(builder);

        Ok(CodegenContext {
            module,
            registry: self.registry,
            writer_cache: HashMap::new(),
            next_fn: 0,
        })
    }
}

impl Default for CodegenContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything baked into a generated writer. Two requests with the same key
/// share one native routine.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct WriterKey {
    ty: SlotType,
    offset: usize,
    null_byte: usize,
    null_mask: u8,
    sentinel: Option<Arc<[u8]>>,
    strict: bool,
}

/// The code emission context.
///
/// Holds a Cranelift `JITModule` and a cache of compiled writers. Generation
/// takes `&mut self`; the routines it hands out are immutable and callable
/// from any thread.
pub struct CodegenContext {
    /// Cranelift JIT module; owns the compiled code pages.
    module: JITModule,

    registry: Arc<dyn ParserRegistry>,

    /// Compiled writer cache: key → (fn_ptr, sentinel storage).
    writer_cache: HashMap<WriterKey, (*const u8, Arc<[u8]>)>,

    /// Suffix for the next generated function name.
    next_fn: u32,
}

// Safety: JITModule's compiled code pages are immutable after finalization,
// and all mutation of the context goes through `&mut self`.
unsafe impl Send for CodegenContext {}
unsafe impl Sync for CodegenContext {}

impl CodegenContext {
    /// Create a context with the default parsers.
    /// For custom capabilities, use `CodegenContextBuilder` instead.
    pub fn new() -> Result<Self> {
        CodegenContextBuilder::new().build()
    }

    /// Generate the writer for slot `slot_id` of `layout`.
    ///
    /// Either a fully built and verified writer is returned, or nothing is
    /// installed and the reason comes back as an error.
    pub fn compile_slot_writer(
        &mut self,
        layout: &Arc<TupleLayout>,
        slot_id: usize,
        null: &NullSentinel,
        strict: bool,
    ) -> Result<CompiledSlotWriter> {
        let slot = *layout.slot(slot_id).ok_or_else(|| {
            ConverterError::LayoutUnavailable(format!(
                "slot {slot_id} not in {}-slot tuple",
                layout.num_slots()
            ))
        })?;
        if matches!(slot.ty, SlotType::Char(_)) {
            return Err(ConverterError::UnsupportedType(slot.ty));
        }

        let key = WriterKey {
            ty: slot.ty,
            offset: slot.offset,
            null_byte: slot.null_byte,
            null_mask: slot.null_mask,
            sentinel: null.is_enabled().then(|| Arc::clone(null.shared_bytes())),
            strict,
        };
        if let Some((ptr, sentinel)) = self.writer_cache.get(&key) {
            debug!(slot = slot_id, ty = %slot.ty, "slot writer cache hit");
            return Ok(CompiledSlotWriter::from_raw(
                *ptr,
                slot,
                Arc::clone(layout),
                Arc::clone(sentinel),
                null.is_enabled(),
                strict,
            ));
        }

        // Resolve capabilities before touching the module.
        let parse_sym = if slot.ty.is_scalar() {
            Some(
                self.registry
                    .parse_fn(slot.ty)
                    .ok_or(ConverterError::MissingParser {
                        capability: "parse",
                        ty: slot.ty,
                    })?,
            )
        } else {
            None
        };
        let null_sym = if !null.is_enabled() {
            None
        } else if null.is_default() {
            Some(
                self.registry
                    .is_null_string_fn()
                    .ok_or(ConverterError::MissingParser {
                        capability: "null check",
                        ty: slot.ty,
                    })?,
            )
        } else {
            Some(
                self.registry
                    .generic_is_null_string_fn()
                    .ok_or(ConverterError::MissingParser {
                        capability: "generic null check",
                        ty: slot.ty,
                    })?,
            )
        };

        let func_name = format!("write_slot_{}", self.next_fn);
        self.next_fn += 1;
        let sig = write_slot_signature(&self.module);
        let func_id = self
            .module
            .declare_function(&func_name, Linkage::Local, &sig)
            .map_err(|e| ConverterError::Module(e.to_string()))?;

        let parse_id = match parse_sym {
            Some(sym) => Some(self.declare_import(sym.name, parse_signature(&self.module))?),
            None => None,
        };
        let null_id = match null_sym {
            Some(sym) if null.is_default() => {
                Some(self.declare_import(sym.name, null_check_signature(&self.module))?)
            }
            Some(sym) => Some(self.declare_import(
                sym.name,
                generic_null_check_signature(&self.module),
            )?),
            None => None,
        };

        let mut ctx = self.module.make_context();
        ctx.func.signature = sig;
        ctx.func.name = UserFuncName::user(0, func_id.as_u32());

        let parse_fn = parse_id.map(|id| self.module.declare_func_in_func(id, &mut ctx.func));
        let null_check = null_id.map(|id| {
            let func_ref = self.module.declare_func_in_func(id, &mut ctx.func);
            if null.is_default() {
                NullCheck::Default(func_ref)
            } else {
                NullCheck::Generic {
                    func: func_ref,
                    sentinel_addr: null.shared_bytes().as_ptr() as i64,
                    sentinel_len: null.bytes().len() as i64,
                }
            }
        });

        let ptr_type = self.module.target_config().pointer_type();
        let built = build_write_slot_ir(
            &mut ctx.func,
            &WriteSlotIr {
                slot: &slot,
                null_check,
                parse_fn,
                strict,
                ptr_type,
            },
        )
        .and_then(|()| {
            cranelift_codegen::verify_function(&ctx.func, self.module.isa())
                .map_err(|e| ConverterError::Verification(e.to_string()))
        });
        if let Err(e) = built {
            self.module.clear_context(&mut ctx);
            return Err(e);
        }

        // Compile
        let defined = self
            .module
            .define_function(func_id, &mut ctx)
            .map_err(|e| ConverterError::Codegen(e.to_string()));
        self.module.clear_context(&mut ctx);
        defined?;
        self.module
            .finalize_definitions()
            .map_err(|e| ConverterError::Codegen(format!("{e:?}")))?;

        let code_ptr = self.module.get_finalized_function(func_id);
        let sentinel = Arc::clone(null.shared_bytes());
        self.writer_cache
            .insert(key, (code_ptr, Arc::clone(&sentinel)));
        debug!(
            slot = slot_id,
            ty = %slot.ty,
            func = %func_name,
            check_null = null.is_enabled(),
            strict,
            "compiled slot writer"
        );

        Ok(CompiledSlotWriter::from_raw(
            code_ptr,
            slot,
            Arc::clone(layout),
            sentinel,
            null.is_enabled(),
            strict,
        ))
    }

    /// Get the number of distinct compiled writers.
    pub fn cached_count(&self) -> usize {
        self.writer_cache.len()
    }

    fn declare_import(&mut self, name: &str, sig: Signature) -> Result<FuncId> {
        self.module
            .declare_function(name, Linkage::Import, &sig)
            .map_err(|e| ConverterError::Module(e.to_string()))
    }
}

/// Slot writer signature:
/// `fn(tuple: *mut u8, data: *const u8, len: usize) -> u8`
fn write_slot_signature(module: &JITModule) -> Signature {
    let ptr_type = module.target_config().pointer_type();
    let mut sig = module.make_signature();
    sig.params.push(AbiParam::new(ptr_type)); // tuple
    sig.params.push(AbiParam::new(ptr_type)); // data
    sig.params.push(AbiParam::new(ptr_type)); // len
    sig.returns.push(AbiParam::new(types::I8)); // ok
    sig
}

/// Parse capability signature:
/// `fn(data: *const u8, len: usize, out: *mut T) -> u32`
fn parse_signature(module: &JITModule) -> Signature {
    let ptr_type = module.target_config().pointer_type();
    let mut sig = module.make_signature();
    sig.params.push(AbiParam::new(ptr_type)); // data
    sig.params.push(AbiParam::new(ptr_type)); // len
    sig.params.push(AbiParam::new(ptr_type)); // out
    sig.returns.push(AbiParam::new(types::I32)); // status
    sig
}

/// `\N` check signature: `fn(data: *const u8, len: usize) -> u8`
fn null_check_signature(module: &JITModule) -> Signature {
    let ptr_type = module.target_config().pointer_type();
    let mut sig = module.make_signature();
    sig.params.push(AbiParam::new(ptr_type)); // data
    sig.params.push(AbiParam::new(ptr_type)); // len
    sig.returns.push(AbiParam::new(types::I8)); // is_null
    sig
}

/// Generic null check signature:
/// `fn(data: *const u8, len: usize, sentinel: *const u8, sentinel_len: usize) -> u8`
fn generic_null_check_signature(module: &JITModule) -> Signature {
    let mut sig = null_check_signature(module);
    let ptr_type = module.target_config().pointer_type();
    sig.params.push(AbiParam::new(ptr_type)); // sentinel
    sig.params.push(AbiParam::new(ptr_type)); // sentinel_len
    sig
}
