//! Slot writer JIT specialization.
//!
//! Generates one native function per destination slot where:
//! - the slot offset and null bit → immediate load/store displacements
//! - the null sentinel → either the specialized `\N` check or a call with the
//!   sentinel address baked as an immediate
//! - `check_null = false` → the null branch is not emitted at all
//! - `strict_mode` → whether OVERFLOW joins the failure branch
//! - the slot type → which parse capability is called, or a direct
//!   (pointer, length) store for strings
//!
//! Generated pseudo-code for an INT slot in strict mode:
//! ```text
//! fn write_slot(tuple, data, len) -> u8:
//!     if CALL is_null_string(data, len):          // only if check_null
//!         goto set_null
//!     if len == 0:                                // non-string types only
//!         goto set_null
//!     status = CALL parse_i32(data, len, tuple + OFFSET)
//!     if status == FAILURE || status == OVERFLOW: // OVERFLOW only if strict
//!         tuple[NULL_BYTE] |= NULL_MASK
//!         return 0
//!     return 1
//! set_null:
//!     tuple[NULL_BYTE] |= NULL_MASK
//!     return 1
//! ```

use std::sync::Arc;

use cranelift_codegen::ir::condcodes::IntCC;
use cranelift_codegen::ir::types;
use cranelift_codegen::ir::{FuncRef, Function, InstBuilder, MemFlags, Type, Value};
use cranelift_frontend::{FunctionBuilder, FunctionBuilderContext};

use crate::error::{ConverterError, Result};
use crate::layout::{SlotDescriptor, StringValue, Tuple, TupleLayout};
use crate::types::{ParseResult, SlotType};

/// Native entry point: `fn(tuple, data, len) -> u8`.
type WriteSlotFn = unsafe extern "C" fn(*mut u8, *const u8, usize) -> u8;

/// A compiled slot writer: the native function pointer plus everything that
/// was baked into it.
#[derive(Debug)]
pub struct CompiledSlotWriter {
    fn_ptr: *const u8,
    slot: SlotDescriptor,
    layout: Arc<TupleLayout>,
    /// Keeps the sentinel bytes alive; generic null checks embed their address.
    _sentinel: Arc<[u8]>,
    check_null: bool,
    strict: bool,
}

// Safety: the compiled code is immutable and keeps no state between calls;
// all other fields are immutable after construction.
unsafe impl Send for CompiledSlotWriter {}
unsafe impl Sync for CompiledSlotWriter {}

impl CompiledSlotWriter {
    pub(crate) fn from_raw(
        fn_ptr: *const u8,
        slot: SlotDescriptor,
        layout: Arc<TupleLayout>,
        sentinel: Arc<[u8]>,
        check_null: bool,
        strict: bool,
    ) -> Self {
        Self {
            fn_ptr,
            slot,
            layout,
            _sentinel: sentinel,
            check_null,
            strict,
        }
    }

    /// Write one field into its slot.
    ///
    /// Returns `true` if the slot now holds a value or a well-formed null, and
    /// `false` if parsing failed and the slot was forced to null. String slots
    /// alias `data` directly, which is why it must live as long as the tuple.
    ///
    /// # Panics
    ///
    /// If `tuple` was not created from the layout this writer was built for.
    #[inline]
    pub fn write<'a>(&self, tuple: &mut Tuple<'a>, data: &'a [u8]) -> bool {
        assert!(
            Arc::ptr_eq(&self.layout, tuple.layout()),
            "slot writer used with a foreign tuple layout"
        );
        // SAFETY: the tuple buffer matches the layout the code was generated
        // for, and `data` outlives the tuple.
        unsafe { self.write_raw(tuple.as_mut_ptr(), data.as_ptr(), data.len()) }
    }

    /// Invoke the native routine directly.
    ///
    /// # Safety
    ///
    /// - `tuple` must point to a writable buffer laid out by this writer's
    ///   [`TupleLayout`].
    /// - `data` must point to `len` readable bytes; for string slots they must
    ///   stay valid for as long as the tuple is read.
    #[inline]
    pub unsafe fn write_raw(&self, tuple: *mut u8, data: *const u8, len: usize) -> bool {
        let func: WriteSlotFn = std::mem::transmute(self.fn_ptr);
        func(tuple, data, len) != 0
    }

    pub fn slot(&self) -> &SlotDescriptor {
        &self.slot
    }

    pub fn layout(&self) -> &Arc<TupleLayout> {
        &self.layout
    }

    pub fn check_null(&self) -> bool {
        self.check_null
    }

    pub fn strict(&self) -> bool {
        self.strict
    }

    /// Get the raw function pointer (for benchmarking/introspection).
    pub fn as_fn_ptr(&self) -> *const u8 {
        self.fn_ptr
    }
}

/// How the generated code recognizes the null sentinel.
#[derive(Debug, Clone, Copy)]
pub(crate) enum NullCheck {
    /// Specialized `\N` comparison.
    Default(FuncRef),
    /// Comparison against a sentinel at a fixed address.
    Generic {
        func: FuncRef,
        sentinel_addr: i64,
        sentinel_len: i64,
    },
}

/// Everything the IR builder bakes into one slot writer.
pub(crate) struct WriteSlotIr<'a> {
    pub slot: &'a SlotDescriptor,
    pub null_check: Option<NullCheck>,
    /// Parse capability; required for scalar slots, ignored for strings.
    pub parse_fn: Option<FuncRef>,
    pub strict: bool,
    pub ptr_type: Type,
}

/// Build the Cranelift IR for one slot writer.
///
/// Blocks: `entry` → (`check_zero`) → `parse_slot` → `parse_fail`, with a
/// shared `set_null` block for sentinel and empty-field nulls.
pub(crate) fn build_write_slot_ir(func: &mut Function, ir: &WriteSlotIr<'_>) -> Result<()> {
    let slot = ir.slot;
    if matches!(slot.ty, SlotType::Char(_)) {
        return Err(ConverterError::UnsupportedType(slot.ty));
    }
    let var_len = slot.ty.is_var_len_string();
    let offset = imm_offset(slot.offset)?;
    let null_byte = imm_offset(slot.null_byte)?;

    let mut fbc = FunctionBuilderContext::new();
    let mut builder = FunctionBuilder::new(func, &mut fbc);

    let entry = builder.create_block();
    builder.append_block_params_for_function_params(entry);
    builder.switch_to_block(entry);

    let tuple = builder.block_params(entry)[0];
    let data = builder.block_params(entry)[1];
    let len = builder.block_params(entry)[2];

    let set_null = builder.create_block();
    let parse_slot = builder.create_block();
    let check_zero = if var_len {
        None
    } else {
        Some(builder.create_block())
    };
    let not_null = check_zero.unwrap_or(parse_slot);

    // ── entry: compare against the sentinel ──
    match ir.null_check {
        Some(NullCheck::Default(func_ref)) => {
            let call = builder.ins().call(func_ref, &[data, len]);
            let is_null = builder.inst_results(call)[0];
            builder.ins().brif(is_null, set_null, &[], not_null, &[]);
        }
        Some(NullCheck::Generic {
            func: func_ref,
            sentinel_addr,
            sentinel_len,
        }) => {
            let sentinel = builder.ins().iconst(ir.ptr_type, sentinel_addr);
            let sentinel_len = builder.ins().iconst(ir.ptr_type, sentinel_len);
            let call = builder
                .ins()
                .call(func_ref, &[data, len, sentinel, sentinel_len]);
            let is_null = builder.inst_results(call)[0];
            builder.ins().brif(is_null, set_null, &[], not_null, &[]);
        }
        None => {
            builder.ins().jump(not_null, &[]);
        }
    }

    // ── check_zero: an empty non-string field is null ──
    if let Some(check_zero) = check_zero {
        builder.switch_to_block(check_zero);
        let is_empty = builder.ins().icmp_imm(IntCC::Equal, len, 0);
        builder.ins().brif(is_empty, set_null, &[], parse_slot, &[]);
    }

    // ── parse_slot ──
    builder.switch_to_block(parse_slot);
    match slot.ty {
        SlotType::String | SlotType::Varchar(_) => {
            let stored_len = match slot.ty {
                SlotType::Varchar(max_len) => {
                    let max_len = builder.ins().iconst(ir.ptr_type, i64::from(max_len));
                    let len_lt_max = builder.ins().icmp(IntCC::UnsignedLessThan, len, max_len);
                    builder.ins().select(len_lt_max, len, max_len)
                }
                _ => len,
            };
            let len_offset = offset + StringValue::LEN_OFFSET as i32;
            builder.ins().store(MemFlags::trusted(), data, tuple, offset);
            builder
                .ins()
                .store(MemFlags::trusted(), stored_len, tuple, len_offset);
            ret_bool(&mut builder, true);
        }
        _ => {
            let Some(parse_fn) = ir.parse_fn else {
                return Err(ConverterError::MissingParser {
                    capability: "parse",
                    ty: slot.ty,
                });
            };
            let parse_success = builder.create_block();
            let parse_fail = builder.create_block();

            // The parse capability writes straight into the slot.
            let slot_addr = builder.ins().iadd_imm(tuple, i64::from(offset));
            let call = builder.ins().call(parse_fn, &[data, len, slot_addr]);
            let status = builder.inst_results(call)[0];

            let failure = ParseResult::Failure as i64;
            let mut failed = builder.ins().icmp_imm(IntCC::Equal, status, failure);
            if ir.strict {
                let overflow = ParseResult::Overflow as i64;
                let overflowed = builder.ins().icmp_imm(IntCC::Equal, status, overflow);
                failed = builder.ins().bor(failed, overflowed);
            }
            builder
                .ins()
                .brif(failed, parse_fail, &[], parse_success, &[]);

            builder.switch_to_block(parse_success);
            ret_bool(&mut builder, true);

            builder.switch_to_block(parse_fail);
            emit_set_null(&mut builder, tuple, null_byte, slot.null_mask);
            ret_bool(&mut builder, false);
        }
    }

    // ── set_null: sentinel match or empty field ──
    builder.switch_to_block(set_null);
    emit_set_null(&mut builder, tuple, null_byte, slot.null_mask);
    ret_bool(&mut builder, true);

    builder.seal_all_blocks();
    builder.finalize();
    Ok(())
}

/// `tuple[null_byte] |= null_mask`
fn emit_set_null(builder: &mut FunctionBuilder<'_>, tuple: Value, null_byte: i32, null_mask: u8) {
    let byte = builder
        .ins()
        .load(types::I8, MemFlags::trusted(), tuple, null_byte);
    let byte = builder.ins().bor_imm(byte, i64::from(null_mask));
    builder.ins().store(MemFlags::trusted(), byte, tuple, null_byte);
}

fn ret_bool(builder: &mut FunctionBuilder<'_>, value: bool) {
    let v = builder.ins().iconst(types::I8, i64::from(value));
    builder.ins().return_(&[v]);
}

fn imm_offset(offset: usize) -> Result<i32> {
    i32::try_from(offset)
        .ok()
        .filter(|o| o.checked_add(StringValue::LEN_OFFSET as i32).is_some())
        .ok_or_else(|| {
            ConverterError::LayoutUnavailable(format!(
                "slot offset {offset} does not fit an immediate displacement"
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use cranelift_codegen::ir::{AbiParam, ExtFuncData, ExternalName, Signature, UserExternalName};
    use cranelift_codegen::isa::CallConv;
    use cranelift_codegen::settings;

    fn writer_signature() -> Signature {
        let mut sig = Signature::new(CallConv::SystemV);
        sig.params.push(AbiParam::new(types::I64));
        sig.params.push(AbiParam::new(types::I64));
        sig.params.push(AbiParam::new(types::I64));
        sig.returns.push(AbiParam::new(types::I8));
        sig
    }

    fn import(func: &mut Function, index: u32, params: usize, ret: Type) -> FuncRef {
        let mut sig = Signature::new(CallConv::SystemV);
        for _ in 0..params {
            sig.params.push(AbiParam::new(types::I64));
        }
        sig.returns.push(AbiParam::new(ret));
        let sig_ref = func.import_signature(sig);
        let name = func.declare_imported_user_function(UserExternalName::new(0, index));
        func.import_function(ExtFuncData {
            name: ExternalName::user(name),
            signature: sig_ref,
            colocated: false,
        })
    }

    fn build(ty: SlotType, check_null: bool, strict: bool) -> Result<Function> {
        let layout = TupleLayout::new(&[ty]);
        let slot = *layout.slot(0).unwrap();
        let mut func = Function::new();
        func.signature = writer_signature();
        let parse_fn = Some(import(&mut func, 1, 3, types::I32));
        let null_check = check_null.then(|| NullCheck::Default(import(&mut func, 2, 2, types::I8)));
        build_write_slot_ir(
            &mut func,
            &WriteSlotIr {
                slot: &slot,
                null_check,
                parse_fn,
                strict,
                ptr_type: types::I64,
            },
        )?;
        Ok(func)
    }

    #[test]
    fn test_ir_verifies_for_all_writable_types() {
        let flags = settings::Flags::new(settings::builder());
        let tys = [
            SlotType::Boolean,
            SlotType::Int,
            SlotType::Double,
            SlotType::String,
            SlotType::Varchar(5),
        ];
        for ty in tys {
            for check_null in [false, true] {
                for strict in [false, true] {
                    let func = build(ty, check_null, strict).unwrap();
                    cranelift_codegen::verify_function(&func, &flags)
                        .unwrap_or_else(|e| panic!("{ty} {check_null} {strict}: {e}"));
                }
            }
        }
    }

    #[test]
    fn test_string_ir_has_no_zero_check() {
        let with_check = build(SlotType::Int, false, false).unwrap();
        let without = build(SlotType::String, false, false).unwrap();
        assert!(with_check.dfg.num_blocks() > without.dfg.num_blocks());
    }

    #[test]
    fn test_char_rejected() {
        let err = build(SlotType::Char(3), true, false).unwrap_err();
        assert!(matches!(err, ConverterError::UnsupportedType(SlotType::Char(3))));
    }

    #[test]
    fn test_offset_must_fit_immediate() {
        assert!(imm_offset(16).is_ok());
        assert!(matches!(
            imm_offset(usize::MAX),
            Err(ConverterError::LayoutUnavailable(_))
        ));
    }
}
