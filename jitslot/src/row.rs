//! Whole-row conversion: one writer per slot of a tuple layout.
//!
//! A [`RowWriter`] is built once per query. For every slot it tries to
//! generate a native writer; slots that cannot be generated (CHAR, a missing
//! capability, a verifier failure) fall back to the interpreted path when
//! fallback is allowed, so one odd column does not cost the whole row its
//! generated code.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::ConverterConfig;
use crate::converter::{StringMode, TextConverter};
use crate::engine::CodegenContext;
use crate::error::Result;
use crate::layout::{SlotDescriptor, Tuple, TupleLayout};
use crate::pool::MemPool;
use crate::slot_writer::CompiledSlotWriter;
use crate::types::SlotType;

enum SlotPath {
    Native(CompiledSlotWriter),
    Interpreted(SlotDescriptor),
}

impl SlotPath {
    fn slot(&self) -> &SlotDescriptor {
        match self {
            SlotPath::Native(writer) => writer.slot(),
            SlotPath::Interpreted(desc) => desc,
        }
    }
}

/// Converts rows of raw fields into tuples of one layout.
pub struct RowWriter {
    layout: Arc<TupleLayout>,
    converter: TextConverter,
    slots: Vec<SlotPath>,
}

impl RowWriter {
    /// Build writers for every slot of `layout`.
    ///
    /// With `ctx == None` code generation is disabled and every slot uses the
    /// interpreted path. With `allow_fallback == false` the first generation
    /// error is returned instead.
    pub fn new(
        mut ctx: Option<&mut CodegenContext>,
        layout: &Arc<TupleLayout>,
        config: &ConverterConfig,
        allow_fallback: bool,
    ) -> Result<Self> {
        let converter = TextConverter::new(config)?;
        let mut slots = Vec::with_capacity(layout.num_slots());

        for desc in layout.slots() {
            let Some(ctx) = ctx.as_deref_mut() else {
                slots.push(SlotPath::Interpreted(*desc));
                continue;
            };
            match converter.codegen_write_slot(ctx, layout, desc.id) {
                Ok(writer) => slots.push(SlotPath::Native(writer)),
                Err(e) if allow_fallback => {
                    warn!(slot = desc.id, ty = %desc.ty, error = %e, "slot writer codegen disabled");
                    slots.push(SlotPath::Interpreted(*desc));
                }
                Err(e) => return Err(e),
            }
        }

        let writer = Self {
            layout: Arc::clone(layout),
            converter,
            slots,
        };
        debug!("{}", writer.codegen_summary());
        Ok(writer)
    }

    pub fn layout(&self) -> &Arc<TupleLayout> {
        &self.layout
    }

    /// Number of slots running generated code.
    pub fn num_native(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| matches!(s, SlotPath::Native(_)))
            .count()
    }

    pub fn is_native(&self, slot: usize) -> bool {
        matches!(self.slots.get(slot), Some(SlotPath::Native(_)))
    }

    pub fn codegen_summary(&self) -> String {
        format!(
            "Codegen enabled: {} out of {}",
            self.num_native(),
            self.slots.len()
        )
    }

    /// Write one row of fields into `tuple`.
    ///
    /// Field `i` goes to slot `i`. String and CHAR fields containing the
    /// escape character are unescaped into `pool` first; other types parse
    /// the raw text. The null sentinel is always matched against the raw
    /// text. Slots without a field are set to null and surplus fields are
    /// ignored. Returns `false` if any slot had a hard
    /// parse failure; every slot is still written.
    pub fn write_row<'a>(
        &self,
        tuple: &mut Tuple<'a>,
        fields: &[&'a [u8]],
        pool: &'a MemPool,
    ) -> bool {
        let escape = self.converter.escape_char();
        let null = self.converter.null_sentinel();
        let mut ok = true;
        for (i, path) in self.slots.iter().enumerate() {
            let Some(&raw) = fields.get(i) else {
                tuple.set_null(i);
                continue;
            };
            let holds_text = matches!(
                path.slot().ty,
                SlotType::String | SlotType::Varchar(_) | SlotType::Char(_)
            );
            match escape {
                Some(esc) if holds_text && raw.contains(&esc) && !null.matches(raw) => {
                    let data = pool.unescape(raw, esc, 0);
                    ok &= match path {
                        // Unescaped text can spell the sentinel without being null.
                        SlotPath::Native(writer) if null.matches(data) => {
                            self.converter.write_unescaped_slot(writer.slot(), tuple, data)
                        }
                        SlotPath::Native(writer) => writer.write(tuple, data),
                        SlotPath::Interpreted(desc) => {
                            self.converter.write_unescaped_slot(desc, tuple, data)
                        }
                    };
                }
                _ => {
                    ok &= match path {
                        SlotPath::Native(writer) => writer.write(tuple, raw),
                        SlotPath::Interpreted(desc) => {
                            self.converter
                                .write_slot(desc, tuple, raw, StringMode::Alias)
                        }
                    };
                }
            }
        }
        ok
    }
}
