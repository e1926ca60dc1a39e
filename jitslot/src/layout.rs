//! Tuple layout and tuple buffers.
//!
//! A [`TupleLayout`] fixes, once per query, where every slot lives inside a
//! row: its byte offset and the byte/bit of its null indicator. Generated
//! writers bake these numbers into their instructions, so a layout is
//! immutable after construction and shared behind an `Arc`.
//!
//! ```text
//! +--------------------------+ offset 0
//! | slots, widest alignment  |
//! | first (8, 4, 2, 1 bytes) |
//! +--------------------------+
//! | null indicator bytes     |  one bit per slot
//! +--------------------------+ byte_size (multiple of 8)
//! ```

use std::marker::PhantomData;
use std::mem;
use std::ptr;
use std::sync::Arc;

use crate::types::SlotType;

/// Addressing facts for one slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotDescriptor {
    /// Position of the slot in the layout (field index in the input row).
    pub id: usize,
    pub ty: SlotType,
    /// Byte offset of the slot's value.
    pub offset: usize,
    /// Byte offset of the byte holding the null indicator.
    pub null_byte: usize,
    /// Single-bit mask selecting the null indicator within `null_byte`.
    pub null_mask: u8,
}

/// Immutable description of a row's memory layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TupleLayout {
    slots: Vec<SlotDescriptor>,
    byte_size: usize,
}

impl TupleLayout {
    /// Lay out `types` in order of decreasing alignment, followed by the null
    /// indicator bytes.
    pub fn new(types: &[SlotType]) -> Self {
        let mut order: Vec<usize> = (0..types.len()).collect();
        // Stable sort keeps declaration order among equally aligned slots.
        order.sort_by_key(|&i| std::cmp::Reverse(types[i].alignment()));

        let mut offsets = vec![0usize; types.len()];
        let mut cursor = 0usize;
        for &i in &order {
            let align = types[i].alignment();
            cursor = cursor.next_multiple_of(align);
            offsets[i] = cursor;
            cursor += types[i].byte_size();
        }

        let null_start = cursor;
        let null_bytes = types.len().div_ceil(8);
        let byte_size = (null_start + null_bytes).next_multiple_of(8);

        let slots = types
            .iter()
            .enumerate()
            .map(|(id, &ty)| SlotDescriptor {
                id,
                ty,
                offset: offsets[id],
                null_byte: null_start + id / 8,
                null_mask: 1 << (id % 8),
            })
            .collect();

        Self { slots, byte_size }
    }

    /// Layout facts for slot `id`, or `None` if the layout has no such slot.
    #[inline]
    pub fn slot(&self, id: usize) -> Option<&SlotDescriptor> {
        self.slots.get(id)
    }

    pub fn slots(&self) -> &[SlotDescriptor] {
        &self.slots
    }

    pub fn num_slots(&self) -> usize {
        self.slots.len()
    }

    /// Total tuple size in bytes, always a multiple of 8.
    pub fn byte_size(&self) -> usize {
        self.byte_size
    }
}

/// Non-owning view stored in variable-length string slots.
///
/// The pointer aliases caller memory (the raw input buffer or a batch pool).
/// Nothing here keeps that memory alive; [`Tuple`]'s lifetime parameter is
/// what ties a safe tuple to the buffers its string slots point into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct StringValue {
    pub ptr: *const u8,
    pub len: usize,
}

impl StringValue {
    /// Byte offset of `len` within the struct, used by generated stores.
    pub const LEN_OFFSET: usize = mem::offset_of!(StringValue, len);

    pub fn new(bytes: &[u8]) -> Self {
        Self {
            ptr: bytes.as_ptr(),
            len: bytes.len(),
        }
    }

    /// Reconstruct the aliased bytes.
    ///
    /// # Safety
    ///
    /// `ptr` must point to `len` readable bytes that stay alive and
    /// unmodified for `'a`.
    pub unsafe fn as_bytes<'a>(&self) -> &'a [u8] {
        if self.len == 0 || self.ptr.is_null() {
            &[]
        } else {
            std::slice::from_raw_parts(self.ptr, self.len)
        }
    }
}

/// One row instance laid out according to a [`TupleLayout`].
///
/// `'a` is the lifetime of every input buffer aliased by the tuple's string
/// slots. Safe writers only accept field data borrowed for `'a`.
pub struct Tuple<'a> {
    layout: Arc<TupleLayout>,
    // u64 words keep the buffer 8-byte aligned for every slot type.
    data: Vec<u64>,
    _borrows: PhantomData<&'a [u8]>,
}

impl<'a> Tuple<'a> {
    /// A zeroed tuple: every slot holds zero and no slot is null.
    pub fn new(layout: &Arc<TupleLayout>) -> Self {
        Self {
            layout: Arc::clone(layout),
            data: vec![0u64; layout.byte_size() / 8],
            _borrows: PhantomData,
        }
    }

    pub fn layout(&self) -> &Arc<TupleLayout> {
        &self.layout
    }

    pub fn as_ptr(&self) -> *const u8 {
        self.data.as_ptr() as *const u8
    }

    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.data.as_mut_ptr() as *mut u8
    }

    /// Zero every slot and clear every null indicator.
    pub fn reset(&mut self) {
        self.data.fill(0);
    }

    pub fn is_null(&self, slot: usize) -> bool {
        let desc = self.desc(slot);
        self.bytes()[desc.null_byte] & desc.null_mask != 0
    }

    pub fn set_null(&mut self, slot: usize) {
        let desc = *self.desc(slot);
        self.bytes_mut()[desc.null_byte] |= desc.null_mask;
    }

    pub fn clear_null(&mut self, slot: usize) {
        let desc = *self.desc(slot);
        self.bytes_mut()[desc.null_byte] &= !desc.null_mask;
    }

    pub fn get_bool(&self, slot: usize) -> Option<bool> {
        self.get::<u8>(slot, SlotType::Boolean).map(|b| b != 0)
    }

    pub fn get_i8(&self, slot: usize) -> Option<i8> {
        self.get(slot, SlotType::TinyInt)
    }

    pub fn get_i16(&self, slot: usize) -> Option<i16> {
        self.get(slot, SlotType::SmallInt)
    }

    pub fn get_i32(&self, slot: usize) -> Option<i32> {
        self.get(slot, SlotType::Int)
    }

    pub fn get_i64(&self, slot: usize) -> Option<i64> {
        self.get(slot, SlotType::BigInt)
    }

    pub fn get_f32(&self, slot: usize) -> Option<f32> {
        self.get(slot, SlotType::Float)
    }

    pub fn get_f64(&self, slot: usize) -> Option<f64> {
        self.get(slot, SlotType::Double)
    }

    /// Raw view stored in a string slot, without null checking.
    pub fn string_value(&self, slot: usize) -> StringValue {
        let desc = self.desc(slot);
        assert!(desc.ty.is_var_len_string(), "slot {slot} is {}", desc.ty);
        // SAFETY: offset + size lies within the buffer by layout construction.
        unsafe { ptr::read_unaligned(self.as_ptr().add(desc.offset) as *const StringValue) }
    }

    /// Bytes of a STRING or VARCHAR slot.
    pub fn get_string(&self, slot: usize) -> Option<&'a [u8]> {
        if self.is_null(slot) {
            return None;
        }
        // SAFETY: string slots are only written with data borrowed for 'a,
        // or left zeroed.
        Some(unsafe { self.string_value(slot).as_bytes() })
    }

    /// Inline bytes of a CHAR slot.
    pub fn get_char(&self, slot: usize) -> Option<&[u8]> {
        let desc = *self.desc(slot);
        let SlotType::Char(n) = desc.ty else {
            panic!("slot {slot} is {}, not CHAR", desc.ty);
        };
        if self.is_null(slot) {
            return None;
        }
        Some(&self.bytes()[desc.offset..desc.offset + n as usize])
    }

    pub(crate) fn desc(&self, slot: usize) -> &SlotDescriptor {
        match self.layout.slot(slot) {
            Some(desc) => desc,
            None => panic!("slot {slot} out of range for {}-slot tuple", self.layout.num_slots()),
        }
    }

    pub(crate) fn bytes(&self) -> &[u8] {
        // SAFETY: u64 storage reinterpreted as bytes.
        unsafe { std::slice::from_raw_parts(self.as_ptr(), self.layout.byte_size()) }
    }

    pub(crate) fn bytes_mut(&mut self) -> &mut [u8] {
        let len = self.layout.byte_size();
        // SAFETY: u64 storage reinterpreted as bytes.
        unsafe { std::slice::from_raw_parts_mut(self.as_mut_ptr(), len) }
    }

    pub(crate) fn write_value<T: Copy>(&mut self, desc: &SlotDescriptor, value: T) {
        debug_assert_eq!(mem::size_of::<T>(), desc.ty.byte_size());
        let dst = &mut self.bytes_mut()[desc.offset..desc.offset + mem::size_of::<T>()];
        // SAFETY: dst spans exactly size_of::<T>() bytes.
        unsafe { ptr::write_unaligned(dst.as_mut_ptr() as *mut T, value) }
    }

    pub(crate) fn write_string(&mut self, desc: &SlotDescriptor, bytes: &'a [u8]) {
        self.write_value(desc, StringValue::new(bytes));
    }

    /// Copy `bytes` into an inline CHAR slot, padding with spaces.
    pub(crate) fn write_char(&mut self, desc: &SlotDescriptor, bytes: &[u8]) {
        let SlotType::Char(n) = desc.ty else {
            panic!("slot {} is {}, not CHAR", desc.id, desc.ty);
        };
        let dst = &mut self.bytes_mut()[desc.offset..desc.offset + n as usize];
        let copied = bytes.len().min(dst.len());
        dst[..copied].copy_from_slice(&bytes[..copied]);
        dst[copied..].fill(b' ');
    }

    fn get<T: Copy>(&self, slot: usize, expected: SlotType) -> Option<T> {
        let desc = self.desc(slot);
        assert_eq!(desc.ty, expected, "slot {slot} type mismatch");
        if self.is_null(slot) {
            return None;
        }
        // SAFETY: offset + size_of::<T>() lies within the buffer.
        Some(unsafe { ptr::read_unaligned(self.as_ptr().add(desc.offset) as *const T) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_types() -> Vec<SlotType> {
        vec![
            SlotType::Boolean,
            SlotType::Int,
            SlotType::String,
            SlotType::TinyInt,
            SlotType::Double,
            SlotType::Char(3),
            SlotType::SmallInt,
            SlotType::Varchar(5),
            SlotType::BigInt,
            SlotType::Float,
        ]
    }

    #[test]
    fn test_slots_do_not_overlap() {
        let layout = TupleLayout::new(&all_types());
        let mut ranges: Vec<(usize, usize)> = layout
            .slots()
            .iter()
            .map(|s| (s.offset, s.offset + s.ty.byte_size()))
            .collect();
        ranges.sort();
        for pair in ranges.windows(2) {
            assert!(pair[0].1 <= pair[1].0, "overlap: {pair:?}");
        }
        let null_start = layout.slots()[0].null_byte;
        assert!(ranges.last().unwrap().1 <= null_start);
        assert_eq!(layout.byte_size() % 8, 0);
    }

    #[test]
    fn test_slots_are_aligned() {
        let layout = TupleLayout::new(&all_types());
        for s in layout.slots() {
            assert_eq!(s.offset % s.ty.alignment(), 0, "{:?}", s);
        }
    }

    #[test]
    fn test_null_bits_unique() {
        let types = vec![SlotType::Int; 19];
        let layout = TupleLayout::new(&types);
        let mut seen = std::collections::HashSet::new();
        for s in layout.slots() {
            assert_eq!(s.null_mask.count_ones(), 1);
            assert!(seen.insert((s.null_byte, s.null_mask)));
        }
        assert_eq!(seen.len(), 19);
    }

    #[test]
    fn test_missing_slot() {
        let layout = TupleLayout::new(&[SlotType::Int]);
        assert!(layout.slot(0).is_some());
        assert!(layout.slot(1).is_none());
    }

    #[test]
    fn test_tuple_null_roundtrip() {
        let layout = Arc::new(TupleLayout::new(&[SlotType::Int, SlotType::Double]));
        let mut tuple = Tuple::new(&layout);
        assert_eq!(tuple.get_i32(0), Some(0));
        tuple.set_null(1);
        assert!(tuple.is_null(1));
        assert!(!tuple.is_null(0));
        assert_eq!(tuple.get_f64(1), None);
        tuple.clear_null(1);
        assert_eq!(tuple.get_f64(1), Some(0.0));
        tuple.set_null(0);
        tuple.reset();
        assert!(!tuple.is_null(0));
    }

    #[test]
    fn test_char_padding() {
        let layout = Arc::new(TupleLayout::new(&[SlotType::Char(4)]));
        let mut tuple = Tuple::new(&layout);
        let desc = *layout.slot(0).unwrap();
        tuple.write_char(&desc, b"ab");
        assert_eq!(tuple.get_char(0), Some(&b"ab  "[..]));
        tuple.write_char(&desc, b"abcdef");
        assert_eq!(tuple.get_char(0), Some(&b"abcd"[..]));
    }

    #[test]
    fn test_string_alias() {
        let layout = Arc::new(TupleLayout::new(&[SlotType::String]));
        let input = b"hello".to_vec();
        let mut tuple = Tuple::new(&layout);
        let desc = *layout.slot(0).unwrap();
        tuple.write_string(&desc, &input);
        assert_eq!(tuple.string_value(0).ptr, input.as_ptr());
        assert_eq!(tuple.get_string(0), Some(&b"hello"[..]));
    }
}
