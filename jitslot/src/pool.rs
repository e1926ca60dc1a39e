//! Batch-scoped memory pool for string bytes that must outlive a field.
//!
//! Tuples whose string slots point at copied or unescaped text borrow the
//! pool for their lifetime, so the pool can only be reset once every such
//! tuple is gone.

use std::alloc::{self, Layout};
use std::cell::{Cell, RefCell};
use std::ptr::NonNull;

use crate::escape;

/// Default chunk size (64 KB).
const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// One raw allocation. Handed-out slices are derived from `data` only, never
/// from a reference to the whole chunk.
struct Chunk {
    data: NonNull<u8>,
    size: usize,
}

impl Chunk {
    fn new(size: usize) -> Self {
        let layout = Self::layout(size);
        // SAFETY: `size` is non-zero.
        let ptr = unsafe { alloc::alloc_zeroed(layout) };
        let Some(data) = NonNull::new(ptr) else {
            alloc::handle_alloc_error(layout);
        };
        Self { data, size }
    }

    fn layout(size: usize) -> Layout {
        match Layout::array::<u8>(size) {
            Ok(layout) => layout,
            Err(_) => panic!("pool chunk of {size} bytes exceeds isize::MAX"),
        }
    }
}

// Safety: a chunk exclusively owns its allocation.
unsafe impl Send for Chunk {}

impl Drop for Chunk {
    fn drop(&mut self) {
        // SAFETY: allocated in `Chunk::new` with the same layout.
        unsafe { alloc::dealloc(self.data.as_ptr(), Self::layout(self.size)) }
    }
}

/// Append-only byte arena. Allocation takes `&self`; memory is released all
/// at once on [`MemPool::reset`] or drop.
pub struct MemPool {
    chunks: RefCell<Vec<Chunk>>,
    /// Bytes used in the last chunk.
    offset: Cell<usize>,
    chunk_size: usize,
    allocated: Cell<usize>,
}

impl MemPool {
    pub fn new() -> Self {
        Self::with_chunk_size(DEFAULT_CHUNK_SIZE)
    }

    pub fn with_chunk_size(chunk_size: usize) -> Self {
        Self {
            chunks: RefCell::new(Vec::new()),
            offset: Cell::new(0),
            chunk_size: chunk_size.max(1),
            allocated: Cell::new(0),
        }
    }

    /// Zeroed scratch space of `len` bytes, valid until reset.
    #[allow(clippy::mut_from_ref)]
    pub fn alloc(&self, len: usize) -> &mut [u8] {
        if len == 0 {
            return &mut [];
        }
        let mut chunks = self.chunks.borrow_mut();
        let base = match chunks.last() {
            Some(c) if c.size - self.offset.get() >= len => c.data,
            _ => {
                let chunk = Chunk::new(len.max(self.chunk_size));
                let base = chunk.data;
                chunks.push(chunk);
                self.offset.set(0);
                base
            }
        };
        let start = self.offset.get();
        self.offset.set(start + len);
        self.allocated.set(self.allocated.get() + len);

        // SAFETY: chunk memory stays allocated until reset (which takes
        // `&mut self`) or drop, `start + len` is within the chunk, and each
        // range is handed out once.
        unsafe { std::slice::from_raw_parts_mut(base.as_ptr().add(start), len) }
    }

    /// Copy `src` into the pool.
    pub fn copy(&self, src: &[u8]) -> &[u8] {
        let dst = self.alloc(src.len());
        dst.copy_from_slice(src);
        dst
    }

    /// Unescape `src` into the pool; see [`escape::unescape`] for `max_len`.
    pub fn unescape(&self, src: &[u8], escape_char: u8, max_len: i64) -> &[u8] {
        let cap = if max_len > 0 {
            src.len().min(usize::try_from(max_len).unwrap_or(usize::MAX))
        } else {
            src.len()
        };
        let dst = self.alloc(cap);
        let n = escape::unescape(src, escape_char, dst, max_len);
        &dst[..n]
    }

    /// Total bytes handed out since the last reset.
    pub fn allocated_bytes(&self) -> usize {
        self.allocated.get()
    }

    /// Release all chunks.
    pub fn reset(&mut self) {
        self.chunks.get_mut().clear();
        self.offset.set(0);
        self.allocated.set(0);
    }
}

impl Default for MemPool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocations_are_disjoint_and_stable() {
        let pool = MemPool::with_chunk_size(8);
        let a = pool.copy(b"abcdef");
        let b = pool.copy(b"ghijkl");
        let c = pool.copy(b"m");
        assert_eq!(a, b"abcdef");
        assert_eq!(b, b"ghijkl");
        assert_eq!(c, b"m");
        assert_eq!(pool.allocated_bytes(), 13);
    }

    #[test]
    fn test_earlier_slices_survive_later_allocations() {
        let pool = MemPool::with_chunk_size(64);
        let a = pool.copy(b"abc");
        let b = pool.copy(b"def");
        // Same chunk.
        assert_eq!(a, b"abc");
        let c = pool.copy(&[9u8; 100]);
        let d = pool.copy(b"ghi");
        // After a new chunk was opened.
        assert_eq!(a, b"abc");
        assert_eq!(b, b"def");
        assert!(c.iter().all(|&x| x == 9));
        assert_eq!(d, b"ghi");
    }

    #[test]
    fn test_oversized_allocation() {
        let pool = MemPool::with_chunk_size(4);
        let big = pool.copy(&[7u8; 100]);
        assert_eq!(big.len(), 100);
        assert!(big.iter().all(|&b| b == 7));
    }

    #[test]
    fn test_unescape_into_pool() {
        let pool = MemPool::new();
        assert_eq!(pool.unescape(b"a\\,b", b'\\', 0), b"a,b");
        assert_eq!(pool.unescape(b"abcdef", b'\\', 3), b"abc");
    }

    #[test]
    fn test_reset() {
        let mut pool = MemPool::new();
        pool.copy(b"abc");
        pool.reset();
        assert_eq!(pool.allocated_bytes(), 0);
        assert!(pool.alloc(0).is_empty());
    }
}
