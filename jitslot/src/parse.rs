//! Text parse capabilities.
//!
//! Pure functions from raw field bytes to a typed value plus a tri-state
//! outcome, and the C-ABI trampolines that generated slot writers call.
//!
//! Integer overflow clamps to the type's range and reports
//! [`Parsed::Overflow`]. Float overflow (a finite literal that rounds to
//! infinity) reports `Overflow` with the infinite value.

use crate::types::{ParseResult, Parsed};

/// Signed integer slot types.
pub trait SignedInt: Copy {
    const MIN: i64;
    const MAX: i64;
    fn from_i64(v: i64) -> Self;
}

macro_rules! impl_signed_int {
    ($($t:ty),*) => {$(
        impl SignedInt for $t {
            const MIN: i64 = <$t>::MIN as i64;
            const MAX: i64 = <$t>::MAX as i64;
            #[inline]
            fn from_i64(v: i64) -> Self {
                v as $t
            }
        }
    )*};
}

impl_signed_int!(i8, i16, i32, i64);

#[inline]
fn trim(s: &[u8]) -> &[u8] {
    s.trim_ascii()
}

/// `true` / `false`, case-insensitive, surrounding whitespace ignored.
pub fn string_to_bool(s: &[u8]) -> Parsed<bool> {
    let s = trim(s);
    if s.eq_ignore_ascii_case(b"true") {
        Parsed::Success(true)
    } else if s.eq_ignore_ascii_case(b"false") {
        Parsed::Success(false)
    } else {
        Parsed::Failure
    }
}

/// Optional sign followed by decimal digits.
pub fn string_to_int<T: SignedInt>(s: &[u8]) -> Parsed<T> {
    let s = trim(s);
    let (negative, digits) = match s.first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };
    if digits.is_empty() {
        return Parsed::Failure;
    }

    // Magnitude limit: |MIN| for negatives, MAX otherwise.
    let limit = if negative {
        T::MIN.unsigned_abs()
    } else {
        T::MAX as u64
    };
    let mut magnitude: u64 = 0;
    let mut overflow = false;
    for &b in digits {
        if !b.is_ascii_digit() {
            return Parsed::Failure;
        }
        if overflow {
            continue;
        }
        let next = magnitude
            .checked_mul(10)
            .and_then(|m| m.checked_add(u64::from(b - b'0')));
        match next {
            Some(m) if m <= limit => magnitude = m,
            _ => overflow = true,
        }
    }

    if overflow {
        let clamped = if negative { T::MIN } else { T::MAX };
        return Parsed::Overflow(T::from_i64(clamped));
    }
    let value = if negative {
        // magnitude <= |MIN|, so the wrapping negate lands on MIN at the edge.
        (magnitude as i64).wrapping_neg()
    } else {
        magnitude as i64
    };
    Parsed::Success(T::from_i64(value))
}

fn is_infinity_literal(s: &[u8]) -> bool {
    let unsigned = match s.first() {
        Some(b'+') | Some(b'-') => &s[1..],
        _ => s,
    };
    unsigned.eq_ignore_ascii_case(b"inf") || unsigned.eq_ignore_ascii_case(b"infinity")
}

macro_rules! string_to_float {
    ($name:ident, $t:ty) => {
        /// Decimal/exponent syntax, `inf`, `infinity` and `nan`.
        pub fn $name(s: &[u8]) -> Parsed<$t> {
            let s = trim(s);
            let Ok(text) = std::str::from_utf8(s) else {
                return Parsed::Failure;
            };
            match text.parse::<$t>() {
                Ok(v) if v.is_infinite() && !is_infinity_literal(s) => Parsed::Overflow(v),
                Ok(v) => Parsed::Success(v),
                Err(_) => Parsed::Failure,
            }
        }
    };
}

string_to_float!(string_to_float, f32);
string_to_float!(string_to_double, f64);

/// True if `s` is exactly the default null sentinel `\N`.
#[inline]
pub fn is_default_null_string(s: &[u8]) -> bool {
    s == b"\\N"
}

// ---------------------------------------------------------------------------
// C-ABI trampolines called from generated code
// ---------------------------------------------------------------------------

/// # Safety
///
/// `data` must point to `len` readable bytes unless `len == 0`.
#[inline]
unsafe fn raw_bytes<'a>(data: *const u8, len: usize) -> &'a [u8] {
    if len == 0 || data.is_null() {
        &[]
    } else {
        std::slice::from_raw_parts(data, len)
    }
}

#[inline]
unsafe fn store<T>(parsed: Parsed<T>, out: *mut T) -> u32 {
    let status = parsed.status();
    if let Some(v) = parsed.value() {
        out.write_unaligned(v);
    }
    status as u32
}

/// `fn(data, len, out) -> status`; writes the value on success and overflow.
pub(crate) unsafe extern "C" fn parse_bool_trampoline(
    data: *const u8,
    len: usize,
    out: *mut u8,
) -> u32 {
    store(string_to_bool(raw_bytes(data, len)).map_value(u8::from), out)
}

macro_rules! int_trampoline {
    ($name:ident, $t:ty) => {
        pub(crate) unsafe extern "C" fn $name(data: *const u8, len: usize, out: *mut $t) -> u32 {
            store(string_to_int::<$t>(raw_bytes(data, len)), out)
        }
    };
}

int_trampoline!(parse_i8_trampoline, i8);
int_trampoline!(parse_i16_trampoline, i16);
int_trampoline!(parse_i32_trampoline, i32);
int_trampoline!(parse_i64_trampoline, i64);

pub(crate) unsafe extern "C" fn parse_f32_trampoline(
    data: *const u8,
    len: usize,
    out: *mut f32,
) -> u32 {
    store(string_to_float(raw_bytes(data, len)), out)
}

pub(crate) unsafe extern "C" fn parse_f64_trampoline(
    data: *const u8,
    len: usize,
    out: *mut f64,
) -> u32 {
    store(string_to_double(raw_bytes(data, len)), out)
}

/// `fn(data, len) -> u8`, comparing against `\N`.
pub(crate) unsafe extern "C" fn is_null_string_trampoline(data: *const u8, len: usize) -> u8 {
    is_default_null_string(raw_bytes(data, len)) as u8
}

/// `fn(data, len, sentinel, sentinel_len) -> u8`.
pub(crate) unsafe extern "C" fn generic_is_null_string_trampoline(
    data: *const u8,
    len: usize,
    sentinel: *const u8,
    sentinel_len: usize,
) -> u8 {
    (raw_bytes(data, len) == raw_bytes(sentinel, sentinel_len)) as u8
}

// Keep the status numbering the generated code relies on.
const _: () = assert!(ParseResult::Failure as u32 == 1 && ParseResult::Overflow as u32 == 2);
