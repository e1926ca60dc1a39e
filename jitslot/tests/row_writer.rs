//! Row-level conversion mixing generated and interpreted slots.

use std::sync::Arc;

use jitslot::{
    CodegenContext, ConverterConfig, ConverterError, MemPool, RowWriter, SlotType, Tuple,
    TupleLayout,
};

fn mixed_layout() -> Arc<TupleLayout> {
    Arc::new(TupleLayout::new(&[
        SlotType::Int,
        SlotType::Char(4),
        SlotType::String,
        SlotType::Double,
    ]))
}

#[test]
fn test_char_falls_back_to_interpreted() {
    let layout = mixed_layout();
    let mut ctx = CodegenContext::new().unwrap();
    let writer = RowWriter::new(Some(&mut ctx), &layout, &ConverterConfig::default(), true).unwrap();

    assert_eq!(writer.num_native(), 3);
    assert!(writer.is_native(0));
    assert!(!writer.is_native(1));
    assert_eq!(writer.codegen_summary(), "Codegen enabled: 3 out of 4");

    let pool = MemPool::new();
    let mut tuple = Tuple::new(&layout);
    let row: [&[u8]; 4] = [b"12", b"ab", b"hello", b"0.25"];
    assert!(writer.write_row(&mut tuple, &row, &pool));
    assert_eq!(tuple.get_i32(0), Some(12));
    assert_eq!(tuple.get_char(1), Some(&b"ab  "[..]));
    assert_eq!(tuple.get_string(2), Some(&b"hello"[..]));
    assert_eq!(tuple.get_f64(3), Some(0.25));
}

#[test]
fn test_no_fallback_reports_error() {
    let layout = mixed_layout();
    let mut ctx = CodegenContext::new().unwrap();
    let err = RowWriter::new(Some(&mut ctx), &layout, &ConverterConfig::default(), false)
        .err()
        .unwrap();
    assert!(matches!(err, ConverterError::UnsupportedType(SlotType::Char(4))));
}

#[test]
fn test_native_and_interpreted_agree() {
    let layout = Arc::new(TupleLayout::new(&[
        SlotType::Boolean,
        SlotType::SmallInt,
        SlotType::BigInt,
        SlotType::Float,
        SlotType::Varchar(3),
        SlotType::String,
    ]));
    let config = ConverterConfig::default();
    let mut ctx = CodegenContext::new().unwrap();
    let native = RowWriter::new(Some(&mut ctx), &layout, &config, false).unwrap();
    let interpreted = RowWriter::new(None, &layout, &config, false).unwrap();
    assert_eq!(native.num_native(), 6);

    let rows: [[&[u8]; 6]; 3] = [
        [b"true", b"12", b"-9", b"1.5", b"abcdef", b"x"],
        [b"\\N", b"", b"99999999999999999999", b"bad", b"", b"\\N"],
        [b"FALSE", b"40000", b"0", b"1e50", b"a\\|b", b"c\\\\d"],
    ];

    let pool = MemPool::new();
    for row in &rows {
        let mut a = Tuple::new(&layout);
        let mut b = Tuple::new(&layout);
        let ok_a = native.write_row(&mut a, row, &pool);
        let ok_b = interpreted.write_row(&mut b, row, &pool);
        assert_eq!(ok_a, ok_b);
        for slot in 0..6 {
            assert_eq!(a.is_null(slot), b.is_null(slot), "slot {slot}");
        }
        assert_eq!(a.get_bool(0), b.get_bool(0));
        assert_eq!(a.get_i16(1), b.get_i16(1));
        assert_eq!(a.get_i64(2), b.get_i64(2));
        assert_eq!(a.get_f32(3), b.get_f32(3));
        assert_eq!(a.get_string(4), b.get_string(4));
        assert_eq!(a.get_string(5), b.get_string(5));
    }
}

#[test]
fn test_escaped_field_is_unescaped() {
    let layout = Arc::new(TupleLayout::new(&[SlotType::String, SlotType::Int]));
    let mut ctx = CodegenContext::new().unwrap();
    let writer = RowWriter::new(Some(&mut ctx), &layout, &ConverterConfig::default(), false).unwrap();

    let pool = MemPool::new();
    let mut tuple = Tuple::new(&layout);
    assert!(writer.write_row(&mut tuple, &[&b"a\\|b"[..], &b"7"[..]], &pool));
    assert_eq!(tuple.get_string(0), Some(&b"a|b"[..]));
    assert_eq!(tuple.get_i32(1), Some(7));

    // Escapes are resolved for text only; numeric text parses as written.
    let mut tuple = Tuple::new(&layout);
    assert!(!writer.write_row(&mut tuple, &[&b"x"[..], &b"\\7"[..]], &pool));
    assert!(tuple.is_null(1));

    // An escaped sentinel is text, the bare sentinel is null.
    let mut tuple = Tuple::new(&layout);
    assert!(writer.write_row(&mut tuple, &[&b"\\\\N"[..], &b"\\N"[..]], &pool));
    assert_eq!(tuple.get_string(0), Some(&b"\\N"[..]));
    assert!(tuple.is_null(1));
}
