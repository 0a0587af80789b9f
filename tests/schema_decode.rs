//! Format-string decoding and `ArrowSchema` import.

use std::collections::BTreeMap;
use std::ffi::{CString, c_char, c_void};
use std::ptr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use colbridge::{
    ARROW_FLAG_MAP_KEYS_SORTED, ARROW_FLAG_NULLABLE, ArrowSchema, ArrowType, ColbridgeError,
    Field, IntervalUnit, Schema, TimeUnit, decode_format, encode_format, export_field,
    export_schema, import_field, import_schema,
};

fn decode(format: &str) -> Result<ArrowType, ColbridgeError> {
    decode_format(format, Vec::new(), 0)
}

#[test]
fn decodes_flat_formats() {
    let cases = [
        ("n", ArrowType::Null),
        ("b", ArrowType::Boolean),
        ("c", ArrowType::Int8),
        ("L", ArrowType::UInt64),
        ("e", ArrowType::Float16),
        ("g", ArrowType::Float64),
        ("z", ArrowType::Binary),
        ("u", ArrowType::String),
        ("tdD", ArrowType::Date32),
        ("tdm", ArrowType::Date64),
        ("tts", ArrowType::Time32(TimeUnit::Seconds)),
        ("ttn", ArrowType::Time64(TimeUnit::Nanoseconds)),
        ("tDu", ArrowType::Duration(TimeUnit::Microseconds)),
        ("tin", ArrowType::Interval(IntervalUnit::MonthDaysNs)),
        ("w:3", ArrowType::FixedSizeBinary(3)),
        ("d:16,4", ArrowType::Decimal128(16, 4)),
        (
            "tss:Europe/Paris",
            ArrowType::Timestamp(TimeUnit::Seconds, Some("Europe/Paris".into())),
        ),
        ("tsn:", ArrowType::Timestamp(TimeUnit::Nanoseconds, Some("UTC".into()))),
    ];
    for (format, expected) in cases {
        let dtype = decode(format).unwrap();
        assert_eq!(dtype, expected, "{}", format);
        assert_eq!(decode(&encode_format(&dtype)).unwrap(), dtype, "{}", format);
    }
}

#[test]
fn decodes_nested_formats() {
    let item = Field::new("item", ArrowType::Int8, true, None);
    let list = decode_format("+l", vec![item.clone()], 0).unwrap();
    assert_eq!(list, ArrowType::List(Box::new(item.clone())));
    assert_eq!(encode_format(&list), "+l");

    let fsl = decode_format("+w:4", vec![item.clone()], 0).unwrap();
    assert_eq!(fsl, ArrowType::FixedSizeList(Box::new(item.clone()), 4));

    let entries = Field::new(
        "entries",
        ArrowType::Struct(vec![
            Field::new("key", ArrowType::String, false, None),
            Field::new("value", ArrowType::Int32, true, None),
        ]),
        false,
        None,
    );
    let map = decode_format("+m", vec![entries.clone()], ARROW_FLAG_MAP_KEYS_SORTED).unwrap();
    assert_eq!(map, ArrowType::Map(Box::new(entries), true));

    let err = decode_format("+m", vec![item.clone()], 0).unwrap_err();
    assert!(matches!(err, ColbridgeError::Invalid { .. }));
    let err = decode_format("+l", vec![item.clone(), item], 0).unwrap_err();
    assert!(matches!(err, ColbridgeError::ChildCountMismatch { .. }));
}

#[test]
fn rejects_unsupported_formats() {
    assert_eq!(
        decode("d:38,10,256").unwrap_err(),
        ColbridgeError::not_implemented("only decimal128 is supported")
    );
    assert_eq!(
        decode("xyz").unwrap_err(),
        ColbridgeError::not_implemented("unimplemented type 'xyz'")
    );
    for large in ["U", "Z", "+L"] {
        assert!(matches!(decode(large), Err(ColbridgeError::NotImplemented { .. })));
    }
    assert!(matches!(decode("d:abc,1"), Err(ColbridgeError::Invalid { .. })));
    assert!(matches!(decode("w:-1"), Err(ColbridgeError::Invalid { .. })));
    assert!(matches!(decode("d:50,2"), Err(ColbridgeError::Invalid { .. })));
    assert!(matches!(decode("d:5,9"), Err(ColbridgeError::Invalid { .. })));
}

#[test]
fn schema_round_trip_keeps_metadata() {
    let mut md = BTreeMap::new();
    md.insert("origin".to_string(), "sensor-7".to_string());
    let schema = Schema::new(
        vec![
            Field::new("ts", ArrowType::Timestamp(TimeUnit::Milliseconds, Some("UTC".into())), false, None),
            Field::new("v", ArrowType::Float64, true, Some(md.clone())),
        ],
        md,
    );
    let mut exported = export_schema(&schema).unwrap();
    let imported = unsafe { import_schema(&mut exported) }.unwrap();
    assert!(exported.is_released());
    assert_eq!(imported, schema);
}

struct SchemaProducer {
    _format: CString,
    _name: CString,
    _metadata: Vec<u8>,
    releases: Arc<AtomicUsize>,
}

unsafe extern "C" fn release_schema_producer(schema: *mut ArrowSchema) {
    let schema = unsafe { &mut *schema };
    let producer = unsafe { Box::from_raw(schema.private_data as *mut SchemaProducer) };
    producer.releases.fetch_add(1, Ordering::SeqCst);
    schema.private_data = ptr::null_mut();
    schema.release = None;
}

/// Hand-encoded metadata blob: i32 pair count, then length-prefixed keys and values.
fn metadata_blob(pairs: &[(&str, &str)]) -> Vec<u8> {
    let mut out = (pairs.len() as i32).to_ne_bytes().to_vec();
    for (k, v) in pairs {
        out.extend((k.len() as i32).to_ne_bytes());
        out.extend(k.as_bytes());
        out.extend((v.len() as i32).to_ne_bytes());
        out.extend(v.as_bytes());
    }
    out
}

fn produce_schema(format: &str, name: &str, metadata: Vec<u8>) -> (ArrowSchema, Arc<AtomicUsize>) {
    let releases = Arc::new(AtomicUsize::new(0));
    let producer = Box::new(SchemaProducer {
        _format: CString::new(format).unwrap(),
        _name: CString::new(name).unwrap(),
        _metadata: metadata,
        releases: releases.clone(),
    });
    let schema = ArrowSchema {
        format: producer._format.as_ptr(),
        name: producer._name.as_ptr(),
        metadata: producer._metadata.as_ptr() as *const c_char,
        flags: ARROW_FLAG_NULLABLE,
        n_children: 0,
        children: ptr::null_mut(),
        dictionary: ptr::null_mut(),
        release: Some(release_schema_producer),
        private_data: Box::into_raw(producer) as *mut c_void,
    };
    (schema, releases)
}

#[test]
fn foreign_field_is_released_once() {
    let blob = metadata_blob(&[("unit", "kWh"), ("", "empty-key")]);
    let (mut schema, releases) = produce_schema("tsu:America/New_York", "reading", blob);
    let field = unsafe { import_field(&mut schema) }.unwrap();
    assert_eq!(releases.load(Ordering::SeqCst), 1);
    assert!(schema.is_released());

    assert_eq!(field.name, "reading");
    assert!(field.nullable);
    assert_eq!(
        field.dtype,
        ArrowType::Timestamp(TimeUnit::Microseconds, Some("America/New_York".into()))
    );
    assert_eq!(field.metadata.get("unit").map(String::as_str), Some("kWh"));
    assert_eq!(field.metadata.get("").map(String::as_str), Some("empty-key"));

    // Released structs are refused without touching the callback again.
    assert!(matches!(
        unsafe { import_field(&mut schema) },
        Err(ColbridgeError::Ffi { .. })
    ));
    assert_eq!(releases.load(Ordering::SeqCst), 1);
}

#[test]
fn foreign_field_failure_still_releases() {
    let (mut schema, releases) = produce_schema("+L", "big", metadata_blob(&[]));
    let err = unsafe { import_field(&mut schema) }.unwrap_err();
    assert!(matches!(err, ColbridgeError::NotImplemented { .. }));
    assert_eq!(releases.load(Ordering::SeqCst), 1);
}

#[test]
fn exported_field_flags() {
    let entries = Field::new(
        "entries",
        ArrowType::Struct(vec![
            Field::new("key", ArrowType::Int32, false, None),
            Field::new("value", ArrowType::Boolean, true, None),
        ]),
        false,
        None,
    );
    let field = Field::new("m", ArrowType::Map(Box::new(entries), true), true, None);
    let exported = export_field(&field).unwrap();
    assert_eq!(exported.flags, ARROW_FLAG_NULLABLE | ARROW_FLAG_MAP_KEYS_SORTED);
    assert_eq!(exported.n_children, 1);
    assert!(exported.metadata.is_null());
}
