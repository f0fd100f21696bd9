//! Record codec round trips across the public API, including the
//! external-field scenario and the legacy-format fixtures around the
//! 127/128-byte length-prefix transition.

use burrowdb::rec::codec::{self, compare_tuple_record, converted_size, encode_into};
use burrowdb::{
    ExternRef, FieldDef, IndexDef, IndexKind, RecOffsets, Tuple, TupleField, EXTERN_REF_SIZE,
};

fn encode<'a>(index: &IndexDef, tuple: &Tuple<'a>, compact: bool) -> (Vec<u8>, usize) {
    let size = converted_size(index, tuple, compact);
    let mut buf = vec![0u8; size];
    let origin = encode_into(index, tuple, compact, &mut buf).unwrap();
    (buf, origin)
}

fn decode(buf: &[u8], origin: usize, index: &IndexDef, compact: bool) -> RecOffsets {
    let mut offsets = RecOffsets::new();
    codec::init_offsets(buf, origin, index, compact, &mut offsets);
    offsets
}

/// S6: `(int=42, varchar="hello", null, external blob)` round trip.
#[test]
fn s6_mixed_tuple_round_trip() {
    let index = IndexDef::new(
        1,
        IndexKind::Clustered,
        vec![
            FieldDef::fixed(4),
            FieldDef::variable(40),
            FieldDef::variable(40).nullable(),
            FieldDef::big(8000).nullable(),
        ],
    )
    .unwrap();

    let reference = ExternRef {
        space_id: 7,
        page_no: 100,
        offset: 38,
        len: 5000,
    };
    let ext_bytes = reference.to_bytes();
    let key = 42u32.to_be_bytes();
    let tuple = Tuple::new([
        TupleField::new(&key),
        TupleField::new(b"hello"),
        TupleField::null(),
        TupleField::external(&ext_bytes),
    ]);

    let (buf, origin) = encode(&index, &tuple, true);
    let offsets = decode(&buf, origin, &index, true);

    assert_eq!(offsets.n_fields(), 4);
    assert_eq!(offsets.field_slice(&buf, origin, 0).unwrap(), &key);
    assert_eq!(offsets.field_slice(&buf, origin, 1).unwrap(), b"hello");
    assert!(offsets.is_null(2), "field 3 reports SQL-null");
    assert!(offsets.is_external(3), "field 4 reports external storage");

    let stored = offsets.field_slice(&buf, origin, 3).unwrap();
    assert_eq!(stored.len(), EXTERN_REF_SIZE);
    assert_eq!(ExternRef::read_from(stored), reference);
}

/// Law 5: decode(encode(tuple)) == tuple, for both formats.
#[test]
fn tuples_round_trip_in_both_formats() {
    let index = IndexDef::new(
        2,
        IndexKind::Clustered,
        vec![
            FieldDef::fixed(8),
            FieldDef::variable(100).nullable(),
            FieldDef::variable(255),
        ],
    )
    .unwrap();
    let redundant_index = index.clone().redundant();

    let id = 0x0102_0304_0506_0708u64.to_be_bytes();
    let cases: Vec<Vec<TupleField<'_>>> = vec![
        vec![
            TupleField::new(&id),
            TupleField::new(b"variable part"),
            TupleField::new(b"tail"),
        ],
        vec![TupleField::new(&id), TupleField::null(), TupleField::new(b"")],
        vec![
            TupleField::new(&id),
            TupleField::new(&[0xffu8; 100]),
            TupleField::new(&[0u8; 200]),
        ],
    ];

    for fields in cases {
        let tuple = Tuple::new(fields.clone());

        let (buf, origin) = encode(&index, &tuple, true);
        let offsets = decode(&buf, origin, &index, true);
        for (i, field) in fields.iter().enumerate() {
            assert_eq!(offsets.field_slice(&buf, origin, i), field.bytes());
        }

        let (buf, origin) = encode(&redundant_index, &tuple, false);
        let offsets = decode(&buf, origin, &redundant_index, false);
        for (i, field) in fields.iter().enumerate() {
            if field.is_null() {
                assert!(offsets.is_null(i));
            } else {
                assert_eq!(offsets.field_slice(&buf, origin, i), field.bytes());
            }
        }
    }
}

/// Law 6: the encoded size equals the converted size, field mix or not.
#[test]
fn converted_size_matches_offsets_total() {
    let index = IndexDef::new(
        3,
        IndexKind::Clustered,
        vec![
            FieldDef::fixed(4),
            FieldDef::big(2000).nullable(),
            FieldDef::variable(30).nullable(),
        ],
    )
    .unwrap();

    let long = vec![7u8; 500];
    let key = 9u32.to_be_bytes();
    let cases: Vec<Vec<TupleField<'_>>> = vec![
        vec![
            TupleField::new(&key),
            TupleField::new(&long),
            TupleField::new(b"abc"),
        ],
        vec![TupleField::new(&key), TupleField::null(), TupleField::null()],
        vec![
            TupleField::new(&key),
            TupleField::new(b"short"),
            TupleField::new(b""),
        ],
    ];

    for compact in [true, false] {
        let index = if compact {
            index.clone()
        } else {
            index.clone().redundant()
        };
        for fields in &cases {
            let tuple = Tuple::new(fields.clone());
            let (buf, origin) = encode(&index, &tuple, compact);
            let offsets = decode(&buf, origin, &index, compact);
            assert_eq!(offsets.total_size(), buf.len());
            assert_eq!(offsets.extra_size(), origin);
        }
    }
}

/// Legacy-format fixtures around the 1-byte/2-byte end-offset transition.
#[test]
fn redundant_offset_width_transition() {
    let index = IndexDef::new(4, IndexKind::Clustered, vec![FieldDef::big(4000)])
        .unwrap()
        .redundant();

    // 127 data bytes: 1-byte offsets, extra = 6 + 1.
    let at_limit = vec![3u8; 127];
    let tuple = Tuple::new([TupleField::new(&at_limit)]);
    let (buf, origin) = encode(&index, &tuple, false);
    assert_eq!(origin, 7);
    let offsets = decode(&buf, origin, &index, false);
    assert_eq!(offsets.field_slice(&buf, origin, 0).unwrap(), &at_limit[..]);

    // 128 data bytes: 2-byte offsets, extra = 6 + 2.
    let past_limit = vec![3u8; 128];
    let tuple = Tuple::new([TupleField::new(&past_limit)]);
    let (buf, origin) = encode(&index, &tuple, false);
    assert_eq!(origin, 8);
    let offsets = decode(&buf, origin, &index, false);
    assert_eq!(offsets.field_slice(&buf, origin, 0).unwrap(), &past_limit[..]);
}

#[test]
fn compact_prefix_width_depends_on_column_and_length() {
    // A small-max column always uses one prefix byte, even at length 200.
    let small = IndexDef::new(5, IndexKind::Clustered, vec![FieldDef::variable(255)]).unwrap();
    let long_value = vec![1u8; 200];
    let tuple = Tuple::new([TupleField::new(&long_value)]);
    let (buf, origin) = encode(&small, &tuple, true);
    assert_eq!(origin, 6);
    let offsets = decode(&buf, origin, &small, true);
    assert_eq!(offsets.field_slice(&buf, origin, 0).unwrap(), &long_value[..]);

    // A big column switches to two bytes at 128.
    let big = IndexDef::new(6, IndexKind::Clustered, vec![FieldDef::big(4000)]).unwrap();
    let tuple = Tuple::new([TupleField::new(&long_value)]);
    let (buf, origin) = encode(&big, &tuple, true);
    assert_eq!(origin, 7);
    let offsets = decode(&buf, origin, &big, true);
    assert_eq!(offsets.field_slice(&buf, origin, 0).unwrap(), &long_value[..]);
}

#[test]
fn null_bitmap_spans_multiple_bytes() {
    let fields: Vec<FieldDef> = (0..10).map(|_| FieldDef::variable(20).nullable()).collect();
    let index = IndexDef::new(7, IndexKind::Clustered, fields).unwrap();

    // Alternate null / "x" across ten nullable fields.
    let values: Vec<TupleField<'_>> = (0..10)
        .map(|i| {
            if i % 2 == 0 {
                TupleField::null()
            } else {
                TupleField::new(b"x")
            }
        })
        .collect();
    let tuple = Tuple::new(values);

    let (buf, origin) = encode(&index, &tuple, true);
    let offsets = decode(&buf, origin, &index, true);
    for i in 0..10 {
        assert_eq!(offsets.is_null(i), i % 2 == 0, "field {i}");
    }
    // 5 header + 2 bitmap bytes + 5 one-byte prefixes.
    assert_eq!(origin, 12);
}

#[test]
fn tuple_comparison_is_consistent_with_encoding() {
    let index = IndexDef::new(
        8,
        IndexKind::Clustered,
        vec![FieldDef::fixed(4), FieldDef::variable(40)],
    )
    .unwrap();

    let low_key = 5u32.to_be_bytes();
    let high_key = 9u32.to_be_bytes();
    let rec_tuple = Tuple::new([TupleField::new(&low_key), TupleField::new(b"m")]);
    let (buf, origin) = encode(&index, &rec_tuple, true);
    let offsets = decode(&buf, origin, &index, true);

    let probe_eq = Tuple::new([TupleField::new(&low_key), TupleField::new(b"m")]);
    let probe_gt = Tuple::new([TupleField::new(&high_key), TupleField::new(b"a")]);
    let probe_lt = Tuple::new([TupleField::new(&low_key), TupleField::new(b"a")]);

    use std::cmp::Ordering;
    assert_eq!(
        compare_tuple_record(&probe_eq, &buf, origin, &offsets),
        Ordering::Equal
    );
    assert_eq!(
        compare_tuple_record(&probe_gt, &buf, origin, &offsets),
        Ordering::Greater
    );
    assert_eq!(
        compare_tuple_record(&probe_lt, &buf, origin, &offsets),
        Ordering::Less
    );
}
