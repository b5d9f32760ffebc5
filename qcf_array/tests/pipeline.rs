/// End-to-end tests: values go through quantize → pack → compress → store
/// and come back as exactly the quantized values.
use proptest::prelude::*;

use qcf_array::{
    decode, encode, quantize, read_variable, write_variable, ArrayDescriptor, CodecKind,
    CompressionSpec, QuantizationSpec, VariableEncoder, VariableReader,
};
use qcf_core::{ArraySource, Error, FileReader, FileWriter, MemoryStore};

/// `sin(2π·j/cols)·i` over a `rows × cols` grid, row-major.
fn sine_field(rows: usize, cols: usize) -> Vec<f32> {
    let mut out = Vec::with_capacity(rows * cols);
    for i in 0..rows {
        for j in 0..cols {
            out.push(((2.0 * std::f64::consts::PI / cols as f64 * j as f64).sin() * i as f64) as f32);
        }
    }
    out
}

/// A smooth but irregular field with full-entropy low mantissa bits.
fn noisy_field(rows: usize, cols: usize) -> Vec<f32> {
    (0..rows * cols)
        .map(|k| {
            let (i, j) = ((k / cols) as f64, (k % cols) as f64);
            ((0.1 * j).sin() * i + (0.07 * i).cos() * 3.7 + 1.0) as f32
        })
        .collect()
}

/// Round away the low 13 mantissa bits, ties to even, written against the
/// raw bit layout rather than through the library.
fn round_low_13_bits(v: f32) -> f32 {
    if v == 0.0 {
        return v;
    }
    let bits = v.to_bits();
    let dropped = bits & 0x1FFF;
    let kept = bits & !0x1FFF;
    let round_up = dropped > 0x1000 || (dropped == 0x1000 && kept & 0x2000 != 0);
    f32::from_bits(if round_up { kept + 0x2000 } else { kept })
}

fn bits(values: &[f32]) -> Vec<u32> {
    values.iter().map(|v| v.to_bits()).collect()
}

fn field_descriptor() -> ArrayDescriptor {
    ArrayDescriptor::new("field", &[10, 10])
        .unwrap()
        .with_dim_names(&["x", "y"])
        .unwrap()
}

// ── tests ──────────────────────────────────────────────────────────────────

#[test]
fn test_bit_round_10_matches_manual_rounding() {
    let values = sine_field(10, 10);
    let encoded = encode(
        &field_descriptor(),
        QuantizationSpec::BitRound(10),
        CompressionSpec::deflate(1),
        &values,
    )
    .unwrap();
    let decoded = decode(&encoded).unwrap();

    let expected: Vec<f32> = values.iter().map(|&v| round_low_13_bits(v)).collect();
    assert_eq!(bits(&decoded), bits(&expected));
    for v in &decoded {
        assert_eq!(v.to_bits() & 0x1FFF, 0);
    }
}

#[test]
fn test_compression_does_not_change_values() {
    let values = sine_field(10, 10);
    let d = field_descriptor();
    let plain = decode(&encode(&d, QuantizationSpec::None, CompressionSpec::Off, &values).unwrap())
        .unwrap();
    for compression in [
        CompressionSpec::deflate(1),
        CompressionSpec::deflate(9),
        CompressionSpec::On { codec: CodecKind::Zstd, level: 3, shuffle: true },
        CompressionSpec::On { codec: CodecKind::Lz4, level: 1, shuffle: false },
    ] {
        let packed = decode(&encode(&d, QuantizationSpec::None, compression, &values).unwrap())
            .unwrap();
        assert_eq!(bits(&packed), bits(&plain), "{compression}");
    }
    assert_eq!(bits(&plain), bits(&values));
}

#[test]
fn test_quantization_helps_compression() {
    let values = noisy_field(200, 200);
    let d = ArrayDescriptor::new("noisy", &[200, 200]).unwrap();
    let full = encode(&d, QuantizationSpec::None, CompressionSpec::deflate(1), &values).unwrap();
    let rounded =
        encode(&d, QuantizationSpec::BitRound(10), CompressionSpec::deflate(1), &values).unwrap();
    assert!(
        rounded.stored_size() < full.stored_size(),
        "bitround {} >= full {}",
        rounded.stored_size(),
        full.stored_size()
    );
}

#[test]
fn test_chunked_matches_single_chunk() {
    let values = noisy_field(13, 7);
    let d = ArrayDescriptor::new("v", &[13, 7]).unwrap();
    let spec = QuantizationSpec::GranularBitRound(3);
    let single = decode(&encode(&d, spec, CompressionSpec::deflate(4), &values).unwrap()).unwrap();

    let chunked = VariableEncoder::new(d, spec, CompressionSpec::deflate(4))
        .unwrap()
        .with_chunk_rows(4)
        .unwrap()
        .encode(&values)
        .unwrap();
    assert_eq!(chunked.chunks.len(), 4);
    assert_eq!(bits(&decode(&chunked).unwrap()), bits(&single));
}

#[test]
fn test_fill_value_survives_quantization() {
    const FILL: f32 = 9.969_21e36;
    let mut values = noisy_field(5, 5);
    values[3] = FILL;
    values[17] = FILL;
    let d = ArrayDescriptor::new("v", &[5, 5]).unwrap().with_fill_value(Some(FILL));
    let decoded = decode(
        &encode(&d, QuantizationSpec::BitRound(3), CompressionSpec::deflate(1), &values).unwrap(),
    )
    .unwrap();
    assert_eq!(decoded[3].to_bits(), FILL.to_bits());
    assert_eq!(decoded[17].to_bits(), FILL.to_bits());
    assert_ne!(decoded[4].to_bits(), values[4].to_bits());
}

#[test]
fn test_memory_store_round_trip_and_corruption() {
    let values = sine_field(10, 10);
    let encoded = VariableEncoder::new(
        field_descriptor(),
        QuantizationSpec::BitGroom(3),
        CompressionSpec::deflate(1),
    )
    .unwrap()
    .with_chunk_rows(5)
    .unwrap()
    .encode(&values)
    .unwrap();

    let mut store = MemoryStore::new();
    let var = write_variable(&mut store, &encoded).unwrap();

    let loaded = read_variable(&mut store, "field").unwrap();
    assert_eq!(loaded, encoded);

    // Damage the second chunk only
    let frame = store.chunk_bytes_mut(var, 1).unwrap();
    let last = frame.len() - 1;
    frame[last] ^= 0x5A;

    let mut reader = VariableReader::open(&mut store, "field").unwrap();
    assert_eq!(reader.chunk_count(), 2);
    assert_eq!(reader.read_chunk(0).unwrap().len(), 50);
    let err = reader.read_all().unwrap_err();
    assert!(err.is_corrupt_chunk(), "got {err}");
    match err {
        Error::InVariable { variable, chunk, .. } => {
            assert_eq!(variable, "field");
            assert_eq!(chunk, Some(1));
        }
        other => panic!("missing context: {other:?}"),
    }
}

/// The five benchmark configurations side by side in one QCF1 file.
#[test]
fn test_file_round_trip_of_benchmark_configs() {
    let configs = [
        ("reference", QuantizationSpec::None, CompressionSpec::Off),
        ("reference_comp", QuantizationSpec::None, CompressionSpec::deflate(1)),
        ("quant_bg_3_comp", QuantizationSpec::BitGroom(3), CompressionSpec::deflate(1)),
        ("quant_gran_3_comp", QuantizationSpec::GranularBitRound(3), CompressionSpec::deflate(1)),
        ("quant_br_10b_comp", QuantizationSpec::BitRound(10), CompressionSpec::deflate(1)),
    ];
    let values = sine_field(10, 10);
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("configs.qcf");

    let mut writer = FileWriter::create(&path).unwrap();
    for (name, quant, comp) in configs {
        let d = ArrayDescriptor::new(name, &[10, 10])
            .unwrap()
            .with_dim_names(&["x", "y"])
            .unwrap();
        write_variable(&mut writer, &encode(&d, quant, comp, &values).unwrap()).unwrap();
    }
    assert_eq!(writer.finish().unwrap(), 5);

    let mut reader = FileReader::open(&path).unwrap();
    assert_eq!(reader.variable_names().len(), 5);
    for (name, quant, comp) in configs {
        let mut var = VariableReader::open(&mut reader, name).unwrap();
        assert_eq!(var.quantization(), quant);
        assert_eq!(var.compression(), comp);
        assert_eq!(var.descriptor().dim_names(), ["x", "y"]);
        let expected: Vec<f32> = values.iter().map(|&v| quantize(v, &quant).unwrap()).collect();
        assert_eq!(bits(&var.read_all().unwrap()), bits(&expected), "{name}");
    }
}

#[test]
fn test_shape_and_spec_errors() {
    let d = field_descriptor();
    let short = [1.0f32; 99];
    let err = encode(&d, QuantizationSpec::BitRound(10), CompressionSpec::Off, &short).unwrap_err();
    assert!(err.is_shape_mismatch());
    let full = [1.0f32; 100];
    let err = encode(&d, QuantizationSpec::BitGroom(0), CompressionSpec::Off, &full).unwrap_err();
    assert!(err.is_invalid_spec());

    let mut store = MemoryStore::new();
    assert!(matches!(read_variable(&mut store, "nope"), Err(Error::UnknownVariable(_))));
}

fn any_spec() -> impl Strategy<Value = QuantizationSpec> {
    prop_oneof![
        Just(QuantizationSpec::None),
        (1u32..=8).prop_map(QuantizationSpec::BitGroom),
        (1u32..=8).prop_map(QuantizationSpec::GranularBitRound),
        (1u32..=24).prop_map(QuantizationSpec::BitRound),
    ]
}

fn any_compression() -> impl Strategy<Value = CompressionSpec> {
    let on = |codec: CodecKind| {
        move |(level, shuffle): (u32, bool)| CompressionSpec::On { codec, level, shuffle }
    };
    prop_oneof![
        Just(CompressionSpec::Off),
        (0u32..=9, any::<bool>()).prop_map(on(CodecKind::Deflate)),
        (0u32..=19, any::<bool>()).prop_map(on(CodecKind::Zstd)),
        (Just(1u32), any::<bool>()).prop_map(on(CodecKind::Lz4)),
    ]
}

// Property: decode(encode(v)) equals element-wise quantize(v) for any shape
proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]
    #[test]
    fn prop_decode_inverts_encode_up_to_quantization(
        rows in 1u64..12,
        cols in 1u64..9,
        chunk_rows in 1u64..12,
        seed_bits in prop::collection::vec(any::<u32>(), 108),
        spec in any_spec(),
        compression in any_compression(),
    ) {
        let n = (rows * cols) as usize;
        let values: Vec<f32> = seed_bits[..n].iter().map(|&b| f32::from_bits(b)).collect();
        let d = ArrayDescriptor::new("p", &[rows, cols]).unwrap();
        let encoded = VariableEncoder::new(d, spec, compression)
            .unwrap()
            .with_chunk_rows(chunk_rows)
            .unwrap()
            .encode(&values)
            .unwrap();
        let decoded = decode(&encoded).unwrap();
        let expected: Vec<f32> = values.iter().map(|&v| quantize(v, &spec).unwrap()).collect();
        prop_assert_eq!(bits(&decoded), bits(&expected));
    }
}
