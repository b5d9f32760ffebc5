/// Integration tests for the QCF1 file store: variables and chunks written
/// through `FileWriter` come back byte-exact through `FileReader`, and any
/// on-disk damage is reported instead of returned as data.
use qcf_core::frame;
use qcf_core::{ArraySink, ArraySource, DataType, Error, FileReader, FileWriter, VariableMetadata};

/// Generate `len` deterministic bytes using a simple LCG.
fn pseudo_random_bytes(len: usize, seed: u64) -> Vec<u8> {
    let mut rng = seed;
    (0..len)
        .map(|_| {
            rng = rng
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            (rng >> 56) as u8
        })
        .collect()
}

fn metadata(rank: usize, chunk_rows: u64) -> VariableMetadata {
    VariableMetadata {
        quant_mode: 0,
        quant_precision: 0,
        codec_id: 0,
        compression_level: 0,
        shuffle: false,
        chunk_rows,
        fill_value: None,
        dim_names: (0..rank).map(|i| format!("d{i}")).collect(),
    }
}

// ── tests ──────────────────────────────────────────────────────────────────

#[test]
fn test_interleaved_variables_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("two_vars.qcf");

    let a0 = pseudo_random_bytes(400, 1);
    let a1 = pseudo_random_bytes(123, 2);
    let b0 = pseudo_random_bytes(80, 3);

    let mut w = FileWriter::create(&path).unwrap();
    let a = w.create_variable("a", &[8, 10], DataType::F32, metadata(2, 5)).unwrap();
    let b = w.create_variable("b", &[20], DataType::F32, metadata(1, 20)).unwrap();
    // Out of order and interleaved across variables
    w.write_chunk(a, 1, &a1).unwrap();
    w.write_chunk(b, 0, &b0).unwrap();
    w.write_chunk(a, 0, &a0).unwrap();
    assert_eq!(w.finish().unwrap(), 3);

    let mut r = FileReader::open(&path).unwrap();
    assert_eq!(r.header.variable_count, 2);
    assert_eq!(r.variable_names(), vec!["a".to_string(), "b".to_string()]);

    let a = r.variable("a").unwrap();
    let info = r.read_metadata(a).unwrap();
    assert_eq!(info.shape, vec![8, 10]);
    assert_eq!(info.metadata.dim_names, vec!["d0", "d1"]);
    assert_eq!(r.entries(a).unwrap().len(), 2);
    assert_eq!(r.entries(a).unwrap()[0].chunk_index, 0);

    assert_eq!(r.read_chunk(a, 0).unwrap(), a0);
    assert_eq!(r.read_chunk(a, 1).unwrap(), a1);
    let b = r.variable("b").unwrap();
    assert_eq!(r.read_chunk(b, 0).unwrap(), b0);
}

/// Read only the last chunk without touching the ones before it.
#[test]
fn test_random_access_single_chunk() {
    const NUM_CHUNKS: u64 = 16;
    const TARGET: u64 = 12;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("many_chunks.qcf");
    let chunks: Vec<Vec<u8>> = (0..NUM_CHUNKS)
        .map(|i| pseudo_random_bytes(1000 + i as usize, 0xDEAD_BEEF + i))
        .collect();

    let mut w = FileWriter::create(&path).unwrap();
    let v = w
        .create_variable("v", &[NUM_CHUNKS, 4], DataType::F32, metadata(2, 1))
        .unwrap();
    for (i, c) in chunks.iter().enumerate() {
        w.write_chunk(v, i as u64, c).unwrap();
    }
    w.finish().unwrap();

    let mut r = FileReader::open(&path).unwrap();
    let v = r.variable("v").unwrap();
    assert_eq!(r.read_chunk(v, TARGET).unwrap(), chunks[TARGET as usize]);
}

#[test]
fn test_unwritten_chunk_is_missing() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sparse.qcf");

    let mut w = FileWriter::create(&path).unwrap();
    let v = w.create_variable("v", &[4], DataType::F32, metadata(1, 2)).unwrap();
    w.write_chunk(v, 1, b"only the second").unwrap();
    w.finish().unwrap();

    let mut r = FileReader::open(&path).unwrap();
    let v = r.variable("v").unwrap();
    assert!(matches!(r.read_chunk(v, 0), Err(Error::MissingChunk { chunk: 0, .. })));
    assert!(matches!(r.read_chunk(v, 2), Err(Error::ChunkOutOfRange { .. })));
    assert!(matches!(r.variable("w"), Err(Error::UnknownVariable(_))));
}

#[test]
fn test_duplicate_names_and_chunks_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let mut w = FileWriter::create(dir.path().join("dup.qcf")).unwrap();
    let v = w.create_variable("v", &[4], DataType::F32, metadata(1, 4)).unwrap();
    assert!(matches!(
        w.create_variable("v", &[4], DataType::F32, metadata(1, 4)),
        Err(Error::DuplicateVariable(_))
    ));
    w.write_chunk(v, 0, b"x").unwrap();
    assert!(matches!(w.write_chunk(v, 0, b"y"), Err(Error::Format(_))));
}

/// A variable the directory cannot describe is refused up front, and the
/// rest of the file stays readable.
#[test]
fn test_rank_above_limit_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rank.qcf");

    let mut w = FileWriter::create(&path).unwrap();
    let ok = w.create_variable("ok", &[1; 32], DataType::F32, metadata(32, 1)).unwrap();
    for rank in [33, 256] {
        let err = w
            .create_variable("deep", &vec![1; rank], DataType::F32, metadata(rank, 1))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidDescriptor(_)), "rank {rank}: {err}");
    }
    w.write_chunk(ok, 0, b"four").unwrap();
    w.finish().unwrap();

    let mut r = FileReader::open(&path).unwrap();
    assert_eq!(r.variable_names(), vec!["ok".to_string()]);
    let ok = r.variable("ok").unwrap();
    assert_eq!(r.read_chunk(ok, 0).unwrap(), b"four");
}

/// Flip one byte inside a stored chunk: the read must fail, not return garbage.
#[test]
fn test_tampered_chunk_detected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tamper.qcf");
    let payload = frame::store(&pseudo_random_bytes(256, 7)).unwrap();

    let mut w = FileWriter::create(&path).unwrap();
    let v = w.create_variable("v", &[64], DataType::F32, metadata(1, 64)).unwrap();
    w.write_chunk(v, 0, &payload).unwrap();
    w.finish().unwrap();

    let offset = {
        let r = FileReader::open(&path).unwrap();
        let v = r.variable("v").unwrap();
        r.entries(v).unwrap()[0].offset
    };
    let mut bytes = std::fs::read(&path).unwrap();
    bytes[offset as usize + 40] ^= 0xFF;
    std::fs::write(&path, bytes).unwrap();

    let mut r = FileReader::open(&path).unwrap();
    let v = r.variable("v").unwrap();
    let err = r.read_chunk(v, 0).unwrap_err();
    assert!(err.is_corrupt_chunk(), "expected corrupt chunk, got {err}");
}

#[test]
fn test_not_a_qcf_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("junk.bin");
    std::fs::write(&path, pseudo_random_bytes(512, 9)).unwrap();
    let err = FileReader::open(&path).err().unwrap();
    assert!(matches!(err, Error::Format(_)), "got {err}");

    std::fs::write(&path, b"QCF1").unwrap();
    assert!(matches!(FileReader::open(&path), Err(Error::Format(_))));
}

#[test]
fn test_empty_file_has_no_variables() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("empty.qcf");
    assert_eq!(FileWriter::create(&path).unwrap().finish().unwrap(), 0);

    let r = FileReader::open(&path).unwrap();
    assert_eq!(r.header.variable_count, 0);
    assert!(r.variable_names().is_empty());
}
