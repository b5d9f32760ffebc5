mod bench;
mod experiments;

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use qcf_array::{
    write_variable, ArrayDescriptor, CodecKind, CompressionSpec, QuantizationSpec,
    VariableEncoder, VariableReader,
};
use qcf_codecs::compressor_by_id;
use qcf_core::{ArraySource, FileReader, FileWriter, VariableInfo};

use crate::bench::{run_plan, BenchResult};
use crate::experiments::{sine_field, ExperimentPlan};

// ── CLI definition ─────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "qcf",
    about = "Quantized Chunk Format: write, inspect and benchmark quantized f32 arrays",
    version
)]
struct Cli {
    /// More log output (-v info, -vv debug). RUST_LOG overrides.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the sine test field under each experiment configuration and
    /// time the write and close of every file
    Bench {
        /// Directory for the generated files
        #[arg(short, long, default_value = ".")]
        out_dir: PathBuf,
        /// JSON experiment plan (defaults to the five built-in configurations)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Write one variable with the given quantization and compression
    Write {
        /// Destination QCF1 file
        output: PathBuf,
        /// Raw little-endian f32 input; the sine test field when absent
        #[arg(short, long)]
        input: Option<PathBuf>,
        /// Comma-separated shape, outermost first
        #[arg(long, value_delimiter = ',', default_value = "10,10")]
        shape: Vec<u64>,
        /// Variable name
        #[arg(long, default_value = "field")]
        name: String,
        /// Quantization: none | bitgroom | granularbr | bitround
        #[arg(short, long, default_value = "none")]
        quantize: String,
        /// Significant digits (bitgroom, granularbr) or bits (bitround)
        #[arg(short, long, default_value_t = 0, allow_hyphen_values = true)]
        precision: i64,
        /// Codec: none | deflate | zstd | lz4
        #[arg(long, default_value = "deflate")]
        codec: String,
        /// Compression level (0 stores chunks verbatim)
        #[arg(short, long, default_value_t = 1)]
        level: u32,
        /// Byte-shuffle each chunk before compressing
        #[arg(long)]
        shuffle: bool,
        /// Outer rows per chunk (default: one chunk)
        #[arg(long)]
        chunk_rows: Option<u64>,
    },
    /// Print header, variables and chunk tables
    Inspect {
        /// QCF1 file to inspect
        file: PathBuf,
        /// Print per-chunk details
        #[arg(long)]
        chunks: bool,
        /// Emit a JSON summary instead of text
        #[arg(long)]
        json: bool,
    },
    /// Decode a variable and print its values
    Dump {
        /// QCF1 file
        file: PathBuf,
        /// Variable to print (default: every variable)
        #[arg(long)]
        variable: Option<String>,
        /// Only decode this chunk
        #[arg(long)]
        chunk: Option<u64>,
    },
}

// ── Helpers ────────────────────────────────────────────────────────────────

fn init_tracing(verbose: u8) -> anyhow::Result<()> {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

fn human_bytes(n: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut v = n as f64;
    let mut unit = 0;
    while v >= 1024.0 && unit < UNITS.len() - 1 {
        v /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", n)
    } else {
        format!("{:.2} {}", v, UNITS[unit])
    }
}

fn compression_from_flags(
    codec: &str,
    level: u32,
    shuffle: bool,
) -> anyhow::Result<CompressionSpec> {
    if matches!(codec, "none" | "off") {
        if shuffle {
            anyhow::bail!("--shuffle needs a codec");
        }
        return Ok(CompressionSpec::Off);
    }
    Ok(CompressionSpec::On {
        codec: CodecKind::parse(codec)?,
        level,
        shuffle,
    })
}

fn read_raw_f32(path: &Path) -> anyhow::Result<Vec<f32>> {
    let bytes = std::fs::read(path).with_context(|| format!("reading input file {:?}", path))?;
    if bytes.len() % 4 != 0 {
        anyhow::bail!("{:?} is {} bytes, not a whole number of f32 values", path, bytes.len());
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

// ── Subcommand implementations ─────────────────────────────────────────────

fn run_bench(out_dir: PathBuf, config: Option<PathBuf>) -> anyhow::Result<()> {
    let plan = match config {
        Some(path) => ExperimentPlan::load(&path)?,
        None => ExperimentPlan::default(),
    };
    eprintln!(
        "benchmarking {} configurations on a {}x{} field...",
        plan.experiments.len(),
        plan.rows,
        plan.cols
    );

    let t0 = Instant::now();
    let results = run_plan(&out_dir, &plan)?;
    let elapsed = t0.elapsed();

    for r in &results {
        let file = r.path.file_name().map(|f| f.to_string_lossy()).unwrap_or_default();
        println!("File {} write takes {:.4} s", file, r.write.as_secs_f64());
        println!("File {} close takes {:.4} s", file, r.close.as_secs_f64());
    }
    print_bench_table(&results);
    eprintln!("  elapsed     : {:.3}s", elapsed.as_secs_f64());
    Ok(())
}

fn print_bench_table(results: &[BenchResult]) {
    println!();
    println!("=== Quantization Benchmark ===");
    println!(
        "  {:<20}  {:>10}  {:>10}  {:>10}  {:>10}  {:>7}  {:>10}",
        "file", "write s", "close s", "total s", "size", "ratio", "max rel err"
    );
    println!("  {}", "-".repeat(88));
    for r in results {
        println!(
            "  {:<20}  {:>10.4}  {:>10.4}  {:>10.4}  {:>10}  {:>6.2}x  {:>10.3e}",
            r.name,
            r.write.as_secs_f64(),
            r.close.as_secs_f64(),
            r.total().as_secs_f64(),
            human_bytes(r.file_bytes),
            r.ratio(),
            r.max_rel_error
        );
    }
}

#[allow(clippy::too_many_arguments)]
fn run_write(
    output: PathBuf,
    input: Option<PathBuf>,
    shape: Vec<u64>,
    name: &str,
    quantize: &str,
    precision: i64,
    compression: CompressionSpec,
    chunk_rows: Option<u64>,
) -> anyhow::Result<()> {
    let quantization = QuantizationSpec::parse(quantize, precision)?;
    let mut descriptor = ArrayDescriptor::new(name, &shape)?;
    if shape.len() == 2 && input.is_none() {
        descriptor = descriptor.with_dim_names(&bench::FIELD_DIMS)?;
    }
    let values = match &input {
        Some(path) => read_raw_f32(path)?,
        None => sine_field(shape[0], (descriptor.element_count() / shape[0] as usize) as u64),
    };

    let mut encoder = VariableEncoder::new(descriptor, quantization, compression)?;
    if let Some(rows) = chunk_rows {
        encoder = encoder.with_chunk_rows(rows)?;
    }

    let t0 = Instant::now();
    let encoded = encoder.encode(&values)?;
    let mut writer = FileWriter::create(&output)
        .with_context(|| format!("creating output file {:?}", output))?;
    write_variable(&mut writer, &encoded)?;
    writer.finish()?;
    let elapsed = t0.elapsed();

    let raw = encoder.descriptor().byte_len() as u64;
    let file_size = std::fs::metadata(&output)?.len();
    eprintln!("  variable    : {} {:?}", name, shape);
    eprintln!("  quantize    : {}", quantization);
    eprintln!("  compression : {}", compression);
    eprintln!("  chunks      : {}", encoded.chunks.len());
    eprintln!("  raw size    : {}", human_bytes(raw));
    eprintln!("  file size   : {}", human_bytes(file_size));
    eprintln!("  ratio       : {:.2}x", raw as f64 / file_size as f64);
    eprintln!("  elapsed     : {:.3}s", elapsed.as_secs_f64());
    Ok(())
}

#[derive(Serialize)]
struct ChunkSummary {
    index: u64,
    offset: u64,
    stored_bytes: u32,
    checksum: String,
}

/// The stored definition as-is, plus what it decodes to.
#[derive(Serialize)]
struct VariableSummary {
    #[serde(flatten)]
    info: VariableInfo,
    quantization: QuantizationSpec,
    attribute: Option<&'static str>,
    compression: CompressionSpec,
    codec: &'static str,
    raw_bytes: u64,
    stored_bytes: u64,
    chunks: Vec<ChunkSummary>,
}

#[derive(Serialize)]
struct FileSummary {
    file: String,
    version: u16,
    flags: u16,
    file_bytes: u64,
    chunk_count: u64,
    variables: Vec<VariableSummary>,
}

fn summarize(file: &Path) -> anyhow::Result<FileSummary> {
    let reader =
        FileReader::open(file).with_context(|| format!("opening QCF1 file {:?}", file))?;
    let mut variables = Vec::new();
    for name in reader.variable_names() {
        let var = reader.variable(&name)?;
        let info = reader.read_metadata(var)?;
        let meta = &info.metadata;
        let quantization = QuantizationSpec::from_metadata(meta.quant_mode, meta.quant_precision)?;
        let compression =
            CompressionSpec::from_metadata(meta.codec_id, meta.compression_level, meta.shuffle)?;
        let codec = compressor_by_id(meta.codec_id)?.name();
        let raw_bytes = info.element_count().unwrap_or(0) * info.dtype.size() as u64;
        let chunks = reader
            .entries(var)?
            .iter()
            .map(|e| ChunkSummary {
                index: e.chunk_index,
                offset: e.offset,
                stored_bytes: e.len,
                checksum: format!("{:016x}", e.checksum),
            })
            .collect();
        variables.push(VariableSummary {
            attribute: quantization.attribute_name(),
            quantization,
            compression,
            codec,
            raw_bytes,
            stored_bytes: reader.stored_size(var)?,
            chunks,
            info,
        });
    }
    Ok(FileSummary {
        file: file.display().to_string(),
        version: reader.header.version,
        flags: reader.header.flags,
        file_bytes: reader.file_size(),
        chunk_count: reader.header.chunk_count,
        variables,
    })
}

fn run_inspect(file: PathBuf, show_chunks: bool, json: bool) -> anyhow::Result<()> {
    let summary = summarize(&file)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("=== QCF1 File: {:?} ===", file);
    println!();
    println!("  format version : {}", summary.version);
    println!("  flags          : 0x{:04x}", summary.flags);
    println!("  variables      : {}", summary.variables.len());
    println!("  chunks         : {}", summary.chunk_count);
    println!("  file on disk   : {}", human_bytes(summary.file_bytes));

    for v in &summary.variables {
        let info = &v.info;
        let dims: Vec<String> = info
            .metadata
            .dim_names
            .iter()
            .zip(&info.shape)
            .map(|(n, d)| format!("{n}={d}"))
            .collect();
        println!();
        println!("  {} {}({})", info.dtype.name(), info.name, dims.join(", "));
        println!("    quantization : {}", v.quantization);
        if let (Some(attr), Some(p)) = (v.attribute, v.quantization.precision()) {
            println!("    {} = {}", attr, p);
        }
        println!("    compression  : {} [{}]", v.compression, v.codec);
        println!("    chunk rows   : {}", info.metadata.chunk_rows);
        if let Some(fill) = info.metadata.fill_value {
            println!("    fill value   : {}", fill);
        }
        println!("    raw size     : {}", human_bytes(v.raw_bytes));
        println!("    stored       : {}", human_bytes(v.stored_bytes));
        if v.stored_bytes > 0 {
            println!("    ratio        : {:.2}x", v.raw_bytes as f64 / v.stored_bytes as f64);
        }

        if show_chunks {
            println!(
                "    {:>8}  {:>14}  {:>12}  {:>16}",
                "chunk", "file offset", "stored", "checksum"
            );
            println!("    {}", "-".repeat(56));
            for c in &v.chunks {
                println!(
                    "    {:>8}  {:>14}  {:>12}  {}",
                    c.index,
                    c.offset,
                    human_bytes(c.stored_bytes as u64),
                    c.checksum
                );
            }
        }
    }
    Ok(())
}

fn print_rows(values: &[f32], row_len: usize, first_row: u64) {
    for (i, row) in values.chunks(row_len.max(1)).enumerate() {
        let cells: Vec<String> = row.iter().map(|v| format!("{:>12.6e}", v)).collect();
        println!("  [{:>4}] {}", first_row + i as u64, cells.join(" "));
    }
}

fn run_dump(file: PathBuf, variable: Option<String>, chunk: Option<u64>) -> anyhow::Result<()> {
    let mut reader =
        FileReader::open(&file).with_context(|| format!("opening QCF1 file {:?}", file))?;
    let names = match variable {
        Some(name) => vec![name],
        None => reader.variable_names(),
    };

    for name in names {
        let mut var = VariableReader::open(&mut reader, &name)?;
        let row_len = var.descriptor().row_len();
        println!(
            "--- {} {:?} ({}) ---",
            name,
            var.descriptor().shape(),
            var.quantization()
        );
        match chunk {
            Some(index) => {
                let values = var.read_chunk(index)?;
                print_rows(&values, row_len, index * var.layout().chunk_rows());
            }
            None => {
                let values = var.read_all()?;
                print_rows(&values, row_len, 0);
            }
        }
    }
    Ok(())
}

// ── Entry point ────────────────────────────────────────────────────────────

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose)?;
    match cli.command {
        Commands::Bench { out_dir, config } => run_bench(out_dir, config),
        Commands::Write {
            output,
            input,
            shape,
            name,
            quantize,
            precision,
            codec,
            level,
            shuffle,
            chunk_rows,
        } => {
            let compression = compression_from_flags(&codec, level, shuffle)?;
            run_write(output, input, shape, &name, &quantize, precision, compression, chunk_rows)
        }
        Commands::Inspect { file, chunks, json } => run_inspect(file, chunks, json),
        Commands::Dump {
            file,
            variable,
            chunk,
        } => run_dump(file, variable, chunk),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inspect_json_carries_stored_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let results = run_plan(dir.path(), &ExperimentPlan::default()).unwrap();
        let summary = summarize(&results[4].path).unwrap();
        let json = serde_json::to_value(&summary).unwrap();

        let var = &json["variables"][0];
        assert_eq!(var["name"], "field");
        assert_eq!(var["shape"], serde_json::json!([10, 10]));
        assert_eq!(var["metadata"]["quant_mode"], 3);
        assert_eq!(var["metadata"]["quant_precision"], 10);
        assert_eq!(var["metadata"]["dim_names"], serde_json::json!(["x", "y"]));
        assert_eq!(var["quantization"]["mode"], "bit_round");
        assert_eq!(var["raw_bytes"], 400);
    }
}
