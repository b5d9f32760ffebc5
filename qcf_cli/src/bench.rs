use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::Context;
use tracing::info;

use qcf_array::{write_variable, ArrayDescriptor, VariableEncoder, VariableReader};
use qcf_core::{FileReader, FileWriter};

use crate::experiments::{sine_field, Experiment, ExperimentPlan};

pub const FIELD_NAME: &str = "field";
pub const FIELD_DIMS: [&str; 2] = ["x", "y"];

/// Timings and sizes for one experiment file.
#[derive(Debug, Clone)]
pub struct BenchResult {
    pub name: String,
    pub path: PathBuf,
    pub raw_bytes: u64,
    pub file_bytes: u64,
    /// Quantize + compress + hand chunks to the file.
    pub write: Duration,
    /// Directory, footer, header and fsync.
    pub close: Duration,
    /// Largest relative difference between read-back and source values.
    pub max_rel_error: f64,
}

impl BenchResult {
    pub fn total(&self) -> Duration {
        self.write + self.close
    }

    pub fn ratio(&self) -> f64 {
        self.raw_bytes as f64 / self.file_bytes as f64
    }
}

/// Write one experiment's file into `out_dir` and read it back.
pub fn run_experiment(
    out_dir: &Path,
    plan: &ExperimentPlan,
    experiment: &Experiment,
    values: &[f32],
) -> anyhow::Result<BenchResult> {
    let path = out_dir.join(format!("{}.qcf", experiment.name));
    let descriptor =
        ArrayDescriptor::new(FIELD_NAME, &[plan.rows, plan.cols])?.with_dim_names(&FIELD_DIMS)?;
    let raw_bytes = descriptor.byte_len() as u64;
    let mut encoder =
        VariableEncoder::new(descriptor, experiment.quantization, experiment.compression)?;
    if let Some(rows) = experiment.chunk_rows {
        encoder = encoder.with_chunk_rows(rows)?;
    }

    let mut writer =
        FileWriter::create(&path).with_context(|| format!("creating output file {:?}", path))?;

    let t0 = Instant::now();
    let encoded = encoder.encode(values)?;
    write_variable(&mut writer, &encoded)?;
    let write = t0.elapsed();

    let t1 = Instant::now();
    writer.finish()?;
    let close = t1.elapsed();

    let file_bytes = std::fs::metadata(&path)?.len();
    let max_rel_error = read_back_error(&path, values)
        .with_context(|| format!("verifying {:?}", path))?;

    info!(
        experiment = %experiment.name,
        write_s = write.as_secs_f64(),
        close_s = close.as_secs_f64(),
        file_bytes,
        "experiment finished"
    );
    Ok(BenchResult {
        name: experiment.name.clone(),
        path,
        raw_bytes,
        file_bytes,
        write,
        close,
        max_rel_error,
    })
}

fn read_back_error(path: &Path, source: &[f32]) -> anyhow::Result<f64> {
    let mut reader = FileReader::open(path)?;
    let decoded = VariableReader::open(&mut reader, FIELD_NAME)?.read_all()?;
    Ok(source
        .iter()
        .zip(&decoded)
        .filter(|(s, _)| **s != 0.0)
        .map(|(&s, &d)| ((f64::from(d) - f64::from(s)) / f64::from(s)).abs())
        .fold(0.0, f64::max))
}

/// Run every experiment of `plan`, writing files into `out_dir`.
pub fn run_plan(out_dir: &Path, plan: &ExperimentPlan) -> anyhow::Result<Vec<BenchResult>> {
    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("creating output directory {:?}", out_dir))?;
    let values = sine_field(plan.rows, plan.cols);
    plan.experiments
        .iter()
        .map(|exp| {
            run_experiment(out_dir, plan, exp, &values)
                .with_context(|| format!("experiment {:?}", exp.name))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_plan_writes_five_files() {
        let dir = tempfile::tempdir().unwrap();
        let results = run_plan(dir.path(), &ExperimentPlan::default()).unwrap();
        assert_eq!(results.len(), 5);
        for r in &results {
            assert!(r.path.exists(), "{:?} missing", r.path);
            assert_eq!(r.raw_bytes, 400);
            assert!(r.file_bytes > 0);
        }
        assert_eq!(results[0].max_rel_error, 0.0);
        assert_eq!(results[1].max_rel_error, 0.0);
        assert!(results[2].max_rel_error <= 5e-4);
        assert!(results[4].max_rel_error <= 2f64.powi(-11));
        assert!(results[4].max_rel_error > 0.0);
    }

    #[test]
    fn chunked_experiment_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let mut plan = ExperimentPlan::default();
        plan.rows = 9;
        plan.experiments.truncate(2);
        plan.experiments[1].chunk_rows = Some(4);
        let results = run_plan(dir.path(), &plan).unwrap();

        let mut reader = FileReader::open(&results[1].path).unwrap();
        let var = VariableReader::open(&mut reader, FIELD_NAME).unwrap();
        assert_eq!(var.chunk_count(), 3);
        assert_eq!(results[1].max_rel_error, 0.0);
    }
}
