//! Benchmark experiment plans.
//!
//! A plan is a field shape plus a list of named configurations; each
//! configuration becomes one output file. Plans load from JSON:
//!
//! ```json
//! {
//!   "rows": 10, "cols": 10,
//!   "experiments": [
//!     { "name": "quant_br_10b_comp",
//!       "quantization": { "mode": "bit_round", "precision": 10 },
//!       "compression": { "mode": "on", "level": 1 } }
//!   ]
//! }
//! ```

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use qcf_array::{CompressionSpec, QuantizationSpec};

fn default_extent() -> u64 {
    10
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Experiment {
    pub name: String,
    #[serde(default = "no_quantization")]
    pub quantization: QuantizationSpec,
    #[serde(default = "no_compression")]
    pub compression: CompressionSpec,
    /// Outer rows per chunk; the whole field when absent.
    #[serde(default)]
    pub chunk_rows: Option<u64>,
}

fn no_quantization() -> QuantizationSpec {
    QuantizationSpec::None
}

fn no_compression() -> CompressionSpec {
    CompressionSpec::Off
}

impl Experiment {
    pub fn new(name: &str, quantization: QuantizationSpec, compression: CompressionSpec) -> Self {
        Self {
            name: name.to_string(),
            quantization,
            compression,
            chunk_rows: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentPlan {
    #[serde(default = "default_extent")]
    pub rows: u64,
    #[serde(default = "default_extent")]
    pub cols: u64,
    pub experiments: Vec<Experiment>,
}

impl Default for ExperimentPlan {
    /// The 10×10 field under five configurations: reference, deflate only,
    /// and deflate after each of the three quantizers.
    fn default() -> Self {
        let deflate = CompressionSpec::deflate(1);
        Self {
            rows: default_extent(),
            cols: default_extent(),
            experiments: vec![
                Experiment::new("reference", QuantizationSpec::None, CompressionSpec::Off),
                Experiment::new("reference_comp", QuantizationSpec::None, deflate),
                Experiment::new("quant_bg_3_comp", QuantizationSpec::BitGroom(3), deflate),
                Experiment::new("quant_gran_3_comp", QuantizationSpec::GranularBitRound(3), deflate),
                Experiment::new("quant_br_10b_comp", QuantizationSpec::BitRound(10), deflate),
            ],
        }
    }
}

impl ExperimentPlan {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading experiment plan {:?}", path))?;
        let plan: ExperimentPlan = serde_json::from_str(&text)
            .with_context(|| format!("parsing experiment plan {:?}", path))?;
        plan.validate()?;
        Ok(plan)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.rows == 0 || self.cols == 0 {
            anyhow::bail!("field shape {}x{} has a zero extent", self.rows, self.cols);
        }
        if self.experiments.is_empty() {
            anyhow::bail!("experiment plan lists no experiments");
        }
        for (i, exp) in self.experiments.iter().enumerate() {
            if exp.name.is_empty() || exp.name.contains(|c: char| c == '/' || c == '\\') {
                anyhow::bail!("experiment {i} has an unusable name {:?}", exp.name);
            }
            if self.experiments[..i].iter().any(|e| e.name == exp.name) {
                anyhow::bail!("experiment name {:?} appears twice", exp.name);
            }
            exp.quantization
                .validate()
                .with_context(|| format!("experiment {:?}", exp.name))?;
        }
        Ok(())
    }
}

/// `sin(2π·j/cols)·i` for `i < rows`, `j < cols`, row-major.
pub fn sine_field(rows: u64, cols: u64) -> Vec<f32> {
    let step = 2.0 * std::f64::consts::PI / cols as f64;
    (0..rows)
        .flat_map(|i| (0..cols).map(move |j| ((step * j as f64).sin() * i as f64) as f32))
        .collect()
}
