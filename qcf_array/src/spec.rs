//! Per-variable encoding configuration.

use std::fmt;

use serde::{Deserialize, Serialize};

use qcf_core::format::{CODEC_DEFLATE, CODEC_LZ4, CODEC_PASSTHROUGH, CODEC_ZSTD};
use qcf_core::{Error, Result};

pub const MODE_NONE: u8 = 0;
pub const MODE_BIT_GROOM: u8 = 1;
pub const MODE_GRANULAR_BIT_ROUND: u8 = 2;
pub const MODE_BIT_ROUND: u8 = 3;

/// Lossy quantization applied element-wise before compression.
///
/// `BitGroom` and `GranularBitRound` take decimal significant digits (nsd);
/// `BitRound` takes binary significant bits (nsb). A precision of 23 or more
/// keeps every mantissa bit of an `f32`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "mode", content = "precision", rename_all = "snake_case")]
pub enum QuantizationSpec {
    None,
    BitGroom(u32),
    GranularBitRound(u32),
    BitRound(u32),
}

impl QuantizationSpec {
    /// Build a spec from a mode name and a signed precision, as given on a
    /// command line or in a config file.
    pub fn parse(mode: &str, precision: i64) -> Result<Self> {
        let spec_for = |make: fn(u32) -> Self| -> Result<Self> {
            if precision <= 0 {
                return Err(Error::InvalidSpec(format!(
                    "{mode} needs a positive precision, got {precision}"
                )));
            }
            let p = u32::try_from(precision)
                .map_err(|_| Error::InvalidSpec(format!("precision {precision} is too large")))?;
            Ok(make(p))
        };
        match mode {
            "none" => Ok(QuantizationSpec::None),
            "bitgroom" | "bit_groom" | "bg" => spec_for(QuantizationSpec::BitGroom),
            "granularbr" | "granular_bit_round" | "gbr" => spec_for(QuantizationSpec::GranularBitRound),
            "bitround" | "bit_round" | "br" => spec_for(QuantizationSpec::BitRound),
            other => Err(Error::InvalidSpec(format!(
                "unknown quantization mode '{other}'; valid options: none, bitgroom, granularbr, bitround"
            ))),
        }
    }

    /// Reject zero precision. Specs built through [`Self::parse`] are
    /// already valid; this catches direct enum construction.
    pub fn validate(&self) -> Result<()> {
        match self.precision() {
            Some(0) => Err(Error::InvalidSpec(format!(
                "{} precision must be positive",
                self.mode_name()
            ))),
            _ => Ok(()),
        }
    }

    pub fn precision(&self) -> Option<u32> {
        match *self {
            QuantizationSpec::None => None,
            QuantizationSpec::BitGroom(p)
            | QuantizationSpec::GranularBitRound(p)
            | QuantizationSpec::BitRound(p) => Some(p),
        }
    }

    pub fn mode_code(&self) -> u8 {
        match self {
            QuantizationSpec::None => MODE_NONE,
            QuantizationSpec::BitGroom(_) => MODE_BIT_GROOM,
            QuantizationSpec::GranularBitRound(_) => MODE_GRANULAR_BIT_ROUND,
            QuantizationSpec::BitRound(_) => MODE_BIT_ROUND,
        }
    }

    pub fn mode_name(&self) -> &'static str {
        match self {
            QuantizationSpec::None => "none",
            QuantizationSpec::BitGroom(_) => "bitgroom",
            QuantizationSpec::GranularBitRound(_) => "granularbr",
            QuantizationSpec::BitRound(_) => "bitround",
        }
    }

    /// The variable attribute under which scientific data libraries record
    /// this quantization, e.g. `_QuantizeBitRoundNumberOfSignificantBits`.
    pub fn attribute_name(&self) -> Option<&'static str> {
        match self {
            QuantizationSpec::None => None,
            QuantizationSpec::BitGroom(_) => Some("_QuantizeBitGroomNumberOfSignificantDigits"),
            QuantizationSpec::GranularBitRound(_) => {
                Some("_QuantizeGranularBitRoundNumberOfSignificantDigits")
            }
            QuantizationSpec::BitRound(_) => Some("_QuantizeBitRoundNumberOfSignificantBits"),
        }
    }

    /// Rebuild from the `(quant_mode, quant_precision)` pair in stored metadata.
    pub fn from_metadata(mode: u8, precision: u32) -> Result<Self> {
        let spec = match mode {
            MODE_NONE => QuantizationSpec::None,
            MODE_BIT_GROOM => QuantizationSpec::BitGroom(precision),
            MODE_GRANULAR_BIT_ROUND => QuantizationSpec::GranularBitRound(precision),
            MODE_BIT_ROUND => QuantizationSpec::BitRound(precision),
            other => return Err(Error::Format(format!("unknown quantization mode code {other}"))),
        };
        spec.validate()?;
        Ok(spec)
    }
}

impl fmt::Display for QuantizationSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuantizationSpec::None => write!(f, "none"),
            QuantizationSpec::BitRound(nsb) => write!(f, "bitround({nsb} bits)"),
            other => write!(f, "{}({} digits)", other.mode_name(), other.precision().unwrap_or(0)),
        }
    }
}

/// Lossless compressor selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodecKind {
    Deflate,
    Zstd,
    Lz4,
}

impl CodecKind {
    pub fn id(self) -> u16 {
        match self {
            CodecKind::Deflate => CODEC_DEFLATE,
            CodecKind::Zstd => CODEC_ZSTD,
            CodecKind::Lz4 => CODEC_LZ4,
        }
    }

    pub fn from_id(id: u16) -> Result<Self> {
        match id {
            CODEC_DEFLATE => Ok(CodecKind::Deflate),
            CODEC_ZSTD => Ok(CodecKind::Zstd),
            CODEC_LZ4 => Ok(CodecKind::Lz4),
            other => Err(Error::UnknownCodec(other)),
        }
    }

    pub fn parse(name: &str) -> Result<Self> {
        match name {
            "deflate" | "zlib" => Ok(CodecKind::Deflate),
            "zstd" => Ok(CodecKind::Zstd),
            "lz4" => Ok(CodecKind::Lz4),
            other => Err(Error::InvalidSpec(format!(
                "unknown codec '{other}'; valid options: deflate, zstd, lz4"
            ))),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            CodecKind::Deflate => "deflate",
            CodecKind::Zstd => "zstd",
            CodecKind::Lz4 => "lz4",
        }
    }
}

fn default_codec() -> CodecKind {
    CodecKind::Deflate
}

/// Whether and how chunk bytes are compressed. Level 0 stores verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum CompressionSpec {
    Off,
    On {
        #[serde(default = "default_codec")]
        codec: CodecKind,
        level: u32,
        #[serde(default)]
        shuffle: bool,
    },
}

impl CompressionSpec {
    /// Deflate at `level`, no shuffle: the classic scientific-file setting.
    pub fn deflate(level: u32) -> Self {
        CompressionSpec::On {
            codec: CodecKind::Deflate,
            level,
            shuffle: false,
        }
    }

    pub fn codec_id(&self) -> u16 {
        match self {
            CompressionSpec::Off => CODEC_PASSTHROUGH,
            CompressionSpec::On { codec, .. } => codec.id(),
        }
    }

    pub fn level(&self) -> u32 {
        match self {
            CompressionSpec::Off => 0,
            CompressionSpec::On { level, .. } => *level,
        }
    }

    pub fn shuffle(&self) -> bool {
        matches!(self, CompressionSpec::On { shuffle: true, .. })
    }

    pub fn is_on(&self) -> bool {
        matches!(self, CompressionSpec::On { .. })
    }

    /// Rebuild from the `(codec_id, compression_level, shuffle)` triple in
    /// stored metadata.
    pub fn from_metadata(codec_id: u16, level: u32, shuffle: bool) -> Result<Self> {
        if codec_id == CODEC_PASSTHROUGH {
            return Ok(CompressionSpec::Off);
        }
        Ok(CompressionSpec::On {
            codec: CodecKind::from_id(codec_id)?,
            level,
            shuffle,
        })
    }
}

impl fmt::Display for CompressionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompressionSpec::Off => write!(f, "off"),
            CompressionSpec::On { codec, level, shuffle } => {
                write!(f, "{}(level {level}", codec.name())?;
                if *shuffle {
                    write!(f, ", shuffle")?;
                }
                write!(f, ")")
            }
        }
    }
}
