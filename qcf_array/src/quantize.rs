//! Significant-digit quantization of `f32` values.
//!
//! All three methods work directly on the IEEE-754 bit pattern: they keep
//! the sign, the exponent and the leading `k` explicit mantissa bits and
//! replace the trailing `23 - k` bits with something more compressible.
//!
//! | method             | kept bits `k`                         | trailing bits           |
//! |--------------------|---------------------------------------|-------------------------|
//! | BitGroom(nsd)      | `ceil(nsd * log2(10)) + 1`            | fixed `1010..` pattern  |
//! | GranularBitRound   | per binary exponent, from nsd         | round half to even      |
//! | BitRound(nsb)      | `nsb`                                 | round half to even      |
//!
//! Zero, subnormals, infinities, NaN and the variable's fill value are
//! always passed through untouched.

use std::f64::consts::{LOG10_2, LOG2_10};

use qcf_core::Result;

use crate::spec::QuantizationSpec;

/// Explicit mantissa bits of an `f32`.
pub const MANTISSA_BITS: u32 = 23;

const EXPONENT_MASK: u32 = 0x7F80_0000;
const EXPONENT_BIAS: i32 = 127;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Method {
    Identity,
    /// Leading bits kept, below [`MANTISSA_BITS`].
    Groom { keep: u32 },
    Granular { nsd: u32 },
    Round { keep: u32 },
}

/// A validated, ready-to-apply quantization.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quantizer {
    method: Method,
    fill_value: Option<f32>,
}

impl Quantizer {
    /// Validate `spec` and precompute its bit budget.
    pub fn new(spec: QuantizationSpec) -> Result<Self> {
        spec.validate()?;
        let method = match spec {
            QuantizationSpec::None => Method::Identity,
            QuantizationSpec::BitGroom(nsd) => match bit_groom_keep(nsd) {
                keep if keep >= MANTISSA_BITS => Method::Identity,
                keep => Method::Groom { keep },
            },
            QuantizationSpec::GranularBitRound(nsd) if nsd >= MANTISSA_BITS => Method::Identity,
            QuantizationSpec::GranularBitRound(nsd) => Method::Granular { nsd },
            QuantizationSpec::BitRound(nsb) if nsb >= MANTISSA_BITS => Method::Identity,
            QuantizationSpec::BitRound(nsb) => Method::Round { keep: nsb },
        };
        Ok(Self {
            method,
            fill_value: None,
        })
    }

    /// Values bit-equal to `fill` are left as they are.
    pub fn with_fill_value(mut self, fill: Option<f32>) -> Self {
        self.fill_value = fill;
        self
    }

    /// True when every finite value comes back unchanged.
    pub fn is_identity(&self) -> bool {
        self.method == Method::Identity
    }

    pub fn apply(&self, value: f32) -> f32 {
        if self.method == Method::Identity || !value.is_normal() {
            return value;
        }
        if self.fill_value.is_some_and(|fill| fill.to_bits() == value.to_bits()) {
            return value;
        }
        let bits = value.to_bits();
        let out = match self.method {
            Method::Identity => bits,
            Method::Groom { keep } => groom(bits, MANTISSA_BITS - keep),
            Method::Granular { nsd } => match granular_keep(unbiased_exponent(bits), nsd) {
                keep if keep >= MANTISSA_BITS => bits,
                keep => round_half_even(bits, MANTISSA_BITS - keep),
            },
            Method::Round { keep } => round_half_even(bits, MANTISSA_BITS - keep),
        };
        f32::from_bits(out)
    }

    /// Quantize `values` in place.
    pub fn apply_slice(&self, values: &mut [f32]) {
        if self.is_identity() {
            return;
        }
        for v in values.iter_mut() {
            *v = self.apply(*v);
        }
    }
}

/// Quantize a single value under `spec`.
pub fn quantize(value: f32, spec: &QuantizationSpec) -> Result<f32> {
    Ok(Quantizer::new(*spec)?.apply(value))
}

/// Mantissa bits BitGroom keeps for `nsd` decimal digits, one guard bit
/// included. Saturates at [`MANTISSA_BITS`].
pub fn bit_groom_keep(nsd: u32) -> u32 {
    if nsd >= MANTISSA_BITS {
        return MANTISSA_BITS;
    }
    let keep = (f64::from(nsd) * LOG2_10).ceil() as u32 + 1;
    keep.min(MANTISSA_BITS)
}

/// Mantissa bits GranularBitRound keeps for a value with binary exponent
/// `exponent` so that `nsd` decimal digits survive, clamped to `1..=23`.
pub fn granular_keep(exponent: i32, nsd: u32) -> u32 {
    let e = f64::from(exponent);
    // Decimal digits left of the point for any value in this binade.
    let leading_digits = (e * LOG10_2).floor() + 1.0;
    let keep = (e - (leading_digits - f64::from(nsd)) * LOG2_10).ceil();
    keep.clamp(1.0, f64::from(MANTISSA_BITS)) as u32
}

fn unbiased_exponent(bits: u32) -> i32 {
    ((bits & EXPONENT_MASK) >> MANTISSA_BITS) as i32 - EXPONENT_BIAS
}

fn low_mask(drop: u32) -> u32 {
    (1u32 << drop) - 1
}

/// Clear the `drop` trailing bits, then set the alternating pattern that
/// starts with a one directly below the last kept bit.
fn groom(bits: u32, drop: u32) -> u32 {
    let low = low_mask(drop);
    let pattern = if (drop - 1) % 2 == 1 {
        0xAAAA_AAAA
    } else {
        0x5555_5555
    };
    (bits & !low) | (pattern & low)
}

/// Round away the `drop` trailing bits, ties to even. Falls back to
/// truncation when rounding up would overflow to infinity.
fn round_half_even(bits: u32, drop: u32) -> u32 {
    let low = low_mask(drop);
    let half = 1u32 << (drop - 1);
    let lsb = (bits >> drop) & 1;
    let rounded = bits.wrapping_add(half - 1 + lsb) & !low;
    if rounded & EXPONENT_MASK == EXPONENT_MASK {
        bits & !low
    } else {
        rounded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q(spec: QuantizationSpec, v: f32) -> f32 {
        quantize(v, &spec).unwrap()
    }

    #[test]
    fn groom_keeps_expected_bits() {
        assert_eq!(bit_groom_keep(1), 5);
        assert_eq!(bit_groom_keep(3), 11);
        assert_eq!(bit_groom_keep(6), 21);
        assert_eq!(bit_groom_keep(7), MANTISSA_BITS);
        assert!(Quantizer::new(QuantizationSpec::BitGroom(7)).unwrap().is_identity());
    }

    #[test]
    fn groom_pattern_starts_with_one() {
        // drop 12: bits 11, 9, 7, ... set
        assert_eq!(groom(0, 12), 0b1010_1010_1010);
        // drop 3: bits 2, 0 set
        assert_eq!(groom(0xFFFF_FFFF, 3), 0xFFFF_FFFD);
    }

    #[test]
    fn round_half_even_ties() {
        // 1.0 + 2^-11 is exactly halfway between 1.0 and 1.0 + 2^-10
        let tie_down = f32::from_bits(0x3F80_0000 | (1 << 12));
        assert_eq!(q(QuantizationSpec::BitRound(10), tie_down), 1.0);
        // 1.0 + 3 * 2^-11 is halfway between two values; the even one is up
        let tie_up = f32::from_bits(0x3F80_0000 | (1 << 13) | (1 << 12));
        assert_eq!(
            q(QuantizationSpec::BitRound(10), tie_up).to_bits(),
            0x3F80_0000 | (1 << 14)
        );
    }

    #[test]
    fn rounding_carry_bumps_exponent() {
        let just_below_two = f32::from_bits(0x3FFF_FFFF);
        assert_eq!(q(QuantizationSpec::BitRound(4), just_below_two), 2.0);
    }

    #[test]
    fn overflow_truncates_instead() {
        let out = q(QuantizationSpec::BitRound(4), f32::MAX);
        assert!(out.is_finite());
        assert!(out <= f32::MAX);
        assert_eq!(out.to_bits() & low_mask(19), 0);
    }

    #[test]
    fn specials_pass_through() {
        for spec in [
            QuantizationSpec::BitGroom(2),
            QuantizationSpec::GranularBitRound(2),
            QuantizationSpec::BitRound(3),
        ] {
            assert_eq!(q(spec, 0.0).to_bits(), 0.0f32.to_bits());
            assert_eq!(q(spec, -0.0).to_bits(), (-0.0f32).to_bits());
            assert!(q(spec, f32::NAN).is_nan());
            assert_eq!(q(spec, f32::INFINITY), f32::INFINITY);
            assert_eq!(q(spec, f32::NEG_INFINITY), f32::NEG_INFINITY);
            let sub = f32::from_bits(0x0000_1234);
            assert_eq!(q(spec, sub).to_bits(), sub.to_bits());
        }
    }

    #[test]
    fn fill_value_is_preserved() {
        let fill = 9.969_21e36_f32;
        let quant = Quantizer::new(QuantizationSpec::BitRound(2))
            .unwrap()
            .with_fill_value(Some(fill));
        assert_eq!(quant.apply(fill).to_bits(), fill.to_bits());
        assert_ne!(quant.apply(3.14159).to_bits(), 3.14159f32.to_bits());
    }

    #[test]
    fn granular_keep_tracks_magnitude() {
        // [1, 2): a step of 2^-7 resolves the hundredths
        assert_eq!(granular_keep(0, 3), 7);
        // [8192, 16384): at least 4 leading digits, steps of 8 are enough
        assert_eq!(granular_keep(13, 3), 10);
        assert_eq!(granular_keep(0, 30), MANTISSA_BITS);
        assert_eq!(granular_keep(100, 1), 1);
    }

    #[test]
    fn zero_precision_rejected() {
        assert!(quantize(1.0, &QuantizationSpec::BitGroom(0)).unwrap_err().is_invalid_spec());
    }

    #[test]
    fn full_precision_is_identity() {
        let v = 1.234_567_9_f32;
        assert_eq!(q(QuantizationSpec::BitRound(23), v).to_bits(), v.to_bits());
        assert_eq!(q(QuantizationSpec::GranularBitRound(9), v).to_bits(), v.to_bits());
        assert_eq!(q(QuantizationSpec::BitGroom(8), v).to_bits(), v.to_bits());
    }
}
