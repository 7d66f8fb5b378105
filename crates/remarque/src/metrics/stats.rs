//! Hypothesis tests and divergences used by the balance report.
//!
//! Everything here works on plain slices and has no notion of tables or
//! partitions. p-values use asymptotic distributions; none of the tests
//! enumerates exact permutation distributions.

use serde::{Deserialize, Serialize};

use super::MetricError;

/// Simplex tolerance passed to `logp`.
const SIMPLEX_TOL: f64 = 1e-9;

// =============================================================================
// Kolmogorov-Smirnov
// =============================================================================

/// Alternative hypothesis of a two-sample KS test.
///
/// With `cdf1` the empirical CDF of the first sample, `Less` tests whether
/// `cdf1 <= cdf2` is violated (statistic `max(cdf2 - cdf1)`), `Greater`
/// uses `max(cdf1 - cdf2)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Alternative {
    TwoSided,
    Less,
    Greater,
}

impl Alternative {
    /// All alternatives, in report order.
    pub const ALL: [Alternative; 3] = [Alternative::TwoSided, Alternative::Less, Alternative::Greater];

    pub fn as_str(self) -> &'static str {
        match self {
            Alternative::TwoSided => "two-sided",
            Alternative::Less => "less",
            Alternative::Greater => "greater",
        }
    }
}

/// Statistic and p-value of a KS test.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KsResult {
    pub statistic: f64,
    pub pvalue: f64,
}

/// Two-sample Kolmogorov-Smirnov test.
///
/// NaN values are dropped before testing.
///
/// # Errors
///
/// [`MetricError::EmptySample`] if either sample has no finite values.
pub fn ks_2samp(a: &[f64], b: &[f64], alternative: Alternative) -> Result<KsResult, MetricError> {
    let a = sorted_finite(a);
    let b = sorted_finite(b);
    if a.is_empty() || b.is_empty() {
        return Err(MetricError::EmptySample);
    }

    let (n1, n2) = (a.len() as f64, b.len() as f64);
    let (mut i, mut j) = (0usize, 0usize);
    let (mut d_plus, mut d_minus) = (0.0f64, 0.0f64);
    while i < a.len() && j < b.len() {
        let x = a[i].min(b[j]);
        while i < a.len() && a[i] <= x {
            i += 1;
        }
        while j < b.len() && b[j] <= x {
            j += 1;
        }
        let diff = i as f64 / n1 - j as f64 / n2;
        d_plus = d_plus.max(diff);
        d_minus = d_minus.max(-diff);
    }

    let en = (n1 * n2 / (n1 + n2)).sqrt();
    let (statistic, pvalue) = match alternative {
        Alternative::TwoSided => {
            let d = d_plus.max(d_minus);
            (d, kolmogorov_sf((en + 0.12 + 0.11 / en) * d))
        }
        Alternative::Greater => (d_plus, (-2.0 * en * en * d_plus * d_plus).exp()),
        Alternative::Less => (d_minus, (-2.0 * en * en * d_minus * d_minus).exp()),
    };

    Ok(KsResult {
        statistic,
        pvalue: pvalue.clamp(0.0, 1.0),
    })
}

/// Survival function of the Kolmogorov distribution.
fn kolmogorov_sf(x: f64) -> f64 {
    if x < 0.27 {
        return 1.0;
    }
    let mut sum = 0.0;
    let mut sign = 1.0;
    for k in 1..=100 {
        let k = k as f64;
        let term = (-2.0 * k * k * x * x).exp();
        sum += sign * term;
        if term < 1e-12 {
            break;
        }
        sign = -sign;
    }
    (2.0 * sum).clamp(0.0, 1.0)
}

fn sorted_finite(values: &[f64]) -> Vec<f64> {
    let mut out: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    out.sort_by(f64::total_cmp);
    out
}

// =============================================================================
// Chi-square
// =============================================================================

/// Result of a chi-square goodness-of-fit test.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChiSquare {
    pub statistic: f64,
    pub dof: usize,
    pub pvalue: f64,
}

/// Pearson chi-square goodness-of-fit of `observed` against `expected`.
///
/// Categories with zero expected and zero observed count carry no
/// information and are skipped. With fewer than two remaining categories
/// the test is trivially satisfied (`pvalue = 1`).
///
/// # Errors
///
/// - [`MetricError::LengthMismatch`] if the slices differ in length
/// - [`MetricError::EmptySample`] if every count is zero
/// - [`MetricError::ZeroExpected`] if a category is observed but expected
///   zero times
pub fn chi_square(observed: &[f64], expected: &[f64]) -> Result<ChiSquare, MetricError> {
    if observed.len() != expected.len() {
        return Err(MetricError::LengthMismatch(observed.len(), expected.len()));
    }

    let mut statistic = 0.0;
    let mut categories = 0usize;
    for (i, (&o, &e)) in observed.iter().zip(expected).enumerate() {
        if e <= 0.0 {
            if o > 0.0 {
                return Err(MetricError::ZeroExpected(i));
            }
            continue;
        }
        statistic += (o - e) * (o - e) / e;
        categories += 1;
    }

    if categories == 0 {
        return Err(MetricError::EmptySample);
    }
    if categories == 1 {
        return Ok(ChiSquare {
            statistic: 0.0,
            dof: 0,
            pvalue: 1.0,
        });
    }

    let dof = categories - 1;
    let pvalue = gamma_q(dof as f64 / 2.0, statistic / 2.0);
    Ok(ChiSquare {
        statistic,
        dof,
        pvalue: pvalue.clamp(0.0, 1.0),
    })
}

/// Regularized upper incomplete gamma function `Q(a, x)`.
fn gamma_q(a: f64, x: f64) -> f64 {
    if x <= 0.0 {
        return 1.0;
    }
    if x < a + 1.0 {
        1.0 - gamma_p_series(a, x)
    } else {
        gamma_q_continued_fraction(a, x)
    }
}

fn gamma_p_series(a: f64, x: f64) -> f64 {
    let mut ap = a;
    let mut sum = 1.0 / a;
    let mut del = sum;
    for _ in 0..500 {
        ap += 1.0;
        del *= x / ap;
        sum += del;
        if del.abs() < sum.abs() * 1e-15 {
            break;
        }
    }
    sum * (-x + a * x.ln() - ln_gamma(a)).exp()
}

// Modified Lentz evaluation.
fn gamma_q_continued_fraction(a: f64, x: f64) -> f64 {
    const TINY: f64 = 1e-300;
    let mut b = x + 1.0 - a;
    let mut c = 1.0 / TINY;
    let mut d = 1.0 / b;
    let mut h = d;
    for i in 1..500 {
        let an = -(i as f64) * (i as f64 - a);
        b += 2.0;
        d = an * d + b;
        if d.abs() < TINY {
            d = TINY;
        }
        c = b + an / c;
        if c.abs() < TINY {
            c = TINY;
        }
        d = 1.0 / d;
        let del = d * c;
        h *= del;
        if (del - 1.0).abs() < 1e-15 {
            break;
        }
    }
    (-x + a * x.ln() - ln_gamma(a)).exp() * h
}

/// Natural log of the gamma function (Lanczos, g = 7).
pub fn ln_gamma(x: f64) -> f64 {
    const COEFFS: [f64; 9] = [
        0.999_999_999_999_809_9,
        676.520_368_121_885_1,
        -1_259.139_216_722_402_8,
        771.323_428_777_653_1,
        -176.615_029_162_140_6,
        12.507_343_278_686_905,
        -0.138_571_095_265_720_12,
        9.984_369_578_019_572e-6,
        1.505_632_735_149_311_6e-7,
    ];
    if x < 0.5 {
        // Reflection formula.
        let pi = std::f64::consts::PI;
        return (pi / (pi * x).sin()).ln() - ln_gamma(1.0 - x);
    }
    let x = x - 1.0;
    let mut acc = COEFFS[0];
    let t = x + 7.5;
    for (i, &c) in COEFFS.iter().enumerate().skip(1) {
        acc += c / (x + i as f64);
    }
    0.5 * (2.0 * std::f64::consts::PI).ln() + (x + 0.5) * t.ln() - t + acc.ln()
}

// =============================================================================
// Normal distribution
// =============================================================================

/// Error function (Abramowitz & Stegun 7.1.26, |error| < 1.5e-7).
pub fn erf(x: f64) -> f64 {
    const A1: f64 = 0.254_829_592;
    const A2: f64 = -0.284_496_736;
    const A3: f64 = 1.421_413_741;
    const A4: f64 = -1.453_152_027;
    const A5: f64 = 1.061_405_429;
    const P: f64 = 0.327_591_1;

    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();
    let t = 1.0 / (1.0 + P * x);
    let y = 1.0 - (((((A5 * t + A4) * t) + A3) * t + A2) * t + A1) * t * (-x * x).exp();
    sign * y
}

/// Standard normal cumulative distribution function.
pub fn normal_cdf(x: f64) -> f64 {
    0.5 * (1.0 + erf(x / std::f64::consts::SQRT_2))
}

// =============================================================================
// Divergences
// =============================================================================

/// Jensen-Shannon divergence of two distributions, in nats (`[0, ln 2]`).
///
/// Inputs must be probability vectors of equal length.
pub fn jensen_shannon(p: &[f64], q: &[f64]) -> Result<f64, MetricError> {
    if p.len() != q.len() {
        return Err(MetricError::LengthMismatch(p.len(), q.len()));
    }
    if p.iter().sum::<f64>() == 0.0 || q.iter().sum::<f64>() == 0.0 {
        return Err(MetricError::EmptySample);
    }
    logp::jensen_shannon_divergence(p, q, SIMPLEX_TOL)
        .map_err(|e| MetricError::Divergence(e.to_string()))
}
