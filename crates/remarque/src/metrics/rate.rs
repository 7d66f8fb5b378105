//! Conversion rate comparison between test and control.
//!
//! After a campaign ran, the warehouse reports cumulative conversions per
//! day for both groups. [`poisson_rate_test`] decides whether two event
//! rates differ; [`compare_conversions`] applies it to every reported day.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::stats::normal_cdf;
use super::MetricError;

/// Outcome of a two-sample Poisson rate test.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateTest {
    /// `|ln(rate_test / rate_control)| / sqrt(1/count_test + 1/count_control)`.
    pub z_statistic: f64,
    /// Two-sided p-value.
    pub p_value: f64,
    /// `rate_test / rate_control`.
    pub rate_ratio: f64,
}

impl RateTest {
    pub fn is_significant(&self, alpha: f64) -> bool {
        self.p_value < alpha
    }
}

/// Two-sided z-test on the log ratio of two Poisson rates.
///
/// # Errors
///
/// [`MetricError::NonPositive`] if a count or an exposure is not positive;
/// the log rate ratio is undefined there.
///
/// # Example
///
/// ```
/// use remarque::metrics::poisson_rate_test;
///
/// let same = poisson_rate_test(10, 100.0, 20, 200.0).unwrap();
/// assert!(same.z_statistic.abs() < 1e-12);
/// assert!((same.p_value - 1.0).abs() < 1e-6);
/// ```
pub fn poisson_rate_test(
    count_test: u64,
    exposure_test: f64,
    count_control: u64,
    exposure_control: f64,
) -> Result<RateTest, MetricError> {
    positive("count_test", count_test as f64)?;
    positive("exposure_test", exposure_test)?;
    positive("count_control", count_control as f64)?;
    positive("exposure_control", exposure_control)?;

    let (ct, cc) = (count_test as f64, count_control as f64);
    let rate_ratio = (ct / exposure_test) / (cc / exposure_control);
    let z_statistic = rate_ratio.ln().abs() / (1.0 / ct + 1.0 / cc).sqrt();
    let p_value = (2.0 * (1.0 - normal_cdf(z_statistic))).clamp(0.0, 1.0);

    Ok(RateTest {
        z_statistic,
        p_value,
        rate_ratio,
    })
}

fn positive(name: &'static str, value: f64) -> Result<(), MetricError> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(MetricError::NonPositive { name, value })
    }
}

/// One row of the cumulative conversions report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionRow {
    pub date: String,
    pub cum_test_regs: u64,
    pub cum_control_regs: u64,
    /// Users in the test group up to `date`.
    pub total_user_count: u64,
    /// Users in the control group up to `date`.
    pub total_control_user_count: u64,
}

/// Per-day comparison of the two groups' conversion rates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionComparison {
    pub date: String,
    pub test_rate: Option<f64>,
    pub control_rate: Option<f64>,
    /// `test_rate / control_rate - 1`.
    pub uplift: Option<f64>,
    pub rate_test: Option<RateTest>,
}

/// Compare conversion rates for every row of the report.
pub fn compare_conversions(rows: &[ConversionRow]) -> Vec<ConversionComparison> {
    rows.iter()
        .map(|row| {
            let test_rate = rate(row.cum_test_regs, row.total_user_count);
            let control_rate = rate(row.cum_control_regs, row.total_control_user_count);
            let uplift = match (test_rate, control_rate) {
                (Some(t), Some(c)) if c > 0.0 => Some(t / c - 1.0),
                _ => None,
            };
            let rate_test = poisson_rate_test(
                row.cum_test_regs,
                row.total_user_count as f64,
                row.cum_control_regs,
                row.total_control_user_count as f64,
            )
            .map_err(|e| debug!(date = %row.date, error = %e, "rate test skipped"))
            .ok();

            ConversionComparison {
                date: row.date.clone(),
                test_rate,
                control_rate,
                uplift,
                rate_test,
            }
        })
        .collect()
}

fn rate(count: u64, users: u64) -> Option<f64> {
    (users > 0).then(|| count as f64 / users as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use rstest::rstest;

    #[rstest]
    #[case(10, 100.0, 20, 200.0)]
    #[case(7, 7.0, 7, 7.0)]
    #[case(150, 1_000.0, 300, 2_000.0)]
    fn equal_rates(#[case] ct: u64, #[case] et: f64, #[case] cc: u64, #[case] ec: f64) {
        let r = poisson_rate_test(ct, et, cc, ec).unwrap();
        assert_abs_diff_eq!(r.z_statistic, 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(r.p_value, 1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(r.rate_ratio, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn different_rates_are_significant() {
        let r = poisson_rate_test(200, 1_000.0, 100, 1_000.0).unwrap();
        assert_abs_diff_eq!(r.rate_ratio, 2.0, epsilon = 1e-12);
        // ln 2 / sqrt(1/200 + 1/100)
        assert_abs_diff_eq!(r.z_statistic, 5.659_523, epsilon = 1e-5);
        assert!(r.is_significant(0.05));
    }

    #[test]
    fn test_is_symmetric() {
        let a = poisson_rate_test(30, 100.0, 20, 100.0).unwrap();
        let b = poisson_rate_test(20, 100.0, 30, 100.0).unwrap();
        assert_abs_diff_eq!(a.z_statistic, b.z_statistic, epsilon = 1e-12);
        assert_abs_diff_eq!(a.p_value, b.p_value, epsilon = 1e-12);
    }

    #[test]
    fn zero_inputs_are_rejected() {
        assert_eq!(
            poisson_rate_test(0, 10.0, 1, 10.0),
            Err(MetricError::NonPositive {
                name: "count_test",
                value: 0.0
            })
        );
        assert!(poisson_rate_test(1, 0.0, 1, 10.0).is_err());
    }

    #[test]
    fn conversions_per_day() {
        let rows = vec![
            ConversionRow {
                date: "2024-01-01".into(),
                cum_test_regs: 0,
                cum_control_regs: 0,
                total_user_count: 100,
                total_control_user_count: 100,
            },
            ConversionRow {
                date: "2024-01-02".into(),
                cum_test_regs: 30,
                cum_control_regs: 20,
                total_user_count: 100,
                total_control_user_count: 100,
            },
        ];
        let out = compare_conversions(&rows);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].test_rate, Some(0.0));
        assert_eq!(out[0].uplift, None);
        assert_eq!(out[0].rate_test, None);

        assert_eq!(out[1].date, "2024-01-02");
        assert_abs_diff_eq!(out[1].uplift.unwrap(), 0.5, epsilon = 1e-12);
        assert!(out[1].rate_test.is_some());
    }

    #[test]
    fn conversion_rows_deserialize() {
        let row: ConversionRow = serde_json::from_str(
            r#"{"date":"2024-01-01","cum_test_regs":5,"cum_control_regs":3,
                "total_user_count":50,"total_control_user_count":40}"#,
        )
        .unwrap();
        assert_eq!(row.cum_test_regs, 5);
        assert_eq!(row.total_control_user_count, 40);
    }
}
