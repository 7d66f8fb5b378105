//! Balance report and conversion rate checks on hand-built groups.

use approx::assert_abs_diff_eq;
use remarque::metrics::{compare_conversions, ks_diff_report, ConversionRow};
use remarque::{
    get_split_metrics, poisson_rate_test, Column, FeatureMetrics, FeatureTable, MetricThresholds,
    Partition,
};

fn skewed() -> FeatureTable {
    FeatureTable::new([
        ("user", Column::from_strs(["u1", "u2", "u3", "u4", "u5"])),
        ("brand", Column::from_strs(["S", "S", "X", "X", "X"])),
        ("n_sessions", Column::Int(vec![1, 2, 40, 50, 60])),
    ])
    .unwrap()
}

fn skewed_partition() -> Partition {
    Partition {
        test: vec![0, 1],
        control: vec![2, 3, 4],
    }
}

#[test]
fn disjoint_categories_raise_several_warnings() {
    let report = get_split_metrics(
        &skewed(),
        &skewed_partition(),
        &["n_sessions"],
        &["brand"],
        &MetricThresholds::default(),
    )
    .unwrap();

    let brand = &report["brand"];
    assert!(brand.warnings().len() > 1, "{:?}", brand.warnings());
    let FeatureMetrics::Categorical(brand) = brand else {
        panic!("brand is categorical");
    };
    assert_abs_diff_eq!(brand.max_proportion_diff.unwrap(), 1.0, epsilon = 1e-12);
    assert_abs_diff_eq!(brand.js_divergence.unwrap(), std::f64::consts::LN_2, epsilon = 1e-9);

    let sessions = &report["n_sessions"];
    assert!(sessions.warnings().contains_key("mean_ratio"));
    assert!(!sessions.is_balanced());
}

#[test]
fn identical_groups_are_balanced() {
    let table = FeatureTable::new([
        ("user", Column::from_strs(["a", "b", "c", "d"])),
        ("brand", Column::from_strs(["S", "X", "S", "X"])),
        ("n_sessions", Column::Int(vec![3, 9, 3, 9])),
    ])
    .unwrap();
    let partition = Partition {
        test: vec![0, 1],
        control: vec![2, 3],
    };
    let report = get_split_metrics(
        &table,
        &partition,
        &["n_sessions"],
        &["brand"],
        &MetricThresholds::default(),
    )
    .unwrap();
    for (feature, metrics) in &report {
        assert!(metrics.is_balanced(), "{feature}: {:?}", metrics.warnings());
    }
}

#[test]
fn ks_report_runs_every_alternative() {
    let report = ks_diff_report(&skewed(), &skewed_partition(), &["n_sessions"]).unwrap();
    assert_eq!(report.len(), 1);
    let diff = &report[0];
    assert_eq!(diff.feature, "n_sessions");
    // Every test value lies below every control value.
    assert_abs_diff_eq!(diff.two_sided.unwrap().statistic, 1.0, epsilon = 1e-12);
    assert_abs_diff_eq!(diff.greater.unwrap().statistic, 1.0, epsilon = 1e-12);
    assert_abs_diff_eq!(diff.less.unwrap().statistic, 0.0, epsilon = 1e-12);
}

#[test]
fn missing_column_is_an_error() {
    let err = get_split_metrics(
        &skewed(),
        &skewed_partition(),
        &["no_such_column"],
        &[] as &[&str],
        &MetricThresholds::default(),
    );
    assert!(err.is_err());
}

#[test]
fn equal_rates_are_not_significant() {
    let r = poisson_rate_test(50, 1_000.0, 100, 2_000.0).unwrap();
    assert_abs_diff_eq!(r.rate_ratio, 1.0, epsilon = 1e-12);
    assert!(!r.is_significant(0.05));
}

#[test]
fn conversion_report_flags_uplift() {
    let rows = [
        ConversionRow {
            date: "2024-03-01".into(),
            cum_test_regs: 10,
            cum_control_regs: 10,
            total_user_count: 1_000,
            total_control_user_count: 1_000,
        },
        ConversionRow {
            date: "2024-03-02".into(),
            cum_test_regs: 240,
            cum_control_regs: 120,
            total_user_count: 1_000,
            total_control_user_count: 1_000,
        },
    ];
    let out = compare_conversions(&rows);
    assert!(!out[0].rate_test.unwrap().is_significant(0.05));
    assert_abs_diff_eq!(out[1].uplift.unwrap(), 1.0, epsilon = 1e-12);
    assert!(out[1].rate_test.unwrap().is_significant(0.05));
}
