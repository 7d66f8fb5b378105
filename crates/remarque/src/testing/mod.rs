//! Seeded synthetic user tables for tests and benchmarks.

use rand::prelude::*;

use crate::data::{Column, FeatureTable};

const BRANDS: [&str; 5] = ["Samsung", "Apple", "Xiaomi", "Google", "Motorola"];
const BRAND_WEIGHTS: [f64; 5] = [0.35, 0.3, 0.2, 0.1, 0.05];
const OS_VERSIONS: [&str; 4] = ["12", "13", "14", "17.2"];
const SOURCES: [&str; 3] = ["organic", "google-play", "web"];

/// Generate `rows` users with the usual audience features.
///
/// Columns: `user`, `brand`, `osv`, `src` (strings, `src` occasionally
/// missing), `n_sessions` and `days_since_install` (right-skewed integers).
pub fn synthetic_users(rows: usize, seed: u64) -> FeatureTable {
    let mut rng = StdRng::seed_from_u64(seed);

    let mut brand = Vec::with_capacity(rows);
    let mut osv = Vec::with_capacity(rows);
    let mut src = Vec::with_capacity(rows);
    let mut n_sessions = Vec::with_capacity(rows);
    let mut days_since_install = Vec::with_capacity(rows);

    for _ in 0..rows {
        brand.push(Some(weighted(&mut rng, &BRANDS, &BRAND_WEIGHTS).to_string()));
        osv.push(Some(OS_VERSIONS[rng.random_range(0..OS_VERSIONS.len())].to_string()));
        src.push(if rng.random_bool(0.05) {
            None
        } else {
            Some(SOURCES[rng.random_range(0..SOURCES.len())].to_string())
        });
        // Squaring a uniform skews towards small counts.
        let u: f64 = rng.random();
        n_sessions.push((u * u * 200.0) as i64 + 1);
        days_since_install.push(rng.random_range(0..720));
    }

    FeatureTable::new([
        ("user", Column::from_strs((0..rows).map(|i| format!("user-{i:06}")))),
        ("brand", Column::Str(brand)),
        ("osv", Column::Str(osv)),
        ("src", Column::Str(src)),
        ("n_sessions", Column::Int(n_sessions)),
        ("days_since_install", Column::Int(days_since_install)),
    ])
    .expect("synthetic columns have equal length")
}

/// Append `count` copies of randomly chosen rows of `table`.
pub fn with_duplicates(table: &FeatureTable, count: usize, seed: u64) -> FeatureTable {
    if table.is_empty() {
        return table.clone();
    }
    let mut rng = StdRng::seed_from_u64(seed);
    let mut rows: Vec<usize> = (0..table.n_rows()).collect();
    rows.extend((0..count).map(|_| rng.random_range(0..table.n_rows())));
    table.take(&rows)
}

fn weighted<'a, R: Rng>(rng: &mut R, values: &[&'a str], weights: &[f64]) -> &'a str {
    let total: f64 = weights.iter().sum();
    let mut x = rng.random::<f64>() * total;
    for (value, w) in values.iter().zip(weights) {
        if x < *w {
            return *value;
        }
        x -= w;
    }
    values[values.len() - 1]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthetic_users_are_deterministic() {
        let a = synthetic_users(50, 7);
        let b = synthetic_users(50, 7);
        assert_eq!(a, b);
        assert_ne!(a, synthetic_users(50, 8));
        assert_eq!(a.n_rows(), 50);
        assert_eq!(a.ids("user").unwrap()[3], "user-000003");
    }

    #[test]
    fn duplicates_are_appended() {
        let table = synthetic_users(10, 1);
        let dup = with_duplicates(&table, 5, 2);
        assert_eq!(dup.n_rows(), 15);
        let (dedup, removed) = dup.dedup_keep_last("user").unwrap();
        assert_eq!(dedup.n_rows(), 10);
        assert_eq!(removed, 5);
    }
}
