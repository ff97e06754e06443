//! Grouping of raw warehouse rows into per-product series.

use crate::{AggregateError, MetricSample, ProductSeries, WeeklyPoint};

/// Group raw rows by trimmed product key.
///
/// Rows are appended to their group in input order; the source query already
/// sorts by `(product, week)` and nothing here re-sorts. Null averages become
/// `0.0`. The only failure is a row without a product key, which cannot be
/// placed in any group.
pub fn aggregate(rows: &[MetricSample]) -> Result<ProductSeries, AggregateError> {
    let mut series = ProductSeries::new();

    for (row, sample) in rows.iter().enumerate() {
        let key = sample
            .product_key
            .as_deref()
            .ok_or(AggregateError::MissingProductKey { row })?
            .trim();

        let point = WeeklyPoint {
            week_start: sample.week_start,
            avg_overweight: sample.avg_overweight.unwrap_or(0.0),
            avg_value: sample.avg_value.unwrap_or(0.0),
            avg_target: sample.avg_target.unwrap_or(0.0),
            sample_count: sample.sample_count,
        };

        series.entry(key.to_string()).or_default().push(point);
    }

    Ok(series)
}
