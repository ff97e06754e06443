//! The weekly overweight query.

use crate::config::WarehouseConfig;

/// Quote an identifier for Snowflake, doubling embedded quotes.
fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Quote a string literal for Snowflake.
fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Build the weekly product-weight aggregation.
///
/// Columns, in order: `week_start` (`YYYY-MM-DD`), `product`,
/// `avg_overweight`, `avg_value`, `avg_target`, `sample_count`. Rows are
/// ordered by product, then week, which the aggregator relies on.
pub fn overweight_query(config: &WarehouseConfig) -> String {
    let schema = format!(
        "{}.{}",
        quote_ident(&config.database),
        quote_ident(&config.schema)
    );
    let weeks = config.lookback_weeks;
    let pattern = quote_literal(&config.characteristic_pattern);

    format!(
        r#"SELECT
    TO_CHAR(DATE_TRUNC('week', s."completeTime")::DATE, 'YYYY-MM-DD') AS week_start,
    d."productName" || ' (' || d."productSku" || ')'                  AS product,
    ROUND(AVG(s."value" - s."thresholdTarget"), 2)                    AS avg_overweight,
    ROUND(AVG(s."value"), 2)                                          AS avg_value,
    ROUND(AVG(s."thresholdTarget"), 2)                                AS avg_target,
    COUNT(*)                                                          AS sample_count
FROM {schema}."v_spcsample" s
JOIN {schema}."v_completeddataitem" d
    ON s."runUUID" = d."runUUID"
    AND s."characteristicUUID" = d."characteristicUUID"
    AND d."completeTime" >= DATEADD(week, -{weeks}, CURRENT_DATE)
    AND d."void" = false
    AND d."productName" IS NOT NULL
    AND d."productSku" IS NOT NULL
WHERE
    s."completeTime" >= DATEADD(week, -{weeks}, CURRENT_DATE)
    AND s."characteristicName" ILIKE {pattern}
    AND s."thresholdTarget" IS NOT NULL
    AND s."deleted" = false
GROUP BY 1, 2
ORDER BY 2, 1"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_uses_configured_schema_and_window() {
        let config = WarehouseConfig {
            database: "METRICS_DB".to_string(),
            schema: "plant-one".to_string(),
            lookback_weeks: 12,
            ..Default::default()
        };

        let sql = overweight_query(&config);

        assert!(sql.contains(r#"FROM "METRICS_DB"."plant-one"."v_spcsample" s"#));
        assert!(sql.contains(r#"JOIN "METRICS_DB"."plant-one"."v_completeddataitem" d"#));
        assert!(sql.contains("DATEADD(week, -12, CURRENT_DATE)"));
        assert!(sql.contains("ILIKE '%Product Weight%'"));
        assert!(sql.trim_end().ends_with("ORDER BY 2, 1"));
    }

    #[test]
    fn test_identifiers_and_literals_are_escaped() {
        let config = WarehouseConfig {
            schema: "we\"ird".to_string(),
            characteristic_pattern: "%Net Wt'%".to_string(),
            ..Default::default()
        };

        let sql = overweight_query(&config);

        assert!(sql.contains(r#""we""ird""#));
        assert!(sql.contains("ILIKE '%Net Wt''%'"));
    }
}
