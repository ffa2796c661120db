//! Report rendering for aggregated results.
//!
//! Produces the pretty JSON summary and a side-by-side Markdown table with
//! one column per engine.

use super::AggregateStats;
use crate::result::BenchResult;

/// Serialize a summary to pretty-printed JSON.
pub fn summary_json(stats: &AggregateStats) -> BenchResult<String> {
    Ok(serde_json::to_string_pretty(stats)?)
}

/// `part` as a percentage of `whole`, one decimal place.
#[must_use]
pub fn perc(part: u64, whole: u64) -> String {
    if whole == 0 {
        return "-".to_string();
    }
    format!("{:.1}%", part as f64 * 100.0 / whole as f64)
}

/// Render rows as a Markdown table. The first row is the header.
///
/// Cells are padded to the column width; the first column is left-aligned
/// and the others right-aligned, in the text and in the separator row.
#[must_use]
pub fn markdown_table(rows: &[Vec<String>]) -> String {
    let columns = rows.iter().map(Vec::len).max().unwrap_or(0);
    if columns == 0 {
        return String::new();
    }
    let mut widths = vec![0usize; columns];
    for row in rows {
        for (j, cell) in row.iter().enumerate() {
            widths[j] = widths[j].max(cell.chars().count());
        }
    }

    let mut lines = Vec::with_capacity(rows.len() + 1);
    for (i, row) in rows.iter().enumerate() {
        let cells: Vec<String> = widths
            .iter()
            .enumerate()
            .map(|(j, &w)| {
                let cell = row.get(j).map_or("", String::as_str);
                if j == 0 {
                    format!("{cell:<w$}")
                } else {
                    format!("{cell:>w$}")
                }
            })
            .collect();
        lines.push(format!("| {} |", cells.join(" | ")));
        if i == 0 {
            let separator: Vec<String> = widths
                .iter()
                .enumerate()
                .map(|(j, &w)| {
                    if j == 0 {
                        format!(":{}", "-".repeat(w + 1))
                    } else {
                        format!("{}:", "-".repeat(w + 1))
                    }
                })
                .collect();
            lines.push(format!("|{}|", separator.join("|")));
        }
    }
    let mut table = lines.join("\n");
    table.push('\n');
    table
}

type Metric = (&'static str, fn(&AggregateStats) -> String);

const METRICS: &[Metric] = &[
    ("schemas", |s| s.num_schemas.to_string()),
    ("passing", |s| perc(s.num_schemas_ok, s.num_schemas)),
    ("compile errors", |s| perc(s.num_compile_errors, s.num_schemas)),
    ("validation errors", |s| perc(s.num_validation_errors, s.num_schemas)),
    ("false accepts", |s| s.num_false_accepts.to_string()),
    ("false rejects", |s| s.num_false_rejects.to_string()),
    ("crashes", |s| s.num_crashes.to_string()),
    ("tests", |s| s.num_tests.to_string()),
    ("tokens/test", |s| format!("{:.1}", s.avg_tokens_per_test)),
    ("TTFM avg (us)", |s| format!("{:.0}", s.avg_ttfm_us)),
    ("TTFM p50 (us)", |s| s.ttfm.p50.to_string()),
    ("TTFM p95 (us)", |s| s.ttfm.p95.to_string()),
    ("TTFM p99 (us)", |s| s.ttfm.p99.to_string()),
    ("TTFM max (us)", |s| s.max_ttfm_us.to_string()),
    ("mask avg (us)", |s| format!("{:.1}", s.avg_mask_us)),
    ("mask p50 (us)", |s| s.mask.p50.to_string()),
    ("mask p99 (us)", |s| s.mask.p99.to_string()),
    ("mask p99.9 (us)", |s| s.mask.p999.to_string()),
    ("mask max (us)", |s| s.max_mask_us.to_string()),
];

/// Side-by-side comparison, one column per engine.
#[must_use]
pub fn comparison_table(engines: &[AggregateStats]) -> String {
    let mut header = vec!["metric".to_string()];
    header.extend(engines.iter().map(|s| s.engine.clone()));
    let mut rows = vec![header];
    for (label, render) in METRICS {
        let mut row = vec![(*label).to_string()];
        row.extend(engines.iter().map(render));
        rows.push(row);
    }
    markdown_table(&rows)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn row(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|c| (*c).to_string()).collect()
    }

    #[test]
    fn test_markdown_alignment() {
        let table = markdown_table(&[row(&["name", "n"]), row(&["a", "100"])]);
        assert_eq!(
            table,
            "| name |   n |\n|:-----|----:|\n| a    | 100 |\n"
        );
    }

    #[test]
    fn test_markdown_short_rows_padded() {
        let table = markdown_table(&[row(&["k", "v1", "v2"]), row(&["x"])]);
        let last = table.lines().last().unwrap();
        assert_eq!(last, "| x |    |    |");
    }

    #[test]
    fn test_markdown_empty() {
        assert_eq!(markdown_table(&[]), "");
    }

    #[test]
    fn test_perc() {
        assert_eq!(perc(1, 3), "33.3%");
        assert_eq!(perc(0, 0), "-");
    }

    #[test]
    fn test_comparison_table_columns() {
        let a = AggregateStats {
            engine: "interpreter".to_string(),
            num_schemas: 4,
            num_schemas_ok: 3,
            ..AggregateStats::default()
        };
        let b = AggregateStats {
            engine: "unconstrained".to_string(),
            num_schemas: 4,
            num_validation_errors: 4,
            ..AggregateStats::default()
        };
        let table = comparison_table(&[a, b]);
        let lines: Vec<&str> = table.lines().collect();
        assert!(lines[0].contains("interpreter"));
        assert!(lines[0].contains("unconstrained"));
        assert!(lines[1].starts_with("|:"));
        assert_eq!(lines.len(), METRICS.len() + 2);
        let passing = lines.iter().find(|l| l.starts_with("| passing")).unwrap();
        assert!(passing.contains("75.0%"));
        assert!(passing.contains("0.0%"));
    }

    #[test]
    fn test_summary_json_fields() {
        let json = summary_json(&AggregateStats::default()).unwrap();
        assert!(json.contains("\"num_false_accepts\": 0"));
        assert!(json.contains("\"p99.9\": 0"));
    }
}
