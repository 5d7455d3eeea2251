//! Report Module
//!
//! 批处理结束时的汇总报告（人类可读的方框表，或 JSON）。

use crate::batch::BatchResult;
use crate::progress::{format_bytes, format_duration};
use serde::Serialize;
use std::time::Duration;

/// `--json` 输出的结构
#[derive(Debug, Serialize)]
pub struct BatchSummary<'a> {
    #[serde(flatten)]
    pub result: &'a BatchResult,
    pub duration_secs: f64,
    pub size_reduction_percent: f64,
    pub finished_at: chrono::DateTime<chrono::Local>,
}

impl<'a> BatchSummary<'a> {
    pub fn new(result: &'a BatchResult, duration: Duration) -> Self {
        Self {
            result,
            duration_secs: duration.as_secs_f64(),
            size_reduction_percent: size_reduction(result.input_bytes, result.output_bytes),
            finished_at: chrono::Local::now(),
        }
    }
}

pub fn size_reduction(input_bytes: u64, output_bytes: u64) -> f64 {
    if input_bytes > 0 {
        (1.0 - output_bytes as f64 / input_bytes as f64) * 100.0
    } else {
        0.0
    }
}

fn row(label: &str, value: impl std::fmt::Display) -> String {
    format!("║  {:<22}{:>14}{:>42}║", label, value, "")
}

pub fn render_summary_report(result: &BatchResult, duration: Duration, operation_name: &str) -> String {
    let rule = "═".repeat(78);
    let mut lines = vec![
        String::new(),
        format!("╔{}╗", rule),
        format!("║  📊 {:<72}║", format!("{} Summary Report", operation_name)),
        format!("╠{}╣", rule),
        row("📁 Files Processed:", result.total),
        row("🗜️  Compressed:", result.compressed),
        row("✅ Within Budget:", result.within_budget),
        row("📄 Passed Through:", result.passed_through),
        row("↩️  Fallback Copied:", result.fallback_copied),
        row("❌ Failed:", result.failed),
        row("⏭️  Skipped:", result.skipped),
        row("📈 Success Rate:", format!("{:.1}%", result.success_rate())),
        format!("╠{}╣", rule),
        row("💾 Input Size:", format_bytes(result.input_bytes)),
        row("💾 Output Size:", format_bytes(result.output_bytes)),
        row(
            "📉 Size Reduction:",
            format!("{:.1}%", size_reduction(result.input_bytes, result.output_bytes)),
        ),
        format!("╠{}╣", rule),
        row("⏱️  Total Time:", format_duration(duration)),
    ];
    if result.total > 0 {
        let avg = duration.as_secs_f64() / result.total as f64;
        lines.push(row("⏱️  Avg Time/File:", format!("{:.2}s", avg)));
    }
    lines.push(format!("╚{}╝", rule));

    if !result.errors.is_empty() {
        lines.push(String::new());
        lines.push("❌ Errors encountered:".to_string());
        lines.push("━".repeat(80));
        for (path, error) in &result.errors {
            lines.push(format!("   {} → {}", path.display(), error));
        }
    }
    lines.join("\n")
}

pub fn print_summary_report(result: &BatchResult, duration: Duration, operation_name: &str) {
    println!("{}", render_summary_report(result, duration, operation_name));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_size_reduction_formula() {
        assert!((size_reduction(1000, 500) - 50.0).abs() < 0.01);
        assert!((size_reduction(1000, 250) - 75.0).abs() < 0.01);
        assert!((size_reduction(1000, 1000)).abs() < 0.01);
        assert!((size_reduction(0, 0)).abs() < 0.01);
    }

    #[test]
    fn test_render_lists_counts_and_errors() {
        let mut result = BatchResult::new();
        result.compressed(4_000_000, 2_000_000);
        result.fail(PathBuf::from("broken.jpg"), "Decode failed: eof".to_string(), 10, 10);

        let text = render_summary_report(&result, Duration::from_secs(10), "Squeeze");
        assert!(text.contains("Squeeze Summary Report"));
        assert!(text.contains("broken.jpg → Decode failed: eof"));
        assert!(text.contains("50.0%"));
    }

    #[test]
    fn test_render_empty_batch() {
        let text = render_summary_report(&BatchResult::new(), Duration::from_secs(1), "Squeeze");
        assert!(!text.contains("Avg Time/File"));
        assert!(!text.contains("Errors encountered"));
    }

    #[test]
    fn test_summary_json_is_flat() {
        let mut result = BatchResult::new();
        result.within_budget(100);
        let json = serde_json::to_value(BatchSummary::new(&result, Duration::from_secs(2))).unwrap();
        assert_eq!(json["within_budget"], 1);
        assert_eq!(json["input_bytes"], 100);
        assert_eq!(json["duration_secs"], 2.0);
        assert!(json["finished_at"].is_string());
    }
}
