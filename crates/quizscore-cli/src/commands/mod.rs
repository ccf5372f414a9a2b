pub mod batch;
pub mod init;
pub mod score;
pub mod show;
pub mod validate;

use comfy_table::{Cell, Table};
use quizscore_core::report::ScoringRecord;

/// Render a record for the terminal: summary line, per-scale table and
/// band interpretations.
pub fn render_record(record: &ScoringRecord) -> String {
    let result = &record.result;
    let mut out = String::new();

    let source = match &result.matched_rule {
        Some(rule) => match &rule.id {
            Some(id) => format!("rule '{id}'"),
            None => format!("rule #{}", rule.index),
        },
        None => "default result".to_string(),
    };
    out.push_str(&format!("Result: {} ({source})\n", result.summary_type));
    if !result.summary.is_empty() {
        out.push_str(&format!("{}\n", result.summary));
    }
    out.push_str(&format!(
        "Session: {}  Test: {} v{}\n",
        record.session_id, record.test_id, record.test_version
    ));

    let mut table = Table::new();
    table.set_header(vec!["Scale", "Raw", "Clamped", "Band"]);
    for s in &result.scales {
        table.add_row(vec![
            Cell::new(&s.name),
            Cell::new(s.raw),
            Cell::new(s.clamped),
            Cell::new(s.label().unwrap_or("-")),
        ]);
    }
    out.push_str(&format!("\n{table}\n"));

    for s in &result.scales {
        if let Some(text) = s.band.as_ref().and_then(|b| b.interpretation.as_ref()) {
            out.push_str(&format!("  {}: {text}\n", s.name));
        }
    }

    out
}
