//! Table output for the CLI.

use crate::batch::BatchReport;
use crate::engine::{HealthReport, MatchView};
use crate::feedback::FeedbackRecord;
use crate::notify::DeliveryOutcome;
use comfy_table::{
    Attribute, Cell, CellAlignment, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL,
};

fn base_table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.apply_modifier(UTF8_ROUND_CORNERS);
    table.set_header(
        headers
            .iter()
            .map(|h| Cell::new(h).add_attribute(Attribute::Bold))
            .collect::<Vec<_>>(),
    );
    table
}

fn key_value_table(rows: Vec<(&str, String)>) -> String {
    let mut table = base_table(&["Metric", "Value"]);
    for (key, value) in rows {
        table.add_row(vec![
            Cell::new(key),
            Cell::new(value).set_alignment(CellAlignment::Right),
        ]);
    }
    table.to_string()
}

pub fn match_table(matches: &[MatchView]) -> String {
    let mut table = base_table(&["#", "Candidate", "Score", "Tier", "Why"]);
    for (rank, view) in matches.iter().enumerate() {
        table.add_row(vec![
            Cell::new(rank + 1),
            Cell::new(&view.candidate_id).fg(Color::Cyan),
            Cell::new(format!("{:.3}", view.score)).set_alignment(CellAlignment::Right),
            Cell::new(view.tier),
            Cell::new(&view.explanation),
        ]);
    }
    table.to_string()
}

pub fn batch_table(report: &BatchReport) -> String {
    let delivery = match &report.delivery {
        None => "not sent".to_string(),
        Some(DeliveryOutcome::Delivered { attempts }) => format!("delivered ({attempts} attempts)"),
        Some(DeliveryOutcome::Duplicate) => "already delivered".to_string(),
        Some(DeliveryOutcome::Failed(failure)) => format!("failed: {}", failure.reason),
    };
    key_value_table(vec![
        ("Batch", report.batch_id.to_string()),
        ("State", report.state.to_string()),
        ("Dirty users", report.dirty.len().to_string()),
        ("Skipped", report.skipped.len().to_string()),
        ("Vectors written", report.vectors_written.to_string()),
        ("Match records written", report.records_written.to_string()),
        ("Pairs reconciled", report.reconciled_pairs.to_string()),
        ("Pairs healed", report.healed.to_string()),
        ("Pairs announced", report.announced.len().to_string()),
        ("Flags cleared", report.cleared.len().to_string()),
        ("Notification", delivery),
        (
            "Elapsed (ms)",
            report.elapsed_ms().unwrap_or_default().to_string(),
        ),
    ])
}

pub fn health_table(health: &HealthReport) -> String {
    key_value_table(vec![
        ("Users", health.users.to_string()),
        ("Dirty", health.dirty.to_string()),
        ("Vectors", health.vectors.to_string()),
        ("Match records", health.match_records.to_string()),
        ("Ledger issues", health.ledger_issues.to_string()),
        ("Failed deliveries", health.failed_deliveries.to_string()),
        ("Cache hits (local)", health.cache.local_hits.to_string()),
        ("Cache hits (shared)", health.cache.shared_hits.to_string()),
        ("Cache misses", health.cache.misses.to_string()),
    ])
}

pub fn feedback_table(records: &[FeedbackRecord]) -> String {
    let mut table = base_table(&["When", "About", "Grade", "Step", "Moved", "Text"]);
    for record in records {
        let moved: Vec<String> = record.adjusted.iter().map(ToString::to_string).collect();
        table.add_row(vec![
            Cell::new(record.created_at.format("%Y-%m-%d %H:%M")),
            Cell::new(&record.subject_id),
            Cell::new(record.grade),
            Cell::new(format!("{:+.3}", record.step)).set_alignment(CellAlignment::Right),
            Cell::new(moved.join(", ")),
            Cell::new(&record.raw_text),
        ]);
    }
    table.to_string()
}
