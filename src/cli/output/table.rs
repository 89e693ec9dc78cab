//! Table output for traces and ledgers using comfy-table.

use comfy_table::{presets, Attribute, Cell, Color, ContentArrangement, Table};
use std::env;

use crate::domain::models::{FrozenLedger, InvestigativeQuestion, RunTrace, TerminationReason};

use super::truncate;

/// Renders traces and ledgers as tables.
pub struct TableFormatter {
    use_colors: bool,
}

impl TableFormatter {
    /// Formatter with colours unless `NO_COLOR` is set or the terminal is dumb.
    pub fn new() -> Self {
        Self {
            use_colors: supports_color(),
        }
    }

    /// Formatter with colours forced on or off.
    pub fn with_colors(use_colors: bool) -> Self {
        Self { use_colors }
    }

    /// One row per trace.
    pub fn format_traces(&self, traces: &[RunTrace]) -> String {
        let mut table = base_table();
        table.set_header(header(&["Article", "Termination", "Iterations", "Records", "Verdict", "Report"]));

        for trace in traces {
            let verdict = match trace.final_verdict() {
                Some(true) => "sufficient",
                Some(false) => "insufficient",
                None => "-",
            };
            let report = trace
                .report
                .as_ref()
                .map_or_else(|| "-".to_string(), |r| format!("{} words", r.word_count()));
            table.add_row(vec![
                Cell::new(truncate(&trace.article_id, 40)),
                self.termination_cell(&trace.termination),
                Cell::new(trace.iterations),
                Cell::new(trace.ledger.len()),
                Cell::new(verdict),
                Cell::new(report),
            ]);
        }
        table.to_string()
    }

    /// One row per ledger record, in ledger order.
    pub fn format_ledger(&self, ledger: &FrozenLedger) -> String {
        let mut table = base_table();
        table.set_header(header(&["Query", "Iter", "Text", "Candidates", "Selected"]));

        for record in ledger.records() {
            let selected = if let Some(error) = &record.error {
                let cell = Cell::new(format!("failed: {}", truncate(error, 40)));
                if self.use_colors {
                    cell.fg(Color::Red)
                } else {
                    cell
                }
            } else if record.selected.is_empty() {
                Cell::new("-")
            } else {
                Cell::new(record.selected_ids().collect::<Vec<_>>().join("\n"))
            };
            table.add_row(vec![
                Cell::new(record.query.id),
                Cell::new(record.query.iteration),
                Cell::new(truncate(&record.query.text, 60)),
                Cell::new(record.candidates.len()),
                selected,
            ]);
        }
        table.to_string()
    }

    /// Ranked question list.
    pub fn format_questions(&self, questions: &[InvestigativeQuestion]) -> String {
        let mut table = base_table();
        table.set_header(header(&["#", "Question"]));
        for question in questions {
            table.add_row(vec![Cell::new(question.rank), Cell::new(&question.text)]);
        }
        table.to_string()
    }

    fn termination_cell(&self, termination: &TerminationReason) -> Cell {
        let cell = Cell::new(termination.label());
        if !self.use_colors {
            return cell;
        }
        match termination {
            TerminationReason::Sufficient => cell.fg(Color::Green),
            TerminationReason::MaxIterations | TerminationReason::GeneratorExhausted => cell.fg(Color::Yellow),
            TerminationReason::BudgetExceeded(_) => cell.fg(Color::Cyan),
            TerminationReason::Fatal(_) => cell.fg(Color::Red).add_attribute(Attribute::Bold),
        }
    }
}

impl Default for TableFormatter {
    fn default() -> Self {
        Self::new()
    }
}

fn base_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

fn header(names: &[&str]) -> Vec<Cell> {
    names
        .iter()
        .map(|name| Cell::new(name).add_attribute(Attribute::Bold))
        .collect()
}

fn supports_color() -> bool {
    if env::var("NO_COLOR").is_ok() {
        return false;
    }
    !matches!(env::var("TERM").as_deref(), Ok("dumb"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{EvidenceRecord, Ledger, Provenance, Query, QueryId};

    fn ledger() -> FrozenLedger {
        let mut ledger = Ledger::new("article");
        let query = |id: u32, text: &str| Query {
            id: QueryId(id),
            text: text.to_string(),
            rationale: String::new(),
            iteration: 1,
            provenance: Provenance::Initial,
        };
        ledger
            .append_batch(vec![
                EvidenceRecord::new(query(1, "who funds the outlet"), vec![], vec![], None),
                EvidenceRecord::failed(query(2, "timeline of events"), "index unavailable"),
            ])
            .unwrap();
        ledger.freeze()
    }

    #[test]
    fn test_ledger_table_lists_each_record() {
        let rendered = TableFormatter::with_colors(false).format_ledger(&ledger());
        assert!(rendered.contains("query_1"));
        assert!(rendered.contains("query_2"));
        assert!(rendered.contains("failed: index unavailable"));
    }
}
