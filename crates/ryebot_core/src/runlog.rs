use std::env;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

pub const STEP_SUMMARY_VAR: &str = "GITHUB_STEP_SUMMARY";
pub const RUN_ID_VAR: &str = "GITHUB_RUN_ID";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditAction {
    Saved,
    Skipped,
    Failed,
}

impl EditAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Saved => "saved",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
        }
    }
}

/// One attempted edit, recorded whether it was committed, skipped by
/// dry-run, or rejected by the wiki.
#[derive(Debug, Clone)]
pub struct EditRecord {
    pub script: String,
    pub page: String,
    pub action: EditAction,
    pub summary: String,
    pub timestamp: DateTime<Utc>,
}

/// Per-run accumulator of edit records, in call order. Flushed once by the
/// dispatcher during finalization and discarded with the process.
#[derive(Debug)]
pub struct RunLog {
    script: String,
    records: Vec<EditRecord>,
}

impl RunLog {
    pub fn new(script: &str) -> Self {
        Self {
            script: script.to_string(),
            records: Vec::new(),
        }
    }

    pub fn record(&mut self, page: &str, action: EditAction, summary: &str) {
        self.records.push(EditRecord {
            script: self.script.clone(),
            page: page.to_string(),
            action,
            summary: summary.to_string(),
            timestamp: Utc::now(),
        });
    }

    pub fn records(&self) -> &[EditRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Markdown table of every record, for the CI step summary.
    pub fn render_markdown(&self) -> String {
        if self.records.is_empty() {
            return "No edit actions were performed.\n".to_string();
        }
        let mut out = String::from("| # | Page | Action | Summary | Time (UTC) |\n");
        out.push_str("|---|------|--------|---------|------------|\n");
        for (index, record) in self.records.iter().enumerate() {
            out.push_str(&format!(
                "| {} | {} | {} | {} | {} |\n",
                index + 1,
                record.page,
                record.action.as_str(),
                record.summary.replace('|', "\\|"),
                record.timestamp.format("%H:%M:%S"),
            ));
        }
        out
    }
}

/// Path of the CI step summary artifact, when the host provides one.
pub fn step_summary_path() -> Option<PathBuf> {
    env::var(STEP_SUMMARY_VAR)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .map(PathBuf::from)
}

/// The host may have other steps appending to the same file, so open in
/// append mode rather than truncating.
pub fn append_step_summary(path: &Path, markdown: &str) -> Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    file.write_all(markdown.as_bytes())
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::{EditAction, RunLog, append_step_summary};

    #[test]
    fn records_keep_call_order() {
        let mut log = RunLog::new("testscript");
        log.record("Alpha", EditAction::Skipped, "first");
        log.record("Beta", EditAction::Saved, "second");
        log.record("Alpha", EditAction::Failed, "third");

        let pages: Vec<&str> = log.records().iter().map(|r| r.page.as_str()).collect();
        assert_eq!(pages, vec!["Alpha", "Beta", "Alpha"]);
        assert_eq!(log.records()[0].script, "testscript");
        assert_eq!(log.len(), 3);
    }

    #[test]
    fn markdown_lists_one_row_per_record() {
        let mut log = RunLog::new("testscript");
        log.record("Sandbox", EditAction::Skipped, "testing »ID:77«");
        log.record("Sandbox/2", EditAction::Saved, "testing »ID:77«");

        let rendered = log.render_markdown();
        assert_eq!(rendered.matches("| testing").count(), 2);
        assert!(rendered.contains("| 1 | Sandbox | skipped |"));
        assert!(rendered.contains("| 2 | Sandbox/2 | saved |"));
    }

    #[test]
    fn markdown_for_empty_log_says_so() {
        let log = RunLog::new("testscript");
        assert!(log.render_markdown().contains("No edit actions"));
        assert!(log.is_empty());
    }

    #[test]
    fn step_summary_appends_instead_of_truncating() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("summary.md");
        fs::write(&path, "### earlier step\n").expect("seed file");

        append_step_summary(&path, "### All good.\n").expect("append");

        let content = fs::read_to_string(&path).expect("read back");
        assert!(content.starts_with("### earlier step\n"));
        assert!(content.ends_with("### All good.\n"));
    }
}
