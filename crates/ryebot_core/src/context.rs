use anyhow::Result;

use crate::credentials::Credentials;
use crate::runlog::RunLog;
use crate::session::{Session, SessionManager};

/// MediaWiki truncates edit summaries beyond this many characters.
const SUMMARY_HARD_LIMIT: usize = 500;

/// Everything a script gets to work with for one invocation: the shared
/// session, the dry-run and CI flags, the summary suffix, and the run log.
/// Built once by the dispatcher and passed down by reference.
pub struct RunContext {
    script: &'static str,
    dry_run: bool,
    ci_mode: bool,
    run_id: Option<String>,
    summary_suffix: String,
    credentials: Credentials,
    sessions: SessionManager,
    pub log: RunLog,
}

impl RunContext {
    pub fn new(
        script: &'static str,
        credentials: Credentials,
        sessions: SessionManager,
        dry_run: bool,
        ci_mode: bool,
        run_id: Option<String>,
    ) -> Self {
        let summary_suffix = match (ci_mode, &run_id) {
            (true, Some(id)) => format!("  »ID:{id}«"),
            _ => String::new(),
        };
        Self {
            script,
            dry_run,
            ci_mode,
            run_id,
            summary_suffix,
            credentials,
            sessions,
            log: RunLog::new(script),
        }
    }

    pub fn script(&self) -> &'static str {
        self.script
    }

    pub fn dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn ci_mode(&self) -> bool {
        self.ci_mode
    }

    pub fn run_id(&self) -> Option<&str> {
        self.run_id.as_deref()
    }

    /// The shared wiki session, authenticated on first use.
    pub fn session(&mut self) -> Result<&mut Session> {
        self.sessions.session(&self.credentials)
    }

    /// Full edit summary for this run: the core text plus the traceability
    /// suffix, kept within the wiki's length limit.
    pub fn edit_summary(&self, core_text: &str) -> String {
        build_summary(core_text, &self.summary_suffix)
    }
}

/// Append the suffix, truncating the core text if necessary. When the
/// suffix leaves fewer than 4 characters of room the core text is passed
/// through untouched and the wiki truncates the result itself.
fn build_summary(core_text: &str, suffix: &str) -> String {
    let suffix_len = suffix.chars().count();
    let core_limit = SUMMARY_HARD_LIMIT.saturating_sub(suffix_len);
    if core_limit >= 4 && core_text.chars().count() > core_limit {
        let truncated: String = core_text.chars().take(core_limit - 3).collect();
        return format!("{truncated}...{suffix}");
    }
    format!("{core_text}{suffix}")
}

#[cfg(test)]
mod tests {
    use super::{SUMMARY_HARD_LIMIT, build_summary};
    use crate::credentials::Credentials;
    use crate::testutil::{ApiState, manager_with_state, shared_state};

    #[test]
    fn short_summary_gets_the_suffix_appended() {
        assert_eq!(
            build_summary("testing", "  »ID:1234«"),
            "testing  »ID:1234«"
        );
        assert_eq!(build_summary("testing", ""), "testing");
    }

    #[test]
    fn long_summary_is_truncated_so_the_suffix_survives() {
        let suffix = "  »ID:1234«";
        let core = "x".repeat(600);
        let summary = build_summary(&core, suffix);
        assert!(summary.ends_with(suffix));
        assert!(summary.contains("..."));
        assert_eq!(summary.chars().count(), SUMMARY_HARD_LIMIT);
    }

    #[test]
    fn oversized_suffix_leaves_the_core_text_alone() {
        let suffix = "y".repeat(SUMMARY_HARD_LIMIT - 2);
        let core = "x".repeat(50);
        let summary = build_summary(&core, &suffix);
        assert!(summary.starts_with(&core));
        assert!(summary.ends_with(&suffix));
    }

    #[test]
    fn context_outside_ci_mode_has_no_suffix() {
        let state = shared_state(ApiState::default());
        let ctx = super::RunContext::new(
            "testscript",
            Credentials::for_tests("Ryebot@flask", "hunter2"),
            manager_with_state("terraria", &state),
            true,
            false,
            Some("999".to_string()),
        );
        assert_eq!(ctx.edit_summary("testing"), "testing");
        assert!(ctx.dry_run());
        assert!(!ctx.ci_mode());
    }

    #[test]
    fn ci_context_appends_the_run_id_exactly_once() {
        let state = shared_state(ApiState::default());
        let ctx = super::RunContext::new(
            "testscript",
            Credentials::for_tests("Ryebot@flask", "hunter2"),
            manager_with_state("terraria", &state),
            false,
            true,
            Some("4242".to_string()),
        );
        let summary = ctx.edit_summary("testing");
        assert_eq!(summary, "testing  »ID:4242«");
        assert_eq!(summary.matches("»ID:4242«").count(), 1);
        assert_eq!(ctx.run_id(), Some("4242"));
    }
}
