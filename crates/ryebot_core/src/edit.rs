use std::time::Instant;

use anyhow::Result;
use similar::{ChangeTag, TextDiff};
use tracing::{info, warn};

use crate::context::RunContext;
use crate::error::RyebotError;
use crate::runlog::EditAction;

/// Outcome of one guarded edit attempt. A dry-run skip is a success-like
/// outcome, not an error; a rejected write is reported here so the script
/// can decide whether to retry or move on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditOutcome {
    Committed { revision_id: Option<u64> },
    Skipped,
    Failed { reason: String },
}

impl EditOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, Self::Committed { .. })
    }
}

/// The single write chokepoint. Every script-initiated edit goes through
/// here: in dry-run mode the wiki is never touched and the would-be change
/// is logged instead; otherwise the edit is submitted and a rejection comes
/// back as `EditOutcome::Failed` rather than a crash. Each call appends one
/// record to the run log.
pub fn perform_edit(
    ctx: &mut RunContext,
    page: &str,
    new_content: &str,
    summary_core: &str,
) -> Result<EditOutcome> {
    let summary = ctx.edit_summary(summary_core);

    if ctx.dry_run() {
        let current = ctx.session()?.read(page)?;
        let old_chars = current.content.chars().count() as i64;
        let new_chars = new_content.chars().count() as i64;
        let diff = TextDiff::from_lines(current.content.as_str(), new_content);
        let (inserted, deleted) =
            diff.iter_all_changes()
                .fold((0usize, 0usize), |(ins, del), change| match change.tag() {
                    ChangeTag::Insert => (ins + 1, del),
                    ChangeTag::Delete => (ins, del + 1),
                    ChangeTag::Equal => (ins, del),
                });
        let unified = diff.unified_diff().context_radius(1).to_string();
        info!(
            "would save page \"{page}\" ({new_chars} characters, {:+} diff, \
             +{inserted}/-{deleted} lines) with summary \"{summary}\"\n{unified}",
            new_chars - old_chars
        );
        ctx.log.record(page, EditAction::Skipped, &summary);
        return Ok(EditOutcome::Skipped);
    }

    let started = Instant::now();
    match ctx.session()?.write(page, new_content, &summary) {
        Ok(receipt) => {
            if receipt.no_change {
                info!("page \"{page}\" already had the target content, nothing saved");
            } else {
                info!(
                    "saved page \"{page}\" with summary \"{summary}\". Revision: {}. Time: {:.2?}",
                    receipt
                        .revision_id
                        .map(|id| id.to_string())
                        .unwrap_or_else(|| "n/a".to_string()),
                    started.elapsed()
                );
            }
            ctx.log.record(page, EditAction::Saved, &summary);
            Ok(EditOutcome::Committed {
                revision_id: receipt.revision_id,
            })
        }
        Err(error) => {
            if let Some(RyebotError::WriteFailed { reason, .. }) =
                error.downcast_ref::<RyebotError>()
            {
                warn!("did not save page \"{page}\": {reason}");
                ctx.log.record(page, EditAction::Failed, &summary);
                Ok(EditOutcome::Failed {
                    reason: reason.clone(),
                })
            } else {
                Err(error)
            }
        }
    }
}
