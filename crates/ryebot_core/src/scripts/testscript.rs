use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Result;
use serde_json::Value;
use tracing::info;

use crate::context::RunContext;
use crate::edit::{EditOutcome, perform_edit};
use crate::error::RyebotError;
use crate::script_config::ScriptConfig;

const DEFAULT_TARGET_PAGE: &str = "User:Rye Greenwood/Sandbox25";
const DEFAULT_LIMIT: u64 = 5;

/// Harmless end-to-end exercise of the whole pipeline: read the sandbox
/// page, append a pseudo-random digit, save through the guard, repeat.
pub fn script_main(ctx: &mut RunContext) -> Result<()> {
    info!("started testscript");

    let mut config = ScriptConfig::new(
        "testscript",
        &[
            ("limit", Value::from(DEFAULT_LIMIT)),
            ("targetpage", Value::from(DEFAULT_TARGET_PAGE)),
        ],
    );
    config.update_from_wiki(ctx)?;
    let limit = config.get_u64("limit").unwrap_or(DEFAULT_LIMIT);
    let target_page = config
        .get_str("targetpage")
        .unwrap_or(DEFAULT_TARGET_PAGE)
        .to_string();

    for iteration in 0..limit {
        let page = ctx.session()?.read(&target_page)?;
        let digit = pseudo_random_bit();
        let new_text = format!("{} {digit}", page.content);
        info!("loop iteration #{iteration}: adding number {digit}");
        if let EditOutcome::Failed { reason } = perform_edit(ctx, &target_page, &new_text, "testing")? {
            return Err(RyebotError::ScriptRuntime {
                script: "testscript".to_string(),
                reason,
            }
            .into());
        }
    }

    Ok(())
}

fn pseudo_random_bit() -> u8 {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.subsec_nanos())
        .unwrap_or(0);
    (nanos % 2) as u8
}
