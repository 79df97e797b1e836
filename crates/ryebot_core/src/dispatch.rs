use std::env;
use std::path::Path;

use anyhow::Result;
use tracing::{error, info, warn};

use crate::config;
use crate::context::RunContext;
use crate::credentials::Credentials;
use crate::error::RyebotError;
use crate::runlog::{self, RUN_ID_VAR, STEP_SUMMARY_VAR};
use crate::scripts;
use crate::session::SessionManager;

pub const CONFIG_FILENAME: &str = "ryebot.toml";

/// One registered script: unique name, help text, entry point.
pub struct ScriptDescriptor {
    pub name: &'static str,
    pub about: &'static str,
    pub entry: fn(&mut RunContext) -> Result<()>,
}

/// Process exit statuses. The numeric mapping is part of the CLI contract
/// and documented in the README; `2` is also what clap exits with on a
/// malformed command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Success,
    Fatal,
    UsageError,
    UnknownScript,
    ScriptError,
}

impl ExitStatus {
    pub fn code(self) -> u8 {
        match self {
            Self::Success => 0,
            Self::Fatal => 1,
            Self::UsageError => 2,
            Self::UnknownScript => 3,
            Self::ScriptError => 4,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub script: String,
    pub dry_run: bool,
    pub ci_mode: bool,
    pub verbose: bool,
}

/// All registered scripts in stable alphabetical order, for help output.
pub fn list_scripts() -> &'static [ScriptDescriptor] {
    scripts::REGISTRY
}

pub fn find_script(name: &str) -> Option<&'static ScriptDescriptor> {
    list_scripts()
        .iter()
        .find(|descriptor| descriptor.name == name)
}

/// Top-level entry: resolve startup state from the process environment,
/// then dispatch. Exactly one script per invocation, no retries here.
pub fn run(options: &RunOptions) -> ExitStatus {
    if find_script(&options.script).is_none() {
        return report_unknown_script(&options.script);
    }

    let config = match config::load_config(Path::new(CONFIG_FILENAME)) {
        Ok(config) => config,
        Err(error) => {
            error!("{error:#}");
            return ExitStatus::Fatal;
        }
    };
    let credentials = match Credentials::resolve() {
        Ok(credentials) => credentials,
        Err(error) => {
            error!("{error}");
            write_failure_artifact(options.ci_mode, &error.to_string());
            return ExitStatus::Fatal;
        }
    };
    let run_id = if options.ci_mode {
        env::var(RUN_ID_VAR).ok()
    } else {
        None
    };

    execute(options, credentials, SessionManager::new(&config), run_id)
}

/// Dispatch with the collaborators already built; `run` wires the real
/// ones, tests substitute fakes.
pub(crate) fn execute(
    options: &RunOptions,
    credentials: Credentials,
    sessions: SessionManager,
    run_id: Option<String>,
) -> ExitStatus {
    let Some(descriptor) = find_script(&options.script) else {
        return report_unknown_script(&options.script);
    };

    let mut ctx = RunContext::new(
        descriptor.name,
        credentials,
        sessions,
        options.dry_run,
        options.ci_mode,
        run_id,
    );
    if ctx.dry_run() {
        info!("dry-run mode is active: no changes to any wiki pages will be made");
    }

    // Establish the session before the script body runs, so credential and
    // connectivity problems abort up front instead of mid-script.
    let status = match ctx.session().map(|_| ()) {
        Err(error) => {
            log_run_error(options.verbose, descriptor.name, &error);
            ExitStatus::Fatal
        }
        Ok(()) => match (descriptor.entry)(&mut ctx) {
            Ok(()) => {
                info!("script \"{}\" completed successfully", descriptor.name);
                ExitStatus::Success
            }
            Err(error) => {
                log_run_error(options.verbose, descriptor.name, &error);
                classify_script_error(&error)
            }
        },
    };

    finalize(&ctx, status);
    status
}

fn classify_script_error(error: &anyhow::Error) -> ExitStatus {
    match error.downcast_ref::<RyebotError>() {
        Some(RyebotError::Authentication { .. }) | Some(RyebotError::MissingCredentials(_)) => {
            ExitStatus::Fatal
        }
        _ => ExitStatus::ScriptError,
    }
}

fn log_run_error(verbose: bool, script: &str, error: &anyhow::Error) {
    if verbose {
        error!("script \"{script}\" failed: {error:?}");
    } else {
        error!("script \"{script}\" failed: {error:#}");
    }
}

fn report_unknown_script(name: &str) -> ExitStatus {
    let error = RyebotError::UnknownScript {
        name: name.to_string(),
    };
    let available = list_scripts()
        .iter()
        .map(|descriptor| descriptor.name)
        .collect::<Vec<_>>()
        .join(", ");
    error!("{error}; available scripts: {available}");
    ExitStatus::UnknownScript
}

/// The one mandatory cleanup step: runs whatever branch execution took.
fn finalize(ctx: &RunContext, status: ExitStatus) {
    info!(
        "run finished with {} edit action(s) recorded",
        ctx.log.len()
    );
    if !ctx.ci_mode() {
        return;
    }
    let Some(path) = runlog::step_summary_path() else {
        warn!("{STEP_SUMMARY_VAR} is not set; skipping the run summary artifact");
        return;
    };
    if let Err(error) = runlog::append_step_summary(&path, &artifact_markdown(ctx, status)) {
        warn!("failed to write the run summary artifact: {error:#}");
    }
}

fn artifact_markdown(ctx: &RunContext, status: ExitStatus) -> String {
    let heading = match status {
        ExitStatus::Success => "### All good.",
        ExitStatus::Fatal => "### Login failed!",
        _ => "### Script failed!",
    };
    format!("{heading}\n\n{}\n", ctx.log.render_markdown())
}

fn write_failure_artifact(ci_mode: bool, detail: &str) {
    if !ci_mode {
        return;
    }
    let Some(path) = runlog::step_summary_path() else {
        return;
    };
    let markdown = format!("### Login failed!\n\n{detail}\n");
    if let Err(error) = runlog::append_step_summary(&path, &markdown) {
        warn!("failed to write the run summary artifact: {error:#}");
    }
}
