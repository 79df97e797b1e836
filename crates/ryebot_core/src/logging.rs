use tracing::{Event, Level, Subscriber};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;

/// Install the global subscriber for this run. Plain fmt output by default;
/// in CI mode every event becomes a GitHub Actions workflow command so the
/// host annotates the run. `RUST_LOG` overrides the verbosity floor.
pub fn init(verbose: bool, ci_mode: bool) {
    let default_directive = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    let result = if ci_mode {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .event_format(GithubActionsFormat)
            .try_init()
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .try_init()
    };
    // A second init (tests, embedding) keeps the existing subscriber.
    let _ = result;
}

/// `::notice::`-style log lines, one annotation per event.
struct GithubActionsFormat;

impl<S, N> FormatEvent<S, N> for GithubActionsFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> std::fmt::Result {
        write!(writer, "::{}::", annotation_kind(*event.metadata().level()))?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

fn annotation_kind(level: Level) -> &'static str {
    if level == Level::ERROR {
        "error"
    } else if level == Level::WARN {
        "warning"
    } else if level == Level::INFO {
        "notice"
    } else {
        "debug"
    }
}
