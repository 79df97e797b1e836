use thiserror::Error;

/// Failure kinds the dispatcher needs to tell apart when it maps an error
/// to a process exit status. Everything else travels as plain `anyhow`
/// context chains.
#[derive(Debug, Error)]
pub enum RyebotError {
    #[error("missing credentials: {0} is not set or is empty")]
    MissingCredentials(&'static str),
    #[error("login to \"{wiki}\" failed: {reason}")]
    Authentication { wiki: String, reason: String },
    #[error("could not reach the wiki API: {reason}")]
    Connectivity { reason: String },
    #[error("unknown script \"{name}\"")]
    UnknownScript { name: String },
    #[error("script \"{script}\" failed: {reason}")]
    ScriptRuntime { script: String, reason: String },
    #[error("edit to \"{page}\" was rejected: {reason}")]
    WriteFailed { page: String, reason: String },
}

/// Error payload returned by the MediaWiki API itself (as opposed to a
/// transport failure). Kept as its own type so callers can inspect the
/// error code, e.g. to recognize page-protection rejections.
#[derive(Debug, Error)]
#[error("MediaWiki API error [{code}]: {info}")]
pub struct ApiError {
    pub code: String,
    pub info: String,
}
