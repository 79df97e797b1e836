//! Core of the ryebot wiki automation runner: credential resolution, the
//! shared authenticated session, the dry-run write guard, the run log, and
//! the script registry/dispatcher that ties one invocation together.

pub mod config;
pub mod context;
pub mod credentials;
pub mod dispatch;
pub mod edit;
pub mod error;
pub mod logging;
pub mod runlog;
pub mod script_config;
pub mod scripts;
pub mod session;
pub mod wiki;

#[cfg(test)]
mod testutil;
