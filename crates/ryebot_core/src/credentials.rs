use std::env;
use std::fmt;

use crate::error::RyebotError;

pub const USERNAME_VAR: &str = "RYEBOT_USERNAME";
pub const PASSWORD_VAR: &str = "RYEBOT_PASSWORD";

/// Bot identity read once at startup. The username carries the bot-password
/// qualifier (`<account>@<bot-password-name>`); the secret stays in memory
/// for the process lifetime and is never written to any log sink.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    username: String,
    password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    /// Read both credential variables from the process environment.
    /// Idempotent; repeated calls return the same values.
    pub fn resolve() -> Result<Self, RyebotError> {
        Self::resolve_with_lookup(|key| env::var(key).ok())
    }

    fn resolve_with_lookup<F>(lookup: F) -> Result<Self, RyebotError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let username = lookup(USERNAME_VAR)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .ok_or(RyebotError::MissingCredentials(USERNAME_VAR))?;
        let password = lookup(PASSWORD_VAR)
            .filter(|value| !value.trim().is_empty())
            .ok_or(RyebotError::MissingCredentials(PASSWORD_VAR))?;
        Ok(Self { username, password })
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    /// Account name without the bot-password qualifier, i.e. the username
    /// the wiki reports after a successful login.
    pub fn account_name(&self) -> &str {
        self.username
            .split_once('@')
            .map(|(account, _)| account)
            .unwrap_or(&self.username)
    }

    #[cfg(test)]
    pub(crate) fn for_tests(username: &str, password: &str) -> Self {
        Self {
            username: username.to_string(),
            password: password.to_string(),
        }
    }
}
