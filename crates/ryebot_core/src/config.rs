use std::env;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_API_URL: &str = "https://terraria.wiki.gg/api.php";
pub const DEFAULT_WIKI_ID: &str = "terraria";
pub const DEFAULT_USER_AGENT: &str =
    "ryebot/0.5 (https://terraria.wiki.gg/wiki/User_talk:Ryebot)";

/// Optional `ryebot.toml` next to the working directory. Every value has a
/// default aimed at the production wiki, and every value can be overridden
/// through `RYEBOT_*` environment variables.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct BotConfig {
    #[serde(default)]
    pub wiki: WikiSection,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct WikiSection {
    pub api_url: Option<String>,
    pub wiki_id: Option<String>,
    pub user_agent: Option<String>,
}

impl BotConfig {
    /// Resolve the wiki API endpoint: env `RYEBOT_API_URL` > config > default.
    pub fn api_url(&self) -> String {
        if let Some(value) = non_empty_env("RYEBOT_API_URL") {
            return value;
        }
        self.wiki
            .api_url
            .clone()
            .unwrap_or_else(|| DEFAULT_API_URL.to_string())
    }

    /// Resolve the wiki identity the session must land on:
    /// env `RYEBOT_WIKI_ID` > config > default.
    pub fn wiki_id(&self) -> String {
        if let Some(value) = non_empty_env("RYEBOT_WIKI_ID") {
            return value;
        }
        self.wiki
            .wiki_id
            .clone()
            .unwrap_or_else(|| DEFAULT_WIKI_ID.to_string())
    }

    /// Resolve the user agent: env `RYEBOT_USER_AGENT` > config > default.
    pub fn user_agent(&self) -> String {
        if let Some(value) = non_empty_env("RYEBOT_USER_AGENT") {
            return value;
        }
        self.wiki
            .user_agent
            .clone()
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string())
    }
}

/// Load and parse a BotConfig from a TOML file. Returns defaults if the
/// file doesn't exist.
pub fn load_config(config_path: &Path) -> Result<BotConfig> {
    if !config_path.exists() {
        return Ok(BotConfig::default());
    }
    let content = fs::read_to_string(config_path)
        .with_context(|| format!("failed to read {}", config_path.display()))?;
    let parsed: BotConfig = toml::from_str(&content)
        .with_context(|| format!("failed to parse {}", config_path.display()))?;
    Ok(parsed)
}

fn non_empty_env(key: &str) -> Option<String> {
    let value = env::var(key).ok()?;
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use tempfile::tempdir;

    use super::{BotConfig, DEFAULT_API_URL, DEFAULT_USER_AGENT, DEFAULT_WIKI_ID, load_config};

    #[test]
    fn default_config_falls_back_to_production_wiki() {
        let config = BotConfig::default();
        assert_eq!(config.api_url(), DEFAULT_API_URL);
        assert_eq!(config.wiki_id(), DEFAULT_WIKI_ID);
        assert_eq!(config.user_agent(), DEFAULT_USER_AGENT);
    }

    #[test]
    fn load_config_returns_default_for_missing_file() {
        let config = load_config(Path::new("/nonexistent/ryebot.toml")).expect("load config");
        assert!(config.wiki.api_url.is_none());
    }

    #[test]
    fn load_config_parses_wiki_section() {
        let temp = tempdir().expect("tempdir");
        let config_path = temp.path().join("ryebot.toml");
        fs::write(
            &config_path,
            r#"
[wiki]
api_url = "https://example.wiki.gg/api.php"
wiki_id = "example"
user_agent = "test-agent/1.0"
"#,
        )
        .expect("write config");

        let config = load_config(&config_path).expect("load config");
        assert_eq!(
            config.wiki.api_url.as_deref(),
            Some("https://example.wiki.gg/api.php")
        );
        assert_eq!(config.wiki.wiki_id.as_deref(), Some("example"));
        assert_eq!(config.wiki.user_agent.as_deref(), Some("test-agent/1.0"));
    }

    #[test]
    fn load_config_tolerates_partial_toml() {
        let temp = tempdir().expect("tempdir");
        let config_path = temp.path().join("ryebot.toml");
        fs::write(&config_path, "[wiki]\nwiki_id = \"example\"\n").expect("write config");

        let config = load_config(&config_path).expect("load config");
        assert_eq!(config.wiki_id(), "example");
        assert_eq!(config.api_url(), DEFAULT_API_URL);
    }

    #[test]
    fn load_config_returns_error_for_invalid_toml() {
        let temp = tempdir().expect("tempdir");
        let config_path = temp.path().join("ryebot.toml");
        fs::write(&config_path, "[wiki\napi_url = \"oops\"").expect("write config");
        let error = load_config(&config_path).expect_err("must fail");
        assert!(error.to_string().contains("failed to parse"));
    }
}
