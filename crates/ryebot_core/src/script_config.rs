use std::collections::BTreeMap;

use anyhow::Result;
use serde_json::Value;
use tracing::{debug, info};

use crate::context::RunContext;

/// Configuration parameters for a script, seeded with defaults and
/// optionally overridden from a page on the wiki. The page holds a single
/// template call whose parameters are the configuration keys; values are
/// coerced to bool/integer/float where they parse as one.
#[derive(Debug, Clone)]
pub struct ScriptConfig {
    name: String,
    defaults: BTreeMap<String, Value>,
    values: BTreeMap<String, Value>,
}

impl ScriptConfig {
    pub fn new(script_name: &str, defaults: &[(&str, Value)]) -> Self {
        let defaults: BTreeMap<String, Value> = defaults
            .iter()
            .map(|(key, value)| (key.to_string(), value.clone()))
            .collect();
        Self {
            name: script_name.to_string(),
            values: defaults.clone(),
            defaults,
        }
    }

    /// Standard location of the script's configuration page.
    pub fn default_page_name(&self) -> String {
        format!("User:Ryebot/bot/scripts/{}/config", self.name)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.values.get(key).and_then(Value::as_u64)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.values.get(key).and_then(Value::as_bool)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(Value::as_str)
    }

    /// Whether the current values still match the seeded defaults.
    pub fn is_default(&self) -> bool {
        self.values == self.defaults
    }

    /// Replace the current values with the parameters of the first template
    /// call on the wiki configuration page. A missing page or a page
    /// without a template keeps the defaults; keys the page doesn't set
    /// fall back to their default values.
    pub fn update_from_wiki(&mut self, ctx: &mut RunContext) -> Result<()> {
        let page_name = self.default_page_name();
        let page = ctx.session()?.read(&page_name)?;
        if !page.exists {
            debug!(
                "no configuration page at \"{page_name}\", keeping defaults for \"{}\"",
                self.name
            );
            return Ok(());
        }

        let params = first_template_params(&page.content);
        if params.is_empty() {
            debug!("configuration page \"{page_name}\" has no template call, keeping defaults");
            return Ok(());
        }

        let mut from_wiki = BTreeMap::new();
        for (key, value) in params {
            from_wiki.insert(key, coerce_value(&value));
        }
        for (key, value) in &self.defaults {
            from_wiki
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
        self.values = from_wiki;
        info!("loaded configuration for \"{}\" from \"{page_name}\"", self.name);
        Ok(())
    }
}

/// Extract the named parameters of the first `{{...}}` call in the
/// wikitext. Pipes inside nested templates or links don't split.
fn first_template_params(wikitext: &str) -> Vec<(String, String)> {
    let Some(start) = wikitext.find("{{") else {
        return Vec::new();
    };
    let inner = &wikitext[start + 2..];

    let mut depth = 0usize;
    let mut end = None;
    let bytes = inner.as_bytes();
    let mut index = 0;
    while index + 1 < bytes.len() {
        match (bytes[index], bytes[index + 1]) {
            (b'{', b'{') | (b'[', b'[') => {
                depth += 1;
                index += 2;
            }
            (b'}', b'}') if depth == 0 => {
                end = Some(index);
                break;
            }
            (b'}', b'}') | (b']', b']') => {
                depth = depth.saturating_sub(1);
                index += 2;
            }
            _ => index += 1,
        }
    }
    let Some(end) = end else {
        return Vec::new();
    };
    let body = &inner[..end];

    let mut segments = Vec::new();
    let mut segment_start = 0;
    let mut depth = 0usize;
    let bytes = body.as_bytes();
    let mut index = 0;
    while index < bytes.len() {
        if index + 1 < bytes.len() {
            match (bytes[index], bytes[index + 1]) {
                (b'{', b'{') | (b'[', b'[') => {
                    depth += 1;
                    index += 2;
                    continue;
                }
                (b'}', b'}') | (b']', b']') => {
                    depth = depth.saturating_sub(1);
                    index += 2;
                    continue;
                }
                _ => {}
            }
        }
        if bytes[index] == b'|' && depth == 0 {
            segments.push(&body[segment_start..index]);
            segment_start = index + 1;
        }
        index += 1;
    }
    segments.push(&body[segment_start..]);

    // First segment is the template name; the rest are parameters.
    segments
        .into_iter()
        .skip(1)
        .filter_map(|segment| {
            let (key, value) = segment.split_once('=')?;
            let key = key.trim();
            if key.is_empty() {
                return None;
            }
            Some((key.to_string(), value.trim().to_string()))
        })
        .collect()
}

fn coerce_value(raw: &str) -> Value {
    match raw.to_ascii_lowercase().as_str() {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        _ => {}
    }
    if let Ok(value) = raw.parse::<i64>() {
        return Value::from(value);
    }
    if let Ok(value) = raw.parse::<f64>() {
        return Value::from(value);
    }
    Value::from(raw)
}
