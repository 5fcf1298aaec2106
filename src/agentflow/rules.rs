//! Persisted rule configuration (spec §6 "Rule configuration").
//!
//! Grounded on `config.rs`'s plain-struct-with-`Default` shape in the
//! teacher crate, extended with `serde_yaml`/`serde_json` (de)serialization
//! since this file's whole purpose, unlike `CloudLLMConfig`, is to round-trip
//! through the YAML/JSON shape spec §6 specifies literally.

use serde::{Deserialize, Serialize};

/// Action a matched rule applies (spec §6): priority ordering fixed as
/// `terminate > replace > warn > allow`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Allow,
    Warn,
    Replace,
    Terminate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathRule {
    pub id: String,
    pub pattern: String,
    pub action: Action,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentRule {
    pub id: String,
    pub patterns: Vec<String>,
    pub action: Action,
    pub replacement: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserLevelRule {
    pub id: String,
    pub required_level: String,
    pub paths: Vec<String>,
    pub action: Action,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandRule {
    pub id: String,
    pub commands: Vec<String>,
    pub action: Action,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rules {
    pub path_rules: Vec<PathRule>,
    pub content_rules: Vec<ContentRule>,
    pub user_level_rules: Vec<UserLevelRule>,
    pub command_rules: Vec<CommandRule>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Defaults {
    pub unknown_path_action: Action,
    pub max_content_size_kb: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            unknown_path_action: Action::Allow,
            max_content_size_kb: 10240,
        }
    }
}

/// Top-level persisted rule configuration (spec §6): `version`, `rules`,
/// `defaults`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleConfig {
    pub version: String,
    pub rules: Rules,
    #[serde(default)]
    pub defaults: Defaults,
}

impl Default for RuleConfig {
    fn default() -> Self {
        Self {
            version: "1.0".into(),
            rules: Rules {
                path_rules: Vec::new(),
                content_rules: Vec::new(),
                user_level_rules: Vec::new(),
                command_rules: Vec::new(),
            },
            defaults: Defaults::default(),
        }
    }
}

/// Error parsing or applying a [`RuleConfig`].
#[derive(Debug, thiserror::Error)]
pub enum RuleConfigError {
    #[error("failed to parse rule config as YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("failed to parse rule config as JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unknown user level: {0}")]
    UnknownUserLevel(String),
}

impl RuleConfig {
    pub fn from_yaml(text: &str) -> Result<Self, RuleConfigError> {
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn from_json(text: &str) -> Result<Self, RuleConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_yaml(&self) -> Result<String, RuleConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Evaluate every rule class against a save request's path/content/actor
    /// level/command and return the single highest-priority matching
    /// action, falling back to `defaults.unknown_path_action` when nothing
    /// matched (spec §4.6 "multiple matches take the maximum-priority action").
    pub fn evaluate(
        &self,
        path: &str,
        content: &str,
        actor_level: &str,
        command: Option<&str>,
    ) -> (Action, Option<String>, Option<String>) {
        let mut best: Option<(Action, String, String)> = None;
        let mut consider = |action: Action, id: &str, message: &str| {
            if best.as_ref().map(|(a, _, _)| action > *a).unwrap_or(true) {
                best = Some((action, id.to_string(), message.to_string()));
            }
        };

        for rule in &self.rules.path_rules {
            if glob_match(&rule.pattern, path) {
                consider(rule.action, &rule.id, &rule.message);
            }
        }
        for rule in &self.rules.content_rules {
            if rule.patterns.iter().any(|p| content.contains(p.as_str())) {
                consider(rule.action, &rule.id, &rule.message);
            }
        }
        for rule in &self.rules.user_level_rules {
            if rule.required_level == actor_level
                && rule.paths.iter().any(|p| glob_match(p, path))
            {
                consider(rule.action, &rule.id, &rule.message);
            }
        }
        if let Some(cmd) = command {
            for rule in &self.rules.command_rules {
                if rule.commands.iter().any(|c| cmd.contains(c.as_str())) {
                    consider(rule.action, &rule.id, &rule.message);
                }
            }
        }

        match best {
            Some((action, id, message)) => (action, Some(id), Some(message)),
            None => (self.defaults.unknown_path_action, None, None),
        }
    }
}

/// Minimal glob matcher supporting a single trailing `*` (spec §6 gives
/// no grammar for `pattern`; this covers the common `prefix/*` case
/// without pulling in a dedicated glob crate for one field).
fn glob_match(pattern: &str, candidate: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => candidate.starts_with(prefix),
        None => pattern == candidate,
    }
}
