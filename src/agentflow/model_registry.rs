//! Model metadata registry and token-counting heuristics (spec §4.3, §6).
//!
//! Grounded on `llm_session.rs`'s token-budget tracking in the teacher
//! crate, generalized from a single hardcoded `max_tokens` into a
//! `(provider, model) -> context_window` registry with dynamic runtime
//! registration, as spec §6 requires.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// Static metadata about a model's context window, known at registration
/// time (spec §6 "Model metadata registry").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub provider: String,
    pub model: String,
    pub context_window: usize,
    pub max_input_tokens: usize,
    pub max_output_tokens: usize,
}

/// Registry of `(provider, model) -> ModelMetadata`.
///
/// Backed by [`DashMap`] so registration and lookup can happen concurrently
/// across sessions without a coarse lock — the registry is the
/// overwhelmingly read-heavy shared state spec §9's "Per-session
/// single-threaded cooperative scheduling" design note calls out.
pub struct ModelRegistry {
    entries: DashMap<(String, String), ModelMetadata>,
    default_context_window: usize,
}

impl ModelRegistry {
    pub fn new(default_context_window: usize) -> Self {
        Self {
            entries: DashMap::new(),
            default_context_window,
        }
    }

    /// Pre-populate with commonly used entries, matching what a real
    /// deployment would load at startup.
    pub fn with_builtin_defaults(default_context_window: usize) -> Self {
        let registry = Self::new(default_context_window);
        for (provider, model, window, max_in, max_out) in [
            ("openai", "gpt-4", 8192, 6144, 2048),
            ("openai", "gpt-4o", 128_000, 120_000, 8_000),
            ("openai", "gpt-4o-mini", 128_000, 120_000, 8_000),
            ("anthropic", "claude-3-5-sonnet", 200_000, 190_000, 8_192),
            ("anthropic", "claude-3-opus", 200_000, 190_000, 4_096),
        ] {
            registry.register(ModelMetadata {
                provider: provider.to_string(),
                model: model.to_string(),
                context_window: window,
                max_input_tokens: max_in,
                max_output_tokens: max_out,
            });
        }
        registry
    }

    /// Register or overwrite an entry at runtime (spec §6 "Dynamic
    /// registration is allowed at runtime").
    pub fn register(&self, metadata: ModelMetadata) {
        self.entries
            .insert((metadata.provider.clone(), metadata.model.clone()), metadata);
    }

    /// Look up a model's context window. Unknown `(provider, model)` pairs
    /// fall back to `default_context_window` with a logged warning (spec
    /// §4.3, §8 boundary behavior `context_limit = 0`).
    pub fn context_window(&self, provider: &str, model: &str) -> usize {
        match self
            .entries
            .get(&(provider.to_string(), model.to_string()))
        {
            Some(entry) => entry.context_window,
            None => {
                log::warn!(
                    "unknown model metadata for ({provider}, {model}); defaulting context window to {}",
                    self.default_context_window
                );
                self.default_context_window
            }
        }
    }
}

/// Estimate token count for a piece of text when a tokenizer library isn't
/// available (spec §4.3: "prefers tiktoken for OpenAI family and a
/// heuristic otherwise... English ~4 chars/token, Chinese ~1.5 chars/token").
///
/// This crate implements only the heuristic branch; a real deployment
/// plugs an exact tokenizer in ahead of this as a provider-specific
/// override (out of scope, spec §1 "LLM provider client").
pub fn estimate_tokens(text: &str) -> u64 {
    let cjk_chars = text
        .chars()
        .filter(|c| {
            let cp = *c as u32;
            (0x4E00..=0x9FFF).contains(&cp) || (0x3400..=0x4DBF).contains(&cp)
        })
        .count();
    let other_chars = text.chars().count() - cjk_chars;

    let cjk_tokens = (cjk_chars as f64 / 1.5).ceil();
    let other_tokens = (other_chars as f64 / 4.0).ceil();
    (cjk_tokens + other_tokens).max(if text.is_empty() { 0.0 } else { 1.0 }) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_model_falls_back_to_default() {
        let registry = ModelRegistry::new(4096);
        assert_eq!(registry.context_window("acme", "mystery-model"), 4096);
    }

    #[test]
    fn known_model_returns_registered_window() {
        let registry = ModelRegistry::with_builtin_defaults(4096);
        assert_eq!(registry.context_window("openai", "gpt-4"), 8192);
    }

    #[test]
    fn dynamic_registration_overrides_lookup() {
        let registry = ModelRegistry::new(4096);
        registry.register(ModelMetadata {
            provider: "local".into(),
            model: "llama".into(),
            context_window: 32_768,
            max_input_tokens: 30_000,
            max_output_tokens: 2_000,
        });
        assert_eq!(registry.context_window("local", "llama"), 32_768);
    }

    #[test]
    fn estimate_tokens_empty_is_zero() {
        assert_eq!(estimate_tokens(""), 0);
    }

    #[test]
    fn estimate_tokens_english_heuristic() {
        let text = "a".repeat(8);
        assert_eq!(estimate_tokens(&text), 2);
    }

    #[test]
    fn estimate_tokens_cjk_heuristic() {
        let text = "中".repeat(3);
        assert_eq!(estimate_tokens(&text), 2);
    }
}
