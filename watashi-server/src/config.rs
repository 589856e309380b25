use crate::prompt::{PromptPolicy, TriggerKeywords, PROFILE_DOCUMENT};
use anyhow::{anyhow, bail, Context, Result};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

pub const DEFAULT_API_BASE: &str = "https://api.anthropic.com/v1";
pub const DEFAULT_MODEL: &str = "claude-3-haiku-20240307";
pub const DEFAULT_MAX_TOKENS: u32 = 4096;
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3000";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyMode {
    Classifier,
    Gated,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: String,
    pub api_base: String,
    pub model: String,
    pub max_tokens: u32,
    pub bind_addr: SocketAddr,
    pub request_timeout: Duration,
    pub policy: PolicyMode,
    pub keywords: TriggerKeywords,
    pub reference_document: Option<PathBuf>,
}

impl Config {
    /// Read configuration from the process environment (after `.env` is loaded).
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let api_key = match get("ANTHROPIC_API_KEY") {
            Some(key) if key.starts_with("sk-") => {
                info!("Provider API key loaded successfully");
                key
            }
            Some(_) => bail!("ANTHROPIC_API_KEY found but doesn't start with 'sk-'. Please check your .env file"),
            None => bail!("ANTHROPIC_API_KEY must be set in the environment or .env file"),
        };

        let api_base = get("ANTHROPIC_BASE_URL").unwrap_or_else(|| DEFAULT_API_BASE.to_string());
        let model = get("CHAT_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let max_tokens = match get("CHAT_MAX_TOKENS") {
            Some(raw) => raw
                .trim()
                .parse()
                .with_context(|| format!("CHAT_MAX_TOKENS is not a number: {raw}"))?,
            None => DEFAULT_MAX_TOKENS,
        };

        let bind_addr = get("BIND_ADDR")
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string())
            .parse()
            .context("BIND_ADDR must look like 127.0.0.1:3000")?;

        let timeout_secs: u64 = match get("REQUEST_TIMEOUT_SECS") {
            Some(raw) => raw
                .trim()
                .parse()
                .with_context(|| format!("REQUEST_TIMEOUT_SECS is not a number: {raw}"))?,
            None => DEFAULT_TIMEOUT_SECS,
        };
        if timeout_secs == 0 {
            bail!("REQUEST_TIMEOUT_SECS must be greater than zero");
        }

        let policy = match get("PROMPT_POLICY").as_deref().map(str::trim) {
            None | Some("classifier") => PolicyMode::Classifier,
            Some("gated") => PolicyMode::Gated,
            Some(other) => {
                return Err(anyhow!(
                    "PROMPT_POLICY must be 'classifier' or 'gated', got '{other}'"
                ))
            }
        };

        let keywords = match get("TRIGGER_KEYWORDS") {
            Some(raw) => TriggerKeywords::new(raw.split(',')),
            None => TriggerKeywords::default(),
        };
        if keywords.as_slice().is_empty() {
            warn!("TRIGGER_KEYWORDS is empty; no conversation will match");
        }

        Ok(Self {
            api_key,
            api_base,
            model,
            max_tokens,
            bind_addr,
            request_timeout: Duration::from_secs(timeout_secs),
            policy,
            keywords,
            reference_document: get("REFERENCE_DOCUMENT").map(PathBuf::from),
        })
    }

    /// Build the prompt policy, reading the reference document if one is set.
    pub fn prompt_policy(&self) -> Result<PromptPolicy> {
        let document = match &self.reference_document {
            Some(path) => std::fs::read_to_string(path)
                .with_context(|| format!("failed to read reference document {}", path.display()))?,
            None => PROFILE_DOCUMENT.to_string(),
        };
        let policy = match self.policy {
            PolicyMode::Classifier => PromptPolicy::classifier(self.keywords.clone(), &document),
            PolicyMode::Gated => PromptPolicy::gated(self.keywords.clone(), &document),
        };
        Ok(policy)
    }
}
