use anyhow::{Context, Result};

#[derive(Debug, Clone)]
pub struct Config {
    pub llm_api_key: String,
    pub llm_base_url: String,
    pub summarizer_model: String,
    pub synthesizer_model: String,
    pub max_completion_tokens: Option<u32>,
    pub reddit_client_id: String,
    pub reddit_client_secret: String,
    pub reddit_user_agent: String,
    pub reddit_auth_url: String,
    pub reddit_api_base: String,
    pub batch_size: usize,
    pub batch_cooldown_ms: u64,
    pub skip_malformed_batches: bool,
    pub report_repair_attempts: u32,
    pub passwords: Vec<String>,
    pub password: Option<String>,
    pub log_dir: String,
    pub http_timeout_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup, so tests need not touch the
    /// process environment.
    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let or = |key: &str, default: &str| var(key).unwrap_or_else(|| default.to_string());

        let batch_size: usize = or("SUMMARY_BATCH_SIZE", "6")
            .parse()
            .context("SUMMARY_BATCH_SIZE must be a number")?;
        if batch_size == 0 {
            anyhow::bail!("SUMMARY_BATCH_SIZE must be at least 1");
        }

        Ok(Self {
            llm_api_key: var("LLM_API_KEY")
                .filter(|k| !k.is_empty())
                .or_else(|| var("OPENAI_API_KEY").filter(|k| !k.is_empty()))
                .context("LLM_API_KEY (or OPENAI_API_KEY) must be set")?,
            llm_base_url: or(
                "LLM_BASE_URL",
                "https://api.openai.com/v1/chat/completions",
            ),
            summarizer_model: or("SUMMARIZER_MODEL", "o3"),
            synthesizer_model: or("SYNTHESIZER_MODEL", "o3"),
            max_completion_tokens: var("LLM_MAX_COMPLETION_TOKENS")
                .map(|v| v.parse::<u32>())
                .transpose()
                .context("LLM_MAX_COMPLETION_TOKENS must be a number")?,
            reddit_client_id: var("REDDIT_CLIENT_ID")
                .filter(|v| !v.is_empty())
                .context("REDDIT_CLIENT_ID must be set")?,
            reddit_client_secret: var("REDDIT_CLIENT_SECRET")
                .filter(|v| !v.is_empty())
                .context("REDDIT_CLIENT_SECRET must be set")?,
            reddit_user_agent: or("REDDIT_USER_AGENT", "DeepResearch/0.1"),
            reddit_auth_url: or(
                "REDDIT_AUTH_URL",
                "https://www.reddit.com/api/v1/access_token",
            ),
            reddit_api_base: or("REDDIT_API_BASE", "https://oauth.reddit.com"),
            batch_size,
            batch_cooldown_ms: or("BATCH_COOLDOWN_MS", "500")
                .parse()
                .context("BATCH_COOLDOWN_MS must be a number")?,
            skip_malformed_batches: parse_flag(&or("SKIP_MALFORMED_BATCHES", "false"))
                .context("SKIP_MALFORMED_BATCHES must be true or false")?,
            report_repair_attempts: or("REPORT_REPAIR_ATTEMPTS", "0")
                .parse()
                .context("REPORT_REPAIR_ATTEMPTS must be a number")?,
            passwords: var("RESEARCH_PASSWORDS")
                .map(|v| {
                    v.split(',')
                        .map(str::trim)
                        .filter(|p| !p.is_empty())
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default(),
            password: var("RESEARCH_PASSWORD").filter(|p| !p.is_empty()),
            log_dir: or("LOG_DIR", "logs"),
            http_timeout_secs: or("HTTP_TIMEOUT_SECS", "120")
                .parse()
                .context("HTTP_TIMEOUT_SECS must be a number")?,
        })
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}
