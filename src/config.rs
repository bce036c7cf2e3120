use crate::error::ConfigError;
use std::env;
use std::str::FromStr;

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_PLAN_SIZE: usize = 5;
pub const DEFAULT_MIN_REPORT_WORDS: usize = 1000;
pub const DEFAULT_SEARCH_MAX_TURNS: usize = 5;
pub const DEFAULT_SENDGRID_BASE_URL: &str = "https://api.sendgrid.com";

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub llm: LlmConfig,
    pub email: EmailConfig,
    pub research: ResearchConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub openai_api_key: String,
    pub tavily_api_key: Option<String>,
    pub model: String,
    pub search_max_turns: usize,
}

#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub sendgrid_api_key: String,
    pub base_url: String,
    pub from: String,
    pub to: String,
}

/// Knobs that shape a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResearchConfig {
    pub plan_size: usize,
    pub min_report_words: usize,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            plan_size: DEFAULT_PLAN_SIZE,
            min_report_words: DEFAULT_MIN_REPORT_WORDS,
        }
    }
}

impl Config {
    /// Reads `.env` (when present) and then the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));

        let plan_size: usize = parse_or(&get, "SEARCH_PLAN_SIZE", DEFAULT_PLAN_SIZE)?;
        if plan_size == 0 {
            return Err(ConfigError::Invalid {
                key: "SEARCH_PLAN_SIZE",
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(Self {
            server: ServerConfig {
                host: get("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
                port: parse_or(&get, "PORT", 3000)?,
            },
            llm: LlmConfig {
                openai_api_key: required("OPENAI_API_KEY")?,
                tavily_api_key: get("TAVILY_API_KEY"),
                model: get("RESEARCH_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
                search_max_turns: parse_or(&get, "SEARCH_MAX_TURNS", DEFAULT_SEARCH_MAX_TURNS)?,
            },
            email: EmailConfig {
                sendgrid_api_key: required("SENDGRID_API_KEY")?,
                base_url: get("SENDGRID_BASE_URL")
                    .unwrap_or_else(|| DEFAULT_SENDGRID_BASE_URL.to_string()),
                from: get("REPORT_EMAIL_FROM").unwrap_or_else(|| "reports@example.com".to_string()),
                to: get("REPORT_EMAIL_TO").unwrap_or_else(|| "reports@example.com".to_string()),
            },
            research: ResearchConfig {
                plan_size,
                min_report_words: parse_or(&get, "REPORT_MIN_WORDS", DEFAULT_MIN_REPORT_WORDS)?,
            },
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Settings that still work but degrade a run.
    pub fn warnings(&self) -> Vec<&'static str> {
        let mut warnings = Vec::new();
        if self.llm.tavily_api_key.is_none() {
            warnings.push("TAVILY_API_KEY not set; searches run without web access");
        }
        warnings
    }
}

fn parse_or<T, G>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}
