use std::env;
use std::fmt;
use std::path::PathBuf;

use anyhow::{anyhow, Result};

pub const DEFAULT_OAUTH_URL: &str = "https://ngw.devices.sberbank.ru:9443/api/v2/oauth";
pub const DEFAULT_API_URL: &str = "https://gigachat.devices.sberbank.ru/api/v1";
pub const DEFAULT_SCOPE: &str = "GIGACHAT_API_PERS";
pub const DEFAULT_MODEL: &str = "GigaChat";
pub const DEFAULT_TEMPLATE_PATH: &str = "templates/index.html";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_ALLOWED_ORIGINS: [&str; 3] = [
    "http://localhost:5173",
    "http://localhost:5174",
    "http://localhost:5175",
];

/// Pre-shared Base64 authorization key for the GigaChat OAuth endpoint.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

/// Upstream endpoints and request parameters for the GigaChat API.
#[derive(Debug, Clone)]
pub struct GigaChatSettings {
    pub oauth_url: String,
    /// Base URL; `/chat/completions` is appended.
    pub api_url: String,
    pub scope: String,
    pub model: String,
    /// Accept upstream certificates that do not chain to a trusted root.
    pub accept_invalid_certs: bool,
}

impl Default for GigaChatSettings {
    fn default() -> Self {
        Self {
            oauth_url: DEFAULT_OAUTH_URL.to_string(),
            api_url: DEFAULT_API_URL.to_string(),
            scope: DEFAULT_SCOPE.to_string(),
            model: DEFAULT_MODEL.to_string(),
            accept_invalid_certs: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub credential: Credential,
    pub gigachat: GigaChatSettings,
    pub allowed_origins: Vec<String>,
    pub template_path: PathBuf,
    pub max_request_bytes: Option<usize>,
    pub port: u16,
}

impl AppConfig {
    /// Configuration with every optional setting at its default.
    pub fn with_credential(credential: Credential) -> Self {
        Self {
            credential,
            gigachat: GigaChatSettings::default(),
            allowed_origins: DEFAULT_ALLOWED_ORIGINS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            template_path: PathBuf::from(DEFAULT_TEMPLATE_PATH),
            max_request_bytes: None,
            port: DEFAULT_PORT,
        }
    }

    pub fn from_env() -> Result<Self> {
        let credential = match env::var("GIGACHAT_AUTH_KEY") {
            Ok(value) if !value.trim().is_empty() => Credential::new(value.trim()),
            Ok(_) | Err(env::VarError::NotPresent) => {
                return Err(anyhow!("GIGACHAT_AUTH_KEY is not set"))
            }
            Err(err) => return Err(anyhow!("GIGACHAT_AUTH_KEY is unreadable: {}", err)),
        };

        let mut cfg = Self::with_credential(credential);

        if let Some(url) = parse_optional_string("GIGACHAT_OAUTH_URL")? {
            cfg.gigachat.oauth_url = url;
        }
        if let Some(url) = parse_optional_string("GIGACHAT_API_URL")? {
            cfg.gigachat.api_url = url;
        }
        if let Some(scope) = parse_optional_string("GIGACHAT_SCOPE")? {
            cfg.gigachat.scope = scope;
        }
        if let Some(model) = parse_optional_string("GIGACHAT_MODEL")? {
            cfg.gigachat.model = model;
        }
        cfg.gigachat.accept_invalid_certs =
            parse_bool_env("GIGACHAT_INSECURE_TLS")?.unwrap_or(false);

        if let Some(raw) = parse_optional_string("ANALYZER_CORS_ORIGINS")? {
            let origins: Vec<String> = raw
                .split(',')
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .map(|s| s.to_string())
                .collect();
            if !origins.is_empty() {
                cfg.allowed_origins = origins;
            }
        }
        if let Some(path) = parse_optional_string("ANALYZER_TEMPLATE")? {
            cfg.template_path = PathBuf::from(path);
        }
        cfg.max_request_bytes = parse_optional_u64("ANALYZER_MAX_REQUEST_BYTES")?
            .map(|v| {
                usize::try_from(v)
                    .map_err(|_| anyhow!("ANALYZER_MAX_REQUEST_BYTES is too large for this platform"))
            })
            .transpose()?;
        if let Some(port) = parse_optional_u64("PORT")? {
            cfg.port = u16::try_from(port)
                .map_err(|_| anyhow!("PORT must be between 0 and 65535"))?;
        }

        Ok(cfg)
    }
}

fn parse_optional_string(var: &str) -> Result<Option<String>> {
    match env::var(var) {
        Ok(value) if !value.trim().is_empty() => Ok(Some(value.trim().to_string())),
        Ok(_) => Ok(None),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(anyhow!("{} is unreadable: {}", var, err)),
    }
}

fn parse_optional_u64(var: &str) -> Result<Option<u64>> {
    match env::var(var) {
        Ok(value) if !value.trim().is_empty() => value
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| anyhow!("{} must be a positive integer", var)),
        Ok(_) => Ok(None),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(err.into()),
    }
}

fn parse_bool_env(var: &str) -> Result<Option<bool>> {
    match env::var(var) {
        Ok(value) if !value.trim().is_empty() => parse_bool(&value)
            .map(Some)
            .ok_or_else(|| anyhow!("{} must be a boolean (true/false/1/0)", var)),
        Ok(_) => Ok(None),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(err.into()),
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
