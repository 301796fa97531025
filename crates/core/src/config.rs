use std::env;

use serde::{Deserialize, Serialize};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_parse<T: std::str::FromStr>(profile: &str, key: &str, default: T) -> T {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

// ── Top-level config ──────────────────────────────────────────

/// Process-level settings read from the environment.
///
/// Sensor profiles live in the TOML file handled by [`crate::sensors`];
/// this struct only covers where to connect and where to send alerts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub broker: BrokerConfig,
    pub smtp: SmtpConfig,
    pub webhook: WebhookConfig,
    /// Upper bound on one alert delivery, per transport and overall.
    pub alert_timeout_secs: u64,
}

const DEFAULT_ALERT_TIMEOUT_SECS: u64 = 10;

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `PITWATCH_PROFILE`. When set (e.g. `PROD`),
    /// every key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("PITWATCH_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            broker: BrokerConfig::from_env_profiled(p),
            smtp: SmtpConfig::from_env_profiled(p),
            webhook: WebhookConfig::from_env_profiled(p),
            alert_timeout_secs: profiled_env_parse(
                p,
                "PITWATCH_ALERT_TIMEOUT_SECS",
                DEFAULT_ALERT_TIMEOUT_SECS,
            )
            .max(1),
        }
    }

    pub fn alert_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.alert_timeout_secs)
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!(
            "  broker:  {} (retries={}, backoff={}ms)",
            self.broker.redacted_uri(),
            self.broker.connect_retries,
            self.broker.connect_backoff_ms
        );
        tracing::info!(
            "  smtp:    host={}, recipients={}",
            self.smtp.host.as_deref().unwrap_or("(none)"),
            self.smtp.to.len()
        );
        tracing::info!(
            "  webhook: {}",
            if self.webhook.is_configured() { "configured" } else { "(none)" }
        );
        tracing::info!("  alerts:  timeout={}s", self.alert_timeout_secs);
    }
}

// ── Broker (AMQP) ─────────────────────────────────────────────

const DEFAULT_AMQP_USER: &str = "guest";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    pub vhost: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Full AMQP URI; wins over the individual fields when set.
    pub url: Option<String>,
    /// Extra connection attempts after the first failure (0 = fail fast).
    pub connect_retries: u32,
    /// Base delay between attempts, doubled after each failure.
    pub connect_backoff_ms: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 5672,
            vhost: "/".into(),
            username: None,
            password: None,
            url: None,
            connect_retries: 0,
            connect_backoff_ms: 500,
        }
    }
}

impl BrokerConfig {
    fn from_env_profiled(p: &str) -> Self {
        let defaults = Self::default();
        Self {
            host: profiled_env_or(p, "PITWATCH_AMQP_HOST", &defaults.host),
            port: profiled_env_parse(p, "PITWATCH_AMQP_PORT", defaults.port),
            vhost: profiled_env_or(p, "PITWATCH_AMQP_VHOST", &defaults.vhost),
            username: profiled_env_opt(p, "PITWATCH_AMQP_USER"),
            password: profiled_env_opt(p, "PITWATCH_AMQP_PASSWORD"),
            url: profiled_env_opt(p, "PITWATCH_AMQP_URL"),
            connect_retries: profiled_env_parse(p, "PITWATCH_CONNECT_RETRIES", defaults.connect_retries),
            connect_backoff_ms: profiled_env_parse(
                p,
                "PITWATCH_CONNECT_BACKOFF_MS",
                defaults.connect_backoff_ms,
            ),
        }
    }

    /// Point at a different host, dropping any full URI override.
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self.url = None;
        self
    }

    /// AMQP connection URI, e.g. `amqp://localhost:5672/%2F`.
    ///
    /// Credentials and vhost are percent-encoded. A password without a
    /// username is sent for RabbitMQ's default `guest` user.
    pub fn uri(&self) -> String {
        if let Some(url) = &self.url {
            return url.clone();
        }
        let userinfo = match (&self.username, &self.password) {
            (user, Some(pass)) => format!(
                "{}:{}@",
                urlencoding::encode(user.as_deref().unwrap_or(DEFAULT_AMQP_USER)),
                urlencoding::encode(pass)
            ),
            (Some(user), None) => format!("{}@", urlencoding::encode(user)),
            (None, None) => String::new(),
        };
        format!(
            "amqp://{userinfo}{}:{}/{}",
            self.host,
            self.port,
            urlencoding::encode(&self.vhost)
        )
    }

    /// Same as [`uri`](Self::uri) with the password masked.
    pub fn redacted_uri(&self) -> String {
        let uri = self.uri();
        match (uri.find("://"), uri.rfind('@')) {
            (Some(scheme_end), Some(at)) if at > scheme_end => {
                let creds = &uri[scheme_end + 3..at];
                let user = creds.split(':').next().unwrap_or_default();
                format!("{}{}:***{}", &uri[..scheme_end + 3], user, &uri[at..])
            }
            _ => uri,
        }
    }
}

// ── SMTP ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SmtpConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub tls: Option<bool>,
    pub from: Option<String>,
    pub to: Vec<String>,
}

impl SmtpConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            host: profiled_env_opt(p, "SMTP_HOST"),
            port: profiled_env_opt(p, "SMTP_PORT").and_then(|v| v.parse().ok()),
            tls: profiled_env_opt(p, "SMTP_TLS").map(|v| v == "true" || v == "1"),
            from: profiled_env_opt(p, "ALERT_EMAIL_FROM"),
            to: profiled_env_opt(p, "ALERT_EMAIL_TO")
                .map(|v| split_list(&v))
                .unwrap_or_default(),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.host.is_some() && self.from.is_some() && !self.to.is_empty()
    }
}

// ── Webhook ───────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebhookConfig {
    pub url: Option<String>,
}

impl WebhookConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            url: profiled_env_opt(p, "ALERT_WEBHOOK_URL"),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.url.is_some()
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
