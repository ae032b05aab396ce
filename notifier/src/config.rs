//! Configuration module for environment variable parsing.
//!
//! Everything is read once at process start. Components receive the parsed
//! structs at construction time and never consult the environment themselves.

use std::env;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

/// Name of the worker binary the dispatcher launches by default.
pub const WORKER_BINARY: &str = "kanxa-mail-worker";

/// Environment variable names shared between the dispatcher and the worker.
pub const SMTP_HOST_VAR: &str = "SMTP_HOST";
pub const SMTP_PORT_VAR: &str = "SMTP_PORT";
pub const SMTP_SECURE_VAR: &str = "SMTP_SECURE";
pub const SMTP_USER_VAR: &str = "SMTP_USER";
pub const SMTP_PASSWORD_VAR: &str = "SMTP_PASSWORD";
pub const SMTP_FROM_VAR: &str = "SMTP_FROM";

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Port for the web server to listen on
    pub port: u16,

    /// Path of the worker program spawned per email
    pub worker_program: PathBuf,

    /// Optional deadline for one worker lifecycle, in milliseconds
    pub worker_timeout_ms: Option<u64>,

    /// Maximum number of workers alive at once (0 = unbounded)
    pub worker_concurrency: usize,

    /// SMTP settings handed to every worker
    pub smtp: SmtpSettings,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Config {
            port: parse_or("PORT", 8080),

            worker_program: env::var("WORKER_BIN")
                .map(PathBuf::from)
                .unwrap_or_else(|_| default_worker_program()),

            worker_timeout_ms: parse_optional_u64("WORKER_TIMEOUT_MS"),

            worker_concurrency: parse_or("WORKER_CONCURRENCY", 0),

            smtp: SmtpSettings::from_env(),
        }
    }

    /// Worker deadline as a [`Duration`], if one is configured.
    pub fn worker_timeout(&self) -> Option<Duration> {
        self.worker_timeout_ms.map(Duration::from_millis)
    }
}

/// SMTP transport settings.
///
/// Credentials stay optional here; the worker decides whether they are
/// sufficient when it builds its transport.
#[derive(Clone, PartialEq, Eq)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    /// Implicit TLS when true, STARTTLS otherwise
    pub secure: bool,
    pub user: Option<String>,
    pub password: Option<String>,
    /// Sender address; falls back to `user`
    pub from: Option<String>,
}

impl SmtpSettings {
    /// Load SMTP settings from environment variables.
    pub fn from_env() -> Self {
        SmtpSettings {
            host: env::var(SMTP_HOST_VAR).unwrap_or_else(|_| "smtp.gmail.com".to_string()),

            port: parse_or(SMTP_PORT_VAR, 465),

            secure: parse_bool(SMTP_SECURE_VAR, true),

            user: non_empty_var(SMTP_USER_VAR),

            password: non_empty_var(SMTP_PASSWORD_VAR),

            from: non_empty_var(SMTP_FROM_VAR),
        }
    }

    /// Sender address used in the `From` header.
    pub fn sender(&self) -> Option<&str> {
        self.from.as_deref().or(self.user.as_deref())
    }

    /// The settings as environment assignments for a child process.
    ///
    /// `None` means the variable must be removed from the child's environment.
    pub fn to_env(&self) -> Vec<(&'static str, Option<String>)> {
        vec![
            (SMTP_HOST_VAR, Some(self.host.clone())),
            (SMTP_PORT_VAR, Some(self.port.to_string())),
            (SMTP_SECURE_VAR, Some(self.secure.to_string())),
            (SMTP_USER_VAR, self.user.clone()),
            (SMTP_PASSWORD_VAR, self.password.clone()),
            (SMTP_FROM_VAR, self.from.clone()),
        ]
    }
}

impl std::fmt::Debug for SmtpSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("secure", &self.secure)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("from", &self.from)
            .finish()
    }
}

/// Worker binary located next to the running executable, or looked up on PATH.
fn default_worker_program() -> PathBuf {
    env::current_exe()
        .map(|exe| exe.with_file_name(WORKER_BINARY))
        .unwrap_or_else(|_| PathBuf::from(WORKER_BINARY))
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Parse a value, falling back to `default` with a warning when it is invalid.
fn parse_or<T>(name: &str, default: T) -> T
where
    T: FromStr + Display,
{
    let raw = match env::var(name) {
        Ok(v) => v,
        Err(_) => return default,
    };

    match raw.trim().parse::<T>() {
        Ok(v) => v,
        Err(_) => {
            warn!(env_var = name, value = %raw, default = %default, "Invalid value, using default");
            default
        }
    }
}

/// Parse an optional positive integer; invalid values are ignored with a warning.
fn parse_optional_u64(name: &str) -> Option<u64> {
    let raw = env::var(name).ok()?;

    match raw.trim().parse::<u64>() {
        Ok(0) => None,
        Ok(v) => Some(v),
        Err(_) => {
            warn!(env_var = name, value = %raw, "Invalid integer value, ignoring");
            None
        }
    }
}

/// Parse a boolean flag like "true", "0" or "yes".
fn parse_bool(name: &str, default: bool) -> bool {
    let raw = match env::var(name) {
        Ok(v) => v,
        Err(_) => return default,
    };

    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => true,
        "false" | "0" | "no" => false,
        _ => {
            warn!(env_var = name, value = %raw, "Invalid boolean value, using default");
            default
        }
    }
}
