use crate::error::{OrmError, OrmResult};
use crate::sql::ParamStyle;
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

/// Level statements are logged at when engine logging is enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_tracing(self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

impl FromStr for LogLevel {
    type Err = OrmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            other => Err(OrmError::Config(format!("unknown log level '{other}'"))),
        }
    }
}

/// Engine configuration.
///
/// Builder-style in code, or deserialized from application config where
/// missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Reuse connections between sessions. Default `true`.
    pub pool: bool,
    /// Cap on checked-out connections. `None` or `Some(0)` means unbounded.
    pub max_pool_conns: Option<usize>,
    /// Placeholder dialect override. Defaults to the driver's.
    pub paramstyle: Option<ParamStyle>,
    /// Log statements, `COMMIT` and `ROLLBACK` at this level. Off by default.
    pub log_level: Option<LogLevel>,
    /// Separator between relation name and column in composite results.
    pub separator: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pool: true,
            max_pool_conns: Some(10),
            paramstyle: None,
            log_level: None,
            separator: crate::DEFAULT_SEPARATOR.to_string(),
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable connection pooling.
    pub fn with_pool(mut self, pool: bool) -> Self {
        self.pool = pool;
        self
    }

    /// Limit the number of checked-out connections.
    pub fn with_max_pool_conns(mut self, max: usize) -> Self {
        self.max_pool_conns = Some(max);
        self
    }

    /// Remove the connection cap.
    pub fn unbounded(mut self) -> Self {
        self.max_pool_conns = None;
        self
    }

    pub fn with_paramstyle(mut self, style: ParamStyle) -> Self {
        self.paramstyle = Some(style);
        self
    }

    pub fn with_log_level(mut self, level: LogLevel) -> Self {
        self.log_level = Some(level);
        self
    }

    pub fn with_separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }

    /// The effective connection cap.
    pub fn max_conns(&self) -> Option<usize> {
        self.max_pool_conns.filter(|max| *max > 0)
    }

    /// Consume the engine options among `options` and return the rest,
    /// which belong to the driver.
    pub fn apply_options<I, K, V>(&mut self, options: I) -> OrmResult<Vec<(String, String)>>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut rest = Vec::new();
        for (key, value) in options {
            let key = key.into();
            let value = value.into();
            match key.as_str() {
                "pool" => self.pool = parse_bool(&key, &value)?,
                "max_pool_conns" => {
                    self.max_pool_conns = match value.to_ascii_lowercase().as_str() {
                        "" | "none" | "unbounded" => None,
                        v => Some(v.parse().map_err(|_| invalid(&key, &value))?),
                    }
                }
                "paramstyle" => self.paramstyle = Some(value.parse()?),
                "log_level" | "logger_level" => self.log_level = Some(value.parse()?),
                "separator" => {
                    if value.is_empty() {
                        return Err(invalid(&key, &value));
                    }
                    self.separator = value;
                }
                _ => rest.push((key, value)),
            }
        }
        Ok(rest)
    }
}

pub(crate) fn parse_bool(key: &str, value: &str) -> OrmResult<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(invalid(key, value)),
    }
}

fn invalid(key: &str, value: &str) -> OrmError {
    OrmError::Config(format!("invalid value '{value}' for option '{key}'"))
}

/// A parsed `driver://target?option=value` connection URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectUri {
    pub driver: String,
    /// Everything between `://` and `?`; may be empty.
    pub target: String,
    /// Query-string options in order of appearance.
    pub options: Vec<(String, String)>,
}

impl ConnectUri {
    pub fn parse(uri: &str) -> OrmResult<Self> {
        let (driver, rest) = uri
            .split_once("://")
            .ok_or_else(|| OrmError::Config(format!("'{uri}' is not a driver://target URI")))?;
        if driver.is_empty() {
            return Err(OrmError::Config(format!("'{uri}' has no driver name")));
        }
        let (target, query) = rest.split_once('?').unwrap_or((rest, ""));
        let options = url::form_urlencoded::parse(query.as_bytes())
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        Ok(Self {
            driver: driver.to_string(),
            target: target.to_string(),
            options,
        })
    }

    /// Value of the last occurrence of an option.
    pub fn option(&self, key: &str) -> Option<&str> {
        self.options
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

impl FromStr for ConnectUri {
    type Err = OrmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ConnectUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.driver, self.target)?;
        if !self.options.is_empty() {
            let query = url::form_urlencoded::Serializer::new(String::new())
                .extend_pairs(self.options.iter())
                .finish();
            write!(f, "?{query}")?;
        }
        Ok(())
    }
}
