use crate::{
    max_target, total_duration, validate_stages, Check, ConfigError, Metric, Ramp, Stage,
    Threshold, DEFAULT_CONNECT_TIMEOUT, DEFAULT_REQUEST_TIMEOUT, DEFAULT_SLEEP, DEFAULT_TICK,
    DEFAULT_USER_AGENT,
};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Immutable description of a run, built once at startup and shared by reference.
///
/// # Example
/// ```
/// use stampede_core::{RunConfig, Stage};
/// use std::time::Duration;
///
/// let config = RunConfig::new(
///     "http://localhost:9999/clientes/1/extrato",
///     vec![
///         Stage::new(Duration::from_secs(10), 50),
///         Stage::new(Duration::from_secs(10), 0),
///     ],
/// )
/// .unwrap()
/// .with_threshold("http_req_duration", "p(95)<100")
/// .unwrap();
///
/// assert_eq!(config.total_duration(), Duration::from_secs(20));
/// ```
#[derive(Debug, Clone)]
pub struct RunConfig {
    target_url: Url,
    stages: Vec<Stage>,
    thresholds: Vec<Threshold>,
    checks: Vec<Check>,
    sleep: Duration,
    tick: Duration,
    request_timeout: Duration,
    connect_timeout: Duration,
    user_agent: String,
}

impl RunConfig {
    pub fn new(target_url: &str, stages: Vec<Stage>) -> Result<Self, ConfigError> {
        validate_stages(&stages)?;
        Ok(Self {
            target_url: parse_url(target_url)?,
            stages,
            thresholds: vec![],
            checks: vec![Check::default()],
            sleep: DEFAULT_SLEEP,
            tick: DEFAULT_TICK,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        })
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = serde_json::from_str(json)?;
        raw.validate()
    }

    pub fn from_value(value: serde_json::Value) -> Result<Self, ConfigError> {
        let raw: RawConfig = serde_json::from_value(value)?;
        raw.validate()
    }

    pub fn with_threshold(mut self, metric: &str, expression: &str) -> Result<Self, ConfigError> {
        let threshold =
            Threshold::parse(metric, expression).map_err(|source| ConfigError::Threshold {
                metric: metric.to_string(),
                source,
            })?;
        self.thresholds.push(threshold);
        Ok(self)
    }

    /// Replace the checks evaluated on every response.
    pub fn with_checks(mut self, checks: Vec<Check>) -> Self {
        self.checks = checks;
        self
    }

    pub fn with_sleep(mut self, sleep: Duration) -> Self {
        self.sleep = sleep;
        self
    }

    pub fn with_tick(mut self, tick: Duration) -> Result<Self, ConfigError> {
        self.tick = positive("tick", tick)?;
        Ok(self)
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Result<Self, ConfigError> {
        self.request_timeout = positive("request_timeout", timeout)?;
        Ok(self)
    }

    pub fn set_target_url(&mut self, target_url: &str) -> Result<(), ConfigError> {
        self.target_url = parse_url(target_url)?;
        Ok(())
    }

    pub fn target_url(&self) -> &Url {
        &self.target_url
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn thresholds(&self) -> &[Threshold] {
        &self.thresholds
    }

    pub fn checks(&self) -> &[Check] {
        &self.checks
    }

    pub fn sleep(&self) -> Duration {
        self.sleep
    }

    pub fn tick(&self) -> Duration {
        self.tick
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    pub fn total_duration(&self) -> Duration {
        total_duration(&self.stages)
    }

    pub fn max_target(&self) -> u64 {
        max_target(&self.stages)
    }

    /// Whether a threshold on the `checks` metric decides the check outcome of the run.
    pub fn checks_governed_by_threshold(&self) -> bool {
        self.thresholds.iter().any(|t| t.metric() == Metric::Checks)
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    target_url: String,
    stages: Vec<RawStage>,
    #[serde(default)]
    thresholds: BTreeMap<String, OneOrMany>,
    #[serde(alias = "sleep_interval")]
    sleep: Option<ConfigDuration>,
    checks: Option<Vec<RawCheck>>,
    tick: Option<ConfigDuration>,
    request_timeout: Option<ConfigDuration>,
    connect_timeout: Option<ConfigDuration>,
    user_agent: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawStage {
    duration: ConfigDuration,
    target: i64,
    #[serde(default)]
    ramp: Ramp,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawCheck {
    name: Option<String>,
    status: Option<u16>,
    max_latency: Option<ConfigDuration>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    fn into_vec(self) -> Vec<String> {
        match self {
            OneOrMany::One(expr) => vec![expr],
            OneOrMany::Many(exprs) => exprs,
        }
    }
}

impl RawConfig {
    fn validate(self) -> Result<RunConfig, ConfigError> {
        let stages = self
            .stages
            .into_iter()
            .enumerate()
            .map(|(idx, stage)| {
                let duration = stage
                    .duration
                    .non_negative()
                    .ok_or(ConfigError::NegativeDuration { stage: idx })?;
                let target =
                    u64::try_from(stage.target).map_err(|_| ConfigError::NegativeTarget {
                        stage: idx,
                    })?;
                Ok(Stage::new(duration, target).with_ramp(stage.ramp))
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;

        let mut config = RunConfig::new(&self.target_url, stages)?;

        for (metric, expressions) in self.thresholds {
            for expression in expressions.into_vec() {
                config = config.with_threshold(&metric, &expression)?;
            }
        }

        if let Some(checks) = self.checks {
            config.checks = checks
                .into_iter()
                .enumerate()
                .map(|(index, raw)| raw.into_check(index))
                .collect::<Result<_, _>>()?;
        }

        if let Some(sleep) = self.sleep {
            config.sleep = sleep.non_negative().ok_or(ConfigError::InvalidInterval {
                field: "sleep",
                reason: "must not be negative",
            })?;
        }
        if let Some(tick) = self.tick {
            config.tick = positive_config("tick", tick)?;
        }
        if let Some(timeout) = self.request_timeout {
            config.request_timeout = positive_config("request_timeout", timeout)?;
        }
        if let Some(timeout) = self.connect_timeout {
            config.connect_timeout = positive_config("connect_timeout", timeout)?;
        }
        if let Some(user_agent) = self.user_agent {
            config.user_agent = user_agent;
        }

        Ok(config)
    }
}

impl RawCheck {
    fn into_check(self, index: usize) -> Result<Check, ConfigError> {
        let check = match (self.status, self.max_latency) {
            (Some(status), None) => Check::status(status),
            (None, Some(latency)) => {
                let latency = latency
                    .non_negative()
                    .ok_or(ConfigError::InvalidCheck { index })?;
                Check::max_latency(latency)
            }
            _ => return Err(ConfigError::InvalidCheck { index }),
        };

        Ok(match self.name {
            Some(name) => check.named(name),
            None => check,
        })
    }
}

fn parse_url(raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw).map_err(|err| ConfigError::InvalidUrl {
        url: raw.to_string(),
        reason: err.to_string(),
    })?;

    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(ConfigError::InvalidUrl {
            url: raw.to_string(),
            reason: format!("unsupported scheme `{scheme}`"),
        }),
    }
}

fn positive(field: &'static str, duration: Duration) -> Result<Duration, ConfigError> {
    if duration.is_zero() {
        Err(ConfigError::InvalidInterval {
            field,
            reason: "must be positive",
        })
    } else {
        Ok(duration)
    }
}

fn positive_config(field: &'static str, duration: ConfigDuration) -> Result<Duration, ConfigError> {
    let duration = duration.non_negative().ok_or(ConfigError::InvalidInterval {
        field,
        reason: "must be positive",
    })?;
    positive(field, duration)
}

/// A duration as written in a configuration file. Either a humantime string (`"10s"`,
/// `"1m 30s"`) or a number of seconds. Negative values are kept so validation can reject them
/// with a proper error.
#[derive(Debug, Clone, Copy, PartialEq)]
struct ConfigDuration {
    negative: bool,
    duration: Duration,
}

impl ConfigDuration {
    fn non_negative(self) -> Option<Duration> {
        if self.negative && !self.duration.is_zero() {
            None
        } else {
            Some(self.duration)
        }
    }
}

impl<'de> Deserialize<'de> for ConfigDuration {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct Visitor;

        impl<'de> serde::de::Visitor<'de> for Visitor {
            type Value = ConfigDuration;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a duration string (e.g. \"10s\") or a number of seconds")
            }

            fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(ConfigDuration {
                    negative: false,
                    duration: Duration::from_secs(v),
                })
            }

            fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(ConfigDuration {
                    negative: v < 0,
                    duration: Duration::from_secs(v.unsigned_abs()),
                })
            }

            fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                if !v.is_finite() {
                    return Err(E::custom("duration must be finite"));
                }
                Duration::try_from_secs_f64(v.abs())
                    .map(|duration| ConfigDuration {
                        negative: v < 0.,
                        duration,
                    })
                    .map_err(E::custom)
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                let v = v.trim();
                let (negative, v) = match v.strip_prefix('-') {
                    Some(rest) => (true, rest.trim_start()),
                    None => (false, v),
                };
                let duration = humantime::parse_duration(v).map_err(E::custom)?;
                Ok(ConfigDuration { negative, duration })
            }
        }

        deserializer.deserialize_any(Visitor)
    }
}
