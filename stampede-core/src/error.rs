use thiserror::Error;

/// Fatal problems found while loading a run configuration. Nothing is started when one of these
/// is returned.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Unable to read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("No stages configured")]
    EmptyStages,

    #[error("Stage {stage} has a negative duration")]
    NegativeDuration { stage: usize },

    #[error("Stage {stage} has a negative target")]
    NegativeTarget { stage: usize },

    #[error("Invalid target URL `{url}`: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Check {index} must set exactly one of `status` or `max_latency`")]
    InvalidCheck { index: usize },

    #[error("`{field}` {reason}")]
    InvalidInterval {
        field: &'static str,
        reason: &'static str,
    },

    #[error("Threshold on `{metric}` is invalid: {source}")]
    Threshold {
        metric: String,
        #[source]
        source: ThresholdError,
    },
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ThresholdError {
    #[error("unknown metric `{0}`")]
    UnknownMetric(String),

    #[error("expression `{0}` has no comparison operator")]
    MissingOperator(String),

    #[error("unknown aggregation `{0}`")]
    UnknownAggregation(String),

    #[error("percentile `{0}` must be between 0 and 100")]
    InvalidPercentile(String),

    #[error("`{aggregation}` is not available for `{metric}`")]
    UnsupportedAggregation {
        metric: &'static str,
        aggregation: String,
    },

    #[error("invalid threshold value `{0}`")]
    InvalidValue(String),
}
