use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Output format for the service's `tracing` subscriber.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum LogFormat {
    /// One JSON object per event, for collection by the platform log daemon.
    #[default]
    Json,
    /// Single-line human-readable events for bench debugging.
    Compact,
}

/// Error returned when text names no known [`LogFormat`].
pub type LogFormatParseError = strum::ParseError;
