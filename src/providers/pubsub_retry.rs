//! Google Pub/Sub retry settings
//!
//! Keys: `RetryMode` (`Constant` | `Exponential`), `MaxAttempts`, then
//! `Backoff` for constant mode or `InitialBackoff`, `MaxBackoff` and
//! `BackoffMultiplier` for exponential mode. When `RetryMode` is absent the
//! translated policy is `None` and the client keeps its own defaults.

use crate::broker::BrokerErrorKind;
use crate::core::config::OptionMap;
use crate::core::error::Result;
use crate::core::retry::{RetryPolicy, RetrySchedule, serialize_millis};
use crate::core::traits::RetrySettingsTranslator;
use crate::providers::GOOGLE_PUBSUB;
use crate::providers::settings::SettingsReader;
use serde::Serialize;
use std::time::Duration;

pub const MAX_ATTEMPTS_KEY: &str = "MaxAttempts";
pub const BACKOFF_KEY: &str = "Backoff";
pub const INITIAL_BACKOFF_KEY: &str = "InitialBackoff";
pub const MAX_BACKOFF_KEY: &str = "MaxBackoff";
pub const BACKOFF_MULTIPLIER_KEY: &str = "BackoffMultiplier";

/// Keys that require `RetryMode`, in the order they are checked
const MODE_SPECIFIC_KEYS: [&str; 5] = [
    MAX_ATTEMPTS_KEY,
    BACKOFF_KEY,
    INITIAL_BACKOFF_KEY,
    MAX_BACKOFF_KEY,
    BACKOFF_MULTIPLIER_KEY,
];

/// Retry settings handed to the Pub/Sub publisher client
///
/// Only `Unavailable` failures are retried, whatever the mode.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "mode")]
pub enum PubSubRetrySettings {
    #[serde(rename_all = "camelCase")]
    Constant {
        max_attempts: u32,
        #[serde(rename = "backoffMs", serialize_with = "serialize_millis")]
        backoff: Duration,
    },
    #[serde(rename_all = "camelCase")]
    Exponential {
        max_attempts: u32,
        #[serde(rename = "initialBackoffMs", serialize_with = "serialize_millis")]
        initial_backoff: Duration,
        #[serde(rename = "maxBackoffMs", serialize_with = "serialize_millis")]
        max_backoff: Duration,
        backoff_multiplier: f64,
    },
}

impl PubSubRetrySettings {
    pub fn max_attempts(&self) -> u32 {
        match self {
            Self::Constant { max_attempts, .. } | Self::Exponential { max_attempts, .. } => {
                *max_attempts
            }
        }
    }

    pub fn initial_backoff(&self) -> Duration {
        match self {
            Self::Constant { backoff, .. } => *backoff,
            Self::Exponential {
                initial_backoff, ..
            } => *initial_backoff,
        }
    }

    pub fn max_backoff(&self) -> Duration {
        match self {
            Self::Constant { backoff, .. } => *backoff,
            Self::Exponential { max_backoff, .. } => *max_backoff,
        }
    }

    pub fn backoff_multiplier(&self) -> f64 {
        match self {
            Self::Constant { .. } => 1.0,
            Self::Exponential {
                backoff_multiplier, ..
            } => *backoff_multiplier,
        }
    }
}

impl RetryPolicy for PubSubRetrySettings {
    fn schedule(&self) -> RetrySchedule {
        RetrySchedule {
            max_attempts: self.max_attempts(),
            initial_delay: self.initial_backoff(),
            max_delay: self.max_backoff(),
            backoff_multiplier: self.backoff_multiplier(),
            retry_on: vec![BrokerErrorKind::Unavailable],
        }
    }
}

/// `None` leaves retries to the client defaults
impl RetryPolicy for Option<PubSubRetrySettings> {
    fn schedule(&self) -> RetrySchedule {
        match self {
            Some(settings) => settings.schedule(),
            None => RetrySchedule {
                max_attempts: 5,
                initial_delay: Duration::from_millis(100),
                max_delay: Duration::from_secs(60),
                backoff_multiplier: 1.3,
                ..RetrySchedule::default()
            },
        }
    }
}

/// Translates option maps into optional [`PubSubRetrySettings`]
#[derive(Debug, Default, Clone, Copy)]
pub struct PubSubRetryTranslator;

impl PubSubRetryTranslator {
    fn constant(reader: &SettingsReader<'_>) -> Result<PubSubRetrySettings> {
        let max_attempts = reader.count(MAX_ATTEMPTS_KEY, 1..=i32::MAX)?;
        let backoff = reader.millis(BACKOFF_KEY, 0..=i32::MAX)?;

        Ok(PubSubRetrySettings::Constant {
            max_attempts,
            backoff,
        })
    }

    fn exponential(reader: &SettingsReader<'_>) -> Result<PubSubRetrySettings> {
        let max_attempts = reader.count(MAX_ATTEMPTS_KEY, 1..=i32::MAX)?;
        let initial_backoff = reader.millis(INITIAL_BACKOFF_KEY, 0..=i32::MAX)?;
        let max_backoff = reader.millis(MAX_BACKOFF_KEY, 0..=i32::MAX)?;
        let backoff_multiplier = reader.multiplier(BACKOFF_MULTIPLIER_KEY)?;

        if max_backoff < initial_backoff {
            return Err(reader.out_of_range(
                MAX_BACKOFF_KEY,
                max_backoff.as_millis(),
                format!(
                    "at least {INITIAL_BACKOFF_KEY} ({} milliseconds)",
                    initial_backoff.as_millis()
                ),
            ));
        }

        Ok(PubSubRetrySettings::Exponential {
            max_attempts,
            initial_backoff,
            max_backoff,
            backoff_multiplier,
        })
    }
}

impl RetrySettingsTranslator for PubSubRetryTranslator {
    type Policy = Option<PubSubRetrySettings>;

    fn translate(&self, options: &OptionMap) -> Result<Option<PubSubRetrySettings>> {
        let reader = SettingsReader::new(GOOGLE_PUBSUB, options);

        let Some(mode) = reader.retry_mode() else {
            reader.reject_without_mode(&MODE_SPECIFIC_KEYS)?;
            return Ok(None);
        };

        match mode {
            Some("Constant") => Self::constant(&reader).map(Some),
            Some("Exponential") => Self::exponential(&reader).map(Some),
            other => Err(reader.unsupported_mode(other)),
        }
    }
}
