//! Azure Service Bus retry settings
//!
//! Keys: `RetryMode` (`Fixed` | `Exponential`), `Delay`, `MaxDelay`,
//! `MaxRetries`. Durations are integer milliseconds.

use crate::broker::BrokerErrorKind;
use crate::core::config::OptionMap;
use crate::core::error::Result;
use crate::core::retry::{RetryPolicy, RetrySchedule, serialize_millis};
use crate::core::traits::RetrySettingsTranslator;
use crate::providers::AZURE_SERVICE_BUS;
use crate::providers::settings::SettingsReader;
use serde::Serialize;
use std::time::Duration;

pub const DELAY_KEY: &str = "Delay";
pub const MAX_DELAY_KEY: &str = "MaxDelay";
pub const MAX_RETRIES_KEY: &str = "MaxRetries";

/// Keys that require `RetryMode`, in the order they are checked
const MODE_SPECIFIC_KEYS: [&str; 3] = [DELAY_KEY, MAX_DELAY_KEY, MAX_RETRIES_KEY];

const MAX_RETRIES_RANGE: std::ops::RangeInclusive<i32> = 0..=100;
const DELAY_RANGE_MS: std::ops::RangeInclusive<i32> = 1..=300_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ServiceBusRetryMode {
    Fixed,
    Exponential,
}

impl ServiceBusRetryMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Fixed" => Some(Self::Fixed),
            "Exponential" => Some(Self::Exponential),
            _ => None,
        }
    }

    fn backoff_multiplier(self) -> f64 {
        match self {
            Self::Fixed => 1.0,
            Self::Exponential => 2.0,
        }
    }
}

/// Retry options handed to the Service Bus client
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceBusRetryOptions {
    pub mode: ServiceBusRetryMode,
    #[serde(rename = "delayMs", serialize_with = "serialize_millis")]
    pub delay: Duration,
    #[serde(rename = "maxDelayMs", serialize_with = "serialize_millis")]
    pub max_delay: Duration,
    pub max_retries: u32,
}

impl Default for ServiceBusRetryOptions {
    fn default() -> Self {
        Self {
            mode: ServiceBusRetryMode::Exponential,
            delay: Duration::from_millis(800),
            max_delay: Duration::from_secs(60),
            max_retries: 3,
        }
    }
}

impl RetryPolicy for ServiceBusRetryOptions {
    fn schedule(&self) -> RetrySchedule {
        RetrySchedule {
            max_attempts: self.max_retries.saturating_add(1),
            initial_delay: self.delay,
            max_delay: self.max_delay,
            backoff_multiplier: self.mode.backoff_multiplier(),
            retry_on: vec![
                BrokerErrorKind::Unavailable,
                BrokerErrorKind::Timeout,
                BrokerErrorKind::Throttled,
            ],
        }
    }
}

/// Translates option maps into [`ServiceBusRetryOptions`]
#[derive(Debug, Default, Clone, Copy)]
pub struct ServiceBusRetryTranslator;

impl RetrySettingsTranslator for ServiceBusRetryTranslator {
    type Policy = ServiceBusRetryOptions;

    fn translate(&self, options: &OptionMap) -> Result<ServiceBusRetryOptions> {
        let reader = SettingsReader::new(AZURE_SERVICE_BUS, options);

        let Some(mode) = reader.retry_mode() else {
            reader.reject_without_mode(&MODE_SPECIFIC_KEYS)?;
            return Ok(ServiceBusRetryOptions::default());
        };

        let mode = mode
            .and_then(ServiceBusRetryMode::parse)
            .ok_or_else(|| reader.unsupported_mode(mode))?;

        let max_retries = reader.count(MAX_RETRIES_KEY, MAX_RETRIES_RANGE)?;
        let delay = reader.millis(DELAY_KEY, DELAY_RANGE_MS)?;
        let max_delay = reader.millis(MAX_DELAY_KEY, 0..=i32::MAX)?;

        Ok(ServiceBusRetryOptions {
            mode,
            delay,
            max_delay,
            max_retries,
        })
    }
}
