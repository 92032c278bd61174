//! Shared reading rules for retry settings
//!
//! Both retry translators validate the same way: the `RetryMode` selector is
//! dispatched first, then every required field is parsed on its own. A
//! missing field and a malformed field are different errors, and malformed
//! values are echoed back (`"(null)"` for keys present without a value).

use crate::core::config::OptionMap;
use crate::core::error::{MessagingError, NULL_LITERAL, Result};
use std::ops::RangeInclusive;
use std::time::Duration;

pub const RETRY_MODE_KEY: &str = "RetryMode";

/// Reads typed retry settings out of an [`OptionMap`] for one provider
#[derive(Debug, Clone, Copy)]
pub(crate) struct SettingsReader<'a> {
    provider: &'static str,
    options: &'a OptionMap,
}

impl<'a> SettingsReader<'a> {
    pub(crate) fn new(provider: &'static str, options: &'a OptionMap) -> Self {
        Self { provider, options }
    }

    /// `None` when the selector is absent, `Some(None)` when it is keyed but null
    pub(crate) fn retry_mode(&self) -> Option<Option<&'a str>> {
        self.options.lookup(RETRY_MODE_KEY)
    }

    /// Fail on the first mode-specific key present without a selector
    pub(crate) fn reject_without_mode(&self, keys: &[&'static str]) -> Result<()> {
        match keys.iter().find(|key| self.options.contains_key(key)) {
            Some(&key) => Err(MessagingError::RetryModeMissing {
                provider: self.provider,
                key,
            }),
            None => Ok(()),
        }
    }

    pub(crate) fn unsupported_mode(&self, mode: Option<&str>) -> MessagingError {
        MessagingError::UnsupportedRetryMode {
            provider: self.provider,
            mode: mode.unwrap_or(NULL_LITERAL).to_string(),
        }
    }

    /// Parse a 32-bit signed integer setting
    pub(crate) fn integer(&self, key: &'static str) -> Result<i32> {
        let raw = self.required(key)?;
        raw.and_then(|value| value.trim().parse::<i32>().ok())
            .ok_or_else(|| self.invalid(key, raw, "integer"))
    }

    /// Parse an integer count and check it lies in `range`
    pub(crate) fn count(&self, key: &'static str, range: RangeInclusive<i32>) -> Result<u32> {
        let value = self.integer(key)?;
        if !range.contains(&value) || value < 0 {
            return Err(self.out_of_range(key, value, describe_range(&range, "")));
        }
        Ok(value.unsigned_abs())
    }

    /// Parse an integer millisecond setting and check it lies in `range`
    pub(crate) fn millis(&self, key: &'static str, range: RangeInclusive<i32>) -> Result<Duration> {
        let value = self.integer(key)?;
        if !range.contains(&value) || value < 0 {
            return Err(self.out_of_range(key, value, describe_range(&range, " milliseconds")));
        }
        Ok(Duration::from_millis(u64::from(value.unsigned_abs())))
    }

    /// Parse a floating point growth factor, finite and at least 1.0
    pub(crate) fn multiplier(&self, key: &'static str) -> Result<f64> {
        let raw = self.required(key)?;
        let value = raw
            .and_then(|value| value.trim().parse::<f64>().ok())
            .ok_or_else(|| self.invalid(key, raw, "a number"))?;

        if !value.is_finite() || value < 1.0 {
            return Err(self.out_of_range(key, value, "a finite number of at least 1.0".to_string()));
        }
        Ok(value)
    }

    pub(crate) fn out_of_range(
        &self,
        key: &'static str,
        value: impl ToString,
        allowed: String,
    ) -> MessagingError {
        MessagingError::SettingOutOfRange {
            provider: self.provider,
            key,
            value: value.to_string(),
            allowed,
        }
    }

    fn required(&self, key: &'static str) -> Result<Option<&'a str>> {
        self.options
            .lookup(key)
            .ok_or(MessagingError::SettingNotFound {
                provider: self.provider,
                key,
            })
    }

    fn invalid(&self, key: &'static str, raw: Option<&str>, expected: &'static str) -> MessagingError {
        MessagingError::InvalidSetting {
            provider: self.provider,
            key,
            value: raw.unwrap_or(NULL_LITERAL).to_string(),
            expected,
        }
    }
}

fn describe_range(range: &RangeInclusive<i32>, unit: &str) -> String {
    if *range.end() == i32::MAX {
        format!("at least {}{unit}", range.start())
    } else {
        format!("{} to {}{unit}", range.start(), range.end())
    }
}
