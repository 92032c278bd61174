//! Error handling for message publishing
//!
//! Every failure surfaces as a [`MessagingError`] variant. Variants are grouped
//! into kinds (configuration, serialization, capacity, broker, cancellation)
//! and carry a stable code plus recovery guidance.

use crate::broker::BrokerError;
use thiserror::Error;

/// Literal echoed for option values that are present but null
pub const NULL_LITERAL: &str = "(null)";

/// Broad classification of a [`MessagingError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing, contradictory or malformed settings; reported before any network action
    Configuration,
    /// A message could not be encoded
    Serialization,
    /// A message does not fit into an empty broker batch
    Capacity,
    /// Failure reported by the broker client
    Broker,
    /// The caller cancelled the operation
    Cancelled,
}

/// Main error type for messaging operations
#[derive(Error, Debug)]
pub enum MessagingError {
    // Factory and registry errors
    #[error("Provider options can't be null")]
    OptionsMissing,

    #[error("There is no publisher connected to provider: {provider}. Check provider name")]
    ProviderNotFound { provider: String },

    #[error("Provider {provider} is declared by more than one publisher")]
    DuplicateProvider { provider: String },

    // Publisher construction errors
    #[error("[{provider}] {key} required")]
    ConnectionSettingMissing {
        provider: &'static str,
        key: &'static str,
    },

    // Retry settings errors
    #[error("[{provider}] Invalid settings. \"RetryMode\" is missing, but \"{key}\" is present. Remove retry settings completely, or define them properly")]
    RetryModeMissing {
        provider: &'static str,
        key: &'static str,
    },

    #[error("[{provider}] Retry mode: {mode} not supported")]
    UnsupportedRetryMode { provider: &'static str, mode: String },

    #[error("[{provider}] Invalid settings. \"{key}\" not found")]
    SettingNotFound {
        provider: &'static str,
        key: &'static str,
    },

    #[error("[{provider}] Invalid settings. \"{key}\" has a value: {value}. Must be {expected}")]
    InvalidSetting {
        provider: &'static str,
        key: &'static str,
        value: String,
        expected: &'static str,
    },

    #[error("[{provider}] Invalid settings. \"{key}\" has a value: {value}. Allowed: {allowed}")]
    SettingOutOfRange {
        provider: &'static str,
        key: &'static str,
        value: String,
        allowed: String,
    },

    // Configuration file errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Serialization errors
    #[error("Failed to serialize message: {0}")]
    Serialization(#[from] serde_json::Error),

    // Capacity errors
    #[error("The message is too large to fit in the batch: message #{index} is {size} bytes, batch limit is {limit} bytes: {preview}")]
    MessageTooLarge {
        index: usize,
        size: usize,
        limit: usize,
        preview: String,
    },

    // Broker errors
    #[error("[{provider}] Broker error: {source}")]
    Broker {
        provider: &'static str,
        #[source]
        source: BrokerError,
    },

    #[error("[{provider}] Publish task failed: {message}")]
    TaskFailed {
        provider: &'static str,
        message: String,
    },

    #[error("Operation cancelled")]
    Cancelled,
}

/// Result type alias for messaging operations
pub type Result<T> = std::result::Result<T, MessagingError>;

impl MessagingError {
    /// Wrap a broker client failure with the provider that observed it
    pub fn broker(provider: &'static str, source: BrokerError) -> Self {
        Self::Broker { provider, source }
    }

    /// Classification of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::OptionsMissing
            | Self::ProviderNotFound { .. }
            | Self::DuplicateProvider { .. }
            | Self::ConnectionSettingMissing { .. }
            | Self::RetryModeMissing { .. }
            | Self::UnsupportedRetryMode { .. }
            | Self::SettingNotFound { .. }
            | Self::InvalidSetting { .. }
            | Self::SettingOutOfRange { .. }
            | Self::Config(_) => ErrorKind::Configuration,
            Self::Serialization(_) => ErrorKind::Serialization,
            Self::MessageTooLarge { .. } => ErrorKind::Capacity,
            Self::Broker { .. } | Self::TaskFailed { .. } => ErrorKind::Broker,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// The option key this error is about, if any
    pub fn key(&self) -> Option<&'static str> {
        match self {
            Self::ConnectionSettingMissing { key, .. }
            | Self::RetryModeMissing { key, .. }
            | Self::SettingNotFound { key, .. }
            | Self::InvalidSetting { key, .. }
            | Self::SettingOutOfRange { key, .. } => Some(key),
            Self::UnsupportedRetryMode { .. } => Some("RetryMode"),
            _ => None,
        }
    }

    /// Check if retrying the same call may succeed
    ///
    /// Only transient broker failures qualify; configuration and capacity
    /// errors fail the same way every time.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Broker { source, .. } => source.is_transient(),
            _ => false,
        }
    }

    /// Get suggested actions for this error
    pub fn suggested_actions(&self) -> Vec<&'static str> {
        match self {
            Self::OptionsMissing => vec!["Pass a settings map, even an empty one"],
            Self::ProviderNotFound { .. } => vec![
                "Check the provider name for typos",
                "Run `cloud-messaging providers` to list registered providers",
            ],
            Self::DuplicateProvider { .. } => {
                vec!["Give every publisher registration a unique provider id"]
            }
            Self::ConnectionSettingMissing { .. } => {
                vec!["Add the connection setting to the provider options"]
            }
            Self::RetryModeMissing { .. } => vec![
                "Add \"RetryMode\" to the provider options",
                "Or remove retry settings completely to use the broker defaults",
            ],
            Self::UnsupportedRetryMode { .. } => {
                vec!["Use one of the retry modes supported by this provider"]
            }
            Self::SettingNotFound { .. } => {
                vec!["Add every setting required by the selected retry mode"]
            }
            Self::InvalidSetting { .. } | Self::SettingOutOfRange { .. } => {
                vec!["Fix the setting value; durations are integer milliseconds"]
            }
            Self::Config(_) => vec![
                "Check the configuration file syntax",
                "Make sure every ${VAR} reference is set in the environment",
            ],
            Self::Serialization(_) => vec!["Check that the message can be encoded as JSON"],
            Self::MessageTooLarge { .. } => vec![
                "Split the message into smaller messages",
                "Publish it on its own with a single-message publish",
            ],
            Self::Broker { .. } | Self::TaskFailed { .. } => vec![
                "Check broker connectivity and credentials",
                "Retry later if the failure is transient",
            ],
            Self::Cancelled => vec!["The operation was cancelled by the caller"],
        }
    }

    /// Get error code for this error
    pub fn code(&self) -> &'static str {
        match self {
            Self::OptionsMissing => "OPTIONS_MISSING",
            Self::ProviderNotFound { .. } => "PROVIDER_NOT_FOUND",
            Self::DuplicateProvider { .. } => "DUPLICATE_PROVIDER",
            Self::ConnectionSettingMissing { .. } => "CONNECTION_SETTING_MISSING",
            Self::RetryModeMissing { .. } => "RETRY_MODE_MISSING",
            Self::UnsupportedRetryMode { .. } => "UNSUPPORTED_RETRY_MODE",
            Self::SettingNotFound { .. } => "SETTING_NOT_FOUND",
            Self::InvalidSetting { .. } => "INVALID_SETTING",
            Self::SettingOutOfRange { .. } => "SETTING_OUT_OF_RANGE",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::MessageTooLarge { .. } => "MESSAGE_TOO_LARGE",
            Self::Broker { .. } => "BROKER_ERROR",
            Self::TaskFailed { .. } => "TASK_FAILED",
            Self::Cancelled => "CANCELLED",
        }
    }
}
