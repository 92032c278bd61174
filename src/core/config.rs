//! Configuration structures and types for cloud-messaging
//!
//! Provider settings arrive as a flat, string-keyed map. This module holds
//! that map, the `{provider, options}` pair callers hand to the factory, the
//! process-wide messaging options and the on-disk configuration model.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Default number of concurrent single-message sends in fan-out publishing
pub const DEFAULT_MAX_CONCURRENCY: usize = 16;

/// Flat provider settings map
///
/// A key may be present with a null value (`Delay: ~` in YAML). Lookups keep
/// that case apart from a missing key so validation errors can tell them apart.
///
/// # Examples
///
/// ```
/// use cloud_messaging::core::OptionMap;
///
/// let options: OptionMap = [("RetryMode", "Fixed"), ("MaxRetries", "7")]
///     .into_iter()
///     .collect();
///
/// assert_eq!(options.get("RetryMode"), Some("Fixed"));
/// assert!(options.lookup("Delay").is_none());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct OptionMap(HashMap<String, Option<String>>);

impl OptionMap {
    pub fn new() -> Self {
        Self(HashMap::new())
    }

    /// Insert a key with a value
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.0.insert(key.into(), Some(value.into()));
        self
    }

    /// Insert a key whose value is explicitly null
    pub fn insert_null(&mut self, key: impl Into<String>) -> &mut Self {
        self.0.insert(key.into(), None);
        self
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Value of a key, `None` when the key is missing or null
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|value| value.as_deref())
    }

    /// `None` when the key is missing, `Some(None)` when it is present but null
    pub fn lookup(&self, key: &str) -> Option<Option<&str>> {
        self.0.get(key).map(|value| value.as_deref())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.0.iter().map(|(key, value)| (key.as_str(), value.as_deref()))
    }

    pub(crate) fn values_mut(&mut self) -> impl Iterator<Item = (&String, &mut Option<String>)> {
        self.0.iter_mut()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for OptionMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(key, value)| (key.into(), Some(value.into())))
                .collect(),
        )
    }
}

impl From<HashMap<String, String>> for OptionMap {
    fn from(map: HashMap<String, String>) -> Self {
        map.into_iter().collect()
    }
}

/// Scalar accepted as an option value in configuration files
#[derive(Deserialize)]
#[serde(untagged)]
enum RawScalar {
    Text(String),
    Integer(i64),
    Float(f64),
    Flag(bool),
}

impl RawScalar {
    fn into_string(self) -> String {
        match self {
            RawScalar::Text(text) => text,
            RawScalar::Integer(value) => value.to_string(),
            // keeps the decimal point, so `1000.0` never reads as an integer
            RawScalar::Float(value) => format!("{value:?}"),
            RawScalar::Flag(value) => value.to_string(),
        }
    }
}

impl<'de> Deserialize<'de> for OptionMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = HashMap::<String, Option<RawScalar>>::deserialize(deserializer)?;
        Ok(Self(
            raw.into_iter()
                .map(|(key, value)| (key, value.map(RawScalar::into_string)))
                .collect(),
        ))
    }
}

/// Provider id plus its settings, as supplied by the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderOptions {
    /// Registered provider id (e.g. "AzureServiceBus")
    pub provider: String,

    /// Provider settings; absent settings are rejected by the factory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<OptionMap>,
}

impl ProviderOptions {
    pub fn new(provider: impl Into<String>, options: OptionMap) -> Self {
        Self {
            provider: provider.into(),
            options: Some(options),
        }
    }

    /// Provider id without any settings map
    pub fn without_options(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            options: None,
        }
    }
}

/// Process-wide messaging options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagingOptions {
    /// Emit tracing events from publishers and the factory
    #[serde(default)]
    pub enable_logging: bool,

    /// Upper bound on concurrent sends in fan-out publishing
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

fn default_max_concurrency() -> usize {
    DEFAULT_MAX_CONCURRENCY
}

impl Default for MessagingOptions {
    fn default() -> Self {
        Self {
            enable_logging: false,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
        }
    }
}

/// Root of a messaging configuration file
///
/// ```yaml
/// enableLogging: true
/// publishers:
///   orders:
///     provider: AzureServiceBus
///     options:
///       ConnectionString: ${SERVICEBUS_CONNECTION}
///       RetryMode: Fixed
///       MaxRetries: 7
///       Delay: 1000
///       MaxDelay: 1500
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagingConfig {
    #[serde(default)]
    pub enable_logging: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrency: Option<usize>,

    /// Named publisher definitions
    #[serde(default)]
    pub publishers: BTreeMap<String, ProviderOptions>,
}

impl MessagingConfig {
    pub fn messaging_options(&self) -> MessagingOptions {
        MessagingOptions {
            enable_logging: self.enable_logging,
            max_concurrency: self.max_concurrency.unwrap_or(DEFAULT_MAX_CONCURRENCY),
        }
    }

    pub fn publisher(&self, name: &str) -> Option<&ProviderOptions> {
        self.publishers.get(name)
    }
}
