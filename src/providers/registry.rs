//! Publisher Registry - Maps provider ids to publisher constructors
//!
//! The registry is built once from a static registration table and is
//! read-only afterwards. Two registrations declaring the same provider id are
//! rejected at build time.
//!
//! # Example
//!
//! ```
//! use cloud_messaging::providers::PublisherRegistry;
//!
//! let registry = PublisherRegistry::builtin().unwrap();
//! assert_eq!(registry.providers(), vec!["AzureServiceBus", "GooglePubSub"]);
//! assert!(registry.resolve("Unknown").is_err());
//! ```

use crate::core::config::OptionMap;
use crate::core::error::{MessagingError, Result};
use crate::core::traits::MessagePublisher;
use crate::providers::context::PublisherContext;
use crate::providers::pubsub::PubSubPublisher;
use crate::providers::service_bus::ServiceBusPublisher;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;
use std::sync::Arc;

/// Builds a ready publisher from validated-on-construction options
pub type PublisherConstructor =
    fn(&OptionMap, &PublisherContext) -> Result<Arc<dyn MessagePublisher>>;

/// One row of the registration table
#[derive(Clone, Copy)]
pub struct PublisherRegistration {
    pub provider: &'static str,
    pub construct: PublisherConstructor,
}

impl fmt::Debug for PublisherRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PublisherRegistration")
            .field("provider", &self.provider)
            .finish_non_exhaustive()
    }
}

/// A publisher that declares the provider id it serves
pub trait ProvidedPublisher: MessagePublisher + Sized + 'static {
    const PROVIDER: &'static str;

    fn from_options(options: &OptionMap, context: &PublisherContext) -> Result<Self>;

    fn registration() -> PublisherRegistration {
        PublisherRegistration {
            provider: Self::PROVIDER,
            construct: construct::<Self>,
        }
    }
}

fn construct<P: ProvidedPublisher>(
    options: &OptionMap,
    context: &PublisherContext,
) -> Result<Arc<dyn MessagePublisher>> {
    Ok(Arc::new(P::from_options(options, context)?))
}

/// Registration table of the publishers shipped with this crate
pub fn builtin_registrations() -> Vec<PublisherRegistration> {
    vec![
        ServiceBusPublisher::registration(),
        PubSubPublisher::registration(),
    ]
}

#[derive(Debug, Clone)]
pub struct PublisherRegistry {
    entries: HashMap<&'static str, PublisherRegistration>,
}

impl PublisherRegistry {
    /// Build a registry, failing on duplicate provider ids
    pub fn build(registrations: impl IntoIterator<Item = PublisherRegistration>) -> Result<Self> {
        let mut entries = HashMap::new();

        for registration in registrations {
            match entries.entry(registration.provider) {
                Entry::Occupied(_) => {
                    return Err(MessagingError::DuplicateProvider {
                        provider: registration.provider.to_string(),
                    });
                }
                Entry::Vacant(slot) => {
                    slot.insert(registration);
                }
            }
        }

        Ok(Self { entries })
    }

    pub fn builtin() -> Result<Self> {
        Self::build(builtin_registrations())
    }

    /// Constructor registered for `provider`; ids match exactly
    pub fn resolve(&self, provider: &str) -> Result<PublisherConstructor> {
        self.entries
            .get(provider)
            .map(|registration| registration.construct)
            .ok_or_else(|| MessagingError::ProviderNotFound {
                provider: provider.to_string(),
            })
    }

    pub fn contains(&self, provider: &str) -> bool {
        self.entries.contains_key(provider)
    }

    /// Registered provider ids, sorted
    pub fn providers(&self) -> Vec<&'static str> {
        let mut providers: Vec<_> = self.entries.keys().copied().collect();
        providers.sort_unstable();
        providers
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
