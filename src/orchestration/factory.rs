//! Message Publisher Factory - Public entry point for building publishers
//!
//! Given `{provider, options}` the factory resolves the provider id through
//! the [`PublisherRegistry`] and constructs the publisher. Missing options are
//! reported before the provider id is looked at.

use crate::core::config::{MessagingConfig, ProviderOptions};
use crate::core::error::{MessagingError, Result};
use crate::core::logging::PublisherLogger;
use crate::core::traits::MessagePublisher;
use crate::providers::context::PublisherContext;
use crate::providers::registry::PublisherRegistry;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Logger label for factory failures
const FACTORY: &str = "factory";

#[derive(Debug, Clone)]
pub struct MessagePublisherFactory {
    registry: Arc<PublisherRegistry>,
    context: PublisherContext,
}

impl MessagePublisherFactory {
    pub fn new(registry: Arc<PublisherRegistry>, context: PublisherContext) -> Self {
        Self { registry, context }
    }

    /// Factory over the publishers shipped with this crate
    ///
    /// # Examples
    ///
    /// ```
    /// use cloud_messaging::{MemoryBroker, MessagePublisherFactory, PublisherContext};
    ///
    /// let broker = MemoryBroker::new();
    /// let factory = MessagePublisherFactory::with_builtin_providers(PublisherContext::in_memory(&broker)).unwrap();
    /// assert_eq!(factory.registry().providers(), vec!["AzureServiceBus", "GooglePubSub"]);
    /// ```
    pub fn with_builtin_providers(context: PublisherContext) -> Result<Self> {
        Ok(Self::new(Arc::new(PublisherRegistry::builtin()?), context))
    }

    pub fn registry(&self) -> &PublisherRegistry {
        &self.registry
    }

    pub fn context(&self) -> &PublisherContext {
        &self.context
    }

    /// Build a publisher for `provider_options`
    ///
    /// # Errors
    ///
    /// - [`MessagingError::OptionsMissing`] when no options map was supplied
    /// - [`MessagingError::ProviderNotFound`] when no publisher serves the id
    /// - any construction error of the resolved publisher, unchanged
    pub fn create(&self, provider_options: &ProviderOptions) -> Result<Arc<dyn MessagePublisher>> {
        let messaging = self.context.messaging();

        let result = self.construct(provider_options);
        match &result {
            Ok(publisher) => {
                let info = publisher.info();
                PublisherLogger::new(info.provider, messaging).created(&info.endpoint);
            }
            Err(error) => PublisherLogger::new(FACTORY, messaging)
                .creation_failed(&provider_options.provider, error),
        }
        result
    }

    /// Build every publisher of a configuration file, keyed by name
    ///
    /// Fails on the first publisher, in name order, that cannot be built.
    pub fn create_all(
        &self,
        config: &MessagingConfig,
    ) -> Result<BTreeMap<String, Arc<dyn MessagePublisher>>> {
        config
            .publishers
            .iter()
            .map(|(name, provider_options)| {
                self.create(provider_options)
                    .map(|publisher| (name.clone(), publisher))
            })
            .collect()
    }

    fn construct(&self, provider_options: &ProviderOptions) -> Result<Arc<dyn MessagePublisher>> {
        let options = provider_options
            .options
            .as_ref()
            .ok_or(MessagingError::OptionsMissing)?;

        let construct = self.registry.resolve(&provider_options.provider)?;
        construct(options, &self.context)
    }
}
