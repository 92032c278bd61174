//! Dependencies shared by every publisher a factory builds

use crate::broker::{BrokerConnector, MemoryBroker};
use crate::core::config::MessagingOptions;
use crate::core::serializer::{JsonSerializer, PayloadSerializer};
use crate::providers::pubsub_retry::PubSubRetrySettings;
use crate::providers::service_bus_retry::ServiceBusRetryOptions;
use std::fmt;
use std::sync::Arc;

pub type ServiceBusConnector = Arc<dyn BrokerConnector<ServiceBusRetryOptions>>;
pub type PubSubConnector = Arc<dyn BrokerConnector<Option<PubSubRetrySettings>>>;

/// Messaging options, payload serializer and one broker connector per provider
#[derive(Clone)]
pub struct PublisherContext {
    messaging: MessagingOptions,
    serializer: Arc<dyn PayloadSerializer>,
    service_bus: ServiceBusConnector,
    pubsub: PubSubConnector,
}

impl PublisherContext {
    pub fn new(service_bus: ServiceBusConnector, pubsub: PubSubConnector) -> Self {
        Self {
            messaging: MessagingOptions::default(),
            serializer: Arc::new(JsonSerializer),
            service_bus,
            pubsub,
        }
    }

    /// Route both providers to the same in-memory broker
    pub fn in_memory(broker: &MemoryBroker) -> Self {
        Self::new(Arc::new(broker.clone()), Arc::new(broker.clone()))
    }

    pub fn with_messaging_options(mut self, messaging: MessagingOptions) -> Self {
        self.messaging = messaging;
        self
    }

    pub fn with_serializer(mut self, serializer: Arc<dyn PayloadSerializer>) -> Self {
        self.serializer = serializer;
        self
    }

    pub fn messaging(&self) -> &MessagingOptions {
        &self.messaging
    }

    pub fn serializer(&self) -> &Arc<dyn PayloadSerializer> {
        &self.serializer
    }

    pub fn service_bus(&self) -> &ServiceBusConnector {
        &self.service_bus
    }

    pub fn pubsub(&self) -> &PubSubConnector {
        &self.pubsub
    }
}

impl fmt::Debug for PublisherContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PublisherContext")
            .field("messaging", &self.messaging)
            .field("serializer", &self.serializer)
            .finish_non_exhaustive()
    }
}
