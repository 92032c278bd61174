pub mod broker;
pub mod core;
pub mod orchestration;
pub mod providers;
pub mod security;

pub use crate::core::*;
pub use broker::{
    BatchLimits, BrokerClient, BrokerConnector, BrokerEndpoint, BrokerError, BrokerErrorKind,
    BrokerSender, Delivery, MemoryBroker, MessageBatch, Payload,
};
pub use orchestration::{BatchAssembler, BatchReport, MessagePublisherFactory};
pub use providers::{
    AZURE_SERVICE_BUS, GOOGLE_PUBSUB, PubSubPublisher, PubSubRetrySettings, PubSubRetryTranslator,
    PublisherContext, PublisherRegistry, ServiceBusPublisher, ServiceBusRetryMode,
    ServiceBusRetryOptions, ServiceBusRetryTranslator,
};
pub use security::{mask_connection_string, mask_secret};
