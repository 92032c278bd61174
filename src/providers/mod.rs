//! Provider implementations
//!
//! One publisher and one retry translator per broker family, plus the
//! registry that maps provider ids to publisher constructors.

pub mod context;
pub mod pubsub;
pub mod pubsub_retry;
pub mod registry;
pub mod service_bus;
pub mod service_bus_retry;
pub(crate) mod session;
pub(crate) mod settings;

/// Provider id of the Azure Service Bus publisher
pub const AZURE_SERVICE_BUS: &str = "AzureServiceBus";

/// Provider id of the Google Pub/Sub publisher
pub const GOOGLE_PUBSUB: &str = "GooglePubSub";

pub use context::{PubSubConnector, PublisherContext, ServiceBusConnector};
pub use pubsub::PubSubPublisher;
pub use pubsub_retry::{PubSubRetrySettings, PubSubRetryTranslator};
pub use registry::{
    ProvidedPublisher, PublisherConstructor, PublisherRegistration, PublisherRegistry,
    builtin_registrations,
};
pub use service_bus::ServiceBusPublisher;
pub use service_bus_retry::{ServiceBusRetryMode, ServiceBusRetryOptions, ServiceBusRetryTranslator};
pub use settings::RETRY_MODE_KEY;
