//! Azure Service Bus publisher
//!
//! Single messages go out with one `send`. Batches are packed by the
//! [`BatchAssembler`] into as few broker batches as the batch limit allows,
//! preserving input order.

use crate::broker::BrokerEndpoint;
use crate::core::cancel::{ensure_active, guard};
use crate::core::config::OptionMap;
use crate::core::error::{MessagingError, Result};
use crate::core::logging::PublisherLogger;
use crate::core::serializer::PayloadSerializer;
use crate::core::traits::{MessagePublisher, PublisherInfo, RetrySettingsTranslator};
use crate::orchestration::batch_assembler::BatchAssembler;
use crate::providers::context::{PublisherContext, ServiceBusConnector};
use crate::providers::registry::ProvidedPublisher;
use crate::providers::service_bus_retry::{ServiceBusRetryOptions, ServiceBusRetryTranslator};
use crate::providers::session::Session;
use crate::providers::AZURE_SERVICE_BUS;
use crate::security::credentials::{endpoint_label, secret_connection_string};
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub const CONNECTION_STRING_KEY: &str = "ConnectionString";

pub struct ServiceBusPublisher {
    endpoint: BrokerEndpoint,
    retry_options: ServiceBusRetryOptions,
    connector: ServiceBusConnector,
    serializer: Arc<dyn PayloadSerializer>,
    logger: PublisherLogger,
}

impl ServiceBusPublisher {
    /// Validate options and build a publisher; no connection is opened
    ///
    /// Fails when the options are absent, when `ConnectionString` is missing
    /// or empty, or when the retry settings do not translate.
    pub fn new<T>(
        options: Option<&OptionMap>,
        translator: &T,
        context: &PublisherContext,
    ) -> Result<Self>
    where
        T: RetrySettingsTranslator<Policy = ServiceBusRetryOptions>,
    {
        let options = options.ok_or(MessagingError::OptionsMissing)?;

        let connection_string = options
            .get(CONNECTION_STRING_KEY)
            .filter(|value| !value.trim().is_empty())
            .ok_or(MessagingError::ConnectionSettingMissing {
                provider: AZURE_SERVICE_BUS,
                key: CONNECTION_STRING_KEY,
            })?;

        let retry_options = translator.translate(options)?;

        Ok(Self {
            endpoint: BrokerEndpoint::ConnectionString(secret_connection_string(connection_string)),
            retry_options,
            connector: Arc::clone(context.service_bus()),
            serializer: Arc::clone(context.serializer()),
            logger: PublisherLogger::new(AZURE_SERVICE_BUS, context.messaging()),
        })
    }

    pub fn retry_options(&self) -> &ServiceBusRetryOptions {
        &self.retry_options
    }

    async fn open(&self, topic: &str, cancel: &CancellationToken) -> Result<Session> {
        Session::open(
            self.connector.as_ref(),
            &self.endpoint,
            &self.retry_options,
            topic,
            cancel,
            &self.logger,
        )
        .await
    }
}

impl ProvidedPublisher for ServiceBusPublisher {
    const PROVIDER: &'static str = AZURE_SERVICE_BUS;

    fn from_options(options: &OptionMap, context: &PublisherContext) -> Result<Self> {
        Self::new(Some(options), &ServiceBusRetryTranslator, context)
    }
}

#[async_trait]
impl MessagePublisher for ServiceBusPublisher {
    fn info(&self) -> PublisherInfo {
        PublisherInfo {
            provider: AZURE_SERVICE_BUS,
            endpoint: endpoint_label(&self.endpoint),
            retry: serde_json::to_value(&self.retry_options).unwrap_or_default(),
        }
    }

    async fn publish_value(
        &self,
        topic: &str,
        message: serde_json::Value,
        cancel: &CancellationToken,
    ) -> Result<()> {
        ensure_active(cancel)?;
        let payload = self.serializer.to_payload(&message)?;

        let session = self.open(topic, cancel).await?;
        let outcome = guard(cancel, AZURE_SERVICE_BUS, session.sender().send(&payload)).await;
        session.close().await;

        match &outcome {
            Ok(()) => self.logger.published(topic, payload.size()),
            Err(MessagingError::Cancelled) => self.logger.cancelled(topic),
            Err(_) => {}
        }
        outcome
    }

    async fn publish_batch_values(
        &self,
        topic: &str,
        messages: Vec<serde_json::Value>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        ensure_active(cancel)?;
        if messages.is_empty() {
            return Ok(());
        }

        let session = self.open(topic, cancel).await?;
        let outcome = BatchAssembler::new(session.sender(), self.serializer.as_ref(), &self.logger)
            .send_all(&messages, cancel)
            .await;
        session.close().await;

        if let Err(MessagingError::Cancelled) = outcome {
            self.logger.cancelled(topic);
        }
        outcome.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::{BatchLimits, BrokerErrorKind, Delivery, HandleCounts, MemoryBroker};
    use crate::core::traits::MessagePublisherExt;
    use crate::providers::service_bus_retry::ServiceBusRetryMode;
    use serde_json::json;
    use std::time::Duration;

    const CONNECTION: &str =
        "Endpoint=sb://demo.servicebus.windows.net/;SharedAccessKeyName=root;SharedAccessKey=0123456789abcdef";

    fn options(extra: &[(&str, &str)]) -> OptionMap {
        let mut options: OptionMap = extra.iter().copied().collect();
        options.insert(CONNECTION_STRING_KEY, CONNECTION);
        options
    }

    fn fast_retry() -> OptionMap {
        options(&[
            ("RetryMode", "Fixed"),
            ("MaxRetries", "2"),
            ("Delay", "1"),
            ("MaxDelay", "5"),
        ])
    }

    fn publisher(broker: &MemoryBroker, options: &OptionMap) -> ServiceBusPublisher {
        ServiceBusPublisher::from_options(options, &PublisherContext::in_memory(broker)).unwrap()
    }

    async fn settled_handles(broker: &MemoryBroker) -> HandleCounts {
        for _ in 0..50 {
            let handles = broker.open_handles().await;
            if handles == HandleCounts::default() {
                return handles;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        broker.open_handles().await
    }

    #[test]
    fn test_absent_options_rejected() {
        let context = PublisherContext::in_memory(&MemoryBroker::new());

        let error = ServiceBusPublisher::new(None, &ServiceBusRetryTranslator, &context)
            .err()
            .unwrap();
        assert!(matches!(error, MessagingError::OptionsMissing));
    }

    #[test]
    fn test_connection_string_required() {
        let context = PublisherContext::in_memory(&MemoryBroker::new());
        let options: OptionMap = [("RetryMode", "Fixed")].into_iter().collect();

        let error = ServiceBusPublisher::from_options(&options, &context)
            .err()
            .unwrap();
        assert!(matches!(
            error,
            MessagingError::ConnectionSettingMissing {
                key: "ConnectionString",
                ..
            }
        ));
    }

    #[test]
    fn test_connection_checked_before_retry_settings() {
        let context = PublisherContext::in_memory(&MemoryBroker::new());
        let options: OptionMap = [("Delay", "10")].into_iter().collect();

        let error = ServiceBusPublisher::from_options(&options, &context)
            .err()
            .unwrap();
        assert_eq!(error.code(), "CONNECTION_SETTING_MISSING");
    }

    #[test]
    fn test_translation_errors_propagate() {
        let context = PublisherContext::in_memory(&MemoryBroker::new());

        let error = ServiceBusPublisher::from_options(&options(&[("MaxRetries", "3")]), &context)
            .err()
            .unwrap();
        assert_eq!(error.code(), "RETRY_MODE_MISSING");
    }

    #[tokio::test]
    async fn test_construction_opens_nothing() {
        let broker = MemoryBroker::new();
        let _publisher = publisher(&broker, &options(&[]));

        assert!(broker.connections().await.is_empty());
    }

    #[test]
    fn test_info_masks_secret() {
        let broker = MemoryBroker::new();
        let info = publisher(&broker, &fast_retry()).info();

        assert_eq!(info.provider, "AzureServiceBus");
        assert!(info.endpoint.contains("SharedAccessKey=012...def"));
        assert!(!info.endpoint.contains("0123456789abcdef"));
        assert_eq!(info.retry["mode"], "Fixed");
        assert_eq!(info.retry["maxRetries"], 2);
    }

    #[tokio::test]
    async fn test_publish_sends_one_payload_and_releases() {
        let broker = MemoryBroker::new();
        let publisher = publisher(&broker, &fast_retry());

        publisher
            .publish("orders", &json!({"id": 1}))
            .await
            .unwrap();

        let deliveries = broker.deliveries().await;
        assert_eq!(deliveries.len(), 1);
        assert_eq!(deliveries[0].entity_path, "orders");
        assert_eq!(deliveries[0].json_bodies(), vec![json!({"id": 1})]);
        assert_eq!(broker.open_handles().await, HandleCounts::default());
    }

    #[tokio::test]
    async fn test_client_opened_with_translated_policy() {
        let broker = MemoryBroker::new();
        let publisher = publisher(&broker, &fast_retry());
        assert_eq!(publisher.retry_options().mode, ServiceBusRetryMode::Fixed);

        publisher.publish("orders", "hello").await.unwrap();

        let connections = broker.connections().await;
        assert_eq!(connections.len(), 1);
        assert_eq!(connections[0].schedule.max_attempts, 3);
        assert_eq!(connections[0].schedule.initial_delay, Duration::from_millis(1));
        assert!(!connections[0].endpoint.contains("0123456789abcdef"));
    }

    #[tokio::test]
    async fn test_transient_failures_retried_under_policy() {
        let broker = MemoryBroker::new();
        broker.fail_next(BrokerErrorKind::Throttled, 2).await;
        let publisher = publisher(&broker, &fast_retry());

        publisher.publish("orders", "hello").await.unwrap();

        assert_eq!(broker.send_attempts().await, 3);
        assert_eq!(broker.deliveries().await.len(), 1);
    }

    #[tokio::test]
    async fn test_publish_failure_still_releases() {
        let broker = MemoryBroker::new();
        broker.fail_next(BrokerErrorKind::Rejected, 1).await;
        let publisher = publisher(&broker, &fast_retry());

        let error = publisher.publish("orders", "hello").await.unwrap_err();

        assert_eq!(error.code(), "BROKER_ERROR");
        assert!(!error.is_recoverable());
        assert_eq!(broker.open_handles().await, HandleCounts::default());
    }

    #[tokio::test]
    async fn test_cancelled_publish_sends_nothing() {
        let broker = MemoryBroker::new();
        let publisher = publisher(&broker, &fast_retry());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let error = publisher
            .publish_with_cancel("orders", "hello", &cancel)
            .await
            .unwrap_err();

        assert!(matches!(error, MessagingError::Cancelled));
        assert!(broker.connections().await.is_empty());
    }

    #[tokio::test]
    async fn test_cancel_during_send_releases() {
        let broker = MemoryBroker::new().with_send_delay(Duration::from_secs(30));
        let publisher = publisher(&broker, &fast_retry());
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let error = publisher
            .publish_with_cancel("orders", "hello", &cancel)
            .await
            .unwrap_err();

        assert!(matches!(error, MessagingError::Cancelled));
        assert!(broker.deliveries().await.is_empty());
        assert_eq!(broker.open_handles().await, HandleCounts::default());
    }

    #[tokio::test]
    async fn test_publish_batch_partitions_messages() {
        let broker = MemoryBroker::new().with_limits(BatchLimits {
            max_bytes: 20,
            max_messages: None,
        });
        let publisher = publisher(&broker, &fast_retry());
        let messages: Vec<_> = (0..5).map(|id| json!({ "id": id })).collect();

        publisher.publish_batch("orders", &messages).await.unwrap();

        let deliveries = broker.deliveries().await;
        assert_eq!(deliveries.len(), 3);
        let sent: Vec<_> = deliveries.iter().flat_map(|d| d.json_bodies()).collect();
        assert_eq!(sent, messages);
        assert_eq!(broker.open_handles().await, HandleCounts::default());
    }

    #[tokio::test]
    async fn test_publish_batch_oversized_message_fails_and_releases() {
        let broker = MemoryBroker::new().with_limits(BatchLimits {
            max_bytes: 16,
            max_messages: None,
        });
        let publisher = publisher(&broker, &fast_retry());
        let messages = vec![json!({"id": 1}), json!({"id": 2, "body": "oversized"})];

        let error = publisher
            .publish_batch("orders", &messages)
            .await
            .unwrap_err();

        assert!(matches!(error, MessagingError::MessageTooLarge { index: 1, .. }));
        assert_eq!(broker.deliveries().await.len(), 1);
        assert_eq!(broker.open_handles().await, HandleCounts::default());
    }

    #[tokio::test]
    async fn test_publish_batch_cancelled_between_batches_releases() {
        let broker = MemoryBroker::new()
            .with_limits(BatchLimits {
                max_bytes: 20,
                max_messages: None,
            })
            .with_send_delay(Duration::from_millis(40));
        let publisher = publisher(&broker, &fast_retry());
        let messages: Vec<_> = (0..40).map(|id| json!({ "id": id })).collect();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let error = publisher
            .publish_batch_with_cancel("orders", &messages, &cancel)
            .await
            .unwrap_err();

        assert!(matches!(error, MessagingError::Cancelled));
        let deliveries = broker.deliveries().await;
        assert!(!deliveries.is_empty());
        let sent: usize = deliveries.iter().map(Delivery::len).sum();
        assert!(sent < messages.len());
        assert_eq!(broker.open_handles().await, HandleCounts::default());
    }

    #[tokio::test]
    async fn test_dropped_publish_releases_handles() {
        let broker = MemoryBroker::new().with_send_delay(Duration::from_secs(30));
        let publisher = publisher(&broker, &fast_retry());

        let timed_out = tokio::time::timeout(
            Duration::from_millis(50),
            publisher.publish("orders", "hello"),
        )
        .await
        .is_err();

        assert!(timed_out);
        assert_eq!(settled_handles(&broker).await, HandleCounts::default());
    }

    #[tokio::test]
    async fn test_publish_empty_batch_is_a_no_op() {
        let broker = MemoryBroker::new();
        let publisher = publisher(&broker, &fast_retry());

        publisher
            .publish_batch::<serde_json::Value>("orders", &[])
            .await
            .unwrap();

        assert!(broker.connections().await.is_empty());
    }

    #[tokio::test]
    async fn test_publisher_is_shareable_across_tasks() {
        let broker = MemoryBroker::new();
        let publisher = Arc::new(publisher(&broker, &fast_retry()));

        let mut handles = Vec::new();
        for id in 0..8 {
            let publisher = Arc::clone(&publisher);
            handles.push(tokio::spawn(async move {
                publisher.publish("orders", &json!({ "id": id })).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(broker.deliveries().await.len(), 8);
        assert_eq!(broker.open_handles().await, HandleCounts::default());
    }
}
