//! Google Pub/Sub publisher
//!
//! Topics resolve to `projects/{ProjectId}/topics/{topic}`. Batches are not
//! packed: every message is published on its own, concurrently, over one
//! shared sender. Concurrency is bounded by
//! [`MessagingOptions::max_concurrency`](crate::core::MessagingOptions) and
//! the first failure aborts the sends still pending.

use crate::broker::{BrokerEndpoint, BrokerSender, Payload};
use crate::core::cancel::{ensure_active, guard};
use crate::core::config::OptionMap;
use crate::core::error::{MessagingError, Result};
use crate::core::logging::PublisherLogger;
use crate::core::serializer::PayloadSerializer;
use crate::core::traits::{MessagePublisher, PublisherInfo, RetrySettingsTranslator};
use crate::providers::GOOGLE_PUBSUB;
use crate::providers::context::{PubSubConnector, PublisherContext};
use crate::providers::pubsub_retry::{PubSubRetrySettings, PubSubRetryTranslator};
use crate::providers::registry::ProvidedPublisher;
use crate::providers::session::Session;
use crate::security::credentials::endpoint_label;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

pub const PROJECT_ID_KEY: &str = "ProjectId";

pub struct PubSubPublisher {
    project_id: String,
    endpoint: BrokerEndpoint,
    retry_settings: Option<PubSubRetrySettings>,
    connector: PubSubConnector,
    serializer: Arc<dyn PayloadSerializer>,
    logger: PublisherLogger,
    max_concurrency: usize,
}

impl PubSubPublisher {
    /// Validate options and build a publisher; no connection is opened
    ///
    /// Fails when the options are absent, when `ProjectId` is missing or
    /// empty, or when the retry settings do not translate.
    pub fn new<T>(
        options: Option<&OptionMap>,
        translator: &T,
        context: &PublisherContext,
    ) -> Result<Self>
    where
        T: RetrySettingsTranslator<Policy = Option<PubSubRetrySettings>>,
    {
        let options = options.ok_or(MessagingError::OptionsMissing)?;

        let project_id = options
            .get(PROJECT_ID_KEY)
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or(MessagingError::ConnectionSettingMissing {
                provider: GOOGLE_PUBSUB,
                key: PROJECT_ID_KEY,
            })?;

        let retry_settings = translator.translate(options)?;

        Ok(Self {
            project_id: project_id.to_string(),
            endpoint: BrokerEndpoint::Project {
                project_id: project_id.to_string(),
            },
            retry_settings,
            connector: Arc::clone(context.pubsub()),
            serializer: Arc::clone(context.serializer()),
            logger: PublisherLogger::new(GOOGLE_PUBSUB, context.messaging()),
            max_concurrency: context.messaging().max_concurrency.max(1),
        })
    }

    pub fn retry_settings(&self) -> Option<&PubSubRetrySettings> {
        self.retry_settings.as_ref()
    }

    /// Fully qualified topic name
    pub fn topic_name(&self, topic: &str) -> String {
        format!("projects/{}/topics/{}", self.project_id, topic)
    }

    async fn open(&self, topic_name: &str, cancel: &CancellationToken) -> Result<Session> {
        Session::open(
            self.connector.as_ref(),
            &self.endpoint,
            &self.retry_settings,
            topic_name,
            cancel,
            &self.logger,
        )
        .await
    }

    /// Publish every payload as its own send, at most `max_concurrency` at once
    async fn fan_out(
        &self,
        topic_name: &str,
        sender: Arc<dyn BrokerSender>,
        payloads: Vec<Payload>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.logger
            .fan_out(topic_name, payloads.len(), self.max_concurrency);

        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let mut tasks = JoinSet::new();

        for payload in payloads {
            let semaphore = Arc::clone(&semaphore);
            let sender = Arc::clone(&sender);
            let cancel = cancel.clone();

            tasks.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|error| MessagingError::TaskFailed {
                        provider: GOOGLE_PUBSUB,
                        message: error.to_string(),
                    })?;
                guard(&cancel, GOOGLE_PUBSUB, sender.send(&payload)).await?;
                Ok::<_, MessagingError>(payload.size())
            });
        }

        let mut first_error = None;

        while let Some(joined) = tasks.join_next().await {
            let result = match joined {
                Ok(result) => result,
                // aborted after an earlier failure
                Err(error) if error.is_cancelled() => continue,
                Err(error) => Err(MessagingError::TaskFailed {
                    provider: GOOGLE_PUBSUB,
                    message: error.to_string(),
                }),
            };

            match result {
                Ok(bytes) => self.logger.published(topic_name, bytes),
                Err(error) => {
                    if first_error.is_none() {
                        tasks.abort_all();
                        first_error = Some(error);
                    }
                }
            }
        }

        match first_error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

impl ProvidedPublisher for PubSubPublisher {
    const PROVIDER: &'static str = GOOGLE_PUBSUB;

    fn from_options(options: &OptionMap, context: &PublisherContext) -> Result<Self> {
        Self::new(Some(options), &PubSubRetryTranslator, context)
    }
}

#[async_trait]
impl MessagePublisher for PubSubPublisher {
    fn info(&self) -> PublisherInfo {
        PublisherInfo {
            provider: GOOGLE_PUBSUB,
            endpoint: endpoint_label(&self.endpoint),
            retry: serde_json::to_value(&self.retry_settings).unwrap_or_default(),
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
        let topic_name = self.topic_name(topic);

        let session = self.open(&topic_name, cancel).await?;
        let outcome = guard(cancel, GOOGLE_PUBSUB, session.sender().send(&payload)).await;
        session.close().await;

        match &outcome {
            Ok(()) => self.logger.published(&topic_name, payload.size()),
            Err(MessagingError::Cancelled) => self.logger.cancelled(&topic_name),
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

        let payloads = messages
            .iter()
            .map(|message| self.serializer.to_payload(message))
            .collect::<Result<Vec<_>>>()?;
        let topic_name = self.topic_name(topic);

        let session = self.open(&topic_name, cancel).await?;
        let outcome = self
            .fan_out(&topic_name, session.shared_sender(), payloads, cancel)
            .await;
        session.close().await;

        if let Err(MessagingError::Cancelled) = outcome {
            self.logger.cancelled(&topic_name);
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::{BrokerErrorKind, HandleCounts, MemoryBroker};
    use crate::core::config::MessagingOptions;
    use crate::core::traits::MessagePublisherExt;
    use serde_json::{Value, json};
    use std::collections::BTreeSet;
    use std::time::Duration;

    fn options(extra: &[(&str, &str)]) -> OptionMap {
        let mut options: OptionMap = extra.iter().copied().collect();
        options.insert(PROJECT_ID_KEY, "demo");
        options
    }

    fn publisher(broker: &MemoryBroker, options: &OptionMap) -> PubSubPublisher {
        PubSubPublisher::from_options(options, &PublisherContext::in_memory(broker)).unwrap()
    }

    fn constant_retry(max_attempts: &str) -> OptionMap {
        options(&[
            ("RetryMode", "Constant"),
            ("MaxAttempts", max_attempts),
            ("Backoff", "1"),
        ])
    }

    #[test]
    fn test_absent_options_rejected() {
        let context = PublisherContext::in_memory(&MemoryBroker::new());

        let error = PubSubPublisher::new(None, &PubSubRetryTranslator, &context)
            .err()
            .unwrap();
        assert!(matches!(error, MessagingError::OptionsMissing));
    }

    #[test]
    fn test_project_id_required() {
        let context = PublisherContext::in_memory(&MemoryBroker::new());

        let error = PubSubPublisher::from_options(&OptionMap::new(), &context)
            .err()
            .unwrap();
        assert!(matches!(
            error,
            MessagingError::ConnectionSettingMissing {
                key: "ProjectId",
                ..
            }
        ));

        let mut null_project = OptionMap::new();
        null_project.insert_null(PROJECT_ID_KEY);
        let error = PubSubPublisher::from_options(&null_project, &context)
            .err()
            .unwrap();
        assert_eq!(error.code(), "CONNECTION_SETTING_MISSING");
    }

    #[test]
    fn test_translation_errors_propagate() {
        let context = PublisherContext::in_memory(&MemoryBroker::new());

        let error = PubSubPublisher::from_options(&options(&[("RetryMode", "Linear")]), &context)
            .err()
            .unwrap();
        assert_eq!(error.code(), "UNSUPPORTED_RETRY_MODE");
    }

    #[test]
    fn test_default_retry_is_none() {
        let broker = MemoryBroker::new();
        let publisher = publisher(&broker, &options(&[]));

        assert!(publisher.retry_settings().is_none());
        let info = publisher.info();
        assert_eq!(info.endpoint, "projects/demo");
        assert_eq!(info.retry, Value::Null);
    }

    #[tokio::test]
    async fn test_publish_uses_qualified_topic() {
        let broker = MemoryBroker::new();
        let publisher = publisher(&broker, &options(&[]));

        publisher.publish("orders", &json!({"id": 1})).await.unwrap();

        let deliveries = broker.deliveries().await;
        assert_eq!(deliveries.len(), 1);
        assert_eq!(deliveries[0].entity_path, "projects/demo/topics/orders");
        assert_eq!(broker.open_handles().await, HandleCounts::default());
    }

    #[tokio::test]
    async fn test_only_unavailable_is_retried() {
        let broker = MemoryBroker::new();
        let publisher = publisher(&broker, &constant_retry("3"));

        broker.fail_next(BrokerErrorKind::Unavailable, 2).await;
        publisher.publish("orders", "first").await.unwrap();
        assert_eq!(broker.send_attempts().await, 3);

        broker.fail_next(BrokerErrorKind::Timeout, 1).await;
        let error = publisher.publish("orders", "second").await.unwrap_err();
        assert!(error.is_recoverable());
        assert_eq!(broker.send_attempts().await, 4);
    }

    #[tokio::test]
    async fn test_batch_publishes_every_message_individually() {
        let broker = MemoryBroker::new();
        let publisher = publisher(&broker, &options(&[]));
        let messages: Vec<Value> = (0..20).map(|id| json!({ "id": id })).collect();

        publisher.publish_batch("orders", &messages).await.unwrap();

        let deliveries = broker.deliveries().await;
        assert_eq!(deliveries.len(), 20);
        assert!(deliveries.iter().all(|d| !d.batched && d.len() == 1));

        let ids: BTreeSet<i64> = deliveries
            .iter()
            .flat_map(|d| d.json_bodies())
            .filter_map(|body| body["id"].as_i64())
            .collect();
        assert_eq!(ids, (0..20).collect());
        assert_eq!(broker.connections().await.len(), 1);
        assert_eq!(broker.open_handles().await, HandleCounts::default());
    }

    #[tokio::test]
    async fn test_batch_failure_aborts_and_releases() {
        let broker = MemoryBroker::new();
        let context = PublisherContext::in_memory(&broker).with_messaging_options(MessagingOptions {
            max_concurrency: 1,
            ..MessagingOptions::default()
        });
        let publisher = PubSubPublisher::from_options(&constant_retry("1"), &context).unwrap();
        broker.fail_next(BrokerErrorKind::Rejected, 1).await;
        let messages: Vec<Value> = (0..10).map(|id| json!({ "id": id })).collect();

        let error = publisher
            .publish_batch("orders", &messages)
            .await
            .unwrap_err();

        assert_eq!(error.code(), "BROKER_ERROR");
        assert!(broker.deliveries().await.len() < 10);
        assert_eq!(broker.open_handles().await, HandleCounts::default());
    }

    #[tokio::test]
    async fn test_batch_cancellation_stops_pending_sends() {
        let broker = MemoryBroker::new().with_send_delay(Duration::from_millis(50));
        let context = PublisherContext::in_memory(&broker).with_messaging_options(MessagingOptions {
            max_concurrency: 2,
            ..MessagingOptions::default()
        });
        let publisher = PubSubPublisher::from_options(&options(&[]), &context).unwrap();
        let messages: Vec<Value> = (0..50).map(|id| json!({ "id": id })).collect();

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(120)).await;
            trigger.cancel();
        });

        let error = publisher
            .publish_batch_with_cancel("orders", &messages, &cancel)
            .await
            .unwrap_err();

        assert!(matches!(error, MessagingError::Cancelled));
        assert!(broker.deliveries().await.len() < 50);
        assert_eq!(broker.open_handles().await, HandleCounts::default());
    }

    #[tokio::test]
    async fn test_dropped_publish_releases_handles() {
        let broker = MemoryBroker::new().with_send_delay(Duration::from_secs(30));
        let publisher = publisher(&broker, &options(&[]));

        let timed_out = tokio::time::timeout(
            Duration::from_millis(50),
            publisher.publish("orders", "hello"),
        )
        .await
        .is_err();
        assert!(timed_out);

        for _ in 0..50 {
            if broker.open_handles().await == HandleCounts::default() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(broker.open_handles().await, HandleCounts::default());
        assert!(broker.deliveries().await.is_empty());
    }

    #[tokio::test]
    async fn test_dropped_batch_releases_handles() {
        let broker = MemoryBroker::new().with_send_delay(Duration::from_secs(30));
        let publisher = publisher(&broker, &options(&[]));
        let messages: Vec<_> = (0..4).map(|id| json!({ "id": id })).collect();

        let timed_out = tokio::time::timeout(
            Duration::from_millis(50),
            publisher.publish_batch("orders", &messages),
        )
        .await
        .is_err();
        assert!(timed_out);

        for _ in 0..50 {
            if broker.open_handles().await == HandleCounts::default() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(broker.open_handles().await, HandleCounts::default());
    }

    #[tokio::test]
    async fn test_empty_batch_is_a_no_op() {
        let broker = MemoryBroker::new();
        let publisher = publisher(&broker, &options(&[]));

        publisher
            .publish_batch::<Value>("orders", &[])
            .await
            .unwrap();

        assert!(broker.connections().await.is_empty());
    }
}
