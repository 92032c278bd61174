//! Per-call broker session
//!
//! Every publish call opens its own client and sender and closes both before
//! returning. Close failures are logged and never replace the outcome of the
//! call, so a message that reached the broker is not reported as failed.
//!
//! A publish future may also be dropped mid-call (a timeout, a losing
//! `select!` branch). The handles are then closed on a background task so the
//! connection is still released.

use crate::broker::{BrokerClient, BrokerConnector, BrokerEndpoint, BrokerSender};
use crate::core::cancel::guard;
use crate::core::error::Result;
use crate::core::logging::PublisherLogger;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub(crate) struct Session {
    sender: Arc<dyn BrokerSender>,
    release: Release,
}

impl Session {
    /// Connect and create a sender for `topic`
    ///
    /// If the sender cannot be created the client is closed before the error
    /// is returned.
    pub(crate) async fn open<P: Send + Sync>(
        connector: &dyn BrokerConnector<P>,
        endpoint: &BrokerEndpoint,
        policy: &P,
        topic: &str,
        cancel: &CancellationToken,
        logger: &PublisherLogger,
    ) -> Result<Self> {
        let provider = logger.provider();
        let client: Arc<dyn BrokerClient> =
            Arc::from(guard(cancel, provider, connector.connect(endpoint, policy)).await?);
        let mut release = Release::new(Arc::clone(&client), topic, *logger);

        match guard(cancel, provider, client.create_sender(topic)).await {
            Ok(sender) => {
                let sender: Arc<dyn BrokerSender> = Arc::from(sender);
                release.sender = Some(Arc::clone(&sender));
                Ok(Self { sender, release })
            }
            Err(error) => {
                release.run().await;
                Err(error)
            }
        }
    }

    pub(crate) fn sender(&self) -> &dyn BrokerSender {
        self.sender.as_ref()
    }

    /// Close the sender, then the client
    pub(crate) async fn close(mut self) {
        self.release.run().await;
    }

    /// Handle to the sender for tasks spawned during the call
    ///
    /// Every clone must be dropped or idle before [`Session::close`].
    pub(crate) fn shared_sender(&self) -> Arc<dyn BrokerSender> {
        Arc::clone(&self.sender)
    }
}

/// Closes the handles of a session exactly once
///
/// Dropped without [`Release::run`] having finished, it spawns the close onto
/// the current runtime.
struct Release {
    client: Arc<dyn BrokerClient>,
    sender: Option<Arc<dyn BrokerSender>>,
    topic: String,
    logger: PublisherLogger,
    done: bool,
}

impl Release {
    fn new(client: Arc<dyn BrokerClient>, topic: &str, logger: PublisherLogger) -> Self {
        Self {
            client,
            sender: None,
            topic: topic.to_string(),
            logger,
            done: false,
        }
    }

    async fn run(&mut self) {
        close_handles(
            self.sender.as_deref(),
            self.client.as_ref(),
            &self.topic,
            &self.logger,
        )
        .await;
        self.done = true;
    }
}

impl Drop for Release {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        self.logger.release_deferred(&self.topic);

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let client = Arc::clone(&self.client);
        let sender = self.sender.take();
        let topic = std::mem::take(&mut self.topic);
        let logger = self.logger;
        runtime.spawn(async move {
            close_handles(sender.as_deref(), client.as_ref(), &topic, &logger).await;
        });
    }
}

async fn close_handles(
    sender: Option<&dyn BrokerSender>,
    client: &dyn BrokerClient,
    topic: &str,
    logger: &PublisherLogger,
) {
    if let Some(sender) = sender {
        if let Err(error) = sender.close().await {
            logger.release_failed(topic, &error);
        }
    }
    if let Err(error) = client.close().await {
        logger.release_failed(topic, &error);
    }
}
