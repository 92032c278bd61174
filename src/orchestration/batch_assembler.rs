//! Batch Assembler - Packs messages into broker-sized batches
//!
//! Messages are appended in input order to the current batch. When one does
//! not fit, the current batch is sent and the message is tried once more
//! against a fresh batch. A message that does not fit an empty batch can
//! never be sent in a batch, so the call fails with
//! [`MessagingError::MessageTooLarge`] and nothing after it is attempted.
//!
//! Guarantees:
//! - every message lands in exactly one batch, in input order
//! - batches are filled greedily, so no smaller partition exists
//! - an empty batch is never sent
//! - batches sent before a failure are not rolled back

use crate::broker::{BrokerSender, MessageBatch, Payload};
use crate::core::cancel::{ensure_active, guard};
use crate::core::error::{MessagingError, Result};
use crate::core::logging::PublisherLogger;
use crate::core::serializer::PayloadSerializer;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

/// Characters of an oversized message echoed in the error
const PREVIEW_CHARS: usize = 64;

/// What a completed assembly sent
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub batches_sent: usize,
    pub messages_sent: usize,
    pub bytes_sent: usize,
}

/// Sequential batch assembly over one sender
pub struct BatchAssembler<'a> {
    sender: &'a dyn BrokerSender,
    serializer: &'a dyn PayloadSerializer,
    logger: &'a PublisherLogger,
}

impl<'a> BatchAssembler<'a> {
    pub fn new(
        sender: &'a dyn BrokerSender,
        serializer: &'a dyn PayloadSerializer,
        logger: &'a PublisherLogger,
    ) -> Self {
        Self {
            sender,
            serializer,
            logger,
        }
    }

    /// Send every message through as few batches as the limits allow
    ///
    /// Cancellation is checked before each message and around every broker
    /// call.
    pub async fn send_all(
        &self,
        messages: &[serde_json::Value],
        cancel: &CancellationToken,
    ) -> Result<BatchReport> {
        let mut report = BatchReport::default();
        let mut batch = self.create_batch(cancel).await?;

        for (index, message) in messages.iter().enumerate() {
            ensure_active(cancel)?;
            let payload = self.serializer.to_payload(message)?;

            if batch.try_add(&payload) {
                continue;
            }

            if batch.is_empty() {
                return Err(self.too_large(index, &payload, batch.as_ref()));
            }

            self.logger
                .batch_overflow(self.sender.entity_path(), index, batch.len());
            self.flush(batch, &mut report, cancel).await?;

            batch = self.create_batch(cancel).await?;
            if !batch.try_add(&payload) {
                return Err(self.too_large(index, &payload, batch.as_ref()));
            }
        }

        if !batch.is_empty() {
            self.flush(batch, &mut report, cancel).await?;
        }

        Ok(report)
    }

    async fn create_batch(&self, cancel: &CancellationToken) -> Result<Box<dyn MessageBatch>> {
        guard(cancel, self.logger.provider(), self.sender.create_batch()).await
    }

    async fn flush(
        &self,
        batch: Box<dyn MessageBatch>,
        report: &mut BatchReport,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let messages = batch.len();
        let bytes = batch.size_in_bytes();

        guard(cancel, self.logger.provider(), self.sender.send_batch(batch)).await?;

        report.batches_sent += 1;
        report.messages_sent += messages;
        report.bytes_sent += bytes;
        self.logger
            .batch_sent(self.sender.entity_path(), messages, bytes);
        Ok(())
    }

    fn too_large(&self, index: usize, payload: &Payload, batch: &dyn MessageBatch) -> MessagingError {
        let limit = batch.max_size_in_bytes();
        self.logger
            .oversized(self.sender.entity_path(), index, payload.size(), limit);

        MessagingError::MessageTooLarge {
            index,
            size: payload.size(),
            limit,
            preview: payload.preview(PREVIEW_CHARS),
        }
    }
}
