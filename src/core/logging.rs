//! Optional publisher logging
//!
//! Publishers and the factory log through a [`PublisherLogger`]. It emits
//! `tracing` events only when [`MessagingOptions::enable_logging`] is set and
//! is a no-op otherwise.

use crate::broker::BrokerError;
use crate::core::config::MessagingOptions;
use crate::core::error::MessagingError;

#[derive(Debug, Clone, Copy)]
pub struct PublisherLogger {
    enabled: bool,
    provider: &'static str,
}

impl PublisherLogger {
    pub fn new(provider: &'static str, options: &MessagingOptions) -> Self {
        Self {
            enabled: options.enable_logging,
            provider,
        }
    }

    /// Logger that never emits anything
    pub fn disabled(provider: &'static str) -> Self {
        Self {
            enabled: false,
            provider,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn provider(&self) -> &'static str {
        self.provider
    }

    pub fn created(&self, endpoint: &str) {
        if self.enabled {
            tracing::info!(provider = self.provider, endpoint, "message publisher created");
        }
    }

    pub fn creation_failed(&self, requested: &str, error: &MessagingError) {
        if self.enabled {
            tracing::warn!(
                provider = requested,
                code = error.code(),
                error = %error,
                "message publisher could not be created"
            );
        }
    }

    pub fn published(&self, topic: &str, bytes: usize) {
        if self.enabled {
            tracing::debug!(provider = self.provider, topic, bytes, "message published");
        }
    }

    pub fn batch_sent(&self, topic: &str, messages: usize, bytes: usize) {
        if self.enabled {
            tracing::debug!(provider = self.provider, topic, messages, bytes, "batch sent");
        }
    }

    pub fn batch_overflow(&self, topic: &str, index: usize, pending: usize) {
        if self.enabled {
            tracing::debug!(
                provider = self.provider,
                topic,
                index,
                pending,
                "batch full, flushing before retrying message"
            );
        }
    }

    pub fn oversized(&self, topic: &str, index: usize, size: usize, limit: usize) {
        if self.enabled {
            tracing::warn!(
                provider = self.provider,
                topic,
                index,
                size,
                limit,
                "message does not fit into an empty batch"
            );
        }
    }

    pub fn fan_out(&self, topic: &str, messages: usize, concurrency: usize) {
        if self.enabled {
            tracing::debug!(
                provider = self.provider,
                topic,
                messages,
                concurrency,
                "publishing messages individually"
            );
        }
    }

    pub fn cancelled(&self, topic: &str) {
        if self.enabled {
            tracing::info!(provider = self.provider, topic, "publish cancelled");
        }
    }

    pub fn release_deferred(&self, topic: &str) {
        if self.enabled {
            tracing::debug!(
                provider = self.provider,
                topic,
                "publish dropped before release, closing in the background"
            );
        }
    }

    pub fn release_failed(&self, topic: &str, error: &BrokerError) {
        if self.enabled {
            tracing::warn!(
                provider = self.provider,
                topic,
                error = %error,
                "failed to release broker resource"
            );
        }
    }
}
