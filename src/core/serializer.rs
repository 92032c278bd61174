//! Message payload encoding
//!
//! Messages reach publishers as `serde_json::Value` trees and are encoded
//! into broker payloads by a [`PayloadSerializer`]. JSON is the default.

use crate::broker::Payload;
use crate::core::error::Result;
use std::fmt::Debug;

/// Encodes a message into payload bytes
pub trait PayloadSerializer: Send + Sync + Debug {
    /// MIME type attached to every payload
    fn content_type(&self) -> &str;

    fn serialize(&self, message: &serde_json::Value) -> Result<Vec<u8>>;

    /// Encode a message into a payload with a fresh message id
    fn to_payload(&self, message: &serde_json::Value) -> Result<Payload> {
        Ok(Payload::new(self.content_type(), self.serialize(message)?))
    }
}

/// Compact JSON encoding
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonSerializer;

impl PayloadSerializer for JsonSerializer {
    fn content_type(&self) -> &str {
        "application/json"
    }

    fn serialize(&self, message: &serde_json::Value) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(message)?)
    }
}
