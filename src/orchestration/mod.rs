//! Orchestration layer for message publishing
//!
//! This module provides the caller-facing factory and the batch assembly
//! used by batching publishers.

pub mod batch_assembler;
pub mod factory;

// Re-export main types for convenience
pub use batch_assembler::{BatchAssembler, BatchReport};
pub use factory::MessagePublisherFactory;
