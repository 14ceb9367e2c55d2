//! Infrastructure layer for cross-cutting concerns.
//!
//! Provides foundational infrastructure including:
//! - Error handling and result types
//! - Touch-wait user feedback

pub mod error;
pub mod touch;
