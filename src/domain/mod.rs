//! Domain layer - order model, lifecycle rules, shared identifiers.

/// Order model and lifecycle.
pub mod orders;

/// Shared value objects.
pub mod shared;
