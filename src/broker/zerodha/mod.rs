//! Zerodha (Kite-style) REST adapter.
//!
//! Form-encoded requests, `Authorization: token api_key:access_token`
//! headers, and a `{ status, data | message, error_type }` envelope.

pub mod api_types;
mod adapter;

pub use adapter::{ZerodhaAdapter, ZerodhaConfig};
