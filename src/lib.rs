// Allow unwrap/expect in tests - tests should panic on unexpected errors
#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::default_trait_access,
        clippy::items_after_statements
    )
)]

//! Broker Gateway - Resilient Broker Integration Layer
//!
//! A polymorphic client abstraction over heterogeneous brokerage backends,
//! fronted by retry-with-backoff, a circuit breaker, and a token-bucket rate
//! limiter, coordinated with an order-lifecycle state machine that enforces
//! which transitions are legal once an order has been submitted to a broker.
//!
//! # Architecture
//!
//! - **Domain**: order model, status lifecycle, transition rules
//!   - `domain::orders`: `Order`, `OrderStatus`, `OrderStateMachine`
//!   - `domain::shared`: strongly-typed identifiers
//! - **Resilience**: broker-agnostic building blocks
//!   - `resilience::retry`: bounded exponential backoff with cancellation
//!   - `resilience::circuit_breaker`: Closed/Open/HalfOpen fail-fast gate
//!   - `resilience::rate_limiter`: token-bucket admission control
//! - **Broker**: the capability contract and its adapters
//!   - `broker`: `BrokerClient` trait, common request/response model
//!   - `broker::xts`: dealer (`pro`) and retail (`client`) REST variants
//!   - `broker::zerodha`: Kite-style REST variant
//!   - `broker::simulator`: in-process backend for development and tests
//!   - `broker::factory`: configuration-driven adapter construction
//! - **Coordinator**: lifecycle rules over a persistence port
//!   - `coordinator`: `OrderCoordinator`, pagination sanitization
//!   - `persistence`: in-memory `OrderRepository` implementation
//!
//! Every outbound adapter call composes the resilience primitives in a fixed
//! order: rate limiter admission, then the circuit breaker, then the retry
//! loop around the transport call. Retries exhaust inside one breaker
//! execution, so a flapping call counts once toward the failure threshold.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

/// Domain layer - order model and lifecycle rules.
pub mod domain;

/// Resilience primitives - retry, circuit breaker, rate limiter.
pub mod resilience;

/// Broker capability contract and adapters.
pub mod broker;

/// Order lifecycle coordination over a persistence port.
pub mod coordinator;

/// Repository implementations.
pub mod persistence;

/// Configuration loading and validation.
pub mod config;

/// Tracing subscriber initialization.
pub mod telemetry;

// Domain re-exports
pub use domain::orders::{
    ExchangeSegment, Order, OrderDraft, OrderError, OrderFilter, OrderRepository, OrderSide,
    OrderStateMachine, OrderStatus, OrderType, ProductType, TimeInForce,
};
pub use domain::shared::{BrokerOrderId, ClientId, ExchangeOrderId, InstrumentId, OrderId};

// Resilience re-exports
pub use resilience::{
    CircuitBreaker, CircuitBreakerConfig, CircuitState, ClassifyError, RateLimiter,
    RateLimiterConfig, ResilienceStack, RetryConfig, RetryPolicy,
};

// Broker re-exports
pub use broker::factory::{BrokerKind, build_broker};
pub use broker::{
    BrokerClient, BrokerError, Credentials, Holding, ModifyOrderRequest, OrderBook, OrderRequest,
    OrderResponse, Position, Quote, QuoteStream, SimulatedBroker, SimulatorConfig, Session,
};

// Coordinator re-exports
pub use coordinator::{ExecutionReport, OrderCoordinator, OrderPage, UpdateOrderRequest};
pub use persistence::InMemoryOrderRepository;

// Config re-exports
pub use config::{Config, ConfigError, load_config};
