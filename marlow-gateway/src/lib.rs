//! Marlow Gateway Layer
//!
//! Settlement gateway port and adapters: the reqwest client for the real
//! service and a scriptable stub for tests.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod http;
pub mod ports;
pub mod stub;

pub use error::GatewayError;
pub use http::HttpSettlementGateway;
pub use ports::{RetryPolicy, SettlementGateway};
pub use stub::StubGateway;
