//! netreq - URL requests over a pluggable transport engine
//!
//! The transport engine does the network I/O; this crate owns the request
//! lifecycle around it: configuration guards, flow-controlled chunked
//! uploads, response delivery into a caller sink, cancellation and teardown.

pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod listener;
pub mod request;

pub use config::Config;
pub use context::RequestContext;
pub use error::{BuildError, RequestError, StateError};
pub use request::{Priority, RequestOutcome, UrlRequest};
