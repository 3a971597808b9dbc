//! Built-in middleware.
//!
//! Every item here is an ordinary [`Handler`](crate::Handler); register it
//! with [`Router::middleware`](crate::Router::middleware) or as one stage of
//! a route's [`Chain`](crate::Chain).
//!
//! - [`body_parser`]: forced single-type parsers and per-request overrides
//! - [`cors`]: origin policy, preflight answers, header annotations
//! - [`error_handler`]: catch-all with `map` and `logger` hooks

pub mod body_parser;
pub mod cors;
pub mod error_handler;

pub use body_parser::{body_parser, json, text, urlencoded};
pub use cors::{Cors, Origin};
pub use error_handler::ErrorHandler;
