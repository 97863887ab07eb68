//! HTTP routing, range-aware response assembly, and hyper service for RangeGate.
//!
//! - **Routing** ([`router`]): maps method and path to a gateway [`Route`](router::Route).
//! - **Handler** ([`handler`]): [`StreamGateway`](handler::StreamGateway) resolves the
//!   document, computes the range, and wires the fetch stream into the body.
//! - **Response** ([`response`]): JSON error bodies with status-specific headers.
//! - **Service** ([`service`]): [`GatewayHttpService`](service::GatewayHttpService)
//!   implements hyper's `Service` trait.
//! - **Body** ([`body`]): [`GatewayBody`](body::GatewayBody) with buffered, streaming
//!   and empty modes.
//!
//! # Architecture
//!
//! ```text
//! HTTP Request
//!   -> GatewayHttpService (hyper Service)
//!     -> Health check / metrics interception
//!     -> GatewayRouter
//!     -> StreamGateway (resolve, range, fetch, guard)
//!     -> Common response headers (x-request-id, Server)
//!   <- HTTP Response (streaming body)
//! ```

pub mod body;
pub mod handler;
pub mod response;
pub mod router;
pub mod service;

pub use body::GatewayBody;
pub use handler::StreamGateway;
pub use router::{GatewayRouter, Route, RoutingContext};
pub use service::GatewayHttpService;
