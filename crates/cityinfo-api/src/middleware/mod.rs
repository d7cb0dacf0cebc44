//! # Middleware Stack
//!
//! Service-wide middleware, applied before routing:
//! - [`forwarded`]: proxy header normalization.
//! - [`tracing_layer`]: request spans with `TraceLayer`.
//!
//! Version resolution, authentication and authorization live with the
//! components they belong to ([`crate::versioning`], [`crate::auth`],
//! [`crate::policy`]).

pub mod forwarded;
pub mod tracing_layer;
