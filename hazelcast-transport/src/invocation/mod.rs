//! Request/response correlation and the invocation engine.

mod invocation;
mod registry;
mod service;

pub use invocation::{InvocationHandle, InvocationTarget};
pub use registry::{CorrelationRegistry, PendingInvocation};
pub use service::InvocationService;
