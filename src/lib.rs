//! Process-attaching UI-automation agent.
//!
//! The agent attaches to a running desktop application, resolves elements of
//! its UI tree through declarative selectors, and performs actions on them,
//! all driven over a framed JSON-RPC stdio transport. Every operation
//! returns a uniform result envelope with a classified error and a
//! timestamped evidence trail.
//!
//! Concurrency model: one dedicated worker thread owns all provider state;
//! the async transport funnels every operation body through the
//! [`scheduler`], so no two provider calls ever interleave.

pub mod contracts;
pub mod controls;
pub mod errors;
pub mod finder;
pub mod flows;
pub mod keys;
pub mod poll;
pub mod provider;
pub mod rpc;
pub mod scheduler;
pub mod selector;
pub mod service;
pub mod sessions;
pub mod steplog;

pub use contracts::{ElementReference, RpcResult};
pub use errors::{ErrorKind, RpcError};
pub use selector::{ElementSelector, SelectorStep};
pub use service::AgentService;
