//! In-process host contract: the `Action` trait, the registry actions are
//! registered into, and its JSON-RPC surface.

pub mod action;
pub mod context;
pub mod error;
pub mod registry;
pub mod rpc;
pub mod types;

pub use action::{schema_value, Action, OutputStream};
pub use context::ActionContext;
pub use error::{ActionError, HostError};
pub use registry::{ActionRegistry, ActionStream};
pub use rpc::{AijsonRpcServer, HostRpc};
pub use types::{ActionInfo, ActionSchema, ActionStreamEvent, ActionStreamItem};
