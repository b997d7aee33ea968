pub mod actions;
pub mod builder;
pub mod config;
pub mod host;
pub mod model;
pub mod prompt;
pub mod providers;
pub mod retry;
pub mod secrets;
pub mod timing;
pub mod types;

/// Plugin name used in action ids
pub const PLUGIN_NAME: &str = "aijson-ml";

/// Entry point under which the host discovers this plugin's actions
pub const ENTRY_POINT: &str = "actions";

// Re-export commonly used items
pub use builder::{build_registry, entry_point};
pub use host::{Action, ActionContext, ActionRegistry, ActionStreamItem};
pub use types::ActionId;
