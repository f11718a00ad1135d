// ABOUTME: Agent session boundary for porter.
// ABOUTME: Closed event type, session handle/receiver, and CLI + mock backends.

pub mod backends;
pub mod event;
pub mod handle;
pub mod options;
pub mod traits;

pub use event::AgentEvent;
pub use handle::{Command, EventReceiver, SessionHandle};
pub use options::{PermissionMode, SessionOptions, ToolDecision, ToolGate};
pub use traits::AgentBackend;
