// ABOUTME: Platform-agnostic DM bridge between chat users and long-running agent sessions.
// ABOUTME: Platform adapters implement DmChannel and drive the Router; everything else is here.

pub mod chunker;
pub mod config;
pub mod gate;
pub mod manager;
pub mod registry;
pub mod router;
pub mod stream;
pub mod testing;
pub mod traits;
pub mod workspace;

pub use chunker::{split_message, MAX_MESSAGE_LEN};
pub use config::{Config, ModelChoice};
pub use gate::{AutoApproveGate, InteractiveGate, GATE_TIMEOUT};
pub use manager::SessionManager;
pub use registry::{Mode, SessionRecord, SessionRegistry};
pub use router::{BotCommand, Menu, MenuOption, Router, SEND_TIMEOUT};
pub use traits::{ApprovalChoice, ApprovalRequest, DmChannel};
