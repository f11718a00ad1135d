// ABOUTME: Backend implementations of the AgentBackend trait.
// ABOUTME: CLI backend for production, mock backend for tests.

pub mod cli;
pub mod mock;

pub use cli::CliBackend;
pub use mock::MockBackend;
