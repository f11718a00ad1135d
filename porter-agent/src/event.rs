// ABOUTME: Events emitted by an agent session's stream.
// ABOUTME: Closed enum with an Other variant for SDK event kinds not handled yet.

use serde::{Deserialize, Serialize};

/// Events emitted by an agent session while a turn is running.
///
/// The underlying SDK stream is open-ended; everything the bridge does not
/// render is collapsed into [`AgentEvent::Other`] so new event kinds are
/// ignored rather than breaking the reader.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum AgentEvent {
    /// Session initialization notice, carrying the working directory if known
    SystemInit { cwd: Option<String> },

    /// Assistant output; `text` is the concatenation of all text blocks
    Assistant { text: String },

    /// Outcome of a single tool invocation fed back into the conversation
    ToolResult { content: String, is_error: bool },

    /// End-of-turn result
    Result { text: String, is_error: bool },

    /// Any event kind the bridge does not render
    Other { kind: String },
}
