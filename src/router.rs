// ABOUTME: Inbound boundary: whitelist enforcement, message forwarding, and slash commands.
// ABOUTME: Platform adapters call into this; replies go back out through the DmChannel.

use crate::config::ModelChoice;
use crate::manager::SessionManager;
use crate::registry::Mode;
use crate::traits::DmChannel;
use anyhow::Result;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

/// How long message forwarding may take before the user is told it failed.
/// Covers session creation; actual agent work streams back asynchronously.
pub const SEND_TIMEOUT: Duration = Duration::from_secs(30);

const RESET_REPLY: &str = "Session reset. Your next message will start a new conversation.";
const STOP_NO_SESSION_REPLY: &str = "No active session to stop.";
const STOP_REPLY: &str = "Execution stopped. You can continue sending messages.";
const SEND_FAILED_REPLY: &str = "Failed to send message. Try /reset to start a new session.";

/// Slash commands the bridge understands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BotCommand {
    Reset,
    Stop,
    Models,
    Mode,
}

impl BotCommand {
    /// Parse the leading command out of a message, if it is one
    pub fn parse(text: &str) -> Option<Self> {
        let command = text.trim().split_whitespace().next()?;
        match command {
            "/reset" => Some(BotCommand::Reset),
            "/stop" => Some(BotCommand::Stop),
            "/models" => Some(BotCommand::Models),
            "/mode" => Some(BotCommand::Mode),
            _ => None,
        }
    }

    /// Description for platform-side command registration
    pub fn description(&self) -> &'static str {
        match self {
            BotCommand::Reset => "Start a fresh conversation",
            BotCommand::Stop => "Stop the current execution",
            BotCommand::Models => "Choose the model for your session",
            BotCommand::Mode => "Choose how much the agent may do without asking",
        }
    }

    pub fn all() -> [BotCommand; 4] {
        [
            BotCommand::Reset,
            BotCommand::Stop,
            BotCommand::Models,
            BotCommand::Mode,
        ]
    }
}

/// One selectable entry in a model or mode menu
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuOption {
    pub value: String,
    pub label: String,
    pub is_current: bool,
}

/// A selection menu the platform adapter renders however it likes
#[derive(Debug, Clone)]
pub struct Menu {
    pub title: String,
    pub options: Vec<MenuOption>,
}

/// Routes inbound messages and commands for all users.
///
/// Everything is gated on the whitelist first: traffic from unknown users
/// is dropped without a reply, so the bot stays invisible to strangers.
pub struct Router {
    manager: Arc<SessionManager>,
    allowed_users: HashSet<String>,
    models: Vec<ModelChoice>,
    send_timeout: Duration,
}

impl Router {
    pub fn new(
        manager: Arc<SessionManager>,
        allowed_users: impl IntoIterator<Item = String>,
        models: Vec<ModelChoice>,
    ) -> Self {
        Self {
            manager,
            allowed_users: allowed_users.into_iter().collect(),
            models,
            send_timeout: SEND_TIMEOUT,
        }
    }

    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    pub fn is_allowed(&self, user_id: &str) -> bool {
        self.allowed_users.contains(user_id)
    }

    /// Forward one plain message into the user's session, creating it on
    /// first contact. Failures and timeouts get a retry hint instead of
    /// silence.
    pub async fn handle_message(
        &self,
        user_id: &str,
        channel: Arc<dyn DmChannel>,
        text: &str,
    ) -> Result<()> {
        if !self.is_allowed(user_id) {
            tracing::debug!(user_id = %user_id, "Dropping message from non-whitelisted user");
            return Ok(());
        }
        if text.trim().is_empty() {
            return Ok(());
        }

        if let Err(e) = channel.send_typing().await {
            tracing::debug!(user_id = %user_id, error = %e, "Typing indicator failed");
        }

        let forward = async {
            let record = self
                .manager
                .get_or_create(user_id, Arc::clone(&channel))
                .await?;
            record.handle.send(text).await
        };
        match tokio::time::timeout(self.send_timeout, forward).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                tracing::error!(user_id = %user_id, error = %e, "Failed to forward message");
                self.fail_session(user_id, channel).await
            }
            Err(_) => {
                tracing::error!(user_id = %user_id, "Timed out forwarding message");
                self.fail_session(user_id, channel).await
            }
        }
    }

    /// A session that cannot take messages is presumed dead: evict it and
    /// tell the user how to recover
    async fn fail_session(&self, user_id: &str, channel: Arc<dyn DmChannel>) -> Result<()> {
        self.manager.destroy(user_id).await;
        channel.send(SEND_FAILED_REPLY).await
    }

    /// Handle a slash command. Menu commands reply with a rendered text
    /// menu; platform adapters wanting native pickers use `model_menu` /
    /// `mode_menu` and the select handlers directly.
    pub async fn handle_command(
        &self,
        user_id: &str,
        channel: Arc<dyn DmChannel>,
        command: BotCommand,
    ) -> Result<()> {
        if !self.is_allowed(user_id) {
            tracing::debug!(user_id = %user_id, command = ?command, "Dropping command from non-whitelisted user");
            return Ok(());
        }
        tracing::info!(user_id = %user_id, command = ?command, "Handling command");

        match command {
            BotCommand::Reset => {
                self.manager.destroy(user_id).await;
                channel.send(RESET_REPLY).await
            }
            BotCommand::Stop => {
                if self.manager.registry().get(user_id).is_none() {
                    return channel.send(STOP_NO_SESSION_REPLY).await;
                }
                // Kill the running execution but keep the user's settings
                self.manager
                    .recreate(user_id, Arc::clone(&channel), None, None)
                    .await?;
                channel.send(STOP_REPLY).await
            }
            BotCommand::Models => channel.send(&render_menu(&self.model_menu(user_id))).await,
            BotCommand::Mode => channel.send(&render_menu(&self.mode_menu(user_id))).await,
        }
    }

    /// Model picker data with the session's current model marked
    pub fn model_menu(&self, user_id: &str) -> Menu {
        let current = self
            .manager
            .registry()
            .get(user_id)
            .map(|r| r.model.clone())
            .unwrap_or_else(|| self.manager.default_model().to_string());
        Menu {
            title: "Choose a model".to_string(),
            options: self
                .models
                .iter()
                .map(|m| MenuOption {
                    value: m.id.clone(),
                    label: m.name.clone(),
                    is_current: m.id == current,
                })
                .collect(),
        }
    }

    /// Mode picker data with the session's current mode marked
    pub fn mode_menu(&self, user_id: &str) -> Menu {
        let current = self
            .manager
            .registry()
            .get(user_id)
            .map(|r| r.mode)
            .unwrap_or_default();
        Menu {
            title: "Choose a mode".to_string(),
            options: Mode::all()
                .iter()
                .map(|mode| MenuOption {
                    value: mode.value().to_string(),
                    label: mode.label().to_string(),
                    is_current: *mode == current,
                })
                .collect(),
        }
    }

    /// Apply a model selection: restart the session on the chosen model
    pub async fn select_model(
        &self,
        user_id: &str,
        channel: Arc<dyn DmChannel>,
        model_id: &str,
    ) -> Result<()> {
        if !self.is_allowed(user_id) {
            return Ok(());
        }
        let Some(choice) = self.models.iter().find(|m| m.id == model_id) else {
            return channel.send("Unknown model.").await;
        };
        self.manager
            .recreate(user_id, Arc::clone(&channel), Some(choice.id.clone()), None)
            .await?;
        channel
            .send(&format!(
                "Model switched to **{}**. Session has been reset.",
                choice.name
            ))
            .await
    }

    /// Apply a mode selection: restart the session in the chosen mode
    pub async fn select_mode(
        &self,
        user_id: &str,
        channel: Arc<dyn DmChannel>,
        mode: Mode,
    ) -> Result<()> {
        if !self.is_allowed(user_id) {
            return Ok(());
        }
        self.manager
            .recreate(user_id, Arc::clone(&channel), None, Some(mode))
            .await?;
        channel
            .send(&format!(
                "Mode switched to **{}**. Session has been reset.",
                mode.label()
            ))
            .await
    }
}

fn render_menu(menu: &Menu) -> String {
    let mut lines = vec![format!("**{}**", menu.title)];
    for option in &menu.options {
        let marker = if option.is_current { "▸" } else { " " };
        lines.push(format!("{} {} (`{}`)", marker, option.label, option.value));
    }
    lines.join("\n")
}
