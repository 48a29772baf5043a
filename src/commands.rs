use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FadeError {
    #[error("No media element found.")]
    NoTargetFound,

    #[error("unknown command `{0}`")]
    UnknownCommand(String),
}

/// Transient user-visible messages.
pub trait Notifier {
    fn notice(&self, message: &str);
}

impl<N: Notifier + ?Sized> Notifier for Arc<N> {
    fn notice(&self, message: &str) {
        (**self).notice(message);
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notice(&self, message: &str) {
        log::warn!("{message}");
    }
}

/// Keeps every notice, for inspection.
#[derive(Debug, Default)]
pub struct CollectingNotifier {
    notices: Mutex<Vec<String>>,
}

impl CollectingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notices(&self) -> Vec<String> {
        self.notices.lock().clone()
    }
}

impl Notifier for CollectingNotifier {
    fn notice(&self, message: &str) {
        self.notices.lock().push(message.to_string());
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandAction {
    FadeToggleCurrent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Command {
    pub id: &'static str,
    pub name: &'static str,
    pub action: CommandAction,
}

pub const FADE_TOGGLE_CURRENT: Command = Command {
    id: "fade-toggle-current-media",
    name: "Fade toggle (out/in) current media",
    action: CommandAction::FadeToggleCurrent,
};

#[derive(Debug, Clone)]
pub struct CommandRegistry {
    commands: Vec<Command>,
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self {
            commands: vec![FADE_TOGGLE_CURRENT],
        }
    }
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn find(&self, id: &str) -> Result<&Command, FadeError> {
        self.commands
            .iter()
            .find(|command| command.id == id)
            .ok_or_else(|| FadeError::UnknownCommand(id.to_string()))
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }
}
