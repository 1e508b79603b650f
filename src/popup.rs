//! Interactive review driver.
//!
//! Runs one review session and reacts to user commands while the review
//! streams in, the way a browser-extension popup does: the user can rerun,
//! open the external review tool, or dismiss at any time.

use tokio::sync::mpsc;

use crate::orchestrator::{ReviewOrchestrator, ReviewState};
use crate::providers::{ChatStream, TaggedEvent};

/// A user action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PopupCommand {
    Rerun,
    OpenLink,
    Quit,
}

impl PopupCommand {
    /// Parse a typed key: `r`, `o` or `q`.
    pub fn from_key(input: &str) -> Option<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "r" | "rerun" => Some(Self::Rerun),
            "o" | "open" => Some(Self::OpenLink),
            "q" | "quit" | "exit" => Some(Self::Quit),
            _ => None,
        }
    }
}

/// Drives an orchestrator from a command channel.
pub struct Popup {
    orchestrator: ReviewOrchestrator,
}

async fn next_event(stream: &mut Option<ChatStream>) -> Option<TaggedEvent> {
    match stream {
        Some(stream) => stream.next().await,
        None => std::future::pending().await,
    }
}

impl Popup {
    pub fn new(orchestrator: ReviewOrchestrator) -> Self {
        Self { orchestrator }
    }

    pub fn orchestrator(&self) -> &ReviewOrchestrator {
        &self.orchestrator
    }

    /// Review `page_url` and handle commands until the user quits.
    ///
    /// When the command channel closes, the current round is allowed to
    /// finish before returning. Returns the final session state.
    pub async fn run(
        &mut self,
        page_url: &str,
        title: Option<&str>,
        mut commands: mpsc::Receiver<PopupCommand>,
    ) -> ReviewState {
        let mut stream = self.orchestrator.start(page_url, title).await;
        if let ReviewState::Failed(err) = self.orchestrator.state() {
            if !err.is_retryable() {
                // Already dismissed.
                return self.orchestrator.state().clone();
            }
        }

        let mut listening = true;
        loop {
            if !listening && stream.is_none() {
                break;
            }
            tokio::select! {
                event = next_event(&mut stream) => match event {
                    Some(event) => {
                        if self.orchestrator.apply(event) {
                            stream = None;
                        }
                    }
                    None => stream = None,
                },
                command = commands.recv(), if listening => match command {
                    Some(PopupCommand::Rerun) => {
                        if self.orchestrator.can_rerun() {
                            // Replacing the stream drops the previous round.
                            stream = self.orchestrator.restart().await;
                        }
                    }
                    Some(PopupCommand::OpenLink) => self.orchestrator.open_link(),
                    Some(PopupCommand::Quit) => break,
                    None => listening = false,
                },
            }
        }

        self.orchestrator.close();
        self.orchestrator.state().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_map_to_commands() {
        assert_eq!(PopupCommand::from_key("r\n"), Some(PopupCommand::Rerun));
        assert_eq!(PopupCommand::from_key(" O "), Some(PopupCommand::OpenLink));
        assert_eq!(PopupCommand::from_key("quit"), Some(PopupCommand::Quit));
        assert_eq!(PopupCommand::from_key("x"), None);
        assert_eq!(PopupCommand::from_key(""), None);
    }
}
