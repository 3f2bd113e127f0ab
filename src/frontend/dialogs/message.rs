//! Error and information message box
//!
//! Messages queue up; the box shows them one at a time.

use super::{Dialog, DialogAction, DialogState, DialogWindowConfig};
use egui::{Color32, Ui};
use std::collections::VecDeque;

/// A message waiting to be shown
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub title: String,
    pub text: String,
}

#[derive(Debug, Default)]
pub struct MessageState {
    queue: VecDeque<Message>,
}

impl DialogState for MessageState {
    // Closing one message must not drop the rest
    fn reset(&mut self) {}

    fn is_valid(&self) -> bool {
        !self.queue.is_empty()
    }
}

impl MessageState {
    pub fn push(&mut self, title: impl Into<String>, text: impl Into<String>) {
        let mut text = text.into();
        if !text.ends_with(['.', '!', '?']) {
            text.push('.');
        }
        self.queue.push_back(Message {
            title: title.into(),
            text,
        });
    }

    pub fn current(&self) -> Option<&Message> {
        self.queue.front()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn title(&self) -> String {
        self.current().map(|m| m.title.clone()).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageAction {
    Dismissed,
}

pub struct MessageContext;

pub struct MessageDialog;

impl Dialog for MessageDialog {
    type State = MessageState;
    type Action = MessageAction;
    type Context<'a> = MessageContext;

    fn title(_state: &Self::State) -> &'static str {
        "Message"
    }

    fn window_config() -> DialogWindowConfig {
        DialogWindowConfig::centered_modal(400.0)
    }

    fn render(
        state: &mut Self::State,
        _ctx: Self::Context<'_>,
        ui: &mut Ui,
    ) -> DialogAction<Self::Action> {
        let Some(message) = state.current() else {
            return DialogAction::Close;
        };
        ui.horizontal(|ui| {
            ui.colored_label(Color32::from_rgb(220, 80, 60), "⚠");
            ui.label(&message.text);
        });
        ui.separator();
        if ui.button("OK").clicked() {
            state.queue.pop_front();
            if state.queue.is_empty() {
                return DialogAction::CloseWithAction(MessageAction::Dismissed);
            }
            return DialogAction::Action(MessageAction::Dismissed);
        }
        DialogAction::None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_get_a_full_stop() {
        let mut state = MessageState::default();
        state.push("Configure Device", "The clock could not be set");
        state.push("Configure Device", "Reset?");
        assert_eq!(state.current().unwrap().text, "The clock could not be set.");
        state.queue.pop_front();
        assert_eq!(state.current().unwrap().text, "Reset?");
    }
}
