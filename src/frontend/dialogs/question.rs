//! Yes/No(/Cancel) question box

use super::{Dialog, DialogAction, DialogState, DialogWindowConfig};
use crate::engine::{Answer, Question};
use egui::Ui;

#[derive(Debug, Default)]
pub struct QuestionState {
    pub question: Option<Question>,
}

impl DialogState for QuestionState {
    fn is_valid(&self) -> bool {
        self.question.is_some()
    }
}

impl QuestionState {
    pub fn ask(question: Question) -> Self {
        Self {
            question: Some(question),
        }
    }

    pub fn title(&self) -> &'static str {
        self.question.as_ref().map_or("Question", Question::title)
    }
}

pub struct QuestionContext;

pub struct QuestionDialog;

impl Dialog for QuestionDialog {
    type State = QuestionState;
    type Action = Answer;
    type Context<'a> = QuestionContext;

    fn title(state: &Self::State) -> &'static str {
        state.title()
    }

    fn window_config() -> DialogWindowConfig {
        DialogWindowConfig::centered_modal(420.0)
    }

    fn render(
        state: &mut Self::State,
        _ctx: Self::Context<'_>,
        ui: &mut Ui,
    ) -> DialogAction<Self::Action> {
        let Some(question) = &state.question else {
            return DialogAction::Close;
        };
        let can_cancel = question.can_cancel();

        ui.label(question.message());
        ui.separator();

        ui.horizontal(|ui| {
            if ui.button("Yes").clicked() {
                return DialogAction::CloseWithAction(Answer::Yes);
            }
            if ui.button("No").clicked() {
                return DialogAction::CloseWithAction(Answer::No);
            }
            if can_cancel && ui.button("Cancel").clicked() {
                return DialogAction::CloseWithAction(Answer::Cancel);
            }
            DialogAction::None
        })
        .inner
    }
}
