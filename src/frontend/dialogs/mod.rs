//! Dialog trait system for unified dialog management
//!
//! Each dialog implements [`Dialog`], keeping its state, actions and
//! rendering together. Questions from the configuration dialog (version
//! upgrade, Wi-Fi reset, save before exit) go through [`QuestionDialog`] and
//! errors through [`MessageDialog`]. Modal dialogs block the window behind
//! them until answered.

use egui::{Context, Id, Ui};

/// Actions that a dialog can return after rendering
#[derive(Debug, Clone, Default)]
pub enum DialogAction<A> {
    /// Keep the dialog open, no action needed
    #[default]
    None,
    /// Close the dialog without performing any action
    Close,
    /// Close the dialog and perform the specified action
    CloseWithAction(A),
    /// Keep the dialog open but perform the specified action
    Action(A),
}

/// Trait for dialog state management
pub trait DialogState: Default {
    /// Reset the state when the dialog closes
    fn reset(&mut self) {
        *self = Self::default();
    }

    /// Check if the dialog has valid data to proceed with its action
    fn is_valid(&self) -> bool {
        true
    }
}

/// How a dialog window looks
#[derive(Debug, Clone)]
pub struct DialogWindowConfig {
    pub default_width: f32,
    pub resizable: bool,
    /// Dim and block the rest of the window while open
    pub modal: bool,
}

impl Default for DialogWindowConfig {
    fn default() -> Self {
        Self {
            default_width: 400.0,
            resizable: true,
            modal: false,
        }
    }
}

impl DialogWindowConfig {
    /// A fixed-size modal dialog
    pub fn centered_modal(width: f32) -> Self {
        Self {
            default_width: width,
            resizable: false,
            modal: true,
        }
    }
}

/// Main dialog trait for implementing dialogs
///
/// ```ignore
/// impl Dialog for QuestionDialog {
///     type State = QuestionState;
///     type Action = Answer;
///     type Context<'a> = QuestionContext;
///
///     fn title(_state: &Self::State) -> &'static str { "Question" }
///
///     fn render(state: &mut Self::State, ctx: Self::Context<'_>, ui: &mut Ui)
///         -> DialogAction<Self::Action> { /* ... */ }
/// }
/// ```
pub trait Dialog {
    type State: DialogState;
    type Action;
    /// Data the dialog needs to render, borrowed for one frame
    type Context<'a>;

    fn title(state: &Self::State) -> &'static str;

    fn window_config() -> DialogWindowConfig {
        DialogWindowConfig::default()
    }

    /// Render the dialog content and say what should happen next
    fn render(
        state: &mut Self::State,
        ctx: Self::Context<'_>,
        ui: &mut Ui,
    ) -> DialogAction<Self::Action>;
}

/// Show a dialog under its own title
///
/// Returns `Some(action)` if the dialog produced an action.
pub fn show_dialog<D: Dialog>(
    ctx: &Context,
    is_open: &mut bool,
    state: &mut D::State,
    dialog_ctx: D::Context<'_>,
) -> Option<D::Action> {
    let title = D::title(state);
    show_dialog_with_title::<D>(ctx, title, is_open, state, dialog_ctx)
}

/// Show a dialog whose title is only known at runtime
///
/// Closing (by action, or the title bar button of a plain window) clears
/// `is_open` and resets the state.
pub fn show_dialog_with_title<D: Dialog>(
    ctx: &Context,
    title: &str,
    is_open: &mut bool,
    state: &mut D::State,
    dialog_ctx: D::Context<'_>,
) -> Option<D::Action> {
    if !*is_open {
        return None;
    }

    let config = D::window_config();
    let action = if config.modal {
        // Only an answer closes a modal; the backdrop and Escape do not
        egui::Modal::new(Id::new(("dialog", title)))
            .show(ctx, |ui| {
                ui.set_width(config.default_width);
                ui.heading(title);
                ui.add_space(6.0);
                D::render(state, dialog_ctx, ui)
            })
            .inner
    } else {
        egui::Window::new(title)
            .collapsible(false)
            .resizable(config.resizable)
            .default_width(config.default_width)
            .open(&mut *is_open)
            .show(ctx, |ui| D::render(state, dialog_ctx, ui))
            .and_then(|response| response.inner)
            .unwrap_or(DialogAction::None)
    };
    let dismissed = !*is_open;

    let (close, result) = match action {
        DialogAction::None => (false, None),
        DialogAction::Close => (true, None),
        DialogAction::CloseWithAction(a) => (true, Some(a)),
        DialogAction::Action(a) => (false, Some(a)),
    };
    if close || dismissed {
        *is_open = false;
        state.reset();
    }
    result
}

pub mod add_network;
pub mod message;
pub mod preferences;
pub mod question;

pub use add_network::{AddNetworkAction, AddNetworkContext, AddNetworkDialog, AddNetworkState};
pub use message::{MessageAction, MessageContext, MessageDialog, MessageState};
pub use preferences::{PreferencesAction, PreferencesContext, PreferencesDialog, PreferencesState};
pub use question::{QuestionContext, QuestionDialog, QuestionState};
