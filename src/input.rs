use crate::app::InputMode;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Quit,
    Down,
    Up,
    PageDown,
    PageUp,
    Top,
    Bottom,
    Select,
    Back,
    ToggleDetail,
    ToggleFocus,
    ToggleHelp,
    StartCommand,
    StartSearch,
    StartTagFilter,
    Refresh,
    NextPage,
    PrevPage,
    CycleSort,
    ToggleSortDirection,
    Edit,
    Delete,
    HandlerAction(char),
    SubmitInput,
    CompleteInput,
    CancelInput,
    Backspace,
    InputChar(char),
    ConfirmYes,
    ConfirmNo,
    ClearTagFilters,
    RemoveTagFilter,
    CustomTagValue,
    AddBookmark,
    ShowBookmarks,
    RemoveBookmark,
}

/// Maps a key press to an action. `handler_keys` are the action keys of
/// the handler whose list has focus; they win over every built-in binding
/// except the modifier fallbacks.
pub fn map_key(mode: InputMode, handler_keys: &[char], key: KeyEvent) -> Option<Action> {
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        return Some(Action::Quit);
    }
    match mode {
        InputMode::Normal => map_normal_mode_key(handler_keys, key),
        InputMode::Command | InputMode::Search | InputMode::TagInput => map_input_mode_key(key),
        InputMode::TagPicker => map_tag_picker_key(key),
        InputMode::Confirm => map_confirm_key(key),
        InputMode::Overlay => map_overlay_key(key),
        InputMode::Bookmarks => map_bookmarks_key(key),
    }
}

fn map_normal_mode_key(handler_keys: &[char], key: KeyEvent) -> Option<Action> {
    let plain = key.modifiers.is_empty() || key.modifiers == KeyModifiers::SHIFT;
    if let KeyCode::Char(c) = key.code
        && plain
        && handler_keys.contains(&c)
    {
        return Some(Action::HandlerAction(c));
    }

    match key.code {
        KeyCode::Char('r') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            Some(Action::Refresh)
        }
        KeyCode::Char('t') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            Some(Action::StartTagFilter)
        }
        KeyCode::Char('d') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            Some(Action::PageDown)
        }
        KeyCode::Char('u') if key.modifiers.contains(KeyModifiers::CONTROL) => Some(Action::PageUp),
        KeyCode::Char(_) if !plain => None,
        KeyCode::Char('q') => Some(Action::Quit),
        KeyCode::Char('j') | KeyCode::Down => Some(Action::Down),
        KeyCode::Char('k') | KeyCode::Up => Some(Action::Up),
        KeyCode::Char('g') | KeyCode::Home => Some(Action::Top),
        KeyCode::Char('G') | KeyCode::End => Some(Action::Bottom),
        KeyCode::PageDown => Some(Action::PageDown),
        KeyCode::PageUp => Some(Action::PageUp),
        KeyCode::Enter => Some(Action::Select),
        KeyCode::Esc | KeyCode::Char('h') => Some(Action::Back),
        KeyCode::Char('d') => Some(Action::ToggleDetail),
        KeyCode::Tab => Some(Action::ToggleFocus),
        KeyCode::Char('?') => Some(Action::ToggleHelp),
        KeyCode::Char(':') => Some(Action::StartCommand),
        KeyCode::Char('/') => Some(Action::StartSearch),
        KeyCode::Char('t') => Some(Action::StartTagFilter),
        KeyCode::Char('r') | KeyCode::F(5) => Some(Action::Refresh),
        KeyCode::Char('n') | KeyCode::Char(']') => Some(Action::NextPage),
        KeyCode::Char('N') | KeyCode::Char('[') => Some(Action::PrevPage),
        KeyCode::Char('o') => Some(Action::CycleSort),
        KeyCode::Char('O') => Some(Action::ToggleSortDirection),
        KeyCode::Char('e') => Some(Action::Edit),
        KeyCode::Char('D') => Some(Action::Delete),
        KeyCode::Char('m') => Some(Action::AddBookmark),
        KeyCode::Char('\'') => Some(Action::ShowBookmarks),
        _ => None,
    }
}

fn map_input_mode_key(key: KeyEvent) -> Option<Action> {
    match key.code {
        KeyCode::Esc => Some(Action::CancelInput),
        KeyCode::Enter => Some(Action::SubmitInput),
        KeyCode::Tab => Some(Action::CompleteInput),
        KeyCode::Backspace => Some(Action::Backspace),
        KeyCode::Char(c) if key.modifiers.is_empty() || key.modifiers == KeyModifiers::SHIFT => {
            Some(Action::InputChar(c))
        }
        _ => None,
    }
}

fn map_tag_picker_key(key: KeyEvent) -> Option<Action> {
    match key.code {
        KeyCode::Esc | KeyCode::Char('h') => Some(Action::Back),
        KeyCode::Enter => Some(Action::Select),
        KeyCode::Char('j') | KeyCode::Down => Some(Action::Down),
        KeyCode::Char('k') | KeyCode::Up => Some(Action::Up),
        KeyCode::Char('c') => Some(Action::ClearTagFilters),
        KeyCode::Char('x') => Some(Action::RemoveTagFilter),
        KeyCode::Char('/') => Some(Action::CustomTagValue),
        _ => None,
    }
}

fn map_confirm_key(key: KeyEvent) -> Option<Action> {
    match key.code {
        KeyCode::Char('y') | KeyCode::Char('Y') | KeyCode::Enter => Some(Action::ConfirmYes),
        KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => Some(Action::ConfirmNo),
        _ => None,
    }
}

fn map_bookmarks_key(key: KeyEvent) -> Option<Action> {
    match key.code {
        KeyCode::Esc | KeyCode::Char('q') | KeyCode::Char('h') => Some(Action::Back),
        KeyCode::Char('\'') => Some(Action::ShowBookmarks),
        KeyCode::Enter | KeyCode::Char('l') => Some(Action::Select),
        KeyCode::Char('j') | KeyCode::Down => Some(Action::Down),
        KeyCode::Char('k') | KeyCode::Up => Some(Action::Up),
        KeyCode::Char('g') | KeyCode::Home => Some(Action::Top),
        KeyCode::Char('G') | KeyCode::End => Some(Action::Bottom),
        KeyCode::Char('d') | KeyCode::Char('x') => Some(Action::RemoveBookmark),
        _ => None,
    }
}

fn map_overlay_key(key: KeyEvent) -> Option<Action> {
    match key.code {
        KeyCode::Esc | KeyCode::Enter | KeyCode::Char('q') => Some(Action::Back),
        KeyCode::Char('?') => Some(Action::ToggleHelp),
        KeyCode::Char('j') | KeyCode::Down => Some(Action::Down),
        KeyCode::Char('k') | KeyCode::Up => Some(Action::Up),
        KeyCode::PageDown => Some(Action::PageDown),
        KeyCode::PageUp => Some(Action::PageUp),
        _ => None,
    }
}
