use crate::bookmarks::{Bookmark, BookmarkStore};
use crate::error::HandlerError;
use crate::export::ExportFormat;
use crate::handler::{ResourceHandler, find_action};
use crate::input::Action;
use crate::model::{
    ActionDef, ActionOutcome, DetailMap, ExternalCommand, ListOptions, ListResult, Resource, Scope,
    format_timestamp,
};
use crate::pagination::{PageRequest, Paginator};
use crate::pipeline::PageView;
use crate::registry::Registry;
use crate::tagfilter::{TagEffect, TagPicker};
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

const BUILTIN_COMMANDS: [&str; 10] = [
    "bookmarks", "clear", "export", "help", "home", "profile", "q", "quit", "refresh", "region",
];
const MAX_VISIBLE_COMPLETIONS: usize = 8;
const PAGE_STEP: isize = 10;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum InputMode {
    Normal,
    Command,
    Search,
    TagPicker,
    TagInput,
    Confirm,
    Overlay,
    Bookmarks,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum FocusPane {
    Table,
    Detail,
}

/// Work the event loop performs on behalf of the state machine. Anything
/// that talks to a handler runs in the background and reports back as an
/// [`AppEvent`] tagged with the generation it was issued in.
pub enum AppCommand {
    None,
    LoadPage {
        generation: u64,
        handler: Arc<dyn ResourceHandler>,
        request: PageRequest,
        options: ListOptions,
    },
    Describe {
        generation: u64,
        epoch: u64,
        handler: Arc<dyn ResourceHandler>,
        resource_id: String,
    },
    ExecuteAction {
        generation: u64,
        handler: Arc<dyn ResourceHandler>,
        action: String,
        resource_id: String,
    },
    RunExternal(ExternalCommand),
    /// Fetches the map to edit; the editor only opens once it arrives.
    Edit {
        generation: u64,
        handler: Arc<dyn ResourceHandler>,
        resource_id: String,
    },
    OpenEditor {
        handler: Arc<dyn ResourceHandler>,
        resource_id: String,
        original: DetailMap,
    },
    Update {
        generation: u64,
        handler: Arc<dyn ResourceHandler>,
        resource_id: String,
        fields: DetailMap,
    },
    Delete {
        generation: u64,
        handler: Arc<dyn ResourceHandler>,
        resource_id: String,
    },
    RefreshResource {
        generation: u64,
        handler: Arc<dyn ResourceHandler>,
        resource_id: String,
    },
    /// Rebuilds the registry for `scope`, then opens `landing` if given.
    SwitchScope {
        scope: Scope,
        landing: Option<Bookmark>,
    },
    Export {
        handler: Arc<dyn ResourceHandler>,
        resource_id: String,
        format: ExportFormat,
    },
}

impl AppCommand {
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::LoadPage { .. } => "load-page",
            Self::Describe { .. } => "describe",
            Self::ExecuteAction { .. } => "execute-action",
            Self::RunExternal(_) => "run-external",
            Self::Edit { .. } => "edit",
            Self::OpenEditor { .. } => "open-editor",
            Self::Update { .. } => "update",
            Self::Delete { .. } => "delete",
            Self::RefreshResource { .. } => "refresh-resource",
            Self::SwitchScope { .. } => "switch-scope",
            Self::Export { .. } => "export",
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Mutation {
    Update,
    Delete,
}

impl Mutation {
    pub fn verb(self) -> &'static str {
        match self {
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }

    pub fn past_tense(self) -> &'static str {
        match self {
            Self::Update => "Updated",
            Self::Delete => "Deleted",
        }
    }
}

#[derive(Debug)]
pub enum AppEvent {
    PageLoaded {
        generation: u64,
        epoch: u64,
        result: Result<ListResult, HandlerError>,
    },
    DetailLoaded {
        generation: u64,
        epoch: u64,
        result: Result<DetailMap, HandlerError>,
    },
    ActionFinished {
        generation: u64,
        action: String,
        outcome: ActionOutcome,
    },
    EditLoaded {
        generation: u64,
        resource_id: String,
        result: Result<DetailMap, HandlerError>,
    },
    MutationFinished {
        generation: u64,
        mutation: Mutation,
        resource_id: String,
        result: Result<(), HandlerError>,
    },
    ResourceRefreshed {
        generation: u64,
        resource_id: String,
        result: Result<Arc<dyn Resource>, HandlerError>,
    },
    Exported(Result<PathBuf, String>),
}

#[derive(Debug, Clone)]
pub struct DetailPane {
    resource_id: String,
    title: String,
    identity: String,
    epoch: u64,
    text: Option<String>,
    scroll: u16,
}

impl DetailPane {
    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn resource_id(&self) -> &str {
        &self.resource_id
    }

    /// Type, ARN, region and creation time of the described resource.
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// `None` while the describe call is in flight.
    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    pub fn scroll(&self) -> u16 {
        self.scroll
    }
}

/// One browsed handler: its pagination state, the derived view of the
/// loaded page and the optional detail pane.
pub struct ListView {
    handler: Arc<dyn ResourceHandler>,
    root: bool,
    breadcrumb: Vec<String>,
    filter: String,
    paginator: Paginator,
    view: PageView,
    detail: Option<DetailPane>,
    focus: FocusPane,
    last_error: Option<String>,
    /// Resource to select once the first page arrives.
    landing_id: Option<String>,
}

impl ListView {
    fn new(
        handler: Arc<dyn ResourceHandler>,
        root: bool,
        breadcrumb: Vec<String>,
        filter: String,
    ) -> Self {
        let view = PageView::new(handler.columns().to_vec());
        Self {
            handler,
            root,
            breadcrumb,
            filter,
            paginator: Paginator::new(),
            view,
            detail: None,
            focus: FocusPane::Table,
            last_error: None,
            landing_id: None,
        }
    }

    pub fn handler(&self) -> &Arc<dyn ResourceHandler> {
        &self.handler
    }

    pub fn is_root(&self) -> bool {
        self.root
    }

    pub fn breadcrumb(&self) -> &[String] {
        &self.breadcrumb
    }

    /// Handler-level filter passed to `list`, set by `:<alias> <filter>`.
    pub fn filter(&self) -> &str {
        &self.filter
    }

    pub fn paginator(&self) -> &Paginator {
        &self.paginator
    }

    pub fn view(&self) -> &PageView {
        &self.view
    }

    pub fn detail(&self) -> Option<&DetailPane> {
        self.detail.as_ref()
    }

    pub fn focus(&self) -> FocusPane {
        self.focus
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    fn move_or_scroll(&mut self, delta: isize) {
        match (&mut self.detail, self.focus) {
            (Some(detail), FocusPane::Detail) => {
                detail.scroll = detail.scroll.saturating_add_signed(delta as i16);
            }
            _ => self.view.move_cursor(delta),
        }
    }

    fn jump(&mut self, top: bool) {
        match (&mut self.detail, self.focus) {
            (Some(detail), FocusPane::Detail) => {
                detail.scroll = if top { 0 } else { u16::MAX / 2 };
            }
            _ if top => self.view.select_first(),
            _ => self.view.select_last(),
        }
    }

    fn close_detail(&mut self) {
        self.detail = None;
        self.focus = FocusPane::Table;
    }
}

pub enum Screen {
    Home,
    ResourceList(Box<ListView>),
}

pub struct PendingConfirmation {
    prompt: String,
    command: AppCommand,
}

impl PendingConfirmation {
    pub fn prompt(&self) -> &str {
        &self.prompt
    }
}

/// Keyboard-capturing layers above the current screen. At most one is
/// open at a time.
pub enum Overlay {
    Search {
        input: String,
        previous: String,
    },
    Command {
        input: String,
        typed: String,
        completion_index: usize,
    },
    TagFilter(TagPicker),
    Confirm(PendingConfirmation),
    Info {
        title: String,
        text: String,
        scroll: u16,
    },
    Help {
        scroll: u16,
    },
    Bookmarks {
        cursor: usize,
    },
}

pub struct App {
    running: bool,
    scope: Scope,
    registry: Registry,
    screen: Screen,
    overlay: Option<Overlay>,
    home_cursor: usize,
    status: String,
    page_size: usize,
    generation: u64,
    detail_epoch: u64,
    bookmarks: BookmarkStore,
}

impl App {
    pub fn new(scope: Scope, registry: Registry, page_size: usize) -> Self {
        let status = format!("{} resource types in {scope}. Enter to browse, : for commands", registry.len());
        Self {
            running: true,
            scope,
            registry,
            screen: Screen::Home,
            overlay: None,
            home_cursor: 0,
            status,
            page_size: page_size.max(1),
            generation: 0,
            detail_epoch: 0,
            bookmarks: BookmarkStore::in_memory(),
        }
    }

    pub fn with_bookmarks(mut self, bookmarks: BookmarkStore) -> Self {
        self.bookmarks = bookmarks;
        self
    }

    pub fn bookmarks(&self) -> &[Bookmark] {
        self.bookmarks.list()
    }

    pub fn running(&self) -> bool {
        self.running
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn screen(&self) -> &Screen {
        &self.screen
    }

    pub fn overlay(&self) -> Option<&Overlay> {
        self.overlay.as_ref()
    }

    pub fn home_cursor(&self) -> usize {
        self.home_cursor
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn set_status(&mut self, status: impl Into<String>) {
        self.status = normalize_status_text(status.into());
    }

    pub fn mode(&self) -> InputMode {
        match &self.overlay {
            None => InputMode::Normal,
            Some(Overlay::Search { .. }) => InputMode::Search,
            Some(Overlay::Command { .. }) => InputMode::Command,
            Some(Overlay::TagFilter(picker)) if picker.accepts_text() => InputMode::TagInput,
            Some(Overlay::TagFilter(_)) => InputMode::TagPicker,
            Some(Overlay::Confirm(_)) => InputMode::Confirm,
            Some(Overlay::Info { .. } | Overlay::Help { .. }) => InputMode::Overlay,
            Some(Overlay::Bookmarks { .. }) => InputMode::Bookmarks,
        }
    }

    pub fn active_list(&self) -> Option<&ListView> {
        match &self.screen {
            Screen::ResourceList(list) => Some(list),
            Screen::Home => None,
        }
    }

    /// Keys claimed by the active handler's actions. Empty unless a
    /// resource list has the keyboard.
    pub fn action_keys(&self) -> Vec<char> {
        match (&self.screen, &self.overlay) {
            (Screen::ResourceList(list), None) => {
                list.handler.actions().iter().map(|action| action.key).collect()
            }
            _ => Vec::new(),
        }
    }

    pub fn active_actions(&self) -> Vec<ActionDef> {
        self.active_list()
            .map(|list| list.handler.actions())
            .unwrap_or_default()
    }

    pub fn page_summary(&self) -> Option<String> {
        let list = self.active_list()?;
        let paginator = &list.paginator;
        let mut summary = format!(
            "page {} · {}/{} shown",
            paginator.page(),
            list.view.visible_len(),
            list.view.loaded_len()
        );
        if paginator.has_prev() {
            summary.push_str(" · [ prev");
        }
        if paginator.has_more() {
            summary.push_str(" · ] next");
        }
        if paginator.is_loading() {
            summary.push_str(" · loading…");
        }
        Some(summary)
    }

    /// Completions for the command prompt, cycled with Tab.
    pub fn command_suggestions(&self) -> Vec<String> {
        match &self.overlay {
            Some(Overlay::Command { typed, .. }) => {
                let mut candidates = self.completion_candidates(typed);
                candidates.truncate(MAX_VISIBLE_COMPLETIONS);
                candidates
            }
            _ => Vec::new(),
        }
    }

    pub fn help_entries(&self) -> Vec<(String, String)> {
        let mut entries = [
            ("j/k ↑/↓", "Move selection or scroll"),
            ("Enter", "Open / describe selected"),
            ("d", "Toggle detail pane"),
            ("Tab", "Switch focus between table and detail"),
            ("Esc h", "Back (close detail, then home)"),
            ("/", "Search loaded page"),
            ("t ctrl+t", "Filter by tag"),
            ("o / O", "Cycle sort column / flip direction"),
            ("] n / [ N", "Next / previous page"),
            ("r F5 ctrl+r", "Reload from page 1"),
            ("e / D", "Edit / delete (when supported)"),
            ("m / '", "Bookmark selected / open bookmarks"),
            (":", "Command (:ecs, :profile p, :region r, :export json, :clear, :bookmarks)"),
            ("q", "Quit"),
        ]
        .into_iter()
        .map(|(key, description)| (key.to_string(), description.to_string()))
        .collect::<Vec<_>>();
        for action in self.active_actions() {
            let suffix = if action.dangerous { " (confirm)" } else { "" };
            entries.push((
                action.key.to_string(),
                format!("{}{suffix}", action.description),
            ));
        }
        entries
    }

    pub fn apply_action(&mut self, action: Action) -> AppCommand {
        if action == Action::Quit {
            self.running = false;
            self.set_status("Exit requested");
            return AppCommand::None;
        }
        if let Some(overlay) = self.overlay.take() {
            return self.apply_overlay_action(overlay, action);
        }
        match self.screen {
            Screen::Home => self.apply_home_action(action),
            Screen::ResourceList(_) => self.apply_list_action(action),
        }
    }

    pub fn apply_event(&mut self, event: AppEvent) -> AppCommand {
        match event {
            AppEvent::PageLoaded {
                generation,
                epoch,
                result,
            } => {
                self.apply_page(generation, epoch, result);
                AppCommand::None
            }
            AppEvent::DetailLoaded {
                generation,
                epoch,
                result,
            } => {
                self.apply_detail(generation, epoch, result);
                AppCommand::None
            }
            AppEvent::ActionFinished {
                generation,
                action,
                outcome,
            } => {
                if generation != self.generation {
                    debug!("discarding result of {action} from generation {generation}");
                    return AppCommand::None;
                }
                self.apply_outcome(&action, outcome)
            }
            AppEvent::EditLoaded {
                generation,
                resource_id,
                result,
            } => {
                if generation != self.generation {
                    debug!("discarding edit of {resource_id} from generation {generation}");
                    return AppCommand::None;
                }
                let Some(handler) = self.active_list().map(|list| list.handler.clone()) else {
                    return AppCommand::None;
                };
                match result {
                    Ok(original) => AppCommand::OpenEditor {
                        handler,
                        resource_id,
                        original,
                    },
                    Err(error) => {
                        self.set_status(format!("Cannot edit {resource_id}: {error}"));
                        AppCommand::None
                    }
                }
            }
            AppEvent::MutationFinished {
                generation,
                mutation,
                resource_id,
                result,
            } => match result {
                Ok(()) => {
                    self.set_status(format!("{} {resource_id}", mutation.past_tense()));
                    if generation != self.generation {
                        return AppCommand::None;
                    }
                    match mutation {
                        Mutation::Update => self.refresh_resource(resource_id),
                        Mutation::Delete => self.reload(),
                    }
                }
                Err(error) if error.is_not_supported() => {
                    self.set_status(format!("{} is not available here", mutation.verb()));
                    AppCommand::None
                }
                Err(error) => {
                    warn!("{} {resource_id} failed: {error}", mutation.verb());
                    self.set_status(format!("{} failed for {resource_id}: {error}", mutation.verb()));
                    AppCommand::None
                }
            },
            AppEvent::ResourceRefreshed {
                generation,
                resource_id,
                result,
            } => {
                if generation != self.generation {
                    return AppCommand::None;
                }
                let Screen::ResourceList(list) = &mut self.screen else {
                    return AppCommand::None;
                };
                let replaced = match result {
                    Ok(resource) => list.view.replace_resource(resource),
                    Err(error) => {
                        debug!("refreshing {resource_id} failed, reloading the page: {error}");
                        false
                    }
                };
                if replaced {
                    AppCommand::None
                } else {
                    self.reload()
                }
            }
            AppEvent::Exported(result) => {
                match result {
                    Ok(path) => self.set_status(format!("Exported to {}", path.display())),
                    Err(error) => self.set_status(format!("Export failed: {error}")),
                }
                AppCommand::None
            }
        }
    }

    /// Installs the registry built for a new scope. A bookmark being opened
    /// takes precedence. Otherwise a root list is re-resolved by type and
    /// reloaded; a scoped child list belongs to the old scope, so the UI
    /// returns home.
    pub fn switch_scope(
        &mut self,
        scope: Scope,
        registry: Registry,
        landing: Option<Bookmark>,
    ) -> AppCommand {
        info!("switching scope {} -> {scope}", self.scope);
        self.scope = scope;
        self.registry = registry;
        self.overlay = None;
        self.home_cursor = self.home_cursor.min(self.registry.len().saturating_sub(1));
        self.generation += 1;
        let previous = std::mem::replace(&mut self.screen, Screen::Home);
        if let Some(bookmark) = landing {
            return self.land_on(bookmark);
        }
        match previous {
            Screen::ResourceList(list) if list.is_root() => {
                let resource_type = list.handler.resource_type().to_string();
                match self.registry.get(&resource_type) {
                    Some(handler) => {
                        let command = self.open_list(handler, true, list.breadcrumb, list.filter);
                        self.set_status(format!("Switched to {}", self.scope));
                        command
                    }
                    None => {
                        self.set_status(format!(
                            "Switched to {}; {resource_type} is unavailable",
                            self.scope
                        ));
                        AppCommand::None
                    }
                }
            }
            Screen::ResourceList(_) => {
                self.set_status(format!("Switched to {}; back home", self.scope));
                AppCommand::None
            }
            Screen::Home => {
                self.set_status(format!("Switched to {}", self.scope));
                AppCommand::None
            }
        }
    }

    /// Checks an edited detail map before it is sent to `update`. Nothing
    /// is written when the map is unchanged or fails validation.
    pub fn review_edit(
        &mut self,
        handler: Arc<dyn ResourceHandler>,
        resource_id: String,
        original: &DetailMap,
        edited: DetailMap,
    ) -> AppCommand {
        if &edited == original {
            self.set_status(format!("No changes to {resource_id}"));
            return AppCommand::None;
        }
        let report = handler.validate_update(&resource_id, &edited);
        if !report.is_empty() {
            self.set_status(format!("Not saved: {}", report.summary()));
            return AppCommand::None;
        }
        self.set_status(format!("Saving {resource_id}…"));
        AppCommand::Update {
            generation: self.generation,
            handler,
            resource_id,
            fields: edited,
        }
    }

    fn apply_home_action(&mut self, action: Action) -> AppCommand {
        let count = self.registry.len();
        match action {
            Action::Down => {
                if count > 0 {
                    self.home_cursor = (self.home_cursor + 1).min(count - 1);
                }
                AppCommand::None
            }
            Action::Up => {
                self.home_cursor = self.home_cursor.saturating_sub(1);
                AppCommand::None
            }
            Action::Top => {
                self.home_cursor = 0;
                AppCommand::None
            }
            Action::Bottom => {
                self.home_cursor = count.saturating_sub(1);
                AppCommand::None
            }
            Action::Select => match self.registry.all().get(self.home_cursor).cloned() {
                Some(handler) => {
                    let breadcrumb = vec![handler.resource_name().to_string()];
                    self.open_list(handler, true, breadcrumb, String::new())
                }
                None => AppCommand::None,
            },
            Action::StartCommand => {
                self.open_command_prompt();
                AppCommand::None
            }
            Action::ToggleHelp => {
                self.overlay = Some(Overlay::Help { scroll: 0 });
                AppCommand::None
            }
            Action::ShowBookmarks => {
                self.open_bookmarks();
                AppCommand::None
            }
            _ => AppCommand::None,
        }
    }

    fn apply_list_action(&mut self, action: Action) -> AppCommand {
        let generation = self.generation;
        let Screen::ResourceList(list) = &mut self.screen else {
            return AppCommand::None;
        };
        match action {
            Action::Down => list.move_or_scroll(1),
            Action::Up => list.move_or_scroll(-1),
            Action::PageDown => list.move_or_scroll(PAGE_STEP),
            Action::PageUp => list.move_or_scroll(-PAGE_STEP),
            Action::Top => list.jump(true),
            Action::Bottom => list.jump(false),
            Action::Select => return self.open_detail(),
            Action::ToggleDetail => {
                if list.detail.is_some() {
                    list.close_detail();
                } else {
                    return self.open_detail();
                }
            }
            Action::ToggleFocus => {
                if list.detail.is_none() {
                    self.status = "Open details with d".to_string();
                } else {
                    list.focus = match list.focus {
                        FocusPane::Table => FocusPane::Detail,
                        FocusPane::Detail => FocusPane::Table,
                    };
                }
            }
            Action::Back => {
                if list.detail.is_some() {
                    list.close_detail();
                    self.status = "Closed details".to_string();
                } else {
                    self.go_home();
                }
            }
            Action::ToggleHelp => self.overlay = Some(Overlay::Help { scroll: 0 }),
            Action::StartCommand => self.open_command_prompt(),
            Action::StartSearch => {
                let previous = list.view.query().to_string();
                self.overlay = Some(Overlay::Search {
                    input: previous.clone(),
                    previous,
                });
            }
            Action::StartTagFilter => {
                if list.view.available_tags().is_empty() && list.view.tag_filters().is_empty() {
                    self.status = "No tags on this page".to_string();
                } else {
                    self.overlay = Some(Overlay::TagFilter(TagPicker::new(
                        list.view.available_tags(),
                    )));
                }
            }
            Action::Refresh => return self.reload(),
            Action::NextPage => {
                let Some(request) = list.paginator.next() else {
                    self.status = if list.paginator.is_loading() {
                        "Still loading…".to_string()
                    } else {
                        "No more pages".to_string()
                    };
                    return AppCommand::None;
                };
                return self.load_command(request);
            }
            Action::PrevPage => {
                let Some(request) = list.paginator.prev() else {
                    self.status = if list.paginator.is_loading() {
                        "Still loading…".to_string()
                    } else {
                        "Already on the first page".to_string()
                    };
                    return AppCommand::None;
                };
                return self.load_command(request);
            }
            Action::CycleSort => {
                if list.view.cycle_sort_column() {
                    let title = list.view.sort_column_title().unwrap_or("-");
                    self.status = format!("Sorted by {title}");
                } else {
                    self.status = "No sortable columns".to_string();
                }
            }
            Action::ToggleSortDirection => {
                list.view.toggle_sort_direction();
                let direction = if list.view.sort().ascending {
                    "ascending"
                } else {
                    "descending"
                };
                self.status = format!("Sort {direction}");
            }
            Action::Edit => {
                let handler = list.handler.clone();
                if !handler.can_edit() {
                    self.status = format!("{} cannot be edited", handler.resource_name());
                    return AppCommand::None;
                }
                let Some(resource) = list.view.selected() else {
                    self.status = "Nothing selected".to_string();
                    return AppCommand::None;
                };
                let resource_id = resource.id().to_string();
                self.status = format!("Fetching {resource_id} for editing…");
                return AppCommand::Edit {
                    generation,
                    handler,
                    resource_id,
                };
            }
            Action::Delete => {
                let handler = list.handler.clone();
                if !handler.can_delete() {
                    self.status = format!("{} cannot be deleted", handler.resource_name());
                    return AppCommand::None;
                }
                let Some(resource) = list.view.selected() else {
                    self.status = "Nothing selected".to_string();
                    return AppCommand::None;
                };
                let prompt = format!("Delete {}?", resource.name());
                let command = AppCommand::Delete {
                    generation,
                    handler,
                    resource_id: resource.id().to_string(),
                };
                self.confirm(prompt, command);
            }
            Action::HandlerAction(key) => {
                let handler = list.handler.clone();
                let Some(action) = find_action(handler.as_ref(), key) else {
                    return AppCommand::None;
                };
                let Some(resource) = list.view.selected() else {
                    self.status = format!("Select a resource to {}", action.name);
                    return AppCommand::None;
                };
                let prompt = format!("{} {}?", action.description, resource.name());
                let command = AppCommand::ExecuteAction {
                    generation,
                    handler,
                    action: action.name.to_string(),
                    resource_id: resource.id().to_string(),
                };
                if action.dangerous {
                    self.confirm(prompt, command);
                } else {
                    self.set_status(format!("Running {}…", action.name));
                    return command;
                }
            }
            Action::AddBookmark => self.bookmark_selected(),
            Action::ShowBookmarks => self.open_bookmarks(),
            Action::Quit
            | Action::RemoveBookmark
            | Action::SubmitInput
            | Action::CompleteInput
            | Action::CancelInput
            | Action::Backspace
            | Action::InputChar(_)
            | Action::ConfirmYes
            | Action::ConfirmNo
            | Action::ClearTagFilters
            | Action::RemoveTagFilter
            | Action::CustomTagValue => {}
        }
        AppCommand::None
    }

    fn apply_overlay_action(&mut self, overlay: Overlay, action: Action) -> AppCommand {
        match overlay {
            Overlay::Search {
                mut input,
                previous,
            } => match action {
                Action::InputChar(c) => {
                    input.push(c);
                    self.set_query(&input);
                    self.overlay = Some(Overlay::Search { input, previous });
                    AppCommand::None
                }
                Action::Backspace => {
                    input.pop();
                    self.set_query(&input);
                    self.overlay = Some(Overlay::Search { input, previous });
                    AppCommand::None
                }
                Action::SubmitInput => {
                    if input.is_empty() {
                        self.set_status("Search cleared");
                    } else {
                        self.set_status(format!("Search: {input}"));
                    }
                    AppCommand::None
                }
                Action::CancelInput => {
                    self.set_query(&previous);
                    self.set_status("Search cancelled");
                    AppCommand::None
                }
                _ => {
                    self.overlay = Some(Overlay::Search { input, previous });
                    AppCommand::None
                }
            },
            Overlay::Command {
                mut input,
                mut typed,
                mut completion_index,
            } => match action {
                Action::InputChar(c) => {
                    input.push(c);
                    typed = input.clone();
                    self.overlay = Some(Overlay::Command {
                        input,
                        typed,
                        completion_index: 0,
                    });
                    AppCommand::None
                }
                Action::Backspace => {
                    input.pop();
                    typed = input.clone();
                    self.overlay = Some(Overlay::Command {
                        input,
                        typed,
                        completion_index: 0,
                    });
                    AppCommand::None
                }
                Action::CompleteInput => {
                    let candidates = self.completion_candidates(&typed);
                    if !candidates.is_empty() {
                        input = candidates[completion_index % candidates.len()].clone();
                        completion_index += 1;
                    }
                    self.overlay = Some(Overlay::Command {
                        input,
                        typed,
                        completion_index,
                    });
                    AppCommand::None
                }
                Action::SubmitInput => self.run_command(&input),
                Action::CancelInput => {
                    self.set_status("Command cancelled");
                    AppCommand::None
                }
                _ => {
                    self.overlay = Some(Overlay::Command {
                        input,
                        typed,
                        completion_index,
                    });
                    AppCommand::None
                }
            },
            Overlay::TagFilter(mut picker) => {
                let effect = picker.handle(action);
                let Screen::ResourceList(list) = &mut self.screen else {
                    return AppCommand::None;
                };
                match effect {
                    TagEffect::None => self.overlay = Some(Overlay::TagFilter(picker)),
                    TagEffect::Apply { key, value } => {
                        list.view.set_tag_filter(key.clone(), value.clone());
                        let shown = list.view.visible_len();
                        self.set_status(format!("Tag filter {key}~{value} ({shown} shown)"));
                    }
                    TagEffect::Remove(key) => {
                        if list.view.remove_tag_filter(&key) {
                            self.status = format!("Removed tag filter on {key}");
                        }
                        self.overlay = Some(Overlay::TagFilter(picker));
                    }
                    TagEffect::ClearAll => {
                        list.view.clear_tag_filters();
                        self.set_status("Tag filters cleared");
                    }
                    TagEffect::Close => {}
                }
                AppCommand::None
            }
            Overlay::Confirm(pending) => match action {
                Action::ConfirmYes => {
                    debug!("confirmed {}", pending.command.label());
                    self.set_status(format!("Confirmed: {}", pending.prompt));
                    pending.command
                }
                Action::ConfirmNo => {
                    self.set_status("Cancelled");
                    AppCommand::None
                }
                _ => {
                    self.overlay = Some(Overlay::Confirm(pending));
                    AppCommand::None
                }
            },
            Overlay::Info {
                title,
                text,
                scroll,
            } => {
                if action != Action::Back {
                    let scroll = scroll_by(scroll, action);
                    self.overlay = Some(Overlay::Info {
                        title,
                        text,
                        scroll,
                    });
                }
                AppCommand::None
            }
            Overlay::Help { scroll } => {
                if !matches!(action, Action::Back | Action::ToggleHelp) {
                    self.overlay = Some(Overlay::Help {
                        scroll: scroll_by(scroll, action),
                    });
                }
                AppCommand::None
            }
            Overlay::Bookmarks { mut cursor } => {
                let last = self.bookmarks.len().saturating_sub(1);
                match action {
                    Action::Down => cursor = (cursor + 1).min(last),
                    Action::Up => cursor = cursor.saturating_sub(1),
                    Action::Top => cursor = 0,
                    Action::Bottom => cursor = last,
                    Action::Select => {
                        if let Some(bookmark) = self.bookmarks.list().get(cursor).cloned() {
                            return self.jump_to_bookmark(bookmark);
                        }
                    }
                    Action::RemoveBookmark => match self.bookmarks.remove(cursor) {
                        Ok(Some(removed)) => {
                            self.set_status(format!("Removed bookmark {}", removed.name));
                            cursor = cursor.min(self.bookmarks.len().saturating_sub(1));
                        }
                        Ok(None) => {}
                        Err(error) => {
                            warn!("failed to remove bookmark: {error:#}");
                            self.set_status(format!("Failed to remove bookmark: {error}"));
                        }
                    },
                    Action::Back | Action::ShowBookmarks => return AppCommand::None,
                    _ => {}
                }
                self.overlay = Some(Overlay::Bookmarks { cursor });
                AppCommand::None
            }
        }
    }

    fn apply_page(&mut self, generation: u64, epoch: u64, result: Result<ListResult, HandlerError>) {
        if generation != self.generation {
            debug!("discarding page from generation {generation}");
            return;
        }
        let Screen::ResourceList(list) = &mut self.screen else {
            return;
        };
        let Some(request) = list.paginator.settle(epoch) else {
            return;
        };
        let name = list.handler.resource_name().to_string();
        match result {
            Ok(result) => {
                let count = result.resources.len();
                list.paginator.commit(request, result.next_token);
                list.view.set_page(result.resources);
                list.last_error = None;
                let page = list.paginator.page();
                let mut status = format!("Loaded {count} {name} (page {page})");
                if let Some(id) = list.landing_id.take()
                    && !list.view.select_id(&id)
                {
                    status.push_str(&format!("; {id} is not on this page"));
                }
                self.set_status(status);
            }
            Err(error) => {
                warn!("listing {name} failed: {error}");
                list.last_error = Some(error.to_string());
                self.set_status(format!("{}: {}", error.code, summarize_error_line(&error.to_string())));
            }
        }
    }

    fn apply_detail(&mut self, generation: u64, epoch: u64, result: Result<DetailMap, HandlerError>) {
        if generation != self.generation {
            return;
        }
        let Screen::ResourceList(list) = &mut self.screen else {
            return;
        };
        let Some(detail) = list.detail.as_mut().filter(|detail| detail.epoch == epoch) else {
            debug!("discarding detail epoch={epoch}");
            return;
        };
        match result {
            Ok(map) => {
                detail.text = Some(
                    serde_json::to_string_pretty(&map)
                        .unwrap_or_else(|error| format!("unrenderable detail: {error}")),
                );
            }
            Err(error) => {
                let message = format!("{}: {error}", error.code);
                detail.text = Some(message.clone());
                self.set_status(message);
            }
        }
    }

    fn apply_outcome(&mut self, action: &str, outcome: ActionOutcome) -> AppCommand {
        match outcome {
            ActionOutcome::Done(message) => {
                self.set_status(message.unwrap_or_else(|| format!("{action} completed")));
                AppCommand::None
            }
            ActionOutcome::Failed(error) if error.is_not_supported() => {
                self.set_status(format!("{action} is not available here"));
                AppCommand::None
            }
            ActionOutcome::Failed(error) => {
                warn!("action {action} failed: {error}");
                self.set_status(format!("{action} failed: {error}"));
                AppCommand::None
            }
            ActionOutcome::Navigate(target) => {
                let name = target.handler.resource_name().to_string();
                info!("navigating to {}", target.handler.resource_type());
                let command = self.open_list(target.handler, false, target.breadcrumb, String::new());
                self.set_status(format!("Browsing {name}"));
                command
            }
            ActionOutcome::Inspect { title, detail } => {
                let text = serde_json::to_string_pretty(&detail)
                    .unwrap_or_else(|error| format!("unrenderable detail: {error}"));
                self.overlay = Some(Overlay::Info {
                    title,
                    text,
                    scroll: 0,
                });
                AppCommand::None
            }
            ActionOutcome::External(command) => {
                let prompt = command.prompt.clone();
                self.confirm(prompt, AppCommand::RunExternal(command));
                AppCommand::None
            }
        }
    }

    fn run_command(&mut self, input: &str) -> AppCommand {
        let trimmed = input.trim().trim_start_matches(':').trim();
        let (name, argument) = match trimmed.split_once(char::is_whitespace) {
            Some((name, rest)) => (name.to_lowercase(), rest.trim().to_string()),
            None => (trimmed.to_lowercase(), String::new()),
        };
        match name.as_str() {
            "" => AppCommand::None,
            "q" | "quit" => {
                self.running = false;
                self.set_status("Exit requested");
                AppCommand::None
            }
            "home" => {
                self.go_home();
                AppCommand::None
            }
            "help" => {
                self.overlay = Some(Overlay::Help { scroll: 0 });
                AppCommand::None
            }
            "refresh" => self.reload(),
            "clear" => {
                if let Screen::ResourceList(list) = &mut self.screen {
                    list.view.clear_filters();
                    self.status = "Filters and sort cleared".to_string();
                }
                AppCommand::None
            }
            "profile" | "region" if argument.is_empty() => {
                self.set_status(format!("Usage: :{name} <value> (current {})", self.scope));
                AppCommand::None
            }
            "profile" => AppCommand::SwitchScope {
                scope: Scope::new(argument, self.scope.region.clone()),
                landing: None,
            },
            "region" => AppCommand::SwitchScope {
                scope: Scope::new(self.scope.profile.clone(), argument),
                landing: None,
            },
            "bookmarks" => {
                self.open_bookmarks();
                AppCommand::None
            }
            "export" => self.export_command(&argument),
            alias => match self.registry.get(alias) {
                Some(handler) => {
                    let breadcrumb = vec![handler.resource_name().to_string()];
                    self.open_list(handler, true, breadcrumb, argument)
                }
                None => {
                    self.set_status(format!("Unknown command: {alias}"));
                    AppCommand::None
                }
            },
        }
    }

    fn export_command(&mut self, argument: &str) -> AppCommand {
        let Some(format) = ExportFormat::parse(argument) else {
            self.set_status("Usage: :export json|yaml");
            return AppCommand::None;
        };
        let selected = self.active_list().and_then(|list| {
            let resource = list.view.selected()?;
            Some((list.handler.clone(), resource.id().to_string()))
        });
        match selected {
            Some((handler, resource_id)) => {
                self.set_status(format!("Exporting {resource_id}…"));
                AppCommand::Export {
                    handler,
                    resource_id,
                    format,
                }
            }
            None => {
                self.set_status("Select a resource to export");
                AppCommand::None
            }
        }
    }

    fn completion_candidates(&self, typed: &str) -> Vec<String> {
        let query = typed.trim_start_matches(':').trim_start().to_lowercase();
        if query.contains(char::is_whitespace) {
            return Vec::new();
        }
        let mut candidates = BUILTIN_COMMANDS
            .iter()
            .map(|name| name.to_string())
            .chain(self.registry.lookup_names())
            .filter(|candidate| candidate.starts_with(&query))
            .collect::<Vec<_>>();
        candidates.sort();
        candidates.dedup();
        candidates
    }

    fn open_list(
        &mut self,
        handler: Arc<dyn ResourceHandler>,
        root: bool,
        breadcrumb: Vec<String>,
        filter: String,
    ) -> AppCommand {
        self.generation += 1;
        self.overlay = None;
        let mut list = ListView::new(handler, root, breadcrumb, filter);
        let request = list.paginator.reset();
        self.status = format!("Loading {}…", list.handler.resource_name());
        self.screen = Screen::ResourceList(Box::new(list));
        self.load_command(request)
    }

    fn go_home(&mut self) {
        self.generation += 1;
        self.screen = Screen::Home;
        self.set_status("Home");
    }

    fn reload(&mut self) -> AppCommand {
        let Screen::ResourceList(list) = &mut self.screen else {
            return AppCommand::None;
        };
        let request = list.paginator.reset();
        self.status = format!("Reloading {}…", list.handler.resource_name());
        self.load_command(request)
    }

    fn refresh_resource(&self, resource_id: String) -> AppCommand {
        let Screen::ResourceList(list) = &self.screen else {
            return AppCommand::None;
        };
        AppCommand::RefreshResource {
            generation: self.generation,
            handler: list.handler.clone(),
            resource_id,
        }
    }

    fn load_command(&self, request: PageRequest) -> AppCommand {
        let Screen::ResourceList(list) = &self.screen else {
            return AppCommand::None;
        };
        let sort = list.view.sort();
        let options = ListOptions {
            filter: list.filter.clone(),
            page_size: self.page_size,
            next_token: request.token.clone(),
            sort_field: list.view.sort_column_title().map(str::to_string),
            sort_ascending: sort.ascending,
        };
        AppCommand::LoadPage {
            generation: self.generation,
            handler: list.handler.clone(),
            request,
            options,
        }
    }

    fn open_detail(&mut self) -> AppCommand {
        self.detail_epoch += 1;
        let epoch = self.detail_epoch;
        let generation = self.generation;
        let Screen::ResourceList(list) = &mut self.screen else {
            return AppCommand::None;
        };
        let Some(resource) = list.view.selected().cloned() else {
            self.status = "Nothing selected".to_string();
            return AppCommand::None;
        };
        list.detail = Some(DetailPane {
            resource_id: resource.id().to_string(),
            title: resource.name().to_string(),
            identity: identity_line(resource.as_ref()),
            epoch,
            text: None,
            scroll: 0,
        });
        AppCommand::Describe {
            generation,
            epoch,
            handler: list.handler.clone(),
            resource_id: resource.id().to_string(),
        }
    }

    fn open_command_prompt(&mut self) {
        self.overlay = Some(Overlay::Command {
            input: String::new(),
            typed: String::new(),
            completion_index: 0,
        });
    }

    fn set_query(&mut self, query: &str) {
        if let Screen::ResourceList(list) = &mut self.screen {
            list.view.set_query(query);
        }
    }

    fn confirm(&mut self, prompt: String, command: AppCommand) {
        self.status = format!("{prompt} (y/n)");
        self.overlay = Some(Overlay::Confirm(PendingConfirmation { prompt, command }));
    }

    /// Only root lists can be bookmarked: scoped children are not in the
    /// registry, so there would be nothing to jump back into.
    fn bookmark_selected(&mut self) {
        let candidate = match self.active_list() {
            Some(list) if !list.root => Err("Only top-level lists can be bookmarked"),
            Some(list) => list
                .view
                .selected()
                .map(|resource| Bookmark {
                    name: resource.name().to_string(),
                    resource_type: list.handler.resource_type().to_string(),
                    resource_id: resource.id().to_string(),
                    arn: resource.arn(),
                    profile: self.scope.profile.clone(),
                    region: self.scope.region.clone(),
                    filter: list.filter.clone(),
                    created_at: Utc::now(),
                })
                .ok_or("Nothing selected"),
            None => return,
        };
        let bookmark = match candidate {
            Ok(bookmark) => bookmark,
            Err(reason) => {
                self.set_status(reason);
                return;
            }
        };
        let name = bookmark.name.clone();
        match self.bookmarks.add(bookmark) {
            Ok(()) => self.set_status(format!("Bookmarked {name}")),
            Err(error) => {
                warn!("failed to save bookmark {name}: {error:#}");
                self.set_status(format!("Failed to bookmark {name}: {error}"));
            }
        }
    }

    fn open_bookmarks(&mut self) {
        if self.bookmarks.is_empty() {
            self.set_status("No bookmarks yet: press m on a resource");
        }
        self.overlay = Some(Overlay::Bookmarks { cursor: 0 });
    }

    fn jump_to_bookmark(&mut self, bookmark: Bookmark) -> AppCommand {
        let scope = bookmark.scope();
        if scope != self.scope {
            self.set_status(format!("Switching to {scope} for {}…", bookmark.name));
            return AppCommand::SwitchScope {
                scope,
                landing: Some(bookmark),
            };
        }
        self.land_on(bookmark)
    }

    fn land_on(&mut self, bookmark: Bookmark) -> AppCommand {
        let Some(handler) = self.registry.get(&bookmark.resource_type) else {
            self.set_status(format!("No handler for {}", bookmark.resource_type));
            return AppCommand::None;
        };
        let breadcrumb = vec![handler.resource_name().to_string()];
        let command = self.open_list(handler, true, breadcrumb, bookmark.filter);
        if let Screen::ResourceList(list) = &mut self.screen {
            list.landing_id = Some(bookmark.resource_id);
        }
        self.set_status(format!("Opening bookmark {}…", bookmark.name));
        command
    }
}

fn identity_line(resource: &dyn Resource) -> String {
    let mut parts = vec![resource.resource_type().to_string(), resource.arn()];
    if !resource.region().is_empty() {
        parts.push(resource.region().to_string());
    }
    if resource.created_at().is_some() {
        parts.push(format!("created {}", format_timestamp(resource.created_at())));
    }
    parts.join(" · ")
}

fn scroll_by(scroll: u16, action: Action) -> u16 {
    match action {
        Action::Down => scroll.saturating_add(1),
        Action::Up => scroll.saturating_sub(1),
        Action::PageDown => scroll.saturating_add(PAGE_STEP as u16),
        Action::PageUp => scroll.saturating_sub(PAGE_STEP as u16),
        _ => scroll,
    }
}

fn summarize_error_line(error: &str) -> String {
    error
        .lines()
        .find(|line| !line.trim().is_empty())
        .map(|line| line.trim().to_string())
        .unwrap_or_else(|| "unknown error".to_string())
}

fn normalize_status_text(status: String) -> String {
    const MAX_STATUS_LEN: usize = 180;
    if status.chars().count() <= MAX_STATUS_LEN {
        return status;
    }

    let mut shortened = status
        .chars()
        .take(MAX_STATUS_LEN.saturating_sub(1))
        .collect::<String>();
    shortened.push('…');
    shortened
}

#[cfg(test)]
mod tests {
    use super::{App, AppCommand, AppEvent, FocusPane, InputMode, Mutation, Overlay, Screen};
    use crate::error::{ErrorCode, HandlerError};
    use crate::handler::ResourceHandler;
    use crate::input::{Action, map_key};
    use crate::model::{ActionDef, ActionOutcome, DetailMap, NavTarget, Scope};
    use crate::registry::Registry;
    use crate::testing::{FakeHandler, fake_resource};
    use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
    use serde_json::json;
    use std::sync::Arc;

    fn services_handler() -> FakeHandler {
        FakeHandler::new("fake:services", "Fake Services", "fsvc").with_page(
            "",
            vec![fake_resource("svc-1", &["api", "ACTIVE", ""], &[])],
            "",
        )
    }

    fn clusters_handler() -> FakeHandler {
        let navigate = ActionOutcome::Navigate(NavTarget::new(
            Arc::new(services_handler()),
            vec!["Clusters".to_string(), "prod".to_string(), "Services".to_string()],
        ));
        FakeHandler::new("fake:clusters", "Fake Clusters", "fc")
            .with_page(
                "",
                vec![
                    fake_resource("prod", &["prod", "ACTIVE", ""], &[("env", "prod")]),
                    fake_resource("dev", &["dev", "ACTIVE", ""], &[("env", "dev")]),
                ],
                "A",
            )
            .with_page(
                "A",
                vec![fake_resource("qa", &["qa", "INACTIVE", ""], &[])],
                "",
            )
            .with_action(ActionDef::new('s', "services", "View services"), navigate)
            .with_action(
                ActionDef::new('x', "explode", "Explode"),
                ActionOutcome::Failed(HandlerError::new(ErrorCode::UpdateFailed, "boom")),
            )
            .with_action(
                ActionDef::dangerous('r', "reboot", "Reboot"),
                ActionOutcome::Done(Some("Rebooting prod".to_string())),
            )
    }

    fn registry() -> Registry {
        let mut registry = Registry::new();
        registry
            .register(Arc::new(clusters_handler()))
            .expect("clusters register");
        registry
            .register(Arc::new(services_handler()))
            .expect("services register");
        registry
    }

    fn app() -> App {
        App::new(Scope::new("test", "us-east-1"), registry(), 50)
    }

    fn editable_handler() -> FakeHandler {
        FakeHandler::new("fake:items", "Fake Items", "fi")
            .with_page("", vec![fake_resource("k1", &["k1", "", ""], &[])], "N")
            .with_page("N", vec![fake_resource("k2", &["k2", "", ""], &[])], "")
            .editable()
    }

    /// Runs handler-bound commands inline until one needs the outer loop.
    async fn drive(app: &mut App, mut command: AppCommand) -> AppCommand {
        loop {
            command = match command {
                AppCommand::LoadPage {
                    generation,
                    handler,
                    request,
                    options,
                } => {
                    let result = handler.list(&options).await;
                    app.apply_event(AppEvent::PageLoaded {
                        generation,
                        epoch: request.epoch,
                        result,
                    })
                }
                AppCommand::Describe {
                    generation,
                    epoch,
                    handler,
                    resource_id,
                } => {
                    let result = handler.describe(&resource_id).await;
                    app.apply_event(AppEvent::DetailLoaded {
                        generation,
                        epoch,
                        result,
                    })
                }
                AppCommand::ExecuteAction {
                    generation,
                    handler,
                    action,
                    resource_id,
                } => {
                    let outcome = handler.execute_action(&action, &resource_id).await;
                    app.apply_event(AppEvent::ActionFinished {
                        generation,
                        action,
                        outcome,
                    })
                }
                AppCommand::Edit {
                    generation,
                    handler,
                    resource_id,
                } => {
                    let result = handler.describe(&resource_id).await;
                    app.apply_event(AppEvent::EditLoaded {
                        generation,
                        resource_id,
                        result,
                    })
                }
                AppCommand::Update {
                    generation,
                    handler,
                    resource_id,
                    fields,
                } => {
                    let result = handler.update(&resource_id, fields).await;
                    app.apply_event(AppEvent::MutationFinished {
                        generation,
                        mutation: Mutation::Update,
                        resource_id,
                        result,
                    })
                }
                AppCommand::RefreshResource {
                    generation,
                    handler,
                    resource_id,
                } => {
                    let result = handler.get(&resource_id).await;
                    app.apply_event(AppEvent::ResourceRefreshed {
                        generation,
                        resource_id,
                        result,
                    })
                }
                other => return other,
            };
        }
    }

    async fn open_clusters(app: &mut App) {
        let command = app.apply_action(Action::Select);
        drive(app, command).await;
    }

    fn active_type(app: &App) -> Option<String> {
        app.active_list()
            .map(|list| list.handler().resource_type().to_string())
    }

    fn type_command(app: &mut App, text: &str) -> AppCommand {
        app.apply_action(Action::StartCommand);
        for c in text.chars() {
            app.apply_action(Action::InputChar(c));
        }
        app.apply_action(Action::SubmitInput)
    }

    #[tokio::test]
    async fn home_select_loads_first_page() {
        let mut app = app();
        assert!(matches!(app.screen(), Screen::Home));
        open_clusters(&mut app).await;

        let list = app.active_list().expect("list open");
        assert_eq!(list.handler().resource_type(), "fake:clusters");
        assert_eq!(list.view().loaded_len(), 2);
        assert_eq!(list.paginator().page(), 1);
        assert!(list.paginator().has_more());
    }

    #[tokio::test]
    async fn navigation_outcome_switches_handler_without_error() {
        let mut app = app();
        open_clusters(&mut app).await;
        let next = app.apply_action(Action::NextPage);
        drive(&mut app, next).await;
        assert_eq!(app.active_list().map(|list| list.paginator().page()), Some(2));

        let command = app.apply_action(Action::HandlerAction('s'));
        drive(&mut app, command).await;

        let list = app.active_list().expect("list open");
        assert_eq!(list.handler().resource_type(), "fake:services");
        assert_eq!(list.paginator().page(), 1);
        assert_eq!(list.paginator().stack_depth(), 0);
        assert!(!list.is_root());
        assert_eq!(list.breadcrumb(), ["Clusters", "prod", "Services"]);
        assert_eq!(list.view().visible_ids(), vec!["svc-1"]);
        assert!(!app.status().contains("failed"));
    }

    #[tokio::test]
    async fn failed_outcome_keeps_handler_and_page() {
        let mut app = app();
        open_clusters(&mut app).await;
        let next = app.apply_action(Action::NextPage);
        drive(&mut app, next).await;

        let command = app.apply_action(Action::HandlerAction('x'));
        drive(&mut app, command).await;

        assert_eq!(active_type(&app).as_deref(), Some("fake:clusters"));
        assert_eq!(app.active_list().map(|list| list.paginator().page()), Some(2));
        assert!(app.status().contains("boom"));
    }

    #[tokio::test]
    async fn handler_key_wins_over_refresh() {
        let mut app = app();
        open_clusters(&mut app).await;
        assert!(app.action_keys().contains(&'r'));

        let key = KeyEvent::new(KeyCode::Char('r'), KeyModifiers::NONE);
        let action = map_key(app.mode(), &app.action_keys(), key).expect("mapped");
        assert_eq!(action, Action::HandlerAction('r'));

        let command = app.apply_action(action);
        assert!(command.is_none());
        assert_eq!(app.mode(), InputMode::Confirm);
        let confirmed = app.apply_action(Action::ConfirmYes);
        assert!(matches!(
            &confirmed,
            AppCommand::ExecuteAction { action, resource_id, .. } if action == "reboot" && resource_id == "prod"
        ));
        drive(&mut app, confirmed).await;
        assert_eq!(app.status(), "Rebooting prod");

        let ctrl_r = KeyEvent::new(KeyCode::Char('r'), KeyModifiers::CONTROL);
        let action = map_key(app.mode(), &app.action_keys(), ctrl_r).expect("mapped");
        assert!(matches!(app.apply_action(action), AppCommand::LoadPage { .. }));
    }

    #[tokio::test]
    async fn back_from_list_returns_home_and_drops_late_pages() {
        let mut app = app();
        open_clusters(&mut app).await;
        let pending = app.apply_action(Action::Refresh);

        app.apply_action(Action::Back);
        assert!(matches!(app.screen(), Screen::Home));

        drive(&mut app, pending).await;
        assert!(matches!(app.screen(), Screen::Home));
    }

    #[tokio::test]
    async fn superseded_page_is_discarded() {
        let mut app = app();
        open_clusters(&mut app).await;
        let stale = app.apply_action(Action::NextPage);
        let fresh = app.apply_action(Action::Refresh);

        drive(&mut app, stale).await;
        assert_eq!(app.active_list().map(|list| list.paginator().page()), Some(1));
        assert!(app.active_list().is_some_and(|list| list.paginator().is_loading()));

        drive(&mut app, fresh).await;
        let list = app.active_list().expect("list open");
        assert_eq!(list.view().visible_ids(), vec!["prod", "dev"]);
        assert!(!list.paginator().is_loading());
    }

    #[tokio::test]
    async fn next_page_is_ignored_while_loading() {
        let mut app = app();
        open_clusters(&mut app).await;
        let first = app.apply_action(Action::NextPage);
        assert!(matches!(first, AppCommand::LoadPage { .. }));
        assert!(app.apply_action(Action::NextPage).is_none());
        assert_eq!(app.status(), "Still loading…");
    }

    #[tokio::test]
    async fn edit_and_delete_are_hidden_without_capability() {
        let mut app = app();
        open_clusters(&mut app).await;
        assert!(app.apply_action(Action::Edit).is_none());
        assert_eq!(app.status(), "Fake Clusters cannot be edited");
        assert!(app.apply_action(Action::Delete).is_none());
        assert_eq!(app.mode(), InputMode::Normal);
    }

    #[tokio::test]
    async fn unsupported_action_is_not_reported_as_failure() {
        let mut app = app();
        open_clusters(&mut app).await;
        let generation = match app.apply_action(Action::HandlerAction('s')) {
            AppCommand::ExecuteAction { generation, .. } => generation,
            _ => panic!("expected action"),
        };
        app.apply_event(AppEvent::ActionFinished {
            generation,
            action: "services".to_string(),
            outcome: ActionOutcome::Failed(HandlerError::not_supported()),
        });
        assert_eq!(app.status(), "services is not available here");
    }

    #[tokio::test]
    async fn detail_pane_loads_and_takes_focus() {
        let mut app = app();
        open_clusters(&mut app).await;
        let describe = app.apply_action(Action::Select);
        drive(&mut app, describe).await;
        app.apply_action(Action::ToggleFocus);

        let list = app.active_list().expect("list open");
        let detail = list.detail().expect("detail open");
        assert_eq!(detail.resource_id(), "prod");
        assert_eq!(
            detail.identity(),
            "fake:things · arn:aws:fake:us-east-1::things/prod · us-east-1"
        );
        assert!(detail.text().is_some_and(|text| text.contains("\"id\": \"prod\"")));
        assert_eq!(list.focus(), FocusPane::Detail);

        app.apply_action(Action::Back);
        assert!(app.active_list().is_some_and(|list| list.detail().is_none()));
        assert!(app.active_list().is_some());
    }

    #[tokio::test]
    async fn search_and_tag_filter_narrow_loaded_page() {
        let mut app = app();
        open_clusters(&mut app).await;

        app.apply_action(Action::StartSearch);
        app.apply_action(Action::InputChar('d'));
        app.apply_action(Action::InputChar('e'));
        app.apply_action(Action::SubmitInput);
        assert_eq!(
            app.active_list().map(|list| list.view().visible_ids()),
            Some(vec!["dev".to_string()])
        );

        app.apply_action(Action::StartSearch);
        app.apply_action(Action::Backspace);
        app.apply_action(Action::Backspace);
        app.apply_action(Action::SubmitInput);
        assert_eq!(app.active_list().map(|list| list.view().visible_len()), Some(2));
        app.apply_action(Action::StartTagFilter);
        assert_eq!(app.mode(), InputMode::TagPicker);
        app.apply_action(Action::Select);
        app.apply_action(Action::Down);
        app.apply_action(Action::Select);
        assert_eq!(
            app.active_list().map(|list| list.view().visible_ids()),
            Some(vec!["prod".to_string()])
        );
        assert_eq!(app.mode(), InputMode::Normal);

        assert!(type_command(&mut app, "clear").is_none());
        assert_eq!(app.active_list().map(|list| list.view().visible_len()), Some(2));
    }

    #[tokio::test]
    async fn alias_command_opens_with_handler_filter() {
        let mut app = app();
        let command = type_command(&mut app, "fsvc api");
        let AppCommand::LoadPage { options, .. } = command else {
            panic!("expected load");
        };
        assert_eq!(options.filter, "api");
        assert_eq!(active_type(&app).as_deref(), Some("fake:services"));

        assert!(type_command(&mut app, "nope").is_none());
        assert_eq!(app.status(), "Unknown command: nope");
    }

    #[test]
    fn tab_cycles_completions() {
        let mut app = app();
        app.apply_action(Action::StartCommand);
        app.apply_action(Action::InputChar('f'));
        assert_eq!(
            app.command_suggestions(),
            vec!["fake:clusters", "fake:services", "fc", "fsvc"]
        );
        app.apply_action(Action::CompleteInput);
        app.apply_action(Action::CompleteInput);
        let Some(Overlay::Command { input, .. }) = app.overlay() else {
            panic!("prompt open");
        };
        assert_eq!(input, "fake:services");
    }

    #[test]
    fn profile_command_requests_scope_switch() {
        let mut app = app();
        let command = type_command(&mut app, "profile prod");
        assert!(matches!(
            command,
            AppCommand::SwitchScope { scope, landing: None } if scope == Scope::new("prod", "us-east-1")
        ));
    }

    #[tokio::test]
    async fn scope_switch_reloads_root_and_leaves_child() {
        let mut app = app();
        open_clusters(&mut app).await;
        let mut registry = Registry::new();
        registry
            .register(Arc::new(clusters_handler()))
            .expect("register");
        let command = app.switch_scope(Scope::new("test", "eu-west-1"), registry, None);
        assert!(matches!(command, AppCommand::LoadPage { .. }));
        drive(&mut app, command).await;
        assert_eq!(active_type(&app).as_deref(), Some("fake:clusters"));

        let navigate = app.apply_action(Action::HandlerAction('s'));
        drive(&mut app, navigate).await;
        assert_eq!(active_type(&app).as_deref(), Some("fake:services"));
        let command = app.switch_scope(Scope::new("test", "us-west-2"), Registry::new(), None);
        assert!(command.is_none());
        assert!(matches!(app.screen(), Screen::Home));
        assert_eq!(app.scope().to_string(), "test@us-west-2");
    }

    #[tokio::test]
    async fn inspect_outcome_opens_info_overlay() {
        let mut app = app();
        open_clusters(&mut app).await;
        let generation = match app.apply_action(Action::HandlerAction('s')) {
            AppCommand::ExecuteAction { generation, .. } => generation,
            _ => panic!("expected action"),
        };
        let mut detail = DetailMap::new();
        detail.insert("Version".to_string(), json!("2012-10-17"));
        app.apply_event(AppEvent::ActionFinished {
            generation,
            action: "policy".to_string(),
            outcome: ActionOutcome::Inspect {
                title: "Policy".to_string(),
                detail,
            },
        });
        assert_eq!(app.mode(), InputMode::Overlay);
        app.apply_action(Action::Back);
        assert_eq!(app.mode(), InputMode::Normal);
    }

    #[test]
    fn review_edit_blocks_invalid_or_unchanged_maps() {
        let mut app = app();
        let handler: Arc<dyn ResourceHandler> = Arc::new(services_handler());
        let mut original = DetailMap::new();
        original.insert("id".to_string(), json!("svc-1"));

        let unchanged = app.review_edit(handler.clone(), "svc-1".to_string(), &original, original.clone());
        assert!(unchanged.is_none());
        assert_eq!(app.status(), "No changes to svc-1");

        let mut edited = original.clone();
        edited.insert("note".to_string(), json!("x"));
        let command = app.review_edit(handler, "svc-1".to_string(), &original, edited);
        assert!(matches!(command, AppCommand::Update { .. }));
    }

    #[tokio::test]
    async fn failed_refresh_keeps_page_and_cursor_stack() {
        let mut app = app();
        open_clusters(&mut app).await;
        let next = app.apply_action(Action::NextPage);
        drive(&mut app, next).await;

        let AppCommand::LoadPage {
            generation,
            request,
            ..
        } = app.apply_action(Action::Refresh)
        else {
            panic!("expected reload");
        };
        app.apply_event(AppEvent::PageLoaded {
            generation,
            epoch: request.epoch,
            result: Err(HandlerError::new(ErrorCode::ListFailed, "throttled")),
        });

        let list = app.active_list().expect("list open");
        assert_eq!(list.paginator().page(), 2);
        assert!(list.paginator().has_prev());
        assert_eq!(list.view().visible_ids(), vec!["qa"]);
        assert!(app.status().contains("throttled"));

        let prev = app.apply_action(Action::PrevPage);
        let AppCommand::LoadPage { options, .. } = &prev else {
            panic!("previous page still reachable");
        };
        assert_eq!(options.next_token, "");
        drive(&mut app, prev).await;
        assert_eq!(
            app.active_list().map(|list| list.view().visible_ids()),
            Some(vec!["prod".to_string(), "dev".to_string()])
        );
    }

    #[tokio::test]
    async fn edit_opens_editor_only_after_describe_and_refreshes_row() {
        let handler = Arc::new(editable_handler());
        let mut registry = Registry::new();
        registry.register(handler.clone()).expect("register");
        let mut app = App::new(Scope::new("test", "us-east-1"), registry, 50);
        open_clusters(&mut app).await;
        let next = app.apply_action(Action::NextPage);
        drive(&mut app, next).await;

        let edit = app.apply_action(Action::Edit);
        assert!(matches!(edit, AppCommand::Edit { .. }));
        assert_eq!(app.mode(), InputMode::Normal);
        let AppCommand::OpenEditor {
            handler: target,
            resource_id,
            original,
        } = drive(&mut app, edit).await
        else {
            panic!("editor opens once the map arrives");
        };
        assert_eq!(resource_id, "k2");

        let mut edited = original.clone();
        edited.insert("note".to_string(), json!("x"));
        let update = app.review_edit(target, resource_id, &original, edited);
        assert!(drive(&mut app, update).await.is_none());

        let list = app.active_list().expect("list open");
        assert_eq!(list.paginator().page(), 2);
        assert_eq!(list.view().visible_ids(), vec!["k2"]);
        assert_eq!(app.status(), "Updated k2");
        assert_eq!(handler.list_tokens(), vec!["", "N"]);
    }

    #[tokio::test]
    async fn edit_result_after_leaving_list_is_dropped() {
        let mut registry = Registry::new();
        registry
            .register(Arc::new(editable_handler()))
            .expect("register");
        let mut app = App::new(Scope::new("test", "us-east-1"), registry, 50);
        open_clusters(&mut app).await;

        let edit = app.apply_action(Action::Edit);
        app.apply_action(Action::Back);
        assert!(drive(&mut app, edit).await.is_none());
        assert!(matches!(app.screen(), Screen::Home));
    }

    #[tokio::test]
    async fn bookmark_lands_on_saved_resource() {
        let mut app = app();
        open_clusters(&mut app).await;
        app.apply_action(Action::Down);
        app.apply_action(Action::AddBookmark);
        assert_eq!(app.status(), "Bookmarked dev");
        assert_eq!(app.bookmarks().len(), 1);

        app.apply_action(Action::Back);
        assert!(matches!(app.screen(), Screen::Home));
        app.apply_action(Action::ShowBookmarks);
        assert_eq!(app.mode(), InputMode::Bookmarks);
        let command = app.apply_action(Action::Select);
        drive(&mut app, command).await;

        let list = app.active_list().expect("list open");
        assert_eq!(list.handler().resource_type(), "fake:clusters");
        assert_eq!(list.view().selected().map(|resource| resource.id()), Some("dev"));
    }

    #[tokio::test]
    async fn bookmark_from_other_scope_switches_before_landing() {
        let mut app = app();
        open_clusters(&mut app).await;
        app.apply_action(Action::AddBookmark);
        let command = app.switch_scope(Scope::new("test", "eu-west-1"), registry(), None);
        drive(&mut app, command).await;

        app.apply_action(Action::ShowBookmarks);
        let AppCommand::SwitchScope { scope, landing } = app.apply_action(Action::Select) else {
            panic!("expected scope switch");
        };
        assert_eq!(scope, Scope::new("test", "us-east-1"));
        let command = app.switch_scope(scope, registry(), landing);
        drive(&mut app, command).await;

        assert_eq!(app.scope().region, "us-east-1");
        let list = app.active_list().expect("list open");
        assert_eq!(list.handler().resource_type(), "fake:clusters");
        assert_eq!(list.view().selected().map(|resource| resource.id()), Some("prod"));
    }

    #[tokio::test]
    async fn child_lists_are_not_bookmarked_and_marks_can_be_removed() {
        let mut app = app();
        open_clusters(&mut app).await;
        app.apply_action(Action::AddBookmark);
        let navigate = app.apply_action(Action::HandlerAction('s'));
        drive(&mut app, navigate).await;

        app.apply_action(Action::AddBookmark);
        assert_eq!(app.status(), "Only top-level lists can be bookmarked");
        assert_eq!(app.bookmarks().len(), 1);

        app.apply_action(Action::ShowBookmarks);
        app.apply_action(Action::RemoveBookmark);
        assert!(app.bookmarks().is_empty());
        assert_eq!(app.status(), "Removed bookmark prod");
        assert_eq!(app.mode(), InputMode::Bookmarks);
        app.apply_action(Action::Back);
        assert_eq!(app.mode(), InputMode::Normal);
    }
}
