mod app;
mod aws;
mod bookmarks;
mod cli;
mod config;
mod error;
mod export;
mod handler;
mod input;
mod model;
mod pagination;
mod pipeline;
mod registry;
mod services;
mod tagfilter;
#[cfg(test)]
mod testing;
mod ui;

use anyhow::{Context, Result};
use app::{App, AppCommand, AppEvent, Mutation};
use aws::CliTransport;
use bookmarks::BookmarkStore;
use clap::Parser;
use cli::CliArgs;
use config::StratusConfig;
use crossterm::event::{
    Event, EventStream, KeyEventKind, KeyboardEnhancementFlags, PopKeyboardEnhancementFlags,
    PushKeyboardEnhancementFlags,
};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
    supports_keyboard_enhancement,
};
use futures::StreamExt;
use model::{DetailMap, ExternalCommand, Scope};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use registry::Registry;
use std::fs::{self, OpenOptions};
use std::io::{self, Stdout};
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use tokio::process::Command as TokioCommand;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

type TuiTerminal = Terminal<CrosstermBackend<Stdout>>;
type EventSender = mpsc::UnboundedSender<AppEvent>;

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();
    init_tracing(&args.log_filter, args.log_file.as_deref())?;

    let config = StratusConfig::load(args.config.as_deref())?;
    if let Some(source) = &config.source {
        info!("loaded config from {}", source.display());
    }
    let scope = config.initial_scope(args.profile.clone(), args.region.clone());
    let page_size = args
        .page_size
        .map(|size| size.clamp(1, 1_000))
        .unwrap_or_else(|| config.page_size());
    let registry = build_scope_registry(&config, &scope)?;
    info!("starting in {scope} with {} resource types", registry.len());

    let bookmarks_path = config.bookmarks_path();
    let bookmarks = match BookmarkStore::load(&bookmarks_path) {
        Ok(store) => store,
        Err(error) => {
            warn!("bookmarks unavailable, keeping them in memory: {error:#}");
            BookmarkStore::in_memory()
        }
    };

    let mut app = App::new(scope, registry, page_size).with_bookmarks(bookmarks);
    run(&mut app, &config).await
}

fn init_tracing(level_filter: &str, log_file: Option<&Path>) -> Result<()> {
    let filter = EnvFilter::try_new(level_filter)
        .or_else(|_| EnvFilter::try_new("info"))
        .context("failed to initialize tracing filter")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact();

    // The terminal belongs to the UI; logs go to a file or nowhere.
    match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            let _ = builder
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init();
        }
        None => {
            let _ = builder.with_writer(io::sink).try_init();
        }
    }

    Ok(())
}

fn build_scope_registry(config: &StratusConfig, scope: &Scope) -> Result<Registry> {
    let transport = Arc::new(CliTransport::new(
        config.aws_binary.clone(),
        scope.clone(),
        config.call_timeout(),
    ));
    services::build_registry(transport, &config.aliases)
        .with_context(|| format!("failed to build resource registry for {scope}"))
}

async fn run(app: &mut App, config: &StratusConfig) -> Result<()> {
    let (mut terminal, keyboard_enhanced) = init_terminal()?;
    let run_result = run_loop(&mut terminal, app, config).await;
    let restore_result = restore_terminal(&mut terminal, keyboard_enhanced);

    match (run_result, restore_result) {
        (Err(run_error), Err(restore_error)) => Err(anyhow::anyhow!(
            "{run_error:#}\nterminal restore error: {restore_error:#}"
        )),
        (Err(error), _) => Err(error),
        (_, Err(error)) => Err(error),
        (Ok(()), Ok(())) => Ok(()),
    }
}

fn init_terminal() -> Result<(TuiTerminal, bool)> {
    enable_raw_mode().context("failed to enable raw mode")?;
    let mut stdout = io::stdout();
    let keyboard_enhanced = matches!(supports_keyboard_enhancement(), Ok(true));
    if keyboard_enhanced {
        execute!(
            stdout,
            EnterAlternateScreen,
            PushKeyboardEnhancementFlags(KeyboardEnhancementFlags::DISAMBIGUATE_ESCAPE_CODES)
        )
        .context("failed to enter alternate screen with keyboard enhancement")?;
    } else {
        execute!(stdout, EnterAlternateScreen).context("failed to enter alternate screen")?;
    }
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("failed to create terminal backend")?;
    terminal.clear().context("failed to clear terminal")?;
    Ok((terminal, keyboard_enhanced))
}

fn restore_terminal(terminal: &mut TuiTerminal, keyboard_enhanced: bool) -> Result<()> {
    if keyboard_enhanced {
        execute!(terminal.backend_mut(), PopKeyboardEnhancementFlags)
            .context("failed to pop keyboard enhancement flags")?;
    }
    disable_raw_mode().context("failed to disable raw mode")?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)
        .context("failed to leave alternate screen")?;
    terminal.show_cursor().context("failed to show cursor")?;
    Ok(())
}

async fn run_loop(terminal: &mut TuiTerminal, app: &mut App, config: &StratusConfig) -> Result<()> {
    let mut reader = EventStream::new();
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<AppEvent>();

    loop {
        terminal
            .draw(|frame| ui::render(frame, app))
            .context("failed to render terminal frame")?;

        if !app.running() {
            break;
        }

        tokio::select! {
            maybe_event = reader.next() => {
                match maybe_event {
                    Some(Ok(Event::Key(key))) if key.kind == KeyEventKind::Press => {
                        let keys = app.action_keys();
                        if let Some(action) = input::map_key(app.mode(), &keys, key) {
                            debug!("action={action:?}");
                            let command = app.apply_action(action);
                            execute_app_command(terminal, app, config, command, &event_tx).await;
                        }
                    }
                    Some(Ok(_)) => {}
                    Some(Err(error)) => {
                        app.set_status(format!("terminal event error: {error}"));
                    }
                    None => {
                        app.set_status("terminal event stream closed");
                        break;
                    }
                }
            }
            maybe_event = event_rx.recv() => {
                if let Some(event) = maybe_event {
                    let command = app.apply_event(event);
                    execute_app_command(terminal, app, config, command, &event_tx).await;
                }
            }
        }
    }

    Ok(())
}

/// Runs `command` and whatever follow-up commands it produces. Handler
/// calls are spawned and report back through `events`; only terminal
/// hand-offs and scope rebuilds run inline.
async fn execute_app_command(
    terminal: &mut TuiTerminal,
    app: &mut App,
    config: &StratusConfig,
    command: AppCommand,
    events: &EventSender,
) {
    let mut command = command;
    while !command.is_none() {
        debug!("executing {}", command.label());
        command = execute_step(terminal, app, config, command, events).await;
    }
}

async fn execute_step(
    terminal: &mut TuiTerminal,
    app: &mut App,
    config: &StratusConfig,
    command: AppCommand,
    events: &EventSender,
) -> AppCommand {
    match command {
        AppCommand::None => {}
        AppCommand::LoadPage {
            generation,
            handler,
            request,
            options,
        } => {
            let tx = events.clone();
            tokio::spawn(async move {
                let result = handler.list(&options).await;
                let _ = tx.send(AppEvent::PageLoaded {
                    generation,
                    epoch: request.epoch,
                    result,
                });
            });
        }
        AppCommand::Describe {
            generation,
            epoch,
            handler,
            resource_id,
        } => {
            let tx = events.clone();
            tokio::spawn(async move {
                let result = handler.describe(&resource_id).await;
                let _ = tx.send(AppEvent::DetailLoaded {
                    generation,
                    epoch,
                    result,
                });
            });
        }
        AppCommand::ExecuteAction {
            generation,
            handler,
            action,
            resource_id,
        } => {
            let tx = events.clone();
            tokio::spawn(async move {
                let outcome = handler.execute_action(&action, &resource_id).await;
                let _ = tx.send(AppEvent::ActionFinished {
                    generation,
                    action,
                    outcome,
                });
            });
        }
        AppCommand::Update {
            generation,
            handler,
            resource_id,
            fields,
        } => {
            let tx = events.clone();
            tokio::spawn(async move {
                let result = handler.update(&resource_id, fields).await;
                let _ = tx.send(AppEvent::MutationFinished {
                    generation,
                    mutation: Mutation::Update,
                    resource_id,
                    result,
                });
            });
        }
        AppCommand::Delete {
            generation,
            handler,
            resource_id,
        } => {
            let tx = events.clone();
            tokio::spawn(async move {
                let result = handler.delete(&resource_id).await;
                let _ = tx.send(AppEvent::MutationFinished {
                    generation,
                    mutation: Mutation::Delete,
                    resource_id,
                    result,
                });
            });
        }
        AppCommand::RefreshResource {
            generation,
            handler,
            resource_id,
        } => {
            let tx = events.clone();
            tokio::spawn(async move {
                let result = handler.get(&resource_id).await;
                let _ = tx.send(AppEvent::ResourceRefreshed {
                    generation,
                    resource_id,
                    result,
                });
            });
        }
        AppCommand::Export {
            handler,
            resource_id,
            format,
        } => {
            let tx = events.clone();
            let dir = config.export_dir.clone();
            tokio::spawn(async move {
                let result = match handler.describe(&resource_id).await {
                    Ok(detail) => export::write_export(
                        &dir,
                        handler.resource_type(),
                        &resource_id,
                        &detail,
                        format,
                    )
                    .map_err(|error| compact_error(&error)),
                    Err(error) => Err(error.to_string()),
                };
                let _ = tx.send(AppEvent::Exported(result));
            });
        }
        AppCommand::RunExternal(external) => {
            info!("handing terminal to {}", external.program);
            match run_external(terminal, &external).await {
                Ok(status) if status.success() => {
                    app.set_status(format!("{} finished", external.program));
                }
                Ok(status) => {
                    app.set_status(format!("{} exited with {status}", external.program));
                }
                Err(error) => {
                    warn!("external command failed: {error:#}");
                    app.set_status(compact_error(&error));
                }
            }
        }
        AppCommand::Edit {
            generation,
            handler,
            resource_id,
        } => {
            let tx = events.clone();
            tokio::spawn(async move {
                let result = handler.describe(&resource_id).await;
                let _ = tx.send(AppEvent::EditLoaded {
                    generation,
                    resource_id,
                    result,
                });
            });
        }
        AppCommand::OpenEditor {
            handler,
            resource_id,
            original,
        } => {
            match edit_in_editor(terminal, &resource_id, &original).await {
                Ok(edited) => return app.review_edit(handler, resource_id, &original, edited),
                Err(error) => {
                    warn!("edit of {resource_id} aborted: {error:#}");
                    app.set_status(format!("Edit aborted: {}", compact_error(&error)));
                }
            }
        }
        AppCommand::SwitchScope { scope, landing } => match build_scope_registry(config, &scope) {
            Ok(registry) => return app.switch_scope(scope, registry, landing),
            Err(error) => {
                warn!("scope switch to {scope} failed: {error:#}");
                app.set_status(compact_error(&error));
            }
        },
    }
    AppCommand::None
}

async fn run_external(terminal: &mut TuiTerminal, external: &ExternalCommand) -> Result<ExitStatus> {
    suspend_terminal_for_subprocess(terminal)?;

    let run_result = TokioCommand::new(&external.program)
        .args(&external.args)
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()
        .await
        .with_context(|| format!("failed to run {}", external.program));
    let restore_result = resume_terminal_after_subprocess(terminal);

    match (run_result, restore_result) {
        (Err(run_error), Err(restore_error)) => Err(anyhow::anyhow!(
            "{run_error:#}\nterminal resume error: {restore_error:#}"
        )),
        (Err(error), _) => Err(error),
        (_, Err(error)) => Err(error),
        (Ok(status), Ok(())) => Ok(status),
    }
}

/// Opens the describe map in `$VISUAL`/`$EDITOR` as JSON and returns the
/// edited map. The temp file is removed whether or not the edit succeeds.
async fn edit_in_editor(
    terminal: &mut TuiTerminal,
    resource_id: &str,
    original: &DetailMap,
) -> Result<DetailMap> {
    let path = edit_file_path(resource_id);
    let body = serde_json::to_string_pretty(original).context("failed to encode resource")?;
    fs::write(&path, body).with_context(|| format!("failed to write {}", path.display()))?;

    let editor = std::env::var("VISUAL")
        .or_else(|_| std::env::var("EDITOR"))
        .unwrap_or_else(|_| "vi".to_string());
    let mut words = editor.split_whitespace();
    let program = words.next().unwrap_or("vi").to_string();
    let mut args = words.map(str::to_string).collect::<Vec<_>>();
    args.push(path.display().to_string());
    let external = ExternalCommand {
        program,
        args,
        prompt: String::new(),
    };

    let edited = match run_external(terminal, &external).await {
        Ok(status) if status.success() => fs::read_to_string(&path)
            .with_context(|| format!("failed to read back {}", path.display())),
        Ok(status) => Err(anyhow::anyhow!("{} exited with {status}", external.program)),
        Err(error) => Err(error),
    };
    if let Err(error) = fs::remove_file(&path) {
        debug!("could not remove {}: {error}", path.display());
    }

    serde_json::from_str::<DetailMap>(&edited?).context("edited file is not a JSON object")
}

fn edit_file_path(resource_id: &str) -> PathBuf {
    let slug = resource_id
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .take(32)
        .collect::<String>();
    std::env::temp_dir().join(format!(
        "stratus-edit-{}-{slug}-{}.json",
        std::process::id(),
        chrono::Utc::now().timestamp_millis()
    ))
}

fn suspend_terminal_for_subprocess(terminal: &mut TuiTerminal) -> Result<()> {
    disable_raw_mode().context("failed to disable raw mode for subprocess")?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)
        .context("failed to leave alternate screen for subprocess")?;
    terminal
        .show_cursor()
        .context("failed to show cursor for subprocess")?;
    Ok(())
}

fn resume_terminal_after_subprocess(terminal: &mut TuiTerminal) -> Result<()> {
    enable_raw_mode().context("failed to re-enable raw mode after subprocess")?;
    execute!(terminal.backend_mut(), EnterAlternateScreen)
        .context("failed to re-enter alternate screen after subprocess")?;
    terminal
        .clear()
        .context("failed to clear terminal after subprocess")?;
    Ok(())
}

fn compact_error(error: &anyhow::Error) -> String {
    let mut out = Vec::new();
    for (index, cause) in error.chain().enumerate() {
        if index == 0 {
            out.push(cause.to_string());
        } else if index <= 2 {
            out.push(format!("caused by: {cause}"));
        } else {
            break;
        }
    }

    out.join(": ")
}
