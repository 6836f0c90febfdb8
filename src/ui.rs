use ratatui::Frame;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{
    Block, Borders, Cell, Clear, List, ListItem, ListState, Paragraph, Row, Table, TableState, Wrap,
};

use crate::app::{App, FocusPane, InputMode, ListView, Overlay, Screen};
use crate::pipeline::PageView;
use crate::tagfilter::{TagPicker, TagStage};

const BG: Color = Color::Rgb(12, 18, 30);
const PANEL: Color = Color::Rgb(20, 30, 48);
const ACCENT: Color = Color::Rgb(251, 146, 60);
const MUTED: Color = Color::Rgb(140, 156, 178);
const WARN: Color = Color::Rgb(251, 191, 36);
const ERROR: Color = Color::Rgb(248, 113, 113);
const KEY: Color = Color::Rgb(103, 232, 249);
const STRING: Color = Color::Rgb(147, 197, 253);
const NUMBER: Color = Color::Rgb(253, 186, 116);
const PL_A: Color = Color::Rgb(154, 52, 18);
const PL_B: Color = Color::Rgb(30, 64, 175);
const PL_C: Color = Color::Rgb(55, 48, 163);
const SELECTED_ROW: Color = Color::Rgb(36, 48, 72);

pub fn render(frame: &mut Frame, app: &App) {
    let root = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Min(6),
            Constraint::Length(1),
        ])
        .split(frame.area());

    render_header(frame, root[0], app);
    match app.screen() {
        Screen::Home => render_home(frame, root[1], app),
        Screen::ResourceList(list) => render_list(frame, root[1], list),
    }
    render_footer(frame, root[2], app);

    match app.overlay() {
        Some(Overlay::TagFilter(picker)) => {
            if let Some(list) = app.active_list() {
                render_tag_picker(frame, picker, list.view());
            }
        }
        Some(Overlay::Confirm(pending)) => render_confirm(frame, pending.prompt()),
        Some(Overlay::Info {
            title,
            text,
            scroll,
        }) => render_info(frame, title, text, *scroll),
        Some(Overlay::Help { scroll }) => render_help(frame, app, *scroll),
        Some(Overlay::Bookmarks { cursor }) => render_bookmarks(frame, app, *cursor),
        _ => {}
    }
}

fn render_header(frame: &mut Frame, area: Rect, app: &App) {
    let mut spans = Vec::new();
    push_powerline_segment(&mut spans, " ☁ stratus ", Color::White, PL_A, PL_B);
    push_powerline_segment(
        &mut spans,
        format!(" {} ", app.scope()),
        Color::White,
        PL_B,
        PL_C,
    );
    let trail = match app.active_list() {
        Some(list) => {
            let icon = list.handler().resource_icon();
            format!(" {icon} {} ", list.breadcrumb().join(" › "))
        }
        None => " home ".to_string(),
    };
    let trail_width = area.width.saturating_sub(spans_width(&spans) as u16 + 2) as usize;
    push_powerline_segment(
        &mut spans,
        compact_text(&trail, trail_width.max(8)),
        Color::White,
        PL_C,
        BG,
    );
    frame.render_widget(
        Paragraph::new(Line::from(spans)).style(Style::default().bg(BG)),
        area,
    );
}

fn render_home(frame: &mut Frame, area: Rect, app: &App) {
    let items = app
        .registry()
        .all()
        .iter()
        .map(|handler| {
            ListItem::new(Line::from(vec![
                Span::styled(
                    format!(" {} ", handler.resource_icon()),
                    Style::default().fg(ACCENT),
                ),
                Span::styled(
                    format!("{:<22}", handler.resource_name()),
                    Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
                ),
                Span::styled(
                    format!(":{:<12}", handler.shortcut_key()),
                    Style::default().fg(KEY),
                ),
                Span::styled(handler.resource_type().to_string(), Style::default().fg(MUTED)),
            ]))
        })
        .collect::<Vec<_>>();
    let list = List::new(items)
        .block(panel_block(
            format!("Resources ({})", app.registry().len()),
            true,
        ))
        .highlight_style(
            Style::default()
                .bg(SELECTED_ROW)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("▶ ");
    let mut state = ListState::default();
    if !app.registry().is_empty() {
        state.select(Some(app.home_cursor()));
    }
    frame.render_stateful_widget(list, area, &mut state);
}

fn render_list(frame: &mut Frame, area: Rect, list: &ListView) {
    let Some(detail) = list.detail() else {
        render_table(frame, area, list, true);
        return;
    };
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
        .split(area);
    render_table(frame, chunks[0], list, list.focus() == FocusPane::Table);

    let focused = list.focus() == FocusPane::Detail;
    let text = match detail.text() {
        Some(text) => highlight_json_text(text),
        None => Text::from(Line::styled("loading…", Style::default().fg(MUTED))),
    };
    let identity_width = chunks[1].width.saturating_sub(4) as usize;
    let block = panel_block(format!("Describe: {}", detail.title()), focused).title_bottom(
        Line::styled(
            format!(" {} ", compact_text(detail.identity(), identity_width.max(8))),
            Style::default().fg(MUTED),
        ),
    );
    let paragraph = Paragraph::new(text)
        .block(block)
        .style(Style::default().fg(Color::White))
        .wrap(Wrap { trim: false })
        .scroll((detail.scroll(), 0));
    frame.render_widget(paragraph, chunks[1]);
}

fn render_table(frame: &mut Frame, area: Rect, list: &ListView, focused: bool) {
    let view = list.view();
    let title = table_title(list);

    if let Some(error) = list.last_error()
        && view.loaded_len() == 0
    {
        let panel = Paragraph::new(Text::from(error.to_string()))
            .wrap(Wrap { trim: false })
            .block(
                Block::default()
                    .title(title)
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(ERROR))
                    .style(Style::default().bg(PANEL)),
            )
            .style(Style::default().fg(ERROR));
        frame.render_widget(panel, area);
        return;
    }

    let headers = header_labels(view);
    let header_row = Row::new(headers.into_iter().map(|header| {
        Cell::from(header).style(Style::default().add_modifier(Modifier::BOLD))
    }))
    .height(1)
    .style(Style::default().fg(ACCENT));

    let rows = view.visible_rows().map(|row| {
        Row::new(
            row.iter()
                .map(|cell| Cell::from(cell.clone()).style(Style::default().fg(Color::White))),
        )
    });

    let table = Table::new(rows, column_constraints(view))
        .header(header_row)
        .block(panel_block(title, focused))
        .column_spacing(1)
        .row_highlight_style(
            Style::default()
                .bg(SELECTED_ROW)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("▶ ");

    let mut state = TableState::default();
    if view.visible_len() > 0 {
        state.select(Some(view.cursor()));
    }
    frame.render_stateful_widget(table, area, &mut state);
}

fn table_title(list: &ListView) -> String {
    let view = list.view();
    let mut title = format!(
        "{} ({}/{})",
        list.handler().resource_name(),
        view.visible_len(),
        view.loaded_len()
    );
    if !list.filter().is_empty() {
        title.push_str(&format!(" filter:{}", list.filter()));
    }
    if !view.query().is_empty() {
        title.push_str(&format!(" /{}", view.query()));
    }
    for (key, value) in view.tag_filters() {
        title.push_str(&format!(" #{key}~{value}"));
    }
    if list.paginator().is_loading() {
        title.push_str(" ⟳");
    }
    title
}

fn header_labels(view: &PageView) -> Vec<String> {
    let sort = view.sort();
    view.columns()
        .iter()
        .enumerate()
        .map(|(index, column)| match sort.column {
            Some(active) if active == index => {
                let arrow = if sort.ascending { "▲" } else { "▼" };
                format!("{}{arrow}", column.title)
            }
            _ => column.title.to_string(),
        })
        .collect()
}

fn column_constraints(view: &PageView) -> Vec<Constraint> {
    if view.columns().is_empty() {
        return vec![Constraint::Percentage(100)];
    }
    view.columns()
        .iter()
        .map(|column| Constraint::Min(column.width))
        .collect()
}

fn render_footer(frame: &mut Frame, area: Rect, app: &App) {
    let mut spans = Vec::new();
    match app.mode() {
        InputMode::Command | InputMode::Search => {
            let (label, prompt) = match app.overlay() {
                Some(Overlay::Command { input, .. }) => (" cmd ", format!(":{input}")),
                Some(Overlay::Search { input, .. }) => (" flt ", format!("/{input}")),
                _ => (" ", String::new()),
            };
            push_powerline_segment(&mut spans, label, Color::Black, ACCENT, PL_B);
            push_powerline_segment(&mut spans, format!(" {prompt}▏"), Color::White, PL_B, BG);
            let suggestions = app.command_suggestions();
            if !suggestions.is_empty() {
                spans.push(Span::raw(" "));
                let budget = (area.width as usize).saturating_sub(spans_width(&spans));
                spans.push(Span::styled(
                    compact_text(&suggestions.join(" "), budget.max(1)),
                    Style::default().fg(MUTED),
                ));
            }
        }
        InputMode::TagInput => {
            let buffer = match app.overlay() {
                Some(Overlay::TagFilter(picker)) => match picker.stage() {
                    TagStage::Custom { key, buffer } => format!("{key}~{buffer}"),
                    _ => String::new(),
                },
                _ => String::new(),
            };
            push_powerline_segment(&mut spans, " tag ", Color::Black, WARN, PL_B);
            push_powerline_segment(&mut spans, format!(" {buffer}▏"), Color::White, PL_B, BG);
        }
        InputMode::Confirm => {
            push_powerline_segment(
                &mut spans,
                format!(" {} ", app.status()),
                Color::Black,
                WARN,
                BG,
            );
        }
        InputMode::Normal | InputMode::TagPicker | InputMode::Overlay | InputMode::Bookmarks => {
            let status = app.status();
            let status_bg = if looks_like_failure(status) { ERROR } else { PL_B };
            push_powerline_segment(&mut spans, " nrm ", Color::White, PL_A, status_bg);
            let status_width = area.width.saturating_sub(24).min(120) as usize;
            push_powerline_segment(
                &mut spans,
                format!(" {} ", compact_text(status, status_width.max(24))),
                Color::White,
                status_bg,
                BG,
            );
            let right = footer_glance_spans(app);
            let right_width = spans_width(&right) as u16;
            if right_width > 0 && right_width + 28 < area.width {
                let chunks = Layout::default()
                    .direction(Direction::Horizontal)
                    .constraints([Constraint::Min(1), Constraint::Length(right_width)])
                    .split(area);
                frame.render_widget(
                    Paragraph::new(Line::from(spans)).style(Style::default().bg(BG)),
                    chunks[0],
                );
                frame.render_widget(
                    Paragraph::new(Line::from(right))
                        .style(Style::default().bg(BG))
                        .alignment(Alignment::Right),
                    chunks[1],
                );
                return;
            }
        }
    }
    frame.render_widget(
        Paragraph::new(Line::from(spans)).style(Style::default().bg(BG)),
        area,
    );
}

fn footer_glance_spans(app: &App) -> Vec<Span<'static>> {
    let mut spans = Vec::new();
    for action in app.active_actions() {
        spans.push(Span::styled(
            format!("{}", action.key),
            Style::default().fg(KEY).add_modifier(Modifier::BOLD),
        ));
        let style = if action.dangerous {
            Style::default().fg(WARN)
        } else {
            Style::default().fg(MUTED)
        };
        spans.push(Span::styled(format!(" {}  ", action.name), style));
    }
    if let Some(summary) = app.page_summary() {
        spans.push(Span::styled(
            format!(" {summary} "),
            Style::default().fg(Color::White).bg(PL_C),
        ));
    } else {
        spans.push(Span::styled(" ? help ", Style::default().fg(MUTED)));
    }
    spans
}

fn looks_like_failure(status: &str) -> bool {
    let status = status.to_ascii_lowercase();
    ["failed", "error", "denied", "unauthorized", "not found", "timed out"]
        .iter()
        .any(|needle| status.contains(needle))
}

fn render_tag_picker(frame: &mut Frame, picker: &TagPicker, view: &PageView) {
    let area = centered_rect(50, 60, frame.area());
    frame.render_widget(Clear, area);

    let (title, entries): (String, Vec<String>) = match picker.stage() {
        TagStage::Keys => (
            "Tag key  (Enter values, x remove, c clear all)".to_string(),
            picker
                .keys()
                .iter()
                .map(|key| match view.tag_filters().get(key) {
                    Some(active) => format!("{key}  ✓ ~{active}"),
                    None => key.clone(),
                })
                .collect(),
        ),
        TagStage::Values { key, values } => (
            format!("{key} = ?  (Enter apply, / custom, Esc back)"),
            values.clone(),
        ),
        TagStage::Custom { key, buffer } => (
            format!("{key} contains…  (Enter apply, Esc back)"),
            vec![format!("{buffer}▏")],
        ),
    };

    let items = entries.into_iter().map(ListItem::new).collect::<Vec<_>>();
    let list = List::new(items)
        .block(panel_block(title, true))
        .style(Style::default().fg(Color::White))
        .highlight_style(Style::default().bg(SELECTED_ROW).add_modifier(Modifier::BOLD))
        .highlight_symbol("▶ ");
    let mut state = ListState::default();
    if !picker.accepts_text() {
        state.select(Some(picker.cursor()));
    }
    frame.render_stateful_widget(list, area, &mut state);
}

fn render_confirm(frame: &mut Frame, prompt: &str) {
    let area = centered_rect(50, 20, frame.area());
    frame.render_widget(Clear, area);
    let lines = vec![
        Line::from(""),
        Line::styled(
            prompt.to_string(),
            Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
        ),
        Line::from(""),
        Line::from(vec![
            Span::styled("y", Style::default().fg(KEY).add_modifier(Modifier::BOLD)),
            Span::styled(" confirm   ", Style::default().fg(MUTED)),
            Span::styled("n", Style::default().fg(KEY).add_modifier(Modifier::BOLD)),
            Span::styled(" cancel", Style::default().fg(MUTED)),
        ]),
    ];
    let modal = Paragraph::new(lines)
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true })
        .block(
            Block::default()
                .title("Confirm")
                .borders(Borders::ALL)
                .border_style(Style::default().fg(WARN))
                .style(Style::default().bg(PANEL)),
        );
    frame.render_widget(modal, area);
}

fn render_info(frame: &mut Frame, title: &str, text: &str, scroll: u16) {
    let area = centered_rect(80, 75, frame.area());
    frame.render_widget(Clear, area);
    let modal = Paragraph::new(highlight_json_text(text))
        .wrap(Wrap { trim: false })
        .scroll((scroll, 0))
        .block(panel_block(title.to_string(), true))
        .style(Style::default().fg(Color::White));
    frame.render_widget(modal, area);
}

fn render_help(frame: &mut Frame, app: &App, scroll: u16) {
    let area = centered_rect(72, 72, frame.area());
    frame.render_widget(Clear, area);

    let context = app
        .active_list()
        .map(|list| list.handler().resource_name().to_string())
        .unwrap_or_else(|| "home".to_string());
    let mut lines = vec![
        Line::from(format!("stratus help  scope:{}  view:{context}", app.scope())),
        Line::from(""),
    ];
    for (key, description) in app.help_entries() {
        lines.push(Line::from(vec![
            Span::styled(format!("{key:>14}  "), Style::default().fg(KEY)),
            Span::styled(description, Style::default().fg(Color::White)),
        ]));
    }

    let modal = Paragraph::new(lines)
        .wrap(Wrap { trim: false })
        .scroll((scroll, 0))
        .block(panel_block("Help".to_string(), true));
    frame.render_widget(modal, area);
}

fn render_bookmarks(frame: &mut Frame, app: &App, cursor: usize) {
    let area = centered_rect(70, 60, frame.area());
    frame.render_widget(Clear, area);

    let bookmarks = app.bookmarks();
    let items = if bookmarks.is_empty() {
        vec![ListItem::new(Line::styled(
            "(no bookmarks) press m on a resource to add one",
            Style::default().fg(MUTED),
        ))]
    } else {
        bookmarks
            .iter()
            .map(|bookmark| {
                let mut spans = vec![
                    Span::styled(
                        format!("[{}] ", bookmark.resource_type),
                        Style::default().fg(KEY),
                    ),
                    Span::styled(
                        bookmark.name.clone(),
                        Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
                    ),
                    Span::styled(
                        format!("  {}@{}", bookmark.profile, bookmark.region),
                        Style::default().fg(MUTED),
                    ),
                ];
                if !bookmark.filter.is_empty() {
                    spans.push(Span::styled(
                        format!("  filter:{}", bookmark.filter),
                        Style::default().fg(WARN),
                    ));
                }
                ListItem::new(Line::from(spans))
            })
            .collect()
    };
    let list = List::new(items)
        .block(panel_block(
            format!("Bookmarks ({})  Enter jump, d delete, Esc close", bookmarks.len()),
            true,
        ))
        .highlight_style(Style::default().bg(SELECTED_ROW).add_modifier(Modifier::BOLD))
        .highlight_symbol("▶ ");
    let mut state = ListState::default();
    if !bookmarks.is_empty() {
        state.select(Some(cursor.min(bookmarks.len() - 1)));
    }
    frame.render_stateful_widget(list, area, &mut state);
}

fn panel_block(title: String, focused: bool) -> Block<'static> {
    Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(if focused {
            Style::default().fg(ACCENT)
        } else {
            Style::default().fg(MUTED)
        })
        .style(Style::default().bg(PANEL))
}

/// Colours pretty-printed JSON line by line. Anything that is not JSON is
/// shown as plain text.
fn highlight_json_text(input: &str) -> Text<'static> {
    Text::from(input.lines().map(highlight_json_line).collect::<Vec<_>>())
}

fn highlight_json_line(line: &str) -> Line<'static> {
    let indent_len = line.len() - line.trim_start().len();
    let (indent, rest) = line.split_at(indent_len);
    let mut spans = vec![Span::raw(indent.to_string())];

    let (body, trailing_comma) = match rest.strip_suffix(',') {
        Some(body) => (body, true),
        None => (rest, false),
    };
    match split_json_key(body) {
        Some((key, value)) => {
            spans.push(Span::styled(key.to_string(), Style::default().fg(KEY)));
            spans.push(Span::styled(": ", Style::default().fg(MUTED)));
            spans.push(Span::styled(value.to_string(), json_value_style(value)));
        }
        None => spans.push(Span::styled(body.to_string(), json_value_style(body))),
    }
    if trailing_comma {
        spans.push(Span::styled(",", Style::default().fg(MUTED)));
    }
    Line::from(spans)
}

/// Splits `"key": value` produced by the pretty printer.
fn split_json_key(body: &str) -> Option<(&str, &str)> {
    if !body.starts_with('"') {
        return None;
    }
    let mut escaped = false;
    for (index, ch) in body.char_indices().skip(1) {
        match ch {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            '"' => {
                let (key, rest) = body.split_at(index + 1);
                return rest.strip_prefix(": ").map(|value| (key, value));
            }
            _ => {}
        }
    }
    None
}

fn json_value_style(value: &str) -> Style {
    let color = if value.starts_with('"') {
        STRING
    } else if matches!(value, "true" | "false" | "null") {
        WARN
    } else if value.parse::<f64>().is_ok() {
        NUMBER
    } else if matches!(value, "{" | "}" | "[" | "]" | "{}" | "[]") {
        MUTED
    } else {
        Color::White
    };
    Style::default().fg(color)
}

fn push_powerline_segment(
    spans: &mut Vec<Span<'static>>,
    content: impl Into<String>,
    fg: Color,
    bg: Color,
    next_bg: Color,
) {
    spans.push(Span::styled(
        content.into(),
        Style::default().fg(fg).bg(bg).add_modifier(Modifier::BOLD),
    ));
    spans.push(Span::styled("", Style::default().fg(bg).bg(next_bg)));
}

fn spans_width(spans: &[Span<'_>]) -> usize {
    spans.iter().map(|span| span.content.chars().count()).sum()
}

fn compact_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    if max_chars <= 1 {
        return "…".to_string();
    }
    let mut out = value
        .chars()
        .take(max_chars.saturating_sub(1))
        .collect::<String>();
    out.push('…');
    out
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vertical[1])[1]
}

#[cfg(test)]
mod tests {
    use super::{compact_text, header_labels, render, split_json_key};
    use crate::app::App;
    use crate::input::Action;
    use crate::model::Scope;
    use crate::pipeline::PageView;
    use crate::registry::Registry;
    use crate::testing::{FakeHandler, columns, fake_resource};
    use ratatui::Terminal;
    use ratatui::backend::TestBackend;
    use std::sync::Arc;

    #[test]
    fn sort_arrow_marks_active_column() {
        let mut view = PageView::new(columns(&[("NAME", true), ("STATE", true)]));
        view.set_page(vec![fake_resource("a", &["a", "up"], &[])]);
        assert!(view.cycle_sort_column());
        assert_eq!(header_labels(&view), vec!["NAME▲", "STATE"]);
        view.toggle_sort_direction();
        assert_eq!(header_labels(&view), vec!["NAME▼", "STATE"]);
    }

    #[test]
    fn json_key_split_respects_escapes() {
        assert_eq!(
            split_json_key(r#""a\"b": 1"#),
            Some((r#""a\"b""#, "1"))
        );
        assert_eq!(split_json_key("\"plain string\""), None);
    }

    #[test]
    fn compact_text_ellipsizes() {
        assert_eq!(compact_text("abcdef", 4), "abc…");
        assert_eq!(compact_text("abc", 4), "abc");
    }

    #[test]
    fn home_screen_lists_registered_types() {
        let mut registry = Registry::new();
        registry
            .register(Arc::new(
                FakeHandler::new("fake:things", "Fake Things", "ft")
                    .with_page("", vec![fake_resource("one", &["one", "ok", ""], &[])], ""),
            ))
            .expect("register");
        let mut app = App::new(Scope::new("dev", "eu-west-1"), registry, 50);
        app.apply_action(Action::ToggleHelp);

        let mut terminal = Terminal::new(TestBackend::new(100, 30)).expect("terminal");
        terminal
            .draw(|frame| render(frame, &app))
            .expect("draw");
        let screen = terminal
            .backend()
            .buffer()
            .content()
            .iter()
            .map(|cell| cell.symbol())
            .collect::<String>();
        assert!(screen.contains("dev@eu-west-1"));
        assert!(screen.contains("Fake Things"));
        assert!(screen.contains("stratus help"));
    }

    #[test]
    fn empty_bookmarks_modal_explains_how_to_add() {
        let mut app = App::new(Scope::new("dev", "eu-west-1"), Registry::new(), 50);
        app.apply_action(Action::ShowBookmarks);

        let mut terminal = Terminal::new(TestBackend::new(100, 30)).expect("terminal");
        terminal
            .draw(|frame| render(frame, &app))
            .expect("draw");
        let screen = terminal
            .backend()
            .buffer()
            .content()
            .iter()
            .map(|cell| cell.symbol())
            .collect::<String>();
        assert!(screen.contains("Bookmarks (0)"));
        assert!(screen.contains("press m on a resource"));
    }
}
