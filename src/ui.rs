use chrono::{DateTime, Utc};
use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph, Wrap},
};

use crate::app::{App, Focus, InputMode, MAX_TOKENS_CHOICES, Popup, SettingsDraft, SettingsField};
use crate::config::Theme;
use crate::markdown;
use crate::session::Role;

/// Chrome colors for the two themes. Code highlighting keeps its own
/// fixed colors; the palette only styles the surrounding UI.
pub struct Palette {
    pub accent: Color,
    pub border: Color,
    pub text: Color,
    pub dim: Color,
    pub user: Color,
    pub assistant: Color,
    pub header_bg: Color,
    pub highlight_bg: Color,
}

impl Palette {
    pub fn new(theme: Theme) -> Self {
        match theme {
            Theme::Dark => Self {
                accent: Color::Cyan,
                border: Color::DarkGray,
                text: Color::White,
                dim: Color::DarkGray,
                user: Color::Cyan,
                assistant: Color::Yellow,
                header_bg: Color::DarkGray,
                highlight_bg: Color::Blue,
            },
            Theme::Light => Self {
                accent: Color::Blue,
                border: Color::Gray,
                text: Color::Black,
                dim: Color::Gray,
                user: Color::Blue,
                assistant: Color::Magenta,
                header_bg: Color::Gray,
                highlight_bg: Color::Blue,
            },
        }
    }
}

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();
    let palette = Palette::new(app.theme);

    // Main layout: header, body, footer
    let [header_area, body_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, frame, header_area, &palette);

    let [sidebar_area, main_area] =
        Layout::horizontal([Constraint::Length(30), Constraint::Min(0)]).areas(body_area);

    let [chat_area, input_area] =
        Layout::vertical([Constraint::Min(0), Constraint::Length(3)]).areas(main_area);

    // Store areas for mouse hit-testing
    app.sidebar_area = Some(sidebar_area);
    app.chat_area = Some(chat_area);

    render_sidebar(app, frame, sidebar_area, &palette);
    render_transcript(app, frame, chat_area, &palette);
    render_input(app, frame, input_area, &palette);
    render_footer(app, frame, footer_area, &palette);

    match &app.popup {
        Some(Popup::Settings(draft)) => render_settings_dialog(draft, frame, area, &palette),
        Some(Popup::ConfirmClear) => render_confirm_dialog(
            frame,
            area,
            " Clear Chat ",
            "Clear the current conversation?",
            &palette,
        ),
        Some(Popup::ConfirmDelete { chat_id }) => {
            let title = app
                .store
                .chats()
                .iter()
                .find(|c| c.id == *chat_id)
                .map(|c| c.title.clone())
                .unwrap_or_default();
            render_confirm_dialog(
                frame,
                area,
                " Delete Chat ",
                &format!("Delete \"{}\"?", title),
                &palette,
            );
        }
        None => {}
    }
}

fn render_header(app: &App, frame: &mut Frame, area: Rect, palette: &Palette) {
    let title = Line::from(vec![
        Span::styled(
            " Kanish Mini Chat ",
            Style::default().fg(palette.accent).bold(),
        ),
        Span::styled(
            format!(" {} ", app.settings.model),
            Style::default().fg(palette.text),
        ),
        Span::raw(" "),
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(palette.text),
        ),
    ]);

    let header = Paragraph::new(title).style(Style::default().bg(palette.header_bg));
    frame.render_widget(header, area);
}

/// "just now", "5m ago", "3h ago", "2d ago".
fn format_relative(created_at: DateTime<Utc>) -> String {
    let elapsed = Utc::now().signed_duration_since(created_at);
    let minutes = elapsed.num_minutes();
    if minutes < 1 {
        "just now".to_string()
    } else if minutes < 60 {
        format!("{}m ago", minutes)
    } else if minutes < 60 * 24 {
        format!("{}h ago", elapsed.num_hours())
    } else {
        format!("{}d ago", elapsed.num_days())
    }
}

fn render_sidebar(app: &mut App, frame: &mut Frame, area: Rect, palette: &Palette) {
    let focused = app.focus == Focus::Sidebar;
    let border_color = if focused { palette.accent } else { palette.border };

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(format!(" Chats ({}) ", app.store.chats().len()));

    if app.store.chats().is_empty() {
        let placeholder = Paragraph::new("No chats yet.\nPress 'n' to start one.")
            .style(Style::default().fg(palette.dim))
            .block(block);
        frame.render_widget(placeholder, area);
        return;
    }

    let active_id = app.store.active_id().map(str::to_string);
    let items: Vec<ListItem> = app
        .store
        .chats()
        .iter()
        .map(|chat| {
            let title_style = if Some(&chat.id) == active_id.as_ref() {
                Style::default().fg(palette.accent).bold()
            } else {
                Style::default().fg(palette.text)
            };
            ListItem::new(vec![
                Line::from(Span::styled(chat.title.clone(), title_style)),
                Line::from(Span::styled(
                    format_relative(chat.created_at),
                    Style::default().fg(palette.dim),
                )),
            ])
        })
        .collect();

    let list = List::new(items)
        .block(block)
        .highlight_style(
            Style::default()
                .bg(palette.highlight_bg)
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("> ");

    frame.render_stateful_widget(list, area, &mut app.sidebar_state);
}

fn render_transcript(app: &mut App, frame: &mut Frame, area: Rect, palette: &Palette) {
    let focused = app.focus == Focus::Messages;
    let border_color = if focused { palette.accent } else { palette.border };

    let title = app
        .store
        .active_chat()
        .map(|c| format!(" {} ", c.title))
        .unwrap_or_else(|| " Kanish Mini ".to_string());

    let mut block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(title);

    if app.copied_ticks > 0 {
        block = block.title_bottom(
            Line::from(Span::styled(
                " Copied ",
                Style::default().fg(Color::Green).bold(),
            ))
            .right_aligned(),
        );
    }

    let messages = app.store.current_messages();

    let text = if messages.is_empty() && !app.loading {
        Text::from(vec![
            Line::default(),
            Line::from(Span::styled(
                "Welcome to Kanish Mini",
                Style::default().fg(palette.text).bold(),
            )),
            Line::default(),
            Line::from(Span::styled(
                "Advanced AI chatbot with markdown support, code",
                Style::default().fg(palette.dim),
            )),
            Line::from(Span::styled(
                "highlighting, and more.",
                Style::default().fg(palette.dim),
            )),
            Line::default(),
            Line::from(Span::styled(
                "Type a message and press Enter to send.",
                Style::default().fg(palette.dim),
            )),
        ])
    } else {
        let mut lines: Vec<Line> = Vec::new();

        for msg in messages {
            match msg.role {
                Role::User => {
                    lines.push(Line::from(Span::styled(
                        "You:",
                        Style::default()
                            .fg(palette.user)
                            .add_modifier(Modifier::BOLD),
                    )));
                    for line in msg.content.lines() {
                        lines.push(Line::from(line.to_string()));
                    }
                    lines.push(Line::default());
                }
                Role::Assistant => {
                    lines.push(Line::from(Span::styled(
                        "AI:",
                        Style::default()
                            .fg(palette.assistant)
                            .add_modifier(Modifier::BOLD),
                    )));
                    if msg.content.is_empty() && app.is_streaming_here() {
                        // Animated ellipsis: cycles through ".", "..", "..."
                        let dots = ".".repeat((app.animation_frame as usize) + 1);
                        lines.push(Line::from(Span::styled(
                            format!("Thinking{}", dots),
                            Style::default()
                                .fg(palette.dim)
                                .add_modifier(Modifier::ITALIC),
                        )));
                    } else {
                        lines.extend(markdown::render_markdown(&msg.content).lines);
                    }
                    lines.push(Line::default());
                }
            }
        }

        Text::from(lines)
    };

    // Track dimensions and (approximate) wrapped height so scrolling
    // and stick-to-bottom work. Updated every frame.
    let inner_width = area.width.saturating_sub(2).max(1);
    let inner_height = area.height.saturating_sub(2);
    let total_lines: u16 = text
        .lines
        .iter()
        .map(|line| {
            let width = line.width() as u16;
            if width == 0 { 1 } else { width.div_ceil(inner_width) }
        })
        .sum();

    app.chat_height = inner_height;
    app.chat_total_lines = total_lines;
    if app.follow_stream {
        app.chat_scroll = total_lines.saturating_sub(inner_height);
    }

    let transcript = Paragraph::new(text)
        .block(block)
        .wrap(Wrap { trim: false })
        .scroll((app.chat_scroll, 0));

    frame.render_widget(transcript, area);
}

fn render_input(app: &App, frame: &mut Frame, area: Rect, palette: &Palette) {
    let editing = app.input_mode == InputMode::Editing;
    let border_color = if editing || app.focus == Focus::Input {
        Color::Yellow
    } else {
        palette.border
    };

    let title = if app.loading {
        " Waiting for reply (Esc to cancel) "
    } else {
        " Message (Enter to send) "
    };

    let input_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(title);

    // Calculate visible portion of input with horizontal scrolling
    // Inner width = total width - 2 (for borders)
    let inner_width = area.width.saturating_sub(2) as usize;
    let cursor_pos = app.cursor;

    let scroll_offset = if inner_width == 0 {
        0
    } else if cursor_pos >= inner_width {
        cursor_pos - inner_width + 1
    } else {
        0
    };

    let visible_text: String = app
        .input
        .chars()
        .skip(scroll_offset)
        .take(inner_width)
        .collect();

    let input = if visible_text.is_empty() && !editing {
        Paragraph::new("Message Kanish Mini...")
            .style(Style::default().fg(palette.dim))
            .block(input_block)
    } else {
        Paragraph::new(visible_text)
            .style(Style::default().fg(palette.user))
            .block(input_block)
    };

    frame.render_widget(input, area);

    // Show cursor when editing
    if editing {
        let cursor_x = (cursor_pos - scroll_offset) as u16;
        frame.set_cursor_position((area.x + cursor_x + 1, area.y + 1));
    }
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect, palette: &Palette) {
    let mode_style = match app.input_mode {
        InputMode::Normal => Style::default().bg(Color::Blue).fg(Color::White),
        InputMode::Editing => Style::default().bg(Color::Yellow).fg(Color::Black),
    };

    let mode_text = match app.input_mode {
        InputMode::Normal => " CHAT ",
        InputMode::Editing => " EDIT ",
    };

    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().bg(Color::Black).fg(Color::White);

    let mut hints: Vec<Span> = Vec::new();
    match app.input_mode {
        InputMode::Editing => {
            hints.extend(vec![
                Span::styled(" Enter ", key_style),
                Span::styled(" send ", label_style),
                Span::styled(" Esc ", key_style),
                Span::styled(if app.loading { " cancel " } else { " done " }, label_style),
            ]);
        }
        InputMode::Normal => {
            match app.focus {
                Focus::Sidebar => {
                    hints.extend(vec![
                        Span::styled(" j/k ", key_style),
                        Span::styled(" nav ", label_style),
                        Span::styled(" Enter ", key_style),
                        Span::styled(" open ", label_style),
                        Span::styled(" d ", key_style),
                        Span::styled(" delete ", label_style),
                    ]);
                }
                Focus::Messages => {
                    hints.extend(vec![
                        Span::styled(" j/k ", key_style),
                        Span::styled(" scroll ", label_style),
                        Span::styled(" c ", key_style),
                        Span::styled(" copy ", label_style),
                        Span::styled(" x ", key_style),
                        Span::styled(" clear ", label_style),
                    ]);
                }
                Focus::Input => {
                    hints.extend(vec![
                        Span::styled(" i ", key_style),
                        Span::styled(" type ", label_style),
                    ]);
                }
            }
            hints.extend(vec![
                Span::styled(" Tab ", key_style),
                Span::styled(" focus ", label_style),
                Span::styled(" n ", key_style),
                Span::styled(" new ", label_style),
                Span::styled(" s ", key_style),
                Span::styled(" settings ", label_style),
                Span::styled(" t ", key_style),
                Span::styled(" theme ", label_style),
                Span::styled(" q ", key_style),
                Span::styled(" quit ", label_style),
            ]);
        }
    }

    let mut spans = vec![Span::styled(mode_text, mode_style), Span::raw(" ")];
    spans.extend(hints);

    let footer = Paragraph::new(Line::from(spans)).style(Style::default().fg(palette.text));
    frame.render_widget(footer, area);
}

fn centered_popup(area: Rect, width: u16, height: u16) -> Rect {
    let popup_width = width.min(area.width.saturating_sub(4));
    let popup_height = height.min(area.height.saturating_sub(4));
    let popup_x = (area.width.saturating_sub(popup_width)) / 2;
    let popup_y = (area.height.saturating_sub(popup_height)) / 2;
    Rect::new(popup_x, popup_y, popup_width, popup_height)
}

fn render_settings_dialog(draft: &SettingsDraft, frame: &mut Frame, area: Rect, palette: &Palette) {
    let popup_area = centered_popup(area, 48, 9);

    // Clear the area behind the popup
    frame.render_widget(Clear, popup_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(palette.accent))
        .title(" Settings (Enter to save, Esc to cancel) ");

    let inner = block.inner(popup_area);
    frame.render_widget(block, popup_area);

    let field_line = |selected: bool, label: &str, value: String| {
        let marker = if selected { "> " } else { "  " };
        let style = if selected {
            Style::default().fg(palette.accent).bold()
        } else {
            Style::default().fg(palette.text)
        };
        Line::from(vec![
            Span::styled(marker.to_string(), style),
            Span::styled(format!("{:<13}", label), style),
            Span::styled(format!("< {} >", value), style),
        ])
    };

    let model = draft
        .models
        .get(draft.model_idx)
        .cloned()
        .unwrap_or_default();

    let lines = vec![
        Line::default(),
        field_line(draft.field == SettingsField::Model, "Model", model),
        Line::default(),
        field_line(
            draft.field == SettingsField::Temperature,
            "Temperature",
            format!("{:.2}", draft.temperature),
        ),
        Line::default(),
        field_line(
            draft.field == SettingsField::MaxTokens,
            "Max tokens",
            MAX_TOKENS_CHOICES[draft.max_tokens_idx].to_string(),
        ),
        Line::default(),
        Line::from(Span::styled(
            " j/k field   h/l adjust",
            Style::default().fg(palette.dim),
        )),
    ];

    frame.render_widget(Paragraph::new(Text::from(lines)), inner);
}

fn render_confirm_dialog(
    frame: &mut Frame,
    area: Rect,
    title: &str,
    question: &str,
    palette: &Palette,
) {
    let popup_area = centered_popup(area, 44, 5);

    frame.render_widget(Clear, popup_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow))
        .title(title.to_string());

    let inner = block.inner(popup_area);
    frame.render_widget(block, popup_area);

    let lines = vec![
        Line::from(Span::styled(
            question.to_string(),
            Style::default().fg(palette.text),
        )),
        Line::default(),
        Line::from(Span::styled(
            " y confirm   n cancel",
            Style::default().fg(palette.dim),
        )),
    ];

    frame.render_widget(Paragraph::new(Text::from(lines)), inner);
}
