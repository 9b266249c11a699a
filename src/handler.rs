use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseEvent, MouseEventKind};
use ratatui::layout::Rect;

use crate::app::{App, Focus, InputMode, MAX_TOKENS_CHOICES, Popup, SettingsDraft, SettingsField};
use crate::tui::AppEvent;

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

pub async fn handle_event(app: &mut App, event: AppEvent) -> Result<()> {
    match event {
        AppEvent::Key(key) => handle_key(app, key).await?,
        AppEvent::Mouse(mouse) => handle_mouse(app, mouse),
        AppEvent::Resize(_, _) => {}
        AppEvent::Tick => app.tick(),
        AppEvent::Stream(stream_event) => app.apply_stream_event(stream_event),
    }
    Ok(())
}

async fn handle_key(app: &mut App, key: KeyEvent) -> Result<()> {
    // Global keys that work in any mode
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.should_quit = true;
        return Ok(());
    }

    if app.popup.is_some() {
        handle_popup_key(app, key);
        return Ok(());
    }

    match app.input_mode {
        InputMode::Normal => handle_normal_key(app, key).await?,
        InputMode::Editing => handle_editing_key(app, key),
    }

    Ok(())
}

fn handle_popup_key(app: &mut App, key: KeyEvent) {
    let Some(popup) = app.popup.take() else {
        return;
    };

    match popup {
        Popup::Settings(mut draft) => match key.code {
            KeyCode::Esc => {}
            KeyCode::Enter => app.save_settings(&draft),
            KeyCode::Char('j') | KeyCode::Down | KeyCode::Tab => {
                draft.field = match draft.field {
                    SettingsField::Model => SettingsField::Temperature,
                    SettingsField::Temperature => SettingsField::MaxTokens,
                    SettingsField::MaxTokens => SettingsField::Model,
                };
                app.popup = Some(Popup::Settings(draft));
            }
            KeyCode::Char('k') | KeyCode::Up => {
                draft.field = match draft.field {
                    SettingsField::Model => SettingsField::MaxTokens,
                    SettingsField::Temperature => SettingsField::Model,
                    SettingsField::MaxTokens => SettingsField::Temperature,
                };
                app.popup = Some(Popup::Settings(draft));
            }
            KeyCode::Char('h') | KeyCode::Left => {
                adjust_settings_field(&mut draft, -1);
                app.popup = Some(Popup::Settings(draft));
            }
            KeyCode::Char('l') | KeyCode::Right => {
                adjust_settings_field(&mut draft, 1);
                app.popup = Some(Popup::Settings(draft));
            }
            _ => app.popup = Some(Popup::Settings(draft)),
        },
        Popup::ConfirmClear => match key.code {
            KeyCode::Char('y') | KeyCode::Enter => app.store.clear_active_chat(),
            _ => {}
        },
        Popup::ConfirmDelete { chat_id } => match key.code {
            KeyCode::Char('y') | KeyCode::Enter => app.delete_chat(&chat_id),
            _ => {}
        },
    }
}

fn adjust_settings_field(draft: &mut SettingsDraft, direction: i32) {
    match draft.field {
        SettingsField::Model => {
            let len = draft.models.len();
            if len > 0 {
                draft.model_idx =
                    (draft.model_idx as i32 + direction).rem_euclid(len as i32) as usize;
            }
        }
        SettingsField::Temperature => {
            let stepped = draft.temperature + f64::from(direction) * 0.1;
            // Step on a 0.1 grid without drifting into 0.30000000000000004.
            draft.temperature = (stepped * 10.0).round().clamp(0.0, 10.0) / 10.0;
        }
        SettingsField::MaxTokens => {
            let len = MAX_TOKENS_CHOICES.len();
            draft.max_tokens_idx =
                (draft.max_tokens_idx as i32 + direction).rem_euclid(len as i32) as usize;
        }
    }
}

async fn handle_normal_key(app: &mut App, key: KeyEvent) -> Result<()> {
    match key.code {
        // Quit
        KeyCode::Char('q') => app.should_quit = true,

        // Cancel an in-flight response
        KeyCode::Esc => {
            if app.loading {
                app.cancel_stream();
            }
        }

        // Chat lifecycle
        KeyCode::Char('n') => app.new_chat(),
        KeyCode::Char('x') => {
            if app.store.active_id().is_some() {
                app.popup = Some(Popup::ConfirmClear);
            }
        }
        KeyCode::Char('d') => {
            if app.focus == Focus::Sidebar {
                if let Some(chat_id) = app.highlighted_chat_id() {
                    app.popup = Some(Popup::ConfirmDelete { chat_id });
                }
            }
        }

        // Settings and theme
        KeyCode::Char('s') => app.open_settings().await,
        KeyCode::Char('t') => app.toggle_theme(),

        // Tab cycles: Sidebar -> Input -> Messages -> Sidebar
        KeyCode::Tab => {
            app.focus = match app.focus {
                Focus::Sidebar => Focus::Input,
                Focus::Input => Focus::Messages,
                Focus::Messages => Focus::Sidebar,
            };
            // Auto-enter editing mode when focusing input
            if app.focus == Focus::Input {
                app.input_mode = InputMode::Editing;
                app.cursor = app.input.chars().count();
            }
        }
        KeyCode::Char('i') => {
            app.focus = Focus::Input;
            app.input_mode = InputMode::Editing;
            app.cursor = app.input.chars().count();
        }

        // Navigation and scrolling based on focus
        KeyCode::Char('j') | KeyCode::Down => match app.focus {
            Focus::Sidebar => app.sidebar_next(),
            Focus::Messages => app.scroll_down(1),
            Focus::Input => {}
        },
        KeyCode::Char('k') | KeyCode::Up => match app.focus {
            Focus::Sidebar => app.sidebar_prev(),
            Focus::Messages => app.scroll_up(1),
            Focus::Input => {}
        },
        KeyCode::Enter | KeyCode::Char('l') | KeyCode::Right => {
            if app.focus == Focus::Sidebar {
                app.activate_highlighted_chat();
            }
        }

        // Half-page scroll for the transcript
        KeyCode::Char('u') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            if app.focus == Focus::Messages {
                app.scroll_up(app.chat_height / 2);
            }
        }
        KeyCode::Char('f') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            if app.focus == Focus::Messages {
                app.scroll_down(app.chat_height / 2);
            }
        }

        // Jump to top/bottom of the transcript
        KeyCode::Char('g') => {
            if app.focus == Focus::Messages {
                app.scroll_to_top();
            }
        }
        KeyCode::Char('G') => {
            if app.focus == Focus::Messages {
                app.scroll_to_bottom();
            }
        }

        // Copy the latest reply
        KeyCode::Char('c') => {
            if let Some(content) = app.latest_reply() {
                copy_to_clipboard(&content);
                app.mark_copied();
            }
        }

        _ => {}
    }
    Ok(())
}

fn handle_editing_key(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => {
            if app.loading {
                app.cancel_stream();
            } else {
                app.input_mode = InputMode::Normal;
            }
        }
        KeyCode::Enter => app.send_message(),
        KeyCode::Backspace => {
            if app.cursor > 0 {
                app.cursor -= 1;
                let byte_pos = char_to_byte_index(&app.input, app.cursor);
                app.input.remove(byte_pos);
            }
        }
        KeyCode::Delete => {
            let char_count = app.input.chars().count();
            if app.cursor < char_count {
                let byte_pos = char_to_byte_index(&app.input, app.cursor);
                app.input.remove(byte_pos);
            }
        }
        KeyCode::Left => {
            app.cursor = app.cursor.saturating_sub(1);
        }
        KeyCode::Right => {
            let char_count = app.input.chars().count();
            app.cursor = (app.cursor + 1).min(char_count);
        }
        KeyCode::Home => {
            app.cursor = 0;
        }
        KeyCode::End => {
            app.cursor = app.input.chars().count();
        }
        KeyCode::Char(c) => {
            let byte_pos = char_to_byte_index(&app.input, app.cursor);
            app.input.insert(byte_pos, c);
            app.cursor += 1;
        }
        _ => {}
    }
}

/// Check if a point is within a rectangle
fn point_in_rect(x: u16, y: u16, rect: Rect) -> bool {
    x >= rect.x && x < rect.x + rect.width && y >= rect.y && y < rect.y + rect.height
}

fn handle_mouse(app: &mut App, mouse: MouseEvent) {
    let x = mouse.column;
    let y = mouse.row;

    let in_sidebar = app
        .sidebar_area
        .map(|r| point_in_rect(x, y, r))
        .unwrap_or(false);
    let in_chat = app.chat_area.map(|r| point_in_rect(x, y, r)).unwrap_or(false);

    match mouse.kind {
        MouseEventKind::ScrollDown => {
            if in_sidebar {
                app.sidebar_next();
            } else if in_chat {
                app.scroll_down(3);
            }
        }
        MouseEventKind::ScrollUp => {
            if in_sidebar {
                app.sidebar_prev();
            } else if in_chat {
                app.scroll_up(3);
            }
        }
        _ => {}
    }
}

/// Pipes text into the first clipboard helper found on this system.
fn copy_to_clipboard(text: &str) {
    use std::io::Write;
    use std::process::{Command, Stdio};

    for tool in ["pbcopy", "wl-copy", "xclip"] {
        let mut command = Command::new(tool);
        if tool == "xclip" {
            command.args(["-selection", "clipboard"]);
        }
        if let Ok(mut child) = command.stdin(Stdio::piped()).spawn() {
            if let Some(mut stdin) = child.stdin.take() {
                let _ = stdin.write_all(text.as_bytes());
            }
            return;
        }
    }
}
