use log::{debug, warn};
use ratatui::layout::Rect;
use ratatui::widgets::ListState;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

use crate::config::{Settings, Theme};
use crate::ollama::{self, OllamaClient, StreamEvent, StreamEventKind};
use crate::session::{ChatStore, Message, Role};
use crate::storage::Storage;

/// "Copied" indicator lifetime in ticks (300ms each, ~2 seconds).
const COPIED_TICKS: u8 = 7;

pub const MAX_TOKENS_CHOICES: [u32; 4] = [512, 1024, 2048, 4096];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    Sidebar,
    Messages,
    Input,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingsField {
    Model,
    Temperature,
    MaxTokens,
}

/// Working copy edited inside the settings dialog. Nothing is applied
/// until the user saves.
#[derive(Debug)]
pub struct SettingsDraft {
    pub field: SettingsField,
    pub models: Vec<String>,
    pub model_idx: usize,
    pub temperature: f64,
    pub max_tokens_idx: usize,
}

#[derive(Debug)]
pub enum Popup {
    Settings(SettingsDraft),
    ConfirmClear,
    ConfirmDelete { chat_id: String },
}

/// One in-flight generate stream. The accumulated reply lives here
/// until the stream ends; the generation number ties incoming events to
/// this stream and lets stale ones be dropped after a cancel.
pub struct PendingStream {
    pub chat_id: String,
    pub message_id: String,
    pub generation: u64,
    pub content: String,
    task: JoinHandle<()>,
}

pub struct App {
    // Core state
    pub should_quit: bool,
    pub focus: Focus,
    pub input_mode: InputMode,
    pub popup: Option<Popup>,
    pub theme: Theme,

    // Session state
    pub store: ChatStore,
    pub settings: Settings,

    // Input state
    pub input: String,
    pub cursor: usize,

    // Streaming state
    pub loading: bool,
    pending: Option<PendingStream>,
    generation: u64,

    // Sidebar state
    pub sidebar_state: ListState,

    // Transcript scroll state (dimensions updated during render)
    pub chat_scroll: u16,
    pub chat_height: u16,
    pub chat_total_lines: u16,
    pub follow_stream: bool,

    // Animation state
    pub animation_frame: u8,
    pub copied_ticks: u8,

    // Panel areas for mouse hit-testing (updated during render)
    pub sidebar_area: Option<Rect>,
    pub chat_area: Option<Rect>,

    // External pieces
    pub ollama: OllamaClient,
    storage: Storage,
    stream_tx: UnboundedSender<StreamEvent>,
}

impl App {
    /// Initialization order: theme, then settings, then chats, each
    /// falling back to its default when the persisted entry is missing
    /// or malformed.
    pub fn new(storage: Storage, stream_tx: UnboundedSender<StreamEvent>) -> Self {
        let theme = Theme::load(&storage);
        let settings = Settings::load(&storage);
        let store = ChatStore::load(storage.clone());

        let mut sidebar_state = ListState::default();
        if !store.chats().is_empty() {
            sidebar_state.select(Some(0));
        }

        Self {
            should_quit: false,
            focus: Focus::Input,
            input_mode: InputMode::Editing,
            popup: None,
            theme,

            store,
            settings,

            input: String::new(),
            cursor: 0,

            loading: false,
            pending: None,
            generation: 0,

            sidebar_state,

            chat_scroll: 0,
            chat_height: 0,
            chat_total_lines: 0,
            follow_stream: true,

            animation_frame: 0,
            copied_ticks: 0,

            sidebar_area: None,
            chat_area: None,

            ollama: OllamaClient::new(ollama::DEFAULT_BASE_URL),
            storage,
            stream_tx,
        }
    }

    // Chat list actions

    pub fn new_chat(&mut self) {
        self.store.create_chat();
        self.sidebar_state.select(Some(0));
        self.chat_scroll = 0;
        self.follow_stream = true;
        self.focus = Focus::Input;
        self.input_mode = InputMode::Editing;
    }

    pub fn highlighted_chat_id(&self) -> Option<String> {
        let idx = self.sidebar_state.selected()?;
        self.store.chats().get(idx).map(|c| c.id.clone())
    }

    pub fn sidebar_next(&mut self) {
        let len = self.store.chats().len();
        if len > 0 {
            let i = self.sidebar_state.selected().unwrap_or(0);
            self.sidebar_state.select(Some((i + 1).min(len - 1)));
        }
    }

    pub fn sidebar_prev(&mut self) {
        let i = self.sidebar_state.selected().unwrap_or(0);
        self.sidebar_state.select(Some(i.saturating_sub(1)));
    }

    /// Activates the chat highlighted in the sidebar. An id that no
    /// longer resolves is reported and ignored.
    pub fn activate_highlighted_chat(&mut self) {
        if let Some(id) = self.highlighted_chat_id() {
            if !self.store.select_chat(&id) {
                warn!("ignoring selection of unknown chat {}", id);
                return;
            }
            self.chat_scroll = 0;
            self.follow_stream = true;
        }
    }

    pub fn delete_chat(&mut self, id: &str) {
        self.store.delete_chat(id);
        let len = self.store.chats().len();
        if len == 0 {
            self.sidebar_state.select(None);
        } else if let Some(i) = self.sidebar_state.selected() {
            self.sidebar_state.select(Some(i.min(len - 1)));
        }
    }

    // Streaming

    /// Sends the input box content: ensures an active chat (creating
    /// one on first send), appends the user message, and spawns the
    /// streaming request. No-op while a stream is in flight.
    pub fn send_message(&mut self) {
        let text = self.input.trim().to_string();
        if text.is_empty() || self.loading {
            return;
        }

        let chat_id = match self.store.active_id() {
            Some(id) => id.to_string(),
            None => {
                let id = self.store.create_chat();
                self.sidebar_state.select(Some(0));
                id
            }
        };

        let user_id = self.store.next_id();
        self.store.append_message(
            &chat_id,
            Message {
                id: user_id,
                role: Role::User,
                content: text.clone(),
            },
        );

        self.input.clear();
        self.cursor = 0;

        let message_id = self.store.next_id();
        self.store.begin_stream(Message {
            id: message_id.clone(),
            role: Role::Assistant,
            content: String::new(),
        });

        self.loading = true;
        self.follow_stream = true;
        self.generation += 1;

        let task = ollama::spawn_generate(
            self.ollama.clone(),
            self.settings.clone(),
            text,
            chat_id.clone(),
            message_id.clone(),
            self.generation,
            self.stream_tx.clone(),
        );

        self.pending = Some(PendingStream {
            chat_id,
            message_id,
            generation: self.generation,
            content: String::new(),
            task,
        });
    }

    /// Applies one event from the generate stream. Events from an
    /// abandoned stream (older generation) are dropped. Fragments
    /// replace the visible reply wholesale; completion commits into the
    /// originating chat, wherever the user has navigated since.
    pub fn apply_stream_event(&mut self, event: StreamEvent) {
        let Some(generation) = self.pending.as_ref().map(|p| p.generation) else {
            return;
        };
        if event.generation != generation {
            debug!(
                "dropping stale stream event (generation {})",
                event.generation
            );
            return;
        }

        match event.kind {
            StreamEventKind::Fragment(fragment) => {
                if let Some(pending) = self.pending.as_mut() {
                    pending.content.push_str(&fragment);
                    let content = pending.content.clone();
                    self.store
                        .update_stream(&event.chat_id, &event.message_id, &content);
                }
                self.follow_stream = true;
            }
            StreamEventKind::Done => {
                if let Some(pending) = self.pending.take() {
                    let committed = self.store.commit_stream(
                        &pending.chat_id,
                        Message {
                            id: pending.message_id,
                            role: Role::Assistant,
                            content: pending.content,
                        },
                    );
                    if !committed {
                        debug!("discarding reply for deleted chat {}", pending.chat_id);
                    }
                }
                self.loading = false;
            }
            StreamEventKind::Failed(text) => {
                if let Some(pending) = self.pending.take() {
                    self.store
                        .fail_stream(&pending.chat_id, &pending.message_id, &text);
                }
                self.loading = false;
            }
        }
    }

    /// Aborts the in-flight stream. The partial reply stays visible but
    /// is never committed; late events from the aborted task no longer
    /// match the current generation.
    pub fn cancel_stream(&mut self) {
        if let Some(pending) = self.pending.take() {
            pending.task.abort();
            self.generation += 1;
            self.loading = false;
        }
    }

    // Settings and theme

    pub fn toggle_theme(&mut self) {
        self.theme = self.theme.toggle();
        if let Err(e) = self.theme.save(&self.storage) {
            warn!("failed to persist theme: {}", e);
        }
    }

    /// Opens the settings dialog, seeding the model choices from the
    /// server. An unreachable server leaves the configured model as the
    /// only choice.
    pub async fn open_settings(&mut self) {
        let mut models = self.ollama.list_models().await.unwrap_or_default();
        if !models.iter().any(|m| *m == self.settings.model) {
            models.insert(0, self.settings.model.clone());
        }
        let model_idx = models
            .iter()
            .position(|m| *m == self.settings.model)
            .unwrap_or(0);
        let max_tokens_idx = MAX_TOKENS_CHOICES
            .iter()
            .position(|&t| t == self.settings.max_tokens)
            .unwrap_or(1);

        self.popup = Some(Popup::Settings(SettingsDraft {
            field: SettingsField::Model,
            models,
            model_idx,
            temperature: self.settings.temperature,
            max_tokens_idx,
        }));
    }

    pub fn save_settings(&mut self, draft: &SettingsDraft) {
        self.settings = Settings {
            model: draft.models[draft.model_idx].clone(),
            temperature: draft.temperature.clamp(0.0, 1.0),
            max_tokens: MAX_TOKENS_CHOICES[draft.max_tokens_idx],
        };
        if let Err(e) = self.settings.save(&self.storage) {
            warn!("failed to persist settings: {}", e);
        }
    }

    // Transcript helpers

    /// True while the in-flight stream targets the chat on screen.
    pub fn is_streaming_here(&self) -> bool {
        self.pending
            .as_ref()
            .is_some_and(|p| self.store.active_id() == Some(p.chat_id.as_str()))
    }

    /// The most recent assistant reply in the visible transcript.
    pub fn latest_reply(&self) -> Option<String> {
        self.store
            .current_messages()
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant && !m.content.is_empty())
            .map(|m| m.content.clone())
    }

    pub fn mark_copied(&mut self) {
        self.copied_ticks = COPIED_TICKS;
    }

    pub fn scroll_down(&mut self, lines: u16) {
        let max_scroll = self.chat_total_lines.saturating_sub(self.chat_height);
        self.chat_scroll = (self.chat_scroll.saturating_add(lines)).min(max_scroll);
        self.follow_stream = self.chat_scroll == max_scroll;
    }

    pub fn scroll_up(&mut self, lines: u16) {
        self.chat_scroll = self.chat_scroll.saturating_sub(lines);
        self.follow_stream = false;
    }

    pub fn scroll_to_top(&mut self) {
        self.chat_scroll = 0;
        self.follow_stream = false;
    }

    pub fn scroll_to_bottom(&mut self) {
        self.chat_scroll = self.chat_total_lines.saturating_sub(self.chat_height);
        self.follow_stream = true;
    }

    /// Tick animation frame and transient indicators (Tick event).
    pub fn tick(&mut self) {
        if self.loading {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
        self.copied_ticks = self.copied_ticks.saturating_sub(1);
    }

    #[cfg(test)]
    fn pending(&self) -> Option<&PendingStream> {
        self.pending.as_ref()
    }
}
