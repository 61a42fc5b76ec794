use crossterm::event::{Event, KeyCode, KeyEventKind, KeyModifiers};
use ratatui::{
    prelude::*,
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph},
    Frame,
};
use tui_input::{backend::crossterm::EventHandler, Input};

use careline::{ChatMessage, MessageOrigin, MessageStatus};

// Export the terminal types main needs
pub use ratatui::backend::CrosstermBackend;
pub use ratatui::Terminal;

/// What the event loop should do after a key was handled.
pub enum UiAction {
    None,
    /// The user submitted the input line.
    Send(String),
    /// The visible window moved; the value is the index (into the
    /// newest-first snapshot) of the oldest message now on screen.
    ScrolledTo(usize),
    Quit,
}

/// Terminal chat screen state. Purely presentational: the timeline
/// engine owns the messages, this struct only holds the latest
/// snapshot plus input and scroll state.
pub struct ChatUI {
    messages: Vec<ChatMessage>,
    input: Input,
    // How many messages the user has scrolled up from the newest end
    scroll_offset: usize,
    // Message rows visible in the last draw, needed to translate the
    // scroll offset into an oldest-visible index
    viewport_rows: usize,
    status_note: Option<String>,
    history_exhausted: bool,
}

impl ChatUI {
    pub fn new() -> Self {
        ChatUI {
            messages: Vec::new(),
            input: Input::default(),
            scroll_offset: 0,
            viewport_rows: 0,
            status_note: None,
            history_exhausted: false,
        }
    }

    /// Replace the rendered snapshot (called on MessagesChanged).
    pub fn set_messages(&mut self, messages: Vec<ChatMessage>) {
        self.messages = messages;
        if self.scroll_offset >= self.messages.len() {
            self.scroll_offset = self.messages.len().saturating_sub(1);
        }
    }

    pub fn set_status_note(&mut self, note: Option<String>) {
        self.status_note = note;
    }

    pub fn set_history_exhausted(&mut self) {
        self.history_exhausted = true;
    }

    pub fn handle_event(&mut self, event: &Event) -> UiAction {
        let Event::Key(key) = event else {
            return UiAction::None;
        };
        if key.kind != KeyEventKind::Press {
            return UiAction::None;
        }

        match key.code {
            KeyCode::Esc => UiAction::Quit,
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => UiAction::Quit,
            KeyCode::Enter => {
                let text = self.input.value().to_string();
                self.input.reset();
                // Sending snaps the view back to the newest message
                self.scroll_offset = 0;
                UiAction::Send(text)
            }
            KeyCode::Up => self.scroll_older(1),
            KeyCode::PageUp => self.scroll_older(self.viewport_rows.max(1)),
            KeyCode::Down => {
                self.scroll_offset = self.scroll_offset.saturating_sub(1);
                UiAction::None
            }
            KeyCode::PageDown => {
                self.scroll_offset = self.scroll_offset.saturating_sub(self.viewport_rows.max(1));
                UiAction::None
            }
            _ => {
                self.input.handle_event(event);
                UiAction::None
            }
        }
    }

    fn scroll_older(&mut self, step: usize) -> UiAction {
        if self.messages.is_empty() {
            return UiAction::None;
        }
        let max_offset = self.messages.len().saturating_sub(1);
        self.scroll_offset = (self.scroll_offset + step).min(max_offset);
        UiAction::ScrolledTo(self.oldest_visible_index())
    }

    // The snapshot is newest-first; the top row of the viewport is the
    // oldest message on screen.
    fn oldest_visible_index(&self) -> usize {
        let max_index = self.messages.len().saturating_sub(1);
        (self.scroll_offset + self.viewport_rows.saturating_sub(1)).min(max_index)
    }

    pub fn draw<B: Backend>(&mut self, f: &mut Frame<B>) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Min(3),    // Messages
                Constraint::Length(1), // Status line
                Constraint::Length(3), // Input
            ])
            .split(f.size());

        self.draw_messages(f, chunks[0]);
        self.draw_status(f, chunks[1]);
        self.draw_input(f, chunks[2]);
    }

    fn draw_messages<B: Backend>(&mut self, f: &mut Frame<B>, area: Rect) {
        self.viewport_rows = area.height.saturating_sub(2) as usize;

        // Oldest at the top, newest at the bottom, like any chat screen
        let items: Vec<ListItem> = self
            .messages
            .iter()
            .rev()
            .map(|m| {
                let timestamp = m.created_at.format("%H:%M").to_string();
                let (who, style) = match m.origin {
                    MessageOrigin::User => ("You", Style::default().fg(Color::Cyan)),
                    MessageOrigin::Assistant => ("Assistant", Style::default()),
                    MessageOrigin::SystemError => ("System", Style::default().fg(Color::Red)),
                };
                let status_mark = match (m.origin, m.status) {
                    (MessageOrigin::User, MessageStatus::Pending) => " …",
                    (MessageOrigin::User, MessageStatus::Failed) => " ✗",
                    _ => "",
                };
                let line = format!("[{}] {}: {}{}", timestamp, who, m.text, status_mark);
                let style = if m.status == MessageStatus::Failed {
                    Style::default().fg(Color::Red)
                } else {
                    style
                };
                ListItem::new(Text::from(line)).style(style)
            })
            .collect();

        // Anchor the view scroll_offset messages above the newest one
        let mut list_state = ListState::default();
        if !items.is_empty() {
            let selected = items.len().saturating_sub(1 + self.scroll_offset);
            list_state.select(Some(selected));
        }

        let list = List::new(items)
            .block(Block::default().borders(Borders::ALL).title("Careline"))
            .highlight_style(Style::default()); // selection is invisible, it only drives scrolling

        f.render_stateful_widget(list, area, &mut list_state);
    }

    fn draw_status<B: Backend>(&self, f: &mut Frame<B>, area: Rect) {
        let text = if let Some(note) = &self.status_note {
            note.clone()
        } else if self.history_exhausted {
            "Beginning of conversation".to_string()
        } else {
            "Up/PgUp: older messages | Enter: send | Esc: quit".to_string()
        };
        let status = Paragraph::new(text).style(Style::default().fg(Color::DarkGray));
        f.render_widget(status, area);
    }

    fn draw_input<B: Backend>(&self, f: &mut Frame<B>, area: Rect) {
        let width = area.width.saturating_sub(2) as usize;
        let scroll = self.input.visual_scroll(width);
        let input = Paragraph::new(self.input.value())
            .scroll((0, scroll as u16))
            .block(Block::default().borders(Borders::ALL).title("Message"));
        f.render_widget(input, area);

        f.set_cursor(
            area.x + 1 + (self.input.visual_cursor().saturating_sub(scroll)) as u16,
            area.y + 1,
        );
    }
}
