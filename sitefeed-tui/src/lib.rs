//! Terminal host page for the feed widgets: the chat box on the left, the updates feed on the
//! right, a status line below.

mod command;
mod feed_view;

use crossterm::event::{Event, EventStream, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use futures::stream::StreamExt;
use ratatui::{
    layout::{Constraint, Layout},
    style::{Color, Style},
    text::Line,
    widgets::{Block, Borders, Paragraph},
    Frame,
};
use sitefeed_widgets::{ChatCommand, SharedDocument, UpdatesCommand};
use tokio::sync::mpsc;

pub use command::{parse_input, CommandError, InputAction};
pub use feed_view::{Feed, FeedView, ROW_HEIGHT};

const HELP: &str = "tab: switch pane · enter: send · /name /color /wingdings · r: retry · ctrl-r: reload · esc: quit";

/// Everything the host needs to show and steer the two widgets.
pub struct Panes {
    pub chat: SharedDocument,
    pub updates: SharedDocument,
    pub chat_commands: mpsc::UnboundedSender<ChatCommand>,
    pub updates_commands: mpsc::UnboundedSender<UpdatesCommand>,
    /// Authors of new chat messages.
    pub notifications: mpsc::UnboundedReceiver<String>,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
enum Focus {
    #[default]
    Chat,
    Updates,
}

#[derive(Debug, Default)]
struct App {
    focus: Focus,
    chat_view: FeedView,
    updates_view: FeedView,
    status: Option<String>,
    quit: bool,
}

pub async fn run(panes: Panes) -> std::io::Result<()> {
    let terminal = ratatui::init();
    let res = run_inner(terminal, panes).await;
    ratatui::restore();
    res
}

async fn run_inner(mut term: ratatui::DefaultTerminal, mut panes: Panes) -> std::io::Result<()> {
    let mut app = App::default();
    let chat_changed = panes.chat.changed();
    let updates_changed = panes.updates.changed();
    let mut term_events = EventStream::new();
    while !app.quit {
        term.draw(|frame| app.draw(frame, &panes))?;
        tokio::select! {
            event = term_events.next() => match event {
                Some(Ok(Event::Key(key))) if key.kind != KeyEventKind::Release => {
                    app.on_key(key, &panes);
                }
                Some(Ok(event)) => tracing::trace!("{event:?}"),
                Some(Err(err)) => tracing::warn!("{err}"),
                None => {
                    tracing::info!("term events stream stopped, shutting down");
                    break;
                }
            },
            () = chat_changed.notified() => {}
            () = updates_changed.notified() => {}
            Some(author) = panes.notifications.recv() => {
                app.status = Some(format!("new message from {author}"));
            }
        }
    }
    Ok(())
}

impl App {
    fn draw(&mut self, frame: &mut Frame<'_>, panes: &Panes) {
        let [content_area, status_area] =
            Layout::vertical([Constraint::Min(3), Constraint::Length(1)]).areas(frame.area());
        let [chat_area, updates_area] =
            Layout::horizontal([Constraint::Percentage(40), Constraint::Percentage(60)])
                .areas(content_area);
        let [messages_area, input_area] =
            Layout::vertical([Constraint::Min(3), Constraint::Length(3)]).areas(chat_area);

        let chat = panes.chat.lock();
        frame.render_stateful_widget(
            Feed {
                document: &chat,
                title: "chat",
                focused: self.focus == Focus::Chat,
                follow_bottom: true,
            },
            messages_area,
            &mut self.chat_view,
        );
        let input = Paragraph::new(chat.input().to_owned())
            .block(Block::default().title("say").borders(Borders::ALL));
        frame.render_widget(input, input_area);
        if self.focus == Focus::Chat {
            let width = u16::try_from(chat.input().chars().count()).unwrap_or(u16::MAX);
            frame.set_cursor_position((
                input_area.x.saturating_add(1).saturating_add(width),
                input_area.y + 1,
            ));
        }
        drop(chat);

        let updates = panes.updates.lock();
        frame.render_stateful_widget(
            Feed {
                document: &updates,
                title: "updates",
                focused: self.focus == Focus::Updates,
                follow_bottom: false,
            },
            updates_area,
            &mut self.updates_view,
        );
        drop(updates);

        let status = match &self.status {
            Some(status) => Line::styled(status.clone(), Style::default().fg(Color::Yellow)),
            None => Line::styled(HELP, Style::default().fg(Color::DarkGray)),
        };
        frame.render_widget(Paragraph::new(status), status_area);
    }

    fn on_key(&mut self, key: KeyEvent, panes: &Panes) {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        match key.code {
            KeyCode::Esc => self.quit = true,
            KeyCode::Char('c') if ctrl => self.quit = true,
            KeyCode::Char('r') if ctrl => {
                self.status = Some("reloading".to_owned());
                self.updates_view.scroll_to_top();
                send(&panes.chat_commands, ChatCommand::Reinitialize);
                send(&panes.updates_commands, UpdatesCommand::Reinitialize);
            }
            KeyCode::Tab | KeyCode::BackTab => {
                self.focus = match self.focus {
                    Focus::Chat => Focus::Updates,
                    Focus::Updates => Focus::Chat,
                };
            }
            _ => match self.focus {
                Focus::Chat => self.on_chat_key(key, panes),
                Focus::Updates => self.on_updates_key(key, panes),
            },
        }
    }

    fn on_chat_key(&mut self, key: KeyEvent, panes: &Panes) {
        match key.code {
            KeyCode::Char(c) => {
                let mut chat = panes.chat.lock();
                let mut input = chat.input().to_owned();
                input.push(c);
                chat.set_input(input);
            }
            KeyCode::Backspace => {
                let mut chat = panes.chat.lock();
                let mut input = chat.input().to_owned();
                input.pop();
                chat.set_input(input);
            }
            KeyCode::Enter => self.submit(panes),
            _ => {}
        }
    }

    /// Sends the input line, or applies it as a settings command.
    fn submit(&mut self, panes: &Panes) {
        let line = panes.chat.lock().input().to_owned();
        match parse_input(&line) {
            // the chat clears the input once the message is stored
            Ok(InputAction::Send(text)) => send(&panes.chat_commands, ChatCommand::Send(text)),
            Ok(InputAction::Settings(update)) => {
                self.status = Some("settings saved".to_owned());
                send(&panes.chat_commands, ChatCommand::SaveSettings(update));
                panes.chat.lock().set_input(String::new());
            }
            Err(err) => self.status = Some(err.to_string()),
        }
    }

    fn on_updates_key(&mut self, key: KeyEvent, panes: &Panes) {
        let view = &mut self.updates_view;
        match key.code {
            KeyCode::Char('q') => {
                self.quit = true;
                return;
            }
            KeyCode::Char('r') => {
                send(&panes.updates_commands, UpdatesCommand::Retry);
                return;
            }
            KeyCode::Up | KeyCode::Char('k') => view.scroll_up(1),
            KeyCode::Down | KeyCode::Char('j') => view.scroll_down(1),
            KeyCode::PageUp => view.scroll_up(view.page()),
            KeyCode::PageDown => view.scroll_down(view.page()),
            KeyCode::Home | KeyCode::Char('g') => view.scroll_to_top(),
            _ => return,
        }
        send(&panes.updates_commands, UpdatesCommand::Scroll(view.metrics()));
    }
}

fn send<T>(commands: &mpsc::UnboundedSender<T>, command: T) {
    if commands.send(command).is_err() {
        tracing::warn!("widget driver is gone");
    }
}
