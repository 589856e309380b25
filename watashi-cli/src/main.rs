mod app;
mod client;
mod theme;

use anyhow::Result;
use app::{App, Entry, Status};
use client::{ClientEvent, RelayClient};
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    layout::{Constraint, Direction, Layout},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Wrap},
    Frame, Terminal,
};
use std::io;
use theme::ThemeContext;
use tokio::sync::mpsc;
use tracing::info;
use watashi_shared::MessageRole;

const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:3000/api/chat";

#[tokio::main]
async fn main() -> Result<()> {
    // Log to a file; the terminal belongs to the UI
    let log_file = std::fs::File::create("watashi-cli.log").ok();
    if let Some(file) = log_file {
        tracing_subscriber::fmt()
            .with_writer(file)
            .with_ansi(false)
            .init();
    }
    dotenv::dotenv().ok();

    let server_url =
        std::env::var("WATASHI_SERVER_URL").unwrap_or_else(|_| DEFAULT_SERVER_URL.to_string());
    let (client, mut event_rx) = RelayClient::new(server_url);
    info!("Using relay at {}", client.url());

    let mut theme = ThemeContext::detect();

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = App::new();

    let (ui_tx, mut ui_rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        while let Ok(event) = event::read() {
            if ui_tx.send(event).is_err() {
                break;
            }
        }
    });

    let res = run_app(
        &mut terminal,
        &mut app,
        &mut theme,
        &client,
        &mut event_rx,
        &mut ui_rx,
    )
    .await;

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        println!("{err:?}");
    }

    Ok(())
}

async fn run_app<B: Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
    theme: &mut ThemeContext,
    client: &RelayClient,
    event_rx: &mut mpsc::UnboundedReceiver<ClientEvent>,
    ui_rx: &mut mpsc::UnboundedReceiver<Event>,
) -> Result<()> {
    loop {
        let mut max_scroll = 0;
        terminal.draw(|f| max_scroll = ui(f, app, theme))?;
        app.set_max_scroll(max_scroll);

        tokio::select! {
            Some(event) = ui_rx.recv() => {
                let Event::Key(key) = event else { continue };
                if key.kind != KeyEventKind::Press {
                    continue;
                }
                let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
                match key.code {
                    KeyCode::Char('q') if ctrl => return Ok(()),
                    KeyCode::Char('t') if ctrl => {
                        theme.cycle();
                        info!("Theme switched to {:?}", theme.mode());
                    }
                    KeyCode::Char(c) => app.input.push(c),
                    KeyCode::Backspace => {
                        app.input.pop();
                    }
                    KeyCode::Enter => {
                        if let Some(conversation) = app.submit() {
                            client.send(conversation);
                        }
                    }
                    KeyCode::Up => app.scroll_up(),
                    KeyCode::Down => app.scroll_down(),
                    _ => {}
                }
            }
            Some(event) = event_rx.recv() => {
                app.apply(event);
            }
        }
    }
}

/// Draws one frame and returns how far the transcript can scroll up.
fn ui(f: &mut Frame, app: &App, theme: &ThemeContext) -> u16 {
    let palette = theme.palette();
    let base = Style::default().fg(palette.text).bg(palette.background);

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Min(3),
            Constraint::Length(3),
        ])
        .split(f.area());

    let (status_text, status_color) = match &app.status {
        Status::Idle => ("● Ready".to_string(), palette.ok),
        Status::Waiting => ("● Waiting for reply...".to_string(), palette.busy),
        Status::Streaming => ("● Receiving...".to_string(), palette.busy),
        Status::Error(e) => (format!("● Error: {}", e), palette.error),
    };
    let status = Paragraph::new(Line::from(vec![
        Span::styled(status_text, Style::default().fg(status_color)),
        Span::raw("   "),
        Span::styled(
            format!("theme: {} (Ctrl-T)", theme.label()),
            Style::default().fg(palette.border),
        ),
    ]))
    .style(base);
    f.render_widget(status, chunks[0]);

    let mut lines: Vec<Line> = Vec::new();
    for entry in &app.transcript {
        match entry {
            Entry::Message(msg) => push_message(&mut lines, msg.role, &msg.content, theme),
            Entry::Notice(text) => {
                lines.push(Line::from(Span::styled(
                    text.clone(),
                    Style::default().fg(palette.notice).add_modifier(Modifier::ITALIC),
                )));
                lines.push(Line::from(""));
            }
        }
    }
    if let Some(streaming) = app.streaming_message() {
        let content = if streaming.is_empty() { "●●●" } else { streaming };
        push_message(&mut lines, MessageRole::Assistant, content, theme);
    }

    // Keep the newest lines in view unless the user scrolled up
    let visible = chunks[1].height.saturating_sub(2);
    let total = u16::try_from(lines.len()).unwrap_or(u16::MAX);
    let max_scroll = total.saturating_sub(visible);
    let offset = max_scroll.saturating_sub(app.scroll);

    let messages = Paragraph::new(lines)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(palette.border))
                .title("Watashi AI"),
        )
        .style(base)
        .wrap(Wrap { trim: false })
        .scroll((offset, 0));
    f.render_widget(messages, chunks[1]);

    let input = Paragraph::new(app.input.as_str())
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(palette.border))
                .title("Ask me anything... (Enter to send, Ctrl-Q to quit)"),
        )
        .style(base)
        .wrap(Wrap { trim: true });
    f.render_widget(input, chunks[2]);
    max_scroll
}

fn push_message<'a>(lines: &mut Vec<Line<'a>>, role: MessageRole, content: &'a str, theme: &ThemeContext) {
    let palette = theme.palette();
    let (prefix, color) = match role {
        MessageRole::System => ("System", palette.notice),
        MessageRole::User => ("You", palette.user),
        MessageRole::Assistant => ("Watashi AI", palette.assistant),
    };
    lines.push(Line::from(Span::styled(
        format!("{}:", prefix),
        Style::default().fg(color).add_modifier(Modifier::BOLD),
    )));
    for line in content.lines() {
        lines.push(Line::from(Span::raw(line)));
    }
    lines.push(Line::from(""));
}
