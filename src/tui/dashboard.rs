//! Live dashboard for a checking run

use crate::proxy::backend::CheckBackend;
use crate::proxy::checker::ProxyChecker;
use crate::proxy::models::{CheckResult, ProxyDefinition};
use crate::proxy::progress::{Progress, ProgressSnapshot};
use crate::Result;
use anyhow::anyhow;
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    layout::{Alignment, Constraint, Direction, Layout},
    style::{Color, Modifier, Style},
    widgets::{Block, Borders, Gauge, List, ListItem, ListState, Paragraph, Wrap},
    Frame, Terminal,
};
use std::io;
use std::sync::Arc;
use tokio::time::Duration;

/// How long to wait for a key press between redraws
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Dashboard state; it only reads the run's counters
pub struct Dashboard {
    progress: Arc<Progress>,
    results: Vec<CheckResult>,
    list_state: ListState,
    is_complete: bool,
    should_quit: bool,
}

impl Dashboard {
    pub fn new(progress: Arc<Progress>) -> Self {
        let mut list_state = ListState::default();
        list_state.select(Some(0));

        Self {
            progress,
            results: Vec::new(),
            list_state,
            is_complete: false,
            should_quit: false,
        }
    }

    /// Check `proxies` while drawing the dashboard.
    ///
    /// Returns `None` if the user quit before the run completed.
    pub async fn run<B: CheckBackend>(
        &mut self,
        checker: &ProxyChecker<B>,
        proxies: Vec<ProxyDefinition>,
    ) -> Result<Option<Vec<CheckResult>>> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;

        let result = self.run_app(&mut terminal, checker, proxies).await;

        disable_raw_mode()?;
        execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
        terminal.show_cursor()?;

        result
    }

    async fn run_app<B: CheckBackend, T: Backend>(
        &mut self,
        terminal: &mut Terminal<T>,
        checker: &ProxyChecker<B>,
        proxies: Vec<ProxyDefinition>,
    ) -> Result<Option<Vec<CheckResult>>> {
        let checker = checker.clone();
        let progress = Arc::clone(&self.progress);
        let mut handle = Some(tokio::spawn(async move { checker.run(proxies, progress).await }));

        loop {
            terminal.draw(|f| self.ui(f))?;

            if event::poll(POLL_INTERVAL)? {
                if let Event::Key(key) = event::read()? {
                    if key.kind == KeyEventKind::Press {
                        self.handle_input(key.code);
                    }
                }
            }

            if handle.as_ref().is_some_and(|h| h.is_finished()) {
                if let Some(finished) = handle.take() {
                    self.results = finished.await.map_err(|e| anyhow!("check task failed: {}", e))??;
                    self.is_complete = true;
                }
            }

            if self.should_quit {
                break;
            }
        }

        if let Some(unfinished) = handle {
            unfinished.abort();
            return Ok(None);
        }
        Ok(Some(std::mem::take(&mut self.results)))
    }

    fn handle_input(&mut self, key: KeyCode) {
        let len = self.results.len();
        match key {
            KeyCode::Char('q') | KeyCode::Esc => {
                self.should_quit = true;
            }
            KeyCode::Down => {
                let i = match self.list_state.selected() {
                    Some(i) if i + 1 < len => i + 1,
                    _ => 0,
                };
                self.list_state.select(Some(i));
            }
            KeyCode::Up => {
                let i = match self.list_state.selected() {
                    Some(0) | None => len.saturating_sub(1),
                    Some(i) => i - 1,
                };
                self.list_state.select(Some(i));
            }
            _ => {}
        }
    }

    fn ui(&mut self, f: &mut Frame) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .margin(1)
            .constraints([
                Constraint::Length(3), // Title
                Constraint::Length(3), // Progress bar
                Constraint::Min(0),    // Passing proxies
                Constraint::Length(3), // Status bar
            ])
            .split(f.size());

        let title = Paragraph::new("Subs Check")
            .style(Style::default().fg(Color::Cyan))
            .alignment(Alignment::Center)
            .block(Block::default().borders(Borders::ALL));
        f.render_widget(title, chunks[0]);

        let snapshot = self.progress.snapshot();
        let gauge = Gauge::default()
            .block(Block::default().borders(Borders::ALL).title("Progress"))
            .gauge_style(Style::default().fg(Color::Green).bg(Color::Black))
            .percent(gauge_percent(&snapshot))
            .label(format!("{}/{}", snapshot.checked, snapshot.total));
        f.render_widget(gauge, chunks[1]);

        let items: Vec<ListItem> = if self.is_complete {
            self.results
                .iter()
                .map(|result| {
                    ListItem::new(result_line(result)).style(Style::default().fg(Color::Green))
                })
                .collect()
        } else {
            vec![ListItem::new("Checking...").style(Style::default().fg(Color::DarkGray))]
        };

        let list = List::new(items)
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title(format!("Available ({})", snapshot.available))
                    .border_style(Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)),
            )
            .highlight_style(Style::default().bg(Color::DarkGray))
            .highlight_symbol(">> ");
        f.render_stateful_widget(list, chunks[2], &mut self.list_state);

        let status = Paragraph::new(status_line(&snapshot, self.is_complete))
            .style(if self.is_complete {
                Style::default().fg(Color::Green)
            } else {
                Style::default().fg(Color::Yellow)
            })
            .wrap(Wrap { trim: true })
            .block(Block::default().borders(Borders::ALL).title("Status"));
        f.render_widget(status, chunks[3]);
    }
}

fn gauge_percent(snapshot: &ProgressSnapshot) -> u16 {
    snapshot
        .percent()
        .map_or(0, |percent| percent.clamp(0.0, 100.0) as u16)
}

fn status_line(snapshot: &ProgressSnapshot, complete: bool) -> String {
    if complete {
        format!(
            "Complete! Checked: {} | Available: {} | Press 'q' to quit",
            snapshot.checked, snapshot.available
        )
    } else {
        format!(
            "Checking... {}% ({}/{}) | Available: {} | Press 'q' to quit",
            gauge_percent(snapshot),
            snapshot.checked,
            snapshot.total,
            snapshot.available
        )
    }
}

fn result_line(result: &CheckResult) -> String {
    let name = result.name().unwrap_or("<unnamed>");
    match result.speed_kbps {
        Some(_) => name.to_string(),
        None => match result.proxy.dedup_key() {
            Some(key) => format!("{} ({})", name, key),
            None => name.to_string(),
        },
    }
}
