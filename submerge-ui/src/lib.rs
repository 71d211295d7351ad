//! A small terminal viewer onto a running Realm: pick a node, see its
//! write-locks and store contents as of the last `get_debug_state` poll,
//! and issue one-off `dirty_read`s. This is an operator's window into the
//! cluster, not a client for the coordinator's logical operations -- it
//! never locks, writes, or releases anything itself.

use std::time::{Duration, Instant};

use crossterm::{
    event::{self, KeyCode, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    ExecutableCommand,
};
use ratatui::{
    prelude::{Constraint, CrosstermBackend, Direction, Layout, Stylize, Terminal},
    widgets::{Block, Borders, List, ListItem, Paragraph},
};
use std::io::{stdout, Result};

use submerge_net::{DebugState, LoopbackTransport, NodeID, Reply, Request, Transport};

/// Everything the viewer needs: the cluster's nodes, a handle onto the
/// transport that reaches them, and how long to wait for a reply before
/// giving up.
pub struct UiContext {
    pub nodes: Vec<NodeID>,
    pub transport: LoopbackTransport<String, String>,
    pub deadline: Duration,
}

enum Mode {
    Browse,
    EnterReadKey,
}

struct UiState {
    ctx: UiContext,
    selected: usize,
    mode: Mode,
    input: String,
    last_debug: Option<DebugState<String, String>>,
    last_poll: Instant,
    status: String,
}

impl UiState {
    fn new(ctx: UiContext) -> Self {
        UiState {
            ctx,
            selected: 0,
            mode: Mode::Browse,
            input: String::new(),
            last_debug: None,
            last_poll: Instant::now() - Duration::from_secs(3600),
            status: String::new(),
        }
    }

    fn selected_node(&self) -> Option<NodeID> {
        self.ctx.nodes.get(self.selected).copied()
    }

    fn refresh(&mut self) {
        let Some(node) = self.selected_node() else { return };
        match self.ctx.transport.call(node, Request::GetDebugState, self.ctx.deadline) {
            Ok(Reply::DebugState(state)) => {
                self.last_debug = Some(state);
                self.status = format!("refreshed {node}");
            }
            Ok(_other) => self.status = format!("{node} sent an unexpected reply"),
            Err(e) => self.status = format!("{node} unreachable: {e:?}"),
        }
        self.last_poll = Instant::now();
    }

    fn dirty_read(&mut self, key: String) {
        let Some(node) = self.selected_node() else { return };
        match self.ctx.transport.call(node, Request::DirtyRead { key: key.clone() }, self.ctx.deadline) {
            Ok(Reply::Value(v)) => self.status = format!("{node}: {key} = {v:?}"),
            Ok(Reply::NotFound) => self.status = format!("{node}: {key} not found"),
            Ok(_other) => self.status = format!("{node} sent an unexpected reply"),
            Err(e) => self.status = format!("{node} unreachable: {e:?}"),
        }
    }
}

pub fn run_ui(ctx: UiContext) -> Result<()> {
    stdout().execute(EnterAlternateScreen)?;
    enable_raw_mode()?;
    let res = main_loop(ctx);
    stdout().execute(LeaveAlternateScreen)?;
    disable_raw_mode()?;
    res
}

fn main_loop(ctx: UiContext) -> Result<()> {
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;
    terminal.clear()?;
    let mut state = UiState::new(ctx);
    state.refresh();
    loop {
        draw_ui(&mut terminal, &state)?;
        if event::poll(Duration::from_millis(100))? {
            if let event::Event::Key(key) = event::read()? {
                if key.kind != KeyEventKind::Press {
                    continue;
                }
                match state.mode {
                    Mode::Browse => match key.code {
                        KeyCode::Char('q') => break,
                        KeyCode::Char('r') => state.refresh(),
                        KeyCode::Tab | KeyCode::Down => {
                            if !state.ctx.nodes.is_empty() {
                                state.selected = (state.selected + 1) % state.ctx.nodes.len();
                                state.refresh();
                            }
                        }
                        KeyCode::Up => {
                            if !state.ctx.nodes.is_empty() {
                                state.selected = (state.selected + state.ctx.nodes.len() - 1) % state.ctx.nodes.len();
                                state.refresh();
                            }
                        }
                        KeyCode::Char('/') => {
                            state.mode = Mode::EnterReadKey;
                            state.input.clear();
                        }
                        _ => {}
                    },
                    Mode::EnterReadKey => match key.code {
                        KeyCode::Enter => {
                            let key_text = std::mem::take(&mut state.input);
                            state.mode = Mode::Browse;
                            state.dirty_read(key_text);
                        }
                        KeyCode::Esc => {
                            state.input.clear();
                            state.mode = Mode::Browse;
                        }
                        KeyCode::Backspace => {
                            state.input.pop();
                        }
                        KeyCode::Char(c) => state.input.push(c),
                        _ => {}
                    },
                }
            }
        }
        if state.last_poll.elapsed() > Duration::from_secs(2) {
            state.refresh();
        }
    }
    Ok(())
}

fn draw_ui(terminal: &mut Terminal<CrosstermBackend<std::io::Stdout>>, state: &UiState) -> Result<()> {
    terminal.draw(|frame| {
        let area = frame.size();
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(1), Constraint::Min(0), Constraint::Length(1), Constraint::Length(1)])
            .split(area);

        let title = match state.selected_node() {
            Some(node) => format!("submerge admin -- node {node}"),
            None => "submerge admin -- no nodes".to_string(),
        };
        frame.render_widget(Paragraph::new(title).white().on_blue(), chunks[0]);

        let body = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
            .split(chunks[1]);

        let locks: Vec<ListItem> = match &state.last_debug {
            Some(debug) => debug
                .locks
                .iter()
                .map(|l| ListItem::new(format!("{} -- tag {:?} @ {}ms", l.key, l.tag, l.acquired_ms.0)))
                .collect(),
            None => Vec::new(),
        };
        frame.render_widget(List::new(locks).block(Block::default().borders(Borders::ALL).title("write locks")), body[0]);

        let entries: Vec<ListItem> = match &state.last_debug {
            Some(debug) => debug
                .store
                .iter()
                .map(|e| ListItem::new(format!("{} = {:?} (expires {}ms)", e.key, e.value, e.lease_expiry_ms.0)))
                .collect(),
            None => Vec::new(),
        };
        frame.render_widget(List::new(entries).block(Block::default().borders(Borders::ALL).title("store")), body[1]);

        let help = match state.mode {
            Mode::Browse => "q quit  r refresh  tab/up/down switch node  / dirty read",
            Mode::EnterReadKey => "enter key to read, Enter to submit, Esc to cancel",
        };
        frame.render_widget(Paragraph::new(help), chunks[2]);

        let status_line = match state.mode {
            Mode::Browse => state.status.clone(),
            Mode::EnterReadKey => format!("read key> {}", state.input),
        };
        frame.render_widget(Paragraph::new(status_line), chunks[3]);
    })?;
    Ok(())
}
