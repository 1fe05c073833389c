use color_eyre::eyre::Result;
use crossterm::event::{
    self,
    Event,
    KeyCode,
    KeyEvent,
    KeyEventKind,
    KeyModifiers,
};
use crossterm::terminal::{
    disable_raw_mode,
    enable_raw_mode,
};
use ratatui::prelude::*;
use ratatui::widgets::*;
use spin_wager::{
    orchestrator::WagerSnapshot,
    presenter::{
        self,
        Tone,
    },
};
use std::io::{
    Stdout,
    stdout,
};
use tokio::sync::mpsc;
use tracing::warn;

const MAX_AMOUNT_LEN: usize = 32;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UserEvent {
    Quit,
    AmountInput(char),
    AmountBackspace,
    Approve,
    Spin,
    Refresh,
    SwitchNetwork,
    Redraw,
}

/// Everything one frame shows.
pub struct View<'a> {
    pub network: String,
    pub account: String,
    pub symbol: &'a str,
    pub snapshot: &'a WagerSnapshot,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
enum Mode {
    #[default]
    Normal,
    QuitModal,
}

#[derive(Default)]
pub struct UiState {
    mode: Mode,
    terminal: Option<Terminal<CrosstermBackend<Stdout>>>,
}

impl UiState {
    pub fn handle_key(&mut self, key: KeyEvent) -> Option<UserEvent> {
        if key.kind != KeyEventKind::Press {
            return None;
        }
        // raw mode swallows SIGINT
        if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
            return Some(UserEvent::Quit);
        }
        match self.mode {
            Mode::QuitModal => match key.code {
                KeyCode::Char('y') | KeyCode::Char('Y') | KeyCode::Enter => {
                    Some(UserEvent::Quit)
                }
                KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
                    self.mode = Mode::Normal;
                    Some(UserEvent::Redraw)
                }
                _ => None,
            },
            Mode::Normal => match key.code {
                KeyCode::Char(c) if c.is_ascii_digit() || c == '.' => {
                    Some(UserEvent::AmountInput(c))
                }
                KeyCode::Backspace => Some(UserEvent::AmountBackspace),
                KeyCode::Char('a') => Some(UserEvent::Approve),
                KeyCode::Char('s') => Some(UserEvent::Spin),
                KeyCode::Char('r') => Some(UserEvent::Refresh),
                KeyCode::Char('n') => Some(UserEvent::SwitchNetwork),
                KeyCode::Char('q') => {
                    self.mode = Mode::QuitModal;
                    Some(UserEvent::Redraw)
                }
                KeyCode::Esc => Some(UserEvent::Quit),
                _ => None,
            },
        }
    }
}

/// New amount text after an edit key, or `None` if the key does not edit.
pub fn edit_amount(current: &str, event: UserEvent) -> Option<String> {
    match event {
        UserEvent::AmountInput(c) if current.len() < MAX_AMOUNT_LEN => {
            let mut text = current.to_string();
            text.push(c);
            Some(text)
        }
        UserEvent::AmountBackspace => {
            let mut text = current.to_string();
            text.pop();
            Some(text)
        }
        _ => None,
    }
}

/// Reads terminal input on its own thread so slow reads never stall the
/// runtime driving in-flight transactions.
pub fn spawn_input_thread() -> mpsc::UnboundedReceiver<KeyEvent> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        loop {
            match event::read() {
                Ok(Event::Key(key)) => {
                    if tx.send(key).is_err() {
                        break;
                    }
                }
                Ok(_) => {}
                Err(err) => {
                    warn!(%err, "terminal input failed");
                    break;
                }
            }
        }
    });
    rx
}

pub fn terminal_enter(state: &mut UiState) -> Result<()> {
    enable_raw_mode()?;
    crossterm::execute!(stdout(), crossterm::terminal::EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout());
    let terminal = Terminal::new(backend)?;
    state.terminal = Some(terminal);
    Ok(())
}

pub fn terminal_exit() -> Result<()> {
    disable_raw_mode()?;
    crossterm::execute!(stdout(), crossterm::terminal::LeaveAlternateScreen)?;
    Ok(())
}

pub fn draw(state: &mut UiState, view: &View) -> Result<()> {
    let mode = state.mode;
    if let Some(term) = state.terminal.as_mut() {
        term.draw(|f| ui(f, mode, view))?;
    }
    Ok(())
}

fn ui(f: &mut Frame, mode: Mode, view: &View) {
    f.render_widget(Clear, f.area());
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // network + account
            Constraint::Length(6), // facts
            Constraint::Length(3), // bet input
            Constraint::Min(5),    // status
            Constraint::Length(3), // help
        ])
        .split(f.area());

    draw_header(f, chunks[0], view);
    draw_facts(f, chunks[1], view);
    draw_bet(f, chunks[2], view);
    draw_status(f, chunks[3], view);
    draw_help(f, chunks[4]);

    if mode == Mode::QuitModal {
        let area = centered_rect(40, 20, f.area());
        let block = Block::default().borders(Borders::ALL).title("Confirm Quit");
        let p = Paragraph::new("Quit? (Y/N)");
        f.render_widget(Clear, area);
        f.render_widget(block.clone(), area);
        f.render_widget(p, block.inner(area));
    }
}

fn draw_header(f: &mut Frame, area: Rect, view: &View) {
    let color = if view.snapshot.network_eligible {
        Color::Green
    } else {
        Color::Red
    };
    let line = Line::from(vec![
        Span::styled(view.network.clone(), Style::default().fg(color)),
        Span::raw(" | "),
        Span::raw(view.account.clone()),
    ]);
    let p = Paragraph::new(line).block(Block::default().borders(Borders::ALL).title("Spin Wager"));
    f.render_widget(p, area);
}

fn draw_facts(f: &mut Frame, area: Rect, view: &View) {
    let lines: Vec<Line> = presenter::fact_rows(view.snapshot, view.symbol)
        .into_iter()
        .map(|(label, value)| {
            Line::from(vec![
                Span::styled(format!("{label:<12}"), Style::default().fg(Color::DarkGray)),
                Span::raw(value),
            ])
        })
        .collect();
    let title = match view.snapshot.refreshed_at {
        Some(at) => format!("Account (updated {})", at.format("%H:%M:%S")),
        None => "Account".to_string(),
    };
    let p = Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title(title));
    f.render_widget(p, area);
}

fn draw_bet(f: &mut Frame, area: Rect, view: &View) {
    let gates = presenter::action_gates(view.snapshot);
    let button = |label: &'static str, enabled: bool| {
        if enabled {
            Span::styled(label, Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD))
        } else {
            Span::styled(label, Style::default().fg(Color::DarkGray))
        }
    };
    let amount = if view.snapshot.amount_text.is_empty() {
        "_".to_string()
    } else {
        view.snapshot.amount_text.clone()
    };
    let line = Line::from(vec![
        Span::raw("Amount: "),
        Span::styled(amount, Style::default().add_modifier(Modifier::BOLD)),
        Span::raw(format!(" {}    ", view.symbol)),
        button("[a] Approve", gates.approve),
        Span::raw("  "),
        button("[s] Spin", gates.spin),
        Span::raw("  "),
        button("[n] Re-check network", gates.switch_network),
    ]);
    let p = Paragraph::new(line).block(Block::default().borders(Borders::ALL).title("Bet"));
    f.render_widget(p, area);
}

fn draw_status(f: &mut Frame, area: Rect, view: &View) {
    let mut lines: Vec<Line> = presenter::status_lines(view.snapshot, view.symbol)
        .into_iter()
        .map(|line| Line::styled(line.text, tone_style(line.tone)))
        .collect();
    if lines.is_empty() {
        lines.push(Line::styled("Ready", Style::default().fg(Color::DarkGray)));
    }
    let p = Paragraph::new(lines)
        .wrap(Wrap { trim: true })
        .block(Block::default().borders(Borders::ALL).title("Status"));
    f.render_widget(p, area);
}

fn draw_help(f: &mut Frame, area: Rect) {
    let help = Paragraph::new(
        "0-9 . edit amount | Backspace delete | a approve | s spin | r refresh | n re-check network | q quit",
    )
    .block(Block::default().borders(Borders::ALL).title("Help"));
    f.render_widget(help, area);
}

fn tone_style(tone: Tone) -> Style {
    let color = match tone {
        Tone::Info => Color::White,
        Tone::Progress => Color::Cyan,
        Tone::Success => Color::Green,
        Tone::Warning => Color::Yellow,
        Tone::Error => Color::Red,
    };
    Style::default().fg(color)
}

fn centered_rect(w_percent: u16, h_percent: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - h_percent) / 2),
            Constraint::Percentage(h_percent),
            Constraint::Percentage((100 - h_percent) / 2),
        ])
        .split(r);

    let vertical = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - w_percent) / 2),
            Constraint::Percentage(w_percent),
            Constraint::Percentage((100 - w_percent) / 2),
        ])
        .split(popup_layout[1]);

    vertical[1]
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;

    fn press(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn handle_key__maps_actions_and_amount_keys() {
        let mut state = UiState::default();
        assert_eq!(state.handle_key(press(KeyCode::Char('7'))), Some(UserEvent::AmountInput('7')));
        assert_eq!(state.handle_key(press(KeyCode::Char('.'))), Some(UserEvent::AmountInput('.')));
        assert_eq!(state.handle_key(press(KeyCode::Char('a'))), Some(UserEvent::Approve));
        assert_eq!(state.handle_key(press(KeyCode::Char('s'))), Some(UserEvent::Spin));
        assert_eq!(state.handle_key(press(KeyCode::Char('x'))), None);
    }

    #[test]
    fn handle_key__quit_needs_confirmation() {
        // given
        let mut state = UiState::default();

        // when
        let opened = state.handle_key(press(KeyCode::Char('q')));
        let spin_ignored = state.handle_key(press(KeyCode::Char('s')));
        let confirmed = state.handle_key(press(KeyCode::Char('y')));

        // then
        assert_eq!(opened, Some(UserEvent::Redraw));
        assert_eq!(spin_ignored, None);
        assert_eq!(confirmed, Some(UserEvent::Quit));
    }

    #[test]
    fn handle_key__ctrl_c_quits_in_raw_mode() {
        let mut state = UiState::default();
        let key = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);
        assert_eq!(state.handle_key(key), Some(UserEvent::Quit));
    }

    #[test]
    fn edit_amount__appends_and_deletes() {
        assert_eq!(edit_amount("1", UserEvent::AmountInput('.')), Some("1.".to_string()));
        assert_eq!(edit_amount("1.5", UserEvent::AmountBackspace), Some("1.".to_string()));
        assert_eq!(edit_amount("", UserEvent::AmountBackspace), Some(String::new()));
        assert_eq!(edit_amount("1", UserEvent::Spin), None);
        let long = "9".repeat(MAX_AMOUNT_LEN);
        assert_eq!(edit_amount(&long, UserEvent::AmountInput('9')), None);
    }
}
