// src/tui/mod.rs
pub mod render;

use crate::core::filter::SharedCache;
use crate::core::stats::RollingTradeStats;
use crate::core::subscriptions::SubscriptionHandle;
use crate::types::{AssetStat, Emphasis, FeedRow, TickerSnapshot, Tone, UiEvent};
use crate::utils::format::{pair_quote, pair_symbol};
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Clear, Paragraph, Row, Table, TableState, Wrap},
    Frame, Terminal,
};
use render::{detail_text, momentum_chart, trend_bar, NOT_ENOUGH_DATA};
use std::{io, time::Duration};
use tokio::sync::{mpsc, watch};
use tracing::info;

const MAX_ROWS: usize = 1000;
const PAGE: usize = 10;
const MIN_WIDTH: u16 = 64;
const MIN_HEIGHT: u16 = 22;
const INPUT_MAX: usize = 10;

const NOT_ENOUGH_TRADES: &str = "Not enough trades, subscribe to a pair with \\";
const DETAILS_HINT: &str = "Press Enter to select a pair,\nthen Enter again to show details";
const HELP: &str = "j/k, Up/Down    move\n\
                    PgUp/PgDn      page\n\
                    g/G            first/last row\n\
                    Enter          select mode / show details\n\
                    Esc            leave select mode\n\
                    \\              subscribe to the selected pair\n\
                    /              subscribe to any base asset\n\
                    u              unsubscribe the selected pair\n\
                    U              unsubscribe all\n\
                    h/H            this help\n\
                    q, Ctrl-C      quit";

/// Handles the terminal needs to reach back into the core.
pub struct TuiContext {
    pub subscriptions: SubscriptionHandle,
    pub selection: watch::Sender<Option<String>>,
    pub cache: SharedCache,
    pub quotes: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Browse,
    Select,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Popup {
    None,
    /// Quote chooser for `base`; the last choice is "Close".
    Subscribe { base: String, choice: usize },
    Input(String),
    Help,
}

/// What a key press asks the rest of the program to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Subscribe { base: String, quote: String },
    Unsubscribe(String),
    UnsubscribeAll,
    ShowDetail(String),
    Quit,
}

pub struct App {
    rows: Vec<FeedRow>,
    table: TableState,
    mode: Mode,
    popup: Popup,
    quotes: Vec<String>,
    trend: RollingTradeStats,
    trend_text: String,
    momentum: Vec<AssetStat>,
    momentum_text: String,
    block_buy_share: Option<f64>,
    detail: Option<(String, TickerSnapshot)>,
    status: String,
}

impl App {
    pub fn new(quotes: Vec<String>) -> Self {
        Self {
            rows: Vec::new(),
            table: TableState::default(),
            mode: Mode::Browse,
            popup: Popup::None,
            quotes,
            trend: RollingTradeStats::default(),
            trend_text: NOT_ENOUGH_TRADES.to_string(),
            momentum: Vec::new(),
            momentum_text: NOT_ENOUGH_DATA.to_string(),
            block_buy_share: None,
            detail: None,
            status: String::new(),
        }
    }

    pub fn on_event(&mut self, event: UiEvent) {
        match event {
            UiEvent::Feed(row) => {
                // newest on top; keep the selected row under the cursor
                self.rows.insert(0, row);
                self.rows.truncate(MAX_ROWS);
                if let Some(i) = self.table.selected() {
                    self.table
                        .select(Some((i + 1).min(self.rows.len().saturating_sub(1))));
                }
            }
            UiEvent::Trend(stats) => self.trend = stats,
            UiEvent::Momentum {
                rows,
                block_buy_share,
            } => {
                self.momentum = rows;
                self.block_buy_share = block_buy_share;
            }
            UiEvent::Detail { symbol, ticker } => {
                if matches!(&self.detail, Some((current, _)) if *current == symbol) {
                    self.detail = Some((symbol, ticker));
                }
            }
            UiEvent::Status(text) => self.status = text,
        }
    }

    /// Re-renders the trend and momentum text for the given pane widths.
    /// Empty renders keep the previous text.
    fn update_texts(&mut self, trend_width: usize, momentum_width: usize) {
        let trend = trend_bar(trend_width, &self.trend);
        if !trend.is_empty() {
            self.trend_text = trend;
        }
        let momentum = momentum_chart(momentum_width, &self.momentum);
        if !momentum.is_empty() {
            self.momentum_text = momentum;
        }
    }

    fn selected_row(&self) -> Option<&FeedRow> {
        self.table.selected().and_then(|i| self.rows.get(i))
    }

    fn move_by(&mut self, delta: isize) {
        if self.rows.is_empty() {
            return;
        }
        let last = self.rows.len() as isize - 1;
        let current = self.table.selected().unwrap_or(0) as isize;
        self.table.select(Some((current + delta).clamp(0, last) as usize));
    }

    pub fn on_key(&mut self, key: KeyEvent) -> Option<Action> {
        if key.kind != KeyEventKind::Press {
            return None;
        }
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            return Some(Action::Quit);
        }

        match std::mem::replace(&mut self.popup, Popup::None) {
            Popup::Help => None,
            Popup::Input(buffer) => self.on_input_key(buffer, key),
            Popup::Subscribe { base, choice } => self.on_subscribe_key(base, choice, key),
            Popup::None => self.on_browse_key(key),
        }
    }

    fn on_input_key(&mut self, mut buffer: String, key: KeyEvent) -> Option<Action> {
        match key.code {
            KeyCode::Esc => {}
            KeyCode::Enter => {
                if !buffer.is_empty() {
                    self.popup = Popup::Subscribe {
                        base: buffer.to_uppercase(),
                        choice: 0,
                    };
                }
            }
            KeyCode::Backspace => {
                buffer.pop();
                self.popup = Popup::Input(buffer);
            }
            KeyCode::Char(c) if c.is_ascii_alphanumeric() => {
                if buffer.len() < INPUT_MAX {
                    buffer.push(c);
                }
                self.popup = Popup::Input(buffer);
            }
            _ => self.popup = Popup::Input(buffer),
        }
        None
    }

    fn on_subscribe_key(&mut self, base: String, choice: usize, key: KeyEvent) -> Option<Action> {
        let options = self.quotes.len() + 1;
        match key.code {
            KeyCode::Esc => None,
            KeyCode::Enter => self.quotes.get(choice).map(|quote| Action::Subscribe {
                base,
                quote: quote.clone(),
            }),
            KeyCode::Left | KeyCode::Char('h') | KeyCode::BackTab => {
                self.popup = Popup::Subscribe {
                    base,
                    choice: (choice + options - 1) % options,
                };
                None
            }
            KeyCode::Right | KeyCode::Char('l') | KeyCode::Tab => {
                self.popup = Popup::Subscribe {
                    base,
                    choice: (choice + 1) % options,
                };
                None
            }
            _ => {
                self.popup = Popup::Subscribe { base, choice };
                None
            }
        }
    }

    fn on_browse_key(&mut self, key: KeyEvent) -> Option<Action> {
        match key.code {
            KeyCode::Char('q') => return Some(Action::Quit),
            KeyCode::Char('j') | KeyCode::Down => self.move_by(1),
            KeyCode::Char('k') | KeyCode::Up => self.move_by(-1),
            KeyCode::PageDown => self.move_by(PAGE as isize),
            KeyCode::PageUp => self.move_by(-(PAGE as isize)),
            KeyCode::Char('g') | KeyCode::Home => self.move_by(isize::MIN / 2),
            KeyCode::Char('G') | KeyCode::End => self.move_by(isize::MAX / 2),
            KeyCode::Char('h') | KeyCode::Char('H') => self.popup = Popup::Help,
            KeyCode::Char('/') => self.popup = Popup::Input(String::new()),
            KeyCode::Char('U') => return Some(Action::UnsubscribeAll),
            KeyCode::Esc => {
                self.mode = Mode::Browse;
                self.table.select(None);
            }
            KeyCode::Enter => match self.mode {
                Mode::Browse => {
                    self.mode = Mode::Select;
                    if self.table.selected().is_none() && !self.rows.is_empty() {
                        self.table.select(Some(0));
                    }
                }
                Mode::Select => {
                    let symbol = pair_symbol(&self.selected_row()?.symbol);
                    self.detail = Some((symbol.clone(), TickerSnapshot::default()));
                    return Some(Action::ShowDetail(symbol));
                }
            },
            KeyCode::Char('\\') => {
                let row = self.selected_row()?;
                let base = row.symbol.split('/').next().unwrap_or_default().to_string();
                let choice = pair_quote(&row.symbol)
                    .and_then(|quote| self.quotes.iter().position(|q| q == quote))
                    .unwrap_or(0);
                self.popup = Popup::Subscribe { base, choice };
            }
            KeyCode::Char('u') => {
                let symbol = pair_symbol(&self.selected_row()?.symbol);
                return Some(Action::Unsubscribe(symbol));
            }
            _ => {}
        }
        None
    }
}

fn dispatch(app: &mut App, ctx: &TuiContext, action: Action) {
    match action {
        Action::Subscribe { base, quote } => ctx.subscriptions.subscribe(&base, &quote),
        Action::Unsubscribe(symbol) => ctx.subscriptions.unsubscribe(&symbol),
        Action::UnsubscribeAll => ctx.subscriptions.unsubscribe_all(),
        Action::ShowDetail(symbol) => {
            let cached = ctx.cache.read().ticker(&symbol).cloned();
            if let Some(ticker) = cached {
                app.detail = Some((symbol.clone(), ticker));
            }
            ctx.selection.send_replace(Some(symbol));
        }
        Action::Quit => {}
    }
}

fn restore_terminal() -> io::Result<()> {
    disable_raw_mode()?;
    execute!(io::stdout(), LeaveAlternateScreen)
}

pub async fn run(mut rx: mpsc::Receiver<UiEvent>, ctx: TuiContext) -> anyhow::Result<()> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic| {
        let _ = restore_terminal();
        default_hook(panic);
    }));

    let mut app = App::new(ctx.quotes.clone());

    loop {
        let subscriptions = ctx.subscriptions.active();
        terminal.draw(|f| ui(f, &mut app, &subscriptions))?;

        if event::poll(Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                match app.on_key(key) {
                    Some(Action::Quit) => break,
                    Some(action) => dispatch(&mut app, &ctx, action),
                    None => {}
                }
            }
        }

        while let Ok(event) = rx.try_recv() {
            app.on_event(event);
        }
    }

    info!("Terminal closed by user");
    restore_terminal()?;
    terminal.show_cursor()?;

    Ok(())
}

fn row_style(tone: Tone, emphasis: Emphasis) -> Style {
    let color = match tone {
        Tone::Rise => Color::Green,
        Tone::Fall => Color::Red,
        Tone::Maker => Color::Yellow,
        Tone::Taker => Color::Blue,
        Tone::Neutral => Color::White,
    };
    let style = Style::default().fg(color);
    match emphasis {
        Emphasis::Plain => style,
        Emphasis::Underline => style.add_modifier(Modifier::UNDERLINED),
        Emphasis::Bold => style.add_modifier(Modifier::BOLD),
        Emphasis::BoldUnderline => style.add_modifier(Modifier::BOLD | Modifier::UNDERLINED),
    }
}

/// Colours the maker cells green and the taker cells red around `[NN%]`.
fn trend_line(text: &str) -> Line<'_> {
    match (text.find('['), text.find(']')) {
        (Some(open), Some(close)) if open < close => Line::from(vec![
            Span::styled(&text[..open], Style::default().fg(Color::Green)),
            Span::raw(&text[open..=close]),
            Span::styled(&text[close + 1..], Style::default().fg(Color::Red)),
        ]),
        _ => Line::from(text),
    }
}

fn centered(width: u16, height: u16, area: Rect) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    Rect::new(
        area.x + (area.width - width) / 2,
        area.y + (area.height - height) / 2,
        width,
        height,
    )
}

fn ui(f: &mut Frame, app: &mut App, subscriptions: &[String]) {
    let size = f.size();
    if size.width < MIN_WIDTH || size.height < MIN_HEIGHT {
        let notice = Paragraph::new(format!(
            "Terminal too small: {}x{}, need {}x{}",
            size.width, size.height, MIN_WIDTH, MIN_HEIGHT
        ))
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true });
        f.render_widget(notice, size);
        return;
    }

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(9),
            Constraint::Length(3),
            Constraint::Min(6),
        ])
        .split(size);
    let top = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
        .split(rows[0]);

    // inner widths, minus borders
    app.update_texts(
        rows[1].width.saturating_sub(2) as usize,
        top[0].width.saturating_sub(2) as usize,
    );

    let momentum_title = match app.block_buy_share {
        Some(share) => format!("Momentum (block buys {:.0}%)", share * 100.0),
        None => "Momentum".to_string(),
    };
    let momentum = Paragraph::new(app.momentum_text.as_str())
        .block(Block::default().borders(Borders::ALL).title(momentum_title));
    f.render_widget(momentum, top[0]);

    let detail = match &app.detail {
        Some((symbol, ticker)) => detail_text(symbol, ticker),
        None => DETAILS_HINT.to_string(),
    };
    let detail = Paragraph::new(detail)
        .block(Block::default().borders(Borders::ALL).title("Details"))
        .wrap(Wrap { trim: true });
    f.render_widget(detail, top[1]);

    let trend_title = if subscriptions.is_empty() {
        "Trade Trend".to_string()
    } else {
        format!("Trade Trend ({})", subscriptions.join(" "))
    };
    let trend = Paragraph::new(trend_line(&app.trend_text))
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::ALL).title(trend_title));
    f.render_widget(trend, rows[1]);

    let feed_title = if app.status.is_empty() {
        "Live Feed".to_string()
    } else {
        format!("Live Feed | {}", app.status)
    };
    let header = Row::new(vec!["Event", "Period", "Pair", "Amount", "Change", "24H", "Price"])
        .style(Style::default().add_modifier(Modifier::BOLD));
    let table_rows: Vec<Row> = app
        .rows
        .iter()
        .map(|r| {
            Row::new(vec![
                Cell::from(r.label.as_str()),
                Cell::from(r.period.as_str()),
                Cell::from(r.symbol.as_str()),
                Cell::from(r.amount.as_str()),
                Cell::from(r.percent.as_str()),
                Cell::from(r.change_24h.as_str()),
                Cell::from(r.price.as_str()),
            ])
            .style(row_style(r.tone, r.emphasis))
        })
        .collect();
    let widths = [
        Constraint::Length(18),
        Constraint::Length(6),
        Constraint::Length(12),
        Constraint::Length(12),
        Constraint::Length(9),
        Constraint::Length(10),
        Constraint::Min(10),
    ];
    let highlight = match app.mode {
        Mode::Select => Style::default().add_modifier(Modifier::REVERSED),
        Mode::Browse => Style::default(),
    };
    let table = Table::new(table_rows, widths)
        .header(header)
        .block(Block::default().borders(Borders::ALL).title(feed_title))
        .highlight_style(highlight);
    f.render_stateful_widget(table, rows[2], &mut app.table);

    match &app.popup {
        Popup::None => {}
        Popup::Help => {
            let area = centered(60, 15, size);
            f.render_widget(Clear, area);
            f.render_widget(
                Paragraph::new(HELP).block(Block::default().borders(Borders::ALL).title("Help")),
                area,
            );
        }
        Popup::Input(buffer) => {
            let area = centered(30, 3, size);
            f.render_widget(Clear, area);
            f.render_widget(
                Paragraph::new(format!("{}_", buffer)).block(
                    Block::default()
                        .borders(Borders::ALL)
                        .title("Enter an asset to track"),
                ),
                area,
            );
        }
        Popup::Subscribe { base, choice } => {
            let mut buttons: Vec<Span> = Vec::new();
            let labels = app.quotes.iter().map(String::as_str).chain(["Close"]);
            for (i, label) in labels.enumerate() {
                let style = if i == *choice {
                    Style::default().add_modifier(Modifier::REVERSED)
                } else {
                    Style::default()
                };
                buttons.push(Span::styled(format!(" {} ", label), style));
                buttons.push(Span::raw(" "));
            }
            let text = vec![
                Line::from("Subscribe to trades feed"),
                Line::from(format!("Choose a quote asset for {}", base)),
                Line::from(""),
                Line::from(buttons),
            ];
            let area = centered(50, 6, size);
            f.render_widget(Clear, area);
            f.render_widget(
                Paragraph::new(text)
                    .alignment(Alignment::Center)
                    .block(Block::default().borders(Borders::ALL).title("Subscribe")),
                area,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Emphasis, Tone};

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn row(symbol: &str) -> FeedRow {
        FeedRow {
            label: "Large Buy".to_string(),
            period: String::new(),
            symbol: symbol.to_string(),
            amount: "1.00".to_string(),
            percent: String::new(),
            change_24h: "0.00 %".to_string(),
            price: "1".to_string(),
            tone: Tone::Rise,
            emphasis: Emphasis::Plain,
        }
    }

    fn app_with_rows() -> App {
        let mut app = App::new(vec!["USDT".into(), "BTC".into(), "BNB".into()]);
        app.on_event(UiEvent::Feed(row("ADA/BTC")));
        app.on_event(UiEvent::Feed(row("DOT/USDT")));
        app
    }

    #[test]
    fn test_newest_row_on_top() {
        let app = app_with_rows();
        assert_eq!(app.rows[0].symbol, "DOT/USDT");
        assert_eq!(app.rows.len(), 2);
    }

    #[test]
    fn test_select_then_show_detail() {
        let mut app = app_with_rows();
        assert_eq!(app.on_key(key(KeyCode::Enter)), None);
        assert_eq!(app.on_key(key(KeyCode::Char('j'))), None);
        assert_eq!(
            app.on_key(key(KeyCode::Enter)),
            Some(Action::ShowDetail("ADABTC".into()))
        );

        app.on_event(UiEvent::Detail {
            symbol: "ADABTC".into(),
            ticker: TickerSnapshot {
                last_price: 0.00001,
                ..TickerSnapshot::default()
            },
        });
        assert_eq!(app.detail.as_ref().unwrap().1.last_price, 0.00001);
    }

    #[test]
    fn test_selection_follows_inserted_rows() {
        let mut app = app_with_rows();
        app.on_key(key(KeyCode::Enter));
        app.on_key(key(KeyCode::Char('G')));
        assert_eq!(app.selected_row().unwrap().symbol, "ADA/BTC");

        app.on_event(UiEvent::Feed(row("XRP/USDT")));
        assert_eq!(app.selected_row().unwrap().symbol, "ADA/BTC");
    }

    #[test]
    fn test_subscribe_dialog_preselects_row_quote() {
        let mut app = app_with_rows();
        app.on_key(key(KeyCode::Enter));
        app.on_key(key(KeyCode::Char('G')));
        assert_eq!(app.on_key(key(KeyCode::Char('\\'))), None);
        assert_eq!(
            app.popup,
            Popup::Subscribe {
                base: "ADA".into(),
                choice: 1
            }
        );
        assert_eq!(
            app.on_key(key(KeyCode::Enter)),
            Some(Action::Subscribe {
                base: "ADA".into(),
                quote: "BTC".into()
            })
        );
        assert_eq!(app.popup, Popup::None);
    }

    #[test]
    fn test_subscribe_dialog_close_button() {
        let mut app = app_with_rows();
        app.on_key(key(KeyCode::Char('/')));
        for c in "sol".chars() {
            app.on_key(key(KeyCode::Char(c)));
        }
        app.on_key(key(KeyCode::Enter));
        // wrap left from the first quote onto "Close"
        app.on_key(key(KeyCode::Left));
        assert_eq!(app.on_key(key(KeyCode::Enter)), None);
        assert_eq!(app.popup, Popup::None);
    }

    #[test]
    fn test_input_form_subscribes_any_base() {
        let mut app = App::new(vec!["USDT".into()]);
        app.on_key(key(KeyCode::Char('/')));
        for c in "adx".chars() {
            app.on_key(key(KeyCode::Char(c)));
        }
        app.on_key(key(KeyCode::Backspace));
        app.on_key(key(KeyCode::Char('a')));
        app.on_key(key(KeyCode::Enter));
        assert_eq!(
            app.on_key(key(KeyCode::Enter)),
            Some(Action::Subscribe {
                base: "ADA".into(),
                quote: "USDT".into()
            })
        );
    }

    #[test]
    fn test_unsubscribe_keys() {
        let mut app = app_with_rows();
        // nothing selected yet
        assert_eq!(app.on_key(key(KeyCode::Char('u'))), None);
        app.on_key(key(KeyCode::Enter));
        assert_eq!(
            app.on_key(key(KeyCode::Char('u'))),
            Some(Action::Unsubscribe("DOTUSDT".into()))
        );
        assert_eq!(app.on_key(key(KeyCode::Char('U'))), Some(Action::UnsubscribeAll));
    }

    #[test]
    fn test_quit_and_help() {
        let mut app = App::new(Vec::new());
        app.on_key(key(KeyCode::Char('h')));
        // any key closes help without quitting
        assert_eq!(app.on_key(key(KeyCode::Char('q'))), None);
        assert_eq!(app.on_key(key(KeyCode::Char('q'))), Some(Action::Quit));
        assert_eq!(
            app.on_key(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL)),
            Some(Action::Quit)
        );
    }

    #[test]
    fn test_empty_render_keeps_previous_text() {
        let mut app = App::new(Vec::new());
        app.update_texts(40, 40);
        assert_eq!(app.trend_text, NOT_ENOUGH_TRADES);

        app.on_event(UiEvent::Trend(RollingTradeStats {
            maker: 3.0,
            taker: 1.0,
            count: 20,
        }));
        app.update_texts(40, 40);
        assert!(app.trend_text.contains("[75%]"));

        app.on_event(UiEvent::Trend(RollingTradeStats::default()));
        app.update_texts(40, 40);
        assert!(app.trend_text.contains("[75%]"));
    }

    #[test]
    fn test_trend_line_colours_both_sides() {
        let line = trend_line("▓▓[50%]▓▓");
        assert_eq!(line.spans.len(), 3);
        assert_eq!(line.spans[1].content, "[50%]");
        assert_eq!(line.spans[0].style.fg, Some(Color::Green));
        assert_eq!(line.spans[2].style.fg, Some(Color::Red));
    }
}
