//! Top-level layout: candle chart over a one-line status bar.

use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::text::{Line, Span};
use ratatui::widgets::Paragraph;
use ratatui::Frame;

use crate::app::{ChartApp, View};
use crate::panels::CandleChartPanel;
use crate::theme::Theme;

const HINTS: &str = " /:symbol t/T:timeframe [/]:day r:reset q:quit";

pub fn draw(f: &mut Frame, app: &ChartApp, theme: &Theme) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(3), Constraint::Length(1)])
        .split(f.area());

    let title = chart_title(app);
    let chart = CandleChartPanel::new(app.visible_bars(), &title, theme);
    f.render_widget(chart, chunks[0]);
    render_status(f, chunks[1], app, theme);
}

fn chart_title(app: &ChartApp) -> String {
    match app.view {
        View::Full => format!("{} {}", app.symbol, app.timeframe()),
        View::Day(day) => format!(
            "{} {} {}",
            app.symbol,
            app.timeframe(),
            day.format("%Y-%m-%d")
        ),
    }
}

fn render_status(f: &mut Frame, area: Rect, app: &ChartApp, theme: &Theme) {
    let line = match &app.search {
        Some(query) => Line::from(vec![
            Span::styled(" symbol: ", theme.hint()),
            Span::raw(format!("{query}_")),
        ]),
        None => {
            let mut spans = vec![Span::styled(HINTS, theme.hint())];
            if let Some((msg, level)) = &app.status {
                spans.push(Span::raw(" | "));
                spans.push(Span::styled(msg.as_str(), theme.status_style(*level)));
            }
            Line::from(spans)
        }
    };
    f.render_widget(Paragraph::new(line), area);
}
