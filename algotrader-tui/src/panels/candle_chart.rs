//! Candle chart panel - OHLC candles drawn with direct buffer writes.
//!
//! - Each candle = 1 terminal column; wider ranges merge neighbouring bars
//! - Body: block char, green if close >= open, pink otherwise
//! - Wicks: vertical line chars to high/low
//! - Bottom row: first and last visible bar time

use chrono::{DateTime, Utc};
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::Style,
    widgets::{Block, Borders, Widget},
};

use algotrader_core::domain::Bar;

use crate::theme::Theme;

/// One drawn column.
#[derive(Debug, Clone, PartialEq)]
pub struct Candle {
    pub time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

/// Merge `bars` into at most `width` candles, oldest first. Each candle covers
/// `ceil(len / width)` consecutive bars.
pub fn fit_columns(bars: &[Bar], width: usize) -> Vec<Candle> {
    if bars.is_empty() || width == 0 {
        return Vec::new();
    }
    let per_column = bars.len().div_ceil(width);
    bars.chunks(per_column)
        .filter_map(|chunk| {
            let (first, last) = (chunk.first()?, chunk.last()?);
            Some(Candle {
                time: first.timestamp,
                open: first.open,
                high: chunk.iter().map(|b| b.high).fold(f64::NEG_INFINITY, f64::max),
                low: chunk.iter().map(|b| b.low).fold(f64::INFINITY, f64::min),
                close: last.close,
            })
        })
        .collect()
}

pub struct CandleChartPanel<'a> {
    bars: &'a [Bar],
    title: &'a str,
    theme: &'a Theme,
}

impl<'a> CandleChartPanel<'a> {
    pub fn new(bars: &'a [Bar], title: &'a str, theme: &'a Theme) -> Self {
        Self { bars, title, theme }
    }

    /// Map a price to a Y position in the plot area (0 = top)
    fn price_to_y(price: f64, y_min: f64, y_max: f64, plot_height: u16) -> u16 {
        if (y_max - y_min).abs() < 1e-9 || plot_height == 0 {
            return 0;
        }
        let frac = (price - y_min) / (y_max - y_min);
        let y = plot_height.saturating_sub(1) as f64 * (1.0 - frac);
        y.round().max(0.0).min(plot_height.saturating_sub(1) as f64) as u16
    }
}

impl Widget for CandleChartPanel<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        if self.bars.is_empty() {
            Block::default()
                .title(format!(" {} [No Data] ", self.title))
                .borders(Borders::ALL)
                .border_style(Style::default().fg(self.theme.muted))
                .style(Style::default().bg(self.theme.background))
                .render(area, buf);
            return;
        }

        let up_count = self.bars.iter().filter(|b| b.close >= b.open).count();
        let title = format!(
            " {} | {} bars | {} up {} down ",
            self.title,
            self.bars.len(),
            up_count,
            self.bars.len() - up_count,
        );
        let block = Block::default()
            .title(title)
            .borders(Borders::ALL)
            .border_style(Style::default().fg(self.theme.accent))
            .style(Style::default().bg(self.theme.background));
        let inner = block.inner(area);
        block.render(area, buf);

        // Left margin for price labels, bottom row for times.
        let label_width: u16 = 10;
        let plot_left = inner.x + label_width;
        let plot_top = inner.y;
        let plot_width = inner.width.saturating_sub(label_width);
        let plot_height = inner.height.saturating_sub(1);
        if plot_width == 0 || plot_height == 0 {
            return;
        }

        let candles = fit_columns(self.bars, plot_width as usize);
        let y_min = candles.iter().map(|c| c.low).fold(f64::INFINITY, f64::min);
        let y_max = candles.iter().map(|c| c.high).fold(f64::NEG_INFINITY, f64::max);
        let range = y_max - y_min;
        let pad = if range > 0.0 { range * 0.05 } else { 1.0 };
        let (y_lower, y_upper) = (y_min - pad, y_max + pad);

        let labels = [y_upper, (y_upper + y_lower) / 2.0, y_lower];
        let rows = [0u16, plot_height / 2, plot_height.saturating_sub(1)];
        for (value, row) in labels.iter().zip(rows) {
            buf.set_string(
                inner.x,
                plot_top + row,
                format!("{value:>9.2}"),
                self.theme.hint(),
            );
        }

        for (i, candle) in candles.iter().enumerate() {
            let x = plot_left + i as u16;
            if x >= inner.right() {
                break;
            }
            let style = Style::default().fg(self.theme.candle_color(candle.open, candle.close));
            let y = |price: f64| Self::price_to_y(price, y_lower, y_upper, plot_height);
            let high_y = y(candle.high);
            let low_y = y(candle.low);
            let body_top = y(candle.open.max(candle.close));
            let body_bottom = y(candle.open.min(candle.close));

            for row in high_y..body_top {
                buf.set_string(x, plot_top + row, "│", style);
            }
            let body = if candle.close >= candle.open { "█" } else { "▓" };
            for row in body_top..=body_bottom {
                buf.set_string(x, plot_top + row, body, style);
            }
            for row in (body_bottom + 1)..=low_y {
                buf.set_string(x, plot_top + row, "│", style);
            }
        }

        let time_row = plot_top + plot_height;
        if let (Some(first), Some(last)) = (candles.first(), candles.last()) {
            let left = first.time.format("%Y-%m-%d %H:%M").to_string();
            let right = last.time.format("%Y-%m-%d %H:%M").to_string();
            buf.set_string(plot_left, time_row, &left, self.theme.hint());
            let right_x = inner.right().saturating_sub(right.len() as u16);
            if right_x > plot_left + left.len() as u16 {
                buf.set_string(right_x, time_row, &right, self.theme.hint());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn bars(closes: &[(f64, f64)]) -> Vec<Bar> {
        let t0 = Utc.with_ymd_and_hms(2025, 1, 7, 0, 0, 0).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, &(open, close))| {
                Bar::new(
                    t0 + Duration::hours(i as i64),
                    open,
                    open.max(close) + 1.0,
                    open.min(close) - 1.0,
                    close,
                    1.0,
                )
            })
            .collect()
    }

    fn render(bars: &[Bar], width: u16, height: u16) -> String {
        let theme = Theme::default();
        let area = Rect::new(0, 0, width, height);
        let mut buf = Buffer::empty(area);
        CandleChartPanel::new(bars, "XAUUSD 1h", &theme).render(area, &mut buf);
        let mut content = String::new();
        for y in 0..area.height {
            for x in 0..area.width {
                content.push_str(buf.cell((x, y)).unwrap().symbol());
            }
            content.push('\n');
        }
        content
    }

    #[test]
    fn title_counts_up_and_down_candles() {
        let data = bars(&[(100.0, 101.0), (101.0, 100.5), (100.5, 103.0)]);
        let content = render(&data, 60, 16);
        assert!(content.contains("XAUUSD 1h | 3 bars | 2 up 1 down"));
        assert!(content.contains('█'));
        assert!(content.contains('▓'));
    }

    #[test]
    fn bottom_row_shows_time_span() {
        let data = bars(&[(100.0, 101.0), (101.0, 102.0), (102.0, 101.0)]);
        let content = render(&data, 80, 12);
        assert!(content.contains("2025-01-07 00:00"));
        assert!(content.contains("2025-01-07 02:00"));
    }

    #[test]
    fn empty_chart_says_no_data() {
        let content = render(&[], 40, 10);
        assert!(content.contains("XAUUSD 1h [No Data]"));
    }

    #[test]
    fn tiny_area_does_not_panic() {
        let data = bars(&[(100.0, 101.0)]);
        render(&data, 5, 3);
        render(&data, 12, 2);
    }

    #[test]
    fn fit_columns_merges_to_width() {
        let data = bars(&[(1.0, 2.0), (2.0, 3.0), (3.0, 2.5), (2.5, 4.0), (4.0, 3.0)]);
        let candles = fit_columns(&data, 2);
        assert_eq!(candles.len(), 2);
        assert_eq!(candles[0].open, 1.0);
        assert_eq!(candles[0].close, 2.5);
        assert_eq!(candles[0].high, 4.0);
        assert_eq!(candles[0].low, 0.0);
        assert_eq!(candles[1].time, data[3].timestamp);
        assert_eq!(candles[1].close, 3.0);

        assert_eq!(fit_columns(&data, 10).len(), 5);
        assert!(fit_columns(&data, 0).is_empty());
    }
}
