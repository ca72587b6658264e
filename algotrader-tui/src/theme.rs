//! Parrot/neon theme tokens for the chart.
//!
//! Neon accents on a near-black background. Up candles are green, down
//! candles hot pink.

use ratatui::style::{Color, Modifier, Style};

use crate::app::StatusLevel;

#[derive(Debug, Clone, Copy)]
pub struct Theme {
    pub background: Color,
    /// Focus, borders, info messages.
    pub accent: Color,
    /// Up candles.
    pub positive: Color,
    /// Down candles and errors.
    pub negative: Color,
    pub warning: Color,
    /// Axis labels and hints.
    pub muted: Color,
    pub text_primary: Color,
}

impl Default for Theme {
    fn default() -> Self {
        Self::parrot_neon()
    }
}

impl Theme {
    pub fn parrot_neon() -> Self {
        Self {
            background: Color::Rgb(18, 18, 20),
            accent: Color::Rgb(0, 255, 255),
            positive: Color::Rgb(0, 255, 128),
            negative: Color::Rgb(255, 20, 147),
            warning: Color::Rgb(255, 140, 0),
            muted: Color::Rgb(100, 149, 237),
            text_primary: Color::White,
        }
    }

    /// Candle color: up (close >= open) is positive.
    pub fn candle_color(&self, open: f64, close: f64) -> Color {
        if close >= open {
            self.positive
        } else {
            self.negative
        }
    }

    pub fn status_style(&self, level: StatusLevel) -> Style {
        match level {
            StatusLevel::Info => Style::default().fg(self.accent),
            StatusLevel::Warning => Style::default().fg(self.warning),
            StatusLevel::Error => Style::default()
                .fg(self.negative)
                .add_modifier(Modifier::BOLD),
        }
    }

    pub fn hint(&self) -> Style {
        Style::default().fg(self.muted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn theme_defaults_to_parrot_neon() {
        let theme = Theme::default();
        assert_eq!(theme.background, Color::Rgb(18, 18, 20));
        assert_eq!(theme.accent, Color::Rgb(0, 255, 255));
    }

    #[test]
    fn flat_candle_counts_as_up() {
        let theme = Theme::default();
        assert_eq!(theme.candle_color(100.0, 101.0), theme.positive);
        assert_eq!(theme.candle_color(100.0, 100.0), theme.positive);
        assert_eq!(theme.candle_color(100.0, 99.0), theme.negative);
    }

    #[test]
    fn errors_are_bold() {
        let theme = Theme::default();
        let style = theme.status_style(StatusLevel::Error);
        assert_eq!(style.fg, Some(theme.negative));
        assert!(style.add_modifier.contains(Modifier::BOLD));
    }
}
