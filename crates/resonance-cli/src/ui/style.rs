//! Prefixed, optionally colored output lines.
//!
//! Every status line starts with a bracketed tag (`[ok]`, `[err]`, `[warn]`,
//! `[info]`, `[hint]` or `[skip]`). Colors are dropped entirely when the
//! [`ColorMode`] disables them, so plain output is stable for tests and pipes.

use owo_colors::{AnsiColors, OwoColorize};

use super::color::ColorMode;

/// Tag printed in front of a status line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Ok,
    Err,
    Warn,
    Info,
    Hint,
    Skip,
}

impl MessageType {
    /// Bracketed tag text.
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Ok => "[ok]",
            Self::Err => "[err]",
            Self::Warn => "[warn]",
            Self::Info => "[info]",
            Self::Hint => "[hint]",
            Self::Skip => "[skip]",
        }
    }

    /// Tag color; `None` renders dimmed.
    fn color(&self) -> Option<AnsiColors> {
        match self {
            Self::Ok => Some(AnsiColors::Green),
            Self::Err => Some(AnsiColors::Red),
            Self::Warn => Some(AnsiColors::Yellow),
            Self::Info => Some(AnsiColors::Blue),
            Self::Hint => Some(AnsiColors::Cyan),
            Self::Skip => None,
        }
    }
}

/// Text decoration applied by [`Style`].
#[derive(Clone, Copy)]
enum Paint {
    Color(AnsiColors),
    Bold,
    Dim,
}

/// Formats CLI output lines for one color mode.
#[derive(Debug, Clone)]
pub struct Style {
    color_mode: ColorMode,
}

impl Style {
    pub fn new(color_mode: ColorMode) -> Self {
        Self { color_mode }
    }

    pub fn color_mode(&self) -> ColorMode {
        self.color_mode
    }

    fn paint(&self, text: &str, paint: Paint) -> String {
        if !self.color_mode.is_enabled() {
            return text.to_string();
        }
        match paint {
            Paint::Color(color) => text.color(color).to_string(),
            Paint::Bold => text.bold().to_string(),
            Paint::Dim => text.dimmed().to_string(),
        }
    }

    /// `[tag] text`.
    pub fn message(&self, kind: MessageType, text: &str) -> String {
        let paint = kind.color().map_or(Paint::Dim, Paint::Color);
        format!("{} {}", self.paint(kind.prefix(), paint), text)
    }

    /// Indented `label: value` line under a status message.
    pub fn message_detail(&self, label: &str, value: &str) -> String {
        format!("     {}: {}", label, value)
    }

    pub fn section(&self, title: &str) -> String {
        self.paint(title, Paint::Bold)
    }

    /// An `[err]` line followed by optional `Cause:` and `Hint:` lines.
    pub fn error_with_context(&self, msg: &str, cause: Option<&str>, hint: Option<&str>) -> String {
        let mut lines = vec![self.message(MessageType::Err, msg)];
        lines.extend(cause.map(|c| format!("      Cause: {}", c)));
        lines.extend(hint.map(|h| format!("      Hint: {}", h)));
        lines.join("\n")
    }

    /// `  + text` (green) or `  - text` (red).
    pub fn list_item(&self, marker: &str, text: &str) -> String {
        let marker = match marker {
            "+" => self.paint(marker, Paint::Color(AnsiColors::Green)),
            "-" => self.paint(marker, Paint::Color(AnsiColors::Red)),
            other => other.to_string(),
        };
        format!("  {} {}", marker, text)
    }

    pub fn key_value(&self, key: &str, value: &str) -> String {
        format!("{}: {}", self.paint(key, Paint::Dim), value)
    }

    pub fn recording(&self, recording: &str) -> String {
        self.paint(recording, Paint::Color(AnsiColors::Yellow))
    }

    pub fn file_path(&self, path: &str) -> String {
        self.paint(path, Paint::Color(AnsiColors::Cyan))
    }

    /// Distance with four decimals.
    pub fn distance(&self, value: f32) -> String {
        self.paint(&format!("{:.4}", value), Paint::Bold)
    }
}
