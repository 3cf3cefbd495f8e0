//! Display sinks for session output
//!
//! A session does not know where its output goes; it appends styled spans
//! to a [`DisplaySink`]. The CLI renders to the terminal through
//! [`StdoutSink`]; tests and embedders capture output with [`MemorySink`].

use crate::ansi::{AnsiColor, StyledSpan};
use crossterm::style::{Attribute, Color, ContentStyle};
use std::io::Write;
use std::sync::Mutex;

/// Destination for post-processed session output
pub trait DisplaySink: Send + Sync {
    /// Append styled spans to the display
    fn append(&self, spans: &[StyledSpan]);

    /// Clear the display
    fn clear(&self);
}

/// Sink rendering styled spans to the terminal
#[derive(Debug, Default)]
pub struct StdoutSink;

impl StdoutSink {
    pub fn new() -> Self {
        Self
    }
}

impl DisplaySink for StdoutSink {
    fn append(&self, spans: &[StyledSpan]) {
        let mut stdout = std::io::stdout().lock();
        for span in spans {
            let mut style = ContentStyle::new();
            if let Some(fg) = span.style.fg {
                style.foreground_color = Some(to_crossterm(fg));
            }
            if span.style.bold {
                style.attributes.set(Attribute::Bold);
            }
            if span.style.italic {
                style.attributes.set(Attribute::Italic);
            }
            if span.style.underline {
                style.attributes.set(Attribute::Underlined);
            }
            let _ = write!(stdout, "{}", style.apply(&span.text));
        }
        let _ = stdout.flush();
    }

    fn clear(&self) {
        let mut stdout = std::io::stdout().lock();
        let _ = crossterm::execute!(
            stdout,
            crossterm::terminal::Clear(crossterm::terminal::ClearType::All)
        );
    }
}

/// Sink capturing spans in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    spans: Mutex<Vec<StyledSpan>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All captured spans
    pub fn spans(&self) -> Vec<StyledSpan> {
        self.spans.lock().unwrap().clone()
    }

    /// Captured text with styling discarded
    pub fn text(&self) -> String {
        self.spans
            .lock()
            .unwrap()
            .iter()
            .map(|s| s.text.as_str())
            .collect()
    }
}

impl DisplaySink for MemorySink {
    fn append(&self, spans: &[StyledSpan]) {
        self.spans.lock().unwrap().extend_from_slice(spans);
    }

    fn clear(&self) {
        self.spans.lock().unwrap().clear();
    }
}

fn to_crossterm(color: AnsiColor) -> Color {
    match color {
        AnsiColor::Black => Color::Black,
        AnsiColor::Red => Color::DarkRed,
        AnsiColor::Green => Color::DarkGreen,
        AnsiColor::Yellow => Color::DarkYellow,
        AnsiColor::Blue => Color::DarkBlue,
        AnsiColor::Magenta => Color::DarkMagenta,
        AnsiColor::Cyan => Color::DarkCyan,
        AnsiColor::White => Color::Grey,
        AnsiColor::BrightBlack => Color::DarkGrey,
        AnsiColor::BrightRed => Color::Red,
        AnsiColor::BrightGreen => Color::Green,
        AnsiColor::BrightYellow => Color::Yellow,
        AnsiColor::BrightBlue => Color::Blue,
        AnsiColor::BrightMagenta => Color::Magenta,
        AnsiColor::BrightCyan => Color::Cyan,
        AnsiColor::BrightWhite => Color::White,
    }
}
