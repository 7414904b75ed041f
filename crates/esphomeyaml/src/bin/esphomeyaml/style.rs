//! Status lines for the terminal.
//!
//! Color is only used when the stream the text goes to is a terminal and
//! `NO_COLOR` is unset.

use std::io::IsTerminal;

use owo_colors::{AnsiColors, OwoColorize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Success,
    Warning,
    Error,
    Accent,
}

impl Tone {
    fn color(self) -> AnsiColors {
        match self {
            Tone::Success => AnsiColors::Green,
            Tone::Warning => AnsiColors::Yellow,
            Tone::Error => AnsiColors::Red,
            Tone::Accent => AnsiColors::Cyan,
        }
    }
}

fn paint(tone: Tone, text: &str, colored: bool) -> String {
    if colored {
        text.color(tone.color()).to_string()
    } else {
        text.to_string()
    }
}

fn color_allowed() -> bool {
    std::env::var_os("NO_COLOR").is_none_or(|value| value.is_empty())
}

/// `text` styled for stdout.
pub fn stdout(tone: Tone, text: impl AsRef<str>) -> String {
    paint(
        tone,
        text.as_ref(),
        color_allowed() && std::io::stdout().is_terminal(),
    )
}

/// `text` styled for stderr.
pub fn stderr(tone: Tone, text: impl AsRef<str>) -> String {
    paint(
        tone,
        text.as_ref(),
        color_allowed() && std::io::stderr().is_terminal(),
    )
}

/// Print a line to stdout.
pub fn say(tone: Tone, text: impl AsRef<str>) {
    println!("{}", stdout(tone, text));
}

/// Print a line to stderr.
pub fn complain(tone: Tone, text: impl AsRef<str>) {
    eprintln!("{}", stderr(tone, text));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_when_not_colored() {
        assert_eq!(paint(Tone::Error, "Error: boom", false), "Error: boom");
    }

    #[test]
    fn tones_use_distinct_colors() {
        let painted: Vec<String> = [Tone::Success, Tone::Warning, Tone::Error, Tone::Accent]
            .into_iter()
            .map(|tone| paint(tone, "x", true))
            .collect();
        assert!(painted.iter().all(|text| text.contains('x') && text.starts_with('\u{1b}')));
        assert_eq!(painted[0], "\u{1b}[32mx\u{1b}[39m");
        for (i, text) in painted.iter().enumerate() {
            assert!(!painted[i + 1..].contains(text));
        }
    }
}
