//! Close confirmation dialog
//!
//! Modal overlay shown when closing the terminal would kill a running
//! foreground process. Accepting closes the terminal; Esc dismisses. The
//! layout is pure math so placement and wrapping are testable without a
//! terminal.

use std::io::{self, Write};

use crossterm::cursor::MoveTo;
use crossterm::queue;
use crossterm::style::{Attribute, Print, ResetColor, SetAttribute, SetBackgroundColor, SetForegroundColor};
use unicode_width::UnicodeWidthStr;

use crate::config::ColorScheme;

const HEADING: &str = "Close";
const BODY: &str = "Process running in this terminal. Closing the terminal will kill it.";
const BUTTONS: &str = "[ Enter: Close ]   [ Esc: Cancel ]";

/// Widest the text area gets on a large screen.
const MAX_INNER_WIDTH: u16 = 50;

/// Computed placement of the dialog box.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DialogRect {
    pub x: u16,
    pub y: u16,
    pub width: u16,
    pub height: u16,
}

/// The close confirmation overlay.
pub struct ClosePrompt;

impl ClosePrompt {
    /// Centered placement for the given screen size.
    pub fn layout(cols: u16, rows: u16) -> DialogRect {
        let inner = Self::inner_width(cols);
        let body_lines = wrap(BODY, inner as usize).len() as u16;
        // borders + heading + blank + body + blank + buttons
        let height = body_lines + 6;
        let width = inner + 4;
        DialogRect {
            x: cols.saturating_sub(width) / 2,
            y: rows.saturating_sub(height) / 2,
            width,
            height,
        }
    }

    fn inner_width(cols: u16) -> u16 {
        cols.saturating_sub(6).min(MAX_INNER_WIDTH).max(10)
    }

    /// Queue the overlay onto the screen. The caller flushes.
    pub fn draw(out: &mut impl Write, cols: u16, rows: u16, scheme: &ColorScheme) -> io::Result<()> {
        let rect = Self::layout(cols, rows);
        let inner = rect.width.saturating_sub(4) as usize;

        queue!(
            out,
            SetForegroundColor(scheme.foreground.to_crossterm()),
            SetBackgroundColor(scheme.background.to_crossterm()),
        )?;

        let horizontal = "─".repeat(inner + 2);
        queue!(
            out,
            MoveTo(rect.x, rect.y),
            Print(format!("┌{}┐", horizontal))
        )?;

        let mut row = rect.y + 1;
        queue!(
            out,
            MoveTo(rect.x, row),
            Print("│ "),
            SetAttribute(Attribute::Bold),
            Print(pad_center(HEADING, inner)),
            SetAttribute(Attribute::Reset),
            SetForegroundColor(scheme.foreground.to_crossterm()),
            SetBackgroundColor(scheme.background.to_crossterm()),
            Print(" │")
        )?;
        row += 1;

        queue!(
            out,
            MoveTo(rect.x, row),
            Print(format!("│ {} │", " ".repeat(inner)))
        )?;
        row += 1;

        for line in wrap(BODY, inner) {
            queue!(
                out,
                MoveTo(rect.x, row),
                Print(format!("│ {} │", pad_right(&line, inner)))
            )?;
            row += 1;
        }

        queue!(
            out,
            MoveTo(rect.x, row),
            Print(format!("│ {} │", " ".repeat(inner)))
        )?;
        row += 1;

        queue!(
            out,
            MoveTo(rect.x, row),
            Print(format!("│ {} │", pad_center(&fit(BUTTONS, inner), inner)))
        )?;
        row += 1;

        queue!(
            out,
            MoveTo(rect.x, row),
            Print(format!("└{}┘", horizontal)),
            ResetColor
        )?;

        Ok(())
    }
}

/// Greedy word wrap by display width.
fn wrap(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        if current.is_empty() {
            current = word.to_string();
        } else if current.width() + 1 + word.width() <= width {
            current.push(' ');
            current.push_str(word);
        } else {
            lines.push(current);
            current = word.to_string();
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

/// Truncate to a display width.
fn fit(text: &str, width: usize) -> String {
    let mut result = String::new();
    let mut used = 0;
    for ch in text.chars() {
        let w = ch.to_string().width();
        if used + w > width {
            break;
        }
        used += w;
        result.push(ch);
    }
    result
}

fn pad_right(text: &str, width: usize) -> String {
    let padding = width.saturating_sub(text.width());
    format!("{}{}", text, " ".repeat(padding))
}

fn pad_center(text: &str, width: usize) -> String {
    let padding = width.saturating_sub(text.width());
    let left = padding / 2;
    format!("{}{}{}", " ".repeat(left), text, " ".repeat(padding - left))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_is_centered() {
        let rect = ClosePrompt::layout(80, 24);
        assert_eq!(rect.width, 54);
        assert_eq!(rect.x, (80 - rect.width) / 2);
        assert!(rect.y > 0);
        assert!(rect.x + rect.width <= 80);
        assert!(rect.y + rect.height <= 24);
    }

    #[test]
    fn test_layout_fits_small_screen() {
        let rect = ClosePrompt::layout(30, 12);
        assert!(rect.width <= 30);
        assert!(rect.x + rect.width <= 30);
    }

    #[test]
    fn test_wrap_respects_width() {
        for line in wrap(BODY, 50) {
            assert!(line.width() <= 50, "line too wide: {}", line);
        }
    }

    #[test]
    fn test_wrap_keeps_all_words() {
        let joined = wrap(BODY, 24).join(" ");
        assert_eq!(joined, BODY);
    }

    #[test]
    fn test_fit_truncates_by_width() {
        assert_eq!(fit("abcdef", 3), "abc");
        assert_eq!(fit("ab", 10), "ab");
    }

    #[test]
    fn test_padding() {
        assert_eq!(pad_right("ab", 4), "ab  ");
        assert_eq!(pad_center("ab", 6), "  ab  ");
        assert_eq!(pad_center("ab", 5), " ab  ");
    }

    #[test]
    fn test_draw_emits_box_borders() {
        let mut buffer = Vec::new();
        ClosePrompt::draw(&mut buffer, 80, 24, &ColorScheme::plain()).unwrap();
        let text = String::from_utf8_lossy(&buffer);
        assert!(text.contains('┌'));
        assert!(text.contains('┘'));
        assert!(text.contains("Close"));
        assert!(text.contains("kill it."));
    }
}
