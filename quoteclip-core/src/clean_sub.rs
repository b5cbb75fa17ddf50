//! Display helpers that flatten dialog into a single line of prose.
use std::fmt;

use crate::Dialog;

/// Several dialog lines joined by spaces.
pub struct CleanDialogs<'a>(pub &'a [Dialog]);

impl<'a> fmt::Display for CleanDialogs<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for d in self.0 {
            let text = CleanDialog(d).to_string();
            if text.is_empty() {
                continue;
            }
            if !first {
                f.write_str(" ")?;
            }
            f.write_str(&text)?;
            first = false;
        }
        Ok(())
    }
}

/// One dialog line with speaker dashes dropped and internal newlines folded.
pub struct CleanDialog<'a>(pub &'a Dialog);

impl<'a> fmt::Display for CleanDialog<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for line in self.0.content.lines() {
            let text = line.trim().trim_start_matches('-').trim();
            if text.is_empty() {
                continue;
            }
            if !first {
                f.write_str(" ")?;
            }
            f.write_str(text)?;
            first = false;
        }
        Ok(())
    }
}

/// Greedy word wrap. Words longer than `width` get a line of their own.
pub fn wrap_text(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        if !current.is_empty() && current.chars().count() + 1 + word.chars().count() > width {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

/// Cut `text` to at most `max` characters, marking the cut with an ellipsis.
pub fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_owned();
    }
    let mut out: String = text.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}
