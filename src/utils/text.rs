use std::sync::LazyLock;

use regex::Regex;

use crate::utils::error::{AppError, Result};

/// Telegram refuses messages longer than this many characters.
pub const MESSAGE_MAX_CHARS: usize = 4096;

static MARKDOWN_V2_SPECIAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([_*\[\]()~`>#+\-=|{}.!\\])").expect("static regex"));

static DURATION_PART: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+(?:\.\d+)?)(h|m|s)").expect("static regex"));

static DAY_TIME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([01]\d|2[0-3]):([0-5]\d)$").expect("static regex"));

/// Escape text for Telegram MarkdownV2.
pub fn escape_markdown_v2(text: &str) -> String {
    MARKDOWN_V2_SPECIAL.replace_all(text, r"\$1").into_owned()
}

/// Parse durations such as `90s`, `15m`, `1.5h` or `2h30m15s` into seconds.
pub fn parse_duration_secs(input: &str) -> Result<i64> {
    let input = input.trim();
    if input.is_empty() {
        return Err(AppError::Validation("duration is empty".to_string()));
    }

    let mut consumed = 0;
    let mut total = 0.0_f64;
    for caps in DURATION_PART.captures_iter(input) {
        let whole = caps.get(0).map(|m| m.range()).unwrap_or_default();
        if whole.start != consumed {
            return Err(AppError::Validation(format!("invalid duration: {}", input)));
        }
        consumed = whole.end;

        let value: f64 = caps[1]
            .parse()
            .map_err(|_| AppError::Validation(format!("invalid duration: {}", input)))?;
        total += match &caps[2] {
            "h" => value * 3600.0,
            "m" => value * 60.0,
            _ => value,
        };
    }

    if consumed != input.len() {
        return Err(AppError::Validation(format!("invalid duration: {}", input)));
    }
    Ok(total.round() as i64)
}

/// Render seconds as `1h30m0s`, `15m0s` or `45s`.
pub fn format_duration_secs(secs: i64) -> String {
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;
    if hours > 0 {
        format!("{}h{}m{}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m{}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

/// `HH:MM` to minutes after midnight.
pub fn day_time_to_minutes(input: &str) -> Result<i64> {
    let caps = DAY_TIME
        .captures(input.trim())
        .ok_or_else(|| AppError::Validation(format!("invalid time of day: {}", input)))?;
    let hours: i64 = caps[1].parse().unwrap_or_default();
    let minutes: i64 = caps[2].parse().unwrap_or_default();
    Ok(hours * 60 + minutes)
}

pub fn minutes_to_day_time(minutes: i64) -> String {
    format!("{:02}:{:02}", minutes / 60, minutes % 60)
}

/// Group lines into messages that stay under the transport limit.
///
/// A line longer than the limit on its own is cut into several messages.
pub fn split_message(lines: &[String], max_chars: usize) -> Vec<String> {
    let mut messages = Vec::new();
    let mut current = String::new();

    for piece in lines.iter().flat_map(|line| hard_split(line, max_chars)) {
        if !current.is_empty() && current.chars().count() + piece.chars().count() > max_chars {
            messages.push(std::mem::take(&mut current));
        }
        current.push_str(piece);
    }
    if !current.is_empty() {
        messages.push(current);
    }

    messages
}

/// Cut `line` into pieces of at most `max_chars` characters, on char
/// boundaries and never between an escaping backslash and what it escapes.
fn hard_split(line: &str, max_chars: usize) -> Vec<&str> {
    let max_chars = max_chars.max(2);
    let mut pieces = Vec::new();
    let mut rest = line;

    while let Some((mut cut, _)) = rest.char_indices().nth(max_chars) {
        let trailing_escapes = rest[..cut].chars().rev().take_while(|c| *c == '\\').count();
        if trailing_escapes % 2 == 1 {
            cut -= 1;
        }
        let (piece, tail) = rest.split_at(cut);
        pieces.push(piece);
        rest = tail;
    }
    pieces.push(rest);

    pieces
}
