use regex::Regex;
use std::sync::LazyLock;

const PT_TO_MM: f32 = 25.4 / 72.0;

static LEADING_ORDINAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+\.\s*").expect("valid regex"));
static LEADING_SCENE_LABEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^Scene \d+:\s*").expect("valid regex"));

/// First `max_chars` characters of `s`, never splitting a code point.
pub fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Drops a leading `"<n>."` list marker.
pub fn strip_ordinal(s: &str) -> &str {
    match LEADING_ORDINAL.find(s) {
        Some(m) => &s[m.end()..],
        None => s,
    }
}

/// Drops a leading `"<n>."` marker and then a `"Scene <n>:"` label.
pub fn strip_scene_label(s: &str) -> &str {
    let s = strip_ordinal(s);
    match LEADING_SCENE_LABEL.find(s) {
        Some(m) => &s[m.end()..],
        None => s,
    }
}

/// Turns a story title into a safe file stem.
pub fn sanitize_file_name(title: &str) -> String {
    let cleaned: String = title
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let cleaned = cleaned.trim().trim_matches('.').trim();
    if cleaned.is_empty() {
        "story".to_string()
    } else {
        cleaned.to_string()
    }
}

// Helvetica advance widths in 1/1000 em; anything unlisted counts as 556.
fn glyph_width(c: char) -> u32 {
    match c {
        ' ' | '!' | ',' | '.' | '/' | ':' | ';' | 'I' | '[' | ']' | '\\' | 'f' | 't' => 278,
        '\'' | 'i' | 'j' | 'l' | '|' => 222,
        '"' => 355,
        '(' | ')' | '-' | '`' | 'r' => 333,
        'c' | 'k' | 's' | 'v' | 'x' | 'y' | 'z' | 'J' => 500,
        'm' => 833,
        'w' | 'C' | 'D' | 'H' | 'N' | 'R' | 'U' => 722,
        'A' | 'B' | 'E' | 'K' | 'P' | 'S' | 'V' | 'X' | 'Y' => 667,
        'F' | 'T' | 'Z' => 611,
        'G' | 'O' | 'Q' => 778,
        'L' => 556,
        'M' => 833,
        'W' => 944,
        _ => 556,
    }
}

/// Approximate rendered width of `s` in millimetres.
pub fn text_width_mm(s: &str, font_size_pt: f32) -> f32 {
    let units: u32 = s.chars().map(glyph_width).sum();
    units as f32 / 1000.0 * font_size_pt * PT_TO_MM
}

/// Greedy word wrap to `max_width_mm`. Explicit newlines start new lines and
/// blank input lines are kept as empty lines; words wider than a whole line
/// are broken between characters.
pub fn wrap_text(text: &str, max_width_mm: f32, font_size_pt: f32) -> Vec<String> {
    let mut lines = Vec::new();

    for paragraph in text.lines() {
        let mut current = String::new();
        for word in paragraph.split_whitespace() {
            let candidate = if current.is_empty() {
                word.to_string()
            } else {
                format!("{} {}", current, word)
            };

            if text_width_mm(&candidate, font_size_pt) <= max_width_mm {
                current = candidate;
                continue;
            }

            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            if text_width_mm(word, font_size_pt) <= max_width_mm {
                current = word.to_string();
            } else {
                for c in word.chars() {
                    current.push(c);
                    if text_width_mm(&current, font_size_pt) > max_width_mm {
                        current.pop();
                        lines.push(std::mem::take(&mut current));
                        current.push(c);
                    }
                }
            }
        }
        lines.push(current);
    }

    lines
}
