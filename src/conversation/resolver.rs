//! Maps decorated button labels back to canonical keys.
//!
//! Buttons show a key as `"<marker> <key> [<count>]"`, with marker and counter
//! both optional. Every place that needs the key from a label goes through
//! [`resolve`], so decorations can change without touching the matching.

/// Leading glyphs that decorate labels. ZWJ sequences come before their
/// base glyph so the longest marker is stripped.
pub const MARKERS: &[&str] = &[
    "👷\u{200d}♂\u{fe0f}",
    "👷\u{200d}♂",
    "👷",
    "📋",
    "📂",
    "🔧",
    "🏢",
    "📝",
    "🛒",
    "🔨",
    "🏪",
    "🏗",
    "🚿",
    "🔌",
    "🏡",
    "🧱",
    "🚜",
    "🪑",
    "🌱",
    "📰",
    "🤝",
];

const VARIATION_SELECTOR: char = '\u{fe0f}';

/// Removes a trailing `" [digits]"` counter.
#[must_use]
pub fn strip_counter(label: &str) -> &str {
    let Some(head) = label.strip_suffix(']') else {
        return label;
    };
    let Some(open) = head.rfind(" [") else {
        return label;
    };
    let digits = &head[open + 2..];
    if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) {
        head[..open].trim_end()
    } else {
        label
    }
}

/// Removes one leading marker glyph followed by whitespace.
#[must_use]
pub fn strip_marker(label: &str) -> &str {
    for marker in MARKERS {
        if let Some(rest) = label.strip_prefix(marker) {
            let rest = rest.strip_prefix(VARIATION_SELECTOR).unwrap_or(rest);
            if rest.starts_with(char::is_whitespace) {
                return rest.trim_start();
            }
        }
    }
    label
}

/// Label with marker and counter removed, lowercased for comparison.
fn bare(label: &str) -> String {
    strip_marker(strip_counter(label.trim())).trim().to_lowercase()
}

/// Finds the key a button label refers to.
///
/// Tries, in order: the label as is, the label without its counter, then a
/// case-insensitive comparison with marker and counter removed on both
/// sides. `None` means the text does not name any of `keys`.
#[must_use]
pub fn resolve<'a, S: AsRef<str>>(label: &str, keys: &'a [S]) -> Option<&'a str> {
    let label = label.trim();
    let without_counter = strip_counter(label);

    for candidate in [label, without_counter] {
        if let Some(key) = keys.iter().find(|k| k.as_ref() == candidate) {
            return Some(key.as_ref());
        }
    }

    let wanted = bare(label);
    if wanted.is_empty() {
        return None;
    }
    keys.iter()
        .map(AsRef::as_ref)
        .find(|key| bare(key) == wanted)
}

/// Builds a button label: optional marker, the key, optional counter.
#[must_use]
pub fn decorate(key: &str, marker: Option<&str>, count: Option<usize>) -> String {
    let mut label = String::with_capacity(key.len() + 16);
    if let Some(marker) = marker {
        label.push_str(marker);
        label.push(' ');
    }
    label.push_str(key);
    if let Some(count) = count {
        label.push_str(&format!(" [{count}]"));
    }
    label
}
