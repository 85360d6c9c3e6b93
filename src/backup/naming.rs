//! Backup-set naming
//!
//! Backup sets are named from a user template such as `{YYYYMMDDHHmm}`.
//! Everything inside `{...}` is a date pattern rendered against the run's
//! start time; characters that are not date tokens pass through unchanged,
//! as does everything outside the braces.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Datelike, TimeZone, Timelike};

/// Template used when none is configured or the configured one is invalid
pub const DEFAULT_BACKUP_SET_NAME: &str = "{YYYYMMDDHHmm}";

const FORBIDDEN_CHARS: &[char] = &[':', '*', '?', '"', '<', '>', '|', '\\', '/'];

// Longest tokens first so "YYYY" wins over "YY"
const DATE_TOKENS: &[&str] = &[
    "YYYY", "YY", "MM", "M", "DD", "D", "HH", "H", "hh", "h", "mm", "m", "ss", "s", "A", "a",
];

/// Render a backup-set name template for the given run start time
pub fn render_backup_set_name<Tz: TimeZone>(template: &str, at: &DateTime<Tz>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close) => {
                out.push_str(&format_date_pattern(&after[..close], at));
                rest = &after[close + 1..];
            }
            None => {
                out.push_str(&rest[open..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);

    out
}

/// Render a single date pattern (the text between braces)
///
/// `[...]` escapes literal text inside a pattern.
pub fn format_date_pattern<Tz: TimeZone>(pattern: &str, at: &DateTime<Tz>) -> String {
    let mut out = String::new();
    let mut rest = pattern;

    'outer: while !rest.is_empty() {
        if let Some(escaped) = rest.strip_prefix('[') {
            if let Some(end) = escaped.find(']') {
                out.push_str(&escaped[..end]);
                rest = &escaped[end + 1..];
                continue;
            }
        }

        for token in DATE_TOKENS {
            if let Some(remaining) = rest.strip_prefix(token) {
                out.push_str(&render_token(token, at));
                rest = remaining;
                continue 'outer;
            }
        }

        let ch = rest.chars().next().unwrap_or_default();
        out.push(ch);
        rest = &rest[ch.len_utf8()..];
    }

    out
}

fn render_token<Tz: TimeZone>(token: &str, at: &DateTime<Tz>) -> String {
    let hour12 = match at.hour() % 12 {
        0 => 12,
        h => h,
    };
    match token {
        "YYYY" => format!("{:04}", at.year()),
        "YY" => format!("{:02}", at.year().rem_euclid(100)),
        "MM" => format!("{:02}", at.month()),
        "M" => at.month().to_string(),
        "DD" => format!("{:02}", at.day()),
        "D" => at.day().to_string(),
        "HH" => format!("{:02}", at.hour()),
        "H" => at.hour().to_string(),
        "hh" => format!("{:02}", hour12),
        "h" => hour12.to_string(),
        "mm" => format!("{:02}", at.minute()),
        "m" => at.minute().to_string(),
        "ss" => format!("{:02}", at.second()),
        "s" => at.second().to_string(),
        "A" => (if at.hour() < 12 { "AM" } else { "PM" }).to_string(),
        "a" => (if at.hour() < 12 { "am" } else { "pm" }).to_string(),
        other => other.to_string(),
    }
}

/// Whether `name` is usable as a file name on every supported platform
///
/// Besides the forbidden characters and device names this rejects `.`,
/// `..` and names ending in a dot or a space, which Windows strips or
/// treats as path navigation.
pub fn valid_file_name(name: &str) -> bool {
    if name.is_empty() || name.contains(FORBIDDEN_CHARS) {
        return false;
    }
    if name.ends_with('.') || name.ends_with(' ') {
        return false;
    }
    !is_reserved_device_name(name)
}

fn is_reserved_device_name(name: &str) -> bool {
    let stem = name.split('.').next().unwrap_or_default().to_ascii_lowercase();
    match stem.as_str() {
        "nul" | "prn" | "con" => true,
        s if s.len() == 4 && (s.starts_with("lpt") || s.starts_with("com")) => {
            s.as_bytes()[3].is_ascii_digit()
        }
        _ => false,
    }
}

/// Whether a template renders to a usable, non-empty name
pub fn valid_backup_set_template<Tz: TimeZone>(template: &str, at: &DateTime<Tz>) -> bool {
    let rendered = render_backup_set_name(template, at);
    !rendered.trim().is_empty() && valid_file_name(&rendered)
}

/// Replace characters that cannot appear in a file name
pub fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if FORBIDDEN_CHARS.contains(&c) || c.is_control() { '_' } else { c })
        .collect();
    let cleaned = cleaned.trim().trim_end_matches('.').trim_end().to_string();

    if cleaned.is_empty() {
        "_".to_string()
    } else if is_reserved_device_name(&cleaned) {
        format!("_{}", cleaned)
    } else {
        cleaned
    }
}

/// Pick a destination that does not exist yet
///
/// Returns `path` unchanged when it is free. Otherwise a ` (n)` suffix is
/// tried for `n = 1, 2, ...`. For files the suffix goes before the last
/// extension (`set.7z` -> `set (1).7z`); for directories it is appended to
/// the whole name.
pub fn unique_destination(path: &Path, is_file: bool) -> PathBuf {
    if path.symlink_metadata().is_err() {
        return path.to_path_buf();
    }

    let parent = path.parent().unwrap_or_else(|| Path::new(""));
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    let (stem, extension) = match (is_file, path.extension()) {
        (true, Some(ext)) => {
            let ext = ext.to_string_lossy().to_string();
            let stem = file_name[..file_name.len() - ext.len() - 1].to_string();
            (stem, Some(ext))
        }
        _ => (file_name, None),
    };

    let mut n = 1u32;
    loop {
        let candidate = match &extension {
            Some(ext) => parent.join(format!("{} ({}).{}", stem, n, ext)),
            None => parent.join(format!("{} ({})", stem, n)),
        };
        if candidate.symlink_metadata().is_err() {
            return candidate;
        }
        n += 1;
    }
}
