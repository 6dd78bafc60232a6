//! Utility functions

use std::time::Duration;

/// Format a byte count in human readable form
pub fn format_file_size(size_bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    if size_bytes == 0 {
        return "0 B".to_string();
    }
    let mut size = size_bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    format!("{:.2} {}", size, UNITS[unit])
}

/// Format a duration in human readable form (e.g. "1h 5m", "3m 20s", "45s")
pub fn format_duration(duration: Duration) -> String {
    let seconds = duration.as_secs();
    if seconds < 60 {
        format!("{}s", seconds)
    } else if seconds < 3600 {
        format!("{}m {}s", seconds / 60, seconds % 60)
    } else {
        format!("{}h {}m", seconds / 3600, (seconds % 3600) / 60)
    }
}

/// Derive a caption/filename-safe display name from an input label
///
/// Strips characters that break shell-quoted tool invocations and path
/// construction, collapses whitespace, and caps the length at 60 chars.
/// Falls back to `file_{index}` for labels that strip to nothing.
pub fn derive_display_name(label: &str, index: u32) -> String {
    let mut name = String::with_capacity(label.len());
    for c in label.chars() {
        match c {
            '(' => name.push('['),
            ')' => name.push(']'),
            '_' | '\t' | ':' | '/' | '+' | '#' | '|' | '@' | '*' | '.' | '"' | '\'' => {}
            c => name.push(c),
        }
    }
    // Bare-scheme labels carry no title
    let name = name
        .trim_start_matches("https")
        .trim_start_matches("http")
        .trim();
    let mut name: String = name.chars().take(60).collect();
    let trimmed = name.trim();
    if trimmed.is_empty() {
        name = format!("file_{index}");
    } else {
        name = trimmed.to_string();
    }
    name
}

/// Sanitize a string for use as a filename
pub fn sanitize_filename(filename: &str) -> String {
    let mut out = String::with_capacity(filename.len());
    let mut last_space = false;
    for c in filename.chars() {
        let replaced = match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            c => c,
        };
        if replaced.is_whitespace() {
            if !last_space {
                out.push(' ');
            }
            last_space = true;
        } else {
            out.push(replaced);
            last_space = false;
        }
    }
    let out = out.trim_matches(|c: char| c == ' ' || c == '.');
    let mut out = out.to_string();
    if out.len() > 200 {
        out.truncate(200);
    }
    out
}

/// Case-sensitive suffix extension extraction from a URL, without query
pub fn url_extension(url: &str) -> Option<&str> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let last = path.rsplit('/').next()?;
    let dot = last.rfind('.')?;
    let ext = &last[dot + 1..];
    if ext.is_empty() || ext.len() > 5 {
        None
    } else {
        Some(ext)
    }
}
