//! In-place host file edits: line appends, block appends, last-line extension,
//! and directory/file mode handling.
use anyhow::{Context, Result};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

/// Append `line` to `path` as a new line, creating the file if needed.
///
/// A file not ending in a newline gets one first, so the appended text never
/// merges into the previous line.
pub fn append_line(path: &Path, line: &str) -> Result<()> {
    append_text(path, &format!("{line}\n"))
}

/// Append a multi-line block to `path`, separated from existing content by a
/// blank line.
pub fn append_block(path: &Path, block: &str) -> Result<()> {
    let text = if block.ends_with('\n') {
        format!("\n{block}")
    } else {
        format!("\n{block}\n")
    };
    append_text(path, &text)
}

fn append_text(path: &Path, text: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let needs_newline = match fs::read(path) {
        Ok(existing) => !existing.is_empty() && !existing.ends_with(b"\n"),
        Err(_) => false,
    };

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open {} for appending", path.display()))?;
    if needs_newline {
        file.write_all(b"\n")?;
    }
    file.write_all(text.as_bytes())
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

/// Add `fragment` to the end of the final line of `path`, separated by a space.
///
/// Every other byte of the file is kept as is, including the final line's
/// terminating newline if it had one.
pub fn extend_last_line(path: &Path, fragment: &str) -> Result<()> {
    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;

    let (body, terminator) = match content.strip_suffix('\n') {
        Some(body) => (body, "\n"),
        None => (content.as_str(), ""),
    };
    let updated = if body.is_empty() {
        format!("{fragment}{terminator}")
    } else {
        format!("{body} {fragment}{terminator}")
    };

    fs::write(path, updated).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

/// Create `path` (and any missing parents) and give it exactly `mode`.
///
/// The mode is applied explicitly so the process umask cannot narrow it.
pub fn create_dir_with_mode(path: &Path, mode: u32) -> Result<()> {
    fs::create_dir_all(path).with_context(|| format!("Failed to create {}", path.display()))?;
    set_mode(path, mode)
}

pub fn set_mode(path: &Path, mode: u32) -> Result<()> {
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
        .with_context(|| format!("Failed to set mode {mode:o} on {}", path.display()))
}
