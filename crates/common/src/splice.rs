//! Line-oriented text patching
//!
//! All transforms work on whole lines and keep every untouched line
//! byte-identical, line endings included. A transform that cannot find its
//! anchor or marker fails instead of silently returning the input.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use tracing::debug;

use crate::error::{Error, Result};

/// Prefix prepended to a token to disable it
pub const DISABLED_PREFIX: &str = "DISABLED_";

/// A line appended after every line that contains `marker`
#[derive(Debug, Clone, Copy)]
pub struct CallSite<'a> {
    pub marker: &'a str,
    pub line: &'a str,
}

/// Split text into lines, keeping the terminators
fn lines(text: &str) -> Vec<&str> {
    text.split_inclusive('\n').collect()
}

fn push_line(out: &mut String, line: &str) {
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
    out.push_str(line);
    out.push('\n');
}

/// Replace the line preceding every line that contains `anchor` with `block`.
///
/// When `call_site` is given, each line containing its marker is kept and
/// followed by the call line. A line that both precedes the anchor and
/// contains the marker is replaced, not extended.
pub fn splice_before_anchor(
    text: &str,
    anchor: &str,
    block: &str,
    call_site: Option<CallSite<'_>>,
) -> Result<String> {
    let lines = lines(text);
    let mut out = String::with_capacity(text.len() + block.len());
    let mut spliced = 0usize;
    let mut calls = 0usize;

    for (idx, line) in lines.iter().enumerate() {
        let precedes_anchor = lines
            .get(idx + 1)
            .map(|next| next.contains(anchor))
            .unwrap_or(false);

        if precedes_anchor {
            out.push_str(block);
            out.push('\n');
            spliced += 1;
        } else if let Some(site) = call_site.filter(|site| line.contains(site.marker)) {
            out.push_str(line);
            push_line(&mut out, site.line);
            calls += 1;
        } else {
            out.push_str(line);
        }
    }

    if spliced == 0 {
        return Err(Error::AnchorNotFound {
            anchor: anchor.to_string(),
        });
    }
    if let Some(site) = call_site {
        if calls == 0 {
            return Err(Error::MarkerNotFound {
                marker: site.marker.to_string(),
            });
        }
    }

    debug!(spliced, calls, "spliced block before '{}'", anchor);
    Ok(out)
}

/// Replace the line before the first line containing `marker` with `line`
pub fn replace_line_before(text: &str, marker: &str, line: &str) -> Result<String> {
    let mut lines = lines(text);
    let idx = lines
        .iter()
        .position(|l| l.contains(marker))
        .filter(|&idx| idx > 0)
        .ok_or_else(|| Error::AnchorNotFound {
            anchor: marker.to_string(),
        })?;

    let replacement = format!("{line}\n");
    lines[idx - 1] = &replacement;
    Ok(lines.concat())
}

/// Append `line` after every line that contains `marker`
pub fn insert_after(text: &str, marker: &str, line: &str) -> Result<String> {
    let mut out = String::with_capacity(text.len() + line.len() + 1);
    let mut hits = 0usize;

    for l in lines(text) {
        out.push_str(l);
        if l.contains(marker) {
            push_line(&mut out, line);
            hits += 1;
        }
    }

    if hits == 0 {
        return Err(Error::MarkerNotFound {
            marker: marker.to_string(),
        });
    }
    Ok(out)
}

/// Substitute `placeholder` with `value`, then apply identifier renames in order
pub fn fill_template(
    template: &str,
    placeholder: &str,
    value: &str,
    renames: &[(String, String)],
) -> String {
    let mut filled = template.replace(placeholder, value);
    for (from, to) in renames {
        filled = filled.replace(from.as_str(), to.as_str());
    }
    filled
}

/// The token a disabled `token` is rewritten to
pub fn disabled_token(token: &str) -> String {
    format!("{DISABLED_PREFIX}{token}")
}

/// Replace every occurrence of `token` with its disabled form.
///
/// Returns the rewritten text and the number of replacements. Not
/// idempotent: rewriting twice prefixes twice.
pub fn rewrite_token(text: &str, token: &str) -> (String, usize) {
    let count = text.matches(token).count();
    (text.replace(token, &disabled_token(token)), count)
}

/// Apply `transform` to a file's contents and write the result back.
///
/// The file is left untouched when the transform fails.
pub fn patch_file<F>(path: &Path, transform: F) -> Result<()>
where
    F: FnOnce(&str) -> Result<String>,
{
    let original = fs::read_to_string(path)?;
    let patched = transform(&original)?;
    fs::write(path, patched)?;
    debug!("patched {}", path.display());
    Ok(())
}

/// Disable `token` in the file at `path`, returning the replacement count
pub fn rewrite_token_in_file(path: &Path, token: &str) -> Result<usize> {
    let original = fs::read_to_string(path)?;
    let (rewritten, count) = rewrite_token(&original, token);
    if count == 0 {
        return Err(Error::TokenNotFound {
            token: token.to_string(),
            path: path.to_path_buf(),
        });
    }
    fs::write(path, rewritten)?;
    debug!(count, "disabled '{}' in {}", token, path.display());
    Ok(count)
}

/// Append lines to a file, creating it when missing
pub fn append_lines(path: &Path, new_lines: &[&str]) -> Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    for line in new_lines {
        writeln!(file, "{line}")?;
    }
    Ok(())
}
