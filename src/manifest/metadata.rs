//! METADATA.toml parsing and rewriting
//!
//! Handles:
//! - Reading the keys stubsabot cares about (unknown keys are ignored)
//! - Rewriting `version` / `obsolete_since` in place, keeping comments,
//!   key order and every other line untouched
//! - Rendering a unified diff of a rewrite

use crate::domain::{ClassifiedAction, StubPackage, Version, VersionConstraint};
use crate::error::MetadataError;
use regex::Regex;
use serde::Deserialize;
use std::path::Path;
use std::sync::LazyLock;

/// Metadata file name inside each stub directory
pub const METADATA_FILE: &str = "METADATA.toml";

/// Lines of context around a diff hunk
const DIFF_CONTEXT: usize = 3;

// Top-level `version = "..."` assignment
static VERSION_LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?m)^(?P<lead>[ \t]*version[ \t]*=[ \t]*)(?P<q>["'])(?P<value>[^"'\n]*)["']"#)
        .unwrap()
});

// Top-level `obsolete_since = "..."` assignment
static OBSOLETE_LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?m)^(?P<lead>[ \t]*obsolete_since[ \t]*=[ \t]*)(?P<q>["'])(?P<value>[^"'\n]*)["']"#)
        .unwrap()
});

// First table header; everything before it is the top-level table
static TABLE_HEADER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^[ \t]*\[").unwrap());

#[derive(Debug, Deserialize)]
struct RawMetadata {
    version: Option<String>,
    upstream: Option<String>,
    max_version: Option<String>,
    obsolete_since: Option<String>,
    #[serde(default)]
    no_longer_updated: bool,
    #[serde(default)]
    prerelease: bool,
}

/// Parse the metadata of stub `name` from `source`
///
/// `path` is only used in error messages and as the package's metadata path.
pub fn parse_metadata(name: &str, path: &Path, source: &str) -> Result<StubPackage, MetadataError> {
    let raw: RawMetadata =
        toml::from_str(source).map_err(|e| MetadataError::toml_parse_error(path, e.to_string()))?;

    let version = raw
        .version
        .ok_or_else(|| MetadataError::invalid_version(path, "version", "", "missing required key"))?;
    let min_version = VersionConstraint::parse(&version)
        .map_err(|e| MetadataError::invalid_version(path, "version", &version, e.to_string()))?;

    let upstream = raw
        .upstream
        .unwrap_or_else(|| StubPackage::default_upstream(name));

    let mut package = StubPackage::new(name, upstream, min_version).with_metadata_source(source);
    package.metadata_path = path.to_path_buf();

    if let Some(max) = raw.max_version {
        let max_version = Version::parse(&max)
            .map_err(|e| MetadataError::invalid_version(path, "max_version", &max, e.to_string()))?;
        package = package.with_max_version(max_version);
    }
    if let Some(since) = raw.obsolete_since {
        package = package.with_obsolete_since(since.trim());
    }
    package.no_longer_updated = raw.no_longer_updated;
    package.prerelease = raw.prerelease;

    Ok(package)
}

/// Rewrite the package's metadata to apply `action`
///
/// The result is parsed again before it is returned, so a rewrite that
/// would not round-trip is reported as an error instead of proposed.
pub fn render_action(package: &StubPackage, action: &ClassifiedAction) -> Result<String, MetadataError> {
    let path = package.metadata_path.as_path();
    let source = package.metadata_source.as_str();
    let top_level_end = TABLE_HEADER_RE
        .find(source)
        .map(|m| m.start())
        .unwrap_or(source.len());
    let (head, tail) = source.split_at(top_level_end);

    let rendered = match action {
        ClassifiedAction::Update { target, .. } => {
            let new_value = package.min_version.bumped_to(target);
            let head = replace_value(&VERSION_LINE_RE, head, &new_value).ok_or_else(|| {
                render_error(path, "no top-level 'version' key to update")
            })?;
            format!("{}{}", head, tail)
        }
        ClassifiedAction::MarkObsolete { since } => {
            let since = since.to_string();
            let head = match replace_value(&OBSOLETE_LINE_RE, head, &since) {
                Some(head) => head,
                None => insert_after_version(head, &format!("obsolete_since = \"{}\"", since))
                    .ok_or_else(|| render_error(path, "no top-level 'version' key"))?,
            };
            format!("{}{}", head, tail)
        }
        other => {
            return Err(render_error(
                path,
                format!("'{}' does not change metadata", other.kind()),
            ))
        }
    };

    let reparsed = parse_metadata(&package.name, path, &rendered)?;
    let applied = match action {
        ClassifiedAction::Update { target, .. } => {
            reparsed.min_version.raw == package.min_version.bumped_to(target)
        }
        ClassifiedAction::MarkObsolete { since } => {
            reparsed.obsolete_since.as_deref() == Some(since.to_string().as_str())
        }
        _ => false,
    };
    if !applied {
        return Err(render_error(path, "rewritten metadata does not round-trip"));
    }

    Ok(rendered)
}

fn render_error(path: &Path, message: impl Into<String>) -> MetadataError {
    MetadataError::RenderError {
        path: path.to_path_buf(),
        message: message.into(),
    }
}

/// Replace the quoted value matched by `re`, keeping its quote style
fn replace_value(re: &Regex, text: &str, value: &str) -> Option<String> {
    let caps = re.captures(text)?;
    let whole = caps.get(0)?;
    let quote = &caps["q"];
    let replacement = format!("{}{}{}{}", &caps["lead"], quote, value, quote);
    Some(format!(
        "{}{}{}",
        &text[..whole.start()],
        replacement,
        &text[whole.end()..]
    ))
}

/// Insert `line` right after the `version` line
fn insert_after_version(text: &str, line: &str) -> Option<String> {
    let m = VERSION_LINE_RE.find(text)?;
    let line_end = text[m.end()..]
        .find('\n')
        .map(|i| m.end() + i + 1)
        .unwrap_or(text.len());
    let (before, after) = text.split_at(line_end);
    let sep = if before.ends_with('\n') { "" } else { "\n" };
    Some(format!("{}{}{}\n{}", before, sep, line, after))
}

/// Render a unified diff between two versions of a file
///
/// Returns an empty string if the contents are equal. Produces a single
/// hunk covering the changed region. Lines keep their endings, so CRLF
/// files and a missing final newline survive `git apply`.
pub fn unified_diff(path: &Path, old: &str, new: &str) -> String {
    if old == new {
        return String::new();
    }
    let old_lines: Vec<&str> = old.split_inclusive('\n').collect();
    let new_lines: Vec<&str> = new.split_inclusive('\n').collect();

    let prefix = old_lines
        .iter()
        .zip(new_lines.iter())
        .take_while(|(a, b)| a == b)
        .count();
    let max_suffix = old_lines.len().min(new_lines.len()) - prefix;
    let suffix = old_lines
        .iter()
        .rev()
        .zip(new_lines.iter().rev())
        .take(max_suffix)
        .take_while(|(a, b)| a == b)
        .count();

    let old_changed_end = old_lines.len() - suffix;
    let new_changed_end = new_lines.len() - suffix;
    let start = prefix.saturating_sub(DIFF_CONTEXT);
    let trailing = suffix.min(DIFF_CONTEXT);
    let old_end = old_changed_end + trailing;
    let new_end = new_changed_end + trailing;

    let mut out = String::new();
    let display = path.display();
    out.push_str(&format!("--- a/{}\n+++ b/{}\n", display, display));
    out.push_str(&format!(
        "@@ -{} +{} @@\n",
        hunk_range(start, old_end - start),
        hunk_range(start, new_end - start)
    ));
    for line in &old_lines[start..prefix] {
        push_diff_line(&mut out, ' ', line);
    }
    for line in &old_lines[prefix..old_changed_end] {
        push_diff_line(&mut out, '-', line);
    }
    for line in &new_lines[prefix..new_changed_end] {
        push_diff_line(&mut out, '+', line);
    }
    for line in &old_lines[old_changed_end..old_end] {
        push_diff_line(&mut out, ' ', line);
    }
    out
}

fn push_diff_line(out: &mut String, marker: char, line: &str) {
    out.push(marker);
    out.push_str(line);
    if !line.ends_with('\n') {
        out.push_str("\n\\ No newline at end of file\n");
    }
}

fn hunk_range(start: usize, count: usize) -> String {
    match count {
        0 => format!("{},0", start),
        1 => format!("{}", start + 1),
        _ => format!("{},{}", start + 1, count),
    }
}
