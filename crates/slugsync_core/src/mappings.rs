use anyhow::{Context, Result};
use rusqlite::Connection;
use serde::Serialize;

use crate::slug::sanitize_slug;
use crate::store::{self, MAPPINGS_SETTING_KEY};

/// One planned rename, already normalized to slug form.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SlugMapping {
    pub from_slug: String,
    pub to_slug: String,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The line has no comma, so there is no second field.
    MissingField,
    /// The first field normalized to an empty slug.
    EmptyFromSlug,
    /// The second field normalized to an empty slug.
    EmptyToSlug,
}

impl SkipReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MissingField => "missing field",
            Self::EmptyFromSlug => "empty from-slug",
            Self::EmptyToSlug => "empty to-slug",
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SkippedLine {
    pub line_number: usize,
    pub content: String,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct MappingParseReport {
    pub mappings: Vec<SlugMapping>,
    pub skipped: Vec<SkippedLine>,
}

/// Parse mapping text for the rename engine. Blank lines and `#` comments are
/// ignored, malformed data lines are dropped silently, and the surviving
/// mappings keep their textual order.
pub fn parse_mappings(text: &str) -> Vec<SlugMapping> {
    parse_mappings_detailed(text).mappings
}

/// Like [`parse_mappings`], but records which data lines were dropped and why.
pub fn parse_mappings_detailed(text: &str) -> MappingParseReport {
    let mut report = MappingParseReport::default();
    let text = normalize_newlines(text);

    for (offset, raw_line) in text.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line_number = offset + 1;

        let mut fields = line.split(',');
        let from_field = fields.next().unwrap_or("");
        let Some(to_field) = fields.next() else {
            report.skipped.push(SkippedLine {
                line_number,
                content: line.to_string(),
                reason: SkipReason::MissingField,
            });
            continue;
        };
        // Fields past the second are ignored.

        let from_slug = sanitize_slug(from_field);
        if from_slug.is_empty() {
            report.skipped.push(SkippedLine {
                line_number,
                content: line.to_string(),
                reason: SkipReason::EmptyFromSlug,
            });
            continue;
        }
        let to_slug = sanitize_slug(to_field);
        if to_slug.is_empty() {
            report.skipped.push(SkippedLine {
                line_number,
                content: line.to_string(),
                reason: SkipReason::EmptyToSlug,
            });
            continue;
        }

        report.mappings.push(SlugMapping { from_slug, to_slug });
    }

    report
}

// \n, \r\n, and bare \r all separate lines.
fn normalize_newlines(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}

/// Normalize mapping text for storage: rewrite line endings to `\n`, trim
/// each line, drop lines that are empty after trimming, keep comment and data
/// lines verbatim.
pub fn sanitize_mapping_text(raw: &str) -> String {
    normalize_newlines(raw)
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Read the persisted raw mapping text. Empty string when nothing is saved.
pub fn load_mapping_text(connection: &Connection) -> Result<String> {
    Ok(store::get_setting(connection, MAPPINGS_SETTING_KEY)?.unwrap_or_default())
}

/// Normalize and persist mapping text, returning the stored form.
pub fn save_mapping_text(connection: &Connection, raw: &str) -> Result<String> {
    let text = sanitize_mapping_text(raw);
    store::set_setting(connection, MAPPINGS_SETTING_KEY, &text)
        .context("failed to persist mapping text")?;
    Ok(text)
}

/// Load and parse the persisted mapping list in stored order.
pub fn load_mappings(connection: &Connection) -> Result<Vec<SlugMapping>> {
    Ok(parse_mappings(&load_mapping_text(connection)?))
}
