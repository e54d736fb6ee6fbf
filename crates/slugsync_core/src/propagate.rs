use anyhow::{Context, Result};
use rusqlite::{Connection, params};
use serde::Serialize;

use crate::store::{LAYOUT_META_KEY, MENU_URL_META_KEY};

/// Storage locations rewritten when an item's URL changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceClass {
    /// Body text of every content item, regardless of kind.
    Content,
    /// Serialized page-builder layout documents (`page_layout` meta).
    LayoutMeta,
    /// Navigation menu target URLs (`nav_menu_url` meta).
    MenuMeta,
}

impl ReferenceClass {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Content => "content",
            Self::LayoutMeta => "layout",
            Self::MenuMeta => "menu",
        }
    }
}

/// Per-class counts of records actually rewritten by one rename.
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct ReplacementCounts {
    pub content_replacements: usize,
    pub meta_replacements: usize,
    pub menu_replacements: usize,
}

impl ReplacementCounts {
    pub fn total(&self) -> usize {
        self.content_replacements + self.meta_replacements + self.menu_replacements
    }
}

/// Rewrite one reference class, substituting `new_ref` for every literal
/// occurrence of `old_ref`. Returns the number of records that changed.
///
/// Replacement is plain substring rewriting: any field containing `old_ref`
/// is touched, even where the occurrence is not a link. The `<>` guard keeps
/// the count at rows whose stored value actually changes, which also leaves
/// it at zero when `old_ref` and `new_ref` are equal.
pub fn replace_references(
    connection: &Connection,
    class: ReferenceClass,
    old_ref: &str,
    new_ref: &str,
) -> Result<usize> {
    let changed = match class {
        ReferenceClass::Content => connection.execute(
            "UPDATE content_items
             SET body = replace(body, ?1, ?2)
             WHERE body <> replace(body, ?1, ?2)",
            params![old_ref, new_ref],
        ),
        ReferenceClass::LayoutMeta => replace_in_meta(connection, LAYOUT_META_KEY, old_ref, new_ref),
        ReferenceClass::MenuMeta => replace_in_meta(connection, MENU_URL_META_KEY, old_ref, new_ref),
    };
    changed.with_context(|| format!("failed to rewrite {} references", class.as_str()))
}

fn replace_in_meta(
    connection: &Connection,
    meta_key: &str,
    old_ref: &str,
    new_ref: &str,
) -> rusqlite::Result<usize> {
    connection.execute(
        "UPDATE item_meta
         SET meta_value = replace(meta_value, ?1, ?2)
         WHERE meta_key = ?3
           AND instr(meta_value, ?1) > 0
           AND meta_value <> replace(meta_value, ?1, ?2)",
        params![old_ref, new_ref, meta_key],
    )
}

/// Rewrite all three reference classes for one old URL, new URL pair.
pub fn propagate_reference_update(
    connection: &Connection,
    old_ref: &str,
    new_ref: &str,
) -> Result<ReplacementCounts> {
    Ok(ReplacementCounts {
        content_replacements: replace_references(connection, ReferenceClass::Content, old_ref, new_ref)?,
        meta_replacements: replace_references(connection, ReferenceClass::LayoutMeta, old_ref, new_ref)?,
        menu_replacements: replace_references(connection, ReferenceClass::MenuMeta, old_ref, new_ref)?,
    })
}
