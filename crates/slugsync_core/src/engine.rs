use anyhow::{Context, Result};
use rusqlite::Connection;
use serde::Serialize;

use crate::config::SiteConfig;
use crate::mappings;
use crate::propagate::{ReplacementCounts, propagate_reference_update};
use crate::store::{RENAME_ELIGIBLE_KINDS, find_item_by_slug, update_item_slug};

/// Outcome of one batch step.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// The item was renamed and its references were rewritten.
    Updated,
    /// No eligible item carries the from-slug; nothing was mutated.
    NotFound,
    /// The index is past the end of the mapping list; nothing was mutated.
    AllDone,
}

impl StepStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Updated => "updated",
            Self::NotFound => "not_found",
            Self::AllDone => "all_done",
        }
    }
}

/// Structured outcome of processing one mapping index.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RenameResult {
    pub index: usize,
    pub total: usize,
    pub status: StepStatus,
    pub from_slug: Option<String>,
    pub to_slug: Option<String>,
    pub item_id: Option<i64>,
    pub old_url: Option<String>,
    pub new_url: Option<String>,
    pub changes: ReplacementCounts,
}

impl RenameResult {
    fn skipped(index: usize, total: usize, status: StepStatus) -> Self {
        Self {
            index,
            total,
            status,
            from_slug: None,
            to_slug: None,
            item_id: None,
            old_url: None,
            new_url: None,
            changes: ReplacementCounts::default(),
        }
    }
}

/// Running tally of step outcomes across one batch.
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct BatchSummary {
    pub total: usize,
    pub updated: usize,
    pub not_found: usize,
    pub failed: usize,
}

impl BatchSummary {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            ..Self::default()
        }
    }

    /// Record a completed step. All-done results end the batch and are not
    /// counted.
    pub fn record(&mut self, status: StepStatus) {
        match status {
            StepStatus::Updated => self.updated += 1,
            StepStatus::NotFound => self.not_found += 1,
            StepStatus::AllDone => {}
        }
    }

    pub fn record_failure(&mut self) {
        self.failed += 1;
    }
}

/// Number of mappings in the currently persisted text.
pub fn mapping_total(connection: &Connection) -> Result<usize> {
    Ok(mappings::load_mappings(connection)?.len())
}

/// Process the mapping at `index`: resolve the from-slug to an item, rewrite
/// its slug, and substitute the new URL for the old one across item bodies,
/// layout meta, and menu URLs.
///
/// The mapping list is re-read from settings on every call, so the engine
/// holds no state between steps. Rename and propagation run inside a single
/// transaction; a storage failure rolls the whole step back and surfaces as
/// the returned error. Replaying an index whose rename already happened finds
/// nothing under the old slug and degrades to a `NotFound` no-op.
pub fn process_step(
    connection: &mut Connection,
    config: &SiteConfig,
    index: usize,
) -> Result<RenameResult> {
    let mapping_list = mappings::load_mappings(connection)?;
    let total = mapping_list.len();
    let Some(mapping) = mapping_list.into_iter().nth(index) else {
        return Ok(RenameResult::skipped(index, total, StepStatus::AllDone));
    };

    let transaction = connection
        .transaction()
        .context("failed to start rename transaction")?;

    let Some(item) = find_item_by_slug(&transaction, &mapping.from_slug, &RENAME_ELIGIBLE_KINDS)?
    else {
        return Ok(RenameResult {
            from_slug: Some(mapping.from_slug),
            to_slug: Some(mapping.to_slug),
            ..RenameResult::skipped(index, total, StepStatus::NotFound)
        });
    };

    // The old URL must be captured before the slug column changes.
    let old_url = config.permalink(&item.slug);
    update_item_slug(&transaction, item.id, &mapping.to_slug)?;
    let new_url = config.permalink(&mapping.to_slug);
    let changes = propagate_reference_update(&transaction, &old_url, &new_url)?;

    transaction
        .commit()
        .context("failed to commit rename transaction")?;

    Ok(RenameResult {
        index,
        total,
        status: StepStatus::Updated,
        from_slug: Some(mapping.from_slug),
        to_slug: Some(mapping.to_slug),
        item_id: Some(item.id),
        old_url: Some(old_url),
        new_url: Some(new_url),
        changes,
    })
}
