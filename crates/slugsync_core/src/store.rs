use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use rusqlite::{Connection, params, params_from_iter};

/// Meta key holding a serialized page-builder layout document.
pub const LAYOUT_META_KEY: &str = "page_layout";
/// Meta key holding a navigation menu entry's target URL.
pub const MENU_URL_META_KEY: &str = "nav_menu_url";
/// Settings key holding the raw slug mapping text.
pub const MAPPINGS_SETTING_KEY: &str = "slug_mappings";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ItemKind {
    Page,
    Post,
    MenuEntry,
}

impl ItemKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Page => "page",
            Self::Post => "post",
            Self::MenuEntry => "menu_entry",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "page" => Some(Self::Page),
            "post" => Some(Self::Post),
            "menu_entry" => Some(Self::MenuEntry),
            _ => None,
        }
    }
}

/// Kinds whose slugs are addressable and therefore eligible for rename.
/// Menu entries carry slugs only as labels and are never rename targets.
pub const RENAME_ELIGIBLE_KINDS: [ItemKind; 2] = [ItemKind::Page, ItemKind::Post];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentItem {
    pub id: i64,
    pub kind: ItemKind,
    pub slug: String,
    pub title: String,
    pub body: String,
}

/// Open a store that must already exist with a current schema. Commands that
/// read or mutate content go through this gate; `open_store` is for creation.
pub fn open_ready_store(db_path: &Path) -> Result<Connection> {
    if !db_path.exists() {
        bail!(
            "store database not found at {}\n{}",
            db_path.display(),
            crate::runtime::INIT_POLICY_MESSAGE
        );
    }
    if crate::migrate::pending_migration_count(db_path)? > 0 {
        bail!(
            "store schema is behind. {}",
            crate::runtime::INIT_POLICY_MESSAGE
        );
    }
    open_store(db_path)
}

/// Open the store at `db_path` with the standard connection settings,
/// creating parent directories as needed.
pub fn open_store(db_path: &Path) -> Result<Connection> {
    ensure_db_parent(db_path)?;
    let connection = Connection::open(db_path)
        .with_context(|| format!("failed to open {}", db_path.display()))?;
    connection
        .busy_timeout(Duration::from_secs(5))
        .context("failed to set sqlite busy timeout")?;
    connection
        .pragma_update(None, "foreign_keys", "ON")
        .context("failed to enable foreign_keys pragma")?;
    connection
        .pragma_update(None, "journal_mode", "WAL")
        .context("failed to enable WAL journal mode")?;
    Ok(connection)
}

pub fn insert_item(
    connection: &Connection,
    kind: ItemKind,
    slug: &str,
    title: &str,
    body: &str,
) -> Result<i64> {
    connection
        .execute(
            "INSERT INTO content_items (kind, slug, title, body) VALUES (?1, ?2, ?3, ?4)",
            params![kind.as_str(), slug, title, body],
        )
        .with_context(|| format!("failed to insert {} item with slug {slug}", kind.as_str()))?;
    Ok(connection.last_insert_rowid())
}

pub fn insert_meta(
    connection: &Connection,
    item_id: i64,
    meta_key: &str,
    meta_value: &str,
) -> Result<i64> {
    connection
        .execute(
            "INSERT INTO item_meta (item_id, meta_key, meta_value) VALUES (?1, ?2, ?3)",
            params![item_id, meta_key, meta_value],
        )
        .with_context(|| format!("failed to insert meta {meta_key} for item {item_id}"))?;
    Ok(connection.last_insert_rowid())
}

/// Look up the item with the lowest id whose current slug equals `slug`,
/// scoped to `kinds`. Not finding one is a normal outcome, not an error.
pub fn find_item_by_slug(
    connection: &Connection,
    slug: &str,
    kinds: &[ItemKind],
) -> Result<Option<ContentItem>> {
    if kinds.is_empty() {
        return Ok(None);
    }
    let placeholders = (2..kinds.len() + 2)
        .map(|n| format!("?{n}"))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "SELECT id, kind, slug, title, body
         FROM content_items
         WHERE slug = ?1 AND kind IN ({placeholders})
         ORDER BY id ASC
         LIMIT 1"
    );

    let mut statement = connection
        .prepare(&sql)
        .context("failed to prepare slug lookup")?;
    let mut values: Vec<&str> = Vec::with_capacity(kinds.len() + 1);
    values.push(slug);
    values.extend(kinds.iter().map(|kind| kind.as_str()));
    let mut rows = statement
        .query(params_from_iter(values))
        .context("failed to run slug lookup")?;
    let row = match rows.next().context("failed to read slug lookup row")? {
        Some(row) => row,
        None => return Ok(None),
    };
    Ok(Some(decode_item_row(row)?))
}

/// Load one item by id.
pub fn load_item(connection: &Connection, item_id: i64) -> Result<Option<ContentItem>> {
    let mut statement = connection
        .prepare(
            "SELECT id, kind, slug, title, body
             FROM content_items
             WHERE id = ?1",
        )
        .context("failed to prepare item lookup")?;
    let mut rows = statement
        .query([item_id])
        .context("failed to run item lookup")?;
    let row = match rows.next().context("failed to read item row")? {
        Some(row) => row,
        None => return Ok(None),
    };
    Ok(Some(decode_item_row(row)?))
}

/// Set the slug column of one item. The partial unique index on addressable
/// kinds rejects a rename onto a slug another page or post already holds.
pub fn update_item_slug(connection: &Connection, item_id: i64, slug: &str) -> Result<()> {
    let updated = connection
        .execute(
            "UPDATE content_items SET slug = ?1 WHERE id = ?2",
            params![slug, item_id],
        )
        .with_context(|| format!("failed to update slug for item {item_id}"))?;
    if updated != 1 {
        bail!("no content item with id {item_id}");
    }
    Ok(())
}

pub fn get_setting(connection: &Connection, key: &str) -> Result<Option<String>> {
    let mut statement = connection
        .prepare("SELECT value FROM store_settings WHERE key = ?1")
        .context("failed to prepare settings lookup")?;
    let mut rows = statement
        .query([key])
        .context("failed to run settings lookup")?;
    let row = match rows.next().context("failed to read settings row")? {
        Some(row) => row,
        None => return Ok(None),
    };
    Ok(Some(
        row.get(0)
            .with_context(|| format!("failed to decode setting {key}"))?,
    ))
}

pub fn set_setting(connection: &Connection, key: &str, value: &str) -> Result<()> {
    connection
        .execute(
            "INSERT INTO store_settings (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )
        .with_context(|| format!("failed to write setting {key}"))?;
    Ok(())
}

/// First meta value stored under `meta_key` for an item.
pub fn load_meta_value(
    connection: &Connection,
    item_id: i64,
    meta_key: &str,
) -> Result<Option<String>> {
    let mut statement = connection
        .prepare(
            "SELECT meta_value FROM item_meta
             WHERE item_id = ?1 AND meta_key = ?2
             ORDER BY id ASC
             LIMIT 1",
        )
        .context("failed to prepare meta lookup")?;
    let mut rows = statement
        .query(params![item_id, meta_key])
        .context("failed to run meta lookup")?;
    let row = match rows.next().context("failed to read meta row")? {
        Some(row) => row,
        None => return Ok(None),
    };
    Ok(Some(row.get(0).with_context(|| {
        format!("failed to decode meta {meta_key} for item {item_id}")
    })?))
}

/// Item counts grouped by kind, for status reporting.
pub fn item_counts_by_kind(connection: &Connection) -> Result<BTreeMap<String, usize>> {
    let mut statement = connection
        .prepare(
            "SELECT kind, COUNT(*) AS count
             FROM content_items
             GROUP BY kind
             ORDER BY kind ASC",
        )
        .context("failed to prepare kind aggregation query")?;

    let rows = statement
        .query_map([], |row| {
            let kind: String = row.get(0)?;
            let count: i64 = row.get(1)?;
            Ok((kind, count))
        })
        .context("failed to run kind aggregation query")?;

    let mut out = BTreeMap::new();
    for row in rows {
        let (kind, count) = row.context("failed to decode kind aggregation row")?;
        out.insert(
            kind,
            usize::try_from(count).context("item count does not fit into usize")?,
        );
    }
    Ok(out)
}

fn decode_item_row(row: &rusqlite::Row<'_>) -> Result<ContentItem> {
    let kind_raw: String = row.get(1).context("failed to decode item kind")?;
    let kind = ItemKind::parse(&kind_raw)
        .ok_or_else(|| anyhow::anyhow!("unknown item kind in store: {kind_raw}"))?;
    Ok(ContentItem {
        id: row.get(0).context("failed to decode item id")?,
        kind,
        slug: row.get(2).context("failed to decode item slug")?,
        title: row.get(3).context("failed to decode item title")?,
        body: row.get(4).context("failed to decode item body")?,
    })
}

fn ensure_db_parent(db_path: &Path) -> Result<()> {
    match db_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            fs::create_dir_all(parent).with_context(|| {
                format!(
                    "failed to create database parent directory {}",
                    parent.display()
                )
            })
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;
    use crate::migrate::run_migrations;

    fn test_store() -> (tempfile::TempDir, Connection) {
        let temp = tempdir().expect("tempdir");
        let db_path = temp.path().join("store.db");
        run_migrations(&db_path).expect("migrations");
        let connection = open_store(&db_path).expect("open store");
        (temp, connection)
    }

    #[test]
    fn ready_store_rejects_missing_database() {
        let temp = tempdir().expect("tempdir");
        let error =
            open_ready_store(&temp.path().join("absent.db")).expect_err("must fail");
        assert!(error.to_string().contains("store database not found"));
    }

    #[test]
    fn ready_store_opens_migrated_database() {
        let temp = tempdir().expect("tempdir");
        let db_path = temp.path().join("store.db");
        run_migrations(&db_path).expect("migrations");
        let connection = open_ready_store(&db_path).expect("open ready store");
        insert_item(&connection, ItemKind::Page, "home", "Home", "").expect("insert");
    }

    #[test]
    fn insert_and_find_item_by_slug() {
        let (_temp, connection) = test_store();
        let id = insert_item(&connection, ItemKind::Page, "pricing", "Pricing", "body")
            .expect("insert");

        let item = find_item_by_slug(&connection, "pricing", &RENAME_ELIGIBLE_KINDS)
            .expect("lookup")
            .expect("item present");
        assert_eq!(item.id, id);
        assert_eq!(item.kind, ItemKind::Page);
        assert_eq!(item.slug, "pricing");
        assert_eq!(item.title, "Pricing");
        assert_eq!(item.body, "body");
    }

    #[test]
    fn find_item_scopes_by_kind() {
        let (_temp, connection) = test_store();
        insert_item(&connection, ItemKind::MenuEntry, "pricing", "Pricing", "")
            .expect("insert menu entry");

        let found = find_item_by_slug(&connection, "pricing", &RENAME_ELIGIBLE_KINDS)
            .expect("lookup");
        assert!(found.is_none());

        let found = find_item_by_slug(&connection, "pricing", &[ItemKind::MenuEntry])
            .expect("lookup")
            .expect("menu entry present");
        assert_eq!(found.kind, ItemKind::MenuEntry);
    }

    #[test]
    fn find_item_with_empty_kind_list_matches_nothing() {
        let (_temp, connection) = test_store();
        insert_item(&connection, ItemKind::Page, "pricing", "Pricing", "").expect("insert");
        let found = find_item_by_slug(&connection, "pricing", &[]).expect("lookup");
        assert!(found.is_none());
    }

    #[test]
    fn update_item_slug_rewrites_the_row() {
        let (_temp, connection) = test_store();
        let id = insert_item(&connection, ItemKind::Post, "old", "Old", "").expect("insert");
        update_item_slug(&connection, id, "new").expect("update");

        let item = load_item(&connection, id).expect("load").expect("present");
        assert_eq!(item.slug, "new");
    }

    #[test]
    fn update_item_slug_fails_for_missing_id() {
        let (_temp, connection) = test_store();
        let error = update_item_slug(&connection, 999, "new").expect_err("must fail");
        assert!(error.to_string().contains("no content item with id 999"));
    }

    #[test]
    fn addressable_slugs_are_unique_across_pages_and_posts() {
        let (_temp, connection) = test_store();
        insert_item(&connection, ItemKind::Page, "shared", "Page", "").expect("insert page");
        let error = insert_item(&connection, ItemKind::Post, "shared", "Post", "")
            .expect_err("must violate unique index");
        assert!(error.to_string().contains("shared"));
    }

    #[test]
    fn menu_entries_may_repeat_addressable_slugs() {
        let (_temp, connection) = test_store();
        insert_item(&connection, ItemKind::Page, "shared", "Page", "").expect("insert page");
        insert_item(&connection, ItemKind::MenuEntry, "shared", "Menu", "")
            .expect("menu entry allowed");
    }

    #[test]
    fn settings_round_trip_and_overwrite() {
        let (_temp, connection) = test_store();
        assert!(get_setting(&connection, "missing").expect("lookup").is_none());

        set_setting(&connection, "flavor", "first").expect("set");
        assert_eq!(
            get_setting(&connection, "flavor").expect("lookup").as_deref(),
            Some("first")
        );

        set_setting(&connection, "flavor", "second").expect("overwrite");
        assert_eq!(
            get_setting(&connection, "flavor").expect("lookup").as_deref(),
            Some("second")
        );
    }

    #[test]
    fn meta_values_load_by_key() {
        let (_temp, connection) = test_store();
        let id = insert_item(&connection, ItemKind::Page, "home", "Home", "").expect("insert");
        insert_meta(&connection, id, LAYOUT_META_KEY, "[]").expect("insert meta");

        assert_eq!(
            load_meta_value(&connection, id, LAYOUT_META_KEY)
                .expect("lookup")
                .as_deref(),
            Some("[]")
        );
        assert!(
            load_meta_value(&connection, id, MENU_URL_META_KEY)
                .expect("lookup")
                .is_none()
        );
    }

    #[test]
    fn item_counts_group_by_kind() {
        let (_temp, connection) = test_store();
        insert_item(&connection, ItemKind::Page, "a", "", "").expect("insert");
        insert_item(&connection, ItemKind::Page, "b", "", "").expect("insert");
        insert_item(&connection, ItemKind::MenuEntry, "menu-a", "", "").expect("insert");

        let counts = item_counts_by_kind(&connection).expect("counts");
        assert_eq!(counts.get("page"), Some(&2));
        assert_eq!(counts.get("menu_entry"), Some(&1));
        assert_eq!(counts.get("post"), None);
    }
}
