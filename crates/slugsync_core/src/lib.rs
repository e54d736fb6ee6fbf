//! Core engine for slugsync: rename content-item slugs in a SQLite content
//! store and rewrite the renamed URLs across item bodies, page-builder layout
//! meta, and navigation menu entries.

pub mod config;
pub mod engine;
pub mod mappings;
pub mod migrate;
pub mod propagate;
pub mod runtime;
pub mod slug;
pub mod store;
