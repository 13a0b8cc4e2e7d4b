//! # Spec Registry
//!
//! A registry for machine-readable API description documents (OpenAPI v3 /
//! Swagger v2).
//!
//! Spec Registry accepts a description document, validates it against its
//! schema family, deduplicates it by content-addressable identity, stores it
//! in a search-indexed SQLite database, and lets owners manage a
//! human-readable slug and refresh the stored copy from its source URL.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌────────────┐   ┌───────────┐
//! │ CLI/HTTP  │──▶│ Registry    │──▶│  SQLite   │
//! │ (specreg) │   │ controller │   │  + FTS5   │
//! └───────────┘   └─────┬──────┘   └───────────┘
//!                       │
//!            ┌──────────┼──────────┐
//!            ▼          ▼          ▼
//!       ┌─────────┐ ┌────────┐ ┌────────┐
//!       │Normalize│ │Refresh │ │ Notify │
//!       │Validate │ │ (HTTP) │ │ (hook) │
//!       └─────────┘ └────────┘ └────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! specreg init                          # create database
//! specreg register --file api.json --user alice
//! specreg get all
//! specreg slug <id> --user alice --set myapi
//! specreg refresh <id>
//! specreg serve                         # start HTTP server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`metadata`] | Document validation and identity derivation |
//! | [`store`] | Document store adapter (SQLite + FTS5) |
//! | [`slug`] | Slug rule validation |
//! | [`registry`] | Registration controller |
//! | [`fetch`] | Outbound HTTP fetch capability |
//! | [`refresh`] | Refresh reconciliation |
//! | [`notify`] | Registration event notification |
//! | [`export`] | Backup and restore |
//! | [`server`] | HTTP API server |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod config;
pub mod db;
pub mod export;
pub mod fetch;
pub mod metadata;
pub mod migrate;
pub mod models;
pub mod notify;
pub mod refresh;
pub mod registry;
pub mod server;
pub mod slug;
pub mod store;
