//! # Tabcat
//!
//! A schema-less catalog ingestion and search engine for tabular product data.
//!
//! Tabcat accepts whatever spreadsheet or delimited file a supplier provides,
//! canonicalizes its headers, detects the type of every cell, and stores each
//! row as a self-describing document. Search runs over the stored documents
//! with attribute filters and a relevance-ranked keyword mode.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌───────────┐
//! │  Row reader │──▶│  Ingestion    │──▶│  SQLite    │
//! │  CSV/XLSX   │   │ Normalize+    │   │  JSON1     │
//! └─────────────┘   │ Detect types  │   └─────┬─────┘
//!                   └──────────────┘         │
//!                                            ▼
//!                                      ┌───────────┐
//!                                      │  Search &  │
//!                                      │  Ranking   │
//!                                      └───────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! tabcat init                                 # create database
//! tabcat ingest suppliers/acme.xlsx           # ingest a catalog file
//! tabcat search "25mm copper pipe"            # ranked keyword search
//! tabcat search --filter "size_millimeter=20..30"
//! tabcat filters                              # discover filterable attributes
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`normalize`] | Header canonicalization and token generation |
//! | [`detect`] | Attribute type detection |
//! | [`rows`] | CSV/TSV/XLSX row readers |
//! | [`ingest`] | Ingestion pipeline |
//! | [`sequence`] | Business id generation |
//! | [`search`] | Filtered and relevance-ranked search |
//! | [`store`] | Storage abstraction (in-memory and SQLite) |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod config;
pub mod db;
pub mod detect;
pub mod error;
pub mod ingest;
pub mod migrate;
pub mod models;
pub mod normalize;
pub mod rows;
pub mod search;
pub mod sequence;
pub mod store;
