//! # GST Harness
//!
//! A local-first index of GST rule documents that stays in sync with a
//! watched folder, plus a router that sends each question to invoice data,
//! rule retrieval, or both.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌────────────────┐   ┌──────────────┐
//! │ watched dir  │──▶│ Ingestion       │──▶│ VectorStore  │
//! │ (notify)     │   │ extract+embed   │   │ JSON snapshot│
//! └──────────────┘   └────────────────┘   └──────┬───────┘
//!                                                │ read
//!      query ──▶ QueryClassifier ──▶ Orchestrator ┤
//!                                                │
//!                                   ┌────────────┴───┐
//!                                   │ SqlAgent (sqlx)│
//!                                   └────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! gsth watch                             # keep the index in sync
//! gsth ask "Is ITC allowed on invoice INV-7?"
//! gsth run                               # watcher + stdin query loop
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`store`] | Durable vector store |
//! | [`connector_fs`] | Watched-directory listing and filename filter |
//! | [`extract`] | Text extraction (text, PDF, DOCX) |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`ingest`] | Directory → store pipeline |
//! | [`reasoning`] | Reasoning oracle client |
//! | [`classifier`] | Query routing |
//! | [`structured`] | SQL collaborator over the invoice database |
//! | [`orchestrator`] | Per-category answer paths |
//! | [`error`] | Error taxonomy |

pub mod classifier;
pub mod config;
pub mod connector_fs;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod ingest;
pub mod orchestrator;
pub mod reasoning;
pub mod store;
pub mod structured;
