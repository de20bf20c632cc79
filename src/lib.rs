//! # Portfolio Companion
//!
//! Retrieval-augmented question answering over a personal portfolio.
//!
//! Three sources (portfolio profile records, GitHub repositories, and a
//! resume PDF) are snapshotted to JSON, chunked, and indexed into
//! OpenSearch. At query time the retriever picks a budgeted, per-source
//! balanced set of chunks, the prompt composer renders them, and the answer
//! comes from a persistent prompt cache or the completion service.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌───────────┐   ┌─────────┐   ┌────────────┐
//! │ Source       │──▶│ Snapshots │──▶│ Chunker │──▶│  Indexer   │
//! │ Readers      │   │  (JSON)   │   └─────────┘   │ OpenSearch │
//! └──────────────┘   └───────────┘                 └─────┬──────┘
//!        ▲                                               │
//!        └──────── Reindex Scheduler (hourly) ───────────┤
//!                                                        ▼
//!  question ──▶ Retriever ──▶ Prompt Composer ──▶ Answer Cache ──▶ Completion
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! companion snapshot all --force     # fetch all three sources
//! companion reindex                  # regenerate snapshots, rebuild the index
//! companion search "rust projects"   # inspect selected context
//! companion ask "What has she built with Go?"
//! companion serve                    # HTTP API + hourly reindex
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`models`] | Core data types |
//! | [`error`] | Typed failures |
//! | [`sources`] | Source reader trait and snapshot refresh |
//! | [`connector_profile`] | Portfolio API reader |
//! | [`connector_github`] | GitHub repositories reader |
//! | [`connector_resume`] | Resume PDF reader |
//! | [`snapshot`] | Snapshot files |
//! | [`chunk`] | Snapshot chunking |
//! | [`ingest`] | Snapshot → chunk pipeline |
//! | [`store`] | Search backend abstraction (OpenSearch, in-memory) |
//! | [`indexer`] | Drop-and-recreate indexing |
//! | [`search`] | Simple and weighted retrieval |
//! | [`prompt`] | Prompt composition |
//! | [`completion`] | Completion service clients |
//! | [`cache`] | Prompt → answer cache |
//! | [`context`] | Read path wiring |
//! | [`scheduler`] | Periodic reindex |
//! | [`server`] | HTTP API |

pub mod cache;
pub mod chunk;
pub mod completion;
pub mod config;
pub mod connector_github;
pub mod connector_profile;
pub mod connector_resume;
pub mod context;
pub mod error;
pub mod indexer;
pub mod ingest;
pub mod models;
pub mod prompt;
pub mod scheduler;
pub mod search;
pub mod server;
pub mod snapshot;
pub mod sources;
pub mod store;
