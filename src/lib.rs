//! # HN Lake
//!
//! A Hacker News data-lake pipeline: fetch stories and comments from
//! the Firebase API, land them in a layered object-store lake, and
//! refine them through validated processing and temporal enrichment.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────┐   ┌───────────────┐   ┌──────────┐
//! │ HN API   │──▶│   raw     │──▶│   processed   │──▶│  output  │
//! │ Firebase │   │  (JSONL)  │   │  (validated)  │   │(enriched)│
//! └──────────┘   └───────────┘   └───────────────┘   └──────────┘
//!      ingest          │   process        │   transform    │
//!                      └── quality gates ─┴────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! hnlake ingest                      # fetch today's stories + comments
//! hnlake process                     # validate into the processed layer
//! hnlake transform                   # enrich into the output layer
//! hnlake process --date 2026-02-01   # reprocess a past partition
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Record model and value coercion |
//! | [`store`] | Object store trait and backend factory |
//! | [`store_fs`] | Filesystem-backed store |
//! | [`store_s3`] | S3-backed store (SigV4) |
//! | [`lake`] | Layer layout, partition loading and writing |
//! | [`hn_client`] | Rate-limited Hacker News API client |
//! | [`fetcher`] | Story and comment tree fetching |
//! | [`tracker`] | Multi-day story tracking window |
//! | [`ingest`] | Ingestion run orchestration |
//! | [`process`] | Normalization and validation |
//! | [`transform`] | Temporal enrichment, topics, sentiment |
//! | [`quality`] | Reusable quality checks |
//! | [`quality_runner`] | Fixed batteries, reports, and the gate |
//! | [`text`] | HTML stripping, tokenization, TF-IDF |

pub mod config;
pub mod fetcher;
pub mod hn_client;
pub mod ingest;
pub mod lake;
pub mod models;
pub mod process;
pub mod quality;
pub mod quality_runner;
pub mod store;
pub mod store_fs;
pub mod store_s3;
pub mod text;
pub mod tracker;
pub mod transform;
