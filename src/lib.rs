//! # manual-assist
//!
//! Retrieval-augmented question answering over equipment service manuals.
//!
//! Uploaded PDF manuals are split into paragraph chunks, embedded, and stored
//! in a SQLite-backed vector index. Questions are embedded the same way, the
//! nearest chunks are spliced into a grounded prompt together with the recent
//! conversation, and a text-generation model produces the answer.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────────────┐   ┌──────────┐
//! │ Storage     │──▶│ Ingestion pipeline   │──▶│  SQLite   │
//! │ event / CLI │   │ extract+chunk+embed  │   │  chunks   │
//! └─────────────┘   └──────────────────────┘   └────┬─────┘
//!                                                   │
//!                   ┌──────────────────────┐        │
//!  POST /query ────▶│ Query orchestrator   │◀───────┘
//!                   │ retrieve+prompt+gen  │
//!                   └──────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! massist init                          # create database
//! massist ingest ./manual.pdf           # index a manual
//! massist ask "How do I replace the fuel filter?"
//! massist serve                         # start HTTP server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`error`] | Pipeline and caller-facing error kinds |
//! | [`extract`] | PDF text extraction |
//! | [`chunk`] | Paragraph chunking |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`store`] | Chunk store and vector index |
//! | [`source`] | Access to uploaded document bytes |
//! | [`ingest`] | Ingestion pipeline |
//! | [`retrieval`] | Nearest-chunk retrieval |
//! | [`prompt`] | Prompt composition |
//! | [`generation`] | Answer generation providers |
//! | [`query`] | Query orchestration |
//! | [`auth`] | Bearer-token authentication |
//! | [`secret`] | API key handling |
//! | [`services`] | One-time service initialisation |
//! | [`server`] | HTTP server |
//! | [`stats`] | Index statistics |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod auth;
pub mod chunk;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod generation;
pub mod ingest;
pub mod migrate;
pub mod models;
pub mod prompt;
pub mod query;
pub mod retrieval;
pub mod secret;
pub mod server;
pub mod services;
pub mod source;
pub mod stats;
pub mod store;
