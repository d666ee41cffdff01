//! # Oráculo
//!
//! A conversational assistant that resolves questions through a staged
//! pipeline: a similarity cache of prior answers, a curated training
//! corpus, a self-updating learned corpus cross-checked against live web
//! search, and web search alone as the last resort.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────────────────────────┐   ┌──────────┐
//! │   HTTP   │──▶│           Pipeline             │──▶│ Providers │
//! │ sessions │   │ cache ▸ training ▸ learned+web │   │ chat/embed│
//! └────┬─────┘   └───────────────┬───────────────┘   └──────────┘
//!      │                         │
//!      ▼                         ▼
//! ┌──────────┐        ┌───────────────────┐
//! │  SQLite   │        │   data/ corpora    │
//! │ users+msgs│        │ cache.json + .txt  │
//! └──────────┘        └───────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! oraculo init                  # create database and data layout
//! oraculo ask "Qual é a capital da França?"
//! oraculo chat                  # interactive REPL
//! ORACULO_SECRET=... oraculo serve
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`chunk`] | Text chunking |
//! | [`extract`] | PDF and EPUB text extraction |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`llm`] | Chat model abstraction and token accounting |
//! | [`retriever`] | Corpus similarity search |
//! | [`cache`] | Question/answer cache |
//! | [`knowledge`] | Learned-document store |
//! | [`websearch`] | DuckDuckGo research |
//! | [`pipeline`] | Staged answer resolution |
//! | [`auth`] | Accounts and bearer tokens |
//! | [`sessions`] | Chat sessions and history |
//! | [`server`] | HTTP API |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod auth;
pub mod cache;
pub mod chunk;
pub mod config;
pub mod db;
pub mod embedding;
pub mod extract;
pub mod knowledge;
pub mod llm;
pub mod migrate;
pub mod models;
pub mod pipeline;
pub mod retriever;
pub mod server;
pub mod sessions;
pub mod websearch;
