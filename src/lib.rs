//! # Mentor Harness
//!
//! A multi-provider AI orchestration pipeline for mentoring agents.
//!
//! One user turn flows through a search provider chain, a pure prompt
//! composer, a chat-completion adapter, a grounding validator that can
//! force a single regeneration, and an append-only usage ledger that
//! enforces spend quotas before any provider is called.
//!
//! ```text
//! ┌────────┐   ┌─────────┐   ┌──────────┐   ┌──────────┐
//! │ Search │──▶│ Compose │──▶│ Complete │──▶│ Validate │
//! │ chain  │   │ (pure)  │   │ adapter  │   │ (1 regen)│
//! └────────┘   └─────────┘   └──────────┘   └────┬─────┘
//!      ▲                                         │
//!      │          quota gate (pre-flight)        ▼
//!      └────────────── SQLite ledger ◀───────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`agent`] | Agent personas and model settings |
//! | [`search`] | Search provider chain with static fallback |
//! | [`compose`] | Prompt composition |
//! | [`completion`] | Chat-completion adapter and price table |
//! | [`validate`] | Grounding score and regeneration prompt |
//! | [`ledger`] | Append-only usage log and quota gate |
//! | [`session`] | Conversation sessions |
//! | [`pipeline`] | Turn orchestration |
//! | [`retry`] | Bounded retry policy |
//! | [`server`] | JSON HTTP server |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod agent;
pub mod completion;
pub mod compose;
pub mod config;
pub mod db;
pub mod ledger;
pub mod migrate;
pub mod models;
pub mod pipeline;
pub mod retry;
pub mod search;
pub mod server;
pub mod session;
pub mod validate;
