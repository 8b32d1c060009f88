//! # What is stockledger?
//!
//! stockledger is a typed client for a remote stock ledger: a JSON service that owns users,
//! balances, listed stocks and holdings. Every interesting computation (pricing, balance updates,
//! holdings accounting) happens on the server. This crate does not try to replicate any of it,
//! it declares the operations the server offers and keeps a local, observable copy of what the
//! server last said.
//!
//! # Implementation
//!
//! The crate is composed of:
//! - The transfer objects in [model](crate::model), which mirror the wire schema. Requests are
//! validated when they are built so that a bad amount or a missing selection never costs a
//! round trip.
//! - The client contract, [Client](crate::http::ledger::ledger_client::Client), and its
//! reqwest implementation [HttpClient](crate::http::ledger::ledger_client::HttpClient). A call is
//! a single request: no retries, no caching, and the only error signal from the server is a
//! non-2xx status.
//! - The synchronization layer, [LedgerSync](crate::sync::LedgerSync), which runs calls as tasks
//! on a tokio runtime and publishes results into [Store](crate::sync::Store) slots that a front-end
//! can subscribe to. Informational results and failures go to separate channels.
//! - A stub server, [ledger_stub](crate::http::ledger::ledger_stub), which serves the same routes
//! from an in-memory snapshot. It is there for development and tests, it does no accounting.
//!
//! The base address always comes from [LedgerConfig](crate::config::LedgerConfig), either built
//! explicitly or read from `STOCKLEDGER_BASE_URL`.
//!
//! ``
//! cargo run --bin stub_ledger_server [ipv4_address] [port]
//! cargo run --bin ledger_client_test [base_url]
//! ``
pub mod config;
pub mod error;
pub mod http;
pub mod model;
pub mod sync;
