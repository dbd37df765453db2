//! This crate provides a server that summarises equipment sensor readings. Operators upload CSV
//! tables of readings (equipment name, type, flowrate, pressure and temperature); each upload is
//! reduced to a compact statistical envelope and only the most recent envelopes are retained.
//! A client library talks to the server and recovers from access token expiry without the caller
//! noticing.
//!
//! The pieces are:
//!
//! * [ingest] reduces parsed rows to an [models::EnvelopeSummary] in a single pass.
//! * [retention] keeps a bounded window of [models::AggregateEnvelope]s, evicting the oldest as
//!   part of every append, over a memory or [sled] backend.
//! * [client] provides [client::ResilientClient], which refreshes its credential pair and retries
//!   a request once when the server answers 401 Unauthorized.
//! * [report] projects an envelope into the data a report document shows, and renders it.
//!
//! The server is built on top of a number of open source components.
//!
//! * [Tokio](tokio), the most popular asynchronous Rust runtime.
//! * [Axum](axum) web framework, built by the Tokio team, on top of the [hyper] HTTP library.
//! * [Serde](serde) performs (de)serialisation of JSON request and response data.
//! * [csv] decodes uploaded tables.
//! * [reqwest] carries the client's requests.

pub mod app;
pub mod app_state;
pub mod auth;
pub mod cli;
pub mod client;
pub mod error;
pub mod ingest;
pub mod metrics;
pub mod models;
pub mod report;
pub mod resource_manager;
pub mod retention;
pub mod server;
pub mod table;
#[cfg(test)]
pub mod test_utils;
pub mod tracing;
pub mod validated_json;
