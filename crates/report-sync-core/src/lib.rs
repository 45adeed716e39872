//! # Report Sync Core
//!
//! Shared, runtime-agnostic logic for Daily Report Sync: data models, report
//! extraction, fiscal-year bucketing, the message-source and document-store
//! abstractions, and the idempotent merge that reconciles buckets against a
//! document store.
//!
//! This crate contains no HTTP clients and no tokio runtime. The Slack and
//! Notion clients live in the `daily-report-sync` crate and plug in through
//! [`source::MessageSource`] and [`store::DocumentStore`].

pub mod bucket;
pub mod extract;
pub mod fiscal;
pub mod merge;
pub mod models;
pub mod paginate;
pub mod source;
pub mod store;
