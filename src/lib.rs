//! Busybody: email-keyed person enrichment.
//!
//! Looks up each email against the FullContact person API, maps successful
//! payloads into normalized records, and keeps a failure ledger so transient
//! failures can be retried in a later pass.
//!
//! # Modules
//!
//! - `models`: Lookup results, ledger entries and record drafts.
//! - `payload`: Safe deep-get over nested JSON payloads.
//! - `mapper`: Payload to record bundle mapping.
//! - `ledger`: Failure ledger and retry state machine.
//! - `store`: Storage capability shared by the backends.
//! - `db`: Sqlite connection pool and schema bootstrap.
//! - `db_storage`: Relational store backend.
//! - `document_store`: JSON document store backend.
//! - `person_client`: Person lookup API client.
//! - `orchestrator`: Lookup and retry passes.
//! - `input`: Email list reader.
//! - `export`: CSV exports.
//! - `config`: Configuration management.
//! - `errors`: Error handling types.

pub mod config;
pub mod db;
pub mod db_storage;
pub mod document_store;
pub mod errors;
pub mod export;
pub mod input;
pub mod ledger;
pub mod mapper;
pub mod models;
pub mod orchestrator;
pub mod payload;
pub mod person_client;
pub mod store;
