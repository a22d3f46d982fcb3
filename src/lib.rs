//! Compliance-document core for a youth organization: reconciles an external
//! folder-hierarchy object store against relational metadata, classifies
//! files by naming convention, enforces a rolling daily upload quota and
//! keeps an auditable version history with restore.

pub mod classifier;
pub mod config;
pub mod db;
pub mod drive;
pub mod error;
pub mod ledger;
pub mod models;
pub mod provisioner;
pub mod quota;
pub mod registry;
pub mod schema;
pub mod service;
pub mod store;
