//! `geosync-core` is the pipeline library behind the `geosync` CLI.
//!
//! A pipeline is an ordered list of stages; each stage runs a fixed sequence
//! of steps against named workspaces and stops the whole run on the first
//! failure. This crate includes:
//! - **Code Translator**: lookup tables mapping stored codes to labels ([`translate`], [`tables`]).
//! - **Run Log**: timestamped, line-flushed run log mirrored to the `log` facade ([`runlog`]).
//! - **Replication**: staged full reloads of one dataset from another ([`replicate`]).
//! - **Derivation**: filtered copies, joins, spatial joins, dissolves, intersects and
//!   field calculations ([`derive`]).
//! - **Geocoding**: address locators, match status and locator publishing ([`geocode`], [`locator`]).
//! - **Exports**: review spreadsheets and dated partner packages ([`export`]).
//! - **Stage Runner**: abort-on-failure execution of stages ([`stage`]).
//! - **Configuration**: YAML pipeline definitions ([`config`]).

pub mod config;
pub mod context;
pub mod derive;
pub mod error;
pub mod export;
pub mod filter;
pub mod geocode;
pub mod locator;
pub mod mapping;
pub mod replicate;
pub mod runlog;
pub mod stage;
pub mod steps;
pub mod tables;
pub mod translate;
pub mod types;

pub use error::{ErrorKind, Result, SyncError};
