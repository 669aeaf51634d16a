//! A small Rust client for the Bio-ORACLE ERDDAP server.
//!
//! This crate covers the whole layer workflow:
//! list and filter the server's catalog, resolve a grid-data download URL
//! with constraints, then stream the file into a local data directory.
//!
//! ## Quick start
//! - Configure the server and data directory via environment variables
//!   (`BIOORACLE_SERVER`, `BIOORACLE_DATA_DIR`) or the INI configuration file
//!   (created with defaults on first use).
//! - Call [`Client::list_layers`] with a [`LayerQuery`], then
//!   [`Client::download_layer`] with [`DownloadOptions`].
//!
//! ```no_run
//! use anyhow::Result;
//! use biooracle::{Client, DownloadOptions, LayerQuery};
//!
//! fn main() -> Result<()> {
//!     let client = Client::from_env()?;
//!
//!     let query = LayerQuery::new()
//!         .variables(["thetao", "so"])
//!         .time_period("present")
//!         .depth("surf")
//!         .ids();
//!     for id in client.list_layers(&query)?.dataset_ids() {
//!         println!("{id}");
//!     }
//!
//!     let options = DownloadOptions::new()
//!         .constraint("latitude>=", 0)
//!         .constraint("latitude<=", 10)
//!         .constraint("longitude>=", 0)
//!         .constraint("longitude<=", 10)
//!         .skip_confirmation(true);
//!     client.download_layer("thetao_baseline_2000_2019_depthsurf", &options)?;
//!     Ok(())
//! }
//! ```
//!
//! For full usage and configuration details, see the crate README.

#![forbid(unsafe_code)]

mod cache;
mod catalog;
mod client;
mod config;
mod download;
mod error;
mod filter;
mod griddap;
mod local;
mod prompt;
mod query;
mod util;

pub use catalog::{DATASET_ID, LayerTable, TITLE};
pub use client::Client;
pub use config::{
    ClientConfig, ConfigStore, DATA_DIRECTORY, DEFAULT_SERVER, ERDDAP_SERVER, SKIP_CONFIRMATION,
    Settings, parse_bool,
};
pub use download::DownloadOptions;
pub use error::SettingError;
pub use filter::{LayerListing, filter_layers};
pub use griddap::{ConstraintValue, Constraints, GriddapSession, parse_constraint};
pub use local::{LocalFile, LocalInventory, list_local_data};
pub use prompt::{Confirm, FixedAnswer, StdinConfirm};
pub use query::{
    DEPTHS, InvalidArgument, LayerQuery, OutputShape, SCENARIOS, Selection, TIME_PERIODS,
    VARIABLES, validate_argument,
};
