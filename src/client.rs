use anyhow::{Context, Result, bail};
use reqwest::Url;
use reqwest::blocking::{Client as HttpClient, Response};
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::de::DeserializeOwned;
use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::cache::LruCache;
use crate::catalog::{ALL_DATASETS, LayerTable, TableReply};
use crate::config::{ClientConfig, load_config};
use crate::error::{format_erddap_error, parse_erddap_error};
use crate::filter::{LayerListing, filter_layers};
use crate::griddap::{
    Constraints, GriddapSession, axis_url, dds_url, default_constraints, parse_dds,
};
use crate::local::{LocalInventory, list_local_data};
use crate::prompt::{Confirm, StdinConfirm};
use crate::query::LayerQuery;
use crate::util::{normalize_server, urljoin};

/// Distinct layer queries remembered by a client.
const LAYER_CACHE_CAPACITY: usize = 8;
/// One catalog with and one without the `allDatasets` row.
const CATALOG_CACHE_CAPACITY: usize = 2;

/// Client for one ERDDAP server.
///
/// Clones share the catalog and layer caches.
#[derive(Clone)]
pub struct Client {
    config: ClientConfig,
    step: u32,
    pub(crate) progress: bool,
    pub(crate) confirm: Arc<dyn Confirm>,
    pub(crate) http: HttpClient,

    catalog: Arc<Mutex<LruCache<bool, Arc<LayerTable>>>>,
    layers: Arc<Mutex<LruCache<LayerQuery, Arc<LayerListing>>>>,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("config", &self.config)
            .field("step", &self.step)
            .field("progress", &self.progress)
            .finish_non_exhaustive()
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Client {
    /// Creates a client using environment variables and/or the configuration file.
    ///
    /// This is equivalent to `Client::new(None, None, None)`.
    pub fn from_env() -> Result<Self> {
        Self::new(None, None, None)
    }

    /// Creates a client using (in order of precedence):
    /// - explicit arguments
    /// - environment variables `BIOORACLE_SERVER` / `BIOORACLE_DATA_DIR` /
    ///   `BIOORACLE_SKIP_CONFIRMATION`
    /// - the configuration file (`BIOORACLE_CONFIG`, or the platform config dir)
    pub fn new(
        server: Option<String>,
        data_directory: Option<std::path::PathBuf>,
        skip_confirmation: Option<bool>,
    ) -> Result<Self> {
        let cfg = load_config(server, data_directory, skip_confirmation)?;
        Self::with_config(cfg)
    }

    /// Creates a client from a fully specified configuration.
    pub fn with_config(mut config: ClientConfig) -> Result<Self> {
        config.server = normalize_server(&config.server);

        let mut default_headers = HeaderMap::new();
        default_headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("biooracle-rs/{}", env!("CARGO_PKG_VERSION")))
                .unwrap_or(HeaderValue::from_static("biooracle-rs")),
        );

        // Catalog and metadata requests never time out; downloads take
        // their own timeout per request.
        let http = HttpClient::builder()
            .default_headers(default_headers)
            .timeout(None::<Duration>)
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            config,
            step: 1,
            progress: true,
            confirm: Arc::new(StdinConfirm),
            http,
            catalog: Arc::new(Mutex::new(LruCache::new(CATALOG_CACHE_CAPACITY))),
            layers: Arc::new(Mutex::new(LruCache::new(LAYER_CACHE_CAPACITY))),
        })
    }

    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    /// Replaces the stdin prompt used before downloads.
    pub fn with_confirm(mut self, confirm: impl Confirm + 'static) -> Self {
        self.confirm = Arc::new(confirm);
        self
    }

    /// Default stride for every grid dimension.
    pub fn with_step(mut self, step: u32) -> Self {
        self.step = step.max(1);
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn server(&self) -> &str {
        &self.config.server
    }

    /// Every dataset the server publishes, fetched once and memoized.
    ///
    /// The server lists itself first as `allDatasets`; that row is dropped
    /// unless `include_meta_row` is set.
    pub fn catalog(&self, include_meta_row: bool) -> Result<Arc<LayerTable>> {
        if let Some(hit) = lock(&self.catalog).get(&include_meta_row) {
            return Ok(hit);
        }

        let url = urljoin(&self.config.server, &format!("tabledap/{}.json", ALL_DATASETS));
        tracing::debug!(%url, include_meta_row, "fetching catalog");
        let reply: TableReply = self.get_json(&url)?;
        let table = Arc::new(
            reply
                .into_catalog(include_meta_row)
                .with_context(|| format!("unexpected catalog layout (url={})", url))?,
        );

        lock(&self.catalog).insert(include_meta_row, Arc::clone(&table));
        Ok(table)
    }

    /// Lists layers matching `query`.
    ///
    /// Filter values outside their vocabulary are reported on stdout and
    /// still applied. Results are cached per query; a repeated query returns
    /// the same `Arc`.
    pub fn list_layers(&self, query: &LayerQuery) -> Result<Arc<LayerListing>> {
        for invalid in query.validate() {
            println!("{}", invalid);
        }

        let query = &query.normalized();
        if let Some(hit) = lock(&self.layers).get(query) {
            tracing::debug!(?query, "layer cache hit");
            return Ok(hit);
        }

        let catalog = self.catalog(query.include_meta_row)?;
        let listing = Arc::new(filter_layers(&catalog, query)?);

        let mut layers = lock(&self.layers);
        layers.insert(query.clone(), Arc::clone(&listing));
        tracing::debug!(?query, rows = listing.len(), cached = layers.len(), "layer cache miss");
        Ok(listing)
    }

    /// Forgets memoized catalogs and layer listings.
    pub fn clear_caches(&self) {
        lock(&self.catalog).clear();
        lock(&self.layers).clear();
    }

    /// Reads the dataset's structure and axis ranges into a fresh session.
    pub fn griddap_session(&self, dataset_id: &str) -> Result<GriddapSession> {
        let server = &self.config.server;
        let dds = self.get_text(&dds_url(server, dataset_id))?;
        let (dimensions, variables) = parse_dds(&dds)
            .with_context(|| format!("failed to read structure of dataset `{}`", dataset_id))?;

        let mut constraints = Constraints::new();
        for dim in &dimensions {
            let axis: TableReply = self.get_json(&axis_url(server, dataset_id, dim))?;
            constraints.extend(default_constraints(dim, &axis.first_column(), self.step)?);
        }

        Ok(GriddapSession::new(
            server,
            dataset_id,
            dimensions,
            variables,
            constraints,
        ))
    }

    /// Builds the grid-data download URL for a dataset.
    ///
    /// `constraints` override the dataset defaults (unknown keys are
    /// ignored); `variables` narrows the dataset's variables, an empty slice
    /// keeps them all.
    pub fn resolve_url(
        &self,
        dataset_id: &str,
        variables: Option<&[String]>,
        constraints: Option<&Constraints>,
        response_format: &str,
        verbose: bool,
    ) -> Result<Url> {
        let mut session = self.griddap_session(dataset_id)?;

        if verbose {
            println!("Selected '{}' dataset.", dataset_id);
            println!("Dataset info available at: {}", session.info_url());
        }

        if let Some(constraints) = constraints {
            session.apply_constraints(constraints);
        }
        if let Some(variables) = variables.filter(|v| !v.is_empty()) {
            session.restrict_variables(variables)?;
        }

        if verbose {
            println!(
                "Selected {} variables: {}.",
                session.variables().len(),
                session.variables().join(", ")
            );
        }
        session.download_url(response_format)
    }

    /// Lists downloaded files in `directory` (default: the data directory).
    pub fn list_local_data(&self, directory: Option<&Path>, verbose: bool) -> Result<LocalInventory> {
        let directory = directory.unwrap_or(self.config.data_directory.as_path());
        list_local_data(directory, verbose)
    }

    pub(crate) fn get_text(&self, url: &str) -> Result<String> {
        tracing::debug!(%url, "GET");
        let resp = self
            .http
            .get(url)
            .send()
            .with_context(|| format!("could not connect to {}", url))?;
        let resp = self.check_status(resp, url)?;
        resp.text()
            .with_context(|| format!("failed to read response body (url={})", url))
    }

    pub(crate) fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let text = self.get_text(url)?;
        serde_json::from_str::<T>(&text)
            .with_context(|| format!("failed to parse ERDDAP JSON (url={})", url))
    }

    /// Turns non-success responses into errors, decoding ERDDAP's error body.
    pub(crate) fn check_status(&self, resp: Response, url: &str) -> Result<Response> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let text = resp.text().unwrap_or_default();
        if let Some(err) = parse_erddap_error(&text) {
            return Err(format_erddap_error(status, url, &err));
        }

        bail!(
            "ERDDAP request failed: HTTP {} for url ({})\n{}",
            status,
            url,
            text
        )
    }
}
