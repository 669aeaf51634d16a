use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::Url;
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use crate::client::Client;
use crate::griddap::{ConstraintValue, Constraints};
use crate::local::existing_layers;
use crate::util::{human_size, layer_filename, timestamp_now};

/// How a layer is downloaded. Defaults: NetCDF, verbose, logged,
/// timestamped file name, no timeout.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadOptions {
    /// Defaults to the configured data directory.
    pub output_directory: Option<PathBuf>,
    /// ERDDAP file type: `nc`, `csv`, `htmlTable`, ...
    pub response_format: String,
    pub constraints: Option<Constraints>,
    pub variables: Option<Vec<String>>,
    /// Defaults to the configured `skip_confirmation`.
    pub skip_confirmation: Option<bool>,
    pub verbose: bool,
    pub log: bool,
    pub timestamp: bool,
    /// Timeout of the file transfer only.
    pub timeout: Option<Duration>,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            output_directory: None,
            response_format: "nc".to_string(),
            constraints: None,
            variables: None,
            skip_confirmation: None,
            verbose: true,
            log: true,
            timestamp: true,
            timeout: None,
        }
    }
}

impl DownloadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn output_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_directory = Some(dir.into());
        self
    }

    pub fn response_format(mut self, format: impl Into<String>) -> Self {
        self.response_format = format.into();
        self
    }

    pub fn constraints(mut self, constraints: Constraints) -> Self {
        self.constraints = Some(constraints);
        self
    }

    /// Adds one constraint, e.g. `constraint("latitude>=", 0)`.
    pub fn constraint(mut self, key: &str, value: impl Into<ConstraintValue>) -> Self {
        self.constraints
            .get_or_insert_with(Constraints::new)
            .insert(key.to_string(), value.into());
        self
    }

    pub fn variables<I, S>(mut self, variables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.variables = Some(variables.into_iter().map(Into::into).collect());
        self
    }

    pub fn skip_confirmation(mut self, skip: bool) -> Self {
        self.skip_confirmation = Some(skip);
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn log(mut self, log: bool) -> Self {
        self.log = log;
        self
    }

    pub fn timestamp(mut self, timestamp: bool) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl Client {
    /// Downloads one layer to `{dir}/{dataset_id}_{timestamp}.{format}`.
    ///
    /// Returns `Ok(None)` when the user declines the confirmation prompt.
    pub fn download_layer(
        &self,
        dataset_id: &str,
        options: &DownloadOptions,
    ) -> Result<Option<PathBuf>> {
        let outdir = options
            .output_directory
            .clone()
            .unwrap_or_else(|| self.config().data_directory.clone());
        std::fs::create_dir_all(&outdir)
            .with_context(|| format!("failed to create directory {}", outdir.display()))?;

        let timestamp = options.timestamp.then(timestamp_now);
        let local_path = outdir.join(layer_filename(
            dataset_id,
            &options.response_format,
            timestamp.as_deref(),
        ));

        let skip = options
            .skip_confirmation
            .unwrap_or(self.config().skip_confirmation);
        if !skip && !self.confirm_existing(&outdir, dataset_id)? {
            println!("Download cancelled.");
            return Ok(None);
        }

        if options.log {
            let log_path = local_path.with_extension("log");
            let log_file = File::create(&log_path)
                .with_context(|| format!("failed to create log file {}", log_path.display()))?;
            let subscriber = tracing_subscriber::fmt()
                .with_writer(Mutex::new(log_file))
                .with_ansi(false)
                .with_target(false)
                .with_max_level(tracing::Level::INFO)
                .finish();
            tracing::subscriber::with_default(subscriber, || {
                self.fetch_layer(dataset_id, &outdir, &local_path, options)
            })?;
        } else {
            self.fetch_layer(dataset_id, &outdir, &local_path, options)?;
        }

        Ok(Some(local_path))
    }

    /// Downloads several layers one after the other.
    pub fn download_layers<I, S>(&self, dataset_ids: I, options: &DownloadOptions) -> Result<Vec<PathBuf>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut paths = Vec::new();
        for id in dataset_ids {
            if let Some(path) = self.download_layer(id.as_ref(), options)? {
                paths.push(path);
            }
        }
        Ok(paths)
    }

    fn confirm_existing(&self, outdir: &Path, dataset_id: &str) -> Result<bool> {
        println!("\nData directory is '{}'.\n", outdir.display());
        let existing = existing_layers(outdir, dataset_id)?;
        if existing.is_empty() {
            return Ok(true);
        }

        println!(
            "You have {} local datasets with the same prefix as '{}' in the data directory:",
            existing.len(),
            dataset_id
        );
        for layer in &existing {
            println!("{}\t{}", layer.name, human_size(layer.size));
        }
        println!();
        println!("You can check it again by running `list_local_data`.");
        println!(
            "To check the constraints of each existing dataset, see the log files in the data directory.\n"
        );
        println!(
            "You can disable these confirmation prompts with `skip_confirmation`, either per download or in the configuration file.\n"
        );
        self.confirm.confirm("Another copy will be downloaded.")
    }

    fn fetch_layer(
        &self,
        dataset_id: &str,
        outdir: &Path,
        local_path: &Path,
        options: &DownloadOptions,
    ) -> Result<()> {
        let report = |msg: &str| {
            if options.log {
                tracing::info!("{}", msg);
            }
            if options.verbose {
                println!("{}", msg);
            }
        };

        report(&format!(
            "Downloading dataset '{}' as {} file to '{}'.",
            dataset_id,
            options.response_format,
            outdir.display()
        ));
        report("Constraints are:");
        report(&describe_constraints(options.constraints.as_ref()));

        let url = self.resolve_url(
            dataset_id,
            options.variables.as_deref(),
            options.constraints.as_ref(),
            &options.response_format,
            false,
        )?;
        if options.log {
            tracing::info!("Request URL: {}", url);
        }

        self.stream_to_file(&url, local_path, options.timeout, options.verbose)?;

        if (options.verbose || options.log) && local_path.exists() {
            let size = std::fs::metadata(local_path)?.len();
            report(&format!(
                "Download finished at '{}'. File size is {}.",
                local_path.display(),
                human_size(size)
            ));
        }
        Ok(())
    }

    /// Writes the response body to `target` in fixed-size chunks.
    fn stream_to_file(
        &self,
        url: &Url,
        target: &Path,
        timeout: Option<Duration>,
        show_progress: bool,
    ) -> Result<u64> {
        let mut req = self.http.get(url.as_str());
        if let Some(timeout) = timeout {
            req = req.timeout(timeout);
        }
        let resp = req
            .send()
            .with_context(|| format!("could not connect to {}", url))?;
        let mut resp = self.check_status(resp, url.as_str())?;

        let pb = if self.progress && show_progress {
            Some(progress_bar(resp.content_length())?)
        } else {
            None
        };

        let mut out = File::create(target)
            .with_context(|| format!("failed to open {}", target.display()))?;
        let mut buf = [0u8; 64 * 1024];
        let mut downloaded: u64 = 0;
        loop {
            let n = resp.read(&mut buf).context("download interrupted")?;
            if n == 0 {
                break;
            }
            out.write_all(&buf[..n])?;
            downloaded += n as u64;
            if let Some(pb) = &pb {
                pb.inc(n as u64);
            }
        }
        out.flush()?;

        if let Some(pb) = pb {
            pb.finish_and_clear();
        }
        Ok(downloaded)
    }
}

fn progress_bar(total: Option<u64>) -> Result<ProgressBar> {
    let pb = match total {
        Some(total) => {
            let pb = ProgressBar::new(total);
            pb.set_style(
                ProgressStyle::with_template(
                    "{spinner:.green} {bytes}/{total_bytes} ({bytes_per_sec}) {wide_bar} {eta}",
                )?
                .progress_chars("=>-"),
            );
            pb
        }
        // ERDDAP generates files on the fly and rarely sends a length.
        None => {
            let pb = ProgressBar::new_spinner();
            pb.set_style(ProgressStyle::with_template(
                "{spinner:.green} {bytes} ({bytes_per_sec}) {elapsed}",
            )?);
            pb
        }
    };
    Ok(pb)
}

fn describe_constraints(constraints: Option<&Constraints>) -> String {
    match constraints {
        None => "none (dataset defaults)".to_string(),
        Some(c) if c.is_empty() => "none (dataset defaults)".to_string(),
        Some(c) => c
            .iter()
            .map(|(k, v)| format!("{} {}", k, v))
            .collect::<Vec<_>>()
            .join(", "),
    }
}
