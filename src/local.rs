use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::util::{human_size, is_log_file};

/// A downloaded file found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFile {
    pub name: String,
    pub size: u64,
}

/// What [`list_local_data`] found, sorted by file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalInventory {
    pub directory: PathBuf,
    pub files: Vec<LocalFile>,
    pub total_size: u64,
}

impl LocalInventory {
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Lists and prints the files in `directory`.
///
/// Brief mode prints bare names and leaves out `.log` files; verbose mode
/// prints every file with its size, then the total.
pub fn list_local_data(directory: &Path, verbose: bool) -> Result<LocalInventory> {
    let inventory = scan(directory, verbose)?;

    if inventory.is_empty() {
        println!("No local datasets found in '{}'.", directory.display());
        return Ok(inventory);
    }

    if verbose {
        println!("Local data directory is '{}'.\n", directory.display());
        for file in &inventory.files {
            println!("{}\t{}", file.name, human_size(file.size));
        }
        println!(
            "\n{} file(s), total size {}.",
            inventory.len(),
            human_size(inventory.total_size)
        );
    } else {
        for file in &inventory.files {
            println!("{}", file.name);
        }
    }
    Ok(inventory)
}

/// Files starting with `dataset_id`, excluding log files.
pub(crate) fn existing_layers(directory: &Path, dataset_id: &str) -> Result<Vec<LocalFile>> {
    Ok(scan(directory, false)?
        .files
        .into_iter()
        .filter(|f| f.name.starts_with(dataset_id))
        .collect())
}

fn scan(directory: &Path, include_logs: bool) -> Result<LocalInventory> {
    let entries = std::fs::read_dir(directory)
        .with_context(|| format!("failed to read directory {}", directory.display()))?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry?;
        let meta = entry.metadata()?;
        if !meta.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if !include_logs && is_log_file(&name) {
            continue;
        }
        files.push(LocalFile {
            name,
            size: meta.len(),
        });
    }
    files.sort_by(|a, b| a.name.cmp(&b.name));

    let total_size = files.iter().map(|f| f.size).sum();
    Ok(LocalInventory {
        directory: directory.to_path_buf(),
        files,
        total_size,
    })
}
