use anyhow::{Context, Result};
use biooracle::{
    Client, ClientConfig, ConfigStore, Constraints, DownloadOptions, FixedAnswer, LayerListing,
    LayerQuery, Selection, Settings, StdinConfirm, parse_constraint,
};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "biooracle", version, about = "List and download Bio-ORACLE layers from ERDDAP")]
struct Cli {
    /// Configuration file (default: BIOORACLE_CONFIG or the platform config dir).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// ERDDAP server URL, overriding the configuration.
    #[arg(long, global = true)]
    server: Option<String>,

    /// Data directory, overriding the configuration.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List available layers.
    Layers {
        /// Free-text search over identifiers and titles.
        #[arg(long, value_delimiter = ',')]
        search: Vec<String>,
        #[arg(long, value_delimiter = ',')]
        variables: Vec<String>,
        #[arg(long, value_delimiter = ',')]
        ssp: Vec<String>,
        /// `present` or `future`.
        #[arg(long)]
        time_period: Option<String>,
        #[arg(long, value_delimiter = ',')]
        depth: Vec<String>,
        /// Print identifiers only.
        #[arg(long)]
        ids: bool,
        /// Print identifiers and titles only.
        #[arg(long)]
        simplify: bool,
        #[arg(long)]
        include_meta_row: bool,
    },
    /// Print the download URL of a layer.
    Url {
        dataset_id: String,
        #[arg(long, default_value = "nc")]
        format: String,
        #[arg(long, value_delimiter = ',')]
        variables: Vec<String>,
        /// e.g. `latitude>=0`, `time<=2010-01-01T00:00:00Z`, `latitude_step=10`.
        #[arg(long = "constraint", short = 'c')]
        constraints: Vec<String>,
    },
    /// Download one or more layers.
    Download {
        #[arg(required = true)]
        dataset_ids: Vec<String>,
        #[arg(long, short = 'o')]
        output_dir: Option<PathBuf>,
        #[arg(long, default_value = "nc")]
        format: String,
        #[arg(long, value_delimiter = ',')]
        variables: Vec<String>,
        #[arg(long = "constraint", short = 'c')]
        constraints: Vec<String>,
        /// Do not ask before downloading next to existing copies.
        #[arg(long, short = 'y')]
        yes: bool,
        #[arg(long, short = 'q')]
        quiet: bool,
        #[arg(long)]
        no_log: bool,
        #[arg(long)]
        no_timestamp: bool,
        /// Transfer timeout in seconds.
        #[arg(long)]
        timeout: Option<u64>,
    },
    /// List downloaded files.
    Local {
        directory: Option<PathBuf>,
        /// Names only, without log files.
        #[arg(long)]
        brief: bool,
    },
    /// Inspect or edit the configuration file.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Debug, Subcommand)]
enum ConfigAction {
    /// Print every setting.
    Show,
    /// Print the configuration file path.
    Path,
    /// Write a configuration file with default values.
    Init {
        /// Overwrite an existing file without asking.
        #[arg(long)]
        force: bool,
    },
    /// Change one setting.
    Set { key: String, value: String },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Config { action } => {
            let store = match cli.config {
                Some(path) => ConfigStore::new(path),
                None => ConfigStore::locate()?,
            };
            run_config(&store, action)
        }
        command => {
            let client = match cli.config {
                Some(path) => client_from_store(cli.server, cli.data_dir, &ConfigStore::new(path))?,
                None => Client::new(cli.server, cli.data_dir, None)?,
            };
            run(&client, command)
        }
    }
}

/// Client for an explicitly chosen configuration file; flags still win.
fn client_from_store(
    server: Option<String>,
    data_dir: Option<PathBuf>,
    store: &ConfigStore,
) -> Result<Client> {
    let mut config = ClientConfig::from_settings(&store.load()?)?;
    if let Some(server) = server {
        config.server = server;
    }
    if let Some(dir) = data_dir {
        config.data_directory = dir;
    }
    Client::with_config(config)
}

fn run(client: &Client, command: Command) -> Result<()> {
    match command {
        Command::Layers {
            search,
            variables,
            ssp,
            time_period,
            depth,
            ids,
            simplify,
            include_meta_row,
        } => {
            let mut query = LayerQuery::new()
                .simplify(simplify)
                .include_meta_row(include_meta_row);
            query.search = non_empty(search);
            query.variables = non_empty(variables);
            query.ssp = non_empty(ssp);
            query.time_period = time_period.map(Selection::from);
            query.depth = non_empty(depth);
            if ids {
                query = query.ids();
            }

            match client.list_layers(&query)?.as_ref() {
                LayerListing::Table(table) => print!("{}", table),
                LayerListing::Ids(ids) => {
                    for id in ids {
                        println!("{}", id);
                    }
                }
            }
        }
        Command::Url {
            dataset_id,
            format,
            variables,
            constraints,
        } => {
            let variables = (!variables.is_empty()).then_some(variables);
            let constraints = parse_constraints(&constraints)?;
            let url = client.resolve_url(
                &dataset_id,
                variables.as_deref(),
                constraints.as_ref(),
                &format,
                true,
            )?;
            println!("{}", url);
        }
        Command::Download {
            dataset_ids,
            output_dir,
            format,
            variables,
            constraints,
            yes,
            quiet,
            no_log,
            no_timestamp,
            timeout,
        } => {
            let mut options = DownloadOptions::new()
                .response_format(format)
                .verbose(!quiet)
                .log(!no_log)
                .timestamp(!no_timestamp);
            options.output_directory = output_dir;
            options.constraints = parse_constraints(&constraints)?;
            if !variables.is_empty() {
                options = options.variables(variables);
            }
            if yes {
                options = options.skip_confirmation(true);
            }
            if let Some(secs) = timeout {
                options = options.timeout(Duration::from_secs(secs));
            }
            client.download_layers(&dataset_ids, &options)?;
        }
        Command::Local { directory, brief } => {
            client.list_local_data(directory.as_deref(), !brief)?;
        }
        Command::Config { .. } => unreachable!("handled before building a client"),
    }
    Ok(())
}

fn run_config(store: &ConfigStore, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => store.print_values()?,
        ConfigAction::Path => println!("{}", store.path().display()),
        ConfigAction::Init { force } => {
            if force {
                store.create(&Settings::defaults(), &FixedAnswer(true))?;
            } else {
                store.create(&Settings::defaults(), &StdinConfirm)?;
            }
        }
        ConfigAction::Set { key, value } => store
            .update_setting(&key, &value)
            .with_context(|| format!("failed to update `{}`", key))?,
    }
    Ok(())
}

fn non_empty(values: Vec<String>) -> Option<Selection> {
    (!values.is_empty()).then(|| Selection::from(values))
}

fn parse_constraints(args: &[String]) -> Result<Option<Constraints>> {
    if args.is_empty() {
        return Ok(None);
    }
    let mut constraints = Constraints::new();
    for arg in args {
        let (key, value) = parse_constraint(arg)?;
        constraints.insert(key, value);
    }
    Ok(Some(constraints))
}
