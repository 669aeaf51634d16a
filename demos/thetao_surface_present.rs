use anyhow::Result;
use biooracle::{Client, DownloadOptions, LayerQuery};

fn main() -> Result<()> {
    // Example program that calls the library API.
    // Configure the server and data directory via env vars or the config file.
    let client = Client::from_env()?;

    let query = LayerQuery::new()
        .variables("thetao")
        .time_period("present")
        .depth("surf")
        .ids();
    let layers = client.list_layers(&query)?;
    for id in layers.dataset_ids() {
        println!("{}", id);
    }

    let Some(dataset_id) = layers.dataset_ids().first().map(|id| id.to_string()) else {
        println!("No matching layers.");
        return Ok(());
    };

    let options = DownloadOptions::new()
        .constraint("latitude>=", 0)
        .constraint("latitude<=", 10)
        .constraint("longitude>=", 0)
        .constraint("longitude<=", 10)
        .variables(["thetao_mean"])
        .skip_confirmation(true);
    client.download_layer(&dataset_id, &options)?;
    client.list_local_data(None, true)?;
    Ok(())
}
