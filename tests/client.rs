mod common;

use std::collections::HashSet;
use std::fs;
use std::sync::Arc;

use biooracle::{Constraints, DownloadOptions, FixedAnswer, LayerQuery, Selection};
use common::{DATASETS, MockErddap, PAYLOAD_LEN};

const CATALOG: &str = "/erddap/tabledap/allDatasets.json";
const SURFACE: &str = "thetao_baseline_2000_2019_depthsurf";

fn ids(listing: &biooracle::LayerListing) -> Vec<String> {
    listing.dataset_ids().into_iter().map(String::from).collect()
}

#[test]
fn catalog_is_fetched_once_per_client() {
    let server = MockErddap::start();
    let dir = tempfile::tempdir().unwrap();
    let client = server.client(dir.path());

    let all = client.list_layers(&LayerQuery::new()).unwrap();
    assert_eq!(all.len(), DATASETS.len());
    assert!(!ids(&all).contains(&"allDatasets".to_string()));

    client.list_layers(&LayerQuery::new().variables("so")).unwrap();
    client.list_layers(&LayerQuery::new().depth("surf")).unwrap();
    client.clone().list_layers(&LayerQuery::new().ssp("ssp585")).unwrap();
    assert_eq!(server.count(CATALOG), 1);
}

#[test]
fn catalog_variants_are_memoized_separately() {
    let server = MockErddap::start();
    let dir = tempfile::tempdir().unwrap();
    let client = server.client(dir.path());

    for round in 0..3 {
        client
            .list_layers(&LayerQuery::new().include_meta_row(true).variables("so"))
            .unwrap();
        client
            .list_layers(&LayerQuery::new().variables("so"))
            .unwrap();
        client.catalog(round % 2 == 0).unwrap();
    }
    assert_eq!(server.count(CATALOG), 2);
}

#[test]
fn layer_cache_keeps_the_eight_most_recent_queries() {
    let server = MockErddap::start();
    let dir = tempfile::tempdir().unwrap();
    let client = server.client(dir.path());

    let variables = ["po4", "o2", "si", "ph", "sws", "phyc", "so", "thetao", "dfe"];
    let first: Vec<_> = variables
        .iter()
        .map(|v| client.list_layers(&LayerQuery::new().variables(*v)).unwrap())
        .collect();

    let newest = client
        .list_layers(&LayerQuery::new().variables("dfe"))
        .unwrap();
    assert!(Arc::ptr_eq(&first[8], &newest));

    let oldest = client
        .list_layers(&LayerQuery::new().variables("po4"))
        .unwrap();
    assert!(!Arc::ptr_eq(&first[0], &oldest));
    assert_eq!(first[0], oldest);

    let still_cached = client
        .list_layers(&LayerQuery::new().variables("thetao"))
        .unwrap();
    assert!(Arc::ptr_eq(&first[7], &still_cached));
}

#[test]
fn empty_selection_shares_the_unfiltered_listing() {
    let server = MockErddap::start();
    let dir = tempfile::tempdir().unwrap();
    let client = server.client(dir.path());

    let unfiltered = client.list_layers(&LayerQuery::new()).unwrap();
    let empty = LayerQuery {
        variables: Some(Selection::new()),
        ssp: Some(Selection::new()),
        ..LayerQuery::new()
    };
    let listing = client.list_layers(&empty).unwrap();
    assert_eq!(listing.len(), DATASETS.len());
    assert!(Arc::ptr_eq(&unfiltered, &listing));
}

#[test]
fn meta_row_is_kept_on_request() {
    let server = MockErddap::start();
    let dir = tempfile::tempdir().unwrap();
    let client = server.client(dir.path());

    let listing = client
        .list_layers(&LayerQuery::new().include_meta_row(true).ids())
        .unwrap();
    assert_eq!(listing.len(), DATASETS.len() + 1);
    assert_eq!(listing.dataset_ids()[0], "allDatasets");
}

#[test]
fn equivalent_selections_share_one_cached_listing() {
    let server = MockErddap::start();
    let dir = tempfile::tempdir().unwrap();
    let client = server.client(dir.path());

    let from_vec = client
        .list_layers(&LayerQuery::new().variables(vec!["thetao", "so"]))
        .unwrap();
    let from_set = client
        .list_layers(&LayerQuery::new().variables(HashSet::from(["so", "thetao"])))
        .unwrap();
    assert!(Arc::ptr_eq(&from_vec, &from_set));

    let other = client
        .list_layers(&LayerQuery::new().variables(["thetao"]))
        .unwrap();
    assert!(!Arc::ptr_eq(&from_vec, &other));
}

#[test]
fn variable_filter_narrows_the_catalog() {
    let server = MockErddap::start();
    let dir = tempfile::tempdir().unwrap();
    let client = server.client(dir.path());

    let thetao = client
        .list_layers(&LayerQuery::new().variables("thetao").ids())
        .unwrap();
    assert_eq!(thetao.len(), 3);
    assert!(thetao.len() < DATASETS.len());
    assert!(ids(&thetao).iter().all(|id| id.starts_with("thetao")));
}

#[test]
fn present_and_future_do_not_overlap() {
    let server = MockErddap::start();
    let dir = tempfile::tempdir().unwrap();
    let client = server.client(dir.path());

    let present = ids(&client
        .list_layers(&LayerQuery::new().time_period("present").ids())
        .unwrap());
    let future = ids(&client
        .list_layers(&LayerQuery::new().time_period("Future").ids())
        .unwrap());

    assert_eq!(present.len(), 4);
    assert_eq!(future.len(), 2);
    assert!(present.iter().all(|id| !future.contains(id)));
    assert!(!present.contains(&"terrain_characteristics".to_string()));
}

#[test]
fn ids_match_the_table_listing() {
    let server = MockErddap::start();
    let dir = tempfile::tempdir().unwrap();
    let client = server.client(dir.path());

    let query = LayerQuery::new().variables(["so", "po4"]);
    let table = client.list_layers(&query).unwrap();
    let listed = client.list_layers(&query.clone().ids()).unwrap();

    assert!(table.as_table().is_some());
    assert_eq!(listed.as_ids().unwrap(), ids(&table).as_slice());
}

#[test]
fn depth_filter_unions_its_values() {
    let server = MockErddap::start();
    let dir = tempfile::tempdir().unwrap();
    let client = server.client(dir.path());

    let listing = client
        .list_layers(&LayerQuery::new().depth(["mean", "surf"]).ids())
        .unwrap();
    let found = ids(&listing);
    assert_eq!(found.len(), 5);
    assert!(
        found
            .iter()
            .all(|id| id.ends_with("depthmean") || id.ends_with("depthsurf"))
    );
}

#[test]
fn unknown_filter_values_are_reported_not_rejected() {
    let server = MockErddap::start();
    let dir = tempfile::tempdir().unwrap();
    let client = server.client(dir.path());

    let listing = client
        .list_layers(&LayerQuery::new().variables("temperature").ids())
        .unwrap();
    assert!(listing.is_empty());
}

#[test]
fn resolve_url_applies_constraints_and_variables() {
    let server = MockErddap::start();
    let dir = tempfile::tempdir().unwrap();
    let client = server.client(dir.path());

    let mut constraints = Constraints::new();
    constraints.insert("latitude>=".into(), 0.into());
    constraints.insert("latitude<=".into(), 10.into());
    constraints.insert("longitude_step".into(), 5.into());
    constraints.insert("depth>=".into(), 1.into());
    let variables = vec!["thetao_max".to_string()];

    let url = client
        .resolve_url(SURFACE, Some(&variables), Some(&constraints), "nc", false)
        .unwrap();
    assert_eq!(url.path(), format!("/erddap/griddap/{}.nc", SURFACE));
    assert_eq!(
        url.query().unwrap(),
        "thetao_max[(2010-01-01T00:00:00Z):1:(2010-01-01T00:00:00Z)][(0):1:(10)][(-179.975):5:(179.975)]"
    );
}

#[test]
fn empty_variable_list_keeps_every_variable() {
    let server = MockErddap::start();
    let dir = tempfile::tempdir().unwrap();
    let client = server.client(dir.path());

    let none: Vec<String> = Vec::new();
    let url = client
        .resolve_url(SURFACE, Some(none.as_slice()), None, "nc", false)
        .unwrap();
    let query = url.query().unwrap();
    assert!(query.starts_with("thetao_mean["), "{}", query);
    assert!(query.contains(",thetao_max["), "{}", query);

    let options = DownloadOptions::new()
        .variables(Vec::<String>::new())
        .skip_confirmation(true)
        .verbose(false)
        .log(false);
    assert!(client.download_layer(SURFACE, &options).unwrap().is_some());
}

#[test]
fn unknown_dataset_points_back_at_the_catalog() {
    let server = MockErddap::start();
    let dir = tempfile::tempdir().unwrap();
    let client = server.client(dir.path());

    let err = client
        .resolve_url("nope_baseline_2000_2019_depthsurf", None, None, "nc", false)
        .unwrap_err();
    let msg = format!("{:#}", err);
    assert!(msg.contains("does not know this dataset"), "{}", msg);
    assert!(msg.contains("nope_baseline_2000_2019_depthsurf"), "{}", msg);
}

#[test]
fn download_writes_data_and_log() {
    let server = MockErddap::start();
    let dir = tempfile::tempdir().unwrap();
    let client = server.client(dir.path());

    let options = DownloadOptions::new()
        .constraint("latitude>=", 0)
        .constraint("latitude<=", 10)
        .skip_confirmation(true)
        .verbose(false);
    let path = client.download_layer(SURFACE, &options).unwrap().unwrap();

    let names: Vec<String> = fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names.len(), 2, "{:?}", names);
    assert_eq!(names.iter().filter(|n| n.ends_with(".nc")).count(), 1);
    assert_eq!(names.iter().filter(|n| n.ends_with(".log")).count(), 1);
    assert!(names.iter().all(|n| n.starts_with(SURFACE)));

    assert_eq!(fs::metadata(&path).unwrap().len(), PAYLOAD_LEN as u64);
    let log = fs::read_to_string(path.with_extension("log")).unwrap();
    assert!(log.contains("Request URL"), "{}", log);
    assert!(log.contains("[(0):1:(10)]"), "{}", log);
}

#[test]
fn download_without_log_or_timestamp() {
    let server = MockErddap::start();
    let dir = tempfile::tempdir().unwrap();
    let client = server.client(dir.path());

    let options = DownloadOptions::new()
        .skip_confirmation(true)
        .verbose(false)
        .log(false)
        .timestamp(false)
        .response_format("csv");
    let path = client.download_layer(SURFACE, &options).unwrap().unwrap();

    assert_eq!(path, dir.path().join(format!("{}.csv", SURFACE)));
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
}

#[test]
fn declined_download_leaves_directory_untouched() {
    let server = MockErddap::start();
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join(format!("{}_old.nc", SURFACE)), b"old").unwrap();
    let client = server.client(dir.path()).with_confirm(FixedAnswer(false));

    let result = client
        .download_layer(SURFACE, &DownloadOptions::new().verbose(false))
        .unwrap();
    assert!(result.is_none());
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    assert_eq!(server.count("/griddap/"), 0);
}

#[test]
fn confirmed_download_adds_a_copy() {
    let server = MockErddap::start();
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join(format!("{}_old.nc", SURFACE)), b"old").unwrap();
    let client = server.client(dir.path()).with_confirm(FixedAnswer(true));

    let options = DownloadOptions::new().verbose(false).log(false);
    assert!(client.download_layer(SURFACE, &options).unwrap().is_some());
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 2);
}

#[test]
fn download_into_a_new_output_directory() {
    let server = MockErddap::start();
    let dir = tempfile::tempdir().unwrap();
    let client = server.client(dir.path());
    let target = dir.path().join("nested").join("layers");

    let options = DownloadOptions::new()
        .output_directory(&target)
        .skip_confirmation(true)
        .verbose(false);
    let paths = client
        .download_layers([SURFACE, "so_baseline_2000_2019_depthsurf"], &options)
        .unwrap();
    assert_eq!(paths.len(), 2);
    assert!(paths.iter().all(|p| p.starts_with(&target)));
}

#[test]
fn local_listing_reflects_the_data_directory() {
    let server = MockErddap::start();
    let dir = tempfile::tempdir().unwrap();
    let client = server.client(dir.path());

    assert!(client.list_local_data(None, true).unwrap().is_empty());

    for i in 0..3 {
        fs::write(dir.path().join(format!("layer_{}.nc", i)), vec![0u8; 10]).unwrap();
    }
    fs::write(dir.path().join("layer_0.log"), b"log").unwrap();

    let verbose = client.list_local_data(None, true).unwrap();
    assert_eq!(verbose.len(), 4);
    let brief = client.list_local_data(Some(dir.path()), false).unwrap();
    assert_eq!(brief.len(), 3);
    assert_eq!(brief.total_size, 30);
}
