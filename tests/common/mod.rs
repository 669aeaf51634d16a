//! In-process ERDDAP stand-in serving a small Bio-ORACLE catalog.

#![allow(dead_code)]

use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::thread;

use biooracle::{Client, ClientConfig};
use serde_json::{Value, json};

pub const DATASETS: &[(&str, &str)] = &[
    ("thetao_baseline_2000_2019_depthsurf", "Sea Water Temperature [surface]"),
    ("thetao_baseline_2000_2019_depthmean", "Sea Water Temperature [mean depth]"),
    ("thetao_ssp585_2020_2100_depthsurf", "Sea Water Temperature SSP5-8.5 [surface]"),
    ("so_baseline_2000_2019_depthsurf", "Sea Water Salinity [surface]"),
    ("so_ssp245_2020_2100_depthmean", "Sea Water Salinity SSP2-4.5 [mean depth]"),
    ("po4_baseline_2000_2018_depthmin", "Phosphate [min depth]"),
    ("terrain_characteristics", "Bathymetry and slope"),
];

/// Bytes served for every data request.
pub const PAYLOAD_LEN: usize = 2048;

pub struct MockErddap {
    port: u16,
    requests: Arc<Mutex<Vec<String>>>,
}

impl MockErddap {
    pub fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind mock server");
        let port = listener.local_addr().expect("local addr").port();
        let requests = Arc::new(Mutex::new(Vec::new()));

        let seen = Arc::clone(&requests);
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { continue };
                handle(stream, &seen);
            }
        });

        Self { port, requests }
    }

    pub fn server(&self) -> String {
        format!("http://127.0.0.1:{}/erddap", self.port)
    }

    /// Client with no progress bar, pointed at this server.
    pub fn client(&self, data_directory: &Path) -> Client {
        Client::with_config(ClientConfig {
            server: self.server(),
            data_directory: data_directory.to_path_buf(),
            skip_confirmation: false,
        })
        .expect("client")
        .with_progress(false)
    }

    /// Request targets (path and query) in arrival order.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().expect("request log").clone()
    }

    pub fn count(&self, needle: &str) -> usize {
        self.requests().iter().filter(|r| r.contains(needle)).count()
    }
}

fn handle(stream: TcpStream, seen: &Mutex<Vec<String>>) {
    let mut reader = BufReader::new(&stream);
    let mut request_line = String::new();
    if reader.read_line(&mut request_line).is_err() {
        return;
    }
    loop {
        let mut header = String::new();
        match reader.read_line(&mut header) {
            Ok(0) => break,
            Ok(_) if header == "\r\n" || header == "\n" => break,
            Ok(_) => continue,
            Err(_) => return,
        }
    }

    let target = request_line
        .split_whitespace()
        .nth(1)
        .unwrap_or("/")
        .to_string();
    seen.lock().expect("request log").push(target.clone());

    let (status, content_type, body) = route(&target);
    let head = format!(
        "HTTP/1.1 {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        status,
        content_type,
        body.len()
    );
    let mut stream = &stream;
    let _ = stream.write_all(head.as_bytes());
    let _ = stream.write_all(&body);
    let _ = stream.flush();
}

fn route(target: &str) -> (&'static str, &'static str, Vec<u8>) {
    let (path, query) = target.split_once('?').unwrap_or((target, ""));

    if path == "/erddap/tabledap/allDatasets.json" {
        return ok_json(catalog());
    }

    let Some(file) = path.strip_prefix("/erddap/griddap/") else {
        return not_found("Resource not found: unknown endpoint");
    };
    let Some((id, ext)) = file.rsplit_once('.') else {
        return not_found("Resource not found: no file type");
    };
    if !DATASETS.iter().any(|(known, _)| *known == id) {
        return not_found(&format!("Resource not found: Currently unknown datasetID={}", id));
    }

    match ext {
        "dds" => ("200 OK", "text/plain", dds(id).into_bytes()),
        "json" => match axis(query) {
            Some(values) => ok_json(json!({
                "table": {
                    "columnNames": [query],
                    "columnTypes": ["String"],
                    "rows": values.into_iter().map(|v| vec![v]).collect::<Vec<_>>(),
                }
            })),
            None => not_found("Resource not found: unknown axis"),
        },
        _ => {
            let mut body = b"CDF\x01".to_vec();
            body.resize(PAYLOAD_LEN, 0);
            ("200 OK", "application/x-netcdf", body)
        }
    }
}

fn catalog() -> Value {
    let mut rows = vec![json!(["allDatasets", "public", "* The List of All Active Datasets in this ERDDAP *"])];
    rows.extend(
        DATASETS
            .iter()
            .map(|(id, title)| json!([id, "public", title])),
    );
    json!({
        "table": {
            "columnNames": ["datasetID", "accessible", "title"],
            "rows": rows,
        }
    })
}

fn variable_prefix(id: &str) -> &str {
    id.split('_').next().unwrap_or(id)
}

fn dds(id: &str) -> String {
    let var = variable_prefix(id);
    let grid = |name: String| {
        format!(
            "  GRID {{\n    ARRAY:\n      Float32 {name}[time = 2][latitude = 2][longitude = 2];\n    MAPS:\n      Float64 time[time = 2];\n      Float64 latitude[latitude = 2];\n      Float64 longitude[longitude = 2];\n  }} {name};\n"
        )
    };
    format!(
        "Dataset {{\n  Float64 time[time = 2];\n  Float64 latitude[latitude = 2];\n  Float64 longitude[longitude = 2];\n{}{}}} {};\n",
        grid(format!("{}_mean", var)),
        grid(format!("{}_max", var)),
        id
    )
}

fn axis(dimension: &str) -> Option<Vec<Value>> {
    match dimension {
        "time" => Some(vec![
            json!("2000-01-01T00:00:00Z"),
            json!("2010-01-01T00:00:00Z"),
        ]),
        "latitude" => Some(vec![json!(-89.975), json!(89.975)]),
        "longitude" => Some(vec![json!(-179.975), json!(179.975)]),
        _ => None,
    }
}

fn ok_json(value: Value) -> (&'static str, &'static str, Vec<u8>) {
    ("200 OK", "application/json", value.to_string().into_bytes())
}

fn not_found(message: &str) -> (&'static str, &'static str, Vec<u8>) {
    let body = format!("Error {{\n    code=404;\n    message=\"Not Found: {}\";\n}}\n", message);
    ("404 Not Found", "text/plain", body.into_bytes())
}
