use chrono::Local;
use indicatif::HumanBytes;

/// File name timestamp, second precision.
pub(crate) const TIMESTAMP_FORMAT: &str = "%Y-%m-%d-%H%M%S";

pub(crate) fn normalize_server(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

pub(crate) fn urljoin(base: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }
    let base = base.trim_end_matches('/');
    if path.starts_with('/') {
        format!("{}{}", base, path)
    } else {
        format!("{}/{}", base, path)
    }
}

pub(crate) fn human_size(bytes: u64) -> String {
    HumanBytes(bytes).to_string()
}

pub(crate) fn timestamp_now() -> String {
    Local::now().format(TIMESTAMP_FORMAT).to_string()
}

pub(crate) fn layer_filename(dataset_id: &str, extension: &str, timestamp: Option<&str>) -> String {
    match timestamp {
        Some(ts) => format!("{}_{}.{}", dataset_id, ts, extension),
        None => format!("{}.{}", dataset_id, extension),
    }
}

pub(crate) fn is_log_file(name: &str) -> bool {
    name.ends_with(".log")
}

/// Upper-cases the first character and lower-cases the rest.
pub(crate) fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}

/// Lower, capitalized and upper forms of a token, deduplicated.
pub(crate) fn case_variants(token: &str) -> Vec<String> {
    let mut variants = vec![
        token.to_lowercase(),
        capitalize(token),
        token.to_uppercase(),
    ];
    variants.dedup();
    variants
}
