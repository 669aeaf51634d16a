use anyhow::anyhow;
use reqwest::StatusCode;

/// Invalid or missing configuration values.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SettingError {
    #[error("missing configuration value `{0}`")]
    Missing(String),
    #[error("configuration value `{key}` = `{value}` is not a boolean (use true/false, yes/no, on/off or 1/0)")]
    InvalidBoolean { key: String, value: String },
}

/// Error payload ERDDAP sends with non-success responses:
///
/// ```text
/// Error {
///     code=404;
///     message="Not Found: Your query produced no matching results.";
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ErddapErrorResponse {
    pub(crate) code: Option<u16>,
    pub(crate) message: String,
}

pub(crate) fn parse_erddap_error(text: &str) -> Option<ErddapErrorResponse> {
    let body = text.trim_start();
    if !body.starts_with("Error") {
        return None;
    }

    let mut code = None;
    let mut message = None;
    for raw in body.lines() {
        let line = raw.trim().trim_end_matches(';');
        if let Some(v) = line.strip_prefix("code=") {
            code = v.trim().parse().ok();
        } else if let Some(v) = line.strip_prefix("message=") {
            message = Some(v.trim().trim_matches('"').to_string());
        }
    }

    Some(ErddapErrorResponse {
        code,
        message: message?,
    })
}

pub(crate) fn format_erddap_error(
    status: StatusCode,
    url: &str,
    e: &ErddapErrorResponse,
) -> anyhow::Error {
    let code = e.code.unwrap_or(status.as_u16());
    let message = e.message.as_str();
    let lower = message.to_lowercase();

    // Unknown dataset ids are the most common mistake; point at the catalog.
    let unknown_dataset = code == 404
        && (lower.contains("unknown datasetid") || lower.contains("resource not found"));
    if unknown_dataset {
        return anyhow!(
            "ERDDAP does not know this dataset (HTTP 404).\n- Check the identifier against `list_layers` (or `biooracle layers --ids`)\n- Identifiers look like `thetao_baseline_2000_2019_depthsurf`\n\nServer message: {}\nrequest: {}",
            message,
            url
        );
    }

    if code == 413 || lower.contains("too much data") {
        return anyhow!(
            "ERDDAP refused the request because it would return too much data (HTTP {}).\n- Narrow the time/latitude/longitude constraints or raise the `_step` strides\n\nServer message: {}\nrequest: {}",
            code,
            message,
            url
        );
    }

    if code == 400 {
        return anyhow!(
            "ERDDAP rejected the query (HTTP 400).\n- Constraint bounds must lie inside the dataset's axis ranges\n- Variable names must belong to the dataset\n\nServer message: {}\nrequest: {}",
            message,
            url
        );
    }

    anyhow!(
        "ERDDAP request failed: HTTP {} for url ({})\n{}",
        code,
        url,
        message
    )
}
