//! Grid-data (griddap) requests.
//!
//! A [`GriddapSession`] describes one dataset: its dimensions in declaration
//! order, its data variables, and a constraint set with a lower bound, upper
//! bound and stride per dimension. Download URLs are built from it as
//!
//! ```text
//! {server}/griddap/{id}.{format}?var[(lo):step:(hi)][(lo):step:(hi)],var2[...]
//! ```

use anyhow::{Context, Result, anyhow, bail};
use reqwest::Url;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

use crate::util::urljoin;

/// One bound or stride of a dimension constraint.
#[derive(Debug, Clone, PartialEq)]
pub enum ConstraintValue {
    Number(f64),
    Text(String),
}

/// Constraint keys look like `latitude>=`, `latitude<=` and `latitude_step`.
pub type Constraints = BTreeMap<String, ConstraintValue>;

impl ConstraintValue {
    /// Numbers when the text parses as one, text otherwise.
    pub fn parse(s: &str) -> Self {
        let s = s.trim();
        match s.parse::<f64>() {
            Ok(n) if n.is_finite() => ConstraintValue::Number(n),
            _ => ConstraintValue::Text(s.to_string()),
        }
    }

    pub(crate) fn from_json(v: &Value) -> Option<Self> {
        match v {
            Value::Number(n) => n.as_f64().map(ConstraintValue::Number),
            Value::String(s) => Some(ConstraintValue::Text(s.clone())),
            _ => None,
        }
    }
}

impl fmt::Display for ConstraintValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstraintValue::Number(n) => write!(f, "{}", n),
            ConstraintValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<f64> for ConstraintValue {
    fn from(v: f64) -> Self {
        ConstraintValue::Number(v)
    }
}

impl From<i32> for ConstraintValue {
    fn from(v: i32) -> Self {
        ConstraintValue::Number(v.into())
    }
}

impl From<&str> for ConstraintValue {
    fn from(v: &str) -> Self {
        ConstraintValue::Text(v.to_string())
    }
}

impl From<String> for ConstraintValue {
    fn from(v: String) -> Self {
        ConstraintValue::Text(v)
    }
}

/// Parses `dim>=VALUE`, `dim>==VALUE`, `dim<=VALUE` or `dim_step=VALUE`.
pub fn parse_constraint(arg: &str) -> Result<(String, ConstraintValue)> {
    let arg = arg.trim();
    let (key, value) = if let Some(idx) = arg.find(">=").or_else(|| arg.find("<=")) {
        let (key, rest) = arg.split_at(idx + 2);
        (key, rest.strip_prefix('=').unwrap_or(rest))
    } else if let Some((key, value)) = arg.split_once('=') {
        (key, value)
    } else {
        bail!(
            "invalid constraint `{}` (expected e.g. `latitude>=0`, `time<=2010-01-01T00:00:00Z` or `latitude_step=10`)",
            arg
        );
    };

    let (key, value) = (key.trim(), value.trim());
    if key.len() <= 2 || value.is_empty() {
        bail!("invalid constraint `{}`: missing dimension or value", arg);
    }
    Ok((key.to_string(), ConstraintValue::parse(value)))
}

/// Dimension names and data variable names from a `.dds` document.
pub(crate) fn parse_dds(text: &str) -> Result<(Vec<String>, Vec<String>)> {
    let mut sections = text.split("GRID");
    let head = sections.next().unwrap_or_default();

    let dimensions: Vec<String> = head.lines().filter_map(declared_name).collect();
    if dimensions.is_empty() {
        bail!("no dimensions declared in DDS");
    }

    let variables = sections
        .filter_map(|section| {
            let mut lines = section
                .lines()
                .map(str::trim)
                .skip_while(|l| *l != "ARRAY:");
            lines.next()?;
            lines.find(|l| !l.is_empty()).and_then(declared_name)
        })
        .collect();

    Ok((dimensions, variables))
}

/// `Float64 latitude[latitude = 3600];` -> `latitude`
fn declared_name(line: &str) -> Option<String> {
    if !line.contains('[') {
        return None;
    }
    let decl = line.split_whitespace().nth(1)?;
    let name = decl.split('[').next()?.trim();
    (!name.is_empty()).then(|| name.to_string())
}

/// Default constraints for one dimension from its axis values.
///
/// `time` defaults to the last time step only; other dimensions span the
/// whole axis.
pub(crate) fn default_constraints(
    dimension: &str,
    axis: &[&Value],
    step: u32,
) -> Result<Vec<(String, ConstraintValue)>> {
    let bound = |v: Option<&&Value>| {
        v.and_then(|v| ConstraintValue::from_json(v))
            .ok_or_else(|| anyhow!("axis `{}` has no usable values", dimension))
    };
    let last = bound(axis.last())?;
    let first = if dimension == "time" {
        last.clone()
    } else {
        bound(axis.first())?
    };

    Ok(vec![
        (format!("{}>=", dimension), first),
        (format!("{}<=", dimension), last),
        (format!("{}_step", dimension), ConstraintValue::Number(step.into())),
    ])
}

pub(crate) fn dds_url(server: &str, dataset_id: &str) -> String {
    urljoin(server, &format!("griddap/{}.dds", dataset_id))
}

pub(crate) fn axis_url(server: &str, dataset_id: &str, dimension: &str) -> String {
    urljoin(server, &format!("griddap/{}.json?{}", dataset_id, dimension))
}

/// A grid dataset ready to be turned into a download URL.
#[derive(Debug, Clone, PartialEq)]
pub struct GriddapSession {
    server: String,
    dataset_id: String,
    dimensions: Vec<String>,
    dataset_variables: Vec<String>,
    variables: Vec<String>,
    constraints: Constraints,
}

impl GriddapSession {
    pub(crate) fn new(
        server: &str,
        dataset_id: &str,
        dimensions: Vec<String>,
        dataset_variables: Vec<String>,
        constraints: Constraints,
    ) -> Self {
        Self {
            server: server.to_string(),
            dataset_id: dataset_id.to_string(),
            variables: dataset_variables.clone(),
            dimensions,
            dataset_variables,
            constraints,
        }
    }

    pub fn dataset_id(&self) -> &str {
        &self.dataset_id
    }

    pub fn dimensions(&self) -> &[String] {
        &self.dimensions
    }

    /// Every data variable of the dataset.
    pub fn dataset_variables(&self) -> &[String] {
        &self.dataset_variables
    }

    /// Variables the download URL will ask for.
    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    pub fn constraints(&self) -> &Constraints {
        &self.constraints
    }

    pub fn info_url(&self) -> String {
        urljoin(&self.server, &format!("info/{}/index.html", self.dataset_id))
    }

    /// Overrides defaults with `overrides`. Keys the dataset does not have
    /// are ignored.
    pub fn apply_constraints(&mut self, overrides: &Constraints) {
        for (key, value) in overrides {
            if let Some(slot) = self.constraints.get_mut(key) {
                *slot = value.clone();
            } else {
                tracing::debug!(dataset = %self.dataset_id, key = %key, "ignoring unknown constraint");
            }
        }
    }

    /// Keeps the dataset variables that appear in `wanted`, in dataset order.
    pub fn restrict_variables<S: AsRef<str>>(&mut self, wanted: &[S]) -> Result<()> {
        let kept: Vec<String> = self
            .dataset_variables
            .iter()
            .filter(|v| wanted.iter().any(|w| w.as_ref() == v.as_str()))
            .cloned()
            .collect();
        if kept.is_empty() {
            bail!(
                "none of the requested variables exist in dataset `{}` (available: {})",
                self.dataset_id,
                self.dataset_variables.join(", ")
            );
        }
        self.variables = kept;
        Ok(())
    }

    pub fn download_url(&self, response_format: &str) -> Result<Url> {
        let mut selectors = Vec::with_capacity(self.variables.len());
        for var in &self.variables {
            let mut sel = var.clone();
            for dim in &self.dimensions {
                sel.push_str(&format!(
                    "[({}):{}:({})]",
                    self.constraint(dim, ">=")?,
                    self.constraint(dim, "_step")?,
                    self.constraint(dim, "<=")?
                ));
            }
            selectors.push(sel);
        }

        let url = format!(
            "{}?{}",
            urljoin(
                &self.server,
                &format!("griddap/{}.{}", self.dataset_id, response_format)
            ),
            selectors.join(",")
        );
        Url::parse(&url).with_context(|| format!("invalid download URL {}", url))
    }

    fn constraint(&self, dimension: &str, suffix: &str) -> Result<&ConstraintValue> {
        let key = format!("{}{}", dimension, suffix);
        self.constraints
            .get(&key)
            .ok_or_else(|| anyhow!("missing constraint `{}` for dataset `{}`", key, self.dataset_id))
    }
}
