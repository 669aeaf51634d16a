use std::collections::{BTreeSet, HashSet};
use std::fmt;

/// Variable families published by the server.
pub const VARIABLES: &[&str] = &[
    "chl", "clt", "dfe", "mlotst", "no3", "o2", "ph", "phyc", "po4", "si", "siconc", "sithick",
    "so", "swd", "sws", "tas", "terrain", "thetao",
];

/// Climate scenarios, plus the `baseline` period.
pub const SCENARIOS: &[&str] = &[
    "ssp119", "ssp126", "ssp245", "ssp370", "ssp460", "ssp585", "baseline",
];

pub const TIME_PERIODS: &[&str] = &["present", "future"];

pub const DEPTHS: &[&str] = &["min", "mean", "max", "surf"];

/// A multi-valued filter argument in canonical form.
///
/// Values are de-duplicated and kept sorted, so a single string, a list, an
/// array or a set holding the same elements all compare and hash equal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Selection(BTreeSet<String>);

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The only value, if the selection holds exactly one.
    pub fn single(&self) -> Option<&str> {
        if self.0.len() == 1 {
            self.iter().next()
        } else {
            None
        }
    }

    /// Splits comma-separated values, as given on a command line.
    pub fn from_csv(s: &str) -> Self {
        s.split(',')
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .collect()
    }
}

impl<S: Into<String>> FromIterator<S> for Selection {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl From<&str> for Selection {
    fn from(value: &str) -> Self {
        std::iter::once(value).collect()
    }
}

impl From<String> for Selection {
    fn from(value: String) -> Self {
        std::iter::once(value).collect()
    }
}

impl<S: Into<String>> From<Vec<S>> for Selection {
    fn from(value: Vec<S>) -> Self {
        value.into_iter().collect()
    }
}

impl<S: Into<String>, const N: usize> From<[S; N]> for Selection {
    fn from(value: [S; N]) -> Self {
        value.into_iter().collect()
    }
}

impl<S: AsRef<str>> From<&[S]> for Selection {
    fn from(value: &[S]) -> Self {
        value.iter().map(|s| s.as_ref().to_string()).collect()
    }
}

impl<S: Into<String>> From<HashSet<S>> for Selection {
    fn from(value: HashSet<S>) -> Self {
        value.into_iter().collect()
    }
}

impl<S: Into<String>> From<BTreeSet<S>> for Selection {
    fn from(value: BTreeSet<S>) -> Self {
        value.into_iter().collect()
    }
}

impl fmt::Display for Selection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let values: Vec<&str> = self.iter().collect();
        write!(f, "{}", values.join(","))
    }
}

/// Shape of a layer listing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum OutputShape {
    /// Catalog rows with their metadata columns.
    #[default]
    Table,
    /// Dataset identifiers only.
    Ids,
}

/// Filters for [`Client::list_layers`](crate::Client::list_layers).
///
/// Also the layer cache key: two queries that are equal here are served by
/// the same cached listing.
///
/// ```
/// use biooracle::LayerQuery;
///
/// let a = LayerQuery::new().variables(["po4", "chl"]).ssp("ssp585");
/// let b = LayerQuery::new().variables(vec!["chl", "po4"]).ssp(["ssp585"]);
/// assert_eq!(a, b);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct LayerQuery {
    pub search: Option<Selection>,
    pub variables: Option<Selection>,
    pub ssp: Option<Selection>,
    pub time_period: Option<Selection>,
    pub depth: Option<Selection>,
    pub shape: OutputShape,
    pub simplify: bool,
    pub include_meta_row: bool,
}

impl LayerQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Free-text terms matched against identifiers and titles.
    pub fn search(mut self, terms: impl Into<Selection>) -> Self {
        self.search = non_empty(terms.into());
        self
    }

    pub fn variables(mut self, variables: impl Into<Selection>) -> Self {
        self.variables = non_empty(variables.into());
        self
    }

    pub fn ssp(mut self, scenarios: impl Into<Selection>) -> Self {
        self.ssp = non_empty(scenarios.into());
        self
    }

    pub fn time_period(mut self, period: impl Into<Selection>) -> Self {
        self.time_period = non_empty(period.into());
        self
    }

    pub fn depth(mut self, depths: impl Into<Selection>) -> Self {
        self.depth = non_empty(depths.into());
        self
    }

    pub fn shape(mut self, shape: OutputShape) -> Self {
        self.shape = shape;
        self
    }

    /// Shorthand for `shape(OutputShape::Ids)`.
    pub fn ids(self) -> Self {
        self.shape(OutputShape::Ids)
    }

    /// Keep only the `datasetID` and `title` columns.
    pub fn simplify(mut self, simplify: bool) -> Self {
        self.simplify = simplify;
        self
    }

    /// Keep the server's own `allDatasets` row at the top of the catalog.
    pub fn include_meta_row(mut self, include: bool) -> Self {
        self.include_meta_row = include;
        self
    }

    /// The same query with empty selections turned into `None`.
    pub(crate) fn normalized(&self) -> Self {
        let keep = |s: &Option<Selection>| s.clone().and_then(non_empty);
        Self {
            search: keep(&self.search),
            variables: keep(&self.variables),
            ssp: keep(&self.ssp),
            time_period: keep(&self.time_period),
            depth: keep(&self.depth),
            ..self.clone()
        }
    }

    /// Checks every vocabulary-bound argument. Never rejects.
    pub fn validate(&self) -> Vec<InvalidArgument> {
        let mut invalid = validate_argument("variables", self.variables.as_ref(), VARIABLES);
        invalid.extend(validate_argument("ssp", self.ssp.as_ref(), SCENARIOS));
        invalid.extend(validate_argument(
            "time_period",
            self.time_period.as_ref(),
            TIME_PERIODS,
        ));
        invalid.extend(validate_argument("depth", self.depth.as_ref(), DEPTHS));
        invalid
    }
}

fn non_empty(selection: Selection) -> Option<Selection> {
    (!selection.is_empty()).then_some(selection)
}

/// A filter value outside its vocabulary. Reported, not rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("selected {field} '{value}' is not a valid {field}; valid values are: {}", .allowed.join(", "))]
pub struct InvalidArgument {
    pub field: String,
    pub value: String,
    pub allowed: Vec<String>,
}

/// Lower-cases each value and checks it against `allowed`.
pub fn validate_argument(
    field: &str,
    value: Option<&Selection>,
    allowed: &[&str],
) -> Vec<InvalidArgument> {
    let Some(value) = value else {
        return Vec::new();
    };
    value
        .iter()
        .filter(|v| !allowed.contains(&v.to_lowercase().as_str()))
        .map(|v| InvalidArgument {
            field: field.to_string(),
            value: v.to_string(),
            allowed: allowed.iter().map(|a| a.to_string()).collect(),
        })
        .collect()
}
