//! Query parameters sent to the ODE REST catalog

use chrono::NaiveDateTime;
use std::collections::BTreeMap;

use crate::error::QueryError;

/// Accepted format for acquisition time bounds, e.g. `2013-01-08T15:39:05.169`
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// Catalog names of the optional filters, in serialization order
const FILTER_NAMES: &[&str] = &[
    "westernlon",
    "easternlon",
    "minlat",
    "maxlat",
    "minobtime",
    "maxobtime",
    "mininangle",
    "maxinangle",
    "minemangle",
    "maxemangle",
    "minphangle",
    "maxphangle",
];

/// Optional spatial, temporal and angular filters
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryFilters {
    pub westernlon: Option<f64>,
    pub easternlon: Option<f64>,
    pub minlat: Option<f64>,
    pub maxlat: Option<f64>,
    pub minobtime: Option<String>,
    pub maxobtime: Option<String>,
    pub mininangle: Option<f64>,
    pub maxinangle: Option<f64>,
    pub minemangle: Option<f64>,
    pub maxemangle: Option<f64>,
    pub minphangle: Option<f64>,
    pub maxphangle: Option<f64>,
    /// Additional catalog parameters passed through verbatim
    pub extra: BTreeMap<String, String>,
}

impl QueryFilters {
    fn values(&self) -> [Option<String>; 12] {
        // zero counts as unset, like an empty string
        let num = |v: Option<f64>| v.filter(|v| *v != 0.0).map(|v| v.to_string());
        [
            num(self.westernlon),
            num(self.easternlon),
            num(self.minlat),
            num(self.maxlat),
            self.minobtime.clone(),
            self.maxobtime.clone(),
            num(self.mininangle),
            num(self.maxinangle),
            num(self.minemangle),
            num(self.maxemangle),
            num(self.minphangle),
            num(self.maxphangle),
        ]
    }
}

/// Identifying attributes plus filters of one catalog query.
///
/// Built once through [`QueryParams::new`], which validates the time bounds
/// and the extra parameter names.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryParams {
    target: String,
    ihid: String,
    iid: String,
    filters: QueryFilters,
}

impl QueryParams {
    pub fn new(
        target: impl Into<String>,
        ihid: impl Into<String>,
        iid: impl Into<String>,
        filters: QueryFilters,
    ) -> Result<Self, QueryError> {
        let target = required("target", target.into())?;
        let ihid = required("ihid", ihid.into())?;
        let iid = required("iid", iid.into())?;

        validate_time("minobtime", filters.minobtime.as_deref())?;
        validate_time("maxobtime", filters.maxobtime.as_deref())?;

        for name in filters.extra.keys() {
            if name.is_empty() {
                return Err(QueryError::InvalidParameter(name.clone()));
            }
            if ["target", "ihid", "iid", "pt"].contains(&name.as_str())
                || FILTER_NAMES.contains(&name.as_str())
            {
                return Err(QueryError::DuplicateParameter(name.clone()));
            }
        }

        Ok(Self {
            target,
            ihid,
            iid,
            filters,
        })
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn ihid(&self) -> &str {
        &self.ihid
    }

    pub fn iid(&self) -> &str {
        &self.iid
    }

    pub fn filters(&self) -> &QueryFilters {
        &self.filters
    }

    /// Same query with the instrument id replaced by its catalog name
    pub fn with_iid(&self, iid: &str) -> Self {
        Self {
            iid: iid.to_string(),
            ..self.clone()
        }
    }

    /// Same query against the target name as spelled in the configuration
    pub fn with_target(&self, target: &str) -> Self {
        Self {
            target: target.to_string(),
            ..self.clone()
        }
    }

    /// `(name, value)` pairs to send; unset, empty and zero values left out
    pub fn pairs(&self) -> Vec<(&str, String)> {
        let mut pairs = vec![
            ("target", self.target.clone()),
            ("ihid", self.ihid.clone()),
            ("iid", self.iid.clone()),
        ];
        for (name, value) in FILTER_NAMES.iter().zip(self.filters.values()) {
            if let Some(value) = value {
                pairs.push((*name, value));
            }
        }
        for (name, value) in &self.filters.extra {
            pairs.push((name.as_str(), value.clone()));
        }
        pairs.retain(|(_, value)| !value.trim().is_empty());
        pairs
    }
}

fn required(name: &'static str, value: String) -> Result<String, QueryError> {
    let value = value.trim().to_string();
    if value.is_empty() {
        return Err(QueryError::MissingParameter(name));
    }
    Ok(value)
}

/// Check a time bound against [`TIMESTAMP_FORMAT`]
pub fn validate_time(name: &'static str, value: Option<&str>) -> Result<(), QueryError> {
    match value {
        Some(value) if !value.is_empty() => NaiveDateTime::parse_from_str(value, TIMESTAMP_FORMAT)
            .map(|_| ())
            .map_err(|_| QueryError::InvalidDate {
                name,
                value: value.to_string(),
            }),
        _ => Ok(()),
    }
}

/// Parse a `name=value` extra parameter from the command line
pub fn parse_extra(raw: &str) -> Result<(String, String), QueryError> {
    match raw.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), value.trim().to_string()))
        }
        _ => Err(QueryError::InvalidParameter(raw.to_string())),
    }
}
