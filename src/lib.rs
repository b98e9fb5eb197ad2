//! Query the ODE REST catalog and associate product files by observation.
//!
//! The flow is: [`params::QueryParams`] → [`compose::UrlComposer`] →
//! [`catalog::CatalogSource`] → [`extract::extract_products`] →
//! [`merge::ResultSet`], driven by [`merge::QueryEngine`].

pub mod catalog;
pub mod compose;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod extract;
pub mod merge;
pub mod params;
pub mod report;
pub mod xml;
