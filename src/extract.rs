//! Turn `Product` elements of a catalog document into per-observation records.
//!
//! Two catalog layouts are understood:
//!
//! - the two-query flow reads the observation id from `Observation_id` and
//!   keeps the first `URL` of a product whose first `Type` is `Product`;
//! - the phased flow derives the observation id from `pdsid` and keeps the
//!   `LabelURL`. A product id looks like `CN0266147010M_IF_4`: two prefix
//!   characters, the observation id up to the first underscore, then the file
//!   type token and a two character version suffix.

use std::collections::BTreeMap;

use crate::merge::{ProductRecord, ResultSet};
use crate::xml::{Document, Element};

/// Which fields of a `Product` element identify it and carry its file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProductLayout<'a> {
    /// Calibrated/derived products of the two-query flow
    Observation,
    /// Image phase: keep products whose file type token equals `img_type`
    Image { img_type: &'a str },
    /// Geometry phase: every product with a derivable observation id
    Geometry,
}

/// What one catalog document contributed
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractOutcome {
    Records(ResultSet),
    /// No record kept; `products` counts the `Product` elements seen
    Empty { products: usize },
    /// No record kept and the catalog reported an `Error`
    ServiceError(String),
}

/// Split a product id into observation id and file type token.
///
/// Returns `None` when there is no underscore or the observation id would be
/// empty.
pub fn split_product_id(pdsid: &str) -> Option<(&str, &str)> {
    let underscore = pdsid.find('_')?;
    let observation_id = pdsid.get(2..underscore)?;
    if observation_id.is_empty() {
        return None;
    }
    let end = pdsid.len().saturating_sub(2).max(underscore + 1);
    let file_type = pdsid.get(underscore + 1..end)?;
    Some((observation_id, file_type))
}

fn read_metadata(product: &Element, fields: &BTreeMap<String, String>) -> BTreeMap<String, Option<String>> {
    fields
        .iter()
        .map(|(field, tag)| (field.clone(), product.find_text(tag)))
        .collect()
}

/// Observation id and file URL of one product, if it belongs in the batch
fn identify(product: &Element, layout: ProductLayout<'_>) -> Option<(String, String)> {
    match layout {
        ProductLayout::Observation => {
            let observation_id = product.find_text("Observation_id")?;
            if observation_id.is_empty() || product.find_text("Type")? != "Product" {
                return None;
            }
            let url = product.find_text("URL")?;
            Some((observation_id, url))
        }
        ProductLayout::Image { img_type } => {
            let pdsid = product.find_text("pdsid")?;
            let (observation_id, file_type) = split_product_id(&pdsid)?;
            if file_type != img_type {
                return None;
            }
            Some((observation_id.to_string(), product.find_text("LabelURL")?))
        }
        ProductLayout::Geometry => {
            let pdsid = product.find_text("pdsid")?;
            let (observation_id, _) = split_product_id(&pdsid)?;
            Some((observation_id.to_string(), product.find_text("LabelURL")?))
        }
    }
}

/// Scan every `Product` element of `doc`.
///
/// Products sharing an observation id within the document merge like records
/// from separate queries: files are appended, the first metadata is kept.
pub fn extract_products(
    doc: &Document,
    layout: ProductLayout<'_>,
    metadata_fields: &BTreeMap<String, String>,
) -> ExtractOutcome {
    let mut batch = ResultSet::new();
    let mut products = 0;

    for product in doc.elements("Product") {
        products += 1;
        let Some((observation_id, url)) = identify(product, layout) else {
            continue;
        };
        let metadata = match layout {
            ProductLayout::Geometry => BTreeMap::new(),
            _ => read_metadata(product, metadata_fields),
        };
        batch.merge_record(observation_id, ProductRecord::new(metadata, vec![url]));
    }

    if !batch.is_empty() {
        return ExtractOutcome::Records(batch);
    }

    match doc.elements("Error").next() {
        Some(error) => ExtractOutcome::ServiceError(error.text()),
        None => ExtractOutcome::Empty { products },
    }
}
