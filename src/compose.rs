//! Catalog query URL composition

use url::form_urlencoded;

use crate::config::Config;
use crate::params::QueryParams;

/// Serialize every non-empty parameter as form-encoded `name=value` pairs
pub fn serialize_params(params: &QueryParams) -> String {
    let mut serializer = form_urlencoded::Serializer::new(String::new());
    for (name, value) in params.pairs() {
        serializer.append_pair(name, &value);
    }
    serializer.finish()
}

pub struct UrlComposer<'a> {
    endpoint: &'a str,
    calibrated_pt: &'a str,
    derived_pt: &'a str,
}

impl<'a> UrlComposer<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self {
            endpoint: &config.endpoint,
            calibrated_pt: &config.calibrated_pt,
            derived_pt: &config.derived_pt,
        }
    }

    /// Calibrated and derived product URLs sharing one parameter string
    pub fn product_urls(&self, params: &QueryParams) -> [String; 2] {
        let query = serialize_params(params);
        [
            self.with_product_type(self.calibrated_pt, &query),
            self.with_product_type(self.derived_pt, &query),
        ]
    }

    /// Single URL selecting the product type `pt`
    pub fn phase_url(&self, params: &QueryParams, pt: &str) -> String {
        self.with_product_type(pt, &serialize_params(params))
    }

    fn with_product_type(&self, pt: &str, query: &str) -> String {
        let sep = if self.endpoint.contains('?') { '&' } else { '?' };
        let pt: String = form_urlencoded::byte_serialize(pt.as_bytes()).collect();
        format!("{}{}pt={}&{}", self.endpoint, sep, pt, query)
    }
}
