//! Blocking HTTP access to the catalog

use std::time::Duration;
use tracing::debug;

use crate::config::Config;
use crate::error::CatalogError;
use crate::xml::Document;

/// Anything that can turn a catalog query URL into a parsed document.
pub trait CatalogSource {
    fn fetch(&self, url: &str) -> Result<Document, CatalogError>;
}

pub struct CatalogClient {
    client: reqwest::blocking::Client,
}

impl CatalogClient {
    pub fn new(user_agent: &str, timeout: Option<Duration>) -> Result<Self, CatalogError> {
        let mut builder = reqwest::blocking::Client::builder().user_agent(user_agent);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            client: builder.build()?,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, CatalogError> {
        Self::new(&config.user_agent, config.timeout())
    }
}

impl CatalogSource for CatalogClient {
    fn fetch(&self, url: &str) -> Result<Document, CatalogError> {
        debug!(url, "fetching catalog");
        let response = self.client.get(url).send()?;

        let status = response.status();
        if !status.is_success() {
            return Err(CatalogError::Status(status.as_u16()));
        }

        let body = response.text()?;
        debug!(url, bytes = body.len(), "catalog response received");
        Document::parse(&body)
    }
}
