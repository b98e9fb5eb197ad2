//! Association of catalog records across queries.
//!
//! [`ResultSet`] holds the merge rules; [`QueryEngine`] drives the fetches for
//! the two-query flow and the phased (image + geometry) flow.

use serde::Serialize;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use tracing::info;

use crate::catalog::CatalogSource;
use crate::compose::UrlComposer;
use crate::config::Config;
use crate::diagnostics::{DiagnosticKind, Diagnostics};
use crate::error::QueryError;
use crate::extract::{extract_products, ExtractOutcome, ProductLayout};
use crate::params::QueryParams;

/// Metadata and files of one observation
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProductRecord {
    pub metadata: BTreeMap<String, Option<String>>,
    pub files: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub geometry_files: Vec<String>,
}

impl ProductRecord {
    pub fn new(metadata: BTreeMap<String, Option<String>>, files: Vec<String>) -> Self {
        Self {
            metadata,
            files,
            geometry_files: Vec::new(),
        }
    }
}

/// Records keyed by observation id
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ResultSet {
    records: BTreeMap<String, ProductRecord>,
}

impl ResultSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, observation_id: &str) -> Option<&ProductRecord> {
        self.records.get(observation_id)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.records.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ProductRecord)> {
        self.records.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Insert, or on collision append the files and keep the existing metadata
    pub fn merge_record(&mut self, observation_id: String, record: ProductRecord) {
        match self.records.entry(observation_id) {
            Entry::Vacant(slot) => {
                slot.insert(record);
            }
            Entry::Occupied(mut slot) => {
                let existing = slot.get_mut();
                existing.files.extend(record.files);
                existing.geometry_files.extend(record.geometry_files);
            }
        }
    }

    pub fn merge(&mut self, other: ResultSet) {
        for (observation_id, record) in other.records {
            self.merge_record(observation_id, record);
        }
    }

    /// Attach the files of `geometry` to observations already present.
    ///
    /// Geometry for unknown observations is dropped. Returns how many
    /// observations received files.
    pub fn attach_geometry(&mut self, geometry: ResultSet) -> usize {
        let mut attached = 0;
        for (observation_id, record) in geometry.records {
            if let Some(existing) = self.records.get_mut(&observation_id) {
                existing.geometry_files.extend(record.files);
                attached += 1;
            }
        }
        attached
    }
}

/// Everything a query produced: the merged records and what went wrong
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryReport {
    pub results: ResultSet,
    pub diagnostics: Diagnostics,
}

pub struct QueryEngine<'c, S> {
    source: S,
    config: &'c Config,
}

impl<'c, S: CatalogSource> QueryEngine<'c, S> {
    pub fn new(source: S, config: &'c Config) -> Self {
        Self { source, config }
    }

    /// Query calibrated and derived products and associate their files by
    /// observation id. Failed or empty queries are recorded and skipped.
    pub fn associate_files(&self, params: &QueryParams) -> QueryReport {
        let mut report = QueryReport::default();
        for url in UrlComposer::new(self.config).product_urls(params) {
            if let Some(batch) =
                self.run_phase(&url, ProductLayout::Observation, &mut report.diagnostics)
            {
                report.results.merge(batch);
            }
        }
        info!(
            observations = report.results.len(),
            problems = report.diagnostics.len(),
            "query finished"
        );
        report
    }

    /// Image products of a configured target, then their geometry files.
    ///
    /// `params.iid()` is the configured instrument key; it is rewritten to the
    /// catalog instrument id, and the target to its configured spelling, before
    /// querying. Without images the geometry query is not sent.
    pub fn combine_phased(&self, params: &QueryParams) -> Result<QueryReport, QueryError> {
        let (name, target) = self.config.find_target(params.target())?;
        target.check_ihid(name, params.ihid())?;
        let instrument = target.instrument(name, params.iid())?;
        let params = params.with_target(name).with_iid(&instrument.iid);

        let composer = UrlComposer::new(self.config);
        let mut report = QueryReport::default();

        let image_url = composer.phase_url(&params, &target.image_pt);
        let layout = ProductLayout::Image {
            img_type: &instrument.img_type,
        };
        match self.run_phase(&image_url, layout, &mut report.diagnostics) {
            Some(images) => report.results = images,
            None => {
                info!("no images, geometry query skipped");
                return Ok(report);
            }
        }

        let geometry_url = composer.phase_url(&params, &target.geometry_pt);
        if let Some(geometry) =
            self.run_phase(&geometry_url, ProductLayout::Geometry, &mut report.diagnostics)
        {
            let attached = report.results.attach_geometry(geometry);
            info!(attached, "geometry files associated");
        }

        info!(
            observations = report.results.len(),
            problems = report.diagnostics.len(),
            "query finished"
        );
        Ok(report)
    }

    /// Fetch and extract one URL; `None` when it contributed nothing
    fn run_phase(
        &self,
        url: &str,
        layout: ProductLayout<'_>,
        diagnostics: &mut Diagnostics,
    ) -> Option<ResultSet> {
        let doc = match self.source.fetch(url) {
            Ok(doc) => doc,
            Err(e) => {
                diagnostics.critical(e.kind(), url, e.to_string());
                return None;
            }
        };

        match extract_products(&doc, layout, &self.config.metadata) {
            ExtractOutcome::Records(batch) => {
                info!(url, observations = batch.len(), "catalog records extracted");
                Some(batch)
            }
            ExtractOutcome::ServiceError(text) => {
                diagnostics.critical(
                    DiagnosticKind::ServiceError,
                    url,
                    format!("Error retrieving data for URL {}: {}", url, text),
                );
                None
            }
            ExtractOutcome::Empty { products } => {
                match layout {
                    ProductLayout::Image { img_type } if products > 0 => diagnostics.warning(
                        DiagnosticKind::Filtered,
                        url,
                        format!(
                            "{} products returned but none with file type '{}'. Please check the instrument configuration",
                            products, img_type
                        ),
                    ),
                    _ => diagnostics.warning(
                        DiagnosticKind::Empty,
                        url,
                        "Query didn't produce any files. Please check parameters",
                    ),
                }
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::testing::CannedCatalog;
    use crate::diagnostics::Severity;
    use crate::params::QueryFilters;

    fn record(files: &[&str]) -> ProductRecord {
        ProductRecord::new(
            BTreeMap::new(),
            files.iter().map(|f| f.to_string()).collect(),
        )
    }

    fn set(entries: Vec<(&str, Vec<&str>)>) -> ResultSet {
        let mut set = ResultSet::new();
        for (id, files) in entries {
            set.merge_record(id.to_string(), record(&files));
        }
        set
    }

    fn observation_xml(products: &[(&str, &str)]) -> String {
        let body: String = products
            .iter()
            .map(|(obs, url)| {
                format!(
                    "<Product><Target_name>MOON</Target_name><Observation_id>{obs}</Observation_id>\
                     <Product_files><Product_file><Type>Product</Type><URL>{url}</URL></Product_file></Product_files></Product>"
                )
            })
            .collect();
        format!("<ODEResults><Products>{body}</Products></ODEResults>")
    }

    fn moon() -> QueryParams {
        QueryParams::new("moon", "LRO", "LROC", QueryFilters::default()).unwrap()
    }

    fn mercury(iid: &str) -> QueryParams {
        QueryParams::new("mercury", "MESS", iid, QueryFilters::default()).unwrap()
    }

    #[test]
    fn test_sequential_merge_concatenates_files() {
        let mut result = set(vec![("A", vec!["u1"])]);
        result.merge(set(vec![("A", vec!["u2"]), ("B", vec!["u3"])]));

        assert_eq!(result, set(vec![("A", vec!["u1", "u2"]), ("B", vec!["u3"])]));
    }

    #[test]
    fn test_collision_keeps_first_metadata_and_duplicates() {
        let mut meta = BTreeMap::new();
        meta.insert("target".to_string(), Some("MOON".to_string()));
        let mut result = ResultSet::new();
        result.merge_record("A".to_string(), ProductRecord::new(meta.clone(), vec!["u1".into()]));

        let mut other = BTreeMap::new();
        other.insert("target".to_string(), Some("OTHER".to_string()));
        result.merge_record("A".to_string(), ProductRecord::new(other, vec!["u1".into()]));

        let a = result.get("A").unwrap();
        assert_eq!(a.metadata, meta);
        assert_eq!(a.files, vec!["u1", "u1"]);
    }

    #[test]
    fn test_geometry_attaches_only_to_existing() {
        let mut result = set(vec![("A", vec!["img"])]);
        let attached = result.attach_geometry(set(vec![("A", vec!["geo-a"]), ("Z", vec!["geo-z"])]));

        assert_eq!(attached, 1);
        assert_eq!(result.len(), 1);
        assert_eq!(result.get("A").unwrap().geometry_files, vec!["geo-a"]);
        assert_eq!(result.get("A").unwrap().files, vec!["img"]);
        assert!(result.get("Z").is_none());
    }

    #[test]
    fn test_associate_files_across_product_types() {
        let config = Config::builtin().unwrap();
        let catalog = CannedCatalog::new()
            .with_xml("pt=cdrnac", &observation_xml(&[("A", "u1")]))
            .with_xml("pt=ddrnac", &observation_xml(&[("A", "u2"), ("B", "u3")]));
        let engine = QueryEngine::new(catalog, &config);

        let report = engine.associate_files(&moon());

        assert_eq!(report.results.get("A").unwrap().files, vec!["u1", "u2"]);
        assert_eq!(report.results.get("B").unwrap().files, vec!["u3"]);
        assert_eq!(
            report.results.get("A").unwrap().metadata["target"].as_deref(),
            Some("MOON")
        );
        assert!(report.diagnostics.is_empty());
    }

    #[test]
    fn test_failed_query_does_not_abort_the_other() {
        let config = Config::builtin().unwrap();
        let catalog = CannedCatalog::new()
            .unreachable("pt=cdrnac")
            .with_xml("pt=ddrnac", &observation_xml(&[("B", "u3")]));
        let engine = QueryEngine::new(catalog, &config);

        let report = engine.associate_files(&moon());

        assert_eq!(report.results.keys().collect::<Vec<_>>(), vec!["B"]);
        let problems: Vec<_> = report.diagnostics.iter().collect();
        assert_eq!(problems.len(), 1);
        assert_eq!(problems[0].kind, DiagnosticKind::Transport);
        assert_eq!(problems[0].severity, Severity::Critical);
        assert!(problems[0].url.contains("pt=cdrnac"));
    }

    #[test]
    fn test_empty_and_error_responses_are_reported() {
        let config = Config::builtin().unwrap();
        let catalog = CannedCatalog::new()
            .with_xml("pt=cdrnac", "<ODEResults><Count>0</Count></ODEResults>")
            .with_xml(
                "pt=ddrnac",
                "<ODEResults><Error>No products found for target moon</Error></ODEResults>",
            );
        let engine = QueryEngine::new(catalog, &config);

        let report = engine.associate_files(&moon());

        assert!(report.results.is_empty());
        let problems: Vec<_> = report.diagnostics.iter().collect();
        assert_eq!(problems[0].kind, DiagnosticKind::Empty);
        assert_eq!(problems[0].severity, Severity::Warning);
        assert_eq!(problems[1].kind, DiagnosticKind::ServiceError);
        assert!(problems[1]
            .message
            .contains("No products found for target moon"));
    }

    #[test]
    fn test_malformed_response_is_critical() {
        let config = Config::builtin().unwrap();
        let catalog = CannedCatalog::new()
            .with_xml("pt=cdrnac", "<ODEResults><Products>")
            .with_xml("pt=ddrnac", &observation_xml(&[("A", "u2")]));
        let report = QueryEngine::new(catalog, &config).associate_files(&moon());

        assert_eq!(report.results.len(), 1);
        assert!(report.diagnostics.has_kind(DiagnosticKind::MalformedResponse));
    }

    const IMAGES: &str = r#"<ODEResults><Products>
  <Product><pdsid>CN0266147010M_IF_4</pdsid><Target_name>MERCURY</Target_name>
    <LabelURL>http://pds/CN0266147010M_IF_4.LBL</LabelURL></Product>
  <Product><pdsid>CN0266147020M_IF_4</pdsid><Target_name>MERCURY</Target_name>
    <LabelURL>http://pds/CN0266147020M_IF_4.LBL</LabelURL></Product>
</Products></ODEResults>"#;

    const GEOMETRY: &str = r#"<ODEResults><Products>
  <Product><pdsid>DN0266147010M_DE_0</pdsid><LabelURL>http://pds/DN0266147010M_DE_0.LBL</LabelURL></Product>
  <Product><pdsid>DN0999999999M_DE_0</pdsid><LabelURL>http://pds/DN0999999999M_DE_0.LBL</LabelURL></Product>
</Products></ODEResults>"#;

    #[test]
    fn test_phased_flow_attaches_geometry() {
        let config = Config::builtin().unwrap();
        let catalog = CannedCatalog::new()
            .with_xml("pt=CDR", IMAGES)
            .with_xml("pt=DDR", GEOMETRY);
        let engine = QueryEngine::new(catalog, &config);

        let report = engine.combine_phased(&mercury("NAC")).unwrap();

        assert_eq!(report.results.len(), 2);
        let first = report.results.get("0266147010M").unwrap();
        assert_eq!(first.files, vec!["http://pds/CN0266147010M_IF_4.LBL"]);
        assert_eq!(first.geometry_files, vec!["http://pds/DN0266147010M_DE_0.LBL"]);
        assert_eq!(first.metadata["target"].as_deref(), Some("MERCURY"));
        assert!(report.results.get("0266147020M").unwrap().geometry_files.is_empty());
        assert!(report.results.get("0999999999M").is_none());

        // instrument id rewritten before querying
        let requests = engine.source.requests.borrow();
        assert_eq!(requests.len(), 2);
        assert!(requests.iter().all(|url| url.contains("iid=MDIS-NAC")));
    }

    #[test]
    fn test_phased_flow_stops_without_images() {
        let config = Config::builtin().unwrap();
        let catalog = CannedCatalog::new()
            .with_xml("pt=CDR", "<ODEResults><Products></Products></ODEResults>")
            .with_xml("pt=DDR", GEOMETRY);
        let engine = QueryEngine::new(catalog, &config);
        let report = engine.combine_phased(&mercury("WAC")).unwrap();

        assert!(report.results.is_empty());
        assert_eq!(report.diagnostics.len(), 1);
        assert!(report.diagnostics.has_kind(DiagnosticKind::Empty));
        let requests = engine.source.requests.borrow();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].contains("pt=CDR"));
    }

    #[test]
    fn test_phased_flow_queries_configured_target_name() {
        let config = Config::builtin().unwrap();
        let catalog = CannedCatalog::new()
            .with_xml("pt=CDR", IMAGES)
            .with_xml("pt=DDR", GEOMETRY);
        let engine = QueryEngine::new(catalog, &config);
        let params = QueryParams::new("Mercury", "MESS", "NAC", QueryFilters::default()).unwrap();

        let report = engine.combine_phased(&params).unwrap();

        assert_eq!(report.results.len(), 2);
        let requests = engine.source.requests.borrow();
        assert!(requests.iter().all(|url| url.contains("target=mercury&")));
    }

    #[test]
    fn test_phased_flow_reports_filtered_images() {
        let mut config = Config::builtin().unwrap();
        config
            .targets
            .get_mut("mercury")
            .unwrap()
            .instruments
            .get_mut("NAC")
            .unwrap()
            .img_type = "RA".to_string();
        let catalog = CannedCatalog::new()
            .with_xml("pt=CDR", IMAGES)
            .with_xml("pt=DDR", GEOMETRY);
        let report = QueryEngine::new(catalog, &config)
            .combine_phased(&mercury("NAC"))
            .unwrap();

        assert!(report.results.is_empty());
        let filtered = report
            .diagnostics
            .iter()
            .find(|d| d.kind == DiagnosticKind::Filtered)
            .unwrap();
        assert!(filtered.message.contains("'RA'"));
    }

    #[test]
    fn test_phased_flow_rejects_unknown_instrument_before_fetching() {
        let config = Config::builtin().unwrap();
        let engine = QueryEngine::new(CannedCatalog::new(), &config);

        let err = engine.combine_phased(&mercury("XRS")).unwrap_err();
        assert!(matches!(err, QueryError::UnknownInstrument { .. }));
        assert!(engine.source.requests.borrow().is_empty());

        let wrong_host = QueryParams::new("mercury", "MRO", "NAC", QueryFilters::default()).unwrap();
        assert!(matches!(
            engine.combine_phased(&wrong_host),
            Err(QueryError::UnknownInstrumentHost { .. })
        ));
        assert!(matches!(
            engine.combine_phased(&moon()),
            Err(QueryError::UnknownTarget(_))
        ));
    }
}
