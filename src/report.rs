//! Output of a finished query: plain listing, JSON, or CSV of file URLs

use anyhow::{Context, Result};
use serde::Serialize;
use std::io::Write;
use std::path::Path;

use crate::merge::{QueryReport, ResultSet};

/// Plain listing, one block per observation.
///
/// Unless `all` is set, observations with a single file are skipped: they
/// lack either the calibrated or the derived product.
pub fn write_listing<W: Write>(out: &mut W, report: &QueryReport, all: bool) -> Result<()> {
    let mut shown = 0;
    for (observation_id, record) in report.results.iter() {
        if !all && record.files.len() + record.geometry_files.len() < 2 {
            continue;
        }
        shown += 1;
        writeln!(out, "Observation ID: {}", observation_id)?;
        for (field, value) in &record.metadata {
            writeln!(out, "  {}: {}", field, value.as_deref().unwrap_or("-"))?;
        }
        writeln!(out, "  files:")?;
        for file in &record.files {
            writeln!(out, "    {}", file)?;
        }
        if !record.geometry_files.is_empty() {
            writeln!(out, "  geometry files:")?;
            for file in &record.geometry_files {
                writeln!(out, "    {}", file)?;
            }
        }
    }

    writeln!(
        out,
        "{} of {} observations listed, {} problem(s) reported",
        shown,
        report.results.len(),
        report.diagnostics.len()
    )?;
    Ok(())
}

pub fn write_json<W: Write>(out: &mut W, report: &QueryReport) -> Result<()> {
    serde_json::to_writer_pretty(&mut *out, report)?;
    writeln!(out)?;
    Ok(())
}

#[derive(Serialize)]
struct FileRow<'a> {
    observation_id: &'a str,
    kind: &'static str,
    url: &'a str,
}

/// One row per file URL, geometry files marked as such
pub fn write_csv(path: &Path, results: &ResultSet) -> Result<usize> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create CSV file: {}", path.display()))?;
    let mut rows = 0;
    for (observation_id, record) in results.iter() {
        let files = record.files.iter().map(|url| ("file", url));
        let geometry = record.geometry_files.iter().map(|url| ("geometry", url));
        for (kind, url) in files.chain(geometry) {
            writer.serialize(FileRow {
                observation_id,
                kind,
                url,
            })?;
            rows += 1;
        }
    }
    writer.flush()?;
    Ok(rows)
}
