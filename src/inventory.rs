//! Case inventory — chain-of-custody records and report generation.
//!
//! The driver only sees the [`InventorySink`] trait: append a record (with
//! the recovered bytes, in case the sink materializes them), set the final
//! metrics, flush.  [`CaseInventory`] is the stock implementation; it
//! accumulates records in discovery order and writes three reports on
//! flush:
//!
//! - `forensic_report.json` — full machine-readable inventory
//! - `forensic_report.csv`  — `name,type,size_bytes,size_kb,offset,hash`
//! - `forensic_report.html` — self-contained human-readable document;
//!   every untrusted field is escaped
//!
//! Offsets are serialized as lowercase `0x`-prefixed hex everywhere.
//! Recovered blobs go to `<report-dir>/recovered/<name>.<ext>`.

use std::collections::{BTreeMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Serialize, Serializer};
use thiserror::Error;

use crate::driver::ScanMetrics;
use crate::source::SourceMetadata;

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("Cannot write {path}: {source}")]
    Write { path: String, #[source] source: io::Error },
    #[error("Cannot serialize report: {0}")]
    Serialize(#[from] serde_json::Error),
}

fn write_err(path: &Path, source: io::Error) -> SinkError {
    SinkError::Write { path: path.display().to_string(), source }
}

/// One recovered file, in the order it was discovered.
#[derive(Debug, Clone, Serialize)]
pub struct RecoveredRecord {
    pub name:           String,
    #[serde(rename = "type")]
    pub type_name:      String,
    pub size_bytes:     u64,
    #[serde(serialize_with = "as_hex")]
    pub offset:         u64,
    /// SHA-256 of the recovered bytes — the custody anchor.
    pub hash:           String,
    pub repaired:       bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recovered_path: Option<String>,
}

fn as_hex<S: Serializer>(value: &u64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format!("{value:#x}"))
}

/// Append-only record API the driver emits into.
pub trait InventorySink {
    /// Append one record.  `blob` holds the recovered bytes; a sink that
    /// materializes them fills `recovered_path` before storing the record.
    fn add_entry(&mut self, record: RecoveredRecord, blob: &[u8]) -> Result<(), SinkError>;

    fn set_scan_metrics(&mut self, metrics: &ScanMetrics);

    /// Write all pending output.  Called once, after the scan.
    fn flush(&mut self) -> Result<(), SinkError>;
}

/// File extension for a recovered blob, from its registry type name.
fn extension_for(type_name: &str) -> &'static str {
    match type_name.to_ascii_uppercase().as_str() {
        "JPEG" | "JPG" => "jpg",
        "PNG"          => "png",
        "MP4"          => "mp4",
        "ZIP"          => "zip",
        "DOCX"         => "docx",
        _              => "bin",
    }
}

// ── CaseInventory ────────────────────────────────────────────────────────────

pub struct CaseInventory {
    case_id:      String,
    investigator: String,
    report_dir:   PathBuf,
    /// Blob materialization directory; `None` disables writeout.
    recover_dir:  Option<PathBuf>,
    started_at:   DateTime<Utc>,
    source:       Option<SourceMetadata>,
    records:      Vec<RecoveredRecord>,
    metrics:      ScanMetrics,
}

impl CaseInventory {
    /// Create the inventory and its output directories.
    ///
    /// A missing `case_id` gets a generated one so every report is still
    /// attributable.
    pub fn new(
        case_id:      Option<String>,
        investigator: &str,
        report_dir:   &Path,
        materialize:  bool,
    ) -> Result<Self, SinkError> {
        std::fs::create_dir_all(report_dir).map_err(|e| write_err(report_dir, e))?;

        let recover_dir = if materialize {
            let dir = report_dir.join("recovered");
            std::fs::create_dir_all(&dir).map_err(|e| write_err(&dir, e))?;
            Some(dir)
        } else {
            None
        };

        let case_id = case_id
            .unwrap_or_else(|| format!("CASE-{}", uuid::Uuid::new_v4().simple()));

        Ok(Self {
            case_id,
            investigator: investigator.to_owned(),
            report_dir: report_dir.to_owned(),
            recover_dir,
            started_at: Utc::now(),
            source: None,
            records: Vec::new(),
            metrics: ScanMetrics::default(),
        })
    }

    pub fn set_source(&mut self, source: SourceMetadata) {
        self.source = Some(source);
    }

    #[inline] pub fn case_id(&self) -> &str                { &self.case_id }
    #[inline] pub fn records(&self) -> &[RecoveredRecord]  { &self.records }

    pub fn json_path(&self) -> PathBuf { self.report_dir.join("forensic_report.json") }
    pub fn csv_path(&self)  -> PathBuf { self.report_dir.join("forensic_report.csv") }
    pub fn html_path(&self) -> PathBuf { self.report_dir.join("forensic_report.html") }

    fn by_type(&self) -> BTreeMap<String, u64> {
        let mut counts = BTreeMap::new();
        for record in &self.records {
            *counts.entry(record.type_name.clone()).or_insert(0u64) += 1;
        }
        counts
    }

    fn integrity(&self) -> Integrity {
        let unique: HashSet<&str> = self.records.iter().map(|r| r.hash.as_str()).collect();
        Integrity {
            hashes_total:      self.records.len() as u64,
            hashes_unique:     unique.len() as u64,
            hashes_duplicates: self.records.len() as u64 - unique.len() as u64,
        }
    }

    fn write_json(&self) -> Result<(), SinkError> {
        let report = JsonReport {
            case_id:      &self.case_id,
            investigator: &self.investigator,
            start_time:   self.started_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            source:       self.source.as_ref(),
            scan_metrics: &self.metrics,
            totals: Totals {
                files:   self.records.len() as u64,
                by_type: self.by_type(),
            },
            integrity: self.integrity(),
            files:     &self.records,
        };
        let path = self.json_path();
        let text = serde_json::to_string_pretty(&report)?;
        std::fs::write(&path, text).map_err(|e| write_err(&path, e))
    }

    fn write_csv(&self) -> Result<(), SinkError> {
        let mut out = String::from("name,type,size_bytes,size_kb,offset,hash\n");
        for r in &self.records {
            out.push_str(&format!(
                "{},{},{},{:.2},{:#x},{}\n",
                r.name,
                r.type_name,
                r.size_bytes,
                r.size_bytes as f64 / 1024.0,
                r.offset,
                r.hash,
            ));
        }
        let path = self.csv_path();
        std::fs::write(&path, out).map_err(|e| write_err(&path, e))
    }

    fn write_html(&self) -> Result<(), SinkError> {
        let path = self.html_path();
        std::fs::write(&path, self.render_html()).map_err(|e| write_err(&path, e))
    }

    fn render_html(&self) -> String {
        let mut distribution = String::new();
        for (type_name, count) in self.by_type() {
            distribution.push_str(&format!(
                "<tr><td>{}</td><td>{}</td></tr>\n",
                html_escape(&type_name),
                count,
            ));
        }

        let mut rows = String::new();
        for r in &self.records {
            rows.push_str(&format!(
                "<tr><td>{}</td><td>{}</td><td>{:.2} KB</td><td>{:#x}</td>\
                 <td class=\"hash\">{}</td><td>{}</td></tr>\n",
                html_escape(&r.name),
                html_escape(&r.type_name),
                r.size_bytes as f64 / 1024.0,
                r.offset,
                html_escape(&r.hash),
                if r.repaired { "yes" } else { "no" },
            ));
        }

        let integrity = self.integrity();
        format!(
            r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<title>Forensic Recovery Report - {case_id}</title>
<style>
  body {{ font-family: 'Segoe UI', Tahoma, Geneva, Verdana, sans-serif; margin: 40px; background: #f4f7f6; }}
  .container {{ background: white; padding: 30px; border-radius: 8px; box-shadow: 0 2px 10px rgba(0,0,0,0.1); }}
  h1 {{ color: #2c3e50; border-bottom: 2px solid #3498db; padding-bottom: 10px; }}
  .summary {{ display: flex; gap: 20px; margin-bottom: 30px; }}
  .card {{ background: #3498db; color: white; padding: 20px; border-radius: 5px; text-align: center; min-width: 150px; }}
  table {{ width: 100%; border-collapse: collapse; margin-top: 20px; }}
  th, td {{ padding: 12px; border: 1px solid #ddd; text-align: left; font-size: 14px; }}
  th {{ background-color: #2c3e50; color: white; }}
  tr:nth-child(even) {{ background-color: #f9f9f9; }}
  .hash {{ font-family: monospace; font-size: 12px; color: #e74c3c; }}
</style>
</head>
<body>
<div class="container">
  <h1>Forensic Recovery Report</h1>
  <p><strong>Case ID:</strong> {case_id} | <strong>Investigator:</strong> {investigator}</p>
  <p><strong>Date:</strong> {start_time}</p>
  <div class="summary">
    <div class="card"><h3>{files}</h3><p>Files recovered</p></div>
    <div class="card"><h3>{unique}</h3><p>Unique hashes</p></div>
    <div class="card"><h3>{repaired}</h3><p>Repaired</p></div>
  </div>
  <table>
    <thead><tr><th>Type</th><th>Count</th></tr></thead>
    <tbody>
{distribution}    </tbody>
  </table>
  <table>
    <thead>
      <tr><th>Name/ID</th><th>Type</th><th>Size</th><th>Offset (Hex)</th>
          <th>SHA-256 (Chain of Custody)</th><th>Repaired</th></tr>
    </thead>
    <tbody>
{rows}    </tbody>
  </table>
</div>
</body>
</html>
"#,
            case_id      = html_escape(&self.case_id),
            investigator = html_escape(&self.investigator),
            start_time   = self.started_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            files        = self.records.len(),
            unique       = integrity.hashes_unique,
            repaired     = self.records.iter().filter(|r| r.repaired).count(),
            distribution = distribution,
            rows         = rows,
        )
    }
}

impl InventorySink for CaseInventory {
    fn add_entry(&mut self, mut record: RecoveredRecord, blob: &[u8]) -> Result<(), SinkError> {
        if let Some(dir) = &self.recover_dir {
            let path = dir.join(format!("{}.{}", record.name, extension_for(&record.type_name)));
            std::fs::write(&path, blob).map_err(|e| write_err(&path, e))?;
            record.recovered_path = Some(path.display().to_string());
        }
        self.records.push(record);
        Ok(())
    }

    fn set_scan_metrics(&mut self, metrics: &ScanMetrics) {
        self.metrics = metrics.clone();
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        self.write_json()?;
        self.write_csv()?;
        self.write_html()?;
        log::info!("reports written to {}", self.report_dir.display());
        Ok(())
    }
}

// ── Report document shapes ───────────────────────────────────────────────────

#[derive(Serialize)]
struct Totals {
    files:   u64,
    by_type: BTreeMap<String, u64>,
}

#[derive(Serialize)]
struct Integrity {
    hashes_total:      u64,
    hashes_unique:     u64,
    hashes_duplicates: u64,
}

#[derive(Serialize)]
struct JsonReport<'a> {
    case_id:      &'a str,
    investigator: &'a str,
    start_time:   String,
    #[serde(skip_serializing_if = "Option::is_none")]
    source:       Option<&'a SourceMetadata>,
    scan_metrics: &'a ScanMetrics,
    totals:       Totals,
    integrity:    Integrity,
    files:        &'a [RecoveredRecord],
}

/// Minimal HTML escaping for untrusted report fields.
fn html_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&'  => out.push_str("&amp;"),
            '<'  => out.push_str("&lt;"),
            '>'  => out.push_str("&gt;"),
            '"'  => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _    => out.push(c),
        }
    }
    out
}
