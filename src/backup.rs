use crate::models::Collection;
use crate::store::EntityStore;
use anyhow::Context;
use chrono::{SecondsFormat, Utc};
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

const MANIFEST_ENTRY: &str = "manifest.json";
const COLLECTIONS_DIR: &str = "collections";
pub const BUNDLE_FORMAT_V1: &str = "coursehub-snapshot-v1";

#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub bundle_format: String,
    pub entry_count: usize,
    pub record_count: usize,
}

fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Writes every collection into a zip at `out_path`: one
/// `collections/<kind>.json` entry each plus a manifest with record counts,
/// versions and SHA-256 checksums of the entry bodies.
pub fn export_snapshot_bundle<S: EntityStore + ?Sized>(
    store: &S,
    out_path: &Path,
) -> anyhow::Result<ExportSummary> {
    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.to_string_lossy()))?;
    }

    let out_file = File::create(out_path).with_context(|| {
        format!(
            "failed to create output file {}",
            out_path.to_string_lossy()
        )
    })?;
    let mut zip = ZipWriter::new(out_file);
    let opts = FileOptions::default().compression_method(CompressionMethod::Deflated);

    let mut entries = Map::new();
    let mut record_count = 0;
    for kind in Collection::ALL {
        let snap = store
            .load(kind)
            .with_context(|| format!("failed to read collection {}", kind.key()))?;
        let body = serde_json::to_vec_pretty(&snap.records)
            .with_context(|| format!("failed to serialize collection {}", kind.key()))?;
        let entry = format!("{COLLECTIONS_DIR}/{}.json", kind.key());

        zip.start_file(entry.as_str(), opts)
            .with_context(|| format!("failed to start entry {entry}"))?;
        zip.write_all(&body)
            .with_context(|| format!("failed to write entry {entry}"))?;

        record_count += snap.records.len();
        entries.insert(
            kind.key().to_string(),
            json!({
                "entry": entry,
                "records": snap.records.len(),
                "version": snap.version,
                "sha256": sha256_hex(&body),
            }),
        );
    }

    let manifest = json!({
        "format": BUNDLE_FORMAT_V1,
        "appVersion": env!("CARGO_PKG_VERSION"),
        "exportedAt": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        "collections": Value::Object(entries),
    });
    zip.start_file(MANIFEST_ENTRY, opts)
        .context("failed to start manifest entry")?;
    zip.write_all(
        serde_json::to_string_pretty(&manifest)
            .context("failed to serialize manifest")?
            .as_bytes(),
    )
    .context("failed to write manifest entry")?;

    zip.finish().context("failed to finalize zip bundle")?;

    Ok(ExportSummary {
        bundle_format: BUNDLE_FORMAT_V1.to_string(),
        entry_count: Collection::ALL.len() + 1,
        record_count,
    })
}
