use anyhow::{anyhow, Context};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

const MANIFEST_ENTRY: &str = "manifest.json";
pub const BUNDLE_FORMAT_V1: &str = "elearn-data-v1";

#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub bundle_format: String,
    pub document_count: usize,
}

#[derive(Debug, Clone)]
pub struct ImportSummary {
    pub bundle_format_detected: String,
    pub document_count: usize,
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Relative paths (`<kind>/<file>.json`) of every document under the data
/// directory, sorted for a deterministic bundle layout.
fn collect_documents(data_dir: &Path) -> anyhow::Result<Vec<String>> {
    let mut rels = Vec::new();
    for kind_ent in std::fs::read_dir(data_dir)
        .with_context(|| format!("failed to list {}", data_dir.to_string_lossy()))?
    {
        let kind_ent = kind_ent?;
        if !kind_ent.path().is_dir() {
            continue;
        }
        let Some(kind_name) = kind_ent.file_name().to_str().map(|s| s.to_string()) else {
            continue;
        };
        for doc_ent in std::fs::read_dir(kind_ent.path())? {
            let doc_ent = doc_ent?;
            if !doc_ent.path().is_file() {
                continue;
            }
            let Some(doc_name) = doc_ent.file_name().to_str().map(|s| s.to_string()) else {
                continue;
            };
            if !doc_name.ends_with(".json") {
                continue;
            }
            rels.push(format!("{}/{}", kind_name, doc_name));
        }
    }
    rels.sort();
    Ok(rels)
}

pub fn export_data_bundle(data_dir: &Path, out_path: &Path) -> anyhow::Result<ExportSummary> {
    if !data_dir.is_dir() {
        return Err(anyhow!(
            "data directory not found: {}",
            data_dir.to_string_lossy()
        ));
    }

    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.to_string_lossy()))?;
    }

    let rels = collect_documents(data_dir)?;
    let mut contents = Vec::with_capacity(rels.len());
    let mut digests = serde_json::Map::new();
    for rel in &rels {
        let bytes = std::fs::read(data_dir.join(rel))
            .with_context(|| format!("failed to read document {}", rel))?;
        digests.insert(rel.clone(), json!(sha256_hex(&bytes)));
        contents.push(bytes);
    }

    let out_file = File::create(out_path).with_context(|| {
        format!(
            "failed to create output file {}",
            out_path.to_string_lossy()
        )
    })?;
    let mut zip = ZipWriter::new(out_file);
    let opts = FileOptions::default().compression_method(CompressionMethod::Deflated);

    let exported_at = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    let manifest = json!({
        "format": BUNDLE_FORMAT_V1,
        "version": 1,
        "appVersion": env!("CARGO_PKG_VERSION"),
        "exportedAt": exported_at,
        "documents": digests,
    });
    zip.start_file(MANIFEST_ENTRY, opts)
        .context("failed to start manifest entry")?;
    zip.write_all(
        serde_json::to_string_pretty(&manifest)
            .context("failed to serialize manifest")?
            .as_bytes(),
    )
    .context("failed to write manifest entry")?;

    for (rel, bytes) in rels.iter().zip(contents.iter()) {
        zip.start_file(format!("data/{}", rel), opts)
            .with_context(|| format!("failed to start entry {}", rel))?;
        zip.write_all(bytes)
            .with_context(|| format!("failed to write entry {}", rel))?;
    }

    zip.finish().context("failed to finalize zip bundle")?;

    Ok(ExportSummary {
        bundle_format: BUNDLE_FORMAT_V1.to_string(),
        document_count: rels.len(),
    })
}

/// Restore a bundle into `<workspace>/data`, replacing the data directory
/// wholesale. Every entry is verified against its manifest digest before the
/// existing directory is touched; a bad bundle leaves the workspace as it was.
pub fn import_data_bundle(in_path: &Path, workspace: &Path) -> anyhow::Result<ImportSummary> {
    let in_file = File::open(in_path)
        .with_context(|| format!("failed to open bundle {}", in_path.to_string_lossy()))?;
    let mut archive = ZipArchive::new(in_file).context("invalid zip archive")?;

    let mut manifest_text = String::new();
    archive
        .by_name(MANIFEST_ENTRY)
        .context("bundle missing manifest.json")?
        .read_to_string(&mut manifest_text)
        .context("failed to read manifest.json")?;
    let manifest: serde_json::Value =
        serde_json::from_str(&manifest_text).context("manifest.json is invalid JSON")?;
    let format = manifest
        .get("format")
        .and_then(|v| v.as_str())
        .unwrap_or("");
    if format != BUNDLE_FORMAT_V1 {
        return Err(anyhow!("unsupported bundle format: {}", format));
    }
    let documents = manifest
        .get("documents")
        .and_then(|v| v.as_object())
        .cloned()
        .unwrap_or_default();

    let mut verified = Vec::with_capacity(documents.len());
    for (rel, expected) in &documents {
        let expected = expected.as_str().unwrap_or("");
        let mut bytes = Vec::new();
        archive
            .by_name(&format!("data/{}", rel))
            .with_context(|| format!("bundle missing entry {}", rel))?
            .read_to_end(&mut bytes)
            .with_context(|| format!("failed to read entry {}", rel))?;
        let actual = sha256_hex(&bytes);
        if actual != expected {
            return Err(anyhow!(
                "digest mismatch for {}: manifest {} archive {}",
                rel,
                expected,
                actual
            ));
        }
        verified.push((rel.clone(), bytes));
    }

    // All entries verified; now documents not in the bundle do not survive.
    let data_dir = workspace.join("data");
    if data_dir.exists() {
        std::fs::remove_dir_all(&data_dir).with_context(|| {
            format!(
                "failed to clear data directory {}",
                data_dir.to_string_lossy()
            )
        })?;
    }
    std::fs::create_dir_all(&data_dir).with_context(|| {
        format!(
            "failed to create data directory {}",
            data_dir.to_string_lossy()
        )
    })?;

    for (rel, bytes) in &verified {
        let dst = data_dir.join(rel);
        if let Some(parent) = dst.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.to_string_lossy()))?;
        }
        let tmp = dst.with_extension("json.importing");
        std::fs::write(&tmp, bytes).with_context(|| format!("failed to write {}", rel))?;
        std::fs::rename(&tmp, &dst)
            .with_context(|| format!("failed to move {} into place", rel))?;
    }

    Ok(ImportSummary {
        bundle_format_detected: BUNDLE_FORMAT_V1.to_string(),
        document_count: verified.len(),
    })
}
