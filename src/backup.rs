use anyhow::{anyhow, Context};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::db::DB_FILE_NAME;

const MANIFEST_ENTRY: &str = "manifest.json";
const DB_ENTRY: &str = "db/classroom.sqlite3";
pub const BUNDLE_FORMAT: &str = "classroom-workspace-v1";

#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub bundle_format: String,
    pub entry_count: usize,
    pub db_sha256: String,
}

#[derive(Debug, Clone)]
pub struct ImportSummary {
    pub bundle_format: String,
    pub db_bytes: usize,
}

fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

pub fn export_workspace_bundle(
    workspace_path: &Path,
    out_path: &Path,
) -> anyhow::Result<ExportSummary> {
    let db_path = workspace_path.join(DB_FILE_NAME);
    if !db_path.is_file() {
        return Err(anyhow!(
            "workspace database not found: {}",
            db_path.to_string_lossy()
        ));
    }
    let db_bytes = std::fs::read(&db_path)
        .with_context(|| format!("failed to read database {}", db_path.to_string_lossy()))?;
    let digest = sha256_hex(&db_bytes);

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

    let manifest = json!({
        "format": BUNDLE_FORMAT,
        "appVersion": env!("CARGO_PKG_VERSION"),
        "exportedAt": chrono::Utc::now().to_rfc3339(),
        "dbSha256": digest,
    });
    zip.start_file(MANIFEST_ENTRY, opts)
        .context("failed to start manifest entry")?;
    zip.write_all(
        serde_json::to_string_pretty(&manifest)
            .context("failed to serialize manifest")?
            .as_bytes(),
    )
    .context("failed to write manifest entry")?;

    zip.start_file(DB_ENTRY, opts)
        .context("failed to start database entry")?;
    zip.write_all(&db_bytes)
        .context("failed to write database entry")?;
    zip.finish().context("failed to finalize zip bundle")?;

    tracing::info!(
        out = %out_path.display(),
        bytes = db_bytes.len(),
        "workspace bundle exported"
    );
    Ok(ExportSummary {
        bundle_format: BUNDLE_FORMAT.to_string(),
        entry_count: 2,
        db_sha256: digest,
    })
}

/// A bundle whose manifest and database digest have been checked.
#[derive(Debug)]
pub struct VerifiedBundle {
    db_bytes: Vec<u8>,
}

/// Reads and checks a bundle without touching any workspace.
pub fn verify_workspace_bundle(in_path: &Path) -> anyhow::Result<VerifiedBundle> {
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
    if format != BUNDLE_FORMAT {
        return Err(anyhow!("unsupported bundle format: {}", format));
    }
    let expected = manifest
        .get("dbSha256")
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow!("manifest.json missing dbSha256"))?
        .to_ascii_lowercase();

    let mut db_bytes = Vec::new();
    archive
        .by_name(DB_ENTRY)
        .context("bundle missing db/classroom.sqlite3")?
        .read_to_end(&mut db_bytes)
        .context("failed to extract database entry")?;
    let actual = sha256_hex(&db_bytes);
    if actual != expected {
        return Err(anyhow!(
            "database digest mismatch: manifest {} but entry is {}",
            expected,
            actual
        ));
    }
    Ok(VerifiedBundle { db_bytes })
}

/// Writes a verified bundle's database into `workspace_path`, replacing any
/// existing one. The caller must have closed its connection first.
pub fn install_workspace_bundle(
    bundle: VerifiedBundle,
    workspace_path: &Path,
) -> anyhow::Result<ImportSummary> {
    let db_bytes = bundle.db_bytes;
    std::fs::create_dir_all(workspace_path).with_context(|| {
        format!(
            "failed to create workspace {}",
            workspace_path.to_string_lossy()
        )
    })?;
    let dst = workspace_path.join(DB_FILE_NAME);
    let tmp_dst = workspace_path.join(format!("{DB_FILE_NAME}.importing"));
    {
        let mut db_out = File::create(&tmp_dst).with_context(|| {
            format!(
                "failed to create temp database {}",
                tmp_dst.to_string_lossy()
            )
        })?;
        db_out
            .write_all(&db_bytes)
            .and_then(|_| db_out.flush())
            .context("failed to write extracted database")?;
    }
    // rename() replaces the target on unix but not on windows.
    if dst.exists() {
        std::fs::remove_file(&dst).with_context(|| {
            format!(
                "failed to remove existing database {}",
                dst.to_string_lossy()
            )
        })?;
    }
    std::fs::rename(&tmp_dst, &dst).with_context(|| {
        format!(
            "failed to move extracted database to {}",
            dst.to_string_lossy()
        )
    })?;

    tracing::info!(
        workspace = %workspace_path.display(),
        bytes = db_bytes.len(),
        "workspace bundle imported"
    );
    Ok(ImportSummary {
        bundle_format: BUNDLE_FORMAT.to_string(),
        db_bytes: db_bytes.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(prefix: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("{prefix}-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).expect("create temp dir");
        dir
    }

    fn write_bundle(path: &Path, manifest: serde_json::Value, db: &[u8]) {
        let mut zip = ZipWriter::new(File::create(path).expect("create bundle"));
        let opts = FileOptions::default();
        zip.start_file(MANIFEST_ENTRY, opts).expect("manifest");
        zip.write_all(manifest.to_string().as_bytes()).expect("write manifest");
        zip.start_file(DB_ENTRY, opts).expect("db");
        zip.write_all(db).expect("write db");
        zip.finish().expect("finish");
    }

    #[test]
    fn export_then_import_restores_identical_bytes() {
        let src = temp_dir("classroomd-backup-src");
        let dst = temp_dir("classroomd-backup-dst");
        std::fs::write(src.join(DB_FILE_NAME), b"not really sqlite").expect("seed db");
        let bundle = src.join("out").join("bundle.zip");

        let export = export_workspace_bundle(&src, &bundle).expect("export");
        assert_eq!(export.entry_count, 2);
        assert_eq!(export.db_sha256, sha256_hex(b"not really sqlite"));

        let verified = verify_workspace_bundle(&bundle).expect("verify");
        let import = install_workspace_bundle(verified, &dst).expect("install");
        assert_eq!(import.bundle_format, BUNDLE_FORMAT);
        let restored = std::fs::read(dst.join(DB_FILE_NAME)).expect("read restored");
        assert_eq!(restored, b"not really sqlite");
    }

    #[test]
    fn export_requires_database() {
        let ws = temp_dir("classroomd-backup-empty");
        let err = export_workspace_bundle(&ws, &ws.join("b.zip")).unwrap_err();
        assert!(err.to_string().contains("workspace database not found"));
    }

    #[test]
    fn import_rejects_tampered_database() {
        let ws = temp_dir("classroomd-backup-tamper");
        let bundle = ws.join("bundle.zip");
        write_bundle(
            &bundle,
            json!({ "format": BUNDLE_FORMAT, "dbSha256": sha256_hex(b"original") }),
            b"tampered",
        );
        let err = verify_workspace_bundle(&bundle).unwrap_err();
        assert!(err.to_string().contains("digest mismatch"));
    }

    #[test]
    fn import_rejects_unknown_format() {
        let ws = temp_dir("classroomd-backup-format");
        let bundle = ws.join("bundle.zip");
        write_bundle(
            &bundle,
            json!({ "format": "gradebook-workspace-v2", "dbSha256": sha256_hex(b"x") }),
            b"x",
        );
        let err = verify_workspace_bundle(&bundle).unwrap_err();
        assert!(err.to_string().contains("unsupported bundle format"));
    }
}
