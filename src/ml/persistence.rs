//! Versioned model bundles on disk.
//!
//! A bundle file is a bincode-encoded [`BundleHeader`] followed by the
//! payload. The header is decoded and checked first, so a file of the wrong
//! family or schema is rejected before its payload is read. Files are written
//! to a sibling temporary path and renamed into place.

use bincode::Options;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;
use uuid::Uuid;

use super::classifier::ClassifierModel;
use super::ensemble::EnsembleModel;
use crate::config::Config;
use crate::error::ModelError;
use crate::forecast::ForecastModel;

pub const SCHEMA_VERSION: u32 = 2;
const MAGIC: [u8; 4] = *b"WXIM";
/// Upper bound on the encoded header size
const HEADER_LIMIT: u64 = 1 << 20;

pub const ARIMA_BUNDLE_FILE: &str = "arima_models.bin";
pub const LEARNER_BUNDLE_FILE: &str = "learner_models.bin";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BundleFamily {
    Arima,
    Learners,
}

impl std::fmt::Display for BundleFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BundleFamily::Arima => write!(f, "arima"),
            BundleFamily::Learners => write!(f, "learners"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleHeader {
    magic: [u8; 4],
    pub bundle_id: Uuid,
    pub family: BundleFamily,
    pub schema_version: u32,
    pub saved_at: DateTime<Utc>,
    /// Configuration in force when the bundle was written
    pub config: Config,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArimaBundle {
    pub models: Vec<ForecastModel>,
    pub last_training_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LearnerBundle {
    pub ensembles: Vec<EnsembleModel>,
    pub classifier: Option<ClassifierModel>,
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

pub fn save_bundle<T: Serialize>(
    path: &Path,
    family: BundleFamily,
    config: &Config,
    payload: &T,
) -> Result<BundleHeader, ModelError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let header = BundleHeader {
        magic: MAGIC,
        bundle_id: Uuid::new_v4(),
        family,
        schema_version: SCHEMA_VERSION,
        saved_at: Utc::now(),
        config: config.clone(),
    };

    let tmp = temp_path(path);
    let write = || -> Result<(), ModelError> {
        let file = File::create(&tmp)?;
        let mut writer = BufWriter::new(file);
        bincode::serialize_into(&mut writer, &header)?;
        bincode::serialize_into(&mut writer, payload)?;
        writer.flush()?;
        writer
            .into_inner()
            .map_err(|e| ModelError::Persistence(format!("I/O error: {}", e.error())))?
            .sync_all()?;
        Ok(())
    };
    if let Err(e) = write() {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    fs::rename(&tmp, path)?;

    info!(family = %family, bundle_id = %header.bundle_id, path = %path.display(), "Saved model bundle");
    Ok(header)
}

/// Decoder matching `bincode::serialize_into`, refusing to read past `limit` bytes
fn decoder(limit: u64) -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .allow_trailing_bytes()
        .with_limit(limit)
}

pub fn load_bundle<T: DeserializeOwned>(path: &Path, family: BundleFamily) -> Result<(BundleHeader, T), ModelError> {
    let file = File::open(path)?;
    let file_len = file.metadata()?.len();
    let mut reader = BufReader::new(file);
    let header: BundleHeader = decoder(HEADER_LIMIT.min(file_len))
        .deserialize_from(&mut reader)
        .map_err(|e| ModelError::Persistence(format!("unreadable bundle header in {}: {}", path.display(), e)))?;

    if header.magic != MAGIC {
        return Err(ModelError::Persistence(format!("{} is not a model bundle", path.display())));
    }
    if header.family != family {
        return Err(ModelError::Persistence(format!(
            "bundle family mismatch: expected {}, found {}",
            family, header.family
        )));
    }
    if header.schema_version != SCHEMA_VERSION {
        return Err(ModelError::Persistence(format!(
            "unsupported schema version {} (expected {})",
            header.schema_version, SCHEMA_VERSION
        )));
    }

    // length prefixes can never claim more than the file holds
    let payload: T = decoder(file_len).deserialize_from(&mut reader)?;
    info!(
        family = %family,
        bundle_id = %header.bundle_id,
        path = %path.display(),
        saved_at = %header.saved_at,
        "Loaded model bundle"
    );
    Ok((header, payload))
}
