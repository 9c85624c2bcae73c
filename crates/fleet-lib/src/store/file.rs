//! File-backed series store
//!
//! One JSON blob per instance under a data directory. Writes go to a
//! per-instance temp file which is synced and then renamed over the target, so
//! an interrupted write leaves the previous blob intact.

use super::{MetricSeries, SeriesStore};
use crate::error::{FleetError, Result};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Series store rooted at a local directory
#[derive(Debug, Clone)]
pub struct FileSeriesStore {
    data_dir: PathBuf,
}

impl FileSeriesStore {
    /// Open a store, creating the data directory if needed
    pub fn open(data_dir: impl Into<PathBuf>) -> Result<Self> {
        let data_dir = data_dir.into();
        fs::create_dir_all(&data_dir).map_err(|source| FleetError::Persistence {
            id: String::new(),
            path: data_dir.clone(),
            source,
        })?;
        Ok(Self { data_dir })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Location of the blob for `instance_id`
    pub fn path_for(&self, instance_id: &str) -> PathBuf {
        self.data_dir.join(format!("{}.json", file_stem(instance_id)))
    }

    fn persistence_error(instance_id: &str, path: &Path, source: std::io::Error) -> FleetError {
        FleetError::Persistence {
            id: instance_id.to_string(),
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Keep ids from escaping the data directory
fn file_stem(instance_id: &str) -> String {
    instance_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

impl SeriesStore for FileSeriesStore {
    fn load(&self, instance_id: &str) -> Result<MetricSeries> {
        let path = self.path_for(instance_id);

        let data = match fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Ok(MetricSeries::empty(instance_id));
            }
            Err(e) => return Err(Self::persistence_error(instance_id, &path, e)),
        };

        let stored: MetricSeries = serde_json::from_slice(&data)
            .map_err(|e| FleetError::malformed(format!("series file {}", path.display()), e))?;

        // Distinct ids can share a sanitized file name; never hand out another id's history
        if stored.instance_id != instance_id {
            warn!(
                instance_id = %instance_id,
                stored_id = %stored.instance_id,
                path = %path.display(),
                "Series file belongs to another instance"
            );
            let source = std::io::Error::new(
                ErrorKind::InvalidData,
                format!("file holds the series of {}", stored.instance_id),
            );
            return Err(Self::persistence_error(instance_id, &path, source));
        }

        // Re-sort and deduplicate in case the file was edited by hand
        let series = MetricSeries::from_points(instance_id, stored.points);

        debug!(instance_id = %instance_id, points = series.len(), "Loaded series");
        Ok(series)
    }

    fn save(&self, series: &MetricSeries) -> Result<()> {
        let id = series.instance_id.as_str();
        let path = self.path_for(id);
        let json = serde_json::to_vec(series)
            .map_err(|e| FleetError::malformed(format!("series for {}", id), e))?;

        let temp_path = path.with_extension("json.tmp");
        let write_temp = || -> std::io::Result<()> {
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&temp_path)?;
            file.write_all(&json)?;
            file.sync_all()
        };

        if let Err(e) = write_temp() {
            let _ = fs::remove_file(&temp_path);
            return Err(Self::persistence_error(id, &temp_path, e));
        }

        fs::rename(&temp_path, &path).map_err(|e| Self::persistence_error(id, &path, e))?;

        debug!(instance_id = %id, points = series.len(), path = %path.display(), "Series saved");
        Ok(())
    }
}
