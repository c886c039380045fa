use crate::enums::SortBy;

use dicom::object::{DefaultDicomObject, OpenFileOptions};
use dicom_dictionary_std::tags;
use serde::Deserialize;
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum LayerMapError {
    #[error("No DICOM layers found")]
    Empty,

    #[error("Depth index {0} is assigned more than once")]
    DuplicateDepth(u32),

    #[error("Depth indices must be contiguous from 0, missing {0}")]
    MissingDepth(u32),

    #[error("Invalid manifest {path}: {source}")]
    Manifest {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Deserialize)]
struct ManifestEntry {
    z: u32,
    path: PathBuf,
}

/// Ordered mapping from depth index `z` to the DICOM file holding that layer.
///
/// Depth indices are unique and contiguous from zero, so the mapping is stored
/// as a plain vector indexed by `z`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerMap {
    layers: Vec<PathBuf>,
}

impl LayerMap {
    /// Build a mapping from explicit `(z, path)` pairs
    ///
    /// # Errors
    ///
    /// Returns error if no entries are given, a depth index repeats or the
    /// indices leave a gap
    pub fn from_manifest(
        entries: impl IntoIterator<Item = (u32, PathBuf)>,
    ) -> Result<Self, LayerMapError> {
        let mut by_depth = BTreeMap::new();
        for (z, path) in entries {
            if by_depth.insert(z, path).is_some() {
                return Err(LayerMapError::DuplicateDepth(z));
            }
        }

        if by_depth.is_empty() {
            return Err(LayerMapError::Empty);
        }

        for (expected, z) in by_depth.keys().enumerate() {
            let expected = expected as u32;
            if *z != expected {
                return Err(LayerMapError::MissingDepth(expected));
            }
        }

        Ok(Self {
            layers: by_depth.into_values().collect(),
        })
    }

    /// Read a JSON manifest of the form `[{"z": 0, "path": "14_0.dcm"}, ...]`.
    /// Relative paths are resolved against the manifest's directory.
    pub fn from_manifest_file(path: impl AsRef<Path>) -> Result<Self, LayerMapError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;
        let entries: Vec<ManifestEntry> =
            serde_json::from_str(&contents).map_err(|source| LayerMapError::Manifest {
                path: path.to_path_buf(),
                source,
            })?;
        let base = path.parent().unwrap_or_else(|| Path::new(""));

        Self::from_manifest(
            entries
                .into_iter()
                .map(|entry| (entry.z, base.join(entry.path))),
        )
    }

    /// Build a mapping from every `.dcm` file in a directory, ordered by `sort_by`.
    ///
    /// Only the DICOM headers are read. Files that cannot be parsed or do not
    /// carry the requested sort key are left out.
    pub fn from_directory(path: impl AsRef<Path>, sort_by: SortBy) -> Result<Self, LayerMapError> {
        let mut paths: Vec<_> = fs::read_dir(path.as_ref())?
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| {
                path.extension()
                    .and_then(|s| s.to_str())
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("dcm"))
            })
            .collect();
        paths.sort();

        if paths.is_empty() {
            return Err(LayerMapError::Empty);
        }

        let layers = match sort_by {
            SortBy::None => paths,
            _ => {
                let mut keyed: Vec<_> = paths
                    .into_iter()
                    .filter_map(|path| {
                        let order = Self::read_sort_key(&path, sort_by)?;
                        Some((order, path))
                    })
                    .collect();
                keyed.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
                if matches!(sort_by, SortBy::ImagePositionPatient) {
                    keyed.reverse();
                }
                keyed.into_iter().map(|(_, path)| path).collect()
            }
        };

        debug!("mapped {} layers from {}", layers.len(), path.as_ref().display());
        Self::from_manifest(layers.into_iter().enumerate().map(|(z, p)| (z as u32, p)))
    }

    fn read_sort_key(path: &Path, sort_by: SortBy) -> Option<f32> {
        let header = match OpenFileOptions::new()
            .read_until(tags::PIXEL_DATA)
            .open_file(path)
        {
            Ok(header) => header,
            Err(e) => {
                warn!("skipping {}: {}", path.display(), e);
                return None;
            }
        };

        let key = Self::sort_key(&header, sort_by);
        if key.is_none() {
            warn!("skipping {}: no {:?} attribute", path.display(), sort_by);
        }
        key
    }

    fn sort_key(header: &DefaultDicomObject, sort_by: SortBy) -> Option<f32> {
        match sort_by {
            SortBy::ImagePositionPatient => header
                .element(tags::IMAGE_POSITION_PATIENT)
                .ok()?
                .to_multi_float32()
                .ok()?
                .get(2)
                .copied(),
            SortBy::TablePosition => header
                .element(tags::TABLE_POSITION)
                .ok()?
                .to_float32()
                .ok(),
            SortBy::InstanceNumber => header
                .element(tags::INSTANCE_NUMBER)
                .ok()?
                .to_int::<i32>()
                .ok()
                .map(|n| n as f32),
            SortBy::None => Some(0.0),
        }
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn get(&self, z: u32) -> Option<&Path> {
        self.layers.get(z as usize).map(PathBuf::as_path)
    }

    /// Layers in depth order
    pub fn iter(&self) -> impl Iterator<Item = (u32, &Path)> {
        self.layers
            .iter()
            .enumerate()
            .map(|(z, path)| (z as u32, path.as_path()))
    }
}
