//! Resolution of slice and tile addresses to stored images.

use crate::{
    enums::Orientation,
    grid::TileAddress,
    models::{ScanId, Slice},
    repository::{Repository, RepositoryError},
};

use std::{
    fs, io,
    path::PathBuf,
    sync::Arc,
};

/// Read access to extracted tiles
pub trait TileStore: Send + Sync {
    /// Bytes of the tile at `address`, `None` when no tile was extracted there
    fn read_tile(&self, address: TileAddress) -> io::Result<Option<Vec<u8>>>;
}

/// Tiles laid out on disk by the tile extractor
pub struct FsTileStore {
    root: PathBuf,
}

impl FsTileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl TileStore for FsTileStore {
    fn read_tile(&self, address: TileAddress) -> io::Result<Option<Vec<u8>>> {
        match fs::read(address.path_under(&self.root)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("No {orientation:?} slice at index {index} of scan {scan_id}")]
    SliceNotFound {
        scan_id: ScanId,
        orientation: Orientation,
        index: usize,
    },

    #[error("No tile at z={} y={} x={}", .0.z, .0.y, .0.x)]
    TileNotFound(TileAddress),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Maps `(scan, orientation, index)` to stored slices and `(z, y, x)` to tiles.
///
/// Non-axial slices are produced by an external re-slicer; once stored they
/// resolve exactly like axial ones.
#[derive(Clone)]
pub struct SliceResolver {
    repository: Arc<dyn Repository>,
    tiles: Arc<dyn TileStore>,
}

impl SliceResolver {
    pub fn new(repository: Arc<dyn Repository>, tiles: Arc<dyn TileStore>) -> Self {
        Self { repository, tiles }
    }

    pub fn resolve_slice(
        &self,
        scan_id: ScanId,
        orientation: Orientation,
        index: usize,
    ) -> Result<Slice, ResolveError> {
        self.repository
            .get_slices_by_scan_id(scan_id, orientation)?
            .into_iter()
            .nth(index)
            .ok_or(ResolveError::SliceNotFound {
                scan_id,
                orientation,
                index,
            })
    }

    /// Slices `[begin, begin + count)` along `orientation`, truncated to those stored
    pub fn slice_range(
        &self,
        scan_id: ScanId,
        orientation: Orientation,
        begin: usize,
        count: usize,
    ) -> Result<Vec<Slice>, ResolveError> {
        Ok(self
            .repository
            .get_slices_by_scan_id(scan_id, orientation)?
            .into_iter()
            .skip(begin)
            .take(count)
            .collect())
    }

    pub fn slice_image(&self, slice: &Slice) -> Result<Vec<u8>, ResolveError> {
        Ok(self.repository.get_slice_converted_image(slice.id)?)
    }

    pub fn tile(&self, address: TileAddress) -> Result<Vec<u8>, ResolveError> {
        self.tiles
            .read_tile(address)?
            .ok_or(ResolveError::TileNotFound(address))
    }
}
