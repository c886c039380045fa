use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GridError {
    #[error("Tile dimensions must be non-zero (got {width}x{height})")]
    EmptyTile { width: u32, height: u32 },
}

/// Address of a single tile: depth layer `z`, grid row `y` and grid column `x`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileAddress {
    pub z: u32,
    pub y: u32,
    pub x: u32,
}

impl TileAddress {
    pub fn new(z: u32, y: u32, x: u32) -> Self {
        Self { z, y, x }
    }

    /// Location of the tile relative to a tile root: `<z>/<y>_<x>.png`
    pub fn relative_path(&self) -> PathBuf {
        PathBuf::from(self.z.to_string()).join(format!("{}_{}.png", self.y, self.x))
    }

    pub fn path_under(&self, root: impl AsRef<Path>) -> PathBuf {
        root.as_ref().join(self.relative_path())
    }
}

/// Tile layout of one depth layer.
///
/// The declared layer size may exceed the stored tile size, in which case the
/// layer is a row-major grid of `tiles_y × tiles_x` tiles whose last row and
/// column can be partially filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileGrid {
    pub width: u32,
    pub height: u32,
    pub tile_width: u32,
    pub tile_height: u32,
    pub tiles_x: u32,
    pub tiles_y: u32,
}

impl TileGrid {
    /// Build the grid for a layer of `width × height` pixels stored as
    /// `tile_width × tile_height` tiles.
    ///
    /// # Errors
    ///
    /// Returns [`GridError::EmptyTile`] if either tile dimension is zero
    pub fn new(width: u32, height: u32, tile_width: u32, tile_height: u32) -> Result<Self, GridError> {
        if tile_width == 0 || tile_height == 0 {
            return Err(GridError::EmptyTile {
                width: tile_width,
                height: tile_height,
            });
        }

        Ok(Self {
            width,
            height,
            tile_width,
            tile_height,
            tiles_x: width.div_ceil(tile_width),
            tiles_y: height.div_ceil(tile_height),
        })
    }

    pub fn tile_count(&self) -> usize {
        self.tiles_x as usize * self.tiles_y as usize
    }

    /// Index of tile `(y, x)` in the layer's flat tile array
    #[inline]
    pub fn flat_index(&self, y: u32, x: u32) -> usize {
        y as usize * self.tiles_x as usize + x as usize
    }

    /// Grid positions `(y, x)` in row-major order
    pub fn positions(&self) -> impl Iterator<Item = (u32, u32)> + use<> {
        let (tiles_y, tiles_x) = (self.tiles_y, self.tiles_x);
        (0..tiles_y).flat_map(move |y| (0..tiles_x).map(move |x| (y, x)))
    }
}
