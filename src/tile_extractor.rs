use crate::{
    grid::{GridError, TileAddress, TileGrid},
    imaging::{encode_gray_png, encode_rgb_png},
    layer_map::LayerMap,
};

use dicom::{
    object::{FileDicomObject, InMemDicomObject, open_file},
    pixeldata::{ConvertOptions, ModalityLutOption, PixelDecoder, VoiLutOption},
};
use dicom_dictionary_std::tags;
use ndarray::{Array3, Array4, Axis, s};
use rayon::prelude::*;
use std::{
    fs,
    path::{Path, PathBuf},
    time::Instant,
};
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum TileExtractorError {
    #[error("Failed to read layer source {path}: {reason}")]
    SourceReadFailure { path: PathBuf, reason: String },

    #[error("Unsupported samples per pixel: {0}")]
    UnsupportedSamples(usize),

    #[error("Invalid tile grid: {0}")]
    Grid(#[from] GridError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

/// Why a tile inside the declared grid was not written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The declared geometry implies more tiles than the layer stores
    SourceGap { flat_index: usize, available: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileOutcome {
    Produced(TileAddress),
    Skipped {
        address: TileAddress,
        reason: SkipReason,
    },
}

impl TileOutcome {
    pub fn is_produced(&self) -> bool {
        matches!(self, TileOutcome::Produced(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerReport {
    pub z: u32,
    pub grid: TileGrid,
    pub outcomes: Vec<TileOutcome>,
}

impl LayerReport {
    pub fn produced_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_produced()).count()
    }

    pub fn skipped_count(&self) -> usize {
        self.outcomes.len() - self.produced_count()
    }
}

#[derive(Debug)]
pub struct LayerFailure {
    pub z: u32,
    pub path: PathBuf,
    pub error: TileExtractorError,
}

#[derive(Debug, Default)]
pub struct ExtractionReport {
    pub layers: Vec<LayerReport>,
    pub failures: Vec<LayerFailure>,
}

impl ExtractionReport {
    pub fn produced_count(&self) -> usize {
        self.layers.iter().map(LayerReport::produced_count).sum()
    }

    pub fn skipped_count(&self) -> usize {
        self.layers.iter().map(LayerReport::skipped_count).sum()
    }
}

/// Pixel data of one depth layer: the stored tiles plus the declared size of
/// the full layer they belong to.
#[derive(Debug, Clone)]
pub struct LayerImage {
    /// (tile, row, column, sample)
    tiles: Array4<u8>,
    declared_width: u32,
    declared_height: u32,
}

impl LayerImage {
    pub fn new(
        tiles: Array4<u8>,
        declared_width: u32,
        declared_height: u32,
    ) -> Result<Self, TileExtractorError> {
        let samples = tiles.dim().3;
        if samples != 1 && samples != 3 {
            return Err(TileExtractorError::UnsupportedSamples(samples));
        }
        Ok(Self {
            tiles,
            declared_width,
            declared_height,
        })
    }

    /// Grayscale tiles shaped (tile, row, column)
    pub fn from_gray_tiles(
        tiles: Array3<u8>,
        declared_width: u32,
        declared_height: u32,
    ) -> Result<Self, TileExtractorError> {
        Self::new(tiles.insert_axis(Axis(3)), declared_width, declared_height)
    }

    /// Read and decode a layer from a DICOM file
    pub fn open(path: impl AsRef<Path>) -> Result<Self, TileExtractorError> {
        let path = path.as_ref();
        let dicom_object = open_file(path).map_err(|e| source_failure(path, e))?;
        Self::from_dicom_object(&dicom_object, path)
    }

    /// Decode every frame of `dicom_object` as a tile.
    ///
    /// Samples are taken as stored, no modality or VOI transformation is
    /// applied. Without Total Pixel Matrix attributes the layer is a single tile.
    pub fn from_dicom_object(
        dicom_object: &FileDicomObject<InMemDicomObject>,
        path: &Path,
    ) -> Result<Self, TileExtractorError> {
        let pixel_data = dicom_object
            .decode_pixel_data()
            .map_err(|e| source_failure(path, e))?;
        let options = ConvertOptions::new()
            .with_modality_lut(ModalityLutOption::None)
            .with_voi_lut(VoiLutOption::Identity);
        let tiles = pixel_data
            .to_ndarray_with_options::<u8>(&options)
            .map_err(|e| source_failure(path, e))?;

        let (_, rows, columns, _) = tiles.dim();
        let declared_width = Self::read_u32(dicom_object, tags::TOTAL_PIXEL_MATRIX_COLUMNS)
            .unwrap_or(columns as u32);
        let declared_height =
            Self::read_u32(dicom_object, tags::TOTAL_PIXEL_MATRIX_ROWS).unwrap_or(rows as u32);

        Self::new(tiles, declared_width, declared_height)
    }

    fn read_u32(
        dicom_object: &FileDicomObject<InMemDicomObject>,
        tag: dicom::core::Tag,
    ) -> Option<u32> {
        dicom_object.element(tag).ok()?.to_int::<u32>().ok()
    }

    pub fn tile_count(&self) -> usize {
        self.tiles.dim().0
    }

    pub fn tile_width(&self) -> u32 {
        self.tiles.dim().2 as u32
    }

    pub fn tile_height(&self) -> u32 {
        self.tiles.dim().1 as u32
    }

    pub fn grid(&self) -> Result<TileGrid, GridError> {
        TileGrid::new(
            self.declared_width,
            self.declared_height,
            self.tile_width(),
            self.tile_height(),
        )
    }

    /// PNG encoding of stored tile `index`, `None` past the last stored tile
    pub fn encode_tile(&self, index: usize) -> Option<Result<Vec<u8>, image::ImageError>> {
        if index >= self.tile_count() {
            return None;
        }
        let tile = self.tiles.slice(s![index, .., .., ..]);
        let (height, width, samples) = tile.dim();
        let pixels: Vec<u8> = tile.iter().copied().collect();

        Some(match samples {
            1 => encode_gray_png(width as u32, height as u32, pixels),
            _ => encode_rgb_png(width as u32, height as u32, pixels),
        })
    }
}

fn source_failure(path: &Path, error: impl std::fmt::Display) -> TileExtractorError {
    TileExtractorError::SourceReadFailure {
        path: path.to_path_buf(),
        reason: error.to_string(),
    }
}

/// Splits DICOM layers into PNG tiles stored as `<root>/<z>/<y>_<x>.png`.
pub struct TileExtractor {
    output_root: PathBuf,
}

impl TileExtractor {
    pub fn new(output_root: impl Into<PathBuf>) -> Self {
        Self {
            output_root: output_root.into(),
        }
    }

    pub fn tile_path(&self, address: TileAddress) -> PathBuf {
        address.path_under(&self.output_root)
    }

    /// Extract every layer of `layers`.
    ///
    /// Layers are independent and processed in parallel. A layer that cannot
    /// be read is recorded in [`ExtractionReport::failures`] and does not
    /// affect the others.
    pub fn extract(&self, layers: &LayerMap) -> ExtractionReport {
        let t0 = Instant::now();
        let jobs: Vec<(u32, PathBuf)> = layers
            .iter()
            .map(|(z, path)| (z, path.to_path_buf()))
            .collect();

        let results: Vec<_> = jobs
            .into_par_iter()
            .map(|(z, path)| {
                let result = self.extract_layer_file(z, &path);
                (z, path, result)
            })
            .collect();

        let mut report = ExtractionReport::default();
        for (z, path, result) in results {
            match result {
                Ok(layer) => report.layers.push(layer),
                Err(error) => {
                    error!("layer z={z} ({}) abandoned: {error}", path.display());
                    report.failures.push(LayerFailure { z, path, error });
                }
            }
        }
        report.layers.sort_by_key(|layer| layer.z);
        report.failures.sort_by_key(|failure| failure.z);

        info!(
            "extracted {} tiles ({} skipped) from {} layers, {} failed, in {:?}",
            report.produced_count(),
            report.skipped_count(),
            report.layers.len(),
            report.failures.len(),
            t0.elapsed()
        );
        report
    }

    pub fn extract_layer_file(&self, z: u32, path: &Path) -> Result<LayerReport, TileExtractorError> {
        info!("processing z={z} from {}", path.display());
        let layer = LayerImage::open(path)?;
        self.extract_layer(z, &layer)
    }

    /// Write every tile of the layer's declared grid that the layer actually stores
    pub fn extract_layer(&self, z: u32, layer: &LayerImage) -> Result<LayerReport, TileExtractorError> {
        let grid = layer.grid()?;
        let layer_dir = self.output_root.join(z.to_string());
        fs::create_dir_all(&layer_dir)?;

        let available = layer.tile_count();
        let mut outcomes = Vec::with_capacity(grid.tile_count());
        for (y, x) in grid.positions() {
            let address = TileAddress::new(z, y, x);
            let flat_index = grid.flat_index(y, x);
            match layer.encode_tile(flat_index) {
                Some(png) => {
                    let path = self.tile_path(address);
                    fs::write(&path, png?)?;
                    debug!("created {path:?}");
                    outcomes.push(TileOutcome::Produced(address));
                }
                None => {
                    warn!("source gap at x={x} y={y} z={z}: index {flat_index} of {available} tiles, skipping");
                    outcomes.push(TileOutcome::Skipped {
                        address,
                        reason: SkipReason::SourceGap {
                            flat_index,
                            available,
                        },
                    });
                }
            }
        }

        Ok(LayerReport { z, grid, outcomes })
    }
}
