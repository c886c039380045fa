//! # DICOM-tiles library
//!
//! Backend pieces of a medical image labeling application: DICOM microscope
//! slides are cut into PNG tiles, labels drawn in the UI are turned into 3D
//! masks, and both are served over HTTP.

//!
//! The two pipelines share one model, a scan decomposed into ordered slices
//! along an axis:
//!  - The [`TileExtractor`] reads one DICOM file per depth layer `z`. Each
//!    file stores its layer as an array of tiles while declaring the size of
//!    the full layer, so the layer is a `tiles_y × tiles_x` grid. Every tile
//!    is written as `<root>/<z>/<y>_<x>.png`. Layers are extracted in
//!    parallel using rayon and a broken layer never stops its siblings.
//!  - The [`MaskVolume`] accumulates label selections (rectangles, optionally
//!    refined by a binary sub-mask) into a dense boolean volume and renders
//!    any range of its slices as 8-bit grayscale PNGs.
//!
//!  Around them sit the scan workflow ([`service::ScanService`]), an in-memory
//!  [`repository::Repository`], a background worker converting uploaded
//!  slices, and an axum router exposing everything under `/api/v1`.
//!
//! # Examples
//!
//! ## Tiling a stack of DICOM layers
//!
//! Order all DICOM files of the `dicom/` directory by InstanceNumber and
//! write their tiles below `tiles/`.
//!
//! ```no_run
//! # use dicom_tiles::{LayerMap, SortBy, TileExtractor};
//! let layers = LayerMap::from_directory("dicom", SortBy::InstanceNumber)
//!     .expect("should have found DICOM layers");
//! let report = TileExtractor::new("tiles").extract(&layers);
//! println!("{} tiles written, {} gaps", report.produced_count(), report.skipped_count());
//! ```
//!
//! ## Rendering a label mask
//!
//! ```
//! # use dicom_tiles::{MaskGeometry, MaskVolume, Selection};
//! let selection = Selection::rectangle(0, 0, 4, 5, 5);
//! let mask = MaskVolume::from_selections(MaskGeometry::new(10, 64, 64), [&selection])
//!     .expect("selection fits the scan");
//! let planes = mask.render_range(8, 5).expect("planes should encode");
//! assert_eq!(planes.len(), 2);
//! ```

pub mod api;
pub mod config;
pub mod dispatcher;
pub mod enums;
pub mod error;
pub mod grid;
pub mod imaging;
pub mod layer_map;
pub mod mask;
pub mod models;
pub mod repository;
pub mod resolver;
pub mod service;
pub mod tile_extractor;
pub mod worker;

pub use enums::{Orientation, SortBy};
pub use grid::{TileAddress, TileGrid};
pub use layer_map::LayerMap;
pub use mask::{BinaryMask, MaskGeometry, MaskVolume, Selection};
pub use tile_extractor::{LayerImage, TileExtractor, TileOutcome};
