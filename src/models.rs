//! Records exchanged with the repository.

use crate::{enums::Orientation, mask::MaskGeometry, mask::Selection};

use serde::Serialize;
use uuid::Uuid;

pub type ScanId = Uuid;
pub type SliceId = Uuid;
pub type LabelId = Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanCategory {
    pub key: String,
    pub name: String,
    pub image_path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Scan {
    pub id: ScanId,
    pub category_key: String,
    pub declared_number_of_slices: u32,
    /// Plane size in pixels, known once the first slice has been converted
    pub width: Option<u32>,
    pub height: Option<u32>,
}

impl Scan {
    pub fn metadata(&self) -> ScanMetadata {
        ScanMetadata {
            scan_id: self.id,
            number_of_slices: self.declared_number_of_slices,
        }
    }

    pub fn mask_geometry(&self) -> Option<MaskGeometry> {
        Some(MaskGeometry::new(
            self.declared_number_of_slices as usize,
            self.height? as usize,
            self.width? as usize,
        ))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SliceStatus {
    New,
    Stored,
    Processed,
    ProcessingFailed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Slice {
    pub id: SliceId,
    pub scan_id: ScanId,
    pub orientation: Orientation,
    /// Position of the slice along its orientation's axis
    pub location: u32,
    pub status: SliceStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Label {
    pub id: LabelId,
    pub scan_id: ScanId,
    pub selections: Vec<Selection>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScanMetadata {
    pub scan_id: ScanId,
    pub number_of_slices: u32,
}
