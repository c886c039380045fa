use serde::{Deserialize, Serialize};

/// Axis along which a scan is sliced for viewing.
///
/// Only `Axial` (Z) slices are produced from uploads; the other two are
/// re-sliced by an external collaborator and stored alongside.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Orientation {
    #[default]
    #[serde(rename = "Z")]
    Axial,
    #[serde(rename = "Y")]
    Coronal,
    #[serde(rename = "X")]
    Sagittal,
}

/// Key used to order DICOM layers when building a depth mapping from a directory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum SortBy {
    ImagePositionPatient,
    TablePosition,
    #[default]
    InstanceNumber,
    /// File name order, headers are not read
    None,
}
