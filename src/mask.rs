use crate::imaging::encode_gray_png;

use ndarray::{Array2, Array3, ArrayView2, Zip, s};
use rayon::prelude::*;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MaskError {
    #[error(
        "Binary mask is {mask_width}x{mask_height} but the selection is {width}x{height}"
    )]
    InvalidSelectionShape {
        width: u32,
        height: u32,
        mask_width: u32,
        mask_height: u32,
    },

    #[error("Binary mask rows have inconsistent lengths")]
    RaggedMask,

    #[error("Slice index {slice_index} is outside of a scan with {num_slices} slices")]
    SliceOutOfBounds { slice_index: u32, num_slices: usize },

    #[error("Mask volume of {num_slices}x{height}x{width} cells is too large")]
    VolumeTooLarge {
        num_slices: usize,
        height: usize,
        width: usize,
    },

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

/// Dense binary sub-mask of a selection, indexed `[row, column]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryMask {
    data: Array2<bool>,
}

impl BinaryMask {
    pub fn new(data: Array2<bool>) -> Self {
        Self { data }
    }

    pub fn from_rows(rows: Vec<Vec<bool>>) -> Result<Self, MaskError> {
        let height = rows.len();
        let width = rows.first().map_or(0, Vec::len);
        if rows.iter().any(|row| row.len() != width) {
            return Err(MaskError::RaggedMask);
        }
        let cells: Vec<bool> = rows.into_iter().flatten().collect();
        let data = Array2::from_shape_vec((height, width), cells).map_err(|_| MaskError::RaggedMask)?;
        Ok(Self { data })
    }

    pub fn width(&self) -> u32 {
        self.data.ncols() as u32
    }

    pub fn height(&self) -> u32 {
        self.data.nrows() as u32
    }

    pub fn view(&self) -> ArrayView2<'_, bool> {
        self.data.view()
    }
}

/// One labeled region on a single slice: a rectangle, optionally narrowed
/// down by a binary mask of the same size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub x: u32,
    pub y: u32,
    pub slice_index: u32,
    pub width: u32,
    pub height: u32,
    pub binary_mask: Option<BinaryMask>,
}

impl Selection {
    pub fn rectangle(x: u32, y: u32, slice_index: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            slice_index,
            width,
            height,
            binary_mask: None,
        }
    }

    pub fn with_mask(mut self, mask: BinaryMask) -> Self {
        self.binary_mask = Some(mask);
        self
    }

    /// Check that the sub-mask, if any, matches the selection's footprint
    pub fn validate(&self) -> Result<(), MaskError> {
        match &self.binary_mask {
            Some(mask) if mask.width() != self.width || mask.height() != self.height => {
                Err(MaskError::InvalidSelectionShape {
                    width: self.width,
                    height: self.height,
                    mask_width: mask.width(),
                    mask_height: mask.height(),
                })
            }
            _ => Ok(()),
        }
    }
}

/// Shape of a scan's mask volume
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaskGeometry {
    pub num_slices: usize,
    pub height: usize,
    pub width: usize,
}

impl MaskGeometry {
    pub fn new(num_slices: usize, height: usize, width: usize) -> Self {
        Self {
            num_slices,
            height,
            width,
        }
    }

    /// Number of cells, `None` if it does not fit an array
    pub fn cell_count(&self) -> Option<usize> {
        self.num_slices
            .checked_mul(self.height)?
            .checked_mul(self.width)
            .filter(|&cells| cells <= isize::MAX as usize)
    }

    pub fn check_slice(&self, selection: &Selection) -> Result<(), MaskError> {
        if selection.slice_index as usize >= self.num_slices {
            return Err(MaskError::SliceOutOfBounds {
                slice_index: selection.slice_index,
                num_slices: self.num_slices,
            });
        }
        Ok(())
    }
}

/// Occupancy of every `(slice, row, column)` cell of a scan, accumulated from
/// label selections with logical OR.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaskVolume {
    data: Array3<bool>,
}

impl MaskVolume {
    /// Empty volume of `geometry`, refused when the cell count overflows
    pub fn new(geometry: MaskGeometry) -> Result<Self, MaskError> {
        if geometry.cell_count().is_none() {
            return Err(MaskError::VolumeTooLarge {
                num_slices: geometry.num_slices,
                height: geometry.height,
                width: geometry.width,
            });
        }
        Ok(Self {
            data: Array3::from_elem((geometry.num_slices, geometry.height, geometry.width), false),
        })
    }

    /// Synthesize the mask of every selection in `selections`
    ///
    /// # Errors
    ///
    /// Returns error when the volume cannot be allocated, or on the first
    /// selection that has a mismatched sub-mask or lies on a slice outside of
    /// the volume
    pub fn from_selections<'a>(
        geometry: MaskGeometry,
        selections: impl IntoIterator<Item = &'a Selection>,
    ) -> Result<Self, MaskError> {
        let mut volume = Self::new(geometry)?;
        for selection in selections {
            volume.mark(selection)?;
        }
        Ok(volume)
    }

    pub fn geometry(&self) -> MaskGeometry {
        let (num_slices, height, width) = self.data.dim();
        MaskGeometry::new(num_slices, height, width)
    }

    pub fn data(&self) -> &Array3<bool> {
        &self.data
    }

    pub fn occupied_count(&self) -> usize {
        self.data.iter().filter(|&&cell| cell).count()
    }

    /// Mark the cells covered by `selection`.
    ///
    /// The rectangle is clipped to the slice plane. The volume is left
    /// untouched when the selection is rejected.
    pub fn mark(&mut self, selection: &Selection) -> Result<(), MaskError> {
        selection.validate()?;
        let geometry = self.geometry();
        geometry.check_slice(selection)?;

        let y0 = (selection.y as usize).min(geometry.height);
        let x0 = (selection.x as usize).min(geometry.width);
        let y1 = (selection.y as usize + selection.height as usize).min(geometry.height);
        let x1 = (selection.x as usize + selection.width as usize).min(geometry.width);

        let mut region = self
            .data
            .slice_mut(s![selection.slice_index as usize, y0..y1, x0..x1]);
        match &selection.binary_mask {
            None => region.fill(true),
            Some(mask) => {
                let sub_mask = mask.view();
                let sub_mask = sub_mask.slice(s![..y1 - y0, ..x1 - x0]);
                Zip::from(&mut region)
                    .and(&sub_mask)
                    .for_each(|cell, &selected| *cell |= selected);
            }
        }
        Ok(())
    }

    pub fn plane(&self, index: usize) -> Option<ArrayView2<'_, bool>> {
        (index < self.data.dim().0).then(|| self.data.slice(s![index, .., ..]))
    }

    /// Render plane `index` as an 8-bit grayscale PNG, occupied cells at 255
    pub fn render_plane(&self, index: usize) -> Option<Result<Vec<u8>, MaskError>> {
        let plane = self.plane(index)?;
        let (height, width) = plane.dim();
        let pixels: Vec<u8> = plane.iter().map(|&cell| if cell { 255 } else { 0 }).collect();
        Some(encode_gray_png(width as u32, height as u32, pixels).map_err(MaskError::from))
    }

    /// Render planes `[begin, begin + count)`, truncated to the planes that exist
    pub fn render_range(&self, begin: usize, count: usize) -> Result<Vec<(usize, Vec<u8>)>, MaskError> {
        let end = begin.saturating_add(count).min(self.data.dim().0);
        (begin.min(end)..end)
            .into_par_iter()
            .filter_map(|index| {
                self.render_plane(index)
                    .map(|png| png.map(|png| (index, png)))
            })
            .collect()
    }
}
