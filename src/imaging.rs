//! PNG encoding and DICOM slice conversion shared by the extractor, the mask
//! renderer and the background worker.

use std::io::Cursor;

use dicom::object::{DefaultDicomObject, OpenFileOptions, file::ReadPreamble};
use dicom::pixeldata::{ConvertOptions, PixelDecoder, VoiLutOption};
use image::{DynamicImage, GrayImage, ImageFormat, ImageResult, RgbImage};
use ndarray::{ArrayView2, s};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConversionError {
    #[error("DICOM error: {0}")]
    Dicom(#[from] dicom::object::ReadError),

    #[error("Pixel data error: {0}")]
    PixelData(String),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

/// A single DICOM slice converted for the labeling UI
#[derive(Debug, Clone)]
pub struct ConvertedSlice {
    pub png: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

pub fn encode_png(image: DynamicImage) -> ImageResult<Vec<u8>> {
    let mut bytes = Vec::new();
    image.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
    Ok(bytes)
}

/// Encode row-major 8-bit samples as a grayscale PNG
pub fn encode_gray_png(width: u32, height: u32, pixels: Vec<u8>) -> ImageResult<Vec<u8>> {
    let image = GrayImage::from_raw(width, height, pixels).ok_or_else(dimension_mismatch)?;
    encode_png(DynamicImage::ImageLuma8(image))
}

/// Encode row-major interleaved RGB samples as an RGB PNG
pub fn encode_rgb_png(width: u32, height: u32, pixels: Vec<u8>) -> ImageResult<Vec<u8>> {
    let image = RgbImage::from_raw(width, height, pixels).ok_or_else(dimension_mismatch)?;
    encode_png(DynamicImage::ImageRgb8(image))
}

fn dimension_mismatch() -> image::ImageError {
    image::ImageError::Parameter(image::error::ParameterError::from_kind(
        image::error::ParameterErrorKind::DimensionMismatch,
    ))
}

#[inline]
fn normalize_to_u8(value: u16) -> u8 {
    ((value as f32 / 65535.0) * 255.0).clamp(0.0, 255.0) as u8
}

/// Parse an uploaded DICOM file, with or without the 128 byte preamble
pub fn read_dicom_bytes(bytes: &[u8]) -> Result<DefaultDicomObject, ConversionError> {
    let has_preamble = bytes.get(128..132) == Some(b"DICM".as_slice());
    let preamble = if has_preamble {
        ReadPreamble::Always
    } else {
        ReadPreamble::Never
    };

    Ok(OpenFileOptions::new()
        .read_preamble(preamble)
        .from_reader(bytes)?)
}

/// Convert the first frame of a DICOM file to an 8-bit grayscale PNG.
///
/// The VOI LUT described in the object is applied over the full 16-bit range
/// before scaling down to 8 bits.
pub fn dicom_to_png(bytes: &[u8]) -> Result<ConvertedSlice, ConversionError> {
    let object = read_dicom_bytes(bytes)?;
    let pixel_data = object
        .decode_pixel_data()
        .map_err(|e| ConversionError::PixelData(e.to_string()))?;
    let options = ConvertOptions::new().with_voi_lut(VoiLutOption::Default);
    let frames = pixel_data
        .to_ndarray_with_options::<u16>(&options)
        .map_err(|e| ConversionError::PixelData(e.to_string()))?;

    let frame = frames.slice(s![0, .., .., 0]);
    let (height, width) = frame.dim();
    let png = encode_gray_png(width as u32, height as u32, plane_to_u8(&frame))?;

    Ok(ConvertedSlice {
        png,
        width: width as u32,
        height: height as u32,
    })
}

fn plane_to_u8(plane: &ArrayView2<'_, u16>) -> Vec<u8> {
    plane.iter().map(|&v| normalize_to_u8(v)).collect()
}
