//! Shared fixtures: synthetic 8-bit grayscale DICOM files.

#![allow(dead_code)]

use std::path::Path;

use dicom::core::{DataElement, PrimitiveValue, VR};
use dicom::object::{DefaultDicomObject, FileMetaTableBuilder, InMemDicomObject};
use dicom_dictionary_std::{tags, uids};

const SOP_INSTANCE_UID: &str = "2.25.1234567890";

/// Multi-frame grayscale object whose frames are the tiles of a larger layer
pub fn tiled_layer(
    tile_size: u16,
    frames: u32,
    declared: Option<(u32, u32)>,
    fill: impl Fn(u32) -> u8,
) -> DefaultDicomObject {
    let tile_pixels = tile_size as usize * tile_size as usize;
    let pixels: Vec<u8> = (0..frames)
        .flat_map(|frame| std::iter::repeat_n(fill(frame), tile_pixels))
        .collect();

    let mut object = InMemDicomObject::new_empty();
    object.put(DataElement::new(
        tags::SOP_CLASS_UID,
        VR::UI,
        PrimitiveValue::from(uids::VL_WHOLE_SLIDE_MICROSCOPY_IMAGE_STORAGE),
    ));
    object.put(DataElement::new(
        tags::SOP_INSTANCE_UID,
        VR::UI,
        PrimitiveValue::from(SOP_INSTANCE_UID),
    ));
    object.put(DataElement::new(tags::ROWS, VR::US, PrimitiveValue::from(tile_size)));
    object.put(DataElement::new(tags::COLUMNS, VR::US, PrimitiveValue::from(tile_size)));
    object.put(DataElement::new(tags::SAMPLES_PER_PIXEL, VR::US, PrimitiveValue::from(1_u16)));
    object.put(DataElement::new(tags::BITS_ALLOCATED, VR::US, PrimitiveValue::from(8_u16)));
    object.put(DataElement::new(tags::BITS_STORED, VR::US, PrimitiveValue::from(8_u16)));
    object.put(DataElement::new(tags::HIGH_BIT, VR::US, PrimitiveValue::from(7_u16)));
    object.put(DataElement::new(tags::PIXEL_REPRESENTATION, VR::US, PrimitiveValue::from(0_u16)));
    object.put(DataElement::new(
        tags::PHOTOMETRIC_INTERPRETATION,
        VR::CS,
        PrimitiveValue::from("MONOCHROME2"),
    ));
    object.put(DataElement::new(
        tags::NUMBER_OF_FRAMES,
        VR::IS,
        PrimitiveValue::from(frames.to_string()),
    ));
    if let Some((width, height)) = declared {
        object.put(DataElement::new(
            tags::TOTAL_PIXEL_MATRIX_COLUMNS,
            VR::UL,
            PrimitiveValue::from(width),
        ));
        object.put(DataElement::new(
            tags::TOTAL_PIXEL_MATRIX_ROWS,
            VR::UL,
            PrimitiveValue::from(height),
        ));
    }
    object.put(DataElement::new(tags::PIXEL_DATA, VR::OB, PrimitiveValue::from(pixels)));

    object
        .with_meta(
            FileMetaTableBuilder::new()
                .transfer_syntax(uids::EXPLICIT_VR_LITTLE_ENDIAN)
                .media_storage_sop_class_uid(uids::VL_WHOLE_SLIDE_MICROSCOPY_IMAGE_STORAGE)
                .media_storage_sop_instance_uid(SOP_INSTANCE_UID),
        )
        .expect("file meta should be complete")
}

pub fn write_layer(path: &Path, object: &DefaultDicomObject) {
    object.write_to_file(path).expect("should write DICOM file");
}

/// Full DICOM file bytes, preamble included, as a browser would upload them
pub fn dicom_bytes(object: &DefaultDicomObject) -> Vec<u8> {
    let mut bytes = Vec::new();
    object.write_all(&mut bytes).expect("should serialize DICOM file");
    bytes
}

pub fn with_instance_number(mut object: DefaultDicomObject, number: i32) -> DefaultDicomObject {
    object.put(DataElement::new(
        tags::INSTANCE_NUMBER,
        VR::IS,
        PrimitiveValue::from(number.to_string()),
    ));
    object
}
