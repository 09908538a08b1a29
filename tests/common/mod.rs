#![allow(dead_code)]

use std::path::{Path, PathBuf};

use dicom::core::{DataElement, PrimitiveValue, VR};
use dicom::object::{FileDicomObject, FileMetaTableBuilder, InMemDicomObject};
use dicom_dictionary_std::tags;
use dicom_series::{TagDataset, TagMap};
use ndarray::{Array2, Axis};

pub const CT_IMAGE_STORAGE: &str = "1.2.840.10008.5.1.4.1.1.2";
pub const EXPLICIT_VR_LITTLE_ENDIAN: &str = "1.2.840.10008.1.2.1";

/// Axial HFS CT slice at height `z` filled with `value`.
pub fn ct_slice(series_uid: &str, sop: &str, z: f64, value: f32) -> TagDataset {
    let map = TagMap::new()
        .with(tags::MODALITY, "CT")
        .with(tags::SERIES_INSTANCE_UID, series_uid)
        .with(tags::SOP_INSTANCE_UID, sop)
        .with(tags::PATIENT_POSITION, "HFS")
        .with(tags::IMAGE_ORIENTATION_PATIENT, vec![1.0, 0.0, 0.0, 0.0, 1.0, 0.0])
        .with(tags::IMAGE_POSITION_PATIENT, vec![0.0, 0.0, z])
        .with(tags::PIXEL_SPACING, vec![0.5, 0.5])
        .with(tags::ROWS, 4_i64)
        .with(tags::COLUMNS, 4_i64)
        .with(tags::RESCALE_SLOPE, 1.0)
        .with(tags::RESCALE_INTERCEPT, -1024.0);
    let pixels = Array2::from_elem((4, 4), value)
        .insert_axis(Axis(0))
        .insert_axis(Axis(3));
    TagDataset::new(format!("{sop}.dcm"), map, Some(pixels))
}

/// RTSTRUCT with one ROI of one square contour on `sop` at height `z`.
pub fn structure_set(path: &str, series_uid: &str, roi: &str, sop: &str, z: f64) -> TagDataset {
    let referenced_series = TagMap::new().with(tags::SERIES_INSTANCE_UID, series_uid);
    let study = TagMap::new().with(tags::RT_REFERENCED_SERIES_SEQUENCE, vec![referenced_series]);
    let frame = TagMap::new().with(tags::RT_REFERENCED_STUDY_SEQUENCE, vec![study]);
    let image = TagMap::new().with(tags::REFERENCED_SOP_INSTANCE_UID, sop);
    let contour = TagMap::new()
        .with(tags::CONTOUR_IMAGE_SEQUENCE, vec![image])
        .with(tags::NUMBER_OF_CONTOUR_POINTS, 4_i64)
        .with(
            tags::CONTOUR_DATA,
            vec![0.0, 0.0, z, 1.0, 0.0, z, 1.0, 1.0, z, 0.0, 1.0, z],
        );

    let map = TagMap::new()
        .with(tags::MODALITY, "RTSTRUCT")
        .with(tags::REFERENCED_FRAME_OF_REFERENCE_SEQUENCE, vec![frame])
        .with(
            tags::STRUCTURE_SET_ROI_SEQUENCE,
            vec![
                TagMap::new()
                    .with(tags::ROI_NUMBER, 1_i64)
                    .with(tags::ROI_NAME, roi),
            ],
        )
        .with(
            tags::ROI_CONTOUR_SEQUENCE,
            vec![
                TagMap::new()
                    .with(tags::REFERENCED_ROI_NUMBER, 1_i64)
                    .with(tags::CONTOUR_SEQUENCE, vec![contour]),
            ],
        );
    TagDataset::new(path, map, None)
}

/// Writes an uncompressed 2 x 2 CT slice as a DICOM file.
pub fn write_ct_file(dir: &Path, name: &str, sop: &str, z: f64, raw: u16) -> PathBuf {
    let elements = [
        (tags::SOP_CLASS_UID, VR::UI, PrimitiveValue::from(CT_IMAGE_STORAGE)),
        (tags::SOP_INSTANCE_UID, VR::UI, PrimitiveValue::from(sop)),
        (tags::MODALITY, VR::CS, PrimitiveValue::from("CT")),
        (tags::SERIES_INSTANCE_UID, VR::UI, PrimitiveValue::from("1.2.3.4")),
        (tags::PATIENT_POSITION, VR::CS, PrimitiveValue::from("HFS")),
        (
            tags::IMAGE_POSITION_PATIENT,
            VR::DS,
            PrimitiveValue::from(format!("0\\0\\{z}")),
        ),
        (
            tags::IMAGE_ORIENTATION_PATIENT,
            VR::DS,
            PrimitiveValue::from("1\\0\\0\\0\\1\\0"),
        ),
        (tags::PIXEL_SPACING, VR::DS, PrimitiveValue::from("1\\1")),
        (tags::SAMPLES_PER_PIXEL, VR::US, PrimitiveValue::from(1_u16)),
        (
            tags::PHOTOMETRIC_INTERPRETATION,
            VR::CS,
            PrimitiveValue::from("MONOCHROME2"),
        ),
        (tags::ROWS, VR::US, PrimitiveValue::from(2_u16)),
        (tags::COLUMNS, VR::US, PrimitiveValue::from(2_u16)),
        (tags::BITS_ALLOCATED, VR::US, PrimitiveValue::from(16_u16)),
        (tags::BITS_STORED, VR::US, PrimitiveValue::from(16_u16)),
        (tags::HIGH_BIT, VR::US, PrimitiveValue::from(15_u16)),
        (tags::PIXEL_REPRESENTATION, VR::US, PrimitiveValue::from(0_u16)),
        (tags::RESCALE_SLOPE, VR::DS, PrimitiveValue::from("1")),
        (tags::RESCALE_INTERCEPT, VR::DS, PrimitiveValue::from("-1024")),
        (
            tags::PIXEL_DATA,
            VR::OW,
            PrimitiveValue::from(raw.to_le_bytes().repeat(4)),
        ),
    ];

    let meta = FileMetaTableBuilder::new()
        .transfer_syntax(EXPLICIT_VR_LITTLE_ENDIAN)
        .media_storage_sop_class_uid(CT_IMAGE_STORAGE)
        .media_storage_sop_instance_uid(sop)
        .build()
        .expect("valid file meta");
    let mut obj = FileDicomObject::<InMemDicomObject>::new_empty_with_meta(meta);
    for (tag, vr, value) in elements {
        obj.put(DataElement::new(tag, vr, value));
    }

    let path = dir.join(name);
    obj.write_to_file(&path).expect("should write DICOM file");
    path
}
