//! Synthetic datasets for unit tests.

use std::path::PathBuf;

use dicom::core::Tag;
use dicom_dictionary_std::tags;
use ndarray::{Array2, Array3, Axis};

use crate::dataset::{PixelBuffer, TagDataset, TagMap, TagValue};

pub(crate) struct SliceBuilder {
    path: PathBuf,
    map: TagMap,
    pixels: Option<PixelBuffer>,
}

pub(crate) fn slice(path: &str, modality: &str) -> SliceBuilder {
    SliceBuilder {
        path: PathBuf::from(path),
        map: TagMap::new().with(tags::MODALITY, modality),
        pixels: None,
    }
}

impl SliceBuilder {
    pub(crate) fn tag(mut self, tag: Tag, value: impl Into<TagValue>) -> Self {
        self.map.insert(tag, value);
        self
    }

    pub(crate) fn series(self, uid: &str) -> Self {
        self.tag(tags::SERIES_INSTANCE_UID, uid)
    }

    pub(crate) fn sop(self, uid: &str) -> Self {
        self.tag(tags::SOP_INSTANCE_UID, uid)
    }

    pub(crate) fn position(self, position: [f64; 3]) -> Self {
        self.tag(tags::IMAGE_POSITION_PATIENT, position.to_vec())
    }

    pub(crate) fn orientation(self, orientation: [f64; 6]) -> Self {
        self.tag(tags::IMAGE_ORIENTATION_PATIENT, orientation.to_vec())
    }

    pub(crate) fn spacing(self, row: f64, column: f64) -> Self {
        self.tag(tags::PIXEL_SPACING, vec![row, column])
    }

    pub(crate) fn axial_at(self, z: f64) -> Self {
        self.orientation([1.0, 0.0, 0.0, 0.0, 1.0, 0.0])
            .position([0.0, 0.0, z])
    }

    /// Single grayscale frame; also sets Rows/Columns.
    pub(crate) fn gray(mut self, frame: Array2<f32>) -> Self {
        let (rows, columns) = frame.dim();
        self.map.insert(tags::ROWS, rows as i64);
        self.map.insert(tags::COLUMNS, columns as i64);
        self.pixels = Some(frame.insert_axis(Axis(0)).insert_axis(Axis(3)));
        self
    }

    /// Single colour frame shaped (rows, columns, channels).
    pub(crate) fn color(mut self, frame: Array3<f32>) -> Self {
        let (rows, columns, _) = frame.dim();
        self.map.insert(tags::ROWS, rows as i64);
        self.map.insert(tags::COLUMNS, columns as i64);
        self.pixels = Some(frame.insert_axis(Axis(0)));
        self
    }

    pub(crate) fn build(self) -> TagDataset {
        TagDataset::new(self.path, self.map, self.pixels)
    }
}

/// One contour: the referenced image SOP and its flat x/y/z points.
pub(crate) type ContourFixture<'a> = (&'a str, Vec<f64>);

/// RTSTRUCT referencing `series_uid`, with ROI numbers assigned from 1.
pub(crate) fn structure_set(
    path: &str,
    series_uid: &str,
    rois: &[(&str, Vec<ContourFixture<'_>>)],
) -> TagDataset {
    let referenced_series = TagMap::new().with(tags::SERIES_INSTANCE_UID, series_uid);
    let study = TagMap::new().with(tags::RT_REFERENCED_SERIES_SEQUENCE, vec![referenced_series]);
    let frame = TagMap::new().with(tags::RT_REFERENCED_STUDY_SEQUENCE, vec![study]);

    let names = rois
        .iter()
        .enumerate()
        .map(|(i, (name, _))| {
            TagMap::new()
                .with(tags::ROI_NUMBER, i as i64 + 1)
                .with(tags::ROI_NAME, *name)
        })
        .collect::<Vec<_>>();

    let roi_contours = rois
        .iter()
        .enumerate()
        .map(|(i, (_, contours))| {
            let contours = contours
                .iter()
                .map(|(sop, data)| {
                    let image = TagMap::new().with(tags::REFERENCED_SOP_INSTANCE_UID, *sop);
                    TagMap::new()
                        .with(tags::CONTOUR_IMAGE_SEQUENCE, vec![image])
                        .with(tags::NUMBER_OF_CONTOUR_POINTS, (data.len() / 3) as i64)
                        .with(tags::CONTOUR_DATA, data.clone())
                })
                .collect::<Vec<_>>();
            TagMap::new()
                .with(tags::REFERENCED_ROI_NUMBER, i as i64 + 1)
                .with(tags::CONTOUR_SEQUENCE, contours)
        })
        .collect::<Vec<_>>();

    slice(path, "RTSTRUCT")
        .tag(tags::REFERENCED_FRAME_OF_REFERENCE_SEQUENCE, vec![frame])
        .tag(tags::STRUCTURE_SET_ROI_SEQUENCE, names)
        .tag(tags::ROI_CONTOUR_SEQUENCE, roi_contours)
        .build()
}

/// Closed square of four points at height `z`.
pub(crate) fn square(z: f64) -> Vec<f64> {
    vec![
        0.0, 0.0, z, 10.0, 0.0, z, 10.0, 10.0, z, 0.0, 10.0, z,
    ]
}
