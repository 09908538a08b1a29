//! Reads ROI names, the referenced series and contour geometry out of an
//! RTSTRUCT dataset.

use std::path::PathBuf;

use dicom_dictionary_std::tags;
use log::debug;
use ndarray::Array2;

use crate::assembler::round_to;
use crate::dataset::{TagDataset, TagMap};
use crate::diagnostics::{Diagnostic, Diagnostics};

/// An ROI needs more contour points than this, summed over its contours, to
/// provide the sentinel image.
const SENTINEL_MIN_POINTS: i64 = 3;

/// What an RTSTRUCT file says about the series it was drawn on.
#[derive(Debug, Clone, PartialEq)]
pub struct ContourRTStructLink {
    pub file_path: PathBuf,
    pub series_instance_uid: String,
    /// An image SOP Instance UID the structure set was contoured on. Used to
    /// confirm the link against a series' SOP list.
    pub sentinel_sop_instance_uid: Option<String>,
    pub roi_names: Vec<String>,
}

/// Contours of one ROI, each an N x 3 array of patient coordinates (mm).
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedRoi {
    pub name: String,
    pub contours: Vec<Array2<f64>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructureSet {
    pub link: ContourRTStructLink,
    pub rois: Vec<ExtractedRoi>,
}

/// Extracts a structure set, or `None` when the file does not name the series
/// it refers to.
pub fn extract(dataset: &TagDataset, diagnostics: &mut Diagnostics) -> Option<StructureSet> {
    let map = dataset.tags();
    let path = dataset.file_path();

    let Some(series_instance_uid) = referenced_series_uid(map) else {
        diagnostics.push(Diagnostic::MalformedStructureSet {
            path: path.to_path_buf(),
            reason: "no referenced SeriesInstanceUID".to_string(),
        });
        return None;
    };

    let names = map.items(tags::STRUCTURE_SET_ROI_SEQUENCE).unwrap_or_default();
    let roi_contours = map.items(tags::ROI_CONTOUR_SEQUENCE).unwrap_or_default();

    let mut rois = Vec::with_capacity(roi_contours.len());
    for (index, item) in roi_contours.iter().enumerate() {
        let Some(name) = roi_name(names, item, index) else {
            diagnostics.push(Diagnostic::MalformedStructureSet {
                path: path.to_path_buf(),
                reason: format!("ROI contour {index} has no matching ROI name"),
            });
            continue;
        };
        let contours = item
            .items(tags::CONTOUR_SEQUENCE)
            .unwrap_or_default()
            .iter()
            .filter_map(|contour| contour_points(contour, &name, dataset, diagnostics))
            .collect();
        rois.push(ExtractedRoi { name, contours });
    }

    let link = ContourRTStructLink {
        file_path: path.to_path_buf(),
        series_instance_uid: series_instance_uid.to_string(),
        sentinel_sop_instance_uid: sentinel(roi_contours),
        roi_names: names
            .iter()
            .filter_map(|item| item.string(tags::ROI_NAME))
            .map(str::to_string)
            .collect(),
    };
    debug!(
        "{}: {} ROI(s) on series {}",
        path.display(),
        rois.len(),
        link.series_instance_uid
    );

    Some(StructureSet { link, rois })
}

fn referenced_series_uid(map: &TagMap) -> Option<&str> {
    map.item(tags::REFERENCED_FRAME_OF_REFERENCE_SEQUENCE, 0)?
        .item(tags::RT_REFERENCED_STUDY_SEQUENCE, 0)?
        .item(tags::RT_REFERENCED_SERIES_SEQUENCE, 0)?
        .string(tags::SERIES_INSTANCE_UID)
        .filter(|uid| !uid.is_empty())
}

/// Matches by ROI number when both sides carry one, otherwise by position.
fn roi_name(names: &[TagMap], contour_item: &TagMap, index: usize) -> Option<String> {
    let by_number = contour_item
        .int(tags::REFERENCED_ROI_NUMBER)
        .and_then(|number| {
            names
                .iter()
                .find(|item| item.int(tags::ROI_NUMBER) == Some(number))
        });
    by_number
        .or_else(|| names.get(index))
        .and_then(|item| item.string(tags::ROI_NAME))
        .map(str::to_string)
}

fn point_count(contour: &TagMap) -> i64 {
    contour
        .int(tags::NUMBER_OF_CONTOUR_POINTS)
        .or_else(|| {
            contour
                .floats(tags::CONTOUR_DATA)
                .map(|data| (data.len() / 3) as i64)
        })
        .unwrap_or(0)
}

/// Contours with a single point are dropped. Coordinates are rounded to
/// micrometres.
fn contour_points(
    contour: &TagMap,
    roi: &str,
    dataset: &TagDataset,
    diagnostics: &mut Diagnostics,
) -> Option<Array2<f64>> {
    if point_count(contour) <= 1 {
        return None;
    }
    let data = contour.floats(tags::CONTOUR_DATA)?;
    if data.len() % 3 != 0 {
        diagnostics.push(Diagnostic::MalformedStructureSet {
            path: dataset.file_path().to_path_buf(),
            reason: format!(
                "ROI {roi}: ContourData has {} values, not a multiple of 3",
                data.len()
            ),
        });
        return None;
    }
    let rounded = data.into_iter().map(|v| round_to(v, 3)).collect::<Vec<_>>();
    Array2::from_shape_vec((rounded.len() / 3, 3), rounded).ok()
}

/// Referenced image of the first contour of the first ROI with more than
/// three points in total.
fn sentinel(roi_contours: &[TagMap]) -> Option<String> {
    roi_contours.iter().find_map(|item| {
        let contours = item.items(tags::CONTOUR_SEQUENCE)?;
        let points: i64 = contours.iter().map(point_count).sum();
        if points <= SENTINEL_MIN_POINTS {
            return None;
        }
        contours
            .first()?
            .item(tags::CONTOUR_IMAGE_SEQUENCE, 0)?
            .string(tags::REFERENCED_SOP_INSTANCE_UID)
            .filter(|uid| !uid.is_empty())
            .map(str::to_string)
    })
}
