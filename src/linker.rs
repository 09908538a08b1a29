//! Attaches structure-set ROIs to the image series they were drawn on.

use std::collections::HashSet;
use std::ops::Index;
use std::path::PathBuf;

use log::{debug, info};
use ndarray::{Array2, Axis};

use crate::contour::StructureSet;
use crate::image_info::{ImageInfoTable, SeriesIndex};
use crate::orientation::to_voxel;

/// One ROI linked to a series.
#[derive(Debug, Clone, PartialEq)]
pub struct RoiRecord {
    pub roi_name: String,
    /// RTSTRUCT file the ROI came from.
    pub source_file: PathBuf,
    /// N x 3 patient coordinates per contour.
    pub contours: Vec<Array2<f64>>,
}

/// ROIs of a single series.
#[derive(Debug, Clone, PartialEq)]
pub enum SeriesRois {
    /// No structure set matched the series, or none of its ROIs survived.
    NoContours,
    Rois(Vec<RoiRecord>),
}

impl SeriesRois {
    pub fn records(&self) -> &[RoiRecord] {
        match self {
            SeriesRois::NoContours => &[],
            SeriesRois::Rois(records) => records,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.records().is_empty()
    }
}

/// Names and source files of the ROIs linked to one series.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoiInfo {
    pub roi_names: Vec<String>,
    pub file_paths: Vec<PathBuf>,
}

/// ROIs for every series of an [`ImageInfoTable`], sharing its indices.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoiSet {
    series: Vec<SeriesRois>,
}

impl RoiSet {
    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    pub fn get(&self, index: SeriesIndex) -> Option<&SeriesRois> {
        self.series.get(index.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (SeriesIndex, &SeriesRois)> {
        self.series
            .iter()
            .enumerate()
            .map(|(i, rois)| (SeriesIndex(i), rois))
    }

    /// `None` for series without linked ROIs.
    pub fn roi_info(&self, index: SeriesIndex) -> Option<RoiInfo> {
        match self.get(index)? {
            SeriesRois::NoContours => None,
            SeriesRois::Rois(records) => Some(RoiInfo {
                roi_names: records.iter().map(|r| r.roi_name.clone()).collect(),
                file_paths: records.iter().map(|r| r.source_file.clone()).collect(),
            }),
        }
    }
}

impl Index<SeriesIndex> for RoiSet {
    type Output = SeriesRois;

    fn index(&self, index: SeriesIndex) -> &Self::Output {
        &self.series[index.0]
    }
}

/// Links every structure set to the series it references.
///
/// A structure set is linked to a series when it names the series UID and its
/// sentinel SOP Instance UID is one of the series' slices. When
/// `only_roi_names` is a non-empty set, other ROIs are skipped; an empty set
/// filters nothing. ROIs without accepted contours are not recorded.
pub fn link(
    table: &ImageInfoTable,
    structure_sets: &[StructureSet],
    only_roi_names: Option<&HashSet<String>>,
) -> RoiSet {
    let only_roi_names = only_roi_names.filter(|names| !names.is_empty());
    let series = table
        .iter()
        .map(|(_, image)| {
            let records: Vec<RoiRecord> = structure_sets
                .iter()
                .filter(|set| {
                    set.link.series_instance_uid == image.series_instance_uid
                        && set.link.sentinel_sop_instance_uid.as_ref().is_some_and(|sop| {
                            image.sop_instance_uids.iter().any(|uid| uid == sop)
                        })
                })
                .flat_map(|set| {
                    set.rois
                        .iter()
                        .filter(|roi| only_roi_names.is_none_or(|names| names.contains(&roi.name)))
                        .filter(|roi| !roi.contours.is_empty())
                        .map(|roi| RoiRecord {
                            roi_name: roi.name.clone(),
                            source_file: set.link.file_path.clone(),
                            contours: roi.contours.clone(),
                        })
                })
                .collect();

            if records.is_empty() {
                SeriesRois::NoContours
            } else {
                debug!(
                    "series {}: linked {} ROI(s)",
                    image.series_instance_uid,
                    records.len()
                );
                SeriesRois::Rois(records)
            }
        })
        .collect::<Vec<_>>();

    let linked = series.iter().filter(|s| !s.is_empty()).count();
    if !structure_sets.is_empty() {
        info!(
            "{} structure set(s) linked to {linked} of {} series",
            structure_sets.len(),
            series.len()
        );
    }

    RoiSet { series }
}

/// Contour points of every linked ROI in voxel coordinates, per series and
/// then per ROI.
///
/// Series without an affine yield `None`.
pub fn project(table: &ImageInfoTable, rois: &RoiSet) -> Vec<Option<Vec<Vec<Array2<f64>>>>> {
    rois.iter()
        .map(|(index, series_rois)| {
            let affine = table.get(index)?.affine.as_ref()?;
            Some(
                series_rois
                    .records()
                    .iter()
                    .map(|record| {
                        record
                            .contours
                            .iter()
                            .map(|contour| {
                                let mut voxels = contour.clone();
                                for mut point in voxels.axis_iter_mut(Axis(0)) {
                                    let mapped = to_voxel(affine, [point[0], point[1], point[2]]);
                                    for (value, mapped) in point.iter_mut().zip(mapped) {
                                        *value = mapped;
                                    }
                                }
                                voxels
                            })
                            .collect()
                    })
                    .collect(),
            )
        })
        .collect()
}
