use std::ops::Index;
use std::path::PathBuf;

use nalgebra::Matrix4;

use crate::enums::{Modality, PatientPosition};

/// Maps patient coordinates (mm) to voxel indices.
pub type AffineMatrix = Matrix4<f64>;

/// Position of a series in an [`ImageInfoTable`] and its volume list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SeriesIndex(pub usize);

/// Per-series metadata derived from the first slice of the series.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageInfo {
    /// Files in grouper order (ascending slice position).
    pub file_paths: Vec<PathBuf>,
    /// SOP Instance UIDs in grouper order.
    pub sop_instance_uids: Vec<String>,
    pub patient_id: Option<String>,
    pub patient_name: Option<String>,
    pub modality: Modality,
    pub series_description: Option<String>,
    pub series_date: Option<String>,
    pub series_time: Option<String>,
    pub series_instance_uid: String,
    pub series_number: Option<i64>,
    pub acquisition_number: i64,
    pub slice_thickness: f64,
    /// (row, column) spacing in mm.
    pub pixel_spacing: Option<(f64, f64)>,
    pub rows: Option<usize>,
    pub columns: Option<usize>,
    pub patient_position: Option<PatientPosition>,
    pub image_position: Option<[f64; 3]>,
    pub image_orientation: Option<[f64; 6]>,
    pub slices: usize,
    /// (center, half width).
    pub default_window: Option<(i32, i32)>,
    /// (min, max) of the assembled volume.
    pub full_window: Option<(i32, i32)>,
    pub affine: Option<AffineMatrix>,
}

/// Image info for every assembled series. Volumes share its indices.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImageInfoTable {
    rows: Vec<ImageInfo>,
}

impl ImageInfoTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, info: ImageInfo) -> SeriesIndex {
        self.rows.push(info);
        SeriesIndex(self.rows.len() - 1)
    }

    pub fn get(&self, index: SeriesIndex) -> Option<&ImageInfo> {
        self.rows.get(index.0)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (SeriesIndex, &ImageInfo)> {
        self.rows.iter().enumerate().map(|(i, info)| (SeriesIndex(i), info))
    }

    pub fn find_series(&self, series_instance_uid: &str) -> Option<SeriesIndex> {
        self.rows
            .iter()
            .position(|info| info.series_instance_uid == series_instance_uid)
            .map(SeriesIndex)
    }
}

impl Index<SeriesIndex> for ImageInfoTable {
    type Output = ImageInfo;

    fn index(&self, index: SeriesIndex) -> &Self::Output {
        &self.rows[index.0]
    }
}

impl FromIterator<ImageInfo> for ImageInfoTable {
    fn from_iter<T: IntoIterator<Item = ImageInfo>>(iter: T) -> Self {
        Self {
            rows: iter.into_iter().collect(),
        }
    }
}
