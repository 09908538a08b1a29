//! # DICOM-series library
//!
//! This crate turns a heterogeneous folder of DICOM files into one volume per
//! image series, plus the RTSTRUCT contours drawn on them.
//!
//! It builds on the dicom-rs ecosystem for parsing and pixel decoding. Files
//! are parsed in parallel using rayon, then:
//!  - bucketed by modality (CT, MR, PT, US, DX, MG, NM, XA, CR, RTSTRUCT)
//!  - grouped into series by SeriesInstanceUID and AcquisitionNumber and
//!    sorted along the slice normal
//!  - stacked into a volume with the modality's rescale and display rules
//!  - rotated to a supine orientation (CT, MR, PT) with a patient-to-voxel
//!    affine
//!  - linked to the ROIs of every structure set that references them
//!
//! Loading is best effort: unreadable files and broken series are skipped and
//! reported through [`Diagnostics`] rather than failing the load.
//!
//! # Examples
//!
//! ## Reading a study folder
//!
//! Load every DICOM file of the study/ directory, keep only the "GTV"
//! contours and print the first series.
//!
//! ```no_run
//! # use dicom_series::{ReaderConfig, VolumeLoader, SeriesIndex};
//! let config = ReaderConfig::new().with_roi_names(["GTV"]);
//! let study = VolumeLoader::load_from_directory("study", &config)
//!     .expect("should have loaded files from directory");
//! let info = &study.image_info()[SeriesIndex(0)];
//! println!(
//!     "{} {}: {:?}",
//!     info.modality,
//!     info.series_instance_uid,
//!     study.volumes()[0].dim()
//! );
//! ```

pub mod assembler;
pub mod classifier;
pub mod contour;
pub mod dataset;
pub mod diagnostics;
pub mod enums;
pub mod error;
pub mod grouper;
pub mod image_info;
pub mod linker;
pub mod orientation;
pub mod volume;
pub mod volume_loader;

#[cfg(test)]
mod test_support;

pub use dataset::{PixelBuffer, TagDataset, TagMap, TagValue, parse};
pub use diagnostics::{Diagnostic, Diagnostics};
pub use enums::{Modality, PatientPosition, SortAxis};
pub use error::{ParseError, ReaderError, Result, SeriesError};
pub use image_info::{AffineMatrix, ImageInfo, ImageInfoTable, SeriesIndex};
pub use linker::{RoiInfo, RoiRecord, RoiSet, SeriesRois};
pub use volume::{Volume, VoxelData};
pub use volume_loader::{LoadedStudy, ReaderConfig, VolumeLoader};
