//! Stacks ordered slices into a volume and extracts per-series metadata.

use dicom::core::Tag;
use dicom_dictionary_std::tags;
use ndarray::{Array2, Array3, ArrayView3, Axis, s};

use crate::dataset::{PixelBuffer, TagDataset, TagMap};
use crate::enums::{Modality, PatientPosition};
use crate::error::SeriesError;
use crate::grouper::OrderedSeries;
use crate::image_info::ImageInfo;
use crate::volume::Volume;

/// Maximum stored value of a 14-bit detector, used to undo inverse LUTs.
const DX_INVERSE_MAX: i32 = 16383;

const US_DEFAULT_WINDOW: (i32, i32) = (128, 128);

/// Builds the volume and provisional image info of one series.
///
/// Orientation-dependent fields (affine, refined slice thickness) are filled
/// in later by [`crate::orientation::normalize`].
pub fn assemble(series: &OrderedSeries) -> Result<(Volume, ImageInfo), SeriesError> {
    let uid = &series.key.series_instance_uid;
    let first = series.first().ok_or_else(|| SeriesError::Empty(uid.clone()))?;
    let frame_dim = validate_dimensions(series)?;

    let mut window = default_window(series.modality, first.tags());

    let volume = match series.modality {
        Modality::CT
        | Modality::MR
        | Modality::PT
        | Modality::MG
        | Modality::NM
        | Modality::XA
        | Modality::CR => Volume::from_i16(rescaled_stack(series, frame_dim)),
        Modality::DX => {
            let inverse = first.tags().string(tags::PRESENTATION_LUT_SHAPE) == Some("INVERSE");
            if inverse {
                window = window.map(|(center, half)| (DX_INVERSE_MAX - center, half));
            }
            Volume::from_i16(dx_stack(first, frame_dim, inverse))
        }
        Modality::US => Volume::from_u8(ultrasound_stack(first, frame_dim)),
        Modality::RtStruct => return Err(SeriesError::NotImageSeries(uid.clone())),
    };

    let info = ImageInfo {
        file_paths: series.datasets().map(|d| d.file_path().to_path_buf()).collect(),
        sop_instance_uids: series
            .datasets()
            .map(|d| d.sop_instance_uid().unwrap_or_default().to_string())
            .collect(),
        patient_id: owned_string(first.tags(), tags::PATIENT_ID),
        patient_name: owned_string(first.tags(), tags::PATIENT_NAME),
        modality: series.modality,
        series_description: owned_string(first.tags(), tags::SERIES_DESCRIPTION),
        series_date: owned_string(first.tags(), tags::SERIES_DATE),
        series_time: owned_string(first.tags(), tags::SERIES_TIME),
        series_instance_uid: uid.clone(),
        series_number: first.tags().int(tags::SERIES_NUMBER),
        acquisition_number: series.key.acquisition_number,
        slice_thickness: provisional_thickness(series),
        pixel_spacing: pixel_spacing(series.modality, first.tags()),
        rows: tag_usize(first.tags(), tags::ROWS).or(Some(frame_dim.0)),
        columns: tag_usize(first.tags(), tags::COLUMNS).or(Some(frame_dim.1)),
        patient_position: first
            .tags()
            .string(tags::PATIENT_POSITION)
            .filter(|p| !p.is_empty())
            .map(PatientPosition::from),
        image_position: if series.modality.has_planar_position() {
            Some([0.0, 0.0, 0.0])
        } else {
            first.image_position()
        },
        image_orientation: first.image_orientation(),
        slices: volume.dim().0,
        default_window: window,
        full_window: volume.value_range(),
        affine: None,
    };

    Ok((volume, info))
}

/// Every slice must have pixel data with the first slice's rows x columns.
fn validate_dimensions(series: &OrderedSeries) -> Result<(usize, usize), SeriesError> {
    let uid = &series.key.series_instance_uid;
    let mut expected = None;
    for dataset in series.datasets() {
        let found = dataset.frame_dim().ok_or_else(|| SeriesError::MissingPixelData {
            series_instance_uid: uid.clone(),
            file: dataset.file_path().to_path_buf(),
        })?;
        match expected {
            None => expected = Some(found),
            Some(expected) if expected != found => {
                return Err(SeriesError::InconsistentGeometry {
                    series_instance_uid: uid.clone(),
                    file: dataset.file_path().to_path_buf(),
                    expected,
                    found,
                });
            }
            Some(_) => {}
        }
    }
    expected.ok_or_else(|| SeriesError::Empty(uid.clone()))
}

/// First-sample frames of a pixel buffer.
fn frames(pixels: &PixelBuffer) -> impl Iterator<Item = ndarray::ArrayView2<'_, f32>> {
    pixels
        .axis_iter(Axis(0))
        .map(|frame| frame.index_axis_move(Axis(2), 0))
}

fn rescale(value: f32, slope: f64, intercept: f64) -> i16 {
    // `as` truncates toward zero and saturates at the i16 bounds.
    (value as f64 * slope + intercept) as i16
}

/// Slices are stacked in reverse grouper order, so index 0 holds the largest
/// sort-axis position.
fn rescaled_stack(series: &OrderedSeries, frame_dim: (usize, usize)) -> Array3<i16> {
    let images: Vec<Array2<i16>> = series
        .datasets()
        .rev()
        .filter_map(|dataset| {
            let slope = dataset.tags().float(tags::RESCALE_SLOPE).unwrap_or(1.0);
            let intercept = dataset.tags().float(tags::RESCALE_INTERCEPT).unwrap_or(0.0);
            let pixels = dataset.pixels()?;
            Some(
                frames(pixels)
                    .map(move |frame| frame.mapv(|p| rescale(p, slope, intercept)))
                    .collect::<Vec<_>>(),
            )
        })
        .flatten()
        .collect();

    build_volume_array(&images, frame_dim)
}

fn dx_stack(dataset: &TagDataset, frame_dim: (usize, usize), inverse: bool) -> Array3<i16> {
    let images: Vec<Array2<i16>> = dataset
        .pixels()
        .map(|pixels| {
            frames(pixels)
                .map(|frame| {
                    frame.mapv(|p| {
                        let value = p as i16;
                        if inverse {
                            (DX_INVERSE_MAX - value as i32).clamp(i16::MIN as i32, i16::MAX as i32)
                                as i16
                        } else {
                            value
                        }
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    build_volume_array(&images, frame_dim)
}

/// Keeps pixels whose colour channels are all equal (zero standard deviation),
/// which separates greyscale image content from coloured overlays.
fn ultrasound_stack(dataset: &TagDataset, frame_dim: (usize, usize)) -> Array3<u8> {
    let Some(pixels) = dataset.pixels() else {
        return Array3::from_elem((0, frame_dim.0, frame_dim.1), 0);
    };

    let images: Vec<Array2<u8>> = pixels
        .axis_iter(Axis(0))
        .map(ultrasound_frame)
        .collect();

    build_volume_array(&images, frame_dim)
}

fn ultrasound_frame(frame: ArrayView3<'_, f32>) -> Array2<u8> {
    let (rows, columns, _) = frame.dim();
    Array2::from_shape_fn((rows, columns), |(r, c)| {
        let samples = frame.slice(s![r, c, ..]);
        let Some(&first) = samples.iter().next() else {
            return 0;
        };
        if samples.iter().all(|&v| v == first) {
            first as u8
        } else {
            0
        }
    })
}

fn build_volume_array<T: Clone + Default>(
    images: &[Array2<T>],
    (height, width): (usize, usize),
) -> Array3<T> {
    let depth = images.len();
    let mut volume = Array3::<T>::from_elem((depth, height, width), T::default());

    for (i, image) in images.iter().enumerate() {
        volume.slice_mut(s![i, .., ..]).assign(image);
    }

    volume
}

/// Z difference of the first two slices, 1 for single slices.
fn provisional_thickness(series: &OrderedSeries) -> f64 {
    let mut positions = series.datasets().map(TagDataset::image_position);
    match (positions.next(), positions.next()) {
        (Some(Some(first)), Some(Some(second))) => second[2] - first[2],
        _ => 1.0,
    }
}

fn pixel_spacing(modality: Modality, map: &TagMap) -> Option<(f64, f64)> {
    match modality {
        Modality::US => Some(
            map.item(tags::SEQUENCE_OF_ULTRASOUND_REGIONS, 0)
                .and_then(|region| {
                    let dx = region.float(tags::PHYSICAL_DELTA_X)?;
                    let dy = region.float(tags::PHYSICAL_DELTA_Y)?;
                    Some((10.0 * round_to(dx, 4), 10.0 * round_to(dy, 4)))
                })
                .unwrap_or((1.0, 1.0)),
        ),
        Modality::DX | Modality::XA => pair(map, tags::IMAGER_PIXEL_SPACING),
        _ => pair(map, tags::PIXEL_SPACING).or_else(|| {
            map.item(tags::CONTRIBUTING_SOURCES_SEQUENCE, 0)
                .and_then(|source| pair(source, tags::DETECTOR_ELEMENT_SPACING))
        }),
    }
}

fn default_window(modality: Modality, map: &TagMap) -> Option<(i32, i32)> {
    let center = map.float(tags::WINDOW_CENTER);
    let width = map.float(tags::WINDOW_WIDTH);
    match (center, width) {
        (Some(center), Some(width)) => {
            Some((center.trunc() as i32, (width / 2.0).round_ties_even() as i32))
        }
        _ if modality == Modality::US => Some(US_DEFAULT_WINDOW),
        _ => None,
    }
}

/// Rounds half to even at the given number of decimals.
pub(crate) fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round_ties_even() / factor
}

fn pair(map: &TagMap, tag: Tag) -> Option<(f64, f64)> {
    let values = map.floats(tag)?;
    (values.len() >= 2).then(|| (values[0], values[1]))
}

fn owned_string(map: &TagMap, tag: Tag) -> Option<String> {
    map.string(tag).map(str::to_string)
}

fn tag_usize(map: &TagMap, tag: Tag) -> Option<usize> {
    map.int(tag).and_then(|v| usize::try_from(v).ok())
}
