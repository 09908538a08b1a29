//! Patient-position normalization and the patient-to-voxel affine.

use log::debug;
use nalgebra::{Matrix3, Vector3, Vector4};

use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::grouper::OrderedSeries;
use crate::image_info::{AffineMatrix, ImageInfo};
use crate::volume::Volume;

/// Rotates the volume of a CT/MR/PT series into the supine orientation and
/// attaches its affine.
///
/// Series of other modalities, or without a PatientPosition, are returned
/// unchanged.
pub fn normalize(
    volume: Volume,
    mut info: ImageInfo,
    series: &OrderedSeries,
    diagnostics: &mut Diagnostics,
) -> (Volume, ImageInfo) {
    if !info.modality.is_orientable() {
        return (volume, info);
    }
    let Some(position) = info.patient_position.clone() else {
        return (volume, info);
    };

    let turns = position.quarter_turns();
    let volume = if turns == 0 { volume } else { volume.rotated(turns) };
    debug!(
        "series {}: patient position {position}, {turns} quarter turn(s)",
        info.series_instance_uid
    );

    compensate_position(&mut info, turns);

    if series.len() > 1 {
        if let Some(thickness) = slice_thickness(&info, series) {
            info.slice_thickness = thickness;
        }
    }

    match affine(&info) {
        Ok(affine) => info.affine = Some(affine),
        Err(missing) => diagnostics.push(Diagnostic::MissingRequiredGeometry {
            series_instance_uid: info.series_instance_uid.clone(),
            missing,
        }),
    }

    (volume, info)
}

/// Moves ImagePositionPatient to the voxel that became the first one after
/// rotation.
fn compensate_position(info: &mut ImageInfo, turns: usize) {
    let (Some(position), Some((row_spacing, col_spacing)), Some(rows), Some(columns)) =
        (info.image_position.as_mut(), info.pixel_spacing, info.rows, info.columns)
    else {
        return;
    };
    let across_columns = row_spacing * columns.saturating_sub(1) as f64;
    let across_rows = col_spacing * rows.saturating_sub(1) as f64;

    match turns {
        3 => position[0] -= across_columns,
        2 => {
            position[0] -= across_columns;
            position[1] -= across_rows;
        }
        1 => position[1] -= across_rows,
        _ => {}
    }
}

fn direction_cosines(orientation: &[f64; 6]) -> (Vector3<f64>, Vector3<f64>, Vector3<f64>) {
    let row = Vector3::new(orientation[0], orientation[1], orientation[2]);
    let col = Vector3::new(orientation[3], orientation[4], orientation[5]);
    let normal = row.cross(&col);
    (row, col, normal)
}

/// Mean spacing along the slice normal between the first and last slice, in
/// the grouper's order.
fn slice_thickness(info: &ImageInfo, series: &OrderedSeries) -> Option<f64> {
    let orientation = info.image_orientation?;
    let (_, _, normal) = direction_cosines(&orientation);
    let first = Vector3::from(series.datasets().next()?.image_position()?);
    let last = Vector3::from(series.datasets().next_back()?.image_position()?);
    let steps = (series.len() - 1) as f64;
    Some((normal.dot(&last) - normal.dot(&first)) / steps)
}

fn affine(info: &ImageInfo) -> Result<AffineMatrix, &'static str> {
    let orientation = info.image_orientation.ok_or("ImageOrientationPatient")?;
    let offset = info.image_position.ok_or("ImagePositionPatient")?;
    let (row_spacing, col_spacing) = info.pixel_spacing.ok_or("PixelSpacing")?;
    let thickness = info.slice_thickness;
    if thickness == 0.0 || !thickness.is_finite() {
        return Err("SliceThickness");
    }
    if row_spacing == 0.0 || col_spacing == 0.0 {
        return Err("PixelSpacing");
    }

    let (row, col, normal) = direction_cosines(&orientation);
    let linear = Matrix3::from_rows(&[
        (row / row_spacing).transpose(),
        (col / col_spacing).transpose(),
        (normal / thickness).transpose(),
    ]);
    let translation = -(linear * Vector3::from(offset));

    let mut affine = linear.to_homogeneous();
    affine.fixed_view_mut::<3, 1>(0, 3).copy_from(&translation);
    Ok(affine)
}

/// Maps a patient-space point (mm) through an affine to voxel indices.
pub fn to_voxel(affine: &AffineMatrix, point: [f64; 3]) -> [f64; 3] {
    let v = affine * Vector4::new(point[0], point[1], point[2], 1.0);
    [v[0], v[1], v[2]]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::assemble;
    use crate::enums::Modality;
    use crate::grouper::group_modality;
    use crate::test_support::slice;
    use dicom_dictionary_std::tags;
    use ndarray::{Array2, Array3, array};
    use rstest::rstest;

    fn series(
        modality: Modality,
        position: &str,
        orientation: [f64; 6],
        positions: &[[f64; 3]],
        spacing: Option<(f64, f64)>,
        frame: Array2<f32>,
    ) -> OrderedSeries {
        let datasets = positions
            .iter()
            .enumerate()
            .map(|(i, p)| {
                let mut builder = slice(&format!("{i}.dcm"), modality.as_str())
                    .series("S")
                    .sop(&format!("sop{i}"))
                    .tag(tags::PATIENT_POSITION, position)
                    .orientation(orientation)
                    .position(*p)
                    .gray(frame.clone());
                if let Some((row, col)) = spacing {
                    builder = builder.spacing(row, col);
                }
                builder.build()
            })
            .collect();
        let mut grouped = group_modality(modality, datasets);
        grouped.remove(0)
    }

    fn run(series: &OrderedSeries) -> (Volume, ImageInfo, Diagnostics) {
        let (volume, info) = assemble(series).unwrap();
        let mut diagnostics = Diagnostics::new();
        let (volume, info) = normalize(volume, info, series, &mut diagnostics);
        (volume, info, diagnostics)
    }

    const AXIAL: [f64; 6] = [1.0, 0.0, 0.0, 0.0, 1.0, 0.0];

    #[test]
    fn test_hfdr_corner_round_trip() {
        let s = series(
            Modality::CT,
            "HFDR",
            AXIAL,
            &[[10.0, 20.0, 0.0], [10.0, 20.0, 2.5]],
            Some((0.5, 0.5)),
            Array2::zeros((4, 3)),
        );
        let (volume, info, diagnostics) = run(&s);

        assert!(diagnostics.is_empty());
        assert_eq!(volume.dim(), (2, 3, 4));
        assert_eq!(info.image_position, Some([9.0, 20.0, 0.0]));
        assert_eq!(info.rows, Some(4));
        assert_eq!(info.columns, Some(3));

        let affine = info.affine.unwrap();
        let inverse = affine.try_inverse().unwrap();
        let origin = to_voxel(&affine, [9.0, 20.0, 0.0]);
        for v in origin {
            assert!(v.abs() < 1e-4);
        }

        for corner in [[0.0, 0.0], [2.0, 0.0], [0.0, 3.0], [2.0, 3.0]] {
            let patient = to_voxel(&inverse, [corner[0], corner[1], 0.0]);
            let expected = [9.0 + 0.5 * corner[0], 20.0 + 0.5 * corner[1], 0.0];
            for axis in 0..3 {
                assert!((patient[axis] - expected[axis]).abs() < 1e-4);
            }
            let back = to_voxel(&affine, patient);
            assert!((back[0] - corner[0]).abs() < 1e-4);
            assert!((back[1] - corner[1]).abs() < 1e-4);
        }

        let far = to_voxel(&affine, [10.0, 21.5, 2.5]);
        assert!((far[0] - 2.0).abs() < 1e-4);
        assert!((far[1] - 3.0).abs() < 1e-4);
        assert!((far[2] - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_oblique_affine_is_invertible() {
        let (c, s) = (30f64.to_radians().cos(), 30f64.to_radians().sin());
        let orientation = [c, s, 0.0, 0.0, 0.0, -1.0];
        let (_, _, normal) = direction_cosines(&orientation);
        let positions: Vec<[f64; 3]> = (0..4)
            .map(|i| {
                let p = normal * (i as f64 * 1.25);
                [p[0] - 100.0, p[1] + 40.0, p[2] + 7.0]
            })
            .collect();

        let s = series(
            Modality::MR,
            "FFS",
            orientation,
            &positions,
            Some((0.9, 1.1)),
            Array2::zeros((3, 3)),
        );
        let (_, info, _) = run(&s);

        let affine = info.affine.unwrap();
        assert!(affine.determinant().abs() > 1e-9);
        let identity = affine.try_inverse().unwrap() * affine;
        assert!((identity - AffineMatrix::identity()).abs().max() < 1e-6);
        assert!((info.slice_thickness - 1.25).abs() < 1e-9);
    }

    #[test]
    fn test_thickness_recomputed_from_first_and_last() {
        let s = series(
            Modality::CT,
            "HFS",
            AXIAL,
            &[[0.0, 0.0, 20.0], [0.0, 0.0, 0.0], [0.0, 0.0, 10.0]],
            Some((1.0, 1.0)),
            Array2::zeros((2, 2)),
        );
        let (_, info, _) = run(&s);
        assert_eq!(info.slice_thickness, 10.0);
        assert_eq!(info.image_position, Some([0.0, 0.0, 0.0]));
    }

    #[test]
    fn test_prone_rotates_twice_and_shifts_both_axes() {
        let s = series(
            Modality::PT,
            "FFP",
            AXIAL,
            &[[0.0, 0.0, 0.0]],
            Some((2.0, 3.0)),
            array![[1.0, 2.0], [3.0, 4.0]],
        );
        let (volume, info, _) = run(&s);
        assert_eq!(volume.as_i16().unwrap(), &array![[[4_i16, 3], [2, 1]]]);
        assert_eq!(info.image_position, Some([-2.0, -3.0, 0.0]));
        assert_eq!(info.slice_thickness, 1.0);
    }

    #[rstest]
    #[case::hfdl("HFDL", array![[[3_i16, 6], [2, 5], [1, 4]]], [10.0, 19.5, 0.0])]
    #[case::ffdl("FFDL", array![[[3_i16, 6], [2, 5], [1, 4]]], [10.0, 19.5, 0.0])]
    #[case::ffdr("FFDR", array![[[4_i16, 1], [5, 2], [6, 3]]], [9.0, 20.0, 0.0])]
    fn test_decubitus_single_turn_shifts_one_axis(
        #[case] position: &str,
        #[case] expected: Array3<i16>,
        #[case] image_position: [f64; 3],
    ) {
        let s = series(
            Modality::CT,
            position,
            AXIAL,
            &[[10.0, 20.0, 0.0]],
            Some((0.5, 0.5)),
            array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]],
        );
        let (volume, info, diagnostics) = run(&s);

        assert!(diagnostics.is_empty());
        assert_eq!(volume.dim(), (1, 3, 2));
        assert_eq!(volume.as_i16().unwrap(), &expected);
        assert_eq!(info.image_position, Some(image_position));

        let origin = to_voxel(&info.affine.unwrap(), image_position);
        for v in origin {
            assert!(v.abs() < 1e-9);
        }
    }

    #[test]
    fn test_missing_spacing_leaves_no_affine() {
        let s = series(
            Modality::CT,
            "HFS",
            AXIAL,
            &[[0.0, 0.0, 0.0], [0.0, 0.0, 1.0]],
            None,
            Array2::zeros((2, 2)),
        );
        let (_, info, diagnostics) = run(&s);
        assert_eq!(info.affine, None);
        assert_eq!(
            diagnostics.entries(),
            &[Diagnostic::MissingRequiredGeometry {
                series_instance_uid: "S".to_string(),
                missing: "PixelSpacing",
            }]
        );
    }

    #[test]
    fn test_other_modalities_untouched() {
        let s = series(
            Modality::NM,
            "HFP",
            AXIAL,
            &[[5.0, 5.0, 0.0]],
            Some((1.0, 1.0)),
            array![[1.0, 2.0], [3.0, 4.0]],
        );
        let (volume, info, diagnostics) = run(&s);
        assert_eq!(volume.as_i16().unwrap(), &array![[[1_i16, 2], [3, 4]]]);
        assert_eq!(info.affine, None);
        assert!(diagnostics.is_empty());
    }
}
