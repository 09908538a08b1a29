use std::path::PathBuf;
use std::process;
use std::time::Duration;

use clap::Parser;
use dicom_series::{LoadedStudy, ReaderConfig, VolumeLoader};
use log::{error, info};

/// Reconstructs the DICOM series of a directory and reports what was found
#[derive(Parser, Debug)]
#[command(name = "dicom-series")]
#[command(version)]
struct Cli {
    /// Directory containing DICOM files
    #[arg(value_name = "DIRECTORY")]
    directory: PathBuf,

    /// Only link ROIs with this name (repeatable)
    #[arg(long = "roi", value_name = "NAME")]
    roi_names: Vec<String>,

    /// Abort if parsing takes longer than this many seconds
    #[arg(long, value_name = "SECONDS")]
    deadline_secs: Option<u64>,

    /// Also report contour extents in voxel coordinates
    #[arg(long)]
    project: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    if !cli.directory.is_dir() {
        eprintln!("Error: {} is not a directory", cli.directory.display());
        process::exit(1);
    }

    let mut config = ReaderConfig::new()
        .with_extensions(["dcm", "dicom"])
        .with_roi_names(cli.roi_names.iter().cloned());
    if let Some(secs) = cli.deadline_secs {
        config = config.with_parse_deadline(Duration::from_secs(secs));
    }

    info!("Processing directory: {}", cli.directory.display());
    let study = match VolumeLoader::collect_paths(&cli.directory, &config) {
        Ok(paths) => VolumeLoader::load_with_deadline(paths, &config).await,
        Err(e) => Err(e),
    };
    let study = match study {
        Ok(study) => study,
        Err(e) => {
            error!("Load failed: {e}");
            eprintln!("Error: {e}");
            process::exit(1);
        }
    };

    print_summary(&study, cli.project);
}

fn setup_logging(verbose: bool) {
    let level = if verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .init();
}

fn print_summary(study: &LoadedStudy, project: bool) {
    let rois = study.roi_info();
    let projected = project.then(|| study.contour_pixel_positions());

    for (index, info) in study.image_info().iter() {
        let (depth, rows, columns) = study
            .volume(index)
            .map(|v| v.dim())
            .unwrap_or_default();
        println!(
            "[{}] {} {} acq {}: {depth}x{rows}x{columns}, thickness {:.3} mm{}",
            index.0,
            info.modality,
            info.series_instance_uid,
            info.acquisition_number,
            info.slice_thickness,
            if info.affine.is_some() { ", affine" } else { "" }
        );

        if let Some(Some(roi)) = rois.get(index.0) {
            for (name, path) in roi.roi_names.iter().zip(&roi.file_paths) {
                println!("    ROI {name} ({})", path.display());
            }
        }

        if let Some(Some(series)) = projected.as_ref().and_then(|p| p.get(index.0)) {
            for (roi, contours) in series.iter().enumerate() {
                let points: usize = contours.iter().map(|c| c.nrows()).sum();
                println!("    ROI #{roi}: {} contour(s), {points} voxel point(s)", contours.len());
            }
        }
    }

    let diagnostics = study.diagnostics();
    if !diagnostics.is_empty() {
        println!("{} diagnostic(s):", diagnostics.len());
        for diagnostic in diagnostics.entries() {
            println!("    {diagnostic}");
        }
    }
}
