use std::any::Any;
use std::collections::HashSet;
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::time::Duration;

use futures::future::join_all;
use log::{debug, info};
use ndarray::Array2;
use rayon::prelude::*;
use web_time::Instant;

use crate::assembler::assemble;
use crate::classifier::classify;
use crate::contour::{StructureSet, extract};
use crate::dataset::{self, TagDataset};
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::enums::Modality;
use crate::error::{ParseError, ReaderError, Result};
use crate::grouper::{OrderedSeries, group_all};
use crate::image_info::{ImageInfoTable, SeriesIndex};
use crate::linker::{RoiInfo, RoiSet, link, project};
use crate::orientation::normalize;
use crate::volume::Volume;

/// Options for a single load.
#[derive(Debug, Clone)]
pub struct ReaderConfig {
    existing_image_info: Option<ImageInfoTable>,
    only_load_roi_names: Option<HashSet<String>>,
    parse_deadline: Option<Duration>,
    extensions: Vec<String>,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            existing_image_info: None,
            only_load_roi_names: None,
            parse_deadline: None,
            extensions: vec!["dcm".to_string()],
        }
    }
}

impl ReaderConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Image info of a previous load, used to link RTSTRUCT files loaded on
    /// their own.
    pub fn with_existing_image_info(mut self, table: ImageInfoTable) -> Self {
        self.existing_image_info = Some(table);
        self
    }

    /// Only ROIs with one of these names are linked. No names means no
    /// filter.
    pub fn with_roi_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: HashSet<String> = names.into_iter().map(Into::into).collect();
        self.only_load_roi_names = (!names.is_empty()).then_some(names);
        self
    }

    /// Upper bound for the parse phase of [`VolumeLoader::load_with_deadline`].
    pub fn with_parse_deadline(mut self, deadline: Duration) -> Self {
        self.parse_deadline = Some(deadline);
        self
    }

    /// File extensions picked up by directory loading, compared without case.
    /// Files without an extension are always picked up.
    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extensions = extensions.into_iter().map(Into::into).collect();
        self
    }

    pub fn existing_image_info(&self) -> Option<&ImageInfoTable> {
        self.existing_image_info.as_ref()
    }

    pub fn only_load_roi_names(&self) -> Option<&HashSet<String>> {
        self.only_load_roi_names.as_ref()
    }

    pub fn parse_deadline(&self) -> Option<Duration> {
        self.parse_deadline
    }

    fn accepts(&self, path: &Path) -> bool {
        match path.extension().and_then(|ext| ext.to_str()) {
            None => true,
            Some(ext) => self
                .extensions
                .iter()
                .any(|accepted| accepted.eq_ignore_ascii_case(ext)),
        }
    }
}

/// Everything produced by one load.
///
/// Volumes, ordered series and ROI entries share the indices of the image
/// info table.
#[derive(Debug, Clone)]
pub struct LoadedStudy {
    image_info: ImageInfoTable,
    volumes: Vec<Volume>,
    ordered_series: Vec<OrderedSeries>,
    /// Caller-supplied table the ROIs were linked against, if any.
    linked_image_info: Option<ImageInfoTable>,
    rois: RoiSet,
    diagnostics: Diagnostics,
}

impl LoadedStudy {
    pub fn image_info(&self) -> &ImageInfoTable {
        &self.image_info
    }

    pub fn volumes(&self) -> &[Volume] {
        &self.volumes
    }

    pub fn volume(&self, index: SeriesIndex) -> Option<&Volume> {
        self.volumes.get(index.0)
    }

    /// ROIs per series of the table they were linked against.
    pub fn roi_contours(&self) -> &RoiSet {
        &self.rois
    }

    /// ROI names and source files per series, `None` where nothing linked.
    pub fn roi_info(&self) -> Vec<Option<RoiInfo>> {
        self.rois
            .iter()
            .map(|(index, _)| self.rois.roi_info(index))
            .collect()
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Datasets of every assembled series in slice order.
    pub fn ordered_series(&self) -> &[OrderedSeries] {
        &self.ordered_series
    }

    /// Contour points in voxel indices. See [`crate::linker::project`].
    pub fn contour_pixel_positions(&self) -> Vec<Option<Vec<Vec<Array2<f64>>>>> {
        let table = self.linked_image_info.as_ref().unwrap_or(&self.image_info);
        project(table, &self.rois)
    }

    pub fn into_parts(self) -> (ImageInfoTable, Vec<Volume>, RoiSet) {
        (self.image_info, self.volumes, self.rois)
    }
}

/// Pipeline state shared by the stages of one load.
struct Context<'a> {
    config: &'a ReaderConfig,
    diagnostics: Diagnostics,
}

impl<'a> Context<'a> {
    fn new(config: &'a ReaderConfig) -> Self {
        Self {
            config,
            diagnostics: Diagnostics::new(),
        }
    }

    /// Keeps the parsed datasets and records the failures.
    fn collect_parsed(
        &mut self,
        results: Vec<std::result::Result<TagDataset, ParseError>>,
    ) -> Result<Vec<TagDataset>> {
        let mut datasets = Vec::with_capacity(results.len());
        for result in results {
            match result {
                Ok(dataset) => datasets.push(dataset),
                Err(err) => self.diagnostics.parse_failure(&err),
            }
        }
        if datasets.is_empty() {
            return Err(ReaderError::NoReadableFiles);
        }
        Ok(datasets)
    }

    fn run(mut self, datasets: Vec<TagDataset>, started: Instant) -> Result<LoadedStudy> {
        let file_count = datasets.len();
        let mut buckets = classify(datasets, &mut self.diagnostics);
        let structure_files = buckets.remove(&Modality::RtStruct).unwrap_or_default();

        let mut image_info = ImageInfoTable::new();
        let mut volumes = Vec::new();
        let mut ordered_series = Vec::new();
        for series in group_all(buckets) {
            match assemble(&series) {
                Ok((volume, info)) => {
                    let (volume, info) = normalize(volume, info, &series, &mut self.diagnostics);
                    debug!(
                        "series {} ({}): {:?} voxels",
                        info.series_instance_uid,
                        info.modality,
                        volume.dim()
                    );
                    image_info.push(info);
                    volumes.push(volume);
                    ordered_series.push(series);
                }
                Err(err) => self.diagnostics.push(Diagnostic::SeriesDropped(err)),
            }
        }

        let structure_sets: Vec<StructureSet> = structure_files
            .iter()
            .filter_map(|dataset| extract(dataset, &mut self.diagnostics))
            .collect();

        let linked_image_info = match self.config.existing_image_info() {
            Some(existing) if !existing.is_empty() => {
                if !image_info.is_empty() {
                    return Err(ReaderError::AmbiguousImageInfoSource);
                }
                Some(existing.clone())
            }
            _ => None,
        };
        let rois = link(
            linked_image_info.as_ref().unwrap_or(&image_info),
            &structure_sets,
            self.config.only_load_roi_names(),
        );

        info!(
            "Loaded {} series and {} structure set(s) from {file_count} files in {:.2?}",
            image_info.len(),
            structure_sets.len(),
            started.elapsed()
        );
        if !self.diagnostics.is_empty() {
            info!("{} file(s) or series skipped, see diagnostics", self.diagnostics.len());
        }

        Ok(LoadedStudy {
            image_info,
            volumes,
            ordered_series,
            linked_image_info,
            rois,
            diagnostics: self.diagnostics,
        })
    }
}

pub struct VolumeLoader;

impl VolumeLoader {
    /// Load every series from a set of DICOM files
    ///
    /// Files are parsed in parallel using rayon. Files that cannot be parsed
    /// or have an unsupported modality are skipped and reported in
    /// [`LoadedStudy::diagnostics`].
    ///
    /// # Arguments
    ///
    /// * `paths` - DICOM files of one or more series and their RTSTRUCTs
    /// * `config` - Load options
    ///
    /// # Errors
    ///
    /// Returns error if no file could be parsed or the image info source is
    /// ambiguous
    pub fn load(paths: &[impl AsRef<Path> + Sync], config: &ReaderConfig) -> Result<LoadedStudy> {
        let started = Instant::now();
        let results = parse_all(paths, |path| dataset::parse(path));

        let mut context = Context::new(config);
        let datasets = context.collect_parsed(results)?;
        context.run(datasets, started)
    }

    /// Load every series from already parsed datasets
    ///
    /// # Errors
    ///
    /// Returns error if `datasets` is empty or the image info source is
    /// ambiguous
    pub fn load_datasets(datasets: Vec<TagDataset>, config: &ReaderConfig) -> Result<LoadedStudy> {
        if datasets.is_empty() {
            return Err(ReaderError::NoReadableFiles);
        }
        Context::new(config).run(datasets, Instant::now())
    }

    /// Load every series from the files of a directory
    ///
    /// Only files with one of the configured extensions, or no extension at
    /// all, are read. Subdirectories are not visited.
    pub fn load_from_directory(path: impl AsRef<Path>, config: &ReaderConfig) -> Result<LoadedStudy> {
        let paths = Self::collect_paths(path, config)?;
        Self::load(&paths, config)
    }

    /// Files of a directory that directory loading would read, sorted by path
    ///
    /// # Errors
    ///
    /// Returns error if the directory cannot be read or has no candidate files
    pub fn collect_paths(path: impl AsRef<Path>, config: &ReaderConfig) -> Result<Vec<PathBuf>> {
        let mut paths: Vec<_> = fs::read_dir(path.as_ref())?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file() && config.accepts(path))
            .collect();

        if paths.is_empty() {
            return Err(ReaderError::NoReadableFiles);
        }
        paths.sort();
        Ok(paths)
    }

    /// Load every series, parsing on tokio's blocking pool
    ///
    /// When [`ReaderConfig::with_parse_deadline`] is set, the parse phase must
    /// finish within it.
    ///
    /// # Errors
    ///
    /// Returns error if parsing exceeds the deadline, or for the same reasons
    /// as [`VolumeLoader::load`]
    pub async fn load_with_deadline(
        paths: Vec<PathBuf>,
        config: &ReaderConfig,
    ) -> Result<LoadedStudy> {
        let started = Instant::now();
        let results =
            parse_on_blocking_pool(paths, |path| dataset::parse(path), config.parse_deadline())
                .await?;

        let mut context = Context::new(config);
        let datasets = context.collect_parsed(results)?;
        context.run(datasets, started)
    }
}

type ParseResult = std::result::Result<TagDataset, ParseError>;

/// Parses every path on the rayon pool. A panic while parsing one file
/// becomes that file's [`ParseError::Panicked`].
fn parse_all<P, F>(paths: &[P], parse: F) -> Vec<ParseResult>
where
    P: AsRef<Path> + Sync,
    F: Fn(&Path) -> ParseResult + Sync,
{
    paths
        .par_iter()
        .map(|path| {
            let path = path.as_ref();
            panic::catch_unwind(AssertUnwindSafe(|| parse(path))).unwrap_or_else(|payload| {
                Err(ParseError::Panicked {
                    path: path.to_path_buf(),
                    reason: panic_reason(payload.as_ref()),
                })
            })
        })
        .collect()
}

/// Parses every path on tokio's blocking pool, keeping each task next to its
/// path so a failed task is reported against its file.
async fn parse_on_blocking_pool<F>(
    paths: Vec<PathBuf>,
    parse: F,
    deadline: Option<Duration>,
) -> Result<Vec<ParseResult>>
where
    F: Fn(&Path) -> ParseResult + Clone + Send + 'static,
{
    let (paths, handles): (Vec<_>, Vec<_>) = paths
        .into_iter()
        .map(|path| {
            let parse = parse.clone();
            let task_path = path.clone();
            (path, tokio::task::spawn_blocking(move || parse(&task_path)))
        })
        .unzip();
    let tasks = join_all(handles);

    let joined = match deadline {
        Some(deadline) => tokio::time::timeout(deadline, tasks)
            .await
            .map_err(|_| ReaderError::ParseDeadlineExceeded(deadline))?,
        None => tasks.await,
    };

    Ok(paths
        .into_iter()
        .zip(joined)
        .map(|(path, joined)| {
            joined.unwrap_or_else(|err| {
                let reason = match err.try_into_panic() {
                    Ok(payload) => panic_reason(payload.as_ref()),
                    Err(err) => err.to_string(),
                };
                Err(ParseError::Panicked { path, reason })
            })
        })
        .collect())
}

fn panic_reason(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
