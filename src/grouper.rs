use std::cmp::Ordering;
use std::collections::BTreeMap;

use dicom_dictionary_std::tags;

use crate::classifier::ModalityBuckets;
use crate::dataset::TagDataset;
use crate::enums::{Modality, SortAxis};

/// Identity of one physical volume within a modality.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SeriesKey {
    pub series_instance_uid: String,
    pub acquisition_number: i64,
}

impl SeriesKey {
    /// AcquisitionNumber defaults to 1 when absent or empty.
    pub fn of(dataset: &TagDataset) -> Self {
        Self {
            series_instance_uid: dataset.series_instance_uid().unwrap_or_default().to_string(),
            acquisition_number: dataset.tags().int(tags::ACQUISITION_NUMBER).unwrap_or(1),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OrderedSlice {
    /// Position within the series after sorting.
    pub index: usize,
    /// Coordinate the slice was sorted on, if the series was sorted.
    pub sort_coordinate: Option<f64>,
    pub dataset: TagDataset,
}

/// Slices of one series in ascending sort-axis order.
#[derive(Debug, Clone)]
pub struct OrderedSeries {
    pub modality: Modality,
    pub key: SeriesKey,
    pub sort_axis: Option<SortAxis>,
    pub slices: Vec<OrderedSlice>,
}

impl OrderedSeries {
    fn new(
        modality: Modality,
        key: SeriesKey,
        sort_axis: Option<SortAxis>,
        datasets: Vec<(Option<f64>, TagDataset)>,
    ) -> Self {
        let slices = datasets
            .into_iter()
            .enumerate()
            .map(|(index, (sort_coordinate, dataset))| OrderedSlice {
                index,
                sort_coordinate,
                dataset,
            })
            .collect();
        Self {
            modality,
            key,
            sort_axis,
            slices,
        }
    }

    pub fn len(&self) -> usize {
        self.slices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slices.is_empty()
    }

    pub fn first(&self) -> Option<&TagDataset> {
        self.slices.first().map(|s| &s.dataset)
    }

    pub fn datasets(&self) -> impl DoubleEndedIterator<Item = &TagDataset> + ExactSizeIterator {
        self.slices.iter().map(|s| &s.dataset)
    }
}

/// Groups every image bucket into series. RTSTRUCT buckets are ignored.
pub fn group_all(buckets: ModalityBuckets) -> Vec<OrderedSeries> {
    buckets
        .into_iter()
        .filter(|(modality, _)| *modality != Modality::RtStruct)
        .flat_map(|(modality, datasets)| group_modality(modality, datasets))
        .collect()
}

/// Partitions one modality's datasets into series and orders their slices.
pub fn group_modality(modality: Modality, datasets: Vec<TagDataset>) -> Vec<OrderedSeries> {
    if modality.is_single_frame() {
        return datasets
            .into_iter()
            .map(|dataset| {
                let key = SeriesKey::of(&dataset);
                OrderedSeries::new(modality, key, None, vec![(None, dataset)])
            })
            .collect();
    }

    let mut groups: BTreeMap<SeriesKey, Vec<TagDataset>> = BTreeMap::new();
    for dataset in datasets {
        groups.entry(SeriesKey::of(&dataset)).or_default().push(dataset);
    }

    groups
        .into_iter()
        .map(|(key, members)| {
            let (sort_axis, ordered) = sort_slices(members);
            OrderedSeries::new(modality, key, sort_axis, ordered)
        })
        .collect()
}

/// Sorts by ImagePositionPatient along the slice-normal axis when the first
/// member carries both orientation and position; otherwise keeps input order.
fn sort_slices(members: Vec<TagDataset>) -> (Option<SortAxis>, Vec<(Option<f64>, TagDataset)>) {
    let axis = members.first().and_then(|first| {
        let orientation = first.image_orientation()?;
        first.image_position()?;
        Some(SortAxis::from_orientation(&orientation))
    });

    let Some(axis) = axis else {
        return (None, members.into_iter().map(|d| (None, d)).collect());
    };

    let mut keyed: Vec<_> = members
        .into_iter()
        .map(|d| (d.image_position().map(|p| p[axis.index()]), d))
        .collect();
    keyed.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));

    (Some(axis), keyed)
}
