use std::collections::BTreeMap;

use crate::dataset::TagDataset;
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::enums::Modality;

/// Datasets bucketed by modality, in [`Modality`] order.
pub type ModalityBuckets = BTreeMap<Modality, Vec<TagDataset>>;

/// Moves every dataset into the bucket of its modality.
///
/// Datasets without a recognized modality are dropped and recorded.
pub fn classify(datasets: Vec<TagDataset>, diagnostics: &mut Diagnostics) -> ModalityBuckets {
    let mut buckets = ModalityBuckets::new();
    for dataset in datasets {
        match dataset.modality() {
            Some(modality) => buckets.entry(modality).or_default().push(dataset),
            None => diagnostics.push(Diagnostic::UnrecognizedModality {
                path: dataset.file_path().to_path_buf(),
                modality: dataset.modality_code().map(str::to_string),
            }),
        }
    }
    buckets
}
