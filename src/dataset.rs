//! Parsed DICOM files as plain tag maps.
//!
//! A [`TagDataset`] is what every later stage works from: the file path, the
//! recognized modality, a typed copy of the attribute tree and the decoded
//! pixel buffer. Building one is the only place that touches dicom-rs objects,
//! so the rest of the pipeline can be driven from synthetic data.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use dicom::core::{Tag, VR};
use dicom::object::mem::InMemElement;
use dicom::object::{FileDicomObject, InMemDicomObject, open_file};
use dicom::pixeldata::{ConvertOptions, ModalityLutOption, PixelDecoder};
use dicom_dictionary_std::tags;
use ndarray::Array4;

use crate::enums::Modality;
use crate::error::ParseError;

/// Decoded samples shaped (frames, rows, columns, samples per pixel).
pub type PixelBuffer = Array4<f32>;

/// A single attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum TagValue {
    Str(String),
    Int(i64),
    Float(f64),
    Floats(Vec<f64>),
    Sequence(Vec<TagMap>),
}

impl TagValue {
    fn from_floats(values: Vec<f64>) -> Option<Self> {
        match values.len() {
            0 => None,
            1 => Some(TagValue::Float(values[0])),
            _ => Some(TagValue::Floats(values)),
        }
    }

    fn from_ints(values: Vec<i64>) -> Option<Self> {
        match values.len() {
            0 => None,
            1 => Some(TagValue::Int(values[0])),
            _ => Some(TagValue::Floats(values.into_iter().map(|v| v as f64).collect())),
        }
    }
}

impl From<&str> for TagValue {
    fn from(value: &str) -> Self {
        TagValue::Str(value.to_string())
    }
}

impl From<String> for TagValue {
    fn from(value: String) -> Self {
        TagValue::Str(value)
    }
}

impl From<i64> for TagValue {
    fn from(value: i64) -> Self {
        TagValue::Int(value)
    }
}

impl From<f64> for TagValue {
    fn from(value: f64) -> Self {
        TagValue::Float(value)
    }
}

impl From<Vec<f64>> for TagValue {
    fn from(value: Vec<f64>) -> Self {
        TagValue::Floats(value)
    }
}

impl From<Vec<TagMap>> for TagValue {
    fn from(value: Vec<TagMap>) -> Self {
        TagValue::Sequence(value)
    }
}

/// Attribute tree of one dataset or sequence item.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TagMap(BTreeMap<Tag, TagValue>);

impl TagMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, tag: Tag, value: impl Into<TagValue>) -> Self {
        self.0.insert(tag, value.into());
        self
    }

    pub fn insert(&mut self, tag: Tag, value: impl Into<TagValue>) {
        self.0.insert(tag, value.into());
    }

    pub fn contains(&self, tag: Tag) -> bool {
        self.0.contains_key(&tag)
    }

    pub fn get(&self, tag: Tag) -> Option<&TagValue> {
        self.0.get(&tag)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// String value, trimmed at conversion time.
    pub fn string(&self, tag: Tag) -> Option<&str> {
        match self.get(tag)? {
            TagValue::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn int(&self, tag: Tag) -> Option<i64> {
        match self.get(tag)? {
            TagValue::Int(v) => Some(*v),
            TagValue::Float(v) => Some(*v as i64),
            TagValue::Str(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// First numeric value of the attribute.
    pub fn float(&self, tag: Tag) -> Option<f64> {
        match self.get(tag)? {
            TagValue::Float(v) => Some(*v),
            TagValue::Int(v) => Some(*v as f64),
            TagValue::Floats(v) => v.first().copied(),
            TagValue::Str(s) => s.split('\\').next()?.trim().parse().ok(),
            TagValue::Sequence(_) => None,
        }
    }

    pub fn floats(&self, tag: Tag) -> Option<Vec<f64>> {
        match self.get(tag)? {
            TagValue::Floats(v) => Some(v.clone()),
            TagValue::Float(v) => Some(vec![*v]),
            TagValue::Int(v) => Some(vec![*v as f64]),
            TagValue::Str(s) => s
                .split('\\')
                .map(|part| part.trim().parse().ok())
                .collect(),
            TagValue::Sequence(_) => None,
        }
    }

    pub fn items(&self, tag: Tag) -> Option<&[TagMap]> {
        match self.get(tag)? {
            TagValue::Sequence(items) => Some(items.as_slice()),
            _ => None,
        }
    }

    pub fn item(&self, tag: Tag, index: usize) -> Option<&TagMap> {
        self.items(tag)?.get(index)
    }

    /// Copies every non-bulk attribute of a dicom-rs object, recursing into
    /// sequences.
    pub fn from_dicom_object(obj: &InMemDicomObject) -> Self {
        let mut map = TagMap::new();
        for elem in obj {
            let tag = elem.header().tag;
            if tag == tags::PIXEL_DATA {
                continue;
            }
            if let Some(value) = convert_element(elem) {
                map.0.insert(tag, value);
            }
        }
        map
    }
}

fn convert_element(elem: &InMemElement) -> Option<TagValue> {
    if let Some(items) = elem.items() {
        return Some(TagValue::Sequence(
            items.iter().map(TagMap::from_dicom_object).collect(),
        ));
    }

    match elem.vr() {
        VR::DS | VR::FD | VR::FL => elem
            .to_multi_float64()
            .ok()
            .and_then(TagValue::from_floats),
        VR::IS | VR::SS | VR::US | VR::SL | VR::UL | VR::SV | VR::UV => elem
            .to_multi_int::<i64>()
            .ok()
            .and_then(TagValue::from_ints),
        VR::OB | VR::OW | VR::OF | VR::OD | VR::OL | VR::OV | VR::UN | VR::SQ => None,
        _ => elem
            .to_str()
            .ok()
            .map(|s| TagValue::Str(s.trim().to_string())),
    }
}

/// One parsed file. Never mutated after creation.
#[derive(Debug, Clone)]
pub struct TagDataset {
    file_path: PathBuf,
    modality: Option<Modality>,
    tags: TagMap,
    pixels: Option<PixelBuffer>,
}

impl TagDataset {
    /// The modality is read from the Modality attribute of `tags`.
    pub fn new(
        file_path: impl Into<PathBuf>,
        attributes: TagMap,
        pixels: Option<PixelBuffer>,
    ) -> Self {
        let modality = attributes
            .string(tags::MODALITY)
            .and_then(|m| m.parse::<Modality>().ok());
        Self {
            file_path: file_path.into(),
            modality,
            tags: attributes,
            pixels,
        }
    }

    pub fn from_dicom_object(
        file_path: impl Into<PathBuf>,
        obj: &InMemDicomObject,
        pixels: Option<PixelBuffer>,
    ) -> Self {
        Self::new(file_path, TagMap::from_dicom_object(obj), pixels)
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    pub fn modality(&self) -> Option<Modality> {
        self.modality
    }

    /// Raw Modality attribute, for diagnostics on unrecognized files.
    pub fn modality_code(&self) -> Option<&str> {
        self.tags.string(tags::MODALITY)
    }

    pub fn tags(&self) -> &TagMap {
        &self.tags
    }

    pub fn pixels(&self) -> Option<&PixelBuffer> {
        self.pixels.as_ref()
    }

    pub fn series_instance_uid(&self) -> Option<&str> {
        self.tags.string(tags::SERIES_INSTANCE_UID)
    }

    pub fn sop_instance_uid(&self) -> Option<&str> {
        self.tags.string(tags::SOP_INSTANCE_UID)
    }

    pub fn image_position(&self) -> Option<[f64; 3]> {
        let v = self.tags.floats(tags::IMAGE_POSITION_PATIENT)?;
        (v.len() >= 3).then(|| [v[0], v[1], v[2]])
    }

    pub fn image_orientation(&self) -> Option<[f64; 6]> {
        let v = self.tags.floats(tags::IMAGE_ORIENTATION_PATIENT)?;
        (v.len() >= 6).then(|| [v[0], v[1], v[2], v[3], v[4], v[5]])
    }

    /// (rows, columns) of the decoded frames.
    pub fn frame_dim(&self) -> Option<(usize, usize)> {
        self.pixels.as_ref().map(|p| {
            let (_, rows, columns, _) = p.dim();
            (rows, columns)
        })
    }
}

/// Reads one file with dicom-rs and decodes its pixel data, if any.
///
/// Samples are returned as stored: no modality or VOI LUT is applied, since
/// rescaling is done per modality by the assembler.
pub fn parse(path: impl AsRef<Path>) -> Result<TagDataset, ParseError> {
    let path = path.as_ref();
    let obj = open_file(path).map_err(|source| ParseError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let pixels = if obj.element(tags::PIXEL_DATA).is_ok() {
        let decoded = decode_pixels(&obj).map_err(|reason| ParseError::PixelData {
            path: path.to_path_buf(),
            reason,
        })?;
        Some(decoded)
    } else {
        None
    };

    Ok(TagDataset::from_dicom_object(path, &obj, pixels))
}

fn decode_pixels(obj: &FileDicomObject<InMemDicomObject>) -> Result<PixelBuffer, String> {
    let pixel_data = obj.decode_pixel_data().map_err(|e| e.to_string())?;
    let options = ConvertOptions::new().with_modality_lut(ModalityLutOption::None);
    pixel_data
        .to_ndarray_with_options::<f32>(&options)
        .map_err(|e| e.to_string())
}
