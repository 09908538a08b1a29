use ndarray::{Array3, ArrayView3, Axis};

/// Voxel storage. US is 8-bit unsigned, every other modality 16-bit signed.
#[derive(Debug, Clone, PartialEq)]
pub enum VoxelData {
    Int16(Array3<i16>),
    UInt8(Array3<u8>),
}

/// A stacked series, indexed (slice, row, column).
#[derive(Debug, Clone, PartialEq)]
pub struct Volume {
    data: VoxelData,
}

impl Volume {
    pub fn new(data: VoxelData) -> Self {
        Self { data }
    }

    pub fn from_i16(data: Array3<i16>) -> Self {
        Self::new(VoxelData::Int16(data))
    }

    pub fn from_u8(data: Array3<u8>) -> Self {
        Self::new(VoxelData::UInt8(data))
    }

    /// Get the dimensions of the volume (depth, height, width)
    pub fn dim(&self) -> (usize, usize, usize) {
        match &self.data {
            VoxelData::Int16(a) => a.dim(),
            VoxelData::UInt8(a) => a.dim(),
        }
    }

    /// Get a reference to the underlying data
    pub fn data(&self) -> &VoxelData {
        &self.data
    }

    pub fn as_i16(&self) -> Option<&Array3<i16>> {
        match &self.data {
            VoxelData::Int16(a) => Some(a),
            VoxelData::UInt8(_) => None,
        }
    }

    pub fn as_u8(&self) -> Option<&Array3<u8>> {
        match &self.data {
            VoxelData::UInt8(a) => Some(a),
            VoxelData::Int16(_) => None,
        }
    }

    /// Smallest and largest voxel value, `None` for an empty volume.
    pub fn value_range(&self) -> Option<(i32, i32)> {
        match &self.data {
            VoxelData::Int16(a) => min_max(a.iter().map(|&v| v as i32)),
            VoxelData::UInt8(a) => min_max(a.iter().map(|&v| v as i32)),
        }
    }

    /// Rotates every slice `k` quarter turns counter-clockwise in the
    /// row/column plane, leaving the slice axis untouched.
    ///
    /// Matches `numpy.rot90(volume, k, axes=(1, 2))`.
    pub fn rotated(&self, k: usize) -> Volume {
        let data = match &self.data {
            VoxelData::Int16(a) => VoxelData::Int16(rot90(a.view(), k)),
            VoxelData::UInt8(a) => VoxelData::UInt8(rot90(a.view(), k)),
        };
        Volume::new(data)
    }
}

fn min_max(values: impl Iterator<Item = i32>) -> Option<(i32, i32)> {
    values.fold(None, |acc, v| match acc {
        None => Some((v, v)),
        Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
    })
}

fn rot90<T: Clone>(mut view: ArrayView3<'_, T>, k: usize) -> Array3<T> {
    match k % 4 {
        1 => {
            view.invert_axis(Axis(2));
            view.swap_axes(1, 2);
        }
        2 => {
            view.invert_axis(Axis(1));
            view.invert_axis(Axis(2));
        }
        3 => {
            view.swap_axes(1, 2);
            view.invert_axis(Axis(2));
        }
        _ => {}
    }
    view.as_standard_layout().into_owned()
}
