use std::fmt;
use std::str::FromStr;

/// Modalities understood by the loader.
///
/// Variant order is the order in which series are emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Modality {
    CT,
    MR,
    PT,
    US,
    DX,
    MG,
    NM,
    XA,
    CR,
    RtStruct,
}

impl Modality {
    pub const ALL: [Modality; 10] = [
        Modality::CT,
        Modality::MR,
        Modality::PT,
        Modality::US,
        Modality::DX,
        Modality::MG,
        Modality::NM,
        Modality::XA,
        Modality::CR,
        Modality::RtStruct,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Modality::CT => "CT",
            Modality::MR => "MR",
            Modality::PT => "PT",
            Modality::US => "US",
            Modality::DX => "DX",
            Modality::MG => "MG",
            Modality::NM => "NM",
            Modality::XA => "XA",
            Modality::CR => "CR",
            Modality::RtStruct => "RTSTRUCT",
        }
    }

    /// Every file is its own series for these modalities.
    pub fn is_single_frame(&self) -> bool {
        matches!(self, Modality::US | Modality::DX)
    }

    /// Modalities whose ImagePositionPatient is meaningless and reported as the origin.
    pub fn has_planar_position(&self) -> bool {
        matches!(
            self,
            Modality::US
                | Modality::CR
                | Modality::DX
                | Modality::MG
                | Modality::NM
                | Modality::XA
        )
    }

    /// Modalities that get orientation correction and an affine.
    pub fn is_orientable(&self) -> bool {
        matches!(self, Modality::CT | Modality::MR | Modality::PT)
    }
}

impl FromStr for Modality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Modality::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| format!("unrecognized modality '{s}'"))
    }
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// DICOM PatientPosition code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatientPosition {
    HFS,
    HFP,
    HFDR,
    HFDL,
    FFS,
    FFP,
    FFDR,
    FFDL,
    Other(String),
}

impl PatientPosition {
    /// Number of 90° counter-clockwise turns that bring a slice to supine.
    pub fn quarter_turns(&self) -> usize {
        match self {
            PatientPosition::HFDR | PatientPosition::FFDR => 3,
            PatientPosition::HFP | PatientPosition::FFP => 2,
            PatientPosition::HFDL | PatientPosition::FFDL => 1,
            PatientPosition::HFS | PatientPosition::FFS | PatientPosition::Other(_) => 0,
        }
    }
}

impl From<&str> for PatientPosition {
    fn from(s: &str) -> Self {
        match s.trim() {
            "HFS" => PatientPosition::HFS,
            "HFP" => PatientPosition::HFP,
            "HFDR" => PatientPosition::HFDR,
            "HFDL" => PatientPosition::HFDL,
            "FFS" => PatientPosition::FFS,
            "FFP" => PatientPosition::FFP,
            "FFDR" => PatientPosition::FFDR,
            "FFDL" => PatientPosition::FFDL,
            other => PatientPosition::Other(other.to_string()),
        }
    }
}

impl fmt::Display for PatientPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = match self {
            PatientPosition::HFS => "HFS",
            PatientPosition::HFP => "HFP",
            PatientPosition::HFDR => "HFDR",
            PatientPosition::HFDL => "HFDL",
            PatientPosition::FFS => "FFS",
            PatientPosition::FFP => "FFP",
            PatientPosition::FFDR => "FFDR",
            PatientPosition::FFDL => "FFDL",
            PatientPosition::Other(code) => code,
        };
        f.write_str(code)
    }
}

/// Patient axis that slices are sorted along.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortAxis {
    X,
    Y,
    Z,
}

impl SortAxis {
    pub fn index(&self) -> usize {
        match self {
            SortAxis::X => 0,
            SortAxis::Y => 1,
            SortAxis::Z => 2,
        }
    }

    /// Picks the axis that varies least across the row and column
    /// directions. Ties fall through to Z.
    pub fn from_orientation(orientation: &[f64; 6]) -> Self {
        let x = orientation[0].abs() + orientation[3].abs();
        let y = orientation[1].abs() + orientation[4].abs();
        let z = orientation[2].abs() + orientation[5].abs();

        if x < y && x < z {
            SortAxis::X
        } else if y < x && y < z {
            SortAxis::Y
        } else {
            SortAxis::Z
        }
    }
}
