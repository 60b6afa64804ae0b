pub mod errors;

pub use errors::{
    ConvertResult, ExitMapping, ParserResult, TransportError, TransportErrorCategory,
    TransportResult,
};

use std::fmt::{Display, Formatter};
use std::path::PathBuf;

use serde::{Serialize, Serializer};

/// TRANSPORT type codes, canonicalized once from the leading numeric field.
///
/// Fit-suffixed codes such as `5.0A` carry a trailing letter; classification
/// takes the longest numeric-parseable prefix and compares integers from then
/// on. Codes with no conversion behaviour are still classified so the
/// registry keeps one record per positive card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeCode {
    Beam,            // 1
    PoleFace,        // 2
    Drift,           // 3
    Dipole,          // 4
    Quadrupole,      // 5
    TransformUpdate, // 6, collimator once redefined by a 16. 14. card
    Centroid,        // 7
    Tolerance,       // 8
    Repeat,          // 9
    FitConstraint,   // 10
    Acceleration,    // 11
    BeamCorrection,  // 12
    PrintControl,    // 13
    MatrixTransform, // 14
    UnitChange,      // 15
    SpecialInput,    // 16
    Sextupole,       // 18
    Solenoid,        // 19
    BendDirection,   // 20
    SpaceCharge,     // 22
    Buncher,         // 23
}

impl TypeCode {
    pub fn from_code_number(code: i32) -> Option<Self> {
        match code {
            1 => Some(Self::Beam),
            2 => Some(Self::PoleFace),
            3 => Some(Self::Drift),
            4 => Some(Self::Dipole),
            5 => Some(Self::Quadrupole),
            6 => Some(Self::TransformUpdate),
            7 => Some(Self::Centroid),
            8 => Some(Self::Tolerance),
            9 => Some(Self::Repeat),
            10 => Some(Self::FitConstraint),
            11 => Some(Self::Acceleration),
            12 => Some(Self::BeamCorrection),
            13 => Some(Self::PrintControl),
            14 => Some(Self::MatrixTransform),
            15 => Some(Self::UnitChange),
            16 => Some(Self::SpecialInput),
            18 => Some(Self::Sextupole),
            19 => Some(Self::Solenoid),
            20 => Some(Self::BendDirection),
            22 => Some(Self::SpaceCharge),
            23 => Some(Self::Buncher),
            _ => None,
        }
    }

    pub const fn code_number(self) -> i32 {
        match self {
            Self::Beam => 1,
            Self::PoleFace => 2,
            Self::Drift => 3,
            Self::Dipole => 4,
            Self::Quadrupole => 5,
            Self::TransformUpdate => 6,
            Self::Centroid => 7,
            Self::Tolerance => 8,
            Self::Repeat => 9,
            Self::FitConstraint => 10,
            Self::Acceleration => 11,
            Self::BeamCorrection => 12,
            Self::PrintControl => 13,
            Self::MatrixTransform => 14,
            Self::UnitChange => 15,
            Self::SpecialInput => 16,
            Self::Sextupole => 18,
            Self::Solenoid => 19,
            Self::BendDirection => 20,
            Self::SpaceCharge => 22,
            Self::Buncher => 23,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Beam => "beam definition",
            Self::PoleFace => "poleface rotation",
            Self::Drift => "drift",
            Self::Dipole => "dipole",
            Self::Quadrupole => "quadrupole",
            Self::TransformUpdate => "transform update or collimator",
            Self::Centroid => "beam centroid shift",
            Self::Tolerance => "alignment tolerance",
            Self::Repeat => "repetition control",
            Self::FitConstraint => "fitting constraint",
            Self::Acceleration => "acceleration element",
            Self::BeamCorrection => "beam rotation",
            Self::PrintControl => "input/output control",
            Self::MatrixTransform => "matrix transformation",
            Self::UnitChange => "unit control",
            Self::SpecialInput => "special input",
            Self::Sextupole => "sextupole",
            Self::Solenoid => "solenoid",
            Self::BendDirection => "coordinate rotation",
            Self::SpaceCharge => "space charge element",
            Self::Buncher => "buncher",
        }
    }
}

impl Display for TypeCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str((*self).as_str())
    }
}

/// Why a raw line was not classified as a lattice card.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Comment,
    FittingRoutine,
    Blank,
    NegativeOrZeroCode,
    Unknown,
}

impl SkipReason {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Comment => "line is a comment",
            Self::FittingRoutine => "line is for the TRANSPORT fitting routine",
            Self::Blank => "line is blank",
            Self::NegativeOrZeroCode => "type code is 0 or negative",
            Self::Unknown => "reason unknown",
        }
    }
}

/// One beam card's numeric payload. Field offsets differ between input decks
/// and output-file lattice echoes, resolved at parse time.
#[derive(Debug, Clone, PartialEq)]
pub struct BeamCard {
    pub momentum: f64,
    pub sigma_x: f64,
    pub sigma_xp: f64,
    pub sigma_y: f64,
    pub sigma_yp: f64,
    pub sigma_t: f64,
    pub sigma_e: f64,
    pub is_addition: bool,
}

/// Tagged per-type payload for a classified lattice card.
#[derive(Debug, Clone, PartialEq)]
pub enum ElementKind {
    Beam(BeamCard),
    PoleFace {
        data: Vec<f64>,
    },
    Drift,
    Dipole {
        data: Vec<f64>,
        e1: f64,
        e2: f64,
    },
    Quadrupole {
        data: Vec<f64>,
    },
    /// Type 6 while the transform-update meaning is in force.
    TransformUpdate,
    /// Type 6 once a `16. 14.` card has redefined it; length is borrowed
    /// from the next drift during record preparation.
    Collimator {
        data: Vec<f64>,
    },
    Acceleration {
        data: Vec<f64>,
    },
    BeamCorrection {
        data: Vec<f64>,
        is_addition: bool,
        previous_code: Option<i32>,
    },
    PrintControl {
        data: Vec<f64>,
    },
    UnitChange {
        mark: f64,
        label: String,
    },
    SpecialInput {
        data: Vec<f64>,
    },
    Sextupole {
        data: Vec<f64>,
    },
    Solenoid {
        data: Vec<f64>,
    },
    BendDirection {
        angle: f64,
    },
    /// Classified but deliberately untranslated (9, 7, 8, 10, 14, 22, 23).
    Ignored {
        code: TypeCode,
    },
}

impl ElementKind {
    pub const fn type_code(&self) -> TypeCode {
        match self {
            Self::Beam(_) => TypeCode::Beam,
            Self::PoleFace { .. } => TypeCode::PoleFace,
            Self::Drift => TypeCode::Drift,
            Self::Dipole { .. } => TypeCode::Dipole,
            Self::Quadrupole { .. } => TypeCode::Quadrupole,
            Self::TransformUpdate | Self::Collimator { .. } => TypeCode::TransformUpdate,
            Self::Acceleration { .. } => TypeCode::Acceleration,
            Self::BeamCorrection { .. } => TypeCode::BeamCorrection,
            Self::PrintControl { .. } => TypeCode::PrintControl,
            Self::UnitChange { .. } => TypeCode::UnitChange,
            Self::SpecialInput { .. } => TypeCode::SpecialInput,
            Self::Sextupole { .. } => TypeCode::Sextupole,
            Self::Solenoid { .. } => TypeCode::Solenoid,
            Self::BendDirection { .. } => TypeCode::BendDirection,
            Self::Ignored { code } => *code,
        }
    }
}

/// One classified card, as held by the element registry.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementRecord {
    pub kind: ElementKind,
    pub name: Option<String>,
    /// Length in the element-length unit active at classification time.
    pub length: f64,
    /// Control cards carry no physical length; the fit matcher skips them.
    pub is_zero_length: bool,
    pub source_line: usize,
}

impl ElementRecord {
    pub fn control(kind: ElementKind, source_line: usize) -> Self {
        Self {
            kind,
            name: None,
            length: 0.0,
            is_zero_length: true,
            source_line,
        }
    }

    pub fn physical(
        kind: ElementKind,
        name: Option<String>,
        length: f64,
        source_line: usize,
    ) -> Self {
        Self {
            kind,
            name,
            length,
            is_zero_length: false,
            source_line,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ParticleSpecies {
    #[default]
    Proton,
    Electron,
    Positron,
}

impl ParticleSpecies {
    /// Rest mass in GeV, the unit TRANSPORT works in by default.
    pub const fn mass_gev(self) -> f64 {
        match self {
            Self::Proton => 0.938_272,
            Self::Electron | Self::Positron => 5.109_989_461e-4,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Proton => "proton",
            Self::Electron => "e-",
            Self::Positron => "e+",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "proton" => Some(Self::Proton),
            "e-" => Some(Self::Electron),
            "e+" => Some(Self::Positron),
            _ => None,
        }
    }
}

impl Display for ParticleSpecies {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str((*self).as_str())
    }
}

impl Serialize for ParticleSpecies {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DistrType {
    #[default]
    Gauss,
    GaussTwiss,
}

impl DistrType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Gauss => "gauss",
            Self::GaussTwiss => "gausstwiss",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "gauss" => Some(Self::Gauss),
            "gausstwiss" => Some(Self::GaussTwiss),
            _ => None,
        }
    }
}

impl Serialize for DistrType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Whether the loaded file is an input deck or a TRANSPORT standard output
/// file; several field offsets and the fit pass depend on this.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Input,
    Output,
}

/// Everything a conversion run is configured with; the CLI maps its flags
/// onto this one value, library users construct it directly.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionConfig {
    pub particle: ParticleSpecies,
    pub distr_type: DistrType,
    pub gmad: bool,
    pub gmad_dir: PathBuf,
    pub madx: bool,
    pub madx_dir: PathBuf,
    pub dont_split: bool,
    pub keep_name: bool,
    pub combine_drifts: bool,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            particle: ParticleSpecies::Proton,
            distr_type: DistrType::Gauss,
            gmad: true,
            gmad_dir: PathBuf::from("gmad"),
            madx: false,
            madx_dir: PathBuf::from("madx"),
            dont_split: false,
            keep_name: false,
            combine_drifts: false,
        }
    }
}
