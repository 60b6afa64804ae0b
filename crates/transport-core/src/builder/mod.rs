//! Machine assembly and output writing.
//!
//! The conversion pass emits typed elements into a `Machine`, which is a
//! flat, format-agnostic model in SI units. `MachineWriter`
//! implementations render a machine to gmad or MAD-X text; `write`
//! creates the output directory if needed and never clobbers one format
//! with another since each writer owns its extension.

pub mod gmad;
pub mod madx;

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::domain::{DistrType, ParticleSpecies, TransportError, TransportResult};

pub use gmad::GmadWriter;
pub use madx::MadxWriter;

/// One converted element, all quantities in metres, radians and Tesla.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum BuiltElement {
    Drift {
        name: String,
        length: f64,
    },
    SBend {
        name: String,
        length: f64,
        angle: f64,
        e1: Option<f64>,
        e2: Option<f64>,
        fint: Option<f64>,
        fintx: Option<f64>,
    },
    Quadrupole {
        name: String,
        length: f64,
        k1: f64,
    },
    Sextupole {
        name: String,
        length: f64,
        k2: f64,
    },
    Solenoid {
        name: String,
        length: f64,
        ks: f64,
    },
    RfCavity {
        name: String,
        length: f64,
        /// Accelerating gradient in MV/m.
        gradient: f64,
    },
    Transform3D {
        name: String,
        /// Roll about the beam axis in radians.
        psi: f64,
    },
    Collimator {
        name: String,
        length: f64,
        x_half: Option<f64>,
        y_half: Option<f64>,
    },
}

impl BuiltElement {
    pub fn name(&self) -> &str {
        match self {
            Self::Drift { name, .. }
            | Self::SBend { name, .. }
            | Self::Quadrupole { name, .. }
            | Self::Sextupole { name, .. }
            | Self::Solenoid { name, .. }
            | Self::RfCavity { name, .. }
            | Self::Transform3D { name, .. }
            | Self::Collimator { name, .. } => name,
        }
    }
}

/// Beam definition in SI units, ready for either output format.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BeamSpec {
    pub particle: ParticleSpecies,
    /// Total energy in GeV.
    pub energy_gev: f64,
    pub distr_type: DistrType,
    pub sigma_x: f64,
    pub sigma_y: f64,
    pub sigma_xp: f64,
    pub sigma_yp: f64,
    pub sigma_e: f64,
    pub sigma_t: f64,
    pub x0: f64,
    pub y0: f64,
    pub z0: f64,
    pub betx: f64,
    pub bety: f64,
    pub alfx: f64,
    pub alfy: f64,
    pub emitx: f64,
    pub emity: f64,
}

/// BDSIM options written with every gmad machine. Values are fixed by
/// convention rather than derived from the lattice.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MachineOptions {
    pub physics_list: String,
    /// cm
    pub beampipe_radius: f64,
    /// m
    pub outer_diameter: f64,
    /// m
    pub tunnel_radius: f64,
    /// mm
    pub beampipe_thickness: f64,
    /// m
    pub sampler_diameter: f64,
}

impl Default for MachineOptions {
    fn default() -> Self {
        Self {
            physics_list: "em_standard".to_string(),
            beampipe_radius: 10.0,
            outer_diameter: 0.5,
            tunnel_radius: 1.0,
            beampipe_thickness: 5.0,
            sampler_diameter: 2.0,
        }
    }
}

/// A machine under assembly: elements in lattice order plus the beam and
/// options blocks. Splitting on beam redefinition simply starts a new one.
#[derive(Debug, Clone, Default)]
pub struct Machine {
    pub elements: Vec<BuiltElement>,
    pub beam: Option<BeamSpec>,
    pub options: Option<MachineOptions>,
    pub sampler_all: bool,
}

impl Machine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, element: BuiltElement) {
        self.elements.push(element);
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

pub trait MachineWriter {
    fn extension(&self) -> &'static str;

    fn render(&self, machine: &Machine) -> String;

    /// Render to `<dir>/<stem>.<ext>`, creating the directory when absent.
    fn write(&self, machine: &Machine, dir: &Path, stem: &str) -> TransportResult<PathBuf> {
        fs::create_dir_all(dir).map_err(|err| {
            TransportError::io_system(
                "OUTPUT.DIR",
                format!("cannot create {}: {err}", dir.display()),
            )
        })?;
        let path = dir.join(format!("{stem}.{}", self.extension()));
        fs::write(&path, self.render(machine)).map_err(|err| {
            TransportError::io_system(
                "OUTPUT.FILE",
                format!("cannot write {}: {err}", path.display()),
            )
        })?;
        Ok(path)
    }
}

/// Trim trailing zeros from a fixed-precision value so rendered files
/// stay close to hand-written lattices.
pub(crate) fn fmt_num(value: f64) -> String {
    if value == value.trunc() && value.abs() < 1.0e16 {
        return format!("{value:.1}");
    }
    let mut text = format!("{value:.6}");
    while text.ends_with('0') {
        text.pop();
    }
    if text.ends_with('.') {
        text.push('0');
    }
    text
}
