//! MAD-X text rendering.
//!
//! MAD-X has no transform3d equivalent, so roll transforms are emitted as
//! comments to keep the element sequence aligned with the gmad output.

use std::fmt::Write;

use super::{fmt_num, BuiltElement, Machine, MachineWriter};
use crate::domain::{DistrType, ParticleSpecies};

pub struct MadxWriter;

impl MachineWriter for MadxWriter {
    fn extension(&self) -> &'static str {
        "madx"
    }

    fn render(&self, machine: &Machine) -> String {
        let mut out = String::new();
        for element in &machine.elements {
            out.push_str(&element_line(element));
            out.push('\n');
        }

        let line_names: Vec<&str> = machine
            .elements
            .iter()
            .filter(|element| !matches!(element, BuiltElement::Transform3D { .. }))
            .map(BuiltElement::name)
            .collect();
        let _ = writeln!(out, "\nlattice: LINE=({});", line_names.join(", "));
        out.push_str("USE, PERIOD=lattice;\n");

        if let Some(beam) = &machine.beam {
            out.push('\n');
            let particle = match beam.particle {
                ParticleSpecies::Proton => "PROTON",
                ParticleSpecies::Electron => "ELECTRON",
                ParticleSpecies::Positron => "POSITRON",
            };
            let _ = write!(
                out,
                "BEAM, PARTICLE={particle}, ENERGY={}",
                fmt_num(beam.energy_gev)
            );
            if beam.distr_type == DistrType::GaussTwiss {
                let _ = write!(
                    out,
                    ", EX={}, EY={}",
                    fmt_num(beam.emitx),
                    fmt_num(beam.emity)
                );
            }
            let _ = write!(out, ", SIGE={}, SIGT={}", fmt_num(beam.sigma_e), fmt_num(beam.sigma_t));
            out.push_str(";\n");
        }
        out
    }
}

fn element_line(element: &BuiltElement) -> String {
    match element {
        BuiltElement::Drift { name, length } => {
            format!("{name}: DRIFT, L={};", fmt_num(*length))
        }
        BuiltElement::SBend {
            name,
            length,
            angle,
            e1,
            e2,
            fint,
            fintx,
        } => {
            let mut line = format!(
                "{name}: SBEND, L={}, ANGLE={}",
                fmt_num(*length),
                fmt_num(*angle)
            );
            if let Some(e1) = e1 {
                line.push_str(&format!(", E1={}", fmt_num(*e1)));
            }
            if let Some(e2) = e2 {
                line.push_str(&format!(", E2={}", fmt_num(*e2)));
            }
            if let Some(fint) = fint {
                line.push_str(&format!(", FINT={}", fmt_num(*fint)));
            }
            if let Some(fintx) = fintx {
                line.push_str(&format!(", FINTX={}", fmt_num(*fintx)));
            }
            line.push(';');
            line
        }
        BuiltElement::Quadrupole { name, length, k1 } => {
            format!("{name}: QUADRUPOLE, L={}, K1={};", fmt_num(*length), fmt_num(*k1))
        }
        BuiltElement::Sextupole { name, length, k2 } => {
            format!("{name}: SEXTUPOLE, L={}, K2={};", fmt_num(*length), fmt_num(*k2))
        }
        BuiltElement::Solenoid { name, length, ks } => {
            format!("{name}: SOLENOID, L={}, KS={};", fmt_num(*length), fmt_num(*ks))
        }
        BuiltElement::RfCavity {
            name,
            length,
            gradient,
        } => {
            // MAD-X wants total voltage in MV rather than a gradient.
            let volt = gradient * length;
            format!("{name}: RFCAVITY, L={}, VOLT={};", fmt_num(*length), fmt_num(volt))
        }
        BuiltElement::Transform3D { name, psi } => {
            format!("! {name}: roll transform of {} rad has no MAD-X equivalent", fmt_num(*psi))
        }
        BuiltElement::Collimator {
            name,
            length,
            x_half,
            y_half,
        } => {
            let mut line = format!("{name}: RCOLLIMATOR, L={}", fmt_num(*length));
            if let Some(x) = x_half {
                line.push_str(&format!(", XSIZE={}", fmt_num(*x)));
            }
            if let Some(y) = y_half {
                line.push_str(&format!(", YSIZE={}", fmt_num(*y)));
            }
            line.push(';');
            line
        }
    }
}
