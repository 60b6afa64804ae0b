//! gmad (BDSIM) text rendering.

use std::fmt::Write;

use super::{fmt_num, BuiltElement, Machine, MachineWriter};
use crate::domain::DistrType;

pub struct GmadWriter;

impl MachineWriter for GmadWriter {
    fn extension(&self) -> &'static str {
        "gmad"
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
            .map(BuiltElement::name)
            .collect();
        let _ = writeln!(out, "\nlattice: line = ({});", line_names.join(", "));
        out.push_str("use, period=lattice;\n");

        if machine.sampler_all {
            out.push_str("\nsample, all;\n");
        }

        if let Some(beam) = &machine.beam {
            out.push('\n');
            let _ = writeln!(out, "beam, particle=\"{}\",", beam.particle);
            let _ = writeln!(out, "      energy={}*GeV,", fmt_num(beam.energy_gev));
            let _ = write!(out, "      distrType=\"{}\"", beam.distr_type.as_str());
            let mut field = |name: &str, value: f64, unit: &str| {
                let _ = write!(out, ",\n      {name}={}{unit}", fmt_num(value));
            };
            match beam.distr_type {
                DistrType::Gauss => {
                    field("sigmaX", beam.sigma_x, "*m");
                    field("sigmaY", beam.sigma_y, "*m");
                    field("sigmaXp", beam.sigma_xp, "");
                    field("sigmaYp", beam.sigma_yp, "");
                }
                DistrType::GaussTwiss => {
                    field("betx", beam.betx, "*m");
                    field("bety", beam.bety, "*m");
                    field("alfx", beam.alfx, "");
                    field("alfy", beam.alfy, "");
                    field("emitx", beam.emitx, "*m");
                    field("emity", beam.emity, "*m");
                }
            }
            field("sigmaE", beam.sigma_e, "");
            field("sigmaT", beam.sigma_t, "");
            if beam.x0 != 0.0 {
                field("X0", beam.x0, "*m");
            }
            if beam.y0 != 0.0 {
                field("Y0", beam.y0, "*m");
            }
            if beam.z0 != 0.0 {
                field("Z0", beam.z0, "*m");
            }
            out.push_str(";\n");
        }

        if let Some(options) = &machine.options {
            out.push('\n');
            out.push_str("option, ");
            let _ = writeln!(out, "physicsList=\"{}\",", options.physics_list);
            let _ = writeln!(
                out,
                "        beampipeRadius={}*cm,",
                fmt_num(options.beampipe_radius)
            );
            let _ = writeln!(
                out,
                "        outerDiameter={}*m,",
                fmt_num(options.outer_diameter)
            );
            let _ = writeln!(
                out,
                "        tunnelRadius={}*m,",
                fmt_num(options.tunnel_radius)
            );
            let _ = writeln!(
                out,
                "        beampipeThickness={}*mm,",
                fmt_num(options.beampipe_thickness)
            );
            let _ = writeln!(
                out,
                "        samplerDiameter={}*m;",
                fmt_num(options.sampler_diameter)
            );
        }
        out
    }
}

fn element_line(element: &BuiltElement) -> String {
    match element {
        BuiltElement::Drift { name, length } => {
            format!("{name}: drift, l={}*m;", fmt_num(*length))
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
                "{name}: sbend, l={}*m, angle={}",
                fmt_num(*length),
                fmt_num(*angle)
            );
            if let Some(e1) = e1 {
                line.push_str(&format!(", e1={}", fmt_num(*e1)));
            }
            if let Some(e2) = e2 {
                line.push_str(&format!(", e2={}", fmt_num(*e2)));
            }
            if let Some(fint) = fint {
                line.push_str(&format!(", fint={}", fmt_num(*fint)));
            }
            if let Some(fintx) = fintx {
                line.push_str(&format!(", fintx={}", fmt_num(*fintx)));
            }
            line.push(';');
            line
        }
        BuiltElement::Quadrupole { name, length, k1 } => {
            format!("{name}: quadrupole, l={}*m, k1={};", fmt_num(*length), fmt_num(*k1))
        }
        BuiltElement::Sextupole { name, length, k2 } => {
            format!("{name}: sextupole, l={}*m, k2={};", fmt_num(*length), fmt_num(*k2))
        }
        BuiltElement::Solenoid { name, length, ks } => {
            format!("{name}: solenoid, l={}*m, ks={};", fmt_num(*length), fmt_num(*ks))
        }
        BuiltElement::RfCavity {
            name,
            length,
            gradient,
        } => format!(
            "{name}: rfcavity, l={}*m, gradient={};",
            fmt_num(*length),
            fmt_num(*gradient)
        ),
        BuiltElement::Transform3D { name, psi } => {
            format!("{name}: transform3d, psi={};", fmt_num(*psi))
        }
        BuiltElement::Collimator {
            name,
            length,
            x_half,
            y_half,
        } => {
            let mut line = format!("{name}: rcol, l={}*m", fmt_num(*length));
            if let Some(x) = x_half {
                line.push_str(&format!(", xsize={}*m", fmt_num(*x)));
            }
            if let Some(y) = y_half {
                line.push_str(&format!(", ysize={}*m", fmt_num(*y)));
            }
            line.push(';');
            line
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::{BeamSpec, BuiltElement, Machine, MachineOptions, MachineWriter};
    use super::GmadWriter;
    use crate::domain::{DistrType, ParticleSpecies};

    fn beam() -> BeamSpec {
        BeamSpec {
            particle: ParticleSpecies::Proton,
            energy_gev: 10.0438,
            distr_type: DistrType::Gauss,
            sigma_x: 0.005,
            sigma_y: 0.005,
            sigma_xp: 0.001,
            sigma_yp: 0.001,
            sigma_e: 0.0005,
            sigma_t: 1.0e-10,
            x0: 0.0,
            y0: 0.0,
            z0: 0.0,
            betx: 0.0,
            bety: 0.0,
            alfx: 0.0,
            alfy: 0.0,
            emitx: 0.0,
            emity: 0.0,
        }
    }

    #[test]
    fn renders_elements_line_beam_and_options() {
        let mut machine = Machine::new();
        machine.push(BuiltElement::Drift {
            name: "DR0".to_string(),
            length: 1.5,
        });
        machine.push(BuiltElement::SBend {
            name: "BM0".to_string(),
            length: 2.0,
            angle: 0.1,
            e1: Some(0.0175),
            e2: None,
            fint: None,
            fintx: None,
        });
        machine.beam = Some(beam());
        machine.options = Some(MachineOptions::default());
        machine.sampler_all = true;

        let text = GmadWriter.render(&machine);
        assert!(text.contains("DR0: drift, l=1.5*m;"));
        assert!(text.contains("BM0: sbend, l=2.0*m, angle=0.1, e1=0.0175;"));
        assert!(text.contains("lattice: line = (DR0, BM0);"));
        assert!(text.contains("use, period=lattice;"));
        assert!(text.contains("sample, all;"));
        assert!(text.contains("beam, particle=\"proton\""));
        assert!(text.contains("sigmaX=0.005*m"));
        assert!(text.contains("physicsList=\"em_standard\""));
        assert!(text.contains("beampipeRadius=10.0*cm"));
    }

    #[test]
    fn gausstwiss_beam_uses_twiss_parameters() {
        let mut machine = Machine::new();
        machine.push(BuiltElement::Drift {
            name: "DR0".to_string(),
            length: 1.0,
        });
        let mut spec = beam();
        spec.distr_type = DistrType::GaussTwiss;
        spec.betx = 5.0;
        spec.alfx = -1.2;
        spec.emitx = 1.0e-6;
        machine.beam = Some(spec);

        let text = GmadWriter.render(&machine);
        assert!(text.contains("distrType=\"gausstwiss\""));
        assert!(text.contains("betx=5.0*m"));
        assert!(text.contains("alfx=-1.2"));
        assert!(!text.contains("sigmaX="));
    }

    #[test]
    fn writes_into_created_directory() {
        let dir = tempfile::tempdir().unwrap();
        let mut machine = Machine::new();
        machine.push(BuiltElement::Drift {
            name: "DR0".to_string(),
            length: 1.0,
        });
        let nested = dir.path().join("gmad");
        let path = GmadWriter.write(&machine, &nested, "lattice").unwrap();
        assert!(path.ends_with("gmad/lattice.gmad"));
        let text = std::fs::read_to_string(path).unwrap();
        assert!(text.contains("DR0: drift"));
    }
}
