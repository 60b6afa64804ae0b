//! The conversion pass: walk the element registry in lattice order,
//! tracking beam kinematics and machine state, and emit typed builder
//! elements plus the final output files.
//!
//! State that cards mutate mid-lattice lives in `ConversionContext`: the
//! unit table, the beam, the dipole definition mode (field vs angle), the
//! bending direction, the RF sequence accumulator and the per-kind
//! element counters used for generated names.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::beam::BeamState;
use crate::builder::{
    BeamSpec, BuiltElement, GmadWriter, Machine, MachineOptions, MachineWriter, MadxWriter,
};
use crate::common::constants::{C_LIGHT, DEG2RAD, EV_PER_GEV, GAUSS2TESLA};
use crate::common::units::{label_scale, UnitQuantity, UnitTable};
use crate::domain::{
    BeamCard, ConversionConfig, DistrType, ElementKind, ElementRecord, FileKind, TransportError,
    TransportResult, TypeCode,
};
use crate::fitting;
use crate::lattice;
use crate::reader;
use crate::registry::Registry;

fn round4(value: f64) -> f64 {
    (value * 1.0e4).round() / 1.0e4
}

/// Per-kind counters for generated element names.
#[derive(Debug, Clone, Copy, Default)]
struct Counters {
    drifts: usize,
    dipoles: usize,
    quads: usize,
    sextus: usize,
    solenoids: usize,
    rf: usize,
    transforms: usize,
    collimators: usize,
}

/// Machine-wide properties mutated by control cards.
#[derive(Debug, Clone)]
struct MachineProps {
    /// true: dipole card carries a field; false: it carries an angle in deg.
    benddef: bool,
    /// +1 bends right for positive particles, -1 left.
    bending: f64,
    fringe_integral: f64,
    /// In the active pipe_rad unit; None until a `16. 5.` card sets it.
    beampipe_radius: Option<f64>,
    total_acc_voltage: f64,
    e_gain_prev: f64,
}

impl Default for MachineProps {
    fn default() -> Self {
        Self {
            benddef: true,
            bending: 1.0,
            fringe_integral: 0.0,
            beampipe_radius: None,
            total_acc_voltage: 0.0,
            e_gain_prev: 0.0,
        }
    }
}

pub struct ConversionContext {
    config: ConversionConfig,
    units: UnitTable,
    beam: BeamState,
    props: MachineProps,
    counters: Counters,
    machine: Machine,
    parts: Vec<Machine>,
    beam_defined: bool,
    corrected_beam_def: bool,
    warnings: Vec<String>,
}

impl ConversionContext {
    pub fn new(config: ConversionConfig) -> Self {
        let mut beam = BeamState::at_rest(config.particle.mass_gev());
        beam.distr_type = config.distr_type;
        Self {
            config,
            units: UnitTable::default(),
            beam,
            props: MachineProps::default(),
            counters: Counters::default(),
            machine: Machine::new(),
            parts: Vec::new(),
            beam_defined: false,
            corrected_beam_def: false,
            warnings: Vec::new(),
        }
    }

    fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!("{message}");
        self.warnings.push(message);
    }

    fn length_to_metres(&self, length: f64) -> f64 {
        length * self.units.scale_to_metres(UnitQuantity::ElementLength)
    }

    fn field_to_tesla(&self, field: f64) -> f64 {
        let gauss = field * label_scale(self.units.unit(UnitQuantity::MagneticFields));
        gauss * GAUSS2TESLA
    }

    fn element_name(&self, generated: String, original: &Option<String>) -> String {
        match (&self.config.keep_name, original) {
            (true, Some(name)) if !name.is_empty() => name.clone(),
            _ => generated,
        }
    }

    /// Snapshot of the beam in SI units for the output writers.
    fn beam_spec(&self) -> BeamSpec {
        let x_scale = self.units.scale_to_metres(UnitQuantity::X);
        let y_scale = self.units.scale_to_metres(UnitQuantity::Y);
        let xp_scale = label_scale(self.units.unit(UnitQuantity::Xp));
        let yp_scale = label_scale(self.units.unit(UnitQuantity::Yp));
        let e_scale = label_scale(self.units.unit(UnitQuantity::PEgain));
        BeamSpec {
            particle: self.config.particle,
            energy_gev: self.beam.tot_energy * e_scale / EV_PER_GEV,
            distr_type: self.beam.distr_type,
            sigma_x: self.beam.sigma_x * x_scale,
            sigma_y: self.beam.sigma_y * y_scale,
            sigma_xp: self.beam.sigma_xp * xp_scale,
            sigma_yp: self.beam.sigma_yp * yp_scale,
            sigma_e: self.beam.sigma_e,
            sigma_t: self.beam.sigma_t,
            x0: self.beam.x0 * x_scale,
            y0: self.beam.y0 * y_scale,
            z0: self.beam.z0 * self.units.scale_to_metres(UnitQuantity::ElementLength),
            betx: self.beam.betx,
            bety: self.beam.bety,
            alfx: self.beam.alfx,
            alfy: self.beam.alfy,
            // legacy emittance bookkeeping is in mm mrad
            emitx: self.beam.emitx * 1.0e-6,
            emity: self.beam.emity * 1.0e-6,
        }
    }

    /// Seal the machine under assembly and start a fresh one.
    fn flush_machine(&mut self) {
        if self.machine.is_empty() && self.machine.beam.is_none() {
            return;
        }
        let mut machine = std::mem::take(&mut self.machine);
        machine.beam = Some(self.beam_spec());
        let mut options = MachineOptions::default();
        if let Some(radius) = self.props.beampipe_radius {
            // stored in the pipe_rad unit, the options block wants cm
            options.beampipe_radius =
                radius * self.units.scale_to_metres(UnitQuantity::PipeRad) * 100.0;
        }
        machine.options = Some(options);
        machine.sampler_all = true;
        self.parts.push(machine);
    }
}

/// Counts and artifacts of one conversion run, also emitted as JSON by
/// the CLI.
#[derive(Debug, Clone, Serialize)]
pub struct ConversionReport {
    pub input: PathBuf,
    pub file_kind: String,
    pub machine_parts: usize,
    pub element_counts: BTreeMap<String, usize>,
    pub outputs: Vec<PathBuf>,
    pub warnings: Vec<String>,
}

/// Convert one TRANSPORT file and write the configured output formats.
pub fn convert_file(path: &Path, config: &ConversionConfig) -> TransportResult<ConversionReport> {
    let loaded = reader::load(path)?;
    info!(
        input = %path.display(),
        kind = match loaded.kind {
            FileKind::Input => "input deck",
            FileKind::Output => "standard output file",
        },
        "loaded"
    );

    let preparation = lattice::prepare(&loaded, config.dont_split)?;
    let mut registry = preparation.registry;

    if loaded.kind == FileKind::Output && !loaded.fit_rows.is_empty() {
        let fits = fitting::build_fit_registry(&loaded.fit_rows);
        debug!(rows = fits.len(), "reconciling fitted parameters");
        fitting::reconcile(&mut registry, &fits);
    }

    let mut context = ConversionContext::new(config.clone());
    run(&mut context, &registry);
    context.flush_machine();

    let stem = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .ok_or_else(|| {
            TransportError::input_validation(
                "INPUT.FILE",
                format!("cannot derive an output name from {}", path.display()),
            )
        })?
        .to_string();

    let mut outputs = Vec::new();
    let multi = context.parts.len() > 1;
    for (index, machine) in context.parts.iter().enumerate() {
        let part_stem = if multi {
            format!("{stem}_part{index}")
        } else {
            stem.clone()
        };
        if config.gmad {
            outputs.push(GmadWriter.write(machine, &config.gmad_dir, &part_stem)?);
        }
        if config.madx {
            outputs.push(MadxWriter.write(machine, &config.madx_dir, &part_stem)?);
        }
    }
    for output in &outputs {
        info!(path = %output.display(), "written");
    }

    let mut element_counts: BTreeMap<String, usize> = BTreeMap::new();
    for machine in &context.parts {
        for element in &machine.elements {
            let key = match element {
                BuiltElement::Drift { .. } => "drift",
                BuiltElement::SBend { .. } => "sbend",
                BuiltElement::Quadrupole { .. } => "quadrupole",
                BuiltElement::Sextupole { .. } => "sextupole",
                BuiltElement::Solenoid { .. } => "solenoid",
                BuiltElement::RfCavity { .. } => "rfcavity",
                BuiltElement::Transform3D { .. } => "transform3d",
                BuiltElement::Collimator { .. } => "collimator",
            };
            *element_counts.entry(key.to_string()).or_insert(0) += 1;
        }
    }

    Ok(ConversionReport {
        input: path.to_path_buf(),
        file_kind: match loaded.kind {
            FileKind::Input => "input".to_string(),
            FileKind::Output => "output".to_string(),
        },
        machine_parts: context.parts.len(),
        element_counts,
        outputs,
        warnings: context.warnings,
    })
}

/// The dispatch loop over registry records. Collimators may have borrowed
/// the following drift's length, in which case that drift is suppressed;
/// consecutive drifts are optionally merged into one.
fn run(context: &mut ConversionContext, registry: &Registry) {
    let mut skip_next_drift = false;
    let mut pending_drift: Option<(Option<String>, f64)> = None;

    for record in registry.iter() {
        let code = record.kind.type_code().code_number();
        if context.config.combine_drifts
            && pending_drift.is_some()
            && code != TypeCode::Drift.code_number()
            && code < 20
        {
            if let Some((name, length)) = pending_drift.take() {
                emit_drift(context, &name, length);
            }
        }

        match &record.kind {
            ElementKind::Beam(card) => define_beam(context, card),
            ElementKind::Drift => {
                if skip_next_drift {
                    skip_next_drift = false;
                    continue;
                }
                if record.length <= 0.0 {
                    debug!(
                        line = record.source_line,
                        length = record.length,
                        "drift without a positive length, nothing to emit"
                    );
                    continue;
                }
                if context.config.combine_drifts {
                    match &mut pending_drift {
                        Some((name, length)) => {
                            *length += record.length;
                            if name.is_none() {
                                *name = record.name.clone();
                            }
                        }
                        None => pending_drift = Some((record.name.clone(), record.length)),
                    }
                } else {
                    emit_drift(context, &record.name, record.length);
                }
            }
            ElementKind::Dipole { data, e1, e2 } => dipole(context, record, data, *e1, *e2),
            ElementKind::Quadrupole { data } => quadrupole(context, record, data),
            ElementKind::Sextupole { data } => sextupole(context, record, data),
            ElementKind::Solenoid { data } => solenoid(context, record, data),
            ElementKind::Collimator { data } => {
                collimator(context, record, data);
                if record.length > 0.0 {
                    skip_next_drift = true;
                }
            }
            ElementKind::TransformUpdate => {
                debug!(
                    line = record.source_line,
                    "transform update left as-is, nothing to convert"
                );
            }
            ElementKind::Acceleration { data } => acceleration(context, record, data),
            ElementKind::BeamCorrection {
                data,
                is_addition,
                previous_code,
            } => correction(context, data, *is_addition, *previous_code),
            ElementKind::PrintControl { data } => print_control(context, data),
            ElementKind::UnitChange { mark, label } => {
                context.units.apply_unit_change(*mark, label);
            }
            ElementKind::SpecialInput { data } => special_input(context, data),
            ElementKind::BendDirection { angle } => change_bend(context, *angle),
            ElementKind::PoleFace { .. } => {
                debug!(
                    line = record.source_line,
                    "poleface rotation handled by the neighbouring dipole"
                );
            }
            ElementKind::Ignored { code } => match code {
                TypeCode::Repeat => {
                    context.warn(format!(
                        "repetition element on line {} is not supported and was skipped",
                        record.source_line
                    ));
                }
                other => {
                    debug!(line = record.source_line, kind = other.as_str(), "ignored");
                }
            },
        }
    }

    if let Some((name, length)) = pending_drift.take() {
        emit_drift(context, &name, length);
    }
}

fn define_beam(context: &mut ConversionContext, card: &BeamCard) {
    if card.is_addition {
        debug!("ignoring beam r.m.s. addition");
        return;
    }
    if context.beam_defined {
        if context.config.dont_split {
            debug!("beam redefinition ignored, splitting disabled");
            return;
        }
        info!("beam redefinition found, splitting into multiple machines");
        context.flush_machine();
        context.corrected_beam_def = false;
    }
    context.beam_defined = true;

    let units = context.units.clone();
    context.beam.set_energy_from_momentum(card.momentum, &units);
    context.beam.sigma_x = card.sigma_x;
    context.beam.sigma_y = card.sigma_y;
    context.beam.sigma_xp = card.sigma_xp;
    context.beam.sigma_yp = card.sigma_yp;
    // percentage momentum spread to absolute energy spread
    context.beam.sigma_e = card.sigma_e * 0.01 * context.beam.beta * context.beam.beta;
    context.beam.sigma_t = bunch_length_to_seconds(context, card.sigma_t);

    if context.beam.sigma_xp == 0.0 || context.beam.sigma_yp == 0.0 {
        context.warn("zero angular spread in beam definition, Twiss parameters set to zero");
        context.beam.betx = 0.0;
        context.beam.bety = 0.0;
        context.beam.emitx = 0.0;
        context.beam.emity = 0.0;
    } else {
        context.beam.betx = context.beam.sigma_x / context.beam.sigma_xp;
        context.beam.bety = context.beam.sigma_y / context.beam.sigma_yp;
        context.beam.emitx = context.beam.sigma_x * context.beam.sigma_xp / 1000.0;
        context.beam.emity = context.beam.sigma_y * context.beam.sigma_yp / 1000.0;
    }
    debug!(
        momentum = card.momentum,
        brho = context.beam.brho,
        beta = context.beam.beta,
        "beam defined"
    );
}

fn bunch_length_to_seconds(context: &ConversionContext, bunch_length: f64) -> f64 {
    let scale = label_scale(context.units.unit(UnitQuantity::BunchLength));
    let metres = bunch_length * scale;
    if context.beam.beta == 0.0 {
        0.0
    } else {
        metres / (context.beam.beta * C_LIGHT)
    }
}

fn emit_drift(context: &mut ConversionContext, name: &Option<String>, length: f64) {
    let generated = format!("DR{}", context.counters.drifts);
    context.counters.drifts += 1;
    let element = BuiltElement::Drift {
        name: context.element_name(generated, name),
        length: context.length_to_metres(length),
    };
    debug!(?element, "converted");
    context.machine.push(element);
}

fn dipole(context: &mut ConversionContext, record: &ElementRecord, data: &[f64], e1: f64, e2: f64) {
    let Some(&parameter) = data.get(1) else {
        context.warn(format!(
            "dipole on line {} has no field or angle, skipped",
            record.source_line
        ));
        return;
    };
    let length_m = context.length_to_metres(record.length);

    let angle = if context.props.benddef {
        let field_t = context.field_to_tesla(parameter);
        if field_t == 0.0 {
            0.0
        } else {
            let rho = context.beam.brho / field_t;
            (length_m / rho) * context.props.bending
        }
    } else {
        parameter * DEG2RAD * context.props.bending
    };

    let e1_rad = round4(e1 * DEG2RAD);
    let e2_rad = round4(e2 * DEG2RAD);
    // the fringe integral only applies to a face that is actually rotated
    let fint = (context.props.fringe_integral != 0.0 && e1_rad != 0.0)
        .then_some(context.props.fringe_integral);
    let fintx = (context.props.fringe_integral != 0.0 && e2_rad != 0.0)
        .then_some(context.props.fringe_integral);

    let generated = format!("BM{}", context.counters.dipoles);
    context.counters.dipoles += 1;
    let element = BuiltElement::SBend {
        name: context.element_name(generated, &record.name),
        length: length_m,
        angle: round4(angle),
        e1: (e1_rad != 0.0).then_some(e1_rad),
        e2: (e2_rad != 0.0).then_some(e2_rad),
        fint,
        fintx,
    };
    debug!(?element, "converted");
    context.machine.push(element);
}

fn quadrupole(context: &mut ConversionContext, record: &ElementRecord, data: &[f64]) {
    let (Some(&field), Some(&pipe_rad)) = (data.get(1), data.get(2)) else {
        context.warn(format!(
            "quadrupole on line {} is missing field or aperture, skipped",
            record.source_line
        ));
        return;
    };
    let field_t = context.field_to_tesla(field);
    let pipe_m = pipe_rad * context.units.scale_to_metres(UnitQuantity::BendVertGap);
    let k1 = if pipe_m == 0.0 || context.beam.brho == 0.0 {
        0.0
    } else {
        (field_t / pipe_m) / context.beam.brho
    };

    let generated = if k1 > 0.0 {
        format!("QF{}", context.counters.quads)
    } else if k1 < 0.0 {
        format!("QD{}", context.counters.quads)
    } else {
        format!("NULLQUAD{}", context.counters.quads)
    };
    context.counters.quads += 1;
    let element = BuiltElement::Quadrupole {
        name: context.element_name(generated, &record.name),
        length: context.length_to_metres(record.length),
        k1: round4(k1),
    };
    debug!(?element, "converted");
    context.machine.push(element);
}

fn sextupole(context: &mut ConversionContext, record: &ElementRecord, data: &[f64]) {
    let (Some(&field), Some(&pipe_rad)) = (data.get(1), data.get(2)) else {
        context.warn(format!(
            "sextupole on line {} is missing field or aperture, skipped",
            record.source_line
        ));
        return;
    };
    let field_t = context.field_to_tesla(field);
    let pipe_m = pipe_rad * context.units.scale_to_metres(UnitQuantity::BendVertGap);
    let k2 = if pipe_m == 0.0 || context.beam.brho == 0.0 {
        0.0
    } else {
        (2.0 * field_t / (pipe_m * pipe_m)) / context.beam.brho
    };

    let generated = format!("SEXT{}", context.counters.sextus);
    context.counters.sextus += 1;
    let element = BuiltElement::Sextupole {
        name: context.element_name(generated, &record.name),
        length: context.length_to_metres(record.length),
        k2: round4(k2),
    };
    debug!(?element, "converted");
    context.machine.push(element);
}

fn solenoid(context: &mut ConversionContext, record: &ElementRecord, data: &[f64]) {
    let Some(&field) = data.get(1) else {
        context.warn(format!(
            "solenoid on line {} has no field, skipped",
            record.source_line
        ));
        return;
    };
    let generated = format!("SOLE{}", context.counters.solenoids);
    context.counters.solenoids += 1;
    let element = BuiltElement::Solenoid {
        name: context.element_name(generated, &record.name),
        length: context.length_to_metres(record.length),
        ks: round4(context.field_to_tesla(field)),
    };
    debug!(?element, "converted");
    context.machine.push(element);
}

/// Half-apertures come in (discriminant, value) pairs: `1.0` marks the
/// horizontal width, `3.0` the vertical.
fn collimator(context: &mut ConversionContext, record: &ElementRecord, data: &[f64]) {
    let x_scale = context.units.scale_to_metres(UnitQuantity::X);
    let mut x_half = None;
    let mut y_half = None;
    for pair in data.chunks(2) {
        if pair.len() < 2 {
            break;
        }
        if pair[0] == 1.0 {
            x_half = Some(pair[1] * x_scale);
        } else if pair[0] == 3.0 {
            y_half = Some(pair[1] * x_scale);
        }
    }

    let generated = format!("COL{}", context.counters.collimators);
    context.counters.collimators += 1;
    let element = BuiltElement::Collimator {
        name: context.element_name(generated, &record.name),
        length: context.length_to_metres(record.length),
        x_half,
        y_half,
    };
    debug!(?element, "converted");
    context.machine.push(element);
}

/// Two RF conventions exist: a single four-value card, and a sequence
/// opened by a zero-length card carrying the total voltage, followed by
/// cards carrying cumulative voltage fractions. Each cavity raises the
/// beam's kinetic energy by its share.
fn acceleration(context: &mut ConversionContext, record: &ElementRecord, data: &[f64]) {
    let e_scale = label_scale(context.units.unit(UnitQuantity::PEgain));
    let to_mv = e_scale / 1.0e6;

    let (length, e_gain) = match data.len() {
        4 => (data[0], data[1]),
        2 => {
            if data[0] == 0.0 {
                // sequence header, no element emitted
                context.props.total_acc_voltage = data[1];
                context.props.e_gain_prev = 0.0;
                debug!(
                    total_voltage = data[1],
                    "acceleration sequence opened"
                );
                return;
            }
            let fraction = data[1];
            let e_gain = (fraction - context.props.e_gain_prev) * context.props.total_acc_voltage;
            context.props.e_gain_prev = fraction;
            if fraction >= 1.0 {
                context.props.total_acc_voltage = 0.0;
                context.props.e_gain_prev = 0.0;
                debug!("acceleration sequence closed");
            }
            (data[0], e_gain)
        }
        _ => {
            context.warn(format!(
                "acceleration element on line {} has an unrecognised layout, skipped",
                record.source_line
            ));
            return;
        }
    };

    let length_m = context.length_to_metres(length);
    let gradient = if length_m == 0.0 {
        0.0
    } else {
        e_gain * to_mv / length_m
    };

    let generated = format!("RF{}", context.counters.rf);
    context.counters.rf += 1;
    let element = BuiltElement::RfCavity {
        name: context.element_name(generated, &record.name),
        length: length_m,
        gradient: round4(gradient),
    };
    debug!(?element, "converted");
    context.machine.push(element);

    let units = context.units.clone();
    let new_k_energy = context.beam.k_energy + e_gain;
    context.beam.set_momentum_from_energy(new_k_energy, &units);
}

/// Back-derive Twiss parameters from the sigma-matrix correlations
/// sigma21 and sigma43, switching the distribution to Gaussian-Twiss.
/// Only the correction immediately following the original beam
/// definition is honoured.
fn correction(
    context: &mut ConversionContext,
    data: &[f64],
    is_addition: bool,
    previous_code: Option<i32>,
) {
    if context.corrected_beam_def {
        debug!("beam already corrected, ignoring further corrections");
        return;
    }
    // 15 correlations fill the lower triangle of the 6x6 sigma matrix
    if data.len() < 15 {
        context.warn("beam correction entry is too short, ignored");
        return;
    }
    if previous_code == Some(1) && !is_addition && context.beam_defined {
        context.corrected_beam_def = true;
    }
    let sigma21 = data[0];
    let sigma43 = data[5];

    let (sigma_x, sigma_xp) = (context.beam.sigma_x, context.beam.sigma_xp);
    let (sigma_y, sigma_yp) = (context.beam.sigma_y, context.beam.sigma_yp);
    let (betx, emitx, alfx) = twiss_from_correlation(context, sigma21, sigma_x, sigma_xp);
    let (bety, emity, alfy) = twiss_from_correlation(context, sigma43, sigma_y, sigma_yp);
    context.beam.betx = betx;
    context.beam.emitx = emitx / 1000.0;
    context.beam.alfx = alfx;
    context.beam.bety = bety;
    context.beam.emity = emity / 1000.0;
    context.beam.alfy = alfy;
    context.beam.distr_type = DistrType::GaussTwiss;
    debug!(sigma21, sigma43, "distribution switched to gausstwiss");
}

fn twiss_from_correlation(
    context: &mut ConversionContext,
    correlation: f64,
    sigma: f64,
    sigma_p: f64,
) -> (f64, f64, f64) {
    let emitt_over_beta = sigma_p * sigma_p * (1.0 - correlation * correlation);
    if emitt_over_beta == 0.0 || sigma == 0.0 {
        context.warn("degenerate correlation in beam correction, Twiss set to zero");
        return (0.0, 0.0, 0.0);
    }
    let emitt_beta = sigma * sigma;
    let beta = (emitt_beta / emitt_over_beta).sqrt();
    let emitt = emitt_beta / beta;
    let slope = correlation * sigma_p / sigma;
    let alpha = -slope * beta;
    (beta, emitt, alpha)
}

/// Codes 47/48 flip the dipole definition between field and angle;
/// code 19 requests single-line optics output.
fn print_control(context: &mut ConversionContext, data: &[f64]) {
    for &value in data {
        if value == 48.0 {
            context.props.benddef = false;
            info!("switched dipoles to angle definition");
        } else if value == 47.0 {
            context.props.benddef = true;
            info!("switched dipoles to field definition");
        } else if value == 19.0 {
            debug!("single-line optics output requested, no conversion effect");
        }
    }
}

fn special_input(context: &mut ConversionContext, data: &[f64]) {
    let (Some(&selector), value) = (data.first(), data.get(1).copied()) else {
        return;
    };
    match (selector, value) {
        (5.0, Some(value)) => context.props.beampipe_radius = Some(value),
        (7.0, Some(value)) => context.props.fringe_integral = value,
        (14.0, _) => {
            debug!("type code 6 redefinition already applied during classification");
        }
        (16.0, Some(value)) => context.beam.x0 = value,
        (17.0, Some(value)) => context.beam.y0 = value,
        (18.0, Some(value)) => context.beam.z0 = value,
        _ => debug!(selector, "special input with no conversion effect"),
    }
}

/// A 180 degree rotation flips the bending sign; any other non-zero
/// angle becomes a roll transform with inverted sign, since TRANSPORT
/// and BDSIM disagree on which way is up.
fn change_bend(context: &mut ConversionContext, angle: f64) {
    let mut angle = angle;
    if angle >= 360.0 {
        angle %= 360.0;
    }
    if angle <= -360.0 {
        angle %= -360.0;
    }
    if angle == 180.0 || angle == -180.0 {
        context.props.bending *= -1.0;
        debug!("bending direction flipped");
        return;
    }
    if angle != 0.0 {
        let psi = -angle * DEG2RAD;
        let generated = format!("t{}", context.counters.transforms);
        context.counters.transforms += 1;
        let element = BuiltElement::Transform3D {
            name: generated,
            psi: round4(psi),
        };
        debug!(?element, "converted");
        context.machine.push(element);
    }
}

#[cfg(test)]
mod tests {
    use super::{convert_file, ConversionContext};
    use crate::builder::BuiltElement;
    use crate::domain::{ConversionConfig, DistrType};
    use std::io::Write;
    use tempfile::TempDir;

    fn write_lattice(dir: &TempDir, name: &str, contents: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    fn config_in(dir: &TempDir) -> ConversionConfig {
        ConversionConfig {
            gmad_dir: dir.path().join("gmad"),
            madx: true,
            madx_dir: dir.path().join("madx"),
            ..ConversionConfig::default()
        }
    }

    const SIMPLE: &str = "\
( simple test lattice )
1. 0.5 1.0 0.5 1.0 0. 0.5 10.0 /BEAM/ ;
3. 1.5 /D1/ ;
5. 0.3 12.5 5.0 /Q1/ ;
3. 1.5 /D2/ ;
SENTINEL
";

    #[test]
    fn converts_a_simple_deck_to_both_formats() {
        let dir = TempDir::new().unwrap();
        let path = write_lattice(&dir, "simple.txt", SIMPLE);
        let report = convert_file(&path, &config_in(&dir)).unwrap();

        assert_eq!(report.machine_parts, 1);
        assert_eq!(report.element_counts.get("drift"), Some(&2));
        assert_eq!(report.element_counts.get("quadrupole"), Some(&1));
        assert_eq!(report.outputs.len(), 2);

        let gmad = std::fs::read_to_string(&report.outputs[0]).unwrap();
        assert!(gmad.contains("DR0: drift, l=1.5*m;"));
        assert!(gmad.contains("beam, particle=\"proton\""));
        assert!(gmad.contains("sample, all;"));
        let madx = std::fs::read_to_string(&report.outputs[1]).unwrap();
        assert!(madx.contains("BEAM, PARTICLE=PROTON"));
    }

    #[test]
    fn dipole_angle_from_field_matches_rigidity() {
        // p = 10 GeV/c protons, brho ~ 33.356 Tm; 2 m dipole at 5 kG
        // gives angle = L*B/brho = 2*0.5/33.356 = 0.03 rad (4 dp).
        let dir = TempDir::new().unwrap();
        let path = write_lattice(
            &dir,
            "dipole.txt",
            "1. 0.5 1.0 0.5 1.0 0. 0.5 10.0 /BEAM/ ;\n4. 2.0 5.0 3. /BM/ ;\nSENTINEL\n",
        );
        let report = convert_file(&path, &config_in(&dir)).unwrap();
        let gmad = std::fs::read_to_string(&report.outputs[0]).unwrap();
        assert!(gmad.contains("BM0: sbend, l=2.0*m, angle=0.03;"), "{gmad}");
    }

    #[test]
    fn zero_length_drifts_are_not_emitted() {
        let dir = TempDir::new().unwrap();
        let path = write_lattice(
            &dir,
            "zerodrift.txt",
            "1. 0.5 1.0 0.5 1.0 0. 0.5 10.0 ;\n3. 0. ;\n3. 1.0 ;\nSENTINEL\n",
        );
        let report = convert_file(&path, &config_in(&dir)).unwrap();
        assert_eq!(report.element_counts.get("drift"), Some(&1));
        let gmad = std::fs::read_to_string(&report.outputs[0]).unwrap();
        assert!(gmad.contains("DR0: drift, l=1.0*m;"), "{gmad}");
    }

    #[test]
    fn fringe_integral_attaches_to_the_rotated_face_only() {
        let dir = TempDir::new().unwrap();
        let deck = "\
1. 0.5 1.0 0.5 1.0 0. 0.5 10.0 ;
16. 7. 0.5 ;
4. 2.0 5.0 3. ;
2. 10. ;
SENTINEL
";
        let path = write_lattice(&dir, "fringe.txt", deck);
        let report = convert_file(&path, &config_in(&dir)).unwrap();
        let gmad = std::fs::read_to_string(&report.outputs[0]).unwrap();
        // only the exit face is rotated, so the integral goes to fintx
        assert!(
            gmad.contains("BM0: sbend, l=2.0*m, angle=0.03, e2=0.1745, fintx=0.5;"),
            "{gmad}"
        );
        let madx = std::fs::read_to_string(&report.outputs[1]).unwrap();
        assert!(madx.contains("E2=0.1745, FINTX=0.5;"), "{madx}");
    }

    #[test]
    fn fringe_integral_on_the_entrance_face_stays_on_fint() {
        let dir = TempDir::new().unwrap();
        let deck = "\
1. 0.5 1.0 0.5 1.0 0. 0.5 10.0 ;
16. 7. 0.5 ;
2. 10. ;
4. 2.0 5.0 3. ;
SENTINEL
";
        let path = write_lattice(&dir, "fringe_in.txt", deck);
        let report = convert_file(&path, &config_in(&dir)).unwrap();
        let gmad = std::fs::read_to_string(&report.outputs[0]).unwrap();
        assert!(
            gmad.contains("BM0: sbend, l=2.0*m, angle=0.03, e1=0.1745, fint=0.5;"),
            "{gmad}"
        );
    }

    #[test]
    fn print_control_48_switches_to_angle_definition() {
        let dir = TempDir::new().unwrap();
        let path = write_lattice(
            &dir,
            "angle.txt",
            "1. 0.5 1.0 0.5 1.0 0. 0.5 10.0 /BEAM/ ;\n13. 48. ;\n4. 2.0 45.0 3. ;\nSENTINEL\n",
        );
        let report = convert_file(&path, &config_in(&dir)).unwrap();
        let gmad = std::fs::read_to_string(&report.outputs[0]).unwrap();
        // 45 degrees in radians, 4 dp
        assert!(gmad.contains("angle=0.7854"), "{gmad}");
    }

    #[test]
    fn bend_direction_flip_negates_the_angle() {
        let dir = TempDir::new().unwrap();
        let path = write_lattice(
            &dir,
            "flip.txt",
            "1. 0.5 1.0 0.5 1.0 0. 0.5 10.0 /BEAM/ ;\n13. 48. ;\n20. 180. ;\n4. 2.0 45.0 3. ;\nSENTINEL\n",
        );
        let report = convert_file(&path, &config_in(&dir)).unwrap();
        let gmad = std::fs::read_to_string(&report.outputs[0]).unwrap();
        assert!(gmad.contains("angle=-0.7854"), "{gmad}");
    }

    #[test]
    fn non_half_turn_rotation_becomes_a_transform() {
        let dir = TempDir::new().unwrap();
        let path = write_lattice(
            &dir,
            "roll.txt",
            "1. 0.5 1.0 0.5 1.0 0. 0.5 10.0 /BEAM/ ;\n20. -90. ;\nSENTINEL\n",
        );
        let report = convert_file(&path, &config_in(&dir)).unwrap();
        let gmad = std::fs::read_to_string(&report.outputs[0]).unwrap();
        // TRANSPORT -90 is upwards, BDSIM +90: sign inverted
        assert!(gmad.contains("t0: transform3d, psi=1.5708;"), "{gmad}");
    }

    #[test]
    fn beam_redefinition_splits_the_machine() {
        let dir = TempDir::new().unwrap();
        let deck = "\
1. 0.5 1.0 0.5 1.0 0. 0.5 10.0 /BEAM1/ ;
3. 1.0 ;
1. 0.5 1.0 0.5 1.0 0. 0.5 12.0 /BEAM2/ ;
3. 2.0 ;
SENTINEL
";
        let path = write_lattice(&dir, "split.txt", deck);
        let report = convert_file(&path, &config_in(&dir)).unwrap();
        assert_eq!(report.machine_parts, 2);
        let names: Vec<String> = report
            .outputs
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert!(names.contains(&"split_part0.gmad".to_string()));
        assert!(names.contains(&"split_part1.gmad".to_string()));
    }

    #[test]
    fn dont_split_keeps_one_machine() {
        let dir = TempDir::new().unwrap();
        let deck = "\
1. 0.5 1.0 0.5 1.0 0. 0.5 10.0 ;
3. 1.0 ;
1. 0.5 1.0 0.5 1.0 0. 0.5 12.0 ;
3. 2.0 ;
SENTINEL
";
        let path = write_lattice(&dir, "nosplit.txt", deck);
        let config = ConversionConfig {
            dont_split: true,
            ..config_in(&dir)
        };
        let report = convert_file(&path, &config).unwrap();
        assert_eq!(report.machine_parts, 1);
        assert_eq!(report.element_counts.get("drift"), Some(&2));
    }

    #[test]
    fn collimator_borrows_and_suppresses_the_next_drift() {
        let dir = TempDir::new().unwrap();
        let deck = "\
1. 0.5 1.0 0.5 1.0 0. 0.5 10.0 ;
16. 14. ;
6. 1.0 0.5 3. 0.25 /COLL/ ;
3. 0.75 ;
3. 1.0 ;
SENTINEL
";
        let path = write_lattice(&dir, "coll.txt", deck);
        let report = convert_file(&path, &config_in(&dir)).unwrap();
        // the 0.75 m drift is consumed by the collimator
        assert_eq!(report.element_counts.get("collimator"), Some(&1));
        assert_eq!(report.element_counts.get("drift"), Some(&1));
        let gmad = std::fs::read_to_string(&report.outputs[0]).unwrap();
        // apertures in cm scaled to metres
        assert!(gmad.contains("COL0: rcol, l=0.75*m, xsize=0.005*m, ysize=0.0025*m;"), "{gmad}");
    }

    #[test]
    fn combine_drifts_merges_consecutive_runs() {
        let dir = TempDir::new().unwrap();
        let deck = "\
1. 0.5 1.0 0.5 1.0 0. 0.5 10.0 ;
3. 1.0 ;
3. 0.5 ;
5. 0.3 12.5 5.0 ;
3. 0.25 ;
SENTINEL
";
        let path = write_lattice(&dir, "combine.txt", deck);
        let config = ConversionConfig {
            combine_drifts: true,
            ..config_in(&dir)
        };
        let report = convert_file(&path, &config).unwrap();
        assert_eq!(report.element_counts.get("drift"), Some(&2));
        let gmad = std::fs::read_to_string(&report.outputs[0]).unwrap();
        assert!(gmad.contains("DR0: drift, l=1.5*m;"), "{gmad}");
        assert!(gmad.contains("DR1: drift, l=0.25*m;"), "{gmad}");
    }

    #[test]
    fn unit_change_rescales_later_lengths() {
        let dir = TempDir::new().unwrap();
        let deck = "\
1. 0.5 1.0 0.5 1.0 0. 0.5 10.0 ;
3. 1.0 ;
15. 8. 'cm' ;
3. 50.0 ;
SENTINEL
";
        let path = write_lattice(&dir, "units.txt", deck);
        let report = convert_file(&path, &config_in(&dir)).unwrap();
        let gmad = std::fs::read_to_string(&report.outputs[0]).unwrap();
        assert!(gmad.contains("DR0: drift, l=1.0*m;"), "{gmad}");
        assert!(gmad.contains("DR1: drift, l=0.5*m;"), "{gmad}");
    }

    #[test]
    fn correction_switches_distribution_to_gausstwiss() {
        let mut deck = String::from("1. 0.5 1.0 0.5 1.0 0. 0.5 10.0 ;\n12. 0.5");
        for _ in 0..15 {
            deck.push_str(" 0.1");
        }
        deck.push_str(" ;\nSENTINEL\n");

        let dir = TempDir::new().unwrap();
        let path = write_lattice(&dir, "twiss.txt", &deck);
        let report = convert_file(&path, &config_in(&dir)).unwrap();
        let gmad = std::fs::read_to_string(&report.outputs[0]).unwrap();
        assert!(gmad.contains("distrType=\"gausstwiss\""), "{gmad}");
        assert!(gmad.contains("betx="), "{gmad}");
    }

    #[test]
    fn rf_sequence_accumulates_voltage_fractions() {
        let dir = TempDir::new().unwrap();
        let deck = "\
1. 0.5 1.0 0.5 1.0 0. 0.5 1.0 ;
11. 0. 2.0 ;
11. 1.0 0.5 ;
11. 1.0 1.0 ;
SENTINEL
";
        let path = write_lattice(&dir, "rf.txt", deck);
        let report = convert_file(&path, &config_in(&dir)).unwrap();
        assert_eq!(report.element_counts.get("rfcavity"), Some(&2));
        let gmad = std::fs::read_to_string(&report.outputs[0]).unwrap();
        // each cavity takes half of the 2 GV total: 1 GeV over 1 m = 1000 MV/m
        assert!(gmad.contains("RF0: rfcavity, l=1.0*m, gradient=1000.0;"), "{gmad}");
        assert!(gmad.contains("RF1: rfcavity, l=1.0*m, gradient=1000.0;"), "{gmad}");
    }

    #[test]
    fn special_input_offsets_reach_the_beam_block() {
        let dir = TempDir::new().unwrap();
        let deck = "\
1. 0.5 1.0 0.5 1.0 0. 0.5 10.0 ;
16. 16. 2.0 ;
3. 1.0 ;
SENTINEL
";
        let path = write_lattice(&dir, "offsets.txt", deck);
        let report = convert_file(&path, &config_in(&dir)).unwrap();
        let gmad = std::fs::read_to_string(&report.outputs[0]).unwrap();
        // X0 of 2 cm scaled to metres
        assert!(gmad.contains("X0=0.02*m"), "{gmad}");
    }

    #[test]
    fn special_input_pipe_radius_overrides_the_option_block() {
        let dir = TempDir::new().unwrap();
        let deck = "\
1. 0.5 1.0 0.5 1.0 0. 0.5 10.0 ;
16. 5. 25.0 ;
3. 1.0 ;
SENTINEL
";
        let path = write_lattice(&dir, "pipe.txt", deck);
        let report = convert_file(&path, &config_in(&dir)).unwrap();
        let gmad = std::fs::read_to_string(&report.outputs[0]).unwrap();
        assert!(gmad.contains("beampipeRadius=25.0*cm"), "{gmad}");
    }

    #[test]
    fn keep_name_preserves_original_labels() {
        let dir = TempDir::new().unwrap();
        let path = write_lattice(
            &dir,
            "named.txt",
            "1. 0.5 1.0 0.5 1.0 0. 0.5 10.0 ;\n3. 1.5 /DRIFTA/ ;\nSENTINEL\n",
        );
        let config = ConversionConfig {
            keep_name: true,
            ..config_in(&dir)
        };
        let report = convert_file(&path, &config).unwrap();
        let gmad = std::fs::read_to_string(&report.outputs[0]).unwrap();
        assert!(gmad.contains("DRIFTA: drift"), "{gmad}");
    }

    #[test]
    fn repetition_elements_are_reported_as_warnings() {
        let dir = TempDir::new().unwrap();
        let path = write_lattice(
            &dir,
            "repeat.txt",
            "1. 0.5 1.0 0.5 1.0 0. 0.5 10.0 ;\n9. 3. ;\n3. 1.0 ;\nSENTINEL\n",
        );
        let report = convert_file(&path, &config_in(&dir)).unwrap();
        assert!(report
            .warnings
            .iter()
            .any(|warning| warning.contains("repetition")));
    }

    #[test]
    fn context_starts_with_legacy_defaults() {
        let context = ConversionContext::new(ConversionConfig::default());
        assert!(context.props.benddef);
        assert_eq!(context.props.bending, 1.0);
        assert_eq!(context.props.beampipe_radius, None);
        assert_eq!(context.beam.distr_type, DistrType::Gauss);
        assert!(!context.beam_defined);
    }

    #[test]
    fn drift_element_kind_key_is_stable() {
        // guard for the JSON report schema
        let element = BuiltElement::Drift {
            name: "DR0".to_string(),
            length: 1.0,
        };
        assert_eq!(element.name(), "DR0");
    }
}
