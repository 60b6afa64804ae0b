//! Record preparation: classify tokenized lattice lines into element
//! records and fill the element registry.
//!
//! Classification stops at SENTINEL. Negative and zero type codes are
//! inert in TRANSPORT and are skipped here too, as are comments, blank
//! lines and anything else whose first field is not numeric. Two cards
//! need context from neighbouring lines: dipoles search a five-line window
//! for pole-face rotations, and collimators borrow the length of the next
//! drift because their own is always zero.

use tracing::debug;

use crate::domain::{
    BeamCard, ElementKind, ElementRecord, FileKind, SkipReason, TransportError, TransportResult,
    TypeCode,
};
use crate::reader::{LoadedFile, SourceLine};
use crate::registry::Registry;
use crate::tokenizer::{self, POLE_FACE_SEARCH_WINDOW};

/// Type codes that terminate a collimator's forward search for a drift.
const PHYSICAL_ELEMENTS: [i32; 7] = [1, 3, 4, 5, 11, 18, 19];

/// Outcome of the preparation pass over one loaded file.
#[derive(Debug)]
pub struct Preparation {
    pub registry: Registry,
    /// Set when a `16. 14.` card redefines type code 6 from transform
    /// update to collimator; decided before any code-6 card is classified.
    pub code6_is_collimator: bool,
}

/// Classify every lattice line up to SENTINEL and build the registry.
pub fn prepare(file: &LoadedFile, dont_split: bool) -> TransportResult<Preparation> {
    let code6_is_collimator = scan_for_code6_redefinition(&file.lines);
    if code6_is_collimator {
        debug!("16. 14. found, type code 6 is treated as a collimator");
    }

    let mut registry = Registry::new();
    for (index, line) in file.lines.iter().enumerate() {
        if tokenizer::is_sentinel(&line.fields) {
            debug!(line = line.number, "SENTINEL found, stopping classification");
            break;
        }
        let code = line
            .fields
            .first()
            .and_then(|field| tokenizer::type_code_value(field));
        let Some(code) = code else {
            let reason = skip_reason(line);
            debug!(line = line.number, "skipping: {}", reason.as_str());
            continue;
        };
        if code <= 0.0 {
            debug!(
                line = line.number,
                "skipping: {}",
                SkipReason::NegativeOrZeroCode.as_str()
            );
            continue;
        }
        let record = classify(
            &file.lines,
            index,
            code,
            file.kind,
            code6_is_collimator,
            dont_split,
        )?;
        if let Some(record) = record {
            debug!(
                line = line.number,
                kind = record.kind.type_code().as_str(),
                "classified"
            );
            registry.push(record);
        }
    }
    Ok(Preparation {
        registry,
        code6_is_collimator,
    })
}

fn skip_reason(line: &SourceLine) -> SkipReason {
    let first = line.fields.first().map(String::as_str).unwrap_or("");
    if tokenizer::is_comment(&line.raw) {
        SkipReason::Comment
    } else if first.starts_with('S') {
        SkipReason::FittingRoutine
    } else if first.is_empty() {
        SkipReason::Blank
    } else {
        SkipReason::Unknown
    }
}

/// A `16. 14.` card anywhere before SENTINEL flips the meaning of type
/// code 6 for the whole file, so the decision is made up front.
fn scan_for_code6_redefinition(lines: &[SourceLine]) -> bool {
    for line in lines {
        if tokenizer::is_sentinel(&line.fields) {
            break;
        }
        let code = line
            .fields
            .first()
            .and_then(|field| tokenizer::type_code_value(field));
        if code == Some(16.0)
            && tokenizer::numeric_fields(&line.fields).first() == Some(&14.0)
        {
            return true;
        }
    }
    false
}

fn classify(
    lines: &[SourceLine],
    index: usize,
    code: f64,
    kind: FileKind,
    code6_is_collimator: bool,
    dont_split: bool,
) -> TransportResult<Option<ElementRecord>> {
    let line = &lines[index];
    let fields = &line.fields;
    let name = tokenizer::extract_label(fields);
    let data = tokenizer::numeric_fields(fields);
    let source = line.number;

    let record = match code as i32 {
        1 => {
            let card = beam_card(fields, kind, source)?;
            ElementRecord {
                kind: ElementKind::Beam(card),
                name,
                length: 0.0,
                is_zero_length: true,
                source_line: source,
            }
        }
        2 => ElementRecord {
            kind: ElementKind::PoleFace { data },
            name,
            length: 0.0,
            is_zero_length: true,
            source_line: source,
        },
        3 => {
            let length = *data.first().ok_or_else(|| {
                TransportError::input_validation("LATTICE.DRIFT", drift_no_length(source))
            })?;
            ElementRecord::physical(ElementKind::Drift, name, length, source)
        }
        4 => {
            let length = *data.first().ok_or_else(|| {
                TransportError::input_validation(
                    "LATTICE.DIPOLE",
                    format!("dipole on line {source} has no length field"),
                )
            })?;
            let (e1, e2) = face_rotation(lines, index);
            ElementRecord::physical(ElementKind::Dipole { data, e1, e2 }, name, length, source)
        }
        5 => magnet_record(ElementKind::Quadrupole { data: data.clone() }, &data, name, source, "quadrupole")?,
        6 => {
            if code6_is_collimator {
                collimator_record(lines, index, data, name, dont_split, code6_is_collimator)
            } else {
                ElementRecord::control(ElementKind::TransformUpdate, source)
            }
        }
        11 => {
            let length = *data.first().ok_or_else(|| {
                TransportError::input_validation(
                    "LATTICE.RF",
                    format!("acceleration element on line {source} has no fields"),
                )
            })?;
            ElementRecord::physical(ElementKind::Acceleration { data }, name, length, source)
        }
        12 => {
            let previous_code = index
                .checked_sub(1)
                .and_then(|prev| lines[prev].fields.first())
                .and_then(|field| tokenizer::type_code_value(field))
                .map(|value| value as i32);
            let is_addition = is_addition(fields, FileKind::Input);
            ElementRecord {
                kind: ElementKind::BeamCorrection {
                    data,
                    is_addition,
                    previous_code,
                },
                name,
                length: 0.0,
                is_zero_length: true,
                source_line: source,
            }
        }
        13 => ElementRecord::control(ElementKind::PrintControl { data }, source),
        15 => {
            let mark = data.first().copied().unwrap_or(0.0);
            let label = match kind {
                FileKind::Output => fields
                    .get(2)
                    .map(|field| field.trim_matches('"').to_string())
                    .unwrap_or_default(),
                FileKind::Input => name.clone().unwrap_or_default(),
            };
            ElementRecord::control(ElementKind::UnitChange { mark, label }, source)
        }
        16 => ElementRecord::control(ElementKind::SpecialInput { data }, source),
        18 => magnet_record(ElementKind::Sextupole { data: data.clone() }, &data, name, source, "sextupole")?,
        19 => magnet_record(ElementKind::Solenoid { data: data.clone() }, &data, name, source, "solenoid")?,
        20 => {
            let angle = data.first().copied().unwrap_or(0.0);
            ElementRecord::control(ElementKind::BendDirection { angle }, source)
        }
        other => match TypeCode::from_code_number(other) {
            Some(code) => ElementRecord::control(ElementKind::Ignored { code }, source),
            None => {
                debug!(line = source, code = other, "unknown type code, ignoring line");
                return Ok(None);
            }
        },
    };
    Ok(Some(record))
}

fn drift_no_length(source: usize) -> String {
    format!("drift on line {source} has no length field")
}

fn magnet_record(
    kind: ElementKind,
    data: &[f64],
    name: Option<String>,
    source: usize,
    what: &str,
) -> TransportResult<ElementRecord> {
    let length = *data.first().ok_or_else(|| {
        TransportError::input_validation(
            "LATTICE.MAGNET",
            format!("{what} on line {source} has no length field"),
        )
    })?;
    Ok(ElementRecord::physical(kind, name, length, source))
}

fn beam_card(fields: &[String], kind: FileKind, source: usize) -> TransportResult<BeamCard> {
    // Output echoes carry one extra leading field after the type code.
    let offset = match kind {
        FileKind::Input => 0,
        FileKind::Output => 1,
    };
    if fields.len() < 8 + offset {
        return Err(TransportError::input_validation(
            "LATTICE.BEAM",
            format!("incorrect number of beam parameters on line {source}"),
        ));
    }
    let value = |position: usize| -> TransportResult<f64> {
        fields[position + offset].parse::<f64>().map_err(|_| {
            TransportError::input_validation(
                "LATTICE.BEAM",
                format!(
                    "beam parameter {:?} on line {source} is not numeric",
                    fields[position + offset]
                ),
            )
        })
    };
    Ok(BeamCard {
        sigma_x: value(1)?,
        sigma_xp: value(2)?,
        sigma_y: value(3)?,
        sigma_yp: value(4)?,
        sigma_t: value(5)?,
        sigma_e: value(6)?,
        momentum: value(7)?,
        is_addition: is_addition(fields, kind),
    })
}

/// An r.m.s. addition reuses the beam card layout. Input decks flag it
/// with a ninth field of `0`; output echoes are fixed-format and an
/// addition line is always exactly ten fields long.
fn is_addition(fields: &[String], kind: FileKind) -> bool {
    match kind {
        FileKind::Output => fields.len() == 10,
        FileKind::Input => {
            fields.len() > 8 && matches!(fields[8].as_str(), "0." | "0")
        }
    }
}

/// Pole-face rotations for a dipole: search up to five lines either side
/// for a type-2 card, stopping early at another dipole or a non-numeric
/// line. Angles are rounded to four decimal places.
fn face_rotation(lines: &[SourceLine], index: usize) -> (f64, f64) {
    let backward = lines[index.saturating_sub(POLE_FACE_SEARCH_WINDOW)..index]
        .iter()
        .rev();
    let forward = lines[index + 1..lines.len().min(index + 1 + POLE_FACE_SEARCH_WINDOW)].iter();
    (window_angle(backward), window_angle(forward))
}

fn window_angle<'a>(window: impl Iterator<Item = &'a SourceLine>) -> f64 {
    for line in window {
        let Some(code) = line
            .fields
            .first()
            .and_then(|field| tokenizer::type_code_value(field))
        else {
            return 0.0;
        };
        if code == 4.0 {
            return 0.0;
        }
        if code == 2.0 {
            let angle = line
                .fields
                .get(1)
                .and_then(|field| field.parse::<f64>().ok())
                .or_else(|| line.fields.get(2).and_then(|field| field.parse::<f64>().ok()))
                .unwrap_or(0.0);
            return (angle * 1.0e4).round() / 1.0e4;
        }
    }
    0.0
}

/// Collimators are zero length in TRANSPORT; use the length of the next
/// drift when one follows before any other physical element. The drift
/// itself is suppressed later in the conversion pass.
fn collimator_record(
    lines: &[SourceLine],
    index: usize,
    data: Vec<f64>,
    name: Option<String>,
    dont_split: bool,
    code6_is_collimator: bool,
) -> ElementRecord {
    let source = lines[index].number;
    let mut length = 0.0;
    for next in &lines[index + 1..] {
        let Some(code) = next
            .fields
            .first()
            .and_then(|field| tokenizer::type_code_value(field))
        else {
            continue;
        };
        let code = code as i32;
        if code == 3 {
            if let Some(next_length) = tokenizer::numeric_fields(&next.fields).first() {
                length = *next_length;
            }
            break;
        }
        if PHYSICAL_ELEMENTS.contains(&code) {
            // beam redefinitions split the machine, so they only end the
            // search when splitting is permitted
            if code == 1 && dont_split {
                continue;
            }
            if code == 6 && !code6_is_collimator {
                continue;
            }
            break;
        }
    }
    ElementRecord {
        kind: ElementKind::Collimator { data },
        name,
        length,
        is_zero_length: length == 0.0,
        source_line: source,
    }
}
