//! Fit-result reconciliation for TRANSPORT output files.
//!
//! When the fitting routine has varied element parameters, the optics
//! output carries starred rows (`*DRIFT*`, `*QUAD*`, `*BEND*`) with the
//! fitted values. Those rows form a second registry; named rows are then
//! matched back onto lattice elements by (name, rounded start S) and the
//! fitted length and field overwrite the echoed card's values.

use tracing::debug;

use crate::domain::{ElementKind, ElementRecord, TypeCode};
use crate::registry::{round_s, Registry};
use crate::tokenizer;

fn starred_code(field: &str) -> Option<TypeCode> {
    match field {
        "*DRIFT*" => Some(TypeCode::Drift),
        "*QUAD*" => Some(TypeCode::Quadrupole),
        "*BEND*" => Some(TypeCode::Dipole),
        _ => None,
    }
}

/// Build a registry from the starred fit rows. Only named rows become
/// records; anonymous ones still advance the running length so that start
/// positions of later named rows line up with the element registry.
pub fn build_fit_registry(fit_rows: &[Vec<String>]) -> Registry {
    let mut registry = Registry::new();
    for row in fit_rows {
        let Some(first) = row.first() else { continue };
        let Some(code) = starred_code(first) else {
            continue;
        };
        // First numeric value repeats the type code; the payload follows.
        let numerics = tokenizer::numeric_fields(row);
        if numerics.len() < 2 {
            continue;
        }
        let data = numerics[1..].to_vec();
        let length = data[0];
        let name = tokenizer::extract_label(row);
        match name {
            Some(name) if !name.is_empty() => {
                let kind = match code {
                    TypeCode::Drift => ElementKind::Drift,
                    TypeCode::Quadrupole => ElementKind::Quadrupole { data },
                    _ => ElementKind::Dipole {
                        data,
                        e1: 0.0,
                        e2: 0.0,
                    },
                };
                registry.push(ElementRecord::physical(kind, Some(name), length, 0));
            }
            _ => registry.advance_length(length),
        }
    }
    registry
}

/// Overwrite echoed element parameters with their fitted values. Matching
/// is by name and five-decimal-rounded start position; zero-length
/// elements never match.
pub fn reconcile(registry: &mut Registry, fits: &Registry) {
    for name in fits.unique_names() {
        let fit_indices = fits.indices_of(&name);
        let ele_indices = registry.indices_of(&name);
        for fit_index in fit_indices {
            let Some(fit_start) = fits.start_position(fit_index) else {
                continue;
            };
            for &ele_index in &ele_indices {
                let Some(ele_start) = registry.start_position(ele_index) else {
                    continue;
                };
                let zero_length = registry
                    .get(ele_index)
                    .map(|record| record.is_zero_length)
                    .unwrap_or(true);
                if round_s(ele_start) != round_s(fit_start) || zero_length {
                    continue;
                }
                let fit = fits.get(fit_index).cloned();
                if let Some(fit) = fit {
                    apply_fit(registry, ele_index, &fit);
                }
                break;
            }
        }
    }
}

fn apply_fit(registry: &mut Registry, index: usize, fit: &ElementRecord) {
    match &fit.kind {
        ElementKind::Drift => update_length(registry, index, fit.length),
        ElementKind::Quadrupole { data: fit_data } | ElementKind::Dipole { data: fit_data, .. } => {
            if let Some(record) = registry.get_mut(index) {
                let data = match &mut record.kind {
                    ElementKind::Quadrupole { data } => Some(data),
                    ElementKind::Dipole { data, .. } => Some(data),
                    _ => None,
                };
                if let Some(data) = data {
                    if data.len() > 1 && fit_data.len() > 1 && data[1] != fit_data[1] {
                        debug!(
                            index,
                            old = data[1],
                            new = fit_data[1],
                            "field updated from fitting"
                        );
                        data[1] = fit_data[1];
                    }
                    if !data.is_empty() && !fit_data.is_empty() {
                        data[0] = fit_data[0];
                    }
                }
            }
            update_length(registry, index, fit.length);
        }
        _ => {}
    }
}

fn update_length(registry: &mut Registry, index: usize, new_length: f64) {
    let unchanged = registry
        .get(index)
        .map(|record| record.length == new_length)
        .unwrap_or(true);
    if !unchanged {
        debug!(index, new_length, "length updated from fitting");
        registry.update_length(index, new_length);
    }
}
