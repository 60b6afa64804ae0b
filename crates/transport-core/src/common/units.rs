//! TRANSPORT unit environment.
//!
//! Units in a TRANSPORT deck are not per-card: a type-15 card rewrites the
//! unit for one quantity and the new unit applies to every subsequent card
//! until changed again. The table here is that mutable environment; the
//! prefix scale table is fixed.

use std::collections::HashMap;
use std::fmt::{Display, Formatter};

/// Quantities whose unit a type-15 card can rewrite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnitQuantity {
    X,
    Xp,
    Y,
    Yp,
    BunchLength,
    MomentumSpread,
    ElementLength,
    MagneticFields,
    PEgain,
    BendVertGap,
    PipeRad,
    BetaFunc,
    Emittance,
}

impl UnitQuantity {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::X => "x",
            Self::Xp => "xp",
            Self::Y => "y",
            Self::Yp => "yp",
            Self::BunchLength => "bunch_length",
            Self::MomentumSpread => "momentum_spread",
            Self::ElementLength => "element_length",
            Self::MagneticFields => "magnetic_fields",
            Self::PEgain => "p_egain",
            Self::BendVertGap => "bend_vert_gap",
            Self::PipeRad => "pipe_rad",
            Self::BetaFunc => "beta_func",
            Self::Emittance => "emittance",
        }
    }
}

impl Display for UnitQuantity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str((*self).as_str())
    }
}

/// Power-of-ten multiplier for a metric prefix character. Both cases of `k`
/// appear in the wild.
pub fn prefix_scale(prefix: char) -> Option<f64> {
    match prefix {
        'p' => Some(1.0e-12),
        'n' => Some(1.0e-9),
        'u' => Some(1.0e-6),
        'm' => Some(1.0e-3),
        'c' => Some(1.0e-2),
        'k' | 'K' => Some(1.0e3),
        'M' => Some(1.0e6),
        'G' => Some(1.0e9),
        'T' => Some(1.0e12),
        _ => None,
    }
}

/// Multiplier taking a value in `label` units to the base unit (metres for
/// lengths, Gauss-relative for fields, eV-relative for energies). A bare
/// base label (`m`, `eV`) scales by 1.
pub fn label_scale(label: &str) -> f64 {
    if label == "m" || label == "eV" {
        return 1.0;
    }
    label
        .chars()
        .next()
        .and_then(prefix_scale)
        .unwrap_or(1.0)
}

/// TRANSPORT unit-change labels arrive upper-cased in some decks.
pub fn normalize_label(label: &str) -> String {
    match label {
        "CM" | "MM" | "UM" | "NM" => label.to_ascii_lowercase(),
        "EV" => "eV".to_string(),
        "KEV" => "keV".to_string(),
        "MEV" => "MeV".to_string(),
        "GEV" => "GeV".to_string(),
        "TEV" => "TeV".to_string(),
        other => other.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnitTable {
    units: HashMap<UnitQuantity, String>,
}

impl Default for UnitTable {
    fn default() -> Self {
        let mut units = HashMap::new();
        units.insert(UnitQuantity::X, "cm".to_string());
        units.insert(UnitQuantity::Xp, "mrad".to_string());
        units.insert(UnitQuantity::Y, "cm".to_string());
        units.insert(UnitQuantity::Yp, "mrad".to_string());
        units.insert(UnitQuantity::BunchLength, "cm".to_string());
        units.insert(UnitQuantity::MomentumSpread, "pc".to_string());
        units.insert(UnitQuantity::ElementLength, "m".to_string());
        units.insert(UnitQuantity::MagneticFields, "kG".to_string());
        units.insert(UnitQuantity::PEgain, "GeV".to_string());
        units.insert(UnitQuantity::BendVertGap, "cm".to_string());
        units.insert(UnitQuantity::PipeRad, "cm".to_string());
        units.insert(UnitQuantity::BetaFunc, "m".to_string());
        units.insert(UnitQuantity::Emittance, "mm mrad".to_string());
        Self { units }
    }
}

impl UnitTable {
    pub fn unit(&self, quantity: UnitQuantity) -> &str {
        self.units
            .get(&quantity)
            .map(String::as_str)
            .unwrap_or("m")
    }

    pub fn set(&mut self, quantity: UnitQuantity, label: impl Into<String>) {
        self.units.insert(quantity, label.into());
    }

    /// Conversion factor from the active unit of `quantity` to metres.
    pub fn scale_to_metres(&self, quantity: UnitQuantity) -> f64 {
        label_scale(self.unit(quantity))
    }

    /// Apply a type-15 unit-change card. The mark selects the quantity per
    /// the TRANSPORT manual; marks 7 (pole face) and 10 (mass) have no
    /// supported conversion and are logged no-ops.
    pub fn apply_unit_change(&mut self, mark: f64, raw_label: &str) {
        let label = normalize_label(raw_label);
        match mark as i32 {
            1 => {
                self.set(UnitQuantity::X, label.clone());
                self.set(UnitQuantity::Y, label);
            }
            2 => {
                self.set(UnitQuantity::Xp, label.clone());
                self.set(UnitQuantity::Yp, label);
            }
            3 => self.set(UnitQuantity::BendVertGap, label),
            4 => self.set(UnitQuantity::Yp, label),
            5 => self.set(UnitQuantity::BunchLength, label),
            6 => self.set(UnitQuantity::MomentumSpread, label),
            7 => {
                tracing::warn!(label = %label, "pole-face rotation unit change is not supported");
            }
            8 => self.set(UnitQuantity::ElementLength, label),
            9 => self.set(UnitQuantity::MagneticFields, label),
            10 => {
                tracing::warn!("cannot change mass scale");
            }
            11 => self.set(UnitQuantity::PEgain, label),
            other => {
                tracing::warn!(mark = other, label = %label, "unrecognized unit-change mark");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{UnitQuantity, UnitTable, label_scale, normalize_label, prefix_scale};

    #[test]
    fn prefix_table_matches_transport_powers_of_ten() {
        assert_eq!(prefix_scale('p'), Some(1.0e-12));
        assert_eq!(prefix_scale('c'), Some(1.0e-2));
        assert_eq!(prefix_scale('k'), Some(1.0e3));
        assert_eq!(prefix_scale('K'), Some(1.0e3));
        assert_eq!(prefix_scale('T'), Some(1.0e12));
        assert_eq!(prefix_scale('x'), None);
    }

    #[test]
    fn base_labels_scale_by_one() {
        assert_eq!(label_scale("m"), 1.0);
        assert_eq!(label_scale("eV"), 1.0);
        assert_eq!(label_scale("cm"), 1.0e-2);
        assert_eq!(label_scale("kG"), 1.0e3);
        assert_eq!(label_scale("GeV"), 1.0e9);
    }

    #[test]
    fn default_table_matches_transport_defaults() {
        let table = UnitTable::default();
        assert_eq!(table.unit(UnitQuantity::X), "cm");
        assert_eq!(table.unit(UnitQuantity::Xp), "mrad");
        assert_eq!(table.unit(UnitQuantity::ElementLength), "m");
        assert_eq!(table.unit(UnitQuantity::MagneticFields), "kG");
        assert_eq!(table.unit(UnitQuantity::PEgain), "GeV");
        assert_eq!(table.scale_to_metres(UnitQuantity::ElementLength), 1.0);
        assert_eq!(table.scale_to_metres(UnitQuantity::X), 1.0e-2);
    }

    #[test]
    fn unit_changes_are_environment_sticky() {
        let mut table = UnitTable::default();
        table.apply_unit_change(8.0, "MM");
        assert_eq!(table.unit(UnitQuantity::ElementLength), "mm");
        assert_eq!(table.scale_to_metres(UnitQuantity::ElementLength), 1.0e-3);

        // remains until the next change
        assert_eq!(table.unit(UnitQuantity::ElementLength), "mm");
        table.apply_unit_change(8.0, "m");
        assert_eq!(table.scale_to_metres(UnitQuantity::ElementLength), 1.0);
    }

    #[test]
    fn mark_one_sets_both_transverse_planes() {
        let mut table = UnitTable::default();
        table.apply_unit_change(1.0, "mm");
        assert_eq!(table.unit(UnitQuantity::X), "mm");
        assert_eq!(table.unit(UnitQuantity::Y), "mm");
        table.apply_unit_change(4.0, "urad");
        assert_eq!(table.unit(UnitQuantity::Yp), "urad");
        assert_eq!(table.unit(UnitQuantity::Xp), "mrad");
    }

    #[test]
    fn energy_labels_are_normalized_from_upper_case() {
        assert_eq!(normalize_label("EV"), "eV");
        assert_eq!(normalize_label("MEV"), "MeV");
        assert_eq!(normalize_label("GEV"), "GeV");
        assert_eq!(normalize_label("CM"), "cm");
        assert_eq!(normalize_label("mrad"), "mrad");
    }
}
