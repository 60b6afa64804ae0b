//! Physical constants shared across the conversion kernels.
//!
//! TRANSPORT works in GeV and natural units with c folded into the eV
//! scaling, so only a handful of SI values are needed.

pub const PI: f64 = std::f64::consts::PI;
/// Speed of light in m/s; divides eV-scaled momentum to give brho in Tm.
pub const C_LIGHT: f64 = 299_792_458.0;
pub const DEG2RAD: f64 = PI / 180.0;
pub const RAD2DEG: f64 = 180.0 / PI;
/// Tesla per Gauss.
pub const GAUSS2TESLA: f64 = 1.0e-4;
/// eV per GeV, the scale TRANSPORT's default momentum unit sits at.
pub const EV_PER_GEV: f64 = 1.0e9;
