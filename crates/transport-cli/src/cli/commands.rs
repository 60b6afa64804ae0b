use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::Once;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use super::CliError;
use transport_core::convert::{convert_file, ConversionReport};
use transport_core::domain::{ConversionConfig, DistrType, ParticleSpecies};

#[derive(clap::Args)]
pub(super) struct ConvertArgs {
    /// TRANSPORT input deck or standard output file
    input: PathBuf,

    /// Beam particle: proton, e- or e+
    #[arg(long, default_value = "proton")]
    particle: String,

    /// Beam distribution: gauss or gausstwiss
    #[arg(long, default_value = "gauss")]
    distr_type: String,

    /// Write a BDSIM gmad lattice (the default when no format is selected)
    #[arg(long)]
    gmad: bool,

    /// gmad output directory
    #[arg(long, default_value = "gmad")]
    gmad_dir: PathBuf,

    /// Write a MAD-X lattice
    #[arg(long)]
    madx: bool,

    /// MAD-X output directory
    #[arg(long, default_value = "madx")]
    madx_dir: PathBuf,

    /// Keep everything in one machine even when the beam is redefined
    #[arg(long)]
    dont_split: bool,

    /// Keep original element labels instead of generated names
    #[arg(long)]
    keep_name: bool,

    /// Merge runs of consecutive drifts into single elements
    #[arg(long)]
    combine_drifts: bool,

    /// Write a plain-text conversion log next to the input file
    #[arg(long)]
    outlog: bool,

    /// Verbose conversion logging
    #[arg(long)]
    debug: bool,
}

static INIT_TRACING: Once = Once::new();

fn init_tracing(debug: bool) {
    INIT_TRACING.call_once(|| {
        let default_directive = if debug { "debug" } else { "info" };
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_directive));
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    });
}

pub(super) fn run_convert_command(args: ConvertArgs) -> Result<i32, CliError> {
    init_tracing(args.debug);

    let particle = ParticleSpecies::from_name(&args.particle).ok_or_else(|| {
        CliError::Usage(format!(
            "unknown particle '{}', expected proton, e- or e+",
            args.particle
        ))
    })?;
    let distr_type = DistrType::from_name(&args.distr_type).ok_or_else(|| {
        CliError::Usage(format!(
            "unknown distribution '{}', expected gauss or gausstwiss",
            args.distr_type
        ))
    })?;

    let config = ConversionConfig {
        particle,
        distr_type,
        gmad: args.gmad || !args.madx,
        gmad_dir: args.gmad_dir,
        madx: args.madx,
        madx_dir: args.madx_dir,
        dont_split: args.dont_split,
        keep_name: args.keep_name,
        combine_drifts: args.combine_drifts,
    };

    let report = convert_file(&args.input, &config).map_err(CliError::Convert)?;
    info!(
        parts = report.machine_parts,
        warnings = report.warnings.len(),
        "conversion finished"
    );

    if args.outlog {
        write_conversion_log(&args.input, &report)?;
    }

    let json = serde_json::to_string_pretty(&report)
        .context("conversion report serialization failed")?;
    println!("{json}");

    Ok(0)
}

/// Human-readable record of the run, written as `<input stem>_conversion.log`
/// in the input file's directory.
fn write_conversion_log(input: &PathBuf, report: &ConversionReport) -> Result<(), CliError> {
    let mut text = String::new();
    let _ = writeln!(text, "input: {}", report.input.display());
    let _ = writeln!(text, "file kind: {}", report.file_kind);
    let _ = writeln!(text, "machine parts: {}", report.machine_parts);
    for (kind, count) in &report.element_counts {
        let _ = writeln!(text, "  {kind}: {count}");
    }
    for output in &report.outputs {
        let _ = writeln!(text, "written: {}", output.display());
    }
    for warning in &report.warnings {
        let _ = writeln!(text, "warning: {warning}");
    }

    let stem = input
        .file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_else(|| "conversion".to_string());
    let log_path = input.with_file_name(format!("{stem}_conversion.log"));
    std::fs::write(&log_path, text)
        .with_context(|| format!("cannot write {}", log_path.display()))?;
    Ok(())
}
