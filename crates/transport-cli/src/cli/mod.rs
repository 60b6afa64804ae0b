mod commands;

use clap::Parser;
use transport_core::domain::TransportError;

pub fn run_from_env() -> i32 {
    let args: Vec<String> = std::env::args().collect();
    match parse_and_dispatch(args) {
        Ok(code) => code,
        Err(error) => {
            let transport_error = error.as_transport_error();
            eprintln!("{}", transport_error.diagnostic_line());
            if let Some(summary_line) = transport_error.fatal_exit_line() {
                eprintln!("{}", summary_line);
            }
            transport_error.exit_code()
        }
    }
}

fn parse_and_dispatch(args: Vec<String>) -> Result<i32, CliError> {
    match Cli::try_parse_from(&args) {
        Ok(cli) => commands::run_convert_command(cli.convert),
        Err(err) => match err.kind() {
            clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion => {
                print!("{}", err);
                Ok(0)
            }
            _ => Err(CliError::Usage(err.to_string())),
        },
    }
}

#[derive(Parser)]
#[command(
    name = "transport-convert",
    about = "Convert TRANSPORT lattice files to BDSIM gmad and MAD-X"
)]
struct Cli {
    #[command(flatten)]
    convert: commands::ConvertArgs,
}

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("{0}")]
    Usage(String),
    #[error("{0}")]
    Convert(TransportError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl CliError {
    fn as_transport_error(&self) -> TransportError {
        match self {
            Self::Usage(message) => {
                TransportError::input_validation("INPUT.CLI_USAGE", message.clone())
            }
            Self::Convert(error) => error.clone(),
            Self::Internal(error) => TransportError::io_system("IO.CLI", format!("{error:#}")),
        }
    }
}
