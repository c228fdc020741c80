//! CLI argument parsing for the reader
//!
//! Command-line values override the `[session]` table of the config file.

use clap::Parser;

/// Arguments for the reader binary
#[derive(Parser, Debug, Clone)]
#[command(name = "reader", about = "Poll capacitive sensors over a serial link")]
pub struct ReaderArgs {
    /// Path to configuration file (defaults are used when omitted)
    #[arg(short = 'f', long = "config")]
    pub config_file: Option<String>,

    /// Serial port path (e.g., /dev/ttyACM0)
    #[arg(long, conflicts_with = "port_index")]
    pub port: Option<String>,

    /// Index into the list printed by --list-ports
    #[arg(long = "port-index")]
    pub port_index: Option<usize>,

    /// Talk to an in-process emulated peripheral instead of a serial port
    #[arg(long)]
    pub emulate: bool,

    /// Emulator RNG seed
    #[arg(long, requires = "emulate")]
    pub seed: Option<u64>,

    /// Print the available serial ports and exit
    #[arg(long = "list-ports")]
    pub list_ports: bool,

    /// Print every measurement as a JSON line on stdout
    #[arg(long)]
    pub json: bool,

    /// Sensor pin to poll with default settings (repeatable; used when the
    /// config lists no sensors)
    #[arg(short = 's', long = "sensor", action = clap::ArgAction::Append)]
    pub sensors: Vec<u16>,
}
