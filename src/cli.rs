use clap::error::ErrorKind;
use clap::Parser;
use std::path::PathBuf;

/// Configuration file used when none is given on the command line.
pub const DEFAULT_CONFIG_PATH: &str = "tests/test-configs/test.conf";

#[derive(Parser, Debug)]
#[command(name = "webserv")]
#[command(about = "Event-driven HTTP/1.1 origin server", long_about = None)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(value_name = "config_path", default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,
}

/// Parse the command line. Usage errors print to stderr and exit 1;
/// `--help`/`--version` print and exit 0.
pub fn parse_args() -> Cli {
    match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
                _ => 1,
            };
            let _ = e.print();
            std::process::exit(code);
        }
    }
}
