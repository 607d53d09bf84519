use std::path::Path;
use std::process;

use tracing::{error, info};

use webserv::server::{signal, Server};
use webserv::{cli, logging};

fn main() {
    let args = cli::parse_args();

    if let Err(e) = logging::init(Path::new(logging::DEFAULT_LOG_PATH)) {
        eprintln!("webserv: logger initialisation failed: {e:#}");
        process::exit(1);
    }
    signal::install();

    let code = match Server::new(&args.config) {
        Ok(mut server) => match server.run() {
            Ok(()) => {
                info!("Server stopped");
                0
            }
            Err(e) => {
                error!(error = %format!("{e:#}"), "Server terminated abnormally");
                1
            }
        },
        Err(e) => {
            error!(error = %format!("{e:#}"), "Startup failed");
            1
        }
    };

    logging::shutdown();

    let received = signal::received_signal();
    if received != 0 {
        process::exit(128 + received);
    }
    process::exit(code);
}
