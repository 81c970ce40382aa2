use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::{debug, error, info};

use rft::{Endpoint, Error};

#[derive(Parser)]
#[command(about = "Receive a single file and write it to disk")]
struct Args {
    /// Port to listen on
    listen_port: u16,
    /// Where to write the received file
    file_path: PathBuf,
    /// Receive window size (accepted for compatibility)
    window_size: u32,
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("receiver: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<(), Error> {
    debug!("ignoring window-size argument {}", args.window_size);

    let mut endpoint = Endpoint::bind(("0.0.0.0", args.listen_port))?;
    info!("listening on port {}", args.listen_port);

    endpoint.accept()?;
    endpoint.recv_file(&args.file_path)?;
    info!("file written to {}", args.file_path.display());

    endpoint.wait_close()?;

    Ok(())
}
