use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::{error, info, warn};

use rft::{Endpoint, Error};

#[derive(Parser)]
#[command(about = "Send a file to a listening receiver")]
struct Args {
    /// Receiver address
    receiver_ip: Ipv4Addr,
    /// Receiver port
    receiver_port: u16,
    /// File to transmit
    file_path: PathBuf,
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("sender: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<(), Error> {
    let mut endpoint = Endpoint::bind("0.0.0.0:0")?;

    endpoint.connect(SocketAddr::from((args.receiver_ip, args.receiver_port)))?;
    info!("connected to {}:{}", args.receiver_ip, args.receiver_port);

    endpoint.send_file(&args.file_path)?;
    info!("file delivered");

    match endpoint.close() {
        Ok(()) => {}
        // The transfer has already completed; an unanswered FIN is not fatal.
        Err(Error::TeardownTimeout) => warn!("peer never acknowledged the FIN"),
        Err(e) => return Err(e),
    }

    Ok(())
}
