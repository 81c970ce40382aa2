use std::fs;
use std::path::Path;

mod err;
pub use err::*;

mod proto;
pub use proto::{Endpoint, PAYLOAD_MAX};

impl Endpoint {
    /* The engine itself moves byte streams; reading the input file into
     * memory and writing the delivered bytes out again happen here, outside
     * the protocol loops. */

    pub fn send_file(&mut self, path: impl AsRef<Path>) -> Result<(), Error> {
        let data = fs::read(path)?;
        self.send(&data)
    }

    pub fn recv_file(&mut self, path: impl AsRef<Path>) -> Result<(), Error> {
        let data = self.recv()?;
        fs::write(path, data)?;
        Ok(())
    }
}
