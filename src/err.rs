use std::io;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("no peer is bound to this connection")]
    NotConnected,

    #[error("short send: wrote {written} of {len} bytes")]
    ShortSend { written: usize, len: usize },

    #[error("handshake gave up after {0} SYN retransmissions")]
    ConnectFailed(u32),

    #[error("no connection was established within {0:?}")]
    AcceptTimeout(Duration),

    #[error("peer silent for {0:?} with unacked segments outstanding")]
    PeerGone(Duration),

    #[error("nothing received for {0:?} before end of stream")]
    ReceiveIdle(Duration),

    #[error("teardown did not complete within its time budget")]
    TeardownTimeout,
}
