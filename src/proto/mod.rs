use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::time::{Duration, Instant};

use crate::Error;

mod conn;
mod io;
mod recv;
mod send;
mod wire;

pub use wire::PAYLOAD_MAX;

use send::Reno;

/* Timing budgets. Handshake and teardown retry in 100 ms steps inside 5 s
 * budgets; the data plane uses short waits so that sending, the retransmit
 * timer, and ACK reception interleave on a single thread. */
pub(crate) const HANDSHAKE_STEP: Duration = Duration::from_millis(100);
pub(crate) const MAX_SYN_RETRIES: u32 = 50;
pub(crate) const HANDSHAKE_BUDGET: Duration = Duration::from_secs(5);
pub(crate) const TEARDOWN_BUDGET: Duration = Duration::from_secs(5);
pub(crate) const QUIET_PERIOD: Duration = Duration::from_secs(2);
pub(crate) const RTO: Duration = Duration::from_millis(200);
pub(crate) const ACK_WAIT: Duration = Duration::from_millis(5);
pub(crate) const DATA_WAIT: Duration = Duration::from_millis(5);
pub(crate) const SENDER_IDLE: Duration = Duration::from_secs(5);
pub(crate) const RECEIVER_IDLE: Duration = Duration::from_secs(10);

/* On the wire a sequence number occupies the low 30 bits and wraps.
 * Internally every sequence is lifted into a monotonic 64-bit space anchored
 * at the connection's initial sequence number: any wire value below the
 * anchor belongs to the next lap of the 30-bit space. The anchor is
 * unambiguous only while a connection spans fewer than SEQ_HALF wire values. */
pub(crate) const SEQ_SPACE: u64 = 1 << 30;
pub(crate) const SEQ_HALF: u64 = 1 << 29;

pub(crate) fn lift(base: u64, seq: u32) -> u64 {
    if (seq as u64) < base {
        seq as u64 + SEQ_SPACE
    } else {
        seq as u64
    }
}

pub(crate) fn project(seq: u64) -> u32 {
    (seq % SEQ_SPACE) as u32
}

pub(crate) fn inc_seq(seq: u32) -> u32 {
    project(seq as u64 + 1)
}

pub(crate) fn dec_seq(seq: u32) -> u32 {
    if seq == 0 {
        (SEQ_SPACE - 1) as u32
    } else {
        seq - 1
    }
}

pub struct Endpoint {
    pub(crate) sock: UdpSocket,
    pub(crate) peer: Option<SocketAddr>,

    // Lift anchor and next-to-be-assigned stream boundary, both 64-bit.
    pub(crate) seq_base: u64,
    pub(crate) seq_cursor: u64,

    // Sequence carried by the first FIN seen from the peer, lifted.
    pub(crate) fin_seen: Option<u64>,

    pub(crate) last_rx: Instant,
    pub(crate) reno: Reno,
}

impl Endpoint {
    pub fn bind(addr: impl ToSocketAddrs) -> Result<Self, Error> {
        let sock = UdpSocket::bind(addr)?;
        sock.set_nonblocking(true)?;

        Ok(Endpoint {
            sock,
            peer: None,
            seq_base: 0,
            seq_cursor: 0,
            fin_seen: None,
            last_rx: Instant::now(),
            reno: Reno::new(),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, Error> {
        Ok(self.sock.local_addr()?)
    }
}
