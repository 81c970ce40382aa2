use std::io;
use std::os::fd::AsRawFd;
use std::time::{Duration, Instant};

use log::{debug, trace};
use nix::poll::{poll, PollFd, PollFlags};

use super::wire::{self, Datagram, FIN, FRAME_MAX, SYN};
use super::{lift, Endpoint};
use crate::Error;

impl Endpoint {
    // A partial sendto is a hard failure, not something to retry.
    pub(crate) fn transmit(&self, frame: &[u8]) -> Result<(), Error> {
        let peer = self.peer.ok_or(Error::NotConnected)?;

        let written = self.sock.send_to(frame, peer)?;
        if written != frame.len() {
            return Err(Error::ShortSend {
                written,
                len: frame.len(),
            });
        }

        let (seq, flags) = wire::peek_seq_flags(frame);
        trace!("sent {} seq={}", wire::flag_name(flags), seq);

        Ok(())
    }

    /* Non-blocking receive of one datagram. Ok(None) means nothing usable
     * arrived: empty socket, undecodable frame, or a datagram from somewhere
     * other than the bound peer. Side effects of a valid frame: the first
     * well-formed SYN binds the peer, the first FIN records the
     * end-of-stream sequence, and every valid frame refreshes last_rx. */
    pub(crate) fn recv_frame(&mut self) -> Result<Option<Datagram>, Error> {
        let mut buf = [0u8; FRAME_MAX];

        let (n, from) = match self.sock.recv_from(&mut buf) {
            Ok(pair) => pair,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let Some(dgram) = wire::open(&buf[..n]) else {
            trace!("dropped undecodable {n}-byte datagram");
            return Ok(None);
        };

        match self.peer {
            Some(peer) => {
                if from != peer {
                    trace!(
                        "dropped {} from off-peer {from}",
                        wire::flag_name(dgram.header.flags)
                    );
                    return Ok(None);
                }

                if dgram.header.flags == FIN && self.fin_seen.is_none() {
                    let fin = lift(self.seq_base, dgram.header.seq);
                    debug!("peer announced end of stream at seq {fin}");
                    self.fin_seen = Some(fin);
                }
            }
            None => {
                if dgram.header.flags == SYN {
                    debug!("adopting {from} as peer");
                    self.peer = Some(from);
                }
            }
        }

        self.last_rx = Instant::now();
        trace!(
            "got {} seq={} len={} wnd={}",
            wire::flag_name(dgram.header.flags),
            dgram.header.seq,
            dgram.header.len,
            dgram.header.window
        );
        Ok(Some(dgram))
    }

    /* Block until a valid frame whose flag set equals `flags` exactly
     * arrives, or the deadline passes (Ok(None)). Valid frames with any
     * other flags are consumed and dropped. */
    pub(crate) fn wait_for(
        &mut self,
        flags: u8,
        timeout: Duration,
    ) -> Result<Option<Datagram>, Error> {
        let deadline = Instant::now() + timeout;

        loop {
            let left = deadline.saturating_duration_since(Instant::now());
            if left.is_zero() {
                return Ok(None);
            }

            let mut fds = [PollFd::new(self.sock.as_raw_fd(), PollFlags::POLLIN)];
            let ready = poll(&mut fds, left.as_millis() as i32).map_err(io::Error::from)?;
            if ready == 0 {
                return Ok(None);
            }

            if let Some(dgram) = self.recv_frame()? {
                if dgram.header.flags == flags {
                    return Ok(Some(dgram));
                }

                trace!(
                    "discarded {} while waiting for {}",
                    wire::flag_name(dgram.header.flags),
                    wire::flag_name(flags)
                );
            }
        }
    }
}
