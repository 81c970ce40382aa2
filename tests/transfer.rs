use std::collections::HashSet;
use std::net::{SocketAddr, UdpSocket};
use std::sync::{Arc, Mutex};
use std::thread;

use rft::{Endpoint, PAYLOAD_MAX};

// Just enough of the wire format for the relay to classify frames.
const FLAGS_OFFSET: usize = 12;
const SYN: u8 = 0x1;
const DAT: u8 = 0x0;

fn frame_flags(frame: &[u8]) -> u8 {
    frame[FLAGS_OFFSET]
}

fn frame_seq(frame: &[u8]) -> u32 {
    u32::from_le_bytes(frame[0..4].try_into().unwrap())
}

/* A datagram relay standing between sender and receiver. Every
 * sender-to-receiver frame is shown to `drop_forward`; returning true drops
 * it on the floor, everything else is forwarded unchanged. The reverse path
 * is lossless. */
fn lossy_relay(
    receiver: SocketAddr,
    mut drop_forward: Box<dyn FnMut(&[u8]) -> bool + Send>,
) -> SocketAddr {
    let front = UdpSocket::bind("127.0.0.1:0").unwrap();
    let back = UdpSocket::bind("127.0.0.1:0").unwrap();
    let front_addr = front.local_addr().unwrap();

    let sender_addr = Arc::new(Mutex::new(None::<SocketAddr>));

    let forward = {
        let front = front.try_clone().unwrap();
        let back = back.try_clone().unwrap();
        let sender_addr = sender_addr.clone();
        move || {
            let mut buf = [0u8; 2048];
            loop {
                let Ok((n, from)) = front.recv_from(&mut buf) else {
                    return;
                };
                *sender_addr.lock().unwrap() = Some(from);
                if drop_forward(&buf[..n]) {
                    continue;
                }
                if back.send_to(&buf[..n], receiver).is_err() {
                    return;
                }
            }
        }
    };
    thread::spawn(forward);

    let reverse = move || {
        let mut buf = [0u8; 2048];
        loop {
            let Ok((n, _)) = back.recv_from(&mut buf) else {
                return;
            };
            let Some(to) = *sender_addr.lock().unwrap() else {
                continue;
            };
            if front.send_to(&buf[..n], to).is_err() {
                return;
            }
        }
    };
    thread::spawn(reverse);

    front_addr
}

fn exchange(data: Vec<u8>, drop_forward: Option<Box<dyn FnMut(&[u8]) -> bool + Send>>) -> Vec<u8> {
    let mut receiver = Endpoint::bind("127.0.0.1:0").unwrap();
    let raddr = receiver.local_addr().unwrap();

    let target = match drop_forward {
        Some(f) => lossy_relay(raddr, f),
        None => raddr,
    };

    let passive = thread::spawn(move || {
        receiver.accept().unwrap();
        let delivered = receiver.recv().unwrap();
        receiver.wait_close().unwrap();
        delivered
    });

    let mut sender = Endpoint::bind("127.0.0.1:0").unwrap();
    sender.connect(target).unwrap();
    sender.send(&data).unwrap();
    sender.close().unwrap();

    passive.join().unwrap()
}

#[test]
fn short_file_lossless() {
    let data: Vec<u8> = (0..100u8).collect();
    assert_eq!(exchange(data.clone(), None), data);
}

#[test]
fn multi_segment_lossless() {
    // 5000 bytes: three full segments plus a 617-byte tail.
    let data: Vec<u8> = (0..5000).map(|i| (i * 7 % 256) as u8).collect();
    assert_eq!(exchange(data.clone(), None), data);
}

#[test]
fn empty_file() {
    assert_eq!(exchange(Vec::new(), None), Vec::<u8>::new());
}

#[test]
fn lost_data_segment_is_recovered() {
    let data: Vec<u8> = (0..10 * PAYLOAD_MAX).map(|i| (i % 253) as u8).collect();

    // Swallow the first transmission of the fifth distinct data segment;
    // later copies (fast retransmit or an RTO flush) pass through.
    let mut seen = HashSet::new();
    let drop_fifth: Box<dyn FnMut(&[u8]) -> bool + Send> = Box::new(move |frame| {
        if frame_flags(frame) != DAT {
            return false;
        }
        let seq = frame_seq(frame);
        if seen.contains(&seq) {
            return false;
        }
        seen.insert(seq);
        seen.len() == 5
    });

    assert_eq!(exchange(data.clone(), Some(drop_fifth)), data);
}

#[test]
fn lost_first_syn_is_retried() {
    let data = vec![0xA5];

    let mut dropped = false;
    let drop_syn: Box<dyn FnMut(&[u8]) -> bool + Send> = Box::new(move |frame| {
        if frame_flags(frame) == SYN && !dropped {
            dropped = true;
            return true;
        }
        false
    });

    assert_eq!(exchange(data.clone(), Some(drop_syn)), data);
}
