pub(crate) const SYN: u8 = 0b0001;
pub(crate) const ACK: u8 = 0b0010;
pub(crate) const FIN: u8 = 0b0100;
pub(crate) const DAT: u8 = 0b0000;
pub(crate) const SYN_ACK: u8 = SYN | ACK;
pub(crate) const FIN_ACK: u8 = FIN | ACK;

pub const PAYLOAD_MAX: usize = 1461;
pub(crate) const HEADER_LEN: usize = 13;
pub(crate) const FRAME_MAX: usize = HEADER_LEN + PAYLOAD_MAX;

/*
Frame layout, little-endian, packed:

    offset  size  field
      0      4    seq_num             (low 30 bits used)
      4      2    length              (payload bytes; 0 on control frames)
      6      4    checksum            (CRC-32, computed with this field zeroed)
     10      2    advertised_window   (reserved constant; never read)
     12      1    flags
     13      ..   payload             (0..=PAYLOAD_MAX bytes)
*/

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Header {
    pub seq: u32,
    pub len: u16,
    pub checksum: u32,
    pub window: u16,
    pub flags: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Datagram {
    pub header: Header,
    pub payload: Vec<u8>,
}

fn put_header(frame: &mut [u8], seq: u32, len: u16, window: u16, flags: u8) {
    frame[0..4].copy_from_slice(&seq.to_le_bytes());
    frame[4..6].copy_from_slice(&len.to_le_bytes());
    frame[6..10].copy_from_slice(&0u32.to_le_bytes());
    frame[10..12].copy_from_slice(&window.to_le_bytes());
    frame[12] = flags;
}

pub(crate) fn seal_control(seq: u32, window: u16, flags: u8) -> Vec<u8> {
    let mut frame = vec![0u8; HEADER_LEN];
    put_header(&mut frame, seq, 0, window, flags);

    let crc = crc32fast::hash(&frame);
    frame[6..10].copy_from_slice(&crc.to_le_bytes());

    frame
}

pub(crate) fn seal_data(seq: u32, window: u16, payload: &[u8]) -> Vec<u8> {
    debug_assert!(payload.len() <= PAYLOAD_MAX);

    let mut frame = vec![0u8; HEADER_LEN + payload.len()];
    put_header(&mut frame, seq, payload.len() as u16, window, DAT);
    frame[HEADER_LEN..].copy_from_slice(payload);

    let crc = crc32fast::hash(&frame);
    frame[6..10].copy_from_slice(&crc.to_le_bytes());

    frame
}

/* A frame is accepted only if its size is plausible, the declared length
 * fits inside what actually arrived, and the CRC over exactly
 * `HEADER_LEN + length` bytes (checksum field zeroed) matches. Anything else
 * is reported as if nothing had arrived. Trailing bytes beyond the declared
 * length are ignored. */
pub(crate) fn open(frame: &[u8]) -> Option<Datagram> {
    if frame.len() < HEADER_LEN || frame.len() > FRAME_MAX {
        return None;
    }

    let header = Header {
        seq: u32::from_le_bytes(frame[0..4].try_into().ok()?),
        len: u16::from_le_bytes(frame[4..6].try_into().ok()?),
        checksum: u32::from_le_bytes(frame[6..10].try_into().ok()?),
        window: u16::from_le_bytes(frame[10..12].try_into().ok()?),
        flags: frame[12],
    };

    let covered_len = HEADER_LEN + header.len as usize;
    if header.len as usize > PAYLOAD_MAX || covered_len > frame.len() {
        return None;
    }

    let mut covered = frame[..covered_len].to_vec();
    covered[6..10].fill(0);
    if crc32fast::hash(&covered) != header.checksum {
        return None;
    }

    let payload = covered.split_off(HEADER_LEN);
    Some(Datagram { header, payload })
}

// For logging frames we sealed ourselves; `frame` is at least a header.
pub(crate) fn peek_seq_flags(frame: &[u8]) -> (u32, u8) {
    let seq = u32::from_le_bytes([frame[0], frame[1], frame[2], frame[3]]);
    (seq, frame[12])
}

pub(crate) fn flag_name(flags: u8) -> &'static str {
    match flags {
        SYN => "SYN",
        ACK => "ACK",
        FIN => "FIN",
        SYN_ACK => "SYN|ACK",
        FIN_ACK => "FIN|ACK",
        DAT => "DAT",
        _ => "?",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_frame_round_trips() {
        let frame = seal_control(0x3fff_fffe, 0, SYN_ACK);
        assert_eq!(frame.len(), HEADER_LEN);

        let dgram = open(&frame).unwrap();
        assert_eq!(dgram.header.seq, 0x3fff_fffe);
        assert_eq!(dgram.header.len, 0);
        assert_eq!(dgram.header.flags, SYN_ACK);
        assert!(dgram.payload.is_empty());
    }

    #[test]
    fn data_frame_round_trips() {
        let payload: Vec<u8> = (0..=255).cycle().take(PAYLOAD_MAX).map(|b| b as u8).collect();
        let frame = seal_data(42, 0, &payload);
        assert_eq!(frame.len(), FRAME_MAX);

        let dgram = open(&frame).unwrap();
        assert_eq!(dgram.header.seq, 42);
        assert_eq!(dgram.header.len as usize, PAYLOAD_MAX);
        assert_eq!(dgram.header.flags, DAT);
        assert_eq!(dgram.payload, payload);
    }

    #[test]
    fn every_single_bit_flip_is_rejected() {
        let frame = seal_data(7, 0, b"integrity matters");

        for byte in 0..frame.len() {
            for bit in 0..8 {
                let mut bad = frame.clone();
                bad[byte] ^= 1 << bit;
                assert!(open(&bad).is_none(), "flip at byte {byte} bit {bit} accepted");
            }
        }
    }

    #[test]
    fn undersized_and_oversized_frames_are_rejected() {
        let frame = seal_control(1, 0, ACK);
        assert!(open(&frame[..HEADER_LEN - 1]).is_none());
        assert!(open(&vec![0u8; FRAME_MAX + 1]).is_none());
    }

    #[test]
    fn length_beyond_received_bytes_is_rejected() {
        let mut frame = seal_data(9, 0, b"abcdef");
        // Declare more payload than arrived; checksum is irrelevant then.
        frame[4..6].copy_from_slice(&100u16.to_le_bytes());
        assert!(open(&frame).is_none());
    }

    #[test]
    fn trailing_bytes_after_declared_length_are_ignored() {
        let mut frame = seal_data(9, 0, b"abcdef");
        frame.extend_from_slice(b"\0\0junk");

        let dgram = open(&frame).unwrap();
        assert_eq!(dgram.payload, b"abcdef");
    }
}
