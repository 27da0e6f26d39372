//! Header framing and acknowledgement for one file transfer.
//!
//! A header is a length-prefixed name followed by a fixed-width size, so a
//! name can never be mistaken for a second header.

use crate::error::{Error, Result};
use crate::protocol::{ACK, MAX_FILE_SIZE, NAME_LEN_FIELD, SIZE_FIELD};
use std::io::{self, Read, Write};

/// Identity and length of the body that follows on the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHeader {
    pub name: String,
    pub size: u64,
}

impl FileHeader {
    pub fn new(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            size,
        }
    }
}

/// Build the wire bytes for a header.
pub fn encode_header(name: &str, size: u64) -> Result<Vec<u8>> {
    let name_len = u32::try_from(name.len())
        .map_err(|_| Error::protocol(format!("name of {} bytes does not fit", name.len())))?;
    if size > MAX_FILE_SIZE {
        return Err(Error::protocol(format!(
            "size {} exceeds the 32-bit size field",
            size
        )));
    }
    let mut buf = Vec::with_capacity(NAME_LEN_FIELD + name.len() + SIZE_FIELD);
    buf.extend_from_slice(&name_len.to_le_bytes());
    buf.extend_from_slice(name.as_bytes());
    buf.extend_from_slice(&(size as u32).to_le_bytes());
    Ok(buf)
}

pub fn write_header<W: Write>(w: &mut W, header: &FileHeader) -> Result<()> {
    let bytes = encode_header(&header.name, header.size)?;
    w.write_all(&bytes)?;
    Ok(())
}

/// Read one header.
///
/// End of stream before the first byte is `ConnectionClosed` (the peer is
/// done); end of stream anywhere later is a truncated header.
pub fn decode_header<R: Read>(r: &mut R) -> Result<FileHeader> {
    let mut len_buf = [0u8; NAME_LEN_FIELD];
    fill(r, &mut len_buf, true, "name length")?;
    let name_len = u32::from_le_bytes(len_buf) as u64;
    if name_len == 0 {
        return Err(Error::protocol("empty file name"));
    }

    // Grow with the data actually received rather than trusting the length
    let mut name_bytes = Vec::new();
    let got = r.by_ref().take(name_len).read_to_end(&mut name_bytes)?;
    if (got as u64) < name_len {
        return Err(Error::protocol(format!(
            "connection closed inside name ({}/{} bytes)",
            got, name_len
        )));
    }
    let name = String::from_utf8(name_bytes).map_err(|_| Error::protocol("name is not UTF-8"))?;

    let mut size_buf = [0u8; SIZE_FIELD];
    fill(r, &mut size_buf, false, "size")?;
    let size = u32::from_le_bytes(size_buf) as u64;

    Ok(FileHeader { name, size })
}

pub fn write_ack<W: Write>(w: &mut W) -> Result<()> {
    w.write_all(ACK)?;
    w.flush()?;
    Ok(())
}

pub fn read_ack<R: Read>(r: &mut R) -> Result<()> {
    let mut buf = [0u8; ACK.len()];
    fill(r, &mut buf, true, "acknowledgement")?;
    if &buf != ACK {
        return Err(Error::protocol(format!(
            "unexpected acknowledgement {:?}",
            String::from_utf8_lossy(&buf)
        )));
    }
    Ok(())
}

fn fill<R: Read>(r: &mut R, buf: &mut [u8], at_boundary: bool, what: &str) -> Result<()> {
    let mut filled = 0;
    while filled < buf.len() {
        match r.read(&mut buf[filled..]) {
            Ok(0) if filled == 0 && at_boundary => return Err(Error::ConnectionClosed),
            Ok(0) => {
                return Err(Error::protocol(format!(
                    "connection closed inside {} ({}/{} bytes)",
                    what,
                    filled,
                    buf.len()
                )))
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn header_layout_is_length_name_size() {
        let bytes = encode_header("a.txt", 1024).unwrap();
        assert_eq!(&bytes[0..4], &5u32.to_le_bytes());
        assert_eq!(&bytes[4..9], b"a.txt");
        assert_eq!(&bytes[9..13], &1024u32.to_le_bytes());
        assert_eq!(bytes.len(), 13);
    }

    #[test]
    fn header_round_trip() {
        for (name, size) in [
            ("x", 0u64),
            ("sub/inner.txt", 2048),
            ("ünïcødé/файл.bin", 123_456),
            ("max", MAX_FILE_SIZE),
        ] {
            let bytes = encode_header(name, size).unwrap();
            let decoded = decode_header(&mut Cursor::new(bytes)).unwrap();
            assert_eq!(decoded, FileHeader::new(name, size));
        }
    }

    #[test]
    fn name_that_looks_like_a_header_survives() {
        let tricky = String::from_utf8(encode_header("evil", 7).unwrap()).unwrap();
        let bytes = encode_header(&tricky, 3).unwrap();
        let decoded = decode_header(&mut Cursor::new(bytes)).unwrap();
        assert_eq!(decoded.name, tricky);
        assert_eq!(decoded.size, 3);
    }

    #[test]
    fn long_name_round_trip() {
        let name = "n".repeat(70_000);
        let bytes = encode_header(&name, 1).unwrap();
        let decoded = decode_header(&mut Cursor::new(bytes)).unwrap();
        assert_eq!(decoded.name.len(), 70_000);
    }

    #[test]
    fn oversized_body_is_refused() {
        assert!(matches!(
            encode_header("big.iso", MAX_FILE_SIZE + 1),
            Err(Error::Protocol { .. })
        ));
    }

    #[test]
    fn empty_stream_is_connection_closed() {
        let r = decode_header(&mut Cursor::new(Vec::new()));
        assert!(matches!(r, Err(Error::ConnectionClosed)));
    }

    #[test]
    fn truncated_header_is_protocol_error() {
        let full = encode_header("file.txt", 10).unwrap();
        for cut in [2, 4, 7, full.len() - 1] {
            let r = decode_header(&mut Cursor::new(full[..cut].to_vec()));
            assert!(matches!(r, Err(Error::Protocol { .. })), "cut at {}", cut);
        }
    }

    #[test]
    fn invalid_utf8_name_is_protocol_error() {
        let mut bytes = 2u32.to_le_bytes().to_vec();
        bytes.extend_from_slice(&[0xff, 0xfe]);
        bytes.extend_from_slice(&0u32.to_le_bytes());
        let r = decode_header(&mut Cursor::new(bytes));
        assert!(matches!(r, Err(Error::Protocol { .. })));
    }

    #[test]
    fn ack_checks() {
        let mut out = Vec::new();
        write_ack(&mut out).unwrap();
        assert!(read_ack(&mut Cursor::new(out)).is_ok());
        assert!(matches!(
            read_ack(&mut Cursor::new(Vec::new())),
            Err(Error::ConnectionClosed)
        ));
        assert!(matches!(
            read_ack(&mut Cursor::new(b"FILE_REJECTED".to_vec())),
            Err(Error::Protocol { .. })
        ));
    }
}
