//! pkt-line framing: 4-hex length prefix (length includes itself),
//! `0000` flush, `0001` delim

use std::io::Read;

use crate::error::{Error, Result};

/// largest payload a single pkt-line can carry
pub const MAX_PAYLOAD: usize = 65516;

pub const FLUSH: &[u8; 4] = b"0000";
pub const DELIM: &[u8; 4] = b"0001";

/// one frame off the wire
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Frame {
    Data(Vec<u8>),
    Flush,
    Delim,
}

/// encode a data frame
pub fn encode(payload: &[u8]) -> Result<Vec<u8>> {
    if payload.len() > MAX_PAYLOAD {
        return Err(Error::TransportError(format!(
            "pkt-line payload too long: {}",
            payload.len()
        )));
    }
    let mut out = format!("{:04x}", payload.len() + 4).into_bytes();
    out.extend_from_slice(payload);
    Ok(out)
}

/// encode a text line (appends LF)
pub fn encode_line(line: &str) -> Result<Vec<u8>> {
    let mut payload = line.as_bytes().to_vec();
    payload.push(b'\n');
    encode(&payload)
}

/// read one frame from a stream; None at clean EOF
pub fn read_frame(reader: &mut impl Read) -> Result<Option<Frame>> {
    let mut head = [0u8; 4];
    match read_exact_or_eof(reader, &mut head)? {
        false => return Ok(None),
        true => {}
    }
    let text = std::str::from_utf8(&head)
        .map_err(|_| Error::TransportError("pkt-line length not ascii".into()))?;
    let length = usize::from_str_radix(text, 16)
        .map_err(|_| Error::TransportError(format!("bad pkt-line length: {text}")))?;
    match length {
        0 => Ok(Some(Frame::Flush)),
        1 => Ok(Some(Frame::Delim)),
        2 | 3 => Err(Error::TransportError(format!("reserved pkt-line length {length}"))),
        _ => {
            let mut payload = vec![0u8; length - 4];
            reader
                .read_exact(&mut payload)
                .map_err(|e| Error::TransportError(format!("pkt-line truncated: {e}")))?;
            Ok(Some(Frame::Data(payload)))
        }
    }
}

fn read_exact_or_eof(reader: &mut impl Read, buf: &mut [u8]) -> Result<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) if filled == 0 => return Ok(false),
            Ok(0) => return Err(Error::TransportError("pkt-line header truncated".into())),
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(Error::TransportError(format!("read: {e}"))),
        }
    }
    Ok(true)
}

/// read frames until a flush (exclusive); errors on EOF before flush
pub fn read_until_flush(reader: &mut impl Read) -> Result<Vec<Vec<u8>>> {
    let mut frames = Vec::new();
    loop {
        match read_frame(reader)? {
            Some(Frame::Flush) => return Ok(frames),
            Some(Frame::Delim) => continue,
            Some(Frame::Data(payload)) => frames.push(payload),
            None => return Err(Error::TransportError("stream ended before flush".into())),
        }
    }
}

/// parse a ref advertisement: `sha refname[\0capabilities]` per line
pub fn parse_ref_advertisement(
    frames: &[Vec<u8>],
) -> Vec<(String, crate::hash::ObjectId)> {
    let mut refs = Vec::new();
    for payload in frames {
        let line = String::from_utf8_lossy(payload);
        let line = line.trim_end_matches('\n');
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let before_caps = line.split('\0').next().unwrap_or(line);
        let Some((sha, refname)) = before_caps.split_once(' ') else {
            continue;
        };
        if let Ok(id) = crate::hash::ObjectId::from_hex(sha) {
            if !refname.is_empty() {
                refs.push((refname.to_string(), id));
            }
        }
    }
    refs
}
