// Newline-delimited frame transport over streams.
//
// On stream transports every frame is terminated by `\n`. `read_frame` pulls
// bytes from any `BufRead` until it sees a terminator, so partial frames that
// arrive split across TCP segments are buffered transparently by the reader.
// Both functions work on raw bytes; `message.rs` handles the text format.
//
// Datagram transports don't use this module: one datagram is one frame and is
// handed straight to `Command::decode`.
//
// `MAX_FRAME_LEN` bounds how much a peer can make us buffer before sending a
// terminator. Gameplay frames are a few dozen bytes; 4 KB is plenty.

use std::io::{self, BufRead, Read, Write};

/// Maximum frame length in bytes, excluding the terminator.
pub const MAX_FRAME_LEN: usize = 4096;

/// Frame terminator for stream transports.
pub const FRAME_TERMINATOR: u8 = b'\n';

/// Write one frame followed by the terminator, then flush.
pub fn write_frame<W: Write>(writer: &mut W, frame: &[u8]) -> io::Result<()> {
    if frame.len() > MAX_FRAME_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("frame too large: {} bytes (max {MAX_FRAME_LEN})", frame.len()),
        ));
    }
    if frame.contains(&FRAME_TERMINATOR) {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "frame contains a terminator byte",
        ));
    }
    writer.write_all(frame)?;
    writer.write_all(&[FRAME_TERMINATOR])?;
    writer.flush()?;
    Ok(())
}

/// Read one frame, without its terminator. A trailing `\r` is dropped too.
///
/// Returns `UnexpectedEof` if the stream closes before a terminator arrives,
/// including mid-frame. Returns `InvalidData` if more than `MAX_FRAME_LEN`
/// bytes arrive without a terminator.
pub fn read_frame<R: BufRead>(reader: &mut R) -> io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    let limit = MAX_FRAME_LEN as u64 + 1;
    reader
        .by_ref()
        .take(limit)
        .read_until(FRAME_TERMINATOR, &mut buf)?;

    if buf.last() != Some(&FRAME_TERMINATOR) {
        if buf.len() > MAX_FRAME_LEN {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("frame exceeds {MAX_FRAME_LEN} bytes without a terminator"),
            ));
        }
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "stream closed before frame terminator",
        ));
    }

    buf.pop();
    if buf.last() == Some(&b'\r') {
        buf.pop();
    }
    Ok(buf)
}
