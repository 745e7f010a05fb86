//! Varint length-delimited message framing inside the decompressed stream.

use std::io::{ErrorKind, Read, Write};

use prost::Message;

use crate::{Result, ScannerError};

/// Longest valid varint encoding of a `u64`.
const MAX_VARINT_LEN: usize = 10;

/// Reads one varint length prefix.
///
/// Returns `Ok(None)` when the stream ends before the first byte, and the
/// length with the number of prefix bytes otherwise.
pub(crate) fn read_length<R: Read + ?Sized>(reader: &mut R) -> Result<Option<(u64, u64)>> {
    let mut value = 0u64;
    for index in 0..MAX_VARINT_LEN {
        let Some(byte) = read_byte(reader)? else {
            if index == 0 {
                return Ok(None);
            }
            return Err(ScannerError::stream_corrupted("recording ends inside a length prefix"));
        };

        value |= u64::from(byte & 0x7f) << (7 * index);
        if byte & 0x80 == 0 {
            return Ok(Some((value, index as u64 + 1)));
        }
    }
    Err(ScannerError::stream_corrupted("length prefix longer than ten bytes"))
}

/// Reads one length-delimited message body.
///
/// Returns the body and the number of bytes consumed including the prefix.
pub(crate) fn read_message<R: Read + ?Sized>(reader: &mut R) -> Result<Option<(Vec<u8>, u64)>> {
    let Some((len, prefix)) = read_length(reader)? else {
        return Ok(None);
    };

    let len_usize = usize::try_from(len)
        .map_err(|_| ScannerError::stream_corrupted(format!("message length {} too large", len)))?;
    let mut body = Vec::new();
    let read = reader
        .take(len)
        .read_to_end(&mut body)
        .map_err(read_failed)?;
    if read != len_usize {
        return Err(ScannerError::stream_corrupted(format!(
            "message declares {} bytes but only {} remain",
            len, read
        )));
    }
    Ok(Some((body, prefix + len)))
}

/// Decodes a message body, mapping failures to [`ScannerError::StreamCorrupted`].
pub(crate) fn decode_body<M: Message + Default>(body: &[u8], what: &str) -> Result<M> {
    M::decode(body).map_err(|e| ScannerError::stream_corrupted(format!("invalid {}: {}", what, e)))
}

/// Writes `message` with its varint length prefix.
pub(crate) fn write_message<W: Write + ?Sized, M: Message>(writer: &mut W, message: &M) -> Result<()> {
    writer
        .write_all(&message.encode_length_delimited_to_vec())
        .map_err(|e| ScannerError::io("writing a recording", e))
}

fn read_byte<R: Read + ?Sized>(reader: &mut R) -> Result<Option<u8>> {
    let mut byte = [0u8; 1];
    loop {
        match reader.read(&mut byte) {
            Ok(0) => return Ok(None),
            Ok(_) => return Ok(Some(byte[0])),
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(read_failed(e)),
        }
    }
}

/// Damaged compressed data surfaces as corruption, not as an I/O fault.
fn read_failed(e: std::io::Error) -> ScannerError {
    match e.kind() {
        ErrorKind::UnexpectedEof | ErrorKind::InvalidData | ErrorKind::InvalidInput => {
            ScannerError::stream_corrupted(format!("recording is truncated or damaged: {}", e))
        }
        _ => ScannerError::io("reading a recording", e),
    }
}
