use serde_json::Value;

use crate::{Error, Result};

/// Commands are terminated with NUL then CR.
const COMMAND_TERMINATOR: &[u8] = b"\0\r";

/// Encode a command object into a wire frame: UTF-8 JSON + `\0\r`.
pub fn encode(command: &Value) -> Vec<u8> {
    let mut frame = command.to_string().into_bytes();
    frame.extend_from_slice(COMMAND_TERMINATOR);
    frame
}

/// True once the receive buffer holds a complete reply frame.
///
/// Older firmware terminates replies with a LF; newer firmware may just stop
/// sending, in which case the transport falls back to timeout-with-data.
pub fn frame_complete(buf: &[u8]) -> bool {
    buf.contains(&b'\n')
}

/// Decode an accumulated reply buffer into a JSON value.
///
/// Takes the bytes up to the first LF (if any), strips trailing NULs, and
/// parses the first JSON document, tolerating any trailing garbage the hub
/// appends after it. Anything that doesn't yield a document is a
/// `MalformedResponse` — distinct from transport failures.
pub fn decode(buf: &[u8]) -> Result<Value> {
    let first_line = match buf.iter().position(|&b| b == b'\n') {
        Some(idx) => &buf[..idx],
        None => buf,
    };
    let trimmed = trim_frame(first_line);
    if trimmed.is_empty() {
        return Err(Error::MalformedResponse("empty reply frame".to_string()));
    }

    let mut documents = serde_json::Deserializer::from_slice(trimmed).into_iter::<Value>();
    match documents.next() {
        Some(Ok(value)) => Ok(value),
        Some(Err(e)) => Err(Error::MalformedResponse(e.to_string())),
        None => Err(Error::MalformedResponse("no JSON document in reply".to_string())),
    }
}

fn trim_frame(buf: &[u8]) -> &[u8] {
    let mut slice = buf;
    while let [rest @ .., last] = slice {
        if matches!(*last, 0 | b'\r' | b' ' | b'\t') {
            slice = rest;
        } else {
            break;
        }
    }
    slice
}
