/*
 * This file is a part of kvd
*/

//! The wire protocol (`spec.md` §6): a `u32` length-prefixed frame
//! envelope shared by requests and responses, a flat `argv` request
//! payload, and a recursively tagged response value.
//!
//! Frame parsing lives here rather than in [`crate::net::connection`]
//! because `spec.md` §4.6 folds framing into the connection state
//! machine's description of REQ; keeping the byte-level work in its
//! own module is the `ProtocolConnection`/`ProtocolConnectionExt`
//! split the teacher's `dbnet::connection` uses to keep I/O driving
//! separate from codec details.

use bytes::{Buf, BufMut, BytesMut};
use libkvd::{K_MAX_ARGS, K_MAX_MSG};

use crate::util::compiler;
use crate::util::error::ErrCode;

/// Why a frame or request payload was rejected. Both variants are
/// fatal to the connection (`spec.md` §7 tier 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtoError {
    OversizeFrame,
    Malformed,
}

/// A response value, tagged per `spec.md` §6.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Nil,
    Err(ErrCode, String),
    Str(Vec<u8>),
    Int(i64),
    Dbl(f64),
    Arr(Vec<Value>),
}

const TAG_NIL: u8 = 0x00;
const TAG_ERR: u8 = 0x01;
const TAG_STR: u8 = 0x02;
const TAG_INT: u8 = 0x03;
const TAG_DBL: u8 = 0x04;
const TAG_ARR: u8 = 0x05;

fn encode_value(out: &mut Vec<u8>, value: &Value) {
    match value {
        Value::Nil => out.put_u8(TAG_NIL),
        Value::Err(code, msg) => {
            out.put_u8(TAG_ERR);
            out.put_i32_le(*code as i32);
            out.put_u32_le(msg.len() as u32);
            out.extend_from_slice(msg.as_bytes());
        }
        Value::Str(s) => {
            out.put_u8(TAG_STR);
            out.put_u32_le(s.len() as u32);
            out.extend_from_slice(s);
        }
        Value::Int(n) => {
            out.put_u8(TAG_INT);
            out.put_i64_le(*n);
        }
        Value::Dbl(d) => {
            out.put_u8(TAG_DBL);
            out.put_f64_le(*d);
        }
        Value::Arr(items) => {
            out.put_u8(TAG_ARR);
            out.put_u32_le(items.len() as u32);
            for item in items {
                encode_value(out, item);
            }
        }
    }
}

/// Serialize `value` to a full frame (length prefix included), falling
/// back to a `TOO_BIG` error frame if the encoded payload would exceed
/// `K_MAX_MSG` (`spec.md` §4.7: "Responses exceeding 4096 bytes are
/// replaced by a 2BIG error").
pub fn serialize_response(value: &Value) -> Vec<u8> {
    let mut payload = Vec::new();
    encode_value(&mut payload, value);
    if payload.len() > K_MAX_MSG {
        payload.clear();
        encode_value(
            &mut payload,
            &Value::Err(ErrCode::TooBig, "response exceeds the maximum message size".to_string()),
        );
    }
    let mut frame = Vec::with_capacity(4 + payload.len());
    frame.put_u32_le(payload.len() as u32);
    frame.extend_from_slice(&payload);
    frame
}

/// Pull one complete frame's payload out of `buf`, if present. Leaves
/// `buf` untouched (returns `Ok(None)`) when fewer than 4 bytes, or
/// fewer than `4 + len` bytes, have arrived so far.
pub fn try_take_frame(buf: &mut BytesMut) -> Result<Option<BytesMut>, ProtoError> {
    if buf.len() < 4 {
        return Ok(None);
    }
    let len = u32::from_le_bytes(buf[..4].try_into().expect("4 bytes")) as usize;
    if compiler::unlikely(len > K_MAX_MSG) {
        return Err(ProtoError::OversizeFrame);
    }
    if buf.len() < 4 + len {
        return Ok(None);
    }
    buf.advance(4);
    Ok(Some(buf.split_to(len)))
}

/// Decode a request payload into its argv vector (`spec.md` §6: `u32
/// nstr` then `nstr` length-prefixed strings, `nstr ≤ K_MAX_ARGS`).
pub fn parse_request(mut payload: &[u8]) -> Result<Vec<Vec<u8>>, ProtoError> {
    if payload.len() < 4 {
        return Err(ProtoError::Malformed);
    }
    let nstr = payload.get_u32_le() as usize;
    if nstr > K_MAX_ARGS {
        return Err(ProtoError::Malformed);
    }
    let mut args = Vec::with_capacity(nstr);
    for _ in 0..nstr {
        if payload.len() < 4 {
            return Err(ProtoError::Malformed);
        }
        let len = payload.get_u32_le() as usize;
        if payload.len() < len {
            return Err(ProtoError::Malformed);
        }
        args.push(payload[..len].to_vec());
        payload.advance(len);
    }
    if !payload.is_empty() {
        return Err(ProtoError::Malformed);
    }
    Ok(args)
}

/// Encode an argv vector as a request payload. Used by the `cli` crate
/// only; the server never originates requests.
pub fn encode_request(args: &[impl AsRef<[u8]>]) -> Vec<u8> {
    let mut payload = Vec::new();
    payload.put_u32_le(args.len() as u32);
    for a in args {
        let a = a.as_ref();
        payload.put_u32_le(a.len() as u32);
        payload.extend_from_slice(a);
    }
    let mut frame = Vec::with_capacity(4 + payload.len());
    frame.put_u32_le(payload.len() as u32);
    frame.extend_from_slice(&payload);
    frame
}

/// Decode one response payload (used by the `cli` crate). Returns the
/// value and the number of bytes consumed from `payload`.
pub fn decode_value(payload: &[u8]) -> Result<(Value, usize), ProtoError> {
    if payload.is_empty() {
        return Err(ProtoError::Malformed);
    }
    let tag = payload[0];
    let mut rest = &payload[1..];
    match tag {
        TAG_NIL => Ok((Value::Nil, 1)),
        TAG_ERR => {
            if rest.len() < 8 {
                return Err(ProtoError::Malformed);
            }
            let code = rest.get_i32_le();
            let len = rest.get_u32_le() as usize;
            if rest.len() < len {
                return Err(ProtoError::Malformed);
            }
            let msg = String::from_utf8_lossy(&rest[..len]).into_owned();
            let code = match code {
                1 => ErrCode::Unknown,
                2 => ErrCode::TooBig,
                3 => ErrCode::Type,
                4 => ErrCode::Arg,
                _ => return Err(ProtoError::Malformed),
            };
            Ok((Value::Err(code, msg), 1 + 8 + len))
        }
        TAG_STR => {
            if rest.len() < 4 {
                return Err(ProtoError::Malformed);
            }
            let len = rest.get_u32_le() as usize;
            if rest.len() < len {
                return Err(ProtoError::Malformed);
            }
            Ok((Value::Str(rest[..len].to_vec()), 1 + 4 + len))
        }
        TAG_INT => {
            if rest.len() < 8 {
                return Err(ProtoError::Malformed);
            }
            Ok((Value::Int(rest.get_i64_le()), 1 + 8))
        }
        TAG_DBL => {
            if rest.len() < 8 {
                return Err(ProtoError::Malformed);
            }
            Ok((Value::Dbl(rest.get_f64_le()), 1 + 8))
        }
        TAG_ARR => {
            if rest.len() < 4 {
                return Err(ProtoError::Malformed);
            }
            let n = rest.get_u32_le() as usize;
            let mut consumed = 1 + 4;
            let mut items = Vec::with_capacity(n);
            let mut cursor = &payload[consumed..];
            for _ in 0..n {
                let (v, used) = decode_value(cursor)?;
                consumed += used;
                cursor = &cursor[used..];
                items.push(v);
            }
            Ok((Value::Arr(items), consumed))
        }
        _ => Err(ProtoError::Malformed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_round_trips_through_try_take_frame() {
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&encode_request(&[b"get".as_slice(), b"k".as_slice()]));
        let payload = try_take_frame(&mut buf).unwrap().unwrap();
        assert!(buf.is_empty());
        let args = parse_request(&payload).unwrap();
        assert_eq!(args, vec![b"get".to_vec(), b"k".to_vec()]);
    }

    #[test]
    fn partial_frame_yields_none_without_consuming() {
        let full = encode_request(&[b"ping".as_slice()]);
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&full[..full.len() - 1]);
        assert_eq!(try_take_frame(&mut buf).unwrap(), None);
        assert_eq!(buf.len(), full.len() - 1);
    }

    #[test]
    fn oversize_frame_is_rejected() {
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&((K_MAX_MSG as u32 + 1).to_le_bytes()));
        assert_eq!(try_take_frame(&mut buf), Err(ProtoError::OversizeFrame));
    }

    #[test]
    fn too_many_args_is_malformed() {
        let mut payload = Vec::new();
        payload.put_u32_le(K_MAX_ARGS as u32 + 1);
        assert_eq!(parse_request(&payload), Err(ProtoError::Malformed));
    }

    #[test]
    fn response_value_round_trips() {
        let v = Value::Arr(vec![
            Value::Str(b"a".to_vec()),
            Value::Dbl(1.5),
            Value::Int(-7),
            Value::Nil,
            Value::Err(ErrCode::Type, "bad".to_string()),
        ]);
        let frame = serialize_response(&v);
        let len = u32::from_le_bytes(frame[..4].try_into().unwrap()) as usize;
        let (decoded, consumed) = decode_value(&frame[4..4 + len]).unwrap();
        assert_eq!(consumed, len);
        assert_eq!(decoded, v);
    }

    #[test]
    fn oversize_response_becomes_too_big_error() {
        let huge = Value::Str(vec![0u8; K_MAX_MSG]);
        let frame = serialize_response(&huge);
        let len = u32::from_le_bytes(frame[..4].try_into().unwrap()) as usize;
        let (decoded, _) = decode_value(&frame[4..4 + len]).unwrap();
        assert!(matches!(decoded, Value::Err(ErrCode::TooBig, _)));
    }
}
