//! Binary framing for the HTTP payloads: big-endian 64-bit integer
//! prefixes followed by opaque tails. Shared verbatim between the
//! coordinator (encoding responses, decoding requests) and the worker
//! (the reverse).

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

use crate::model::{RunParams, Versions};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WireError {
    #[error("short read: expected at least {expected} bytes, got {actual}")]
    ShortRead { expected: usize, actual: usize },
}

/// `GET /clean_batch` response / `POST /adv_batch` request body:
/// 8-byte big-endian id followed by the opaque payload.
pub fn encode_id_prefixed(id: u64, payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(8 + payload.len());
    buf.put_u64(id);
    buf.put_slice(payload);
    buf.freeze()
}

pub fn decode_id_prefixed(data: &[u8]) -> Result<(u64, Bytes), WireError> {
    if data.len() < 8 {
        return Err(WireError::ShortRead {
            expected: 8,
            actual: data.len(),
        });
    }
    let id = u64::from_be_bytes(data[..8].try_into().expect("checked len"));
    let payload = Bytes::copy_from_slice(&data[8..]);
    Ok((id, payload))
}

/// `GET /ids` response: three big-endian u64 counters, 24 bytes exactly.
pub fn encode_ids(versions: Versions) -> Bytes {
    let mut buf = BytesMut::with_capacity(24);
    buf.put_u64(versions.attack_id);
    buf.put_u64(versions.model_id);
    buf.put_u64(versions.model_state_id);
    buf.freeze()
}

pub fn decode_ids(data: &[u8]) -> Result<Versions, WireError> {
    if data.len() < 24 {
        return Err(WireError::ShortRead {
            expected: 24,
            actual: data.len(),
        });
    }
    Ok(Versions {
        attack_id: u64::from_be_bytes(data[0..8].try_into().expect("checked len")),
        model_id: u64::from_be_bytes(data[8..16].try_into().expect("checked len")),
        model_state_id: u64::from_be_bytes(data[16..24].try_into().expect("checked len")),
    })
}

/// `GET /num_batches` response: a single big-endian u64.
pub fn encode_u64(value: u64) -> Bytes {
    Bytes::copy_from_slice(&value.to_be_bytes())
}

pub fn decode_u64(data: &[u8]) -> Result<u64, WireError> {
    if data.len() < 8 {
        return Err(WireError::ShortRead {
            expected: 8,
            actual: data.len(),
        });
    }
    Ok(u64::from_be_bytes(data[..8].try_into().expect("checked len")))
}

/// `POST /parameters` request: `maxPatience` then `queueLimit`, both
/// big-endian u64, 16 bytes exactly.
pub fn encode_parameters(params: RunParams) -> Bytes {
    let mut buf = BytesMut::with_capacity(16);
    buf.put_u64(params.max_patience);
    buf.put_u64(params.queue_limit);
    buf.freeze()
}

pub fn decode_parameters(data: &[u8]) -> Result<RunParams, WireError> {
    if data.len() < 16 {
        return Err(WireError::ShortRead {
            expected: 16,
            actual: data.len(),
        });
    }
    Ok(RunParams {
        max_patience: u64::from_be_bytes(data[0..8].try_into().expect("checked len")),
        queue_limit: u64::from_be_bytes(data[8..16].try_into().expect("checked len")),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_prefixed_round_trips() {
        let encoded = encode_id_prefixed(42, b"hello");
        let (id, payload) = decode_id_prefixed(&encoded).unwrap();
        assert_eq!(id, 42);
        assert_eq!(&payload[..], b"hello");
    }

    #[test]
    fn id_prefixed_short_read_errors() {
        let err = decode_id_prefixed(&[0, 1, 2]).unwrap_err();
        assert_eq!(
            err,
            WireError::ShortRead {
                expected: 8,
                actual: 3
            }
        );
    }

    #[test]
    fn ids_round_trip_is_exactly_24_bytes() {
        let versions = Versions {
            attack_id: 1,
            model_id: 2,
            model_state_id: 3,
        };
        let encoded = encode_ids(versions);
        assert_eq!(encoded.len(), 24);
        assert_eq!(decode_ids(&encoded).unwrap(), versions);
    }

    #[test]
    fn parameters_round_trip() {
        let params = RunParams {
            max_patience: 5,
            queue_limit: 2,
        };
        let encoded = encode_parameters(params);
        assert_eq!(encoded.len(), 16);
        let decoded = decode_parameters(&encoded).unwrap();
        assert_eq!(decoded.max_patience, params.max_patience);
        assert_eq!(decoded.queue_limit, params.queue_limit);
    }
}
