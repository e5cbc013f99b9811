use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::error::{LogError, LogResult};

/// Header size: 4 bytes length + 4 bytes CRC.
pub const HEADER_SIZE: usize = 8;

/// Wrap `payload` in a frame.
///
/// Frame format:
/// ```text
/// [4 bytes: payload length (little-endian u32)]
/// [4 bytes: CRC32 of payload (little-endian u32)]
/// [N bytes: payload]
/// ```
pub fn encode_frame(payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(HEADER_SIZE + payload.len());
    frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    frame.extend_from_slice(&crc32fast::hash(payload).to_le_bytes());
    frame.extend_from_slice(payload);
    frame
}

/// Check a frame's length and checksum and return its payload.
pub fn decode_frame(frame: &[u8]) -> LogResult<&[u8]> {
    if frame.len() < HEADER_SIZE {
        return Err(LogError::InvalidFrameLength {
            declared: HEADER_SIZE,
            available: frame.len(),
        });
    }
    let length = u32::from_le_bytes([frame[0], frame[1], frame[2], frame[3]]) as usize;
    let expected = u32::from_le_bytes([frame[4], frame[5], frame[6], frame[7]]);
    let payload = &frame[HEADER_SIZE..];
    if payload.len() != length {
        return Err(LogError::InvalidFrameLength {
            declared: length,
            available: payload.len(),
        });
    }
    let actual = crc32fast::hash(payload);
    if actual != expected {
        return Err(LogError::CrcMismatch { expected, actual });
    }
    Ok(payload)
}

/// Serialize `value` with bincode and frame it.
pub fn encode<T: Serialize>(value: &T) -> LogResult<Vec<u8>> {
    let payload = bincode::serialize(value).map_err(|e| LogError::Serialization(e.to_string()))?;
    debug!(len = payload.len(), "encoded frame");
    Ok(encode_frame(&payload))
}

/// Verify a frame and deserialize its bincode payload.
pub fn decode<T: DeserializeOwned>(frame: &[u8]) -> LogResult<T> {
    let payload = decode_frame(frame)?;
    bincode::deserialize(payload).map_err(|e| LogError::Serialization(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change_log::tests::value_event;
    use crate::sync_log::SyncLog;
    use crate::traits::ChangeLogWriter;

    #[test]
    fn sync_log_state_survives_framing() {
        let mut log = SyncLog::new();
        let event = value_event(0, 1);
        log.append(Some(event.to_forced_command()), Some(event)).unwrap();
        log.append(None, None).unwrap();
        log.set_sync_revision(1).unwrap();

        let bytes = encode(&log.to_state()).unwrap();
        let restored = SyncLog::from_state(decode(&bytes).unwrap()).unwrap();
        assert_eq!(restored, log);
    }

    #[test]
    fn corrupted_payload_is_detected() {
        let mut bytes = encode(&vec![1u32, 2, 3]).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        assert!(matches!(decode::<Vec<u32>>(&bytes), Err(LogError::CrcMismatch { .. })));
    }

    #[test]
    fn truncated_frame_is_detected() {
        let bytes = encode(&"payload").unwrap();
        assert!(matches!(
            decode_frame(&bytes[..bytes.len() - 2]),
            Err(LogError::InvalidFrameLength { .. })
        ));
        assert!(decode_frame(&bytes[..4]).is_err());
    }
}
