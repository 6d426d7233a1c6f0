use crate::ProtoError;

pub const MAX_KEY_LEN: usize = 250;

/// Validates a key per the wire grammar: 1..=250 bytes, no ASCII whitespace
/// or control characters (`0x00..=0x20`, `0x7F`).
pub fn validate_key(key: &str) -> Result<(), ProtoError> {
    if key.is_empty() {
        return Err(ProtoError::client("bad key: contains invalid characters"));
    }
    if key.len() > MAX_KEY_LEN {
        return Err(ProtoError::client(format!(
            "bad key: length {} greater than max of {}",
            key.len(),
            MAX_KEY_LEN
        )));
    }
    if key.bytes().any(|b| b <= 0x20 || b == 0x7F) {
        return Err(ProtoError::client("bad key: contains invalid characters"));
    }
    Ok(())
}
