//! MessagePack codec helpers.
//!
//! Message bodies, replies and wire transactions are all MessagePack. Structs
//! are written as maps (field names included) so a reply encoded by one build
//! still decodes after fields are reordered in another.

use serde::{Serialize, de::DeserializeOwned};

use crate::error::NetError;

/// Encode a value to MessagePack bytes.
///
/// # Errors
///
/// Returns [`NetError::Encode`] if serialisation fails.
pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, NetError> {
    rmp_serde::to_vec_named(value).map_err(NetError::Encode)
}

/// Decode a value from MessagePack bytes.
///
/// # Errors
///
/// Returns [`NetError::Decode`] if deserialisation fails.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, NetError> {
    rmp_serde::from_slice(bytes).map_err(NetError::Decode)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, serde::Serialize, serde::Deserialize)]
    struct Attack {
        target: u64,
        damage: u32,
    }

    #[derive(Debug, PartialEq, serde::Deserialize)]
    struct AttackReordered {
        damage: u32,
        target: u64,
    }

    #[test]
    fn test_named_fields_survive_reordering() {
        let bytes = encode(&Attack {
            target: 7,
            damage: 3,
        })
        .unwrap();
        let restored: AttackReordered = decode(&bytes).unwrap();
        assert_eq!(
            restored,
            AttackReordered {
                damage: 3,
                target: 7
            }
        );
    }

    #[test]
    fn test_decode_invalid_bytes() {
        let result: Result<Attack, _> = decode(&[0xFF, 0xFF]);
        assert!(matches!(result, Err(NetError::Decode(_))));
    }
}
