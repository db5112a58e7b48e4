//! # RosterSync Codec
//!
//! CBOR encoding for everything RosterSync puts on the wire or on disk:
//! fetch/write messages, realtime events, and local cache snapshots.
//!
//! Types opt in through serde; the [`Encode`] and [`Decode`] traits are
//! blanket-implemented so protocol types can call `.encode()` and
//! `T::decode(bytes)` directly.
//!
//! ## Usage
//!
//! ```
//! use rostersync_codec::{from_cbor, to_cbor};
//!
//! let bytes = to_cbor(&(7u64, "roll-07")).unwrap();
//! let decoded: (u64, String) = from_cbor(&bytes).unwrap();
//! assert_eq!(decoded, (7, "roll-07".to_string()));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cbor;
mod error;

pub use cbor::{from_cbor, to_cbor};
pub use error::{CodecError, CodecResult};

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Trait for types that can be encoded to CBOR.
pub trait Encode {
    /// Encode this value to CBOR bytes.
    fn encode(&self) -> CodecResult<Vec<u8>>;
}

/// Trait for types that can be decoded from CBOR.
pub trait Decode: Sized {
    /// Decode this value from CBOR bytes.
    fn decode(bytes: &[u8]) -> CodecResult<Self>;
}

impl<T: Serialize> Encode for T {
    fn encode(&self) -> CodecResult<Vec<u8>> {
        to_cbor(self)
    }
}

impl<T: DeserializeOwned> Decode for T {
    fn decode(bytes: &[u8]) -> CodecResult<Self> {
        from_cbor(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Sample {
        id: String,
        version: u64,
        note: Option<String>,
    }

    #[test]
    fn empty_input_is_eof() {
        let result: CodecResult<u64> = from_cbor(&[]);
        assert_eq!(result, Err(CodecError::UnexpectedEof));
    }

    #[test]
    fn trailing_bytes_rejected() {
        let mut bytes = to_cbor(&42u64).unwrap();
        bytes.extend_from_slice(&[0x01, 0x02]);

        let result: CodecResult<u64> = from_cbor(&bytes);
        assert_eq!(result, Err(CodecError::TrailingBytes { remaining: 2 }));
    }

    #[test]
    fn garbage_is_decode_error() {
        let result: CodecResult<Sample> = from_cbor(&[0xff, 0x00, 0x13]);
        assert!(matches!(result, Err(CodecError::DecodingFailed { .. })));
    }

    #[test]
    fn trait_methods_match_free_functions() {
        let sample = Sample {
            id: "s-1".into(),
            version: 9,
            note: None,
        };
        assert_eq!(sample.encode().unwrap(), to_cbor(&sample).unwrap());
        assert_eq!(Sample::decode(&sample.encode().unwrap()).unwrap(), sample);
    }

    proptest! {
        #[test]
        fn decode_never_panics(bytes in proptest::collection::vec(any::<u8>(), 0..64)) {
            let _ = from_cbor::<Sample>(&bytes);
        }
    }
}
