//! End-to-end data payloads.

use rmpv::Value;

use crate::constants::DATA_TTL;
use crate::error::WireError;
use crate::types::NlAddr;

use super::{expect_bin, expect_str, expect_u8, read_array, write_array};

/// A unicast datagram. `data` is already sealed to the destination's public
/// key; intermediate hops forward the frame without looking inside.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub struct DataPayload {
    pub ttl: u8,
    pub data: Vec<u8>,
    pub src: NlAddr,
    pub dst: NlAddr,
}

impl DataPayload {
    /// Build a datagram with the default TTL.
    pub fn new(src: NlAddr, dst: NlAddr, data: Vec<u8>) -> Self {
        Self {
            ttl: DATA_TTL,
            data,
            src,
            dst,
        }
    }

    pub fn to_msgpack(&self) -> Result<Vec<u8>, WireError> {
        write_array(vec![
            Value::from(self.ttl),
            Value::Binary(self.data.clone()),
            Value::from(self.src.as_str()),
            Value::from(self.dst.as_str()),
        ])
    }

    pub fn from_msgpack(bytes: &[u8]) -> Result<Self, WireError> {
        let fields = read_array(bytes, 4, "data payload")?;
        Ok(Self {
            ttl: expect_u8(&fields[0], "data ttl")?,
            data: expect_bin(&fields[1], "data body")?,
            src: NlAddr::new(expect_str(&fields[2], "data src")?),
            dst: NlAddr::new(expect_str(&fields[3], "data dst")?),
        })
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use crate::wire::{Envelope, MType};
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(256))]

        #[test]
        fn data_envelope_roundtrip(
            ttl in any::<u8>(),
            data in proptest::collection::vec(any::<u8>(), 0..512),
            src in "[a-f0-9]{0,64}",
            dst in "[a-f0-9]{0,64}",
        ) {
            let payload = DataPayload {
                ttl,
                data,
                src: NlAddr::new(src),
                dst: NlAddr::new(dst),
            };
            let env = Envelope::data(&payload).unwrap();
            let bytes = env.encode().unwrap();
            let decoded = Envelope::decode(&bytes).unwrap();
            prop_assert_eq!(decoded.kind, MType::Data);
            prop_assert_eq!(decoded.decode_data().unwrap(), payload);
        }

        #[test]
        fn decode_never_panics(bytes in proptest::collection::vec(any::<u8>(), 0..128)) {
            // Totality: arbitrary input either decodes or errors.
            let _ = Envelope::decode(&bytes);
        }
    }
}
