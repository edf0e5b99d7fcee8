//! Msgpack wire codec: envelope and payload framing.
//!
//! Every frame on a link is a two-element msgpack array `(kind, payload)`.
//! The payload bytes decode to a kind-specific tuple; ADV and ARP carry a
//! further nested msgpack byte string in their `content` field. Enum
//! ordinals are part of the wire contract and must never be renumbered.

mod adv;
mod arp;
mod data;

pub use adv::{AdvPayload, AdvType, RouteAdvertisement};
pub use arp::{ArpPayload, ArpReply, ArpType};
pub use data::DataPayload;

use rmpv::Value;

use crate::error::WireError;

/// Message kind discriminant. Ordinals are wire-visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MType {
    /// The zero value. Decodable but never emitted; receivers drop it.
    Unknown = 0,
    Adv = 1,
    Data = 2,
    Arp = 3,
}

impl MType {
    pub fn from_ordinal(value: u64) -> Result<Self, WireError> {
        match value {
            0 => Ok(Self::Unknown),
            1 => Ok(Self::Adv),
            2 => Ok(Self::Data),
            3 => Ok(Self::Arp),
            _ => Err(WireError::UnknownOrdinal {
                what: "message kind",
                value,
            }),
        }
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Unknown => "UNKNOWN",
            Self::Adv => "ADV",
            Self::Data => "DATA",
            Self::Arp => "ARP",
        }
    }
}

/// A framed wire message: kind discriminant plus opaque payload bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub struct Envelope {
    pub kind: MType,
    pub payload: Vec<u8>,
}

impl Envelope {
    pub fn new(kind: MType, payload: Vec<u8>) -> Self {
        Self { kind, payload }
    }

    /// Wrap an ADV payload.
    pub fn adv(payload: &AdvPayload) -> Result<Self, WireError> {
        Ok(Self::new(MType::Adv, payload.to_msgpack()?))
    }

    /// Wrap an ARP payload.
    pub fn arp(payload: &ArpPayload) -> Result<Self, WireError> {
        Ok(Self::new(MType::Arp, payload.to_msgpack()?))
    }

    /// Wrap a DATA payload.
    pub fn data(payload: &DataPayload) -> Result<Self, WireError> {
        Ok(Self::new(MType::Data, payload.to_msgpack()?))
    }

    /// Encode to a self-delimited byte string.
    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        write_array(vec![
            Value::from(self.kind as u8),
            Value::Binary(self.payload.clone()),
        ])
    }

    /// Decode a frame. Truncation and schema mismatches return an error;
    /// the caller must drop the frame.
    pub fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        let fields = read_array(bytes, 2, "envelope")?;
        let kind = MType::from_ordinal(expect_uint(&fields[0], "envelope kind")?)?;
        let payload = expect_bin(&fields[1], "envelope payload")?;
        Ok(Self { kind, payload })
    }

    /// Decode the payload as ADV. Errors if the envelope carries another kind.
    pub fn decode_adv(&self) -> Result<AdvPayload, WireError> {
        self.expect_kind(MType::Adv)?;
        AdvPayload::from_msgpack(&self.payload)
    }

    /// Decode the payload as ARP. Errors if the envelope carries another kind.
    pub fn decode_arp(&self) -> Result<ArpPayload, WireError> {
        self.expect_kind(MType::Arp)?;
        ArpPayload::from_msgpack(&self.payload)
    }

    /// Decode the payload as DATA. Errors if the envelope carries another kind.
    pub fn decode_data(&self) -> Result<DataPayload, WireError> {
        self.expect_kind(MType::Data)?;
        DataPayload::from_msgpack(&self.payload)
    }

    fn expect_kind(&self, expected: MType) -> Result<(), WireError> {
        if self.kind == expected {
            Ok(())
        } else {
            Err(WireError::KindMismatch {
                expected: expected.name(),
                actual: self.kind.name(),
            })
        }
    }
}

// ------------------------------------------------------------------ //
// Value helpers shared by the payload codecs
// ------------------------------------------------------------------ //

pub(crate) fn write_array(fields: Vec<Value>) -> Result<Vec<u8>, WireError> {
    let mut buf = Vec::new();
    rmpv::encode::write_value(&mut buf, &Value::Array(fields))
        .map_err(|e| WireError::Encode(e.to_string()))?;
    Ok(buf)
}

pub(crate) fn read_array(
    bytes: &[u8],
    expected_len: usize,
    what: &'static str,
) -> Result<Vec<Value>, WireError> {
    let value = rmpv::decode::read_value(&mut &bytes[..])
        .map_err(|e| WireError::Decode(e.to_string()))?;
    match value {
        Value::Array(fields) if fields.len() == expected_len => Ok(fields),
        Value::Array(_) => Err(WireError::Shape(what)),
        _ => Err(WireError::Shape(what)),
    }
}

pub(crate) fn expect_uint(value: &Value, what: &'static str) -> Result<u64, WireError> {
    match value {
        Value::Integer(i) => i.as_u64().ok_or(WireError::Shape(what)),
        _ => Err(WireError::Shape(what)),
    }
}

pub(crate) fn expect_u8(value: &Value, what: &'static str) -> Result<u8, WireError> {
    u8::try_from(expect_uint(value, what)?).map_err(|_| WireError::Shape(what))
}

pub(crate) fn expect_str(value: &Value, what: &'static str) -> Result<String, WireError> {
    match value {
        Value::String(s) => s.as_str().map(str::to_owned).ok_or(WireError::Shape(what)),
        _ => Err(WireError::Shape(what)),
    }
}

pub(crate) fn expect_bin(value: &Value, what: &'static str) -> Result<Vec<u8>, WireError> {
    match value {
        Value::Binary(b) => Ok(b.clone()),
        _ => Err(WireError::Shape(what)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_roundtrip() {
        let env = Envelope::new(MType::Data, vec![0x01, 0x02, 0x03]);
        let bytes = env.encode().unwrap();
        assert_eq!(Envelope::decode(&bytes).unwrap(), env);
    }

    #[test]
    fn kind_ordinals_are_wire_visible() {
        // The first array element must carry the raw ordinal.
        for (kind, ordinal) in [
            (MType::Unknown, 0u8),
            (MType::Adv, 1),
            (MType::Data, 2),
            (MType::Arp, 3),
        ] {
            let bytes = Envelope::new(kind, vec![]).encode().unwrap();
            // fixarray(2) marker, then a positive fixint.
            assert_eq!(bytes[0], 0x92);
            assert_eq!(bytes[1], ordinal);
        }
    }

    #[test]
    fn unknown_ordinal_rejected() {
        assert!(matches!(
            MType::from_ordinal(7),
            Err(WireError::UnknownOrdinal { value: 7, .. })
        ));
    }

    #[test]
    fn truncated_frame_rejected() {
        let bytes = Envelope::new(MType::Adv, vec![0xAA; 16]).encode().unwrap();
        for cut in 0..bytes.len() {
            assert!(
                Envelope::decode(&bytes[..cut]).is_err(),
                "truncation at {cut} should fail"
            );
        }
    }

    #[test]
    fn non_array_frame_rejected() {
        let mut buf = Vec::new();
        rmpv::encode::write_value(&mut buf, &Value::from(42)).unwrap();
        assert!(matches!(
            Envelope::decode(&buf),
            Err(WireError::Shape("envelope"))
        ));
    }

    #[test]
    fn wrong_arity_rejected() {
        let mut buf = Vec::new();
        rmpv::encode::write_value(
            &mut buf,
            &Value::Array(vec![Value::from(1), Value::Binary(vec![]), Value::from(0)]),
        )
        .unwrap();
        assert!(Envelope::decode(&buf).is_err());
    }

    #[test]
    fn kind_checked_extraction() {
        let env = Envelope::new(MType::Data, vec![]);
        assert!(matches!(
            env.decode_adv(),
            Err(WireError::KindMismatch {
                expected: "ADV",
                actual: "DATA"
            })
        ));
        assert!(env.decode_arp().is_err());
    }

    #[test]
    fn garbage_payload_is_an_error_not_a_panic() {
        let env = Envelope::new(MType::Adv, vec![0xC1, 0xFF, 0x00]);
        assert!(env.decode_adv().is_err());
    }
}
