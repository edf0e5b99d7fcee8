//! Route advertisement payloads.

use rmpv::Value;

use crate::error::WireError;
use crate::types::NlAddr;

use super::{expect_bin, expect_str, expect_u8, expect_uint, read_array, write_array};

/// Advertisement payload type. Ordinals are wire-visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AdvType {
    Advertisement = 0,
    /// Reserved on the wire; receivers log and drop it.
    Retraction = 1,
}

impl AdvType {
    pub fn from_ordinal(value: u64) -> Result<Self, WireError> {
        match value {
            0 => Ok(Self::Advertisement),
            1 => Ok(Self::Retraction),
            _ => Err(WireError::UnknownOrdinal {
                what: "advertisement type",
                value,
            }),
        }
    }
}

/// The content of an ADVERTISEMENT: one destination the origin can reach.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub struct RouteAdvertisement {
    /// Destination the origin claims a route to.
    pub address: NlAddr,
    /// The origin's distance to that destination.
    pub distance: u8,
}

impl RouteAdvertisement {
    pub fn to_msgpack(&self) -> Result<Vec<u8>, WireError> {
        write_array(vec![
            Value::from(self.address.as_str()),
            Value::from(self.distance),
        ])
    }

    pub fn from_msgpack(bytes: &[u8]) -> Result<Self, WireError> {
        let fields = read_array(bytes, 2, "route advertisement")?;
        Ok(Self {
            address: NlAddr::new(expect_str(&fields[0], "advertised address")?),
            distance: expect_u8(&fields[1], "advertised distance")?,
        })
    }
}

/// An ADV payload: the origin plus a typed content blob.
///
/// The trailing empty string is a wire-compatibility field; it is emitted
/// on encode and only type-checked on decode.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub struct AdvPayload {
    /// The node that sent the advertisement, which claims to be the next hop.
    pub origin: NlAddr,
    pub adv_type: AdvType,
    /// Msgpack-encoded content; for ADVERTISEMENT a [`RouteAdvertisement`].
    pub content: Vec<u8>,
}

impl AdvPayload {
    /// Build an ADVERTISEMENT payload for one route.
    pub fn advertisement(origin: NlAddr, route: &RouteAdvertisement) -> Result<Self, WireError> {
        Ok(Self {
            origin,
            adv_type: AdvType::Advertisement,
            content: route.to_msgpack()?,
        })
    }

    /// Decode the content as a [`RouteAdvertisement`].
    pub fn route_advertisement(&self) -> Result<RouteAdvertisement, WireError> {
        RouteAdvertisement::from_msgpack(&self.content)
    }

    pub fn to_msgpack(&self) -> Result<Vec<u8>, WireError> {
        write_array(vec![
            Value::from(self.origin.as_str()),
            Value::from(self.adv_type as u8),
            Value::Binary(self.content.clone()),
            Value::from(""),
        ])
    }

    pub fn from_msgpack(bytes: &[u8]) -> Result<Self, WireError> {
        let fields = read_array(bytes, 4, "adv payload")?;
        let payload = Self {
            origin: NlAddr::new(expect_str(&fields[0], "adv origin")?),
            adv_type: AdvType::from_ordinal(expect_uint(&fields[1], "adv type")?)?,
            content: expect_bin(&fields[2], "adv content")?,
        };
        expect_str(&fields[3], "adv trailer")?;
        Ok(payload)
    }
}
