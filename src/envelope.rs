//! Crosspoint-to-crosspoint data messages.
//!
//! A [`CrosspointData`] addresses one equipment (producer) and a set of
//! controls (consumers) and carries signals and opaque blobs.  Its
//! [`DataKind`] is fixed by the constructor:
//!
//! ```compile_fail
//! use crosspoint::envelope::{CrosspointData, DataKind};
//!
//! let mut data = CrosspointData::control_connect(1, 2);
//! data.kind = DataKind::Ping;
//! ```
//!
//! On a byte stream every document is followed by [`SENTINEL`], the delimiter
//! the stream's [`DelimiterDecoder`] splits on.  0xFF never occurs in UTF-8,
//! so it cannot collide with document content.

use std::collections::BTreeSet;
use std::fmt;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::Result;
use crate::framing::{DelimiterDecoder, Framer, Frames};
use crate::signal::{Sig, SigCache};

/// Terminates each document on stream transports.
pub const SENTINEL: u8 = 0xFF;

/// What a message means.  Numbered in blocks of 1000 so kinds can be added
/// without renumbering; values from newer peers survive as `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataKind {
    Message,
    ControlConnect,
    ControlDisconnect,
    ControlClear,
    EquipmentConnect,
    EquipmentDisconnect,
    Ping,
    Pong,
    Unknown(i32),
}

impl DataKind {
    const NAMED: [DataKind; 8] = [
        Self::Message,
        Self::ControlConnect,
        Self::ControlDisconnect,
        Self::ControlClear,
        Self::EquipmentConnect,
        Self::EquipmentDisconnect,
        Self::Ping,
        Self::Pong,
    ];

    pub fn value(self) -> i32 {
        match self {
            Self::Message => 0,
            Self::ControlConnect => 1000,
            Self::ControlDisconnect => 1001,
            Self::ControlClear => 1002,
            Self::EquipmentConnect => 2000,
            Self::EquipmentDisconnect => 2001,
            Self::Ping => 3000,
            Self::Pong => 3001,
            Self::Unknown(value) => value,
        }
    }

    pub fn from_value(value: i32) -> Self {
        Self::NAMED
            .into_iter()
            .find(|kind| kind.value() == value)
            .unwrap_or(Self::Unknown(value))
    }

    pub fn name(self) -> Option<&'static str> {
        Some(match self {
            Self::Message => "Message",
            Self::ControlConnect => "ControlConnect",
            Self::ControlDisconnect => "ControlDisconnect",
            Self::ControlClear => "ControlClear",
            Self::EquipmentConnect => "EquipmentConnect",
            Self::EquipmentDisconnect => "EquipmentDisconnect",
            Self::Ping => "Ping",
            Self::Pong => "Pong",
            Self::Unknown(_) => return None,
        })
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::NAMED.into_iter().find(|kind| kind.name() == Some(name))
    }
}

impl fmt::Display for DataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "{}", self.value()),
        }
    }
}

impl Serialize for DataKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self.name() {
            Some(name) => serializer.serialize_str(name),
            None => serializer.serialize_i32(self.value()),
        }
    }
}

impl<'de> Deserialize<'de> for DataKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct KindVisitor;

        impl Visitor<'_> for KindVisitor {
            type Value = DataKind;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a message kind name or number")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<DataKind, E> {
                DataKind::from_name(v)
                    .or_else(|| v.parse().ok().map(DataKind::from_value))
                    .ok_or_else(|| E::custom(format!("unknown message kind {v:?}")))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<DataKind, E> {
                i32::try_from(v)
                    .map(DataKind::from_value)
                    .map_err(|_| E::custom(format!("message kind {v} out of range")))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<DataKind, E> {
                i32::try_from(v)
                    .map(DataKind::from_value)
                    .map_err(|_| E::custom(format!("message kind {v} out of range")))
            }
        }

        deserializer.deserialize_any(KindVisitor)
    }
}

fn is_zero(v: &i32) -> bool {
    *v == 0
}

/// One data message between crosspoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrosspointData {
    #[serde(rename = "k")]
    kind: DataKind,
    #[serde(rename = "e", default, skip_serializing_if = "is_zero")]
    equipment_id: i32,
    #[serde(rename = "c", default, skip_serializing_if = "BTreeSet::is_empty")]
    control_ids: BTreeSet<i32>,
    #[serde(rename = "b", default, skip_serializing_if = "BTreeSet::is_empty")]
    blobs: BTreeSet<String>,
    #[serde(rename = "s", default, skip_serializing_if = "SigCache::is_empty")]
    signals: SigCache,
}

impl CrosspointData {
    fn new(kind: DataKind, equipment_id: i32, control_ids: impl IntoIterator<Item = i32>) -> Self {
        Self {
            kind,
            equipment_id,
            control_ids: control_ids.into_iter().collect(),
            blobs: BTreeSet::new(),
            signals: SigCache::new(),
        }
    }

    /// General message; attach signals and blobs before sending.
    pub fn message(equipment_id: i32, control_id: i32) -> Self {
        Self::new(DataKind::Message, equipment_id, [control_id])
    }

    /// A control announces interest in an equipment.
    pub fn control_connect(equipment_id: i32, control_id: i32) -> Self {
        Self::new(DataKind::ControlConnect, equipment_id, [control_id])
    }

    /// A control retracts its interest.
    pub fn control_disconnect(equipment_id: i32, control_id: i32) -> Self {
        Self::new(DataKind::ControlDisconnect, equipment_id, [control_id])
    }

    /// Resets the receiving side's view to the given signals.
    pub fn control_clear(equipment_id: i32, control_id: i32, signals: &SigCache) -> Self {
        let data = Self::new(DataKind::ControlClear, equipment_id, [control_id]);
        data.signals.add_all(signals.snapshot());
        data
    }

    /// Brings newly connected controls up to date with every signal that
    /// currently has a value.
    pub fn equipment_connect(
        equipment_id: i32,
        control_ids: impl IntoIterator<Item = i32>,
        signals: &SigCache,
    ) -> Self {
        let data = Self::new(DataKind::EquipmentConnect, equipment_id, control_ids);
        data.signals.add_all(signals.with_values());
        data
    }

    pub fn equipment_disconnect(equipment_id: i32, control_ids: impl IntoIterator<Item = i32>) -> Self {
        Self::new(DataKind::EquipmentDisconnect, equipment_id, control_ids)
    }

    /// Liveness probe carrying a correlation token.
    pub fn ping(equipment_id: i32, control_id: i32, token: impl Into<String>) -> Self {
        let mut data = Self::new(DataKind::Ping, equipment_id, [control_id]);
        data.blobs.insert(token.into());
        data
    }

    /// Answer to a [`ping`](Self::ping), echoing its token.
    pub fn pong(equipment_id: i32, control_id: i32, token: impl Into<String>) -> Self {
        let mut data = Self::new(DataKind::Pong, equipment_id, [control_id]);
        data.blobs.insert(token.into());
        data
    }

    pub fn kind(&self) -> DataKind {
        self.kind
    }

    /// Producer id, 0 when there is none.
    pub fn equipment_id(&self) -> i32 {
        self.equipment_id
    }

    pub fn set_equipment_id(&mut self, equipment_id: i32) {
        self.equipment_id = equipment_id;
    }

    pub fn control_ids(&self) -> &BTreeSet<i32> {
        &self.control_ids
    }

    /// The single addressed control, if exactly one is addressed.
    pub fn control_id(&self) -> Option<i32> {
        match self.control_ids.len() {
            1 => self.control_ids.first().copied(),
            _ => None,
        }
    }

    pub fn add_control_id(&mut self, control_id: i32) -> bool {
        self.control_ids.insert(control_id)
    }

    pub fn remove_control_id(&mut self, control_id: i32) -> bool {
        self.control_ids.remove(&control_id)
    }

    pub fn blobs(&self) -> &BTreeSet<String> {
        &self.blobs
    }

    pub fn add_blob(&mut self, blob: impl Into<String>) -> bool {
        self.blobs.insert(blob.into())
    }

    /// Correlation token of a ping or pong.
    pub fn token(&self) -> Option<&str> {
        match self.kind {
            DataKind::Ping | DataKind::Pong => self.blobs.first().map(String::as_str),
            _ => None,
        }
    }

    pub fn signals(&self) -> &SigCache {
        &self.signals
    }

    pub fn add_signal(&self, sig: Sig) -> bool {
        self.signals.add(sig)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// The document followed by [`SENTINEL`], ready for a stream transport.
    pub fn to_frame(&self) -> Result<Vec<u8>> {
        let mut frame = serde_json::to_vec(self)?;
        frame.push(SENTINEL);
        Ok(frame)
    }

    /// Parses a document, with or without its trailing sentinel.
    pub fn from_frame(frame: &[u8]) -> Result<Self> {
        let document = frame.strip_suffix(&[SENTINEL]).unwrap_or(frame);
        Ok(serde_json::from_slice(document)?)
    }
}

/// A framer splitting a byte stream into envelope documents.
pub fn framer() -> (Framer<DelimiterDecoder>, Frames) {
    Framer::new(DelimiterDecoder::new(SENTINEL))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_carries_ids_only() {
        let data = CrosspointData::control_connect(12, 34);
        assert_eq!(data.kind(), DataKind::ControlConnect);
        assert_eq!(data.to_json().unwrap(), r#"{"k":"ControlConnect","e":12,"c":[34]}"#);
    }

    #[test]
    fn empty_fields_are_omitted() {
        let mut data = CrosspointData::message(0, 0);
        data.remove_control_id(0);
        assert_eq!(data.to_json().unwrap(), r#"{"k":"Message"}"#);
    }

    #[test]
    fn equipment_connect_sends_only_high_signals() {
        let cache: SigCache = [
            Sig::digital(1, true),
            Sig::digital(2, false),
            Sig::analog(1, 0),
            Sig::analog(2, 300),
        ]
        .into_iter()
        .collect();
        let data = CrosspointData::equipment_connect(5, [1, 2], &cache);
        assert_eq!(
            data.signals().snapshot(),
            vec![Sig::digital(1, true), Sig::analog(2, 300)]
        );
        assert_eq!(data.control_id(), None);
    }

    #[test]
    fn control_clear_snapshots_everything() {
        let cache: SigCache = [Sig::digital(1, false), Sig::analog(1, 0)].into_iter().collect();
        let data = CrosspointData::control_clear(5, 9, &cache);
        assert_eq!(data.signals().len(), 2);
        cache.add(Sig::digital(3, true));
        assert_eq!(data.signals().len(), 2);
    }

    #[test]
    fn ping_token_round_trip() {
        let ping = CrosspointData::ping(1, 2, "abc-123");
        let frame = ping.to_frame().unwrap();
        assert_eq!(frame.last(), Some(&SENTINEL));
        let back = CrosspointData::from_frame(&frame).unwrap();
        assert_eq!(back, ping);
        assert_eq!(back.token(), Some("abc-123"));
        assert!(back.signals().is_empty());
    }

    #[test]
    fn unknown_kind_is_preserved_numerically() {
        let data = CrosspointData::from_frame(br#"{"k":4000,"e":3,"x":"new field"}"#).unwrap();
        assert_eq!(data.kind(), DataKind::Unknown(4000));
        assert_eq!(data.equipment_id(), 3);
        assert_eq!(data.to_json().unwrap(), r#"{"k":4000,"e":3}"#);

        let data = CrosspointData::from_frame(br#"{"k":2001}"#).unwrap();
        assert_eq!(data.kind(), DataKind::EquipmentDisconnect);
    }

    #[test]
    fn malformed_document_is_an_error() {
        assert!(CrosspointData::from_frame(b"{\"k\":").is_err());
        assert!(CrosspointData::from_frame(br#"{"k":"Shout"}"#).is_err());
    }

    #[test]
    fn stream_framing_splits_on_sentinel() {
        let (framer, mut frames) = framer();
        let first = CrosspointData::control_connect(1, 2).to_frame().unwrap();
        let mut second = CrosspointData::message(1, 2);
        second.add_blob("{\"rpc\":1}");
        second.add_signal(Sig::serial(4, Some("hello")));
        let second = second.to_frame().unwrap();

        let stream: Vec<u8> = first.iter().chain(second.iter()).copied().collect();
        for chunk in stream.chunks(5) {
            framer.enqueue(chunk);
        }

        let a = CrosspointData::from_frame(&frames.try_recv().unwrap()).unwrap();
        let b = CrosspointData::from_frame(&frames.try_recv().unwrap()).unwrap();
        assert_eq!(a.kind(), DataKind::ControlConnect);
        assert_eq!(b.blobs().len(), 1);
        assert_eq!(b.signals().snapshot(), vec![Sig::serial(4, Some("hello"))]);
        assert!(frames.try_recv().is_err());
    }
}
