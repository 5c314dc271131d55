//! Control signals.
//!
//! A [`Sig`] is one addressable value: a digital (bool), analog (u16) or
//! serial (text) signal, keyed by number or name plus a smart-object
//! sub-address.  [`SigCache`] holds the latest value per key and is what the
//! envelope protocol carries.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

mod cache;
pub mod xsig;

pub use cache::SigCache;

/// The kind of value a sig carries.  Serialised as its number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum SigType {
    Digital = 0,
    Analog = 1,
    Serial = 2,
}

impl From<SigType> for u8 {
    fn from(ty: SigType) -> Self {
        ty as u8
    }
}

impl TryFrom<u8> for SigType {
    type Error = String;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Digital),
            1 => Ok(Self::Analog),
            2 => Ok(Self::Serial),
            other => Err(format!("unknown sig type {other}")),
        }
    }
}

/// Payload of a sig; the variant always agrees with the sig type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SigValue {
    Digital(bool),
    Analog(u16),
    Serial(Option<String>),
}

impl SigValue {
    pub fn sig_type(&self) -> SigType {
        match self {
            Self::Digital(_) => SigType::Digital,
            Self::Analog(_) => SigType::Analog,
            Self::Serial(_) => SigType::Serial,
        }
    }

    fn cleared(&self) -> Self {
        match self {
            Self::Digital(_) => Self::Digital(false),
            Self::Analog(_) => Self::Analog(0),
            Self::Serial(_) => Self::Serial(None),
        }
    }
}

/// Cache key of a sig: everything except the value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SigKey {
    pub sig_type: SigType,
    pub number: u32,
    pub name: Option<String>,
    pub smart_object: u16,
}

/// One control signal value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "WireSig", try_from = "WireSig")]
pub struct Sig {
    number: u32,
    name: Option<String>,
    smart_object: u16,
    value: SigValue,
}

impl Sig {
    pub fn digital(number: u32, value: bool) -> Self {
        Self::numbered(number, SigValue::Digital(value))
    }

    pub fn analog(number: u32, value: u16) -> Self {
        Self::numbered(number, SigValue::Analog(value))
    }

    pub fn serial(number: u32, value: Option<impl Into<String>>) -> Self {
        Self::numbered(number, SigValue::Serial(value.map(Into::into)))
    }

    /// A sig addressed by name instead of number.
    pub fn named(name: impl Into<String>, value: SigValue) -> Self {
        Self {
            number: 0,
            name: Some(name.into()),
            smart_object: 0,
            value,
        }
    }

    fn numbered(number: u32, value: SigValue) -> Self {
        Self {
            number,
            name: None,
            smart_object: 0,
            value,
        }
    }

    pub fn with_smart_object(mut self, smart_object: u16) -> Self {
        self.smart_object = smart_object;
        self
    }

    pub fn sig_type(&self) -> SigType {
        self.value.sig_type()
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn smart_object(&self) -> u16 {
        self.smart_object
    }

    pub fn value(&self) -> &SigValue {
        &self.value
    }

    pub fn bool_value(&self) -> Result<bool> {
        match self.value {
            SigValue::Digital(v) => Ok(v),
            _ => Err(self.mismatch(SigType::Digital)),
        }
    }

    pub fn ushort_value(&self) -> Result<u16> {
        match self.value {
            SigValue::Analog(v) => Ok(v),
            _ => Err(self.mismatch(SigType::Analog)),
        }
    }

    pub fn string_value(&self) -> Result<Option<&str>> {
        match &self.value {
            SigValue::Serial(v) => Ok(v.as_deref()),
            _ => Err(self.mismatch(SigType::Serial)),
        }
    }

    /// High digital, non-zero analog or present serial.
    pub fn has_value(&self) -> bool {
        match &self.value {
            SigValue::Digital(v) => *v,
            SigValue::Analog(v) => *v != 0,
            SigValue::Serial(v) => v.is_some(),
        }
    }

    /// Same key, no value.
    pub fn cleared(&self) -> Self {
        Self {
            value: self.value.cleared(),
            ..self.clone()
        }
    }

    pub fn key(&self) -> SigKey {
        SigKey {
            sig_type: self.sig_type(),
            number: self.number,
            name: self.name.clone(),
            smart_object: self.smart_object,
        }
    }

    fn mismatch(&self, expected: SigType) -> Error {
        Error::SigTypeMismatch {
            expected,
            actual: self.sig_type(),
        }
    }
}

impl fmt::Display for Sig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{:?}[{}]", self.sig_type(), name)?,
            None => write!(f, "{:?}[{}]", self.sig_type(), self.number)?,
        }
        if self.smart_object != 0 {
            write!(f, "@{}", self.smart_object)?;
        }
        match &self.value {
            SigValue::Digital(v) => write!(f, "={v}"),
            SigValue::Analog(v) => write!(f, "={v}"),
            SigValue::Serial(Some(v)) => write!(f, "={v:?}"),
            SigValue::Serial(None) => write!(f, "=null"),
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum WireValue {
    Bool(bool),
    Number(u16),
    Text(String),
}

#[derive(Serialize, Deserialize)]
struct WireSig {
    #[serde(rename = "t")]
    sig_type: SigType,
    #[serde(rename = "n", default, skip_serializing_if = "is_zero_u32")]
    number: u32,
    #[serde(rename = "nm", default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(rename = "o", default, skip_serializing_if = "is_zero_u16")]
    smart_object: u16,
    #[serde(rename = "v", default, skip_serializing_if = "Option::is_none")]
    value: Option<WireValue>,
}

fn is_zero_u32(v: &u32) -> bool {
    *v == 0
}

fn is_zero_u16(v: &u16) -> bool {
    *v == 0
}

impl From<Sig> for WireSig {
    fn from(sig: Sig) -> Self {
        let sig_type = sig.sig_type();
        let value = match sig.value {
            SigValue::Digital(false) | SigValue::Analog(0) | SigValue::Serial(None) => None,
            SigValue::Digital(v) => Some(WireValue::Bool(v)),
            SigValue::Analog(v) => Some(WireValue::Number(v)),
            SigValue::Serial(Some(v)) => Some(WireValue::Text(v)),
        };
        Self {
            sig_type,
            number: sig.number,
            name: sig.name,
            smart_object: sig.smart_object,
            value,
        }
    }
}

impl TryFrom<WireSig> for Sig {
    type Error = String;

    fn try_from(wire: WireSig) -> std::result::Result<Self, Self::Error> {
        let value = match (wire.sig_type, wire.value) {
            (SigType::Digital, None) => SigValue::Digital(false),
            (SigType::Digital, Some(WireValue::Bool(v))) => SigValue::Digital(v),
            (SigType::Analog, None) => SigValue::Analog(0),
            (SigType::Analog, Some(WireValue::Number(v))) => SigValue::Analog(v),
            (SigType::Serial, None) => SigValue::Serial(None),
            (SigType::Serial, Some(WireValue::Text(v))) => SigValue::Serial(Some(v)),
            (ty, Some(_)) => return Err(format!("value does not match sig type {ty:?}")),
        };
        Ok(Self {
            number: wire.number,
            name: wire.name,
            smart_object: wire.smart_object,
            value,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn has_value_per_type() {
        assert!(Sig::digital(1, true).has_value());
        assert!(!Sig::digital(1, false).has_value());
        assert!(Sig::analog(1, 3).has_value());
        assert!(!Sig::analog(1, 0).has_value());
        assert!(Sig::serial(1, Some("")).has_value());
        assert!(!Sig::serial(1, None::<String>).has_value());
    }

    #[test]
    fn mismatched_accessor_fails() {
        let sig = Sig::analog(4, 100);
        assert_eq!(sig.ushort_value().unwrap(), 100);
        assert!(matches!(
            sig.bool_value(),
            Err(Error::SigTypeMismatch {
                expected: SigType::Digital,
                actual: SigType::Analog
            })
        ));
        assert!(sig.string_value().is_err());
    }

    #[test]
    fn key_ignores_value_but_equality_does_not() {
        let a = Sig::analog(4, 1).with_smart_object(2);
        let b = Sig::analog(4, 9).with_smart_object(2);
        assert_eq!(a.key(), b.key());
        assert_ne!(a, b);
        assert_ne!(a.key(), Sig::digital(4, true).with_smart_object(2).key());
    }

    #[test]
    fn cleared_keeps_key() {
        let sig = Sig::serial(3, Some("on air"));
        let cleared = sig.cleared();
        assert_eq!(cleared.key(), sig.key());
        assert!(!cleared.has_value());
    }

    #[test]
    fn compact_json() {
        let json = serde_json::to_string(&Sig::digital(12, true)).unwrap();
        assert_eq!(json, r#"{"t":0,"n":12,"v":true}"#);
        let json = serde_json::to_string(&Sig::analog(5, 0).with_smart_object(3)).unwrap();
        assert_eq!(json, r#"{"t":1,"n":5,"o":3}"#);
        let json =
            serde_json::to_string(&Sig::named("Volume", SigValue::Analog(42))).unwrap();
        assert_eq!(json, r#"{"t":1,"nm":"Volume","v":42}"#);

        let back: Sig = serde_json::from_str(r#"{"t":2,"n":1,"v":"text"}"#).unwrap();
        assert_eq!(back, Sig::serial(1, Some("text")));
    }

    #[test]
    fn value_of_wrong_type_is_rejected() {
        assert!(serde_json::from_str::<Sig>(r#"{"t":0,"n":1,"v":"yes"}"#).is_err());
        assert!(serde_json::from_str::<Sig>(r#"{"t":9,"n":1}"#).is_err());
    }
}
