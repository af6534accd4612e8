use std::fmt;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A JSON-RPC 2.0 request identifier.
///
/// An id is either a 64-bit unsigned number or a string; the variant is
/// authoritative, so `Id::Number(0)` and `Id::Str("0".into())` are distinct
/// ids that serialize as `0` and `"0"` respectively. The empty string is a
/// valid id.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Id {
    /// Numeric id.
    Number(u64),
    /// String id.
    Str(String),
}

impl Id {
    /// Returns `true` when this id is the string variant.
    pub fn is_string(&self) -> bool {
        matches!(self, Id::Str(_))
    }
}

impl Default for Id {
    fn default() -> Self {
        Id::Number(0)
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Id::Number(n) => write!(f, "{n}"),
            // String ids are quoted so that `1` and `"1"` render apart.
            Id::Str(s) => write!(f, "{s:?}"),
        }
    }
}

impl From<u64> for Id {
    fn from(n: u64) -> Self {
        Id::Number(n)
    }
}

impl From<String> for Id {
    fn from(s: String) -> Self {
        Id::Str(s)
    }
}

impl From<&str> for Id {
    fn from(s: &str) -> Self {
        Id::Str(s.to_owned())
    }
}

impl Serialize for Id {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Id::Number(n) => serializer.serialize_u64(*n),
            Id::Str(s) => serializer.serialize_str(s),
        }
    }
}

impl<'de> Deserialize<'de> for Id {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct IdVisitor;

        impl Visitor<'_> for IdVisitor {
            type Value = Id;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a JSON-RPC id (number or string)")
            }

            fn visit_u64<E: de::Error>(self, n: u64) -> Result<Id, E> {
                Ok(Id::Number(n))
            }

            fn visit_i64<E: de::Error>(self, n: i64) -> Result<Id, E> {
                u64::try_from(n)
                    .map(Id::Number)
                    .map_err(|_| E::custom(format!("id out of range: {n}")))
            }

            fn visit_str<E: de::Error>(self, s: &str) -> Result<Id, E> {
                Ok(Id::Str(s.to_owned()))
            }

            fn visit_string<E: de::Error>(self, s: String) -> Result<Id, E> {
                Ok(Id::Str(s))
            }
        }

        deserializer.deserialize_any(IdVisitor)
    }
}
