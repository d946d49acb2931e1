//! Tagged values returned by component and MBean queries.
//!
//! The component RPC surface cannot carry 64-bit integers natively, so the
//! remote side encodes large numbers as strings, usually with a trailing
//! `L` (`"12345L"`). [`unfix_value`] turns those back into integers,
//! recursing through lists and maps.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A value read from a component: scalar, sequence, or keyed mapping.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BeanValue {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<BeanValue>),
    Map(BTreeMap<String, BeanValue>),
}

impl BeanValue {
    /// Integer view. Floats are truncated; numeric strings are parsed.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            BeanValue::Int(v) => Some(*v),
            BeanValue::Float(v) => Some(*v as i64),
            BeanValue::Str(s) => parse_decorated_int(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            BeanValue::Int(v) => Some(*v as f64),
            BeanValue::Float(v) => Some(*v),
            BeanValue::Str(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            BeanValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[BeanValue]> {
        match self {
            BeanValue::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, BeanValue>> {
        match self {
            BeanValue::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Integer element at `index` of a list value.
    pub fn int_at(&self, index: usize) -> Option<i64> {
        self.as_list()?.get(index)?.as_i64()
    }

    /// Builds a map value from `(key, value)` pairs.
    pub fn map<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, BeanValue)>,
    {
        BeanValue::Map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Encodes an integer the way the remote side expects large values.
    pub fn decorated(value: i64) -> Self {
        BeanValue::Str(format!("{}L", value))
    }
}

impl fmt::Display for BeanValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BeanValue::Null => f.write_str("None"),
            BeanValue::Bool(v) => write!(f, "{}", v),
            BeanValue::Int(v) => write!(f, "{}", v),
            BeanValue::Float(v) => write!(f, "{}", v),
            BeanValue::Str(s) => f.write_str(s),
            BeanValue::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
            BeanValue::Map(map) => {
                f.write_str("{")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                f.write_str("}")
            }
        }
    }
}

impl From<i64> for BeanValue {
    fn from(v: i64) -> Self {
        BeanValue::Int(v)
    }
}

impl From<i32> for BeanValue {
    fn from(v: i32) -> Self {
        BeanValue::Int(v as i64)
    }
}

impl From<u32> for BeanValue {
    fn from(v: u32) -> Self {
        BeanValue::Int(v as i64)
    }
}

impl From<u64> for BeanValue {
    fn from(v: u64) -> Self {
        i64::try_from(v)
            .map(BeanValue::Int)
            .unwrap_or_else(|_| BeanValue::Str(format!("{}L", v)))
    }
}

impl From<f64> for BeanValue {
    fn from(v: f64) -> Self {
        BeanValue::Float(v)
    }
}

impl From<bool> for BeanValue {
    fn from(v: bool) -> Self {
        BeanValue::Bool(v)
    }
}

impl From<&str> for BeanValue {
    fn from(v: &str) -> Self {
        BeanValue::Str(v.to_string())
    }
}

impl From<String> for BeanValue {
    fn from(v: String) -> Self {
        BeanValue::Str(v)
    }
}

impl<T: Into<BeanValue>> From<Vec<T>> for BeanValue {
    fn from(v: Vec<T>) -> Self {
        BeanValue::List(v.into_iter().map(Into::into).collect())
    }
}

/// Parses `"123"` or `"123L"` as an integer.
fn parse_decorated_int(s: &str) -> Option<i64> {
    let digits = s.strip_suffix('L').unwrap_or(s);
    digits.parse().ok()
}

/// Converts numbers masquerading as strings back into integers.
///
/// Strings that parse as integers (with or without a trailing `L`) become
/// [`BeanValue::Int`]; lists and maps are converted element by element; all
/// other values pass through. Applying it twice yields the same result.
pub fn unfix_value(value: BeanValue) -> BeanValue {
    match value {
        BeanValue::Str(s) => match parse_decorated_int(&s) {
            Some(v) => BeanValue::Int(v),
            None => BeanValue::Str(s),
        },
        BeanValue::List(items) => BeanValue::List(items.into_iter().map(unfix_value).collect()),
        BeanValue::Map(map) => {
            BeanValue::Map(map.into_iter().map(|(k, v)| (k, unfix_value(v))).collect())
        }
        other => other,
    }
}
