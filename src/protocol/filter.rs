//! Filter Spec carried by `:filter-<payload>`
//!
//! The payload is a JSON object mapping filter names to CSS-style arguments,
//! e.g. `{"sepia":"0.4","hue-rotate":"90deg"}`. Key order is significant
//! (filters compose left to right) so the spec keeps entries in payload order.

use std::fmt;
use std::str::FromStr;

use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// The fixed set of filters a spec may name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterName {
    Sepia,
    Grayscale,
    Brightness,
    Contrast,
    Saturate,
    Invert,
    Opacity,
    HueRotate,
}

impl FilterName {
    /// CSS function name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sepia => "sepia",
            Self::Grayscale => "grayscale",
            Self::Brightness => "brightness",
            Self::Contrast => "contrast",
            Self::Saturate => "saturate",
            Self::Invert => "invert",
            Self::Opacity => "opacity",
            Self::HueRotate => "hue-rotate",
        }
    }
}

impl fmt::Display for FilterName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FilterName {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sepia" => Ok(Self::Sepia),
            "grayscale" => Ok(Self::Grayscale),
            "brightness" => Ok(Self::Brightness),
            "contrast" => Ok(Self::Contrast),
            "saturate" => Ok(Self::Saturate),
            "invert" => Ok(Self::Invert),
            "opacity" => Ok(Self::Opacity),
            "hue-rotate" => Ok(Self::HueRotate),
            _ => Err(()),
        }
    }
}

/// One `name(value)` entry of a spec
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterEntry {
    pub name: FilterName,
    /// Argument exactly as received (`"0.5"`, `"50%"`, `"90deg"`)
    pub value: String,
}

impl FilterEntry {
    /// Numeric amount of the argument
    ///
    /// Percentages become fractions; for `hue-rotate` the result is in degrees
    /// (`deg`, `rad`, `turn` and bare numbers accepted). Returns `None` when
    /// the argument is not a number.
    #[must_use]
    pub fn amount(&self) -> Option<f32> {
        let raw = self.value.trim();
        if self.name == FilterName::HueRotate {
            return parse_angle(raw);
        }
        if let Some(pct) = raw.strip_suffix('%') {
            return pct.trim().parse::<f32>().ok().map(|p| p / 100.0);
        }
        raw.parse().ok()
    }
}

fn parse_angle(raw: &str) -> Option<f32> {
    if let Some(deg) = raw.strip_suffix("deg") {
        deg.trim().parse().ok()
    } else if let Some(turn) = raw.strip_suffix("turn") {
        turn.trim().parse::<f32>().ok().map(|t| t * 360.0)
    } else if let Some(rad) = raw.strip_suffix("rad") {
        rad.trim().parse::<f32>().ok().map(f32::to_degrees)
    } else {
        raw.parse().ok()
    }
}

/// Ordered set of filters applied at capture time
///
/// A spec is always replaced as a whole on each selection change, never merged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterSpec {
    entries: Vec<FilterEntry>,
}

impl FilterSpec {
    /// Empty spec (no filtering)
    #[must_use]
    pub const fn none() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Append an entry, replacing an earlier entry with the same name in place
    #[must_use]
    pub fn with(mut self, name: FilterName, value: impl Into<String>) -> Self {
        let value = value.into();
        if let Some(existing) = self.entries.iter_mut().find(|e| e.name == name) {
            existing.value = value;
        } else {
            self.entries.push(FilterEntry { name, value });
        }
        self
    }

    /// Decode a JSON payload
    ///
    /// # Errors
    ///
    /// Returns the JSON error when the payload is not an object of
    /// string/number values
    pub fn from_json(payload: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(payload)
    }

    /// Encode as the compact JSON payload, entries in order
    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }

    /// CSS `filter` string for the live preview (`"sepia(0.4) hue-rotate(90deg)"`)
    #[must_use]
    pub fn css(&self) -> String {
        self.entries
            .iter()
            .map(|e| format!("{}({})", e.name, e.value))
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[must_use]
    pub fn entries(&self) -> &[FilterEntry] {
        &self.entries
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for FilterSpec {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for entry in &self.entries {
            map.serialize_entry(entry.name.as_str(), &entry.value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for FilterSpec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(FilterSpecVisitor)
    }
}

struct FilterSpecVisitor;

impl<'de> Visitor<'de> for FilterSpecVisitor {
    type Value = FilterSpec;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an object mapping filter names to arguments")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
        let mut spec = FilterSpec::none();
        while let Some((key, value)) = access.next_entry::<String, serde_json::Value>()? {
            let value = match value {
                serde_json::Value::String(s) => s,
                serde_json::Value::Number(n) => n.to_string(),
                serde_json::Value::Null => continue,
                other => {
                    return Err(de::Error::custom(format!(
                        "filter '{key}' has non-scalar argument {other}"
                    )));
                }
            };
            match key.parse::<FilterName>() {
                Ok(name) => spec = spec.with(name, value),
                Err(()) => tracing::debug!(filter = %key, "ignoring unknown filter"),
            }
        }
        Ok(spec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_keeps_order() {
        let spec =
            FilterSpec::from_json(r#"{"sepia":"0.4","brightness":"1.1","hue-rotate":"90deg"}"#)
                .unwrap();
        let names: Vec<_> = spec.entries().iter().map(|e| e.name).collect();
        assert_eq!(
            names,
            vec![FilterName::Sepia, FilterName::Brightness, FilterName::HueRotate]
        );
        assert_eq!(spec.css(), "sepia(0.4) brightness(1.1) hue-rotate(90deg)");
    }

    #[test]
    fn unknown_and_null_entries_are_dropped() {
        let spec = FilterSpec::from_json(r#"{"blur":"4px","contrast":null,"invert":1}"#).unwrap();
        assert_eq!(spec.entries().len(), 1);
        assert_eq!(spec.entries()[0].name, FilterName::Invert);
        assert_eq!(spec.entries()[0].value, "1");
    }

    #[test]
    fn malformed_payload_is_an_error() {
        assert!(FilterSpec::from_json("{\"sepia\":").is_err());
        assert!(FilterSpec::from_json("[1,2]").is_err());
        assert!(FilterSpec::from_json(r#"{"sepia":[1]}"#).is_err());
    }

    #[test]
    fn json_matches_decoder() {
        let spec = FilterSpec::none()
            .with(FilterName::Grayscale, "100%")
            .with(FilterName::Contrast, "1.2");
        assert_eq!(spec.to_json(), r#"{"grayscale":"100%","contrast":"1.2"}"#);
        assert_eq!(FilterSpec::from_json(&spec.to_json()).unwrap(), spec);
    }

    #[test]
    fn amounts() {
        let e = |name, v: &str| FilterEntry {
            name,
            value: v.to_string(),
        };
        assert_eq!(e(FilterName::Sepia, "50%").amount(), Some(0.5));
        assert_eq!(e(FilterName::Brightness, "1.25").amount(), Some(1.25));
        assert_eq!(e(FilterName::HueRotate, "0.5turn").amount(), Some(180.0));
        assert_eq!(e(FilterName::HueRotate, "45deg").amount(), Some(45.0));
        assert_eq!(e(FilterName::Contrast, "lots").amount(), None);
    }
}
