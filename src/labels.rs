//! Class label tables and per-class display colors.
//!
//! Two loaders exist. [`LabelTable::from_json`] is the preferred strict
//! path: the table must be a JSON object with integer-string keys
//! (`{"0": "person", ...}`). [`LabelTable::parse_compat`] reproduces the
//! legacy brace/split contract for the apostrophe files
//! (`{0: 'person', ...}`) still in circulation; it is lossy by design and
//! documented as such.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

#[derive(thiserror::Error, Debug)]
pub enum LabelError {
    #[error("label table is not valid JSON")]
    Json(#[from] serde_json::Error),

    #[error("label table key is not an integer index: {0:?}")]
    BadKey(String),
}

// ============================================================================
// LabelTable
// ============================================================================

/// Class index -> label name lookup, shared read-only across a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelTable {
    map: HashMap<usize, String>,
}

impl LabelTable {
    /// Parses a strict JSON table `{"0": "label0", ...}`.
    ///
    /// Duplicate keys follow JSON semantics (last one wins).
    ///
    /// # Errors
    ///
    /// Returns [`LabelError::Json`] for malformed JSON and
    /// [`LabelError::BadKey`] when a key is not a plain integer.
    pub fn from_json(text: &str) -> Result<Self, LabelError> {
        let raw: HashMap<String, String> = serde_json::from_str(text)?;
        let mut map = HashMap::with_capacity(raw.len());
        for (key, value) in raw {
            let index: usize = key.parse().map_err(|_| LabelError::BadKey(key.clone()))?;
            map.insert(index, value);
        }
        Ok(Self { map })
    }

    /// Parses the legacy split-based format, both variants:
    /// `{0: 'label', ...}` and `{"0": "label", ...}`.
    ///
    /// The contract is brittle on purpose (it mirrors the files it has to
    /// read): entries split on the literal separator, so a label containing
    /// the separator substring is mangled. Entries that do not split into
    /// exactly two parts, or whose key does not parse, are skipped and
    /// counted.
    #[must_use]
    pub fn parse_compat(text: &str) -> Self {
        let trimmed = text.trim().trim_matches(|c| c == '{' || c == '}');
        let quoted = trimmed.contains("\": \"");
        let (entry_sep, kv_sep, quote) = if quoted {
            ("\", \"", "\": \"", '"')
        } else {
            (", ", ": ", '\'')
        };

        let mut map = HashMap::new();
        let mut skipped = 0usize;
        for entry in trimmed.split(entry_sep) {
            let parts: Vec<&str> = entry.split(kv_sep).collect();
            if parts.len() != 2 {
                skipped += 1;
                continue;
            }
            let key = parts[0].trim().trim_matches(quote);
            let Ok(index) = key.parse::<usize>() else {
                skipped += 1;
                continue;
            };
            let value = parts[1].trim().trim_matches(quote);
            map.insert(index, value.to_owned());
        }

        if skipped > 0 {
            debug!(skipped, "label entries dropped during compat parse");
        }
        Self { map }
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&str> {
        self.map.get(&index).map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Iterates `(index, label)` pairs in arbitrary order.
    pub fn entries(&self) -> impl Iterator<Item = (usize, &str)> + '_ {
        self.map.iter().map(|(&k, v)| (k, v.as_str()))
    }
}

impl FromIterator<(usize, String)> for LabelTable {
    fn from_iter<T: IntoIterator<Item = (usize, String)>>(iter: T) -> Self {
        Self {
            map: iter.into_iter().collect(),
        }
    }
}

// ============================================================================
// Class Colors
// ============================================================================

/// RGB color with components in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rgb {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Rgb {
    /// `#RRGGBB` form, components clamped and quantized to u8.
    #[must_use]
    pub fn hex(&self) -> String {
        let q = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
        format!("#{:02X}{:02X}{:02X}", q(self.r), q(self.g), q(self.b))
    }
}

/// How per-class colors are assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorMode {
    /// Fresh random hue per label on every construction, saturation 1,
    /// value in `[0.5, 1)`.
    Random,
    /// Hash-derived hue and value, stable across runs and processes.
    #[default]
    Deterministic,
}

/// Label -> display color map, built once per run.
#[derive(Debug, Clone)]
pub struct ClassColorMap {
    colors: HashMap<String, Rgb>,
}

impl ClassColorMap {
    #[must_use]
    pub fn new(labels: &LabelTable, mode: ColorMode) -> Self {
        let mut rng = rand::thread_rng();
        let colors = labels
            .entries()
            .map(|(_, label)| {
                let color = match mode {
                    ColorMode::Random => {
                        hsv_to_rgb(rng.gen::<f32>(), 1.0, rng.gen_range(0.5..1.0))
                    }
                    ColorMode::Deterministic => deterministic_color(label),
                };
                (label.to_owned(), color)
            })
            .collect();
        Self { colors }
    }

    #[must_use]
    pub fn get(&self, label: &str) -> Option<Rgb> {
        self.colors.get(label).copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.colors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }
}

/// Hue/value from a blake3 digest of the label; saturation stays 1 so the
/// palette matches the random mode's look.
fn deterministic_color(label: &str) -> Rgb {
    let digest = blake3::hash(label.as_bytes());
    let bytes = digest.as_bytes();
    let hue = f32::from(u16::from_le_bytes([bytes[0], bytes[1]])) / 65_536.0;
    let value = 0.5 + f32::from(bytes[2]) / 255.0 * 0.5;
    hsv_to_rgb(hue, 1.0, value)
}

/// Standard HSV -> RGB, `h` in `[0, 1)`, `s` and `v` in `[0, 1]`.
fn hsv_to_rgb(h: f32, s: f32, v: f32) -> Rgb {
    let h6 = h * 6.0;
    let f = h6 - h6.floor();
    let p = v * (1.0 - s);
    let q = v * (1.0 - s * f);
    let t = v * (1.0 - s * (1.0 - f));
    match h6 as u32 % 6 {
        0 => Rgb { r: v, g: t, b: p },
        1 => Rgb { r: q, g: v, b: p },
        2 => Rgb { r: p, g: v, b: t },
        3 => Rgb { r: p, g: q, b: v },
        4 => Rgb { r: t, g: v, b: q },
        _ => Rgb { r: v, g: p, b: q },
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn coco_subset() -> LabelTable {
        [(0, "person"), (1, "bicycle"), (2, "car")]
            .into_iter()
            .map(|(i, l)| (i, l.to_owned()))
            .collect()
    }

    #[test]
    fn test_from_json_strict() {
        let table = LabelTable::from_json(r#"{"0": "person", "1": "bicycle"}"#).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.get(1), Some("bicycle"));
        assert_eq!(table.get(7), None);
    }

    #[test]
    fn test_from_json_rejects_non_integer_key() {
        assert!(matches!(
            LabelTable::from_json(r#"{"zero": "person"}"#),
            Err(LabelError::BadKey(_))
        ));
        // Strict mode: no whitespace forgiveness in keys.
        assert!(matches!(
            LabelTable::from_json(r#"{" 1": "person"}"#),
            Err(LabelError::BadKey(_))
        ));
    }

    #[test]
    fn test_from_json_rejects_malformed_json() {
        assert!(matches!(
            LabelTable::from_json("{0: 'person'}"),
            Err(LabelError::Json(_))
        ));
    }

    #[test]
    fn test_parse_compat_apostrophe_variant() {
        let table = LabelTable::parse_compat("{0: 'person', 1: 'bicycle', 2: 'car'}");
        assert_eq!(table.len(), 3);
        assert_eq!(table.get(0), Some("person"));
        assert_eq!(table.get(2), Some("car"));
    }

    #[test]
    fn test_parse_compat_quoted_variant() {
        let table = LabelTable::parse_compat(r#"{"0": "tench", "1": "goldfish"}"#);
        assert_eq!(table.len(), 2);
        assert_eq!(table.get(0), Some("tench"));
        assert_eq!(table.get(1), Some("goldfish"));
    }

    #[test]
    fn test_parse_compat_skips_malformed_entries() {
        let table = LabelTable::parse_compat("{0: 'a', garbage, 2: 'c'}");
        assert_eq!(table.len(), 2);
        assert_eq!(table.get(0), Some("a"));
        assert_eq!(table.get(2), Some("c"));
    }

    #[test]
    fn test_parse_compat_skips_bad_keys() {
        let table = LabelTable::parse_compat("{x: 'a', 1: 'b'}");
        assert_eq!(table.len(), 1);
        assert_eq!(table.get(1), Some("b"));
    }

    #[test]
    fn test_parse_compat_separator_in_value_is_lossy() {
        // The split contract cannot represent a label containing ", ".
        let table = LabelTable::parse_compat("{0: 'sofa, long'}");
        assert_eq!(table.len(), 1);
        assert_eq!(table.get(0), Some("sofa"));
    }

    #[test]
    fn test_deterministic_colors_are_stable() {
        let labels = coco_subset();
        let a = ClassColorMap::new(&labels, ColorMode::Deterministic);
        let b = ClassColorMap::new(&labels, ColorMode::Deterministic);
        for (_, label) in labels.entries() {
            assert_eq!(a.get(label), b.get(label));
        }
    }

    #[test]
    fn test_color_map_covers_all_labels() {
        let labels = coco_subset();
        for mode in [ColorMode::Random, ColorMode::Deterministic] {
            let map = ClassColorMap::new(&labels, mode);
            assert_eq!(map.len(), labels.len());
            for (_, label) in labels.entries() {
                let color = map.get(label).unwrap();
                for v in [color.r, color.g, color.b] {
                    assert!((0.0..=1.0).contains(&v), "component {v} out of range");
                }
            }
        }
    }

    #[test]
    fn test_color_map_unknown_label() {
        let map = ClassColorMap::new(&coco_subset(), ColorMode::Deterministic);
        assert!(map.get("zebra").is_none());
    }

    #[test]
    fn test_hsv_primaries() {
        assert_eq!(hsv_to_rgb(0.0, 1.0, 1.0), Rgb { r: 1.0, g: 0.0, b: 0.0 });
        let green = hsv_to_rgb(1.0 / 3.0, 1.0, 1.0);
        assert!(green.g == 1.0 && green.r < 1e-6 && green.b == 0.0);
    }

    #[test]
    fn test_hex_format() {
        let c = Rgb { r: 1.0, g: 0.5, b: 0.0 };
        assert_eq!(c.hex(), "#FF8000");
    }

    proptest! {
        #[test]
        fn hsv_components_bounded(h in 0.0f32..1.0, s in 0.0f32..=1.0, v in 0.0f32..=1.0) {
            let c = hsv_to_rgb(h, s, v);
            for comp in [c.r, c.g, c.b] {
                prop_assert!((0.0..=1.0).contains(&comp));
            }
            // The largest component always equals the value.
            prop_assert!((c.r.max(c.g).max(c.b) - v).abs() < 1e-6);
        }
    }
}
