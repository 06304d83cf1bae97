use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// The fixed mouth-shape vocabulary. Serialized by its label (`"W-Oo"`, `"Neutral"`...).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Shape {
    Neutral,
    M,
    S,
    D,
    Ee,
    Aa,
    Uh,
    Oh,
    R,
    WOo,
    F,
    L,
    Smile,
    Surprised,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShapeCategory {
    Vowel,
    Consonant,
    Silence,
    Expression,
    /// Only carried by the hardcoded fallback choice when a catalog has nothing usable.
    Fallback,
}

impl Shape {
    pub const ALL: [Shape; 14] = [
        Shape::Neutral,
        Shape::M,
        Shape::S,
        Shape::D,
        Shape::Ee,
        Shape::Aa,
        Shape::Uh,
        Shape::Oh,
        Shape::R,
        Shape::WOo,
        Shape::F,
        Shape::L,
        Shape::Smile,
        Shape::Surprised,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Shape::Neutral => "Neutral",
            Shape::M => "M",
            Shape::S => "S",
            Shape::D => "D",
            Shape::Ee => "Ee",
            Shape::Aa => "Aa",
            Shape::Uh => "Uh",
            Shape::Oh => "Oh",
            Shape::R => "R",
            Shape::WOo => "W-Oo",
            Shape::F => "F",
            Shape::L => "L",
            Shape::Smile => "Smile",
            Shape::Surprised => "Surprised",
        }
    }

    pub fn category(self) -> ShapeCategory {
        match self {
            Shape::Neutral => ShapeCategory::Silence,
            Shape::Ee | Shape::Aa | Shape::Uh | Shape::Oh => ShapeCategory::Vowel,
            Shape::Smile | Shape::Surprised => ShapeCategory::Expression,
            _ => ShapeCategory::Consonant,
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Shape::Neutral => "Closed mouth for silence",
            Shape::M => "Lips pressed together",
            Shape::S => "Tongue against teeth",
            Shape::D => "Tongue to roof of mouth",
            Shape::Ee => "Wide smile shape",
            Shape::Aa => "Open mouth for vowels",
            Shape::Uh => "Neutral open mouth",
            Shape::Oh => "Rounded lips",
            Shape::R => "Pursed lips for R sound",
            Shape::WOo => "Very rounded lips",
            Shape::F => "Lower lip to upper teeth",
            Shape::L => "Tongue visible",
            Shape::Smile => "Happy expression",
            Shape::Surprised => "Wide open mouth",
        }
    }

    /// Position in [`Shape::ALL`].
    pub fn ordinal(self) -> usize {
        self as usize
    }

    /// Case-insensitive match against a label such as `"w-oo"` or `"NEUTRAL"`.
    pub fn from_label(label: &str) -> Option<Shape> {
        let lower = label.trim().to_ascii_lowercase();
        let key: String = lower.chars().filter(|c| *c != '-' && *c != '_').collect();
        Shape::ALL
            .iter()
            .copied()
            .find(|s| s.name().to_ascii_lowercase().replace('-', "") == key)
    }

    /// Recognise an image file name such as `mouth_Aa.png` or `shape-w-oo.svg`.
    ///
    /// The extension is dropped, then a leading `mouth`, `shape`, `frame` or
    /// `phoneme` prefix (with optional `_`), then any `-`/`_` separators. The
    /// remainder must equal a label exactly, ignoring case.
    pub fn from_file_name(file_name: &str) -> Option<Shape> {
        let base = file_name.rsplit('/').next().unwrap_or(file_name);
        let stem = match base.rfind('.') {
            Some(dot) if dot > 0 => &base[..dot],
            _ => base,
        };
        let lower = stem.to_ascii_lowercase();

        let mut rest = lower.as_str();
        for prefix in ["mouth", "shape", "frame", "phoneme"] {
            if let Some(stripped) = rest.strip_prefix(prefix) {
                rest = stripped.strip_prefix('_').unwrap_or(stripped);
                break;
            }
        }

        let cleaned: String = rest.chars().filter(|c| *c != '-' && *c != '_').collect();
        if cleaned.is_empty() {
            return None;
        }
        Shape::ALL
            .iter()
            .copied()
            .find(|s| s.name().to_ascii_lowercase().replace('-', "") == cleaned)
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Shape {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Shape::from_label(s).ok_or_else(|| {
            format!(
                "unknown shape '{}', expected one of: {}",
                s,
                Shape::ALL.iter().map(|s| s.name()).collect::<Vec<_>>().join(", ")
            )
        })
    }
}

impl Serialize for Shape {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for Shape {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let label = String::deserialize(deserializer)?;
        label.parse().map_err(serde::de::Error::custom)
    }
}

impl fmt::Display for ShapeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ShapeCategory::Vowel => "vowel",
            ShapeCategory::Consonant => "consonant",
            ShapeCategory::Silence => "silence",
            ShapeCategory::Expression => "expression",
            ShapeCategory::Fallback => "fallback",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordinals_follow_vocabulary_order() {
        for (i, shape) in Shape::ALL.iter().enumerate() {
            assert_eq!(shape.ordinal(), i);
        }
    }

    #[test]
    fn recognises_prefixed_file_names() {
        assert_eq!(Shape::from_file_name("mouth_Aa.png"), Some(Shape::Aa));
        assert_eq!(Shape::from_file_name("shape_ee.svg"), Some(Shape::Ee));
        assert_eq!(Shape::from_file_name("images/phoneme-neutral.PNG"), Some(Shape::Neutral));
        assert_eq!(Shape::from_file_name("w-oo.webp"), Some(Shape::WOo));
        assert_eq!(Shape::from_file_name("MOUTH_W_OO.png"), Some(Shape::WOo));
        assert_eq!(Shape::from_file_name("Surprised.jpg"), Some(Shape::Surprised));
    }

    #[test]
    fn ignores_unrecognised_names() {
        assert_eq!(Shape::from_file_name("shape_00.png"), None);
        assert_eq!(Shape::from_file_name("mouth_.png"), None);
        assert_eq!(Shape::from_file_name("ahh.png"), None);
        assert_eq!(Shape::from_file_name("uh_open.png"), None);
    }

    #[test]
    fn categories_are_static() {
        assert_eq!(Shape::Neutral.category(), ShapeCategory::Silence);
        assert_eq!(Shape::Oh.category(), ShapeCategory::Vowel);
        assert_eq!(Shape::WOo.category(), ShapeCategory::Consonant);
        assert_eq!(Shape::Smile.category(), ShapeCategory::Expression);
    }

    #[test]
    fn parses_labels() {
        assert_eq!("uh".parse::<Shape>().unwrap(), Shape::Uh);
        assert_eq!("W-Oo".parse::<Shape>().unwrap(), Shape::WOo);
        assert!("Xx".parse::<Shape>().is_err());
    }
}
