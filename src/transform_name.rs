//! Coordinate frame naming.
//!
//! Every transform is the relation between two named frames of reference,
//! e.g. Tool and Tracker. The pair resolves to the canonical
//! `"{From}To{To}"` string that prefixes the transform field keys.

use std::fmt::Display;
use std::str::FromStr;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransformName {
    from: String,
    to: String,
}

impl TransformName {
    /// Both frame names must be non-empty and ASCII alphanumeric.
    pub fn new(from: &str, to: &str) -> Result<Self> {
        if !is_frame_name(from) || !is_frame_name(to) {
            bail!("invalid coordinate frame names (from: '{from}', to: '{to}')");
        }
        Ok(Self {
            from: from.to_string(),
            to: to.to_string(),
        })
    }

    pub fn from_frame(&self) -> &str {
        &self.from
    }

    pub fn to_frame(&self) -> &str {
        &self.to
    }

    pub fn is_valid(&self) -> bool {
        is_frame_name(&self.from) && is_frame_name(&self.to)
    }

    /// Canonical string used as the field key prefix.
    pub fn resolve(&self) -> Result<String> {
        if !self.is_valid() {
            bail!(
                "invalid transform name (from: '{}', to: '{}')",
                self.from,
                self.to
            );
        }
        Ok(format!("{}To{}", self.from, self.to))
    }
}

fn is_frame_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric())
}

impl FromStr for TransformName {
    type Err = anyhow::Error;

    /// Split on the single `"To"` separator that is followed by an
    /// uppercase letter, so the `To` inside a name like `Tool` is not
    /// mistaken for the boundary. A trailing `"Transform"` suffix is
    /// stripped first, since stored values may carry it.
    fn from_str(s: &str) -> Result<Self> {
        let name = s.strip_suffix("Transform").unwrap_or(s);
        let mut boundaries = Vec::new();
        for (idx, _) in name.match_indices("To") {
            let next = name[idx + 2..].chars().next();
            if next.map_or(false, |c| c.is_ascii_uppercase()) {
                boundaries.push(idx);
            }
        }
        match boundaries[..] {
            [idx] => Self::new(&name[..idx], &name[idx + 2..]),
            [] => bail!("no 'To' separator in transform name '{s}'"),
            _ => bail!("ambiguous transform name '{s}': multiple 'To' separators"),
        }
    }
}

impl Display for TransformName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}To{}", self.from, self.to)
    }
}

#[cfg(test)]
mod tests {
    use super::TransformName;

    #[test]
    fn resolve_valid_name() {
        let name = TransformName::new("Tool", "Tracker").unwrap();
        assert_eq!(name.resolve().unwrap(), "ToolToTracker");
        assert!(name.is_valid());
    }

    #[test]
    fn reject_bad_frame_names() {
        assert!(TransformName::new("", "Tracker").is_err());
        assert!(TransformName::new("Tool", "").is_err());
        assert!(TransformName::new("Tool Tip", "Tracker").is_err());
    }

    #[test]
    fn default_name_is_invalid() {
        let name = TransformName::default();
        assert!(!name.is_valid());
        assert!(name.resolve().is_err());
    }

    #[test]
    fn parse_splits_on_uppercase_boundary() {
        let name: TransformName = "ToolToTracker".parse().unwrap();
        assert_eq!(name.from_frame(), "Tool");
        assert_eq!(name.to_frame(), "Tracker");
    }

    #[test]
    fn parse_strips_transform_suffix() {
        let name: TransformName = "ToolToTrackerTransform".parse().unwrap();
        assert_eq!(name.resolve().unwrap(), "ToolToTracker");
    }

    #[test]
    fn parse_rejects_missing_or_ambiguous_separator() {
        assert!("Tracker".parse::<TransformName>().is_err());
        assert!("AToBToC".parse::<TransformName>().is_err());
    }
}
