//! Memory tags.
//!
//! A tag names the role of a memory entry and uniquely determines its value
//! schema. The fixed set plus the parameterized `anchor:` / `custom:` forms
//! is a stable external contract (UI subscriptions filter on them).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MemoryTag {
    Timer,
    Round,
    Completion,
    Display,
    Controls,
    FragmentDisplay,
    FragmentTracked,
    Handler,
    Anchor(String),
    Custom(String),
}

impl MemoryTag {
    /// `custom:child-index`, the cursor a child runner advances through its
    /// lap groups.
    pub fn child_index() -> Self {
        MemoryTag::Custom("child-index".to_string())
    }

    /// `custom:rest-pending`, set by the rest guard to suppress the next
    /// child push.
    pub fn rest_pending() -> Self {
        MemoryTag::Custom("rest-pending".to_string())
    }
}

impl fmt::Display for MemoryTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemoryTag::Timer => write!(f, "timer"),
            MemoryTag::Round => write!(f, "round"),
            MemoryTag::Completion => write!(f, "completion"),
            MemoryTag::Display => write!(f, "display"),
            MemoryTag::Controls => write!(f, "controls"),
            MemoryTag::FragmentDisplay => write!(f, "fragment:display"),
            MemoryTag::FragmentTracked => write!(f, "fragment:tracked"),
            MemoryTag::Handler => write!(f, "handler"),
            MemoryTag::Anchor(id) => write!(f, "anchor:{id}"),
            MemoryTag::Custom(name) => write!(f, "custom:{name}"),
        }
    }
}

impl FromStr for MemoryTag {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "timer" => MemoryTag::Timer,
            "round" => MemoryTag::Round,
            "completion" => MemoryTag::Completion,
            "display" => MemoryTag::Display,
            "controls" => MemoryTag::Controls,
            "fragment:display" => MemoryTag::FragmentDisplay,
            "fragment:tracked" => MemoryTag::FragmentTracked,
            "handler" => MemoryTag::Handler,
            other => {
                if let Some(id) = other.strip_prefix("anchor:") {
                    MemoryTag::Anchor(id.to_string())
                } else if let Some(name) = other.strip_prefix("custom:") {
                    MemoryTag::Custom(name.to_string())
                } else {
                    return Err(());
                }
            }
        })
    }
}

impl Serialize for MemoryTag {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MemoryTag {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse()
            .map_err(|_| serde::de::Error::custom(format!("unknown memory tag `{s}`")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_forms_round_trip() {
        for tag in [
            MemoryTag::Timer,
            MemoryTag::FragmentDisplay,
            MemoryTag::Anchor("7".into()),
            MemoryTag::Custom("child-index".into()),
        ] {
            let s = tag.to_string();
            assert_eq!(s.parse::<MemoryTag>().unwrap(), tag);
        }
    }

    #[test]
    fn unknown_tags_fail_to_parse() {
        assert!("fragment".parse::<MemoryTag>().is_err());
    }
}
