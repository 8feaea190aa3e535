//! Enum types for the harvest system.
//!
//! Open-ended enums (origin systems) keep a catch-all `Other(String)` variant
//! so unexpected upstream values survive a round trip. Lifecycle states are
//! closed sets and reject unknown strings.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// Macro: defines an enum with known string variants + a catch-all fallback.
// ---------------------------------------------------------------------------
macro_rules! define_enum {
    (
        $(#[$meta:meta])*
        $name:ident, default = $default:ident, custom_variant = $custom_variant:ident,
        variants: [
            $( ($variant:ident, $str:expr) ),+ $(,)?
        ]
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash)]
        pub enum $name {
            $( $variant, )+
            $custom_variant(String),
        }

        impl $name {
            /// Returns the string representation.
            pub fn as_str(&self) -> &str {
                match self {
                    $( Self::$variant => $str, )+
                    Self::$custom_variant(s) => s.as_str(),
                }
            }

            /// Returns `true` if this is a built-in (non-custom) variant.
            pub fn is_builtin(&self) -> bool {
                !matches!(self, Self::$custom_variant(_))
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::$default
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                Ok(Self::from(s))
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                match s {
                    $( $str => Self::$variant, )+
                    other => Self::$custom_variant(other.to_owned()),
                }
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                match s.as_str() {
                    $( $str => Self::$variant, )+
                    _ => Self::$custom_variant(s),
                }
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Macro: defines a closed enum whose string form must be one of the variants.
// ---------------------------------------------------------------------------
macro_rules! define_closed_enum {
    (
        $(#[$meta:meta])*
        $name:ident, default = $default:ident,
        variants: [
            $( ($variant:ident, $str:expr) ),+ $(,)?
        ]
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $( $variant, )+
        }

        impl $name {
            /// Every variant, in declaration order.
            pub const ALL: &'static [$name] = &[ $( Self::$variant, )+ ];

            /// Returns the string representation.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $( Self::$variant => $str, )+
                }
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::$default
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $( $str => Ok(Self::$variant), )+
                    other => Err(UnknownVariant {
                        kind: stringify!($name),
                        value: other.to_owned(),
                    }),
                }
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

/// A string did not name any variant of a closed enum.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} value: {value:?}")]
pub struct UnknownVariant {
    /// The enum being parsed.
    pub kind: &'static str,
    /// The rejected input.
    pub value: String,
}

// ===========================================================================
// IssueSource
// ===========================================================================

define_enum! {
    /// The external system an issue was harvested from.
    IssueSource, default = Jira, custom_variant = Other,
    variants: [
        (Jira, "jira"),
        (Github, "github"),
    ]
}

// ===========================================================================
// Lifecycle states
// ===========================================================================

define_closed_enum! {
    /// Lifecycle state of a reload tracking row.
    ///
    /// `Running` is the only non-terminal state; at most one row may hold it.
    ReloadStatus, default = Running,
    variants: [
        (Running, "running"),
        (Completed, "completed"),
        (Failed, "failed"),
    ]
}

impl ReloadStatus {
    /// Returns `true` for `completed` and `failed`.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

define_closed_enum! {
    /// What kind of trigger started a reload.
    ReloadSource, default = Manual,
    variants: [
        (Manual, "manual"),
        (Automatic, "automatic"),
        (Scheduled, "scheduled"),
    ]
}

define_closed_enum! {
    /// Lifecycle state of a single harvest pass.
    JobStatus, default = Running,
    variants: [
        (Running, "running"),
        (Completed, "completed"),
        (Failed, "failed"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issue_source_default_is_jira() {
        assert_eq!(IssueSource::default(), IssueSource::Jira);
    }

    #[test]
    fn issue_source_keeps_unknown_values() {
        let s: IssueSource = serde_json::from_str(r#""gitlab""#).unwrap();
        assert_eq!(s, IssueSource::Other("gitlab".into()));
        assert!(!s.is_builtin());
        assert_eq!(serde_json::to_string(&s).unwrap(), r#""gitlab""#);
    }

    #[test]
    fn reload_status_rejects_unknown() {
        let err = "paused".parse::<ReloadStatus>().unwrap_err();
        assert_eq!(err.kind, "ReloadStatus");
        assert!(serde_json::from_str::<ReloadStatus>(r#""paused""#).is_err());
    }

    #[test]
    fn reload_status_terminal() {
        assert!(!ReloadStatus::Running.is_terminal());
        assert!(ReloadStatus::Completed.is_terminal());
        assert!(ReloadStatus::Failed.is_terminal());
    }

    #[test]
    fn reload_source_strings() {
        let all: Vec<&str> = ReloadSource::ALL.iter().map(|s| s.as_str()).collect();
        assert_eq!(all, vec!["manual", "automatic", "scheduled"]);
        assert_eq!("scheduled".parse::<ReloadSource>().unwrap(), ReloadSource::Scheduled);
    }
}
