use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

macro_rules! branded_id {
    ($name:ident, $prefix:expr) => {
        #[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new() -> Self {
                Self(format!("{}_{}", $prefix, Uuid::now_v7()))
            }

            pub fn from_raw(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = std::convert::Infallible;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(s.to_owned()))
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

branded_id!(ConversationId, "conv");
branded_id!(RunId, "run");
branded_id!(ToolCallId, "call");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_carry_kind_prefix() {
        assert!(ConversationId::new().as_str().starts_with("conv_"));
        assert!(RunId::new().as_str().starts_with("run_"));
        assert!(ToolCallId::new().as_str().starts_with("call_"));
    }

    // Snapshot files are named by run id and listed in sorted order.
    #[test]
    fn run_ids_sort_by_creation() {
        let ids: Vec<RunId> = (0..50).map(|_| RunId::new()).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
    }

    #[test]
    fn model_supplied_call_ids_kept_verbatim() {
        let id: ToolCallId = "toolu_01 ABC".parse().unwrap();
        assert_eq!(id.as_str(), "toolu_01 ABC");
        assert_eq!(serde_json::to_string(&id).unwrap(), r#""toolu_01 ABC""#);
    }
}
