use crate::services::error::MediaError;
use std::collections::{BTreeMap, HashMap};

/// Recognized parameters of one action: value-carrying prefixes
/// (`size300x900` -> `size = 300x900`) and bare flags that alias to a
/// dictionary key (`backgroundblur` -> `resizetype = backgroundblur`).
struct ActionParams {
    prefixes: &'static [&'static str],
    flags: &'static [(&'static str, &'static str)],
}

/// Normalizes a raw action-parameter list into a stable, order-independent
/// key fragment. The same semantic request always yields the same string,
/// regardless of parameter order or case.
pub struct Canonicalizer {
    actions: HashMap<&'static str, ActionParams>,
}

impl Default for Canonicalizer {
    fn default() -> Self {
        let mut actions = HashMap::new();
        actions.insert(
            "master",
            ActionParams {
                prefixes: &[],
                flags: &[],
            },
        );
        actions.insert(
            "resize",
            ActionParams {
                prefixes: &["size", "format", "background", "resizetype", "overlay"],
                flags: &[
                    ("keep", "resizetype"),
                    ("stretch", "resizetype"),
                    ("crop", "resizetype"),
                    ("extent", "resizetype"),
                    ("backgroundblur", "resizetype"),
                ],
            },
        );
        Self { actions }
    }
}

impl Canonicalizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lower-cases action and tokens, drops tokens outside the action's
    /// allow-list, splits each kept token into key and value, and
    /// re-serializes as `key+value` fragments sorted by key, joined with `/`.
    pub fn canonicalize(
        &self,
        action: &str,
        params: &[&str],
    ) -> Result<CanonicalRequest, MediaError> {
        let action = action.to_lowercase();
        let recognized = self
            .actions
            .get(action.as_str())
            .ok_or_else(|| MediaError::InvalidAction(format!("action {action} not allowed")))?;

        let mut values = BTreeMap::new();
        for param in params {
            let param = param.to_lowercase();
            if param.is_empty() {
                continue;
            }
            if let Some((_, key)) = recognized.flags.iter().find(|(flag, _)| *flag == param) {
                values.insert(key.to_string(), param);
                continue;
            }
            // Longest matching prefix wins so `background` never captures a
            // longer recognized token.
            if let Some(prefix) = recognized
                .prefixes
                .iter()
                .filter(|p| param.starts_with(**p))
                .max_by_key(|p| p.len())
            {
                // Accept both the raw form (`size300x900`) and the already
                // canonical form (`size+300x900`).
                let value = param[prefix.len()..]
                    .strip_prefix('+')
                    .unwrap_or(&param[prefix.len()..]);
                values.insert(prefix.to_string(), value.to_string());
            }
        }

        let canonical = values
            .iter()
            .map(|(k, v)| format!("{k}+{v}"))
            .collect::<Vec<_>>()
            .join("/");

        Ok(CanonicalRequest {
            action,
            values,
            canonical,
        })
    }
}

/// Result of canonicalization: the normalized action, the parameter
/// dictionary for the transformation engine, and the serialized cache-key
/// fragment.
#[derive(Debug, Clone)]
pub struct CanonicalRequest {
    pub action: String,
    pub values: BTreeMap<String, String>,
    pub canonical: String,
}
