//! Normal form configuration documents.
//!
//! A document maps operation kind names to flag overrides:
//!
//! ```json
//! { "forms": { "binary": { "reorder": false }, "bitmul": { "distribute": true } } }
//! ```
//!
//! Overrides are applied parents first, so a family-wide setting never
//! clobbers a more specific one from the same document.

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::graph::Graph;
use crate::normal_form::Flag;
use crate::operation::OpKind;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NormalFormConfig {
    #[serde(default)]
    pub forms: BTreeMap<String, BTreeMap<Flag, bool>>,
}

impl NormalFormConfig {
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }
}

fn ancestors(kind: OpKind) -> usize {
    std::iter::successors(kind.parent(), |k| k.parent()).count()
}

impl Graph {
    /// Apply every override in `config`.
    ///
    /// Kind names are resolved before any flag is touched; an unknown kind
    /// leaves the graph unchanged. An unsupported flag fails at the point
    /// it is reached.
    pub fn apply_config(&mut self, config: &NormalFormConfig) -> Result<()> {
        let mut overrides = config
            .forms
            .iter()
            .map(|(name, flags)| Ok((OpKind::from_str(name)?, flags)))
            .collect::<Result<Vec<_>>>()?;
        overrides.sort_by_key(|(kind, _)| ancestors(*kind));
        for (kind, flags) in overrides {
            for (&flag, &value) in flags {
                self.set_flag(kind, flag, value)?;
            }
        }
        tracing::debug!(forms = config.forms.len(), "normal form config applied");
        Ok(())
    }

    /// The current flags of every kind, as a document that
    /// [`Graph::apply_config`] accepts.
    pub fn normal_form_config(&self) -> NormalFormConfig {
        let forms = OpKind::all()
            .into_iter()
            .map(|kind| {
                let flags = self.normal_form(kind).flags().collect();
                (kind.name().to_string(), flags)
            })
            .collect();
        NormalFormConfig { forms }
    }
}
