// ABOUTME: Test gate environment values: literals or references to the operator's environment.
// ABOUTME: References are resolved when the gate is built, so a missing variable fails before any run.

use crate::error::{Error, Result};
use serde::{Deserialize, Deserializer};
use std::collections::{BTreeMap, HashMap};

/// Keys starting with this prefix are set by safeship itself.
pub const RESERVED_PREFIX: &str = "SAFESHIP_";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum EnvValue {
    /// `WORKERS: 4`, `DEBUG: false` and `DSN: sqlite://` all land here as text.
    Literal(#[serde(deserialize_with = "scalar_as_string")] String),
    FromEnv {
        #[serde(rename = "env")]
        var: String,
        #[serde(default)]
        default: Option<String>,
    },
}

impl EnvValue {
    pub fn resolve(&self, key: &str) -> Result<String> {
        match self {
            EnvValue::Literal(s) => Ok(s.clone()),
            EnvValue::FromEnv { var, default } => std::env::var(var)
                .ok()
                .or_else(|| default.clone())
                .ok_or_else(|| Error::MissingEnvVar(format!("{var} (for gate.env.{key})"))),
        }
    }
}

/// Resolve every entry; ordered so the gate's environment is logged stably.
pub fn resolve_env_map(map: &HashMap<String, EnvValue>) -> Result<BTreeMap<String, String>> {
    map.iter()
        .map(|(k, v)| v.resolve(k).map(|resolved| (k.clone(), resolved)))
        .collect()
}

pub fn reserved_key(map: &HashMap<String, EnvValue>) -> Option<&str> {
    map.keys()
        .map(String::as_str)
        .find(|k| k.starts_with(RESERVED_PREFIX))
}

fn scalar_as_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Scalar {
        Text(String),
        Int(i64),
        Float(f64),
        Bool(bool),
    }

    Ok(match Scalar::deserialize(deserializer)? {
        Scalar::Text(s) => s,
        Scalar::Int(i) => i.to_string(),
        Scalar::Float(f) => f.to_string(),
        Scalar::Bool(b) => b.to_string(),
    })
}
