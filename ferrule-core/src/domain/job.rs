//! Job domain types

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Job definition as declared in a YAML job document
///
/// The `product` bag is interpreted by the executor named in `executor`;
/// the engine itself only reads `executor`, `type`, `artifacts` and `callback`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobDefinition {
    /// Declared identifier, optional on input
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,

    /// Job kind (e.g. "lxc_create"); drives the shortcut table
    #[serde(rename = "type", default)]
    pub kind: String,

    /// Name of the executor capability that runs this job
    #[serde(default)]
    pub executor: String,

    /// Executor-specific parameter bag
    #[serde(default, deserialize_with = "null_as_default")]
    pub product: Map<String, Value>,

    /// Files to copy out of the job sandbox once the executor returns
    #[serde(default, deserialize_with = "null_as_default")]
    pub artifacts: Vec<Artifact>,

    /// Variables exported to the executor (values may contain placeholders)
    #[serde(default, deserialize_with = "scalar_map")]
    pub variables: BTreeMap<String, String>,

    /// Job-level completion callback, overrides the runner default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback: Option<CallbackConfig>,
}

impl JobDefinition {
    /// Returns the declared identifier if it is present and non-blank
    pub fn declared_id(&self) -> Option<&str> {
        self.job_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }

    /// Returns the job-level callback target if one is configured
    pub fn callback_target(&self) -> Option<&CallbackConfig> {
        self.callback.as_ref().filter(|c| c.is_configured())
    }
}

/// Artifact declaration: a path pattern relative to the job sandbox
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub path: String,
    #[serde(rename = "type", default)]
    pub kind: String,
}

/// Completion callback target
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackConfig {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub secret: String,
}

impl CallbackConfig {
    pub fn is_configured(&self) -> bool {
        !self.url.trim().is_empty()
    }
}

/// A job definition after loading, with both of its identifiers assigned
///
/// `declared_id` is what other jobs use in placeholders. `runtime_id` names
/// the working directory, log file and result document on disk.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedJob {
    pub declared_id: String,
    pub runtime_id: String,
    pub definition: JobDefinition,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Accepts any scalar as a variable value; YAML happily turns `PORT: 8080`
/// into an integer.
fn scalar_map<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<BTreeMap<String, Value>>::deserialize(deserializer)?.unwrap_or_default();
    Ok(raw
        .into_iter()
        .map(|(key, value)| {
            let value = match value {
                Value::String(s) => s,
                Value::Null => String::new(),
                Value::Bool(b) => b.to_string(),
                Value::Number(n) => n.to_string(),
                other => other.to_string(),
            };
            (key, value)
        })
        .collect())
}
