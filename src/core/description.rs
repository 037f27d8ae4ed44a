//! Static job metadata.

use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Unique name of a registered job.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobName(String);

impl JobName {
    /// Create a name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Borrow the name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for JobName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for JobName {
    fn from(name: &str) -> Self {
        Self(name.to_owned())
    }
}

impl From<String> for JobName {
    fn from(name: String) -> Self {
        Self(name)
    }
}

/// Immutable metadata bound to a job name at registration time.
///
/// Schemas are plain JSON values interpreted by the registry's
/// [`SchemaCompiler`](crate::schema::SchemaCompiler); `true` accepts anything.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobDescription {
    /// Job name.
    pub name: JobName,
    /// Input schema.
    pub input: Value,
    /// Output schema, applied to every output value.
    pub output: Value,
    /// Declared output channels and their schemas. Channel schemas are
    /// checked for well-formedness at registration and published with the
    /// description; channel values themselves are not validated.
    #[serde(default)]
    pub channels: BTreeMap<String, Value>,
    /// Schema describing values for the default input channel. Like the
    /// channel schemas it is descriptive only.
    pub input_channel: Value,
    /// Parent job whose schemas are validated before this job's own.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extends: Option<JobName>,
    /// Job type this job belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_type: Option<String>,
}

impl JobDescription {
    /// Description that accepts any input and output and declares no channels.
    pub fn new(name: impl Into<JobName>) -> Self {
        Self {
            name: name.into(),
            input: Value::Bool(true),
            output: Value::Bool(true),
            channels: BTreeMap::new(),
            input_channel: Value::Bool(true),
            extends: None,
            job_type: None,
        }
    }

    /// True if `name` is a declared channel.
    pub fn has_channel(&self, name: &str) -> bool {
        self.channels.contains_key(name)
    }
}
