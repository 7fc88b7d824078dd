// descriptor.rs - Declarative description of one fixture field
//
// Two shapes live here:
// - `FixtureAttributes` is the raw, declaration-style form. Like an
//   annotation it cannot express "absent", so username, password and
//   schema default to the literal string "null".
// - `FixtureDescriptor` is what the rest of the crate works with. Absent
//   values are real `None`s.

use serde::{Deserialize, Serialize};

/// Sentinel meaning "no value" in `FixtureAttributes`
pub const NULL_SENTINEL: &str = "null";

/// Raw fixture declaration, defaults matching the declaration syntax
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FixtureAttributes {
    pub connection_url: String,
    pub dataset_resource: String,
    pub username: String,
    pub password: String,
    pub schema: String,
    pub validate_schema: bool,
}

impl Default for FixtureAttributes {
    fn default() -> Self {
        FixtureAttributes {
            connection_url: String::new(),
            dataset_resource: String::new(),
            username: NULL_SENTINEL.to_string(),
            password: NULL_SENTINEL.to_string(),
            schema: NULL_SENTINEL.to_string(),
            validate_schema: false,
        }
    }
}

/// "null" in any casing means absent
fn sentinel_to_option(value: &str) -> Option<String> {
    if value.eq_ignore_ascii_case(NULL_SENTINEL) {
        None
    } else {
        Some(value.to_string())
    }
}

impl From<FixtureAttributes> for FixtureDescriptor {
    fn from(attributes: FixtureAttributes) -> Self {
        let dataset_resource = if attributes.dataset_resource.is_empty() {
            None
        } else {
            Some(attributes.dataset_resource)
        };
        FixtureDescriptor {
            connection_url: attributes.connection_url,
            dataset_resource,
            username: sentinel_to_option(&attributes.username),
            password: sentinel_to_option(&attributes.password),
            schema: sentinel_to_option(&attributes.schema),
            validate_schema: attributes.validate_schema,
        }
    }
}

/// How to obtain and configure the database resource behind one field
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "FixtureAttributes")]
pub struct FixtureDescriptor {
    pub connection_url: String,
    pub dataset_resource: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub schema: Option<String>,
    pub validate_schema: bool,
}

impl FixtureDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_url(mut self, url: impl Into<String>) -> Self {
        self.connection_url = url.into();
        self
    }

    /// An empty name is the same as no dataset at all
    pub fn dataset_resource(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.dataset_resource = if name.is_empty() { None } else { Some(name) };
        self
    }

    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    pub fn validate_schema(mut self, validate: bool) -> Self {
        self.validate_schema = validate;
        self
    }

    /// The dataset name with empty strings treated as absent
    pub fn dataset_resource_name(&self) -> Option<&str> {
        self.dataset_resource.as_deref().filter(|name| !name.is_empty())
    }
}
