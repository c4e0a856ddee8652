//! Domain types for plugin resources.
//!
//! The serialized form is the wire schema shared with every other reader of
//! the store: camelCase keys, inline data as a hex string, and an optional
//! `status.expectedChecksum`.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::IdentityError;

/// Request timeout applied when a source omits `timeoutSeconds`.
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 60;

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// The `{namespace, name}` key of a plugin. Displayed as `namespace/name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Identity {
    pub namespace: String,
    pub name: String,
}

impl Identity {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Both segments end up as path components, so neither may escape its
    /// parent directory.
    pub fn validate(&self) -> Result<(), IdentityError> {
        for segment in [&self.namespace, &self.name] {
            let invalid = segment.is_empty()
                || segment == "."
                || segment == ".."
                || segment.contains(['/', '\\', '\0']);
            if invalid {
                return Err(IdentityError::InvalidSegment(segment.clone()));
            }
        }
        Ok(())
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

impl FromStr for Identity {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (namespace, name) = s
            .split_once('/')
            .ok_or_else(|| IdentityError::Malformed(s.to_string()))?;
        let identity = Identity::new(namespace, name);
        identity.validate()?;
        Ok(identity)
    }
}

// ---------------------------------------------------------------------------
// Spec
// ---------------------------------------------------------------------------

/// Behavior when a plugin has a missing dependency.
///
/// Stored and forwarded only; the reconciler never interprets it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum DependencyPolicy {
    #[default]
    AutoCreate,
    FailOnMissing,
}

impl fmt::Display for DependencyPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DependencyPolicy::AutoCreate => write!(f, "AutoCreate"),
            DependencyPolicy::FailOnMissing => write!(f, "FailOnMissing"),
        }
    }
}

/// Download a plugin from an HTTP/HTTPS URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpSource {
    pub url: String,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

impl HttpSource {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
        }
    }

    /// Per-request deadline. A zero value falls back to the default.
    pub fn timeout(&self) -> Duration {
        match self.timeout_seconds {
            0 => Duration::from_secs(DEFAULT_TIMEOUT_SECONDS),
            secs => Duration::from_secs(secs),
        }
    }
}

fn default_timeout_seconds() -> u64 {
    DEFAULT_TIMEOUT_SECONDS
}

/// Where the plugin bytes come from. Exactly one field is expected to be set.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PluginSource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http: Option<HttpSource>,
    #[serde(default, skip_serializing_if = "Vec::is_empty", with = "hex_bytes")]
    pub data: Vec<u8>,
}

/// Borrowed view of the populated source variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind<'a> {
    Inline(&'a [u8]),
    Http(&'a HttpSource),
}

impl PluginSource {
    pub fn http(source: HttpSource) -> Self {
        Self {
            http: Some(source),
            data: Vec::new(),
        }
    }

    pub fn inline(data: impl Into<Vec<u8>>) -> Self {
        Self {
            http: None,
            data: data.into(),
        }
    }

    /// Inline data wins when both are populated; `None` when neither is.
    pub fn kind(&self) -> Option<SourceKind<'_>> {
        if !self.data.is_empty() {
            return Some(SourceKind::Inline(&self.data));
        }
        self.http.as_ref().map(SourceKind::Http)
    }

    /// String mixed into the checksum ahead of the file bytes: the declared
    /// URL for HTTP sources, empty otherwise.
    pub fn hash_base(&self) -> &str {
        self.http.as_ref().map(|h| h.url.as_str()).unwrap_or("")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginSpec {
    pub source: PluginSource,
    #[serde(default)]
    pub dependency_policy: DependencyPolicy,
}

// ---------------------------------------------------------------------------
// Status + resource
// ---------------------------------------------------------------------------

/// Observed state. `expected_checksum == None` means the plugin has not been
/// confirmed installed anywhere; clearing it forces a re-download.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_checksum: Option<u32>,
}

/// The unit exchanged with the desired-state store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginResource {
    pub namespace: String,
    pub name: String,
    /// Bumped by the store on every write; used for optimistic concurrency.
    #[serde(default)]
    pub resource_version: u64,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
    pub spec: PluginSpec,
    #[serde(default)]
    pub status: PluginStatus,
}

impl PluginResource {
    pub fn new(identity: &Identity, spec: PluginSpec) -> Self {
        let now = Utc::now();
        Self {
            namespace: identity.namespace.clone(),
            name: identity.name.clone(),
            resource_version: 0,
            created_at: now,
            updated_at: now,
            spec,
            status: PluginStatus::default(),
        }
    }

    pub fn identity(&self) -> Identity {
        Identity::new(&self.namespace, &self.name)
    }
}

/// `Vec<u8>` as a lowercase hex string.
mod hex_bytes {
    use serde::{de::Error as _, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        hex::decode(encoded.trim()).map_err(D::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn identity_display_and_parse() {
        let id: Identity = "survival/EconomyAPI".parse().expect("parse");
        assert_eq!(id, Identity::new("survival", "EconomyAPI"));
        assert_eq!(id.to_string(), "survival/EconomyAPI");
    }

    #[rstest]
    #[case("no-slash")]
    #[case("/name")]
    #[case("ns/")]
    #[case("ns/a/b")]
    #[case("../etc")]
    #[case("ns/..")]
    fn identity_rejects_unsafe_input(#[case] input: &str) {
        assert!(input.parse::<Identity>().is_err(), "accepted {input}");
    }

    #[test]
    fn inline_data_takes_precedence_over_http() {
        let source = PluginSource {
            http: Some(HttpSource::new("https://example.test/a.phar")),
            data: b"bytes".to_vec(),
        };
        assert_eq!(source.kind(), Some(SourceKind::Inline(b"bytes")));
        // The hash base still follows the declared URL.
        assert_eq!(source.hash_base(), "https://example.test/a.phar");
    }

    #[test]
    fn empty_source_has_no_kind() {
        let source = PluginSource::default();
        assert!(source.kind().is_none());
        assert_eq!(source.hash_base(), "");
    }

    #[test]
    fn zero_timeout_falls_back_to_default() {
        let mut http = HttpSource::new("https://example.test");
        http.timeout_seconds = 0;
        assert_eq!(http.timeout(), Duration::from_secs(DEFAULT_TIMEOUT_SECONDS));
        http.timeout_seconds = 5;
        assert_eq!(http.timeout(), Duration::from_secs(5));
    }

    #[test]
    fn wire_schema_uses_camel_case_and_hex_data() {
        let id = Identity::new("default", "inline");
        let mut resource = PluginResource::new(
            &id,
            PluginSpec {
                source: PluginSource::inline(vec![0xde, 0xad]),
                dependency_policy: DependencyPolicy::FailOnMissing,
            },
        );
        resource.status.expected_checksum = Some(42);

        let yaml = serde_yaml::to_string(&resource).expect("serialize");
        assert!(yaml.contains("data: dead"), "{yaml}");
        assert!(yaml.contains("dependencyPolicy: FailOnMissing"), "{yaml}");
        assert!(yaml.contains("expectedChecksum: 42"), "{yaml}");
        assert!(!yaml.contains("http"), "{yaml}");

        let back: PluginResource = serde_yaml::from_str(&yaml).expect("deserialize");
        assert_eq!(back, resource);
    }

    #[test]
    fn minimal_document_fills_defaults() {
        let yaml = r#"
namespace: default
name: econ
spec:
  source:
    http:
      url: https://example.test/econ.phar
"#;
        let resource: PluginResource = serde_yaml::from_str(yaml).expect("deserialize");
        assert_eq!(resource.resource_version, 0);
        assert_eq!(resource.spec.dependency_policy, DependencyPolicy::AutoCreate);
        assert_eq!(resource.status.expected_checksum, None);
        let http = resource.spec.source.http.expect("http source");
        assert_eq!(http.timeout_seconds, DEFAULT_TIMEOUT_SECONDS);
    }
}
