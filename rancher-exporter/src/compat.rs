//! API generation detection.
//!
//! The legacy (v1) API exposes stacks as `/environments/` and services
//! point at them through `environmentId`; the current API uses `/stacks/`
//! and `stackId`. Which one applies is decided from the configured base
//! URL on every scrape cycle.

use rancher_common::{ResourceKind, ResourceRecord};
use reqwest::Url;
use tracing::debug;

/// Schema generation of the Rancher API behind the base URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiGeneration {
    V1,
    V2,
}

impl ApiGeneration {
    pub fn as_str(self) -> &'static str {
        match self {
            ApiGeneration::V1 => "v1",
            ApiGeneration::V2 => "v2",
        }
    }
}

/// Field on a service record that references its owning stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackRefField {
    EnvironmentId,
    StackId,
}

impl StackRefField {
    /// JSON field name, for log lines.
    pub fn json_name(self) -> &'static str {
        match self {
            StackRefField::EnvironmentId => "environmentId",
            StackRefField::StackId => "stackId",
        }
    }

    /// Read this field from a record; empty when absent.
    pub fn extract(self, record: &ResourceRecord) -> &str {
        match self {
            StackRefField::EnvironmentId => record.environment_id(),
            StackRefField::StackId => record.stack_id(),
        }
    }
}

/// Paths and field names that apply to one API generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Compatibility {
    pub generation: ApiGeneration,
    /// Relative path of the stacks collection.
    pub stacks_path: &'static str,
    pub stack_ref_field: StackRefField,
}

impl Compatibility {
    const LEGACY: Compatibility = Compatibility {
        generation: ApiGeneration::V1,
        stacks_path: "/environments/",
        stack_ref_field: StackRefField::EnvironmentId,
    };

    const CURRENT: Compatibility = Compatibility {
        generation: ApiGeneration::V2,
        stacks_path: "/stacks/",
        stack_ref_field: StackRefField::StackId,
    };

    /// Full URL of a collection under `base_url`.
    pub fn collection_url(&self, base_url: &str, kind: ResourceKind) -> String {
        let base = base_url.trim_end_matches('/');
        let path = match kind {
            ResourceKind::Service => "/services/",
            ResourceKind::Stack => self.stacks_path,
            ResourceKind::Host => "/hosts/",
        };
        format!("{base}{path}")
    }
}

/// Select the API generation for a base URL.
///
/// Only the path is inspected, so a host name such as `srv1.example.com`
/// does not look like a legacy endpoint. Without a version marker the
/// current generation is assumed.
pub fn resolve(base_url: &str) -> Compatibility {
    let path = match Url::parse(base_url) {
        Ok(url) => url.path().to_string(),
        Err(_) => base_url.to_string(),
    };

    if path.contains("v1") {
        debug!(base_url, "version 1 API detected, using legacy API fields");
        Compatibility::LEGACY
    } else if path.contains("v2") {
        debug!(base_url, "version 2 API detected, using current API fields");
        Compatibility::CURRENT
    } else {
        debug!(base_url, "no API version marker found, defaulting to v2");
        Compatibility::CURRENT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_legacy() {
        let compat = resolve("http://rancher.local:8080/v1");
        assert_eq!(compat.generation, ApiGeneration::V1);
        assert_eq!(compat.stacks_path, "/environments/");
        assert_eq!(compat.stack_ref_field, StackRefField::EnvironmentId);
    }

    #[test]
    fn test_resolve_current() {
        let compat = resolve("http://rancher.local:8080/v2-beta/projects/1a5");
        assert_eq!(compat.generation, ApiGeneration::V2);
        assert_eq!(compat.stacks_path, "/stacks/");
        assert_eq!(compat.stack_ref_field, StackRefField::StackId);
    }

    #[test]
    fn test_resolve_defaults_to_current() {
        let compat = resolve("http://rancher-metadata/latest");
        assert_eq!(compat.generation, ApiGeneration::V2);
    }

    #[test]
    fn test_resolve_ignores_host_name() {
        let compat = resolve("http://srv1.example.com/v2-beta");
        assert_eq!(compat.generation, ApiGeneration::V2);
    }

    #[test]
    fn test_resolve_unparseable_url_uses_raw_string() {
        let compat = resolve("rancher/v1");
        assert_eq!(compat.generation, ApiGeneration::V1);
    }

    #[test]
    fn test_collection_urls() {
        let legacy = resolve("http://rancher:8080/v1/");
        assert_eq!(
            legacy.collection_url("http://rancher:8080/v1/", ResourceKind::Stack),
            "http://rancher:8080/v1/environments/"
        );
        assert_eq!(
            legacy.collection_url("http://rancher:8080/v1", ResourceKind::Service),
            "http://rancher:8080/v1/services/"
        );

        let current = resolve("http://rancher:8080/v2-beta");
        assert_eq!(
            current.collection_url("http://rancher:8080/v2-beta", ResourceKind::Stack),
            "http://rancher:8080/v2-beta/stacks/"
        );
        assert_eq!(
            current.collection_url("http://rancher:8080/v2-beta", ResourceKind::Host),
            "http://rancher:8080/v2-beta/hosts/"
        );
    }

    #[test]
    fn test_stack_ref_field_extract() {
        let record = ResourceRecord {
            stack_id: Some("1st5".to_string()),
            environment_id: Some("1e5".to_string()),
            ..ResourceRecord::default()
        };
        assert_eq!(StackRefField::StackId.extract(&record), "1st5");
        assert_eq!(StackRefField::EnvironmentId.extract(&record), "1e5");
        assert_eq!(StackRefField::StackId.json_name(), "stackId");
    }
}
