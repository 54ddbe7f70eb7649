//! Resource records returned by the Rancher metadata API.
//!
//! The API has gone through several schema generations, and collections
//! can contain records of other kinds, so every field is optional and
//! `null` is treated the same as "absent".

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of resource a collection is expected to contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Service,
    Stack,
    Host,
}

/// Type tags that Rancher reports for service-like resources.
const SERVICE_TYPE_TAGS: &[&str] = &[
    "service",
    "loadbalancerservice",
    "externalservice",
    "dnsservice",
    "kubernetesservice",
    "composeservice",
    "networkdriverservice",
    "storagedriverservice",
    "selectorservice",
];

/// Type tags for stacks; the legacy API calls them environments.
const STACK_TYPE_TAGS: &[&str] = &["stack", "environment"];

const HOST_TYPE_TAGS: &[&str] = &["host"];

impl ResourceKind {
    /// Collection name used in log lines and self-metrics.
    pub fn collection(self) -> &'static str {
        match self {
            ResourceKind::Service => "services",
            ResourceKind::Stack => "stacks",
            ResourceKind::Host => "hosts",
        }
    }

    /// Whether a record's type tag is acceptable in this kind's collection.
    ///
    /// Matching is case-insensitive and ignores `-`/`_` so that
    /// `loadBalancerService` and `load_balancer_service` are the same tag.
    /// An empty tag is accepted; older schemas do not report one.
    pub fn accepts_type_tag(self, tag: &str) -> bool {
        let tag: String = tag
            .trim()
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .map(|c| c.to_ascii_lowercase())
            .collect();
        if tag.is_empty() {
            return true;
        }

        let accepted = match self {
            ResourceKind::Service => SERVICE_TYPE_TAGS,
            ResourceKind::Stack => STACK_TYPE_TAGS,
            ResourceKind::Host => HOST_TYPE_TAGS,
        };
        accepted.contains(&tag.as_str())
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.collection())
    }
}

/// One record from a services, stacks/environments or hosts collection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResourceRecord {
    pub id: Option<String>,
    pub name: Option<String>,
    /// Hosts report their name here; `name` is often null for them.
    pub hostname: Option<String>,
    pub state: Option<String>,
    pub health_state: Option<String>,
    pub agent_state: Option<String>,
    pub system: Option<bool>,
    pub scale: Option<i64>,
    /// Foreign key to the owning stack (current API).
    pub stack_id: Option<String>,
    /// Foreign key to the owning environment (legacy API).
    pub environment_id: Option<String>,
    /// Stack name, carried directly by some schema versions.
    #[serde(rename = "stack_name")]
    pub stack_name: Option<String>,
    #[serde(rename = "basetype", alias = "baseType")]
    pub base_type: Option<String>,
    #[serde(alias = "metadata_kind")]
    pub kind: Option<String>,
    #[serde(rename = "type")]
    pub resource_type: Option<String>,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl ResourceRecord {
    /// Name used as the `name` label.
    pub fn display_name(&self) -> &str {
        non_empty(&self.name)
            .or_else(|| non_empty(&self.hostname))
            .or_else(|| non_empty(&self.id))
            .unwrap_or("")
    }

    pub fn id(&self) -> &str {
        non_empty(&self.id).unwrap_or("")
    }

    /// Raw lifecycle state; empty when the API sent none.
    pub fn state(&self) -> &str {
        self.state.as_deref().unwrap_or("")
    }

    pub fn health_state(&self) -> Option<&str> {
        non_empty(&self.health_state)
    }

    pub fn agent_state(&self) -> Option<&str> {
        non_empty(&self.agent_state)
    }

    pub fn is_system(&self) -> bool {
        self.system.unwrap_or(false)
    }

    pub fn scale(&self) -> i64 {
        self.scale.unwrap_or(0)
    }

    pub fn stack_id(&self) -> &str {
        non_empty(&self.stack_id).unwrap_or("")
    }

    pub fn environment_id(&self) -> &str {
        non_empty(&self.environment_id).unwrap_or("")
    }

    pub fn stack_name(&self) -> Option<&str> {
        non_empty(&self.stack_name)
    }

    /// Type tag used for cross-kind validation: `basetype`, then `kind`,
    /// then `type`.
    pub fn type_tag(&self) -> &str {
        non_empty(&self.base_type)
            .or_else(|| non_empty(&self.kind))
            .or_else(|| non_empty(&self.resource_type))
            .unwrap_or("")
    }
}

/// Pagination block of a collection response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Pagination {
    /// Link to the next page, when the collection was truncated.
    pub next: Option<String>,
    /// Set by the API when more records exist than were returned.
    pub partial: bool,
}

/// Envelope of every collection response: `{"data": [...]}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceCollection {
    pub data: Vec<ResourceRecord>,
    pub pagination: Option<Pagination>,
}

impl ResourceCollection {
    /// Whether the API reported that records were left out of this page.
    pub fn is_truncated(&self) -> bool {
        self.pagination
            .as_ref()
            .is_some_and(|p| p.partial || p.next.as_deref().is_some_and(|n| !n.is_empty()))
    }
}
