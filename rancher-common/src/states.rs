//! Closed state enumerations reported by the Rancher API.
//!
//! Every tracked attribute (service state, stack state, host state, host
//! agent state and health state) has a fixed set of values. The exporter
//! emits one indicator per value, so the sets are compile-time constants
//! rather than whatever the API happens to return.
//!
//! Raw API values are normalised before lookup: surrounding whitespace is
//! trimmed, the value is lowercased and hyphens become underscores. Label
//! values always use the underscore spelling.

use std::fmt;

/// A closed, ordered enumeration of values for one tracked attribute.
pub trait StateSet: Copy + Eq + fmt::Debug + Send + Sync + 'static {
    /// Every member, in exposition order.
    const ALL: &'static [Self];

    /// Short description used in log lines ("service state", ...).
    const ATTRIBUTE: &'static str;

    /// Label value for this member.
    fn as_str(self) -> &'static str;

    /// Look up a raw API value. Returns `None` for values outside the set.
    fn parse(raw: &str) -> Option<Self> {
        let normalized = normalize_state(raw);
        Self::ALL
            .iter()
            .copied()
            .find(|member| member.as_str() == normalized)
    }
}

/// Canonical spelling of a raw state value.
pub fn normalize_state(raw: &str) -> String {
    raw.trim().to_ascii_lowercase().replace('-', "_")
}

macro_rules! state_set {
    (
        $(#[$meta:meta])*
        $name:ident, $attribute:literal {
            $($variant:ident => $label:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum $name {
            $($variant),+
        }

        impl StateSet for $name {
            const ALL: &'static [Self] = &[$(Self::$variant),+];
            const ATTRIBUTE: &'static str = $attribute;

            fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $label),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

state_set! {
    /// Lifecycle state of a service.
    ServiceState, "service state" {
        Activating => "activating",
        Active => "active",
        CanceledUpgrade => "canceled_upgrade",
        CancelingUpgrade => "canceling_upgrade",
        Deactivating => "deactivating",
        FinishingUpgrade => "finishing_upgrade",
        Inactive => "inactive",
        Registering => "registering",
        Removed => "removed",
        Removing => "removing",
        Requested => "requested",
        Restarting => "restarting",
        RollingBack => "rolling_back",
        UpdatingActive => "updating_active",
        UpdatingInactive => "updating_inactive",
        Upgraded => "upgraded",
        Upgrading => "upgrading",
    }
}

state_set! {
    /// Lifecycle state of a stack (an "environment" on the legacy API).
    StackState, "stack state" {
        Activating => "activating",
        Active => "active",
        CanceledUpgrade => "canceled_upgrade",
        CancelingUpgrade => "canceling_upgrade",
        Error => "error",
        Erroring => "erroring",
        FinishingUpgrade => "finishing_upgrade",
        Removed => "removed",
        Removing => "removing",
        Requested => "requested",
        Restarting => "restarting",
        RollingBack => "rolling_back",
        UpdatingActive => "updating_active",
        Upgraded => "upgraded",
        Upgrading => "upgrading",
    }
}

state_set! {
    /// Lifecycle state of a host.
    HostState, "host state" {
        Activating => "activating",
        Active => "active",
        Deactivating => "deactivating",
        Error => "error",
        Erroring => "erroring",
        Inactive => "inactive",
        Provisioned => "provisioned",
        Purged => "purged",
        Purging => "purging",
        Registering => "registering",
        Removed => "removed",
        Removing => "removing",
        Requested => "requested",
        Restoring => "restoring",
        UpdatingActive => "updating_active",
        UpdatingInactive => "updating_inactive",
    }
}

state_set! {
    /// Connection state of the agent running on a host.
    AgentState, "host agent state" {
        Activating => "activating",
        Active => "active",
        Reconnecting => "reconnecting",
        Disconnected => "disconnected",
        Disconnecting => "disconnecting",
        FinishingReconnect => "finishing_reconnect",
        Reconnected => "reconnected",
    }
}

state_set! {
    /// Aggregated health of a service or stack.
    HealthState, "health state" {
        Healthy => "healthy",
        Unhealthy => "unhealthy",
        Initializing => "initializing",
        Degraded => "degraded",
        StartedOnce => "started_once",
        UpdatingHealthy => "updating_healthy",
        UpdatingUnhealthy => "updating_unhealthy",
    }
}
