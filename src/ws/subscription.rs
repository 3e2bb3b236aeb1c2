//! Per-connection subscription filter.
//!
//! A client names devices by UUID string, or `"*"` for every device.
//! Events are filtered server-side against the resulting set.

use std::collections::BTreeSet;

use crate::domain::{DeviceId, GatewayEvent};

/// Wildcard target matching every device.
pub const WILDCARD: &str = "*";

/// Parsed form of a `device_ids` list.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Targets {
    /// Well-formed device ids.
    pub ids: Vec<DeviceId>,
    /// Whether `"*"` was present.
    pub wildcard: bool,
    /// Entries that were neither `"*"` nor a UUID.
    pub rejected: Vec<String>,
}

impl Targets {
    /// Splits raw strings into ids, the wildcard, and rejects.
    #[must_use]
    pub fn parse(raw: &[String]) -> Self {
        let mut targets = Self::default();
        for entry in raw {
            let entry = entry.trim();
            if entry == WILDCARD {
                targets.wildcard = true;
            } else if let Ok(uuid) = entry.parse::<uuid::Uuid>() {
                targets.ids.push(DeviceId::from_uuid(uuid));
            } else {
                targets.rejected.push(entry.to_string());
            }
        }
        targets
    }
}

/// Devices one WebSocket connection wants events for.
#[derive(Debug, Default)]
pub struct SubscriptionManager {
    device_ids: BTreeSet<DeviceId>,
    all: bool,
}

impl SubscriptionManager {
    /// Creates a manager that matches nothing.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds the targets to the filter.
    pub fn subscribe(&mut self, targets: &Targets) {
        self.all |= targets.wildcard;
        self.device_ids.extend(targets.ids.iter().copied());
    }

    /// Removes the targets. `"*"` only clears the wildcard; explicitly
    /// named devices stay subscribed.
    pub fn unsubscribe(&mut self, targets: &Targets) {
        if targets.wildcard {
            self.all = false;
        }
        for id in &targets.ids {
            self.device_ids.remove(id);
        }
    }

    /// Whether `event` should be forwarded.
    #[must_use]
    pub fn matches(&self, event: &GatewayEvent) -> bool {
        self.all || self.device_ids.contains(&event.device_id())
    }

    /// Explicitly subscribed device ids, sorted.
    pub fn device_ids(&self) -> impl Iterator<Item = DeviceId> + '_ {
        self.device_ids.iter().copied()
    }

    /// Whether the wildcard is active.
    #[must_use]
    pub fn is_subscribed_all(&self) -> bool {
        self.all
    }
}
