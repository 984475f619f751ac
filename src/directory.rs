//! Membership and platform-identity lookups the core consumes from outside.

use std::sync::Arc;

use dashmap::{DashMap, DashSet};

use crate::types::{GroupId, MemberId};

/// Group membership as seen by the messaging layer.
pub trait Membership: Send + Sync {
    fn members(&self, group: GroupId) -> Vec<MemberId>;

    fn is_member(&self, group: GroupId, member: MemberId) -> bool {
        self.members(group).contains(&member)
    }
}

/// Maps a member to the messaging-platform identity fraud history is keyed on.
pub trait PlatformIdentities: Send + Sync {
    fn platform_identity(&self, member: MemberId) -> Option<String>;
}

/// In-process directory used by the service host and tests.
#[derive(Default)]
pub struct InMemoryDirectory {
    groups: DashMap<GroupId, DashSet<MemberId>>,
    identities: DashMap<MemberId, String>,
}

impl InMemoryDirectory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_member(&self, group: GroupId, member: MemberId) {
        self.groups.entry(group).or_default().insert(member);
    }

    pub fn remove_member(&self, group: GroupId, member: MemberId) {
        if let Some(set) = self.groups.get(&group) {
            set.remove(&member);
        }
    }

    pub fn link_identity(&self, member: MemberId, identity: impl Into<String>) {
        self.identities.insert(member, identity.into());
    }
}

impl Membership for InMemoryDirectory {
    fn members(&self, group: GroupId) -> Vec<MemberId> {
        let mut out: Vec<MemberId> = self
            .groups
            .get(&group)
            .map(|set| set.iter().map(|m| *m).collect())
            .unwrap_or_default();
        out.sort_unstable();
        out
    }

    fn is_member(&self, group: GroupId, member: MemberId) -> bool {
        self.groups
            .get(&group)
            .map_or(false, |set| set.contains(&member))
    }
}

impl PlatformIdentities for InMemoryDirectory {
    fn platform_identity(&self, member: MemberId) -> Option<String> {
        self.identities.get(&member).map(|s| s.clone())
    }
}
