//! The reconciliation store
//!
//! Authoritative in-memory state for the session: friends, blocked users,
//! the instance directory and the pending-request maps. The store has a
//! single owner (the engine runtime) and every mutation returns the delta
//! actually applied so downstream consumers can diff without re-scanning.
//!
//! Two mutation paths exist: wholesale snapshot replacement (pull channel)
//! and incremental merge (push channel). Replacement is at the collection
//! level, merge is at the record level; locally resolved image payloads
//! survive both.

use std::collections::HashSet;

use indexmap::IndexMap;

use parallax_primitives::friend::{Friend, FriendDelta};
use parallax_primitives::ids::{InstanceId, RequestId, UserId};
use parallax_primitives::instance::Instance;
use parallax_primitives::requests::{FriendRequest, Invite, InviteRequest};

use crate::errors::ConsistencyGap;

/// Both sides of one friend's observable state change.
#[derive(Clone, Debug)]
pub struct FriendChange {
    pub previous: Friend,
    pub current: Friend,
}

/// What a [`ReconStore::merge_friend_delta`] call actually did.
#[derive(Debug)]
pub enum AppliedDelta {
    /// No observable field differed (the delta was volatile or a no-op).
    Unchanged,
    Changed(FriendChange),
}

/// What a [`ReconStore::replace_friends`] call actually did.
#[derive(Debug, Default)]
pub struct ReplaceOutcome {
    pub added: Vec<Friend>,
    pub removed: Vec<Friend>,
    pub changed: Vec<FriendChange>,
}

/// Which nested image reference a resolved payload belongs to.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ImageSlot {
    Avatar,
    World,
    Badge,
}

/// Immutable snapshot of the pending-request collections.
#[derive(Clone, Debug, Default)]
pub struct PendingRequests {
    pub friend_requests: Vec<FriendRequest>,
    pub invites: Vec<Invite>,
    pub invite_requests: Vec<InviteRequest>,
}

#[derive(Debug, Default)]
pub struct ReconStore {
    friends: IndexMap<UserId, Friend>,
    blocked: HashSet<UserId>,
    instances: IndexMap<InstanceId, Instance>,
    friend_requests: IndexMap<RequestId, FriendRequest>,
    invites: IndexMap<RequestId, Invite>,
    invite_requests: IndexMap<RequestId, InviteRequest>,
}

impl ReconStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn friends(&self) -> &IndexMap<UserId, Friend> {
        &self.friends
    }

    #[must_use]
    pub const fn instances(&self) -> &IndexMap<InstanceId, Instance> {
        &self.instances
    }

    #[must_use]
    pub const fn blocked(&self) -> &HashSet<UserId> {
        &self.blocked
    }

    /// Simultaneous access for the aggregation pass: read-only friends and
    /// blocked set, mutable instance directory.
    pub fn aggregate_parts_mut(
        &mut self,
    ) -> (
        &IndexMap<UserId, Friend>,
        &mut IndexMap<InstanceId, Instance>,
        &HashSet<UserId>,
    ) {
        (&self.friends, &mut self.instances, &self.blocked)
    }

    /// Snapshot of the pending-request collections.
    #[must_use]
    pub fn pending_requests(&self) -> PendingRequests {
        PendingRequests {
            friend_requests: self.friend_requests.values().cloned().collect(),
            invites: self.invites.values().cloned().collect(),
            invite_requests: self.invite_requests.values().cloned().collect(),
        }
    }

    /// Replaces the friends collection with a full snapshot.
    ///
    /// Replacement is at the collection level: every prior entry absent
    /// from `list` is dropped. Each incoming record is merged onto any
    /// existing record with the same id first, so locally known state the
    /// snapshot does not carry (resolved image payloads) survives.
    pub fn replace_friends(&mut self, list: Vec<Friend>) -> ReplaceOutcome {
        let mut outcome = ReplaceOutcome::default();
        let mut next = IndexMap::with_capacity(list.len());

        for mut incoming in list {
            match self.friends.swap_remove(&incoming.id) {
                Some(existing) => {
                    incoming.adopt_local(&existing);

                    if !incoming.observably_eq(&existing) {
                        outcome.changed.push(FriendChange {
                            previous: existing,
                            current: incoming.clone(),
                        });
                    }
                }
                None => outcome.added.push(incoming.clone()),
            }

            let _ignored = next.insert(incoming.id.clone(), incoming);
        }

        outcome.removed = self.friends.drain(..).map(|(_, friend)| friend).collect();
        self.friends = next;

        outcome
    }

    /// Merges a partial friend record from the push channel.
    ///
    /// An unknown id means a prior update was missed: the store stays
    /// untouched and the caller gets a [`ConsistencyGap`] so its control
    /// loop can trigger a full refresh. The delta itself is discarded.
    pub fn merge_friend_delta(
        &mut self,
        delta: FriendDelta,
    ) -> Result<AppliedDelta, ConsistencyGap> {
        let Some(friend) = self.friends.get_mut(&delta.id) else {
            return Err(ConsistencyGap { id: delta.id });
        };

        let previous = friend.clone();
        friend.apply(delta);

        if friend.observably_eq(&previous) {
            return Ok(AppliedDelta::Unchanged);
        }

        Ok(AppliedDelta::Changed(FriendChange {
            previous,
            current: friend.clone(),
        }))
    }

    /// Attaches a resolved image payload in place.
    ///
    /// Volatile by definition: produces no activity and is skipped when
    /// the record or the reference changed since resolution was requested.
    pub fn attach_image(&mut self, user: &UserId, slot: ImageSlot, url: &str, data: String) -> bool {
        let Some(friend) = self.friends.get_mut(user) else {
            return false;
        };

        let image = match slot {
            ImageSlot::Avatar => friend.avatar.as_mut().map(|info| &mut info.image),
            ImageSlot::World => friend.world.as_mut().map(|info| &mut info.image),
            ImageSlot::Badge => friend.badge.as_mut().map(|info| &mut info.image),
        };

        let Some(image) = image else {
            return false;
        };

        if image.url.as_deref() != Some(url) {
            return false;
        }

        image.data = Some(data);

        true
    }

    /// Extends the blocked-user set. The set is cleared with the rest of
    /// the session state and repopulated at authentication.
    pub fn upsert_blocked(&mut self, ids: Vec<UserId>) -> usize {
        ids.into_iter()
            .filter(|id| self.blocked.insert(id.clone()))
            .count()
    }

    /// Replaces the instance directory wholesale. Returns the ids of
    /// entries the new directory no longer carries.
    pub fn set_instance_directory(&mut self, instances: Vec<Instance>) -> Vec<InstanceId> {
        let next: IndexMap<InstanceId, Instance> = instances
            .into_iter()
            .map(|instance| (instance.id.clone(), sanitize(instance)))
            .collect();

        let dropped = self
            .instances
            .keys()
            .filter(|id| !next.contains_key(*id))
            .cloned()
            .collect();

        self.instances = next;

        dropped
    }

    /// Inserts or replaces one instance, returning the replaced entry.
    pub fn upsert_instance(&mut self, instance: Instance) -> Option<Instance> {
        self.instances
            .insert(instance.id.clone(), sanitize(instance))
    }

    pub fn remove_instance(&mut self, id: &InstanceId) -> Option<Instance> {
        self.instances.shift_remove(id)
    }

    /// Full replacement of the pending friend-request map. Returns the
    /// entries that were not present before.
    pub fn replace_friend_requests(&mut self, batch: Vec<FriendRequest>) -> Vec<FriendRequest> {
        let fresh = batch
            .iter()
            .filter(|request| !self.friend_requests.contains_key(&request.id))
            .cloned()
            .collect();

        self.friend_requests = batch
            .into_iter()
            .map(|request| (request.id.clone(), request))
            .collect();

        fresh
    }

    /// Full replacement of the pending invite map. Returns the entries
    /// that were not present before.
    pub fn replace_invites(&mut self, batch: Vec<Invite>) -> Vec<Invite> {
        let fresh = batch
            .iter()
            .filter(|invite| !self.invites.contains_key(&invite.id))
            .cloned()
            .collect();

        self.invites = batch
            .into_iter()
            .map(|invite| (invite.id.clone(), invite))
            .collect();

        fresh
    }

    /// Full replacement of the pending invite-request map. Returns the
    /// entries that were not present before.
    pub fn replace_invite_requests(&mut self, batch: Vec<InviteRequest>) -> Vec<InviteRequest> {
        let fresh = batch
            .iter()
            .filter(|request| !self.invite_requests.contains_key(&request.id))
            .cloned()
            .collect();

        self.invite_requests = batch
            .into_iter()
            .map(|request| (request.id.clone(), request))
            .collect();

        fresh
    }

    /// Discards the whole session state.
    pub fn clear_all(&mut self) {
        self.friends.clear();
        self.blocked.clear();
        self.instances.clear();
        self.friend_requests.clear();
        self.invites.clear();
        self.invite_requests.clear();
    }
}

/// Enforces the no-duplicate-member invariant, keeping first occurrences.
fn sanitize(mut instance: Instance) -> Instance {
    let mut seen = HashSet::with_capacity(instance.members.len());
    instance.members.retain(|member| seen.insert(member.id.clone()));
    instance
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use parallax_primitives::friend::{Friend, FriendDelta};
    use parallax_primitives::ids::{InstanceId, UserId};
    use parallax_primitives::instance::Instance;

    use super::{AppliedDelta, ImageSlot, ReconStore};

    fn friend(id: &str) -> Friend {
        serde_json::from_value(json!({
            "id": id,
            "displayName": format!("name-{id}"),
            "online": true,
            "avatar": {"id": "avtr_1", "url": format!("https://img/{id}")},
        }))
        .unwrap()
    }

    fn delta(value: serde_json::Value) -> FriendDelta {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn merge_for_unknown_id_is_a_gap_and_mutates_nothing() {
        let mut store = ReconStore::new();
        let _outcome = store.replace_friends(vec![friend("usr_1")]);

        let err = store
            .merge_friend_delta(delta(json!({"id": "usr_ghost", "online": false})))
            .unwrap_err();

        assert_eq!(err.id, UserId::new("usr_ghost"));
        assert_eq!(store.friends().len(), 1);
        assert!(!store.friends().contains_key(&UserId::new("usr_ghost")));
    }

    #[test]
    fn merge_reports_observable_change() {
        let mut store = ReconStore::new();
        let _outcome = store.replace_friends(vec![friend("usr_1")]);

        let applied = store
            .merge_friend_delta(delta(json!({"id": "usr_1", "status": "busy"})))
            .unwrap();

        let AppliedDelta::Changed(change) = applied else {
            panic!("expected a change");
        };
        assert_eq!(change.previous.status, None);
        assert_eq!(change.current.status.as_deref(), Some("busy"));
    }

    #[test]
    fn volatile_only_merge_is_unchanged() {
        let mut store = ReconStore::new();
        let _outcome = store.replace_friends(vec![friend("usr_1")]);

        assert!(store.attach_image(
            &UserId::new("usr_1"),
            ImageSlot::Avatar,
            "https://img/usr_1",
            "b64".to_owned(),
        ));

        // identical observable fields, fresh (unresolved) image reference
        let applied = store
            .merge_friend_delta(delta(json!({
                "id": "usr_1",
                "avatar": {"id": "avtr_1", "url": "https://img/usr_1"},
            })))
            .unwrap();

        assert!(matches!(applied, AppliedDelta::Unchanged));

        // and the resolved payload survived the merge
        let friend = &store.friends()[&UserId::new("usr_1")];
        assert_eq!(
            friend.avatar.as_ref().unwrap().image.data.as_deref(),
            Some("b64")
        );
    }

    #[test]
    fn replace_drops_absent_entries_and_keeps_resolved_images() {
        let mut store = ReconStore::new();
        let _outcome = store.replace_friends(vec![friend("usr_1"), friend("usr_2")]);

        assert!(store.attach_image(
            &UserId::new("usr_1"),
            ImageSlot::Avatar,
            "https://img/usr_1",
            "b64".to_owned(),
        ));

        let outcome = store.replace_friends(vec![friend("usr_1"), friend("usr_3")]);

        assert_eq!(outcome.added.len(), 1);
        assert_eq!(outcome.removed.len(), 1);
        assert_eq!(outcome.removed[0].id, UserId::new("usr_2"));
        assert!(outcome.changed.is_empty());

        let kept = &store.friends()[&UserId::new("usr_1")];
        assert_eq!(
            kept.avatar.as_ref().unwrap().image.data.as_deref(),
            Some("b64")
        );
    }

    #[test]
    fn attach_image_skips_stale_references() {
        let mut store = ReconStore::new();
        let _outcome = store.replace_friends(vec![friend("usr_1")]);

        assert!(!store.attach_image(
            &UserId::new("usr_1"),
            ImageSlot::Avatar,
            "https://img/other",
            "b64".to_owned(),
        ));
    }

    #[test]
    fn duplicate_instance_members_are_collapsed() {
        let mut store = ReconStore::new();

        let instance: Instance = serde_json::from_value(json!({
            "id": "inst_1",
            "privacy": "public",
            "members": [
                {"id": "usr_1", "displayName": "a"},
                {"id": "usr_1", "displayName": "dup"},
                {"id": "usr_2"},
            ],
        }))
        .unwrap();

        let _previous = store.upsert_instance(instance);

        let stored = &store.instances()[&InstanceId::new("inst_1")];
        assert_eq!(stored.members.len(), 2);
        assert_eq!(stored.members[0].display_name.as_deref(), Some("a"));
    }

    #[test]
    fn invite_replacement_reports_fresh_entries() {
        let mut store = ReconStore::new();

        let batch: Vec<parallax_primitives::requests::Invite> = vec![
            serde_json::from_value(json!({"id": "inv_1", "senderId": "usr_1"})).unwrap(),
            serde_json::from_value(json!({"id": "inv_2", "senderId": "usr_2"})).unwrap(),
        ];

        assert_eq!(store.replace_invites(batch.clone()).len(), 2);

        // the remote protocol resends full batches
        assert!(store.replace_invites(batch).is_empty());
    }

    #[test]
    fn directory_replacement_reports_dropped_ids() {
        let mut store = ReconStore::new();

        let inst = |id: &str| -> Instance {
            serde_json::from_value(json!({"id": id, "privacy": "public", "members": []})).unwrap()
        };

        let _dropped = store.set_instance_directory(vec![inst("inst_1"), inst("inst_2")]);

        let dropped = store.set_instance_directory(vec![inst("inst_2"), inst("inst_3")]);
        assert_eq!(dropped, [InstanceId::new("inst_1")]);
    }

    #[test]
    fn friend_request_replacement_reports_fresh_entries() {
        let mut store = ReconStore::new();

        let batch = vec![
            serde_json::from_value(json!({"id": "req_1", "senderId": "usr_1"})).unwrap(),
            serde_json::from_value(json!({"id": "req_2", "senderId": "usr_2"})).unwrap(),
        ];

        let fresh = store.replace_friend_requests(batch.clone());
        assert_eq!(fresh.len(), 2);

        let fresh = store.replace_friend_requests(batch);
        assert!(fresh.is_empty());
    }

    #[test]
    fn clear_all_discards_every_collection() {
        let mut store = ReconStore::new();
        let _outcome = store.replace_friends(vec![friend("usr_1")]);
        let _fresh = store.upsert_blocked(vec![UserId::new("usr_9")]);

        store.clear_all();

        assert!(store.friends().is_empty());
        assert!(store.blocked().is_empty());
        assert!(store.pending_requests().friend_requests.is_empty());
    }
}
