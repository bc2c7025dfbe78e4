use serde::{Deserialize, Deserializer, Serialize};

use crate::ids::{InstanceId, UserId, WorldId};

/// A remote image reference, optionally carrying the locally resolved
/// payload attached by the image-loading collaborator.
///
/// `data` is volatile: it is produced locally, never sent by the server,
/// and is excluded from observable equality (see [`Friend::observably_eq`]).
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageRef {
    #[serde(default)]
    pub url: Option<String>,
    /// Locally resolved image payload (base64). Never sent on the wire.
    #[serde(default, skip_serializing)]
    pub data: Option<String>,
}

impl ImageRef {
    /// Carries a previously resolved payload forward when the incoming
    /// reference still points at the same remote image.
    pub fn adopt_resolved(&mut self, prev: &Self) {
        if self.data.is_none() && self.url == prev.url {
            self.data.clone_from(&prev.data);
        }
    }

    fn stripped(&self) -> Self {
        Self {
            url: self.url.clone(),
            data: None,
        }
    }
}

/// The avatar a friend currently wears.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AvatarInfo {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(flatten)]
    pub image: ImageRef,
}

/// The world a friend is currently in, as reported alongside presence.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorldInfo {
    #[serde(default)]
    pub id: Option<WorldId>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(flatten)]
    pub image: ImageRef,
}

/// A trust/supporter badge shown next to a friend's name.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BadgeInfo {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(flatten)]
    pub image: ImageRef,
}

/// A friend record as held by the reconciliation store.
///
/// Owned exclusively by the store; incremental updates are merged in place
/// via [`Friend::apply`], never replaced wholesale, so fields a partial
/// update omits are not lost.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Friend {
    pub id: UserId,
    pub display_name: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub online: bool,
    #[serde(default)]
    pub connected: bool,
    /// The instance the friend is currently in, if any and if visible.
    #[serde(default)]
    pub location: Option<InstanceId>,
    #[serde(default)]
    pub avatar: Option<AvatarInfo>,
    #[serde(default)]
    pub world: Option<WorldInfo>,
    #[serde(default)]
    pub badge: Option<BadgeInfo>,
}

impl Friend {
    /// Merges a partial update into this record.
    ///
    /// Field semantics: absent delta fields leave the current value
    /// untouched; present fields overwrite. Nested image references adopt
    /// the previously resolved payload when the remote URL is unchanged.
    pub fn apply(&mut self, delta: FriendDelta) {
        if let Some(display_name) = delta.display_name {
            self.display_name = display_name;
        }

        if let Some(status) = delta.status {
            self.status = status;
        }

        if let Some(online) = delta.online {
            self.online = online;
        }

        if let Some(connected) = delta.connected {
            self.connected = connected;
        }

        if let Some(location) = delta.location {
            self.location = location;
        }

        if let Some(mut avatar) = delta.avatar {
            if let Some(prev) = &self.avatar {
                avatar.image.adopt_resolved(&prev.image);
            }
            self.avatar = Some(avatar);
        }

        if let Some(mut world) = delta.world {
            if let Some(prev) = &self.world {
                world.image.adopt_resolved(&prev.image);
            }
            self.world = Some(world);
        }

        if let Some(mut badge) = delta.badge {
            if let Some(prev) = &self.badge {
                badge.image.adopt_resolved(&prev.image);
            }
            self.badge = Some(badge);
        }
    }

    /// Merges locally known state from `prev` into this record.
    ///
    /// Used when a full snapshot replaces the collection: the snapshot is
    /// authoritative for every field it carries, but locally resolved
    /// image payloads survive the swap.
    pub fn adopt_local(&mut self, prev: &Self) {
        if let (Some(avatar), Some(prev_avatar)) = (&mut self.avatar, &prev.avatar) {
            avatar.image.adopt_resolved(&prev_avatar.image);
        }

        if let (Some(world), Some(prev_world)) = (&mut self.world, &prev.world) {
            world.image.adopt_resolved(&prev_world.image);
        }

        if let (Some(badge), Some(prev_badge)) = (&mut self.badge, &prev.badge) {
            badge.image.adopt_resolved(&prev_badge.image);
        }
    }

    /// A copy with every volatile field cleared.
    ///
    /// The volatile set is exactly the locally resolved image payloads
    /// (`avatar.image.data`, `world.image.data`, `badge.image.data`).
    #[must_use]
    pub fn stripped(&self) -> Self {
        let mut copy = self.clone();

        if let Some(avatar) = &mut copy.avatar {
            avatar.image = avatar.image.stripped();
        }

        if let Some(world) = &mut copy.world {
            world.image = world.image.stripped();
        }

        if let Some(badge) = &mut copy.badge {
            badge.image = badge.image.stripped();
        }

        copy
    }

    /// Equality over the observable (non-volatile) fields.
    ///
    /// Two records that differ only by a refreshed image payload compare
    /// equal; the activity diff engine relies on this to avoid spurious
    /// entries.
    #[must_use]
    pub fn observably_eq(&self, other: &Self) -> bool {
        self.stripped() == other.stripped()
    }
}

/// A partial friend record as delivered by the push channel.
///
/// Every field other than `id` is optional; `location` distinguishes
/// "absent" (leave as-is) from explicit `null` (friend left the instance).
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FriendDelta {
    pub id: UserId,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub status: Option<Option<String>>,
    #[serde(default)]
    pub online: Option<bool>,
    #[serde(default)]
    pub connected: Option<bool>,
    #[serde(default, deserialize_with = "nullable")]
    pub location: Option<Option<InstanceId>>,
    #[serde(default)]
    pub avatar: Option<AvatarInfo>,
    #[serde(default)]
    pub world: Option<WorldInfo>,
    #[serde(default)]
    pub badge: Option<BadgeInfo>,
}

// A present-but-null field deserializes to Some(None), distinguishing it
// from an absent field (None via `default`).
fn nullable<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{Friend, FriendDelta};
    use crate::ids::InstanceId;

    fn base_friend() -> Friend {
        serde_json::from_value(json!({
            "id": "usr_f1",
            "displayName": "Aster",
            "online": true,
            "connected": true,
            "avatar": {"id": "avtr_1", "name": "Fox", "url": "https://img/avtr_1"},
        }))
        .unwrap()
    }

    #[test]
    fn delta_with_only_an_id_carries_no_field_updates() {
        let delta: FriendDelta = serde_json::from_value(json!({"id": "usr_f1"})).unwrap();

        assert!(delta.display_name.is_none());
        assert!(delta.status.is_none());
        assert!(delta.online.is_none());
        assert!(delta.connected.is_none());
        assert!(delta.location.is_none());
        assert!(delta.avatar.is_none());
    }

    #[test]
    fn absent_delta_fields_leave_record_untouched() {
        let mut friend = base_friend();
        let delta: FriendDelta =
            serde_json::from_value(json!({"id": "usr_f1", "status": "busy"})).unwrap();

        friend.apply(delta);

        assert_eq!(friend.status.as_deref(), Some("busy"));
        assert_eq!(friend.display_name, "Aster");
        assert!(friend.online);
    }

    #[test]
    fn explicit_null_location_clears_instance() {
        let mut friend = base_friend();
        friend.location = Some(InstanceId::new("inst_1"));

        let delta: FriendDelta =
            serde_json::from_value(json!({"id": "usr_f1", "location": null})).unwrap();
        friend.apply(delta);

        assert_eq!(friend.location, None);
    }

    #[test]
    fn absent_location_is_not_a_clear() {
        let mut friend = base_friend();
        friend.location = Some(InstanceId::new("inst_1"));

        let delta: FriendDelta = serde_json::from_value(json!({"id": "usr_f1"})).unwrap();
        friend.apply(delta);

        assert_eq!(friend.location, Some(InstanceId::new("inst_1")));
    }

    #[test]
    fn disjoint_deltas_merge_order_independently() {
        let d1: FriendDelta =
            serde_json::from_value(json!({"id": "usr_f1", "status": "away"})).unwrap();
        let d2: FriendDelta =
            serde_json::from_value(json!({"id": "usr_f1", "connected": false})).unwrap();

        let mut a = base_friend();
        a.apply(d1.clone());
        a.apply(d2.clone());

        let mut b = base_friend();
        b.apply(d2);
        b.apply(d1);

        assert_eq!(a, b);
    }

    #[test]
    fn overlapping_deltas_are_last_write_wins() {
        let mut friend = base_friend();

        let d1: FriendDelta =
            serde_json::from_value(json!({"id": "usr_f1", "status": "away"})).unwrap();
        let d2: FriendDelta =
            serde_json::from_value(json!({"id": "usr_f1", "status": "busy"})).unwrap();

        friend.apply(d1);
        friend.apply(d2);

        assert_eq!(friend.status.as_deref(), Some("busy"));
    }

    #[test]
    fn resolved_payload_survives_same_url_avatar_update() {
        let mut friend = base_friend();
        friend.avatar.as_mut().unwrap().image.data = Some("b64".to_owned());

        let delta: FriendDelta = serde_json::from_value(json!({
            "id": "usr_f1",
            "avatar": {"id": "avtr_1", "name": "Fox", "url": "https://img/avtr_1"},
        }))
        .unwrap();
        friend.apply(delta);

        assert_eq!(
            friend.avatar.unwrap().image.data.as_deref(),
            Some("b64")
        );
    }

    #[test]
    fn resolved_payload_dropped_when_url_changes() {
        let mut friend = base_friend();
        friend.avatar.as_mut().unwrap().image.data = Some("b64".to_owned());

        let delta: FriendDelta = serde_json::from_value(json!({
            "id": "usr_f1",
            "avatar": {"id": "avtr_2", "name": "Owl", "url": "https://img/avtr_2"},
        }))
        .unwrap();
        friend.apply(delta);

        assert_eq!(friend.avatar.unwrap().image.data, None);
    }

    #[test]
    fn observable_equality_ignores_resolved_images() {
        let friend = base_friend();
        let mut refreshed = friend.clone();
        refreshed.avatar.as_mut().unwrap().image.data = Some("b64".to_owned());

        assert!(friend.observably_eq(&refreshed));

        refreshed.status = Some("busy".to_owned());
        assert!(!friend.observably_eq(&refreshed));
    }
}
