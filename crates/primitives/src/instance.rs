use serde::{Deserialize, Serialize};

use crate::ids::{InstanceId, UserId, WorldId};

/// Privacy mode of an instance.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub enum Privacy {
    Public,
    Friends,
    FriendsOfFriends,
    InviteOnly,
    /// Forward compatibility: privacy modes this client does not know yet.
    #[serde(other)]
    Unknown,
}

impl Default for Privacy {
    fn default() -> Self {
        Self::Unknown
    }
}

/// A participant of an instance.
///
/// Snapshots deliver plain participants; the active-instance aggregator
/// re-inserts friends with `is_friend` set and flags blocked users. Blocked
/// participants are annotated, never removed: visibility is a UI decision.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    pub id: UserId,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub is_friend: bool,
    #[serde(default)]
    pub is_blocked: bool,
}

impl Member {
    #[must_use]
    pub fn plain(id: UserId, display_name: Option<String>) -> Self {
        Self {
            id,
            display_name,
            is_friend: false,
            is_blocked: false,
        }
    }
}

/// A live instance of a world, as held in the instance directory.
///
/// Invariant: `members` contains no duplicate ids. An instance whose member
/// list ends up empty after aggregation is dropped from the directory.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Instance {
    pub id: InstanceId,
    #[serde(default)]
    pub privacy: Privacy,
    #[serde(default)]
    pub world_id: Option<WorldId>,
    #[serde(default)]
    pub world_name: Option<String>,
    #[serde(default)]
    pub owner_id: Option<UserId>,
    #[serde(default)]
    pub author_id: Option<UserId>,
    #[serde(default)]
    pub members: Vec<Member>,
    /// Reported member count; recomputed from `members` by the aggregator.
    #[serde(default)]
    pub current_player_count: u32,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{Instance, Privacy};

    #[test]
    fn unknown_privacy_mode_is_tolerated() {
        let instance: Instance = serde_json::from_value(json!({
            "id": "inst_1",
            "privacy": "groupPlus",
            "members": [],
        }))
        .unwrap();

        assert_eq!(instance.privacy, Privacy::Unknown);
    }

    #[test]
    fn snapshot_members_are_plain() {
        let instance: Instance = serde_json::from_value(json!({
            "id": "inst_1",
            "privacy": "public",
            "members": [{"id": "usr_1", "displayName": "Aster"}],
            "currentPlayerCount": 1,
        }))
        .unwrap();

        let member = &instance.members[0];
        assert!(!member.is_friend);
        assert!(!member.is_blocked);
    }
}
