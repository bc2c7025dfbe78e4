use serde::{Deserialize, Serialize};

use crate::ids::{InstanceId, RequestId, UserId, WorldId};

/// A pending friend request.
///
/// Request collections are always delivered as full batches, by both
/// channels; there is no partial-update path for them.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FriendRequest {
    pub id: RequestId,
    pub sender_id: UserId,
    #[serde(default)]
    pub receiver_id: Option<UserId>,
    #[serde(default)]
    pub sender_name: Option<String>,
}

/// An invite to join an instance.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Invite {
    pub id: RequestId,
    pub sender_id: UserId,
    #[serde(default)]
    pub instance_id: Option<InstanceId>,
    #[serde(default)]
    pub world_id: Option<WorldId>,
    #[serde(default)]
    pub world_name: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// A request from a friend to be invited to the local user's instance.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InviteRequest {
    pub id: RequestId,
    pub sender_id: UserId,
    #[serde(default)]
    pub message: Option<String>,
}
