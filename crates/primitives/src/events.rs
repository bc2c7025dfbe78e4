use serde::{Deserialize, Serialize};

use crate::friend::FriendDelta;
use crate::ids::InstanceId;
use crate::requests::{FriendRequest, Invite, InviteRequest};

/// A typed event decoded from a push-channel frame.
///
/// Friend updates are partial records merged into the store; the request
/// batches are full replacements (the remote protocol never partially
/// updates those collections).
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(tag = "kind", content = "payload", rename_all = "camelCase")]
pub enum PushEvent {
    FriendUpdate(FriendDelta),
    FriendRequests(Vec<FriendRequest>),
    Invites(Vec<Invite>),
    InviteRequests(Vec<InviteRequest>),
    InstanceClosed(InstanceId),
    Notice(String),
}
