use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::friend::Friend;
use crate::requests::{Invite, InviteRequest};

/// One entry of the derived activity log.
///
/// The log is ordered newest-first and capped; see the engine's activity
/// module for the dedup and baseline-absorption rules that produce entries.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEntry {
    pub at: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: ActivityKind,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
#[allow(variant_size_differences, reason = "friend changes carry two records")]
pub enum ActivityKind {
    /// A friend's observable state changed; carries both sides of the diff.
    FriendChange {
        current: Box<Friend>,
        previous: Box<Friend>,
    },
    Invite(Invite),
    InviteRequest(InviteRequest),
}
