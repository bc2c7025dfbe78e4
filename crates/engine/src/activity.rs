//! The activity diff engine
//!
//! Turns store mutations into a capped, newest-first activity log.
//!
//! Two rules keep the log honest. First, the very first friends batch
//! after a (re)connection is a catch-up signal, not real-time events: its
//! changes are absorbed into the baseline silently. Second, the remote
//! protocol resends full invite batches including previously seen
//! entries, so invites and invite requests are deduplicated by id against
//! per-kind seen sets.

use std::collections::{HashSet, VecDeque};

use chrono::{DateTime, Utc};

use parallax_primitives::activity::{ActivityEntry, ActivityKind};
use parallax_primitives::ids::RequestId;
use parallax_primitives::requests::{Invite, InviteRequest};

use crate::store::FriendChange;

#[derive(Debug)]
pub struct ActivityLog {
    cap: usize,
    entries: VecDeque<ActivityEntry>,
    seen_invites: HashSet<RequestId>,
    seen_invite_requests: HashSet<RequestId>,
    /// False until the first post-connection snapshot has been absorbed.
    primed: bool,
}

impl ActivityLog {
    #[must_use]
    pub fn new(cap: usize) -> Self {
        Self {
            cap,
            entries: VecDeque::new(),
            seen_invites: HashSet::new(),
            seen_invite_requests: HashSet::new(),
            primed: false,
        }
    }

    /// Discards everything; used at logout.
    pub fn reset(&mut self) {
        self.entries.clear();
        self.seen_invites.clear();
        self.seen_invite_requests.clear();
        self.primed = false;
    }

    /// Marks the next friends snapshot as a baseline to absorb silently.
    pub fn mark_unsynced(&mut self) {
        self.primed = false;
    }

    /// Promotes the current state to the baseline; friend changes from
    /// here on are real-time events.
    pub fn prime(&mut self) {
        self.primed = true;
    }

    #[must_use]
    pub const fn is_primed(&self) -> bool {
        self.primed
    }

    /// Records one friend-state change. Returns whether an entry was
    /// produced: baseline absorption and volatile-only diffs produce none.
    pub fn record_friend_change(&mut self, change: &FriendChange, at: DateTime<Utc>) -> bool {
        if !self.primed {
            return false;
        }

        if change.current.observably_eq(&change.previous) {
            return false;
        }

        self.push(ActivityEntry {
            at,
            kind: ActivityKind::FriendChange {
                current: Box::new(change.current.stripped()),
                previous: Box::new(change.previous.stripped()),
            },
        });

        true
    }

    /// Records the unseen entries of an invite batch. Returns how many
    /// entries were produced.
    pub fn record_invites(&mut self, batch: &[Invite], at: DateTime<Utc>) -> usize {
        let mut produced = 0;

        for invite in batch {
            if !self.seen_invites.insert(invite.id.clone()) {
                continue;
            }

            self.push(ActivityEntry {
                at,
                kind: ActivityKind::Invite(invite.clone()),
            });
            produced += 1;
        }

        produced
    }

    /// Records the unseen entries of an invite-request batch.
    pub fn record_invite_requests(&mut self, batch: &[InviteRequest], at: DateTime<Utc>) -> usize {
        let mut produced = 0;

        for request in batch {
            if !self.seen_invite_requests.insert(request.id.clone()) {
                continue;
            }

            self.push(ActivityEntry {
                at,
                kind: ActivityKind::InviteRequest(request.clone()),
            });
            produced += 1;
        }

        produced
    }

    /// Newest-first snapshot of the log.
    #[must_use]
    pub fn entries(&self) -> Vec<ActivityEntry> {
        self.entries.iter().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn push(&mut self, entry: ActivityEntry) {
        self.entries.push_front(entry);
        self.entries.truncate(self.cap);
    }
}
