//! The active-instance aggregator
//!
//! Joins the instance directory with live friend presence to produce the
//! externally observed "active instances" view. Runs after every store
//! mutation that could affect presence or the directory, and is
//! idempotent: re-running it on unchanged state yields identical output.

use tracing::warn;

use parallax_primitives::ids::InstanceId;
use parallax_primitives::instance::{Instance, Member};

use crate::collaborators::SnapshotApi;
use crate::store::ReconStore;

/// One aggregation pass.
///
/// 1. Backfill: instances friends are in but the directory lacks are
///    fetched lazily; a failed fetch is logged and that instance is simply
///    absent this pass (it is retried on the next one, never
///    synchronously).
/// 2. Friend members are stripped from every member list (current friends
///    by id, entries injected by an earlier pass by their `is_friend`
///    marker), then re-added from the friends map in its iteration order
///    with `is_friend` set, so no one appears under two representations
///    and an unfriended user does not linger in the stored directory.
/// 3. Blocked users are flagged, never filtered; visibility is a UI call.
/// 4. Member counts are recomputed from the final lists, and instances
///    left with nobody are dropped from the directory.
pub async fn run_pass(store: &mut ReconStore, api: &dyn SnapshotApi) -> Vec<Instance> {
    backfill(store, api).await;

    let (friends, instances, blocked) = store.aggregate_parts_mut();
    let mut empty = Vec::new();

    for (id, instance) in instances.iter_mut() {
        instance
            .members
            .retain(|member| !member.is_friend && !friends.contains_key(&member.id));

        for friend in friends.values() {
            if friend.location.as_ref() == Some(id) {
                instance.members.push(Member {
                    id: friend.id.clone(),
                    display_name: Some(friend.display_name.clone()),
                    is_friend: true,
                    is_blocked: blocked.contains(&friend.id),
                });
            }
        }

        for member in &mut instance.members {
            if blocked.contains(&member.id) {
                member.is_blocked = true;
            }
        }

        instance.current_player_count = instance.members.len() as u32;

        if instance.members.is_empty() {
            empty.push(id.clone());
        }
    }

    // an active instance with nobody in it is stale
    for id in &empty {
        let _ignored = instances.shift_remove(id);
    }

    instances.values().cloned().collect()
}

/// Fetches directory entries for friend locations the directory lacks.
async fn backfill(store: &mut ReconStore, api: &dyn SnapshotApi) {
    let missing: Vec<InstanceId> = {
        let mut missing = Vec::new();

        for friend in store.friends().values() {
            if let Some(location) = &friend.location {
                if !store.instances().contains_key(location) && !missing.contains(location) {
                    missing.push(location.clone());
                }
            }
        }

        missing
    };

    for id in missing {
        match api.fetch_instance(&id).await {
            Ok(instance) => {
                let _previous = store.upsert_instance(instance);
            }
            Err(err) => warn!(%id, %err, "instance backfill failed, skipping this pass"),
        }
    }
}
