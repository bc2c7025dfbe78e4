//! The engine runtime
//!
//! One task owns the reconciliation store; everything that mutates state
//! (push-channel deltas, snapshot results, manual operations, resolved
//! images) arrives through this task's queues and is applied one complete
//! mutation at a time. Downstream fan-out (activity diff, aggregation,
//! snapshot publication) happens inside the same turn, so consumers can
//! never observe a torn state.
//!
//! Snapshot fetches run as tagged futures off the writer task and only
//! their results pass back through the queue; a result whose session tag
//! no longer matches the live session is discarded, which closes the
//! logout-then-stale-result race.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use futures_util::future::BoxFuture;
use futures_util::stream::FuturesUnordered;
use futures_util::{FutureExt, StreamExt};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use parallax_client::ClientError;
use parallax_primitives::activity::ActivityEntry;
use parallax_primitives::events::PushEvent;
use parallax_primitives::friend::Friend;
use parallax_primitives::ids::UserId;
use parallax_primitives::instance::Instance;
use parallax_primitives::ws::CommandFrame;
use parallax_socket::{Identity, SocketConfig, SocketEvent, SocketManager, SocketState};

use crate::activity::ActivityLog;
use crate::aggregate;
use crate::collaborators::{ImageResolver, SnapshotApi};
use crate::config::EngineConfig;
use crate::errors::EngineError;
use crate::scheduler::{ManualDecision, RefreshScheduler, SessionTag};
use crate::store::{AppliedDelta, ImageSlot, PendingRequests, ReconStore};

/// Work enqueued into the single-writer loop.
#[derive(Debug)]
pub enum EngineCommand {
    /// Connect (or reconnect) the push channel with fresh credentials.
    Connect(Identity),
    /// Tear the session down and discard all state.
    Logout,
    /// User-triggered refresh, rate limited to one per cooldown window.
    ManualRefresh {
        reply: oneshot::Sender<Result<(), EngineError>>,
    },
    /// Fire-and-forget outbound command on the push channel.
    Send(CommandFrame),
    /// Resolved image payload coming back from the collaborator.
    AttachImage {
        user: UserId,
        slot: ImageSlot,
        url: String,
        data: String,
    },
    /// Stop the runtime.
    Shutdown,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum RefreshKind {
    /// First sync after authentication: everything, including the
    /// blocked-user set.
    Initial,
    /// Recurring lightweight refresh: friends and pending requests.
    Periodic,
    Manual,
    /// Consistency-gap repair: friends only, coalesced to one in flight.
    Gap,
}

#[derive(Debug, Default)]
struct RefreshPayload {
    friends: Option<Vec<Friend>>,
    requests: Option<Vec<parallax_primitives::requests::FriendRequest>>,
    blocked: Option<Vec<UserId>>,
    instances: Option<Vec<Instance>>,
}

struct RefreshResult {
    session: SessionTag,
    kind: RefreshKind,
    outcome: Result<RefreshPayload, ClientError>,
}

/// Cloneable consumer handle: command entry point plus the published
/// immutable snapshots.
#[derive(Clone, Debug)]
pub struct EngineHandle {
    commands: mpsc::Sender<EngineCommand>,
    friends: watch::Receiver<Arc<Vec<Friend>>>,
    active_instances: watch::Receiver<Arc<Vec<Instance>>>,
    activity: watch::Receiver<Arc<Vec<ActivityEntry>>>,
    requests: watch::Receiver<Arc<PendingRequests>>,
    connection: watch::Receiver<SocketState>,
}

impl EngineHandle {
    pub async fn connect(&self, identity: Identity) -> Result<(), EngineError> {
        self.send(EngineCommand::Connect(identity)).await
    }

    pub async fn logout(&self) -> Result<(), EngineError> {
        self.send(EngineCommand::Logout).await
    }

    /// Requests a manual refresh; completes once the refresh has been
    /// admitted (or rejected) by the rate limiter.
    pub async fn manual_refresh(&self) -> Result<(), EngineError> {
        let (reply, response) = oneshot::channel();

        self.send(EngineCommand::ManualRefresh { reply }).await?;

        response.await.map_err(|_| EngineError::Stopped)?
    }

    /// Queues an outbound push-channel command.
    pub async fn send_command(&self, frame: CommandFrame) -> Result<(), EngineError> {
        self.send(EngineCommand::Send(frame)).await
    }

    pub async fn shutdown(&self) -> Result<(), EngineError> {
        self.send(EngineCommand::Shutdown).await
    }

    /// The full friends collection, replaced after every relevant
    /// mutation.
    #[must_use]
    pub fn friends(&self) -> watch::Receiver<Arc<Vec<Friend>>> {
        self.friends.clone()
    }

    /// The friends-annotated active-instances view.
    #[must_use]
    pub fn active_instances(&self) -> watch::Receiver<Arc<Vec<Instance>>> {
        self.active_instances.clone()
    }

    /// The capped, newest-first activity log.
    #[must_use]
    pub fn activity(&self) -> watch::Receiver<Arc<Vec<ActivityEntry>>> {
        self.activity.clone()
    }

    /// The pending-request collections.
    #[must_use]
    pub fn requests(&self) -> watch::Receiver<Arc<PendingRequests>> {
        self.requests.clone()
    }

    /// Push-channel lifecycle state.
    #[must_use]
    pub fn connection(&self) -> watch::Receiver<SocketState> {
        self.connection.clone()
    }

    async fn send(&self, command: EngineCommand) -> Result<(), EngineError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| EngineError::Stopped)
    }
}

pub struct Engine {
    config: EngineConfig,
    api: Arc<dyn SnapshotApi>,
    images: Arc<dyn ImageResolver>,

    socket: SocketManager,
    socket_events: mpsc::Receiver<SocketEvent>,
    socket_state: watch::Receiver<SocketState>,

    commands: mpsc::Receiver<EngineCommand>,
    commands_tx: mpsc::Sender<EngineCommand>,

    store: ReconStore,
    activity: ActivityLog,
    scheduler: RefreshScheduler,

    session: SessionTag,
    gap_refresh_inflight: bool,
    requested_images: HashSet<String>,
    refreshes: FuturesUnordered<BoxFuture<'static, RefreshResult>>,

    friends_tx: watch::Sender<Arc<Vec<Friend>>>,
    active_tx: watch::Sender<Arc<Vec<Instance>>>,
    activity_tx: watch::Sender<Arc<Vec<ActivityEntry>>>,
    requests_tx: watch::Sender<Arc<PendingRequests>>,
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("session", &self.session)
            .field("gap_refresh_inflight", &self.gap_refresh_inflight)
            .finish_non_exhaustive()
    }
}

impl Engine {
    #[must_use]
    pub fn new(
        config: EngineConfig,
        socket_config: SocketConfig,
        api: Arc<dyn SnapshotApi>,
        images: Arc<dyn ImageResolver>,
    ) -> (Self, EngineHandle) {
        let (socket, socket_events) = SocketManager::new(socket_config);
        let socket_state = socket.state();

        let (commands_tx, commands) = mpsc::channel(256);

        let (friends_tx, friends_rx) = watch::channel(Arc::new(Vec::new()));
        let (active_tx, active_rx) = watch::channel(Arc::new(Vec::new()));
        let (activity_tx, activity_rx) = watch::channel(Arc::new(Vec::new()));
        let (requests_tx, requests_rx) = watch::channel(Arc::new(PendingRequests::default()));

        let handle = EngineHandle {
            commands: commands_tx.clone(),
            friends: friends_rx,
            active_instances: active_rx,
            activity: activity_rx,
            requests: requests_rx,
            connection: socket_state.clone(),
        };

        let engine = Self {
            activity: ActivityLog::new(config.activity_cap),
            scheduler: RefreshScheduler::new(config.manual_refresh_cooldown),
            config,
            api,
            images,
            socket,
            socket_events,
            socket_state,
            commands,
            commands_tx,
            store: ReconStore::new(),
            session: SessionTag::default(),
            gap_refresh_inflight: false,
            requested_images: HashSet::new(),
            refreshes: FuturesUnordered::new(),
            friends_tx,
            active_tx,
            activity_tx,
            requests_tx,
        };

        (engine, handle)
    }

    /// Runs the single-writer loop until shutdown.
    pub async fn run(mut self) -> eyre::Result<()> {
        let mut refresh_tick = interval(self.config.refresh_interval);
        refresh_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // the first tick fires immediately; the initial sync is driven by
        // the Connected event instead
        let _ignored = refresh_tick.tick().await;

        info!("engine runtime started");

        loop {
            tokio::select! {
                Some(event) = self.socket_events.recv() => {
                    self.handle_socket_event(event).await;
                }
                command = self.commands.recv() => {
                    let Some(command) = command else { break };

                    if !self.handle_command(command).await {
                        break;
                    }
                }
                Some(result) = self.refreshes.next() => {
                    self.apply_refresh(result).await;
                }
                _ = refresh_tick.tick() => {
                    if *self.socket_state.borrow() == SocketState::Connected {
                        debug!("periodic refresh");
                        self.spawn_refresh(RefreshKind::Periodic);
                    }
                }
            }
        }

        self.socket.disconnect("engine shutting down").await;
        info!("engine runtime stopped");

        Ok(())
    }

    async fn handle_socket_event(&mut self, event: SocketEvent) {
        match event {
            SocketEvent::Connected => {
                info!("push channel connected, starting initial sync");

                // anything missed while offline arrives as a snapshot, not
                // as events: absorb the next friends batch as a baseline
                self.session = self.session.next();
                self.activity.mark_unsynced();
                self.gap_refresh_inflight = false;

                self.spawn_refresh(RefreshKind::Initial);
            }
            SocketEvent::Closed { code, reason } => {
                info!(code, %reason, "push channel closed");
            }
            SocketEvent::Fatal(reason) => {
                warn!(%reason, "push channel gave up; re-authentication required");
            }
            SocketEvent::Event(event) => self.apply_event(event).await,
        }
    }

    async fn apply_event(&mut self, event: PushEvent) {
        match event {
            PushEvent::FriendUpdate(delta) => match self.store.merge_friend_delta(delta) {
                Ok(AppliedDelta::Changed(change)) => {
                    let _produced = self.activity.record_friend_change(&change, Utc::now());
                    self.request_images(&change.current);
                    self.fanout().await;
                }
                Ok(AppliedDelta::Unchanged) => {}
                Err(gap) => {
                    warn!(%gap, "discarding delta and scheduling full refresh");
                    self.trigger_gap_refresh();
                }
            },
            PushEvent::FriendRequests(batch) => {
                let _fresh = self.store.replace_friend_requests(batch);
                self.publish_requests();
            }
            PushEvent::Invites(batch) => {
                let _produced = self.activity.record_invites(&batch, Utc::now());
                let _fresh = self.store.replace_invites(batch);
                self.publish_requests();
                self.publish_activity();
            }
            PushEvent::InviteRequests(batch) => {
                let _produced = self.activity.record_invite_requests(&batch, Utc::now());
                let _fresh = self.store.replace_invite_requests(batch);
                self.publish_requests();
                self.publish_activity();
            }
            PushEvent::InstanceClosed(id) => {
                if self.store.remove_instance(&id).is_some() {
                    self.fanout().await;
                }
            }
            PushEvent::Notice(message) => info!(%message, "server notice"),
        }
    }

    /// Returns false when the loop should stop.
    async fn handle_command(&mut self, command: EngineCommand) -> bool {
        match command {
            EngineCommand::Connect(identity) => {
                self.socket.connect(identity).await;
            }
            EngineCommand::Logout => {
                self.socket.disconnect("logout").await;

                // bump the tag so in-flight refresh results are discarded
                self.session = self.session.next();
                self.store.clear_all();
                self.activity.reset();
                self.scheduler.reset();
                self.gap_refresh_inflight = false;
                self.requested_images.clear();

                self.publish_all();
            }
            EngineCommand::ManualRefresh { reply } => {
                let response = match self.scheduler.try_manual() {
                    ManualDecision::Granted => {
                        self.spawn_refresh(RefreshKind::Manual);
                        Ok(())
                    }
                    ManualDecision::TooSoon { retry_after } => {
                        Err(EngineError::RateLimited { retry_after })
                    }
                };

                let _ignored = reply.send(response);
            }
            EngineCommand::Send(frame) => {
                if let Err(err) = self.socket.send(frame) {
                    warn!(%err, "dropping outbound command");
                }
            }
            EngineCommand::AttachImage {
                user,
                slot,
                url,
                data,
            } => {
                // volatile mutation: no activity, no aggregation
                if self.store.attach_image(&user, slot, &url, data) {
                    self.publish_friends();
                }
            }
            EngineCommand::Shutdown => return false,
        }

        true
    }

    fn spawn_refresh(&mut self, kind: RefreshKind) {
        let api = Arc::clone(&self.api);
        let session = self.session;
        let category = self.config.active_category.clone();

        let fut = async move {
            let outcome = fetch_payload(api.as_ref(), kind, &category).await;

            RefreshResult {
                session,
                kind,
                outcome,
            }
        }
        .boxed();

        self.refreshes.push(fut);
    }

    /// Coalesces gap-triggered refreshes to a single in-flight fetch.
    fn trigger_gap_refresh(&mut self) {
        if self.gap_refresh_inflight {
            debug!("gap refresh already in flight, coalescing");

            return;
        }

        self.gap_refresh_inflight = true;
        self.spawn_refresh(RefreshKind::Gap);
    }

    async fn apply_refresh(&mut self, result: RefreshResult) {
        if result.session != self.session {
            debug!(kind = ?result.kind, "discarding refresh result from a stale session");

            return;
        }

        if result.kind == RefreshKind::Gap {
            self.gap_refresh_inflight = false;
        }

        let payload = match result.outcome {
            Ok(payload) => payload,
            Err(err) => {
                warn!(%err, kind = ?result.kind, "refresh failed; next trigger retries");

                return;
            }
        };

        if let Some(blocked) = payload.blocked {
            let _fresh = self.store.upsert_blocked(blocked);
        }

        if let Some(instances) = payload.instances {
            let _dropped = self.store.set_instance_directory(instances);
        }

        if let Some(friends) = payload.friends {
            let outcome = self.store.replace_friends(friends);

            for change in &outcome.changed {
                let _produced = self.activity.record_friend_change(change, Utc::now());
            }

            // first snapshot after (re)connection establishes the baseline
            if !self.activity.is_primed() {
                self.activity.prime();
            }

            let snapshot: Vec<Friend> = self.store.friends().values().cloned().collect();
            for friend in &snapshot {
                self.request_images(friend);
            }
        }

        if let Some(requests) = payload.requests {
            let _fresh = self.store.replace_friend_requests(requests);
            self.publish_requests();
        }

        self.fanout().await;
    }

    /// Hands unresolved image references to the collaborator, once per
    /// reference per session, and moves on without waiting.
    fn request_images(&mut self, friend: &Friend) {
        let refs = [
            (
                ImageSlot::Avatar,
                friend.avatar.as_ref().map(|info| &info.image),
            ),
            (
                ImageSlot::World,
                friend.world.as_ref().map(|info| &info.image),
            ),
            (
                ImageSlot::Badge,
                friend.badge.as_ref().map(|info| &info.image),
            ),
        ];

        for (slot, image) in refs {
            let Some(image) = image else { continue };

            if image.data.is_some() {
                continue;
            }

            let Some(url) = &image.url else { continue };

            if !self.requested_images.insert(url.clone()) {
                continue;
            }

            let images = Arc::clone(&self.images);
            let commands = self.commands_tx.clone();
            let user = friend.id.clone();
            let url = url.clone();

            drop(tokio::spawn(async move {
                let Some(data) = images.resolve(&url).await else {
                    debug!(%url, "image resolution failed");

                    return;
                };

                let _ignored = commands
                    .send(EngineCommand::AttachImage {
                        user,
                        slot,
                        url,
                        data,
                    })
                    .await;
            }));
        }
    }

    /// Post-mutation fan-out: aggregation plus snapshot publication.
    async fn fanout(&mut self) {
        let active = aggregate::run_pass(&mut self.store, self.api.as_ref()).await;

        self.active_tx.send_replace(Arc::new(active));
        self.publish_friends();
        self.publish_activity();
    }

    fn publish_all(&mut self) {
        self.publish_friends();
        self.publish_activity();
        self.publish_requests();
        self.active_tx.send_replace(Arc::new(Vec::new()));
    }

    fn publish_friends(&self) {
        let snapshot: Vec<Friend> = self.store.friends().values().cloned().collect();

        let _ignored = self.friends_tx.send_replace(Arc::new(snapshot));
    }

    fn publish_activity(&self) {
        let _ignored = self
            .activity_tx
            .send_replace(Arc::new(self.activity.entries()));
    }

    fn publish_requests(&self) {
        let _ignored = self
            .requests_tx
            .send_replace(Arc::new(self.store.pending_requests()));
    }
}

async fn fetch_payload(
    api: &dyn SnapshotApi,
    kind: RefreshKind,
    category: &str,
) -> Result<RefreshPayload, ClientError> {
    let mut payload = RefreshPayload::default();

    match kind {
        RefreshKind::Initial => {
            payload.blocked = Some(api.fetch_blocked().await?);
            payload.friends = Some(api.fetch_friends().await?);
            payload.requests = Some(api.fetch_friend_requests().await?);
            payload.instances = Some(api.fetch_active_instances(category).await?);
        }
        RefreshKind::Manual => {
            payload.friends = Some(api.fetch_friends().await?);
            payload.requests = Some(api.fetch_friend_requests().await?);
            payload.instances = Some(api.fetch_active_instances(category).await?);
        }
        RefreshKind::Periodic => {
            payload.friends = Some(api.fetch_friends().await?);
            payload.requests = Some(api.fetch_friend_requests().await?);
        }
        RefreshKind::Gap => {
            payload.friends = Some(api.fetch_friends().await?);
        }
    }

    Ok(payload)
}
