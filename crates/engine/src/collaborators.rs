//! Trait seams for the engine's external collaborators
//!
//! The engine talks to the pull channel and the image loader through these
//! traits so the reconciliation logic is testable with mocks.

use async_trait::async_trait;

use parallax_client::{Api, ClientError, InstanceSort, SortDirection};
use parallax_primitives::friend::Friend;
use parallax_primitives::ids::{InstanceId, UserId};
use parallax_primitives::instance::Instance;
use parallax_primitives::requests::FriendRequest;

/// The pull channel as the engine sees it.
///
/// Implementations perform one request per call and surface failures;
/// retry policy lives in the refresh scheduler.
#[async_trait]
pub trait SnapshotApi: Send + Sync {
    async fn fetch_friends(&self) -> Result<Vec<Friend>, ClientError>;

    async fn fetch_friend_requests(&self) -> Result<Vec<FriendRequest>, ClientError>;

    async fn fetch_blocked(&self) -> Result<Vec<UserId>, ClientError>;

    async fn fetch_instance(&self, id: &InstanceId) -> Result<Instance, ClientError>;

    async fn fetch_active_instances(&self, category: &str) -> Result<Vec<Instance>, ClientError>;
}

#[async_trait]
impl SnapshotApi for Api {
    async fn fetch_friends(&self) -> Result<Vec<Friend>, ClientError> {
        Self::fetch_friends(self).await
    }

    async fn fetch_friend_requests(&self) -> Result<Vec<FriendRequest>, ClientError> {
        Self::fetch_friend_requests(self).await
    }

    async fn fetch_blocked(&self) -> Result<Vec<UserId>, ClientError> {
        Self::fetch_blocked(self).await
    }

    async fn fetch_instance(&self, id: &InstanceId) -> Result<Instance, ClientError> {
        Self::fetch_instance(self, id).await
    }

    async fn fetch_active_instances(&self, category: &str) -> Result<Vec<Instance>, ClientError> {
        self.fetch_category(category, InstanceSort::MemberCount, SortDirection::Descending)
            .await
    }
}

/// The image-loading collaborator.
///
/// The engine hands over a reference and moves on; the resolved payload
/// comes back through the command queue as a volatile mutation that never
/// produces activity.
#[async_trait]
pub trait ImageResolver: Send + Sync {
    /// Resolves a remote image reference to its payload, or `None` when
    /// resolution failed. Failures are not retried by the engine.
    async fn resolve(&self, url: &str) -> Option<String>;
}

/// Resolver for embedders that do not render images.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopResolver;

#[async_trait]
impl ImageResolver for NoopResolver {
    async fn resolve(&self, _url: &str) -> Option<String> {
        None
    }
}
