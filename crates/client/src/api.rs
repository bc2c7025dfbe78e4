//! Typed pull-channel surface (the snapshot fetcher)
//!
//! Each call performs exactly one request and surfaces failures to the
//! caller. Snapshots are idempotent to re-fetch; there is no internal
//! retry.

use serde::Deserialize;

use parallax_primitives::friend::Friend;
use parallax_primitives::ids::{InstanceId, UserId};
use parallax_primitives::instance::Instance;
use parallax_primitives::requests::FriendRequest;

use crate::connection::Connection;
use crate::errors::ClientError;

/// Sort key for instance listings.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum InstanceSort {
    MemberCount,
    CreatedAt,
}

impl InstanceSort {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MemberCount => "memberCount",
            Self::CreatedAt => "createdAt",
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl SortDirection {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ascending => "ascending",
            Self::Descending => "descending",
        }
    }
}

/// One page of an instance listing.
///
/// `total_pages` is not stable across page fetches; callers looping
/// `0..total_pages` must re-read it after every page.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstancePage {
    pub entries: Vec<Instance>,
    pub total_pages: u32,
}

#[derive(Clone, Debug)]
pub struct Api {
    connection: Connection,
}

impl Api {
    #[must_use]
    pub const fn new(connection: Connection) -> Self {
        Self { connection }
    }

    /// Full friends snapshot.
    pub async fn fetch_friends(&self) -> Result<Vec<Friend>, ClientError> {
        self.connection.get("/user/friends").await
    }

    /// Full pending friend-request snapshot. Ground truth: replaces the
    /// local map wholesale.
    pub async fn fetch_friend_requests(&self) -> Result<Vec<FriendRequest>, ClientError> {
        self.connection.get("/user/friendRequests").await
    }

    /// The blocked-user set, fetched once per authenticated session.
    pub async fn fetch_blocked(&self) -> Result<Vec<UserId>, ClientError> {
        self.connection.get("/user/blocked").await
    }

    /// Details of a single instance, used for lazy directory backfill.
    pub async fn fetch_instance(&self, id: &InstanceId) -> Result<Instance, ClientError> {
        self.connection
            .get(&format!("/instances/{id}"))
            .await
    }

    /// One page of an instance category listing.
    pub async fn fetch_instances_by_category(
        &self,
        category: &str,
        page: u32,
        sort: InstanceSort,
        direction: SortDirection,
    ) -> Result<InstancePage, ClientError> {
        self.connection
            .get_with_query(
                "/instances",
                &[
                    ("category", category.to_owned()),
                    ("page", page.to_string()),
                    ("sort", sort.as_str().to_owned()),
                    ("direction", direction.as_str().to_owned()),
                ],
            )
            .await
    }

    /// Fetches every page of a category listing.
    ///
    /// The server does not guarantee a stable page total, so the bound is
    /// re-read from each response rather than captured up front.
    pub async fn fetch_category(
        &self,
        category: &str,
        sort: InstanceSort,
        direction: SortDirection,
    ) -> Result<Vec<Instance>, ClientError> {
        let mut entries = Vec::new();
        let mut page = 0;
        let mut total_pages = 1;

        while page < total_pages {
            let batch = self
                .fetch_instances_by_category(category, page, sort, direction)
                .await?;

            total_pages = batch.total_pages;
            entries.extend(batch.entries);

            page += 1;
        }

        Ok(entries)
    }
}
