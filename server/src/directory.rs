//! Lookup seams for the account and community-membership stores.
//!
//! Identity issuance and membership records live outside this process; the
//! dispatcher only ever asks two questions of them. Both answers are `None`
//! on any failure, so a flaky store degrades to "account unknown" rather
//! than an error path.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A registered account as the account store reports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub id: i64,
    pub name: String,
}

/// Rank of a community membership, in roster wire order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MembershipRank {
    Owner,
    Admin,
    Member,
}

impl MembershipRank {
    /// Byte used for this rank in roster entries.
    pub fn wire_code(self) -> u8 {
        match self {
            MembershipRank::Owner => 0x00,
            MembershipRank::Admin => 0x01,
            MembershipRank::Member => 0x02,
        }
    }
}

/// A community membership record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Membership {
    pub rank: MembershipRank,
}

pub trait AccountDirectory: Send + Sync + 'static {
    fn account_by_id(&self, id: i64) -> impl Future<Output = Option<Account>> + Send;
}

pub trait MembershipDirectory: Send + Sync + 'static {
    fn membership(
        &self,
        account_id: i64,
        community_id: i64,
    ) -> impl Future<Output = Option<Membership>> + Send;
}

#[derive(Default)]
struct MemoryDirectoryInner {
    accounts: HashMap<i64, Account>,
    memberships: HashMap<(i64, i64), Membership>,
}

/// In-memory implementation of both directories. Stands in for the real
/// account store in the binary, the test client workflow, and tests; clones
/// share the same underlying tables.
#[derive(Clone, Default)]
pub struct MemoryDirectory {
    inner: Arc<RwLock<MemoryDirectoryInner>>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_account(&self, id: i64, name: &str) {
        let mut inner = self.inner.write().await;
        inner.accounts.insert(
            id,
            Account {
                id,
                name: name.to_string(),
            },
        );
    }

    pub async fn insert_membership(&self, account_id: i64, community_id: i64, rank: MembershipRank) {
        let mut inner = self.inner.write().await;
        inner
            .memberships
            .insert((account_id, community_id), Membership { rank });
    }
}

impl AccountDirectory for MemoryDirectory {
    fn account_by_id(&self, id: i64) -> impl Future<Output = Option<Account>> + Send {
        async move { self.inner.read().await.accounts.get(&id).cloned() }
    }
}

impl MembershipDirectory for MemoryDirectory {
    fn membership(
        &self,
        account_id: i64,
        community_id: i64,
    ) -> impl Future<Output = Option<Membership>> + Send {
        async move {
            self.inner
                .read()
                .await
                .memberships
                .get(&(account_id, community_id))
                .copied()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn account_lookup() {
        let dir = MemoryDirectory::new();
        dir.insert_account(42, "Rook").await;

        let account = dir.account_by_id(42).await.unwrap();
        assert_eq!(account.id, 42);
        assert_eq!(account.name, "Rook");
        assert_eq!(dir.account_by_id(43).await, None);
    }

    #[tokio::test]
    async fn membership_lookup() {
        let dir = MemoryDirectory::new();
        dir.insert_membership(42, 1, MembershipRank::Admin).await;

        let membership = dir.membership(42, 1).await.unwrap();
        assert_eq!(membership.rank, MembershipRank::Admin);
        assert_eq!(dir.membership(42, 2).await, None);
        assert_eq!(dir.membership(7, 1).await, None);
    }

    #[tokio::test]
    async fn clones_share_tables() {
        let dir = MemoryDirectory::new();
        let other = dir.clone();
        other.insert_account(1, "copy").await;
        assert!(dir.account_by_id(1).await.is_some());
    }

    #[test]
    fn rank_wire_codes() {
        assert_eq!(MembershipRank::Owner.wire_code(), 0x00);
        assert_eq!(MembershipRank::Admin.wire_code(), 0x01);
        assert_eq!(MembershipRank::Member.wire_code(), 0x02);
    }
}
