//! In-memory fakes for the storage seams, shared by the integration tests.
#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::{Result, bail};
use async_trait::async_trait;
use blog_admin::audit::store::tally;
use blog_admin::audit::{
    AuditFilter, AuditRecord, AuditStore, NewAuditRecord, OperationStat, Page, PageRequest,
    Principal, PrincipalResolver,
};
use blog_admin::batch::gateway::{FieldSet, StatePredicate};
use blog_admin::batch::{EntityKind, EntityState, PersistenceGateway, PublishState};
use chrono::{DateTime, Utc};

/// An article row in the given state, not pinned, not featured, no category.
pub fn article(id: i64, status: PublishState) -> EntityState {
    EntityState {
        id,
        status,
        pinned: Some(false),
        featured: Some(false),
        category_id: None,
        deleted: false,
        published_at: None,
        updated_at: DateTime::<Utc>::UNIX_EPOCH,
    }
}

pub fn question(id: i64, status: PublishState) -> EntityState {
    EntityState {
        pinned: None,
        featured: None,
        ..article(id, status)
    }
}

pub fn admin(id: i64) -> Principal {
    Principal {
        id,
        username: Some(format!("admin{id}")),
        role: Some("ADMIN".to_owned()),
    }
}

pub fn author(id: i64) -> Principal {
    Principal {
        id,
        username: Some(format!("author{id}")),
        role: Some("AUTHOR".to_owned()),
    }
}

/// Entity storage keyed by kind and id, counting calls per operation.
#[derive(Default)]
pub struct MemoryGateway {
    rows: Mutex<BTreeMap<(u8, i64), EntityState>>,
    pub find_calls: AtomicUsize,
    pub update_calls: AtomicUsize,
    /// When set, bulk updates report zero affected rows.
    pub lose_updates: AtomicBool,
    /// When set, every call fails.
    pub broken: AtomicBool,
}

fn kind_key(kind: EntityKind) -> u8 {
    match kind {
        EntityKind::Article => 0,
        EntityKind::InterviewQuestion => 1,
    }
}

impl MemoryGateway {
    pub fn with(kind: EntityKind, rows: impl IntoIterator<Item = EntityState>) -> Self {
        let gateway = Self::default();
        gateway.insert(kind, rows);
        gateway
    }

    pub fn insert(&self, kind: EntityKind, rows: impl IntoIterator<Item = EntityState>) {
        let mut map = self.rows.lock().unwrap();
        for row in rows {
            map.insert((kind_key(kind), row.id), row);
        }
    }

    pub fn get(&self, kind: EntityKind, id: i64) -> Option<EntityState> {
        self.rows.lock().unwrap().get(&(kind_key(kind), id)).cloned()
    }

    pub fn total_calls(&self) -> usize {
        self.find_calls.load(Ordering::SeqCst) + self.update_calls.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<()> {
        if self.broken.load(Ordering::SeqCst) {
            bail!("connection reset by peer");
        }
        Ok(())
    }
}

#[async_trait]
impl PersistenceGateway for MemoryGateway {
    async fn find_matching(
        &self,
        kind: EntityKind,
        ids: &[i64],
        predicate: &StatePredicate,
    ) -> Result<Vec<EntityState>> {
        self.find_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        let map = self.rows.lock().unwrap();
        Ok(ids
            .iter()
            .filter_map(|id| map.get(&(kind_key(kind), *id)))
            .filter(|state| predicate.matches(state))
            .cloned()
            .collect())
    }

    async fn bulk_update(&self, kind: EntityKind, ids: &[i64], fields: &FieldSet) -> Result<u64> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        if self.lose_updates.load(Ordering::SeqCst) {
            return Ok(0);
        }
        let mut map = self.rows.lock().unwrap();
        let mut affected = 0;
        for id in ids {
            if let Some(state) = map.get_mut(&(kind_key(kind), *id)) {
                fields.apply(state);
                affected += 1;
            }
        }
        Ok(affected)
    }

    async fn snapshot(&self, kind: EntityKind, ids: &[i64]) -> Result<Vec<EntityState>> {
        self.check()?;
        let map = self.rows.lock().unwrap();
        Ok(ids
            .iter()
            .filter_map(|id| map.get(&(kind_key(kind), *id)))
            .cloned()
            .collect())
    }
}

/// Append-only audit store in memory. Can be switched into an outage.
#[derive(Default)]
pub struct MemoryAuditStore {
    records: Mutex<Vec<AuditRecord>>,
    pub failing: AtomicBool,
    pub purge_calls: AtomicUsize,
}

impl MemoryAuditStore {
    pub fn failing() -> Self {
        let store = Self::default();
        store.failing.store(true, Ordering::SeqCst);
        store
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    /// Store a record with an explicit creation time.
    pub fn insert_at(&self, created_at: DateTime<Utc>, record: NewAuditRecord) -> AuditRecord {
        let mut records = self.records.lock().unwrap();
        let id = records.iter().map(|r| r.id).max().unwrap_or(0) + 1;
        let stored = AuditRecord::from_new(id, created_at, record);
        records.push(stored.clone());
        stored
    }

    /// Poll until `count` records are present or `timeout` elapses.
    pub async fn wait_for(&self, count: usize, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while tokio::time::Instant::now() < deadline {
            if self.len() >= count {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        self.len() >= count
    }

    fn check(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            bail!("audit store unavailable");
        }
        Ok(())
    }
}

#[async_trait]
impl AuditStore for MemoryAuditStore {
    async fn append(&self, record: NewAuditRecord) -> Result<AuditRecord> {
        self.check()?;
        Ok(self.insert_at(Utc::now(), record))
    }

    async fn query(&self, filter: &AuditFilter, page: PageRequest) -> Result<Page<AuditRecord>> {
        self.check()?;
        let mut matching: Vec<AuditRecord> = self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        let total = matching.len() as i64;
        let items = matching
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.per_page as usize)
            .collect();
        Ok(Page {
            items,
            total,
            page: page.page,
            per_page: page.per_page,
        })
    }

    async fn count(&self, filter: &AuditFilter) -> Result<i64> {
        self.check()?;
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| filter.matches(r))
            .count() as i64)
    }

    async fn statistics(
        &self,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Result<Vec<OperationStat>> {
        self.check()?;
        let records = self.records.lock().unwrap();
        Ok(tally(
            records
                .iter()
                .filter(|r| r.created_at >= start_time && r.created_at < end_time),
        ))
    }

    async fn purge(&self, before: DateTime<Utc>) -> Result<u64> {
        self.purge_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        let mut records = self.records.lock().unwrap();
        let len = records.len();
        records.retain(|r| r.created_at >= before);
        Ok((len - records.len()) as u64)
    }
}

/// Resolves a fixed set of principals.
#[derive(Default)]
pub struct StaticResolver {
    principals: Vec<Principal>,
}

impl StaticResolver {
    pub fn new(principals: impl IntoIterator<Item = Principal>) -> Self {
        Self {
            principals: principals.into_iter().collect(),
        }
    }
}

#[async_trait]
impl PrincipalResolver for StaticResolver {
    async fn resolve(&self, user_id: i64) -> Result<Option<Principal>> {
        Ok(self.principals.iter().find(|p| p.id == user_id).cloned())
    }
}
