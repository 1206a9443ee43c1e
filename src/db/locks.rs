//! Mutual-exclusion helpers: keyed in-process locks, advisory locks and
//! write transactions.

use dashmap::DashMap;
use sea_orm::{
    ConnectionTrait, DatabaseTransaction, DbBackend, DbErr, Statement, TransactionTrait,
};
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// In-process lock table keyed by entity id.
///
/// Entries are dropped once the last holder or waiter releases them, so the
/// table only ever contains keys that are currently contended.
#[derive(Debug)]
pub struct KeyedLocks<K>
where
    K: Eq + Hash,
{
    inner: Arc<DashMap<K, Arc<Mutex<()>>>>,
}

impl<K> Clone for KeyedLocks<K>
where
    K: Eq + Hash,
{
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<K> Default for KeyedLocks<K>
where
    K: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K> KeyedLocks<K>
where
    K: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        Self {
            inner: Arc::new(DashMap::new()),
        }
    }

    /// Waits until no other holder owns `key`, then returns a guard for it.
    pub async fn lock(&self, key: K) -> KeyedLockGuard<K> {
        let mutex = Arc::clone(
            self.inner
                .entry(key.clone())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .value(),
        );
        let guard = mutex.lock_owned().await;
        KeyedLockGuard {
            key,
            guard: Some(guard),
            table: self.inner.clone(),
        }
    }

    /// Number of keys currently held or awaited
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

pub struct KeyedLockGuard<K>
where
    K: Eq + Hash,
{
    key: K,
    guard: Option<OwnedMutexGuard<()>>,
    table: Arc<DashMap<K, Arc<Mutex<()>>>>,
}

impl<K> Drop for KeyedLockGuard<K>
where
    K: Eq + Hash,
{
    fn drop(&mut self) {
        self.guard.take();
        self.table
            .remove_if(&self.key, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}

/// Takes a transaction-scoped advisory lock on PostgreSQL.
///
/// The lock is released by commit or rollback. Other backends serialise
/// writers on their own, so this is a no-op there.
pub async fn advisory_xact_lock<C>(conn: &C, scope: &str, key: &str) -> Result<(), DbErr>
where
    C: ConnectionTrait,
{
    if conn.get_database_backend() != DbBackend::Postgres {
        return Ok(());
    }

    conn.execute(Statement::from_sql_and_values(
        DbBackend::Postgres,
        "SELECT pg_advisory_xact_lock(hashtextextended($1, 0))",
        [format!("{}:{}", scope, key).into()],
    ))
    .await?;
    Ok(())
}

/// First statement of every SQLite write transaction. The no-op update
/// takes the database write lock without touching a row.
const SQLITE_WRITE_LOCK: &str = "UPDATE carts SET updated_at = updated_at WHERE 0";

/// Begins a transaction that is allowed to write.
///
/// On SQLite the write lock is held from the first statement, so concurrent
/// writers wait on the busy timeout and read fresh rows once admitted rather
/// than failing with SQLITE_BUSY on a stale snapshot. Other backends rely on
/// the row and advisory locks taken later in the transaction.
pub async fn begin_write<C>(db: &C) -> Result<DatabaseTransaction, DbErr>
where
    C: TransactionTrait,
{
    let txn = db.begin().await?;
    if txn.get_database_backend() == DbBackend::Sqlite {
        txn.execute_unprepared(SQLITE_WRITE_LOCK).await?;
    }
    Ok(txn)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use uuid::Uuid;

    #[tokio::test]
    async fn same_key_is_exclusive() {
        let locks = KeyedLocks::new();
        let key = Uuid::new_v4();
        let inside = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let locks = locks.clone();
            let inside = inside.clone();
            let max_seen = max_seen.clone();
            handles.push(tokio::spawn(async move {
                let _guard = locks.lock(key).await;
                let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                inside.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn different_keys_do_not_block() {
        let locks = KeyedLocks::new();
        let _first = locks.lock(Uuid::new_v4()).await;
        let second = tokio::time::timeout(Duration::from_millis(100), locks.lock(Uuid::new_v4()))
            .await;
        assert!(second.is_ok());
        assert_eq!(locks.len(), 2);
    }
}
