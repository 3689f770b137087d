//! Cache of connection pools keyed by connection target.

use std::{collections::HashMap, sync::Arc};

use tokio::sync::{Mutex, OnceCell};

use crate::{ConnectionPool, Connector, DbError, PoolOptions, target::Redacted};

type Slot<P> = Arc<OnceCell<Arc<P>>>;

/// Owns at most one pool per target.
///
/// The map lock is only held to find or insert a slot. The pool itself is opened through the
/// slot's [`OnceCell`], so concurrent first users of one target wait for a single connect
/// while other targets are not blocked. A failed connect leaves the slot empty and the next
/// caller tries again.
pub(crate) struct PoolRegistry<C: Connector> {
    connector: C,
    options: PoolOptions,
    pools: Mutex<HashMap<String, Slot<C::Pool>>>,
}

impl<C: Connector> PoolRegistry<C> {
    pub(crate) fn new(connector: C, options: PoolOptions) -> Self {
        Self {
            connector,
            options,
            pools: Mutex::new(HashMap::new()),
        }
    }

    /// Return the cached pool for `target`, opening it on first use.
    pub(crate) async fn get_or_create(&self, target: &str) -> Result<Arc<C::Pool>, DbError> {
        let slot = {
            let mut pools = self.pools.lock().await;
            pools.entry(target.to_string()).or_default().clone()
        };

        let pool = slot
            .get_or_try_init(|| async {
                log::debug!("Opening connection pool for {}", Redacted(target));

                let pool = self.connector.connect(target, &self.options).await?;
                Ok::<_, DbError>(Arc::new(pool))
            })
            .await?;

        Ok(pool.clone())
    }

    /// Drop and close the pool of `target` if the registry still holds `stale`.
    ///
    /// A pool that was already replaced by another caller is left in place.
    pub(crate) async fn invalidate(&self, target: &str, stale: &Arc<C::Pool>) {
        let removed = {
            let mut pools = self.pools.lock().await;

            let is_current = pools
                .get(target)
                .and_then(|slot| slot.get())
                .is_some_and(|current| Arc::ptr_eq(current, stale));

            if is_current { pools.remove(target) } else { None }
        };

        if removed.is_some() {
            log::warn!("Resetting connection pool for {}", Redacted(target));
            stale.close().await;
        }
    }

    /// Empty the registry and close every pool that was opened.
    ///
    /// A slot whose pool is still connecting is awaited, so a connect racing with shutdown
    /// cannot leave an open pool behind.
    pub(crate) async fn close_all(&self) {
        let pools = std::mem::take(&mut *self.pools.lock().await);

        for (target, slot) in pools {
            // Waits for an in-flight connect. An idle empty slot yields the error at once.
            let Ok(pool) = slot.get_or_try_init(|| async { Err(()) }).await else {
                continue;
            };

            log::debug!("Closing connection pool for {}", Redacted(&target));
            pool.close().await;
        }
    }

    /// Number of targets with an open pool.
    pub(crate) async fn len(&self) -> usize {
        let pools = self.pools.lock().await;
        pools.values().filter(|slot| slot.initialized()).count()
    }
}
