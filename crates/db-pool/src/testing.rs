//! In-memory backend for exercising the registry and the manager without a database.

use std::{
    collections::VecDeque,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use crate::{ConnectionPool, Connector, DbError, PoolOptions, Query};

#[derive(Default)]
pub(crate) struct MockState {
    pub connects: AtomicUsize,
    pub closes: AtomicUsize,
    pub queries: AtomicUsize,
    failing_connects: AtomicUsize,
    outcomes: Mutex<VecDeque<Result<Vec<usize>, DbError>>>,
    targets: Mutex<Vec<String>>,
    delay: Mutex<Option<Duration>>,
}

/// Every pool it opens gets a sequence number, which is also the single row its queries
/// return unless an outcome was scripted.
#[derive(Clone, Default)]
pub(crate) struct MockConnector {
    pub state: Arc<MockState>,
}

impl MockConnector {
    pub fn fail_next_connects(&self, count: usize) {
        self.state.failing_connects.store(count, Ordering::SeqCst);
    }

    /// Queue outcomes consumed by the next queries, across all pools.
    pub fn script(&self, outcomes: impl IntoIterator<Item = Result<Vec<usize>, DbError>>) {
        self.state.outcomes.lock().unwrap().extend(outcomes);
    }

    /// Make every query sleep for `delay` before answering.
    pub fn delay_queries(&self, delay: Duration) {
        *self.state.delay.lock().unwrap() = Some(delay);
    }

    pub fn connected_targets(&self) -> Vec<String> {
        self.state.targets.lock().unwrap().clone()
    }
}

impl Connector for MockConnector {
    type Pool = MockPool;

    async fn connect(&self, target: &str, _: &PoolOptions) -> Result<MockPool, DbError> {
        let id = self.state.connects.fetch_add(1, Ordering::SeqCst) + 1;
        tokio::task::yield_now().await;

        let failing = self.state.failing_connects.load(Ordering::SeqCst);
        if failing > 0 {
            self.state.failing_connects.store(failing - 1, Ordering::SeqCst);
            let refused = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "connection refused");
            return Err(DbError::Transient(Box::new(refused)));
        }

        self.state.targets.lock().unwrap().push(target.to_string());

        Ok(MockPool {
            id,
            closed: AtomicBool::new(false),
            state: self.state.clone(),
        })
    }
}

pub(crate) struct MockPool {
    pub id: usize,
    closed: AtomicBool,
    state: Arc<MockState>,
}

impl MockPool {
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn pause(&self) {
        let delay = *self.state.delay.lock().unwrap();

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn run(&self, query: &Query) -> Result<Vec<usize>, DbError> {
        query.to_positional()?;
        self.state.queries.fetch_add(1, Ordering::SeqCst);

        if self.is_closed() {
            return Err(DbError::Transient("pool is closed".into()));
        }

        let scripted = self.state.outcomes.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| Ok(vec![self.id]))
    }
}

impl ConnectionPool for MockPool {
    type Row = usize;

    async fn fetch_optional(&self, query: &Query) -> Result<Option<usize>, DbError> {
        self.pause().await;
        Ok(self.run(query)?.into_iter().next())
    }

    async fn fetch_all(&self, query: &Query) -> Result<Vec<usize>, DbError> {
        self.pause().await;
        self.run(query)
    }

    async fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.state.closes.fetch_add(1, Ordering::SeqCst);
        }
    }
}

pub(crate) fn connection_reset() -> DbError {
    let reset = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "connection reset by peer");
    DbError::Transient(Box::new(reset))
}
