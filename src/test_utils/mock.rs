use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::SqlDriverError;
use crate::parameterize::Statement;
use crate::pool::{ConnectionPool, PhysicalConnection};
use crate::results::{QueryResult, command_tag};
use crate::types::RowValues;

/// One statement seen by a [`RecordingConnection`].
#[derive(Debug, Clone, PartialEq)]
pub struct Recorded {
    /// Which checkout ran it; ids start at 1 and grow per checkout
    pub conn: usize,
    pub sql: String,
    pub values: Vec<RowValues>,
}

#[derive(Debug, Default)]
struct Log {
    statements: Vec<Recorded>,
    checkouts: usize,
    releases: usize,
    drained: bool,
    fail_on: Vec<String>,
    responses: VecDeque<QueryResult>,
}

/// In-memory pool that records statements instead of running them.
///
/// Clones share one log. Every statement succeeds with an empty result unless
/// it contains a fragment registered with [`RecordingPool::fail_when`], or a
/// canned result was queued with [`RecordingPool::respond_with`].
#[derive(Debug, Clone, Default)]
pub struct RecordingPool {
    log: Arc<Mutex<Log>>,
    slots: Option<Arc<Semaphore>>,
}

impl RecordingPool {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bound the number of connections checked out at once.
    #[must_use]
    pub fn with_max_size(max_size: usize) -> Self {
        Self {
            log: Arc::default(),
            slots: Some(Arc::new(Semaphore::new(max_size))),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Log> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fail every later statement whose SQL contains `fragment`.
    pub fn fail_when(&self, fragment: impl Into<String>) -> &Self {
        self.lock().fail_on.push(fragment.into());
        self
    }

    /// Queue `result` as the answer to the next parameterized statement.
    pub fn respond_with(&self, result: QueryResult) -> &Self {
        self.lock().responses.push_back(result);
        self
    }

    /// Every statement seen so far, in order.
    #[must_use]
    pub fn statements(&self) -> Vec<Recorded> {
        self.lock().statements.clone()
    }

    /// SQL text of every statement seen so far, in order.
    #[must_use]
    pub fn sql(&self) -> Vec<String> {
        self.lock().statements.iter().map(|s| s.sql.clone()).collect()
    }

    /// SQL text run on one checkout.
    #[must_use]
    pub fn sql_on(&self, conn: usize) -> Vec<String> {
        self.lock()
            .statements
            .iter()
            .filter(|s| s.conn == conn)
            .map(|s| s.sql.clone())
            .collect()
    }

    #[must_use]
    pub fn checkouts(&self) -> usize {
        self.lock().checkouts
    }

    #[must_use]
    pub fn releases(&self) -> usize {
        self.lock().releases
    }

    #[must_use]
    pub fn is_drained(&self) -> bool {
        self.lock().drained
    }

    /// Forget recorded statements and counters; failure rules stay.
    pub fn clear(&self) {
        let mut log = self.lock();
        log.statements.clear();
        log.checkouts = 0;
        log.releases = 0;
    }
}

#[async_trait]
impl ConnectionPool for RecordingPool {
    type Connection = RecordingConnection;

    async fn checkout(&self) -> Result<RecordingConnection, SqlDriverError> {
        if self.lock().drained {
            return Err(SqlDriverError::ConnectionError(
                "pool has been closed".to_string(),
            ));
        }
        let permit = match &self.slots {
            Some(slots) => Some(Arc::clone(slots).acquire_owned().await.map_err(|_| {
                SqlDriverError::ConnectionError("pool has been closed".to_string())
            })?),
            None => None,
        };
        let mut log = self.lock();
        log.checkouts += 1;
        Ok(RecordingConnection {
            id: log.checkouts,
            log: Arc::clone(&self.log),
            _permit: permit,
        })
    }

    fn drain(&self) {
        self.lock().drained = true;
        if let Some(slots) = &self.slots {
            slots.close();
        }
    }
}

/// A connection handed out by [`RecordingPool`].
#[derive(Debug)]
pub struct RecordingConnection {
    id: usize,
    log: Arc<Mutex<Log>>,
    _permit: Option<OwnedSemaphorePermit>,
}

impl RecordingConnection {
    #[must_use]
    pub fn id(&self) -> usize {
        self.id
    }

    fn record(
        &self,
        sql: &str,
        values: &[RowValues],
        take_response: bool,
    ) -> Result<Option<QueryResult>, SqlDriverError> {
        let mut log = self.log.lock().unwrap_or_else(PoisonError::into_inner);
        log.statements.push(Recorded {
            conn: self.id,
            sql: sql.to_string(),
            values: values.to_vec(),
        });
        if log.fail_on.iter().any(|fragment| sql.contains(fragment.as_str())) {
            return Err(SqlDriverError::ExecutionError(format!("forced failure: {sql}")));
        }
        Ok(if take_response {
            log.responses.pop_front()
        } else {
            None
        })
    }
}

#[async_trait]
impl PhysicalConnection for RecordingConnection {
    async fn execute(&mut self, statement: &Statement) -> Result<QueryResult, SqlDriverError> {
        let canned = self.record(&statement.text, &statement.values, true)?;
        Ok(canned.unwrap_or_else(|| QueryResult::new(Vec::new(), 0, command_tag(&statement.text))))
    }

    async fn batch_execute(&mut self, sql: &str) -> Result<(), SqlDriverError> {
        self.record(sql, &[], false)?;
        Ok(())
    }

    fn release(self) {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .releases += 1;
    }
}
