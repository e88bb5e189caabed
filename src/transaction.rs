use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use tracing::{debug, error, warn};

use crate::error::SqlDriverError;
use crate::parameterize::{escape_identifier, parameterize};
use crate::pool::PhysicalConnection;
use crate::query::Query;
use crate::results::QueryResult;
use crate::session::Session;

static NEXT_SAVEPOINT: AtomicU64 = AtomicU64::new(1);

/// Lifecycle of a [`Transaction`]. Leaves `Pending` exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionState {
    Pending,
    Committed,
    RolledBack,
}

impl TransactionState {
    #[must_use]
    pub fn is_pending(self) -> bool {
        matches!(self, Self::Pending)
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pending => "pending",
            Self::Committed => "committed",
            Self::RolledBack => "rolled back",
        })
    }
}

/// Process-unique savepoint name (`trx1`, `trx2`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SavepointId(String);

impl SavepointId {
    fn next() -> Self {
        Self(format!("trx{}", NEXT_SAVEPOINT.fetch_add(1, Ordering::Relaxed)))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn quoted(&self) -> String {
        escape_identifier(&self.0)
    }
}

impl fmt::Display for SavepointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

enum ConnSlot<'a, C> {
    /// Root: checked out from the pool, `None` once released.
    Owned(Option<C>),
    /// Nested: the parent's connection.
    Borrowed(&'a mut C),
}

/// One transaction scope: the outermost `BEGIN` or a savepoint nested inside it.
///
/// A root transaction owns its pooled connection. A nested one mutably borrows
/// its parent, so the parent cannot be used, and no sibling can exist, until
/// the nested transaction is dropped. Statements run strictly one after the
/// other.
///
/// | operation    | root                      | nested                                  |
/// |--------------|---------------------------|-----------------------------------------|
/// | `savepoint`  | `SAVEPOINT <own id>`      | `SAVEPOINT <own id>`                    |
/// | `commit`     | `COMMIT`                  | `SAVEPOINT <own id>`                    |
/// | `rollback`   | `ROLLBACK`, then release  | `ROLLBACK TO SAVEPOINT <parent id>`     |
///
/// All three fail with `InvalidTransition` once the transaction has left
/// [`TransactionState::Pending`].
pub struct Transaction<'a, C: PhysicalConnection> {
    conn: ConnSlot<'a, C>,
    id: SavepointId,
    parent: Option<SavepointId>,
    depth: usize,
    state: TransactionState,
}

impl<C: PhysicalConnection> Transaction<'static, C> {
    /// Issue `BEGIN` on a freshly checked out connection.
    pub(crate) async fn start(mut conn: C) -> Result<Self, SqlDriverError> {
        if let Err(err) = conn.batch_execute("BEGIN").await {
            conn.release();
            return Err(err);
        }
        let id = SavepointId::next();
        debug!(savepoint = %id, "begin");
        Ok(Self {
            conn: ConnSlot::Owned(Some(conn)),
            id,
            parent: None,
            depth: 0,
            state: TransactionState::Pending,
        })
    }

    /// Commit or roll back according to the callback outcome, then release the
    /// connection. Runs exactly once per root started by `Driver::begin_with`.
    pub(crate) async fn settle_root<T, E>(&mut self, outcome: Result<T, E>) -> Result<T, E>
    where
        T: Send,
        E: From<SqlDriverError> + fmt::Display + Send,
    {
        let settled = match outcome {
            Ok(value) if !self.state.is_pending() => Ok(value),
            Ok(value) => match self.commit().await {
                Ok(()) => Ok(value),
                Err(err) => Err(self.rollback_after(E::from(err)).await),
            },
            Err(err) => Err(self.rollback_after(err).await),
        };
        self.release();
        settled
    }
}

impl<'a, C: PhysicalConnection> Transaction<'a, C> {
    #[must_use]
    pub fn state(&self) -> TransactionState {
        self.state
    }

    #[must_use]
    pub fn savepoint_name(&self) -> &str {
        self.id.as_str()
    }

    /// The savepoint a rollback of this nested transaction returns to.
    #[must_use]
    pub fn parent_savepoint(&self) -> Option<&SavepointId> {
        self.parent.as_ref()
    }

    /// 0 for the root, 1 for its direct children, and so on.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth
    }

    #[must_use]
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// Mark a savepoint under this transaction's id and open a nested
    /// transaction that rolls back to it.
    ///
    /// # Errors
    /// `InvalidTransition` if this transaction is no longer pending; connection
    /// errors unchanged.
    pub async fn begin(&mut self) -> Result<Transaction<'_, C>, SqlDriverError> {
        self.ensure_pending("nested")?;
        let parent = self.id.clone();
        let depth = self.depth + 1;
        let conn = self.connection()?;
        conn.batch_execute(&format!("SAVEPOINT {}", parent.quoted()))
            .await?;

        let id = SavepointId::next();
        debug!(savepoint = %id, parent = %parent, depth, "begin nested");
        Ok(Transaction {
            conn: ConnSlot::Borrowed(conn),
            id,
            parent: Some(parent),
            depth,
            state: TransactionState::Pending,
        })
    }

    /// Run `callback` inside a nested transaction.
    ///
    /// If the callback succeeds and left the nested transaction pending, its
    /// savepoint is marked again and the value returned. If the callback
    /// finalized it already, the value is returned as is. If the callback
    /// fails, the nested transaction is rolled back once and the callback's
    /// error returned. Should that rollback fail, its error is returned
    /// instead and the callback's error is logged. This includes a callback
    /// that committed or rolled back itself before failing, which yields
    /// `InvalidTransition`.
    ///
    /// ```rust,no_run
    /// # use sql_driver::{Driver, Session, SqlDriverError, insert, row, sql};
    /// # use sql_driver::pool::ConnectionPool;
    /// # async fn demo<P: ConnectionPool>(driver: Driver<P>) -> Result<(), SqlDriverError> {
    /// driver
    ///     .begin_with(|trx| {
    ///         Box::pin(async move {
    ///             trx.insert_into("users", row! { "username" => "foo" }).await?;
    ///             trx.begin_with(|audit| {
    ///                 Box::pin(async move {
    ///                     audit.query(sql!("insert into audit (action) values ({})", "signup")?).await?;
    ///                     Ok::<_, SqlDriverError>(())
    ///                 })
    ///             })
    ///             .await
    ///         })
    ///     })
    ///     .await
    /// # }
    /// ```
    ///
    /// # Errors
    /// Whatever the callback returns, or the errors of `begin`, `savepoint` and
    /// `rollback` converted into `E`.
    pub fn begin_with<'s, F, T, E>(&'s mut self, callback: F) -> BoxFuture<'s, Result<T, E>>
    where
        for<'t> F: FnOnce(&'t mut Transaction<'_, C>) -> BoxFuture<'t, Result<T, E>> + Send + 's,
        T: Send + 's,
        E: From<SqlDriverError> + fmt::Display + Send + 's,
    {
        Box::pin(async move {
            let mut child = self.begin().await?;
            match callback(&mut child).await {
                Ok(value) => {
                    if child.state.is_pending() {
                        child.savepoint().await?;
                    }
                    Ok(value)
                }
                Err(err) => Err(child.rollback_after(err).await),
            }
        })
    }

    /// Re-mark this transaction's savepoint.
    ///
    /// # Errors
    /// `InvalidTransition` unless pending; connection errors unchanged.
    pub async fn savepoint(&mut self) -> Result<(), SqlDriverError> {
        self.ensure_pending("saved")?;
        let sql = format!("SAVEPOINT {}", self.id.quoted());
        self.connection()?.batch_execute(&sql).await?;
        debug!(savepoint = %self.id, "savepoint");
        Ok(())
    }

    /// `COMMIT` at the root; a nested transaction re-marks its savepoint,
    /// leaving the work to the enclosing commit.
    ///
    /// # Errors
    /// `InvalidTransition` unless pending; connection errors unchanged, in which
    /// case the transaction stays pending.
    pub async fn commit(&mut self) -> Result<(), SqlDriverError> {
        self.ensure_pending("committed")?;
        let sql = if self.is_root() {
            "COMMIT".to_string()
        } else {
            format!("SAVEPOINT {}", self.id.quoted())
        };
        self.connection()?.batch_execute(&sql).await?;
        self.state = TransactionState::Committed;
        debug!(savepoint = %self.id, depth = self.depth, "commit");
        Ok(())
    }

    /// `ROLLBACK` and release the connection at the root;
    /// `ROLLBACK TO SAVEPOINT <parent>` when nested.
    ///
    /// The transaction is rolled back as far as its state goes even when the
    /// statement fails.
    ///
    /// # Errors
    /// `InvalidTransition` unless pending; connection errors unchanged.
    pub async fn rollback(&mut self) -> Result<(), SqlDriverError> {
        self.ensure_pending("rolled back")?;
        self.state = TransactionState::RolledBack;
        debug!(savepoint = %self.id, depth = self.depth, "rollback");
        match self.parent.as_ref().map(SavepointId::quoted) {
            None => {
                let result = self.connection()?.batch_execute("ROLLBACK").await;
                self.release();
                result
            }
            Some(parent) => {
                self.connection()?
                    .batch_execute(&format!("ROLLBACK TO SAVEPOINT {parent}"))
                    .await
            }
        }
    }

    async fn rollback_after<E>(&mut self, err: E) -> E
    where
        E: From<SqlDriverError> + fmt::Display + Send,
    {
        // A callback that finalized and then failed gets `InvalidTransition`.
        match self.rollback().await {
            Ok(()) => err,
            Err(rollback_err) => {
                error!(
                    savepoint = %self.id,
                    error = %err,
                    rollback_error = %rollback_err,
                    "rollback after failure did not succeed"
                );
                E::from(rollback_err)
            }
        }
    }

    fn ensure_pending(&self, action: &'static str) -> Result<(), SqlDriverError> {
        if self.state.is_pending() {
            Ok(())
        } else {
            Err(SqlDriverError::InvalidTransition {
                action,
                state: self.state,
            })
        }
    }

    fn connection(&mut self) -> Result<&mut C, SqlDriverError> {
        match &mut self.conn {
            ConnSlot::Owned(Some(conn)) => Ok(conn),
            ConnSlot::Owned(None) => Err(SqlDriverError::ConnectionError(
                "connection was already released to the pool".to_string(),
            )),
            ConnSlot::Borrowed(conn) => Ok(&mut **conn),
        }
    }

    fn release(&mut self) {
        if let ConnSlot::Owned(slot) = &mut self.conn
            && let Some(conn) = slot.take()
        {
            debug!(savepoint = %self.id, "release connection");
            conn.release();
        }
    }
}

#[async_trait]
impl<'a, C: PhysicalConnection> Session for Transaction<'a, C> {
    async fn query(&mut self, query: Query) -> Result<QueryResult, SqlDriverError> {
        let statement = parameterize(query)?;
        debug!(
            savepoint = %self.id,
            sql = %statement.text,
            params = statement.values.len(),
            "query"
        );
        self.connection()?.execute(&statement).await
    }
}

impl<C: PhysicalConnection> fmt::Debug for Transaction<'_, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("parent", &self.parent)
            .field("depth", &self.depth)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

// A root dropped while pending still holds an open transaction on its
// connection; roll it back on the runtime before the connection goes back.
impl<C: PhysicalConnection> Drop for Transaction<'_, C> {
    fn drop(&mut self) {
        let ConnSlot::Owned(slot) = &mut self.conn else {
            return;
        };
        let Some(mut conn) = slot.take() else {
            return;
        };
        if !self.state.is_pending() {
            conn.release();
            return;
        }

        warn!(savepoint = %self.id, "transaction dropped while pending; rolling back");
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(err) = conn.batch_execute("ROLLBACK").await {
                        warn!(error = %err, "rollback of dropped transaction failed");
                    }
                    conn.release();
                });
            }
            Err(_) => conn.release(),
        }
    }
}
