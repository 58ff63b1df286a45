//! Unit of work: one storage transaction around one application action.
//!
//! A [`UnitOfWork`] pairs a [`TransactionBackend`] (how to begin, commit and
//! roll back) with a [`RepositoryRegistry`] (how to build each repository
//! against an open transaction). [`UnitOfWork::run`] begins a transaction,
//! hands the action a [`UnitOfWorkScope`] from which it pulls repositories,
//! and commits when the action returns `Ok` or rolls back otherwise.
//!
//! # Example
//!
//! ```ignore
//! let transfer = uow
//!     .run(move |scope| {
//!         Box::pin(async move {
//!             let accounts = scope.accounts()?;
//!             let transfers = scope.transfers()?;
//!             // ... load, mutate, persist
//!             Ok::<_, TransferError>(transfer)
//!         })
//!     })
//!     .await?;
//! ```
//!
//! # Cancellation
//!
//! Dropping the future returned by `run` drops the open transaction, which
//! every backend treats as a rollback. A timeout set with
//! [`UnitOfWork::with_timeout`] rolls back explicitly and returns
//! [`UnitOfWorkError::TimedOut`].

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::repository::{AccountRepository, ClientRepository, TransferRepository};

/// Repositories a unit of work can provide.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RepositoryKind {
    /// [`ClientRepository`]
    Clients,
    /// [`AccountRepository`]
    Accounts,
    /// [`TransferRepository`]
    Transfers,
}

impl fmt::Display for RepositoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Clients => "clients",
            Self::Accounts => "accounts",
            Self::Transfers => "transfers",
        })
    }
}

/// Coordinator failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UnitOfWorkError {
    /// The transaction could not be started.
    #[error("failed to begin transaction: {0}")]
    Begin(String),

    /// The transaction could not be committed; nothing was persisted.
    #[error("failed to commit transaction: {0}")]
    Commit(String),

    /// The transaction could not be rolled back.
    #[error("failed to roll back transaction: {0}")]
    Rollback(String),

    /// No factory is registered for the requested repository.
    #[error("repository '{0}' is not registered")]
    RepositoryNotRegistered(RepositoryKind),

    /// The action did not finish in time and was rolled back.
    #[error("unit of work timed out after {0:?}")]
    TimedOut(Duration),
}

/// Future returned by backend methods.
pub type BackendFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, UnitOfWorkError>> + Send + 'a>>;

/// Storage transaction lifecycle.
pub trait TransactionBackend: Send + Sync + 'static {
    /// Open transaction, shared with the repositories built for it.
    type Handle: Send + Sync + 'static;

    /// Starts a transaction.
    ///
    /// # Errors
    ///
    /// [`UnitOfWorkError::Begin`] if the storage is unreachable.
    fn begin(&self) -> BackendFuture<'_, Self::Handle>;

    /// Makes the transaction's writes durable.
    ///
    /// # Errors
    ///
    /// [`UnitOfWorkError::Commit`]; no writes are visible afterwards.
    fn commit(&self, handle: Self::Handle) -> BackendFuture<'_, ()>;

    /// Discards the transaction's writes.
    ///
    /// # Errors
    ///
    /// [`UnitOfWorkError::Rollback`].
    fn rollback(&self, handle: Self::Handle) -> BackendFuture<'_, ()>;
}

type Factory<H, R> = Box<dyn Fn(&H) -> Arc<R> + Send + Sync>;

/// Factories that build repositories against an open transaction handle.
pub struct RepositoryRegistry<H> {
    clients: Option<Factory<H, dyn ClientRepository>>,
    accounts: Option<Factory<H, dyn AccountRepository>>,
    transfers: Option<Factory<H, dyn TransferRepository>>,
}

impl<H> Default for RepositoryRegistry<H> {
    fn default() -> Self {
        Self {
            clients: None,
            accounts: None,
            transfers: None,
        }
    }
}

impl<H> RepositoryRegistry<H> {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the client repository factory.
    #[must_use]
    pub fn with_clients<F>(mut self, factory: F) -> Self
    where
        F: Fn(&H) -> Arc<dyn ClientRepository> + Send + Sync + 'static,
    {
        self.clients = Some(Box::new(factory));
        self
    }

    /// Registers the account repository factory.
    #[must_use]
    pub fn with_accounts<F>(mut self, factory: F) -> Self
    where
        F: Fn(&H) -> Arc<dyn AccountRepository> + Send + Sync + 'static,
    {
        self.accounts = Some(Box::new(factory));
        self
    }

    /// Registers the transfer repository factory.
    #[must_use]
    pub fn with_transfers<F>(mut self, factory: F) -> Self
    where
        F: Fn(&H) -> Arc<dyn TransferRepository> + Send + Sync + 'static,
    {
        self.transfers = Some(Box::new(factory));
        self
    }

    /// Removes the factory for `kind`.
    pub fn unregister(&mut self, kind: RepositoryKind) {
        match kind {
            RepositoryKind::Clients => self.clients = None,
            RepositoryKind::Accounts => self.accounts = None,
            RepositoryKind::Transfers => self.transfers = None,
        }
    }

    /// True when a factory is registered for `kind`.
    #[must_use]
    pub const fn is_registered(&self, kind: RepositoryKind) -> bool {
        match kind {
            RepositoryKind::Clients => self.clients.is_some(),
            RepositoryKind::Accounts => self.accounts.is_some(),
            RepositoryKind::Transfers => self.transfers.is_some(),
        }
    }
}

impl<H> fmt::Debug for RepositoryRegistry<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RepositoryRegistry")
            .field("clients", &self.clients.is_some())
            .field("accounts", &self.accounts.is_some())
            .field("transfers", &self.transfers.is_some())
            .finish()
    }
}

/// Repositories bound to one open transaction.
///
/// Each repository is built on first request and reused for the rest of the
/// scope, so two calls to [`UnitOfWorkScope::accounts`] return the same `Arc`.
pub struct UnitOfWorkScope<H> {
    handle: H,
    registry: Arc<RepositoryRegistry<H>>,
    clients: Option<Arc<dyn ClientRepository>>,
    accounts: Option<Arc<dyn AccountRepository>>,
    transfers: Option<Arc<dyn TransferRepository>>,
}

impl<H> UnitOfWorkScope<H> {
    fn new(handle: H, registry: Arc<RepositoryRegistry<H>>) -> Self {
        Self {
            handle,
            registry,
            clients: None,
            accounts: None,
            transfers: None,
        }
    }

    /// The open transaction handle.
    pub const fn handle(&self) -> &H {
        &self.handle
    }

    /// Client repository bound to this transaction.
    ///
    /// # Errors
    ///
    /// [`UnitOfWorkError::RepositoryNotRegistered`] if no factory exists.
    pub fn clients(&mut self) -> Result<Arc<dyn ClientRepository>, UnitOfWorkError> {
        if let Some(repository) = &self.clients {
            return Ok(Arc::clone(repository));
        }
        let factory = self
            .registry
            .clients
            .as_ref()
            .ok_or(UnitOfWorkError::RepositoryNotRegistered(RepositoryKind::Clients))?;
        let repository = factory(&self.handle);
        self.clients = Some(Arc::clone(&repository));
        Ok(repository)
    }

    /// Account repository bound to this transaction.
    ///
    /// # Errors
    ///
    /// [`UnitOfWorkError::RepositoryNotRegistered`] if no factory exists.
    pub fn accounts(&mut self) -> Result<Arc<dyn AccountRepository>, UnitOfWorkError> {
        if let Some(repository) = &self.accounts {
            return Ok(Arc::clone(repository));
        }
        let factory = self
            .registry
            .accounts
            .as_ref()
            .ok_or(UnitOfWorkError::RepositoryNotRegistered(RepositoryKind::Accounts))?;
        let repository = factory(&self.handle);
        self.accounts = Some(Arc::clone(&repository));
        Ok(repository)
    }

    /// Transfer repository bound to this transaction.
    ///
    /// # Errors
    ///
    /// [`UnitOfWorkError::RepositoryNotRegistered`] if no factory exists.
    pub fn transfers(&mut self) -> Result<Arc<dyn TransferRepository>, UnitOfWorkError> {
        if let Some(repository) = &self.transfers {
            return Ok(Arc::clone(repository));
        }
        let factory = self
            .registry
            .transfers
            .as_ref()
            .ok_or(UnitOfWorkError::RepositoryNotRegistered(RepositoryKind::Transfers))?;
        let repository = factory(&self.handle);
        self.transfers = Some(Arc::clone(&repository));
        Ok(repository)
    }

    fn into_handle(self) -> H {
        self.handle
    }
}

/// Transaction coordinator.
pub struct UnitOfWork<B: TransactionBackend> {
    backend: B,
    registry: Arc<RepositoryRegistry<B::Handle>>,
    timeout: Option<Duration>,
}

impl<B: TransactionBackend> UnitOfWork<B> {
    /// Creates a coordinator without a timeout.
    #[must_use]
    pub fn new(backend: B, registry: RepositoryRegistry<B::Handle>) -> Self {
        Self {
            backend,
            registry: Arc::new(registry),
            timeout: None,
        }
    }

    /// Rolls back and fails any action that runs longer than `timeout`.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Runs `action` inside a fresh transaction.
    ///
    /// Commits when the action returns `Ok`, rolls back otherwise. The
    /// action's own error is returned unchanged after a successful rollback.
    ///
    /// # Errors
    ///
    /// - the action's error, after rollback
    /// - [`UnitOfWorkError::Begin`], [`UnitOfWorkError::Commit`] or
    ///   [`UnitOfWorkError::Rollback`] converted into `E`; these replace the
    ///   action's result
    /// - [`UnitOfWorkError::TimedOut`] when the configured timeout elapses
    pub async fn run<T, E, F>(&self, action: F) -> Result<T, E>
    where
        T: Send,
        E: From<UnitOfWorkError> + fmt::Display + Send,
        F: for<'s> FnOnce(
                &'s mut UnitOfWorkScope<B::Handle>,
            ) -> Pin<Box<dyn Future<Output = Result<T, E>> + Send + 's>>
            + Send,
    {
        let handle = self.backend.begin().await?;
        let mut scope = UnitOfWorkScope::new(handle, Arc::clone(&self.registry));

        let outcome = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, action(&mut scope))
                .await
                .map_err(|_| limit),
            None => Ok(action(&mut scope).await),
        };
        let handle = scope.into_handle();

        match outcome {
            Ok(Ok(value)) => {
                self.backend.commit(handle).await?;
                tracing::debug!("Unit of work committed");
                Ok(value)
            }
            Ok(Err(error)) => {
                tracing::debug!(error = %error, "Unit of work action failed, rolling back");
                self.rollback(handle).await?;
                Err(error)
            }
            Err(limit) => {
                tracing::warn!(
                    timeout_ms = u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
                    "Unit of work timed out, rolling back"
                );
                self.rollback(handle).await?;
                Err(UnitOfWorkError::TimedOut(limit).into())
            }
        }
    }

    async fn rollback(&self, handle: B::Handle) -> Result<(), UnitOfWorkError> {
        self.backend.rollback(handle).await.inspect_err(|error| {
            tracing::error!(error = %error, "Rollback failed");
        })
    }
}

impl<B: TransactionBackend + fmt::Debug> fmt::Debug for UnitOfWork<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitOfWork")
            .field("backend", &self.backend)
            .field("registry", &self.registry)
            .field("timeout", &self.timeout)
            .finish()
    }
}
