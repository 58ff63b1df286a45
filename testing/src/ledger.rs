//! In-memory unit-of-work backend.
//!
//! Each transaction reads from a private copy of the committed state and
//! records its writes. Commit replays the writes onto the shared state;
//! rollback or drop discards them. Faults can be switched on to exercise the
//! rollback paths.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Panics only on poisoned locks

use ledger_core::environment::Clock;
use ledger_core::repository::RepositoryFuture;
use ledger_core::unit_of_work::BackendFuture;
use ledger_core::{
    Account, AccountId, AccountRepository, Amount, Client, ClientId, ClientRepository,
    RepositoryError, RepositoryRegistry, Transfer, TransferRepository, TransactionBackend,
    UnitOfWork, UnitOfWorkError,
};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use crate::mocks::test_clock;

#[derive(Clone, Debug, Default)]
struct LedgerState {
    clients: HashMap<ClientId, Client>,
    accounts: HashMap<AccountId, Account>,
    transfers: Vec<Transfer>,
}

#[derive(Clone, Debug)]
enum Write {
    Client(Client),
    Account(Account),
    Transfer(Transfer),
}

impl LedgerState {
    fn apply(&mut self, write: Write) {
        match write {
            Write::Client(client) => {
                self.clients.insert(client.id(), client);
            }
            Write::Account(account) => {
                self.accounts.insert(account.id(), account);
            }
            Write::Transfer(transfer) => self.transfers.push(transfer),
        }
    }
}

#[derive(Debug)]
struct TxState {
    view: LedgerState,
    writes: Vec<Write>,
}

/// Switches that make the backend or its repositories fail.
#[derive(Debug, Default)]
pub struct FaultInjection {
    fail_begin: AtomicBool,
    fail_commit: AtomicBool,
    fail_rollback: AtomicBool,
    fail_account_update: AtomicBool,
    fail_transfer_create: AtomicBool,
}

impl FaultInjection {
    /// Make `begin` fail.
    pub fn fail_begin(&self, on: bool) {
        self.fail_begin.store(on, Ordering::SeqCst);
    }

    /// Make `commit` fail; staged writes are discarded.
    pub fn fail_commit(&self, on: bool) {
        self.fail_commit.store(on, Ordering::SeqCst);
    }

    /// Make `rollback` fail.
    pub fn fail_rollback(&self, on: bool) {
        self.fail_rollback.store(on, Ordering::SeqCst);
    }

    /// Make `AccountRepository::update_balance` fail.
    pub fn fail_account_update(&self, on: bool) {
        self.fail_account_update.store(on, Ordering::SeqCst);
    }

    /// Make `TransferRepository::create` fail.
    pub fn fail_transfer_create(&self, on: bool) {
        self.fail_transfer_create.store(on, Ordering::SeqCst);
    }

    fn is_set(flag: &AtomicBool) -> bool {
        flag.load(Ordering::SeqCst)
    }
}

/// Shared in-memory ledger; clones observe the same state.
#[derive(Clone, Debug, Default)]
pub struct InMemoryLedger {
    committed: Arc<RwLock<LedgerState>>,
    faults: Arc<FaultInjection>,
    commits: Arc<AtomicUsize>,
    rollbacks: Arc<AtomicUsize>,
}

impl InMemoryLedger {
    /// Creates an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fault switches.
    #[must_use]
    pub fn faults(&self) -> &FaultInjection {
        &self.faults
    }

    /// Registry with all three in-memory repositories.
    #[must_use]
    pub fn registry() -> RepositoryRegistry<InMemoryTransaction> {
        RepositoryRegistry::new()
            .with_clients(|tx: &InMemoryTransaction| {
                Arc::new(InMemoryClientRepository { tx: tx.clone() }) as Arc<dyn ClientRepository>
            })
            .with_accounts(|tx: &InMemoryTransaction| {
                Arc::new(InMemoryAccountRepository { tx: tx.clone() }) as Arc<dyn AccountRepository>
            })
            .with_transfers(|tx: &InMemoryTransaction| {
                Arc::new(InMemoryTransferRepository { tx: tx.clone() })
                    as Arc<dyn TransferRepository>
            })
    }

    /// Unit of work over this ledger with every repository registered.
    #[must_use]
    pub fn unit_of_work(&self) -> UnitOfWork<Self> {
        UnitOfWork::new(self.clone(), Self::registry())
    }

    /// Inserts a client directly into committed state.
    pub fn seed_client(&self, client: Client) {
        self.committed.write().unwrap().apply(Write::Client(client));
    }

    /// Inserts an account directly into committed state.
    pub fn seed_account(&self, account: Account) {
        self.committed.write().unwrap().apply(Write::Account(account));
    }

    /// Creates a client with one account holding `balance`.
    #[must_use]
    pub fn seed_funded_account(&self, name: &str, balance: Decimal) -> AccountId {
        let clock = test_clock();
        let mut client = Client::new(name, format!("{}@example.com", name.to_lowercase()), &clock)
            .unwrap();
        let mut account = Account::open(Some(&client), &clock).unwrap();
        if balance > Decimal::ZERO {
            account.credit(Amount::new(balance).unwrap(), &clock).unwrap();
        }
        client.add_account(&account).unwrap();
        let id = account.id();
        self.seed_client(client);
        self.seed_account(account);
        id
    }

    /// Two funded accounts owned by different clients.
    #[must_use]
    pub fn seed_pair(&self, first: Decimal, second: Decimal) -> (AccountId, AccountId) {
        (
            self.seed_funded_account("Alice", first),
            self.seed_funded_account("Bob", second),
        )
    }

    /// Committed account.
    #[must_use]
    pub fn account(&self, id: AccountId) -> Option<Account> {
        self.committed.read().unwrap().accounts.get(&id).cloned()
    }

    /// Committed client.
    #[must_use]
    pub fn client(&self, id: ClientId) -> Option<Client> {
        self.committed.read().unwrap().clients.get(&id).cloned()
    }

    /// Committed transfers in commit order.
    #[must_use]
    pub fn transfers(&self) -> Vec<Transfer> {
        self.committed.read().unwrap().transfers.clone()
    }

    /// Number of successful commits.
    #[must_use]
    pub fn commit_count(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    /// Number of rollbacks.
    #[must_use]
    pub fn rollback_count(&self) -> usize {
        self.rollbacks.load(Ordering::SeqCst)
    }

    /// Sum of all committed balances.
    #[must_use]
    pub fn total_balance(&self) -> Decimal {
        self.committed
            .read()
            .unwrap()
            .accounts
            .values()
            .map(Account::balance)
            .sum()
    }
}

/// Open in-memory transaction.
#[derive(Clone, Debug)]
pub struct InMemoryTransaction {
    state: Arc<Mutex<Option<TxState>>>,
    faults: Arc<FaultInjection>,
}

impl InMemoryTransaction {
    fn read<T>(&self, f: impl FnOnce(&LedgerState) -> T) -> Result<T, RepositoryError> {
        let guard = self.state.lock().unwrap();
        let tx = guard.as_ref().ok_or(RepositoryError::TransactionClosed)?;
        Ok(f(&tx.view))
    }

    fn write(
        &self,
        f: impl FnOnce(&LedgerState) -> Result<Write, RepositoryError>,
    ) -> Result<(), RepositoryError> {
        let mut guard = self.state.lock().unwrap();
        let tx = guard.as_mut().ok_or(RepositoryError::TransactionClosed)?;
        let write = f(&tx.view)?;
        tx.view.apply(write.clone());
        tx.writes.push(write);
        Ok(())
    }

    fn take(&self) -> Option<TxState> {
        self.state.lock().unwrap().take()
    }
}

impl TransactionBackend for InMemoryLedger {
    type Handle = InMemoryTransaction;

    fn begin(&self) -> BackendFuture<'_, Self::Handle> {
        Box::pin(async move {
            if FaultInjection::is_set(&self.faults.fail_begin) {
                return Err(UnitOfWorkError::Begin("injected begin failure".to_string()));
            }
            let view = self.committed.read().unwrap().clone();
            Ok(InMemoryTransaction {
                state: Arc::new(Mutex::new(Some(TxState {
                    view,
                    writes: Vec::new(),
                }))),
                faults: Arc::clone(&self.faults),
            })
        })
    }

    fn commit(&self, handle: Self::Handle) -> BackendFuture<'_, ()> {
        Box::pin(async move {
            let tx = handle
                .take()
                .ok_or_else(|| UnitOfWorkError::Commit("transaction already finished".to_string()))?;
            if FaultInjection::is_set(&self.faults.fail_commit) {
                return Err(UnitOfWorkError::Commit("injected commit failure".to_string()));
            }
            let mut committed = self.committed.write().unwrap();
            for write in tx.writes {
                committed.apply(write);
            }
            self.commits.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    fn rollback(&self, handle: Self::Handle) -> BackendFuture<'_, ()> {
        Box::pin(async move {
            handle.take();
            if FaultInjection::is_set(&self.faults.fail_rollback) {
                return Err(UnitOfWorkError::Rollback("injected rollback failure".to_string()));
            }
            self.rollbacks.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }
}

struct InMemoryClientRepository {
    tx: InMemoryTransaction,
}

impl ClientRepository for InMemoryClientRepository {
    fn get(&self, id: ClientId) -> RepositoryFuture<'_, Option<Client>> {
        Box::pin(async move {
            self.tx.read(|state| {
                state.clients.get(&id).cloned().map(|client| {
                    let accounts = state
                        .accounts
                        .values()
                        .filter(|account| account.client_id() == id)
                        .map(Account::id)
                        .collect();
                    Client::restore(
                        client.id(),
                        client.name().to_string(),
                        client.email().to_string(),
                        accounts,
                        client.created_at(),
                        client.updated_at(),
                    )
                })
            })
        })
    }

    fn save(&self, client: &Client) -> RepositoryFuture<'_, ()> {
        let client = client.clone();
        Box::pin(async move {
            self.tx.write(|state| {
                if state.clients.contains_key(&client.id()) {
                    return Err(RepositoryError::Conflict(format!("client {}", client.id())));
                }
                Ok(Write::Client(client))
            })
        })
    }
}

struct InMemoryAccountRepository {
    tx: InMemoryTransaction,
}

impl AccountRepository for InMemoryAccountRepository {
    fn find_by_id(&self, id: AccountId) -> RepositoryFuture<'_, Option<Account>> {
        Box::pin(async move { self.tx.read(|state| state.accounts.get(&id).cloned()) })
    }

    fn save(&self, account: &Account) -> RepositoryFuture<'_, ()> {
        let account = account.clone();
        Box::pin(async move {
            self.tx.write(|state| {
                if !state.clients.contains_key(&account.client_id()) {
                    return Err(RepositoryError::ForeignKeyViolation(format!(
                        "client {} does not exist",
                        account.client_id()
                    )));
                }
                if state.accounts.contains_key(&account.id()) {
                    return Err(RepositoryError::Conflict(format!("account {}", account.id())));
                }
                Ok(Write::Account(account))
            })
        })
    }

    fn update_balance(&self, account: &Account) -> RepositoryFuture<'_, ()> {
        let account = account.clone();
        Box::pin(async move {
            if FaultInjection::is_set(&self.tx.faults.fail_account_update) {
                return Err(RepositoryError::Database(
                    "injected account update failure".to_string(),
                ));
            }
            self.tx.write(|state| {
                if !state.accounts.contains_key(&account.id()) {
                    return Err(RepositoryError::NotFound {
                        entity: "account",
                        id: account.id().to_string(),
                    });
                }
                Ok(Write::Account(account))
            })
        })
    }
}

struct InMemoryTransferRepository {
    tx: InMemoryTransaction,
}

impl TransferRepository for InMemoryTransferRepository {
    fn create(&self, transfer: &Transfer) -> RepositoryFuture<'_, ()> {
        let transfer = transfer.clone();
        Box::pin(async move {
            if FaultInjection::is_set(&self.tx.faults.fail_transfer_create) {
                return Err(RepositoryError::Database(
                    "injected transfer insert failure".to_string(),
                ));
            }
            self.tx.write(|state| {
                for account_id in [transfer.account_from(), transfer.account_to()] {
                    if !state.accounts.contains_key(&account_id) {
                        return Err(RepositoryError::ForeignKeyViolation(format!(
                            "account {account_id} does not exist"
                        )));
                    }
                }
                if state.transfers.iter().any(|existing| existing.id() == transfer.id()) {
                    return Err(RepositoryError::Conflict(format!("transfer {}", transfer.id())));
                }
                Ok(Write::Transfer(transfer))
            })
        })
    }
}

/// The fixed test clock as a shared trait object.
#[must_use]
pub fn ledger_clock() -> Arc<dyn Clock> {
    Arc::new(test_clock())
}
