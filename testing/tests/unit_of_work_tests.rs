//! Unit-of-work behaviour against the in-memory backend.

#![allow(clippy::unwrap_used)] // Tests can unwrap
#![allow(clippy::expect_used)] // Tests can expect

use ledger_core::environment::Clock;
use ledger_core::{
    AccountId, DomainError, RepositoryError, RepositoryKind, Transfer, UnitOfWork,
    UnitOfWorkError,
};
use ledger_testing::{InMemoryLedger, test_clock};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, PartialEq)]
enum TestError {
    UnitOfWork(UnitOfWorkError),
    Repository(RepositoryError),
    Domain(DomainError),
    MissingAccount,
}

impl From<UnitOfWorkError> for TestError {
    fn from(error: UnitOfWorkError) -> Self {
        Self::UnitOfWork(error)
    }
}

impl From<RepositoryError> for TestError {
    fn from(error: RepositoryError) -> Self {
        Self::Repository(error)
    }
}

impl From<DomainError> for TestError {
    fn from(error: DomainError) -> Self {
        Self::Domain(error)
    }
}

impl fmt::Display for TestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Moves `amount` between two accounts the same way the transfer use case does.
async fn transfer(
    uow: &UnitOfWork<InMemoryLedger>,
    from: AccountId,
    to: AccountId,
    amount: Decimal,
) -> Result<Transfer, TestError> {
    let clock: Arc<dyn Clock> = Arc::new(test_clock());
    uow.run(move |scope| {
        Box::pin(async move {
            let accounts = scope.accounts()?;
            let transfers = scope.transfers()?;
            let mut source = accounts.find_by_id(from).await?.ok_or(TestError::MissingAccount)?;
            let mut target = accounts.find_by_id(to).await?.ok_or(TestError::MissingAccount)?;
            let transfer =
                Transfer::create(Some(&mut source), Some(&mut target), amount, clock.as_ref())?;
            accounts.update_balance(&source).await?;
            accounts.update_balance(&target).await?;
            transfers.create(&transfer).await?;
            Ok::<_, TestError>(transfer)
        })
    })
    .await
}

#[tokio::test]
async fn test_successful_action_commits_all_writes() {
    let ledger = InMemoryLedger::new();
    let (alice, bob) = ledger.seed_pair(dec!(100), dec!(0));
    let uow = ledger.unit_of_work();

    let transfer = transfer(&uow, alice, bob, dec!(40)).await.unwrap();

    assert_eq!(ledger.account(alice).unwrap().balance(), dec!(60));
    assert_eq!(ledger.account(bob).unwrap().balance(), dec!(40));
    assert_eq!(ledger.transfers(), vec![transfer]);
    assert_eq!(ledger.commit_count(), 1);
    assert_eq!(ledger.rollback_count(), 0);
}

#[tokio::test]
async fn test_transfer_insert_failure_rolls_back_balance_updates() {
    let ledger = InMemoryLedger::new();
    let (alice, bob) = ledger.seed_pair(dec!(100), dec!(0));
    ledger.faults().fail_transfer_create(true);
    let uow = ledger.unit_of_work();

    let result = transfer(&uow, alice, bob, dec!(40)).await;

    assert!(matches!(result, Err(TestError::Repository(RepositoryError::Database(_)))));
    assert_eq!(ledger.account(alice).unwrap().balance(), dec!(100));
    assert_eq!(ledger.account(bob).unwrap().balance(), dec!(0));
    assert!(ledger.transfers().is_empty());
    assert_eq!(ledger.rollback_count(), 1);
    assert_eq!(ledger.commit_count(), 0);
}

#[tokio::test]
async fn test_domain_error_is_returned_unchanged_after_rollback() {
    let ledger = InMemoryLedger::new();
    let (alice, bob) = ledger.seed_pair(dec!(100), dec!(0));
    let uow = ledger.unit_of_work();

    let result = transfer(&uow, alice, bob, dec!(150)).await;

    assert_eq!(result, Err(TestError::Domain(DomainError::InsufficientFunds)));
    assert_eq!(ledger.rollback_count(), 1);
    assert_eq!(ledger.total_balance(), dec!(100));
}

#[tokio::test]
async fn test_repositories_are_cached_within_one_scope() {
    let ledger = InMemoryLedger::new();
    let uow = ledger.unit_of_work();

    let same = uow
        .run(|scope| {
            Box::pin(async move {
                let first = scope.accounts()?;
                let second = scope.accounts()?;
                let clients_first = scope.clients()?;
                let clients_second = scope.clients()?;
                Ok::<_, TestError>(
                    Arc::ptr_eq(&first, &second) && Arc::ptr_eq(&clients_first, &clients_second),
                )
            })
        })
        .await
        .unwrap();

    assert!(same);
}

#[tokio::test]
async fn test_unregistered_repository_fails_and_rolls_back() {
    let ledger = InMemoryLedger::new();
    let (alice, bob) = ledger.seed_pair(dec!(100), dec!(0));
    let mut registry = InMemoryLedger::registry();
    registry.unregister(RepositoryKind::Transfers);
    assert!(!registry.is_registered(RepositoryKind::Transfers));
    let uow = UnitOfWork::new(ledger.clone(), registry);

    let result = transfer(&uow, alice, bob, dec!(40)).await;

    assert_eq!(
        result,
        Err(TestError::UnitOfWork(UnitOfWorkError::RepositoryNotRegistered(
            RepositoryKind::Transfers
        )))
    );
    assert_eq!(ledger.rollback_count(), 1);
    assert_eq!(ledger.account(alice).unwrap().balance(), dec!(100));
}

#[tokio::test]
async fn test_commit_failure_supersedes_successful_action() {
    let ledger = InMemoryLedger::new();
    let (alice, bob) = ledger.seed_pair(dec!(100), dec!(0));
    ledger.faults().fail_commit(true);
    let uow = ledger.unit_of_work();

    let result = transfer(&uow, alice, bob, dec!(40)).await;

    assert!(matches!(result, Err(TestError::UnitOfWork(UnitOfWorkError::Commit(_)))));
    assert_eq!(ledger.account(alice).unwrap().balance(), dec!(100));
    assert!(ledger.transfers().is_empty());
}

#[tokio::test]
async fn test_rollback_failure_supersedes_action_error() {
    let ledger = InMemoryLedger::new();
    let (alice, bob) = ledger.seed_pair(dec!(10), dec!(0));
    ledger.faults().fail_rollback(true);
    let uow = ledger.unit_of_work();

    let result = transfer(&uow, alice, bob, dec!(40)).await;

    assert!(matches!(result, Err(TestError::UnitOfWork(UnitOfWorkError::Rollback(_)))));
    assert_eq!(ledger.account(alice).unwrap().balance(), dec!(10));
}

#[tokio::test]
async fn test_begin_failure_never_runs_action() {
    let ledger = InMemoryLedger::new();
    ledger.faults().fail_begin(true);
    let uow = ledger.unit_of_work();

    let result = uow
        .run(|_scope| Box::pin(async move { Ok::<_, TestError>(()) }))
        .await;

    assert!(matches!(result, Err(TestError::UnitOfWork(UnitOfWorkError::Begin(_)))));
    assert_eq!(ledger.commit_count(), 0);
}

#[tokio::test]
async fn test_timeout_rolls_back_staged_writes() {
    let ledger = InMemoryLedger::new();
    let (alice, _bob) = ledger.seed_pair(dec!(100), dec!(0));
    let uow = ledger.unit_of_work().with_timeout(Duration::from_millis(20));
    let clock: Arc<dyn Clock> = Arc::new(test_clock());

    let result = uow
        .run(move |scope| {
            Box::pin(async move {
                let accounts = scope.accounts()?;
                let mut account = accounts.find_by_id(alice).await?.ok_or(TestError::MissingAccount)?;
                account.debit(ledger_core::Amount::new(dec!(1))?, clock.as_ref())?;
                accounts.update_balance(&account).await?;
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<_, TestError>(())
            })
        })
        .await;

    assert_eq!(
        result,
        Err(TestError::UnitOfWork(UnitOfWorkError::TimedOut(Duration::from_millis(20))))
    );
    assert_eq!(ledger.account(alice).unwrap().balance(), dec!(100));
    assert_eq!(ledger.rollback_count(), 1);
}

#[tokio::test]
async fn test_dropping_the_future_discards_staged_writes() {
    let ledger = InMemoryLedger::new();
    let (alice, _bob) = ledger.seed_pair(dec!(100), dec!(0));
    let uow = ledger.unit_of_work();
    let clock: Arc<dyn Clock> = Arc::new(test_clock());

    let cancelled = tokio::time::timeout(
        Duration::from_millis(20),
        uow.run(move |scope| {
            Box::pin(async move {
                let accounts = scope.accounts()?;
                let mut account = accounts.find_by_id(alice).await?.ok_or(TestError::MissingAccount)?;
                account.debit(ledger_core::Amount::new(dec!(1))?, clock.as_ref())?;
                accounts.update_balance(&account).await?;
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<_, TestError>(())
            })
        }),
    )
    .await;

    assert!(cancelled.is_err());
    assert_eq!(ledger.account(alice).unwrap().balance(), dec!(100));
    assert_eq!(ledger.commit_count(), 0);
}

#[tokio::test]
async fn test_concurrent_transfers_on_disjoint_accounts_both_commit() {
    let ledger = InMemoryLedger::new();
    let (a, b) = ledger.seed_pair(dec!(50), dec!(0));
    let (c, d) = ledger.seed_pair(dec!(70), dec!(0));
    let uow = ledger.unit_of_work();

    let (first, second) = tokio::join!(
        transfer(&uow, a, b, dec!(20)),
        transfer(&uow, c, d, dec!(30))
    );

    first.unwrap();
    second.unwrap();
    assert_eq!(ledger.account(b).unwrap().balance(), dec!(20));
    assert_eq!(ledger.account(d).unwrap().balance(), dec!(30));
    assert_eq!(ledger.total_balance(), dec!(120));
    assert_eq!(ledger.transfers().len(), 2);
}
