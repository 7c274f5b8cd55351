// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! In-memory backing store.
//!
//! Each user owns a partition guarded by its own [`Mutex`]; a unit of work
//! holds that lock from its first read to its commit. Writes are staged in
//! the unit and copied into the partition only after the closure succeeds.
//!
//! Lock order is always "map shard, released" then "partition": the
//! [`DashMap`] guard is dropped before the partition lock is taken, so a
//! unit never blocks another user's lookup.

use super::{BalanceStore, FaultInjector, LedgerUnit, Settlement, Store, TransactionStore};
use crate::balance::{Balance, BalanceDelta, Condition};
use crate::base::{TransactionId, UserId};
use crate::error::LedgerError;
use crate::transaction::{NewTransaction, Transaction, TransactionKind, TransactionStatus};
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Committed state of one user.
#[derive(Debug, Default)]
struct Partition {
    balance: Option<Balance>,
    transactions: BTreeMap<TransactionId, Transaction>,
}

impl Partition {
    fn is_empty(&self) -> bool {
        self.balance.is_none() && self.transactions.is_empty()
    }
}

/// Writes staged by a unit of work.
#[derive(Debug, Default)]
struct Staged {
    balance: Option<Balance>,
    /// `Some` upserts, `None` deletes.
    transactions: BTreeMap<TransactionId, Option<Transaction>>,
}

impl Staged {
    fn commit_into(self, partition: &mut Partition) {
        if let Some(balance) = self.balance {
            partition.balance = Some(balance);
        }
        for (id, write) in self.transactions {
            match write {
                Some(transaction) => {
                    partition.transactions.insert(id, transaction);
                }
                None => {
                    partition.transactions.remove(&id);
                }
            }
        }
    }
}

/// Thread-safe in-memory store with per-user atomic units.
#[derive(Debug)]
pub struct MemoryStore {
    partitions: DashMap<UserId, Arc<Mutex<Partition>>>,
    /// Last assigned transaction id.
    last_id: AtomicU64,
    faults: FaultInjector,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            partitions: DashMap::new(),
            last_id: AtomicU64::new(0),
            faults: FaultInjector::new(),
        }
    }

    /// Fault switches for exercising failure paths.
    pub fn faults(&self) -> &FaultInjector {
        &self.faults
    }

    fn partition(&self, user_id: &UserId) -> Arc<Mutex<Partition>> {
        if let Some(partition) = self.partitions.get(user_id) {
            return Arc::clone(partition.value());
        }
        Arc::clone(self.partitions.entry(user_id.clone()).or_default().value())
    }
}

impl MemoryStore {
    fn run_unit<T, F>(
        committed: &mut Partition,
        user_id: &UserId,
        last_id: &AtomicU64,
        faults: &FaultInjector,
        work: F,
    ) -> Result<T, LedgerError>
    where
        F: FnOnce(&mut dyn LedgerUnit) -> Result<T, LedgerError>,
    {
        let mut unit = MemoryUnit {
            user_id,
            committed: &*committed,
            last_id,
            faults,
            staged: Staged::default(),
        };
        let output = work(&mut unit)?;
        faults.check_commit()?;
        let staged = unit.staged;
        staged.commit_into(committed);
        Ok(output)
    }

    /// Drops the user's partition if it holds nothing and no unit is using it.
    ///
    /// Units clone the partition handle under the map shard lock, which
    /// `remove_if` holds exclusively, so a count of one means no unit has it.
    fn prune(&self, user_id: &UserId) {
        self.partitions.remove_if(user_id, |_, partition| {
            Arc::strong_count(partition) == 1 && partition.lock().is_empty()
        });
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Store for MemoryStore {
    fn atomically<T, F>(&self, user_id: &UserId, work: F) -> Result<T, LedgerError>
    where
        F: FnOnce(&mut dyn LedgerUnit) -> Result<T, LedgerError>,
    {
        let partition = self.partition(user_id);
        let result = Self::run_unit(
            &mut partition.lock(),
            user_id,
            &self.last_id,
            &self.faults,
            work,
        );
        drop(partition);
        self.prune(user_id);
        result
    }

    fn users(&self) -> Result<Vec<UserId>, LedgerError> {
        let partitions: Vec<_> = self
            .partitions
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect();

        let mut users: Vec<UserId> = partitions
            .into_iter()
            .filter(|(_, partition)| !partition.lock().is_empty())
            .map(|(user_id, _)| user_id)
            .collect();
        users.sort();
        Ok(users)
    }
}

struct MemoryUnit<'a> {
    user_id: &'a UserId,
    committed: &'a Partition,
    last_id: &'a AtomicU64,
    faults: &'a FaultInjector,
    staged: Staged,
}

impl MemoryUnit<'_> {
    fn current_balance(&self) -> Option<&Balance> {
        self.staged
            .balance
            .as_ref()
            .or(self.committed.balance.as_ref())
    }

    fn transaction(&self, id: TransactionId) -> Option<&Transaction> {
        match self.staged.transactions.get(&id) {
            Some(write) => write.as_ref(),
            None => self.committed.transactions.get(&id),
        }
    }

    /// Finds a pending transaction of `kind`, or reports it as not found.
    fn pending(
        &self,
        id: TransactionId,
        kind: TransactionKind,
    ) -> Result<&Transaction, LedgerError> {
        self.transaction(id)
            .filter(|transaction| transaction.kind == kind && transaction.is_pending())
            .ok_or(LedgerError::TransactionNotFound { id, kind })
    }

    fn merged(&self) -> BTreeMap<TransactionId, &Transaction> {
        let mut merged: BTreeMap<_, _> = self
            .committed
            .transactions
            .iter()
            .map(|(id, transaction)| (*id, transaction))
            .collect();
        for (id, write) in &self.staged.transactions {
            match write {
                Some(transaction) => {
                    merged.insert(*id, transaction);
                }
                None => {
                    merged.remove(id);
                }
            }
        }
        merged
    }
}

impl BalanceStore for MemoryUnit<'_> {
    fn find_balance(&self) -> Result<Option<Balance>, LedgerError> {
        Ok(self.current_balance().cloned())
    }

    fn get_or_create_balance(&mut self) -> Result<Balance, LedgerError> {
        if let Some(balance) = self.current_balance() {
            return Ok(balance.clone());
        }
        self.faults.check_write()?;
        let balance = Balance::new(self.user_id.clone());
        self.staged.balance = Some(balance.clone());
        Ok(balance)
    }

    fn apply_delta(
        &mut self,
        delta: BalanceDelta,
        condition: Condition,
    ) -> Result<Balance, LedgerError> {
        let current = self
            .current_balance()
            .ok_or_else(|| LedgerError::NoBalanceRecord(self.user_id.clone()))?;
        let next = current.apply(delta, condition)?;
        self.faults.check_write()?;
        self.staged.balance = Some(next.clone());
        Ok(next)
    }
}

impl TransactionStore for MemoryUnit<'_> {
    fn create_transaction(&mut self, draft: NewTransaction) -> Result<Transaction, LedgerError> {
        self.faults.check_write()?;
        let id = TransactionId(self.last_id.fetch_add(1, Ordering::SeqCst) + 1);
        let transaction = draft.into_transaction(id, self.user_id.clone(), Utc::now());
        self.staged
            .transactions
            .insert(id, Some(transaction.clone()));
        Ok(transaction)
    }

    fn list_pending(&self) -> Result<Vec<Transaction>, LedgerError> {
        Ok(self
            .merged()
            .into_values()
            .filter(|transaction| transaction.is_pending())
            .cloned()
            .collect())
    }

    fn list_all(&self) -> Result<Vec<Transaction>, LedgerError> {
        Ok(self.merged().into_values().cloned().collect())
    }

    fn delete_pending(
        &mut self,
        id: TransactionId,
        kind: TransactionKind,
    ) -> Result<Transaction, LedgerError> {
        let deleted = self.pending(id, kind)?.clone();
        self.faults.check_write()?;
        self.staged.transactions.insert(id, None);
        Ok(deleted)
    }

    fn settle(
        &mut self,
        id: TransactionId,
        kind: TransactionKind,
        final_amount: Option<Decimal>,
    ) -> Result<Settlement, LedgerError> {
        let pending = self.pending(id, kind)?;
        let held_amount = pending.amount;
        let settled = Transaction {
            amount: final_amount.unwrap_or(held_amount),
            status: TransactionStatus::Settled,
            settled_at: Some(Utc::now()),
            ..pending.clone()
        };
        self.faults.check_write()?;
        self.staged
            .transactions
            .insert(id, Some(settled.clone()));
        Ok(Settlement {
            transaction: settled,
            held_amount,
        })
    }
}

impl LedgerUnit for MemoryUnit<'_> {
    fn user_id(&self) -> &UserId {
        self.user_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::DEFAULT_TRANSACTION_NAME;
    use rust_decimal_macros::dec;

    fn purchase(amount: Decimal) -> NewTransaction {
        NewTransaction::new(TransactionKind::Purchase, amount, None, DEFAULT_TRANSACTION_NAME)
    }

    fn alice() -> UserId {
        UserId::from("alice")
    }

    #[test]
    fn get_or_create_is_idempotent() {
        let store = MemoryStore::new();
        let first = store
            .atomically(&alice(), |unit| unit.get_or_create_balance())
            .unwrap();
        store
            .atomically(&alice(), |unit| {
                unit.apply_delta(BalanceDelta::available(dec!(5)), Condition::Always)
            })
            .unwrap();
        let second = store
            .atomically(&alice(), |unit| unit.get_or_create_balance())
            .unwrap();

        assert_eq!(first.available, Decimal::ZERO);
        assert_eq!(second.available, dec!(5));
    }

    #[test]
    fn apply_delta_without_record_fails() {
        let store = MemoryStore::new();
        let result = store.atomically(&alice(), |unit| {
            unit.apply_delta(BalanceDelta::payable(dec!(1)), Condition::Always)
        });
        assert_eq!(result, Err(LedgerError::NoBalanceRecord(alice())));
    }

    #[test]
    fn staged_writes_are_visible_inside_the_unit() {
        let store = MemoryStore::new();
        store
            .atomically(&alice(), |unit| {
                let created = unit.create_transaction(purchase(dec!(10)))?;
                assert_eq!(unit.list_pending()?.len(), 1);
                unit.delete_pending(created.id, TransactionKind::Purchase)?;
                assert!(unit.list_pending()?.is_empty());
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn failed_unit_discards_every_write() {
        let store = MemoryStore::new();
        let result: Result<(), _> = store.atomically(&alice(), |unit| {
            unit.get_or_create_balance()?;
            unit.create_transaction(purchase(dec!(10)))?;
            Err(LedgerError::ZeroPayableBalance)
        });
        assert_eq!(result, Err(LedgerError::ZeroPayableBalance));

        let (balance, all) = store
            .atomically(&alice(), |unit| Ok((unit.find_balance()?, unit.list_all()?)))
            .unwrap();
        assert_eq!(balance, None);
        assert!(all.is_empty());
        assert!(store.users().unwrap().is_empty());
    }

    #[test]
    fn units_that_leave_nothing_drop_their_partition() {
        let store = MemoryStore::new();
        store
            .atomically(&alice(), |unit| unit.find_balance())
            .unwrap();
        let rejected = store.atomically(&UserId::from("bob"), |unit| {
            unit.apply_delta(BalanceDelta::payable(dec!(-1)), Condition::PayableCovers)
        });
        assert!(rejected.is_err());
        assert!(store.partitions.is_empty());

        store
            .atomically(&UserId::from("carol"), |unit| unit.get_or_create_balance())
            .unwrap();
        assert_eq!(store.partitions.len(), 1);
        assert!(store.partitions.contains_key(&UserId::from("carol")));
    }

    #[test]
    fn partitions_in_use_are_not_dropped() {
        let store = MemoryStore::new();
        let in_use = store.partition(&alice());

        store
            .atomically(&alice(), |unit| unit.find_balance())
            .unwrap();
        assert!(store.partitions.contains_key(&alice()));

        drop(in_use);
        store
            .atomically(&alice(), |unit| unit.find_balance())
            .unwrap();
        assert!(!store.partitions.contains_key(&alice()));
    }

    #[test]
    fn commit_failure_discards_every_write() {
        let store = MemoryStore::new();
        store.faults().fail_commits(true);
        let result = store.atomically(&alice(), |unit| unit.get_or_create_balance());
        assert!(result.unwrap_err().is_store_failure());

        store.faults().reset();
        let balance = store
            .atomically(&alice(), |unit| unit.find_balance())
            .unwrap();
        assert_eq!(balance, None);
    }

    #[test]
    fn ids_are_unique_across_users() {
        let store = MemoryStore::new();
        let first = store
            .atomically(&alice(), |unit| unit.create_transaction(purchase(dec!(1))))
            .unwrap();
        let second = store
            .atomically(&UserId::from("bob"), |unit| {
                unit.create_transaction(purchase(dec!(1)))
            })
            .unwrap();
        assert_eq!(first.id, TransactionId(1));
        assert_eq!(second.id, TransactionId(2));
    }

    #[test]
    fn other_users_transactions_are_not_found() {
        let store = MemoryStore::new();
        let created = store
            .atomically(&alice(), |unit| unit.create_transaction(purchase(dec!(10))))
            .unwrap();

        let result = store.atomically(&UserId::from("mallory"), |unit| {
            unit.delete_pending(created.id, TransactionKind::Purchase)
        });
        assert_eq!(
            result,
            Err(LedgerError::TransactionNotFound {
                id: created.id,
                kind: TransactionKind::Purchase,
            })
        );
    }

    #[test]
    fn kind_mismatch_is_not_found() {
        let store = MemoryStore::new();
        let created = store
            .atomically(&alice(), |unit| unit.create_transaction(purchase(dec!(10))))
            .unwrap();
        let result = store.atomically(&alice(), |unit| {
            unit.settle(created.id, TransactionKind::Payment, None)
        });
        assert!(matches!(
            result,
            Err(LedgerError::TransactionNotFound { .. })
        ));
    }

    #[test]
    fn settle_replaces_amount_and_reports_hold() {
        let store = MemoryStore::new();
        let created = store
            .atomically(&alice(), |unit| unit.create_transaction(purchase(dec!(100))))
            .unwrap();
        let settlement = store
            .atomically(&alice(), |unit| {
                unit.settle(created.id, TransactionKind::Purchase, Some(dec!(120)))
            })
            .unwrap();

        assert_eq!(settlement.held_amount, dec!(100));
        assert_eq!(settlement.transaction.amount, dec!(120));
        assert_eq!(settlement.transaction.status, TransactionStatus::Settled);
        assert!(settlement.transaction.settled_at.is_some());
        assert_eq!(settlement.transaction.created_at, created.created_at);
    }

    #[test]
    fn settled_transactions_cannot_be_settled_or_deleted() {
        let store = MemoryStore::new();
        let created = store
            .atomically(&alice(), |unit| unit.create_transaction(purchase(dec!(100))))
            .unwrap();
        store
            .atomically(&alice(), |unit| {
                unit.settle(created.id, TransactionKind::Purchase, None)
            })
            .unwrap();

        let not_found = LedgerError::TransactionNotFound {
            id: created.id,
            kind: TransactionKind::Purchase,
        };
        assert_eq!(
            store.atomically(&alice(), |unit| {
                unit.settle(created.id, TransactionKind::Purchase, None)
            }),
            Err(not_found.clone())
        );
        assert_eq!(
            store.atomically(&alice(), |unit| {
                unit.delete_pending(created.id, TransactionKind::Purchase)
            }),
            Err(not_found)
        );

        let all = store.atomically(&alice(), |unit| unit.list_all()).unwrap();
        let pending = store
            .atomically(&alice(), |unit| unit.list_pending())
            .unwrap();
        assert_eq!(all.len(), 1);
        assert!(pending.is_empty());
    }

    #[test]
    fn write_failure_mid_unit_rolls_back() {
        let store = MemoryStore::new();
        store.faults().fail_after_writes(1);
        let result = store.atomically(&alice(), |unit| {
            unit.create_transaction(purchase(dec!(10)))?;
            unit.get_or_create_balance()
        });
        assert!(result.unwrap_err().is_store_failure());

        store.faults().reset();
        let all = store.atomically(&alice(), |unit| unit.list_all()).unwrap();
        assert!(all.is_empty());
    }

    #[test]
    fn users_lists_non_empty_partitions_sorted() {
        let store = MemoryStore::new();
        for name in ["carol", "alice"] {
            store
                .atomically(&UserId::from(name), |unit| unit.get_or_create_balance())
                .unwrap();
        }
        // Reads alone leave no trace.
        store
            .atomically(&UserId::from("bob"), |unit| unit.find_balance())
            .unwrap();

        assert_eq!(
            store.users().unwrap(),
            vec![UserId::from("alice"), UserId::from("carol")]
        );
    }
}
