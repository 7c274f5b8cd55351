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

//! Storage seams for the ledger.
//!
//! The engine never touches records directly. It opens a unit of work for one
//! user through [`Store::atomically`] and talks to that unit through the
//! [`BalanceStore`] and [`TransactionStore`] traits. Writes made inside the
//! unit become visible only if the closure returns `Ok`.
//!
//! Units are scoped to a single user, so the trait methods take no user id.

mod fault;
mod memory;

pub use fault::FaultInjector;
pub use memory::MemoryStore;

use crate::balance::{Balance, BalanceDelta, Condition};
use crate::base::{TransactionId, UserId};
use crate::error::LedgerError;
use crate::transaction::{NewTransaction, Transaction, TransactionKind};
use rust_decimal::Decimal;

/// Balance record access within a unit of work.
pub trait BalanceStore {
    /// Returns the balance record, if one has been created.
    fn find_balance(&self) -> Result<Option<Balance>, LedgerError>;

    /// Returns the balance record, creating a zeroed one if absent.
    fn get_or_create_balance(&mut self) -> Result<Balance, LedgerError>;

    /// Applies `delta` if `condition` holds for the result and returns the new balance.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::NoBalanceRecord`] - No record exists yet.
    /// - Whatever `condition` raises; the balance is left untouched.
    fn apply_delta(
        &mut self,
        delta: BalanceDelta,
        condition: Condition,
    ) -> Result<Balance, LedgerError>;
}

/// Result of settling a pending transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settlement {
    /// The transaction as stored after settlement.
    pub transaction: Transaction,
    /// Amount the transaction carried while pending.
    pub held_amount: Decimal,
}

/// Transaction record access within a unit of work.
pub trait TransactionStore {
    /// Stores a new pending transaction and assigns its id.
    fn create_transaction(&mut self, draft: NewTransaction) -> Result<Transaction, LedgerError>;

    /// Pending transactions, oldest first.
    fn list_pending(&self) -> Result<Vec<Transaction>, LedgerError>;

    /// Every transaction, oldest first.
    fn list_all(&self) -> Result<Vec<Transaction>, LedgerError>;

    /// Deletes a pending transaction of the given kind and returns it.
    ///
    /// # Errors
    ///
    /// [`LedgerError::TransactionNotFound`] unless `id` names a pending
    /// transaction of `kind` owned by the unit's user.
    fn delete_pending(
        &mut self,
        id: TransactionId,
        kind: TransactionKind,
    ) -> Result<Transaction, LedgerError>;

    /// Marks a pending transaction settled, optionally replacing its amount.
    ///
    /// # Errors
    ///
    /// Same as [`TransactionStore::delete_pending`].
    fn settle(
        &mut self,
        id: TransactionId,
        kind: TransactionKind,
        final_amount: Option<Decimal>,
    ) -> Result<Settlement, LedgerError>;
}

/// A unit of work over one user's balance and transactions.
pub trait LedgerUnit: BalanceStore + TransactionStore {
    fn user_id(&self) -> &UserId;
}

/// Backing store with an atomic multi-write primitive.
pub trait Store: Send + Sync {
    /// Runs `work` against a unit for `user_id`.
    ///
    /// All writes the closure makes are committed together when it returns
    /// `Ok`, and none of them are when it returns `Err` or the commit itself
    /// fails. Units for the same user are serialized.
    fn atomically<T, F>(&self, user_id: &UserId, work: F) -> Result<T, LedgerError>
    where
        F: FnOnce(&mut dyn LedgerUnit) -> Result<T, LedgerError>;

    /// Users with a balance record or at least one transaction.
    fn users(&self) -> Result<Vec<UserId>, LedgerError>;
}
