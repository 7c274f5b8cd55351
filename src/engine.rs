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

//! Ledger engine.
//!
//! The [`Engine`] applies the card's state transitions to a [`Store`]:
//!
//! - **Authorize purchase**: hold funds from the available balance as a pending purchase.
//! - **Clear purchase**: drop a pending purchase and release its hold.
//! - **Settle purchase**: finalize a purchase at the merchant's final amount; it becomes payable.
//! - **Initiate payment**: reserve part of the payable balance as a pending payment.
//! - **Cancel payment**: drop a pending payment and restore the payable balance.
//! - **Post payment**: finalize a payment; the paid amount becomes available again.
//!
//! # Atomicity
//!
//! Every operation runs as a single unit of work via [`Store::atomically`]:
//! the balance check, the transaction write and the balance update commit
//! together or not at all. The authorization check is a conditional update
//! inside that unit, so concurrent authorizations cannot both spend the same
//! funds.

use crate::balance::{Balance, BalanceDelta, Condition};
use crate::base::{TransactionId, UserId};
use crate::config::LedgerConfig;
use crate::error::LedgerError;
use crate::store::{LedgerUnit, MemoryStore, Store};
use crate::transaction::{NewTransaction, Transaction, TransactionKind, TransactionStatus};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, info, warn};

/// Result of a ledger operation: the user's pending transactions plus the
/// balances the operation touched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerResponse {
    pub pending_transactions: Vec<Transaction>,
    /// Transaction created by authorize and initiate. Not part of the wire format.
    #[serde(skip)]
    pub created: Option<Transaction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub available_balance: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payable_balance: Option<Decimal>,
}

impl LedgerResponse {
    fn new(pending_transactions: Vec<Transaction>) -> Self {
        Self {
            pending_transactions,
            created: None,
            available_balance: None,
            payable_balance: None,
        }
    }

    fn with_available(mut self, balance: &Balance) -> Self {
        self.available_balance = Some(balance.available);
        self
    }

    fn with_payable(mut self, balance: &Balance) -> Self {
        self.payable_balance = Some(balance.payable);
        self
    }

    fn with_created(mut self, transaction: Transaction) -> Self {
        self.created = Some(transaction);
        self
    }
}

/// A user's transactions split by status, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionHistory {
    pub pending: Vec<Transaction>,
    pub settled: Vec<Transaction>,
}

/// Balance effect of each transition, in magnitudes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Effect {
    Hold(Decimal),
    ReleaseHold(Decimal),
    /// The hold is replaced by the final charge, which also becomes owed.
    Settle { held: Decimal, charged: Decimal },
    ReservePayment(Decimal),
    ReleasePayment(Decimal),
    PostPayment(Decimal),
    Credit(Decimal),
}

impl Effect {
    fn delta(self) -> BalanceDelta {
        match self {
            Self::Hold(amount) => BalanceDelta::available(-amount),
            Self::ReleaseHold(amount) => BalanceDelta::available(amount),
            Self::Settle { held, charged } => BalanceDelta::new(held - charged, charged),
            Self::ReservePayment(amount) => BalanceDelta::payable(-amount),
            Self::ReleasePayment(amount) => BalanceDelta::payable(amount),
            Self::PostPayment(amount) => BalanceDelta::available(amount),
            Self::Credit(amount) => BalanceDelta::available(amount),
        }
    }
}

fn ensure_positive(amount: Decimal) -> Result<Decimal, LedgerError> {
    if amount <= Decimal::ZERO {
        return Err(LedgerError::InvalidAmount(amount));
    }
    Ok(amount)
}

/// Credit-card ledger engine.
///
/// # Invariants
///
/// - An authorization never leaves the available balance below the configured floor.
/// - A payment never exceeds the payable balance, and requires a balance record.
/// - Only pending transactions can be cleared, canceled, settled or posted.
/// - Every balance change and its transaction change are applied together.
pub struct Engine<S = MemoryStore> {
    store: S,
    config: LedgerConfig,
}

impl Engine<MemoryStore> {
    /// Creates an engine over an empty in-memory store with default configuration.
    pub fn new() -> Self {
        Self::with_config(LedgerConfig::default())
    }

    pub fn with_config(config: LedgerConfig) -> Self {
        Self::with_store(MemoryStore::new(), config)
    }
}

impl Default for Engine<MemoryStore> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Store> Engine<S> {
    pub fn with_store(store: S, config: LedgerConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Holds `amount` against the available balance as a pending purchase.
    ///
    /// Creates the balance record on first use.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidAmount`] - `amount` is not positive.
    /// - [`LedgerError::InsufficientBalance`] - The hold would cross the floor.
    /// - [`LedgerError::AmountOverflow`] - The balance cannot represent the result.
    pub fn authorize_purchase(
        &self,
        user_id: &UserId,
        amount: Decimal,
        name: Option<&str>,
    ) -> Result<LedgerResponse, LedgerError> {
        self.run("authorize_purchase", user_id, |unit| {
            let amount = ensure_positive(amount)?;
            unit.get_or_create_balance()?;
            let balance = unit.apply_delta(
                Effect::Hold(amount).delta(),
                Condition::AvailableAtLeast(self.config.available_floor),
            )?;
            let created =
                unit.create_transaction(self.draft(TransactionKind::Purchase, amount, name))?;
            Ok(LedgerResponse::new(unit.list_pending()?)
                .with_available(&balance)
                .with_created(created))
        })
    }

    /// Reserves `amount` of the payable balance as a pending payment.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidAmount`] - `amount` is not positive.
    /// - [`LedgerError::NoBalanceRecord`] - The user has never had a balance.
    /// - [`LedgerError::ZeroPayableBalance`] - Nothing is owed.
    /// - [`LedgerError::ExcessPayment`] - `amount` exceeds what is owed.
    pub fn initiate_payment(
        &self,
        user_id: &UserId,
        amount: Decimal,
        name: Option<&str>,
    ) -> Result<LedgerResponse, LedgerError> {
        self.run("initiate_payment", user_id, |unit| {
            let amount = ensure_positive(amount)?;
            let balance =
                unit.apply_delta(Effect::ReservePayment(amount).delta(), Condition::PayableCovers)?;
            let created =
                unit.create_transaction(self.draft(TransactionKind::Payment, amount, name))?;
            Ok(LedgerResponse::new(unit.list_pending()?)
                .with_payable(&balance)
                .with_created(created))
        })
    }

    /// Deletes a pending purchase and releases its hold.
    ///
    /// # Errors
    ///
    /// [`LedgerError::TransactionNotFound`] - No pending purchase with this id.
    pub fn clear_purchase(
        &self,
        user_id: &UserId,
        transaction_id: TransactionId,
    ) -> Result<LedgerResponse, LedgerError> {
        self.run("clear_purchase", user_id, |unit| {
            let cleared = unit.delete_pending(transaction_id, TransactionKind::Purchase)?;
            let balance =
                unit.apply_delta(Effect::ReleaseHold(cleared.amount).delta(), Condition::Always)?;
            Ok(LedgerResponse::new(unit.list_pending()?).with_available(&balance))
        })
    }

    /// Deletes a pending payment and restores the payable balance it reserved.
    ///
    /// # Errors
    ///
    /// [`LedgerError::TransactionNotFound`] - No pending payment with this id.
    pub fn cancel_payment(
        &self,
        user_id: &UserId,
        transaction_id: TransactionId,
    ) -> Result<LedgerResponse, LedgerError> {
        self.run("cancel_payment", user_id, |unit| {
            let canceled = unit.delete_pending(transaction_id, TransactionKind::Payment)?;
            let balance = unit
                .apply_delta(Effect::ReleasePayment(canceled.amount).delta(), Condition::Always)?;
            Ok(LedgerResponse::new(unit.list_pending()?).with_payable(&balance))
        })
    }

    /// Settles a pending purchase at `final_amount`.
    ///
    /// The difference from the held amount is taken from (or returned to)
    /// the available balance, and the full final amount becomes payable.
    /// Settlement is not subject to the floor: the merchant's charge stands.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidAmount`] - `final_amount` is not positive.
    /// - [`LedgerError::TransactionNotFound`] - No pending purchase with this id.
    pub fn settle_purchase(
        &self,
        user_id: &UserId,
        transaction_id: TransactionId,
        final_amount: Decimal,
    ) -> Result<LedgerResponse, LedgerError> {
        self.run("settle_purchase", user_id, |unit| {
            let charged = ensure_positive(final_amount)?;
            let settlement =
                unit.settle(transaction_id, TransactionKind::Purchase, Some(charged))?;
            let effect = Effect::Settle {
                held: settlement.held_amount,
                charged,
            };
            let balance = unit.apply_delta(effect.delta(), Condition::Always)?;
            Ok(LedgerResponse::new(unit.list_pending()?)
                .with_available(&balance)
                .with_payable(&balance))
        })
    }

    /// Posts a pending payment; the paid amount becomes available credit.
    ///
    /// # Errors
    ///
    /// [`LedgerError::TransactionNotFound`] - No pending payment with this id.
    pub fn post_payment(
        &self,
        user_id: &UserId,
        transaction_id: TransactionId,
    ) -> Result<LedgerResponse, LedgerError> {
        self.run("post_payment", user_id, |unit| {
            let settlement = unit.settle(transaction_id, TransactionKind::Payment, None)?;
            let balance = unit.apply_delta(
                Effect::PostPayment(settlement.transaction.amount).delta(),
                Condition::Always,
            )?;
            Ok(LedgerResponse::new(unit.list_pending()?)
                .with_available(&balance)
                .with_payable(&balance))
        })
    }

    /// Raises the available balance, e.g. when a credit line is issued.
    ///
    /// # Errors
    ///
    /// [`LedgerError::InvalidAmount`] - `amount` is not positive.
    pub fn grant_credit(&self, user_id: &UserId, amount: Decimal) -> Result<Balance, LedgerError> {
        self.run("grant_credit", user_id, |unit| {
            let amount = ensure_positive(amount)?;
            unit.get_or_create_balance()?;
            unit.apply_delta(Effect::Credit(amount).delta(), Condition::Always)
        })
    }

    /// Returns the user's balances, creating a zeroed record on first access.
    pub fn balances(&self, user_id: &UserId) -> Result<Balance, LedgerError> {
        self.run("balances", user_id, |unit| unit.get_or_create_balance())
    }

    /// Returns the user's pending and settled transactions.
    pub fn transactions(&self, user_id: &UserId) -> Result<TransactionHistory, LedgerError> {
        self.run("transactions", user_id, |unit| {
            let (pending, settled): (Vec<_>, Vec<_>) = unit
                .list_all()?
                .into_iter()
                .partition(|transaction| transaction.status == TransactionStatus::Pending);
            Ok(TransactionHistory { pending, settled })
        })
    }

    fn draft(&self, kind: TransactionKind, amount: Decimal, name: Option<&str>) -> NewTransaction {
        NewTransaction::new(kind, amount, name, &self.config.default_transaction_name)
    }

    fn run<T, F>(&self, operation: &'static str, user_id: &UserId, work: F) -> Result<T, LedgerError>
    where
        F: FnOnce(&mut dyn LedgerUnit) -> Result<T, LedgerError>,
    {
        let result = self.store.atomically(user_id, work);
        match &result {
            Ok(_) => debug!(user = %user_id, operation, "committed"),
            Err(error) if error.is_store_failure() => {
                warn!(user = %user_id, operation, %error, "store failure, nothing committed")
            }
            Err(error) => info!(user = %user_id, operation, code = error.code(), %error, "rejected"),
        }
        result
    }
}
