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

//! Error types for ledger operations.

use crate::base::{TransactionId, UserId};
use crate::transaction::TransactionKind;
use rust_decimal::Decimal;
use thiserror::Error;

/// Ledger operation errors.
///
/// Every variant except [`LedgerError::StoreFailure`] is an expected business
/// outcome. A failed operation never leaves partial state behind, whichever
/// variant it returns.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Amount is zero or negative
    #[error("invalid amount {0} (must be positive)")]
    InvalidAmount(Decimal),

    /// Result would not fit in a decimal
    #[error("amount {0} would overflow the balance")]
    AmountOverflow(Decimal),

    /// Authorization would take the available balance below the floor
    #[error("insufficient available balance: {available} available, {requested} requested")]
    InsufficientBalance {
        available: Decimal,
        requested: Decimal,
    },

    /// Payment is larger than what is owed
    #[error("payment of {requested} exceeds payable balance of {payable}")]
    ExcessPayment { payable: Decimal, requested: Decimal },

    /// Nothing is owed, so there is nothing to pay
    #[error("no payable balance to pay")]
    ZeroPayableBalance,

    /// Payments cannot create a balance record
    #[error("no balance record for user {0}")]
    NoBalanceRecord(UserId),

    /// Target is missing, belongs to someone else, has the other kind, or is no longer pending
    #[error("pending {kind} transaction {id} not found")]
    TransactionNotFound {
        id: TransactionId,
        kind: TransactionKind,
    },

    /// The backing store could not complete the unit of work
    #[error("store failure: {0}")]
    StoreFailure(String),
}

impl LedgerError {
    /// Returns `true` for infrastructure failures, `false` for business outcomes.
    pub fn is_store_failure(&self) -> bool {
        matches!(self, Self::StoreFailure(_))
    }

    /// Stable machine-readable identifier for transports.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidAmount(_) => "INVALID_AMOUNT",
            Self::AmountOverflow(_) => "AMOUNT_OVERFLOW",
            Self::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            Self::ExcessPayment { .. } => "EXCESS_PAYMENT",
            Self::ZeroPayableBalance => "ZERO_PAYABLE_BALANCE",
            Self::NoBalanceRecord(_) => "NO_BALANCE_RECORD",
            Self::TransactionNotFound { .. } => "TRANSACTION_NOT_FOUND",
            Self::StoreFailure(_) => "STORE_FAILURE",
        }
    }
}
