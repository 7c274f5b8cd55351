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

//! Transaction records.
//!
//! Transactions follow a two-state machine:
//! - created in [`Pending`] by an authorization or a payment initiation
//! - [`Pending`] → [`Settled`] (settle / post), or deleted outright (clear / cancel)
//!
//! A settled transaction is never modified again.
//!
//! [`Pending`]: TransactionStatus::Pending
//! [`Settled`]: TransactionStatus::Settled

use crate::base::{TransactionId, UserId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::ser::{Serialize, SerializeStruct, Serializer};
use serde::Deserialize;
use std::fmt;

/// Name given to transactions created without one.
pub const DEFAULT_TRANSACTION_NAME: &str = "Untitled Transaction";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionKind {
    Purchase,
    Payment,
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Purchase => f.write_str("purchase"),
            Self::Payment => f.write_str("payment"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Pending,
    Settled,
}

/// A purchase or payment on a user's card.
///
/// `amount` is always the positive magnitude. The signed view external
/// consumers expect (payments negative) is [`Transaction::ledger_amount`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub id: TransactionId,
    pub user_id: UserId,
    pub kind: TransactionKind,
    pub amount: Decimal,
    pub name: String,
    pub status: TransactionStatus,
    pub created_at: DateTime<Utc>,
    pub settled_at: Option<DateTime<Utc>>,
}

impl Transaction {
    const DECIMAL_PRECISION: u32 = 4;

    pub fn is_pending(&self) -> bool {
        self.status == TransactionStatus::Pending
    }

    /// Amount with the ledger sign convention: purchases positive, payments negative.
    pub fn ledger_amount(&self) -> Decimal {
        match self.kind {
            TransactionKind::Purchase => self.amount,
            TransactionKind::Payment => -self.amount,
        }
    }
}

impl Serialize for Transaction {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut state = serializer.serialize_struct("Transaction", 8)?;
        state.serialize_field("id", &self.id)?;
        state.serialize_field("userId", &self.user_id)?;
        state.serialize_field("type", &self.kind)?;
        state.serialize_field(
            "amount",
            &self.ledger_amount().round_dp(Self::DECIMAL_PRECISION),
        )?;
        state.serialize_field("name", &self.name)?;
        state.serialize_field("status", &self.status)?;
        state.serialize_field("createdAt", &self.created_at)?;
        state.serialize_field("settledAt", &self.settled_at)?;
        state.end()
    }
}

/// Transaction data supplied by the engine; the store assigns id and timestamps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTransaction {
    pub kind: TransactionKind,
    pub amount: Decimal,
    pub name: String,
}

impl NewTransaction {
    /// Builds a draft, substituting `fallback_name` for a missing or blank name.
    pub fn new(
        kind: TransactionKind,
        amount: Decimal,
        name: Option<&str>,
        fallback_name: &str,
    ) -> Self {
        let name = match name.map(str::trim) {
            Some(name) if !name.is_empty() => name.to_owned(),
            _ => fallback_name.to_owned(),
        };
        Self { kind, amount, name }
    }

    pub(crate) fn into_transaction(
        self,
        id: TransactionId,
        user_id: UserId,
        created_at: DateTime<Utc>,
    ) -> Transaction {
        Transaction {
            id,
            user_id,
            kind: self.kind,
            amount: self.amount,
            name: self.name,
            status: TransactionStatus::Pending,
            created_at,
            settled_at: None,
        }
    }
}
