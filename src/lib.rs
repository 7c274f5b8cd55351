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

//! # Card Ledger
//!
//! This library tracks a credit card's ledger: the available balance that can
//! still be spent, the payable balance that is owed, and the purchases and
//! payments moving between them.
//!
//! ## Core Components
//!
//! - [`Engine`]: Applies the six card transitions atomically per user
//! - [`Store`]: Backing store seam ([`BalanceStore`] + [`TransactionStore`] units)
//! - [`MemoryStore`]: Thread-safe in-memory store
//! - [`LedgerError`]: Business outcomes and store failures
//!
//! ## Example
//!
//! ```
//! use card_ledger_rs::{Engine, UserId};
//! use rust_decimal_macros::dec;
//!
//! let engine = Engine::new();
//! let user = UserId::from("alice");
//! engine.grant_credit(&user, dec!(1000)).unwrap();
//!
//! // Hold 100 for a purchase, then settle it at 120
//! let authorized = engine.authorize_purchase(&user, dec!(100), Some("Groceries")).unwrap();
//! let id = authorized.created.unwrap().id;
//! let settled = engine.settle_purchase(&user, id, dec!(120)).unwrap();
//!
//! assert_eq!(settled.available_balance, Some(dec!(880)));
//! assert_eq!(settled.payable_balance, Some(dec!(120)));
//! ```
//!
//! ## Thread Safety
//!
//! Operations for the same user are serialized by the store; operations for
//! different users proceed in parallel.

mod balance;
mod base;
pub mod config;
mod engine;
pub mod error;
pub mod store;
mod transaction;

pub use balance::{Balance, BalanceDelta, Condition};
pub use base::{TransactionId, UserId};
pub use config::LedgerConfig;
pub use engine::{Engine, LedgerResponse, TransactionHistory};
pub use error::LedgerError;
pub use store::{BalanceStore, LedgerUnit, MemoryStore, Settlement, Store, TransactionStore};
pub use transaction::{
    DEFAULT_TRANSACTION_NAME, NewTransaction, Transaction, TransactionKind, TransactionStatus,
};
