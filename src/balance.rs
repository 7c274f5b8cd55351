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

//! Balance records and the conditional deltas applied to them.
//!
//! # Example
//!
//! ```
//! use rust_decimal_macros::dec;
//! use card_ledger_rs::{Balance, BalanceDelta, Condition, UserId};
//!
//! let balance = Balance::new(UserId::from("alice"));
//! assert_eq!(balance.available, dec!(0));
//!
//! let credited = balance.apply(BalanceDelta::available(dec!(100)), Condition::Always).unwrap();
//! assert_eq!(credited.available, dec!(100));
//! ```

use crate::base::UserId;
use crate::error::LedgerError;
use rust_decimal::Decimal;
use serde::Serialize;

/// The two running balances of a user's card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Balance {
    pub user_id: UserId,
    /// Spendable credit remaining.
    pub available: Decimal,
    /// Amount owed and awaiting payment.
    pub payable: Decimal,
}

impl Balance {
    /// Creates a zeroed balance, the state of every lazily created record.
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            available: Decimal::ZERO,
            payable: Decimal::ZERO,
        }
    }

    /// Returns the balance after `delta`, or the error `condition` raises.
    ///
    /// The condition is checked against `self`, the state being modified.
    pub fn apply(&self, delta: BalanceDelta, condition: Condition) -> Result<Self, LedgerError> {
        let next = Self {
            user_id: self.user_id.clone(),
            available: checked_sum(self.available, delta.available)?,
            payable: checked_sum(self.payable, delta.payable)?,
        };
        condition.check(self, &next, delta)?;
        Ok(next)
    }
}

fn checked_sum(balance: Decimal, change: Decimal) -> Result<Decimal, LedgerError> {
    balance
        .checked_add(change)
        .ok_or(LedgerError::AmountOverflow(change.abs()))
}

/// Signed change to both balances.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BalanceDelta {
    pub available: Decimal,
    pub payable: Decimal,
}

impl BalanceDelta {
    pub fn new(available: Decimal, payable: Decimal) -> Self {
        Self { available, payable }
    }

    pub fn available(available: Decimal) -> Self {
        Self::new(available, Decimal::ZERO)
    }

    pub fn payable(payable: Decimal) -> Self {
        Self::new(Decimal::ZERO, payable)
    }
}

/// Predicate a balance update must satisfy to be applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Condition {
    Always,
    /// Resulting available balance must not drop below the floor.
    AvailableAtLeast(Decimal),
    /// Something must be owed, and the resulting payable balance must not go negative.
    PayableCovers,
}

impl Condition {
    fn check(
        self,
        current: &Balance,
        next: &Balance,
        delta: BalanceDelta,
    ) -> Result<(), LedgerError> {
        match self {
            Self::Always => Ok(()),
            Self::AvailableAtLeast(floor) => {
                if next.available < floor {
                    return Err(LedgerError::InsufficientBalance {
                        available: current.available,
                        requested: -delta.available,
                    });
                }
                Ok(())
            }
            Self::PayableCovers => {
                if current.payable.is_zero() {
                    return Err(LedgerError::ZeroPayableBalance);
                }
                if next.payable < Decimal::ZERO {
                    return Err(LedgerError::ExcessPayment {
                        payable: current.payable,
                        requested: -delta.payable,
                    });
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn balance(available: Decimal, payable: Decimal) -> Balance {
        Balance {
            user_id: UserId::from("alice"),
            available,
            payable,
        }
    }

    #[test]
    fn unconditional_delta_adds_both_sides() {
        let next = balance(dec!(100), dec!(20))
            .apply(BalanceDelta::new(dec!(-30), dec!(30)), Condition::Always)
            .unwrap();
        assert_eq!(next.available, dec!(70));
        assert_eq!(next.payable, dec!(50));
    }

    #[test]
    fn overflowing_credit_is_rejected() {
        let result = balance(Decimal::MAX, dec!(0))
            .apply(BalanceDelta::available(dec!(1)), Condition::Always);
        assert_eq!(result, Err(LedgerError::AmountOverflow(dec!(1))));
    }

    #[test]
    fn overflowing_payable_is_rejected() {
        let result = balance(dec!(0), dec!(1))
            .apply(BalanceDelta::new(dec!(0), Decimal::MAX), Condition::Always);
        assert_eq!(result, Err(LedgerError::AmountOverflow(Decimal::MAX)));
    }

    #[test]
    fn floor_allows_exact_spend() {
        let next = balance(dec!(100), dec!(0))
            .apply(
                BalanceDelta::available(dec!(-100)),
                Condition::AvailableAtLeast(Decimal::ZERO),
            )
            .unwrap();
        assert_eq!(next.available, dec!(0));
    }

    #[test]
    fn floor_rejects_overspend_with_context() {
        let result = balance(dec!(100), dec!(0)).apply(
            BalanceDelta::available(dec!(-100.01)),
            Condition::AvailableAtLeast(Decimal::ZERO),
        );
        assert_eq!(
            result,
            Err(LedgerError::InsufficientBalance {
                available: dec!(100),
                requested: dec!(100.01),
            })
        );
    }

    #[test]
    fn negative_floor_extends_spending() {
        let next = balance(dec!(0), dec!(0))
            .apply(
                BalanceDelta::available(dec!(-250)),
                Condition::AvailableAtLeast(dec!(-500)),
            )
            .unwrap();
        assert_eq!(next.available, dec!(-250));
    }

    #[test]
    fn zero_payable_takes_precedence_over_excess() {
        let result = balance(dec!(0), dec!(0))
            .apply(BalanceDelta::payable(dec!(-1)), Condition::PayableCovers);
        assert_eq!(result, Err(LedgerError::ZeroPayableBalance));
    }

    #[test]
    fn payment_larger_than_payable_is_excess() {
        let result = balance(dec!(0), dec!(40))
            .apply(BalanceDelta::payable(dec!(-50)), Condition::PayableCovers);
        assert_eq!(
            result,
            Err(LedgerError::ExcessPayment {
                payable: dec!(40),
                requested: dec!(50),
            })
        );
    }

    #[test]
    fn payment_of_full_payable_is_allowed() {
        let next = balance(dec!(0), dec!(50))
            .apply(BalanceDelta::payable(dec!(-50)), Condition::PayableCovers)
            .unwrap();
        assert_eq!(next.payable, dec!(0));
    }

    #[test]
    fn serializes_with_camel_case_names() {
        let json = serde_json::to_value(balance(dec!(12.50), dec!(3))).unwrap();
        assert_eq!(json["userId"], "alice");
        assert_eq!(json["available"].as_str().unwrap(), "12.50");
        assert_eq!(json["payable"].as_str().unwrap(), "3");
    }
}
