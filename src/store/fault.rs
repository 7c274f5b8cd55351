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

//! Fault injection for the in-memory store.
//!
//! Lets tests make individual writes or the final commit fail with
//! [`LedgerError::StoreFailure`], the way a lost connection would.

use crate::error::LedgerError;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Default)]
pub struct FaultInjector {
    /// Writes left before failures start. `None` means unlimited.
    write_budget: Mutex<Option<usize>>,
    fail_commits: AtomicBool,
}

impl FaultInjector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lets `writes` more writes succeed, then fails every write until reset.
    pub fn fail_after_writes(&self, writes: usize) {
        *self.write_budget.lock() = Some(writes);
    }

    /// Makes every commit fail after the unit of work itself succeeded.
    pub fn fail_commits(&self, fail: bool) {
        self.fail_commits.store(fail, Ordering::SeqCst);
    }

    /// Clears all injected faults.
    pub fn reset(&self) {
        *self.write_budget.lock() = None;
        self.fail_commits.store(false, Ordering::SeqCst);
    }

    pub(crate) fn check_write(&self) -> Result<(), LedgerError> {
        let mut budget = self.write_budget.lock();
        match budget.as_mut() {
            None => Ok(()),
            Some(0) => Err(LedgerError::StoreFailure("injected write failure".into())),
            Some(remaining) => {
                *remaining -= 1;
                Ok(())
            }
        }
    }

    pub(crate) fn check_commit(&self) -> Result<(), LedgerError> {
        if self.fail_commits.load(Ordering::SeqCst) {
            return Err(LedgerError::StoreFailure("injected commit failure".into()));
        }
        Ok(())
    }
}
