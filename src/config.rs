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

//! Engine configuration.
//!
//! Loaded from TOML; every field is optional.
//!
//! ```toml
//! # Lowest available balance an authorization may leave behind.
//! available_floor = "-500.00"
//! default_transaction_name = "Card Purchase"
//! ```

use crate::transaction::DEFAULT_TRANSACTION_NAME;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LedgerConfig {
    /// Authorizations fail if they would take the available balance below this.
    pub available_floor: Decimal,
    /// Name given to transactions created without one.
    pub default_transaction_name: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            available_floor: Decimal::ZERO,
            default_transaction_name: DEFAULT_TRANSACTION_NAME.to_owned(),
        }
    }
}

impl LedgerConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Checks that the floor is not positive and the default name is not blank.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.available_floor > Decimal::ZERO {
            return Err(ConfigError::Invalid(format!(
                "available_floor must not be positive, got {}",
                self.available_floor
            )));
        }
        if self.default_transaction_name.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "default_transaction_name must not be empty".into(),
            ));
        }
        Ok(())
    }
}
