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

use anyhow::Context;
use card_ledger_rs::{Engine, LedgerConfig, LedgerError, Store, TransactionId, UserId};
use clap::Parser;
use csv::{ReaderBuilder, Trim, Writer};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

/// Card Ledger - Replay card operations from a CSV file
///
/// Reads operations from a CSV file and outputs each user's balances to stdout.
/// Supports credit, authorize, initiate, clear, cancel, settle and post.
#[derive(Parser, Debug)]
#[command(name = "card-ledger-rs")]
#[command(about = "A credit-card ledger that replays operation CSVs", long_about = None)]
struct Args {
    /// Path to CSV file with operations
    ///
    /// Expected format: op,user,ref,amount,name
    /// Example: cargo run -- operations.csv > balances.csv
    #[arg(value_name = "FILE")]
    input: PathBuf,

    /// TOML configuration file
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Lowest available balance an authorization may leave (overrides the config file)
    #[arg(long, allow_negative_numbers = true)]
    floor: Option<Decimal>,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, default_value = "warn")]
    log_level: String,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut config = match &args.config {
        Some(path) => LedgerConfig::load(path)
            .with_context(|| format!("failed to load config '{}'", path.display()))?,
        None => LedgerConfig::default(),
    };
    if let Some(floor) = args.floor {
        config.available_floor = floor;
        config.validate()?;
    }

    let file = File::open(&args.input)
        .with_context(|| format!("failed to open '{}'", args.input.display()))?;

    let engine = replay(BufReader::new(file), config).context("failed to read operations")?;

    write_balances(&engine, std::io::stdout()).context("failed to write balances")?;
    Ok(())
}

/// Raw CSV record matching the input format.
///
/// Fields: `op, user, ref, amount, name`
#[derive(Debug, Deserialize)]
struct CsvRecord {
    op: String,
    user: String,
    /// Caller-chosen label for the transaction an operation creates or targets.
    #[serde(rename = "ref", default)]
    reference: String,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    amount: Option<Decimal>,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
enum Operation {
    Credit { amount: Decimal },
    Authorize { amount: Decimal, name: Option<String> },
    Initiate { amount: Decimal, name: Option<String> },
    Clear,
    Cancel,
    Settle { amount: Decimal },
    Post,
}

#[derive(Debug)]
struct Command {
    user: UserId,
    reference: String,
    operation: Operation,
}

impl CsvRecord {
    /// Converts CSV record to a command.
    ///
    /// Returns `None` for unknown operations or missing required fields.
    fn into_command(self) -> Option<Command> {
        let operation = match self.op.to_lowercase().as_str() {
            "credit" => Operation::Credit {
                amount: self.amount?,
            },
            "authorize" => Operation::Authorize {
                amount: self.amount?,
                name: self.name,
            },
            "initiate" => Operation::Initiate {
                amount: self.amount?,
                name: self.name,
            },
            "clear" => Operation::Clear,
            "cancel" => Operation::Cancel,
            "settle" => Operation::Settle {
                amount: self.amount?,
            },
            "post" => Operation::Post,
            _ => return None,
        };
        if self.user.is_empty() {
            return None;
        }
        Some(Command {
            user: UserId::from(self.user),
            reference: self.reference,
            operation,
        })
    }
}

#[derive(Debug, Error)]
enum ReplayError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("unknown transaction reference '{0}'")]
    UnknownReference(String),
}

/// Transaction ids bound to each user's references.
type References = HashMap<(UserId, String), TransactionId>;

fn resolve(references: &References, command: &Command) -> Result<TransactionId, ReplayError> {
    references
        .get(&(command.user.clone(), command.reference.clone()))
        .copied()
        .ok_or_else(|| ReplayError::UnknownReference(command.reference.clone()))
}

fn apply(
    engine: &Engine,
    references: &mut References,
    command: Command,
) -> Result<(), ReplayError> {
    let user = &command.user;
    let created = match &command.operation {
        Operation::Credit { amount } => {
            engine.grant_credit(user, *amount)?;
            None
        }
        Operation::Authorize { amount, name } => engine
            .authorize_purchase(user, *amount, name.as_deref())?
            .created
            .map(|transaction| transaction.id),
        Operation::Initiate { amount, name } => engine
            .initiate_payment(user, *amount, name.as_deref())?
            .created
            .map(|transaction| transaction.id),
        Operation::Clear => {
            engine.clear_purchase(user, resolve(references, &command)?)?;
            None
        }
        Operation::Cancel => {
            engine.cancel_payment(user, resolve(references, &command)?)?;
            None
        }
        Operation::Settle { amount } => {
            engine.settle_purchase(user, resolve(references, &command)?, *amount)?;
            None
        }
        Operation::Post => {
            engine.post_payment(user, resolve(references, &command)?)?;
            None
        }
    };

    if let Some(id) = created
        && !command.reference.is_empty()
    {
        references.insert((command.user, command.reference), id);
    }
    Ok(())
}

/// Replay operations from a CSV reader.
///
/// Rows are streamed, so arbitrarily large files are never loaded whole.
/// Malformed rows and rejected operations are logged and skipped.
///
/// # CSV Format
///
/// Expected columns: `op, user, ref, amount, name`
/// - `op`: credit, authorize, initiate, clear, cancel, settle or post
/// - `user`: Opaque user id
/// - `ref`: Label bound by authorize/initiate and resolved by the other operations
/// - `amount`: Decimal amount (credit, authorize, initiate, settle)
/// - `name`: Optional transaction name (authorize, initiate)
///
/// # Example
///
/// ```csv
/// op,user,ref,amount,name
/// credit,alice,,1000,
/// authorize,alice,coffee,4.50,Coffee
/// settle,alice,coffee,5.00,
/// ```
///
/// # Errors
///
/// Returns a CSV error if the reader fails or the CSV structure is invalid.
pub fn replay<R: Read>(reader: R, config: LedgerConfig) -> Result<Engine, csv::Error> {
    let engine = Engine::with_config(config);
    let mut references = References::new();

    let mut rdr = ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true) // Allow trailing columns to be omitted
        .has_headers(true)
        .from_reader(reader);

    for (row, result) in rdr.deserialize::<CsvRecord>().enumerate() {
        let record = match result {
            Ok(record) => record,
            Err(error) => {
                warn!(row, %error, "skipping malformed row");
                continue;
            }
        };
        let Some(command) = record.into_command() else {
            warn!(row, "skipping invalid operation record");
            continue;
        };

        let operation = command.operation.clone();
        if let Err(error) = apply(&engine, &mut references, command) {
            debug!(row, operation = ?operation, %error, "skipping rejected operation");
        }
    }

    Ok(engine)
}

/// One output row.
#[derive(Debug, Serialize)]
struct BalanceRow {
    user: UserId,
    available: Decimal,
    payable: Decimal,
    pending: usize,
}

const DECIMAL_PRECISION: u32 = 4;

/// Write user balances to a CSV writer
///
/// # CSV Format
///
/// Columns: `user, available, payable, pending`
///
/// ```csv
/// user,available,payable,pending
/// alice,995.0000,5.0000,0
/// ```
///
/// # Errors
///
/// Returns an error if the store cannot be read or writing fails.
pub fn write_balances<W: Write>(engine: &Engine, writer: W) -> anyhow::Result<()> {
    let mut wtr = Writer::from_writer(writer);

    for user in engine.store().users()? {
        let balance = engine.balances(&user)?;
        let pending = engine.transactions(&user)?.pending.len();
        let mut available = balance.available.round_dp(DECIMAL_PRECISION);
        available.rescale(DECIMAL_PRECISION);
        let mut payable = balance.payable.round_dp(DECIMAL_PRECISION);
        payable.rescale(DECIMAL_PRECISION);
        wtr.serialize(BalanceRow {
            user,
            available,
            payable,
            pending,
        })?;
    }

    wtr.flush()?;
    Ok(())
}
