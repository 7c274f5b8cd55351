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

//! Benchmarks for the ledger engine.
//!
//! Run with: cargo bench
//!
//! Benchmarks include:
//! - Single-threaded purchase and payment cycles
//! - Multi-threaded operations across many users
//! - Contention on a single user's balance
//! - Scaling with number of threads

use card_ledger_rs::{Engine, UserId};
use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use rayon::prelude::*;
use rust_decimal::Decimal;
use std::sync::Arc;

// =============================================================================
// Helper Functions
// =============================================================================

fn amount(units: i64) -> Decimal {
    Decimal::new(units, 4)
}

fn user(i: usize) -> UserId {
    UserId::from(format!("user-{i}"))
}

fn funded_engine(users: usize) -> Engine {
    let engine = Engine::new();
    for i in 0..users {
        engine.grant_credit(&user(i), amount(1_000_000_000)).unwrap();
    }
    engine
}

/// Authorize, settle higher, pay in full, post: every operation that moves money.
fn full_cycle(engine: &Engine, user: &UserId) {
    let purchase = engine.authorize_purchase(user, amount(100_000), None).unwrap();
    let id = purchase.created.unwrap().id;
    engine.settle_purchase(user, id, amount(120_000)).unwrap();

    let payment = engine.initiate_payment(user, amount(120_000), None).unwrap();
    let id = payment.created.unwrap().id;
    engine.post_payment(user, id).unwrap();
}

// =============================================================================
// Single-Threaded Benchmarks
// =============================================================================

fn bench_authorize_and_clear(c: &mut Criterion) {
    let engine = funded_engine(1);
    let alice = user(0);

    c.bench_function("authorize_and_clear", |b| {
        b.iter(|| {
            let response = engine
                .authorize_purchase(&alice, black_box(amount(10_000)), None)
                .unwrap();
            let id = response.pending_transactions[0].id;
            engine.clear_purchase(&alice, id).unwrap();
        })
    });
}

fn bench_full_cycle(c: &mut Criterion) {
    let engine = funded_engine(1);
    let alice = user(0);

    c.bench_function("full_cycle", |b| b.iter(|| full_cycle(&engine, &alice)));
}

fn bench_rejected_authorization(c: &mut Criterion) {
    let engine = funded_engine(1);
    let alice = user(0);

    c.bench_function("rejected_authorization", |b| {
        b.iter(|| {
            let result = engine.authorize_purchase(&alice, black_box(amount(i64::MAX)), None);
            assert!(result.is_err());
        })
    });
}

fn bench_pending_list_growth(c: &mut Criterion) {
    let mut group = c.benchmark_group("pending_list_growth");

    // Every response lists the user's pending transactions.
    for pending in [0usize, 100, 1_000].iter() {
        group.bench_with_input(
            BenchmarkId::from_parameter(pending),
            pending,
            |b, &pending| {
                let engine = funded_engine(1);
                let alice = user(0);
                for _ in 0..pending {
                    engine.authorize_purchase(&alice, amount(1), None).unwrap();
                }

                b.iter(|| {
                    let response = engine.authorize_purchase(&alice, amount(1), None).unwrap();
                    let id = response.created.unwrap().id;
                    engine.clear_purchase(&alice, id).unwrap();
                })
            },
        );
    }
    group.finish();
}

// =============================================================================
// Multi-Threaded Benchmarks
// =============================================================================

fn bench_parallel_users(c: &mut Criterion) {
    let mut group = c.benchmark_group("parallel_users");

    for num_users in [10usize, 100, 1_000].iter() {
        let cycles_per_user = 10;
        group.throughput(Throughput::Elements((num_users * cycles_per_user * 4) as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(num_users),
            num_users,
            |b, &num_users| {
                let engine = Arc::new(funded_engine(num_users));
                b.iter(|| {
                    (0..num_users).into_par_iter().for_each(|i| {
                        let user = user(i);
                        for _ in 0..cycles_per_user {
                            full_cycle(&engine, &user);
                        }
                    });
                })
            },
        );
    }
    group.finish();
}

fn bench_contention(c: &mut Criterion) {
    let mut group = c.benchmark_group("contention");
    let total_ops = 10_000usize;

    // Fewer users means more threads competing for the same partition lock.
    for num_users in [1usize, 10, 100, 1_000].iter() {
        group.throughput(Throughput::Elements(total_ops as u64 * 2));
        group.bench_with_input(
            BenchmarkId::new("users", num_users),
            num_users,
            |b, &num_users| {
                let engine = Arc::new(funded_engine(num_users));
                let users: Vec<UserId> = (0..num_users).map(user).collect();

                b.iter(|| {
                    (0..total_ops).into_par_iter().for_each(|i| {
                        let user = &users[i % num_users];
                        let response = engine.authorize_purchase(user, amount(1), None).unwrap();
                        let id = response.created.unwrap().id;
                        engine.clear_purchase(user, id).unwrap();
                    });
                })
            },
        );
    }
    group.finish();
}

// =============================================================================
// Scaling Benchmarks
// =============================================================================

fn bench_thread_scaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("thread_scaling");
    let total_cycles = 10_000usize;

    for num_threads in [1usize, 2, 4, 8].iter() {
        group.throughput(Throughput::Elements(total_cycles as u64 * 4));
        group.bench_with_input(
            BenchmarkId::from_parameter(num_threads),
            num_threads,
            |b, &num_threads| {
                // Configure rayon thread pool for this benchmark
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(num_threads)
                    .build()
                    .unwrap();
                let engine = Arc::new(funded_engine(1_000));
                let users: Vec<UserId> = (0..1_000).map(user).collect();

                b.iter(|| {
                    pool.install(|| {
                        (0..total_cycles).into_par_iter().for_each(|i| {
                            full_cycle(&engine, &users[i % users.len()]);
                        });
                    });
                })
            },
        );
    }
    group.finish();
}

criterion_group!(
    single_threaded,
    bench_authorize_and_clear,
    bench_full_cycle,
    bench_rejected_authorization,
    bench_pending_list_growth,
);

criterion_group!(multi_threaded, bench_parallel_users, bench_contention,);

criterion_group!(scaling, bench_thread_scaling,);

criterion_main!(single_threaded, multi_threaded, scaling);
