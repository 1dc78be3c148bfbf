//! Property-based tests for the merge algebra
//!
//! However the records are partitioned into batches, and in whatever order
//! the batch results are merged, the global aggregate is the same.

use csvagg::aggregate::{
    AggregationEngine, EngineSettings, GlobalAggregate, KeyAccumulator, LocalAggregate,
};
use proptest::prelude::*;
use rust_decimal::Decimal;
use std::num::NonZeroUsize;
use std::time::Duration;

fn arb_value() -> impl Strategy<Value = Decimal> {
    (-1_000_000i64..1_000_000, 0u32..4).prop_map(|(mantissa, scale)| Decimal::new(mantissa, scale))
}

/// Values reaching the 28-digit precision limit, mixed with ordinary ones
fn arb_wide_value() -> impl Strategy<Value = Decimal> {
    let limit = 10i128.pow(28);
    prop_oneof![
        arb_value(),
        (-limit + 1..limit, 0u32..3)
            .prop_map(|(mantissa, scale)| Decimal::from_i128_with_scale(mantissa, scale)),
        Just(Decimal::from_i128_with_scale(limit, 0)),
        Just(Decimal::from_i128_with_scale(-limit, 0)),
    ]
}

fn arb_rows() -> impl Strategy<Value = Vec<(String, Decimal)>> {
    prop::collection::vec(("[a-e]{1,2}", arb_value()), 0..200)
}

fn fold_sequentially(rows: &[(String, Decimal)]) -> Vec<(String, KeyAccumulator)> {
    let mut local = LocalAggregate::new(0);
    for (key, value) in rows {
        local.insert(key, *value).unwrap();
    }
    let mut global = GlobalAggregate::new();
    global.absorb(&local).unwrap();
    global.iter().map(|(k, v)| (k.clone(), *v)).collect()
}

/// Batch and merge `rows`, or `None` if any batch would be lost
fn try_fold_partitioned(
    rows: &[(String, Decimal)],
    batch_size: usize,
) -> Option<Vec<(String, KeyAccumulator)>> {
    let mut global = GlobalAggregate::new();
    for (id, chunk) in rows.chunks(batch_size).enumerate() {
        let mut local = LocalAggregate::new(id);
        for (key, value) in chunk {
            local.insert(key, *value).ok()?;
        }
        global.absorb(&local).ok()?;
    }
    Some(global.iter().map(|(k, v)| (k.clone(), *v)).collect())
}

proptest! {
    #[test]
    fn prop_partition_and_merge_order_do_not_matter(
        rows in arb_rows(),
        batch_size in 1usize..50,
        seed in any::<u64>(),
    ) {
        let mut locals: Vec<LocalAggregate> = rows
            .chunks(batch_size)
            .enumerate()
            .map(|(id, chunk)| {
                let mut local = LocalAggregate::new(id);
                for (key, value) in chunk {
                    local.insert(key, *value).unwrap();
                }
                local
            })
            .collect();

        // deterministic shuffle from the seed
        let mut state = seed;
        for i in (1..locals.len()).rev() {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            let j = (state >> 33) as usize % (i + 1);
            locals.swap(i, j);
        }

        let mut global = GlobalAggregate::new();
        for local in &locals {
            global.absorb(local).unwrap();
        }
        let merged: Vec<(String, KeyAccumulator)> =
            global.iter().map(|(k, v)| (k.clone(), *v)).collect();

        prop_assert_eq!(merged, fold_sequentially(&rows));
    }

    #[test]
    fn prop_combine_is_associative_and_commutative(
        a in arb_value(),
        b in arb_value(),
        c in arb_value(),
    ) {
        let (a, b, c) = (KeyAccumulator::new(a), KeyAccumulator::new(b), KeyAccumulator::new(c));

        let left = a.combine(b).and_then(|ab| ab.combine(c));
        let right = b.combine(c).and_then(|bc| a.combine(bc));
        prop_assert_eq!(left, right);
        prop_assert_eq!(a.combine(b), b.combine(a));
    }

    #[test]
    fn prop_combine_near_precision_limit_never_depends_on_grouping(
        a in arb_wide_value(),
        b in arb_wide_value(),
        c in arb_wide_value(),
    ) {
        let (a, b, c) = (KeyAccumulator::new(a), KeyAccumulator::new(b), KeyAccumulator::new(c));

        let left = a.combine(b).and_then(|ab| ab.combine(c));
        let right = b.combine(c).and_then(|bc| a.combine(bc));
        if let (Some(left), Some(right)) = (left, right) {
            prop_assert_eq!(left, right);
        }
        prop_assert_eq!(a.combine(b), b.combine(a));
    }

    #[test]
    fn prop_successful_partitions_agree_near_precision_limit(
        rows in prop::collection::vec(("[a-c]", arb_wide_value()), 0..40),
        first in 1usize..10,
        second in 1usize..10,
    ) {
        let by_first = try_fold_partitioned(&rows, first);
        let by_second = try_fold_partitioned(&rows, second);
        if let (Some(by_first), Some(by_second)) = (by_first, by_second) {
            prop_assert_eq!(by_first, by_second);
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_engine_matches_sequential_fold(
        rows in arb_rows(),
        batch_size in 1usize..40,
        workers in 1usize..6,
    ) {
        let mut input = String::from("userId,amount\n");
        for (key, value) in &rows {
            input.push_str(&format!("{key},{value}\n"));
        }

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .unwrap();
        let engine = AggregationEngine::new(EngineSettings {
            batch_size: NonZeroUsize::new(batch_size).unwrap(),
            workers: NonZeroUsize::new(workers).unwrap(),
            shutdown_timeout: Duration::from_secs(5),
            ..EngineSettings::default()
        });
        let run = runtime
            .block_on(engine.run_reader(input.as_bytes(), "generated"))
            .unwrap();

        let merged: Vec<(String, KeyAccumulator)> =
            run.aggregate.iter().map(|(k, v)| (k.clone(), *v)).collect();
        prop_assert_eq!(merged, fold_sequentially(&rows));
        prop_assert_eq!(run.summary.rows.aggregated, rows.len() as u64);
    }
}
