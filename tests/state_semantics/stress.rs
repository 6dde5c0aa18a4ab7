//! Stress Tests
//!
//! Randomized transfers between accounts from several threads. Every
//! snapshot, read-only or mutable, must observe a consistent total.

use crate::common::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

const ACCOUNTS: usize = 8;
const INITIAL: i64 = 1_000;

fn total(accounts: &[MutableState<i64>]) -> i64 {
    accounts.iter().map(|account| account.get().unwrap()).sum()
}

#[test]
fn transfers_conserve_total() {
    let accounts: Arc<Vec<_>> = Arc::new((0..ACCOUNTS).map(|_| MutableState::new(INITIAL)).collect());
    let writers = 4;
    let ready = Arc::new(Barrier::new(writers + 1));
    let done = Arc::new(AtomicBool::new(false));
    let config = RetryConfig::default().reruns(1_000).backoff(0, 1);

    let handles: Vec<_> = (0..writers)
        .map(|seed| {
            let accounts = Arc::clone(&accounts);
            let ready = Arc::clone(&ready);
            let config = config.clone();
            thread::spawn(move || {
                let mut rng = StdRng::seed_from_u64(seed as u64);
                ready.wait();
                for _ in 0..100 {
                    let from = rng.gen_range(0..ACCOUNTS);
                    let to = rng.gen_range(0..ACCOUNTS);
                    let amount = rng.gen_range(1..50);
                    with_mutable_snapshot_retry(&config, || {
                        accounts[from].update(|n| n - amount)?;
                        accounts[to].update(|n| n + amount)?;
                        assert_eq!(total(&accounts), INITIAL * ACCOUNTS as i64);
                        Ok(())
                    })
                    .unwrap();
                }
            })
        })
        .collect();

    let auditor = {
        let accounts = Arc::clone(&accounts);
        let done = Arc::clone(&done);
        thread::spawn(move || {
            let mut audits = 0;
            while !done.load(Ordering::Acquire) {
                let snapshot = take_snapshot(None).unwrap();
                let sum = snapshot.enter(|| total(&accounts)).unwrap();
                snapshot.dispose();
                assert_eq!(sum, INITIAL * ACCOUNTS as i64);
                audits += 1;
            }
            audits
        })
    };

    ready.wait();
    for handle in handles {
        handle.join().unwrap();
    }
    done.store(true, Ordering::Release);
    auditor.join().unwrap();

    assert_eq!(read_fresh_total(&accounts), INITIAL * ACCOUNTS as i64);
}

fn read_fresh_total(accounts: &[MutableState<i64>]) -> i64 {
    accounts.iter().map(read_fresh).sum()
}
