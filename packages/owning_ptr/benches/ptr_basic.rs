//! Basic benchmarks for the `owning_ptr` package, measured against the standard library
//! equivalents `Box` and `Rc`.

#![allow(
    missing_docs,
    reason = "No need for API documentation in benchmark code"
)]

use std::hint::black_box;
use std::rc::{self, Rc};

use criterion::{Criterion, criterion_group, criterion_main};
use owning_ptr::{Exclusive, Shared, Weak, make_exclusive_slice};

criterion_group!(benches, entrypoint);
criterion_main!(benches);

type TestItem = usize;
const TEST_VALUE: TestItem = 1024;

const SEQUENCE_LEN: usize = 64;

fn entrypoint(c: &mut Criterion) {
    let mut group = c.benchmark_group("op_exclusive");

    group.bench_function("box_new_drop", |b| {
        b.iter(|| {
            drop(black_box(Box::new(TEST_VALUE)));
        });
    });

    group.bench_function("exclusive_new_drop", |b| {
        b.iter(|| {
            drop(black_box(Exclusive::new(TEST_VALUE)));
        });
    });

    group.bench_function("box_slice", |b| {
        b.iter(|| {
            drop(black_box(
                vec![TestItem::default(); SEQUENCE_LEN].into_boxed_slice(),
            ));
        });
    });

    group.bench_function("exclusive_slice", |b| {
        b.iter(|| {
            drop(black_box(make_exclusive_slice::<TestItem>(SEQUENCE_LEN)));
        });
    });

    group.finish();

    let mut group = c.benchmark_group("op_shared");

    group.bench_function("rc_new_drop", |b| {
        b.iter(|| {
            drop(black_box(Rc::new(TEST_VALUE)));
        });
    });

    group.bench_function("shared_new_drop", |b| {
        b.iter(|| {
            drop(black_box(Shared::new(TEST_VALUE)));
        });
    });

    let rc = Rc::new(TEST_VALUE);
    group.bench_function("rc_clone", |b| {
        b.iter(|| {
            drop(black_box(Rc::clone(&rc)));
        });
    });

    let shared = Shared::new(TEST_VALUE);
    group.bench_function("shared_clone", |b| {
        b.iter(|| {
            drop(black_box(shared.clone()));
        });
    });

    group.finish();

    let mut group = c.benchmark_group("op_weak");

    let rc_observer = Rc::downgrade(&rc);
    group.bench_function("rc_weak_upgrade", |b| {
        b.iter(|| {
            drop(black_box(rc::Weak::upgrade(&rc_observer)));
        });
    });

    let observer = Weak::from(&shared);
    group.bench_function("weak_lock", |b| {
        b.iter(|| {
            drop(black_box(observer.lock()));
        });
    });

    let expired = {
        let owner = Shared::new(TEST_VALUE);
        owner.downgrade()
    };
    group.bench_function("weak_lock_expired", |b| {
        b.iter(|| {
            drop(black_box(expired.lock()));
        });
    });

    group.finish();
}
