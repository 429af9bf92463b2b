use std::num::NonZeroU32;
use std::sync::Arc;
use std::sync::Barrier;
use std::thread;
use std::time::Duration;
use std::time::Instant;

use criterion::BenchmarkId;
use criterion::Criterion;
use criterion::black_box;
use criterion::criterion_group;
use criterion::criterion_main;

use governor::Quota;

use refill_limit::CancellationToken;
use refill_limit::LimiterConfig;
use refill_limit::RateLimiter;

// Both sides of the comparison answer "may I proceed now?"
trait Admit: Send + Sync {
    fn admit(&self) -> bool;
}

impl Admit for RateLimiter {
    fn admit(&self) -> bool {
        self.try_acquire()
    }
}

impl Admit for governor::DefaultDirectRateLimiter {
    fn admit(&self) -> bool {
        self.check().is_ok()
    }
}

fn bench_single<A: Admit>(group_name: &str, c: &mut Criterion, limiter: Arc<A>) {
    let mut group = c.benchmark_group(group_name);

    group.bench_function("single-threaded", |b| {
        b.iter(|| black_box(limiter.as_ref()).admit())
    });

    group.finish();
}

fn bench_parallel<A: Admit + 'static>(group_name: &str, c: &mut Criterion, limiter: Arc<A>) {
    let mut group = c.benchmark_group(group_name);

    for threads in [2, 4, 8].iter() {
        let num_threads = *threads;
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{}-threads", num_threads)),
            &num_threads,
            |b, &n| {
                b.iter_custom(|iters| {
                    let barrier = Arc::new(Barrier::new(n + 1));
                    let mut handles = Vec::with_capacity(n);

                    for _ in 0..n {
                        let l = Arc::clone(&limiter);
                        let bar = Arc::clone(&barrier);
                        let iters_per_thread = iters / n as u64;

                        handles.push(thread::spawn(move || {
                            bar.wait();
                            for _ in 0..iters_per_thread {
                                black_box(l.admit());
                            }
                        }));
                    }

                    barrier.wait();
                    let start = Instant::now();

                    for handle in handles {
                        let _ = handle.join();
                    }

                    start.elapsed()
                });
            },
        );
    }
    group.finish();
}

fn run_all_benches(c: &mut Criterion) {
    let limit_val = 1_000_000;
    let period = Duration::from_secs(60);

    // The refill task needs a runtime to live on while the benches hammer the lock.
    let runtime = tokio::runtime::Runtime::new().expect("tokio runtime");
    let _enter = runtime.enter();
    let scope = CancellationToken::new();

    let config = LimiterConfig::new(period / limit_val as u32).with_max_permits(limit_val);
    let refill = Arc::new(RateLimiter::with_config(&scope, config).expect("valid config"));
    bench_single("RefillLimit", c, Arc::clone(&refill));
    bench_parallel("RefillLimit", c, refill);

    // Same again with spacing enabled, which adds a deadline check to every call.
    let spaced = config.with_min_spacing(Duration::from_nanos(1));
    let spaced = Arc::new(RateLimiter::with_config(&scope, spaced).expect("valid config"));
    bench_single("RefillLimit-Spaced", c, Arc::clone(&spaced));
    bench_parallel("RefillLimit-Spaced", c, spaced);

    let quota = Quota::per_minute(NonZeroU32::new(limit_val as u32).expect("non-zero"));
    let gov = Arc::new(governor::RateLimiter::direct(quota));
    bench_single("Governor", c, Arc::clone(&gov));
    bench_parallel("Governor", c, gov);

    scope.cancel();
}

criterion_group!(benches, run_all_benches);
criterion_main!(benches);
