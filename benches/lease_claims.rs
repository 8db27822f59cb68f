use std::sync::Arc;
use std::time::Duration;

use criterion::{criterion_group, criterion_main, Criterion};
use tokio::runtime::Runtime;

use coord::{
    lease::ClaimRequest, storage::InMemoryStorage, time::SystemClock, LeaseConfig, LeaseCoordinator,
};

fn coordinator() -> LeaseCoordinator {
    LeaseCoordinator::new(
        LeaseConfig::default(),
        Arc::new(SystemClock::new()),
        Arc::new(InMemoryStorage::new()),
    )
}

fn lease_claims_benchmark(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    c.bench_function("renew held lease", |b| {
        let coordinator = coordinator();
        b.to_async(&rt).iter(|| async {
            coordinator
                .claim_leadership("wordpress", "wordpress/0", Duration::from_secs(60))
                .await
                .unwrap()
        })
    });

    c.bench_function("refused claim", |b| {
        let coordinator = coordinator();
        rt.block_on(coordinator.claim_leadership("wordpress", "wordpress/0", Duration::from_secs(60)))
            .unwrap();
        b.to_async(&rt).iter(|| async {
            coordinator
                .claim_leadership("wordpress", "wordpress/1", Duration::from_secs(60))
                .await
                .unwrap_err()
        })
    });

    c.bench_function("bulk claim 64 services", |b| {
        let coordinator = coordinator();
        let claims: Vec<_> = (0..64)
            .map(|i| ClaimRequest {
                service: format!("svc-{i}-a"),
                unit: format!("svc-{i}-a/0"),
                duration: Duration::from_secs(60),
            })
            .collect();
        b.to_async(&rt)
            .iter(|| async { coordinator.claim_leadership_bulk(&claims).await })
    });
}

criterion_group!(benches, lease_claims_benchmark);
criterion_main!(benches);
