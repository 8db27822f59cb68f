use coord::{test_utils::manual_coordinator, Error};
use proptest::prelude::*;
use std::time::Duration;

const UNITS: [&str; 3] = ["db/0", "db/1", "db/2"];

#[derive(Debug, Clone)]
enum Op {
    Claim { unit: usize, secs: u64 },
    Release { unit: usize },
    Advance { secs: u64 },
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..UNITS.len(), 1..=90u64).prop_map(|(unit, secs)| Op::Claim { unit, secs }),
        (0..UNITS.len()).prop_map(|unit| Op::Release { unit }),
        (0..=40u64).prop_map(|secs| Op::Advance { secs }),
    ]
}

/// What the lease record should look like: holder and expiry in seconds.
#[derive(Debug, Default)]
struct Model {
    now: u64,
    lease: Option<(usize, u64)>,
}

impl Model {
    fn holder(&self) -> Option<usize> {
        self.lease.filter(|(_, expiry)| self.now < *expiry).map(|(unit, _)| unit)
    }
}

proptest! {
    #[test]
    fn prop_lease_matches_model(ops in prop::collection::vec(op(), 1..60)) {
        tokio_test::block_on(async {
            let (coordinator, clock) = manual_coordinator(Duration::from_secs(60));
            let mut model = Model::default();

            for op in ops {
                match op {
                    Op::Claim { unit, secs } => {
                        let outcome = coordinator
                            .claim_leadership("db", UNITS[unit], Duration::from_secs(secs))
                            .await;
                        let granted = secs.min(60);
                        match model.holder() {
                            Some(holder) if holder != unit => {
                                assert!(matches!(outcome, Err(Error::LeaseHeld { .. })));
                            }
                            current => {
                                let previous = match (current, model.lease) {
                                    (Some(_), Some((_, expiry))) => expiry,
                                    _ => 0,
                                };
                                let expiry = (model.now + granted).max(previous);
                                model.lease = Some((unit, expiry));
                                assert_eq!(outcome, Ok(Duration::from_secs(expiry - model.now)));
                            }
                        }
                    }
                    Op::Release { unit } => {
                        let outcome = coordinator.release_leadership("db", UNITS[unit]).await;
                        match model.lease {
                            Some((holder, expiry)) if holder == unit => {
                                assert_eq!(outcome, Ok(()));
                                if model.now < expiry {
                                    model.lease = Some((unit, model.now));
                                }
                            }
                            _ => assert!(matches!(outcome, Err(Error::NotLeader { .. }))),
                        }
                    }
                    Op::Advance { secs } => {
                        clock.advance(Duration::from_secs(secs));
                        model.now += secs;
                    }
                }

                let actual = coordinator
                    .leadership_holder("db")
                    .await
                    .unwrap()
                    .map(|lease| lease.holder);
                assert_eq!(actual.as_deref(), model.holder().map(|unit| UNITS[unit]));
            }
        });
    }

    #[test]
    fn prop_renewal_never_shortens(first in 1..=60u64, second in 1..=60u64, elapsed in 0..60u64) {
        tokio_test::block_on(async {
            let (coordinator, clock) = manual_coordinator(Duration::from_secs(60));
            coordinator
                .claim_leadership("db", "db/0", Duration::from_secs(first))
                .await
                .unwrap();
            clock.advance(Duration::from_secs(elapsed));

            let renewed = coordinator
                .claim_leadership("db", "db/0", Duration::from_secs(second))
                .await;
            if elapsed < first {
                let remaining = Duration::from_secs(first - elapsed);
                let renewed = renewed.unwrap();
                assert!(renewed >= remaining);
                assert!(renewed >= Duration::from_secs(second));
            } else {
                assert_eq!(renewed, Ok(Duration::from_secs(second)));
            }
        });
    }
}
