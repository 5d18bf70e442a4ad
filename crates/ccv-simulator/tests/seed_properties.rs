//! Property tests over random seeds.

use ccv_core::TimeDelta;
use ccv_protocol::core::validation::bounded_drift;
use ccv_simulator::{PolicyKind, Simulator, SimulatorConfig};
use proptest::prelude::*;

fn config(policy: PolicyKind) -> SimulatorConfig {
    SimulatorConfig {
        max_steps: 120,
        policy,
        max_drift: TimeDelta::DAY,
        ..SimulatorConfig::default()
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// Property: no seed produces an invariant violation without a drift bound.
    #[test]
    fn unconstrained_runs_are_clean(seed in any::<u64>()) {
        let result = Simulator::new(config(PolicyKind::Unconstrained))
            .unwrap()
            .run_with_seed(seed)
            .unwrap();
        prop_assert!(result.is_clean(), "seed {}: {:?}", seed, result.violations);
    }

    /// Property: the drift policy keeps clocks within the bound for every seed.
    #[test]
    fn bounded_drift_runs_stay_within_bound(seed in any::<u64>()) {
        let result = Simulator::new(config(PolicyKind::BoundedDrift))
            .unwrap()
            .run_with_seed(seed)
            .unwrap();
        prop_assert!(result.is_clean(), "seed {}: {:?}", seed, result.violations);
        prop_assert!(bounded_drift(&result.final_state, TimeDelta::DAY).is_ok());
    }

    /// Property: a run is a pure function of its seed.
    #[test]
    fn runs_are_reproducible(seed in any::<u64>()) {
        let simulator = Simulator::new(config(PolicyKind::Unconstrained)).unwrap();
        let first = simulator.run_with_seed(seed).unwrap();
        let second = simulator.run_with_seed(seed).unwrap();
        prop_assert_eq!(first.trace, second.trace);
    }
}
