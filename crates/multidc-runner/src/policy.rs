//! Random policy that only picks legal actions

use multidc_env::{ActionMask, HierarchicalAction, HierarchicalEnvironment};
use rand::rngs::StdRng;
use rand::SeedableRng;

pub struct RandomPolicy {
    rng: StdRng,
}

impl RandomPolicy {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// One uniformly sampled datacenter per batch slot
    pub fn routing<E: HierarchicalEnvironment + ?Sized>(&mut self, env: &E) -> Vec<i64> {
        env.global_action_space()
            .sample_multi(&mut self.rng)
            .unwrap_or_default()
    }

    /// Uniform over the legal slots of `mask`; 0 when nothing is legal
    pub fn assignment(&mut self, mask: &ActionMask) -> i64 {
        mask.sample(&mut self.rng).map_or(0, |a| a as i64)
    }

    pub fn act<E: HierarchicalEnvironment + ?Sized>(&mut self, env: &E) -> HierarchicalAction {
        let global = self.routing(env);
        let local = env
            .layout()
            .iter()
            .map(|dc| {
                let mask = env.local_action_mask(dc.id).trimmed(dc.action_count());
                (dc.id, self.assignment(&mask))
            })
            .collect();
        HierarchicalAction { global, local }
    }
}
