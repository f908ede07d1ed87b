//! Local action masking
//!
//! Masks are datacenter-local: each one is derived only from that
//! datacenter's latest observation. Index 0 is "no assignment", index `k`
//! assigns the next cloudlet to VM `k - 1`.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;
use std::fmt;

/// Which branch of the masking policy produced a mask
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum MaskDecision {
    /// No observation available (or unknown datacenter): everything legal
    FailOpen,
    /// Nothing to schedule: only "no assignment" is legal
    Empty,
    /// Cloudlet waiting: only VMs with enough free PEs are legal
    Forced,
    /// Cloudlet waiting but no VM fits: every VM is legal, "no assignment" is not
    FallbackAll,
}

impl MaskDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            MaskDecision::FailOpen => "fail_open",
            MaskDecision::Empty => "empty",
            MaskDecision::Forced => "forced",
            MaskDecision::FallbackAll => "fallback_all",
        }
    }
}

impl fmt::Display for MaskDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Legal local actions together with the policy branch that produced them
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionMask {
    pub decision: MaskDecision,
    pub legal: Vec<bool>,
}

impl ActionMask {
    /// All `action_count` actions legal
    pub fn fail_open(action_count: usize) -> Self {
        Self {
            decision: MaskDecision::FailOpen,
            legal: vec![true; action_count],
        }
    }

    pub fn len(&self) -> usize {
        self.legal.len()
    }

    pub fn is_empty(&self) -> bool {
        self.legal.is_empty()
    }

    pub fn is_legal(&self, action: usize) -> bool {
        self.legal.get(action).copied().unwrap_or(false)
    }

    pub fn legal_actions(&self) -> Vec<usize> {
        self.legal
            .iter()
            .enumerate()
            .filter_map(|(i, &ok)| ok.then_some(i))
            .collect()
    }

    /// Uniform choice among legal actions; `None` when nothing is legal
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<usize> {
        self.legal_actions().choose(rng).copied()
    }

    /// 1.0 for legal, 0.0 for illegal
    pub fn as_floats(&self) -> Vec<f32> {
        self.legal.iter().map(|&ok| if ok { 1.0 } else { 0.0 }).collect()
    }

    /// Extend to the shared action count; padded slots are never legal
    pub fn padded(&self, action_count: usize) -> Self {
        Self {
            decision: self.decision,
            legal: super::padding::pad(&self.legal, action_count, false),
        }
    }

    /// Cut a shared-size mask back to one datacenter's action count
    pub fn trimmed(&self, action_count: usize) -> Self {
        Self {
            decision: self.decision,
            legal: super::padding::trim(&self.legal, action_count),
        }
    }
}

/// Compute the mask for one datacenter
///
/// `vm_available_pes` must hold exactly the datacenter's true VMs.
pub fn compute_mask(
    waiting_cloudlets: i32,
    next_cloudlet_pes: i32,
    vm_available_pes: &[i32],
) -> ActionMask {
    let action_count = vm_available_pes.len() + 1;

    if waiting_cloudlets <= 0 || next_cloudlet_pes <= 0 {
        let mut legal = vec![false; action_count];
        legal[0] = true;
        return ActionMask {
            decision: MaskDecision::Empty,
            legal,
        };
    }

    let mut legal = Vec::with_capacity(action_count);
    legal.push(false);
    legal.extend(vm_available_pes.iter().map(|&pes| pes >= next_cloudlet_pes));

    if legal[1..].iter().any(|&ok| ok) {
        ActionMask {
            decision: MaskDecision::Forced,
            legal,
        }
    } else {
        legal[1..].iter_mut().for_each(|ok| *ok = true);
        ActionMask {
            decision: MaskDecision::FallbackAll,
            legal,
        }
    }
}
