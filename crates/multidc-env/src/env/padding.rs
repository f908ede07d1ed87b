//! Reconciliation of per-datacenter vector sizes
//!
//! The shared schema pads every datacenter to the largest host/VM count; the
//! per-agent schema trims back to each datacenter's true size. For any `v` of
//! length `k <= target`, `trim(&pad(&v, target, fill), k) == v`.

use crate::models::{DatacenterDescriptor, LocalObservation};

/// Fill value for padded observation slots
pub const OBS_FILL: f32 = 0.0;

/// Extend `values` to `target_len` with `fill`; longer inputs are truncated
pub fn pad<T: Clone>(values: &[T], target_len: usize, fill: T) -> Vec<T> {
    let mut out: Vec<T> = values.iter().take(target_len).cloned().collect();
    out.resize(target_len, fill);
    out
}

/// First `true_len` elements (all of them if shorter)
pub fn trim<T: Clone>(values: &[T], true_len: usize) -> Vec<T> {
    values[..true_len.min(values.len())].to_vec()
}

/// Local observation in the shared schema
pub fn pad_local(obs: &LocalObservation, max_hosts: usize, max_vms: usize) -> LocalObservation {
    LocalObservation {
        host_loads: pad(&obs.host_loads, max_hosts, OBS_FILL),
        host_ram_usage: pad(&obs.host_ram_usage, max_hosts, OBS_FILL),
        vm_loads: pad(&obs.vm_loads, max_vms, OBS_FILL),
        vm_types: pad(&obs.vm_types, max_vms, 0),
        vm_available_pes: pad(&obs.vm_available_pes, max_vms, 0),
        waiting_cloudlets: obs.waiting_cloudlets,
        next_cloudlet_pes: obs.next_cloudlet_pes,
    }
}

/// Local observation cut back to one datacenter's true size
pub fn trim_local(obs: &LocalObservation, dc: &DatacenterDescriptor) -> LocalObservation {
    LocalObservation {
        host_loads: trim(&obs.host_loads, dc.host_count),
        host_ram_usage: trim(&obs.host_ram_usage, dc.host_count),
        vm_loads: trim(&obs.vm_loads, dc.vm_count),
        vm_types: trim(&obs.vm_types, dc.vm_count),
        vm_available_pes: trim(&obs.vm_available_pes, dc.vm_count),
        waiting_cloudlets: obs.waiting_cloudlets,
        next_cloudlet_pes: obs.next_cloudlet_pes,
    }
}

/// Drop routing decisions beyond the number of cloudlets actually waiting
pub fn truncate_global_actions(actions: &[i64], waiting: usize) -> Vec<i64> {
    trim(actions, waiting)
}

/// Wire-level target VM for a local action (`0` becomes `-1`, "do not assign")
pub fn remap_local_action(action: i64) -> i64 {
    action - 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pad_then_trim_roundtrip() {
        let original = vec![0.5_f32, 1.5, 2.5];
        for max in 3..8 {
            let padded = pad(&original, max, -1.0);
            assert_eq!(padded.len(), max);
            assert_eq!(trim(&padded, original.len()), original);
        }
    }

    #[test]
    fn test_pad_uses_fill_and_truncates_overflow() {
        assert_eq!(pad(&[1, 2], 4, 0), vec![1, 2, 0, 0]);
        assert_eq!(pad(&[1, 2, 3], 2, 0), vec![1, 2]);
    }

    #[test]
    fn test_trim_shorter_input() {
        assert_eq!(trim(&[1, 2], 5), vec![1, 2]);
    }

    #[test]
    fn test_truncation_noop_on_exact_count() {
        let actions = vec![0, 1, 1, 0];
        assert_eq!(truncate_global_actions(&actions, actions.len()), actions);
        assert_eq!(truncate_global_actions(&actions, 2), vec![0, 1]);
        assert!(truncate_global_actions(&actions, 0).is_empty());
    }

    #[test]
    fn test_remap_is_bijection_onto_vm_ids() {
        let vm_count = 5;
        let mapped: Vec<i64> = (0..=vm_count).map(remap_local_action).collect();
        assert_eq!(mapped, (-1..vm_count).collect::<Vec<_>>());
        assert_eq!(remap_local_action(0), -1);
        assert_eq!(remap_local_action(vm_count), vm_count - 1);
    }

    #[test]
    fn test_local_pad_trim_recovers_true_values() {
        let dc = DatacenterDescriptor { id: 0, host_count: 2, vm_count: 3 };
        let obs = LocalObservation {
            host_loads: vec![0.1, 0.2],
            host_ram_usage: vec![0.3, 0.4],
            vm_loads: vec![0.5, 0.6, 0.7],
            vm_types: vec![0, 1, 2],
            vm_available_pes: vec![1, 2, 4],
            waiting_cloudlets: 3,
            next_cloudlet_pes: 2,
        };
        let padded = pad_local(&obs, 4, 6);
        assert_eq!(padded.vm_available_pes, vec![1, 2, 4, 0, 0, 0]);
        assert_eq!(padded.host_loads.len(), 4);
        assert_eq!(trim_local(&padded, &dc), obs);
    }
}
