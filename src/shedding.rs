use crate::dispatch::dispatch_islanded;
use crate::error::Result;
use crate::freq::steady_state_frequency;
use crate::network::{Gen, Load};
use crate::results::ShedRecord;
use serde::{Deserialize, Serialize};

/// Demand below this is treated as fully shed (MW).
const DEMAND_FLOOR_MW: f64 = 1e-3;

/// Fraction of the step's base demand removed per ladder pass.
const LADDER_STEP: f64 = 0.10;

/// Victim-selection and step-granularity variants of the shedding loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShedPolicy {
    /// Sheds the selected load completely in one pass.
    Block,
    /// Sheds the selected load in 10 point increments of its base demand.
    PercentLadder,
    /// The ladder plus an effective-priority audit on every record.
    Adaptive,
}

/// Final state of the curtailment loop for one time step.
pub struct SheddingOutcome {
    /// Working load set after curtailment.
    pub load: Vec<Load>,

    /// Dispatch matching the final load set.
    pub gen: Vec<Gen>,

    /// One row per curtailment pass.
    pub records: Vec<ShedRecord>,

    /// Steady-state frequency at exit (Hz).
    pub freq_hz: f64,

    /// False when the candidates ran out before the frequency
    /// recovered. Reported, not raised.
    pub resolved: bool,
}

/// Curtails load in priority order until the steady-state frequency
/// recovers above the threshold or no sheddable candidate remains.
///
/// Candidates are online loads with remaining demand above a small
/// floor and a cumulative shed fraction below 100 %. The victim is the
/// lowest priority value; ties go to the smallest remaining demand.
/// Curtailment is expressed against the step's base (profile-scaled)
/// demand, so ladder passes remove equal-sized slices. After every
/// pass the island is redispatched and the frequency re-evaluated from
/// the resulting shortfall.
pub fn shed_until_recovered(
    step: usize,
    base_load: &[Load],
    gen: &[Gen],
    f_nominal: f64,
    threshold_hz: f64,
    policy: ShedPolicy,
) -> Result<SheddingOutcome> {
    let mut load = base_load.to_vec();
    let mut shed = vec![0.0_f64; load.len()];
    let mut records = Vec::new();

    loop {
        let demand: f64 = load.iter().filter(|l| l.status).map(|l| l.pd).sum();
        let dispatch = dispatch_islanded(gen, demand)?;
        let freq_hz = steady_state_frequency(&dispatch.gen, f_nominal, dispatch.shortfall_mw);

        if freq_hz >= threshold_hz {
            return Ok(SheddingOutcome {
                load,
                gen: dispatch.gen,
                records,
                freq_hz,
                resolved: true,
            });
        }

        let victim = match select_victim(&load, &shed) {
            Some(v) => v,
            None => {
                log::warn!(
                    "step {}: shed candidates exhausted at {:.3} Hz, deficit unresolved",
                    step,
                    freq_hz
                );
                return Ok(SheddingOutcome {
                    load,
                    gen: dispatch.gen,
                    records,
                    freq_hz,
                    resolved: false,
                });
            }
        };

        let rank_before = effective_priority(&load, &shed, victim);

        shed[victim] = match policy {
            ShedPolicy::Block => 1.0,
            ShedPolicy::PercentLadder | ShedPolicy::Adaptive => {
                (shed[victim] + LADDER_STEP).min(1.0)
            }
        };

        let keep = 1.0 - shed[victim];
        let pd_before = load[victim].pd;
        let qd_before = load[victim].qd;
        load[victim].pd = base_load[victim].pd * keep;
        load[victim].qd = base_load[victim].qd * keep;

        let rank_after = effective_priority(&load, &shed, victim);

        let (priority_before, priority_after) = match policy {
            ShedPolicy::Adaptive => (rank_before, rank_after),
            _ => (load[victim].priority, load[victim].priority),
        };

        records.push(ShedRecord {
            step,
            bus: load[victim].bus,
            priority_before,
            priority_after,
            shed_pct: shed[victim] * 100.0,
            shed_mw: pd_before - load[victim].pd,
            shed_mvar: qd_before - load[victim].qd,
        });

        log::debug!(
            "step {}: shed {:.1} % of load at bus {} ({:.3} MW off)",
            step,
            shed[victim] * 100.0,
            load[victim].bus,
            pd_before - load[victim].pd
        );
    }
}

fn is_candidate(l: &Load, shed: f64) -> bool {
    l.status && l.pd > DEMAND_FLOOR_MW && shed < 1.0
}

/// Lowest priority value wins; ties go to the smallest remaining demand.
fn select_victim(load: &[Load], shed: &[f64]) -> Option<usize> {
    load.iter()
        .enumerate()
        .filter(|&(i, l)| is_candidate(l, shed[i]))
        .min_by(|(_, a), (_, b)| {
            a.priority
                .cmp(&b.priority)
                .then(a.pd.total_cmp(&b.pd))
        })
        .map(|(i, _)| i)
}

/// 1-based rank of a load in the current shed ordering. A partially
/// shed load moves in the ordering as its remaining demand shrinks.
fn effective_priority(load: &[Load], shed: &[f64], target: usize) -> u32 {
    let mut order: Vec<usize> = load
        .iter()
        .enumerate()
        .filter(|&(i, l)| is_candidate(l, shed[i]))
        .map(|(i, _)| i)
        .collect();
    order.sort_by(|&a, &b| {
        load[a]
            .priority
            .cmp(&load[b].priority)
            .then(load[a].pd.total_cmp(&load[b].pd))
    });
    match order.iter().position(|&i| i == target) {
        Some(pos) => pos as u32 + 1,
        // fully shed loads fall off the end of the ordering
        None => order.len() as u32 + 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(bus: usize, pmax: f64, participation: f64, droop: f64) -> Gen {
        Gen {
            id: bus,
            bus,
            status: true,
            pg: 0.0,
            qg: 0.0,
            pmin: 0.0,
            pmax,
            participation,
            droop,
            inertia: 5.0,
        }
    }

    fn load(bus: usize, pd: f64, priority: u32) -> Load {
        Load {
            bus,
            status: true,
            pd,
            qd: pd * 0.3,
            priority,
        }
    }

    #[test]
    fn recovered_frequency_stops_the_loop() {
        // capability comfortably above demand, no deficit at entry
        let gens = vec![unit(1, 50.0, 1.0, 0.05)];
        let loads = vec![load(2, 20.0, 1)];
        let out = shed_until_recovered(0, &loads, &gens, 50.0, 49.7, ShedPolicy::PercentLadder)
            .unwrap();
        assert!(out.resolved);
        assert!(out.records.is_empty());
        assert_eq!(out.freq_hz, 50.0);
    }

    #[test]
    fn ladder_sheds_in_slices_of_the_base_demand() {
        // 10 MW capability against 14 MW demand; each pass removes
        // 1.2 MW (10 % of 12) until the shortfall clears
        let gens = vec![unit(1, 10.0, 1.0, 0.05)];
        let loads = vec![load(2, 12.0, 1), load(3, 2.0, 9)];
        let out = shed_until_recovered(0, &loads, &gens, 50.0, 49.7, ShedPolicy::PercentLadder)
            .unwrap();
        assert!(out.resolved);
        assert!(!out.records.is_empty());
        for r in &out.records {
            assert_eq!(r.bus, 2);
            assert!((r.shed_mw - 1.2).abs() < 1e-9);
        }
        // demand strictly decreases pass over pass
        let served: f64 = out.load.iter().map(|l| l.pd).sum();
        assert!(served < 14.0);
        assert!(served + out.records.iter().map(|r| r.shed_mw).sum::<f64>() - 14.0 < 1e-9);
    }

    #[test]
    fn lowest_priority_is_shed_first_with_demand_tiebreak() {
        let loads = vec![load(2, 5.0, 3), load(3, 4.0, 1), load(4, 6.0, 1)];
        let shed = vec![0.0; 3];
        assert_eq!(select_victim(&loads, &shed), Some(1));
    }

    #[test]
    fn fully_shed_loads_are_never_reselected() {
        // deep deficit: the priority-1 load is shed to zero in 10
        // passes before the loop moves on to the next load
        let gens = vec![unit(1, 1.0, 1.0, 0.05)];
        let loads = vec![load(2, 10.0, 1), load(3, 8.0, 2)];
        let out = shed_until_recovered(0, &loads, &gens, 50.0, 49.7, ShedPolicy::PercentLadder)
            .unwrap();
        assert!(out.resolved);

        let bus2_passes = out.records.iter().filter(|r| r.bus == 2).count();
        assert_eq!(bus2_passes, 10);
        assert_eq!(out.load[0].pd, 0.0);

        // once fully shed, bus 2 never reappears in the ledger
        let last_bus2 = out.records.iter().rposition(|r| r.bus == 2).unwrap();
        let first_bus3 = out.records.iter().position(|r| r.bus == 3).unwrap();
        assert!(last_bus2 < first_bus3);

        // every pass strictly reduces served demand
        assert!(out.records.iter().all(|r| r.shed_mw > 0.0));
    }

    #[test]
    fn exhausted_candidates_report_unresolved() {
        // the only remaining demand sits below the shedding floor, so
        // no candidate exists while the feeble unit still runs a
        // deficit steep enough to hold the frequency down
        let gens = vec![unit(1, 5e-4, 1.0, 0.05)];
        let loads = vec![load(2, 9e-4, 1)];
        let out = shed_until_recovered(0, &loads, &gens, 50.0, 49.7, ShedPolicy::PercentLadder)
            .unwrap();
        assert!(!out.resolved);
        assert!(out.records.is_empty());
        assert!(out.freq_hz < 49.7);
    }

    #[test]
    fn block_policy_sheds_whole_loads() {
        let gens = vec![unit(1, 10.0, 1.0, 0.05)];
        let loads = vec![load(2, 12.0, 1), load(3, 2.0, 9)];
        let out =
            shed_until_recovered(0, &loads, &gens, 50.0, 49.7, ShedPolicy::Block).unwrap();
        assert!(out.resolved);
        assert_eq!(out.records.len(), 1);
        assert_eq!(out.records[0].shed_pct, 100.0);
        assert_eq!(out.load[0].pd, 0.0);
    }

    #[test]
    fn adaptive_policy_audits_effective_priority() {
        let gens = vec![unit(1, 10.0, 1.0, 0.05)];
        let loads = vec![load(2, 12.0, 1), load(3, 11.0, 2)];
        let out =
            shed_until_recovered(0, &loads, &gens, 50.0, 49.7, ShedPolicy::Adaptive).unwrap();
        assert!(out.resolved);
        let first = &out.records[0];
        assert_eq!(first.priority_before, 1);
        // the victim keeps its place until its remaining demand drops
        // below another candidate's
        assert!(out.records.iter().any(|r| r.priority_after >= r.priority_before));
    }
}
