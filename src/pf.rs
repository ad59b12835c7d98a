use crate::bus_types::bus_types;
use crate::debug::format_rect_vec;
use crate::error::Result;
use crate::network::{Bus, BusType, Gen, Load};
use crate::newton::{calc_injections, newtonpf, SolverOpts};
use crate::sbus::make_sbus;
use nalgebra::{DMatrix, DVector};
use num_complex::Complex64;

/// Solved state of one power-flow run.
pub struct PfSolution {
    /// Bus table with final voltage magnitudes (p.u.) and angles (degrees).
    pub bus: Vec<Bus>,

    /// Generator table with slack/PV outputs backed out of the solution.
    pub gen: Vec<Gen>,

    /// Newton iterations taken.
    pub iterations: usize,

    /// Total generation minus total demand (MW).
    pub loss: f64,
}

/// Runs an AC power flow for one working state of the network.
///
/// The generator schedule and load set are per-step working copies
/// supplied by the caller; the admittance matrix is the scenario-wide
/// one from `make_ybus`. On success the returned tables carry the
/// final voltage state and the generation backed out at the slack and
/// PV buses.
pub fn runpf(
    base_mva: f64,
    bus: &[Bus],
    gen: &[Gen],
    load: &[Load],
    y_bus: &DMatrix<Complex64>,
    opts: &SolverOpts,
) -> Result<PfSolution> {
    let (_, pv, pq) = bus_types(bus)?;

    let nb = y_bus.nrows();
    let s_bus = make_sbus(base_mva, nb, gen, load);
    log::debug!("scheduled injections: {}", format_rect_vec(s_bus.as_slice()));

    // initial state from the bus table guesses
    let mut v0 = DVector::from_element(nb, Complex64::new(1.0, 0.0));
    for b in bus {
        v0[b.i - 1] = Complex64::from_polar(b.vm, b.va.to_radians());
    }

    let sol = newtonpf(y_bus, &s_bus, &v0, &pv, &pq, opts)?;

    Ok(pfsoln(base_mva, bus, gen, load, y_bus, &sol.v, sol.iterations))
}

/// Fills the solution back into working copies of the input tables.
fn pfsoln(
    base_mva: f64,
    bus0: &[Bus],
    gen0: &[Gen],
    load: &[Load],
    y_bus: &DMatrix<Complex64>,
    v: &DVector<Complex64>,
    iterations: usize,
) -> PfSolution {
    let mut bus = Vec::from(bus0);
    let mut gen = Vec::from(gen0);

    for b in bus.iter_mut() {
        b.vm = v[b.i - 1].norm();
        b.va = v[b.i - 1].arg().to_degrees();
    }

    // net injected power per bus (MW/MVAr)
    let s_inj = calc_injections(y_bus, v).map(|e| e * base_mva);

    let nb = y_bus.nrows();
    let mut pd_local = vec![0.0; nb];
    let mut qd_local = vec![0.0; nb];
    for l in load.iter().filter(|l| l.status) {
        pd_local[l.bus - 1] += l.pd;
        qd_local[l.bus - 1] += l.qd;
    }

    // number of online units sharing each bus's backed-out power
    let mut ngb = vec![0usize; nb];
    for g in gen.iter().filter(|g| g.status) {
        ngb[g.bus - 1] += 1;
    }

    for g in gen.iter_mut() {
        if !g.status {
            g.pg = 0.0;
            g.qg = 0.0;
            continue;
        }
        let b = g.bus - 1;
        let share = ngb[b] as f64;
        match bus[b].bus_type {
            BusType::Slack => {
                // injected power plus local demand is what the bus supplies
                g.pg = (s_inj[b].re + pd_local[b]) / share;
                g.qg = (s_inj[b].im + qd_local[b]) / share;
            }
            BusType::Pv => {
                g.qg = (s_inj[b].im + qd_local[b]) / share;
            }
            BusType::Pq => {}
        }
    }

    let total_gen: f64 = gen.iter().filter(|g| g.status).map(|g| g.pg).sum();
    let total_demand: f64 = load.iter().filter(|l| l.status).map(|l| l.pd).sum();
    let loss = total_gen - total_demand;

    PfSolution {
        bus,
        gen,
        iterations,
        loss,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ybus::make_ybus;
    use crate::network::Branch;

    fn bus(i: usize, bus_type: BusType) -> Bus {
        Bus {
            i,
            bus_type,
            vm: 1.0,
            va: 0.0,
            gs: 0.0,
            bs: 0.0,
        }
    }

    fn gen(bus: usize, pg: f64) -> Gen {
        Gen {
            id: bus,
            bus,
            status: true,
            pg,
            qg: 0.0,
            pmin: 0.0,
            pmax: 100.0,
            participation: 1.0,
            droop: 0.05,
            inertia: 5.0,
        }
    }

    fn load(bus: usize, pd: f64, qd: f64) -> Load {
        Load {
            bus,
            status: true,
            pd,
            qd,
            priority: 1,
        }
    }

    fn three_bus() -> (Vec<Bus>, Vec<Branch>) {
        let buses = vec![
            bus(1, BusType::Slack),
            bus(2, BusType::Pq),
            bus(3, BusType::Pq),
        ];
        let branches = vec![
            Branch {
                from_bus: 1,
                to_bus: 2,
                r: 0.01,
                x: 0.06,
                b: 0.0,
                tap: None,
            },
            Branch {
                from_bus: 2,
                to_bus: 3,
                r: 0.02,
                x: 0.08,
                b: 0.0,
                tap: None,
            },
        ];
        (buses, branches)
    }

    #[test]
    fn slack_covers_demand_plus_losses() {
        let (buses, branches) = three_bus();
        let y_bus = make_ybus(&buses, &branches);
        let gens = vec![gen(1, 0.0)];
        let loads = vec![load(2, 20.0, 5.0), load(3, 15.0, 3.0)];

        let sol = runpf(
            100.0,
            &buses,
            &gens,
            &loads,
            &y_bus,
            &SolverOpts::default(),
        )
        .unwrap();

        assert!(sol.gen[0].pg > 35.0, "slack Pg {} must exceed demand", sol.gen[0].pg);
        assert!(sol.loss > 0.0);

        // power balance against the reported loss
        let total_gen: f64 = sol.gen.iter().map(|g| g.pg).sum();
        assert!((total_gen - 35.0 - sol.loss).abs() < 1e-9);
    }

    #[test]
    fn pv_unit_keeps_scheduled_active_power() {
        let (mut buses, branches) = three_bus();
        buses[1].bus_type = BusType::Pv;
        let y_bus = make_ybus(&buses, &branches);
        let gens = vec![gen(1, 0.0), gen(2, 10.0)];
        let loads = vec![load(3, 25.0, 8.0)];

        let sol = runpf(
            100.0,
            &buses,
            &gens,
            &loads,
            &y_bus,
            &SolverOpts::default(),
        )
        .unwrap();

        assert_eq!(sol.gen[1].pg, 10.0);
        assert!(sol.iterations > 0);
    }

    #[test]
    fn offline_units_are_zeroed() {
        let (buses, branches) = three_bus();
        let y_bus = make_ybus(&buses, &branches);
        let mut off = gen(3, 50.0);
        off.status = false;
        let gens = vec![gen(1, 0.0), off];
        let loads = vec![load(2, 10.0, 2.0)];

        let sol = runpf(
            100.0,
            &buses,
            &gens,
            &loads,
            &y_bus,
            &SolverOpts::default(),
        )
        .unwrap();
        assert_eq!(sol.gen[1].pg, 0.0);
        assert_eq!(sol.gen[1].qg, 0.0);
    }
}
