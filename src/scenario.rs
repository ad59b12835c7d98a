use crate::bus_types::bus_types;
use crate::dispatch::{dispatch_connected, dispatch_islanded};
use crate::error::{Error, Result};
use crate::freq::{steady_state_frequency, swing_response, SwingOpts};
use crate::network::{total_demand, Bus, BusType, Gen, Load, LoadProfile, Network};
use crate::newton::SolverOpts;
use crate::pf::runpf;
use crate::results::{ScenarioResults, ScenarioSummary, StepFrequency, StepRecord};
use crate::shedding::{shed_until_recovered, ShedPolicy};
use crate::ybus::make_ybus;
use derive_builder::Builder;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Profile steps per hour at 15-minute resolution.
const STEPS_PER_HOUR: usize = 4;

/// When the main grid drops away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectAt {
    /// The scenario stays grid-connected throughout.
    Never,
    /// Explicit 0-based profile step.
    Step(usize),
    /// Wall-clock time mapped onto the 15-minute grid.
    TimeOfDay { hour: u32, minute: u32 },
    /// A step drawn uniformly from `[1, steps - 6]`, leaving an
    /// islanded tail in every draw.
    Randomized,
}

/// What to do when a step's solve fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Abort the whole run on the first solver failure.
    Abort,
    /// Reuse the last converged step's result and keep going. The
    /// substitution is logged and the rows are marked as carried.
    CarryLastGood,
}

/// Scenario-wide settings.
///
/// The system MVA base lives on the [`Network`] table bundle.
#[derive(Debug, Clone, Builder)]
#[builder(default)]
pub struct ScenarioConfig {
    /// Nominal system frequency (Hz).
    pub f_nominal: f64,

    /// Disconnection-time specification.
    pub disconnect: DisconnectAt,

    /// Bus holding the main-grid connection; the slack while connected.
    pub mpg_bus: usize,

    /// Frequency below which the shedding loop engages (Hz).
    pub shed_threshold_hz: f64,

    /// Curtailment policy.
    pub shed_policy: ShedPolicy,

    /// Per-step solver failure policy.
    pub failure_policy: FailurePolicy,

    /// Seed for the randomized disconnection draw. Unseeded runs draw
    /// from entropy and are not reproducible.
    pub seed: Option<u64>,

    /// Newton-Raphson settings.
    pub solver: SolverOpts,

    /// When set, a swing-equation trajectory is produced for the
    /// disconnection instant.
    pub swing: Option<SwingOpts>,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            f_nominal: 50.0,
            disconnect: DisconnectAt::Never,
            mpg_bus: 1,
            shed_threshold_hz: 49.7,
            shed_policy: ShedPolicy::PercentLadder,
            failure_policy: FailurePolicy::Abort,
            seed: None,
            solver: SolverOpts::default(),
            swing: None,
        }
    }
}

/// Resolves the disconnection specification to a profile step.
pub fn disconnection_step(
    disconnect: DisconnectAt,
    steps: usize,
    rng: &mut impl Rng,
) -> Result<Option<usize>> {
    match disconnect {
        DisconnectAt::Never => Ok(None),
        DisconnectAt::Step(s) => {
            if s >= steps {
                return Err(Error::InvalidDisconnectTime {
                    spec: format!("step {}", s),
                    reason: format!("profile has {} steps", steps),
                });
            }
            Ok(Some(s))
        }
        DisconnectAt::TimeOfDay { hour, minute } => {
            if hour > 23 || minute > 59 {
                return Err(Error::InvalidDisconnectTime {
                    spec: format!("{:02}:{:02}", hour, minute),
                    reason: "not a wall-clock time".to_string(),
                });
            }
            let s = (hour as usize * 60 + minute as usize) / (60 / STEPS_PER_HOUR);
            if s >= steps {
                return Err(Error::InvalidDisconnectTime {
                    spec: format!("{:02}:{:02}", hour, minute),
                    reason: format!("maps to step {} of a {}-step profile", s, steps),
                });
            }
            Ok(Some(s))
        }
        DisconnectAt::Randomized => {
            if steps < 7 {
                return Err(Error::InvalidDisconnectTime {
                    spec: "randomized".to_string(),
                    reason: format!("profile of {} steps is too short to draw from", steps),
                });
            }
            Ok(Some(rng.gen_range(1..=steps - 6)))
        }
    }
}

struct StepState {
    records: Vec<StepRecord>,
    freq_hz: f64,
    loss: f64,
    iterations: usize,
}

/// Drives the per-time-step loop over a load profile.
///
/// Configuration errors abort before the loop starts; solver failures
/// inside the loop follow the configured [`FailurePolicy`].
pub fn run_scenario(
    net: &Network,
    profile: &LoadProfile,
    config: &ScenarioConfig,
) -> Result<(ScenarioResults, ScenarioSummary)> {
    let steps = profile.steps();
    if steps == 0 {
        return Err(Error::NoResults);
    }

    // validate the base tables before any solving
    bus_types(&net.bus)?;

    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let disconnect = disconnection_step(config.disconnect, steps, &mut rng)?;
    if let Some(d) = disconnect {
        log::debug!("main grid disconnects at step {}", d);
    }

    let y_bus = make_ybus(&net.bus, &net.branch);

    let mut results = ScenarioResults {
        disconnect_step: disconnect,
        ..Default::default()
    };
    let mut summary = ScenarioSummary {
        steps,
        steps_converged: 0,
        steps_carried: 0,
        total_iterations: 0,
        final_loss_mw: 0.0,
        min_freq_hz: f64::INFINITY,
        max_freq_hz: f64::NEG_INFINITY,
        total_shed_mw: 0.0,
        unresolved_deficit: false,
        nadir_hz: None,
        settling_hz: None,
    };

    let mut last_good: Option<StepState> = None;
    let mut disconnect_state: Option<(Vec<Gen>, f64)> = None;

    for step in 0..steps {
        let loads = net.scale_loads(profile.multipliers[step]);
        let islanded = disconnect.map_or(false, |d| step >= d);

        let solved = solve_step(
            net,
            &y_bus,
            &loads,
            step,
            islanded,
            config,
            &mut results,
            &mut summary,
            &mut disconnect_state,
            disconnect,
        );

        match solved {
            Ok(state) => {
                results.records.extend(state.records.iter().cloned());
                results.frequency.push(StepFrequency {
                    step,
                    hz: state.freq_hz,
                });
                summary.steps_converged += 1;
                summary.total_iterations += state.iterations;
                summary.final_loss_mw = state.loss;
                summary.min_freq_hz = summary.min_freq_hz.min(state.freq_hz);
                summary.max_freq_hz = summary.max_freq_hz.max(state.freq_hz);
                last_good = Some(state);
            }
            Err(e @ (Error::SingularJacobian { .. } | Error::NonConvergence { .. })) => {
                match config.failure_policy {
                    FailurePolicy::Abort => return Err(e),
                    FailurePolicy::CarryLastGood => match &last_good {
                        Some(prev) => {
                            log::warn!(
                                "step {}: {}; substituting the last converged result",
                                step,
                                e
                            );
                            results.records.extend(prev.records.iter().map(|r| {
                                let mut r = r.clone();
                                r.step = step;
                                r.carried = true;
                                r
                            }));
                            results.frequency.push(StepFrequency {
                                step,
                                hz: prev.freq_hz,
                            });
                            summary.steps_carried += 1;
                        }
                        None => {
                            log::warn!("step {}: {}; no converged result to carry", step, e);
                        }
                    },
                }
            }
            Err(e) => return Err(e),
        }
    }

    if summary.steps_converged == 0 {
        return Err(Error::NoResults);
    }

    if let (Some(opts), Some((gens, deficit_mw))) = (&config.swing, &disconnect_state) {
        let resp = swing_response(gens, net.base_mva, config.f_nominal, *deficit_mw, opts);
        summary.nadir_hz = Some(resp.nadir_hz);
        summary.settling_hz = Some(resp.settling_hz);
        results.swing = Some(resp.series);
    }

    summary.total_shed_mw = results.shed_ledger.iter().map(|r| r.shed_mw).sum();

    Ok((results, summary))
}

#[allow(clippy::too_many_arguments)]
fn solve_step(
    net: &Network,
    y_bus: &nalgebra::DMatrix<num_complex::Complex64>,
    loads: &[Load],
    step: usize,
    islanded: bool,
    config: &ScenarioConfig,
    results: &mut ScenarioResults,
    summary: &mut ScenarioSummary,
    disconnect_state: &mut Option<(Vec<Gen>, f64)>,
    disconnect: Option<usize>,
) -> Result<StepState> {
    if islanded {
        let (bus, gen) = island_tables(net, config.mpg_bus, step)?;

        let (demand_mw, _) = total_demand(loads);
        let dispatch = dispatch_islanded(&gen, demand_mw)?;
        let freq_hz =
            steady_state_frequency(&dispatch.gen, config.f_nominal, dispatch.shortfall_mw);

        if disconnect == Some(step) {
            *disconnect_state = Some((dispatch.gen.clone(), dispatch.shortfall_mw));
        }

        let (final_loads, final_gen, freq_hz) = if freq_hz < config.shed_threshold_hz {
            let outcome = shed_until_recovered(
                step,
                loads,
                &gen,
                config.f_nominal,
                config.shed_threshold_hz,
                config.shed_policy,
            )?;
            results.shed_ledger.extend(outcome.records);
            summary.unresolved_deficit |= !outcome.resolved;
            (outcome.load, outcome.gen, outcome.freq_hz)
        } else {
            (loads.to_vec(), dispatch.gen, freq_hz)
        };

        let sol = runpf(
            net.base_mva,
            &bus,
            &final_gen,
            &final_loads,
            y_bus,
            &config.solver,
        )?;

        Ok(StepState {
            records: step_records(step, &sol.bus, &sol.gen, &final_loads, freq_hz, true),
            freq_hz,
            loss: sol.loss,
            iterations: sol.iterations,
        })
    } else {
        let (demand_mw, _) = total_demand(loads);
        let dispatch = dispatch_connected(&net.gen, demand_mw, config.mpg_bus);

        let sol = runpf(
            net.base_mva,
            &net.bus,
            &dispatch.gen,
            loads,
            y_bus,
            &config.solver,
        )?;

        Ok(StepState {
            records: step_records(step, &sol.bus, &sol.gen, loads, config.f_nominal, false),
            freq_hz: config.f_nominal,
            loss: sol.loss,
            iterations: sol.iterations,
        })
    }
}

/// Derives the islanded working tables: the main-grid unit goes
/// offline, its bus becomes PQ and the biggest remaining online unit's
/// bus takes over as slack.
fn island_tables(net: &Network, mpg_bus: usize, step: usize) -> Result<(Vec<Bus>, Vec<Gen>)> {
    let mut bus = net.bus.clone();
    let mut gen = net.gen.clone();

    for g in gen.iter_mut().filter(|g| g.bus == mpg_bus) {
        g.status = false;
    }

    let leader = gen
        .iter()
        .filter(|g| g.status && g.pmax > 0.0)
        .max_by(|a, b| a.pmax.total_cmp(&b.pmax))
        .map(|g| g.bus)
        .ok_or(Error::Blackout { step })?;

    for b in bus.iter_mut() {
        if b.i == leader {
            b.bus_type = BusType::Slack;
        } else if b.i == mpg_bus || b.bus_type == BusType::Slack {
            b.bus_type = BusType::Pq;
        }
    }

    Ok((bus, gen))
}

/// Flattens the solved tables into per-bus rows.
fn step_records(
    step: usize,
    bus: &[Bus],
    gen: &[Gen],
    load: &[Load],
    freq_hz: f64,
    islanded: bool,
) -> Vec<StepRecord> {
    bus.iter()
        .map(|b| {
            let (pg, qg) = gen
                .iter()
                .filter(|g| g.status && g.bus == b.i)
                .fold((0.0, 0.0), |(p, q), g| (p + g.pg, q + g.qg));
            let (pd, qd) = load
                .iter()
                .filter(|l| l.status && l.bus == b.i)
                .fold((0.0, 0.0), |(p, q), l| (p + l.pd, q + l.qd));
            StepRecord {
                step,
                bus: b.i,
                vm: b.vm,
                va: b.va,
                pg,
                qg,
                pd,
                qd,
                freq_hz,
                islanded,
                carried: false,
            }
        })
        .collect()
}
