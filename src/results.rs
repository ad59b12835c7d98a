use serde::{Deserialize, Serialize};

/// One bus row of a solved time step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    /// Profile step index (0-based).
    pub step: usize,

    /// Bus number.
    pub bus: usize,

    /// Voltage magnitude (p.u.).
    pub vm: f64,

    /// Voltage angle (degrees).
    pub va: f64,

    /// Active generation at the bus (MW).
    pub pg: f64,

    /// Reactive generation at the bus (MVAr).
    pub qg: f64,

    /// Served active demand at the bus (MW).
    pub pd: f64,

    /// Served reactive demand at the bus (MVAr).
    pub qd: f64,

    /// System frequency at this step (Hz).
    pub freq_hz: f64,

    /// Whether the network was islanded at this step.
    pub islanded: bool,

    /// True when the row was carried over from the last converged step
    /// instead of being solved fresh.
    pub carried: bool,
}

/// One curtailment event in the shed ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShedRecord {
    /// Profile step index.
    pub step: usize,

    /// Bus owning the curtailed load.
    pub bus: usize,

    /// Configured priority of the load.
    pub priority_before: u32,

    /// Effective priority after the curtailment. Equal to
    /// `priority_before` except under the adaptive policy.
    pub priority_after: u32,

    /// Cumulative shed fraction after this event (percent).
    pub shed_pct: f64,

    /// Active power removed by this event (MW).
    pub shed_mw: f64,

    /// Reactive power removed by this event (MVAr).
    pub shed_mvar: f64,
}

/// One sample of a frequency trajectory.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrequencyPoint {
    /// Time since the disturbance (s).
    pub t_s: f64,

    /// Frequency (Hz).
    pub hz: f64,
}

/// Steady-state frequency of one profile step.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StepFrequency {
    pub step: usize,
    pub hz: f64,
}

/// Accumulated output of a scenario run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScenarioResults {
    /// Per-(bus, step) rows.
    pub records: Vec<StepRecord>,

    /// One row per curtailment event.
    pub shed_ledger: Vec<ShedRecord>,

    /// Steady-state frequency per step.
    pub frequency: Vec<StepFrequency>,

    /// Transient trajectory at the disconnection instant, when requested.
    pub swing: Option<Vec<FrequencyPoint>>,

    /// Resolved disconnection step, if the scenario islands.
    pub disconnect_step: Option<usize>,
}

/// Scenario-level metrics for external consumers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioSummary {
    /// Number of profile steps executed.
    pub steps: usize,

    /// Steps with a fresh converged solve.
    pub steps_converged: usize,

    /// Steps substituted from the last good result.
    pub steps_carried: usize,

    /// Newton iterations summed over all solved steps.
    pub total_iterations: usize,

    /// System loss of the final solved step (MW).
    pub final_loss_mw: f64,

    /// Lowest steady-state frequency over the run (Hz).
    pub min_freq_hz: f64,

    /// Highest steady-state frequency over the run (Hz).
    pub max_freq_hz: f64,

    /// Active power removed by shedding over the run (MW).
    pub total_shed_mw: f64,

    /// True when some step exhausted its shed candidates without
    /// recovering frequency.
    pub unresolved_deficit: bool,

    /// Swing-trajectory nadir at the disconnection instant (Hz).
    pub nadir_hz: Option<f64>,

    /// Swing-trajectory settling frequency (Hz).
    pub settling_hz: Option<f64>,
}
