use num_complex::Complex64;
use serde::{Deserialize, Serialize};

/// Power factor assumed for loads whose base demand is zero.
const FALLBACK_POWER_FACTOR: f64 = 0.9;

/// Network bundles the base tables of a microgrid case.
///
/// The tables are loaded once per scenario and treated as immutable
/// templates; per-step working copies (scaled loads, adjusted schedules,
/// reassigned bus roles) are derived from them.
#[derive(Clone, Serialize, Deserialize)]
pub struct Network {
    /// System MVA base used for converting power into per-unit quantities.
    /// Default value is 100.
    pub base_mva: f64,

    /// Network nodes, including shunts.
    pub bus: Vec<Bus>,

    /// Generating units, including the main-grid connection unit.
    pub gen: Vec<Gen>,

    /// Lines/cables and transformers.
    pub branch: Vec<Branch>,

    /// Sheddable demand, kept separate from the bus table so each load
    /// carries its own status and shed priority.
    pub load: Vec<Load>,
}

impl Network {
    /// Number of buses, taken as the maximum bus id.
    pub fn n_bus(&self) -> usize {
        self.bus.iter().map(|b| b.i).max().unwrap_or(0)
    }

    /// Derives the working load set for one time step by applying a
    /// profile multiplier to every load's base demand.
    ///
    /// Each load's power factor is fixed by its base Pd/Qd and reactive
    /// demand tracks the scaled active demand through that power factor,
    /// so the load shape is preserved as the magnitude changes.
    pub fn scale_loads(&self, multiplier: f64) -> Vec<Load> {
        self.load
            .iter()
            .map(|l| {
                let s = l.pd.hypot(l.qd);
                let pf = if s > 0.0 {
                    l.pd / s
                } else {
                    FALLBACK_POWER_FACTOR
                };
                let pd = l.pd * multiplier;
                let qd = pd * pf.acos().tan();
                Load { pd, qd, ..*l }
            })
            .collect()
    }
}

/// Sums active and reactive demand (MW, MVAr) over the online loads.
pub fn total_demand(loads: &[Load]) -> (f64, f64) {
    loads
        .iter()
        .filter(|l| l.status)
        .fold((0.0, 0.0), |(p, q), l| (p + l.pd, q + l.qd))
}

#[derive(Debug, PartialEq, Eq, Copy, Clone, Serialize, Deserialize)]
pub enum BusType {
    /// Reference voltage angle. Slack active and reactive power.
    Slack = 1,
    /// Fixed active power and voltage magnitude.
    Pv = 2,
    /// Fixed active and reactive power.
    Pq = 3,
}

/// Bus is a node in the network graph structure.
/// Static shunts are included in the Bus definition.
#[derive(Clone, Serialize, Deserialize)]
pub struct Bus {
    /// Bus number (1-based, contiguous).
    pub i: usize,

    /// Role in the power-flow formulation. Mutable per scenario step:
    /// islanding retypes the main-grid bus and promotes a new slack.
    pub bus_type: BusType,

    /// Initial voltage magnitude guess (p.u.).
    pub vm: f64,

    /// Initial voltage angle guess (degrees).
    pub va: f64,

    /// Shunt conductance (p.u.).
    pub gs: f64,

    /// Shunt susceptance (p.u.).
    pub bs: f64,
}

impl Bus {
    pub(crate) fn y_sh(&self) -> Complex64 {
        Complex64::new(self.gs, self.bs)
    }
}

/// Gen is a generating unit owned by a bus.
#[derive(Clone, Serialize, Deserialize)]
pub struct Gen {
    /// Unit number.
    pub id: usize,

    /// Owning bus number.
    pub bus: usize,

    /// In-service flag. Offline units inject nothing and are excluded
    /// from droop and inertia aggregation.
    pub status: bool,

    /// Real power output (MW).
    pub pg: f64,

    /// Reactive power output (MVAr).
    pub qg: f64,

    /// Minimum real power output (MW).
    pub pmin: f64,

    /// Maximum real power output (MW).
    pub pmax: f64,

    /// Dispatch share used to distribute a power imbalance.
    pub participation: f64,

    /// Speed droop (p.u.).
    pub droop: f64,

    /// Inertia constant (s).
    pub inertia: f64,
}

/// Load is a block of demand owned by a bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Load {
    /// Owning bus number.
    pub bus: usize,

    /// In-service flag.
    pub status: bool,

    /// Real power demand (MW).
    pub pd: f64,

    /// Reactive power demand (MVAr).
    pub qd: f64,

    /// Shed priority. Lower values are curtailed first.
    pub priority: u32,
}

/// Branch represents either a line/cable or a two winding transformer.
#[derive(Clone, Serialize, Deserialize)]
pub struct Branch {
    /// From bus number.
    pub from_bus: usize,

    /// To bus number.
    pub to_bus: usize,

    /// Series resistance (p.u.).
    pub r: f64,

    /// Series reactance (p.u.).
    pub x: f64,

    /// Total line charging susceptance (p.u.).
    pub b: f64,

    /// Transformer off nominal tap ratio. Absent or non-finite values
    /// are treated as 1.0.
    pub tap: Option<f64>,
}

impl Branch {
    pub(crate) fn y_s(&self) -> Complex64 {
        Complex64::new(1.0, 0.0) / Complex64::new(self.r, self.x)
    }

    /// Effective tap ratio with malformed values defaulted to nominal.
    pub(crate) fn tap_ratio(&self) -> f64 {
        match self.tap {
            Some(t) if t.is_finite() && t != 0.0 => t,
            _ => 1.0,
        }
    }
}

/// Ordered per-step demand multipliers, typically 96 points at
/// 15-minute resolution over 24 hours.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadProfile {
    pub multipliers: Vec<f64>,
}

impl LoadProfile {
    pub fn new(multipliers: Vec<f64>) -> Self {
        Self { multipliers }
    }

    pub fn steps(&self) -> usize {
        self.multipliers.len()
    }
}
