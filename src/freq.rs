use crate::network::Gen;
use crate::results::FrequencyPoint;
use derive_builder::Builder;

/// Deficits below this are treated as a balanced system (MW).
const DEFICIT_FLOOR_MW: f64 = 1e-4;

/// Steady-state system frequency after the governors have settled.
///
/// Each online unit's per-unit droop is converted to a power
/// denominated droop `R' = R * f_nominal / pmax` (Hz/MW); the parallel
/// combination gives the system stiffness and the deviation is
/// `-R_sys * deficit`. Units that are offline, have no rating or no
/// droop take no part. With no responsive unit or a negligible deficit
/// the nominal frequency is returned unchanged.
pub fn steady_state_frequency(gen: &[Gen], f_nominal: f64, deficit_mw: f64) -> f64 {
    let inv_sum: f64 = gen
        .iter()
        .filter(|g| g.status && g.pmax > 0.0 && g.droop > 0.0)
        .map(|g| g.pmax / (g.droop * f_nominal))
        .sum();

    if inv_sum == 0.0 || deficit_mw.abs() < DEFICIT_FLOOR_MW {
        return f_nominal;
    }

    let r_sys = 1.0 / inv_sum;
    f_nominal - r_sys * deficit_mw
}

/// Swing-equation integration settings.
#[derive(Debug, Clone, Builder)]
#[builder(default)]
pub struct SwingOpts {
    /// Euler step (s).
    pub dt_s: f64,

    /// Integration horizon (s).
    pub horizon_s: f64,
}

impl Default for SwingOpts {
    fn default() -> Self {
        Self {
            dt_s: 0.01,
            horizon_s: 10.0,
        }
    }
}

/// Transient frequency trajectory after a step power deficit.
pub struct SwingResponse {
    /// Frequency samples over the horizon.
    pub series: Vec<FrequencyPoint>,

    /// Lowest frequency reached (Hz).
    pub nadir_hz: f64,

    /// Frequency at the end of the horizon (Hz).
    pub settling_hz: f64,
}

/// Integrates the aggregate swing equation for a step deficit.
///
/// The online units are lumped into one machine with
/// `H_eq = sum(H_i * pmax_i) / base_mva` and per-unit droop
/// `R_eq = (sum(1/R_i))^-1`. Explicit Euler on
/// `dw/dt = (dPm - dPe) / (2 H_eq)` with the governor response
/// `dPm = -(1/R_eq)(w - 1)` held at zero for the first step, standing
/// in for governor dead time. The trajectory is sampled after each
/// speed update.
pub fn swing_response(
    gen: &[Gen],
    base_mva: f64,
    f_nominal: f64,
    deficit_mw: f64,
    opts: &SwingOpts,
) -> SwingResponse {
    let online: Vec<&Gen> = gen.iter().filter(|g| g.status && g.pmax > 0.0).collect();

    let h_eq: f64 = online.iter().map(|g| g.inertia * g.pmax).sum::<f64>() / base_mva;
    let inv_r: f64 = online
        .iter()
        .filter(|g| g.droop > 0.0)
        .map(|g| 1.0 / g.droop)
        .sum();

    let steps = (opts.horizon_s / opts.dt_s).round() as usize;
    let mut series = Vec::with_capacity(steps + 1);
    series.push(FrequencyPoint {
        t_s: 0.0,
        hz: f_nominal,
    });

    if h_eq <= 0.0 {
        // nothing spinning, the trajectory degenerates to nominal
        return SwingResponse {
            series,
            nadir_hz: f_nominal,
            settling_hz: f_nominal,
        };
    }

    let d_pe = deficit_mw / base_mva;
    let mut w = 1.0_f64;
    let mut nadir_hz = f_nominal;

    for k in 0..steps {
        let d_pm = if k == 0 || inv_r == 0.0 {
            0.0
        } else {
            -inv_r * (w - 1.0)
        };
        w += (d_pm - d_pe) / (2.0 * h_eq) * opts.dt_s;

        let hz = w * f_nominal;
        nadir_hz = nadir_hz.min(hz);
        series.push(FrequencyPoint {
            t_s: (k + 1) as f64 * opts.dt_s,
            hz,
        });
    }

    let settling_hz = series.last().map(|p| p.hz).unwrap_or(f_nominal);
    SwingResponse {
        series,
        nadir_hz,
        settling_hz,
    }
}
