use crate::error::{Error, Result};
use crate::network::Gen;

/// Outcome of a dispatch pass.
///
/// The generator table is a working copy with updated setpoints; the
/// base tables are never mutated.
pub struct Dispatch {
    /// Schedule with updated active-power setpoints.
    pub gen: Vec<Gen>,

    /// Demand left uncovered after every online unit saturated at its
    /// maximum output (MW). Zero when the demand is absorbable.
    pub shortfall_mw: f64,
}

impl Dispatch {
    /// Total scheduled active power of the online units (MW).
    pub fn scheduled_mw(&self) -> f64 {
        self.gen.iter().filter(|g| g.status).map(|g| g.pg).sum()
    }
}

/// Islanded dispatch: the online microgrid units must carry the whole
/// demand themselves.
///
/// The imbalance between demand and the current schedule is shared in
/// proportion to each unit's participation factor and the result is
/// clamped to `[pmin, pmax]`. Clamping can leave a residual imbalance;
/// it is accepted and surfaces in the solved power balance rather than
/// being re-shared. When demand exceeds the aggregate capability every
/// unit saturates at `pmax` and the uncovered remainder is returned as
/// an explicit shortfall for the frequency model.
pub fn dispatch_islanded(gen: &[Gen], demand_mw: f64) -> Result<Dispatch> {
    let mut out = gen.to_vec();

    let agg_pmax: f64 = out.iter().filter(|g| g.status).map(|g| g.pmax).sum();

    if demand_mw > agg_pmax {
        for g in out.iter_mut().filter(|g| g.status) {
            g.pg = g.pmax;
        }
        let shortfall_mw = demand_mw - agg_pmax;
        log::warn!(
            "demand {:.3} MW exceeds aggregate capability {:.3} MW, {:.3} MW shortfall",
            demand_mw,
            agg_pmax,
            shortfall_mw
        );
        return Ok(Dispatch {
            gen: out,
            shortfall_mw,
        });
    }

    let scheduled: f64 = out.iter().filter(|g| g.status).map(|g| g.pg).sum();
    let imbalance = demand_mw - scheduled;

    let psum: f64 = out
        .iter()
        .filter(|g| g.status)
        .map(|g| g.participation)
        .sum();
    if psum == 0.0 {
        return Err(Error::ZeroParticipation {
            imbalance_mw: imbalance,
        });
    }
    if (psum - 1.0).abs() > 1e-6 {
        log::warn!("participation factors sum to {:.6}, shares are rescaled", psum);
    }

    for g in out.iter_mut().filter(|g| g.status) {
        g.pg = (g.pg + imbalance * g.participation / psum).clamp(g.pmin, g.pmax);
    }

    Ok(Dispatch {
        gen: out,
        shortfall_mw: 0.0,
    })
}

/// Grid-connected dispatch: the microgrid units follow their
/// participation shares and the slack unit absorbs the remainder
/// through the solve.
///
/// Units at the slack bus are left untouched. A zero participation sum
/// is not an error here: no redistribution is required because the
/// whole imbalance simply lands on the slack unit.
pub fn dispatch_connected(gen: &[Gen], demand_mw: f64, slack_bus: usize) -> Dispatch {
    let mut out = gen.to_vec();

    let participating = |g: &Gen| g.status && g.bus != slack_bus;

    let scheduled: f64 = out.iter().filter(|g| participating(g)).map(|g| g.pg).sum();
    let imbalance = demand_mw - scheduled;

    let psum: f64 = out
        .iter()
        .filter(|g| participating(g))
        .map(|g| g.participation)
        .sum();

    if psum == 0.0 {
        log::debug!("no participating units, {:.3} MW left to the slack", imbalance);
    } else {
        for g in out.iter_mut().filter(|g| participating(g)) {
            g.pg = (g.pg + imbalance * g.participation / psum).clamp(g.pmin, g.pmax);
        }
    }

    Dispatch {
        gen: out,
        shortfall_mw: 0.0,
    }
}
