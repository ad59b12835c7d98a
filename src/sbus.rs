use crate::network::{Gen, Load};
use nalgebra::DVector;
use num_complex::Complex64;

/// Builds the vector of scheduled complex bus power injections.
///
/// Returns generation minus load per bus, expressed in per unit on the
/// system base. The generator schedule is supplied by the caller (the
/// dispatch step), so the solver stays a pure function of topology,
/// roles and schedule.
pub fn make_sbus(base_mva: f64, nb: usize, gen: &[Gen], load: &[Load]) -> DVector<Complex64> {
    let mut s_bus = DVector::<Complex64>::zeros(nb);

    gen.iter().filter(|g| g.status).for_each(|g| {
        s_bus[g.bus - 1] += Complex64::new(g.pg, g.qg) / base_mva;
    });

    load.iter().filter(|l| l.status).for_each(|l| {
        s_bus[l.bus - 1] -= Complex64::new(l.pd, l.qd) / base_mva;
    });

    s_bus
}
