use crate::debug::format_polar_vec;
use crate::error::{Error, Result};
use crate::jac::make_jac;
use derive_builder::Builder;
use nalgebra::{DMatrix, DVector};
use num_complex::Complex64;

/// Newton-Raphson stopping criteria.
#[derive(Debug, Clone, Builder)]
#[builder(default)]
pub struct SolverOpts {
    /// Convergence tolerance on the infinity norm of the power
    /// mismatch (p.u.).
    pub tolerance: f64,

    /// Iteration budget.
    pub max_it: usize,
}

impl Default for SolverOpts {
    fn default() -> Self {
        Self {
            tolerance: 1e-5,
            max_it: 30,
        }
    }
}

/// Converged voltage state.
#[derive(Debug)]
pub struct NewtonSolution {
    /// Complex bus voltages (p.u., internal bus order).
    pub v: DVector<Complex64>,

    /// Iterations taken to converge.
    pub iterations: usize,
}

/// Calculated complex bus injections for a voltage state.
pub(crate) fn calc_injections(
    y_bus: &DMatrix<Complex64>,
    v: &DVector<Complex64>,
) -> DVector<Complex64> {
    v.component_mul(&(y_bus * v).conjugate())
}

/// Solves power flow using full Newton's method (power/polar).
///
/// `s_bus` holds the scheduled net injections, `pv`/`pq` the 0-based
/// index lists from `bus_types`. Angles are corrected on all non-slack
/// buses, magnitudes on PQ buses only. Returns a tagged failure when
/// the Jacobian factorization breaks down or the iteration budget is
/// exhausted above tolerance.
pub fn newtonpf(
    y_bus: &DMatrix<Complex64>,
    s_bus: &DVector<Complex64>,
    v0: &DVector<Complex64>,
    pv: &[usize],
    pq: &[usize],
    opts: &SolverOpts,
) -> Result<NewtonSolution> {
    let mut non_slack: Vec<usize> = pv.iter().chain(pq.iter()).copied().collect();
    non_slack.sort_unstable();
    let mut pq = pq.to_vec();
    pq.sort_unstable();

    let mut v = v0.clone();
    let mut vm = v.map(|e| e.norm());
    let mut va = v.map(|e| e.arg());

    log::debug!("V0: {}", format_polar_vec(v.as_slice()));

    let mismatch = |s_calc: &DVector<Complex64>| -> DVector<f64> {
        let mut f = DVector::zeros(non_slack.len() + pq.len());
        for (j, &b) in non_slack.iter().enumerate() {
            f[j] = s_bus[b].re - s_calc[b].re;
        }
        for (j, &b) in pq.iter().enumerate() {
            f[non_slack.len() + j] = s_bus[b].im - s_calc[b].im;
        }
        f
    };

    // evaluate F(x0)
    let mut s_calc = calc_injections(y_bus, &v);
    let mut f = mismatch(&s_calc);
    let mut norm_f = f.amax();
    let mut converged = norm_f < opts.tolerance;

    let mut i = 0;
    while !converged && i < opts.max_it {
        i += 1;

        let p_calc = s_calc.map(|e| e.re);
        let q_calc = s_calc.map(|e| e.im);
        let jac = make_jac(y_bus, &vm, &va, &p_calc, &q_calc, &non_slack, &pq);

        // compute correction step
        let dx = jac
            .lu()
            .solve(&f)
            .ok_or(Error::SingularJacobian { iterations: i })?;

        // update voltage
        for (j, &b) in non_slack.iter().enumerate() {
            va[b] += dx[j];
        }
        for (j, &b) in pq.iter().enumerate() {
            vm[b] += dx[non_slack.len() + j];
        }
        v.zip_zip_apply(&vm, &va, |e, m, a| *e = Complex64::from_polar(m, a));

        // evaluate F(x)
        s_calc = calc_injections(y_bus, &v);
        f = mismatch(&s_calc);
        norm_f = f.amax();

        log::debug!("iteration {}: max mismatch {:.3e}", i, norm_f);

        converged = norm_f < opts.tolerance;
    }

    if !converged {
        return Err(Error::NonConvergence {
            iterations: i,
            max_mismatch: norm_f,
        });
    }

    log::debug!(
        "converged in {} iterations: {}",
        i,
        format_polar_vec(v.as_slice())
    );

    Ok(NewtonSolution { v, iterations: i })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_bus_ybus(y: Complex64) -> DMatrix<Complex64> {
        let mut y_bus = DMatrix::<Complex64>::zeros(2, 2);
        y_bus[(0, 0)] = y;
        y_bus[(1, 1)] = y;
        y_bus[(0, 1)] = -y;
        y_bus[(1, 0)] = -y;
        y_bus
    }

    // Lossless 2-bus line with x = 0.1 p.u. and 0.2 p.u. demand at the
    // receiving end. With the slack held at 1.0 pu the receiving-end
    // state solves P = (V1/x)·sin δ and Q = (V1 cos δ − V1²)/x, which
    // pins down V1 and δ in closed form.
    #[test]
    fn two_bus_case_matches_analytic_solution() {
        let y = Complex64::new(1.0, 0.0) / Complex64::new(0.0, 0.1);
        let y_bus = two_bus_ybus(y);

        let s_bus = DVector::from_vec(vec![
            Complex64::new(0.0, 0.0),
            Complex64::new(-0.2, 0.0),
        ]);
        let v0 = DVector::from_element(2, Complex64::new(1.0, 0.0));

        let sol = newtonpf(&y_bus, &s_bus, &v0, &[], &[1], &SolverOpts::default()).unwrap();
        assert!(sol.iterations <= 5, "took {} iterations", sol.iterations);

        let vm = sol.v[1].norm();
        let va = sol.v[1].arg();
        // analytic: V·sin δ = −0.02, V·cos δ − V² = 0
        assert!((vm * va.sin() - (-0.02)).abs() < 1e-6);
        assert!((vm * va.cos() - vm * vm).abs() < 1e-6);
    }

    #[test]
    fn converged_state_satisfies_schedule() {
        let y = Complex64::new(1.0, 0.0) / Complex64::new(0.01, 0.1);
        let y_bus = two_bus_ybus(y);
        let s_bus = DVector::from_vec(vec![
            Complex64::new(0.0, 0.0),
            Complex64::new(-0.3, -0.1),
        ]);
        let v0 = DVector::from_element(2, Complex64::new(1.0, 0.0));

        let sol = newtonpf(&y_bus, &s_bus, &v0, &[], &[1], &SolverOpts::default()).unwrap();
        let s = calc_injections(&y_bus, &sol.v);
        assert!((s[1] - s_bus[1]).norm() < 1e-5);
    }

    #[test]
    fn iteration_budget_is_a_tagged_failure() {
        let y = Complex64::new(1.0, 0.0) / Complex64::new(0.01, 0.1);
        let y_bus = two_bus_ybus(y);
        // demand far beyond the line's transfer capability
        let s_bus = DVector::from_vec(vec![
            Complex64::new(0.0, 0.0),
            Complex64::new(-50.0, 0.0),
        ]);
        let v0 = DVector::from_element(2, Complex64::new(1.0, 0.0));

        let err = newtonpf(&y_bus, &s_bus, &v0, &[], &[1], &SolverOpts::default()).unwrap_err();
        assert!(matches!(
            err,
            Error::NonConvergence { .. } | Error::SingularJacobian { .. }
        ));
    }

    #[test]
    fn zero_mismatch_converges_without_iterating() {
        let y = Complex64::new(1.0, 0.0) / Complex64::new(0.0, 0.1);
        let y_bus = two_bus_ybus(y);
        let s_bus = DVector::from_vec(vec![Complex64::new(0.0, 0.0); 2]);
        let v0 = DVector::from_element(2, Complex64::new(1.0, 0.0));

        let sol = newtonpf(&y_bus, &s_bus, &v0, &[], &[1], &SolverOpts::default()).unwrap();
        assert_eq!(sol.iterations, 0);
    }
}
