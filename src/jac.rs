use nalgebra::{DMatrix, DVector};
use num_complex::Complex64;

/// Forms the reduced power flow Jacobian from closed-form polar
/// partial derivatives.
///
/// Row/column order is angle corrections over `non_slack` followed by
/// magnitude corrections over `pq`; both lists are 0-based internal
/// indices sorted ascending, matching the mismatch vector layout. The
/// units for all quantities are per unit with radians for voltage
/// angles.
pub fn make_jac(
    y_bus: &DMatrix<Complex64>,
    vm: &DVector<f64>,
    va: &DVector<f64>,
    p_calc: &DVector<f64>,
    q_calc: &DVector<f64>,
    non_slack: &[usize],
    pq: &[usize],
) -> DMatrix<f64> {
    let na = non_slack.len();
    let nq = pq.len();
    let mut jac = DMatrix::<f64>::zeros(na + nq, na + nq);

    // J11 = dP/dVa, J12 = dP/dVm
    for (r, &i) in non_slack.iter().enumerate() {
        for (c, &k) in non_slack.iter().enumerate() {
            let y = y_bus[(i, k)];
            jac[(r, c)] = if i == k {
                -q_calc[i] - vm[i] * vm[i] * y.im
            } else {
                let t = va[i] - va[k];
                vm[i] * vm[k] * (y.re * t.sin() - y.im * t.cos())
            };
        }
        for (c, &k) in pq.iter().enumerate() {
            let y = y_bus[(i, k)];
            jac[(r, na + c)] = if i == k {
                p_calc[i] / vm[i] + vm[i] * y.re
            } else {
                let t = va[i] - va[k];
                vm[i] * (y.re * t.cos() + y.im * t.sin())
            };
        }
    }

    // J21 = dQ/dVa, J22 = dQ/dVm
    for (r, &i) in pq.iter().enumerate() {
        for (c, &k) in non_slack.iter().enumerate() {
            let y = y_bus[(i, k)];
            jac[(na + r, c)] = if i == k {
                p_calc[i] - vm[i] * vm[i] * y.re
            } else {
                let t = va[i] - va[k];
                -vm[i] * vm[k] * (y.re * t.cos() + y.im * t.sin())
            };
        }
        for (c, &k) in pq.iter().enumerate() {
            let y = y_bus[(i, k)];
            jac[(na + r, na + c)] = if i == k {
                q_calc[i] / vm[i] - vm[i] * y.im
            } else {
                let t = va[i] - va[k];
                vm[i] * (y.re * t.sin() - y.im * t.cos())
            };
        }
    }

    jac
}
