use crate::network::{Branch, Bus};
use nalgebra::DMatrix;
use num_complex::Complex64;

/// Builds the dense bus admittance matrix, sized by the maximum bus id.
///
/// Off-diagonal entries are symmetric by construction (reciprocal
/// network). The matrix depends only on topology and is built once per
/// scenario; islanding changes bus roles, not admittances.
pub fn make_ybus(bus: &[Bus], branch: &[Branch]) -> DMatrix<Complex64> {
    let nb = bus.iter().map(|b| b.i).max().unwrap_or(0);

    let mut y_bus = DMatrix::<Complex64>::zeros(nb, nb);

    for br in branch {
        if br.r == 0.0 && br.x == 0.0 {
            // Zero series impedance marks a merged bus pair, not an
            // infinite admittance.
            log::debug!("skipping degenerate branch {} -> {}", br.from_bus, br.to_bus);
            continue;
        }

        let y_s = br.y_s();
        let b_c = Complex64::new(0.0, br.b);
        let t = br.tap_ratio();

        let (f, k) = (br.from_bus - 1, br.to_bus - 1);

        y_bus[(f, k)] -= y_s / t;
        y_bus[(k, f)] -= y_s / t;

        y_bus[(f, f)] += y_s / (t * t) + b_c;
        y_bus[(k, k)] += y_s + b_c;
    }

    for b in bus {
        y_bus[(b.i - 1, b.i - 1)] += b.y_sh();
    }

    y_bus
}
