use crate::{real, Real};
use numeric_literals::replace_float_literals;
use serde::{Deserialize, Serialize};

/// Parameters of the Newmark / generalized-alpha family.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NewmarkParameters<T> {
    pub alpha_m: T,
    pub alpha_f: T,
    pub beta: T,
    pub gamma: T,
    /// Mass-proportional Rayleigh damping coefficient.
    pub alpha1: T,
    /// Stiffness-proportional Rayleigh damping coefficient.
    pub alpha2: T,
    /// Whether the Newton unknowns are displacement increments (as opposed to acceleration
    /// increments).
    pub solve_displacement: bool,
}

impl<T: Real> NewmarkParameters<T> {
    /// The classical Newmark scheme.
    pub fn newmark(beta: T, gamma: T) -> Self {
        Self {
            alpha_m: T::one(),
            alpha_f: T::one(),
            beta,
            gamma,
            alpha1: T::zero(),
            alpha2: T::zero(),
            solve_displacement: true,
        }
    }

    /// Newmark parameters derived from a dissipation parameter `alpha` (typically in `[-1/3, 0]`).
    #[replace_float_literals(T::from_f64(literal).unwrap())]
    pub fn from_alpha(alpha: T) -> Self {
        Self::newmark(0.25 * (1.0 - alpha) * (1.0 - alpha), 0.5 - alpha)
    }

    /// The generalized-alpha scheme, with `beta` and `gamma` chosen for second-order accuracy.
    pub fn generalized_alpha(alpha_m: T, alpha_f: T) -> Self {
        let alpha = alpha_f - alpha_m;
        Self {
            alpha_m,
            alpha_f,
            ..Self::from_alpha(alpha)
        }
    }

    /// Parameters from the coefficient set `(a1, a2, b, c)` used by element integrands.
    ///
    /// With `generalized_alpha`, `|b|` is `alpha_m` and `c` is `alpha_f`. Otherwise `|b|` is
    /// `beta` and `c` is `gamma`. A negative `b` selects displacement increments as unknowns.
    pub fn from_element_coefficients(a1: T, a2: T, b: T, c: T, generalized_alpha: bool) -> Self {
        let base = if generalized_alpha {
            Self::generalized_alpha(b.abs(), c)
        } else {
            Self::newmark(b.abs(), c)
        };
        Self {
            alpha1: a1,
            alpha2: a2,
            solve_displacement: b < T::zero(),
            ..base
        }
    }

    /// The unconditionally stable average acceleration (trapezoidal) rule.
    #[replace_float_literals(T::from_f64(literal).unwrap())]
    pub fn average_acceleration() -> Self {
        Self::newmark(0.25, 0.5)
    }

    pub fn with_rayleigh_damping(self, alpha1: T, alpha2: T) -> Self {
        Self { alpha1, alpha2, ..self }
    }

    pub fn with_solve_displacement(self, solve_displacement: bool) -> Self {
        Self {
            solve_displacement,
            ..self
        }
    }
}

impl<T: Real> Default for NewmarkParameters<T> {
    /// `alpha = -0.1`, i.e. `beta = 0.3025` and `gamma = 0.6`.
    fn default() -> Self {
        Self::from_alpha(real(-0.1))
    }
}
