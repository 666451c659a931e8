//! Derivative-free minimization (Nelder-Mead simplex)

use std::cmp::Ordering;

const REFLECT: f64 = 1.0;
const EXPAND: f64 = 2.0;
const CONTRACT: f64 = 0.5;
const SHRINK: f64 = 0.5;

#[derive(Debug, Clone, Copy)]
pub struct NelderMead {
    pub max_iterations: usize,
    /// Absolute spread of objective values across the simplex
    pub f_tolerance: f64,
    /// Largest coordinate distance from the best vertex
    pub x_tolerance: f64,
    pub initial_step: f64,
}

impl Default for NelderMead {
    fn default() -> Self {
        Self {
            max_iterations: 1000,
            f_tolerance: 1e-10,
            x_tolerance: 1e-8,
            initial_step: 0.1,
        }
    }
}

/// Minimizer and its objective value
#[derive(Debug, Clone)]
pub struct Minimum {
    pub point: Vec<f64>,
    pub value: f64,
    pub iterations: usize,
}

fn lerp(from: &[f64], to: &[f64], t: f64) -> Vec<f64> {
    from.iter().zip(to).map(|(a, b)| a + t * (b - a)).collect()
}

impl NelderMead {
    /// Minimize `objective` starting from `start`. NaN objective values are
    /// treated as `+inf`, so infeasible regions can be signalled that way.
    pub fn minimize<F>(&self, objective: F, start: &[f64]) -> Minimum
    where
        F: Fn(&[f64]) -> f64,
    {
        let eval = |x: &[f64]| {
            let v = objective(x);
            if v.is_nan() {
                f64::INFINITY
            } else {
                v
            }
        };

        let n = start.len();
        if n == 0 {
            return Minimum {
                point: Vec::new(),
                value: eval(start),
                iterations: 0,
            };
        }

        let mut simplex: Vec<(Vec<f64>, f64)> = Vec::with_capacity(n + 1);
        simplex.push((start.to_vec(), eval(start)));
        for i in 0..n {
            let mut vertex = start.to_vec();
            vertex[i] += if vertex[i].abs() > 1e-8 {
                self.initial_step * vertex[i].abs().max(0.5)
            } else {
                self.initial_step
            };
            let value = eval(&vertex);
            simplex.push((vertex, value));
        }

        let mut iterations = 0;
        while iterations < self.max_iterations {
            iterations += 1;
            simplex.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal));

            let best = simplex[0].1;
            let worst = simplex[n].1;
            let spread = (worst - best).abs();
            let size = simplex[1..]
                .iter()
                .flat_map(|(x, _)| x.iter().zip(&simplex[0].0).map(|(a, b)| (a - b).abs()))
                .fold(0.0f64, f64::max);
            if spread <= self.f_tolerance && size <= self.x_tolerance {
                break;
            }

            let mut centroid = vec![0.0; n];
            for (x, _) in &simplex[..n] {
                for (c, v) in centroid.iter_mut().zip(x) {
                    *c += v / n as f64;
                }
            }

            let reflected = lerp(&centroid, &simplex[n].0, -REFLECT);
            let f_reflected = eval(&reflected);

            if f_reflected < best {
                let expanded = lerp(&centroid, &reflected, EXPAND);
                let f_expanded = eval(&expanded);
                simplex[n] = if f_expanded < f_reflected {
                    (expanded, f_expanded)
                } else {
                    (reflected, f_reflected)
                };
                continue;
            }

            if f_reflected < simplex[n - 1].1 {
                simplex[n] = (reflected, f_reflected);
                continue;
            }

            let (toward, f_toward) = if f_reflected < worst {
                (reflected, f_reflected)
            } else {
                (simplex[n].0.clone(), worst)
            };
            let contracted = lerp(&centroid, &toward, CONTRACT);
            let f_contracted = eval(&contracted);
            if f_contracted < f_toward {
                simplex[n] = (contracted, f_contracted);
                continue;
            }

            let anchor = simplex[0].0.clone();
            for vertex in simplex.iter_mut().skip(1) {
                let shrunk = lerp(&anchor, &vertex.0, SHRINK);
                let value = eval(&shrunk);
                *vertex = (shrunk, value);
            }
        }

        simplex.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal));
        let (point, value) = simplex.swap_remove(0);
        Minimum {
            point,
            value,
            iterations,
        }
    }
}
