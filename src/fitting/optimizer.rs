use std::cell::Cell;

use crate::error::OptimizerError;

const SCAN_SAMPLES: usize = 12;
const GOLDEN_EVALS: usize = 24;

/// Circle in grid coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CircleParams {
    pub x: f64,
    pub y: f64,
    pub r: f64,
}

impl CircleParams {
    fn to_array(self) -> [f64; 3] {
        [self.x, self.y, self.r]
    }

    fn from_array(p: [f64; 3]) -> Self {
        Self {
            x: p[0],
            y: p[1],
            r: p[2],
        }
    }
}

/// Best circle found in one cross-section.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitResult {
    pub center_x: f64,
    pub center_y: f64,
    pub radius: f64,
    pub score: f64,
    pub min_value: f32,
    pub max_value: f32,
    pub evaluations: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchSettings {
    pub initial_step: f64,
    pub max_iterations: usize,
    /// Search stops once the line-search step falls below this (grid units).
    pub x_tolerance: f64,
    pub f_tolerance: f64,
}

impl SearchSettings {
    pub fn for_side(side: usize) -> Self {
        Self {
            initial_step: side as f64 / 4.0,
            max_iterations: 1000,
            x_tolerance: 1e-3,
            f_tolerance: 1e-9,
        }
    }
}

/// Mismatch between `grid` and an ideal disk: bright inside, dark outside.
///
/// Cells with centers strictly inside the circle cost `(max - v)^2`, all
/// others `(v - min)^2`. Every unit lattice point of the circle's bounding
/// square lying off the grid costs `(max - min)^2`. Normalized by cell count.
pub fn circle_badness(grid: &[f32], side: usize, min: f32, max: f32, c: &CircleParams) -> f64 {
    let (min, max) = (f64::from(min), f64::from(max));
    let r2 = c.r * c.r;

    let mut badness = 0.0;
    for j in 0..side {
        let dy = j as f64 - c.y;
        for i in 0..side {
            let dx = i as f64 - c.x;
            let v = f64::from(grid[j * side + i]);
            if r2 > dx * dx + dy * dy {
                badness += (max - v) * (max - v);
            } else {
                badness += (v - min) * (v - min);
            }
        }
    }

    let off_grid = off_grid_lattice_points(c, side as f64);
    badness += off_grid as f64 * (max - min) * (max - min);

    badness / (side * side) as f64
}

/// Lattice points `(x - r + s, y - r + t)`, `s, t = 0, 1, ..` up to `x + r`,
/// lying outside `[0, side]` on either axis.
fn off_grid_lattice_points(c: &CircleParams, side: f64) -> usize {
    if c.r < 0.0 {
        return 0;
    }
    let per_axis = (2.0 * c.r).floor() as i64 + 1;
    let inside = |center: f64| -> i64 {
        let start = center - c.r;
        let lo = (-start).ceil().max(0.0) as i64;
        let hi = ((side - start).floor() as i64).min(per_axis - 1);
        (hi - lo + 1).max(0)
    };
    let total = per_axis * per_axis;
    (total - inside(c.x) * inside(c.y)).max(0) as usize
}

struct Objective<'a> {
    grid: &'a [f32],
    side: usize,
    min: f32,
    max: f32,
    best: Cell<([f64; 3], f64)>,
    evaluations: Cell<usize>,
}

impl Objective<'_> {
    fn eval(&self, p: &[f64; 3]) -> f64 {
        let value = circle_badness(self.grid, self.side, self.min, self.max, &CircleParams::from_array(*p));
        self.evaluations.set(self.evaluations.get() + 1);
        if value < self.best.get().1 {
            self.best.set((*p, value));
        }
        value
    }
}

/// Golden-section search for the minimum of `f` on `[a, b]`.
fn golden_section_minimize(f: impl Fn(f64) -> f64, mut a: f64, mut b: f64, max_evals: usize) -> (f64, f64) {
    const PHI: f64 = 1.618_033_988_749_895;
    const RESP: f64 = 2.0 - PHI;

    let mut x1 = a + RESP * (b - a);
    let mut x2 = b - RESP * (b - a);
    let mut f1 = f(x1);
    let mut f2 = f(x2);
    let mut evals = 2;

    while evals < max_evals && (b - a).abs() > 1e-12 {
        if f1 < f2 {
            b = x2;
            x2 = x1;
            f2 = f1;
            x1 = a + RESP * (b - a);
            f1 = f(x1);
        } else {
            a = x1;
            x1 = x2;
            f1 = f2;
            x2 = b - RESP * (b - a);
            f2 = f(x2);
        }
        evals += 1;
    }

    if f1 < f2 {
        (x1, f1)
    } else {
        (x2, f2)
    }
}

fn offset(x: &[f64; 3], d: &[f64; 3], t: f64, upper: f64) -> [f64; 3] {
    [
        (x[0] + t * d[0]).clamp(0.0, upper),
        (x[1] + t * d[1]).clamp(0.0, upper),
        (x[2] + t * d[2]).clamp(0.0, upper),
    ]
}

/// Bounded line search along `d` within `[-step, step]`: coarse scan, then a
/// golden-section polish around the best scan sample. Never returns a point
/// worse than `x`.
fn line_minimize(obj: &Objective, x: &[f64; 3], fx: f64, d: &[f64; 3], step: f64) -> ([f64; 3], f64) {
    let upper = obj.side as f64;
    let (mut lo, mut hi) = (-step, step);
    for k in 0..3 {
        if d[k].abs() > 1e-12 {
            let t0 = -x[k] / d[k];
            let t1 = (upper - x[k]) / d[k];
            lo = lo.max(t0.min(t1));
            hi = hi.min(t0.max(t1));
        }
    }
    if hi - lo <= 1e-12 {
        return (*x, fx);
    }

    let mut best_t = 0.0;
    let mut best_f = fx;
    let h = (hi - lo) / SCAN_SAMPLES as f64;
    for s in 0..=SCAN_SAMPLES {
        let t = lo + h * s as f64;
        let fv = obj.eval(&offset(x, d, t, upper));
        if fv < best_f {
            best_t = t;
            best_f = fv;
        }
    }

    let a = (best_t - h).max(lo);
    let b = (best_t + h).min(hi);
    let (t, fv) = golden_section_minimize(|t| obj.eval(&offset(x, d, t, upper)), a, b, GOLDEN_EVALS);
    if fv < best_f {
        best_t = t;
        best_f = fv;
    }

    if best_f < fx {
        (offset(x, d, best_t, upper), best_f)
    } else {
        (*x, fx)
    }
}

fn axes() -> Vec<[f64; 3]> {
    vec![[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]]
}

/// Fits a circle to a `side` × `side` grid starting from `start`.
pub fn optimize(grid: &[f32], side: usize, start: CircleParams) -> Result<FitResult, OptimizerError> {
    optimize_with(grid, side, start, &SearchSettings::for_side(side))
}

/// Powell-style conjugate direction search over `(x, y, r)`, each bounded to
/// `[0, side]`. Returns the best parameters evaluated during the search.
pub fn optimize_with(
    grid: &[f32],
    side: usize,
    start: CircleParams,
    settings: &SearchSettings,
) -> Result<FitResult, OptimizerError> {
    if side == 0 || grid.len() < side * side {
        return Err(OptimizerError::EmptyGrid);
    }

    let (min, max) = grid[..side * side]
        .iter()
        .fold((f32::MAX, f32::MIN), |(lo, hi), &v| (lo.min(v), hi.max(v)));

    let bound = side as f64;
    let mut x = start.to_array().map(|v| v.clamp(0.0, bound));

    let obj = Objective {
        grid,
        side,
        min,
        max,
        best: Cell::new((x, f64::INFINITY)),
        evaluations: Cell::new(0),
    };

    let mut fx = obj.eval(&x);
    if !fx.is_finite() {
        return Err(OptimizerError::NonFinite { value: fx });
    }

    let mut dirs = axes();
    let mut step = settings.initial_step;
    let mut converged = false;

    for _ in 0..settings.max_iterations {
        let x_start = x;
        let f_start = fx;
        let mut largest_drop = (0usize, 0.0f64);

        for (k, d) in dirs.iter().enumerate() {
            let (nx, nf) = line_minimize(&obj, &x, fx, d, step);
            if fx - nf > largest_drop.1 {
                largest_drop = (k, fx - nf);
            }
            x = nx;
            fx = nf;
        }

        if f_start - fx <= settings.f_tolerance * (f_start.abs() + settings.f_tolerance) {
            step *= 0.5;
            if step < settings.x_tolerance {
                converged = true;
                break;
            }
            dirs = axes();
            continue;
        }

        let moved = [x[0] - x_start[0], x[1] - x_start[1], x[2] - x_start[2]];
        let len = (moved[0] * moved[0] + moved[1] * moved[1] + moved[2] * moved[2]).sqrt();
        if len > 1e-12 {
            let d = moved.map(|m| m / len);
            let (nx, nf) = line_minimize(&obj, &x, fx, &d, step);
            x = nx;
            fx = nf;
            dirs.remove(largest_drop.0);
            dirs.push(d);
        }
    }

    if !converged {
        return Err(OptimizerError::NotConverged {
            iterations: settings.max_iterations,
        });
    }

    let (best, score) = obj.best.get();
    if !score.is_finite() {
        return Err(OptimizerError::NonFinite { value: score });
    }

    Ok(FitResult {
        center_x: best[0],
        center_y: best[1],
        radius: best[2],
        score,
        min_value: min,
        max_value: max,
        evaluations: obj.evaluations.get(),
    })
}
