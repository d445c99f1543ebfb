//! Candidate trend models for the forecast panel.
//!
//! Each model is a variant behind the same two traits: `TrendModel::fit`
//! produces a `FittedTrendModel` that can be evaluated at any position, and
//! the engine derives RMSE/R2 and projections from that evaluation. Adding a
//! model means registering another variant in `default_panel`.
//!
//! Positions are sample ordinals (0, 1, 2, ...); the engine owns that
//! convention.

use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("{0}")]
pub struct FitError(pub String);

pub trait TrendModel: Send + Sync {
    fn name(&self) -> &'static str;

    /// Smallest series this model accepts; below it the candidate is skipped.
    fn min_samples(&self) -> usize {
        2
    }

    fn fit(&self, xs: &[f64], ys: &[f64]) -> Result<Box<dyn FittedTrendModel>, FitError>;
}

pub trait FittedTrendModel: Send + Sync {
    fn predict(&self, x: f64) -> f64;
    fn equation(&self) -> String;
}

/// Registration order doubles as the RMSE tie-break order.
pub fn default_panel() -> Vec<Box<dyn TrendModel>> {
    vec![
        Box::new(LinearTrend),
        Box::new(QuadraticTrend),
        Box::new(BaggedTreeTrend::default()),
        Box::new(DampedTrendSmoothing::default()),
    ]
}

/// Ordinary least squares: `Some((intercept, slope))`, or `None` when the
/// independent axis has no variance. Shared with the correlation engine's
/// regression line.
pub fn least_squares_line(xs: &[f64], ys: &[f64]) -> Option<(f64, f64)> {
    if xs.len() < 2 || xs.len() != ys.len() {
        return None;
    }
    let n = xs.len() as f64;
    let sx: f64 = xs.iter().sum();
    let sy: f64 = ys.iter().sum();
    let sxx: f64 = xs.iter().map(|x| x * x).sum();
    let sxy: f64 = xs.iter().zip(ys).map(|(x, y)| x * y).sum();

    let denom = n * sxx - sx * sx;
    if denom.abs() < f64::EPSILON {
        return None;
    }
    let slope = (n * sxy - sx * sy) / denom;
    let intercept = (sy - slope * sx) / n;
    Some((intercept, slope))
}

/// Widen a degenerate range by one unit on each side so downstream division
/// by the span can never hit zero.
pub fn widened_range(min: f64, max: f64) -> (f64, f64) {
    if min == max {
        (min - 1.0, max + 1.0)
    } else {
        (min, max)
    }
}

// --- Linear ---------------------------------------------------------------

pub struct LinearTrend;

struct FittedLine {
    intercept: f64,
    slope: f64,
}

impl TrendModel for LinearTrend {
    fn name(&self) -> &'static str {
        "linear regression"
    }

    fn fit(&self, xs: &[f64], ys: &[f64]) -> Result<Box<dyn FittedTrendModel>, FitError> {
        let (intercept, slope) = least_squares_line(xs, ys)
            .ok_or_else(|| FitError("degenerate independent axis".to_string()))?;
        Ok(Box::new(FittedLine { intercept, slope }))
    }
}

impl FittedTrendModel for FittedLine {
    fn predict(&self, x: f64) -> f64 {
        self.intercept + self.slope * x
    }

    fn equation(&self) -> String {
        format!("y = {:.4} + {:.4}x", self.intercept, self.slope)
    }
}

// --- Quadratic ------------------------------------------------------------

pub struct QuadraticTrend;

struct FittedParabola {
    coefficients: [f64; 3],
}

impl TrendModel for QuadraticTrend {
    fn name(&self) -> &'static str {
        "polynomial regression (degree 2)"
    }

    fn min_samples(&self) -> usize {
        3
    }

    fn fit(&self, xs: &[f64], ys: &[f64]) -> Result<Box<dyn FittedTrendModel>, FitError> {
        if xs.len() < 3 || xs.len() != ys.len() {
            return Err(FitError("need at least 3 samples".to_string()));
        }

        // Normal equations for y = a + bx + cx^2.
        let n = xs.len() as f64;
        let sx: f64 = xs.iter().sum();
        let sx2: f64 = xs.iter().map(|x| x.powi(2)).sum();
        let sx3: f64 = xs.iter().map(|x| x.powi(3)).sum();
        let sx4: f64 = xs.iter().map(|x| x.powi(4)).sum();
        let sy: f64 = ys.iter().sum();
        let sxy: f64 = xs.iter().zip(ys).map(|(x, y)| x * y).sum();
        let sx2y: f64 = xs.iter().zip(ys).map(|(x, y)| x * x * y).sum();

        let coefficients = solve_3x3(
            [[n, sx, sx2], [sx, sx2, sx3], [sx2, sx3, sx4]],
            [sy, sxy, sx2y],
        )
        .ok_or_else(|| FitError("singular normal equations".to_string()))?;

        Ok(Box::new(FittedParabola { coefficients }))
    }
}

impl FittedTrendModel for FittedParabola {
    fn predict(&self, x: f64) -> f64 {
        let [a, b, c] = self.coefficients;
        a + b * x + c * x * x
    }

    fn equation(&self) -> String {
        let [a, b, c] = self.coefficients;
        format!("y = {:.4} + {:.4}x + {:.4}x\u{b2}", a, b, c)
    }
}

/// Gaussian elimination with partial pivoting; `None` for singular systems.
fn solve_3x3(matrix: [[f64; 3]; 3], rhs: [f64; 3]) -> Option<[f64; 3]> {
    let mut a = [[0.0; 4]; 3];
    for (i, row) in matrix.iter().enumerate() {
        a[i][..3].copy_from_slice(row);
        a[i][3] = rhs[i];
    }

    for col in 0..3 {
        let pivot = (col..3).max_by(|&i, &j| {
            a[i][col]
                .abs()
                .partial_cmp(&a[j][col].abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        })?;
        if a[pivot][col].abs() < 1e-12 {
            return None;
        }
        a.swap(col, pivot);

        for row in (col + 1)..3 {
            let factor = a[row][col] / a[col][col];
            for k in col..4 {
                a[row][k] -= factor * a[col][k];
            }
        }
    }

    let mut x = [0.0; 3];
    for row in (0..3).rev() {
        let mut sum = a[row][3];
        for k in (row + 1)..3 {
            sum -= a[row][k] * x[k];
        }
        x[row] = sum / a[row][row];
    }
    Some(x)
}

// --- Bagged regression trees ----------------------------------------------

/// Bootstrap-aggregated regression trees over the position axis. Robust to
/// irregular, non-monotonic series where the parametric candidates struggle.
/// The PCG seed is fixed so a given series always produces the same fit.
pub struct BaggedTreeTrend {
    pub trees: usize,
    pub max_depth: usize,
    pub min_leaf: usize,
    pub seed: u64,
}

impl Default for BaggedTreeTrend {
    fn default() -> Self {
        Self {
            trees: 25,
            max_depth: 3,
            min_leaf: 2,
            seed: 0x5eed,
        }
    }
}

enum TreeNode {
    Leaf(f64),
    Split {
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
    },
}

impl TreeNode {
    fn predict(&self, x: f64) -> f64 {
        match self {
            TreeNode::Leaf(value) => *value,
            TreeNode::Split {
                threshold,
                left,
                right,
            } => {
                if x < *threshold {
                    left.predict(x)
                } else {
                    right.predict(x)
                }
            }
        }
    }
}

struct FittedForest {
    trees: Vec<TreeNode>,
    size: usize,
    max_depth: usize,
}

impl TrendModel for BaggedTreeTrend {
    fn name(&self) -> &'static str {
        "bagged regression trees"
    }

    fn fit(&self, xs: &[f64], ys: &[f64]) -> Result<Box<dyn FittedTrendModel>, FitError> {
        if xs.len() < 2 || xs.len() != ys.len() {
            return Err(FitError("need at least 2 samples".to_string()));
        }

        let mut rng = Pcg64::seed_from_u64(self.seed);
        let n = xs.len();
        let mut trees = Vec::with_capacity(self.trees);
        for _ in 0..self.trees {
            let mut sample: Vec<(f64, f64)> =
                (0..n).map(|_| rng.gen_range(0..n)).map(|i| (xs[i], ys[i])).collect();
            sample.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
            trees.push(grow_tree(&sample, self.max_depth, self.min_leaf));
        }

        Ok(Box::new(FittedForest {
            trees,
            size: self.trees,
            max_depth: self.max_depth,
        }))
    }
}

impl FittedTrendModel for FittedForest {
    fn predict(&self, x: f64) -> f64 {
        let sum: f64 = self.trees.iter().map(|t| t.predict(x)).sum();
        sum / self.trees.len() as f64
    }

    fn equation(&self) -> String {
        format!(
            "ensemble of {} bootstrap trees, depth <= {}",
            self.size, self.max_depth
        )
    }
}

fn mean(values: impl Iterator<Item = f64>, count: usize) -> f64 {
    if count == 0 {
        0.0
    } else {
        values.sum::<f64>() / count as f64
    }
}

/// Recursive binary splitting on sorted `(x, y)` points, minimizing the sum
/// of squared errors of the two sides.
fn grow_tree(points: &[(f64, f64)], depth: usize, min_leaf: usize) -> TreeNode {
    let leaf = TreeNode::Leaf(mean(points.iter().map(|p| p.1), points.len()));
    if depth == 0 || points.len() < 2 * min_leaf {
        return leaf;
    }

    let sse = |side: &[(f64, f64)]| -> f64 {
        let m = mean(side.iter().map(|p| p.1), side.len());
        side.iter().map(|p| (p.1 - m).powi(2)).sum()
    };

    let mut best: Option<(f64, usize, f64)> = None;
    for split_at in min_leaf..=(points.len() - min_leaf) {
        if points[split_at - 1].0 == points[split_at].0 {
            continue;
        }
        let threshold = (points[split_at - 1].0 + points[split_at].0) / 2.0;
        let cost = sse(&points[..split_at]) + sse(&points[split_at..]);
        if best.map_or(true, |(_, _, c)| cost < c) {
            best = Some((threshold, split_at, cost));
        }
    }

    match best {
        Some((threshold, split_at, _)) => TreeNode::Split {
            threshold,
            left: Box::new(grow_tree(&points[..split_at], depth - 1, min_leaf)),
            right: Box::new(grow_tree(&points[split_at..], depth - 1, min_leaf)),
        },
        None => leaf,
    }
}

// --- Damped additive-trend exponential smoothing --------------------------

/// Holt's linear method with a damping factor on the trend. Only attempted
/// with at least 4 points; any non-finite state during the recurrence aborts
/// the fit so the engine skips the candidate instead of failing the request.
pub struct DampedTrendSmoothing {
    pub alpha: f64,
    pub beta: f64,
    pub phi: f64,
}

impl Default for DampedTrendSmoothing {
    fn default() -> Self {
        Self {
            alpha: 0.8,
            beta: 0.2,
            phi: 0.9,
        }
    }
}

struct FittedDampedTrend {
    fitted: Vec<f64>,
    level: f64,
    trend: f64,
    phi: f64,
    last_x: f64,
    alpha: f64,
    beta: f64,
}

impl TrendModel for DampedTrendSmoothing {
    fn name(&self) -> &'static str {
        "damped trend smoothing"
    }

    fn min_samples(&self) -> usize {
        4
    }

    fn fit(&self, xs: &[f64], ys: &[f64]) -> Result<Box<dyn FittedTrendModel>, FitError> {
        if ys.len() < self.min_samples() || xs.len() != ys.len() {
            return Err(FitError("need at least 4 samples".to_string()));
        }

        let mut level = ys[0];
        let mut trend = ys[1] - ys[0];
        let mut fitted = Vec::with_capacity(ys.len());
        fitted.push(ys[0]);

        for &y in &ys[1..] {
            let prev_level = level;
            let one_step = level + self.phi * trend;
            fitted.push(one_step);
            level = self.alpha * y + (1.0 - self.alpha) * one_step;
            trend = self.beta * (level - prev_level) + (1.0 - self.beta) * self.phi * trend;
            if !level.is_finite() || !trend.is_finite() {
                return Err(FitError("smoothing state diverged".to_string()));
            }
        }

        Ok(Box::new(FittedDampedTrend {
            fitted,
            level,
            trend,
            phi: self.phi,
            last_x: xs[xs.len() - 1],
            alpha: self.alpha,
            beta: self.beta,
        }))
    }
}

impl FittedTrendModel for FittedDampedTrend {
    fn predict(&self, x: f64) -> f64 {
        let h = x - self.last_x;
        if h <= 0.0 {
            // In-sample: one-step-ahead fitted value at that ordinal.
            let idx = x.round().max(0.0) as usize;
            self.fitted[idx.min(self.fitted.len() - 1)]
        } else {
            let steps = h.round() as i32;
            let damp: f64 = (1..=steps).map(|i| self.phi.powi(i)).sum();
            self.level + damp * self.trend
        }
    }

    fn equation(&self) -> String {
        format!(
            "damped Holt (alpha={}, beta={}, phi={})",
            self.alpha, self.beta, self.phi
        )
    }
}
