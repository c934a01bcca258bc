//! Linear Regression Family
//!
//! Ordinary least squares, ridge (L2), and lasso (L1 via cyclic coordinate
//! descent). OLS and ridge solve the normal equations directly; the intercept
//! is never penalized.

use anyhow::{bail, Result};
use ndarray::{ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

/// Solve a dense linear system with Gaussian elimination and partial pivoting
fn solve_linear_system(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Result<Vec<f64>> {
    let n = b.len();
    for col in 0..n {
        // Pivot: largest absolute value in the column
        let mut pivot = col;
        for row in col + 1..n {
            if a[row][col].abs() > a[pivot][col].abs() {
                pivot = row;
            }
        }
        if a[pivot][col].abs() < 1e-12 {
            bail!("Singular normal equations");
        }
        a.swap(col, pivot);
        b.swap(col, pivot);

        for row in col + 1..n {
            let factor = a[row][col] / a[col][col];
            for k in col..n {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = vec![0.0; n];
    for col in (0..n).rev() {
        let mut sum = b[col];
        for k in col + 1..n {
            sum -= a[col][k] * x[k];
        }
        x[col] = sum / a[col][col];
    }
    Ok(x)
}

/// Build the normal equations XᵀX (with bias column) and Xᵀy,
/// adding `alpha` on the diagonal of every non-bias coefficient
fn normal_equations(
    x: ArrayView2<f64>,
    y: ArrayView1<f64>,
    alpha: f64,
) -> (Vec<Vec<f64>>, Vec<f64>) {
    let n = x.nrows();
    let d = x.ncols() + 1; // bias at index 0
    let mut xtx = vec![vec![0.0; d]; d];
    let mut xty = vec![0.0; d];

    for row in 0..n {
        for i in 0..d {
            let xi = if i == 0 { 1.0 } else { x[[row, i - 1]] };
            xty[i] += xi * y[row];
            for j in i..d {
                let xj = if j == 0 { 1.0 } else { x[[row, j - 1]] };
                xtx[i][j] += xi * xj;
            }
        }
    }
    // Mirror the upper triangle
    for i in 0..d {
        for j in 0..i {
            xtx[i][j] = xtx[j][i];
        }
    }
    for i in 1..d {
        xtx[i][i] += alpha;
    }
    (xtx, xty)
}

fn predict_with(coefficients: &[f64], intercept: f64, features: &[f64]) -> f64 {
    intercept
        + coefficients
            .iter()
            .zip(features)
            .map(|(c, f)| c * f)
            .sum::<f64>()
}

/// Ordinary least squares regression
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LinearRegression {
    coefficients: Option<Vec<f64>>,
    intercept: f64,
}

impl LinearRegression {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fit(&mut self, x: ArrayView2<f64>, y: ArrayView1<f64>) -> Result<()> {
        if x.nrows() == 0 {
            bail!("Cannot fit linear regression on an empty dataset");
        }
        // Tiny diagonal damping keeps the system solvable when columns are
        // constant (zero after standardization)
        let (xtx, xty) = normal_equations(x, y, 1e-8);
        let beta = solve_linear_system(xtx, xty)?;
        self.intercept = beta[0];
        self.coefficients = Some(beta[1..].to_vec());
        Ok(())
    }

    pub fn predict(&self, features: &[f64]) -> Result<f64> {
        match &self.coefficients {
            Some(coefs) => Ok(predict_with(coefs, self.intercept, features)),
            None => bail!("Linear regression is not fitted"),
        }
    }
}

/// L2-regularized regression
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RidgeRegression {
    pub alpha: f64,
    coefficients: Option<Vec<f64>>,
    intercept: f64,
}

impl RidgeRegression {
    pub fn new(alpha: f64) -> Self {
        RidgeRegression {
            alpha,
            coefficients: None,
            intercept: 0.0,
        }
    }

    pub fn fit(&mut self, x: ArrayView2<f64>, y: ArrayView1<f64>) -> Result<()> {
        if x.nrows() == 0 {
            bail!("Cannot fit ridge regression on an empty dataset");
        }
        if self.alpha < 0.0 {
            bail!("Ridge alpha must be non-negative, got {}", self.alpha);
        }
        let (xtx, xty) = normal_equations(x, y, self.alpha);
        let beta = solve_linear_system(xtx, xty)?;
        self.intercept = beta[0];
        self.coefficients = Some(beta[1..].to_vec());
        Ok(())
    }

    pub fn predict(&self, features: &[f64]) -> Result<f64> {
        match &self.coefficients {
            Some(coefs) => Ok(predict_with(coefs, self.intercept, features)),
            None => bail!("Ridge regression is not fitted"),
        }
    }
}

/// L1-regularized regression via cyclic coordinate descent.
///
/// Objective matches the common 1/(2n)·RSS + α·|β|₁ parameterization, so the
/// soft threshold applies α directly to the per-coordinate correlation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LassoRegression {
    pub alpha: f64,
    pub max_iter: usize,
    pub tol: f64,
    coefficients: Option<Vec<f64>>,
    intercept: f64,
}

impl LassoRegression {
    pub fn new(alpha: f64) -> Self {
        LassoRegression {
            alpha,
            max_iter: 1000,
            tol: 1e-6,
            coefficients: None,
            intercept: 0.0,
        }
    }

    pub fn fit(&mut self, x: ArrayView2<f64>, y: ArrayView1<f64>) -> Result<()> {
        let n = x.nrows();
        let d = x.ncols();
        if n == 0 {
            bail!("Cannot fit lasso regression on an empty dataset");
        }
        if self.alpha < 0.0 {
            bail!("Lasso alpha must be non-negative, got {}", self.alpha);
        }

        let n_f = n as f64;
        let mut beta = vec![0.0; d];
        let mut intercept = y.iter().sum::<f64>() / n_f;

        // Per-coordinate squared column norms, scaled by n
        let mut z = vec![0.0; d];
        for j in 0..d {
            for i in 0..n {
                z[j] += x[[i, j]] * x[[i, j]];
            }
            z[j] /= n_f;
        }

        // Residuals track y - intercept - Xβ so each update is O(n)
        let mut residual: Vec<f64> = (0..n).map(|i| y[i] - intercept).collect();

        for _ in 0..self.max_iter {
            let mut max_delta: f64 = 0.0;

            for j in 0..d {
                if z[j] == 0.0 {
                    continue;
                }
                let old = beta[j];
                let mut rho = 0.0;
                for i in 0..n {
                    rho += x[[i, j]] * (residual[i] + old * x[[i, j]]);
                }
                rho /= n_f;

                let new = soft_threshold(rho, self.alpha) / z[j];
                if new != old {
                    let delta = new - old;
                    for i in 0..n {
                        residual[i] -= delta * x[[i, j]];
                    }
                    beta[j] = new;
                    max_delta = max_delta.max(delta.abs());
                }
            }

            // Re-center the intercept against the current residual
            let shift = residual.iter().sum::<f64>() / n_f;
            if shift != 0.0 {
                intercept += shift;
                for r in residual.iter_mut() {
                    *r -= shift;
                }
                max_delta = max_delta.max(shift.abs());
            }

            if max_delta < self.tol {
                break;
            }
        }

        self.intercept = intercept;
        self.coefficients = Some(beta);
        Ok(())
    }

    pub fn predict(&self, features: &[f64]) -> Result<f64> {
        match &self.coefficients {
            Some(coefs) => Ok(predict_with(coefs, self.intercept, features)),
            None => bail!("Lasso regression is not fitted"),
        }
    }
}

fn soft_threshold(value: f64, threshold: f64) -> f64 {
    if value > threshold {
        value - threshold
    } else if value < -threshold {
        value + threshold
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::{array, Array2};

    fn line_data() -> (Array2<f64>, ndarray::Array1<f64>) {
        // y = 2x + 1
        let x = array![[0.0], [1.0], [2.0], [3.0], [4.0]];
        let y = array![1.0, 3.0, 5.0, 7.0, 9.0];
        (x, y)
    }

    #[test]
    fn test_linear_recovers_line() {
        let (x, y) = line_data();
        let mut model = LinearRegression::new();
        model.fit(x.view(), y.view()).unwrap();
        assert_relative_eq!(model.predict(&[5.0]).unwrap(), 11.0, epsilon = 1e-8);
    }

    #[test]
    fn test_ridge_shrinks_towards_zero() {
        let (x, y) = line_data();
        let mut plain = RidgeRegression::new(0.0);
        let mut heavy = RidgeRegression::new(100.0);
        plain.fit(x.view(), y.view()).unwrap();
        heavy.fit(x.view(), y.view()).unwrap();

        let plain_slope = plain.coefficients.as_ref().unwrap()[0];
        let heavy_slope = heavy.coefficients.as_ref().unwrap()[0];
        assert!(heavy_slope.abs() < plain_slope.abs());
    }

    #[test]
    fn test_lasso_zeroes_irrelevant_feature() {
        // Second feature is pure noise around zero signal
        let x = array![
            [0.0, 0.3],
            [1.0, -0.2],
            [2.0, 0.1],
            [3.0, -0.3],
            [4.0, 0.2],
            [5.0, -0.1]
        ];
        let y = array![1.0, 3.0, 5.0, 7.0, 9.0, 11.0];
        let mut model = LassoRegression::new(0.5);
        model.fit(x.view(), y.view()).unwrap();
        let coefs = model.coefficients.as_ref().unwrap();
        assert!(coefs[0] > 1.0);
        assert!(coefs[1].abs() < 0.1);
    }

    #[test]
    fn test_unfitted_predict_errors() {
        let model = LinearRegression::new();
        assert!(model.predict(&[1.0]).is_err());
    }

    #[test]
    fn test_negative_alpha_rejected() {
        let (x, y) = line_data();
        let mut model = LassoRegression::new(-1.0);
        assert!(model.fit(x.view(), y.view()).is_err());
    }
}
