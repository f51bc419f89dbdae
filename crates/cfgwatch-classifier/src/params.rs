//! Plain-data model parameters.
//!
//! Weight matrices are row-major `[out_features][in_features]` and a layer
//! computes `y = W x + b`. This is the layout of candle's `Linear`, so the
//! same matrices feed training and the dependency-free forward pass in
//! [`crate::inference`] without transposition.

use cfgwatch_core::{CfgWatchError, Result};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Input/output widths of the multi-expert classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelDims {
    pub text_dim: usize,
    pub struct_dim: usize,
    pub diff_dim: usize,
    pub hidden_dim: usize,
    pub num_classes: usize,
}

impl ModelDims {
    /// Width of the concatenated expert outputs fed to the fusion layer.
    pub fn fused_dim(&self) -> usize {
        3 * self.hidden_dim
    }

    /// Total number of scalar parameters.
    pub fn parameter_count(&self) -> usize {
        let h = self.hidden_dim;
        let expert = |input: usize| input * h + h + h * h + h;
        expert(self.text_dim)
            + expert(self.struct_dim)
            + expert(self.diff_dim)
            + self.fused_dim() * self.num_classes
            + self.num_classes
    }
}

/// One fully connected layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearParams {
    pub weight: Vec<Vec<f32>>,
    pub bias: Vec<f32>,
}

impl LinearParams {
    /// Uniform `±1/sqrt(in_dim)` initialization for weights and biases.
    fn init(in_dim: usize, out_dim: usize, rng: &mut ChaCha8Rng) -> Self {
        let bound = if in_dim == 0 {
            0.0
        } else {
            1.0 / (in_dim as f32).sqrt()
        };
        let mut sample = || (rng.gen::<f32>() * 2.0 - 1.0) * bound;
        let weight: Vec<Vec<f32>> = (0..out_dim)
            .map(|_| (0..in_dim).map(|_| sample()).collect::<Vec<f32>>())
            .collect();
        let bias: Vec<f32> = (0..out_dim).map(|_| sample()).collect();
        Self { weight, bias }
    }

    fn check(&self, name: &str, in_dim: usize, out_dim: usize) -> Result<()> {
        check_matrix(name, &self.weight, &self.bias, in_dim, out_dim)
    }

    /// `W x + b`.
    pub fn apply(&self, input: &[f32]) -> Vec<f32> {
        affine(&self.weight, &self.bias, input)
    }
}

/// Two-layer projection of one feature view (`Linear -> ReLU -> Linear`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpertParams {
    pub l1_weight: Vec<Vec<f32>>,
    pub l1_bias: Vec<f32>,
    pub l2_weight: Vec<Vec<f32>>,
    pub l2_bias: Vec<f32>,
}

impl ExpertParams {
    fn init(in_dim: usize, hidden_dim: usize, rng: &mut ChaCha8Rng) -> Self {
        let l1 = LinearParams::init(in_dim, hidden_dim, rng);
        let l2 = LinearParams::init(hidden_dim, hidden_dim, rng);
        Self::from_layers(l1, l2)
    }

    pub fn from_layers(l1: LinearParams, l2: LinearParams) -> Self {
        Self {
            l1_weight: l1.weight,
            l1_bias: l1.bias,
            l2_weight: l2.weight,
            l2_bias: l2.bias,
        }
    }

    fn check(&self, name: &str, in_dim: usize, hidden_dim: usize) -> Result<()> {
        check_matrix(
            &format!("{name}.l1"),
            &self.l1_weight,
            &self.l1_bias,
            in_dim,
            hidden_dim,
        )?;
        check_matrix(
            &format!("{name}.l2"),
            &self.l2_weight,
            &self.l2_bias,
            hidden_dim,
            hidden_dim,
        )
    }

    /// Expert forward pass.
    pub fn apply(&self, input: &[f32]) -> Vec<f32> {
        let mut hidden = affine(&self.l1_weight, &self.l1_bias, input);
        for h in hidden.iter_mut() {
            *h = h.max(0.0);
        }
        affine(&self.l2_weight, &self.l2_bias, &hidden)
    }
}

/// All learned parameters, keyed the way the export artifact names them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelParameters {
    pub txt_mlp: ExpertParams,
    pub struct_mlp: ExpertParams,
    pub diff_mlp: ExpertParams,
    pub fc: LinearParams,
}

impl ModelParameters {
    /// Seeded initialization. The same dims and seed always give the same
    /// parameters.
    pub fn initialize(dims: &ModelDims, seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let txt_mlp = ExpertParams::init(dims.text_dim, dims.hidden_dim, &mut rng);
        let struct_mlp = ExpertParams::init(dims.struct_dim, dims.hidden_dim, &mut rng);
        let diff_mlp = ExpertParams::init(dims.diff_dim, dims.hidden_dim, &mut rng);
        let fc = LinearParams::init(dims.fused_dim(), dims.num_classes, &mut rng);
        Self {
            txt_mlp,
            struct_mlp,
            diff_mlp,
            fc,
        }
    }

    /// Verify every matrix against `dims`.
    pub fn check_dims(&self, dims: &ModelDims) -> Result<()> {
        self.txt_mlp.check("txt_mlp", dims.text_dim, dims.hidden_dim)?;
        self.struct_mlp
            .check("struct_mlp", dims.struct_dim, dims.hidden_dim)?;
        self.diff_mlp.check("diff_mlp", dims.diff_dim, dims.hidden_dim)?;
        self.fc.check("fc", dims.fused_dim(), dims.num_classes)
    }

    /// Fused logits for one sample.
    pub fn logits(&self, text: &[f32], structure: &[f32], diff: &[f32]) -> Vec<f32> {
        let mut fused = self.txt_mlp.apply(text);
        fused.extend(self.struct_mlp.apply(structure));
        fused.extend(self.diff_mlp.apply(diff));
        self.fc.apply(&fused)
    }
}

fn check_matrix(
    name: &str,
    weight: &[Vec<f32>],
    bias: &[f32],
    in_dim: usize,
    out_dim: usize,
) -> Result<()> {
    if weight.len() != out_dim {
        return Err(CfgWatchError::Model(format!(
            "{name}: expected {out_dim} weight rows, found {}",
            weight.len()
        )));
    }
    if let Some((row, w)) = weight.iter().enumerate().find(|(_, w)| w.len() != in_dim) {
        return Err(CfgWatchError::Model(format!(
            "{name}: weight row {row} has {} columns, expected {in_dim}",
            w.len()
        )));
    }
    if bias.len() != out_dim {
        return Err(CfgWatchError::Model(format!(
            "{name}: expected {out_dim} bias values, found {}",
            bias.len()
        )));
    }
    Ok(())
}

fn affine(weight: &[Vec<f32>], bias: &[f32], input: &[f32]) -> Vec<f32> {
    weight
        .iter()
        .zip(bias)
        .map(|(row, b)| b + row.iter().zip(input).map(|(w, x)| w * x).sum::<f32>())
        .collect()
}

/// Numerically stable softmax.
pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|&l| (l - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dims() -> ModelDims {
        ModelDims {
            text_dim: 5,
            struct_dim: 3,
            diff_dim: 200,
            hidden_dim: 8,
            num_classes: 2,
        }
    }

    #[test]
    fn test_initialize_shapes() {
        let params = ModelParameters::initialize(&dims(), 7);
        assert!(params.check_dims(&dims()).is_ok());
        assert_eq!(params.txt_mlp.l1_weight.len(), 8);
        assert_eq!(params.txt_mlp.l1_weight[0].len(), 5);
        assert_eq!(params.fc.weight.len(), 2);
        assert_eq!(params.fc.weight[0].len(), 24);
    }

    #[test]
    fn test_initialize_is_seeded() {
        let a = ModelParameters::initialize(&dims(), 42);
        let b = ModelParameters::initialize(&dims(), 42);
        let c = ModelParameters::initialize(&dims(), 43);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_initialize_within_bounds() {
        let params = ModelParameters::initialize(&dims(), 1);
        let bound = 1.0 / (200.0_f32).sqrt();
        assert!(params
            .diff_mlp
            .l1_weight
            .iter()
            .flatten()
            .all(|w| w.abs() <= bound));
    }

    #[test]
    fn test_zero_width_input() {
        let mut d = dims();
        d.struct_dim = 0;
        d.num_classes = 0;
        let params = ModelParameters::initialize(&d, 1);
        assert!(params.check_dims(&d).is_ok());
        assert!(params.struct_mlp.l1_weight.iter().all(Vec::is_empty));
        assert!(params.logits(&[0.0; 5], &[], &[0.0; 200]).is_empty());
    }

    #[test]
    fn test_check_dims_detects_transpose() {
        let params = ModelParameters::initialize(&dims(), 3);
        let mut wrong = dims();
        wrong.text_dim = 8;
        assert!(matches!(
            params.check_dims(&wrong),
            Err(CfgWatchError::Model(_))
        ));
    }

    #[test]
    fn test_linear_apply_row_major() {
        let layer = LinearParams {
            weight: vec![vec![1.0, 2.0], vec![0.0, -1.0], vec![3.0, 0.0]],
            bias: vec![0.5, 0.0, -1.0],
        };
        assert_eq!(layer.apply(&[1.0, 1.0]), vec![3.5, -1.0, 2.0]);
    }

    #[test]
    fn test_expert_applies_relu_between_layers() {
        let expert = ExpertParams {
            l1_weight: vec![vec![1.0], vec![-1.0]],
            l1_bias: vec![0.0, 0.0],
            l2_weight: vec![vec![1.0, 1.0], vec![1.0, 0.0]],
            l2_bias: vec![0.0, 0.0],
        };
        // l1 -> [2, -2], relu -> [2, 0], l2 -> [2, 2]
        assert_eq!(expert.apply(&[2.0]), vec![2.0, 2.0]);
    }

    #[test]
    fn test_softmax() {
        let p = softmax(&[1.0, 1.0]);
        assert!((p[0] - 0.5).abs() < 1e-6);
        let p = softmax(&[1000.0, 0.0]);
        assert!((p[0] - 1.0).abs() < 1e-6);
        assert!(softmax(&[]).is_empty());
    }

    #[test]
    fn test_parameter_count() {
        let d = ModelDims {
            text_dim: 1,
            struct_dim: 1,
            diff_dim: 1,
            hidden_dim: 1,
            num_classes: 1,
        };
        // each expert: 1+1+1+1 = 4; fc: 3+1
        assert_eq!(d.parameter_count(), 16);
    }
}
