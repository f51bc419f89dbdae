//! Multi-expert classifier for configuration changes.
//!
//! Each feature view gets its own two-layer perceptron. The three expert
//! outputs are concatenated (text, struct, diff) and a single linear layer
//! produces one logit per label. Fusion happens once, at the hidden
//! representation, not by averaging per-expert predictions.
//!
//! # Architecture
//!
//! ```text
//! text   [T] → Linear(H) → ReLU → Linear(H) ┐
//! struct [S] → Linear(H) → ReLU → Linear(H) ├→ concat [3H] → Linear(C)
//! diff [200] → Linear(H) → ReLU → Linear(H) ┘
//! ```

use candle_core::{DType, Device, Tensor, D};
use candle_nn::{Init, Linear, Module, VarBuilder, VarMap};
use cfgwatch_core::{CfgWatchError, Result};

use crate::params::{ExpertParams, LinearParams, ModelDims, ModelParameters};

/// Default width each expert projects into.
pub const DEFAULT_HIDDEN_DIM: usize = 128;

fn model_err(context: &'static str) -> impl Fn(candle_core::Error) -> CfgWatchError {
    move |e| CfgWatchError::Model(format!("{context}: {e}"))
}

/// `Linear → ReLU → Linear` over one feature view.
struct Expert {
    l1: Linear,
    l2: Linear,
}

impl Expert {
    fn forward(&self, input: &Tensor) -> candle_core::Result<Tensor> {
        let pre = match (input.dim(D::Minus1)?, self.l1.bias()) {
            // An empty view contributes only the l1 bias.
            (0, Some(bias)) => bias
                .unsqueeze(0)?
                .broadcast_as((input.dim(0)?, bias.dim(0)?))?,
            _ => self.l1.forward(input)?,
        };
        self.l2.forward(&pre.relu()?)
    }

    fn frozen(
        params: &ExpertParams,
        in_dim: usize,
        hidden: usize,
        device: &Device,
    ) -> Result<Self> {
        Ok(Self {
            l1: frozen_linear(&params.l1_weight, &params.l1_bias, in_dim, device)?,
            l2: frozen_linear(&params.l2_weight, &params.l2_bias, hidden, device)?,
        })
    }

    fn to_params(&self) -> Result<ExpertParams> {
        Ok(ExpertParams::from_layers(
            linear_params(&self.l1)?,
            linear_params(&self.l2)?,
        ))
    }
}

/// Three view experts fused by one linear layer.
pub struct MultiExpertClassifier {
    text: Expert,
    structure: Expert,
    diff: Expert,
    fc: Linear,
    dims: ModelDims,
    device: Device,
}

impl MultiExpertClassifier {
    /// Create a classifier whose parameters are variables in `varmap`,
    /// starting from `initial`.
    ///
    /// Variables are named `txt_mlp.l1.weight`, `struct_mlp.l2.bias`,
    /// `fc.weight`, and so on.
    pub fn new_trainable(
        varmap: &mut VarMap,
        initial: &ModelParameters,
        dims: ModelDims,
        device: &Device,
    ) -> Result<Self> {
        initial.check_dims(&dims)?;

        let (text, structure, diff, fc) = {
            let vb = VarBuilder::from_varmap(varmap, DType::F32, device);
            let h = dims.hidden_dim;
            (
                trainable_expert(vb.pp("txt_mlp"), dims.text_dim, h)?,
                trainable_expert(vb.pp("struct_mlp"), dims.struct_dim, h)?,
                trainable_expert(vb.pp("diff_mlp"), dims.diff_dim, h)?,
                zeroed_linear(dims.fused_dim(), dims.num_classes, vb.pp("fc"))
                    .map_err(model_err("Failed to create fusion layer"))?,
            )
        };

        // Overwrite the zero placeholders with the seeded parameters.
        assign_expert(varmap, "txt_mlp", &initial.txt_mlp, dims.text_dim, device)?;
        assign_expert(varmap, "struct_mlp", &initial.struct_mlp, dims.struct_dim, device)?;
        assign_expert(varmap, "diff_mlp", &initial.diff_mlp, dims.diff_dim, device)?;
        assign_linear(varmap, "fc", &initial.fc, dims.fused_dim(), device)?;

        Ok(Self {
            text,
            structure,
            diff,
            fc,
            dims,
            device: device.clone(),
        })
    }

    /// Build an inference-only classifier from exported parameters.
    pub fn from_parameters(
        params: &ModelParameters,
        dims: ModelDims,
        device: &Device,
    ) -> Result<Self> {
        params.check_dims(&dims)?;
        let h = dims.hidden_dim;
        Ok(Self {
            text: Expert::frozen(&params.txt_mlp, dims.text_dim, h, device)?,
            structure: Expert::frozen(&params.struct_mlp, dims.struct_dim, h, device)?,
            diff: Expert::frozen(&params.diff_mlp, dims.diff_dim, h, device)?,
            fc: frozen_linear(&params.fc.weight, &params.fc.bias, dims.fused_dim(), device)?,
            dims,
            device: device.clone(),
        })
    }

    /// Fused logits for a batch: inputs `[B, T]`, `[B, S]`, `[B, 200]`,
    /// output `[B, num_classes]`.
    pub fn forward_logits(
        &self,
        text: &Tensor,
        structure: &Tensor,
        diff: &Tensor,
    ) -> candle_core::Result<Tensor> {
        let t = self.text.forward(text)?;
        let s = self.structure.forward(structure)?;
        let d = self.diff.forward(diff)?;
        let fused = Tensor::cat(&[&t, &s, &d], 1)?;
        self.fc.forward(&fused)
    }

    /// Softmax probabilities for a single sample.
    pub fn predict_proba(&self, text: &[f32], structure: &[f32], diff: &[f32]) -> Result<Vec<f32>> {
        let text = row_tensor(text, self.dims.text_dim, &self.device)?;
        let structure = row_tensor(structure, self.dims.struct_dim, &self.device)?;
        let diff = row_tensor(diff, self.dims.diff_dim, &self.device)?;

        let logits = self
            .forward_logits(&text, &structure, &diff)
            .map_err(model_err("Forward pass failed"))?;
        let probs = candle_nn::ops::softmax(&logits, D::Minus1)
            .map_err(model_err("Softmax failed"))?;
        probs
            .squeeze(0)
            .and_then(|t| t.to_vec1::<f32>())
            .map_err(model_err("Failed to extract probabilities"))
    }

    /// Snapshot the current parameters in export layout.
    pub fn parameters(&self) -> Result<ModelParameters> {
        Ok(ModelParameters {
            txt_mlp: self.text.to_params()?,
            struct_mlp: self.structure.to_params()?,
            diff_mlp: self.diff.to_params()?,
            fc: linear_params(&self.fc)?,
        })
    }

    pub fn dims(&self) -> &ModelDims {
        &self.dims
    }

    /// Returns a reference to the device this classifier runs on.
    pub fn device(&self) -> &Device {
        &self.device
    }
}

fn trainable_expert(vb: VarBuilder, in_dim: usize, hidden: usize) -> Result<Expert> {
    let l1 = zeroed_linear(in_dim, hidden, vb.pp("l1"))
        .map_err(model_err("Failed to create expert l1"))?;
    let l2 = zeroed_linear(hidden, hidden, vb.pp("l2"))
        .map_err(model_err("Failed to create expert l2"))?;
    Ok(Expert { l1, l2 })
}

/// A `[out_dim, in_dim]` linear layer whose variables start at zero.
///
/// `candle_nn::linear` draws a Kaiming init, which is undefined for
/// `in_dim == 0` (an empty vocabulary). The values are placeholders for
/// `set_one` in any case.
fn zeroed_linear(in_dim: usize, out_dim: usize, vb: VarBuilder) -> candle_core::Result<Linear> {
    let weight = vb.get_with_hints((out_dim, in_dim), "weight", Init::Const(0.0))?;
    let bias = vb.get_with_hints(out_dim, "bias", Init::Const(0.0))?;
    Ok(Linear::new(weight, Some(bias)))
}

fn assign_expert(
    varmap: &mut VarMap,
    prefix: &str,
    params: &ExpertParams,
    in_dim: usize,
    device: &Device,
) -> Result<()> {
    let hidden = params.l1_bias.len();
    let l1_weight = matrix_tensor(&params.l1_weight, in_dim, device)?;
    let l2_weight = matrix_tensor(&params.l2_weight, hidden, device)?;
    assign(varmap, &format!("{prefix}.l1.weight"), l1_weight)?;
    assign(varmap, &format!("{prefix}.l1.bias"), vector_tensor(&params.l1_bias, device)?)?;
    assign(varmap, &format!("{prefix}.l2.weight"), l2_weight)?;
    assign(varmap, &format!("{prefix}.l2.bias"), vector_tensor(&params.l2_bias, device)?)
}

fn assign_linear(
    varmap: &mut VarMap,
    prefix: &str,
    params: &LinearParams,
    in_dim: usize,
    device: &Device,
) -> Result<()> {
    let weight = matrix_tensor(&params.weight, in_dim, device)?;
    assign(varmap, &format!("{prefix}.weight"), weight)?;
    assign(varmap, &format!("{prefix}.bias"), vector_tensor(&params.bias, device)?)
}

fn assign(varmap: &mut VarMap, name: &str, value: Tensor) -> Result<()> {
    varmap
        .set_one(name, value)
        .map_err(|e| CfgWatchError::Model(format!("Failed to initialize {name}: {e}")))
}

fn frozen_linear(
    weight: &[Vec<f32>],
    bias: &[f32],
    in_dim: usize,
    device: &Device,
) -> Result<Linear> {
    Ok(Linear::new(
        matrix_tensor(weight, in_dim, device)?,
        Some(vector_tensor(bias, device)?),
    ))
}

fn linear_params(layer: &Linear) -> Result<LinearParams> {
    let weight = layer
        .weight()
        .to_vec2::<f32>()
        .map_err(model_err("Failed to read weight"))?;
    let bias = match layer.bias() {
        Some(b) => b.to_vec1::<f32>().map_err(model_err("Failed to read bias"))?,
        None => return Err(CfgWatchError::Model("Layer has no bias".to_string())),
    };
    Ok(LinearParams { weight, bias })
}

fn matrix_tensor(rows: &[Vec<f32>], cols: usize, device: &Device) -> Result<Tensor> {
    let flat: Vec<f32> = rows.iter().flatten().copied().collect();
    Tensor::from_vec(flat, (rows.len(), cols), device)
        .map_err(model_err("Failed to build weight tensor"))
}

fn vector_tensor(values: &[f32], device: &Device) -> Result<Tensor> {
    Tensor::from_slice(values, values.len(), device)
        .map_err(model_err("Failed to build bias tensor"))
}

fn row_tensor(values: &[f32], expected: usize, device: &Device) -> Result<Tensor> {
    if values.len() != expected {
        return Err(CfgWatchError::Features(format!(
            "Feature vector has {} values, classifier expects {expected}",
            values.len()
        )));
    }
    Tensor::from_slice(values, (1, expected), device)
        .map_err(model_err("Failed to build input tensor"))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
