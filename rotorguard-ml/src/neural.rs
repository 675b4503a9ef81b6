//! Inference-only network layers
//!
//! Weights are produced offline and loaded from JSON. Layouts follow the
//! common convention of the training side: dense weights are
//! `[output][input]`, LSTM gate blocks are stacked in the order input,
//! forget, cell, output with separate input and recurrent biases.

use serde::{Deserialize, Serialize};

use rotorguard_core::errors::StateCorruptionError;
use rotorguard_core::traits::{Finite, Validate};

use crate::rng::Rng;

/// Elementwise nonlinearity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    /// max(0, x)
    Relu,
    /// 1 / (1 + e^-x)
    Sigmoid,
    /// tanh(x)
    Tanh,
    /// Identity
    Linear,
}

impl Activation {
    /// Apply to one value
    pub fn apply(self, x: f64) -> f64 {
        match self {
            Activation::Relu => x.max(0.0),
            Activation::Sigmoid => sigmoid(x),
            Activation::Tanh => x.tanh(),
            Activation::Linear => x,
        }
    }
}

/// Numerically stable logistic function
pub fn sigmoid(x: f64) -> f64 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

fn corrupt(kind: &str, reason: String) -> StateCorruptionError {
    StateCorruptionError::InvariantViolated { kind: kind.to_string(), reason }
}

fn check_matrix(kind: &str, name: &str, m: &[Vec<f64>], rows: usize, cols: usize) -> Result<(), StateCorruptionError> {
    if m.len() != rows {
        return Err(corrupt(kind, format!("{} has {} rows, expected {}", name, m.len(), rows)));
    }
    for (i, row) in m.iter().enumerate() {
        if row.len() != cols {
            return Err(corrupt(kind, format!("{} row {} has {} columns, expected {}", name, i, row.len(), cols)));
        }
        if !row.is_finite_value() {
            return Err(corrupt(kind, format!("{} row {} is not finite", name, i)));
        }
    }
    Ok(())
}

fn check_vector(kind: &str, name: &str, v: &[f64], len: usize) -> Result<(), StateCorruptionError> {
    if v.len() != len {
        return Err(corrupt(kind, format!("{} has length {}, expected {}", name, v.len(), len)));
    }
    if !v.is_finite_value() {
        return Err(corrupt(kind, format!("{} is not finite", name)));
    }
    Ok(())
}

/// `y = act(W x + b)`
fn affine<'a>(weights: &'a [Vec<f64>], bias: &'a [f64], x: &[f64]) -> impl Iterator<Item = f64> + 'a {
    let x = x.to_vec();
    weights
        .iter()
        .zip(bias)
        .map(move |(row, b)| row.iter().zip(&x).fold(*b, |acc, (w, v)| w.mul_add(*v, acc)))
}

/// Fully connected layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DenseLayer {
    /// `[output][input]` weights
    pub weights: Vec<Vec<f64>>,
    /// Per-output bias
    pub bias: Vec<f64>,
    /// Output nonlinearity
    pub activation: Activation,
}

impl DenseLayer {
    /// Layer from explicit weights, checked for shape and finiteness
    pub fn new(
        weights: Vec<Vec<f64>>,
        bias: Vec<f64>,
        activation: Activation,
    ) -> Result<Self, StateCorruptionError> {
        let layer = Self { weights, bias, activation };
        layer.validate()?;
        Ok(layer)
    }

    /// Xavier-uniform initialized layer, for synthetic models
    pub fn seeded(input: usize, output: usize, activation: Activation, rng: &mut Rng) -> Self {
        let limit = (6.0 / (input + output).max(1) as f64).sqrt();
        let weights = (0..output)
            .map(|_| (0..input).map(|_| rng.next_f64_range(-limit, limit)).collect())
            .collect();
        Self { weights, bias: vec![0.0; output], activation }
    }

    /// Width of the input
    pub fn input_dim(&self) -> usize {
        self.weights.first().map(Vec::len).unwrap_or(0)
    }

    /// Width of the output
    pub fn output_dim(&self) -> usize {
        self.weights.len()
    }

    /// Forward pass
    pub fn forward(&self, x: &[f64]) -> Vec<f64> {
        affine(&self.weights, &self.bias, x)
            .map(|v| self.activation.apply(v))
            .collect()
    }
}

impl Validate for DenseLayer {
    fn validate(&self) -> Result<(), StateCorruptionError> {
        let out = self.weights.len();
        if out == 0 || self.input_dim() == 0 {
            return Err(corrupt("dense_layer", "layer has no weights".into()));
        }
        check_matrix("dense_layer", "weights", &self.weights, out, self.input_dim())?;
        check_vector("dense_layer", "bias", &self.bias, out)
    }
}

/// Run `layers` in sequence
pub fn forward_stack(layers: &[DenseLayer], x: &[f64]) -> Vec<f64> {
    layers
        .iter()
        .fold(x.to_vec(), |acc, layer| layer.forward(&acc))
}

/// Check that consecutive layer widths line up
pub fn validate_stack(kind: &str, layers: &[DenseLayer]) -> Result<(), StateCorruptionError> {
    for layer in layers {
        layer.validate()?;
    }
    for (i, pair) in layers.windows(2).enumerate() {
        if pair[0].output_dim() != pair[1].input_dim() {
            return Err(corrupt(
                kind,
                format!(
                    "layer {} outputs {} values but layer {} expects {}",
                    i,
                    pair[0].output_dim(),
                    i + 1,
                    pair[1].input_dim()
                ),
            ));
        }
    }
    Ok(())
}

/// Unidirectional LSTM layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LstmLayer {
    /// Width of each input step
    pub input_size: usize,
    /// Width of the hidden state
    pub hidden_size: usize,
    /// `[4 * hidden][input]` input weights, gates i, f, g, o
    pub w_ih: Vec<Vec<f64>>,
    /// `[4 * hidden][hidden]` recurrent weights
    pub w_hh: Vec<Vec<f64>>,
    /// Input bias, `4 * hidden`
    pub b_ih: Vec<f64>,
    /// Recurrent bias, `4 * hidden`
    pub b_hh: Vec<f64>,
}

impl LstmLayer {
    /// Uniform(-1/sqrt(h), 1/sqrt(h)) initialized layer, for synthetic models
    pub fn seeded(input_size: usize, hidden_size: usize, rng: &mut Rng) -> Self {
        let k = 1.0 / (hidden_size.max(1) as f64).sqrt();
        let mut matrix = |cols: usize| -> Vec<Vec<f64>> {
            (0..4 * hidden_size)
                .map(|_| (0..cols).map(|_| rng.next_f64_range(-k, k)).collect())
                .collect()
        };
        let w_ih = matrix(input_size);
        let w_hh = matrix(hidden_size);
        Self {
            input_size,
            hidden_size,
            w_ih,
            w_hh,
            b_ih: vec![0.0; 4 * hidden_size],
            b_hh: vec![0.0; 4 * hidden_size],
        }
    }

    /// Hidden state after every step, starting from zero state
    pub fn forward_sequence<S: AsRef<[f64]>>(&self, steps: &[S]) -> Vec<Vec<f64>> {
        let h_size = self.hidden_size;
        let mut h = vec![0.0; h_size];
        let mut c = vec![0.0; h_size];
        let mut outputs = Vec::with_capacity(steps.len());

        for step in steps {
            let x = step.as_ref();
            let gates: Vec<f64> = affine(&self.w_ih, &self.b_ih, x)
                .zip(affine(&self.w_hh, &self.b_hh, &h))
                .map(|(a, b)| a + b)
                .collect();

            for j in 0..h_size {
                let i = sigmoid(gates[j]);
                let f = sigmoid(gates[h_size + j]);
                let g = gates[2 * h_size + j].tanh();
                let o = sigmoid(gates[3 * h_size + j]);
                c[j] = f * c[j] + i * g;
                h[j] = o * c[j].tanh();
            }
            outputs.push(h.clone());
        }
        outputs
    }
}

impl Validate for LstmLayer {
    fn validate(&self) -> Result<(), StateCorruptionError> {
        if self.input_size == 0 || self.hidden_size == 0 {
            return Err(corrupt("lstm_layer", "zero-sized layer".into()));
        }
        let gates = 4 * self.hidden_size;
        check_matrix("lstm_layer", "w_ih", &self.w_ih, gates, self.input_size)?;
        check_matrix("lstm_layer", "w_hh", &self.w_hh, gates, self.hidden_size)?;
        check_vector("lstm_layer", "b_ih", &self.b_ih, gates)?;
        check_vector("lstm_layer", "b_hh", &self.b_hh, gates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dense_forward() {
        let layer = DenseLayer::new(
            vec![vec![1.0, 2.0], vec![-1.0, 0.5]],
            vec![0.5, 0.0],
            Activation::Relu,
        )
        .unwrap();
        assert_eq!(layer.forward(&[1.0, 1.0]), vec![3.5, 0.0]);
        assert_eq!(layer.input_dim(), 2);
        assert_eq!(layer.output_dim(), 2);
    }

    #[test]
    fn dense_shape_checked() {
        assert!(DenseLayer::new(vec![vec![1.0, 2.0], vec![1.0]], vec![0.0, 0.0], Activation::Linear).is_err());
        assert!(DenseLayer::new(vec![vec![1.0]], vec![0.0, 0.0], Activation::Linear).is_err());
        assert!(DenseLayer::new(vec![vec![f64::NAN]], vec![0.0], Activation::Linear).is_err());
    }

    #[test]
    fn stack_widths_checked() {
        let mut rng = Rng::new(1);
        let good = vec![
            DenseLayer::seeded(4, 3, Activation::Relu, &mut rng),
            DenseLayer::seeded(3, 4, Activation::Linear, &mut rng),
        ];
        assert!(validate_stack("ae", &good).is_ok());
        assert_eq!(forward_stack(&good, &[1.0; 4]).len(), 4);

        let bad = vec![
            DenseLayer::seeded(4, 3, Activation::Relu, &mut rng),
            DenseLayer::seeded(2, 4, Activation::Linear, &mut rng),
        ];
        assert!(validate_stack("ae", &bad).is_err());
    }

    #[test]
    fn sigmoid_is_stable() {
        assert_eq!(sigmoid(0.0), 0.5);
        assert!(sigmoid(-1000.0) >= 0.0);
        assert!(sigmoid(1000.0) <= 1.0);
        assert!(sigmoid(-1000.0).is_finite());
    }

    #[test]
    fn lstm_single_unit_by_hand() {
        // One input, one hidden unit, all gate pre-activations equal to x
        let layer = LstmLayer {
            input_size: 1,
            hidden_size: 1,
            w_ih: vec![vec![1.0]; 4],
            w_hh: vec![vec![0.0]; 4],
            b_ih: vec![0.0; 4],
            b_hh: vec![0.0; 4],
        };
        assert!(layer.validate().is_ok());

        let out = layer.forward_sequence(&[vec![1.0], vec![1.0]]);
        let s = sigmoid(1.0);
        let g = 1f64.tanh();
        let c1 = s * g;
        let h1 = s * c1.tanh();
        let c2 = s * c1 + s * g;
        let h2 = s * c2.tanh();
        assert!((out[0][0] - h1).abs() < 1e-12);
        assert!((out[1][0] - h2).abs() < 1e-12);
    }

    #[test]
    fn lstm_shapes_checked() {
        let mut rng = Rng::new(3);
        let mut layer = LstmLayer::seeded(5, 4, &mut rng);
        assert!(layer.validate().is_ok());
        assert_eq!(layer.forward_sequence(&vec![vec![0.1; 5]; 3]).len(), 3);

        layer.b_hh.pop();
        assert!(layer.validate().is_err());
    }
}
