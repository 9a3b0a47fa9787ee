// Adam optimizer over flat parameter vectors

use serde::{Deserialize, Serialize};

/// Serializable optimizer state for checkpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdamState {
    pub m: Vec<f32>,
    pub v: Vec<f32>,
    pub step: u64,
}

/// Adam with bias correction and coupled L2 weight decay.
pub struct Adam {
    beta1: f64,
    beta2: f64,
    epsilon: f64,
    weight_decay: f64,
    m: Vec<f32>,
    v: Vec<f32>,
    step: u64,
}

impl Adam {
    pub fn new(param_count: usize, weight_decay: f64) -> Self {
        Self {
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
            weight_decay,
            m: vec![0.0; param_count],
            v: vec![0.0; param_count],
            step: 0,
        }
    }

    /// Apply one update in place. The learning rate comes from the scheduler
    /// each step.
    pub fn step(&mut self, params: &mut [f32], grads: &[f32], learning_rate: f64) {
        self.step += 1;
        let bias1 = 1.0 - self.beta1.powi(self.step as i32);
        let bias2 = 1.0 - self.beta2.powi(self.step as i32);

        for ((param, grad), (m, v)) in params
            .iter_mut()
            .zip(grads)
            .zip(self.m.iter_mut().zip(self.v.iter_mut()))
        {
            let g = *grad as f64 + self.weight_decay * *param as f64;
            *m = (self.beta1 * *m as f64 + (1.0 - self.beta1) * g) as f32;
            *v = (self.beta2 * *v as f64 + (1.0 - self.beta2) * g * g) as f32;

            let m_hat = *m as f64 / bias1;
            let v_hat = *v as f64 / bias2;
            *param -= (learning_rate * m_hat / (v_hat.sqrt() + self.epsilon)) as f32;
        }
    }

    pub fn state(&self) -> AdamState {
        AdamState { m: self.m.clone(), v: self.v.clone(), step: self.step }
    }

    pub fn restore(&mut self, state: AdamState) {
        self.m = state.m;
        self.v = state.v;
        self.step = state.step;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adam_minimizes_quadratic() {
        // f(x) = (x - 3)^2, gradient 2(x - 3)
        let mut optimizer = Adam::new(1, 0.0);
        let mut params = vec![0.0f32];

        for _ in 0..500 {
            let grad = 2.0 * (params[0] - 3.0);
            optimizer.step(&mut params, &[grad], 0.05);
        }

        assert!((params[0] - 3.0).abs() < 0.05, "converged to {}", params[0]);
    }

    #[test]
    fn test_state_round_trip() {
        let mut optimizer = Adam::new(2, 0.0);
        let mut params = vec![1.0f32, -1.0];
        optimizer.step(&mut params, &[0.5, -0.5], 0.01);

        let state = optimizer.state();
        assert_eq!(state.step, 1);

        let mut restored = Adam::new(2, 0.0);
        restored.restore(state.clone());
        assert_eq!(restored.state().m, state.m);
    }
}
