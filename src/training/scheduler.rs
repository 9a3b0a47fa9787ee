// Reduce-on-plateau learning-rate scheduler
//
// Monitors validation loss and multiplies the learning rate by `factor`
// once the loss has failed to improve for `patience` consecutive epochs.
// Improvement uses a relative threshold: new < best * (1 - 1e-4).

use serde::{Deserialize, Serialize};

const IMPROVEMENT_THRESHOLD: f64 = 1e-4;
const MIN_LEARNING_RATE: f64 = 1e-8;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerState {
    pub learning_rate: f64,
    pub best: f64,
    pub bad_epochs: u32,
}

pub struct ReduceLrOnPlateau {
    learning_rate: f64,
    factor: f64,
    patience: u32,
    best: f64,
    bad_epochs: u32,
}

impl ReduceLrOnPlateau {
    pub fn new(learning_rate: f64, factor: f64, patience: u32) -> Self {
        Self {
            learning_rate,
            factor,
            patience,
            best: f64::INFINITY,
            bad_epochs: 0,
        }
    }

    /// Feed one epoch's validation loss; returns the learning rate to use
    /// for the next epoch.
    pub fn step(&mut self, val_loss: f64) -> f64 {
        if val_loss < self.best * (1.0 - IMPROVEMENT_THRESHOLD) {
            self.best = val_loss;
            self.bad_epochs = 0;
        } else {
            self.bad_epochs += 1;
            if self.bad_epochs > self.patience {
                let reduced = (self.learning_rate * self.factor).max(MIN_LEARNING_RATE);
                if reduced < self.learning_rate {
                    tracing::info!(
                        old_lr = self.learning_rate,
                        new_lr = reduced,
                        "Reducing learning rate on plateau"
                    );
                    self.learning_rate = reduced;
                }
                self.bad_epochs = 0;
            }
        }
        self.learning_rate
    }

    pub fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    pub fn state(&self) -> SchedulerState {
        SchedulerState {
            learning_rate: self.learning_rate,
            best: self.best,
            bad_epochs: self.bad_epochs,
        }
    }

    pub fn restore(&mut self, state: SchedulerState) {
        self.learning_rate = state.learning_rate;
        self.best = state.best;
        self.bad_epochs = state.bad_epochs;
    }
}
