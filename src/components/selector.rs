use {
    candle_core::{
        D,
        Error,
        Result,
        Tensor,
    },
    candle_nn::ops::{
        log_softmax,
        softmax,
    },
    rand::{
        thread_rng,
        Rng,
    },
};

/// Options for a single [`ActionSelector::select_action`] call.
///
/// # Fields
///
/// * `explore` - Sample stochastically instead of returning the mode.
/// * `hard` - Return a one-hot action; with `reparameterize` this uses the
///   straight-through estimator so gradients still flow to the soft sample.
/// * `reparameterize` - Request a differentiable (relaxed) sample.
/// * `temperature` - Relaxation temperature for the Gumbel-softmax path.
/// * `epsilon` - Probability of replacing a hard discrete sample with a
///   uniformly random one while exploring.
/// * `noise` - External noise vector for continuous exploration.
pub struct SelectOptions<'a> {
    pub explore: bool,
    pub hard: bool,
    pub reparameterize: bool,
    pub temperature: f64,
    pub epsilon: f64,
    pub noise: Option<&'a Tensor>,
}

impl Default for SelectOptions<'_> {
    fn default() -> Self {
        Self {
            explore: false,
            hard: true,
            reparameterize: false,
            temperature: 1.0,
            epsilon: 0.0,
            noise: None,
        }
    }
}

/// Converts raw policy logits into an executable action plus the
/// distribution the action was drawn from.
pub enum ActionSelector {
    Discrete(DiscreteSelector),
    Continuous(ContinuousSelector),
}

impl ActionSelector {
    pub fn discrete() -> Self {
        Self::Discrete(DiscreteSelector)
    }

    pub fn continuous() -> Self {
        Self::Continuous(ContinuousSelector::default())
    }

    pub fn select_action(
        &self,
        logits: &Tensor,
        opts: &SelectOptions,
    ) -> Result<(Tensor, ActionDistribution)> {
        match self {
            Self::Discrete(s) => s.select_action(logits, opts),
            Self::Continuous(s) => s.select_action(logits, opts),
        }
    }
}

pub struct DiscreteSelector;

impl DiscreteSelector {
    pub fn select_action(
        &self,
        logits: &Tensor,
        opts: &SelectOptions,
    ) -> Result<(Tensor, ActionDistribution)> {
        let dist = ActionDistribution::categorical(logits)?;
        let action = if opts.reparameterize {
            gumbel_softmax(logits, opts.temperature, opts.hard)?
        } else if opts.explore {
            let sample = sample_onehot(logits)?;
            if opts.epsilon > 0.0 {
                epsilon_mix(&sample, opts.epsilon)?
            } else {
                sample
            }
        } else {
            onehot_from_logits(logits)?
        };
        Ok((action, dist))
    }
}

pub struct ContinuousSelector {
    pub std: f64,
}

impl Default for ContinuousSelector {
    fn default() -> Self {
        Self { std: 1.0 }
    }
}

impl ContinuousSelector {
    pub fn select_action(
        &self,
        logits: &Tensor,
        opts: &SelectOptions,
    ) -> Result<(Tensor, ActionDistribution)> {
        let dist = ActionDistribution::gaussian(logits, self.std);
        let action = if opts.explore {
            // callers must always supply noise on this path
            let noise = opts.noise.ok_or_else(|| {
                Error::Msg("continuous exploration requires a noise vector".to_string())
            })?;
            logits.broadcast_add(noise)?.clamp(-1.0, 1.0)?
        } else {
            logits.clone()
        };
        Ok((action, dist))
    }
}

/// The distribution an action was selected from.
///
/// Supports evaluating log-probability and entropy of an externally supplied
/// action under the current logits without re-sampling.
pub enum ActionDistribution {
    Categorical { probs: Tensor, log_probs: Tensor },
    Gaussian { mean: Tensor, std: f64 },
}

impl ActionDistribution {
    pub fn categorical(logits: &Tensor) -> Result<Self> {
        Ok(Self::Categorical {
            probs: softmax(logits, D::Minus1)?,
            log_probs: log_softmax(logits, D::Minus1)?,
        })
    }

    pub fn gaussian(
        mean: &Tensor,
        std: f64,
    ) -> Self {
        Self::Gaussian {
            mean: mean.clone(),
            std,
        }
    }

    /// Log-probability of `action`, contracted over the channel axis.
    pub fn log_prob(
        &self,
        action: &Tensor,
    ) -> Result<Tensor> {
        match self {
            Self::Categorical { log_probs, .. } => (log_probs * action)?.sum(D::Minus1),
            Self::Gaussian { mean, std } => {
                let ln_2pi = (2.0 * std::f64::consts::PI).ln();
                let z = (action - mean)?.affine(1.0 / std, 0.0)?;
                z.sqr()?
                    .affine(-0.5, -(0.5 * ln_2pi + std.ln()))?
                    .sum(D::Minus1)
            }
        }
    }

    pub fn entropy(&self) -> Result<Tensor> {
        match self {
            Self::Categorical { probs, log_probs } => {
                (probs * log_probs)?.sum(D::Minus1)?.neg()
            }
            Self::Gaussian { mean, std } => {
                let ln_2pi = (2.0 * std::f64::consts::PI).ln();
                let per_dim = 0.5 + 0.5 * ln_2pi + std.ln();
                let mut dims = mean.dims().to_vec();
                dims.pop();
                Tensor::full(per_dim * mean.dim(D::Minus1)? as f64, dims, mean.device())
            }
        }
    }

    pub fn mode(&self) -> Result<Tensor> {
        match self {
            Self::Categorical { log_probs, .. } => onehot_from_logits(log_probs),
            Self::Gaussian { mean, .. } => Ok(mean.clone()),
        }
    }
}

/// One-hot of the arg-max along the last axis. No gradient path.
pub fn onehot_from_logits(logits: &Tensor) -> Result<Tensor> {
    let classes = logits.dim(D::Minus1)?;
    let flat = logits.reshape(((), classes))?;
    let idx = flat.argmax(D::Minus1)?.to_vec1::<u32>()?;
    let mut data = vec![0.0f64; idx.len() * classes];
    for (row, &i) in idx.iter().enumerate() {
        data[row * classes + i as usize] = 1.0;
    }
    Tensor::from_vec(data, (idx.len(), classes), logits.device())?.reshape(logits.shape())
}

fn gumbel_like(t: &Tensor) -> Result<Tensor> {
    // -ln(-ln(u)), u ~ U(0, 1), bounded away from zero
    let u = t.rand_like(1e-10, 1.0)?;
    u.log()?.neg()?.log()?.neg()
}

/// A hard categorical sample via the Gumbel-max trick. No gradient path.
fn sample_onehot(logits: &Tensor) -> Result<Tensor> {
    let g = gumbel_like(logits)?;
    onehot_from_logits(&(logits + g)?)
}

/// Temperature-controlled Gumbel-softmax relaxation. With `hard`, the
/// returned sample is one-hot but keeps a gradient path to the soft sample
/// (straight-through estimator).
pub fn gumbel_softmax(
    logits: &Tensor,
    temperature: f64,
    hard: bool,
) -> Result<Tensor> {
    let g = gumbel_like(logits)?;
    let y = softmax(&(logits + g)?.affine(1.0 / temperature, 0.0)?, D::Minus1)?;
    if hard {
        let y_hard = onehot_from_logits(&y)?;
        (y_hard - y.detach())? + y
    } else {
        Ok(y)
    }
}

/// Replace each row of a one-hot sample with a uniformly random category
/// with probability `epsilon`.
fn epsilon_mix(
    sample: &Tensor,
    epsilon: f64,
) -> Result<Tensor> {
    let classes = sample.dim(D::Minus1)?;
    let flat = sample.reshape(((), classes))?;
    let rows = flat.dim(0)?;
    let mut data = flat.to_vec2::<f64>()?;
    let mut rng = thread_rng();
    for row in data.iter_mut() {
        if rng.gen::<f64>() < epsilon {
            row.iter_mut().for_each(|v| *v = 0.0);
            row[rng.gen_range(0..classes)] = 1.0;
        }
    }
    Tensor::from_vec(data.concat(), (rows, classes), sample.device())?.reshape(sample.shape())
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    #[test]
    fn test_discrete_mode_is_argmax_onehot() {
        let device = Device::Cpu;
        let logits =
            Tensor::new(&[[0.1f64, 2.0, -1.0], [3.0, 0.0, 0.0]], &device).unwrap();
        let selector = ActionSelector::discrete();
        let (action, _) = selector
            .select_action(&logits, &SelectOptions::default())
            .unwrap();
        let rows: Vec<Vec<f64>> = action.to_vec2().unwrap();
        assert_eq!(rows[0], vec![0.0, 1.0, 0.0]);
        assert_eq!(rows[1], vec![1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_gumbel_hard_sample_is_onehot() {
        let device = Device::Cpu;
        let logits = Tensor::zeros((6, 4), candle_core::DType::F64, &device).unwrap();
        let sample = gumbel_softmax(&logits, 0.5, true).unwrap();
        for row in sample.to_vec2::<f64>().unwrap() {
            let total: f64 = row.iter().sum();
            assert!((total - 1.0).abs() < 1e-9);
            assert!((row.iter().cloned().fold(f64::MIN, f64::max) - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_continuous_explore_without_noise_is_an_error() {
        let device = Device::Cpu;
        let logits = Tensor::zeros((2, 3), candle_core::DType::F64, &device).unwrap();
        let selector = ActionSelector::continuous();
        let opts = SelectOptions {
            explore: true,
            ..Default::default()
        };
        assert!(selector.select_action(&logits, &opts).is_err());
    }

    #[test]
    fn test_continuous_explore_adds_noise_and_clamps() {
        let device = Device::Cpu;
        let logits = Tensor::new(&[[0.9f64, -0.9]], &device).unwrap();
        let noise = Tensor::new(&[0.5f64, -0.5], &device).unwrap();
        let selector = ActionSelector::continuous();
        let opts = SelectOptions {
            explore: true,
            noise: Some(&noise),
            ..Default::default()
        };
        let (action, _) = selector.select_action(&logits, &opts).unwrap();
        let row: Vec<f64> = action.to_vec2::<f64>().unwrap().remove(0);
        assert_eq!(row, vec![1.0, -1.0]);
    }

    #[test]
    fn test_categorical_entropy_of_uniform_logits() {
        let device = Device::Cpu;
        let logits = Tensor::zeros((2, 4), candle_core::DType::F64, &device).unwrap();
        let dist = ActionDistribution::categorical(&logits).unwrap();
        let entropy: Vec<f64> = dist.entropy().unwrap().to_vec1().unwrap();
        for e in entropy {
            assert!((e - 4.0f64.ln()).abs() < 1e-9);
        }
    }

    #[test]
    fn test_categorical_log_prob_of_supplied_action() {
        let device = Device::Cpu;
        let logits = Tensor::zeros((1, 4), candle_core::DType::F64, &device).unwrap();
        let action = Tensor::new(&[[0.0f64, 1.0, 0.0, 0.0]], &device).unwrap();
        let dist = ActionDistribution::categorical(&logits).unwrap();
        let lp: Vec<f64> = dist.log_prob(&action).unwrap().to_vec1().unwrap();
        assert!((lp[0] + 4.0f64.ln()).abs() < 1e-9);
    }

    #[test]
    fn test_gaussian_log_prob_peaks_at_mean() {
        let device = Device::Cpu;
        let mean = Tensor::new(&[[0.2f64, -0.3]], &device).unwrap();
        let dist = ActionDistribution::gaussian(&mean, 1.0);
        let at_mean: Vec<f64> = dist.log_prob(&mean).unwrap().to_vec1().unwrap();
        let off = (&mean + 0.5).unwrap();
        let off_mean: Vec<f64> = dist.log_prob(&off).unwrap().to_vec1().unwrap();
        assert!(at_mean[0] > off_mean[0]);
    }
}
