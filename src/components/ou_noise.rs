use candle_core::{
    DType,
    Device,
    Result,
    Tensor,
};

/// Temporally correlated exploration noise for continuous actions.
///
/// Implements the Ornstein-Uhlenbeck process. The emitted noise is rescaled
/// by `scale`, which may be changed at any time to anneal exploration.
///
/// # Fields
///
/// * `mu` - The long-running mean the process decays towards.
/// * `theta` - The decay rate towards `mu`.
/// * `sigma` - The scale of the Gaussian innovation per step.
/// * `scale` - Linear rescaling applied to the emitted noise.
/// * `state` - The current state of the process, one value per action dim.
pub struct OuNoise {
    mu: f64,
    theta: f64,
    sigma: f64,
    pub scale: f64,
    state: Tensor,
}
impl OuNoise {
    pub fn new(
        mu: f64,
        theta: f64,
        sigma: f64,
        scale: f64,
        size_action: usize,
        device: &Device,
    ) -> Result<Self> {
        Ok(Self {
            mu,
            theta,
            sigma,
            scale,
            state: Tensor::full(mu, size_action, device)?,
        })
    }

    /// Reinitialize the process to its steady-state.
    pub fn reset(&mut self) -> Result<()> {
        self.state = Tensor::full(self.mu, self.state.dims1()?, self.state.device())?;
        Ok(())
    }

    /// Advance the process one step and return the rescaled noise vector.
    pub fn noise(&mut self) -> Result<Tensor> {
        let rand = Tensor::randn_like(&self.state, 0.0, 1.0)?;
        let dx = ((self.theta * (self.mu - &self.state)?)? + (self.sigma * rand)?)?;
        self.state = (&self.state + dx)?;
        self.scale * &self.state
    }

    pub fn dim(&self) -> Result<usize> {
        self.state.dims1()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noise_has_action_dim() {
        let device = Device::Cpu;
        let mut ou = OuNoise::new(0.0, 0.15, 0.2, 1.0, 4, &device).unwrap();
        let n = ou.noise().unwrap();
        assert_eq!(n.dims1().unwrap(), 4);
        assert_eq!(n.dtype(), DType::F64);
    }

    #[test]
    fn test_reset_returns_to_steady_state() {
        let device = Device::Cpu;
        let mut ou = OuNoise::new(0.0, 0.15, 0.2, 1.0, 3, &device).unwrap();
        for _ in 0..10 {
            ou.noise().unwrap();
        }
        ou.reset().unwrap();
        let state: Vec<f64> = ou.state.to_vec1().unwrap();
        assert!(state.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_zero_scale_silences_noise() {
        let device = Device::Cpu;
        let mut ou = OuNoise::new(0.0, 0.15, 0.2, 1.0, 3, &device).unwrap();
        ou.scale = 0.0;
        let n: Vec<f64> = ou.noise().unwrap().to_vec1().unwrap();
        assert!(n.iter().all(|v| *v == 0.0));
    }
}
