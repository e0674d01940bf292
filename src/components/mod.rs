//! # Components
//!
//! This module contains the components that can be used to build an agent.
//!
//! ## Noise
//!
//! The [`OuNoise`] struct implements the Ornstein-Uhlenbeck process, the
//! exploration noise source for continuous-action agents. Discrete agents
//! explore with a bare epsilon instead, held in the agent itself.
//!
//! ## Action selection
//!
//! The [`ActionSelector`] turns raw policy logits into an executable action
//! plus the distribution it was drawn from, covering both the hard sampling
//! used against the live environment and the differentiable relaxation used
//! during training.

mod ou_noise;
mod selector;

pub use ou_noise::OuNoise;
pub use selector::{
    gumbel_softmax,
    onehot_from_logits,
    ActionDistribution,
    ActionSelector,
    ContinuousSelector,
    DiscreteSelector,
    SelectOptions,
};
