use serde::{
    Deserialize,
    Serialize,
};
use super::super::AlgoType;


/// Hyper-parameters shared by the DDPG-family agents.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AgentConfig {
    // Whether critics see the joint observation/action (MADDPG) or only
    // their own agent's (DDPG).
    pub algo_type: AlgoType,
    // The number of neurons in the hidden layers of the policy and critic
    // networks, and the recurrent state size.
    pub hidden_dim: usize,
    // The learning rate shared by all optimizers.
    pub learning_rate: f64,
    // Recurrent (GRU) trunks for the policy and/or the critic.
    pub rnn_policy: bool,
    pub rnn_critic: bool,
    // Squash continuous policy outputs with tanh.
    pub constrain_out: bool,
    // Learn approximate models of the other agents' policies.
    pub model_of_agents: bool,
    // Temperature of the Gumbel-softmax relaxation used during training.
    pub gumbel_temperature: f64,
    // Epsilon for eps-greedy discrete exploration.
    pub epsilon: f64,
    // Ornstein-Uhlenbeck process parameters.
    pub ou_mu: f64,
    pub ou_theta: f64,
    pub ou_sigma: f64,
    pub ou_scale: f64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            algo_type: AlgoType::Maddpg,
            hidden_dim: 64,
            learning_rate: 0.01,
            rnn_policy: false,
            rnn_critic: false,
            constrain_out: false,
            model_of_agents: false,
            gumbel_temperature: 0.5,
            epsilon: 0.3,
            ou_mu: 0.0,
            ou_theta: 0.15,
            ou_sigma: 0.2,
            ou_scale: 0.1,
        }
    }
}

impl AgentConfig {
    pub fn particle_env() -> Self {
        Self {
            constrain_out: true,
            ..Default::default()
        }
    }

    pub fn particle_env_recurrent() -> Self {
        Self {
            rnn_policy: true,
            rnn_critic: true,
            constrain_out: true,
            ..Default::default()
        }
    }
}
