use {
    super::{
        configs::AgentConfig,
        AlgoType,
    },
    crate::{
        components::{
            ActionSelector,
            OuNoise,
            SelectOptions,
        },
        networks::{
            filter_by_prefix,
            rnn_forward_sequence,
            track,
            CriticNet,
            PolicyNet,
        },
        spaces::{
            ActionChannels,
            AgentSpace,
        },
    },
    candle_core::{
        D,
        DType,
        Device,
        Error,
        Result,
        Tensor,
    },
    candle_nn::{
        AdamW,
        Optimizer,
        ParamsAdamW,
        VarBuilder,
        VarMap,
    },
    std::collections::HashMap,
    tracing::info,
};

/// Exploration state, one variant per action type. The inactive variant's
/// mutators are no-ops.
pub enum Exploration {
    /// `move` and `comm` sub-channels share one continuous noise source.
    OrnsteinUhlenbeck(OuNoise),
    /// Epsilon for eps-greedy discrete exploration.
    Epsilon(f64),
}

/// Recurrent state for one agent, owned by the caller between calls.
///
/// `None` entries mean the corresponding network is not recurrent.
#[derive(Clone)]
pub struct HiddenState {
    pub policy: Option<Tensor>,
    pub critic: Option<Tensor>,
}

/// One entry of an agent checkpoint.
pub enum ParamEntry {
    Network(HashMap<String, Tensor>),
    Optimizer(ParamsAdamW),
}

/// Full agent checkpoint keyed by `policy`, `critic`, `target_policy`,
/// `target_critic`, `policy_optimizer`, `critic_optimizer`, plus the
/// `moa_*_{i}` entries when modeling other agents.
pub type AgentParams = HashMap<String, ParamEntry>;

pub(crate) struct Actor {
    pub(crate) varmap: VarMap,
    pub(crate) network: PolicyNet,
    pub(crate) target_network: PolicyNet,
}

impl Actor {
    pub(crate) fn new(
        device: &Device,
        dtype: DType,
        in_dim: usize,
        act_space: &AgentSpace,
        hidden_dim: usize,
        recurrent: bool,
        constrain_out: bool,
    ) -> Result<Self> {
        let mut varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, dtype, device);
        let network = PolicyNet::new(
            vb.pp("actor"),
            in_dim,
            act_space,
            hidden_dim,
            recurrent,
            constrain_out,
        )?;
        let target_network = PolicyNet::new(
            vb.pp("target-actor"),
            in_dim,
            act_space,
            hidden_dim,
            recurrent,
            constrain_out,
        )?;

        // this sets the two networks to be equal to each other using tau = 1.0
        track(&mut varmap, "target-actor", "actor", 1.0)?;

        Ok(Self {
            varmap,
            network,
            target_network,
        })
    }

    pub(crate) fn track(
        &mut self,
        tau: f64,
    ) -> Result<()> {
        track(&mut self.varmap, "target-actor", "actor", tau)
    }
}

pub(crate) struct Critic {
    pub(crate) varmap: VarMap,
    pub(crate) network: CriticNet,
    pub(crate) target_network: CriticNet,
}

impl Critic {
    pub(crate) fn new(
        device: &Device,
        dtype: DType,
        in_dim: usize,
        hidden_dim: usize,
        recurrent: bool,
    ) -> Result<Self> {
        let mut varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, dtype, device);
        let network = CriticNet::new(vb.pp("critic"), in_dim, hidden_dim, recurrent)?;
        let target_network =
            CriticNet::new(vb.pp("target-critic"), in_dim, hidden_dim, recurrent)?;

        // this sets the two networks to be equal to each other using tau = 1.0
        track(&mut varmap, "target-critic", "critic", 1.0)?;

        Ok(Self {
            varmap,
            network,
            target_network,
        })
    }

    pub(crate) fn track(
        &mut self,
        tau: f64,
    ) -> Result<()> {
        track(&mut self.varmap, "target-critic", "critic", tau)
    }
}

/// Run a policy over a `(batch, time, obs)` tensor and return the raw
/// per-sub-channel logits, each shaped `(batch, time, act)`.
pub(crate) fn policy_logits(
    pi: &PolicyNet,
    obs: &Tensor,
    hidden: Option<&Tensor>,
    truncate_steps: Option<usize>,
) -> Result<ActionChannels> {
    let (bs, ts, _) = obs.dims3()?;
    if pi.is_recurrent() {
        let h0 = hidden.ok_or_else(|| {
            Error::Msg("recurrent policy called without a hidden state".to_string())
        })?;
        let seq_logits = rnn_forward_sequence(|x, h| pi.step(x, h), obs, h0, truncate_steps)?;

        let keys: Vec<String> = match seq_logits.first() {
            Some(first) => first.keys().map(str::to_string).collect(),
            None => return Err(Error::Msg("policy rollout over an empty sequence".to_string())),
        };
        let mut out = ActionChannels::new();
        for k in keys {
            let mut per_step = Vec::with_capacity(ts);
            for channels in &seq_logits {
                match channels.get(&k) {
                    Some(t) => per_step.push(t.clone()),
                    None => {
                        return Err(Error::Msg(format!("missing logits for channel {k}")))
                    }
                }
            }
            out.push(k, Tensor::stack(&per_step, 1)?);
        }
        Ok(out)
    } else {
        let stacked_obs = obs.reshape((bs * ts, ()))?;
        let (logits, _) = pi.forward(&stacked_obs, None)?;
        let mut out = ActionChannels::new();
        for (k, l) in logits.iter() {
            out.push(k, l.reshape((bs, ts, ()))?);
        }
        Ok(out)
    }
}

pub(crate) fn snapshot(
    varmap: &VarMap,
    prefix: &str,
) -> Result<HashMap<String, Tensor>> {
    let data = varmap.data().lock().unwrap();
    let mut out = HashMap::new();
    for (name, var) in data.iter() {
        if let Some(suffix) = name.strip_prefix(prefix) {
            out.insert(suffix.to_string(), var.as_tensor().copy()?);
        }
    }
    Ok(out)
}

pub(crate) fn network_entry<'a>(
    params: &'a AgentParams,
    key: &str,
) -> Result<&'a HashMap<String, Tensor>> {
    match params.get(key) {
        Some(ParamEntry::Network(snapshot)) => Ok(snapshot),
        Some(ParamEntry::Optimizer(_)) => Err(Error::Msg(format!(
            "checkpoint entry {key} is not a network"
        ))),
        None => Err(Error::Msg(format!("checkpoint is missing entry {key}"))),
    }
}

pub(crate) fn restore(
    varmap: &mut VarMap,
    prefix: &str,
    snapshot: &HashMap<String, Tensor>,
) -> Result<()> {
    for (suffix, tensor) in snapshot {
        varmap.set_one(format!("{prefix}{suffix}"), tensor.clone())?;
    }
    Ok(())
}

/// A single agent of a multi-agent actor-critic learner: one policy, one
/// critic, their target shadows, optimizers and exploration state.
///
/// The agent plays two roles that never run concurrently for one instance:
/// acting ([`DdpgAgent::step`], single-step, gradient-free, against the live
/// environment) and learning ([`DdpgAgent::compute_action`] /
/// [`DdpgAgent::compute_value`], batched, gradient-carrying, against replayed
/// episodes). Recurrent state is always passed in and returned explicitly;
/// the trainer owns the authoritative value between calls.
pub struct DdpgAgent {
    act_space: AgentSpace,
    obs_space: AgentSpace,
    discrete_action: bool,
    exploration: Exploration,
    selector: ActionSelector,
    actor: Actor,
    actor_optim: AdamW,
    critic: Critic,
    critic_optim: AdamW,
    optim_params: ParamsAdamW,
    temperature: f64,
    device: Device,
}

impl DdpgAgent {
    pub fn new(
        device: &Device,
        config: &AgentConfig,
        obs_space: AgentSpace,
        act_space: AgentSpace,
        env_obs_spaces: &[AgentSpace],
        env_act_spaces: &[AgentSpace],
    ) -> Result<Self> {
        let discrete_action = act_space.is_discrete();

        let exploration = if discrete_action {
            Exploration::Epsilon(config.epsilon)
        } else {
            Exploration::OrnsteinUhlenbeck(OuNoise::new(
                config.ou_mu,
                config.ou_theta,
                config.ou_sigma,
                config.ou_scale,
                act_space.dim(),
                device,
            )?)
        };
        let selector = if discrete_action {
            ActionSelector::discrete()
        } else {
            ActionSelector::continuous()
        };

        let num_in_pol = obs_space.dim();
        let actor = Actor::new(
            device,
            DType::F64,
            num_in_pol,
            &act_space,
            config.hidden_dim,
            config.rnn_policy,
            config.constrain_out,
        )?;
        let optim_params = ParamsAdamW {
            lr: config.learning_rate,
            ..Default::default()
        };
        let actor_optim = AdamW::new(
            filter_by_prefix(&actor.varmap, "actor"),
            optim_params.clone(),
        )?;

        // centralized critics are fed every agent's observation and action
        let num_in_critic = match config.algo_type {
            AlgoType::Maddpg => {
                env_obs_spaces.iter().map(AgentSpace::dim).sum::<usize>()
                    + env_act_spaces.iter().map(AgentSpace::dim).sum::<usize>()
            }
            AlgoType::Ddpg => obs_space.dim() + act_space.dim(),
        };
        let critic = Critic::new(
            device,
            DType::F64,
            num_in_critic,
            config.hidden_dim,
            config.rnn_critic,
        )?;
        let critic_optim = AdamW::new(
            filter_by_prefix(&critic.varmap, "critic"),
            optim_params.clone(),
        )?;

        info!(
            "new {} agent: policy in {num_in_pol}, critic in {num_in_critic}",
            config.algo_type,
        );

        Ok(Self {
            act_space,
            obs_space,
            discrete_action,
            exploration,
            selector,
            actor,
            actor_optim,
            critic,
            critic_optim,
            optim_params,
            temperature: config.gumbel_temperature,
            device: device.clone(),
        })
    }

    pub fn act_space(&self) -> &AgentSpace {
        &self.act_space
    }

    pub fn obs_space(&self) -> &AgentSpace {
        &self.obs_space
    }

    pub fn is_discrete(&self) -> bool {
        self.discrete_action
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub(crate) fn selector(&self) -> &ActionSelector {
        &self.selector
    }

    pub(crate) fn temperature(&self) -> f64 {
        self.temperature
    }

    pub fn policy_optimizer(&mut self) -> &mut AdamW {
        &mut self.actor_optim
    }

    pub fn critic_optimizer(&mut self) -> &mut AdamW {
        &mut self.critic_optim
    }

    /// (Re)allocate zero recurrent state broadcast to `batch_size`.
    ///
    /// Required before any recurrent rollout or `step` sequence; the caller
    /// threads the returned state through subsequent calls and discards it
    /// at the next episode-batch start.
    pub fn init_hidden(
        &self,
        batch_size: usize,
    ) -> Result<HiddenState> {
        let policy = if self.actor.network.is_recurrent() {
            Some(Tensor::zeros(
                (batch_size, self.actor.network.hidden_dim()),
                DType::F64,
                &self.device,
            )?)
        } else {
            None
        };
        let critic = if self.critic.network.is_recurrent() {
            Some(Tensor::zeros(
                (batch_size, self.critic.network.hidden_dim()),
                DType::F64,
                &self.device,
            )?)
        } else {
            None
        };
        Ok(HiddenState { policy, critic })
    }

    /// Training-time policy forward over observation sequences `(B,T,O)`.
    ///
    /// Produces per-sub-channel actions `(B,T,A)`. With `requires_grad` the
    /// discrete relaxation keeps a gradient path into the logits; without it
    /// the result is the hard mode. `truncate_steps` bounds backpropagation
    /// depth through the recurrent state without changing forward values.
    pub fn compute_action(
        &self,
        obs: &Tensor,
        hidden: Option<&Tensor>,
        target: bool,
        requires_grad: bool,
        truncate_steps: Option<usize>,
    ) -> Result<ActionChannels> {
        let pi = if target {
            &self.actor.target_network
        } else {
            &self.actor.network
        };
        let logits = policy_logits(pi, obs, hidden, truncate_steps)?;

        let opts = SelectOptions {
            explore: false,
            hard: true,
            reparameterize: requires_grad,
            temperature: self.temperature,
            ..Default::default()
        };
        let mut act = ActionChannels::new();
        for (k, l) in logits.iter() {
            let (action, _) = self.selector.select_action(l, &opts)?;
            act.push(k, action);
        }
        Ok(act)
    }

    /// Training-time critic forward over feature sequences `(B,T,K)`.
    ///
    /// Always collapses to `(B*T,1)` since loss computation downstream
    /// operates on a flattened batch-time axis.
    pub fn compute_value(
        &self,
        vf_in: &Tensor,
        hidden: Option<&Tensor>,
        target: bool,
        truncate_steps: Option<usize>,
    ) -> Result<Tensor> {
        let (bs, ts, _) = vf_in.dims3()?;
        let critic = if target {
            &self.critic.target_network
        } else {
            &self.critic.network
        };
        if critic.is_recurrent() {
            let h0 = hidden.ok_or_else(|| {
                Error::Msg("recurrent critic called without a hidden state".to_string())
            })?;
            let q = rnn_forward_sequence(|x, h| critic.step(x, h), vf_in, h0, truncate_steps)?;
            Tensor::stack(&q, 1)?.reshape((bs * ts, ()))
        } else {
            let (q, _) = critic.forward(&vf_in.reshape((bs * ts, ()))?, None)?;
            Ok(q)
        }
    }

    /// Single-timestep, gradient-free action against the live environment.
    ///
    /// Returns the action per sub-channel together with the successor
    /// recurrent state to thread into the next call. Exploration noise or
    /// epsilon-greedy randomization applies only when `explore` is set;
    /// continuous actions are clamped to `[-1, 1]`.
    pub fn step(
        &mut self,
        obs: &Tensor,
        hidden: Option<&Tensor>,
        explore: bool,
    ) -> Result<(ActionChannels, Option<Tensor>)> {
        let (logits, next_hidden) = self.actor.network.forward(&obs.detach(), hidden)?;

        let noise = match (&mut self.exploration, explore) {
            (Exploration::OrnsteinUhlenbeck(ou), true) => Some(ou.noise()?),
            _ => None,
        };
        let epsilon = match &self.exploration {
            Exploration::Epsilon(eps) => *eps,
            Exploration::OrnsteinUhlenbeck(_) => 0.0,
        };

        let mut act = ActionChannels::new();
        let mut idx = 0;
        for (k, l) in logits.iter() {
            let dim = l.dim(D::Minus1)?;
            let channel_noise = match &noise {
                Some(n) => Some(n.narrow(0, idx, dim)?),
                None => None,
            };
            let opts = SelectOptions {
                explore,
                hard: true,
                reparameterize: false,
                epsilon,
                noise: channel_noise.as_ref(),
                ..Default::default()
            };
            let (mut action, _) = self.selector.select_action(l, &opts)?;
            if !self.discrete_action {
                action = action.clamp(-1.0, 1.0)?;
            }
            act.push(k, action.detach());
            idx += dim;
        }

        let next_hidden = match next_hidden {
            Some(h) => Some(h.detach()),
            None => None,
        };
        Ok((act, next_hidden))
    }

    /// Reinitialize the continuous noise process. No-op for discrete agents.
    pub fn reset_noise(&mut self) -> Result<()> {
        if let Exploration::OrnsteinUhlenbeck(ou) = &mut self.exploration {
            ou.reset()?;
        }
        Ok(())
    }

    /// Anneal exploration: rescales the noise process, or replaces epsilon.
    pub fn scale_noise(
        &mut self,
        scale: f64,
    ) {
        match &mut self.exploration {
            Exploration::Epsilon(eps) => *eps = scale,
            Exploration::OrnsteinUhlenbeck(ou) => ou.scale = scale,
        }
    }

    /// Polyak-blend both target networks towards the live ones.
    pub fn track_targets(
        &mut self,
        tau: f64,
    ) -> Result<()> {
        self.actor.track(tau)?;
        self.critic.track(tau)
    }

    pub fn get_params(&self) -> Result<AgentParams> {
        let mut params = HashMap::new();
        params.insert(
            "policy".to_string(),
            ParamEntry::Network(snapshot(&self.actor.varmap, "actor")?),
        );
        params.insert(
            "target_policy".to_string(),
            ParamEntry::Network(snapshot(&self.actor.varmap, "target-actor")?),
        );
        params.insert(
            "critic".to_string(),
            ParamEntry::Network(snapshot(&self.critic.varmap, "critic")?),
        );
        params.insert(
            "target_critic".to_string(),
            ParamEntry::Network(snapshot(&self.critic.varmap, "target-critic")?),
        );
        params.insert(
            "policy_optimizer".to_string(),
            ParamEntry::Optimizer(self.optim_params.clone()),
        );
        params.insert(
            "critic_optimizer".to_string(),
            ParamEntry::Optimizer(self.optim_params.clone()),
        );
        Ok(params)
    }

    pub fn load_params(
        &mut self,
        params: &AgentParams,
    ) -> Result<()> {
        restore(&mut self.actor.varmap, "actor", network_entry(params, "policy")?)?;
        restore(
            &mut self.actor.varmap,
            "target-actor",
            network_entry(params, "target_policy")?,
        )?;
        restore(&mut self.critic.varmap, "critic", network_entry(params, "critic")?)?;
        restore(
            &mut self.critic.varmap,
            "target-critic",
            network_entry(params, "target_critic")?,
        )?;

        // AdamW moments are internal, rebuild from the stored configuration
        if let Some(ParamEntry::Optimizer(p)) = params.get("policy_optimizer") {
            self.optim_params = p.clone();
        }
        self.actor_optim = AdamW::new(
            filter_by_prefix(&self.actor.varmap, "actor"),
            self.optim_params.clone(),
        )?;
        self.critic_optim = AdamW::new(
            filter_by_prefix(&self.critic.varmap, "critic"),
            self.optim_params.clone(),
        )?;
        Ok(())
    }
}
