use {
    super::{
        configs::AgentConfig,
        ddpg::{
            network_entry,
            policy_logits,
            restore,
            snapshot,
            Actor,
            AgentParams,
            DdpgAgent,
            HiddenState,
            ParamEntry,
        },
    },
    crate::{
        components::SelectOptions,
        networks::filter_by_prefix,
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
    },
    std::collections::BTreeMap,
    tracing::info,
};

/// The learned stand-in for one other agent: an independent policy, its
/// target shadow, and the optimizer driven by the trainer's imitation
/// objective. Never updated through the owning agent's critic loss.
pub(crate) struct MoaModel {
    pub(crate) actor: Actor,
    optimizer: AdamW,
    optim_params: ParamsAdamW,
}

/// A [`DdpgAgent`] that additionally maintains approximate models of every
/// other agent's policy, used to predict teammate behavior under the
/// non-stationarity of their learning.
///
/// The owning agent's position in the joint observation/action spaces is a
/// constructor argument (`self_slot`, conventionally 0) and is validated at
/// construction rather than assumed.
pub struct DdpgMoa {
    ddpg: DdpgAgent,
    self_slot: usize,
    models: BTreeMap<usize, MoaModel>,
}

impl DdpgMoa {
    pub fn new(
        device: &Device,
        config: &AgentConfig,
        self_slot: usize,
        env_obs_spaces: &[AgentSpace],
        env_act_spaces: &[AgentSpace],
    ) -> Result<Self> {
        if env_obs_spaces.len() != env_act_spaces.len() {
            return Err(Error::Msg(format!(
                "mismatched joint spaces: {} observation vs {} action",
                env_obs_spaces.len(),
                env_act_spaces.len(),
            )));
        }
        if self_slot >= env_act_spaces.len() {
            return Err(Error::Msg(format!(
                "self slot {self_slot} out of range for {} agents",
                env_act_spaces.len(),
            )));
        }

        let ddpg = DdpgAgent::new(
            device,
            config,
            env_obs_spaces[self_slot].clone(),
            env_act_spaces[self_slot].clone(),
            env_obs_spaces,
            env_act_spaces,
        )?;
        let mut agent = Self {
            ddpg,
            self_slot,
            models: BTreeMap::new(),
        };
        if config.model_of_agents {
            agent.make_models(device, config, env_obs_spaces, env_act_spaces)?;
        }
        Ok(agent)
    }

    /// Instantiate a policy, target policy and optimizer for each of the
    /// other agents, keyed by that agent's slot in the joint spaces.
    pub fn make_models(
        &mut self,
        device: &Device,
        config: &AgentConfig,
        env_obs_spaces: &[AgentSpace],
        env_act_spaces: &[AgentSpace],
    ) -> Result<()> {
        for (j, (obs_space, act_space)) in
            env_obs_spaces.iter().zip(env_act_spaces).enumerate()
        {
            if j == self.self_slot {
                continue;
            }
            let actor = Actor::new(
                device,
                DType::F64,
                obs_space.dim(),
                act_space,
                config.hidden_dim,
                config.rnn_policy,
                config.constrain_out,
            )?;
            let optim_params = ParamsAdamW {
                lr: config.learning_rate,
                ..Default::default()
            };
            let optimizer = AdamW::new(
                filter_by_prefix(&actor.varmap, "actor"),
                optim_params.clone(),
            )?;
            self.models.insert(
                j,
                MoaModel {
                    actor,
                    optimizer,
                    optim_params,
                },
            );
        }
        info!("modeling {} other agents", self.models.len());
        Ok(())
    }

    pub fn self_slot(&self) -> usize {
        self.self_slot
    }

    /// The slots this agent maintains a model for, in ascending order.
    pub fn modeled_agents(&self) -> impl Iterator<Item = usize> + '_ {
        self.models.keys().copied()
    }

    fn model(
        &self,
        agent_j: usize,
    ) -> Result<&MoaModel> {
        self.models
            .get(&agent_j)
            .ok_or_else(|| Error::Msg(format!("no model for agent {agent_j}")))
    }

    /// Optimizer of the model for agent `agent_j`, for the trainer's
    /// imitation objective.
    pub fn moa_optimizer(
        &mut self,
        agent_j: usize,
    ) -> Result<&mut AdamW> {
        self.models
            .get_mut(&agent_j)
            .map(|m| &mut m.optimizer)
            .ok_or_else(|| Error::Msg(format!("no model for agent {agent_j}")))
    }

    /// Fresh zero recurrent state per modeled agent, keyed by slot.
    pub fn init_moa_hidden(
        &self,
        batch_size: usize,
    ) -> Result<BTreeMap<usize, Option<Tensor>>> {
        let mut hidden = BTreeMap::new();
        for (j, model) in &self.models {
            let h = if model.actor.network.is_recurrent() {
                Some(Tensor::zeros(
                    (batch_size, model.actor.network.hidden_dim()),
                    DType::F64,
                    self.ddpg.device(),
                )?)
            } else {
                None
            };
            hidden.insert(*j, h);
        }
        Ok(hidden)
    }

    /// Evaluate sampled actions under agent `agent_j`'s modeled policy.
    ///
    /// Re-runs the model on `obs` to obtain logits, builds a
    /// non-differentiable-sampling distribution from them and accumulates
    /// log-probability and entropy over `contract_keys` (default: all
    /// sub-channels in declared order). Returns `(B,T,1)` tensors.
    ///
    /// The supplied actions are detached before evaluation: taking the
    /// log-probability of a reparameterized sample would backpropagate the
    /// acting path a second time.
    #[allow(clippy::too_many_arguments)]
    pub fn evaluate_moa_action(
        &self,
        agent_j: usize,
        act_samples: &ActionChannels,
        obs: &Tensor,
        hidden: Option<&Tensor>,
        requires_grad: bool,
        contract_keys: Option<&[&str]>,
        truncate_steps: Option<usize>,
    ) -> Result<(Tensor, Tensor)> {
        let model = self.model(agent_j)?;
        let mut logits = policy_logits(&model.actor.network, obs, hidden, truncate_steps)?;
        if !requires_grad {
            let mut detached = ActionChannels::new();
            for (k, t) in logits.iter() {
                detached.push(k, t.detach());
            }
            logits = detached;
        }

        let opts = SelectOptions {
            explore: false,
            hard: false,
            reparameterize: false,
            ..Default::default()
        };
        let mut log_prob: Option<Tensor> = None;
        let mut entropy: Option<Tensor> = None;
        for (k, seq_logits) in logits.iter() {
            if let Some(keys) = contract_keys {
                if !keys.contains(&k) {
                    continue;
                }
            }
            let action = act_samples.get(k).ok_or_else(|| {
                Error::Msg(format!("no sampled action for channel {k}"))
            })?;
            let (_, dist) = self.ddpg.selector().select_action(seq_logits, &opts)?;

            let lp = dist.log_prob(&action.detach())?.unsqueeze(D::Minus1)?;
            let ent = dist.entropy()?.unsqueeze(D::Minus1)?;
            log_prob = Some(match log_prob {
                Some(acc) => (acc + lp)?,
                None => lp,
            });
            entropy = Some(match entropy {
                Some(acc) => (acc + ent)?,
                None => ent,
            });
        }

        match (log_prob, entropy) {
            (Some(log_prob), Some(entropy)) => Ok((log_prob, entropy)),
            _ => Err(Error::Msg(
                "no sub-channels matched the contract keys".to_string(),
            )),
        }
    }

    /// Training-time forward through agent `agent_j`'s modeled policy,
    /// mirroring [`DdpgAgent::compute_action`]. With `return_logits` the
    /// relaxation is skipped and the raw logits are returned, for callers
    /// that need differentiable scores rather than executable actions.
    #[allow(clippy::too_many_arguments)]
    pub fn compute_moa_action(
        &self,
        agent_j: usize,
        obs: &Tensor,
        hidden: Option<&Tensor>,
        target: bool,
        requires_grad: bool,
        return_logits: bool,
        truncate_steps: Option<usize>,
    ) -> Result<ActionChannels> {
        let model = self.model(agent_j)?;
        let pi = if target {
            &model.actor.target_network
        } else {
            &model.actor.network
        };
        let logits = policy_logits(pi, obs, hidden, truncate_steps)?;
        if return_logits {
            return Ok(logits);
        }

        let opts = SelectOptions {
            explore: false,
            hard: true,
            reparameterize: requires_grad,
            temperature: self.ddpg.temperature(),
            ..Default::default()
        };
        let mut act = ActionChannels::new();
        for (k, l) in logits.iter() {
            let (action, _) = self.ddpg.selector().select_action(l, &opts)?;
            act.push(k, action);
        }
        Ok(act)
    }

    /// Polyak-blend the target of agent `agent_j`'s model towards its live
    /// network.
    pub fn track_moa_target(
        &mut self,
        agent_j: usize,
        tau: f64,
    ) -> Result<()> {
        self.models
            .get_mut(&agent_j)
            .ok_or_else(|| Error::Msg(format!("no model for agent {agent_j}")))?
            .actor
            .track(tau)
    }

    pub fn get_params(&self) -> Result<AgentParams> {
        let mut params = self.ddpg.get_params()?;
        for (j, model) in &self.models {
            params.insert(
                format!("moa_policy_{j}"),
                ParamEntry::Network(snapshot(&model.actor.varmap, "actor")?),
            );
            params.insert(
                format!("moa_target_policy_{j}"),
                ParamEntry::Network(snapshot(&model.actor.varmap, "target-actor")?),
            );
            params.insert(
                format!("moa_optimizer_{j}"),
                ParamEntry::Optimizer(model.optim_params.clone()),
            );
        }
        Ok(params)
    }

    pub fn load_params(
        &mut self,
        params: &AgentParams,
    ) -> Result<()> {
        self.ddpg.load_params(params)?;
        for (j, model) in self.models.iter_mut() {
            restore(
                &mut model.actor.varmap,
                "actor",
                network_entry(params, &format!("moa_policy_{j}"))?,
            )?;
            restore(
                &mut model.actor.varmap,
                "target-actor",
                network_entry(params, &format!("moa_target_policy_{j}"))?,
            )?;
            if let Some(ParamEntry::Optimizer(p)) = params.get(&format!("moa_optimizer_{j}")) {
                model.optim_params = p.clone();
            }
            model.optimizer = AdamW::new(
                filter_by_prefix(&model.actor.varmap, "actor"),
                model.optim_params.clone(),
            )?;
        }
        Ok(())
    }

    // The base contract: identical to `DdpgAgent`, which already routes the
    // discrete relaxation through the shared action selector.

    pub fn base(&self) -> &DdpgAgent {
        &self.ddpg
    }

    pub fn base_mut(&mut self) -> &mut DdpgAgent {
        &mut self.ddpg
    }

    pub fn init_hidden(
        &self,
        batch_size: usize,
    ) -> Result<HiddenState> {
        self.ddpg.init_hidden(batch_size)
    }

    pub fn compute_action(
        &self,
        obs: &Tensor,
        hidden: Option<&Tensor>,
        target: bool,
        requires_grad: bool,
        truncate_steps: Option<usize>,
    ) -> Result<ActionChannels> {
        self.ddpg
            .compute_action(obs, hidden, target, requires_grad, truncate_steps)
    }

    pub fn compute_value(
        &self,
        vf_in: &Tensor,
        hidden: Option<&Tensor>,
        target: bool,
        truncate_steps: Option<usize>,
    ) -> Result<Tensor> {
        self.ddpg.compute_value(vf_in, hidden, target, truncate_steps)
    }

    pub fn step(
        &mut self,
        obs: &Tensor,
        hidden: Option<&Tensor>,
        explore: bool,
    ) -> Result<(ActionChannels, Option<Tensor>)> {
        self.ddpg.step(obs, hidden, explore)
    }

    pub fn reset_noise(&mut self) -> Result<()> {
        self.ddpg.reset_noise()
    }

    pub fn scale_noise(
        &mut self,
        scale: f64,
    ) {
        self.ddpg.scale_noise(scale)
    }

    pub fn track_targets(
        &mut self,
        tau: f64,
    ) -> Result<()> {
        self.ddpg.track_targets(tau)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spaces::Space;

    fn joint_spaces() -> (Vec<AgentSpace>, Vec<AgentSpace>) {
        let obs = vec![
            AgentSpace::Single(Space::Box { dim: 4 }),
            AgentSpace::Single(Space::Box { dim: 4 }),
            AgentSpace::Single(Space::Box { dim: 4 }),
        ];
        let act = vec![
            AgentSpace::Composite(vec![("move".to_string(), Space::Discrete { n: 5 })]),
            AgentSpace::Composite(vec![("move".to_string(), Space::Discrete { n: 5 })]),
            AgentSpace::Composite(vec![("move".to_string(), Space::Discrete { n: 5 })]),
        ];
        (obs, act)
    }

    fn moa_agent(device: &Device) -> DdpgMoa {
        let (obs, act) = joint_spaces();
        let config = AgentConfig {
            model_of_agents: true,
            ..Default::default()
        };
        DdpgMoa::new(device, &config, 0, &obs, &act).unwrap()
    }

    #[test]
    fn test_models_cover_every_other_agent() {
        let device = Device::Cpu;
        let agent = moa_agent(&device);
        let modeled: Vec<usize> = agent.modeled_agents().collect();
        assert_eq!(modeled, vec![1, 2]);
    }

    #[test]
    fn test_self_slot_out_of_range_is_rejected() {
        let device = Device::Cpu;
        let (obs, act) = joint_spaces();
        let config = AgentConfig::default();
        assert!(DdpgMoa::new(&device, &config, 3, &obs, &act).is_err());
    }

    #[test]
    fn test_evaluate_moa_action_shapes() {
        let device = Device::Cpu;
        let agent = moa_agent(&device);
        let obs = Tensor::zeros((2, 3, 4), DType::F64, &device).unwrap();

        let sampled = agent
            .compute_moa_action(1, &obs, None, false, false, false, None)
            .unwrap();
        let (log_prob, entropy) = agent
            .evaluate_moa_action(1, &sampled, &obs, None, true, None, None)
            .unwrap();

        assert_eq!(log_prob.dims(), &[2, 3, 1]);
        assert_eq!(entropy.dims(), &[2, 3, 1]);
        let ent: Vec<f64> = entropy.flatten_all().unwrap().to_vec1().unwrap();
        assert!(ent.iter().all(|v| v.is_finite() && *v >= 0.0));
    }

    #[test]
    fn test_compute_moa_action_can_return_raw_logits() {
        let device = Device::Cpu;
        let agent = moa_agent(&device);
        let obs = Tensor::zeros((2, 3, 4), DType::F64, &device).unwrap();

        let logits = agent
            .compute_moa_action(2, &obs, None, false, true, true, None)
            .unwrap();
        let values: Vec<f64> = logits
            .get("move")
            .unwrap()
            .flatten_all()
            .unwrap()
            .to_vec1()
            .unwrap();
        // raw logits, not one-hot samples
        assert_eq!(logits.get("move").unwrap().dims(), &[2, 3, 5]);
        assert!(values.iter().any(|v| *v != 0.0 && *v != 1.0));
    }

    #[test]
    fn test_unmodeled_agent_is_an_error() {
        let device = Device::Cpu;
        let agent = moa_agent(&device);
        let obs = Tensor::zeros((2, 3, 4), DType::F64, &device).unwrap();
        assert!(agent
            .compute_moa_action(0, &obs, None, false, true, false, None)
            .is_err());
    }

    #[test]
    fn test_checkpoint_includes_moa_entries() {
        let device = Device::Cpu;
        let agent = moa_agent(&device);
        let params = agent.get_params().unwrap();
        for key in [
            "policy",
            "critic",
            "moa_policy_1",
            "moa_target_policy_1",
            "moa_optimizer_1",
            "moa_policy_2",
        ] {
            assert!(params.contains_key(key), "missing checkpoint entry {key}");
        }
    }

    #[test]
    fn test_moa_params_roundtrip() {
        let device = Device::Cpu;
        let donor = moa_agent(&device);
        let mut receiver = moa_agent(&device);
        receiver.load_params(&donor.get_params().unwrap()).unwrap();

        let obs = Tensor::randn(0.0, 1.0, (2, 3, 4), &device).unwrap();
        let a = donor
            .compute_moa_action(1, &obs, None, false, false, true, None)
            .unwrap();
        let b = receiver
            .compute_moa_action(1, &obs, None, false, false, true, None)
            .unwrap();
        let a: Vec<f64> = a.get("move").unwrap().flatten_all().unwrap().to_vec1().unwrap();
        let b: Vec<f64> = b.get("move").unwrap().flatten_all().unwrap().to_vec1().unwrap();
        assert_eq!(a, b);
    }
}
