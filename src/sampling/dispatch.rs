use {
    super::{
        batch::Batch,
        scheme::Field,
    },
    crate::spaces::{
        ActionChannels,
        DEFAULT_CHANNEL,
    },
    candle_core::{
        Error,
        Result,
        Tensor,
    },
};

/// One agent's slice of one field: a bare tensor, or a map from sub-channel
/// name to tensor when the agent's space is composite.
#[derive(Clone, Debug)]
pub enum AgentField {
    Single(Tensor),
    Composite(ActionChannels),
}

impl AgentField {
    pub fn tensor(&self) -> Option<&Tensor> {
        match self {
            AgentField::Single(t) => Some(t),
            AgentField::Composite(_) => None,
        }
    }

    pub fn channels(&self) -> Option<&ActionChannels> {
        match self {
            AgentField::Single(_) => None,
            AgentField::Composite(c) => Some(c),
        }
    }
}

/// Decode a raw batch into the per-agent tensors the learner consumes.
///
/// For each requested field (default: obs, action, reward, next_obs, done)
/// the result holds one entry per agent, in agent-index order regardless of
/// the scheme's insertion order. Agents with a composite space yield an
/// [`AgentField::Composite`] map, others the bare tensor.
pub fn dispatch_samples<B: Batch>(
    sample: &B,
    n_agents: usize,
    fields: Option<&[Field]>,
) -> Result<Vec<Vec<AgentField>>> {
    let fields = fields.unwrap_or(&Field::DEFAULT);
    let mut parsed = Vec::with_capacity(fields.len());
    for field in fields {
        let mut per_agent = Vec::with_capacity(n_agents);
        for i in 0..n_agents {
            let keys = sample.scheme().keys_for(*field, i);
            if keys.is_empty() {
                return Err(Error::Msg(format!("no scheme entry for {field}/{i}")));
            }
            let entry = if keys.len() > 1 {
                let mut channels = ActionChannels::new();
                for key in keys {
                    let tensor = sample
                        .get(key)
                        .ok_or_else(|| Error::Msg(format!("batch is missing {key}")))?;
                    let sub = key.sub.as_deref().unwrap_or(DEFAULT_CHANNEL);
                    channels.push(sub, tensor.clone());
                }
                AgentField::Composite(channels)
            } else {
                let tensor = sample
                    .get(keys[0])
                    .ok_or_else(|| Error::Msg(format!("batch is missing {}", keys[0])))?;
                AgentField::Single(tensor.clone())
            };
            per_agent.push(entry);
        }
        parsed.push(per_agent);
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sampling::{
        batch::SampleBatch,
        scheme::get_sample_scheme,
    };
    use crate::spaces::{
        AgentSpace,
        Space,
    };
    use candle_core::Device;

    #[test]
    fn test_dispatch_returns_plain_obs_tensors_per_agent() {
        let device = Device::Cpu;
        let obs = vec![AgentSpace::Single(Space::Box { dim: 3 }); 2];
        let act = vec![AgentSpace::Single(Space::Discrete { n: 5 }); 2];
        let scheme = get_sample_scheme(2, &obs, &act);
        let batch = SampleBatch::new(scheme, 4, None, &device).unwrap();

        let parsed = dispatch_samples(&batch, 2, Some(&[Field::Obs])).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].len(), 2);
        for entry in &parsed[0] {
            // plain width-3 tensors, never a next_obs tensor
            let tensor = entry.tensor().expect("single space yields a bare tensor");
            assert_eq!(tensor.dims(), &[4, 3]);
        }
    }

    #[test]
    fn test_dispatch_default_fields_cover_the_transition() {
        let device = Device::Cpu;
        let obs = vec![AgentSpace::Single(Space::Box { dim: 3 }); 2];
        let act = vec![AgentSpace::Single(Space::Discrete { n: 5 }); 2];
        let scheme = get_sample_scheme(2, &obs, &act);
        let batch = SampleBatch::new(scheme, 4, None, &device).unwrap();

        let parsed = dispatch_samples(&batch, 2, None).unwrap();
        // obs, action, reward, next_obs, done
        assert_eq!(parsed.len(), 5);
        assert_eq!(parsed[1][0].tensor().unwrap().dims(), &[4, 5]);
        assert_eq!(parsed[2][1].tensor().unwrap().dims(), &[4, 1]);
    }

    #[test]
    fn test_dispatch_composite_yields_subchannel_map() {
        let device = Device::Cpu;
        let obs = vec![AgentSpace::Single(Space::Box { dim: 4 })];
        let act = vec![AgentSpace::Composite(vec![
            ("move".to_string(), Space::Discrete { n: 5 }),
            ("comm".to_string(), Space::Discrete { n: 3 }),
        ])];
        let scheme = get_sample_scheme(1, &obs, &act);
        let batch = SampleBatch::new(scheme, 2, None, &device).unwrap();

        let parsed = dispatch_samples(&batch, 1, Some(&[Field::Action])).unwrap();
        let channels = parsed[0][0].channels().expect("composite space yields a map");
        assert_eq!(channels.get("move").unwrap().dims(), &[2, 5]);
        assert_eq!(channels.get("comm").unwrap().dims(), &[2, 3]);
    }

    #[test]
    fn test_dispatch_unknown_agent_is_an_error() {
        let device = Device::Cpu;
        let obs = vec![AgentSpace::Single(Space::Box { dim: 3 })];
        let act = vec![AgentSpace::Single(Space::Discrete { n: 5 })];
        let scheme = get_sample_scheme(1, &obs, &act);
        let batch = SampleBatch::new(scheme, 4, None, &device).unwrap();
        assert!(dispatch_samples(&batch, 2, Some(&[Field::Obs])).is_err());
    }
}
