use {
    super::{
        batch::{
            EpisodeBatch,
            SampleBatch,
        },
        scheme::{
            SampleScheme,
            SchemeKey,
        },
    },
    candle_core::Tensor,
    std::collections::HashMap,
};

/// Put `items[i]` first and shift `items[..i]` back by one; everything
/// after `i` keeps its position.
pub fn switch_list<T: Clone>(
    items: &[T],
    i: usize,
) -> Vec<T> {
    let mut out = Vec::with_capacity(items.len());
    out.push(items[i].clone());
    out.extend(items[..i].iter().cloned());
    out.extend(items[i + 1..].iter().cloned());
    out
}

/// The agent-index permutation behind [`switch_list`]: `i` maps to slot 0,
/// agents before `i` shift up by one, agents after `i` are untouched.
fn rotate_agent(
    agent: usize,
    i: usize,
) -> usize {
    if agent == i {
        0
    } else if agent < i {
        agent + 1
    } else {
        agent
    }
}

fn rotate_scheme(
    scheme: &SampleScheme,
    i: usize,
) -> SampleScheme {
    let mut out = SampleScheme::new();
    for (key, spec) in scheme.iter() {
        let mut key = key.clone();
        key.agent = rotate_agent(key.agent, i);
        out.insert(key, *spec);
    }
    out
}

fn rotate_data(
    data: &HashMap<SchemeKey, Tensor>,
    i: usize,
) -> HashMap<SchemeKey, Tensor> {
    data.iter()
        .map(|(key, tensor)| {
            let mut key = key.clone();
            key.agent = rotate_agent(key.agent, i);
            // keys are remapped, tensor contents are never touched
            (key, tensor.clone())
        })
        .collect()
}

impl SampleBatch {
    /// A copy of this batch with agent `i`'s fields in slot 0 and agents
    /// `0..i` shifted to `1..=i`. Identity when `i == 0`.
    ///
    /// Used to let a rotating population member always train in the
    /// learner's fixed "self" slot while the centralized-critic input
    /// ordering stays consistent.
    pub fn switch_agents(
        &self,
        i: usize,
    ) -> Self {
        if i == 0 {
            return self.clone();
        }
        Self {
            scheme: rotate_scheme(&self.scheme, i),
            batch_size: self.batch_size,
            device: self.device.clone(),
            data: rotate_data(&self.data, i),
        }
    }
}

impl EpisodeBatch {
    /// See [`SampleBatch::switch_agents`].
    pub fn switch_agents(
        &self,
        i: usize,
    ) -> Self {
        if i == 0 {
            return self.clone();
        }
        Self {
            scheme: rotate_scheme(&self.scheme, i),
            batch_size: self.batch_size,
            max_seq_length: self.max_seq_length,
            device: self.device.clone(),
            data: rotate_data(&self.data, i),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sampling::{
        batch::Batch,
        scheme::{
            get_sample_scheme,
            Field,
        },
    };
    use crate::spaces::{
        AgentSpace,
        Space,
    };
    use candle_core::{
        DType,
        Device,
    };

    fn tagged_batch(device: &Device) -> SampleBatch {
        // each agent's obs filled with its own index so moves are visible
        let obs = vec![AgentSpace::Single(Space::Box { dim: 2 }); 3];
        let act = vec![AgentSpace::Single(Space::Box { dim: 1 }); 3];
        let scheme = get_sample_scheme(3, &obs, &act);
        let mut batch = SampleBatch::new(scheme, 2, None, device).unwrap();
        for i in 0..3 {
            let tagged = Tensor::full(i as f64, (2, 2), device).unwrap();
            batch.insert(SchemeKey::new(Field::Obs, i), tagged).unwrap();
        }
        batch
    }

    fn obs_tag(
        batch: &SampleBatch,
        agent: usize,
    ) -> f64 {
        batch
            .get(&SchemeKey::new(Field::Obs, agent))
            .unwrap()
            .flatten_all()
            .unwrap()
            .to_vec1::<f64>()
            .unwrap()[0]
    }

    #[test]
    fn test_switch_zero_is_identity() {
        let device = Device::Cpu;
        let batch = tagged_batch(&device);
        let switched = batch.switch_agents(0);
        assert_eq!(batch.scheme, switched.scheme);
        for agent in 0..3 {
            assert_eq!(obs_tag(&batch, agent), obs_tag(&switched, agent));
        }
    }

    #[test]
    fn test_switch_moves_agent_to_front() {
        let device = Device::Cpu;
        let batch = tagged_batch(&device);
        let switched = batch.switch_agents(2);
        // [0,1,2] -> [2,0,1]
        assert_eq!(obs_tag(&switched, 0), 2.0);
        assert_eq!(obs_tag(&switched, 1), 0.0);
        assert_eq!(obs_tag(&switched, 2), 1.0);
    }

    #[test]
    fn test_switch_preserves_shape_specs() {
        let device = Device::Cpu;
        let batch = tagged_batch(&device);
        let switched = batch.switch_agents(1);
        assert_eq!(batch.scheme.len(), switched.scheme.len());
        for agent in 0..3 {
            let spec = switched.scheme.get(&SchemeKey::new(Field::Done, agent)).unwrap();
            assert_eq!(spec.dim, 1);
            assert_eq!(spec.dtype, DType::U8);
        }
    }

    /// The rotation is a single-step cycle over slots `0..=i`, not an
    /// involution: applying it twice does not restore the batch, cycling
    /// `i + 1` times does.
    #[test]
    fn test_switch_twice_is_not_identity_but_full_cycle_is() {
        let device = Device::Cpu;
        let batch = tagged_batch(&device);

        let twice = batch.switch_agents(2).switch_agents(2);
        assert_ne!(obs_tag(&batch, 0), obs_tag(&twice, 0));

        let cycled = batch.switch_agents(2).switch_agents(2).switch_agents(2);
        for agent in 0..3 {
            assert_eq!(obs_tag(&batch, agent), obs_tag(&cycled, agent));
        }
    }

    #[test]
    fn test_switch_episode_batch_keeps_time_axis() {
        let device = Device::Cpu;
        let obs = vec![AgentSpace::Single(Space::Box { dim: 2 }); 2];
        let act = vec![AgentSpace::Single(Space::Box { dim: 1 }); 2];
        let scheme = get_sample_scheme(2, &obs, &act);
        let batch = EpisodeBatch::new(scheme, 3, 6, None, &device).unwrap();
        let switched = batch.switch_agents(1);
        assert_eq!(switched.max_seq_length(), 6);
        assert_eq!(
            switched
                .get(&SchemeKey::new(Field::Obs, 0))
                .unwrap()
                .dims(),
            &[3, 6, 2],
        );
    }
}
