use {
    candle_core::Tensor,
    serde::{
        Deserialize,
        Serialize,
    },
};

/// Channel name used when an agent's space has no named sub-channels.
pub const DEFAULT_CHANNEL: &str = "default";

/// A single observation or action space.
///
/// `Box` is a fixed-size real vector bounded to `[-1, 1]`, `Discrete` is a
/// one-of-N categorical encoded as a one-hot vector of width `n`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Space {
    Box { dim: usize },
    Discrete { n: usize },
}

impl Space {
    /// Width of the tensor representation of this space.
    pub fn dim(&self) -> usize {
        match self {
            Space::Box { dim } => *dim,
            Space::Discrete { n } => *n,
        }
    }

    pub fn is_discrete(&self) -> bool {
        matches!(self, Space::Discrete { .. })
    }
}

/// The observation or action layout of a single agent.
///
/// Either one space, or a fixed, ordered list of named sub-channels
/// (conventionally `move` and `comm`). All sub-channels of one agent share
/// the same action type, continuous or discrete.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgentSpace {
    Single(Space),
    Composite(Vec<(String, Space)>),
}

impl AgentSpace {
    /// Whether this space is discrete, judged by the first sub-channel.
    pub fn is_discrete(&self) -> bool {
        match self {
            AgentSpace::Single(sp) => sp.is_discrete(),
            AgentSpace::Composite(subs) => {
                subs.first().map(|(_, sp)| sp.is_discrete()).unwrap_or(false)
            }
        }
    }

    /// Total width over all sub-channels.
    pub fn dim(&self) -> usize {
        match self {
            AgentSpace::Single(sp) => sp.dim(),
            AgentSpace::Composite(subs) => subs.iter().map(|(_, sp)| sp.dim()).sum(),
        }
    }

    /// Width of the named sub-channel.
    ///
    /// A name not declared in a composite space is treated as a zero-width
    /// channel rather than an error, so agents without e.g. a `comm` channel
    /// simply contribute nothing to it.
    pub fn dim_of(&self, key: &str) -> usize {
        match self {
            AgentSpace::Single(sp) => sp.dim(),
            AgentSpace::Composite(subs) => subs
                .iter()
                .find(|(name, _)| name == key)
                .map(|(_, sp)| sp.dim())
                .unwrap_or(0),
        }
    }

    /// The named sub-channels in declared order. A `Single` space shows up
    /// as one channel named [`DEFAULT_CHANNEL`].
    pub fn channels(&self) -> Vec<(&str, Space)> {
        match self {
            AgentSpace::Single(sp) => vec![(DEFAULT_CHANNEL, *sp)],
            AgentSpace::Composite(subs) => {
                subs.iter().map(|(name, sp)| (name.as_str(), *sp)).collect()
            }
        }
    }
}

/// An ordered map from sub-channel name to tensor.
///
/// Used for per-channel logits and actions. Iteration always follows the
/// order in which channels were declared in the [`AgentSpace`].
#[derive(Clone, Debug)]
pub struct ActionChannels {
    entries: Vec<(String, Tensor)>,
}

impl ActionChannels {
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    /// Append a channel, or replace it in place if the name already exists.
    pub fn push(
        &mut self,
        name: impl Into<String>,
        tensor: Tensor,
    ) {
        let name = name.into();
        match self.entries.iter_mut().find(|(k, _)| *k == name) {
            Some((_, t)) => *t = tensor,
            None => self.entries.push((name, tensor)),
        }
    }

    pub fn get(
        &self,
        name: &str,
    ) -> Option<&Tensor> {
        self.entries
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, t)| t)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Tensor)> {
        self.entries.iter().map(|(k, t)| (k.as_str(), t))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for ActionChannels {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_composite_dim_is_sum_of_subchannels() {
        let space = AgentSpace::Composite(vec![
            ("move".to_string(), Space::Discrete { n: 5 }),
            ("comm".to_string(), Space::Discrete { n: 3 }),
        ]);
        let total: usize = space
            .channels()
            .iter()
            .map(|(name, _)| space.dim_of(name))
            .sum();
        assert_eq!(space.dim(), total);
        assert_eq!(space.dim(), 8);
    }

    #[test]
    fn test_absent_subchannel_is_zero_width() {
        let space = AgentSpace::Composite(vec![(
            "move".to_string(),
            Space::Box { dim: 2 },
        )]);
        assert_eq!(space.dim_of("comm"), 0);
        assert_eq!(space.dim_of("move"), 2);
    }

    #[test]
    fn test_single_space_ignores_key() {
        let space = AgentSpace::Single(Space::Box { dim: 4 });
        assert_eq!(space.dim_of("anything"), 4);
        assert_eq!(space.channels()[0].0, DEFAULT_CHANNEL);
    }

    #[test]
    fn test_channels_keep_declared_order() {
        let space = AgentSpace::Composite(vec![
            ("move".to_string(), Space::Discrete { n: 5 }),
            ("comm".to_string(), Space::Discrete { n: 3 }),
        ]);
        let names: Vec<&str> = space.channels().iter().map(|(n, _)| *n).collect();
        assert_eq!(names, vec!["move", "comm"]);
    }
}
