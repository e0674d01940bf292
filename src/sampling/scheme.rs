use {
    crate::spaces::AgentSpace,
    candle_core::DType,
    serde::{
        Deserialize,
        Serialize,
    },
    std::{
        collections::HashMap,
        fmt::Display,
    },
    strum::Display,
};

/// The experience fields every agent contributes to a sample.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[strum(serialize_all = "snake_case")]
pub enum Field {
    Obs,
    NextObs,
    Action,
    Reward,
    Done,
}

impl Field {
    /// The default decode order used by the learner.
    pub const DEFAULT: [Field; 5] = [
        Field::Obs,
        Field::Action,
        Field::Reward,
        Field::NextObs,
        Field::Done,
    ];
}

/// Structured address of one tensor in a sample: which field, which agent,
/// and which sub-channel if the agent's space is composite.
///
/// Addressing by structure rather than by string keys makes field
/// collisions (like `obs` matching inside `next_obs`) unrepresentable.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SchemeKey {
    pub field: Field,
    pub agent: usize,
    pub sub: Option<String>,
}

impl SchemeKey {
    pub fn new(
        field: Field,
        agent: usize,
    ) -> Self {
        Self {
            field,
            agent,
            sub: None,
        }
    }

    pub fn with_sub(
        field: Field,
        agent: usize,
        sub: impl Into<String>,
    ) -> Self {
        Self {
            field,
            agent,
            sub: Some(sub.into()),
        }
    }
}

impl Display for SchemeKey {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match &self.sub {
            Some(sub) => write!(f, "{}/{}/{}", self.field, self.agent, sub),
            None => write!(f, "{}/{}", self.field, self.agent),
        }
    }
}

/// Declared shape and kind of one scheme entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ShapeSpec {
    pub dim: usize,
    pub dtype: DType,
}

impl ShapeSpec {
    pub fn float(dim: usize) -> Self {
        Self {
            dim,
            dtype: DType::F64,
        }
    }

    pub fn flag() -> Self {
        Self {
            dim: 1,
            dtype: DType::U8,
        }
    }
}

/// An ordered mapping from [`SchemeKey`] to [`ShapeSpec`].
///
/// The single source of truth for how experience is laid out, consumed by
/// the storage buffer and by [`super::dispatch_samples`]. Entries keep
/// insertion order; lookups go through an index.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SampleScheme {
    entries: Vec<(SchemeKey, ShapeSpec)>,
    index: HashMap<SchemeKey, usize>,
}

impl SampleScheme {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry, replacing the spec in place if the key exists.
    pub fn insert(
        &mut self,
        key: SchemeKey,
        spec: ShapeSpec,
    ) {
        match self.index.get(&key) {
            Some(&pos) => self.entries[pos].1 = spec,
            None => {
                self.index.insert(key.clone(), self.entries.len());
                self.entries.push((key, spec));
            }
        }
    }

    pub fn get(
        &self,
        key: &SchemeKey,
    ) -> Option<&ShapeSpec> {
        self.index.get(key).map(|&pos| &self.entries[pos].1)
    }

    pub fn contains(
        &self,
        key: &SchemeKey,
    ) -> bool {
        self.index.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SchemeKey, &ShapeSpec)> {
        self.entries.iter().map(|(k, s)| (k, s))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All keys for one field of one agent, in declared order.
    pub fn keys_for(
        &self,
        field: Field,
        agent: usize,
    ) -> Vec<&SchemeKey> {
        self.entries
            .iter()
            .filter(|(k, _)| k.field == field && k.agent == agent)
            .map(|(k, _)| k)
            .collect()
    }
}

/// Enumerate the sample layout for `n_agents` agents: per agent one entry
/// per observation sub-field (and its `next_obs` counterpart) and per
/// action sub-field, plus one `reward` and one `done` entry.
pub fn get_sample_scheme(
    n_agents: usize,
    obs_spaces: &[AgentSpace],
    act_spaces: &[AgentSpace],
) -> SampleScheme {
    let mut scheme = SampleScheme::new();
    for i in 0..n_agents {
        let (obs_space, act_space) = (&obs_spaces[i], &act_spaces[i]);

        match obs_space {
            AgentSpace::Single(sp) => {
                scheme.insert(SchemeKey::new(Field::Obs, i), ShapeSpec::float(sp.dim()));
                scheme.insert(SchemeKey::new(Field::NextObs, i), ShapeSpec::float(sp.dim()));
            }
            AgentSpace::Composite(subs) => {
                for (k, sp) in subs {
                    scheme.insert(
                        SchemeKey::with_sub(Field::Obs, i, k.clone()),
                        ShapeSpec::float(sp.dim()),
                    );
                    scheme.insert(
                        SchemeKey::with_sub(Field::NextObs, i, k.clone()),
                        ShapeSpec::float(sp.dim()),
                    );
                }
            }
        }

        match act_space {
            AgentSpace::Single(sp) => {
                scheme.insert(SchemeKey::new(Field::Action, i), ShapeSpec::float(sp.dim()));
            }
            AgentSpace::Composite(subs) => {
                for (k, sp) in subs {
                    scheme.insert(
                        SchemeKey::with_sub(Field::Action, i, k.clone()),
                        ShapeSpec::float(sp.dim()),
                    );
                }
            }
        }

        scheme.insert(SchemeKey::new(Field::Reward, i), ShapeSpec::float(1));
        scheme.insert(SchemeKey::new(Field::Done, i), ShapeSpec::flag());
    }
    scheme
}
