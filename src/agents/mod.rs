mod ddpg;
mod ddpg_moa;

pub mod configs;

pub use ddpg::{
    AgentParams,
    DdpgAgent,
    Exploration,
    HiddenState,
    ParamEntry,
};
pub use ddpg_moa::DdpgMoa;


use {
    serde::{
        Deserialize,
        Serialize,
    },
    strum::Display,
};

/// Whether critics see the joint observation/action of every agent
/// (centralized, MADDPG-style) or only their own agent's (local).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Display)]
pub enum AlgoType {
    #[strum(serialize = "MADDPG")]
    Maddpg,
    #[strum(serialize = "DDPG")]
    Ddpg,
}
