mod ddpg;

pub use ddpg::AgentConfig;
