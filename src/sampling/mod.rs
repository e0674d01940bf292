//! # Sampling
//!
//! The addressing scheme and containers that map a flat experience buffer
//! into the labeled per-agent, per-field tensors the learner consumes.
//!
//! [`get_sample_scheme`] enumerates the layout, [`SampleBatch`] and
//! [`EpisodeBatch`] hold tensors following it, [`dispatch_samples`] decodes
//! a batch into per-agent fields, and [`SampleBatch::switch_agents`] /
//! [`switch_list`] rotate a chosen agent into the learner's fixed slot for
//! ensemble/population training.

mod batch;
mod dispatch;
mod ensemble;
mod scheme;

pub use batch::{
    Batch,
    EpisodeBatch,
    SampleBatch,
};
pub use dispatch::{
    dispatch_samples,
    AgentField,
};
pub use ensemble::switch_list;
pub use scheme::{
    get_sample_scheme,
    Field,
    SampleScheme,
    SchemeKey,
    ShapeSpec,
};
