use {
    super::scheme::{
        SampleScheme,
        SchemeKey,
    },
    candle_core::{
        Device,
        Error,
        Result,
        Tensor,
    },
    std::collections::HashMap,
};

/// Uniform read access over the batch containers, for the dispatcher.
pub trait Batch {
    fn scheme(&self) -> &SampleScheme;
    fn get(
        &self,
        key: &SchemeKey,
    ) -> Option<&Tensor>;
}

/// A batch of single-step transitions, one tensor per scheme key, each
/// shaped `(batch_size, dim)`.
///
/// # Fields
///
/// * `scheme` - The layout the tensors follow.
/// * `batch_size` - Size of the leading batch axis.
/// * `data` - The tensors, keyed by scheme key.
#[derive(Clone)]
pub struct SampleBatch {
    pub(crate) scheme: SampleScheme,
    pub(crate) batch_size: usize,
    pub(crate) device: Device,
    pub(crate) data: HashMap<SchemeKey, Tensor>,
}

impl SampleBatch {
    /// Create a batch over `scheme`. Without `data`, every entry is
    /// zero-filled at its declared shape and kind.
    pub fn new(
        scheme: SampleScheme,
        batch_size: usize,
        data: Option<HashMap<SchemeKey, Tensor>>,
        device: &Device,
    ) -> Result<Self> {
        let data = match data {
            Some(data) => data,
            None => {
                let mut zeroed = HashMap::new();
                for (key, spec) in scheme.iter() {
                    zeroed.insert(
                        key.clone(),
                        Tensor::zeros((batch_size, spec.dim), spec.dtype, device)?,
                    );
                }
                zeroed
            }
        };
        Ok(Self {
            scheme,
            batch_size,
            device: device.clone(),
            data,
        })
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Store a tensor under a key declared in the scheme.
    pub fn insert(
        &mut self,
        key: SchemeKey,
        tensor: Tensor,
    ) -> Result<()> {
        if !self.scheme.contains(&key) {
            return Err(Error::Msg(format!("key {key} not declared in scheme")));
        }
        self.data.insert(key, tensor);
        Ok(())
    }
}

impl Batch for SampleBatch {
    fn scheme(&self) -> &SampleScheme {
        &self.scheme
    }

    fn get(
        &self,
        key: &SchemeKey,
    ) -> Option<&Tensor> {
        self.data.get(key)
    }
}

/// A batch of fixed-length episodes, one tensor per scheme key, each shaped
/// `(batch_size, max_seq_length, dim)`.
#[derive(Clone)]
pub struct EpisodeBatch {
    pub(crate) scheme: SampleScheme,
    pub(crate) batch_size: usize,
    pub(crate) max_seq_length: usize,
    pub(crate) device: Device,
    pub(crate) data: HashMap<SchemeKey, Tensor>,
}

impl EpisodeBatch {
    pub fn new(
        scheme: SampleScheme,
        batch_size: usize,
        max_seq_length: usize,
        data: Option<HashMap<SchemeKey, Tensor>>,
        device: &Device,
    ) -> Result<Self> {
        let data = match data {
            Some(data) => data,
            None => {
                let mut zeroed = HashMap::new();
                for (key, spec) in scheme.iter() {
                    zeroed.insert(
                        key.clone(),
                        Tensor::zeros(
                            (batch_size, max_seq_length, spec.dim),
                            spec.dtype,
                            device,
                        )?,
                    );
                }
                zeroed
            }
        };
        Ok(Self {
            scheme,
            batch_size,
            max_seq_length,
            device: device.clone(),
            data,
        })
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn max_seq_length(&self) -> usize {
        self.max_seq_length
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn insert(
        &mut self,
        key: SchemeKey,
        tensor: Tensor,
    ) -> Result<()> {
        if !self.scheme.contains(&key) {
            return Err(Error::Msg(format!("key {key} not declared in scheme")));
        }
        self.data.insert(key, tensor);
        Ok(())
    }
}

impl Batch for EpisodeBatch {
    fn scheme(&self) -> &SampleScheme {
        &self.scheme
    }

    fn get(
        &self,
        key: &SchemeKey,
    ) -> Option<&Tensor> {
        self.data.get(key)
    }
}
