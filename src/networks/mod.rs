use {
    crate::spaces::{
        ActionChannels,
        AgentSpace,
    },
    candle_core::{
        D,
        Error,
        Module,
        Result,
        Tensor,
        Var,
    },
    candle_nn::{
        linear,
        ops::sigmoid,
        sequential::seq,
        Activation,
        Linear,
        Sequential,
        VarBuilder,
        VarMap,
    },
};

/// Blend the parameters under `network_prefix` into those under
/// `target_prefix` with weight `tau`. Both sets must live in `varmap`.
pub fn track(
    varmap: &mut VarMap,
    target_prefix: &str,
    network_prefix: &str,
    tau: f64,
) -> Result<()> {
    let updates = {
        let data = varmap.data().lock().unwrap();
        let mut updates = Vec::new();
        for (name, var) in data.iter() {
            if let Some(suffix) = name.strip_prefix(network_prefix) {
                let target_name = format!("{target_prefix}{suffix}");
                let target = data.get(&target_name).ok_or_else(|| {
                    Error::Msg(format!("no tracked parameter named {target_name}"))
                })?;
                let blended =
                    ((tau * var.as_tensor())? + ((1.0 - tau) * target.as_tensor())?)?;
                updates.push((target_name, blended));
            }
        }
        updates
    };
    for (name, value) in updates {
        varmap.set_one(name, value)?;
    }
    Ok(())
}

/// All variables in `varmap` whose name starts with `prefix`.
pub fn filter_by_prefix(
    varmap: &VarMap,
    prefix: &str,
) -> Vec<Var> {
    varmap
        .data()
        .lock()
        .unwrap()
        .iter()
        .filter_map(|(name, var)| name.starts_with(prefix).then_some(var.clone()))
        .collect()
}

/// A single GRU step built from linear gates, so the hidden state stays a
/// plain `(batch, hidden)` tensor owned by the caller.
pub struct GruCell {
    ih: Linear,
    hh: Linear,
    hidden_dim: usize,
}

impl GruCell {
    pub fn new(
        in_dim: usize,
        hidden_dim: usize,
        vb: VarBuilder,
    ) -> Result<Self> {
        Ok(Self {
            ih: linear(in_dim, 3 * hidden_dim, vb.pp("ih"))?,
            hh: linear(hidden_dim, 3 * hidden_dim, vb.pp("hh"))?,
            hidden_dim,
        })
    }

    pub fn step(
        &self,
        x: &Tensor,
        h: &Tensor,
    ) -> Result<Tensor> {
        let gx = self.ih.forward(x)?;
        let gh = self.hh.forward(h)?;
        let (rx, zx, nx) = (
            gx.narrow(D::Minus1, 0, self.hidden_dim)?,
            gx.narrow(D::Minus1, self.hidden_dim, self.hidden_dim)?,
            gx.narrow(D::Minus1, 2 * self.hidden_dim, self.hidden_dim)?,
        );
        let (rh, zh, nh) = (
            gh.narrow(D::Minus1, 0, self.hidden_dim)?,
            gh.narrow(D::Minus1, self.hidden_dim, self.hidden_dim)?,
            gh.narrow(D::Minus1, 2 * self.hidden_dim, self.hidden_dim)?,
        );
        let r = sigmoid(&(rx + rh)?)?;
        let z = sigmoid(&(zx + zh)?)?;
        let n = (nx + (r * nh)?)?.tanh()?;
        // h' = (1 - z) * n + z * h
        (z.affine(-1.0, 1.0)? * n)? + (z * h)?
    }
}

enum Trunk {
    Mlp(Sequential),
    Gru { fc0: Linear, cell: GruCell },
}

impl Trunk {
    fn new(
        vb: &VarBuilder,
        in_dim: usize,
        hidden_dim: usize,
        recurrent: bool,
    ) -> Result<Self> {
        if recurrent {
            Ok(Self::Gru {
                fc0: linear(in_dim, hidden_dim, vb.pp("fc0"))?,
                cell: GruCell::new(hidden_dim, hidden_dim, vb.pp("gru"))?,
            })
        } else {
            Ok(Self::Mlp(
                seq()
                    .add(linear(in_dim, hidden_dim, vb.pp("fc0"))?)
                    .add(Activation::Relu)
                    .add(linear(hidden_dim, hidden_dim, vb.pp("fc1"))?)
                    .add(Activation::Relu),
            ))
        }
    }
}

/// Policy function approximator: observation in, one logits tensor per
/// action sub-channel out.
///
/// Non-recurrent variants ignore the hidden state and return `None` for it;
/// recurrent variants require it and return the successor state.
pub struct PolicyNet {
    trunk: Trunk,
    heads: Vec<(String, Linear)>,
    constrain_out: bool,
    hidden_dim: usize,
}

impl PolicyNet {
    pub fn new(
        vb: VarBuilder,
        in_dim: usize,
        act_space: &AgentSpace,
        hidden_dim: usize,
        recurrent: bool,
        constrain_out: bool,
    ) -> Result<Self> {
        let trunk = Trunk::new(&vb, in_dim, hidden_dim, recurrent)?;
        let mut heads = Vec::new();
        for (name, sp) in act_space.channels() {
            // zero-width sub-channels are absent, they get no head
            if sp.dim() > 0 {
                heads.push((
                    name.to_string(),
                    linear(hidden_dim, sp.dim(), vb.pp(format!("head-{name}")))?,
                ));
            }
        }
        Ok(Self {
            trunk,
            heads,
            constrain_out: constrain_out && !act_space.is_discrete(),
            hidden_dim,
        })
    }

    pub fn is_recurrent(&self) -> bool {
        matches!(self.trunk, Trunk::Gru { .. })
    }

    pub fn hidden_dim(&self) -> usize {
        self.hidden_dim
    }

    fn heads_forward(
        &self,
        features: &Tensor,
    ) -> Result<ActionChannels> {
        let mut out = ActionChannels::new();
        for (name, head) in &self.heads {
            let mut y = head.forward(features)?;
            if self.constrain_out {
                y = y.tanh()?;
            }
            out.push(name.clone(), y);
        }
        Ok(out)
    }

    /// One recurrent step. Errors on non-recurrent networks.
    pub fn step(
        &self,
        x: &Tensor,
        h: &Tensor,
    ) -> Result<(ActionChannels, Tensor)> {
        match &self.trunk {
            Trunk::Gru { fc0, cell } => {
                let embedded = fc0.forward(x)?.relu()?;
                let h_next = cell.step(&embedded, h)?;
                Ok((self.heads_forward(&h_next)?, h_next))
            }
            Trunk::Mlp(_) => {
                Err(Error::Msg("step called on a non-recurrent network".to_string()))
            }
        }
    }

    pub fn forward(
        &self,
        x: &Tensor,
        hidden: Option<&Tensor>,
    ) -> Result<(ActionChannels, Option<Tensor>)> {
        match (&self.trunk, hidden) {
            (Trunk::Mlp(net), _) => Ok((self.heads_forward(&net.forward(x)?)?, None)),
            (Trunk::Gru { .. }, Some(h)) => {
                let (out, h_next) = self.step(x, h)?;
                Ok((out, Some(h_next)))
            }
            (Trunk::Gru { .. }, None) => Err(Error::Msg(
                "recurrent network called without a hidden state".to_string(),
            )),
        }
    }
}

/// Critic function approximator: features in, scalar value out.
pub struct CriticNet {
    trunk: Trunk,
    head: Linear,
    hidden_dim: usize,
}

impl CriticNet {
    pub fn new(
        vb: VarBuilder,
        in_dim: usize,
        hidden_dim: usize,
        recurrent: bool,
    ) -> Result<Self> {
        Ok(Self {
            trunk: Trunk::new(&vb, in_dim, hidden_dim, recurrent)?,
            head: linear(hidden_dim, 1, vb.pp("head"))?,
            hidden_dim,
        })
    }

    pub fn is_recurrent(&self) -> bool {
        matches!(self.trunk, Trunk::Gru { .. })
    }

    pub fn hidden_dim(&self) -> usize {
        self.hidden_dim
    }

    pub fn step(
        &self,
        x: &Tensor,
        h: &Tensor,
    ) -> Result<(Tensor, Tensor)> {
        match &self.trunk {
            Trunk::Gru { fc0, cell } => {
                let embedded = fc0.forward(x)?.relu()?;
                let h_next = cell.step(&embedded, h)?;
                Ok((self.head.forward(&h_next)?, h_next))
            }
            Trunk::Mlp(_) => {
                Err(Error::Msg("step called on a non-recurrent network".to_string()))
            }
        }
    }

    pub fn forward(
        &self,
        x: &Tensor,
        hidden: Option<&Tensor>,
    ) -> Result<(Tensor, Option<Tensor>)> {
        match (&self.trunk, hidden) {
            (Trunk::Mlp(net), _) => Ok((self.head.forward(&net.forward(x)?)?, None)),
            (Trunk::Gru { .. }, Some(h)) => {
                let (out, h_next) = self.step(x, h)?;
                Ok((out, Some(h_next)))
            }
            (Trunk::Gru { .. }, None) => Err(Error::Msg(
                "recurrent network called without a hidden state".to_string(),
            )),
        }
    }
}

/// Roll a recurrent network over a `(batch, time, dim)` input.
///
/// Every `truncate_steps` steps the hidden state is detached so
/// backpropagation depth stays bounded, while the hidden state values still
/// propagate forward unbroken. `None` disables truncation; truncation never
/// changes forward values, only gradient flow.
pub fn rnn_forward_sequence<O>(
    mut step: impl FnMut(&Tensor, &Tensor) -> Result<(O, Tensor)>,
    input: &Tensor,
    h0: &Tensor,
    truncate_steps: Option<usize>,
) -> Result<Vec<O>> {
    let (_bs, ts, _) = input.dims3()?;
    let mut h = h0.clone();
    let mut outputs = Vec::with_capacity(ts);
    for t in 0..ts {
        if let Some(k) = truncate_steps {
            if k > 0 && t > 0 && t % k == 0 {
                h = h.detach();
            }
        }
        let x_t = input.narrow(1, t, 1)?.squeeze(1)?;
        let (out, h_next) = step(&x_t, &h)?;
        h = h_next;
        outputs.push(out);
    }
    Ok(outputs)
}
