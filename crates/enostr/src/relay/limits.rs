/// Limitations imposed by the relay
#[derive(Debug, Clone, Copy)]
pub struct RelayLimitations {
    // corresponds to NIP-11 `max_subscriptions`
    pub maximum_subs: usize,
}

impl Default for RelayLimitations {
    fn default() -> Self {
        Self { maximum_subs: 10 }
    }
}

/// Hands out one `SubPass` per subscription slot a relay allows. Holding a
/// pass is the only way to open a historical query, so the number of
/// outstanding queries can never exceed `total_passes`.
#[derive(Debug)]
pub struct SubPassGuardian {
    total_passes: usize,
    available_passes: Vec<SubPass>,
}

impl SubPassGuardian {
    pub fn new(max_subs: usize) -> Self {
        Self {
            available_passes: (0..max_subs)
                .map(|_| SubPass { _private: () })
                .collect::<Vec<_>>(),
            total_passes: max_subs,
        }
    }

    pub fn from_limits(limits: RelayLimitations) -> Self {
        Self::new(limits.maximum_subs)
    }

    pub fn take_pass(&mut self) -> Option<SubPass> {
        self.available_passes.pop()
    }

    pub fn available_passes(&self) -> usize {
        self.available_passes.len()
    }

    pub fn total_passes(&self) -> usize {
        self.total_passes
    }

    pub fn passes_in_use(&self) -> usize {
        self.total_passes - self.available_passes()
    }

    pub fn return_pass(&mut self, pass: SubPass) {
        self.available_passes.push(pass);
        tracing::trace!(
            "Returned pass. Using {} of {} passes",
            self.passes_in_use(),
            self.total_passes
        );
    }
}

/// Proof of an occupied subscription slot. Not `Clone`: the only way to get
/// one is `SubPassGuardian::take_pass`.
#[derive(Debug)]
pub struct SubPass {
    _private: (),
}
