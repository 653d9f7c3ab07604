//! Gatekeeper chains: the timing-control shift registers that skew vectors
//! into and out of the grid.
//!
//! A chain is an ordered `Vec`. Each cycle every gatekeeper decides its output
//! from its own pre-cycle state, then activation moves one position down the
//! chain using a snapshot of the pre-cycle flags. Position `k` therefore arms
//! exactly `k` cycles after the head, whatever order the keepers are visited.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::Word;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gatekeeper {
    /// Position in the chain
    pub position: usize,
    /// Value waiting to be let through
    pub input: Word,
    /// Value emitted this cycle (0 while closed)
    pub output: Word,
    /// Remaining cycles this gatekeeper stays open
    pub enable_cycles: usize,
    /// Countdown loaded when the gatekeeper is armed
    pub pending_enable_cycles: usize,
    pub active: bool,
    pub pending_active: bool,
}

impl Gatekeeper {
    pub fn new(position: usize, enable_cycles: usize) -> Self {
        Gatekeeper {
            position,
            pending_enable_cycles: enable_cycles,
            ..Default::default()
        }
    }

    /// Arm if activation arrived, then emit `input` while the countdown runs
    fn emit(&mut self) -> Word {
        if self.pending_active {
            self.enable_cycles = self.pending_enable_cycles;
        }
        if self.enable_cycles > 0 {
            self.output = self.input;
            self.enable_cycles -= 1;
        } else {
            self.output = 0;
        }
        self.output
    }

    pub fn is_open(&self) -> bool {
        self.enable_cycles > 0
    }
}

#[derive(Debug, Clone)]
pub struct GatekeeperChain {
    name: &'static str,
    keepers: Vec<Gatekeeper>,
}

impl GatekeeperChain {
    /// `len` gatekeepers, each staying open for `enable_cycles` once armed
    pub fn new(name: &'static str, len: usize, enable_cycles: usize) -> Self {
        GatekeeperChain {
            name,
            keepers: (0..len).map(|k| Gatekeeper::new(k, enable_cycles)).collect(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn len(&self) -> usize {
        self.keepers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keepers.is_empty()
    }

    pub fn keepers(&self) -> &[Gatekeeper] {
        &self.keepers
    }

    pub fn get(&self, position: usize) -> Option<&Gatekeeper> {
        self.keepers.get(position)
    }

    /// Drive the activation input of the chain head for the coming cycle
    pub fn drive_head(&mut self, active: bool) {
        if let Some(head) = self.keepers.first_mut() {
            head.pending_active = active;
        }
    }

    /// Load the value each gatekeeper would pass on this cycle
    pub fn stage_inputs(&mut self, inputs: &[Word]) {
        for (keeper, &x) in self.keepers.iter_mut().zip(inputs) {
            keeper.input = x;
        }
    }

    pub fn stage_input(&mut self, position: usize, value: Word) {
        if let Some(keeper) = self.keepers.get_mut(position) {
            keeper.input = value;
        }
    }

    /// Advance the whole chain by one cycle and return the emitted outputs
    pub fn cycle(&mut self) -> Vec<Word> {
        let snapshot: Vec<bool> = self.keepers.iter().map(|k| k.pending_active).collect();

        let mut outputs = Vec::with_capacity(self.keepers.len());
        for keeper in &mut self.keepers {
            let out = keeper.emit();
            if keeper.pending_active {
                debug!("{} gatekeeper {} armed for {} cycles", self.name, keeper.position, keeper.pending_enable_cycles);
            }
            if out != 0 {
                debug!("{} gatekeeper {} sent {}", self.name, keeper.position, out);
            }
            outputs.push(out);
        }

        for (k, keeper) in self.keepers.iter_mut().enumerate() {
            keeper.active = snapshot[k];
            if k > 0 {
                keeper.pending_active = snapshot[k - 1];
            }
        }

        outputs
    }

    pub fn outputs(&self) -> Vec<Word> {
        self.keepers.iter().map(|k| k.output).collect()
    }
}
