// Pattern - 16-step on/off grid that gates pattern beats

use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of sixteenth-note steps in one cycle
pub const STEPS: usize = 16;

/// Which of the 16 steps produce a click
///
/// Step indices wrap modulo 16, so the scheduler can address the pattern
/// with its cursor directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pattern {
    steps: [bool; STEPS],
}

impl Pattern {
    pub fn new(steps: [bool; STEPS]) -> Self {
        Self { steps }
    }

    /// Every step audible
    pub fn all_on() -> Self {
        Self::new([true; STEPS])
    }

    /// Every step silent (cursor and highlight still advance)
    pub fn silent() -> Self {
        Self::new([false; STEPS])
    }

    /// Build a pattern from a predicate over step indices
    pub fn from_fn(mut active: impl FnMut(usize) -> bool) -> Self {
        let mut steps = [false; STEPS];
        for (index, step) in steps.iter_mut().enumerate() {
            *step = active(index);
        }
        Self::new(steps)
    }

    pub fn is_active(&self, step: usize) -> bool {
        self.steps[step % STEPS]
    }

    pub fn set(&mut self, step: usize, active: bool) {
        self.steps[step % STEPS] = active;
    }

    /// Flip a step and return its new value
    pub fn toggle(&mut self, step: usize) -> bool {
        let slot = &mut self.steps[step % STEPS];
        *slot = !*slot;
        *slot
    }

    pub fn steps(&self) -> &[bool; STEPS] {
        &self.steps
    }

    /// Indices of audible steps, in beat order
    pub fn active_steps(&self) -> impl Iterator<Item = usize> + '_ {
        self.steps
            .iter()
            .enumerate()
            .filter_map(|(index, &active)| active.then_some(index))
    }
}

impl Default for Pattern {
    fn default() -> Self {
        Self::all_on()
    }
}

impl fmt::Display for Pattern {
    /// Renders as `x` (audible) and `.` (silent), grouped by four
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, &active) in self.steps.iter().enumerate() {
            if index > 0 && index % 4 == 0 {
                write!(f, " ")?;
            }
            write!(f, "{}", if active { 'x' } else { '.' })?;
        }
        Ok(())
    }
}
