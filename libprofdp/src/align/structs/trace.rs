use crate::align::structs::{CoreCell, DpMatrix, SpecialCell};
use crate::structs::profile::InvalidTransitionError;
use crate::structs::{Profile, Sequence};
use serde::{Deserialize, Serialize};
use std::io::Write;
use strum::{Display, EnumCount, EnumIter};

/// The states of the dual-mode profile graph, as they appear in a trace.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumIter,
    EnumCount,
    Serialize,
    Deserialize,
)]
pub enum State {
    S,
    N,
    B,
    L,
    G,
    ML,
    MG,
    IL,
    IG,
    DL,
    DG,
    E,
    J,
    C,
    T,
}

impl State {
    pub fn is_match(&self) -> bool {
        matches!(self, State::ML | State::MG)
    }

    pub fn is_insert(&self) -> bool {
        matches!(self, State::IL | State::IG)
    }

    pub fn is_delete(&self) -> bool {
        matches!(self, State::DL | State::DG)
    }

    /// Match, insert and delete states: the ones that belong to a node.
    pub fn is_core(&self) -> bool {
        self.is_match() || self.is_insert() || self.is_delete()
    }

    pub fn is_local(&self) -> bool {
        matches!(self, State::L | State::ML | State::IL | State::DL)
    }

    /// The flanking states that can emit on a self-transition.
    pub fn is_looping(&self) -> bool {
        matches!(self, State::N | State::J | State::C)
    }

    /// The core matrix cell that holds this state, if any.
    pub fn core_cell(&self) -> Option<CoreCell> {
        match self {
            State::ML => Some(CoreCell::ML),
            State::MG => Some(CoreCell::MG),
            State::IL => Some(CoreCell::IL),
            State::IG => Some(CoreCell::IG),
            State::DL => Some(CoreCell::DL),
            State::DG => Some(CoreCell::DG),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TraceStep {
    pub state: State,
    /// The node, or 0 for states that don't belong to one
    pub profile_idx: usize,
    /// The emitted residue, or 0 for steps that didn't emit
    pub target_idx: usize,
    pub posterior: f32,
}

impl TraceStep {
    pub fn emits(&self) -> bool {
        self.target_idx > 0
    }
}

impl std::fmt::Debug for TraceStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "<{}> p: {} t: {}",
            self.state, self.profile_idx, self.target_idx,
        )
    }
}

/// A state path through the profile, from S to T.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Trace {
    pub profile_length: usize,
    pub target_length: usize,
    pub steps: Vec<TraceStep>,
}

impl Trace {
    pub fn new(profile_length: usize, target_length: usize) -> Self {
        Trace {
            profile_length,
            target_length,
            steps: vec![],
        }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TraceStep> {
        self.steps.iter()
    }

    /// Append a step, normalizing the indices for the kind of state.
    ///
    /// Core states keep their node; only match and insert states keep their
    /// residue. N, J and C keep their residue only when `target_idx` is nonzero,
    /// which the caller uses to mark an emitting self-transition.
    pub fn push(&mut self, state: State, profile_idx: usize, target_idx: usize, posterior: f32) {
        let step = match state {
            state if state.is_match() || state.is_insert() => TraceStep {
                state,
                profile_idx,
                target_idx,
                posterior,
            },
            state if state.is_delete() => TraceStep {
                state,
                profile_idx,
                target_idx: 0,
                posterior: 0.0,
            },
            state if state.is_looping() && target_idx > 0 => TraceStep {
                state,
                profile_idx: 0,
                target_idx,
                posterior,
            },
            _ => TraceStep {
                state,
                profile_idx: 0,
                target_idx: 0,
                posterior: 0.0,
            },
        };
        self.steps.push(step);
    }

    /// Tracebacks are built from T to S; this puts the steps in path order.
    pub fn reverse(&mut self) {
        self.steps.reverse();
    }

    /// The number of passes through the core model.
    pub fn domain_count(&self) -> usize {
        self.steps.iter().filter(|s| s.state == State::B).count()
    }

    /// The sum of the posterior probabilities of every emitting step.
    pub fn expected_accuracy(&self) -> f32 {
        self.steps
            .iter()
            .filter(|s| s.emits())
            .map(|s| s.posterior)
            .sum()
    }

    /// Fill in each emitting step's posterior probability from a decoding matrix.
    pub fn annotate_posteriors(&mut self, decoding_matrix: &DpMatrix) {
        for idx in 0..self.steps.len() {
            let step = self.steps[idx];
            if !step.emits() {
                continue;
            }
            let i = step.target_idx;
            self.steps[idx].posterior = match step.state {
                State::N => decoding_matrix.get_special(i, SpecialCell::N),
                State::J => decoding_matrix.get_special(i, SpecialCell::JJ),
                State::C => decoding_matrix.get_special(i, SpecialCell::CC),
                state => match state.core_cell() {
                    Some(cell) => decoding_matrix.get_core(i, step.profile_idx, cell),
                    None => 0.0,
                },
            };
        }
    }

    /// The emission score of a step: only match and insert states score residues.
    fn emission_score(step: &TraceStep, profile: &Profile, target: &Sequence) -> f32 {
        if !step.emits() {
            return 0.0;
        }
        let residue = target.residue(step.target_idx);
        if step.state.is_match() {
            profile.match_score(residue, step.profile_idx)
        } else if step.state.is_insert() {
            profile.insert_score(residue, step.profile_idx)
        } else {
            0.0
        }
    }

    /// The transition score between two adjacent steps.
    ///
    /// Delete states may end a glocal or local pass; those
    /// exits aren't edges of the accessor's graph.
    fn transition_score(
        from: &TraceStep,
        to: &TraceStep,
        profile: &Profile,
    ) -> Result<f32, InvalidTransitionError> {
        if from.state.is_delete() && to.state == State::E {
            return Ok(profile.exit_score(from.state, from.profile_idx));
        }
        profile.generic_transition_score(from.state, from.profile_idx, to.state, to.profile_idx)
    }

    /// Score the path through the profile in nats.
    pub fn score(&self, profile: &Profile, target: &Sequence) -> Result<f32, InvalidTransitionError> {
        let mut score = 0.0;
        for (idx, step) in self.steps.iter().enumerate() {
            score += Trace::emission_score(step, profile, target);
            if let Some(next) = self.steps.get(idx + 1) {
                score += Trace::transition_score(step, next, profile)?;
            }
        }
        Ok(score)
    }

    pub fn dump(
        &self,
        out: &mut impl Write,
        profile: &Profile,
        target: &Sequence,
    ) -> anyhow::Result<()> {
        let mut total_score: f32 = 0.0;
        let mut accuracy: f32 = 0.0;

        writeln!(
            out,
            "st   p     t      transit emission postprob - traceback len {}",
            self.len()
        )?;
        writeln!(out, "--  ---- ------  -------- -------- --------")?;
        for (trace_idx, step) in self.steps.iter().enumerate() {
            let transition_score = match self.steps.get(trace_idx + 1) {
                Some(next) => Trace::transition_score(step, next, profile).unwrap_or_default(),
                None => 0.0,
            };
            total_score += transition_score;

            write!(
                out,
                "{:2}  {:4} {:6}   {:8.4}",
                step.state.to_string(),
                step.profile_idx,
                step.target_idx,
                transition_score
            )?;

            if step.emits() {
                let emission_score = Trace::emission_score(step, profile, target);
                total_score += emission_score;
                accuracy += step.posterior;

                let residue = target
                    .alphabet
                    .digital_to_utf8(target.digital_bytes[step.target_idx])
                    .unwrap_or(b'?');

                writeln!(
                    out,
                    " {:8.4} {:8.4} {}",
                    emission_score, step.posterior, residue as char
                )?;
            } else {
                writeln!(out)?;
            }
        }

        writeln!(out, "                -------- -------- --------")?;
        writeln!(
            out,
            "                  total: {:8.4} {:8.4}\n",
            total_score, accuracy
        )?;

        Ok(())
    }
}
