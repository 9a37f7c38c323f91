use crate::align::structs::State;
use crate::alphabet::Alphabet;
use crate::structs::hmm::constants::{
    HMM_DELETE_TO_DELETE, HMM_DELETE_TO_MATCH, HMM_MATCH_TO_DELETE, HMM_MATCH_TO_MATCH,
    HMM_NUM_TRANSITIONS,
};
use crate::structs::Hmm;
use crate::util::{LogAbuse, IMPOSSIBLE};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fmt::Formatter;
use strum::{Display, EnumIter, EnumString};
use thiserror::Error;

/// Whether the profile allows more than one pass through the core model,
/// and whether a pass may be local, glocal (global in the model), or either.
#[derive(
    Default,
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Display,
    EnumIter,
    EnumString,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "kebab-case")]
pub enum AlignmentMode {
    #[default]
    NoMode,
    Local,
    Glocal,
    UniLocal,
    UniGlocal,
    Dual,
    UniDual,
}

impl AlignmentMode {
    pub fn code(&self) -> i32 {
        match self {
            AlignmentMode::NoMode => 0,
            AlignmentMode::Local => 1,
            AlignmentMode::Glocal => 2,
            AlignmentMode::UniLocal => 3,
            AlignmentMode::UniGlocal => 4,
            AlignmentMode::Dual => 5,
            AlignmentMode::UniDual => 6,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(AlignmentMode::NoMode),
            1 => Some(AlignmentMode::Local),
            2 => Some(AlignmentMode::Glocal),
            3 => Some(AlignmentMode::UniLocal),
            4 => Some(AlignmentMode::UniGlocal),
            5 => Some(AlignmentMode::Dual),
            6 => Some(AlignmentMode::UniDual),
            _ => None,
        }
    }

    pub fn is_multihit(&self) -> bool {
        matches!(
            self,
            AlignmentMode::Local | AlignmentMode::Glocal | AlignmentMode::Dual
        )
    }

    pub fn allows_local(&self) -> bool {
        matches!(
            self,
            AlignmentMode::Local
                | AlignmentMode::UniLocal
                | AlignmentMode::Dual
                | AlignmentMode::UniDual
        )
    }

    pub fn allows_glocal(&self) -> bool {
        matches!(
            self,
            AlignmentMode::Glocal
                | AlignmentMode::UniGlocal
                | AlignmentMode::Dual
                | AlignmentMode::UniDual
        )
    }
}

#[derive(Error, Debug, PartialEq)]
#[error("invalid transition: {from}({from_idx}) -> {to}({to_idx})")]
pub struct InvalidTransitionError {
    pub from: State,
    pub from_idx: usize,
    pub to: State,
    pub to_idx: usize,
}

#[derive(Error, Debug, PartialEq)]
#[error("failed to allocate a profile of {length} nodes")]
pub struct ProfileAllocationError {
    pub length: usize,
}

#[derive(Error, Debug, PartialEq)]
pub enum ProfileValidationError {
    #[error("sentinel {what} at node {node} is {value}, not impossible")]
    Sentinel {
        what: &'static str,
        node: usize,
        value: f32,
    },
    #[error("{what} at node {node} is NaN")]
    NaN { what: &'static str, node: usize },
    #[error("begin probabilities weighted by span sum to {sum}, not 1")]
    BeginSum { sum: f32 },
    #[error("end probability at node {node} is {value}, not 1")]
    End { node: usize, value: f32 },
    #[error("{state} loop and move probabilities sum to {sum}, not 1")]
    SpecialPair { state: &'static str, sum: f32 },
}

#[derive(Clone)]
pub struct Profile {
    /// The name of the profile
    pub name: String,
    /// The accession number of the profile
    pub accession: String,
    /// Model length (number of nodes)
    pub length: usize,
    /// Current target sequence length
    pub target_length: usize,
    pub mode: AlignmentMode,
    /// Transition scores, indexed by node, in the order MM, MI, MD, IM, II, DM, DD
    pub transitions: Vec<[f32; 7]>,
    /// Match scores, indexed by node then digital residue
    pub match_scores: Vec<Vec<f32>>,
    /// Insert scores, indexed by node then digital residue
    pub insert_scores: Vec<Vec<f32>>,
    /// Local entry scores: L -> Mk
    pub entry_scores: Vec<f32>,
    /// Wing-retracted glocal entry scores: G -> Mk, folding in G -> D1 ... D(k-1) -> Mk
    pub glocal_entry_scores: Vec<f32>,
    /// Local exit scores: Mk -> E and Dk -> E
    pub exit_scores: Vec<f32>,
    /// Transitions from special states (E, N, J, B, C)
    pub special_transitions: [[f32; 2]; 5],
    /// Legacy begin probabilities
    pub begin: Vec<f32>,
    /// Legacy end probabilities
    pub end: Vec<f32>,
    pub local_correction: bool,
    pub local_correction_score: f32,
    pub h2_mode: bool,
    /// The expected number of times that the J state is used
    pub expected_j_uses: f32,
    /// The profile's consensus sequence
    pub consensus_sequence: String,
    /// The sequence alphabet
    pub alphabet: Alphabet,
}

impl Profile {
    // special state indices
    pub const NUM_SPECIAL_STATES: usize = 5;
    pub const SPECIAL_E_IDX: usize = 0;
    pub const SPECIAL_N_IDX: usize = 1;
    pub const SPECIAL_J_IDX: usize = 2;
    pub const SPECIAL_B_IDX: usize = 3;
    pub const SPECIAL_C_IDX: usize = 4;

    pub const SPECIAL_STATE_IDX_TO_NAME: [&'static str; 5] = ["E", "N", "J", "B", "C"];

    // special transition indices; for B, loop is B -> L and move is B -> G
    pub const SPECIAL_LOOP_IDX: usize = 0;
    pub const SPECIAL_MOVE_IDX: usize = 1;

    /// The number of core state transitions under the model.
    pub const NUM_STATE_TRANSITIONS: usize = 7;
    pub const MATCH_TO_MATCH_IDX: usize = 0;
    pub const MATCH_TO_INSERT_IDX: usize = 1;
    pub const MATCH_TO_DELETE_IDX: usize = 2;
    pub const INSERT_TO_MATCH_IDX: usize = 3;
    pub const INSERT_TO_INSERT_IDX: usize = 4;
    pub const DELETE_TO_MATCH_IDX: usize = 5;
    pub const DELETE_TO_DELETE_IDX: usize = 6;

    pub const DEFAULT_TARGET_LENGTH: usize = 400;

    /// Create an unconfigured profile with every score impossible.
    pub fn new(length: usize, alphabet: Alphabet) -> Result<Self, ProfileAllocationError> {
        let kp = alphabet.size_with_degenerate();
        let nodes = length
            .checked_add(1)
            .ok_or(ProfileAllocationError { length })?;
        let filled = |value: f32| try_filled(value, nodes, length);

        let mut profile = Profile {
            name: String::new(),
            accession: String::new(),
            length,
            target_length: 0,
            mode: AlignmentMode::NoMode,
            transitions: try_filled([IMPOSSIBLE; 7], nodes, length)?,
            match_scores: try_score_table(nodes, kp, length)?,
            insert_scores: try_score_table(nodes, kp, length)?,
            entry_scores: filled(IMPOSSIBLE)?,
            glocal_entry_scores: filled(IMPOSSIBLE)?,
            exit_scores: filled(IMPOSSIBLE)?,
            special_transitions: [[IMPOSSIBLE; 2]; 5],
            begin: filled(0.0)?,
            end: filled(0.0)?,
            local_correction: false,
            local_correction_score: 0.0,
            h2_mode: false,
            expected_j_uses: 0.0,
            consensus_sequence: String::new(),
            alphabet,
        };
        profile.apply_sentinels();
        Ok(profile)
    }

    /// Force every cell that no path may use to be impossible.
    pub fn apply_sentinels(&mut self) {
        let m = self.length;
        let alphabet = self.alphabet;

        self.transitions[0] = [IMPOSSIBLE; 7];
        self.transitions[m] = [IMPOSSIBLE; 7];
        if m >= 1 {
            // wing retraction: D1 is never entered
            self.transitions[1][Profile::DELETE_TO_MATCH_IDX] = IMPOSSIBLE;
            self.transitions[1][Profile::DELETE_TO_DELETE_IDX] = IMPOSSIBLE;
        }

        self.match_scores[0].fill(IMPOSSIBLE);
        self.insert_scores[0].fill(IMPOSSIBLE);
        self.insert_scores[m].fill(IMPOSSIBLE);

        for scores in self
            .match_scores
            .iter_mut()
            .chain(self.insert_scores.iter_mut())
        {
            scores[alphabet.gap_idx()] = IMPOSSIBLE;
            scores[alphabet.non_residue_idx()] = IMPOSSIBLE;
            scores[alphabet.missing_data_idx()] = IMPOSSIBLE;
        }

        self.entry_scores[0] = IMPOSSIBLE;
        self.glocal_entry_scores[0] = IMPOSSIBLE;
        self.exit_scores[0] = IMPOSSIBLE;
    }

    /// Configure a profile from core model probabilities.
    pub fn from_hmm(
        hmm: &Hmm,
        mode: AlignmentMode,
        target_length: usize,
    ) -> anyhow::Result<Self> {
        if mode == AlignmentMode::NoMode {
            anyhow::bail!("a profile must be configured with an alignment mode");
        }

        let m = hmm.length();
        if m == 0 {
            anyhow::bail!("can't configure a profile from a model with no nodes");
        }

        let alphabet = hmm.header.alphabet;
        let k = alphabet.size();
        let background = alphabet.background_frequencies();

        let mut profile = Profile::new(m, alphabet)?;
        profile.name = hmm.header.name.clone();
        profile.accession = hmm.header.accession_number.clone();
        profile.mode = mode;
        profile.consensus_sequence = if hmm.model.consensus_residues.len() == m {
            hmm.model.consensus_residues.clone()
        } else {
            hmm.consensus(0.5)
        };

        let probability = |node: usize, transition: usize| -> anyhow::Result<f32> {
            hmm.model
                .transition_probabilities
                .get(node)
                .and_then(|t| t.get(transition))
                .copied()
                .with_context(|| format!("model is missing transition {transition} at node {node}"))
        };

        // transition scores
        for node_idx in 1..m {
            for transition_idx in 0..HMM_NUM_TRANSITIONS {
                profile.transitions[node_idx][transition_idx] =
                    probability(node_idx, transition_idx)?.ln_or_inf();
            }
        }

        // match scores, with degenerate codes scored as the odds of any member
        for node_idx in 1..=m {
            let emissions = hmm
                .model
                .match_probabilities
                .get(node_idx)
                .filter(|e| e.len() >= k)
                .with_context(|| format!("model is missing match emissions at node {node_idx}"))?;

            for residue in 0..alphabet.size_with_degenerate() {
                let members = alphabet.degenerate_members(residue);
                profile.match_scores[node_idx][residue] = if members.is_empty() {
                    IMPOSSIBLE
                } else {
                    let p: f32 = members.iter().map(|&a| emissions[a as usize]).sum();
                    let bg: f32 = members.iter().map(|&a| background[a as usize]).sum();
                    (p / bg).ln_or_inf()
                };
            }
        }

        // insert emissions are taken to be the background, so ln(P/P) = 0
        for node_idx in 1..m {
            for residue in 0..alphabet.size_with_degenerate() {
                if !alphabet.is_unscorable(residue) {
                    profile.insert_scores[node_idx][residue] = 0.0;
                }
            }
        }

        // local entry is uniform over all (entry, exit) node pairs
        let uniform_entry = 2.0 / (m as f32 * (m as f32 + 1.0));
        for node_idx in 1..=m {
            profile.entry_scores[node_idx] = uniform_entry.ln();
            profile.begin[node_idx] = uniform_entry;
            profile.exit_scores[node_idx] = 0.0;
            profile.end[node_idx] = 1.0;
        }

        // glocal entry, with the G -> D1 ... D(k-1) -> Mk paths folded in
        let t0_match = probability(0, HMM_MATCH_TO_MATCH)?;
        let t0_delete = probability(0, HMM_MATCH_TO_DELETE)?;
        let entry_sum = t0_match + t0_delete;
        profile.glocal_entry_scores[1] = (t0_match / entry_sum).ln_or_inf();

        let mut delete_path = t0_delete / entry_sum;
        for node_idx in 2..=m {
            profile.glocal_entry_scores[node_idx] =
                (delete_path * probability(node_idx - 1, HMM_DELETE_TO_MATCH)?).ln_or_inf();
            delete_path *= probability(node_idx - 1, HMM_DELETE_TO_DELETE)?;
        }

        let e_idx = Profile::SPECIAL_E_IDX;
        let b_idx = Profile::SPECIAL_B_IDX;
        let (loop_idx, move_idx) = (Profile::SPECIAL_LOOP_IDX, Profile::SPECIAL_MOVE_IDX);

        if mode.is_multihit() {
            profile.special_transitions[e_idx][loop_idx] = 0.5f32.ln();
            profile.special_transitions[e_idx][move_idx] = 0.5f32.ln();
            profile.expected_j_uses = 1.0;
        } else {
            profile.special_transitions[e_idx][loop_idx] = IMPOSSIBLE;
            profile.special_transitions[e_idx][move_idx] = 0.0;
            profile.expected_j_uses = 0.0;
        }

        profile.special_transitions[b_idx] = match (mode.allows_local(), mode.allows_glocal()) {
            (true, true) => [0.5f32.ln(), 0.5f32.ln()],
            (true, false) => [0.0, IMPOSSIBLE],
            _ => [IMPOSSIBLE, 0.0],
        };

        profile.apply_sentinels();
        profile.configure_for_target_length(target_length);

        log::trace!(
            "configured profile {} (M={}) in {} mode",
            profile.name,
            m,
            mode
        );

        Ok(profile)
    }

    #[inline(always)]
    pub fn match_score(&self, alphabet_idx: usize, profile_idx: usize) -> f32 {
        self.match_scores[profile_idx][alphabet_idx]
    }

    #[inline(always)]
    pub fn insert_score(&self, alphabet_idx: usize, profile_idx: usize) -> f32 {
        self.insert_scores[profile_idx][alphabet_idx]
    }

    #[inline(always)]
    pub fn transition_score(&self, transition_idx: usize, profile_idx: usize) -> f32 {
        self.transitions[profile_idx][transition_idx]
    }

    /// This is essentially a Kronecker delta function that returns 0.0 when the transition
    /// score is finite and -inf when the transition score is -inf.
    ///
    /// Semantically, this means we are disallowing "impossible state paths" during posterior traceback.
    #[inline(always)]
    pub fn transition_mask(&self, transition_idx: usize, profile_idx: usize) -> f32 {
        if self.transitions[profile_idx][transition_idx] == IMPOSSIBLE {
            IMPOSSIBLE
        } else {
            0.0
        }
    }

    #[inline(always)]
    pub fn special_transition_score(&self, state_idx: usize, transition_idx: usize) -> f32 {
        self.special_transitions[state_idx][transition_idx]
    }

    #[inline(always)]
    pub fn special_transition_mask(&self, state_idx: usize, transition_idx: usize) -> f32 {
        if self.special_transitions[state_idx][transition_idx] == IMPOSSIBLE {
            IMPOSSIBLE
        } else {
            0.0
        }
    }

    /// The score of leaving the core model from a match or delete state at node `profile_idx`.
    ///
    /// Local passes may exit anywhere; glocal passes only exit from node M.
    pub fn exit_score(&self, state: State, profile_idx: usize) -> f32 {
        match state {
            State::ML | State::DL => self.exit_scores[profile_idx],
            State::MG | State::DG if profile_idx == self.length => 0.0,
            _ => IMPOSSIBLE,
        }
    }

    /// Look up the score of the edge `state_from`(`idx_from`) -> `state_to`(`idx_to`).
    ///
    /// Only match states are scored on the edge into E; delete-state exits
    /// are scored with [`Profile::exit_score`].
    pub fn generic_transition_score(
        &self,
        state_from: State,
        idx_from: usize,
        state_to: State,
        idx_to: usize,
    ) -> Result<f32, InvalidTransitionError> {
        use State::*;

        let special = |state_idx: usize,
                       transition_idx: usize|
         -> Result<f32, InvalidTransitionError> {
            Ok(self.special_transition_score(state_idx, transition_idx))
        };
        let core = |transition_idx: usize| -> Result<f32, InvalidTransitionError> {
            Ok(self.transition_score(transition_idx, idx_from))
        };

        let same_path = state_from.is_local() == state_to.is_local();
        let next_node = idx_to == idx_from + 1;
        let same_node = idx_to == idx_from;

        match (state_from, state_to) {
            (S, _) | (T, _) => Ok(0.0),

            (N, N) => special(Profile::SPECIAL_N_IDX, Profile::SPECIAL_LOOP_IDX),
            (N, B) => special(Profile::SPECIAL_N_IDX, Profile::SPECIAL_MOVE_IDX),

            (B, L) => special(Profile::SPECIAL_B_IDX, Profile::SPECIAL_LOOP_IDX),
            (B, G) => special(Profile::SPECIAL_B_IDX, Profile::SPECIAL_MOVE_IDX),
            (B, ML) => Ok(
                self.special_transition_score(Profile::SPECIAL_B_IDX, Profile::SPECIAL_LOOP_IDX)
                    + self.entry_scores[idx_to],
            ),
            (B, MG) => Ok(
                self.special_transition_score(Profile::SPECIAL_B_IDX, Profile::SPECIAL_MOVE_IDX)
                    + self.glocal_entry_scores[idx_to],
            ),
            (L, ML) => Ok(self.entry_scores[idx_to]),
            (G, MG) => Ok(self.glocal_entry_scores[idx_to]),

            (ML | MG, ML | MG) if same_path && next_node => core(Profile::MATCH_TO_MATCH_IDX),
            (ML | MG, IL | IG) if same_path && same_node => core(Profile::MATCH_TO_INSERT_IDX),
            (ML | MG, DL | DG) if same_path && next_node => core(Profile::MATCH_TO_DELETE_IDX),
            (ML | MG, E) => Ok(self.exit_score(state_from, idx_from)),

            (IL | IG, ML | MG) if same_path && next_node => core(Profile::INSERT_TO_MATCH_IDX),
            (IL | IG, IL | IG) if same_path && same_node => core(Profile::INSERT_TO_INSERT_IDX),

            (DL | DG, ML | MG) if same_path && next_node => core(Profile::DELETE_TO_MATCH_IDX),
            (DL | DG, DL | DG) if same_path && next_node => core(Profile::DELETE_TO_DELETE_IDX),

            (E, C) => special(Profile::SPECIAL_E_IDX, Profile::SPECIAL_MOVE_IDX),
            (E, J) => special(Profile::SPECIAL_E_IDX, Profile::SPECIAL_LOOP_IDX),
            (J, B) => special(Profile::SPECIAL_J_IDX, Profile::SPECIAL_MOVE_IDX),
            (J, J) => special(Profile::SPECIAL_J_IDX, Profile::SPECIAL_LOOP_IDX),
            (C, T) => special(Profile::SPECIAL_C_IDX, Profile::SPECIAL_MOVE_IDX),
            (C, C) => special(Profile::SPECIAL_C_IDX, Profile::SPECIAL_LOOP_IDX),

            _ => Err(InvalidTransitionError {
                from: state_from,
                from_idx: idx_from,
                to: state_to,
                to_idx: idx_to,
            }),
        }
    }

    /// Sets the length of the current target sequence to which the profile will be aligned.
    ///
    /// This also adjusts the loop and move transition scores for the special states N, J, C.
    pub fn configure_for_target_length(&mut self, length: usize) {
        self.target_length = length;

        let move_probability: f32 =
            (2.0 + self.expected_j_uses) / (length as f32 + 2.0 + self.expected_j_uses);

        let loop_probability: f32 = 1.0 - move_probability;

        let loop_score = loop_probability.ln_or_inf();
        let move_score = move_probability.ln_or_inf();

        for state_idx in [
            Profile::SPECIAL_N_IDX,
            Profile::SPECIAL_J_IDX,
            Profile::SPECIAL_C_IDX,
        ] {
            self.special_transitions[state_idx][Profile::SPECIAL_LOOP_IDX] = loop_score;
            self.special_transitions[state_idx][Profile::SPECIAL_MOVE_IDX] = move_score;
        }
    }

    /// Check the probability sums and the sentinel cells.
    ///
    /// Violations are reported, never corrected.
    pub fn validate(&self, tolerance: f32) -> Result<(), ProfileValidationError> {
        let m = self.length;
        let alphabet = self.alphabet;

        let sentinel = |what: &'static str, node: usize, value: f32| {
            if value == IMPOSSIBLE {
                Ok(())
            } else {
                Err(ProfileValidationError::Sentinel { what, node, value })
            }
        };

        for transition_idx in 0..Profile::NUM_STATE_TRANSITIONS {
            sentinel("transition", 0, self.transitions[0][transition_idx])?;
            sentinel("transition", m, self.transitions[m][transition_idx])?;
        }
        if m >= 1 {
            sentinel("D->M", 1, self.transitions[1][Profile::DELETE_TO_MATCH_IDX])?;
            sentinel("D->D", 1, self.transitions[1][Profile::DELETE_TO_DELETE_IDX])?;
        }

        for node_idx in 0..=m {
            for residue in 0..alphabet.size_with_degenerate() {
                let match_score = self.match_scores[node_idx][residue];
                let insert_score = self.insert_scores[node_idx][residue];

                if node_idx == 0 || alphabet.is_unscorable(residue) {
                    sentinel("match emission", node_idx, match_score)?;
                }
                if node_idx == 0 || node_idx == m || alphabet.is_unscorable(residue) {
                    sentinel("insert emission", node_idx, insert_score)?;
                }
                if match_score.is_nan() {
                    return Err(ProfileValidationError::NaN {
                        what: "match emission",
                        node: node_idx,
                    });
                }
                if insert_score.is_nan() {
                    return Err(ProfileValidationError::NaN {
                        what: "insert emission",
                        node: node_idx,
                    });
                }
            }

            if self.transitions[node_idx].iter().any(|t| t.is_nan()) {
                return Err(ProfileValidationError::NaN {
                    what: "transition",
                    node: node_idx,
                });
            }
        }

        sentinel("entry", 0, self.entry_scores[0])?;
        sentinel("glocal entry", 0, self.glocal_entry_scores[0])?;
        sentinel("exit", 0, self.exit_scores[0])?;

        let begin_sum: f32 = (1..=m)
            .map(|k| self.begin[k] * (m - k + 1) as f32)
            .sum();
        if (begin_sum - 1.0).abs() > tolerance {
            return Err(ProfileValidationError::BeginSum { sum: begin_sum });
        }

        for node_idx in 1..=m {
            if self.end[node_idx] != 1.0 {
                return Err(ProfileValidationError::End {
                    node: node_idx,
                    value: self.end[node_idx],
                });
            }
        }

        for state_idx in 0..Profile::NUM_SPECIAL_STATES {
            let pair = self.special_transitions[state_idx];
            let sum = pair[Profile::SPECIAL_LOOP_IDX].exp() + pair[Profile::SPECIAL_MOVE_IDX].exp();
            if (sum - 1.0).abs() > tolerance {
                return Err(ProfileValidationError::SpecialPair {
                    state: Profile::SPECIAL_STATE_IDX_TO_NAME[state_idx],
                    sum,
                });
            }
        }

        Ok(())
    }
}

/// A vector of `count` copies of `value`, or an error if it can't be allocated.
fn try_filled<T: Clone>(
    value: T,
    count: usize,
    length: usize,
) -> Result<Vec<T>, ProfileAllocationError> {
    let mut values = Vec::new();
    values
        .try_reserve_exact(count)
        .map_err(|_| ProfileAllocationError { length })?;
    values.resize(count, value);
    Ok(values)
}

/// A node x residue table of impossible scores.
fn try_score_table(
    nodes: usize,
    width: usize,
    length: usize,
) -> Result<Vec<Vec<f32>>, ProfileAllocationError> {
    let mut table = Vec::new();
    table
        .try_reserve_exact(nodes)
        .map_err(|_| ProfileAllocationError { length })?;
    for _ in 0..nodes {
        table.push(try_filled(IMPOSSIBLE, width, length)?);
    }
    Ok(table)
}

impl fmt::Debug for Profile {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f, "model length: {}", self.length)?;
        writeln!(f, "target length: {}", self.target_length)?;
        writeln!(f, "mode: {}", self.mode)?;

        for i in 0..Profile::NUM_SPECIAL_STATES {
            writeln!(
                f,
                "{} {:8.4} {:8.4}",
                Profile::SPECIAL_STATE_IDX_TO_NAME[i],
                self.special_transitions[i][0],
                self.special_transitions[i][1]
            )?;
        }

        for i in 0..=self.length {
            writeln!(f, "{}", i)?;
            for residue in self.alphabet.symbols() {
                write!(f, "    {}    ", residue)?;
            }
            writeln!(f)?;

            for _ in 0..self.alphabet.size_with_degenerate() {
                write!(f, "  ------ ")?;
            }
            writeln!(f)?;

            for score in self.match_scores[i].iter() {
                write!(f, "{:8.4} ", score)?;
            }
            writeln!(f)?;

            for score in self.insert_scores[i].iter() {
                write!(f, "{:8.4} ", score)?;
            }
            writeln!(f)?;

            for score in self.transitions[i].iter() {
                write!(f, "{:8.4} ", score)?;
            }
            writeln!(
                f,
                "| {:8.4} {:8.4} {:8.4}",
                self.entry_scores[i], self.glocal_entry_scores[i], self.exit_scores[i]
            )?;
            writeln!(f)?;
        }

        Ok(())
    }
}
