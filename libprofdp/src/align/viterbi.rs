use crate::align::max_path::{fill, PathScorer};
use crate::align::structs::{CoreCell, DpMatrix, MatrixType, SpecialCell, Trace};
use crate::align::traceback;
use crate::structs::{Profile, Sequence};

use super::{DpError, Nats};

/// Scores paths with the profile's log probabilities.
pub struct ViterbiScorer<'a> {
    pub profile: &'a Profile,
    pub target: &'a Sequence,
}

impl<'a> ViterbiScorer<'a> {
    pub fn new(profile: &'a Profile, target: &'a Sequence) -> Self {
        debug_assert!(profile.alphabet == target.alphabet);
        Self { profile, target }
    }
}

impl PathScorer for ViterbiScorer<'_> {
    fn profile_length(&self) -> usize {
        self.profile.length
    }

    fn target_length(&self) -> usize {
        self.target.length
    }

    fn matrix_type(&self) -> MatrixType {
        MatrixType::Viterbi
    }

    #[inline(always)]
    fn transition(&self, transition_idx: usize, profile_idx: usize) -> f32 {
        self.profile.transition_score(transition_idx, profile_idx)
    }

    #[inline(always)]
    fn special(&self, state_idx: usize, transition_idx: usize) -> f32 {
        self.profile.special_transition_score(state_idx, transition_idx)
    }

    #[inline(always)]
    fn entry(&self, profile_idx: usize) -> f32 {
        self.profile.entry_scores[profile_idx]
    }

    #[inline(always)]
    fn glocal_entry(&self, profile_idx: usize) -> f32 {
        self.profile.glocal_entry_scores[profile_idx]
    }

    #[inline(always)]
    fn exit(&self, profile_idx: usize) -> f32 {
        self.profile.exit_scores[profile_idx]
    }

    #[inline(always)]
    fn match_emission(&self, target_idx: usize, profile_idx: usize, _cell: CoreCell) -> f32 {
        self.profile
            .match_score(self.target.residue(target_idx), profile_idx)
    }

    #[inline(always)]
    fn insert_emission(&self, target_idx: usize, profile_idx: usize, _cell: CoreCell) -> f32 {
        self.profile
            .insert_score(self.target.residue(target_idx), profile_idx)
    }

    // the flanking states emit at background odds
    #[inline(always)]
    fn loop_emission(&self, _target_idx: usize, _cell: SpecialCell) -> f32 {
        0.0
    }
}

/// Fill `dp_matrix` with the best path scores and return the score of the best path.
///
/// If `trace` is given, the best path is traced back into it.
pub fn viterbi(
    profile: &Profile,
    target: &Sequence,
    dp_matrix: &mut DpMatrix,
    trace: Option<&mut Trace>,
) -> Result<Nats, DpError> {
    log::trace!("viterbi: M={} L={}", profile.length, target.length);

    let scorer = ViterbiScorer::new(profile, target);
    let score = fill(&scorer, dp_matrix)?;

    if let Some(trace) = trace {
        traceback(&scorer, dp_matrix, trace)?;
    }

    Ok(score)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::align::forward;
    use crate::align::structs::State;
    use crate::alphabet::Alphabet;
    use crate::structs::{AlignmentMode, Hmm};
    use assert2::check;

    #[test]
    fn test_viterbi_bounded_by_forward() -> anyhow::Result<()> {
        for (mode, seed) in [
            (AlignmentMode::Dual, 1),
            (AlignmentMode::Local, 2),
            (AlignmentMode::UniGlocal, 3),
            (AlignmentMode::UniDual, 4),
        ] {
            let hmm = Hmm::random(15, Alphabet::Amino, seed);
            let profile = Profile::from_hmm(&hmm, mode, 40)?;
            let target = Sequence::random(40, Alphabet::Amino, seed + 100)?;

            let mut fwd = DpMatrix::default();
            let mut vit = DpMatrix::default();
            let forward_score = forward(&profile, &target, &mut fwd)?;
            let viterbi_score = viterbi(&profile, &target, &mut vit, None)?;

            check!(viterbi_score.value().is_finite());
            check!(viterbi_score.value() <= forward_score.value() + 1e-4);
        }
        Ok(())
    }

    #[test]
    fn test_viterbi_trace_rescores() -> anyhow::Result<()> {
        for (mode, seed) in [
            (AlignmentMode::Dual, 31),
            (AlignmentMode::Glocal, 32),
            (AlignmentMode::UniLocal, 33),
        ] {
            let hmm = Hmm::random(8, Alphabet::Dna, seed);
            let profile = Profile::from_hmm(&hmm, mode, 30)?;
            let target = Sequence::random(30, Alphabet::Dna, seed + 1)?;

            let mut vit = DpMatrix::default();
            let mut trace = Trace::default();
            let score = viterbi(&profile, &target, &mut vit, Some(&mut trace))?;

            check!(trace.steps.first().map(|s| s.state) == Some(State::S));
            check!(trace.steps.last().map(|s| s.state) == Some(State::T));
            check!(trace.domain_count() >= 1);

            let rescored = trace.score(&profile, &target)?;
            check!((rescored - score.value()).abs() < 1e-3 * score.value().abs().max(1.0));

            // every residue is emitted exactly once
            let emitted = trace.iter().filter(|s| s.emits()).count();
            check!(emitted == target.length);
        }
        Ok(())
    }

    #[test]
    fn test_viterbi_single_node() -> anyhow::Result<()> {
        let hmm = Hmm::random(1, Alphabet::Dna, 4);
        let profile = Profile::from_hmm(&hmm, AlignmentMode::UniGlocal, 1)?;
        let target = Sequence::from_utf8(b"A", Alphabet::Dna)?;

        let mut vit = DpMatrix::default();
        let mut trace = Trace::default();
        viterbi(&profile, &target, &mut vit, Some(&mut trace))?;

        let states: Vec<State> = trace.iter().map(|s| s.state).collect();
        check!(
            states
                == vec![
                    State::S,
                    State::N,
                    State::B,
                    State::G,
                    State::MG,
                    State::E,
                    State::C,
                    State::T
                ]
        );
        Ok(())
    }

    #[test]
    fn test_viterbi_empty_target_has_no_path() -> anyhow::Result<()> {
        let hmm = Hmm::random(3, Alphabet::Dna, 4);
        let profile = Profile::from_hmm(&hmm, AlignmentMode::Dual, 0)?;
        let target = Sequence::from_utf8(b"", Alphabet::Dna)?;

        let mut vit = DpMatrix::default();
        let score = viterbi(&profile, &target, &mut vit, None)?;
        check!(score.value() == f32::NEG_INFINITY);

        let mut trace = Trace::default();
        let result = viterbi(&profile, &target, &mut vit, Some(&mut trace));
        check!(let Err(DpError::NoPath) = result);
        Ok(())
    }
}
