use crate::align::max_path::{fill, PathScorer};
use crate::align::structs::{CoreCell, DpMatrix, MatrixType, SpecialCell, Trace};
use crate::align::traceback;
use crate::structs::Profile;
use crate::util::IMPOSSIBLE;

use super::DpError;

/// Scores paths by the posterior probability of the residues they emit.
///
/// Transitions only decide whether an edge exists; `gamma` weights the
/// residues aligned to the core model against those left to N, J and C.
pub struct OptimalAccuracyScorer<'a> {
    pub profile: &'a Profile,
    pub posterior_matrix: &'a DpMatrix,
    pub gamma: f32,
}

impl<'a> OptimalAccuracyScorer<'a> {
    pub fn new(profile: &'a Profile, posterior_matrix: &'a DpMatrix, gamma: f32) -> Self {
        Self {
            profile,
            posterior_matrix,
            gamma,
        }
    }

    #[inline(always)]
    fn mask(score: f32) -> f32 {
        if score == IMPOSSIBLE {
            IMPOSSIBLE
        } else {
            0.0
        }
    }
}

impl PathScorer for OptimalAccuracyScorer<'_> {
    fn profile_length(&self) -> usize {
        self.posterior_matrix.profile_length
    }

    fn target_length(&self) -> usize {
        self.posterior_matrix.target_length
    }

    fn matrix_type(&self) -> MatrixType {
        MatrixType::Alignment
    }

    #[inline(always)]
    fn transition(&self, transition_idx: usize, profile_idx: usize) -> f32 {
        self.profile.transition_mask(transition_idx, profile_idx)
    }

    #[inline(always)]
    fn special(&self, state_idx: usize, transition_idx: usize) -> f32 {
        self.profile
            .special_transition_mask(state_idx, transition_idx)
    }

    #[inline(always)]
    fn entry(&self, profile_idx: usize) -> f32 {
        Self::mask(self.profile.entry_scores[profile_idx])
    }

    #[inline(always)]
    fn glocal_entry(&self, profile_idx: usize) -> f32 {
        Self::mask(self.profile.glocal_entry_scores[profile_idx])
    }

    #[inline(always)]
    fn exit(&self, profile_idx: usize) -> f32 {
        Self::mask(self.profile.exit_scores[profile_idx])
    }

    #[inline(always)]
    fn match_emission(&self, target_idx: usize, profile_idx: usize, cell: CoreCell) -> f32 {
        self.gamma * self.posterior_matrix.get_core(target_idx, profile_idx, cell)
    }

    #[inline(always)]
    fn insert_emission(&self, target_idx: usize, profile_idx: usize, cell: CoreCell) -> f32 {
        self.gamma * self.posterior_matrix.get_core(target_idx, profile_idx, cell)
    }

    #[inline(always)]
    fn loop_emission(&self, target_idx: usize, cell: SpecialCell) -> f32 {
        self.posterior_matrix.get_special(target_idx, cell)
    }

    fn truncate_last_row(&self) -> bool {
        true
    }
}

/// Find the path that maximizes the expected number of correctly aligned residues.
///
/// `posterior_matrix` must be a decoding matrix. The alignment matrix is
/// filled with accumulated gain, the best path is written to `trace` with
/// each emitting step's posterior probability, and the total gain is returned.
pub fn optimal_accuracy(
    profile: &Profile,
    posterior_matrix: &DpMatrix,
    gamma: f32,
    dp_matrix: &mut DpMatrix,
    trace: &mut Trace,
) -> Result<f32, DpError> {
    posterior_matrix.check_type(MatrixType::Decoding)?;

    log::trace!(
        "optimal accuracy: M={} L={} gamma={gamma}",
        posterior_matrix.profile_length,
        posterior_matrix.target_length
    );

    let scorer = OptimalAccuracyScorer::new(profile, posterior_matrix, gamma);
    let gain = fill(&scorer, dp_matrix)?;

    traceback(&scorer, dp_matrix, trace)?;
    trace.annotate_posteriors(posterior_matrix);

    Ok(gain.value())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::align::{backward, forward, posterior, viterbi};
    use crate::alphabet::Alphabet;
    use crate::structs::{AlignmentMode, Hmm, Sequence};
    use assert2::check;

    fn decoded(
        mode: AlignmentMode,
        seed: u64,
    ) -> anyhow::Result<(Profile, Sequence, DpMatrix)> {
        let hmm = Hmm::random(10, Alphabet::Amino, seed);
        let profile = Profile::from_hmm(&hmm, mode, 35)?;
        let target = Sequence::random(35, Alphabet::Amino, seed + 1)?;

        let mut fwd = DpMatrix::default();
        let mut bck = DpMatrix::default();
        let mut post = DpMatrix::default();
        forward(&profile, &target, &mut fwd)?;
        backward(&profile, &target, &mut bck)?;
        posterior(&profile, &fwd, &bck, &mut post)?;
        Ok((profile, target, post))
    }

    #[test]
    fn test_alignment_gain_matches_trace() -> anyhow::Result<()> {
        for (mode, seed) in [
            (AlignmentMode::Dual, 41),
            (AlignmentMode::UniGlocal, 42),
            (AlignmentMode::Local, 43),
        ] {
            let (profile, target, post) = decoded(mode, seed)?;

            let mut mea = DpMatrix::default();
            let mut trace = Trace::default();
            let gain = optimal_accuracy(&profile, &post, 1.0, &mut mea, &mut trace)?;

            check!(mea.matrix_type == MatrixType::Alignment);
            check!(trace.iter().filter(|s| s.emits()).count() == target.length);
            // with gamma = 1 the gain is the expected accuracy of the path
            check!((gain - trace.expected_accuracy()).abs() < 1e-3);
            check!(gain <= target.length as f32 + 1e-3);

            // the path has to be a real path through the profile
            check!(trace.score(&profile, &target)?.is_finite());
        }
        Ok(())
    }

    #[test]
    fn test_alignment_last_row_dead_ends() -> anyhow::Result<()> {
        let (profile, _, post) = decoded(AlignmentMode::Dual, 50)?;

        let mut mea = DpMatrix::default();
        let mut trace = Trace::default();
        optimal_accuracy(&profile, &post, 1.0, &mut mea, &mut trace)?;

        let last = mea.target_length;
        check!(mea.get_special(last, SpecialCell::N) == IMPOSSIBLE);
        check!(mea.get_special(last, SpecialCell::B) == IMPOSSIBLE);
        check!(mea.get_core(last, 3, CoreCell::IL) == IMPOSSIBLE);
        check!(mea.get_special(last, SpecialCell::C).is_finite());
        Ok(())
    }

    #[test]
    fn test_alignment_rejects_non_decoding_matrix() -> anyhow::Result<()> {
        let hmm = Hmm::random(5, Alphabet::Dna, 2);
        let profile = Profile::from_hmm(&hmm, AlignmentMode::Dual, 8)?;
        let target = Sequence::random(8, Alphabet::Dna, 3)?;

        let mut vit = DpMatrix::default();
        viterbi(&profile, &target, &mut vit, None)?;

        let mut mea = DpMatrix::default();
        let mut trace = Trace::default();
        let result = optimal_accuracy(&profile, &vit, 1.0, &mut mea, &mut trace);
        check!(let Err(DpError::MatrixType(_)) = result);
        Ok(())
    }
}
