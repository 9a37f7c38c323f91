use crate::align::structs::{CoreCell, DpMatrix, MatrixAllocationError, MatrixType, SpecialCell};
use crate::log_sum;
use crate::structs::{Profile, Sequence};
use crate::util::IMPOSSIBLE;

use super::Nats;

/// Fill `dp_matrix` with the log probability of every path prefix, and return the total score.
pub fn forward(
    profile: &Profile,
    target: &Sequence,
    dp_matrix: &mut DpMatrix,
) -> Result<Nats, MatrixAllocationError> {
    debug_assert!(profile.alphabet == target.alphabet);

    let profile_length = profile.length;
    let target_length = target.length;

    log::trace!("forward: M={profile_length} L={target_length}");
    dp_matrix.prepare(profile_length, target_length, MatrixType::Forward, IMPOSSIBLE)?;

    let special = |state_idx: usize, transition_idx: usize| {
        profile.special_transition_score(state_idx, transition_idx)
    };
    let (loop_idx, move_idx) = (Profile::SPECIAL_LOOP_IDX, Profile::SPECIAL_MOVE_IDX);

    dp_matrix.set_special(0, SpecialCell::N, 0.0);
    dp_matrix.set_special(0, SpecialCell::B, special(Profile::SPECIAL_N_IDX, move_idx));
    dp_matrix.set_special(
        0,
        SpecialCell::L,
        dp_matrix.get_special(0, SpecialCell::B) + special(Profile::SPECIAL_B_IDX, loop_idx),
    );
    dp_matrix.set_special(
        0,
        SpecialCell::G,
        dp_matrix.get_special(0, SpecialCell::B) + special(Profile::SPECIAL_B_IDX, move_idx),
    );

    for target_idx in 1..=target_length {
        let residue = target.residue(target_idx);
        let prev = target_idx - 1;
        let local_begin = dp_matrix.get_special(prev, SpecialCell::L);
        let glocal_begin = dp_matrix.get_special(prev, SpecialCell::G);

        let mut end_score = IMPOSSIBLE;

        for profile_idx in 1..=profile_length {
            let k = profile_idx;

            // match states
            let match_score = profile.match_score(residue, k);
            dp_matrix.set_core(
                target_idx,
                k,
                CoreCell::ML,
                log_sum!(
                    dp_matrix.get_core(prev, k - 1, CoreCell::ML)
                        + profile.transition_score(Profile::MATCH_TO_MATCH_IDX, k - 1),
                    dp_matrix.get_core(prev, k - 1, CoreCell::IL)
                        + profile.transition_score(Profile::INSERT_TO_MATCH_IDX, k - 1),
                    dp_matrix.get_core(prev, k - 1, CoreCell::DL)
                        + profile.transition_score(Profile::DELETE_TO_MATCH_IDX, k - 1),
                    local_begin + profile.entry_scores[k]
                ) + match_score,
            );
            dp_matrix.set_core(
                target_idx,
                k,
                CoreCell::MG,
                log_sum!(
                    dp_matrix.get_core(prev, k - 1, CoreCell::MG)
                        + profile.transition_score(Profile::MATCH_TO_MATCH_IDX, k - 1),
                    dp_matrix.get_core(prev, k - 1, CoreCell::IG)
                        + profile.transition_score(Profile::INSERT_TO_MATCH_IDX, k - 1),
                    dp_matrix.get_core(prev, k - 1, CoreCell::DG)
                        + profile.transition_score(Profile::DELETE_TO_MATCH_IDX, k - 1),
                    glocal_begin + profile.glocal_entry_scores[k]
                ) + match_score,
            );

            // insert states; there's no insert state at node M
            if k < profile_length {
                let insert_score = profile.insert_score(residue, k);
                dp_matrix.set_core(
                    target_idx,
                    k,
                    CoreCell::IL,
                    log_sum!(
                        dp_matrix.get_core(prev, k, CoreCell::ML)
                            + profile.transition_score(Profile::MATCH_TO_INSERT_IDX, k),
                        dp_matrix.get_core(prev, k, CoreCell::IL)
                            + profile.transition_score(Profile::INSERT_TO_INSERT_IDX, k)
                    ) + insert_score,
                );
                dp_matrix.set_core(
                    target_idx,
                    k,
                    CoreCell::IG,
                    log_sum!(
                        dp_matrix.get_core(prev, k, CoreCell::MG)
                            + profile.transition_score(Profile::MATCH_TO_INSERT_IDX, k),
                        dp_matrix.get_core(prev, k, CoreCell::IG)
                            + profile.transition_score(Profile::INSERT_TO_INSERT_IDX, k)
                    ) + insert_score,
                );
            }

            // delete states
            dp_matrix.set_core(
                target_idx,
                k,
                CoreCell::DL,
                log_sum!(
                    dp_matrix.get_core(target_idx, k - 1, CoreCell::ML)
                        + profile.transition_score(Profile::MATCH_TO_DELETE_IDX, k - 1),
                    dp_matrix.get_core(target_idx, k - 1, CoreCell::DL)
                        + profile.transition_score(Profile::DELETE_TO_DELETE_IDX, k - 1)
                ),
            );
            dp_matrix.set_core(
                target_idx,
                k,
                CoreCell::DG,
                log_sum!(
                    dp_matrix.get_core(target_idx, k - 1, CoreCell::MG)
                        + profile.transition_score(Profile::MATCH_TO_DELETE_IDX, k - 1),
                    dp_matrix.get_core(target_idx, k - 1, CoreCell::DG)
                        + profile.transition_score(Profile::DELETE_TO_DELETE_IDX, k - 1)
                ),
            );

            // local exits
            end_score = log_sum!(
                end_score,
                dp_matrix.get_core(target_idx, k, CoreCell::ML) + profile.exit_scores[k],
                dp_matrix.get_core(target_idx, k, CoreCell::DL) + profile.exit_scores[k]
            );
        }

        // glocal exits
        end_score = log_sum!(
            end_score,
            dp_matrix.get_core(target_idx, profile_length, CoreCell::MG),
            dp_matrix.get_core(target_idx, profile_length, CoreCell::DG)
        );
        dp_matrix.set_special(target_idx, SpecialCell::E, end_score);

        // J state
        dp_matrix.set_special(
            target_idx,
            SpecialCell::J,
            log_sum!(
                dp_matrix.get_special(prev, SpecialCell::J)
                    + special(Profile::SPECIAL_J_IDX, loop_idx),
                end_score + special(Profile::SPECIAL_E_IDX, loop_idx)
            ),
        );

        // C state
        dp_matrix.set_special(
            target_idx,
            SpecialCell::C,
            log_sum!(
                dp_matrix.get_special(prev, SpecialCell::C)
                    + special(Profile::SPECIAL_C_IDX, loop_idx),
                end_score + special(Profile::SPECIAL_E_IDX, move_idx)
            ),
        );

        // N state
        dp_matrix.set_special(
            target_idx,
            SpecialCell::N,
            dp_matrix.get_special(prev, SpecialCell::N) + special(Profile::SPECIAL_N_IDX, loop_idx),
        );

        // B state
        let begin_score = log_sum!(
            dp_matrix.get_special(target_idx, SpecialCell::N)
                + special(Profile::SPECIAL_N_IDX, move_idx),
            dp_matrix.get_special(target_idx, SpecialCell::J)
                + special(Profile::SPECIAL_J_IDX, move_idx)
        );
        dp_matrix.set_special(target_idx, SpecialCell::B, begin_score);

        // L and G states
        dp_matrix.set_special(
            target_idx,
            SpecialCell::L,
            begin_score + special(Profile::SPECIAL_B_IDX, loop_idx),
        );
        dp_matrix.set_special(
            target_idx,
            SpecialCell::G,
            begin_score + special(Profile::SPECIAL_B_IDX, move_idx),
        );
    }

    let final_c_state_score = dp_matrix.get_special(target_length, SpecialCell::C);
    let c_to_t_score = special(Profile::SPECIAL_C_IDX, move_idx);

    Ok(Nats(final_c_state_score + c_to_t_score))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alphabet::Alphabet;
    use crate::structs::{AlignmentMode, Hmm};
    use assert2::check;

    /// A single node profile that scores every canonical residue 0.
    fn one_node_profile() -> anyhow::Result<Profile> {
        let mut profile = Profile::new(1, Alphabet::Dna)?;
        profile.mode = AlignmentMode::Dual;
        for residue in 0..4 {
            profile.match_scores[1][residue] = 0.0;
        }
        profile.entry_scores[1] = 0.0;
        profile.glocal_entry_scores[1] = 0.0;
        profile.exit_scores[1] = 0.0;
        profile.begin[1] = 1.0;
        profile.end[1] = 1.0;
        profile.special_transitions[Profile::SPECIAL_E_IDX] = [0.5f32.ln(), 0.5f32.ln()];
        profile.special_transitions[Profile::SPECIAL_B_IDX] = [0.5f32.ln(), 0.5f32.ln()];
        profile.expected_j_uses = 1.0;
        profile.configure_for_target_length(1);
        Ok(profile)
    }

    #[test]
    fn test_forward_closed_form() -> anyhow::Result<()> {
        let profile = one_node_profile()?;
        check!(profile.validate(1e-5) == Ok(()));

        let target = Sequence::from_utf8(b"G", Alphabet::Dna)?;
        let mut matrix = DpMatrix::default();
        let score = forward(&profile, &target, &mut matrix)?;

        let expected = profile.special_transition_score(Profile::SPECIAL_N_IDX, Profile::SPECIAL_MOVE_IDX)
            + profile.special_transition_score(Profile::SPECIAL_E_IDX, Profile::SPECIAL_MOVE_IDX)
            + profile.special_transition_score(Profile::SPECIAL_C_IDX, Profile::SPECIAL_MOVE_IDX);

        check!((score.value() - expected).abs() < 1e-5);
        Ok(())
    }

    #[test]
    fn test_forward_row_zero() -> anyhow::Result<()> {
        let hmm = Hmm::random(6, Alphabet::Amino, 1);
        let profile = Profile::from_hmm(&hmm, AlignmentMode::Dual, 20)?;
        let target = Sequence::random(20, Alphabet::Amino, 2)?;

        let mut matrix = DpMatrix::default();
        let score = forward(&profile, &target, &mut matrix)?;

        check!(score.value().is_finite());
        check!(matrix.matrix_type == MatrixType::Forward);
        check!(matrix.get_special(0, SpecialCell::N) == 0.0);
        check!(matrix.get_special(0, SpecialCell::C) == IMPOSSIBLE);
        check!(matrix.get_core(0, 3, CoreCell::ML) == IMPOSSIBLE);
        check!(matrix.get_core(1, 3, CoreCell::IL) == IMPOSSIBLE);
        check!(matrix.get_core(5, 1, CoreCell::DL) == IMPOSSIBLE);
        Ok(())
    }

    #[test]
    fn test_forward_reuse_is_identical() -> anyhow::Result<()> {
        let hmm = Hmm::random(5, Alphabet::Amino, 8);
        let profile = Profile::from_hmm(&hmm, AlignmentMode::Dual, 5)?;
        let target = Sequence::random(5, Alphabet::Amino, 9)?;

        let mut fresh = DpMatrix::new(5, 5)?;
        let fresh_score = forward(&profile, &target, &mut fresh)?;

        // grow to a much larger problem, then come back down
        let mut matrix = DpMatrix::new(5, 5)?;
        let big_hmm = Hmm::random(50, Alphabet::Amino, 10);
        let big_profile = Profile::from_hmm(&big_hmm, AlignmentMode::Dual, 50)?;
        let big_target = Sequence::random(50, Alphabet::Amino, 11)?;
        forward(&big_profile, &big_target, &mut matrix)?;
        let allocated = matrix.allocated_cells();

        matrix.reuse();
        let score = forward(&profile, &target, &mut matrix)?;

        check!(matrix.allocated_cells() == allocated);
        check!(score.value().to_bits() == fresh_score.value().to_bits());
        check!(matrix.compare(&fresh, 0.0).is_ok());
        Ok(())
    }

    #[test]
    fn test_forward_empty_target() -> anyhow::Result<()> {
        let hmm = Hmm::random(4, Alphabet::Dna, 1);
        let profile = Profile::from_hmm(&hmm, AlignmentMode::Dual, 0)?;
        let target = Sequence::from_utf8(b"", Alphabet::Dna)?;

        let mut matrix = DpMatrix::default();
        let score = forward(&profile, &target, &mut matrix)?;
        check!(score.value() == IMPOSSIBLE);
        Ok(())
    }
}
