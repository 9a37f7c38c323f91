use crate::align::structs::{CoreCell, DpMatrix, MatrixAllocationError, MatrixType, SpecialCell};
use crate::log_sum;
use crate::structs::{Profile, Sequence};
use crate::util::IMPOSSIBLE;

use super::Nats;

/// Fill `dp_matrix` with the log probability of every path suffix, and return the total score.
///
/// The score is read from N in row 0, and it should match the forward score
/// up to floating point error.
pub fn backward(
    profile: &Profile,
    target: &Sequence,
    dp_matrix: &mut DpMatrix,
) -> Result<Nats, MatrixAllocationError> {
    debug_assert!(profile.alphabet == target.alphabet);

    let profile_length = profile.length;
    let target_length = target.length;

    log::trace!("backward: M={profile_length} L={target_length}");
    dp_matrix.prepare(profile_length, target_length, MatrixType::Backward, IMPOSSIBLE)?;

    // an empty target has no path at all
    if target_length == 0 {
        return Ok(Nats(IMPOSSIBLE));
    }

    let special = |state_idx: usize, transition_idx: usize| {
        profile.special_transition_score(state_idx, transition_idx)
    };
    let (loop_idx, move_idx) = (Profile::SPECIAL_LOOP_IDX, Profile::SPECIAL_MOVE_IDX);

    // the last row: every path ends through C -> T
    let c_score = special(Profile::SPECIAL_C_IDX, move_idx);
    let e_score = c_score + special(Profile::SPECIAL_E_IDX, move_idx);
    dp_matrix.set_special(target_length, SpecialCell::C, c_score);
    dp_matrix.set_special(target_length, SpecialCell::E, e_score);

    set_last_node(profile, dp_matrix, target_length, e_score);
    for profile_idx in (1..profile_length).rev() {
        let k = profile_idx;
        let exit = e_score + profile.exit_scores[k];
        let next_dl = dp_matrix.get_core(target_length, k + 1, CoreCell::DL);
        let next_dg = dp_matrix.get_core(target_length, k + 1, CoreCell::DG);

        dp_matrix.set_core(
            target_length,
            k,
            CoreCell::ML,
            log_sum!(exit, next_dl + profile.transition_score(Profile::MATCH_TO_DELETE_IDX, k)),
        );
        dp_matrix.set_core(
            target_length,
            k,
            CoreCell::MG,
            next_dg + profile.transition_score(Profile::MATCH_TO_DELETE_IDX, k),
        );
        dp_matrix.set_core(
            target_length,
            k,
            CoreCell::DL,
            log_sum!(exit, next_dl + profile.transition_score(Profile::DELETE_TO_DELETE_IDX, k)),
        );
        dp_matrix.set_core(
            target_length,
            k,
            CoreCell::DG,
            next_dg + profile.transition_score(Profile::DELETE_TO_DELETE_IDX, k),
        );
    }

    for target_idx in (1..target_length).rev() {
        let next = target_idx + 1;
        let next_residue = target.residue(next);

        // L and G states enter the model on the next row
        let mut local_begin = IMPOSSIBLE;
        let mut glocal_begin = IMPOSSIBLE;
        for k in 1..=profile_length {
            let match_score = profile.match_score(next_residue, k);
            local_begin = log_sum!(
                local_begin,
                dp_matrix.get_core(next, k, CoreCell::ML) + match_score + profile.entry_scores[k]
            );
            glocal_begin = log_sum!(
                glocal_begin,
                dp_matrix.get_core(next, k, CoreCell::MG)
                    + match_score
                    + profile.glocal_entry_scores[k]
            );
        }
        dp_matrix.set_special(target_idx, SpecialCell::L, local_begin);
        dp_matrix.set_special(target_idx, SpecialCell::G, glocal_begin);

        // B state
        let begin_score = log_sum!(
            local_begin + special(Profile::SPECIAL_B_IDX, loop_idx),
            glocal_begin + special(Profile::SPECIAL_B_IDX, move_idx)
        );
        dp_matrix.set_special(target_idx, SpecialCell::B, begin_score);

        // J state
        let j_score = log_sum!(
            dp_matrix.get_special(next, SpecialCell::J) + special(Profile::SPECIAL_J_IDX, loop_idx),
            begin_score + special(Profile::SPECIAL_J_IDX, move_idx)
        );
        dp_matrix.set_special(target_idx, SpecialCell::J, j_score);

        // C state
        let c_score =
            dp_matrix.get_special(next, SpecialCell::C) + special(Profile::SPECIAL_C_IDX, loop_idx);
        dp_matrix.set_special(target_idx, SpecialCell::C, c_score);

        // E state
        let e_score = log_sum!(
            j_score + special(Profile::SPECIAL_E_IDX, loop_idx),
            c_score + special(Profile::SPECIAL_E_IDX, move_idx)
        );
        dp_matrix.set_special(target_idx, SpecialCell::E, e_score);

        // N state
        dp_matrix.set_special(
            target_idx,
            SpecialCell::N,
            log_sum!(
                dp_matrix.get_special(next, SpecialCell::N)
                    + special(Profile::SPECIAL_N_IDX, loop_idx),
                begin_score + special(Profile::SPECIAL_N_IDX, move_idx)
            ),
        );

        set_last_node(profile, dp_matrix, target_idx, e_score);
        for profile_idx in (1..profile_length).rev() {
            let k = profile_idx;
            let exit = e_score + profile.exit_scores[k];

            let next_match_score = profile.match_score(next_residue, k + 1);
            let next_insert_score = profile.insert_score(next_residue, k);

            let ml_next = dp_matrix.get_core(next, k + 1, CoreCell::ML) + next_match_score;
            let mg_next = dp_matrix.get_core(next, k + 1, CoreCell::MG) + next_match_score;
            let il_next = dp_matrix.get_core(next, k, CoreCell::IL) + next_insert_score;
            let ig_next = dp_matrix.get_core(next, k, CoreCell::IG) + next_insert_score;
            let dl_next = dp_matrix.get_core(target_idx, k + 1, CoreCell::DL);
            let dg_next = dp_matrix.get_core(target_idx, k + 1, CoreCell::DG);

            // match states
            dp_matrix.set_core(
                target_idx,
                k,
                CoreCell::ML,
                log_sum!(
                    ml_next + profile.transition_score(Profile::MATCH_TO_MATCH_IDX, k),
                    il_next + profile.transition_score(Profile::MATCH_TO_INSERT_IDX, k),
                    dl_next + profile.transition_score(Profile::MATCH_TO_DELETE_IDX, k),
                    exit
                ),
            );
            dp_matrix.set_core(
                target_idx,
                k,
                CoreCell::MG,
                log_sum!(
                    mg_next + profile.transition_score(Profile::MATCH_TO_MATCH_IDX, k),
                    ig_next + profile.transition_score(Profile::MATCH_TO_INSERT_IDX, k),
                    dg_next + profile.transition_score(Profile::MATCH_TO_DELETE_IDX, k)
                ),
            );

            // insert states
            dp_matrix.set_core(
                target_idx,
                k,
                CoreCell::IL,
                log_sum!(
                    ml_next + profile.transition_score(Profile::INSERT_TO_MATCH_IDX, k),
                    il_next + profile.transition_score(Profile::INSERT_TO_INSERT_IDX, k)
                ),
            );
            dp_matrix.set_core(
                target_idx,
                k,
                CoreCell::IG,
                log_sum!(
                    mg_next + profile.transition_score(Profile::INSERT_TO_MATCH_IDX, k),
                    ig_next + profile.transition_score(Profile::INSERT_TO_INSERT_IDX, k)
                ),
            );

            // delete states
            dp_matrix.set_core(
                target_idx,
                k,
                CoreCell::DL,
                log_sum!(
                    ml_next + profile.transition_score(Profile::DELETE_TO_MATCH_IDX, k),
                    dl_next + profile.transition_score(Profile::DELETE_TO_DELETE_IDX, k),
                    exit
                ),
            );
            dp_matrix.set_core(
                target_idx,
                k,
                CoreCell::DG,
                log_sum!(
                    mg_next + profile.transition_score(Profile::DELETE_TO_MATCH_IDX, k),
                    dg_next + profile.transition_score(Profile::DELETE_TO_DELETE_IDX, k)
                ),
            );
        }
    }

    // row 0 only reaches the model through N -> B
    let first_residue = target.residue(1);
    let mut local_begin = IMPOSSIBLE;
    let mut glocal_begin = IMPOSSIBLE;
    for k in 1..=profile_length {
        let match_score = profile.match_score(first_residue, k);
        local_begin = log_sum!(
            local_begin,
            dp_matrix.get_core(1, k, CoreCell::ML) + match_score + profile.entry_scores[k]
        );
        glocal_begin = log_sum!(
            glocal_begin,
            dp_matrix.get_core(1, k, CoreCell::MG) + match_score + profile.glocal_entry_scores[k]
        );
    }
    dp_matrix.set_special(0, SpecialCell::L, local_begin);
    dp_matrix.set_special(0, SpecialCell::G, glocal_begin);

    let begin_score = log_sum!(
        local_begin + special(Profile::SPECIAL_B_IDX, loop_idx),
        glocal_begin + special(Profile::SPECIAL_B_IDX, move_idx)
    );
    dp_matrix.set_special(0, SpecialCell::B, begin_score);

    let n_score = log_sum!(
        dp_matrix.get_special(1, SpecialCell::N) + special(Profile::SPECIAL_N_IDX, loop_idx),
        begin_score + special(Profile::SPECIAL_N_IDX, move_idx)
    );
    dp_matrix.set_special(0, SpecialCell::N, n_score);

    Ok(Nats(n_score))
}

/// Node M has no successors in the core model, so every state there can only exit.
fn set_last_node(profile: &Profile, dp_matrix: &mut DpMatrix, target_idx: usize, e_score: f32) {
    let m = profile.length;
    let local_exit = e_score + profile.exit_scores[m];

    dp_matrix.set_core(target_idx, m, CoreCell::ML, local_exit);
    dp_matrix.set_core(target_idx, m, CoreCell::DL, local_exit);
    dp_matrix.set_core(target_idx, m, CoreCell::MG, e_score);
    dp_matrix.set_core(target_idx, m, CoreCell::DG, e_score);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::align::forward;
    use crate::alphabet::Alphabet;
    use crate::structs::{AlignmentMode, Hmm};
    use assert2::check;
    use proptest::prelude::*;

    fn assert_scores_agree(forward_score: f32, backward_score: f32) {
        let tolerance = 1e-3 * forward_score.abs().max(1.0);
        assert!(
            (forward_score - backward_score).abs() < tolerance,
            "forward: {forward_score}, backward: {backward_score}"
        );
    }

    #[test]
    fn test_backward_matches_forward() -> anyhow::Result<()> {
        for mode in [
            AlignmentMode::Dual,
            AlignmentMode::Local,
            AlignmentMode::Glocal,
            AlignmentMode::UniLocal,
            AlignmentMode::UniGlocal,
            AlignmentMode::UniDual,
        ] {
            let hmm = Hmm::random(12, Alphabet::Amino, 7);
            let profile = Profile::from_hmm(&hmm, mode, 30)?;
            let target = Sequence::random(30, Alphabet::Amino, 8)?;

            let mut fwd = DpMatrix::default();
            let mut bck = DpMatrix::default();
            let forward_score = forward(&profile, &target, &mut fwd)?;
            let backward_score = backward(&profile, &target, &mut bck)?;

            check!(forward_score.value().is_finite());
            assert_scores_agree(forward_score.value(), backward_score.value());
        }
        Ok(())
    }

    #[test]
    fn test_backward_last_row() -> anyhow::Result<()> {
        let hmm = Hmm::random(4, Alphabet::Dna, 21);
        let profile = Profile::from_hmm(&hmm, AlignmentMode::Dual, 6)?;
        let target = Sequence::random(6, Alphabet::Dna, 22)?;

        let mut matrix = DpMatrix::default();
        backward(&profile, &target, &mut matrix)?;

        let c_to_t =
            profile.special_transition_score(Profile::SPECIAL_C_IDX, Profile::SPECIAL_MOVE_IDX);
        check!(matrix.matrix_type == MatrixType::Backward);
        check!(matrix.get_special(6, SpecialCell::C) == c_to_t);
        check!(matrix.get_special(6, SpecialCell::N) == IMPOSSIBLE);
        check!(matrix.get_special(6, SpecialCell::B) == IMPOSSIBLE);
        check!(matrix.get_core(6, 4, CoreCell::MG) == matrix.get_special(6, SpecialCell::E));
        check!(matrix.get_core(6, 2, CoreCell::IL) == IMPOSSIBLE);
        check!(matrix.get_core(0, 2, CoreCell::ML) == IMPOSSIBLE);
        Ok(())
    }

    #[test]
    fn test_backward_empty_target() -> anyhow::Result<()> {
        let hmm = Hmm::random(4, Alphabet::Dna, 1);
        let profile = Profile::from_hmm(&hmm, AlignmentMode::Dual, 0)?;
        let target = Sequence::from_utf8(b"", Alphabet::Dna)?;

        let mut matrix = DpMatrix::default();
        let score = backward(&profile, &target, &mut matrix)?;
        check!(score.value() == IMPOSSIBLE);
        Ok(())
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn test_forward_backward_agree(
            profile_length in 1usize..16,
            target_length in 1usize..24,
            seed in any::<u64>(),
            mode_idx in 0usize..6,
        ) {
            let modes = [
                AlignmentMode::Local,
                AlignmentMode::Glocal,
                AlignmentMode::UniLocal,
                AlignmentMode::UniGlocal,
                AlignmentMode::Dual,
                AlignmentMode::UniDual,
            ];
            let hmm = Hmm::random(profile_length, Alphabet::Amino, seed);
            let profile = Profile::from_hmm(&hmm, modes[mode_idx], target_length).unwrap();
            let target = Sequence::random(target_length, Alphabet::Amino, seed.wrapping_add(1)).unwrap();

            let mut fwd = DpMatrix::default();
            let mut bck = DpMatrix::default();
            let forward_score = forward(&profile, &target, &mut fwd).unwrap();
            let backward_score = backward(&profile, &target, &mut bck).unwrap();

            assert_scores_agree(forward_score.value(), backward_score.value());
        }
    }
}
