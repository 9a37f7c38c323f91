use crate::align::structs::{CoreCell, DpMatrix, MatrixType, SpecialCell};
use crate::structs::Profile;
use crate::util::IMPOSSIBLE;

use strum::IntoEnumIterator;

use super::DpError;

/// Combine a forward and a backward matrix into posterior probabilities.
///
/// Every row that emits a residue is normalized so that its emitting
/// cells (M, I, N, JJ and CC) sum to one.
pub fn posterior(
    profile: &Profile,
    forward_matrix: &DpMatrix,
    backward_matrix: &DpMatrix,
    posterior_matrix: &mut DpMatrix,
) -> Result<(), DpError> {
    forward_matrix.check_type(MatrixType::Forward)?;
    backward_matrix.check_type(MatrixType::Backward)?;

    let profile_length = forward_matrix.profile_length;
    let target_length = forward_matrix.target_length;

    if backward_matrix.profile_length != profile_length
        || backward_matrix.target_length != target_length
    {
        return Err(DpError::Shape(
            profile_length,
            target_length,
            backward_matrix.profile_length,
            backward_matrix.target_length,
        ));
    }

    posterior_matrix.prepare(profile_length, target_length, MatrixType::Decoding, 0.0)?;

    let overall_score = forward_matrix.get_special(target_length, SpecialCell::C)
        + profile.special_transition_score(Profile::SPECIAL_C_IDX, Profile::SPECIAL_MOVE_IDX);

    if overall_score == IMPOSSIBLE {
        log::debug!("posterior: no path has a finite score; leaving the matrix at zero");
        return Ok(());
    }

    let j_loop = profile.special_transition_score(Profile::SPECIAL_J_IDX, Profile::SPECIAL_LOOP_IDX);
    let c_loop = profile.special_transition_score(Profile::SPECIAL_C_IDX, Profile::SPECIAL_LOOP_IDX);

    // rounding in exp(f + b - sc) can land a hair above one
    let probability = |log_value: f32| log_value.exp().min(1.0);

    let occupancy = |target_idx: usize, cell: SpecialCell| {
        probability(
            forward_matrix.get_special(target_idx, cell)
                + backward_matrix.get_special(target_idx, cell)
                - overall_score,
        )
    };

    for target_idx in 0..=target_length {
        for profile_idx in 1..=profile_length {
            for cell in CoreCell::iter() {
                posterior_matrix.set_core(
                    target_idx,
                    profile_idx,
                    cell,
                    probability(
                        forward_matrix.get_core(target_idx, profile_idx, cell)
                            + backward_matrix.get_core(target_idx, profile_idx, cell)
                            - overall_score,
                    ),
                );
            }
        }

        for cell in [
            SpecialCell::E,
            SpecialCell::N,
            SpecialCell::J,
            SpecialCell::B,
            SpecialCell::L,
            SpecialCell::G,
            SpecialCell::C,
        ] {
            posterior_matrix.set_special(target_idx, cell, occupancy(target_idx, cell));
        }

        if target_idx == 0 {
            continue;
        }

        // the emitting self-transitions of J and C
        let prev = target_idx - 1;
        posterior_matrix.set_special(
            target_idx,
            SpecialCell::JJ,
            probability(
                forward_matrix.get_special(prev, SpecialCell::J)
                    + j_loop
                    + backward_matrix.get_special(target_idx, SpecialCell::J)
                    - overall_score,
            ),
        );
        posterior_matrix.set_special(
            target_idx,
            SpecialCell::CC,
            probability(
                forward_matrix.get_special(prev, SpecialCell::C)
                    + c_loop
                    + backward_matrix.get_special(target_idx, SpecialCell::C)
                    - overall_score,
            ),
        );

        normalize_row(posterior_matrix, target_idx);
    }

    Ok(())
}

/// Scale a row so the cells that emit residue `target_idx` sum to one.
fn normalize_row(posterior_matrix: &mut DpMatrix, target_idx: usize) {
    let profile_length = posterior_matrix.profile_length;

    let mut row_sum = posterior_matrix.get_special(target_idx, SpecialCell::N)
        + posterior_matrix.get_special(target_idx, SpecialCell::JJ)
        + posterior_matrix.get_special(target_idx, SpecialCell::CC);
    for profile_idx in 1..=profile_length {
        for cell in [CoreCell::ML, CoreCell::MG, CoreCell::IL, CoreCell::IG] {
            row_sum += posterior_matrix.get_core(target_idx, profile_idx, cell);
        }
    }

    if row_sum <= 0.0 {
        return;
    }

    let scale = 1.0 / row_sum;
    for profile_idx in 1..=profile_length {
        for cell in CoreCell::iter() {
            let value = posterior_matrix.get_core(target_idx, profile_idx, cell);
            posterior_matrix.set_core(target_idx, profile_idx, cell, (value * scale).min(1.0));
        }
    }
    for cell in SpecialCell::iter() {
        let value = posterior_matrix.get_special(target_idx, cell);
        posterior_matrix.set_special(target_idx, cell, (value * scale).min(1.0));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::align::{backward, forward};
    use crate::alphabet::Alphabet;
    use crate::structs::{AlignmentMode, Hmm, Sequence};
    use assert2::check;

    fn emitting_sum(matrix: &DpMatrix, target_idx: usize) -> f32 {
        let mut sum = matrix.get_special(target_idx, SpecialCell::N)
            + matrix.get_special(target_idx, SpecialCell::JJ)
            + matrix.get_special(target_idx, SpecialCell::CC);
        for k in 1..=matrix.profile_length {
            sum += matrix.get_core(target_idx, k, CoreCell::ML)
                + matrix.get_core(target_idx, k, CoreCell::MG)
                + matrix.get_core(target_idx, k, CoreCell::IL)
                + matrix.get_core(target_idx, k, CoreCell::IG);
        }
        sum
    }

    fn decode(mode: AlignmentMode, seed: u64) -> anyhow::Result<DpMatrix> {
        let hmm = Hmm::random(10, Alphabet::Amino, seed);
        let profile = Profile::from_hmm(&hmm, mode, 25)?;
        let target = Sequence::random(25, Alphabet::Amino, seed + 1)?;

        let mut fwd = DpMatrix::default();
        let mut bck = DpMatrix::default();
        let mut post = DpMatrix::default();
        forward(&profile, &target, &mut fwd)?;
        backward(&profile, &target, &mut bck)?;
        posterior(&profile, &fwd, &bck, &mut post)?;
        Ok(post)
    }

    #[test]
    fn test_posterior_rows_sum_to_one() -> anyhow::Result<()> {
        for (mode, seed) in [
            (AlignmentMode::Dual, 3),
            (AlignmentMode::UniLocal, 5),
            (AlignmentMode::Glocal, 9),
        ] {
            let post = decode(mode, seed)?;
            check!(post.matrix_type == MatrixType::Decoding);
            for target_idx in 1..=post.target_length {
                let sum = emitting_sum(&post, target_idx);
                check!((sum - 1.0).abs() < 1e-4, "row {target_idx} sums to {sum}");
            }
        }
        Ok(())
    }

    #[test]
    fn test_posterior_cells_are_probabilities() -> anyhow::Result<()> {
        let modes = [
            AlignmentMode::Local,
            AlignmentMode::Glocal,
            AlignmentMode::UniLocal,
            AlignmentMode::UniGlocal,
            AlignmentMode::Dual,
            AlignmentMode::UniDual,
        ];
        for seed in 0..20 {
            for mode in modes {
                let post = decode(mode, seed)?;
                for target_idx in 0..=post.target_length {
                    for profile_idx in 1..=post.profile_length {
                        for cell in CoreCell::iter() {
                            let value = post.get_core(target_idx, profile_idx, cell);
                            check!(
                                (0.0..=1.0).contains(&value),
                                "{mode} seed {seed}: {cell} at ({target_idx}, {profile_idx}) is {value}"
                            );
                        }
                    }
                    for cell in SpecialCell::iter() {
                        let value = post.get_special(target_idx, cell);
                        check!(
                            (0.0..=1.0).contains(&value),
                            "{mode} seed {seed}: {cell} at row {target_idx} is {value}"
                        );
                    }
                }
            }
        }
        Ok(())
    }

    #[test]
    fn test_posterior_fixed_cells_are_zero() -> anyhow::Result<()> {
        let post = decode(AlignmentMode::Dual, 11)?;
        let last = post.target_length;

        check!(post.get_special(0, SpecialCell::C) == 0.0);
        check!(post.get_special(1, SpecialCell::JJ) == 0.0);
        check!(post.get_special(last, SpecialCell::N) == 0.0);
        check!(post.get_core(1, 4, CoreCell::IL) == 0.0);
        check!(post.get_core(last, 4, CoreCell::IG) == 0.0);
        check!(post.get_core(7, 1, CoreCell::DL) == 0.0);
        check!(post.get_core(7, post.profile_length, CoreCell::IL) == 0.0);
        Ok(())
    }

    #[test]
    fn test_posterior_rejects_wrong_matrices() -> anyhow::Result<()> {
        let hmm = Hmm::random(5, Alphabet::Dna, 2);
        let profile = Profile::from_hmm(&hmm, AlignmentMode::Dual, 8)?;
        let target = Sequence::random(8, Alphabet::Dna, 3)?;

        let mut fwd = DpMatrix::default();
        let mut post = DpMatrix::default();
        forward(&profile, &target, &mut fwd)?;

        let result = posterior(&profile, &fwd, &fwd, &mut post);
        check!(let Err(DpError::MatrixType(_)) = result);

        let mut bck = DpMatrix::default();
        let short_target = Sequence::random(4, Alphabet::Dna, 3)?;
        backward(&profile, &short_target, &mut bck)?;
        let result = posterior(&profile, &fwd, &bck, &mut post);
        check!(let Err(DpError::Shape(5, 8, 5, 4)) = result);
        Ok(())
    }
}
