use crate::align::structs::{CoreCell, DpMatrix, MatrixAllocationError, MatrixType, SpecialCell};
use crate::max_f32;
use crate::structs::Profile;
use crate::util::IMPOSSIBLE;

use super::Nats;

/// The scores a max-path recurrence is built from.
///
/// Viterbi scores paths with the profile's log probabilities; the optimal
/// accuracy alignment scores them with posterior probabilities and
/// masked transitions. Both share [`fill`] and the traceback.
pub trait PathScorer {
    fn profile_length(&self) -> usize;
    fn target_length(&self) -> usize;
    fn matrix_type(&self) -> MatrixType;

    fn transition(&self, transition_idx: usize, profile_idx: usize) -> f32;
    fn special(&self, state_idx: usize, transition_idx: usize) -> f32;
    fn entry(&self, profile_idx: usize) -> f32;
    fn glocal_entry(&self, profile_idx: usize) -> f32;
    fn exit(&self, profile_idx: usize) -> f32;

    /// The score of `cell` (ML or MG) emitting residue `target_idx` at node `profile_idx`.
    fn match_emission(&self, target_idx: usize, profile_idx: usize, cell: CoreCell) -> f32;
    /// The score of `cell` (IL or IG) emitting residue `target_idx` at node `profile_idx`.
    fn insert_emission(&self, target_idx: usize, profile_idx: usize, cell: CoreCell) -> f32;
    /// The score of N, J or C emitting residue `target_idx` on a self-transition.
    ///
    /// J and C are asked with [`SpecialCell::JJ`] and [`SpecialCell::CC`].
    fn loop_emission(&self, target_idx: usize, cell: SpecialCell) -> f32;

    /// Whether the states that can't finish a path are cut from the last row.
    fn truncate_last_row(&self) -> bool {
        false
    }
}

/// The candidate predecessors of a match cell, in traceback priority order:
/// match, insert, delete, then entry from L or G.
pub(super) fn match_sources(
    scorer: &impl PathScorer,
    dp_matrix: &DpMatrix,
    target_idx: usize,
    profile_idx: usize,
    cell: CoreCell,
) -> [f32; 4] {
    let (i, k) = (target_idx - 1, profile_idx - 1);
    let (m, ins, del, begin, entry) = match cell {
        CoreCell::ML => (
            CoreCell::ML,
            CoreCell::IL,
            CoreCell::DL,
            SpecialCell::L,
            scorer.entry(profile_idx),
        ),
        _ => (
            CoreCell::MG,
            CoreCell::IG,
            CoreCell::DG,
            SpecialCell::G,
            scorer.glocal_entry(profile_idx),
        ),
    };

    [
        dp_matrix.get_core(i, k, m) + scorer.transition(Profile::MATCH_TO_MATCH_IDX, k),
        dp_matrix.get_core(i, k, ins) + scorer.transition(Profile::INSERT_TO_MATCH_IDX, k),
        dp_matrix.get_core(i, k, del) + scorer.transition(Profile::DELETE_TO_MATCH_IDX, k),
        dp_matrix.get_special(i, begin) + entry,
    ]
}

/// The candidate predecessors of an insert cell: match, then insert.
pub(super) fn insert_sources(
    scorer: &impl PathScorer,
    dp_matrix: &DpMatrix,
    target_idx: usize,
    profile_idx: usize,
    cell: CoreCell,
) -> [f32; 2] {
    let (m, ins) = match cell {
        CoreCell::IL => (CoreCell::ML, CoreCell::IL),
        _ => (CoreCell::MG, CoreCell::IG),
    };
    let i = target_idx - 1;

    [
        dp_matrix.get_core(i, profile_idx, m)
            + scorer.transition(Profile::MATCH_TO_INSERT_IDX, profile_idx),
        dp_matrix.get_core(i, profile_idx, ins)
            + scorer.transition(Profile::INSERT_TO_INSERT_IDX, profile_idx),
    ]
}

/// The candidate predecessors of a delete cell: match, then delete.
pub(super) fn delete_sources(
    scorer: &impl PathScorer,
    dp_matrix: &DpMatrix,
    target_idx: usize,
    profile_idx: usize,
    cell: CoreCell,
) -> [f32; 2] {
    let (m, del) = match cell {
        CoreCell::DL => (CoreCell::ML, CoreCell::DL),
        _ => (CoreCell::MG, CoreCell::DG),
    };
    let k = profile_idx - 1;

    [
        dp_matrix.get_core(target_idx, k, m) + scorer.transition(Profile::MATCH_TO_DELETE_IDX, k),
        dp_matrix.get_core(target_idx, k, del)
            + scorer.transition(Profile::DELETE_TO_DELETE_IDX, k),
    ]
}

/// The candidate predecessors of J or C: the emitting loop, then arrival from E.
pub(super) fn flank_sources(
    scorer: &impl PathScorer,
    dp_matrix: &DpMatrix,
    target_idx: usize,
    cell: SpecialCell,
) -> [f32; 2] {
    let (state_idx, emission_cell, e_transition) = match cell {
        SpecialCell::J => (Profile::SPECIAL_J_IDX, SpecialCell::JJ, Profile::SPECIAL_LOOP_IDX),
        _ => (Profile::SPECIAL_C_IDX, SpecialCell::CC, Profile::SPECIAL_MOVE_IDX),
    };

    [
        dp_matrix.get_special(target_idx - 1, cell)
            + scorer.special(state_idx, Profile::SPECIAL_LOOP_IDX)
            + scorer.loop_emission(target_idx, emission_cell),
        dp_matrix.get_special(target_idx, SpecialCell::E)
            + scorer.special(Profile::SPECIAL_E_IDX, e_transition),
    ]
}

/// The candidate predecessors of B: N, then J.
pub(super) fn begin_sources(
    scorer: &impl PathScorer,
    dp_matrix: &DpMatrix,
    target_idx: usize,
) -> [f32; 2] {
    [
        dp_matrix.get_special(target_idx, SpecialCell::N)
            + scorer.special(Profile::SPECIAL_N_IDX, Profile::SPECIAL_MOVE_IDX),
        dp_matrix.get_special(target_idx, SpecialCell::J)
            + scorer.special(Profile::SPECIAL_J_IDX, Profile::SPECIAL_MOVE_IDX),
    ]
}

/// Fill `dp_matrix` with the best score of any path prefix, and return the best total score.
pub(super) fn fill(
    scorer: &impl PathScorer,
    dp_matrix: &mut DpMatrix,
) -> Result<Nats, MatrixAllocationError> {
    let profile_length = scorer.profile_length();
    let target_length = scorer.target_length();

    dp_matrix.prepare(profile_length, target_length, scorer.matrix_type(), IMPOSSIBLE)?;

    let (loop_idx, move_idx) = (Profile::SPECIAL_LOOP_IDX, Profile::SPECIAL_MOVE_IDX);

    dp_matrix.set_special(0, SpecialCell::N, 0.0);
    let begin_score = scorer.special(Profile::SPECIAL_N_IDX, move_idx);
    dp_matrix.set_special(0, SpecialCell::B, begin_score);
    dp_matrix.set_special(
        0,
        SpecialCell::L,
        begin_score + scorer.special(Profile::SPECIAL_B_IDX, loop_idx),
    );
    dp_matrix.set_special(
        0,
        SpecialCell::G,
        begin_score + scorer.special(Profile::SPECIAL_B_IDX, move_idx),
    );

    for target_idx in 1..=target_length {
        let mut end_score = IMPOSSIBLE;

        for profile_idx in 1..=profile_length {
            for cell in [CoreCell::ML, CoreCell::MG] {
                let [m, i, d, b] = match_sources(scorer, dp_matrix, target_idx, profile_idx, cell);
                dp_matrix.set_core(
                    target_idx,
                    profile_idx,
                    cell,
                    max_f32!(m, i, d, b) + scorer.match_emission(target_idx, profile_idx, cell),
                );
            }

            if profile_idx < profile_length {
                for cell in [CoreCell::IL, CoreCell::IG] {
                    let [m, i] = insert_sources(scorer, dp_matrix, target_idx, profile_idx, cell);
                    dp_matrix.set_core(
                        target_idx,
                        profile_idx,
                        cell,
                        max_f32!(m, i) + scorer.insert_emission(target_idx, profile_idx, cell),
                    );
                }
            }

            for cell in [CoreCell::DL, CoreCell::DG] {
                let [m, d] = delete_sources(scorer, dp_matrix, target_idx, profile_idx, cell);
                dp_matrix.set_core(target_idx, profile_idx, cell, max_f32!(m, d));
            }

            end_score = max_f32!(
                end_score,
                dp_matrix.get_core(target_idx, profile_idx, CoreCell::ML) + scorer.exit(profile_idx),
                dp_matrix.get_core(target_idx, profile_idx, CoreCell::DL) + scorer.exit(profile_idx)
            );
        }

        end_score = max_f32!(
            end_score,
            dp_matrix.get_core(target_idx, profile_length, CoreCell::MG),
            dp_matrix.get_core(target_idx, profile_length, CoreCell::DG)
        );
        dp_matrix.set_special(target_idx, SpecialCell::E, end_score);

        for cell in [SpecialCell::J, SpecialCell::C] {
            let [looped, arrived] = flank_sources(scorer, dp_matrix, target_idx, cell);
            dp_matrix.set_special(target_idx, cell, max_f32!(looped, arrived));
        }

        dp_matrix.set_special(
            target_idx,
            SpecialCell::N,
            dp_matrix.get_special(target_idx - 1, SpecialCell::N)
                + scorer.special(Profile::SPECIAL_N_IDX, loop_idx)
                + scorer.loop_emission(target_idx, SpecialCell::N),
        );

        let [from_n, from_j] = begin_sources(scorer, dp_matrix, target_idx);
        let begin_score = max_f32!(from_n, from_j);
        dp_matrix.set_special(target_idx, SpecialCell::B, begin_score);
        dp_matrix.set_special(
            target_idx,
            SpecialCell::L,
            begin_score + scorer.special(Profile::SPECIAL_B_IDX, loop_idx),
        );
        dp_matrix.set_special(
            target_idx,
            SpecialCell::G,
            begin_score + scorer.special(Profile::SPECIAL_B_IDX, move_idx),
        );
    }

    if scorer.truncate_last_row() && target_length > 0 {
        // nothing that can't reach T is allowed on the last row
        for profile_idx in 1..=profile_length {
            dp_matrix.set_core(target_length, profile_idx, CoreCell::IL, IMPOSSIBLE);
            dp_matrix.set_core(target_length, profile_idx, CoreCell::IG, IMPOSSIBLE);
        }
        for cell in [
            SpecialCell::N,
            SpecialCell::J,
            SpecialCell::B,
            SpecialCell::L,
            SpecialCell::G,
        ] {
            dp_matrix.set_special(target_length, cell, IMPOSSIBLE);
        }
    }

    Ok(Nats(
        dp_matrix.get_special(target_length, SpecialCell::C)
            + scorer.special(Profile::SPECIAL_C_IDX, move_idx),
    ))
}
