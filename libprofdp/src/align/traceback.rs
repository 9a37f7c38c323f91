use crate::align::max_path::{
    begin_sources, delete_sources, flank_sources, insert_sources, match_sources, PathScorer,
};
use crate::align::structs::{CoreCell, DpMatrix, SpecialCell, State, Trace};
use crate::util::IMPOSSIBLE;

use super::DpError;

/// The index of the first candidate that produced `value`, if any.
///
/// Candidates are listed in priority order, so ties go to the earliest one.
fn first_match(candidates: &[f32], offset: f32, value: f32) -> Option<usize> {
    candidates.iter().position(|&c| c + offset == value)
}

/// Recover the best path from a matrix filled by a max-path recurrence.
///
/// Each predecessor is found by recomputing the candidate scores exactly as
/// the fill did and taking the first one equal to the stored cell.
pub fn traceback(
    scorer: &impl PathScorer,
    dp_matrix: &DpMatrix,
    trace: &mut Trace,
) -> Result<(), DpError> {
    dp_matrix.check_type(scorer.matrix_type())?;

    let profile_length = dp_matrix.profile_length;
    let target_length = dp_matrix.target_length;
    *trace = Trace::new(profile_length, target_length);

    if target_length == 0 || dp_matrix.get_special(target_length, SpecialCell::C) == IMPOSSIBLE {
        return Err(DpError::NoPath);
    }

    let stuck = |state: State, target_idx: usize, profile_idx: usize| DpError::Traceback {
        state,
        target_idx,
        profile_idx,
    };

    let mut state = State::C;
    let mut target_idx = target_length;
    let mut profile_idx = 0;

    trace.push(State::T, 0, 0, 0.0);

    loop {
        match state {
            State::C | State::J => {
                let cell = if state == State::C {
                    SpecialCell::C
                } else {
                    SpecialCell::J
                };
                if target_idx == 0 {
                    return Err(stuck(state, target_idx, profile_idx));
                }
                let value = dp_matrix.get_special(target_idx, cell);
                match first_match(&flank_sources(scorer, dp_matrix, target_idx, cell), 0.0, value) {
                    Some(0) => {
                        trace.push(state, 0, target_idx, 0.0);
                        target_idx -= 1;
                    }
                    Some(_) => {
                        trace.push(state, 0, 0, 0.0);
                        state = State::E;
                    }
                    None => return Err(stuck(state, target_idx, profile_idx)),
                }
            }

            State::E => {
                trace.push(State::E, 0, 0, 0.0);
                let value = dp_matrix.get_special(target_idx, SpecialCell::E);

                let local_match = (1..=profile_length).find(|&k| {
                    dp_matrix.get_core(target_idx, k, CoreCell::ML) + scorer.exit(k) == value
                });
                let local_delete = (1..=profile_length).find(|&k| {
                    dp_matrix.get_core(target_idx, k, CoreCell::DL) + scorer.exit(k) == value
                });

                (state, profile_idx) = if let Some(k) = local_match {
                    (State::ML, k)
                } else if let Some(k) = local_delete {
                    (State::DL, k)
                } else if dp_matrix.get_core(target_idx, profile_length, CoreCell::MG) == value {
                    (State::MG, profile_length)
                } else if dp_matrix.get_core(target_idx, profile_length, CoreCell::DG) == value {
                    (State::DG, profile_length)
                } else {
                    return Err(stuck(State::E, target_idx, profile_idx));
                };
            }

            State::ML | State::MG => {
                let cell = if state == State::ML {
                    CoreCell::ML
                } else {
                    CoreCell::MG
                };
                let value = dp_matrix.get_core(target_idx, profile_idx, cell);
                let candidates = match_sources(scorer, dp_matrix, target_idx, profile_idx, cell);
                let emission = scorer.match_emission(target_idx, profile_idx, cell);

                trace.push(state, profile_idx, target_idx, 0.0);

                let local = state == State::ML;
                state = match first_match(&candidates, emission, value) {
                    Some(0) if local => State::ML,
                    Some(0) => State::MG,
                    Some(1) if local => State::IL,
                    Some(1) => State::IG,
                    Some(2) if local => State::DL,
                    Some(2) => State::DG,
                    Some(_) if local => State::L,
                    Some(_) => State::G,
                    None => return Err(stuck(state, target_idx, profile_idx)),
                };
                target_idx -= 1;
                profile_idx = if state.is_core() { profile_idx - 1 } else { 0 };
            }

            State::IL | State::IG => {
                let cell = if state == State::IL {
                    CoreCell::IL
                } else {
                    CoreCell::IG
                };
                let value = dp_matrix.get_core(target_idx, profile_idx, cell);
                let candidates = insert_sources(scorer, dp_matrix, target_idx, profile_idx, cell);
                let emission = scorer.insert_emission(target_idx, profile_idx, cell);

                trace.push(state, profile_idx, target_idx, 0.0);

                let local = state == State::IL;
                state = match first_match(&candidates, emission, value) {
                    Some(0) if local => State::ML,
                    Some(0) => State::MG,
                    Some(_) => state,
                    None => return Err(stuck(state, target_idx, profile_idx)),
                };
                target_idx -= 1;
            }

            State::DL | State::DG => {
                let cell = if state == State::DL {
                    CoreCell::DL
                } else {
                    CoreCell::DG
                };
                let value = dp_matrix.get_core(target_idx, profile_idx, cell);
                let candidates = delete_sources(scorer, dp_matrix, target_idx, profile_idx, cell);

                trace.push(state, profile_idx, target_idx, 0.0);

                let local = state == State::DL;
                state = match first_match(&candidates, 0.0, value) {
                    Some(0) if local => State::ML,
                    Some(0) => State::MG,
                    Some(_) => state,
                    None => return Err(stuck(state, target_idx, profile_idx)),
                };
                profile_idx -= 1;
            }

            State::L | State::G => {
                trace.push(state, 0, 0, 0.0);
                state = State::B;
            }

            State::B => {
                trace.push(State::B, 0, 0, 0.0);
                let value = dp_matrix.get_special(target_idx, SpecialCell::B);
                state = match first_match(&begin_sources(scorer, dp_matrix, target_idx), 0.0, value)
                {
                    Some(0) => State::N,
                    Some(_) => State::J,
                    None => return Err(stuck(State::B, target_idx, profile_idx)),
                };
            }

            State::N => {
                if target_idx == 0 {
                    trace.push(State::N, 0, 0, 0.0);
                    trace.push(State::S, 0, 0, 0.0);
                    break;
                }
                trace.push(State::N, 0, target_idx, 0.0);
                target_idx -= 1;
            }

            State::S | State::T => return Err(stuck(state, target_idx, profile_idx)),
        }
    }

    trace.reverse();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::align::{viterbi, DpError, ViterbiScorer};
    use crate::alphabet::Alphabet;
    use crate::structs::{AlignmentMode, Hmm, Profile, Sequence};
    use assert2::check;

    #[test]
    fn test_first_match_prefers_earliest() {
        check!(first_match(&[1.0, 2.0, 2.0], 0.5, 2.5) == Some(1));
        check!(first_match(&[1.0, 2.0], 0.0, 3.0) == None);
        check!(first_match(&[IMPOSSIBLE, IMPOSSIBLE], 0.0, IMPOSSIBLE) == Some(0));
    }

    #[test]
    fn test_traceback_requires_viterbi_matrix() -> anyhow::Result<()> {
        let hmm = Hmm::random(4, Alphabet::Dna, 5);
        let profile = Profile::from_hmm(&hmm, AlignmentMode::Dual, 10)?;
        let target = Sequence::random(10, Alphabet::Dna, 6)?;

        let mut fwd = DpMatrix::default();
        crate::align::forward(&profile, &target, &mut fwd)?;

        let scorer = ViterbiScorer::new(&profile, &target);
        let mut trace = Trace::default();
        let result = traceback(&scorer, &fwd, &mut trace);
        check!(let Err(DpError::MatrixType(_)) = result);
        Ok(())
    }

    #[test]
    fn test_traceback_multiple_domains() -> anyhow::Result<()> {
        use crate::structs::hmm::constants::{
            HMM_MATCH_TO_DELETE, HMM_MATCH_TO_INSERT, HMM_MATCH_TO_MATCH,
        };

        // a strongly conserved ACGT model, hit twice with junk in between
        let mut hmm = Hmm::random(4, Alphabet::Dna, 17);
        for node_idx in 0..=4 {
            let transitions = &mut hmm.model.transition_probabilities[node_idx];
            let (to_match, to_delete) = if node_idx == 4 { (0.99, 0.0) } else { (0.98, 0.01) };
            transitions[HMM_MATCH_TO_MATCH] = to_match;
            transitions[HMM_MATCH_TO_INSERT] = 0.01;
            transitions[HMM_MATCH_TO_DELETE] = to_delete;
        }
        for node_idx in 1..=4 {
            let mut emissions = vec![0.01; 4];
            emissions[node_idx - 1] = 0.97;
            hmm.model.match_probabilities[node_idx] = emissions;
        }

        let profile = Profile::from_hmm(&hmm, AlignmentMode::Local, 16)?;
        let target = Sequence::from_utf8(b"ACGTTTTTTTTTACGT", Alphabet::Dna)?;

        let mut vit = DpMatrix::default();
        let mut trace = Trace::default();
        viterbi(&profile, &target, &mut vit, Some(&mut trace))?;

        check!(trace.domain_count() == 2);
        check!(trace.iter().any(|s| s.state == State::J));
        check!(trace.iter().filter(|s| s.emits()).count() == target.length);
        Ok(())
    }
}
