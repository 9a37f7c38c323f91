use crate::align::structs::{CoreCell, DpMatrix, MatrixType, SpecialCell};
use crate::util::IMPOSSIBLE;

use strum::{Display, IntoEnumIterator};
use thiserror::Error;

/// What a cell is allowed to hold after a matrix has been filled.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
pub enum CellClass {
    /// Exactly -inf
    Impossible,
    /// Exactly 0.0
    Zero,
    /// Anything but NaN
    Free,
}

impl CellClass {
    fn admits(&self, value: f32) -> bool {
        match self {
            CellClass::Impossible => value == IMPOSSIBLE,
            CellClass::Zero => value == 0.0,
            CellClass::Free => !value.is_nan(),
        }
    }
}

#[derive(Error, Debug, PartialEq)]
pub enum MatrixValidationError {
    #[error("can't validate a matrix that no algorithm has filled")]
    Unset,
    #[error("{matrix_type} cell {cell} at row {row}, node {node:?} is {value}, expected {expected}")]
    Cell {
        matrix_type: MatrixType,
        row: usize,
        node: Option<usize>,
        cell: String,
        value: f32,
        expected: CellClass,
    },
}

/// The class of every cell that a matrix of this type fixes regardless of the inputs.
fn fixed_class(matrix_type: MatrixType) -> CellClass {
    if matrix_type.is_probability() {
        CellClass::Zero
    } else {
        CellClass::Impossible
    }
}

fn core_class(
    matrix_type: MatrixType,
    target_idx: usize,
    profile_idx: usize,
    cell: CoreCell,
    profile_length: usize,
    target_length: usize,
) -> CellClass {
    let fixed = fixed_class(matrix_type);
    if target_idx == 0 || profile_idx == 0 {
        return fixed;
    }

    let is_insert = matches!(cell, CoreCell::IL | CoreCell::IG);
    let is_delete = matches!(cell, CoreCell::DL | CoreCell::DG);
    let last_node = profile_idx == profile_length;

    let is_fixed = match matrix_type {
        MatrixType::Forward | MatrixType::Viterbi => {
            (is_insert && (target_idx == 1 || last_node)) || (is_delete && profile_idx == 1)
        }
        // node 1 deletes are reachable from E in a backward matrix
        MatrixType::Backward => is_insert && (target_idx == target_length || last_node),
        MatrixType::Decoding | MatrixType::Alignment => {
            (is_insert && (target_idx == 1 || target_idx == target_length || last_node))
                || (is_delete && profile_idx == 1)
        }
        MatrixType::Unset => false,
    };

    if is_fixed {
        fixed
    } else {
        CellClass::Free
    }
}

/// The last row of a backward or alignment matrix: only E and C can finish a path.
fn last_row_class(cell: SpecialCell) -> CellClass {
    match cell {
        SpecialCell::E | SpecialCell::C => CellClass::Free,
        _ => CellClass::Impossible,
    }
}

/// Row 0 of a backward or alignment matrix: nothing has ended yet.
fn first_row_class(cell: SpecialCell) -> CellClass {
    match cell {
        SpecialCell::E | SpecialCell::J | SpecialCell::C | SpecialCell::JJ | SpecialCell::CC => {
            CellClass::Impossible
        }
        _ => CellClass::Free,
    }
}

fn special_class(
    matrix_type: MatrixType,
    target_idx: usize,
    cell: SpecialCell,
    target_length: usize,
) -> CellClass {
    use SpecialCell::*;

    let is_loop_cell = matches!(cell, JJ | CC);

    match matrix_type {
        MatrixType::Forward | MatrixType::Viterbi => match (target_idx, cell) {
            (0, N) => CellClass::Zero,
            (0, B | L | G) => CellClass::Free,
            (0, _) => CellClass::Impossible,
            _ if is_loop_cell => CellClass::Impossible,
            _ => CellClass::Free,
        },
        MatrixType::Backward | MatrixType::Alignment => {
            if target_idx == target_length {
                last_row_class(cell)
            } else if target_idx == 0 {
                first_row_class(cell)
            } else if is_loop_cell {
                CellClass::Impossible
            } else {
                CellClass::Free
            }
        }
        MatrixType::Decoding => {
            if target_idx == 0 {
                return match cell {
                    E | J | C | JJ | CC => CellClass::Zero,
                    _ => CellClass::Free,
                };
            }
            let last_row_zero = target_idx == target_length && matches!(cell, N | J | B | L | G | JJ);
            let first_row_zero = target_idx == 1 && is_loop_cell;
            if last_row_zero || first_row_zero {
                CellClass::Zero
            } else {
                CellClass::Free
            }
        }
        MatrixType::Unset => CellClass::Free,
    }
}

impl DpMatrix {
    /// Check that every cell holds what the algorithm that filled the matrix
    /// must have put there: fixed cells are exactly -inf (or exactly 0 in a
    /// decoding matrix), and no cell is NaN.
    pub fn validate(&self) -> Result<(), MatrixValidationError> {
        let result = self.check_cells();
        if let Err(err) = &result {
            log::warn!("DP matrix failed validation: {err}");
        }
        result
    }

    fn check_cells(&self) -> Result<(), MatrixValidationError> {
        let matrix_type = self.matrix_type;
        if matrix_type == MatrixType::Unset {
            return Err(MatrixValidationError::Unset);
        }

        let profile_length = self.profile_length;
        let target_length = self.target_length;

        for row in 0..=target_length {
            for node in 0..=profile_length {
                for cell in CoreCell::iter() {
                    let expected =
                        core_class(matrix_type, row, node, cell, profile_length, target_length);
                    let value = self.get_core(row, node, cell);
                    if !expected.admits(value) {
                        return Err(MatrixValidationError::Cell {
                            matrix_type,
                            row,
                            node: Some(node),
                            cell: cell.to_string(),
                            value,
                            expected,
                        });
                    }
                }
            }

            for cell in SpecialCell::iter() {
                let expected = special_class(matrix_type, row, cell, target_length);
                let value = self.get_special(row, cell);
                if !expected.admits(value) {
                    return Err(MatrixValidationError::Cell {
                        matrix_type,
                        row,
                        node: None,
                        cell: cell.to_string(),
                        value,
                        expected,
                    });
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::align::structs::Trace;
    use crate::align::{backward, forward, optimal_accuracy, posterior, viterbi};
    use crate::alphabet::Alphabet;
    use crate::structs::{AlignmentMode, Hmm, Profile, Sequence};
    use assert2::check;

    struct Matrices {
        forward: DpMatrix,
        backward: DpMatrix,
        decoding: DpMatrix,
        alignment: DpMatrix,
        viterbi: DpMatrix,
    }

    fn run_all(
        mode: AlignmentMode,
        profile_length: usize,
        target_length: usize,
        seed: u64,
    ) -> anyhow::Result<Matrices> {
        let hmm = Hmm::random(profile_length, Alphabet::Amino, seed);
        let profile = Profile::from_hmm(&hmm, mode, target_length)?;
        let target = Sequence::random(target_length, Alphabet::Amino, seed + 1)?;

        let mut matrices = Matrices {
            forward: DpMatrix::default(),
            backward: DpMatrix::default(),
            decoding: DpMatrix::default(),
            alignment: DpMatrix::default(),
            viterbi: DpMatrix::default(),
        };
        let mut trace = Trace::default();

        forward(&profile, &target, &mut matrices.forward)?;
        backward(&profile, &target, &mut matrices.backward)?;
        posterior(
            &profile,
            &matrices.forward,
            &matrices.backward,
            &mut matrices.decoding,
        )?;
        optimal_accuracy(
            &profile,
            &matrices.decoding,
            1.0,
            &mut matrices.alignment,
            &mut trace,
        )?;
        viterbi(&profile, &target, &mut matrices.viterbi, None)?;

        Ok(matrices)
    }

    #[test]
    fn test_validate_accepts_fresh_matrices() -> anyhow::Result<()> {
        for (mode, profile_length, target_length, seed) in [
            (AlignmentMode::Dual, 10, 20, 1),
            (AlignmentMode::Local, 7, 3, 2),
            (AlignmentMode::UniGlocal, 5, 12, 3),
            (AlignmentMode::UniDual, 1, 1, 4),
            (AlignmentMode::Glocal, 3, 1, 5),
        ] {
            let matrices = run_all(mode, profile_length, target_length, seed)?;
            check!(matrices.forward.validate() == Ok(()));
            check!(matrices.backward.validate() == Ok(()));
            check!(matrices.decoding.validate() == Ok(()));
            check!(matrices.alignment.validate() == Ok(()));
            check!(matrices.viterbi.validate() == Ok(()));
        }
        Ok(())
    }

    #[test]
    fn test_validate_rejects_bad_cells() -> anyhow::Result<()> {
        let mut matrices = run_all(AlignmentMode::Dual, 6, 9, 12)?;

        matrices.forward.set_core(1, 3, CoreCell::IL, -2.0);
        check!(let Err(MatrixValidationError::Cell { row: 1, node: Some(3), .. }) = matrices.forward.validate());

        matrices.backward.set_special(4, SpecialCell::B, f32::NAN);
        check!(let Err(MatrixValidationError::Cell { row: 4, node: None, expected: CellClass::Free, .. }) = matrices.backward.validate());

        matrices.decoding.set_special(0, SpecialCell::C, 0.5);
        check!(let Err(MatrixValidationError::Cell { expected: CellClass::Zero, .. }) = matrices.decoding.validate());

        matrices.viterbi.set_special(0, SpecialCell::N, -1.0);
        check!(matrices.viterbi.validate().is_err());

        check!(DpMatrix::default().validate() == Err(MatrixValidationError::Unset));
        Ok(())
    }
}
