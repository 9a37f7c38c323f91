use std::io::Write;

use crate::util::IMPOSSIBLE;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumCount, EnumIter, IntoEnumIterator};
use thiserror::Error;

/// The per-node cells of a row, in storage order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display, EnumIter, EnumCount)]
pub enum CoreCell {
    ML,
    MG,
    IL,
    IG,
    DL,
    DG,
}

/// The per-row flanking cells, in storage order.
///
/// JJ and CC are only used by decoding: they hold the probability that
/// J or C emitted residue i on a self-transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display, EnumIter, EnumCount)]
pub enum SpecialCell {
    E,
    N,
    J,
    B,
    L,
    G,
    C,
    JJ,
    CC,
}

/// Which algorithm filled a matrix.
#[derive(Default, Clone, Copy, Debug, PartialEq, Eq, Display, Serialize, Deserialize)]
pub enum MatrixType {
    #[default]
    Unset,
    Forward,
    Backward,
    Decoding,
    Alignment,
    Viterbi,
}

impl MatrixType {
    /// Decoding matrices hold probabilities; everything else holds log scores.
    pub fn is_probability(&self) -> bool {
        matches!(self, MatrixType::Decoding)
    }
}

#[derive(Error, Debug)]
#[error("failed to allocate a DP matrix of {cells} cells")]
pub struct MatrixAllocationError {
    cells: usize,
}

#[derive(Error, Debug)]
#[error("DP matrix was filled by {found}, expected {expected}")]
pub struct MatrixTypeError {
    pub expected: MatrixType,
    pub found: MatrixType,
}

#[derive(Error, Debug, PartialEq)]
pub enum MatrixComparisonError {
    #[error("matrix shapes differ: {0}x{1} vs {2}x{3}")]
    Shape(usize, usize, usize, usize),
    #[error("matrix types differ: {0} vs {1}")]
    Type(MatrixType, MatrixType),
    #[error("cell {cell} differs at row {row}, node {node}: {a} vs {b}")]
    Core {
        row: usize,
        node: usize,
        cell: CoreCell,
        a: f32,
        b: f32,
    },
    #[error("cell {cell} differs at row {row}: {a} vs {b}")]
    Special {
        row: usize,
        cell: SpecialCell,
        a: f32,
        b: f32,
    },
}

/// A dense DP matrix over target rows 0..=L and profile nodes 0..=M.
///
/// Every row holds (M + 1) groups of the 6 core cells followed by the 9 special cells.
/// The rows live in one arena that only ever grows.
#[derive(Default, Clone)]
pub struct DpMatrix {
    pub target_length: usize,
    pub profile_length: usize,
    pub matrix_type: MatrixType,
    data: Vec<f32>,
}

impl DpMatrix {
    pub const NUM_CORE_CELLS: usize = CoreCell::COUNT;
    pub const NUM_SPECIAL_CELLS: usize = SpecialCell::COUNT;

    #[inline(always)]
    fn row_width(profile_length: usize) -> usize {
        (profile_length + 1) * DpMatrix::NUM_CORE_CELLS + DpMatrix::NUM_SPECIAL_CELLS
    }

    #[inline(always)]
    fn core_idx(&self, target_idx: usize, profile_idx: usize, cell: CoreCell) -> usize {
        debug_assert!(target_idx <= self.target_length);
        debug_assert!(profile_idx <= self.profile_length);
        target_idx * DpMatrix::row_width(self.profile_length)
            + profile_idx * DpMatrix::NUM_CORE_CELLS
            + cell as usize
    }

    #[inline(always)]
    fn special_idx(&self, target_idx: usize, cell: SpecialCell) -> usize {
        debug_assert!(target_idx <= self.target_length);
        target_idx * DpMatrix::row_width(self.profile_length)
            + (self.profile_length + 1) * DpMatrix::NUM_CORE_CELLS
            + cell as usize
    }

    pub fn new(profile_length: usize, target_length: usize) -> Result<Self, MatrixAllocationError> {
        let mut matrix = DpMatrix::default();
        matrix.grow_to(profile_length, target_length)?;
        Ok(matrix)
    }

    /// Make room for an M x L problem, reallocating only if the arena is too small.
    pub fn grow_to(
        &mut self,
        profile_length: usize,
        target_length: usize,
    ) -> Result<(), MatrixAllocationError> {
        let needed = (target_length + 1) * DpMatrix::row_width(profile_length);

        if needed > self.data.len() {
            self.data
                .try_reserve_exact(needed - self.data.len())
                .map_err(|_| MatrixAllocationError { cells: needed })?;
            self.data.resize(needed, IMPOSSIBLE);

            log::debug!(
                "grew DP matrix to {} cells for M={} L={}",
                needed,
                profile_length,
                target_length
            );
        }

        self.profile_length = profile_length;
        self.target_length = target_length;
        Ok(())
    }

    /// Forget the current problem while keeping the allocation.
    pub fn reuse(&mut self) {
        self.profile_length = 0;
        self.target_length = 0;
        self.matrix_type = MatrixType::Unset;
    }

    /// Grow to fit an M x L problem, tag the matrix, and fill every cell in use.
    pub fn prepare(
        &mut self,
        profile_length: usize,
        target_length: usize,
        matrix_type: MatrixType,
        fill: f32,
    ) -> Result<(), MatrixAllocationError> {
        self.grow_to(profile_length, target_length)?;
        self.matrix_type = matrix_type;
        let used = self.used_cells();
        self.data[..used].fill(fill);
        Ok(())
    }

    /// The number of cells the current problem occupies.
    pub fn used_cells(&self) -> usize {
        (self.target_length + 1) * DpMatrix::row_width(self.profile_length)
    }

    /// The number of cells in the arena.
    pub fn allocated_cells(&self) -> usize {
        self.data.len()
    }

    /// The memory held by the matrix, in bytes.
    pub fn sizeof(&self) -> usize {
        std::mem::size_of::<Self>() + self.data.capacity() * std::mem::size_of::<f32>()
    }

    pub fn check_type(&self, expected: MatrixType) -> Result<(), MatrixTypeError> {
        if self.matrix_type == expected {
            Ok(())
        } else {
            Err(MatrixTypeError {
                expected,
                found: self.matrix_type,
            })
        }
    }

    #[inline(always)]
    pub fn get_core(&self, target_idx: usize, profile_idx: usize, cell: CoreCell) -> f32 {
        self.data[self.core_idx(target_idx, profile_idx, cell)]
    }

    #[inline(always)]
    pub fn set_core(&mut self, target_idx: usize, profile_idx: usize, cell: CoreCell, value: f32) {
        let idx = self.core_idx(target_idx, profile_idx, cell);
        self.data[idx] = value;
    }

    #[inline(always)]
    pub fn get_special(&self, target_idx: usize, cell: SpecialCell) -> f32 {
        self.data[self.special_idx(target_idx, cell)]
    }

    #[inline(always)]
    pub fn set_special(&mut self, target_idx: usize, cell: SpecialCell, value: f32) {
        let idx = self.special_idx(target_idx, cell);
        self.data[idx] = value;
    }

    fn values_match(a: f32, b: f32, tolerance: f32) -> bool {
        // this also covers -inf == -inf
        a == b || (a - b).abs() <= tolerance * a.abs().max(b.abs()).max(1.0)
    }

    fn compare_cells(
        &self,
        other: &DpMatrix,
        tolerance: f32,
        core_cells: &[CoreCell],
        special_cells: &[SpecialCell],
    ) -> Result<(), MatrixComparisonError> {
        if self.profile_length != other.profile_length || self.target_length != other.target_length
        {
            return Err(MatrixComparisonError::Shape(
                self.profile_length,
                self.target_length,
                other.profile_length,
                other.target_length,
            ));
        }
        if self.matrix_type != other.matrix_type {
            return Err(MatrixComparisonError::Type(
                self.matrix_type,
                other.matrix_type,
            ));
        }

        for row in 0..=self.target_length {
            for node in 0..=self.profile_length {
                for &cell in core_cells {
                    let (a, b) = (self.get_core(row, node, cell), other.get_core(row, node, cell));
                    if !DpMatrix::values_match(a, b, tolerance) {
                        return Err(MatrixComparisonError::Core {
                            row,
                            node,
                            cell,
                            a,
                            b,
                        });
                    }
                }
            }

            for &cell in special_cells {
                let (a, b) = (self.get_special(row, cell), other.get_special(row, cell));
                if !DpMatrix::values_match(a, b, tolerance) {
                    return Err(MatrixComparisonError::Special { row, cell, a, b });
                }
            }
        }

        Ok(())
    }

    /// Compare every cell of two matrices of the same shape and type.
    pub fn compare(&self, other: &DpMatrix, tolerance: f32) -> Result<(), MatrixComparisonError> {
        let core: Vec<CoreCell> = CoreCell::iter().collect();
        let special: Vec<SpecialCell> = SpecialCell::iter().collect();
        self.compare_cells(other, tolerance, &core, &special)
    }

    /// Compare only the cells that local paths use.
    pub fn compare_local(
        &self,
        other: &DpMatrix,
        tolerance: f32,
    ) -> Result<(), MatrixComparisonError> {
        use SpecialCell::*;
        self.compare_cells(
            other,
            tolerance,
            &[CoreCell::ML, CoreCell::IL, CoreCell::DL],
            &[E, N, J, B, L, C, JJ, CC],
        )
    }

    /// Write the whole matrix.
    pub fn dump(&self, out: &mut impl Write) -> Result<()> {
        self.dump_window(out, 0, self.target_length, 0, self.profile_length)
    }

    /// Write rows `target_start..=target_end` and nodes `profile_start..=profile_end`.
    ///
    /// The special cells of each row are written on its ML line.
    pub fn dump_window(
        &self,
        out: &mut impl Write,
        target_start: usize,
        target_end: usize,
        profile_start: usize,
        profile_end: usize,
    ) -> Result<()> {
        let target_end = target_end.min(self.target_length);
        let profile_end = profile_end.min(self.profile_length);

        let target_idx_width = target_end.to_string().len();
        let first_column_width = target_idx_width + 4;
        let column_width = 10;
        let precision = if self.matrix_type.is_probability() {
            4
        } else {
            3
        };

        writeln!(out, "{} matrix", self.matrix_type)?;

        // write the profile indices
        write!(out, "{}", " ".repeat(first_column_width))?;
        for profile_idx in profile_start..=profile_end {
            write!(out, "{:>w$} ", profile_idx, w = column_width)?;
        }
        for cell in SpecialCell::iter() {
            write!(out, "{:>w$} ", cell.to_string(), w = column_width)?;
        }
        writeln!(out)?;

        write!(out, "{}", " ".repeat(first_column_width))?;
        for _ in profile_start..=profile_end + DpMatrix::NUM_SPECIAL_CELLS {
            write!(out, "{:>w$} ", "-".repeat(column_width - 2), w = column_width)?;
        }
        writeln!(out)?;

        for target_idx in target_start..=target_end {
            for cell in CoreCell::iter() {
                write!(
                    out,
                    "{:w$} {:2} ",
                    target_idx,
                    cell.to_string(),
                    w = target_idx_width
                )?;
                for profile_idx in profile_start..=profile_end {
                    write!(
                        out,
                        "{:w$.p$} ",
                        self.get_core(target_idx, profile_idx, cell),
                        w = column_width,
                        p = precision
                    )?;
                }

                if cell == CoreCell::ML {
                    for special in SpecialCell::iter() {
                        write!(
                            out,
                            "{:w$.p$} ",
                            self.get_special(target_idx, special),
                            w = column_width,
                            p = precision
                        )?;
                    }
                }
                writeln!(out)?;
            }
            writeln!(out)?;
        }

        Ok(())
    }

    /// Write the matrix as `row,node,cell,value` records; special cells have no node.
    pub fn dump_csv(&self, out: &mut impl Write) -> Result<()> {
        writeln!(out, "row,node,cell,value")?;
        for target_idx in 0..=self.target_length {
            for profile_idx in 0..=self.profile_length {
                for cell in CoreCell::iter() {
                    writeln!(
                        out,
                        "{},{},{},{}",
                        target_idx,
                        profile_idx,
                        cell,
                        self.get_core(target_idx, profile_idx, cell)
                    )?;
                }
            }
            for cell in SpecialCell::iter() {
                writeln!(
                    out,
                    "{},,{},{}",
                    target_idx,
                    cell,
                    self.get_special(target_idx, cell)
                )?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert2::check;

    #[test]
    fn test_layout() -> anyhow::Result<()> {
        let mut matrix = DpMatrix::new(3, 2)?;
        check!(matrix.allocated_cells() == 3 * (4 * 6 + 9));
        check!(matrix.get_core(2, 3, CoreCell::DG) == IMPOSSIBLE);

        matrix.set_core(1, 2, CoreCell::IG, 1.5);
        matrix.set_special(1, SpecialCell::CC, 2.5);
        matrix.set_special(2, SpecialCell::E, 3.5);

        check!(matrix.get_core(1, 2, CoreCell::IG) == 1.5);
        check!(matrix.get_special(1, SpecialCell::CC) == 2.5);
        // the last special of a row sits right before the next row's first core cell
        check!(matrix.get_special(2, SpecialCell::E) == 3.5);
        check!(matrix.get_core(2, 0, CoreCell::ML) == IMPOSSIBLE);
        Ok(())
    }

    #[test]
    fn test_grow_never_shrinks() -> anyhow::Result<()> {
        let mut matrix = DpMatrix::new(5, 5)?;
        let small = matrix.allocated_cells();

        matrix.grow_to(50, 50)?;
        let large = matrix.allocated_cells();
        check!(large > small);
        check!(matrix.sizeof() >= large * 4);

        matrix.reuse();
        check!(matrix.matrix_type == MatrixType::Unset);
        check!(matrix.profile_length == 0);

        matrix.grow_to(5, 5)?;
        check!(matrix.allocated_cells() == large);
        check!(matrix.used_cells() == small);
        Ok(())
    }

    #[test]
    fn test_prepare_fills_used_cells() -> anyhow::Result<()> {
        let mut matrix = DpMatrix::new(4, 4)?;
        matrix.prepare(4, 4, MatrixType::Decoding, 0.0)?;
        check!(matrix.matrix_type == MatrixType::Decoding);
        check!(matrix.get_core(4, 4, CoreCell::DG) == 0.0);
        check!(matrix.get_special(0, SpecialCell::E) == 0.0);
        check!(matrix.check_type(MatrixType::Decoding).is_ok());
        check!(matrix.check_type(MatrixType::Forward).is_err());
        Ok(())
    }

    #[test]
    fn test_compare() -> anyhow::Result<()> {
        let mut a = DpMatrix::new(3, 3)?;
        a.prepare(3, 3, MatrixType::Forward, IMPOSSIBLE)?;
        let mut b = a.clone();

        check!(a.compare(&b, 1e-5).is_ok());

        b.set_core(2, 2, CoreCell::MG, -1.0);
        check!(a.compare(&b, 1e-5).is_err());
        // glocal cells don't matter to a local comparison
        check!(a.compare_local(&b, 1e-5).is_ok());

        b.set_core(2, 2, CoreCell::ML, -1.0);
        check!(
            a.compare_local(&b, 1e-5)
                == Err(MatrixComparisonError::Core {
                    row: 2,
                    node: 2,
                    cell: CoreCell::ML,
                    a: IMPOSSIBLE,
                    b: -1.0
                })
        );

        let c = DpMatrix::new(3, 4)?;
        check!(a.compare(&c, 1e-5).is_err());
        Ok(())
    }

    #[test]
    fn test_dumps() -> anyhow::Result<()> {
        let mut matrix = DpMatrix::new(2, 2)?;
        matrix.prepare(2, 2, MatrixType::Forward, 0.0)?;

        let mut out: Vec<u8> = vec![];
        matrix.dump(&mut out)?;
        let text = String::from_utf8(out)?;
        check!(text.starts_with("Forward matrix"));
        check!(text.contains(" ML "));
        check!(text.contains("CC"));

        let mut out: Vec<u8> = vec![];
        matrix.dump_window(&mut out, 1, 1, 1, 2)?;
        let text = String::from_utf8(out)?;
        check!(text.lines().filter(|l| l.starts_with("1 ")).count() == 6);

        let mut out: Vec<u8> = vec![];
        matrix.dump_csv(&mut out)?;
        let text = String::from_utf8(out)?;
        // header + 3 rows of (3 nodes x 6 cells + 9 specials)
        check!(text.lines().count() == 1 + 3 * (3 * 6 + 9));
        check!(text.contains("0,,JJ,0"));
        Ok(())
    }
}
