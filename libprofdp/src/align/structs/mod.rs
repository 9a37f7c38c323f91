mod dp_matrix;
pub use dp_matrix::{
    CoreCell, DpMatrix, MatrixAllocationError, MatrixComparisonError, MatrixType,
    MatrixTypeError, SpecialCell,
};

mod trace;
pub use trace::{State, Trace, TraceStep};
