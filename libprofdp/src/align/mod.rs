use thiserror::Error;

use self::structs::{MatrixAllocationError, MatrixTypeError, State};

pub mod structs;

mod forward;
pub use forward::forward;

mod backward;
pub use backward::backward;

mod posterior;
pub use posterior::posterior;

mod max_path;
pub use max_path::PathScorer;

mod viterbi;
pub use viterbi::{viterbi, ViterbiScorer};

mod optimal_accuracy;
pub use optimal_accuracy::{optimal_accuracy, OptimalAccuracyScorer};

mod traceback;
pub use traceback::traceback;

mod scoring;
pub use scoring::{bit_score, null_one_score, Bits, Nats};

pub mod validate;
pub use validate::{CellClass, MatrixValidationError};

#[derive(Error, Debug)]
pub enum DpError {
    #[error(transparent)]
    Allocation(#[from] MatrixAllocationError),
    #[error(transparent)]
    MatrixType(#[from] MatrixTypeError),
    #[error("forward matrix is {0}x{1}, but backward matrix is {2}x{3}")]
    Shape(usize, usize, usize, usize),
    #[error("no path through the profile has a finite score")]
    NoPath,
    #[error("traceback found no predecessor for {state} at row {target_idx}, node {profile_idx}")]
    Traceback {
        state: State,
        target_idx: usize,
        profile_idx: usize,
    },
}
