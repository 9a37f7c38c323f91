pub mod hmm;
pub use hmm::Hmm;

pub mod profile;
pub use profile::{AlignmentMode, Profile};

pub mod sequence;
pub use sequence::Sequence;

pub mod transport;
pub use transport::{ProfileCodec, ProfileDecodeError, ProfileMessage};
