//! Re-export collective communication and parallel coordination.

pub mod communicator;
pub mod coordinator;
pub mod pieces;
pub mod timesteps;
pub mod wire;

pub use communicator::{Communicator, LocalComm, NoComm, Wait};
pub use coordinator::{CoordinatorOptions, ParallelReader, ParallelWriter};
pub use pieces::{PieceAssignment, piece_range};
pub use timesteps::TimeStepCatalog;
