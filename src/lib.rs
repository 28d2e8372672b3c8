#![cfg_attr(docsrs, feature(doc_cfg))]
//! # mesh-bp
//!
//! mesh-bp stores composite scientific datasets (structured image grids,
//! polygonal point sets, unstructured meshes) as typed, dimensioned
//! variables in a self-describing, step-oriented container file, and reads
//! them back piece by piece across the ranks of a parallel job.
//!
//! ## Features
//! - Two-phase write protocol: declare a schema once, then stream one step
//!   per `open`/`close` bracket, with a running group-size budget
//! - Scheduled reads: array reads are queued and performed as one batch of
//!   merged file transfers
//! - A directory view over the flat variable namespace
//! - An object codec mapping datasets onto a fixed path scheme
//! - Piece/time-step coordination over pluggable communicators (serial,
//!   in-process threads, MPI)
//!
//! ## Usage
//! Add `mesh-bp` as a dependency in your `Cargo.toml` and enable features as needed:
//!
//! ```toml
//! [dependencies]
//! mesh-bp = "0.1"
//! # Optional features:
//! # features = ["mpi-support"]
//! ```
//!
//! ```no_run
//! use mesh_bp::prelude::*;
//!
//! # fn main() -> Result<(), ContainerError> {
//! let mut w = Writer::initialize(NoComm, WriterOptions::default())?;
//! w.define_scalar::<f64>("/TimeStamp")?;
//! w.define_array::<f32>("/grid/CellData/Pressure", &[Dim::from(100usize)], Transform::None)?;
//! w.open("out.bp", false)?;
//! w.write_scalar("/TimeStamp", 1.0f64)?;
//! w.write_array("/grid/CellData/Pressure", &[0.5f32; 100])?;
//! w.close()?;
//!
//! let mut r = Reader::initialize(NoComm, ReaderOptions::default())?;
//! r.open_file("out.bp")?;
//! let pressure = r.schedule_read_array::<f32>("/grid/CellData/Pressure", 0, None)?;
//! r.wait_for_reads()?;
//! assert_eq!(pressure.take().map(|v| v.len()), Some(100));
//! # Ok(())
//! # }
//! ```
//!
//! ## Logging
//! Diagnostics go through the `log` facade; install any logger to see them.

pub mod algs;
pub mod container;
pub mod container_error;
pub mod data;
pub mod io;

pub use container_error::ContainerError;

/// A convenient prelude to import the most-used traits & types:
pub mod prelude {
    pub use crate::algs::communicator::{Communicator, LocalComm, NoComm};
    #[cfg(feature = "mpi-support")]
    pub use crate::algs::communicator::MpiComm;
    pub use crate::algs::coordinator::{CoordinatorOptions, ParallelReader, ParallelWriter};
    pub use crate::algs::pieces::PieceAssignment;
    pub use crate::algs::timesteps::TimeStepCatalog;
    pub use crate::container::{
        ArrayHandle, ContainerType, Dim, DirTree, ReadMethod, Reader, ReaderOptions, StepStatus,
        Transform, TransportMethod, VarInfo, Writer, WriterOptions,
    };
    pub use crate::container_error::ContainerError;
    pub use crate::data::{
        ArrayValues, AttributeKind, CellArray, CellType, DataArray, DataObject, DataObjectType,
        DataSet, FieldData, ImageData, PolyData, UnstructuredGrid,
    };
    pub use crate::io::{read_as, read_object};
}
