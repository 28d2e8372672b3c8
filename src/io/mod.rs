//! Object codec: datasets <-> container variables.
//!
//! A dataset rooted at `root` occupies this subtree:
//!
//! ```text
//! root/ObjectType                       u8 kind tag
//! root/{FieldData,CellData,PointData}/<array>/
//!     NumberOfComponents                i32
//!     NumberOfTuples                    i32
//!     Values                            T[NumberOfTuples, NumberOfComponents]
//! root/Origin{X,Y,Z} Spacing{X,Y,Z}     f64      (image grids)
//! root/Extent{X,Y,Z}{Min,Max}           i32      (image grids)
//! root/Points/...                       array record
//! root/{Vertices,Lines,Polygons,Strips,Cells}/
//!     NumberOfCells IaSize              i64
//!     Ia                                i64[IaSize]
//! root/CellTypes                        u8[Cells/NumberOfCells]
//! ```
//!
//! [`define`] and [`write`] run the same traversal over an [`ObjectSink`],
//! so both visit variables in the same order. [`read`] walks the
//! [`DirTree`](crate::container::DirTree) in that order, schedules array
//! reads and returns a [`PendingDataSet`] to finish after the reader has
//! performed them.

mod read;
mod visit;

pub use read::{DataObjectKind, PendingArray, PendingDataSet, read, read_as, read_object};
pub use visit::{DefineSink, WriteSink, define, write};

use crate::container::types::Element;
use crate::container::writer::Dim;
use crate::container_error::ContainerError;

/// Receiver of the variables a dataset traversal produces.
pub trait ObjectSink {
    fn scalar<T: Element>(&mut self, path: &str, value: T) -> Result<(), ContainerError>;
    fn array<T: Element>(&mut self, path: &str, dims: &[Dim], values: &[T]) -> Result<(), ContainerError>;
}

/// Child path under `parent`; the root may be given as `""` or `"/"`.
pub fn join(parent: &str, name: &str) -> String {
    if parent.ends_with('/') {
        format!("{parent}{name}")
    } else {
        format!("{parent}/{name}")
    }
}

pub(crate) const OBJECT_TYPE: &str = "ObjectType";
pub(crate) const COLLECTIONS: [&str; 3] = ["FieldData", "CellData", "PointData"];
pub(crate) const NUM_COMPONENTS: &str = "NumberOfComponents";
pub(crate) const NUM_TUPLES: &str = "NumberOfTuples";
pub(crate) const VALUES: &str = "Values";
pub(crate) const POINTS: &str = "Points";
pub(crate) const NUM_CELLS: &str = "NumberOfCells";
pub(crate) const IA_SIZE: &str = "IaSize";
pub(crate) const IA: &str = "Ia";
pub(crate) const CELLS: &str = "Cells";
pub(crate) const CELL_TYPES: &str = "CellTypes";
pub(crate) const POLY_TOPOLOGY: [&str; 4] = ["Vertices", "Lines", "Polygons", "Strips"];
pub(crate) const ORIGIN: [&str; 3] = ["OriginX", "OriginY", "OriginZ"];
pub(crate) const SPACING: [&str; 3] = ["SpacingX", "SpacingY", "SpacingZ"];
pub(crate) const EXTENT: [&str; 6] = [
    "ExtentXMin",
    "ExtentXMax",
    "ExtentYMin",
    "ExtentYMax",
    "ExtentZMin",
    "ExtentZMax",
];
