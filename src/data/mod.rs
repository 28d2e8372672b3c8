//! Data module: in-memory datasets stored and restored by the codec.

pub mod array;
pub mod dataset;
pub mod field;

pub use array::{ArrayElement, ArrayValues, DataArray};
pub use dataset::{
    CellArray, CellType, DataObject, DataObjectType, DataSet, ImageData, PolyData,
    UnstructuredGrid,
};
pub use field::{AttributeKind, FieldData};
