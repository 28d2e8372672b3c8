//! The container engine: type registry, on-disk format, writer, reader and
//! the directory view built over a reader's catalog.

pub mod dir_tree;
pub mod format;
pub mod methods;
pub mod reader;
pub mod types;
pub mod var_info;
pub mod writer;

pub use dir_tree::{Dir, DirTree, tokenize};
pub use methods::{ReadMethod, Transform, TransportMethod};
pub use reader::{ArrayHandle, ReadSummary, Reader, ReaderOptions, StepStatus};
pub use types::{ContainerType, Element, ElementType, NativeType, native_to_container_type, type_size};
pub use var_info::{Attribute, VarInfo};
pub use writer::{Dim, Writer, WriterOptions};
