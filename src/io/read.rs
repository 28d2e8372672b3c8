//! Read traversal: schedule, then finish once the reader has performed the
//! queued transfers.

use super::*;
use crate::algs::communicator::Communicator;
use crate::container::dir_tree::{Dir, DirTree};
use crate::container::reader::{ArrayHandle, Reader};
use crate::container::types::ContainerType;
use crate::container::var_info::VarInfo;
use crate::data::array::{ArrayValues, DataArray};
use crate::data::dataset::{
    CellArray, DataObject, DataObjectType, DataSet, ImageData, PolyData, UnstructuredGrid,
};
use crate::data::field::{AttributeKind, FieldData};
use num_traits::NumCast;

enum PendingValues {
    I8(ArrayHandle<i8>),
    U8(ArrayHandle<u8>),
    I16(ArrayHandle<i16>),
    U16(ArrayHandle<u16>),
    I32(ArrayHandle<i32>),
    U32(ArrayHandle<u32>),
    I64(ArrayHandle<i64>),
    U64(ArrayHandle<u64>),
    F32(ArrayHandle<f32>),
    F64(ArrayHandle<f64>),
}

impl PendingValues {
    fn schedule<C: Communicator>(
        reader: &mut Reader<C>,
        var: &VarInfo,
        step: usize,
        block: usize,
    ) -> Result<Option<Self>, ContainerError> {
        let id = var.id();
        let block = Some(block);
        Ok(Some(match var.ctype() {
            ContainerType::Byte => Self::I8(reader.schedule_read_array_by_id(id, step, block)?),
            ContainerType::UnsignedByte => Self::U8(reader.schedule_read_array_by_id(id, step, block)?),
            ContainerType::Short => Self::I16(reader.schedule_read_array_by_id(id, step, block)?),
            ContainerType::UnsignedShort => Self::U16(reader.schedule_read_array_by_id(id, step, block)?),
            ContainerType::Integer => Self::I32(reader.schedule_read_array_by_id(id, step, block)?),
            ContainerType::UnsignedInteger => Self::U32(reader.schedule_read_array_by_id(id, step, block)?),
            ContainerType::Long => Self::I64(reader.schedule_read_array_by_id(id, step, block)?),
            ContainerType::UnsignedLong => Self::U64(reader.schedule_read_array_by_id(id, step, block)?),
            ContainerType::Real => Self::F32(reader.schedule_read_array_by_id(id, step, block)?),
            ContainerType::Double => Self::F64(reader.schedule_read_array_by_id(id, step, block)?),
            other => {
                log::warn!("skipping `{}`: no array representation for {other:?}", var.name());
                return Ok(None);
            }
        }))
    }

    fn take(self) -> Option<ArrayValues> {
        Some(match self {
            Self::I8(h) => ArrayValues::I8(h.take()?),
            Self::U8(h) => ArrayValues::U8(h.take()?),
            Self::I16(h) => ArrayValues::I16(h.take()?),
            Self::U16(h) => ArrayValues::U16(h.take()?),
            Self::I32(h) => ArrayValues::I32(h.take()?),
            Self::U32(h) => ArrayValues::U32(h.take()?),
            Self::I64(h) => ArrayValues::I64(h.take()?),
            Self::U64(h) => ArrayValues::U64(h.take()?),
            Self::F32(h) => ArrayValues::F32(h.take()?),
            Self::F64(h) => ArrayValues::F64(h.take()?),
        })
    }
}

/// An array whose values are still in flight.
pub struct PendingArray {
    path: String,
    name: String,
    kind: Option<AttributeKind>,
    components: usize,
    tuples: usize,
    values: PendingValues,
}

impl PendingArray {
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn finish(self) -> Result<DataArray, ContainerError> {
        let values = self
            .values
            .take()
            .ok_or_else(|| ContainerError::ReadsPending(self.path.clone()))?;
        let expected = self.components * self.tuples;
        if values.len() != expected {
            return Err(ContainerError::ShapeMismatch {
                path: self.path,
                expected,
                actual: values.len(),
            });
        }
        Ok(DataArray::new(self.name, self.components, values))
    }
}

struct PendingCells {
    path: String,
    num_cells: usize,
    ia: ArrayHandle<i64>,
}

impl PendingCells {
    fn finish(self) -> Result<CellArray, ContainerError> {
        let ia = self.ia.take().ok_or(ContainerError::ReadsPending(self.path))?;
        Ok(CellArray::from_legacy(self.num_cells, ia))
    }
}

enum PendingGeometry {
    Image {
        origin: [f64; 3],
        spacing: [f64; 3],
        extent: [i32; 6],
    },
    Poly {
        points: Option<PendingArray>,
        topology: [Option<PendingCells>; 4],
    },
    Unstructured {
        points: Option<PendingArray>,
        cells: Option<(PendingCells, String, ArrayHandle<u8>)>,
    },
}

/// A dataset whose array reads are scheduled but not yet performed.
pub struct PendingDataSet {
    collections: [Vec<PendingArray>; 3],
    geometry: PendingGeometry,
}

impl PendingDataSet {
    pub fn object_type(&self) -> DataObjectType {
        match self.geometry {
            PendingGeometry::Image { .. } => DataObjectType::ImageData,
            PendingGeometry::Poly { .. } => DataObjectType::PolyData,
            PendingGeometry::Unstructured { .. } => DataObjectType::UnstructuredGrid,
        }
    }

    /// Assemble the dataset. The owning reader must have performed its
    /// scheduled reads.
    pub fn finish(self) -> Result<DataSet, ContainerError> {
        let mut dataset = match self.geometry {
            PendingGeometry::Image {
                origin,
                spacing,
                extent,
            } => DataSet::Image(ImageData::new(origin, spacing, extent)),
            PendingGeometry::Poly { points, topology } => {
                let [verts, lines, polys, strips] = topology.map(|c| c.map(PendingCells::finish));
                DataSet::Poly(PolyData {
                    points: points.map(PendingArray::finish).transpose()?,
                    verts: verts.transpose()?.unwrap_or_default(),
                    lines: lines.transpose()?.unwrap_or_default(),
                    polys: polys.transpose()?.unwrap_or_default(),
                    strips: strips.transpose()?.unwrap_or_default(),
                    ..Default::default()
                })
            }
            PendingGeometry::Unstructured { points, cells } => {
                let mut ug = UnstructuredGrid {
                    points: points.map(PendingArray::finish).transpose()?,
                    ..Default::default()
                };
                if let Some((cells, types_path, types)) = cells {
                    ug.cells = cells.finish()?;
                    ug.cell_types = types.take().ok_or(ContainerError::ReadsPending(types_path))?;
                }
                DataSet::Unstructured(ug)
            }
        };
        let [field, cell, point] = self.collections;
        fill(dataset.as_object_mut().field_data_mut(), field)?;
        fill(dataset.as_object_mut().cell_data_mut(), cell)?;
        fill(dataset.as_object_mut().point_data_mut(), point)?;
        Ok(dataset)
    }
}

fn fill(fd: &mut FieldData, arrays: Vec<PendingArray>) -> Result<(), ContainerError> {
    for pending in arrays {
        let kind = pending.kind;
        let array = pending.finish()?;
        match kind {
            Some(kind) => {
                fd.set_attribute(array, kind);
            }
            None => {
                fd.add_array(array);
            }
        }
    }
    Ok(())
}

/// Dataset kinds that can be requested by type.
pub trait DataObjectKind: DataObject + Sized {
    const OBJECT_TYPE: DataObjectType;
    fn from_dataset(dataset: DataSet) -> Option<Self>;
}

impl DataObjectKind for ImageData {
    const OBJECT_TYPE: DataObjectType = DataObjectType::ImageData;
    fn from_dataset(dataset: DataSet) -> Option<Self> {
        match dataset {
            DataSet::Image(d) => Some(d),
            _ => None,
        }
    }
}

impl DataObjectKind for PolyData {
    const OBJECT_TYPE: DataObjectType = DataObjectType::PolyData;
    fn from_dataset(dataset: DataSet) -> Option<Self> {
        match dataset {
            DataSet::Poly(d) => Some(d),
            _ => None,
        }
    }
}

impl DataObjectKind for UnstructuredGrid {
    const OBJECT_TYPE: DataObjectType = DataObjectType::UnstructuredGrid;
    fn from_dataset(dataset: DataSet) -> Option<Self> {
        match dataset {
            DataSet::Unstructured(d) => Some(d),
            _ => None,
        }
    }
}

// Absent or unreadable scalars read as `None`; optional subtrees stay
// optional.
fn scalar_in<T: NumCast>(dir: Dir<'_>, name: &str, step: usize, block: usize) -> Option<T> {
    dir.scalar(name)?.block_value_as(step, block).ok()
}

fn present(var: &VarInfo, step: usize, block: usize) -> bool {
    var.block_dims(step, block).is_ok()
}

struct ReadCtx<'r, C: Communicator> {
    reader: &'r mut Reader<C>,
    step: usize,
    block: usize,
}

impl<C: Communicator> ReadCtx<'_, C> {
    fn array(&mut self, dir: Dir<'_>, path: String, name: String, kind: Option<AttributeKind>) -> Result<Option<PendingArray>, ContainerError> {
        let (step, block) = (self.step, self.block);
        let Some(values) = dir.array(VALUES).filter(|v| present(v, step, block)) else {
            return Ok(None);
        };
        let (Some(components), Some(tuples)) = (
            scalar_in::<usize>(dir, NUM_COMPONENTS, step, block),
            scalar_in::<usize>(dir, NUM_TUPLES, step, block),
        ) else {
            log::warn!("array record `{path}` lacks its size scalars; skipped");
            return Ok(None);
        };
        let Some(values) = PendingValues::schedule(self.reader, values, step, block)? else {
            return Ok(None);
        };
        Ok(Some(PendingArray {
            path,
            name,
            kind,
            components,
            tuples,
            values,
        }))
    }

    fn collection(&mut self, root: Dir<'_>, root_path: &str, name: &str) -> Result<Vec<PendingArray>, ContainerError> {
        let Some(dir) = root.subdir(name) else {
            return Ok(Vec::new());
        };
        let mut out = Vec::new();
        for sub in dir.subdirs() {
            let stored = sub.name();
            let path = join(&join(root_path, name), stored);
            let (array_name, kind) = match AttributeKind::from_storage_name(stored) {
                Some(kind) => (String::new(), Some(kind)),
                None => (stored.to_string(), None),
            };
            if let Some(p) = self.array(sub, path, array_name, kind)? {
                out.push(p);
            }
        }
        Ok(out)
    }

    fn cells(&mut self, dir: Option<Dir<'_>>, path: String) -> Result<Option<PendingCells>, ContainerError> {
        let (step, block) = (self.step, self.block);
        let Some(dir) = dir else {
            return Ok(None);
        };
        let Some(ia) = dir.array(IA).filter(|v| present(v, step, block)) else {
            return Ok(None);
        };
        let Some(num_cells) = scalar_in::<usize>(dir, NUM_CELLS, step, block) else {
            return Ok(None);
        };
        let ia = self.reader.schedule_read_array_by_id::<i64>(ia.id(), step, Some(block))?;
        Ok(Some(PendingCells { path, num_cells, ia }))
    }
}

/// Schedule the reads of the dataset rooted at `root` for one step and
/// block. `None` when no dataset is stored there.
pub fn read<C: Communicator>(
    reader: &mut Reader<C>,
    tree: &DirTree,
    root: &str,
    step: usize,
    block: usize,
) -> Result<Option<PendingDataSet>, ContainerError> {
    let Some(dir) = tree.get_dir(root, 0) else {
        return Ok(None);
    };
    let Some(tag_var) = dir.scalar(OBJECT_TYPE) else {
        return Ok(None);
    };
    let tag: u8 = tag_var.block_value(step, block)?;
    let Some(object_type) = DataObjectType::from_u8(tag) else {
        log::debug!("`{root}` holds object type {tag}, not a dataset");
        return Ok(None);
    };

    let mut ctx = ReadCtx {
        reader,
        step,
        block,
    };
    let [field, cell, point] = COLLECTIONS;
    let collections = [
        ctx.collection(dir, root, field)?,
        ctx.collection(dir, root, cell)?,
        ctx.collection(dir, root, point)?,
    ];

    let geometry = match object_type {
        DataObjectType::ImageData => {
            let mut origin = [0.0; 3];
            let mut spacing = [1.0; 3];
            let mut extent = [0, -1, 0, -1, 0, -1];
            for (v, name) in origin.iter_mut().zip(ORIGIN) {
                *v = scalar_in(dir, name, step, block).unwrap_or(*v);
            }
            for (v, name) in spacing.iter_mut().zip(SPACING) {
                *v = scalar_in(dir, name, step, block).unwrap_or(*v);
            }
            for (v, name) in extent.iter_mut().zip(EXTENT) {
                *v = scalar_in(dir, name, step, block).unwrap_or(*v);
            }
            PendingGeometry::Image {
                origin,
                spacing,
                extent,
            }
        }
        DataObjectType::PolyData => {
            let points = match dir.subdir(POINTS) {
                Some(p) => ctx.array(p, join(root, POINTS), POINTS.to_string(), None)?,
                None => None,
            };
            let mut topology: [Option<PendingCells>; 4] = Default::default();
            for (slot, name) in topology.iter_mut().zip(POLY_TOPOLOGY) {
                *slot = ctx.cells(dir.subdir(name), join(root, name))?;
            }
            PendingGeometry::Poly { points, topology }
        }
        DataObjectType::UnstructuredGrid => {
            let points = match dir.subdir(POINTS) {
                Some(p) => ctx.array(p, join(root, POINTS), POINTS.to_string(), None)?,
                None => None,
            };
            let types = dir.array(CELL_TYPES).filter(|v| present(v, step, block));
            let has_cells = dir
                .subdir(CELLS)
                .and_then(|d| d.array(IA))
                .is_some_and(|v| present(v, step, block));
            let cells = match (has_cells, types) {
                (true, Some(types)) => {
                    let pending = ctx.cells(dir.subdir(CELLS), join(root, CELLS))?;
                    match pending {
                        Some(pending) => {
                            let handle = ctx.reader.schedule_read_array_by_id::<u8>(types.id(), step, Some(block))?;
                            Some((pending, join(root, CELL_TYPES), handle))
                        }
                        None => None,
                    }
                }
                (false, None) => None,
                _ => {
                    log::warn!("`{root}` stores only one of Cells/CellTypes; topology skipped");
                    None
                }
            };
            PendingGeometry::Unstructured { points, cells }
        }
    };

    Ok(Some(PendingDataSet {
        collections,
        geometry,
    }))
}

/// Schedule, perform and finish in one call.
pub fn read_object<C: Communicator>(
    reader: &mut Reader<C>,
    tree: &DirTree,
    root: &str,
    step: usize,
    block: usize,
) -> Result<Option<DataSet>, ContainerError> {
    let Some(pending) = read(reader, tree, root, step, block)? else {
        return Ok(None);
    };
    reader.wait_for_reads()?;
    pending.finish().map(Some)
}

/// Like [`read_object`], yielding `None` when another kind is stored.
pub fn read_as<T: DataObjectKind, C: Communicator>(
    reader: &mut Reader<C>,
    tree: &DirTree,
    root: &str,
    step: usize,
    block: usize,
) -> Result<Option<T>, ContainerError> {
    let stored = tree
        .get_dir(root, 0)
        .and_then(|d| d.scalar(OBJECT_TYPE))
        .and_then(|v| v.block_value::<u8>(step, block).ok())
        .and_then(DataObjectType::from_u8);
    if stored != Some(T::OBJECT_TYPE) {
        return Ok(None);
    }
    Ok(read_object(reader, tree, root, step, block)?.and_then(T::from_dataset))
}
