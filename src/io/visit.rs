//! Define/write traversal shared by both phases of the write protocol.

use super::*;
use crate::algs::communicator::Communicator;
use crate::container::methods::Transform;
use crate::container::writer::Writer;
use crate::data::array::{DataArray, with_numeric};
use crate::data::dataset::{CellArray, DataObject, DataSet, ImageData, PolyData, UnstructuredGrid};
use crate::data::field::FieldData;

/// Declares every visited variable.
pub struct DefineSink<'a, C: Communicator> {
    writer: &'a mut Writer<C>,
    transform: Transform,
}

impl<'a, C: Communicator> DefineSink<'a, C> {
    pub fn new(writer: &'a mut Writer<C>, transform: Transform) -> Self {
        Self { writer, transform }
    }
}

impl<C: Communicator> ObjectSink for DefineSink<'_, C> {
    fn scalar<T: Element>(&mut self, path: &str, _value: T) -> Result<(), ContainerError> {
        self.writer.define_scalar::<T>(path)
    }

    fn array<T: Element>(&mut self, path: &str, dims: &[Dim], values: &[T]) -> Result<(), ContainerError> {
        self.writer
            .define_array_sized::<T>(path, dims, self.transform, values.len() as u64)
    }
}

/// Writes every visited variable into the open step.
pub struct WriteSink<'a, C: Communicator> {
    writer: &'a mut Writer<C>,
}

impl<'a, C: Communicator> WriteSink<'a, C> {
    pub fn new(writer: &'a mut Writer<C>) -> Self {
        Self { writer }
    }
}

impl<C: Communicator> ObjectSink for WriteSink<'_, C> {
    fn scalar<T: Element>(&mut self, path: &str, value: T) -> Result<(), ContainerError> {
        self.writer.write_scalar(path, value)
    }

    fn array<T: Element>(&mut self, path: &str, _dims: &[Dim], values: &[T]) -> Result<(), ContainerError> {
        self.writer.write_array(path, values)
    }
}

/// Declare the variables of `dataset` rooted at `root`.
pub fn define<C: Communicator>(
    writer: &mut Writer<C>,
    root: &str,
    dataset: &DataSet,
    transform: Transform,
) -> Result<(), ContainerError> {
    visit_dataset(&mut DefineSink::new(writer, transform), root, dataset)
}

/// Write the values of `dataset` into the open step.
pub fn write<C: Communicator>(writer: &mut Writer<C>, root: &str, dataset: &DataSet) -> Result<(), ContainerError> {
    visit_dataset(&mut WriteSink::new(writer), root, dataset)
}

pub(crate) fn visit_dataset<S: ObjectSink>(sink: &mut S, root: &str, dataset: &DataSet) -> Result<(), ContainerError> {
    sink.scalar(&join(root, OBJECT_TYPE), dataset.object_type() as u8)?;
    visit_attributes(sink, root, dataset.as_object())?;
    match dataset {
        DataSet::Image(img) => visit_image(sink, root, img),
        DataSet::Poly(poly) => visit_poly(sink, root, poly),
        DataSet::Unstructured(ug) => visit_unstructured(sink, root, ug),
    }
}

fn visit_attributes<S: ObjectSink>(sink: &mut S, root: &str, obj: &dyn DataObject) -> Result<(), ContainerError> {
    let [field, cell, point] = COLLECTIONS;
    visit_field_data(sink, &join(root, field), obj.field_data())?;
    visit_field_data(sink, &join(root, cell), obj.cell_data())?;
    visit_field_data(sink, &join(root, point), obj.point_data())
}

fn visit_field_data<S: ObjectSink>(sink: &mut S, path: &str, fd: &FieldData) -> Result<(), ContainerError> {
    for (i, array) in fd.iter().enumerate() {
        let name = if !array.name.is_empty() {
            array.name.clone()
        } else if let Some(kind) = fd.attribute_kind_of(i) {
            kind.storage_name()
        } else {
            log::debug!("skipping unnamed array {i} of `{path}`");
            continue;
        };
        visit_array(sink, &join(path, &name), array)?;
    }
    Ok(())
}

/// `n` as the integer type used to store a count at `path`.
fn stored_count<I: TryFrom<usize>>(path: &str, n: usize) -> Result<I, ContainerError> {
    I::try_from(n).map_err(|_| ContainerError::CountOverflow {
        path: path.to_string(),
        count: n,
    })
}

/// Emit one array record. Empty arrays and arrays without a numeric
/// container type are skipped.
fn visit_array<S: ObjectSink>(sink: &mut S, path: &str, array: &DataArray) -> Result<(), ContainerError> {
    let tuples = array.tuples();
    if tuples == 0 {
        log::debug!("skipping empty array `{path}`");
        return Ok(());
    }
    let comps_path = join(path, NUM_COMPONENTS);
    let tuples_path = join(path, NUM_TUPLES);
    let dims = [Dim::Var(tuples_path.clone()), Dim::Var(comps_path.clone())];
    let n = tuples * array.components;
    let components: i32 = stored_count(&comps_path, array.components)?;
    let tuples: i32 = stored_count(&tuples_path, tuples)?;
    with_numeric!(&array.values, v => {
        sink.scalar(&comps_path, components)?;
        sink.scalar(&tuples_path, tuples)?;
        sink.array(&join(path, VALUES), &dims, &v[..n])
    }, _ => {
        log::warn!("skipping `{path}`: {:?} arrays cannot be stored", array.element_type());
        Ok(())
    })
}

fn visit_cells<S: ObjectSink>(sink: &mut S, path: &str, cells: &CellArray) -> Result<(), ContainerError> {
    if cells.is_empty() {
        return Ok(());
    }
    let size_path = join(path, IA_SIZE);
    let count_path = join(path, NUM_CELLS);
    let count: i64 = stored_count(&count_path, cells.num_cells())?;
    let size: i64 = stored_count(&size_path, cells.ia().len())?;
    sink.scalar(&count_path, count)?;
    sink.scalar(&size_path, size)?;
    sink.array(&join(path, IA), &[Dim::Var(size_path)], cells.ia())
}

fn visit_image<S: ObjectSink>(sink: &mut S, root: &str, img: &ImageData) -> Result<(), ContainerError> {
    for (name, v) in ORIGIN.iter().zip(img.origin) {
        sink.scalar(&join(root, name), v)?;
    }
    for (name, v) in SPACING.iter().zip(img.spacing) {
        sink.scalar(&join(root, name), v)?;
    }
    for (name, v) in EXTENT.iter().zip(img.extent) {
        sink.scalar(&join(root, name), v)?;
    }
    Ok(())
}

fn visit_poly<S: ObjectSink>(sink: &mut S, root: &str, poly: &PolyData) -> Result<(), ContainerError> {
    if let Some(points) = &poly.points {
        visit_array(sink, &join(root, POINTS), points)?;
    }
    let topology = [&poly.verts, &poly.lines, &poly.polys, &poly.strips];
    for (name, cells) in POLY_TOPOLOGY.iter().zip(topology) {
        visit_cells(sink, &join(root, name), cells)?;
    }
    Ok(())
}

fn visit_unstructured<S: ObjectSink>(sink: &mut S, root: &str, ug: &UnstructuredGrid) -> Result<(), ContainerError> {
    if let Some(points) = &ug.points {
        visit_array(sink, &join(root, POINTS), points)?;
    }
    if ug.cells.is_empty() {
        return Ok(());
    }
    if ug.cell_types.len() != ug.cells.num_cells() {
        return Err(ContainerError::ShapeMismatch {
            path: join(root, CELL_TYPES),
            expected: ug.cells.num_cells(),
            actual: ug.cell_types.len(),
        });
    }
    let cells_path = join(root, CELLS);
    visit_cells(sink, &cells_path, &ug.cells)?;
    let count = Dim::Var(join(&cells_path, NUM_CELLS));
    sink.array(&join(root, CELL_TYPES), &[count], &ug.cell_types)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::field::AttributeKind;

    /// Records visited paths.
    #[derive(Default)]
    struct Trace(Vec<String>);

    impl ObjectSink for Trace {
        fn scalar<T: Element>(&mut self, path: &str, _value: T) -> Result<(), ContainerError> {
            self.0.push(path.to_string());
            Ok(())
        }
        fn array<T: Element>(&mut self, path: &str, _dims: &[Dim], _values: &[T]) -> Result<(), ContainerError> {
            self.0.push(format!("{path}[]"));
            Ok(())
        }
    }

    #[test]
    fn image_paths_in_visit_order() {
        let mut img = ImageData::new([0.0; 3], [0.5; 3], [0, 1, 0, 1, 0, 0]);
        img.cell_data.add_array(DataArray::new("Pressure", 1, vec![1.0f32]));
        img.cell_data.add_array(DataArray::new("Empty", 1, Vec::<f32>::new()));
        img.cell_data.add_array(DataArray::new("", 1, vec![1i32]));
        img.point_data.set_attribute(DataArray::new("", 1, vec![1.0f64; 4]), AttributeKind::Scalars);
        img.point_data.add_array(DataArray::new("labels", 1, vec!["x".to_string(); 4]));
        let mut trace = Trace::default();
        visit_dataset(&mut trace, "/", &img.into()).unwrap();
        let t = trace.0;
        assert_eq!(t[0], "/ObjectType");
        assert_eq!(
            &t[1..4],
            &[
                "/CellData/Pressure/NumberOfComponents",
                "/CellData/Pressure/NumberOfTuples",
                "/CellData/Pressure/Values[]",
            ]
        );
        assert_eq!(t[6], "/PointData/Scalars_/Values[]");
        assert_eq!(t[7], "/OriginX");
        assert_eq!(t.last().unwrap(), "/ExtentZMax");
        assert_eq!(t.len(), 7 + 12);
    }

    #[test]
    fn counts_must_fit_their_stored_type() {
        assert_eq!(stored_count::<i32>("/a/NumberOfTuples", 7).unwrap(), 7);
        let err = stored_count::<i32>("/a/NumberOfTuples", i32::MAX as usize + 1).unwrap_err();
        assert!(matches!(
            err,
            ContainerError::CountOverflow { ref path, count } if path == "/a/NumberOfTuples" && count == 1 << 31
        ));
        assert!(stored_count::<i64>("/c/IaSize", i32::MAX as usize + 1).is_ok());
        assert!(stored_count::<i64>("/c/IaSize", usize::MAX).is_err());
    }

    #[test]
    fn unstructured_needs_one_type_per_cell() {
        let mut ug = UnstructuredGrid::default();
        ug.cells.push_cell(&[0, 1, 2]);
        let err = visit_dataset(&mut Trace::default(), "/", &ug.into()).unwrap_err();
        assert!(matches!(err, ContainerError::ShapeMismatch { .. }));
    }
}
