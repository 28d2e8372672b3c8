//! Composite dataset kinds: structured image grids, polygonal point sets
//! and unstructured meshes.

use crate::data::array::DataArray;
use crate::data::field::FieldData;

/// Numeric tag identifying a dataset kind. Values match the VTK data
/// object ids.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DataObjectType {
    PolyData = 0,
    UnstructuredGrid = 4,
    ImageData = 6,
}

impl DataObjectType {
    pub fn from_u8(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(DataObjectType::PolyData),
            4 => Some(DataObjectType::UnstructuredGrid),
            6 => Some(DataObjectType::ImageData),
            _ => None,
        }
    }
}

/// Linear cell shapes of an unstructured mesh, with VTK ids.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CellType {
    Vertex = 1,
    PolyVertex = 2,
    Line = 3,
    PolyLine = 4,
    Triangle = 5,
    TriangleStrip = 6,
    Polygon = 7,
    Pixel = 8,
    Quad = 9,
    Tetra = 10,
    Voxel = 11,
    Hexahedron = 12,
    Wedge = 13,
    Pyramid = 14,
}

impl CellType {
    /// Topological dimension.
    pub fn dimension(self) -> u8 {
        match self {
            CellType::Vertex | CellType::PolyVertex => 0,
            CellType::Line | CellType::PolyLine => 1,
            CellType::Triangle
            | CellType::TriangleStrip
            | CellType::Polygon
            | CellType::Pixel
            | CellType::Quad => 2,
            _ => 3,
        }
    }
}

/// Cells in the legacy offset/index encoding: every cell is stored as
/// `n i_1 ... i_n` in one flat buffer.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CellArray {
    num_cells: usize,
    ia: Vec<i64>,
}

impl CellArray {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an existing encoded buffer.
    pub fn from_legacy(num_cells: usize, ia: Vec<i64>) -> Self {
        Self { num_cells, ia }
    }

    pub fn from_cells<'a>(cells: impl IntoIterator<Item = &'a [i64]>) -> Self {
        let mut out = Self::new();
        for c in cells {
            out.push_cell(c);
        }
        out
    }

    pub fn push_cell(&mut self, ids: &[i64]) {
        self.ia.push(ids.len() as i64);
        self.ia.extend_from_slice(ids);
        self.num_cells += 1;
    }

    pub fn num_cells(&self) -> usize {
        self.num_cells
    }

    /// The flat encoded buffer.
    pub fn ia(&self) -> &[i64] {
        &self.ia
    }

    pub fn is_empty(&self) -> bool {
        self.num_cells == 0
    }

    /// Point-id lists of each cell. Stops early on a truncated buffer.
    pub fn cells(&self) -> impl Iterator<Item = &[i64]> {
        let mut rest = self.ia.as_slice();
        std::iter::from_fn(move || {
            let (&n, tail) = rest.split_first()?;
            let n = usize::try_from(n).ok().filter(|&n| n <= tail.len())?;
            let (cell, next) = tail.split_at(n);
            rest = next;
            Some(cell)
        })
    }
}

/// Accessors shared by every dataset kind.
pub trait DataObject {
    fn object_type(&self) -> DataObjectType;
    fn field_data(&self) -> &FieldData;
    fn cell_data(&self) -> &FieldData;
    fn point_data(&self) -> &FieldData;
    fn field_data_mut(&mut self) -> &mut FieldData;
    fn cell_data_mut(&mut self) -> &mut FieldData;
    fn point_data_mut(&mut self) -> &mut FieldData;
}

macro_rules! impl_data_object {
    ($t:ty, $tag:ident) => {
        impl DataObject for $t {
            fn object_type(&self) -> DataObjectType {
                DataObjectType::$tag
            }
            fn field_data(&self) -> &FieldData {
                &self.field_data
            }
            fn cell_data(&self) -> &FieldData {
                &self.cell_data
            }
            fn point_data(&self) -> &FieldData {
                &self.point_data
            }
            fn field_data_mut(&mut self) -> &mut FieldData {
                &mut self.field_data
            }
            fn cell_data_mut(&mut self) -> &mut FieldData {
                &mut self.cell_data
            }
            fn point_data_mut(&mut self) -> &mut FieldData {
                &mut self.point_data
            }
        }
    };
}

/// Axis-aligned structured grid.
#[derive(Clone, Debug, PartialEq)]
pub struct ImageData {
    pub origin: [f64; 3],
    pub spacing: [f64; 3],
    /// `[xmin, xmax, ymin, ymax, zmin, zmax]` in point indices.
    pub extent: [i32; 6],
    pub field_data: FieldData,
    pub cell_data: FieldData,
    pub point_data: FieldData,
}

impl Default for ImageData {
    fn default() -> Self {
        Self {
            origin: [0.0; 3],
            spacing: [1.0; 3],
            extent: [0, -1, 0, -1, 0, -1],
            field_data: FieldData::new(),
            cell_data: FieldData::new(),
            point_data: FieldData::new(),
        }
    }
}

impl ImageData {
    pub fn new(origin: [f64; 3], spacing: [f64; 3], extent: [i32; 6]) -> Self {
        Self {
            origin,
            spacing,
            extent,
            ..Default::default()
        }
    }

    /// Points along each axis.
    pub fn dimensions(&self) -> [usize; 3] {
        let d = |lo: i32, hi: i32| (i64::from(hi) - i64::from(lo) + 1).max(0) as usize;
        [
            d(self.extent[0], self.extent[1]),
            d(self.extent[2], self.extent[3]),
            d(self.extent[4], self.extent[5]),
        ]
    }

    /// Saturates at `usize::MAX`.
    pub fn num_points(&self) -> usize {
        self.dimensions().iter().fold(1, |acc, &n| acc.saturating_mul(n))
    }

    pub fn num_cells(&self) -> usize {
        let dims = self.dimensions();
        if dims.contains(&0) {
            return 0;
        }
        dims.iter().fold(1, |acc, &n| acc.saturating_mul(n.saturating_sub(1).max(1)))
    }
}

/// Points with vertex, line, polygon and strip connectivity.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PolyData {
    /// Three components per point.
    pub points: Option<DataArray>,
    pub verts: CellArray,
    pub lines: CellArray,
    pub polys: CellArray,
    pub strips: CellArray,
    pub field_data: FieldData,
    pub cell_data: FieldData,
    pub point_data: FieldData,
}

impl PolyData {
    pub fn num_points(&self) -> usize {
        self.points.as_ref().map(|p| p.tuples()).unwrap_or(0)
    }

    pub fn num_cells(&self) -> usize {
        self.verts.num_cells() + self.lines.num_cells() + self.polys.num_cells() + self.strips.num_cells()
    }
}

/// Points with arbitrary typed cells.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct UnstructuredGrid {
    pub points: Option<DataArray>,
    pub cells: CellArray,
    /// One VTK cell type id per cell.
    pub cell_types: Vec<u8>,
    pub field_data: FieldData,
    pub cell_data: FieldData,
    pub point_data: FieldData,
}

impl UnstructuredGrid {
    pub fn push_cell(&mut self, cell_type: CellType, ids: &[i64]) {
        self.cells.push_cell(ids);
        self.cell_types.push(cell_type as u8);
    }

    pub fn num_points(&self) -> usize {
        self.points.as_ref().map(|p| p.tuples()).unwrap_or(0)
    }

    pub fn num_cells(&self) -> usize {
        self.cells.num_cells()
    }
}

impl_data_object!(ImageData, ImageData);
impl_data_object!(PolyData, PolyData);
impl_data_object!(UnstructuredGrid, UnstructuredGrid);

/// Any dataset the codec can store.
#[derive(Clone, Debug, PartialEq)]
pub enum DataSet {
    Image(ImageData),
    Poly(PolyData),
    Unstructured(UnstructuredGrid),
}

impl DataSet {
    pub fn as_object(&self) -> &dyn DataObject {
        match self {
            DataSet::Image(d) => d,
            DataSet::Poly(d) => d,
            DataSet::Unstructured(d) => d,
        }
    }

    pub fn as_object_mut(&mut self) -> &mut dyn DataObject {
        match self {
            DataSet::Image(d) => d,
            DataSet::Poly(d) => d,
            DataSet::Unstructured(d) => d,
        }
    }

    pub fn object_type(&self) -> DataObjectType {
        self.as_object().object_type()
    }

    pub fn as_image(&self) -> Option<&ImageData> {
        match self {
            DataSet::Image(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_poly(&self) -> Option<&PolyData> {
        match self {
            DataSet::Poly(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_unstructured(&self) -> Option<&UnstructuredGrid> {
        match self {
            DataSet::Unstructured(d) => Some(d),
            _ => None,
        }
    }
}

impl From<ImageData> for DataSet {
    fn from(d: ImageData) -> Self {
        DataSet::Image(d)
    }
}

impl From<PolyData> for DataSet {
    fn from(d: PolyData) -> Self {
        DataSet::Poly(d)
    }
}

impl From<UnstructuredGrid> for DataSet {
    fn from(d: UnstructuredGrid) -> Self {
        DataSet::Unstructured(d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cell_array_encoding() {
        let mut ca = CellArray::new();
        ca.push_cell(&[0, 1, 2]);
        ca.push_cell(&[2, 3]);
        assert_eq!(ca.num_cells(), 2);
        assert_eq!(ca.ia(), &[3, 0, 1, 2, 2, 2, 3]);
        let cells: Vec<_> = ca.cells().collect();
        assert_eq!(cells, vec![&[0i64, 1, 2][..], &[2, 3][..]]);
        let truncated = CellArray::from_legacy(2, vec![3, 0, 1]);
        assert_eq!(truncated.cells().count(), 0);
        assert_eq!(CellArray::from_cells(cells), ca);
    }

    #[test]
    fn image_sizes() {
        let img = ImageData::new([0.0; 3], [1.0; 3], [0, 9, 0, 4, 0, 0]);
        assert_eq!(img.dimensions(), [10, 5, 1]);
        assert_eq!(img.num_points(), 50);
        assert_eq!(img.num_cells(), 36);
        assert_eq!(ImageData::default().num_points(), 0);
        assert_eq!(DataObjectType::from_u8(4), Some(DataObjectType::UnstructuredGrid));
        assert_eq!(DataObjectType::from_u8(1), None);
    }

    #[test]
    fn full_range_extents_do_not_wrap() {
        let wide = ImageData::new([0.0; 3], [1.0; 3], [i32::MIN, i32::MAX, 0, 0, 0, 0]);
        assert_eq!(wide.dimensions(), [1usize << 32, 1, 1]);
        assert_eq!(wide.num_points(), 1usize << 32);
        assert_eq!(wide.num_cells(), (1usize << 32) - 1);
        let inverted = ImageData::new([0.0; 3], [1.0; 3], [i32::MAX, i32::MIN, 0, 0, 0, 0]);
        assert_eq!(inverted.dimensions(), [0, 1, 1]);
        assert_eq!(inverted.num_cells(), 0);
        let huge = ImageData::new([0.0; 3], [1.0; 3], [i32::MIN, i32::MAX, i32::MIN, i32::MAX, i32::MIN, i32::MAX]);
        assert_eq!(huge.num_points(), usize::MAX);
    }

    #[test]
    fn dataset_dispatch() {
        let mut ug = UnstructuredGrid::default();
        ug.push_cell(CellType::Tetra, &[0, 1, 2, 3]);
        let ds = DataSet::from(ug);
        assert_eq!(ds.object_type(), DataObjectType::UnstructuredGrid);
        assert_eq!(ds.as_unstructured().unwrap().cell_types, vec![10]);
        assert!(ds.as_image().is_none());
        assert_eq!(CellType::Tetra.dimension(), 3);
    }
}
