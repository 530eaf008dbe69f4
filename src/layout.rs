//! Shapes, strided layouts and tiled views of 2D buffers.
//!
//! Offsets and strides are expressed in element units (not bytes).

use core::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::TiledCopyError;

/// Largest number of elements a buffer may hold; device offsets are 32-bit.
pub const MAX_ELEMENTS: u64 = u32::MAX as u64;

/// Logical extents `(rows, cols)` of a buffer, tile, thread arrangement or vector.
#[derive(new, Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Shape {
    /// Extent of the first mode.
    pub rows: usize,
    /// Extent of the second mode.
    pub cols: usize,
}

impl Shape {
    /// Number of elements covered by the shape.
    pub fn size(&self) -> usize {
        self.rows * self.cols
    }

    /// Number of elements, or `None` if the product overflows.
    pub fn checked_size(&self) -> Option<usize> {
        self.rows.checked_mul(self.cols)
    }

    /// Whether either extent is zero.
    pub fn is_empty(&self) -> bool {
        self.rows == 0 || self.cols == 0
    }

    /// Whether `other` divides `self` in both modes.
    pub fn evenly_divides(&self, other: &Shape) -> bool {
        !other.is_empty() && self.rows % other.rows == 0 && self.cols % other.cols == 0
    }

    /// Elementwise product.
    pub fn scale(&self, other: &Shape) -> Shape {
        Shape::new(self.rows * other.rows, self.cols * other.cols)
    }

    /// Elementwise product, or `None` if either mode overflows.
    pub fn checked_scale(&self, other: &Shape) -> Option<Shape> {
        Some(Shape::new(
            self.rows.checked_mul(other.rows)?,
            self.cols.checked_mul(other.cols)?,
        ))
    }

    /// Elementwise quotient, assuming [evenly_divides](Self::evenly_divides).
    pub fn ceil_div(&self, other: &Shape) -> Shape {
        Shape::new(
            self.rows.div_ceil(other.rows),
            self.cols.div_ceil(other.cols),
        )
    }
}

impl Display for Shape {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "({}, {})", self.rows, self.cols)
    }
}

/// Which mode of a 2D layout is stored contiguously.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MajorOrder {
    /// Rows are contiguous: stride `(1, rows)`.
    #[default]
    #[serde(rename = "column_major", alias = "column")]
    ColumnMajor,
    /// Columns are contiguous: stride `(cols, 1)`.
    #[serde(rename = "row_major", alias = "row")]
    RowMajor,
}

/// A mode of a 2D layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// First mode.
    Rows,
    /// Second mode.
    Cols,
}

/// A dense 2D layout: a shape and a stride per mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Layout {
    shape: Shape,
    row_stride: usize,
    col_stride: usize,
}

impl Layout {
    /// Build a compact layout with the given major order.
    pub fn new(shape: Shape, order: MajorOrder) -> Self {
        match order {
            MajorOrder::ColumnMajor => Self::column_major(shape),
            MajorOrder::RowMajor => Self::row_major(shape),
        }
    }

    /// Compact layout with contiguous rows, stride `(1, rows)`.
    pub fn column_major(shape: Shape) -> Self {
        Self {
            shape,
            row_stride: 1,
            col_stride: shape.rows,
        }
    }

    /// Compact layout with contiguous columns, stride `(cols, 1)`.
    pub fn row_major(shape: Shape) -> Self {
        Self {
            shape,
            row_stride: shape.cols,
            col_stride: 1,
        }
    }

    pub fn shape(&self) -> Shape {
        self.shape
    }

    /// Strides `(row_stride, col_stride)` in elements.
    pub fn stride(&self) -> (usize, usize) {
        (self.row_stride, self.col_stride)
    }

    /// Number of elements addressed by the layout.
    pub fn size(&self) -> usize {
        self.shape.size()
    }

    /// Linear offset of the element at `(row, col)`.
    pub fn offset(&self, row: usize, col: usize) -> usize {
        row * self.row_stride + col * self.col_stride
    }

    /// The mode with unit stride. Degenerate shapes with a single row or column
    /// report the mode that is actually walked in memory order.
    pub fn contiguous_mode(&self) -> Mode {
        if self.row_stride == 1 && (self.col_stride != 1 || self.shape.rows > 1) {
            Mode::Rows
        } else {
            Mode::Cols
        }
    }

    /// Extent of the contiguous mode.
    pub fn contiguous_extent(&self) -> usize {
        match self.contiguous_mode() {
            Mode::Rows => self.shape.rows,
            Mode::Cols => self.shape.cols,
        }
    }
}

/// A layout seen as a grid of equally sized tiles: `(m, n) => ((M, N), m', n')`.
///
/// No data is moved; the view only remaps coordinates. The buffer shape must be a whole
/// number of tiles, there's no predication for partial tiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TiledView {
    layout: Layout,
    tile: Shape,
}

impl TiledView {
    /// Tile `layout` with the given tile shape.
    pub fn new(layout: Layout, tile: Shape) -> Result<Self, TiledCopyError> {
        if layout.shape().is_empty() {
            return Err(TiledCopyError::ZeroExtent {
                what: "shape",
                shape: layout.shape(),
            });
        }
        if tile.is_empty() {
            return Err(TiledCopyError::ZeroExtent {
                what: "tile",
                shape: tile,
            });
        }
        if layout
            .shape()
            .checked_size()
            .is_none_or(|size| size as u64 > MAX_ELEMENTS)
        {
            return Err(TiledCopyError::TooLarge {
                shape: layout.shape(),
                max: MAX_ELEMENTS,
            });
        }
        if !layout.shape().evenly_divides(&tile) {
            return Err(TiledCopyError::NotDivisible {
                shape: layout.shape(),
                tile,
            });
        }

        Ok(Self { layout, tile })
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Static shape of every tile.
    pub fn tile_shape(&self) -> Shape {
        self.tile
    }

    /// Number of tiles along each mode, `(m', n')`.
    pub fn tile_count(&self) -> Shape {
        self.layout.shape().ceil_div(&self.tile)
    }

    /// Coordinates of the top-left element of a tile.
    pub fn tile_origin(&self, tile_row: usize, tile_col: usize) -> (usize, usize) {
        (tile_row * self.tile.rows, tile_col * self.tile.cols)
    }

    /// Linear offset of the element `(row, col)` of tile `(tile_row, tile_col)`.
    pub fn offset(&self, tile_row: usize, tile_col: usize, row: usize, col: usize) -> usize {
        let (origin_row, origin_col) = self.tile_origin(tile_row, tile_col);
        self.layout.offset(origin_row + row, origin_col + col)
    }
}
