use crate::layout::Shape;
use thiserror::Error;

/// Errors raised while planning or executing a tiled copy.
///
/// Every configuration variant is detected before any device memory is touched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TiledCopyError {
    /// The buffer shape isn't a whole number of tiles.
    #[error(
        "The tensor shape must be divisible by the block shape.\nShape {shape}, block shape {tile}."
    )]
    NotDivisible {
        /// Full buffer shape.
        shape: Shape,
        /// Requested tile shape.
        tile: Shape,
    },

    /// A shape, tile, thread or vector extent is zero.
    #[error("Extents must be non-zero, got {what} = {shape}.")]
    ZeroExtent {
        /// Which descriptor was empty.
        what: &'static str,
        /// The offending value.
        shape: Shape,
    },

    /// The thread and vector arrangement doesn't tile the block exactly.
    #[error(
        "Thread arrangement {threads} with vector {vector} doesn't evenly divide the block shape {tile}."
    )]
    ArrangementMismatch {
        /// Tile shape.
        tile: Shape,
        /// Thread arrangement.
        threads: Shape,
        /// Vector shape.
        vector: Shape,
    },

    /// More units per cube than a single cube can hold.
    #[error("Total unit count exceeds maximum.\nRequested {requested} units, max units is {max}.")]
    TooManyUnits {
        /// Units requested by the thread arrangement, saturated on overflow.
        requested: usize,
        /// Maximum supported.
        max: u32,
    },

    /// The buffer holds more elements than device offsets can address.
    #[error("Buffer shape {shape} exceeds the maximum of {max} elements.")]
    TooLarge {
        /// Full buffer shape.
        shape: Shape,
        /// Largest supported element count.
        max: u64,
    },

    /// The vector spans the strided mode of the layout.
    #[error("Vector {vector} isn't laid out along the contiguous mode of the buffer.")]
    UncoalescedVector {
        /// Vector shape.
        vector: Shape,
    },

    /// The vector width can't be expressed as a line.
    #[error("Vector width {width} isn't a supported line size (1, 2, 4, 8 or 16).")]
    UnsupportedVectorWidth {
        /// Vector width in elements.
        width: usize,
    },

    /// A partition was requested outside the launch grid.
    #[error("Tile ({tile_row}, {tile_col}) unit {unit} is outside the launch grid.")]
    OutOfBounds {
        /// Tile row.
        tile_row: usize,
        /// Tile column.
        tile_col: usize,
        /// Unit index.
        unit: usize,
    },

    /// Two units own the same element.
    #[error("Element at offset {offset} is owned by more than one unit.")]
    OverlappingPartition {
        /// Linear offset.
        offset: usize,
    },

    /// No unit owns the element.
    #[error("Element at offset {offset} isn't owned by any unit.")]
    UncoveredElement {
        /// Linear offset.
        offset: usize,
    },

    /// A host buffer doesn't match the layout size.
    #[error("Buffer holds {actual} elements, layout requires {expected}.")]
    BufferSize {
        /// Number of elements described by the layout.
        expected: usize,
        /// Number of elements provided.
        actual: usize,
    },

    /// The config file couldn't be parsed.
    #[error("The config file provided doesn't have the right format => {0}")]
    Config(String),
}

