//! Partitioning of tiles among the units of a cube.
//!
//! A tile is shared by `threads.rows * threads.cols` units. Each unit owns a regular pattern
//! of chunks replicated over the tile; a chunk is `vector.rows x vector.cols` elements that
//! are contiguous in memory. The striped policy is the special case of a `(1, 1)` vector.

use core::fmt::Display;

use crate::TiledCopyError;
use crate::layout::{Layout, Mode, Shape, TiledView};

/// Maximum number of units a single cube can hold.
pub const MAX_UNITS_PER_CUBE: u32 = 1024;

/// Line sizes the copy kernel can be vectorized with.
pub const SUPPORTED_LINE_SIZES: [usize; 5] = [1, 2, 4, 8, 16];

/// Arrangement of the units of a cube over a tile.
///
/// Units are numbered column-major: unit `t` sits at `(t % rows, t / rows)`.
#[derive(new, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ThreadArrangement {
    shape: Shape,
}

impl ThreadArrangement {
    pub fn shape(&self) -> Shape {
        self.shape
    }

    /// Number of units.
    pub fn units(&self) -> usize {
        self.shape.size()
    }

    /// Position of a unit inside the arrangement.
    pub fn coords(&self, unit: usize) -> (usize, usize) {
        (unit % self.shape.rows, unit / self.shape.rows)
    }
}

/// How the elements of a tile are handed out to units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PartitionPolicy {
    /// Each unit holds single elements strided by the thread arrangement.
    Striped,
    /// Each unit holds whole vectors of contiguous elements, so accesses can be widened.
    Vectorized {
        /// Shape of one vector, e.g. `(4, 1)` on a column-major buffer.
        vector: Shape,
    },
}

impl PartitionPolicy {
    /// Shape of one chunk.
    pub fn vector(&self) -> Shape {
        match self {
            PartitionPolicy::Striped => Shape::new(1, 1),
            PartitionPolicy::Vectorized { vector } => *vector,
        }
    }

    /// Number of elements per chunk.
    pub fn width(&self) -> usize {
        self.vector().size()
    }
}

impl Display for PartitionPolicy {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            PartitionPolicy::Striped => f.write_str("striped"),
            PartitionPolicy::Vectorized { vector } => write!(f, "vectorized {vector}"),
        }
    }
}

/// The chunks of a tile owned by one unit, in fragment order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadPartition {
    chunks: Vec<usize>,
    width: usize,
}

impl ThreadPartition {
    /// Base offset of every chunk.
    pub fn chunks(&self) -> &[usize] {
        &self.chunks
    }

    /// Number of contiguous elements per chunk.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Number of elements owned by the unit.
    pub fn len(&self) -> usize {
        self.chunks.len() * self.width
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Every linear offset owned by the unit, chunk by chunk.
    pub fn offsets(&self) -> impl Iterator<Item = usize> + '_ {
        let width = self.width;
        self.chunks
            .iter()
            .flat_map(move |base| *base..*base + width)
    }
}

/// The `(tile, unit)` that owns an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Owner {
    /// `(tile_row, tile_col)`.
    pub tile: (usize, usize),
    /// Unit index inside the cube.
    pub unit: usize,
}

/// A validated description of a tiled copy.
///
/// Building a plan checks every precondition the copy relies on, so the partitions it
/// hands out are disjoint and cover the buffer. For vectorized plans each chunk is
/// contiguous in memory and starts at a multiple of the vector width; the buffer itself
/// must also be aligned to the vector width in bytes, which device allocations are.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CopyPlan {
    view: TiledView,
    threads: ThreadArrangement,
    policy: PartitionPolicy,
}

impl CopyPlan {
    /// Validate and build a plan.
    pub fn new(
        layout: Layout,
        tile: Shape,
        threads: ThreadArrangement,
        policy: PartitionPolicy,
    ) -> Result<Self, TiledCopyError> {
        let view = TiledView::new(layout, tile)?;

        if threads.shape().is_empty() {
            return Err(TiledCopyError::ZeroExtent {
                what: "threads",
                shape: threads.shape(),
            });
        }

        let vector = policy.vector();
        if vector.is_empty() {
            return Err(TiledCopyError::ZeroExtent {
                what: "vector",
                shape: vector,
            });
        }

        let requested = threads.shape().checked_size().unwrap_or(usize::MAX);
        if requested > MAX_UNITS_PER_CUBE as usize {
            return Err(TiledCopyError::TooManyUnits {
                requested,
                max: MAX_UNITS_PER_CUBE,
            });
        }

        let divides = threads
            .shape()
            .checked_scale(&vector)
            .is_some_and(|step| tile.evenly_divides(&step));
        if !divides {
            return Err(TiledCopyError::ArrangementMismatch {
                tile,
                threads: threads.shape(),
                vector,
            });
        }

        if vector.size() > 1 {
            let along_contiguous = match layout.contiguous_mode() {
                Mode::Rows => vector.cols == 1,
                Mode::Cols => vector.rows == 1,
            };
            if !along_contiguous {
                return Err(TiledCopyError::UncoalescedVector { vector });
            }
        }

        if !SUPPORTED_LINE_SIZES.contains(&vector.size()) {
            return Err(TiledCopyError::UnsupportedVectorWidth {
                width: vector.size(),
            });
        }

        Ok(Self {
            view,
            threads,
            policy,
        })
    }

    /// Build the same copy with another partitioning policy.
    pub fn with_policy(&self, policy: PartitionPolicy) -> Result<Self, TiledCopyError> {
        Self::new(
            *self.view.layout(),
            self.view.tile_shape(),
            self.threads,
            policy,
        )
    }

    pub fn view(&self) -> &TiledView {
        &self.view
    }

    pub fn layout(&self) -> &Layout {
        self.view.layout()
    }

    pub fn threads(&self) -> ThreadArrangement {
        self.threads
    }

    pub fn policy(&self) -> PartitionPolicy {
        self.policy
    }

    /// Launch grid, one cube per tile: `(m', n')`.
    pub fn grid(&self) -> Shape {
        self.view.tile_count()
    }

    /// Units per cube.
    pub fn units_per_tile(&self) -> usize {
        self.threads.units()
    }

    /// Region covered by one step of the whole cube.
    pub fn step(&self) -> Shape {
        self.threads.shape().scale(&self.policy.vector())
    }

    /// How many times the cube's step is replicated over the tile, per mode.
    pub fn repeats(&self) -> Shape {
        self.view.tile_shape().ceil_div(&self.step())
    }

    /// Chunks (and so fragment slots) per unit.
    pub fn chunks_per_unit(&self) -> usize {
        self.repeats().size()
    }

    /// Line size the buffers are bound with.
    pub fn line_size(&self) -> u8 {
        self.policy.width() as u8
    }

    /// The partition of `unit` inside tile `(tile_row, tile_col)`.
    pub fn partition(
        &self,
        tile_row: usize,
        tile_col: usize,
        unit: usize,
    ) -> Result<ThreadPartition, TiledCopyError> {
        let grid = self.grid();
        if tile_row >= grid.rows || tile_col >= grid.cols || unit >= self.units_per_tile() {
            return Err(TiledCopyError::OutOfBounds {
                tile_row,
                tile_col,
                unit,
            });
        }

        Ok(self.partition_unchecked(tile_row, tile_col, unit))
    }

    pub(crate) fn partition_unchecked(
        &self,
        tile_row: usize,
        tile_col: usize,
        unit: usize,
    ) -> ThreadPartition {
        let (unit_row, unit_col) = self.threads.coords(unit);
        let vector = self.policy.vector();
        let step = self.step();
        let repeats = self.repeats();

        let mut chunks = Vec::with_capacity(repeats.size());
        for j in 0..repeats.cols {
            for i in 0..repeats.rows {
                let row = unit_row * vector.rows + i * step.rows;
                let col = unit_col * vector.cols + j * step.cols;
                chunks.push(self.view.offset(tile_row, tile_col, row, col));
            }
        }

        ThreadPartition {
            chunks,
            width: vector.size(),
        }
    }

    /// Every `(tile, unit, partition)` of the launch, tiles in column-major order.
    pub fn partitions(&self) -> impl Iterator<Item = (Owner, ThreadPartition)> + '_ {
        let grid = self.grid();
        let units = self.units_per_tile();

        (0..grid.cols).flat_map(move |tile_col| {
            (0..grid.rows).flat_map(move |tile_row| {
                (0..units).map(move |unit| {
                    let owner = Owner {
                        tile: (tile_row, tile_col),
                        unit,
                    };
                    (owner, self.partition_unchecked(tile_row, tile_col, unit))
                })
            })
        })
    }

    /// Owner of every element of the buffer, indexed by linear offset.
    ///
    /// Fails if an element is owned twice or not at all.
    pub fn ownership_map(&self) -> Result<Vec<Owner>, TiledCopyError> {
        let size = self.layout().size();
        let mut owners: Vec<Option<Owner>> = vec![None; size];

        for (owner, partition) in self.partitions() {
            for offset in partition.offsets() {
                let Some(slot) = owners.get_mut(offset) else {
                    return Err(TiledCopyError::UncoveredElement { offset });
                };
                if slot.is_some() {
                    return Err(TiledCopyError::OverlappingPartition { offset });
                }
                *slot = Some(owner);
            }
        }

        owners
            .into_iter()
            .enumerate()
            .map(|(offset, owner)| owner.ok_or(TiledCopyError::UncoveredElement { offset }))
            .collect()
    }
}
