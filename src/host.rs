//! Host reference executor.
//!
//! Runs the same grid as the device kernel on a rayon pool: every `(tile, unit)` pair is an
//! independent task that loads its partition into a [Fragment] and stores it back.

use core::marker::PhantomData;

use rayon::prelude::*;

use crate::TiledCopyError;
use crate::partition::{CopyPlan, ThreadPartition};

/// Per-unit staging storage, one slot per owned element, in partition order.
#[derive(Debug, Clone, PartialEq)]
pub struct Fragment<E> {
    values: Vec<E>,
}

impl<E: Copy> Fragment<E> {
    /// First leg: read every chunk of `partition` from `source`.
    pub fn load(source: &[E], partition: &ThreadPartition) -> Self {
        let width = partition.width();
        let mut values = Vec::with_capacity(partition.len());

        for base in partition.chunks() {
            values.extend_from_slice(&source[*base..*base + width]);
        }

        Self { values }
    }

    pub fn values(&self) -> &[E] {
        &self.values
    }

    /// Second leg: write every chunk back at the same offsets of the destination.
    fn store(&self, destination: &DisjointWriter<'_, E>, partition: &ThreadPartition) {
        let width = partition.width();

        for (chunk, base) in self.values.chunks_exact(width).zip(partition.chunks()) {
            // SAFETY: partitions handed out by a `CopyPlan` never overlap and stay inside the
            // layout, which has the same size as the destination.
            unsafe { destination.write(*base, chunk) };
        }
    }
}

/// Shared handle on a destination buffer whose regions are written by distinct tasks.
struct DisjointWriter<'a, E> {
    ptr: *mut E,
    len: usize,
    _buffer: PhantomData<&'a mut [E]>,
}

unsafe impl<E: Send> Send for DisjointWriter<'_, E> {}
unsafe impl<E: Send> Sync for DisjointWriter<'_, E> {}

impl<'a, E: Copy> DisjointWriter<'a, E> {
    fn new(buffer: &'a mut [E]) -> Self {
        Self {
            ptr: buffer.as_mut_ptr(),
            len: buffer.len(),
            _buffer: PhantomData,
        }
    }

    /// # Safety
    ///
    /// No other task may write or read `offset..offset + values.len()` concurrently.
    unsafe fn write(&self, offset: usize, values: &[E]) {
        assert!(offset + values.len() <= self.len, "Write out of bounds");
        unsafe {
            core::ptr::copy_nonoverlapping(values.as_ptr(), self.ptr.add(offset), values.len());
        }
    }
}

/// Copy `source` into `destination` tile by tile.
///
/// The source is only read; the destination is written exactly once per element.
pub fn copy_tiled<E: Copy + Send + Sync>(
    plan: &CopyPlan,
    source: &[E],
    destination: &mut [E],
) -> Result<(), TiledCopyError> {
    let expected = plan.layout().size();
    for actual in [source.len(), destination.len()] {
        if actual != expected {
            return Err(TiledCopyError::BufferSize { expected, actual });
        }
    }

    let grid = plan.grid();
    let units = plan.units_per_tile();
    let total = grid.size() * units;

    log::debug!(
        "Running {} tiled copy on the host: grid {grid}, {units} units per tile",
        plan.policy()
    );

    let writer = DisjointWriter::new(destination);

    (0..total).into_par_iter().for_each(|task| {
        let unit = task % units;
        let tile = task / units;
        let (tile_row, tile_col) = (tile % grid.rows, tile / grid.rows);

        let partition = plan.partition_unchecked(tile_row, tile_col, unit);
        let fragment = Fragment::load(source, &partition);
        fragment.store(&writer, &partition);
    });

    Ok(())
}

/// Copy `source` into a freshly allocated buffer.
pub fn copy<E: Copy + Default + Send + Sync>(
    plan: &CopyPlan,
    source: &[E],
) -> Result<Vec<E>, TiledCopyError> {
    let mut destination = vec![E::default(); source.len()];
    copy_tiled(plan, source, &mut destination)?;

    Ok(destination)
}
