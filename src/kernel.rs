//! Device copy kernel.
//!
//! One cube per tile, one unit per thread of the arrangement. Each unit stages its partition
//! in registers before writing it back, so the two legs never alias.

use cubecl::prelude::*;
use cubecl::server::Handle;

use crate::TiledCopyError;
use crate::partition::CopyPlan;

#[cube(launch_unchecked)]
fn tiled_copy_kernel<E: CubePrimitive>(
    input: &Array<Line<E>>,
    output: &mut Array<Line<E>>,
    row_stride: u32,
    col_stride: u32,
    #[comptime] tile_rows: u32,
    #[comptime] tile_cols: u32,
    #[comptime] thread_rows: u32,
    #[comptime] thread_cols: u32,
    #[comptime] vector_rows: u32,
    #[comptime] vector_cols: u32,
) {
    let line_size = input.line_size();
    let step_rows = comptime![thread_rows * vector_rows];
    let step_cols = comptime![thread_cols * vector_cols];
    let repeat_rows = comptime![tile_rows / step_rows];
    let repeat_cols = comptime![tile_cols / step_cols];

    let unit_row = UNIT_POS % thread_rows;
    let unit_col = UNIT_POS / thread_rows;
    let origin_row = CUBE_POS_X * tile_rows + unit_row * vector_rows;
    let origin_col = CUBE_POS_Y * tile_cols + unit_col * vector_cols;

    let mut fragment =
        Array::<Line<E>>::vectorized(comptime![repeat_rows * repeat_cols], line_size);

    #[unroll]
    for j in 0..repeat_cols {
        #[unroll]
        for i in 0..repeat_rows {
            let row = origin_row + i * step_rows;
            let col = origin_col + j * step_cols;
            let offset = row * row_stride + col * col_stride;
            fragment[j * repeat_rows + i] = input[offset / line_size];
        }
    }

    #[unroll]
    for j in 0..repeat_cols {
        #[unroll]
        for i in 0..repeat_rows {
            let row = origin_row + i * step_rows;
            let col = origin_col + j * step_cols;
            let offset = row * row_stride + col * col_stride;
            output[offset / line_size] = fragment[j * repeat_rows + i];
        }
    }
}

/// Launch the tiled copy from `input` into `output`.
///
/// Both handles must hold `plan.layout().size()` elements of type `E`. The plan has already
/// checked that every unit stays inside its tile, so the unchecked launch is sound.
pub fn launch_ref<R: Runtime, E: CubePrimitive>(
    client: &ComputeClient<R::Server, R::Channel>,
    plan: &CopyPlan,
    input: &Handle,
    output: &Handle,
) {
    let grid = plan.grid();
    let tile = plan.view().tile_shape();
    let threads = plan.threads().shape();
    let vector = plan.policy().vector();
    let line_size = plan.line_size();
    let num_lines = plan.layout().size() / line_size as usize;
    let (row_stride, col_stride) = plan.layout().stride();

    let cube_count = CubeCount::Static(grid.rows as u32, grid.cols as u32, 1);
    let cube_dim = CubeDim::new(plan.units_per_tile() as u32, 1, 1);

    log::debug!(
        "Launching {} tiled copy: grid {grid}, {} units per cube, line size {line_size}",
        plan.policy(),
        plan.units_per_tile(),
    );

    unsafe {
        tiled_copy_kernel::launch_unchecked::<E, R>(
            client,
            cube_count,
            cube_dim,
            ArrayArg::from_raw_parts::<E>(input, num_lines, line_size),
            ArrayArg::from_raw_parts::<E>(output, num_lines, line_size),
            ScalarArg::new(row_stride as u32),
            ScalarArg::new(col_stride as u32),
            tile.rows as u32,
            tile.cols as u32,
            threads.rows as u32,
            threads.cols as u32,
            vector.rows as u32,
            vector.cols as u32,
        );
    }
}

/// Upload `input`, copy it tile by tile on the device and read the destination back.
///
/// The readback is the only point where the host waits for the device.
pub fn copy<R: Runtime, E: CubePrimitive + CubeElement>(
    client: &ComputeClient<R::Server, R::Channel>,
    plan: &CopyPlan,
    input: &[E],
) -> Result<Vec<E>, TiledCopyError> {
    let expected = plan.layout().size();
    if input.len() != expected {
        return Err(TiledCopyError::BufferSize {
            expected,
            actual: input.len(),
        });
    }

    let input_handle = client.create(E::as_bytes(input));
    let output_handle = client.empty(expected * core::mem::size_of::<E>());

    launch_ref::<R, E>(client, plan, &input_handle, &output_handle);

    let bytes = client.read_one(output_handle.binding());
    Ok(E::from_bytes(&bytes).to_vec())
}
