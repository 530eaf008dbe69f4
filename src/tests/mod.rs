pub mod tiled_copy;
