pub mod buffer_manager;
mod clock_replacer;

/// Position of a buffer inside the pool
type PoolPos = usize;
