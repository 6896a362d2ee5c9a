//! Command pools and primary command buffers used by the frame synchronizer.
//!
//! Every frame slot owns one primary command buffer allocated from a [`CommandPool`](command_pool::CommandPool)
//! created with `RESET_COMMAND_BUFFER`, so buffers can be re-recorded individually once their slot's fence signaled.

pub mod command_pool;
