//! Secure erasure of local block files.

pub mod mock;
pub mod overwrite;
pub mod shred_command;
pub mod traits;

pub use mock::MockEraser;
pub use overwrite::OverwriteEraser;
pub use shred_command::ShredCommand;
pub use traits::{EraseError, SecureEraser};
