//! Distributed filesystem adapter.
//!
//! Block location (`hdfs fsck`), stat and trash-bypassing delete, behind the
//! [`BlockLocator`] and [`FileSystem`] traits.

pub mod command;
pub mod directory;
pub mod fsck;
pub mod mock;
pub mod traits;

pub use command::{is_compatible, HdfsCli};
pub use directory::{DirectoryError, NodeDirectory, NodeEntry};
pub use fsck::{parse_block_line, parse_fsck, replica_path, FsckBlock};
pub use mock::MockHdfs;
pub use traits::{
    BlockLocation, BlockLocator, DeleteError, FileSystem, LocateError, PathKind, ReplicaLocation,
};
