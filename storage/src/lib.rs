//! Block Device Layer and Partition Parser (spec.md §4.B, §4.C).
#![no_std]
#![warn(clippy::all)]
#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc)]

pub mod block;
pub mod crc32;
pub mod gpt;
pub mod partition;

pub use block::BlockDevice;
pub use partition::{locate_first_partition, PartitionLocation, PartitionType};
