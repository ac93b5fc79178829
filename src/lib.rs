//! A small, cache-backed FAT16/FAT32 reader (and rudimentary writer) for
//! embedded targets.
//!
//! The medium is reached only through a [`block::BlockDevice`]; the engine
//! itself allocates no heap memory and owns fixed, compile-time-sized pools
//! of cached blocks ([`cache`]) and open file handles ([`fat::file`]).

// Mark the crate as no_std if the feature is enabled (and only)
#![cfg_attr(all(feature = "no_std", not(test)), no_std)]

#[allow(unused_extern_crates)]
extern crate core; // makes rls actually look into the standard library (hack)

#[cfg_attr(target_os = "none", panic_handler)]
#[cfg(target_os = "none")]
fn panic(_info: &core::panic::PanicInfo) -> ! {
    loop {}
}

macro_rules! using_std { ($($i:item)*) => ($(#[cfg(not(feature = "no_std"))]$i)*) }

pub mod block;
pub mod cache;
pub mod error;
pub mod gpt;
pub mod mbr;
pub mod partition;

pub mod fat;

pub mod util;

pub use block::BlockDevice;
pub use error::{Error, FormatError};
pub use fat::{Fd, Volume};
pub use partition::{Partition, PartitionKind};

pub const BLOCK_SIZE: usize = 512;
pub type Block = [u8; BLOCK_SIZE];

/// [`Volume`] sized with the reference implementation's defaults: 2 cached
/// blocks per role, 4 partitions, 4 open files.
pub type DefaultVolume<D> = Volume<D, typenum::consts::U2, typenum::consts::U4, typenum::consts::U4>;
