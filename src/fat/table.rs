//! Cluster-chain traversal: FAT entry decode, end-of-chain detection, and
//! the ephemeral cluster-position cursor used by the directory walker and
//! file read/lseek paths.

use generic_array::ArrayLength;

use crate::block::BlockDevice;
use crate::cache::Cache;
use crate::error::{Error, FormatError};
use crate::partition::{Partition, PartitionKind};
use crate::BLOCK_SIZE;

pub const END_OF_CHAIN_MIN: u32 = 0x0FFF_FFF8;
pub const BAD_CLUSTER: u32 = 0x0FFF_FFF7;
pub const FREE_CLUSTER: u32 = 0x0000_0000;

pub fn is_eoc(cluster: u32) -> bool {
    cluster >= END_OF_CHAIN_MIN
}

pub fn first_block_of_cluster(part: &Partition, cluster: u32) -> u32 {
    part.first_data_block + (cluster - 2) * part.blocks_per_cluster
}

/// Follows the FAT to find the cluster after `cur`, using the FAT-role
/// cache. Rejects `FREE`/`BAD` entries as corruption.
pub fn next_cluster<D, K>(
    part: &Partition,
    fat_cache: &mut Cache<K>,
    device: &mut D,
    cur: u32,
) -> Result<u32, Error<D::Error>>
where
    D: BlockDevice,
    K: ArrayLength<crate::cache::CacheSlot> + ArrayLength<usize>,
{
    let fat32 = part.kind == PartitionKind::Fat32;
    let entry_size: u32 = if fat32 { 4 } else { 2 };

    let fat_offset = entry_size * cur;
    let fat_block = part.first_block + part.num_reserved_blocks + fat_offset / BLOCK_SIZE as u32;
    let in_block = (fat_offset % BLOCK_SIZE as u32) as usize;

    let buf = fat_cache.read(device, fat_block)?.buf;

    let next = if fat32 {
        u32::from_le_bytes(buf[in_block..in_block + 4].try_into().unwrap()) & 0x0FFF_FFFF
    } else {
        let v = u16::from_le_bytes(buf[in_block..in_block + 2].try_into().unwrap()) as u32;
        if v >= 0xFFF7 {
            v | 0x0FFF_0000
        } else {
            v
        }
    };

    if next == FREE_CLUSTER || next == BAD_CLUSTER {
        log::warn!("table: corrupt cluster entry for cluster {}", cur);
        return Err(Error::Format(FormatError::CorruptCluster));
    }

    Ok(next)
}

/// A position within a cluster chain (or, for `cluster_no == 0`, the
/// synthetic FAT16-root-directory position).
#[derive(Debug, Clone, Copy, Default)]
pub struct ClusterPos {
    pub cluster_no: u32,
    pub block_in_cluster: u32,
    pub cluster_start_blk: u32,
}

impl ClusterPos {
    pub fn at_cluster(part: &Partition, cluster_no: u32, byte_offset: u32) -> Self {
        let bytes_per_cluster = part.blocks_per_cluster * BLOCK_SIZE as u32;
        Self {
            cluster_no,
            block_in_cluster: (byte_offset % bytes_per_cluster) / BLOCK_SIZE as u32,
            cluster_start_blk: first_block_of_cluster(part, cluster_no),
        }
    }

    pub fn fat16_root(part: &Partition) -> Self {
        Self {
            cluster_no: 0,
            block_in_cluster: 0,
            cluster_start_blk: part.root_dir_block,
        }
    }

    pub fn block_no(&self) -> u32 {
        self.cluster_start_blk + self.block_in_cluster
    }

    /// Advances by one block, crossing into the next cluster (via the FAT)
    /// when `blocks_per_cluster` is exhausted. Must not be called on a
    /// FAT16-root position (`cluster_no == 0`); use plain block increment
    /// there instead, bounded by the root directory's block budget.
    pub fn advance<D, K>(
        &mut self,
        part: &Partition,
        fat_cache: &mut Cache<K>,
        device: &mut D,
    ) -> Result<(), Error<D::Error>>
    where
        D: BlockDevice,
        K: ArrayLength<crate::cache::CacheSlot> + ArrayLength<usize>,
    {
        debug_assert_ne!(self.cluster_no, 0);
        self.block_in_cluster += 1;
        if self.block_in_cluster == part.blocks_per_cluster {
            if is_eoc(self.cluster_no) {
                return Err(Error::Format(FormatError::UnexpectedEndOfChain));
            }
            let next = next_cluster(part, fat_cache, device, self.cluster_no)?;
            self.cluster_no = next;
            self.cluster_start_blk = first_block_of_cluster(part, next);
            self.block_in_cluster = 0;
        }
        Ok(())
    }

    /// Advances straight to the next cluster in the chain (crossing via the
    /// FAT unconditionally), resetting `block_in_cluster` to 0. For callers
    /// that skip whole clusters at a time (e.g. `lseek`'s cluster-skip
    /// loop); `advance` only crosses clusters once `blocks_per_cluster`
    /// blocks have been consumed, so it takes `blocks_per_cluster` calls to
    /// do what one call here does.
    pub fn advance_cluster<D, K>(
        &mut self,
        part: &Partition,
        fat_cache: &mut Cache<K>,
        device: &mut D,
    ) -> Result<(), Error<D::Error>>
    where
        D: BlockDevice,
        K: ArrayLength<crate::cache::CacheSlot> + ArrayLength<usize>,
    {
        debug_assert_ne!(self.cluster_no, 0);
        if is_eoc(self.cluster_no) {
            return Err(Error::Format(FormatError::UnexpectedEndOfChain));
        }
        let next = next_cluster(part, fat_cache, device, self.cluster_no)?;
        self.cluster_no = next;
        self.cluster_start_blk = first_block_of_cluster(part, next);
        self.block_in_cluster = 0;
        Ok(())
    }
}
