//! BPB field extraction and FAT12/16/32 classification.
//!
//! Majority of the field docs here are sourced from
//! [this page](https://en.wikipedia.org/wiki/Design_of_the_FAT_file_system).

use crate::block::BlockDevice;
use crate::cache::Cache;
use crate::error::Error;
use crate::partition::{Partition, PartitionKind};
use crate::BLOCK_SIZE;
use generic_array::ArrayLength;

macro_rules! e {
    ($ty:tt, $buf:expr, $offset:literal) => {
        $ty::from_le_bytes($buf[$offset..($offset + core::mem::size_of::<$ty>())].try_into().unwrap())
    };
}

fn is_valid_bpb(buf: &[u8; BLOCK_SIZE]) -> bool {
    if buf[510] != 0x55 || buf[511] != 0xAA {
        return false;
    }
    if !(buf[0] == 0xE9 || (buf[0] == 0xEB && buf[2] == 0x90)) {
        return false;
    }
    let bytes_per_sector: u16 = e!(u16, buf, 11);
    bytes_per_sector == 512
}

/// Reads the first block of `part` (a [`PartitionKind::FatUndecided`]
/// candidate), validates its BPB, and classifies/fills in the remaining
/// geometry fields. On rejection (invalid BPB, non-512 sector size, or
/// FAT12), `part.kind` is reset to [`PartitionKind::Unknown`] and `Ok(())`
/// is returned — rejection of one candidate partition is not itself fatal
/// to the caller's partition-table scan.
pub fn classify<D, K>(
    cache: &mut Cache<K>,
    device: &mut D,
    part: &mut Partition,
) -> Result<(), Error<D::Error>>
where
    D: BlockDevice,
    K: ArrayLength<crate::cache::CacheSlot> + ArrayLength<usize>,
{
    let buf = cache.read(device, part.first_block)?.buf;

    if !is_valid_bpb(&buf) {
        log::debug!("bpb: partition at block {} rejected: invalid BPB", part.first_block);
        part.kind = PartitionKind::Unknown;
        return Ok(());
    }

    let blocks_per_cluster: u32 = e!(u8, buf, 13) as u32;
    let num_reserved_blocks: u32 = e!(u16, buf, 14) as u32;
    let num_fats: u32 = e!(u8, buf, 16) as u32;
    let root_ent_cnt: u32 = e!(u16, buf, 17) as u32;

    let num_blocks_16: u16 = e!(u16, buf, 19);
    let num_blocks_32: u32 = e!(u32, buf, 32);
    let num_blocks = if num_blocks_16 != 0 {
        num_blocks_16 as u32
    } else {
        num_blocks_32
    };

    let blocks_per_fat_16: u16 = e!(u16, buf, 22);
    let blocks_per_fat_32: u32 = e!(u32, buf, 36);
    let blocks_per_fat = if blocks_per_fat_16 != 0 {
        blocks_per_fat_16 as u32
    } else {
        blocks_per_fat_32
    };

    let blocks_in_root_dir = (root_ent_cnt * 32 + (BLOCK_SIZE as u32 - 1)) / BLOCK_SIZE as u32;

    let reserved_and_fats = num_reserved_blocks + num_fats * blocks_per_fat + blocks_in_root_dir;
    let data_blocks = num_blocks.saturating_sub(reserved_and_fats);
    let count_of_clusters = if blocks_per_cluster != 0 {
        data_blocks / blocks_per_cluster
    } else {
        0
    };

    let kind = if count_of_clusters < 4085 {
        None // FAT12, unsupported
    } else if count_of_clusters < 65525 {
        Some(PartitionKind::Fat16)
    } else {
        Some(PartitionKind::Fat32)
    };

    let kind = match kind {
        Some(k) => k,
        None => {
            log::debug!("bpb: partition at block {} classified FAT12, rejecting", part.first_block);
            part.kind = PartitionKind::Unknown;
            return Ok(());
        }
    };

    part.num_blocks = num_blocks;
    part.blocks_per_cluster = blocks_per_cluster;
    part.blocks_per_fat = blocks_per_fat;
    part.num_fats = num_fats;
    part.num_reserved_blocks = num_reserved_blocks;
    part.num_clusters = count_of_clusters;
    part.first_data_block = part.first_block + reserved_and_fats;

    match kind {
        PartitionKind::Fat16 => {
            part.blocks_in_root_dir = blocks_in_root_dir;
            part.root_dir_block = part.first_data_block - blocks_in_root_dir;
        }
        PartitionKind::Fat32 => {
            part.blocks_in_root_dir = 0;
            part.root_dir_cluster = e!(u32, buf, 44);
        }
        _ => unreachable!(),
    }

    log::debug!("bpb: partition at block {} classified {:?}", part.first_block, kind);
    part.kind = kind;

    Ok(())
}
