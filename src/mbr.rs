//! Master Boot Record decoding.
//!
//! The teacher crate only ever speaks GPT; this mirrors its byte-offset
//! decoding style for the MBR fallback described in the reference
//! implementation's `_mfat_decode_mbr`.

use generic_array::{ArrayLength, GenericArray};

use crate::block::BlockDevice;
use crate::cache::Cache;
use crate::error::Error;
use crate::partition::{Partition, PartitionKind};

/// Partition-type bytes recognized as FAT by the reference implementation.
const FAT_PARTITION_IDS: [u8; 5] = [0x04, 0x06, 0x0B, 0x0C, 0x0E];

/// Decodes the four primary MBR entries at block 0. Returns `Ok(true)` iff
/// at least one entry is FAT-typed.
pub fn decode<D, K, P>(
    cache: &mut Cache<K>,
    device: &mut D,
    partitions: &mut GenericArray<Partition, P>,
) -> Result<bool, Error<D::Error>>
where
    D: BlockDevice,
    K: ArrayLength<crate::cache::CacheSlot> + ArrayLength<usize>,
    P: ArrayLength<Partition>,
{
    let buf = cache.read(device, 0)?.buf;
    if buf[510] != 0x55 || buf[511] != 0xAA {
        return Ok(false);
    }

    let mut found = false;
    let count = 4.min(partitions.len());

    for i in 0..count {
        let off = 446 + 16 * i;
        let entry = &buf[off..off + 16];

        partitions[i].boot = entry[0] & 0x80 != 0;
        partitions[i].first_block = u32::from_le_bytes(entry[8..12].try_into().unwrap());
        partitions[i].kind = if FAT_PARTITION_IDS.contains(&entry[4]) {
            found = true;
            PartitionKind::FatUndecided
        } else {
            PartitionKind::Unknown
        };
    }

    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_eq as eq;
    use typenum::consts::{U2, U4};

    extern crate std;

    struct RamDisk {
        blocks: std::vec::Vec<crate::Block>,
    }

    impl BlockDevice for RamDisk {
        type Error = ();

        fn read_block(&mut self, blk_no: u32, buf: &mut crate::Block) -> Result<(), ()> {
            buf.copy_from_slice(&self.blocks[blk_no as usize]);
            Ok(())
        }

        fn write_block(&mut self, blk_no: u32, buf: &crate::Block) -> Result<(), ()> {
            self.blocks[blk_no as usize].copy_from_slice(buf);
            Ok(())
        }
    }

    fn build_mbr_image() -> RamDisk {
        let mut blocks = std::vec![[0u8; crate::BLOCK_SIZE]; 4];
        blocks[0][510] = 0x55;
        blocks[0][511] = 0xAA;

        let entry0 = 446;
        blocks[0][entry0] = 0x80; // boot flag
        blocks[0][entry0 + 4] = 0x0B; // FAT32 w/ CHS
        blocks[0][entry0 + 8..entry0 + 12].copy_from_slice(&2048u32.to_le_bytes());

        RamDisk { blocks }
    }

    #[test]
    fn decodes_boot_fat_partition() {
        let mut disk = build_mbr_image();
        let mut cache: Cache<U2> = Cache::new();
        let mut partitions: GenericArray<Partition, U4> = GenericArray::default();

        eq!(decode(&mut cache, &mut disk, &mut partitions).unwrap(), true);
        eq!(partitions[0].kind, PartitionKind::FatUndecided);
        eq!(partitions[0].boot, true);
        eq!(partitions[0].first_block, 2048);
        eq!(partitions[1].kind, PartitionKind::Unknown);
    }

    #[test]
    fn missing_signature_reports_no_mbr() {
        let mut disk = RamDisk {
            blocks: std::vec![[0u8; crate::BLOCK_SIZE]; 4],
        };
        let mut cache: Cache<U2> = Cache::new();
        let mut partitions: GenericArray<Partition, U4> = GenericArray::default();

        eq!(decode(&mut cache, &mut disk, &mut partitions).unwrap(), false);
    }
}
