//! GUID Partition Table decoding.
//!
//! Only what's needed to find FAT-capable partitions: the header's entry
//! array location/size, and, per entry, the type GUID, starting LBA, and a
//! locally-used "boot" attribute bit.

use generic_array::{ArrayLength, GenericArray};

use crate::block::BlockDevice;
use crate::cache::Cache;
use crate::error::Error;
use crate::partition::{Partition, PartitionKind};
use crate::BLOCK_SIZE;

pub const SIGNATURE: [u8; 8] = *b"EFI PART";

/// The Microsoft "Basic Data" partition type GUID, in on-disk (mixed-endian)
/// byte order: `EBD0A0A2-B9E5-4433-87C0-68B6B72699C7`.
pub const BASIC_DATA_GUID: [u8; 16] = [
    0xA2, 0xA0, 0xD0, 0xEB, 0xE5, 0xB9, 0x33, 0x44, 0x87, 0xC0, 0x68, 0xB6, 0xB7, 0x26, 0x99, 0xC7,
];

/// Attempts to decode a GPT at block 1 and populate `partitions`. Returns
/// `Ok(true)` if the GPT signature was found (regardless of whether any
/// entry turned out to be FAT-typed); `Ok(false)` if there's no GPT here, so
/// the caller should fall back to MBR.
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
    let header = cache.read(device, 1)?.buf;
    if header[0..8] != SIGNATURE {
        return Ok(false);
    }

    let mut entries_block = u32::from_le_bytes(header[72..76].try_into().unwrap());
    let num_entries = u32::from_le_bytes(header[80..84].try_into().unwrap());
    let entry_size = u32::from_le_bytes(header[84..88].try_into().unwrap()) as usize;

    let count = (num_entries as usize).min(partitions.len());
    let mut entry_offset: usize = 0;
    let mut block: [u8; BLOCK_SIZE] = [0; BLOCK_SIZE];

    for i in 0..count {
        if entry_offset % BLOCK_SIZE == 0 {
            block = cache.read(device, entries_block)?.buf;
            entries_block += 1;
            entry_offset = 0;
        }

        let entry = &block[entry_offset..entry_offset + entry_size.min(BLOCK_SIZE - entry_offset)];
        let first_block = u32::from_le_bytes(entry[32..36].try_into().unwrap());
        let boot = entry[48] & 0x04 != 0; // not the canonical UEFI "bootable" bit; see DESIGN.md

        partitions[i].first_block = first_block;
        partitions[i].boot = boot;
        partitions[i].kind = if entry[0..16] == BASIC_DATA_GUID {
            PartitionKind::FatUndecided
        } else {
            PartitionKind::Unknown
        };

        entry_offset += entry_size;
    }

    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_eq as eq;
    use typenum::consts::{U2, U4};

    extern crate std;
    use std::vec::Vec;

    struct RamDisk {
        blocks: Vec<crate::Block>,
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

    fn build_gpt_image() -> RamDisk {
        let mut blocks = std::vec![[0u8; BLOCK_SIZE]; 4];

        blocks[1][0..8].copy_from_slice(&SIGNATURE);
        blocks[1][72..76].copy_from_slice(&2u32.to_le_bytes()); // entries at block 2
        blocks[1][80..84].copy_from_slice(&1u32.to_le_bytes()); // 1 entry
        blocks[1][84..88].copy_from_slice(&128u32.to_le_bytes()); // 128-byte entries

        blocks[2][0..16].copy_from_slice(&BASIC_DATA_GUID);
        blocks[2][32..36].copy_from_slice(&2048u32.to_le_bytes());
        blocks[2][48] = 0x04;

        RamDisk { blocks }
    }

    #[test]
    fn decodes_basic_data_partition() {
        let mut disk = build_gpt_image();
        let mut cache: Cache<U2> = Cache::new();
        let mut partitions: GenericArray<Partition, U4> = GenericArray::default();

        let found = decode(&mut cache, &mut disk, &mut partitions).unwrap();
        eq!(found, true);
        eq!(partitions[0].kind, PartitionKind::FatUndecided);
        eq!(partitions[0].first_block, 2048);
        eq!(partitions[0].boot, true);
    }

    #[test]
    fn absent_signature_reports_no_gpt() {
        let mut disk = RamDisk {
            blocks: std::vec![[0u8; BLOCK_SIZE]; 4],
        };
        let mut cache: Cache<U2> = Cache::new();
        let mut partitions: GenericArray<Partition, U4> = GenericArray::default();

        eq!(decode(&mut cache, &mut disk, &mut partitions).unwrap(), false);
    }
}
