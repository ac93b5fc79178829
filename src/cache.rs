//! The block cache: a small fixed pool of slots with an LRU eviction order
//! and a write-back-on-evict invariant.

use generic_array::{ArrayLength, GenericArray};

use crate::block::BlockDevice;
use crate::error::Error;
use crate::Block;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    Invalid,
    Valid,
    Dirty,
}

impl Default for CacheState {
    fn default() -> Self {
        CacheState::Invalid
    }
}

#[derive(Clone, Copy)]
pub struct CacheSlot {
    pub state: CacheState,
    pub blk_no: u32,
    pub buf: Block,
}

impl Default for CacheSlot {
    fn default() -> Self {
        Self {
            state: CacheState::Invalid,
            blk_no: 0,
            buf: [0u8; crate::BLOCK_SIZE],
        }
    }
}

/// A fixed pool of `K` cache slots plus an LRU ordering vector (index 0 is
/// most-recently-used).
pub struct Cache<K: ArrayLength<CacheSlot> + ArrayLength<usize>> {
    slots: GenericArray<CacheSlot, K>,
    order: GenericArray<usize, K>,
}

impl<K: ArrayLength<CacheSlot> + ArrayLength<usize>> Cache<K> {
    pub fn new() -> Self {
        let mut order: GenericArray<usize, K> = GenericArray::default();
        for (i, slot) in order.iter_mut().enumerate() {
            *slot = i;
        }
        Self {
            slots: GenericArray::default(),
            order,
        }
    }

    /// Finds (or evicts a slot for) `blk_no`, flushing a dirty victim first,
    /// and promotes the winning slot to the front of the LRU order.
    ///
    /// Mirrors `_mfat_get_cached_block`: the LRU tail is the default victim,
    /// overridden by a direct hit if one exists in the scan.
    fn get<D: BlockDevice>(&mut self, device: &mut D, blk_no: u32) -> Result<usize, Error<D::Error>> {
        let k = self.order.len();
        let mut slot_idx = self.order[k - 1];

        for &idx in self.order.iter() {
            let slot = &self.slots[idx];
            if slot.state != CacheState::Invalid && slot.blk_no == blk_no {
                slot_idx = idx;
                break;
            }
        }

        // Promote slot_idx to the front, preserving the relative order of
        // everything else.
        let mut prev = slot_idx;
        for entry in self.order.iter_mut() {
            let this = *entry;
            *entry = prev;
            if this == slot_idx {
                break;
            }
            prev = this;
        }

        let slot = &mut self.slots[slot_idx];
        if slot.blk_no != blk_no {
            if slot.state == CacheState::Dirty {
                if let Err(e) = device.write_block(slot.blk_no, &slot.buf) {
                    log::warn!("cache: failed to flush block {} on eviction", slot.blk_no);
                    return Err(Error::Medium(e));
                }
            }
            slot.blk_no = blk_no;
            slot.state = CacheState::Invalid;
        }

        Ok(slot_idx)
    }

    /// Reads `blk_no` through the cache, fetching it from the device on a
    /// miss.
    pub fn read<D: BlockDevice>(
        &mut self,
        device: &mut D,
        blk_no: u32,
    ) -> Result<&CacheSlot, Error<D::Error>> {
        let idx = self.get(device, blk_no)?;
        if self.slots[idx].state == CacheState::Invalid {
            device
                .read_block(blk_no, &mut self.slots[idx].buf)
                .map_err(Error::Medium)?;
            self.slots[idx].state = CacheState::Valid;
        }
        Ok(&self.slots[idx])
    }

    /// Marks the cached copy of `blk_no` dirty, fetching it first if it
    /// isn't already resident. Returns a mutable view of the slot's buffer
    /// for the caller to modify in place.
    pub fn write<D: BlockDevice>(
        &mut self,
        device: &mut D,
        blk_no: u32,
    ) -> Result<&mut Block, Error<D::Error>> {
        let idx = self.get(device, blk_no)?;
        if self.slots[idx].state == CacheState::Invalid {
            device
                .read_block(blk_no, &mut self.slots[idx].buf)
                .map_err(Error::Medium)?;
        }
        self.slots[idx].state = CacheState::Dirty;
        Ok(&mut self.slots[idx].buf)
    }

    /// Flushes every dirty slot back to the device.
    pub fn sync<D: BlockDevice>(&mut self, device: &mut D) -> Result<(), Error<D::Error>> {
        for slot in self.slots.iter_mut() {
            if slot.state == CacheState::Dirty {
                device
                    .write_block(slot.blk_no, &slot.buf)
                    .map_err(|e| {
                        log::warn!("cache: sync failed to flush block {}", slot.blk_no);
                        Error::Medium(e)
                    })?;
                slot.state = CacheState::Valid;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_eq as eq;
    use typenum::consts::U2;

    struct RamDisk {
        blocks: std::vec::Vec<Block>,
    }

    extern crate std;

    impl RamDisk {
        fn new(n: usize) -> Self {
            Self {
                blocks: std::vec![[0u8; crate::BLOCK_SIZE]; n],
            }
        }
    }

    impl BlockDevice for RamDisk {
        type Error = ();

        fn read_block(&mut self, blk_no: u32, buf: &mut Block) -> Result<(), ()> {
            buf.copy_from_slice(&self.blocks[blk_no as usize]);
            Ok(())
        }

        fn write_block(&mut self, blk_no: u32, buf: &Block) -> Result<(), ()> {
            self.blocks[blk_no as usize].copy_from_slice(buf);
            Ok(())
        }
    }

    #[test]
    fn read_miss_then_hit_does_not_refetch() {
        let mut disk = RamDisk::new(8);
        disk.blocks[3][0] = 42;

        let mut cache: Cache<U2> = Cache::new();
        let slot = cache.read(&mut disk, 3).unwrap();
        eq!(slot.buf[0], 42);

        disk.blocks[3][0] = 99; // changed on "medium", cache should still show 42
        let slot = cache.read(&mut disk, 3).unwrap();
        eq!(slot.buf[0], 42);
    }

    #[test]
    fn eviction_flushes_dirty_victim() {
        let mut disk = RamDisk::new(8);
        let mut cache: Cache<U2> = Cache::new();

        cache.write(&mut disk, 0).unwrap()[0] = 1;
        cache.write(&mut disk, 1).unwrap()[0] = 2;
        // Both slots are now dirty and resident (0, 1); reading block 2
        // must evict one of them, flushing it first.
        cache.read(&mut disk, 2).unwrap();

        let total: u8 = disk.blocks[0][0] + disk.blocks[1][0];
        eq!(total, 1 + 2);
    }

    #[test]
    fn sync_flushes_all_dirty_slots() {
        let mut disk = RamDisk::new(8);
        let mut cache: Cache<U2> = Cache::new();

        cache.write(&mut disk, 0).unwrap()[0] = 7;
        cache.write(&mut disk, 1).unwrap()[1] = 8;
        cache.sync(&mut disk).unwrap();

        eq!(disk.blocks[0][0], 7);
        eq!(disk.blocks[1][1], 8);
    }
}
