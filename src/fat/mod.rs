//! The public surface: mounting, partition selection, and POSIX-shaped file
//! operations, bound against an explicit, caller-owned [`Volume`] instead of
//! a process-wide singleton.

use generic_array::{ArrayLength, GenericArray};

use crate::block::BlockDevice;
use crate::cache::{Cache, CacheSlot};
use crate::error::{Error, FormatError};
use crate::partition::{Partition, PartitionKind};
use crate::{gpt, mbr, BLOCK_SIZE};

pub mod boot_sector;
pub mod dir;
pub mod file;
pub mod stat;
pub mod table;

pub use dir::Lookup;
pub use file::{oflag, FileHandle, FileInfo, Whence};
pub use stat::Stat;
pub use table::ClusterPos;

/// A file descriptor: an index into [`Volume`]'s handle table.
pub type Fd = usize;

/// A mounted FAT volume: the medium, its partition table, the block caches,
/// and the open-file-handle table.
///
/// `K`, `P`, and `F` are `typenum` compile-time constants controlling the
/// cache-slot count (per role), the partition table size, and the open-file
/// table size; see [`crate`] for the usual defaults (2, 4, 4).
pub struct Volume<D, K, P, F>
where
    D: BlockDevice,
    K: ArrayLength<CacheSlot> + ArrayLength<usize>,
    P: ArrayLength<Partition>,
    F: ArrayLength<FileHandle>,
{
    device: D,
    active_partition: usize,
    partitions: GenericArray<Partition, P>,
    handles: GenericArray<FileHandle, F>,
    data_cache: Cache<K>,
    fat_cache: Cache<K>,
}

impl<D, K, P, F> Volume<D, K, P, F>
where
    D: BlockDevice,
    K: ArrayLength<CacheSlot> + ArrayLength<usize>,
    P: ArrayLength<Partition>,
    F: ArrayLength<FileHandle>,
{
    /// Discovers a partition table (GPT, then MBR, then tableless),
    /// classifies every FAT-undecided candidate, and selects the first
    /// usable FAT16/FAT32 partition as active.
    pub fn mount(mut device: D) -> Result<Self, Error<D::Error>> {
        let mut data_cache: Cache<K> = Cache::new();
        let fat_cache: Cache<K> = Cache::new();
        let mut partitions: GenericArray<Partition, P> = GenericArray::default();

        let has_gpt = gpt::decode(&mut data_cache, &mut device, &mut partitions)?;
        if !has_gpt {
            let has_mbr = mbr::decode(&mut data_cache, &mut device, &mut partitions)?;
            if !has_mbr {
                partitions[0] = Partition {
                    kind: PartitionKind::FatUndecided,
                    first_block: 0,
                    ..Default::default()
                };
            }
        }

        for part in partitions.iter_mut() {
            if part.kind == PartitionKind::FatUndecided {
                boot_sector::classify(&mut data_cache, &mut device, part)?;
            }
        }

        // Prefer the first bootable FAT partition; fall back to the first
        // FAT partition of any kind if none is marked bootable.
        let active_partition = partitions
            .iter()
            .position(|p| p.is_fat() && p.boot)
            .or_else(|| partitions.iter().position(Partition::is_fat))
            .ok_or_else(|| {
                log::debug!("mount: no partition classified as usable FAT16/FAT32");
                Error::Format(FormatError::NoFatPartition)
            })?;

        Ok(Self {
            device,
            active_partition,
            partitions,
            handles: GenericArray::default(),
            data_cache,
            fat_cache,
        })
    }

    /// Flushes both caches and hands the device back to the caller.
    pub fn unmount(mut self) -> Result<D, Error<D::Error>> {
        self.sync()?;
        Ok(self.device)
    }

    /// Switches the active partition. Fails if `idx` is out of range or
    /// names a partition that wasn't classified as FAT16/FAT32.
    pub fn select_partition(&mut self, idx: usize) -> Result<(), Error<D::Error>> {
        let part = self.partitions.get(idx).ok_or(Error::BadArgument)?;
        if !part.is_fat() {
            return Err(Error::BadArgument);
        }
        self.active_partition = idx;
        Ok(())
    }

    /// Flushes every dirty slot in both caches.
    pub fn sync(&mut self) -> Result<(), Error<D::Error>> {
        self.data_cache.sync(&mut self.device)?;
        self.fat_cache.sync(&mut self.device)?;
        Ok(())
    }

    fn handle(&self, fd: Fd) -> Result<&FileHandle, Error<D::Error>> {
        let h = self.handles.get(fd).ok_or(Error::BadArgument)?;
        if !h.open {
            return Err(Error::BadArgument);
        }
        Ok(h)
    }

    fn handle_mut(&mut self, fd: Fd) -> Result<&mut FileHandle, Error<D::Error>> {
        let h = self.handles.get_mut(fd).ok_or(Error::BadArgument)?;
        if !h.open {
            return Err(Error::BadArgument);
        }
        Ok(h)
    }

    /// Resolves `path` against the active partition and allocates a handle.
    /// Requires at least one of `RDONLY`/`WRONLY`; directories and
    /// `CREAT`/missing-file combinations are rejected (creation is out of
    /// scope).
    pub fn open(&mut self, path: &[u8], oflag_bits: u32) -> Result<Fd, Error<D::Error>> {
        if oflag_bits & (oflag::RDONLY | oflag::WRONLY) == 0 {
            return Err(Error::BadArgument);
        }

        let idx = self
            .handles
            .iter()
            .position(|h| !h.open)
            .ok_or(Error::NoResource)?;

        let part_idx = self.active_partition;
        let part = self.partitions[part_idx];

        let result = dir::lookup(
            part_idx,
            &part,
            &mut self.data_cache,
            &mut self.fat_cache,
            &mut self.device,
            path,
        )?;

        match result {
            Lookup::Found { info, is_dir } => {
                if is_dir {
                    return Err(Error::Unsupported);
                }
                self.handles[idx] = FileHandle {
                    open: true,
                    oflag: oflag_bits,
                    offset: 0,
                    info,
                    cursor: ClusterPos::at_cluster(&part, info.first_cluster, 0),
                };
                Ok(idx)
            }
            Lookup::EmptySlot { .. } | Lookup::NotFound => {
                if oflag_bits & oflag::CREAT != 0 {
                    log::debug!("open: creation is not supported");
                    Err(Error::Unsupported)
                } else {
                    Err(Error::NotFound)
                }
            }
        }
    }

    /// Flushes both caches if `fd` was opened writable, then frees it.
    pub fn close(&mut self, fd: Fd) -> Result<(), Error<D::Error>> {
        let writable = self.handle(fd)?.oflag & oflag::WRONLY != 0;
        if writable {
            self.sync()?;
        }
        self.handles[fd] = FileHandle::closed();
        Ok(())
    }

    /// Reads up to `buf.len()` bytes starting at the handle's current
    /// offset. Three phases per the head/middle/tail split: a leading
    /// partial block and a trailing partial block go through the data
    /// cache; whole aligned blocks in between bypass it.
    pub fn read(&mut self, fd: Fd, buf: &mut [u8]) -> Result<usize, Error<D::Error>> {
        let mut h = *self.handle(fd)?;
        if h.oflag & oflag::RDONLY == 0 {
            return Err(Error::BadArgument);
        }

        let remaining = h.info.size.saturating_sub(h.offset);
        let want = (buf.len() as u32).min(remaining) as usize;
        if want == 0 {
            return Ok(0);
        }

        let part = self.partitions[h.info.partition];
        let mut cpos = h.cursor;
        let mut offset = h.offset;
        let mut done = 0usize;

        while done < want {
            let block_no = cpos.block_no();
            let in_block = (offset % BLOCK_SIZE as u32) as usize;
            let chunk = (BLOCK_SIZE - in_block).min(want - done);

            if in_block == 0 && chunk == BLOCK_SIZE {
                let dst: &mut [u8; BLOCK_SIZE] =
                    (&mut buf[done..done + BLOCK_SIZE]).try_into().unwrap();
                self.device.read_block(block_no, dst).map_err(Error::Medium)?;
            } else {
                let slot = self.data_cache.read(&mut self.device, block_no)?;
                buf[done..done + chunk].copy_from_slice(&slot.buf[in_block..in_block + chunk]);
            }

            done += chunk;
            offset += chunk as u32;

            if in_block + chunk == BLOCK_SIZE && done < want {
                if table::is_eoc(cpos.cluster_no) {
                    log::warn!("read: end-of-chain reached with more bytes required");
                    return Err(Error::Format(FormatError::UnexpectedEndOfChain));
                }
                cpos.advance(&part, &mut self.fat_cache, &mut self.device)?;
            }
        }

        h.offset = offset;
        h.cursor = cpos;
        *self.handle_mut(fd)? = h;
        Ok(done)
    }

    /// Reserved write surface: requires `WRONLY`, otherwise always fails
    /// (extending/writing through existing clusters is out of scope).
    pub fn write(&mut self, fd: Fd, _buf: &[u8]) -> Result<usize, Error<D::Error>> {
        let h = self.handle(fd)?;
        if h.oflag & oflag::WRONLY == 0 {
            return Err(Error::BadArgument);
        }
        Err(Error::Unsupported)
    }

    /// Seeks to a new absolute offset. Restarts the cluster walk from the
    /// first cluster when seeking before the handle's current cluster;
    /// otherwise continues forward from it (the chain is singly linked).
    pub fn lseek(&mut self, fd: Fd, off: i64, whence: Whence) -> Result<u64, Error<D::Error>> {
        let mut h = *self.handle(fd)?;

        let base: i64 = match whence {
            Whence::Set => 0,
            Whence::Cur => h.offset as i64,
            Whence::End => h.info.size as i64,
        };
        let target = base.checked_add(off).ok_or(Error::BadArgument)?;
        if target < 0 || target as u64 > h.info.size as u64 {
            return Err(Error::BadArgument);
        }
        let target = target as u32;

        let part = self.partitions[h.info.partition];
        let bytes_per_cluster = part.blocks_per_cluster * BLOCK_SIZE as u32;

        let current_cluster_start = h.offset - (h.offset % bytes_per_cluster);
        let (mut cpos, mut cluster_start) = if target >= current_cluster_start {
            (h.cursor, current_cluster_start)
        } else {
            (ClusterPos::at_cluster(&part, h.info.first_cluster, 0), 0u32)
        };

        while target >= cluster_start + bytes_per_cluster {
            cpos.advance_cluster(&part, &mut self.fat_cache, &mut self.device)?;
            cluster_start += bytes_per_cluster;
        }
        cpos.block_in_cluster = (target - cluster_start) / BLOCK_SIZE as u32;

        h.offset = target;
        h.cursor = cpos;
        *self.handle_mut(fd)? = h;
        Ok(target as u64)
    }

    fn stat_from_info(&mut self, info: &FileInfo) -> Result<Stat, Error<D::Error>> {
        let slot = self.data_cache.read(&mut self.device, info.dir_entry_block)?;
        let off = info.dir_entry_offset as usize;
        let entry: [u8; 32] = slot.buf[off..off + 32].try_into().unwrap();
        Ok(stat::decode(&entry))
    }

    /// Resolves `path` against the active partition and decodes its
    /// directory entry.
    pub fn stat(&mut self, path: &[u8]) -> Result<Stat, Error<D::Error>> {
        let part_idx = self.active_partition;
        let part = self.partitions[part_idx];

        let result = dir::lookup(
            part_idx,
            &part,
            &mut self.data_cache,
            &mut self.fat_cache,
            &mut self.device,
            path,
        )?;

        match result {
            Lookup::Found { info, .. } => self.stat_from_info(&info),
            _ => Err(Error::NotFound),
        }
    }

    /// Decodes the directory entry of an already-open file.
    pub fn fstat(&mut self, fd: Fd) -> Result<Stat, Error<D::Error>> {
        let info = self.handle(fd)?.info;
        self.stat_from_info(&info)
    }

    /// Visits every entry of the directory at `path` (root if empty or
    /// `/`), in on-disk order. `visit` receives the raw 8.3 short name and
    /// the entry's decoded `stat` metadata; `.`/`..` pass through like any
    /// other entry.
    pub fn readdir<V>(&mut self, path: &[u8], visit: V) -> Result<(), Error<D::Error>>
    where
        V: FnMut(&[u8; 11], Stat),
    {
        let part_idx = self.active_partition;
        let part = self.partitions[part_idx];
        let mut visit = visit;

        let found = dir::for_each_entry(
            part_idx,
            &part,
            &mut self.data_cache,
            &mut self.fat_cache,
            &mut self.device,
            path,
            |name, st, _info| visit(name, st),
        )?;

        if !found {
            return Err(Error::NotFound);
        }
        Ok(())
    }
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

    type TestVolume = Volume<RamDisk, U2, U4, U4>;

    /// An MBR image with one FAT16 partition at block 2048 whose root
    /// directory holds a single file, `HELLO.TXT`, containing
    /// `"Hello, world!\n"` (14 bytes) in cluster 2.
    fn build_hello_world_image() -> RamDisk {
        let mut blocks = std::vec![[0u8; BLOCK_SIZE]; 2048 + 64];

        // MBR.
        blocks[0][510] = 0x55;
        blocks[0][511] = 0xAA;
        blocks[0][446] = 0x00;
        blocks[0][446 + 4] = 0x06; // FAT16
        blocks[0][446 + 8..446 + 12].copy_from_slice(&2048u32.to_le_bytes());

        // BPB at block 2048.
        let bpb = &mut blocks[2048];
        bpb[0] = 0xEB;
        bpb[2] = 0x90;
        bpb[510] = 0x55;
        bpb[511] = 0xAA;
        bpb[11..13].copy_from_slice(&512u16.to_le_bytes());
        bpb[13] = 1; // 1 block per cluster
        bpb[14..16].copy_from_slice(&1u16.to_le_bytes()); // 1 reserved block
        bpb[16] = 1; // 1 FAT
        bpb[17..19].copy_from_slice(&16u16.to_le_bytes()); // 16 root entries -> 1 block
        bpb[19..21].copy_from_slice(&4096u16.to_le_bytes()); // total blocks
        bpb[22..24].copy_from_slice(&8u16.to_le_bytes()); // blocks per fat

        // first_data_block = 2048 + 1 (reserved) + 1*8 (fat) + 1 (root dir) = 2058
        // root_dir_block = 2057, cluster 2 -> block 2058.
        let fat_block = 2048 + 1;
        blocks[fat_block][2] = 0xFF; // entry for cluster 1 (unused) EOC-ish filler
        blocks[fat_block][3] = 0xFF;
        blocks[fat_block][4] = 0xFF; // cluster 2 -> EOC
        blocks[fat_block][5] = 0xFF;

        let root_dir_block = 2057;
        let entry = &mut blocks[root_dir_block][0..32];
        entry[0..11].copy_from_slice(b"HELLO   TXT");
        entry[11] = 0x00; // attr: regular file, not read-only
        entry[20..22].copy_from_slice(&0u16.to_le_bytes()); // cluster high
        entry[26..28].copy_from_slice(&2u16.to_le_bytes()); // cluster low
        let content = b"Hello, world!\n";
        entry[28..32].copy_from_slice(&(content.len() as u32).to_le_bytes());

        let data_block = 2058;
        blocks[data_block][0..content.len()].copy_from_slice(content);

        RamDisk { blocks }
    }

    #[test]
    fn mounts_and_reads_a_small_file() {
        let disk = build_hello_world_image();
        let mut vol: TestVolume = Volume::mount(disk).unwrap();

        let fd = vol.open(b"/hello.txt", oflag::RDONLY).unwrap();
        let mut buf = [0u8; 100];
        let n = vol.read(fd, &mut buf).unwrap();
        eq!(n, 14);
        eq!(&buf[0..14], b"Hello, world!\n");

        let n2 = vol.read(fd, &mut buf).unwrap();
        eq!(n2, 0);

        vol.close(fd).unwrap();
    }

    #[test]
    fn stat_reports_size_and_regular_file_mode() {
        let disk = build_hello_world_image();
        let mut vol: TestVolume = Volume::mount(disk).unwrap();

        let st = vol.stat(b"/HELLO.TXT").unwrap();
        eq!(st.st_size, 14);
        eq!(st.st_mode & stat::mode::S_IFREG, stat::mode::S_IFREG);
        eq!(st.st_mode & stat::mode::S_IWUSR, stat::mode::S_IWUSR);
    }

    #[test]
    fn opening_nonexistent_file_fails() {
        let disk = build_hello_world_image();
        let mut vol: TestVolume = Volume::mount(disk).unwrap();
        let err = vol.open(b"/nope.txt", oflag::RDONLY).unwrap_err();
        eq!(err, Error::NotFound);
    }

    #[test]
    fn readdir_visits_the_one_file_in_root() {
        let disk = build_hello_world_image();
        let mut vol: TestVolume = Volume::mount(disk).unwrap();

        let mut seen = std::vec::Vec::new();
        vol.readdir(b"/", |name, st| seen.push((*name, st.st_size)))
            .unwrap();

        eq!(seen.len(), 1);
        eq!(seen[0].0, *b"HELLO   TXT");
        eq!(seen[0].1, 14);
    }

    #[test]
    fn tableless_non_fat_image_fails_to_mount() {
        let blocks = std::vec![[0u8; BLOCK_SIZE]; 16];
        let disk = RamDisk { blocks };
        let result: Result<TestVolume, _> = Volume::mount(disk);
        eq!(result.is_err(), true);
    }
}
