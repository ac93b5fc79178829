//! 8.3 short-name canonicalization and the directory walker / file resolver.

use generic_array::ArrayLength;

use super::file::FileInfo;
use super::stat::{self, Stat};
use super::table::ClusterPos;
use crate::block::BlockDevice;
use crate::cache::Cache;
use crate::error::Error;
use crate::partition::{Partition, PartitionKind};
use crate::util::Bits;
use crate::BLOCK_SIZE;

pub mod attr {
    pub const READ_ONLY: u8 = 0x01;
    pub const DIRECTORY: u8 = 0x10;

    pub const READ_ONLY_BIT: u32 = 0;
    pub const DIRECTORY_BIT: u32 = 4;
}

/// An 11-byte 8.3 short name (no dot), space-padded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShortName(pub [u8; 11]);

fn canonicalize_char(c: u8) -> u8 {
    match c {
        b'A'..=b'Z'
        | b'0'..=b'9'
        | b'$'
        | b'%'
        | b'-'
        | b'_'
        | b'@'
        | b'~'
        | b'`'
        | b'!'
        | b'('
        | b')'
        | b'{'
        | b'}'
        | b'^'
        | b'#'
        | b'&' => c,
        b'a'..=b'z' => c - b'a' + b'A',
        _ => b'!',
    }
}

/// Extracts one canonicalized path component starting at byte `start`,
/// skipping any components that canonicalize to all-spaces (`""`, `"."`,
/// `"./"`). Returns the component and, if more of the path remains, the
/// offset of the next component.
pub fn extract_component(path: &[u8], mut start: usize) -> (ShortName, Option<usize>) {
    loop {
        let mut pos = start;
        let mut buf = [b' '; 11];
        let mut npos = 0usize;
        let mut terminator;

        loop {
            let c = path.get(pos).copied().unwrap_or(0);
            pos += 1;
            if c == 0 || c == b'.' || c == b'/' || c == b'\\' {
                terminator = c;
                break;
            }
            if npos < 8 {
                buf[npos] = canonicalize_char(c);
                npos += 1;
            }
        }
        while npos < 8 {
            buf[npos] = b' ';
            npos += 1;
        }

        if terminator == b'.' {
            loop {
                let c = path.get(pos).copied().unwrap_or(0);
                pos += 1;
                if c == 0 || c == b'/' || c == b'\\' {
                    terminator = c;
                    break;
                }
                if npos < 11 {
                    buf[npos] = canonicalize_char(c);
                    npos += 1;
                }
            }
        }
        while npos < 11 {
            buf[npos] = b' ';
            npos += 1;
        }

        let more = path.get(pos).copied().unwrap_or(0) != 0;
        let next = if (terminator == b'/' || terminator == b'\\') && more {
            Some(pos)
        } else {
            None
        };

        if buf == [b' '; 11] {
            match next {
                Some(n) => {
                    start = n;
                    continue;
                }
                None => return (ShortName(buf), None),
            }
        }

        return (ShortName(buf), next);
    }
}

/// The outcome of resolving one path's final component against a directory.
pub enum Lookup {
    Found { info: FileInfo, is_dir: bool },
    /// First byte `0x00`/`0xE5` at the matched slot; kept distinct from
    /// `NotFound` for contract fidelity (see DESIGN.md) even though, as in
    /// the reference implementation, a canonicalized name can never
    /// actually equal such a slot.
    EmptySlot { dir_entry_block: u32, dir_entry_offset: u32 },
    NotFound,
}

fn root_position(part: &Partition) -> (ClusterPos, u32) {
    if part.kind == PartitionKind::Fat32 {
        (ClusterPos::at_cluster(part, part.root_dir_cluster, 0), u32::MAX)
    } else {
        (ClusterPos::fat16_root(part), part.blocks_in_root_dir)
    }
}

/// Walks `path` (already split on `/`/`\` by [`extract_component`]) from the
/// root of `part`, descending into subdirectories as needed.
pub fn lookup<D, K>(
    partition_idx: usize,
    part: &Partition,
    data_cache: &mut Cache<K>,
    fat_cache: &mut Cache<K>,
    device: &mut D,
    path: &[u8],
) -> Result<Lookup, Error<D::Error>>
where
    D: BlockDevice,
    K: ArrayLength<crate::cache::CacheSlot> + ArrayLength<usize>,
{
    let (mut cpos, mut blocks_left) = root_position(part);

    let mut path_pos = Some(0usize);
    let mut result = Lookup::NotFound;

    while let Some(pp) = path_pos {
        let (name, next) = extract_component(path, pp);
        let is_interior = next.is_some();
        path_pos = next;

        let mut found: Option<(u32, u32, [u8; 32])> = None;
        let mut exhausted = false;

        while found.is_none() && !exhausted && blocks_left > 0 {
            let block_no = cpos.block_no();
            let buf = data_cache.read(device, block_no)?.buf;

            for off in (0..BLOCK_SIZE).step_by(32) {
                let entry = &buf[off..off + 32];
                if entry[0] == 0x00 {
                    exhausted = true;
                    break;
                }
                if entry[0..11] == name.0 {
                    found = Some((block_no, off as u32, entry.try_into().unwrap()));
                    break;
                }
            }

            if found.is_none() && !exhausted {
                blocks_left -= 1;
                if blocks_left == 0 {
                    break;
                }
                if cpos.cluster_no != 0 {
                    cpos.advance(part, fat_cache, device)?;
                } else {
                    cpos.block_in_cluster += 1;
                }
            }
        }

        let (blk, off, entry_bytes) = match found {
            Some(v) => v,
            None => {
                return Ok(Lookup::NotFound);
            }
        };

        let entry_attr = entry_bytes[11];
        if is_interior {
            if !entry_attr.bit(attr::DIRECTORY_BIT) {
                return Ok(Lookup::NotFound);
            }
            let hi = u16::from_le_bytes(entry_bytes[20..22].try_into().unwrap());
            let lo = u16::from_le_bytes(entry_bytes[26..28].try_into().unwrap());
            let child_cluster = ((hi as u32) << 16) | lo as u32;
            cpos = ClusterPos::at_cluster(part, child_cluster, 0);
            blocks_left = u32::MAX;
        } else {
            let first_byte = entry_bytes[0];
            result = if first_byte == 0x00 || first_byte == 0xE5 {
                Lookup::EmptySlot {
                    dir_entry_block: blk,
                    dir_entry_offset: off,
                }
            } else {
                let size = u32::from_le_bytes(entry_bytes[28..32].try_into().unwrap());
                let hi = u16::from_le_bytes(entry_bytes[20..22].try_into().unwrap());
                let lo = u16::from_le_bytes(entry_bytes[26..28].try_into().unwrap());
                let first_cluster = ((hi as u32) << 16) | lo as u32;
                Lookup::Found {
                    info: FileInfo {
                        partition: partition_idx,
                        size,
                        first_cluster,
                        dir_entry_block: blk,
                        dir_entry_offset: off,
                    },
                    is_dir: entry_attr.bit(attr::DIRECTORY_BIT),
                }
            };
        }
    }

    Ok(result)
}

/// Descends through every component of `path` (root if empty/`"/"`),
/// requiring each to be a directory. Returns `None` if any component is
/// missing or not a directory.
fn resolve_dir<D, K>(
    part: &Partition,
    data_cache: &mut Cache<K>,
    fat_cache: &mut Cache<K>,
    device: &mut D,
    path: &[u8],
) -> Result<Option<(ClusterPos, u32)>, Error<D::Error>>
where
    D: BlockDevice,
    K: ArrayLength<crate::cache::CacheSlot> + ArrayLength<usize>,
{
    let (mut cpos, mut blocks_left) = root_position(part);
    let mut path_pos = if path.is_empty() { None } else { Some(0usize) };

    while let Some(pp) = path_pos {
        let (name, next) = extract_component(path, pp);
        path_pos = next;
        if name.0 == [b' '; 11] {
            continue;
        }

        let mut found: Option<(u8, u16, u16)> = None;
        let mut exhausted = false;

        while found.is_none() && !exhausted && blocks_left > 0 {
            let block_no = cpos.block_no();
            let buf = data_cache.read(device, block_no)?.buf;

            for off in (0..BLOCK_SIZE).step_by(32) {
                let entry = &buf[off..off + 32];
                if entry[0] == 0x00 {
                    exhausted = true;
                    break;
                }
                if entry[0..11] == name.0 {
                    let hi = u16::from_le_bytes(entry[20..22].try_into().unwrap());
                    let lo = u16::from_le_bytes(entry[26..28].try_into().unwrap());
                    found = Some((entry[11], hi, lo));
                    break;
                }
            }

            if found.is_none() && !exhausted {
                blocks_left -= 1;
                if blocks_left == 0 {
                    break;
                }
                if cpos.cluster_no != 0 {
                    cpos.advance(part, fat_cache, device)?;
                } else {
                    cpos.block_in_cluster += 1;
                }
            }
        }

        let (entry_attr, hi, lo) = match found {
            Some(v) => v,
            None => return Ok(None),
        };
        if !entry_attr.bit(attr::DIRECTORY_BIT) {
            return Ok(None);
        }
        let child_cluster = ((hi as u32) << 16) | lo as u32;
        cpos = ClusterPos::at_cluster(part, child_cluster, 0);
        blocks_left = u32::MAX;
    }

    Ok(Some((cpos, blocks_left)))
}

/// Visits every valid entry (skipping deleted `0xE5` slots and opaque
/// long-name `0x0F` entries) of the directory named by `path`, in on-disk
/// order. Returns `false` if `path` doesn't resolve to a directory.
pub fn for_each_entry<D, K, V>(
    partition_idx: usize,
    part: &Partition,
    data_cache: &mut Cache<K>,
    fat_cache: &mut Cache<K>,
    device: &mut D,
    path: &[u8],
    mut visit: V,
) -> Result<bool, Error<D::Error>>
where
    D: BlockDevice,
    K: ArrayLength<crate::cache::CacheSlot> + ArrayLength<usize>,
    V: FnMut(&[u8; 11], Stat, FileInfo),
{
    let (mut cpos, mut blocks_left) = match resolve_dir(part, data_cache, fat_cache, device, path)? {
        Some(v) => v,
        None => return Ok(false),
    };

    while blocks_left > 0 {
        let block_no = cpos.block_no();
        let buf = data_cache.read(device, block_no)?.buf;
        let mut exhausted = false;

        for off in (0..BLOCK_SIZE).step_by(32) {
            let entry_bytes: [u8; 32] = buf[off..off + 32].try_into().unwrap();
            let first = entry_bytes[0];
            if first == 0x00 {
                exhausted = true;
                break;
            }
            let entry_attr = entry_bytes[11];
            if first == 0xE5 || entry_attr == 0x0F {
                continue;
            }

            let name: [u8; 11] = entry_bytes[0..11].try_into().unwrap();
            let size = u32::from_le_bytes(entry_bytes[28..32].try_into().unwrap());
            let hi = u16::from_le_bytes(entry_bytes[20..22].try_into().unwrap());
            let lo = u16::from_le_bytes(entry_bytes[26..28].try_into().unwrap());
            let first_cluster = ((hi as u32) << 16) | lo as u32;

            visit(
                &name,
                stat::decode(&entry_bytes),
                FileInfo {
                    partition: partition_idx,
                    size,
                    first_cluster,
                    dir_entry_block: block_no,
                    dir_entry_offset: off as u32,
                },
            );
        }

        if exhausted {
            break;
        }
        blocks_left -= 1;
        if blocks_left == 0 {
            break;
        }
        if cpos.cluster_no != 0 {
            cpos.advance(part, fat_cache, device)?;
        } else {
            cpos.block_in_cluster += 1;
        }
    }

    Ok(true)
}
