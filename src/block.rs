//! The entire boundary to the storage medium.
//!
//! Implementors provide raw, fixed-size block access; the rest of the crate
//! never touches a medium except through this trait.

use crate::Block;

/// A block-addressable medium, 512 bytes per block.
///
/// This generalizes the reference implementation's two free-standing
/// `blkread`/`blkwrite` callbacks into a trait with a single implementation
/// per medium (see [`CallbackDevice`] for callers that would rather keep the
/// literal closure-pair shape).
pub trait BlockDevice {
    type Error: core::fmt::Debug;

    /// Fills `buf` with the contents of block `blk_no`.
    fn read_block(&mut self, blk_no: u32, buf: &mut Block) -> Result<(), Self::Error>;

    /// Persists `buf` as block `blk_no`.
    fn write_block(&mut self, blk_no: u32, buf: &Block) -> Result<(), Self::Error>;
}

/// Adapts a pair of closures plus an opaque context value into a
/// [`BlockDevice`], for callers mounting against the literal
/// `read(blk_no, buf, ctx)` / `write(blk_no, buf, ctx)` contract.
pub struct CallbackDevice<R, W, C> {
    read: R,
    write: W,
    pub ctx: C,
}

impl<R, W, C> CallbackDevice<R, W, C>
where
    R: FnMut(u32, &mut Block, &mut C) -> Result<(), ()>,
    W: FnMut(u32, &Block, &mut C) -> Result<(), ()>,
{
    pub fn new(read: R, write: W, ctx: C) -> Self {
        Self { read, write, ctx }
    }
}

impl<R, W, C> BlockDevice for CallbackDevice<R, W, C>
where
    R: FnMut(u32, &mut Block, &mut C) -> Result<(), ()>,
    W: FnMut(u32, &Block, &mut C) -> Result<(), ()>,
{
    type Error = ();

    fn read_block(&mut self, blk_no: u32, buf: &mut Block) -> Result<(), ()> {
        (self.read)(blk_no, buf, &mut self.ctx)
    }

    fn write_block(&mut self, blk_no: u32, buf: &Block) -> Result<(), ()> {
        (self.write)(blk_no, buf, &mut self.ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_eq as eq;

    #[test]
    fn callback_device_roundtrips_through_closures() {
        let mut medium = [[0u8; 512]; 4];
        let mut device = {
            let read = |blk: u32, buf: &mut Block, ctx: &mut [[u8; 512]; 4]| {
                buf.copy_from_slice(&ctx[blk as usize]);
                Ok(())
            };
            let write = |blk: u32, buf: &Block, ctx: &mut [[u8; 512]; 4]| {
                ctx[blk as usize].copy_from_slice(buf);
                Ok(())
            };
            CallbackDevice::new(read, write, medium)
        };

        let mut out = [0u8; 512];
        let mut payload = [0u8; 512];
        payload[0] = 0xAB;

        device.write_block(2, &payload).unwrap();
        device.read_block(2, &mut out).unwrap();
        eq!(out, payload);

        medium = device.ctx;
        eq!(medium[2][0], 0xAB);
    }
}
