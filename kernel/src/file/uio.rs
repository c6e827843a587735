/*
 * Copyright 2025 The Petrel developers
 *
 * This file is part of Petrel.
 *
 * Petrel is free software: you can redistribute it and/or modify it under the
 * terms of the GNU General Public License as published by the Free Software
 * Foundation, either version 3 of the License, or (at your option) any later
 * version.
 *
 * Petrel is distributed in the hope that it will be useful, but WITHOUT ANY
 * WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR
 * A PARTICULAR PURPOSE. See the GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License along with
 * Petrel. If not, see <https://www.gnu.org/licenses/>.
 */

//! Vectored I/O descriptors.
//!
//! A [`Uio`] describes one read or write against an open file: the scatter/gather
//! buffer list, the file offset and the remaining byte count. It is the canonical
//! argument of the file operations, so the same code path serves both plain and
//! vectored variants.

use crate::{
	memory::{user, VirtAddr},
	process::mem_space::AddrSpace,
};
use core::slice;
use utils::{errno, errno::EResult, limits::IOV_MAX};

/// Direction of the operation.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum UioDir {
	/// From the file to the buffers.
	Read,
	/// From the buffers to the file.
	Write,
}

/// One buffer of the scatter/gather list.
#[derive(Clone, Copy, Debug)]
pub struct UioBuf {
	/// Base address of the buffer.
	pub base: VirtAddr,
	/// Length of the buffer in bytes.
	pub len: usize,
}

/// The address space the buffers live in.
#[derive(Clone, Copy)]
pub enum UioSpace<'a> {
	/// Kernel buffers, accessed directly.
	Kernel,
	/// Userspace buffers of the given address space.
	User(&'a AddrSpace),
}

/// A vectored I/O operation in progress.
pub struct Uio<'a> {
	/// Direction of the operation.
	pub dir: UioDir,
	/// The scatter/gather list.
	bufs: &'a [UioBuf],
	/// Index of the buffer being consumed.
	cur: usize,
	/// Progress within that buffer.
	cur_off: usize,
	/// Offset in the target object.
	pub offset: u64,
	/// Bytes left to transfer.
	pub resid: usize,
	/// Where the buffers live.
	space: UioSpace<'a>,
}

impl<'a> Uio<'a> {
	/// Creates a descriptor over the given buffer list.
	pub fn new(dir: UioDir, bufs: &'a [UioBuf], offset: u64, space: UioSpace<'a>) -> EResult<Self> {
		if bufs.len() > IOV_MAX {
			return Err(errno!(EINVAL));
		}
		let resid = bufs
			.iter()
			.try_fold(0usize, |acc, b| acc.checked_add(b.len))
			.ok_or(errno!(EINVAL))?;
		Ok(Self {
			dir,
			bufs,
			cur: 0,
			cur_off: 0,
			offset,
			resid,
			space,
		})
	}

	/// Returns the next non-empty buffer chunk, capped to `max` bytes.
	fn next_chunk(&mut self, max: usize) -> Option<(VirtAddr, usize)> {
		while let Some(buf) = self.bufs.get(self.cur) {
			let left = buf.len - self.cur_off;
			if left == 0 {
				self.cur += 1;
				self.cur_off = 0;
				continue;
			}
			let len = left.min(max);
			return Some((buf.base + self.cur_off, len));
		}
		None
	}

	/// Records that `len` bytes of the current buffer were transferred.
	fn advance(&mut self, len: usize) {
		self.cur_off += len;
		self.offset += len as u64;
		self.resid -= len;
	}

	/// Moves bytes from `src` into the buffers, advancing the descriptor.
	///
	/// Returns the number of bytes moved, which is short only when the buffers are
	/// exhausted.
	pub fn move_out(&mut self, src: &[u8]) -> EResult<usize> {
		debug_assert_eq!(self.dir, UioDir::Read);
		let mut done = 0;
		while done < src.len() {
			let Some((addr, len)) = self.next_chunk(src.len() - done) else {
				break;
			};
			let chunk = &src[done..(done + len)];
			match self.space {
				UioSpace::Kernel => {
					let dst = unsafe { slice::from_raw_parts_mut(addr.as_ptr(), len) };
					dst.copy_from_slice(chunk);
				}
				UioSpace::User(space) => user::copy_to_user(space, addr, chunk)?,
			}
			self.advance(len);
			done += len;
		}
		Ok(done)
	}

	/// Moves bytes from the buffers into `dst`, advancing the descriptor.
	///
	/// Returns the number of bytes moved, which is short only when the buffers are
	/// exhausted.
	pub fn move_in(&mut self, dst: &mut [u8]) -> EResult<usize> {
		debug_assert_eq!(self.dir, UioDir::Write);
		let mut done = 0;
		while done < dst.len() {
			let Some((addr, len)) = self.next_chunk(dst.len() - done) else {
				break;
			};
			let chunk = &mut dst[done..(done + len)];
			match self.space {
				UioSpace::Kernel => {
					let src = unsafe { slice::from_raw_parts(addr.as_ptr::<u8>(), len) };
					chunk.copy_from_slice(src);
				}
				UioSpace::User(space) => user::copy_from_user(space, addr, chunk)?,
			}
			self.advance(len);
			done += len;
		}
		Ok(done)
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn scatter_gather() {
		let mut a = [0u8; 3];
		let mut b = [0u8; 5];
		let bufs = [
			UioBuf {
				base: VirtAddr::from(a.as_mut_ptr()),
				len: a.len(),
			},
			UioBuf {
				base: VirtAddr::from(b.as_mut_ptr()),
				len: b.len(),
			},
		];
		let mut uio = Uio::new(UioDir::Read, &bufs, 0, UioSpace::Kernel).unwrap();
		assert_eq!(uio.resid, 8);
		assert_eq!(uio.move_out(b"hello wo").unwrap(), 8);
		assert_eq!(uio.resid, 0);
		assert_eq!(uio.offset, 8);
		assert_eq!(&a, b"hel");
		assert_eq!(&b, b"lo wo");
		// Exhausted buffers take nothing more
		assert_eq!(uio.move_out(b"x").unwrap(), 0);
	}

	#[test]
	fn gather_write() {
		let a = *b"ab";
		let b = *b"cde";
		let bufs = [
			UioBuf {
				base: VirtAddr::from(a.as_ptr()),
				len: a.len(),
			},
			UioBuf {
				base: VirtAddr::from(b.as_ptr()),
				len: b.len(),
			},
		];
		let mut uio = Uio::new(UioDir::Write, &bufs, 10, UioSpace::Kernel).unwrap();
		let mut out = [0u8; 5];
		assert_eq!(uio.move_in(&mut out).unwrap(), 5);
		assert_eq!(&out, b"abcde");
		assert_eq!(uio.offset, 15);
	}
}
