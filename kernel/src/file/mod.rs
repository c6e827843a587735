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

//! Open files.
//!
//! A [`File`] is one open-file description: the backing vnode, the open flags and the
//! current offset. File descriptors of one or several processes reference it; it
//! closes when the last reference drops.

pub mod fd;
pub mod path;
pub mod uio;
pub mod vfs;

pub mod fs;

use crate::sync::IntSpin;
use alloc::sync::Arc;
use core::fmt;
use uio::{Uio, UioDir};
use utils::{errno, errno::EResult, limits::PAGE_SIZE};
use vfs::{cache, node::Vnode, node::VnodeType};

/// Open flag: read-only access.
pub const O_RDONLY: u32 = 0x0;
/// Open flag: write-only access.
pub const O_WRONLY: u32 = 0x1;
/// Open flag: read-write access.
pub const O_RDWR: u32 = 0x2;
/// Open flag: execute-only access.
pub const O_EXEC: u32 = 0x3;
/// Open flag: search-only access (directories).
pub const O_SEARCH: u32 = 0x4;
/// Mask of the access mode in the open flags.
pub const O_ACCMODE: u32 = 0x7;

/// Open flag: create the file if missing.
pub const O_CREAT: u32 = 0x8;
/// Open flag: with `O_CREAT`, fail if the file exists.
pub const O_EXCL: u32 = 0x10;
/// Open flag: truncate the file on open.
pub const O_TRUNC: u32 = 0x20;
/// Open flag: fail if the file is not a directory.
pub const O_DIRECTORY: u32 = 0x40;
/// Open flag: do not follow a trailing symbolic link.
pub const O_NOFOLLOW: u32 = 0x80;
/// Open flag: close the descriptor across `execve`.
pub const O_CLOEXEC: u32 = 0x400;
/// Open flag: every write appends to the end of the file.
pub const O_APPEND: u32 = 0x1000;
/// Open flag: non-blocking I/O.
pub const O_NONBLOCK: u32 = 0x2000;

/// Seek relative to the beginning of the file.
pub const SEEK_SET: u32 = 0x0;
/// Seek relative to the current offset.
pub const SEEK_CUR: u32 = 0x1;
/// Seek relative to the end of the file.
pub const SEEK_END: u32 = 0x2;
/// Seek to the next hole at or after the offset.
pub const SEEK_HOLE: u32 = 0x4;
/// Seek to the next data at or after the offset.
pub const SEEK_DATA: u32 = 0x8;

/// Operations of an open file.
///
/// Every implementation consumes [`Uio`] descriptors so the same entry points serve
/// plain and vectored I/O.
pub trait FileOps: Send + Sync {
	/// Reads from the file into the descriptor's buffers, advancing the file offset.
	fn read(&self, file: &File, uio: &mut Uio) -> EResult<usize>;
	/// Writes the descriptor's buffers to the file, advancing the file offset.
	fn write(&self, file: &File, uio: &mut Uio) -> EResult<usize>;
	/// Repositions the file offset, returning the new value.
	fn seek(&self, file: &File, off: i64, whence: u32) -> EResult<u64>;
	/// Device-specific control operation.
	fn ioctl(&self, file: &File, cmd: u64, arg: usize) -> EResult<usize> {
		vfs::ioctl(&file.vnode, cmd, arg)
	}
	/// Polls the file for readiness. Regular files are always ready.
	fn poll(&self, file: &File, events: u32) -> EResult<u32> {
		let _ = file;
		Ok(events)
	}
	/// Called when the last reference to the file drops.
	fn close(&self, file: &File) -> EResult<()> {
		let _ = file;
		Ok(())
	}
}

/// An open-file description.
pub struct File {
	/// The operation table.
	ops: &'static dyn FileOps,
	/// The backing vnode. The file holds a strong reference to it.
	vnode: Arc<Vnode>,
	/// The open flags.
	pub flags: u32,
	/// The current offset, shared by every descriptor referencing this description.
	offset: IntSpin<u64>,
}

impl File {
	/// Opens `vnode` with the given flags.
	pub fn open_vnode(vnode: Arc<Vnode>, flags: u32) -> EResult<Arc<Self>> {
		if flags & O_DIRECTORY != 0 && !vnode.is_dir() {
			return Err(errno!(ENOTDIR));
		}
		if flags & O_TRUNC != 0 && vnode.vtype == VnodeType::Regular {
			cache::truncate(&vnode, 0);
		}
		Ok(Arc::new(Self {
			ops: &VNODE_FILE_OPS,
			vnode,
			flags,
			offset: IntSpin::new(0),
		}))
	}

	/// Returns the backing vnode.
	#[inline]
	pub fn vnode(&self) -> &Arc<Vnode> {
		&self.vnode
	}

	/// Returns the current file offset.
	pub fn offset(&self) -> u64 {
		*self.offset.lock()
	}

	/// Tells whether the access mode allows reading.
	fn readable(&self) -> bool {
		matches!(self.flags & O_ACCMODE, O_RDONLY | O_RDWR)
	}

	/// Tells whether the access mode allows writing.
	fn writable(&self) -> bool {
		matches!(self.flags & O_ACCMODE, O_WRONLY | O_RDWR)
	}

	/// Reads from the file at its current offset, advancing it by the bytes read.
	pub fn read(&self, uio: &mut Uio) -> EResult<usize> {
		self.ops.read(self, uio)
	}

	/// Writes to the file at its current offset, advancing it by the bytes written.
	pub fn write(&self, uio: &mut Uio) -> EResult<usize> {
		self.ops.write(self, uio)
	}

	/// Repositions the file offset.
	pub fn seek(&self, off: i64, whence: u32) -> EResult<u64> {
		self.ops.seek(self, off, whence)
	}

	/// Device-specific control operation.
	pub fn ioctl(&self, cmd: u64, arg: usize) -> EResult<usize> {
		self.ops.ioctl(self, cmd, arg)
	}
}

impl Drop for File {
	fn drop(&mut self) {
		// This is the close hook: the last reference is gone
		let _ = self.ops.close(self);
	}
}

impl fmt::Debug for File {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("File")
			.field("vnode", &self.vnode)
			.field("flags", &self.flags)
			.field("offset", &self.offset())
			.finish()
	}
}

/// File operations over a vnode, routed through the page cache.
struct VnodeFileOps;

static VNODE_FILE_OPS: VnodeFileOps = VnodeFileOps;

impl FileOps for VnodeFileOps {
	fn read(&self, file: &File, uio: &mut Uio) -> EResult<usize> {
		if !file.readable() {
			return Err(errno!(EBADF));
		}
		let vn = &file.vnode;
		if vn.is_dir() {
			return Err(errno!(EISDIR));
		}
		let size = vn.size();
		let mut done = 0;
		while uio.resid > 0 && uio.offset < size {
			let index = uio.offset / PAGE_SIZE as u64;
			let page_off = (uio.offset % PAGE_SIZE as u64) as usize;
			let chunk = (PAGE_SIZE - page_off)
				.min(uio.resid)
				.min((size - uio.offset) as usize);
			let frame = cache::get_page(vn, index, false)?;
			let n = uio.move_out(&frame.slice()[page_off..(page_off + chunk)])?;
			done += n;
			if n < chunk {
				break;
			}
		}
		*file.offset.lock() = uio.offset;
		Ok(done)
	}

	fn write(&self, file: &File, uio: &mut Uio) -> EResult<usize> {
		if !file.writable() {
			return Err(errno!(EBADF));
		}
		let vn = &file.vnode;
		if vn.is_dir() {
			return Err(errno!(EISDIR));
		}
		if file.flags & O_APPEND != 0 {
			uio.offset = vn.size();
		}
		let mut done = 0;
		while uio.resid > 0 {
			let index = uio.offset / PAGE_SIZE as u64;
			let page_off = (uio.offset % PAGE_SIZE as u64) as usize;
			let chunk = (PAGE_SIZE - page_off).min(uio.resid);
			let whole = chunk == PAGE_SIZE;
			let frame = cache::get_page(vn, index, whole)?;
			let n = uio.move_in(unsafe {
				&mut frame.slice_mut()[page_off..(page_off + chunk)]
			})?;
			vn.cache.lock().set_mark(index, utils::collections::xarray::XA_MARK_0);
			done += n;
			if uio.offset > vn.size() {
				vn.set_size(uio.offset);
			}
			if n < chunk {
				break;
			}
		}
		*file.offset.lock() = uio.offset;
		Ok(done)
	}

	fn seek(&self, file: &File, off: i64, whence: u32) -> EResult<u64> {
		let size = file.vnode.size();
		let mut offset = file.offset.lock();
		let base = match whence {
			SEEK_SET => 0,
			SEEK_CUR => *offset as i64,
			SEEK_END => size as i64,
			// The cache is dense: the only hole is at end of file
			SEEK_HOLE => {
				if off as u64 > size {
					return Err(errno!(EINVAL));
				}
				*offset = size;
				return Ok(size);
			}
			SEEK_DATA => {
				if off as u64 >= size {
					return Err(errno!(EINVAL));
				}
				*offset = off as u64;
				return Ok(*offset);
			}
			_ => return Err(errno!(EINVAL)),
		};
		let new = base.checked_add(off).ok_or(errno!(EOVERFLOW))?;
		if new < 0 {
			return Err(errno!(EINVAL));
		}
		*offset = new as u64;
		Ok(*offset)
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::test_utils;
	use uio::{UioBuf, UioSpace};
	use crate::memory::VirtAddr;

	fn kernel_uio<'a>(dir: UioDir, bufs: &'a [UioBuf], offset: u64) -> Uio<'a> {
		Uio::new(dir, bufs, offset, UioSpace::Kernel).unwrap()
	}

	#[test]
	fn file_read_write_offset() {
		test_utils::init_kernel();
		let vn = vfs::create(b"/file_rw", vfs::node::VnodeType::Regular).unwrap();
		let file = File::open_vnode(vn, O_RDWR).unwrap();
		let data = *b"abcdef";
		let bufs = [UioBuf {
			base: VirtAddr::from(data.as_ptr()),
			len: data.len(),
		}];
		let mut uio = kernel_uio(UioDir::Write, &bufs, file.offset());
		assert_eq!(file.write(&mut uio).unwrap(), 6);
		assert_eq!(file.offset(), 6);
		// Read back from the start
		let mut out = [0u8; 6];
		let bufs = [UioBuf {
			base: VirtAddr::from(out.as_mut_ptr()),
			len: out.len(),
		}];
		let mut uio = kernel_uio(UioDir::Read, &bufs, 0);
		assert_eq!(file.read(&mut uio).unwrap(), 6);
		assert_eq!(&out, b"abcdef");
	}

	#[test]
	fn file_access_mode() {
		test_utils::init_kernel();
		let vn = vfs::create(b"/file_mode", vfs::node::VnodeType::Regular).unwrap();
		let file = File::open_vnode(vn, O_RDONLY).unwrap();
		let data = [0u8; 4];
		let bufs = [UioBuf {
			base: VirtAddr::from(data.as_ptr()),
			len: data.len(),
		}];
		let mut uio = kernel_uio(UioDir::Write, &bufs, 0);
		assert!(file.write(&mut uio).is_err());
	}

	#[test]
	fn file_append() {
		test_utils::init_kernel();
		let vn = vfs::create(b"/file_append", vfs::node::VnodeType::Regular).unwrap();
		vfs::write(&vn, b"base", 0).unwrap();
		let file = File::open_vnode(vn.clone(), O_WRONLY | O_APPEND).unwrap();
		let data = *b"+tail";
		let bufs = [UioBuf {
			base: VirtAddr::from(data.as_ptr()),
			len: data.len(),
		}];
		// The offset in the descriptor is ignored under O_APPEND
		let mut uio = kernel_uio(UioDir::Write, &bufs, 0);
		file.write(&mut uio).unwrap();
		let mut out = [0u8; 9];
		vfs::read(&vn, &mut out, 0).unwrap();
		assert_eq!(&out, b"base+tail");
	}

	#[test]
	fn file_seek() {
		test_utils::init_kernel();
		let vn = vfs::create(b"/file_seek", vfs::node::VnodeType::Regular).unwrap();
		vfs::write(&vn, b"0123456789", 0).unwrap();
		let file = File::open_vnode(vn, O_RDWR).unwrap();
		assert_eq!(file.seek(4, SEEK_SET).unwrap(), 4);
		assert_eq!(file.seek(2, SEEK_CUR).unwrap(), 6);
		assert_eq!(file.seek(-1, SEEK_END).unwrap(), 9);
		assert!(file.seek(-1, SEEK_SET).is_err());
		assert_eq!(file.seek(3, SEEK_DATA).unwrap(), 3);
		assert_eq!(file.seek(0, SEEK_HOLE).unwrap(), 10);
		assert!(file.seek(11, SEEK_DATA).is_err());
	}

	#[test]
	fn file_trunc_on_open() {
		test_utils::init_kernel();
		let vn = vfs::create(b"/file_trunc", vfs::node::VnodeType::Regular).unwrap();
		vfs::write(&vn, b"content", 0).unwrap();
		let _file = File::open_vnode(vn.clone(), O_WRONLY | O_TRUNC).unwrap();
		assert_eq!(vn.size(), 0);
		let mut buf = [0u8; 8];
		assert_eq!(vfs::read(&vn, &mut buf, 0).unwrap(), 0);
	}
}
