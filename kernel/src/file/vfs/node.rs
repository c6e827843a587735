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

//! Vnodes, the abstract filesystem nodes.
//!
//! A [`Vnode`] couples the filesystem-independent state (type, size, page cache) with
//! a [`VnodeOps`] implementation provided by the concrete filesystem. The reference
//! count is the `Arc` holding it: when the last reference drops, the ops object is
//! dropped with the node, which is the filesystem's destroy hook.

use crate::{memory::cache::RcFrame, sync::IntSpin};
use alloc::{boxed::Box, sync::Arc, vec::Vec};
use core::{
	fmt,
	sync::atomic::{
		AtomicU64,
		Ordering::{Acquire, Release},
	},
};
use utils::{collections::xarray::XArray, errno, errno::EResult};

/// The type of a vnode.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum VnodeType {
	/// Regular file.
	Regular,
	/// Directory.
	Directory,
	/// Block device.
	Block,
	/// Character device.
	Char,
	/// Symbolic link.
	Link,
	/// Unix socket.
	Socket,
}

/// A directory entry, as returned by `readdir`.
#[derive(Clone, Debug)]
pub struct Dirent {
	/// The entry's name.
	pub name: Vec<u8>,
	/// The entry's type.
	pub vtype: VnodeType,
}

/// Filesystem-specific vnode operations.
///
/// `read` and `write` are the *raw* operations against the backing store; regular I/O
/// goes through the page cache veneer instead. Operations a filesystem does not
/// support fall back to [`ENOTSUP`].
pub trait VnodeOps: Send + Sync {
	/// Reads from the backing store into `buf` at byte offset `off`.
	///
	/// Returns the number of bytes read; the caller zero-fills the rest.
	fn read(&self, vn: &Vnode, buf: &mut [u8], off: u64) -> EResult<usize> {
		let (_, _, _) = (vn, buf, off);
		Err(errno!(ENOTSUP))
	}

	/// Writes `buf` to the backing store at byte offset `off`.
	fn write(&self, vn: &Vnode, buf: &[u8], off: u64) -> EResult<usize> {
		let (_, _, _) = (vn, buf, off);
		Err(errno!(ENOTSUP))
	}

	/// Looks up the child `name` of the directory `vn`.
	fn lookup(&self, vn: &Arc<Vnode>, name: &[u8]) -> EResult<Arc<Vnode>> {
		let (_, _) = (vn, name);
		Err(errno!(ENOTSUP))
	}

	/// Creates the child `name` of type `vtype` in the directory `vn`.
	fn create(&self, vn: &Arc<Vnode>, name: &[u8], vtype: VnodeType) -> EResult<Arc<Vnode>> {
		let (_, _, _) = (vn, name, vtype);
		Err(errno!(ENOTSUP))
	}

	/// Removes the non-directory child `name` from the directory `vn`.
	fn remove(&self, vn: &Vnode, name: &[u8]) -> EResult<()> {
		let (_, _) = (vn, name);
		Err(errno!(ENOTSUP))
	}

	/// Creates the child directory `name` in the directory `vn`.
	fn mkdir(&self, vn: &Arc<Vnode>, name: &[u8]) -> EResult<Arc<Vnode>> {
		self.create(vn, name, VnodeType::Directory)
	}

	/// Removes the empty child directory `name` from the directory `vn`.
	fn rmdir(&self, vn: &Vnode, name: &[u8]) -> EResult<()> {
		let (_, _) = (vn, name);
		Err(errno!(ENOTSUP))
	}

	/// Lists the entries of the directory `vn`.
	fn readdir(&self, vn: &Vnode) -> EResult<Vec<Dirent>> {
		let _ = vn;
		Err(errno!(ENOTSUP))
	}

	/// Device-specific control operation.
	fn ioctl(&self, vn: &Vnode, cmd: u64, arg: usize) -> EResult<usize> {
		let (_, _, _) = (vn, cmd, arg);
		Err(errno!(ETTY))
	}
}

/// An abstract filesystem node.
pub struct Vnode {
	/// The node's name.
	pub name: Vec<u8>,
	/// The node's type.
	pub vtype: VnodeType,
	/// The node's size in bytes.
	size: AtomicU64,
	/// Filesystem-specific operations and state.
	pub ops: Box<dyn VnodeOps>,
	/// The page cache, keyed by page index. Mark 0 flags dirty pages.
	pub(crate) cache: IntSpin<XArray<RcFrame>>,
}

impl Vnode {
	/// Creates a node.
	pub fn new(name: Vec<u8>, vtype: VnodeType, ops: Box<dyn VnodeOps>) -> Arc<Self> {
		Arc::new(Self {
			name,
			vtype,
			size: AtomicU64::new(0),
			ops,
			cache: IntSpin::new(XArray::new()),
		})
	}

	/// Returns the size of the node's content in bytes.
	#[inline]
	pub fn size(&self) -> u64 {
		self.size.load(Acquire)
	}

	/// Sets the size of the node's content.
	pub fn set_size(&self, size: u64) {
		self.size.store(size, Release);
	}

	/// Tells whether the node is a directory.
	#[inline]
	pub fn is_dir(&self) -> bool {
		self.vtype == VnodeType::Directory
	}
}

impl fmt::Debug for Vnode {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Vnode")
			.field("name", &self.name)
			.field("vtype", &self.vtype)
			.field("size", &self.size())
			.finish()
	}
}
