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

//! The VFS (Virtual FileSystem) aggregates every mounted filesystem into one tree.
//!
//! To manipulate files, this veneer should be used instead of calling the
//! filesystems directly.

pub mod cache;
pub mod mount;
pub mod node;

use crate::file::{fs::ramfs::Ramfs, path};
use alloc::sync::Arc;
use node::{Vnode, VnodeType};
use utils::{errno, errno::EResult};

pub use mount::mount;

/// Initializes the VFS, mounting a fresh ramfs as the root filesystem.
pub(crate) fn init() -> EResult<()> {
	mount(b"/", Ramfs::new())?;
	log::info!("VFS initialized");
	Ok(())
}

/// Resolves `lookup_path` to a vnode.
///
/// The walk consumes the mounted prefix first, then goes component by component
/// through the filesystems' `lookup`. A missing component yields [`ENOENT`].
pub fn lookup(lookup_path: &[u8]) -> EResult<Arc<Vnode>> {
	let (mut vn, consumed) = mount::resolve(lookup_path)?;
	for comp in path::components(lookup_path).skip(consumed) {
		if !vn.is_dir() {
			return Err(errno!(ENOTDIR));
		}
		vn = vn.ops.lookup(&vn, comp).map_err(|_| errno!(ENOENT))?;
	}
	Ok(vn)
}

/// Creates the file at `create_path` with the given type, returning its vnode.
///
/// Missing intermediate directories are created along the way.
pub fn create(create_path: &[u8], vtype: VnodeType) -> EResult<Arc<Vnode>> {
	let (parent_path, name) = path::split(create_path);
	if name.is_empty() {
		return Err(errno!(EINVAL));
	}
	let parent = match lookup(parent_path) {
		Ok(vn) => vn,
		// Create the missing parents, directories all the way down
		Err(e) if e == errno!(ENOENT) => create(parent_path, VnodeType::Directory)?,
		Err(e) => return Err(e),
	};
	if !parent.is_dir() {
		return Err(errno!(ENOTDIR));
	}
	match vtype {
		VnodeType::Directory => parent.ops.mkdir(&parent, name),
		_ => parent.ops.create(&parent, name, vtype),
	}
}

/// Removes the non-directory file at `remove_path`.
pub fn remove(remove_path: &[u8]) -> EResult<()> {
	let (parent_path, name) = path::split(remove_path);
	if name.is_empty() {
		return Err(errno!(EINVAL));
	}
	let parent = lookup(parent_path)?;
	parent.ops.remove(&parent, name)
}

/// Creates the directory at `dir_path`.
pub fn mkdir(dir_path: &[u8]) -> EResult<Arc<Vnode>> {
	let (parent_path, name) = path::split(dir_path);
	if name.is_empty() {
		return Err(errno!(EINVAL));
	}
	let parent = lookup(parent_path)?;
	if !parent.is_dir() {
		return Err(errno!(ENOTDIR));
	}
	parent.ops.mkdir(&parent, name)
}

/// Removes the empty directory at `dir_path`.
pub fn rmdir(dir_path: &[u8]) -> EResult<()> {
	let (parent_path, name) = path::split(dir_path);
	if name.is_empty() {
		return Err(errno!(EINVAL));
	}
	let parent = lookup(parent_path)?;
	parent.ops.rmdir(&parent, name)
}

/// Reads from `vn` at byte offset `off`. See [`cache::read`].
pub fn read(vn: &Vnode, buf: &mut [u8], off: u64) -> EResult<usize> {
	if vn.is_dir() {
		return Err(errno!(EISDIR));
	}
	cache::read(vn, buf, off)
}

/// Writes to `vn` at byte offset `off`. See [`cache::write`].
pub fn write(vn: &Vnode, buf: &[u8], off: u64) -> EResult<usize> {
	if vn.is_dir() {
		return Err(errno!(EISDIR));
	}
	cache::write(vn, buf, off)
}

/// Device-specific control operation on `vn`.
pub fn ioctl(vn: &Vnode, cmd: u64, arg: usize) -> EResult<usize> {
	vn.ops.ioctl(vn, cmd, arg)
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::test_utils;

	#[test]
	fn lookup_create_remove() {
		test_utils::init_kernel();
		create(b"/lcr/a/b", VnodeType::Regular).unwrap();
		// Intermediate directories appeared on the way
		assert!(lookup(b"/lcr").unwrap().is_dir());
		assert!(lookup(b"/lcr/a").unwrap().is_dir());
		let f = lookup(b"/lcr/a/b").unwrap();
		assert_eq!(f.vtype, VnodeType::Regular);
		// Consecutive separators collapse
		assert!(lookup(b"//lcr///a/b").is_ok());
		assert!(lookup(b"/lcr/missing").is_err());
		remove(b"/lcr/a/b").unwrap();
		assert!(lookup(b"/lcr/a/b").is_err());
	}

	#[test]
	fn read_write_roundtrip() {
		test_utils::init_kernel();
		let f = create(b"/rw_file", VnodeType::Regular).unwrap();
		assert_eq!(f.size(), 0);
		assert_eq!(write(&f, b"hello world", 0).unwrap(), 11);
		assert_eq!(f.size(), 11);
		let mut buf = [0u8; 32];
		assert_eq!(read(&f, &mut buf, 0).unwrap(), 11);
		assert_eq!(&buf[..11], b"hello world");
		// Reads clamp at end of file
		assert_eq!(read(&f, &mut buf, 6).unwrap(), 5);
		assert_eq!(&buf[..5], b"world");
		assert_eq!(read(&f, &mut buf, 11).unwrap(), 0);
	}

	#[test]
	fn write_is_idempotent_on_size() {
		test_utils::init_kernel();
		let f = create(b"/idem", VnodeType::Regular).unwrap();
		write(&f, b"abcdef", 0).unwrap();
		let size = f.size();
		// Re-writing the same bytes at the same offset must not grow the file
		let mut buf = [0u8; 6];
		read(&f, &mut buf, 0).unwrap();
		write(&f, &buf, 0).unwrap();
		assert_eq!(f.size(), size);
	}

	#[test]
	fn sparse_offsets() {
		test_utils::init_kernel();
		let f = create(b"/sparse", VnodeType::Regular).unwrap();
		// Write crossing a page boundary at a non-aligned offset
		write(&f, b"XY", 4095).unwrap();
		assert_eq!(f.size(), 4097);
		let mut buf = [0u8; 4];
		assert_eq!(read(&f, &mut buf, 4094).unwrap(), 3);
		assert_eq!(&buf[..3], b"\0XY");
	}

	#[test]
	fn dirty_tracking() {
		use utils::collections::xarray::XA_MARK_0;
		test_utils::init_kernel();
		let f = create(b"/dirty", node::VnodeType::Regular).unwrap();
		write(&f, b"x", 0).unwrap();
		write(&f, b"y", 4096).unwrap();
		{
			let c = f.cache.lock();
			assert!(c.get_mark(0, XA_MARK_0));
			assert!(c.get_mark(1, XA_MARK_0));
		}
		// Reading does not dirty anything further, syncing clears the marks
		let mut buf = [0u8; 1];
		read(&f, &mut buf, 0).unwrap();
		cache::sync(&f).unwrap();
		let c = f.cache.lock();
		assert!(c.find_next_marked(0, u64::MAX, XA_MARK_0).is_none());
	}

	#[test]
	fn dirs() {
		test_utils::init_kernel();
		mkdir(b"/dirs").unwrap();
		mkdir(b"/dirs/sub").unwrap();
		assert!(mkdir(b"/dirs/sub").is_err());
		// Removing a non-empty directory fails
		create(b"/dirs/sub/f", VnodeType::Regular).unwrap();
		assert!(rmdir(b"/dirs/sub").is_err());
		remove(b"/dirs/sub/f").unwrap();
		rmdir(b"/dirs/sub").unwrap();
		assert!(lookup(b"/dirs/sub").is_err());
		// Dot components resolve through the filesystem lookup
		assert!(lookup(b"/dirs/.").unwrap().is_dir());
		assert!(lookup(b"/dirs/..").is_ok());
	}
}
