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

//! In-memory filesystem.
//!
//! Directories keep their entries in a plain list. Regular files have no backing
//! store at all: their content lives entirely in the vnode's page cache, so the raw
//! read operation exposes a file of zeros and the raw write is a no-op.

use super::Filesystem;
use crate::{
	file::vfs::node::{Dirent, Vnode, VnodeOps, VnodeType},
	sync::IntSpin,
};
use alloc::{
	boxed::Box,
	sync::{Arc, Weak},
	vec::Vec,
};
use utils::{errno, errno::EResult, limits::NAME_MAX};

/// The ramfs instance.
pub struct Ramfs {
	root: Arc<Vnode>,
}

impl Ramfs {
	/// Creates a fresh, empty filesystem.
	pub fn new() -> Arc<dyn Filesystem> {
		let root = Vnode::new(
			Vec::new(),
			VnodeType::Directory,
			Box::new(RamfsDir {
				parent: Weak::new(),
				children: IntSpin::new(Vec::new()),
			}),
		);
		Arc::new(Self {
			root,
		})
	}
}

impl Filesystem for Ramfs {
	fn name(&self) -> &[u8] {
		b"ramfs"
	}

	fn root(&self) -> Arc<Vnode> {
		self.root.clone()
	}
}

/// Checks a name to be created.
fn check_name(name: &[u8]) -> EResult<()> {
	if name.is_empty() || name.len() > NAME_MAX || name == b"." || name == b".." {
		return Err(errno!(EINVAL));
	}
	if name.contains(&b'/') {
		return Err(errno!(EINVAL));
	}
	Ok(())
}

/// Directory node state.
struct RamfsDir {
	/// The parent directory. Empty for the filesystem root.
	parent: Weak<Vnode>,
	/// The directory's entries.
	children: IntSpin<Vec<(Vec<u8>, Arc<Vnode>)>>,
}

impl VnodeOps for RamfsDir {
	fn lookup(&self, vn: &Arc<Vnode>, name: &[u8]) -> EResult<Arc<Vnode>> {
		match name {
			b"." => Ok(vn.clone()),
			// At the root, `..` resolves to the root itself
			b".." => Ok(self.parent.upgrade().unwrap_or_else(|| vn.clone())),
			_ => {
				let children = self.children.lock();
				children
					.iter()
					.find(|(n, _)| n == name)
					.map(|(_, vn)| vn.clone())
					.ok_or(errno!(ENOENT))
			}
		}
	}

	fn create(&self, vn: &Arc<Vnode>, name: &[u8], vtype: VnodeType) -> EResult<Arc<Vnode>> {
		check_name(name)?;
		let ops: Box<dyn VnodeOps> = match vtype {
			VnodeType::Regular => Box::new(RamfsFile),
			VnodeType::Directory => Box::new(RamfsDir {
				parent: Arc::downgrade(vn),
				children: IntSpin::new(Vec::new()),
			}),
			_ => return Err(errno!(ENOTSUP)),
		};
		let mut children = self.children.lock();
		if children.iter().any(|(n, _)| n == name) {
			return Err(errno!(EEXIST));
		}
		let child = Vnode::new(name.into(), vtype, ops);
		children.push((name.into(), child.clone()));
		Ok(child)
	}

	fn remove(&self, _vn: &Vnode, name: &[u8]) -> EResult<()> {
		let mut children = self.children.lock();
		let i = children
			.iter()
			.position(|(n, _)| n == name)
			.ok_or(errno!(ENOENT))?;
		if children[i].1.is_dir() {
			return Err(errno!(EISDIR));
		}
		children.remove(i);
		Ok(())
	}

	fn rmdir(&self, _vn: &Vnode, name: &[u8]) -> EResult<()> {
		let mut children = self.children.lock();
		let i = children
			.iter()
			.position(|(n, _)| n == name)
			.ok_or(errno!(ENOENT))?;
		let dir = &children[i].1;
		if !dir.is_dir() {
			return Err(errno!(ENOTDIR));
		}
		// The ops object of a ramfs directory is always RamfsDir, but the trait object
		// does not know: check emptiness through readdir
		let empty = dir.ops.readdir(dir)?.is_empty();
		if !empty {
			return Err(errno!(ENOTEMPTY));
		}
		children.remove(i);
		Ok(())
	}

	fn readdir(&self, _vn: &Vnode) -> EResult<Vec<Dirent>> {
		let children = self.children.lock();
		Ok(children
			.iter()
			.map(|(name, vn)| Dirent {
				name: name.clone(),
				vtype: vn.vtype,
			})
			.collect())
	}
}

/// Regular file node state.
struct RamfsFile;

impl VnodeOps for RamfsFile {
	fn read(&self, _vn: &Vnode, buf: &mut [u8], _off: u64) -> EResult<usize> {
		// The content lives in the page cache; the backing store is all zeros
		buf.fill(0);
		Ok(buf.len())
	}

	fn write(&self, _vn: &Vnode, buf: &[u8], _off: u64) -> EResult<usize> {
		Ok(buf.len())
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn tree() {
		let fs = Ramfs::new();
		let root = fs.root();
		let dir = root.ops.mkdir(&root, b"etc").unwrap();
		let file = dir.ops.create(&dir, b"motd", VnodeType::Regular).unwrap();
		assert_eq!(file.vtype, VnodeType::Regular);
		assert!(dir.ops.create(&dir, b"motd", VnodeType::Regular).is_err());
		// Name checks
		assert!(root.ops.create(&root, b"a/b", VnodeType::Regular).is_err());
		assert!(root.ops.create(&root, b"..", VnodeType::Regular).is_err());
		// Dot entries
		let up = dir.ops.lookup(&dir, b"..").unwrap();
		assert!(Arc::ptr_eq(&up, &root));
		let same = dir.ops.lookup(&dir, b".").unwrap();
		assert!(Arc::ptr_eq(&same, &dir));
		let rootup = root.ops.lookup(&root, b"..").unwrap();
		assert!(Arc::ptr_eq(&rootup, &root));
	}
}
