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

//! File descriptor tables.
//!
//! A file descriptor is an index held by a process into its table of open-file
//! references. The table has a fixed capacity; allocation always picks the lowest
//! free index.

use super::File;
use alloc::{sync::Arc, vec::Vec};
use utils::{errno, errno::EResult, limits::OPEN_MAX};

/// A table of file descriptors.
#[derive(Default)]
pub struct FdTable(Vec<Option<Arc<File>>>);

impl FdTable {
	/// Creates an empty table.
	pub fn new() -> Self {
		Self(Vec::new())
	}

	/// Stores a reference to `file` at the lowest free index, returning it.
	///
	/// A full table yields [`EMFILE`].
	pub fn alloc(&mut self, file: Arc<File>) -> EResult<i32> {
		let fd = match self.0.iter().position(Option::is_none) {
			Some(fd) => fd,
			None => {
				if self.0.len() >= OPEN_MAX {
					return Err(errno!(EMFILE));
				}
				self.0.push(None);
				self.0.len() - 1
			}
		};
		self.0[fd] = Some(file);
		Ok(fd as i32)
	}

	/// Returns a held reference to the file at `fd`.
	pub fn get(&self, fd: i32) -> EResult<Arc<File>> {
		let fd: usize = fd.try_into().map_err(|_| errno!(EBADF))?;
		self.0
			.get(fd)
			.and_then(Option::as_ref)
			.cloned()
			.ok_or(errno!(EBADF))
	}

	/// Drops the reference at `fd`.
	///
	/// If this was the last reference to the file, it is closed.
	pub fn free(&mut self, fd: i32) -> EResult<()> {
		let fd: usize = fd.try_into().map_err(|_| errno!(EBADF))?;
		let slot = self.0.get_mut(fd).ok_or(errno!(EBADF))?;
		slot.take().ok_or(errno!(EBADF))?;
		// Shrink the tail of the table
		let len = self
			.0
			.iter()
			.rposition(Option::is_some)
			.map(|i| i + 1)
			.unwrap_or(0);
		self.0.truncate(len);
		Ok(())
	}

	/// Duplicates the whole table; every entry holds an added reference to the same
	/// file.
	pub fn duplicate(&self) -> Self {
		Self(self.0.clone())
	}

	/// Returns the number of open descriptors.
	pub fn open_count(&self) -> usize {
		self.0.iter().filter(|f| f.is_some()).count()
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::file::{vfs, vfs::node::VnodeType, O_RDONLY};
	use crate::test_utils;

	fn dummy_file(name: &[u8]) -> Arc<File> {
		let mut p = alloc::vec![b'/'];
		p.extend_from_slice(name);
		let vn = vfs::create(&p, VnodeType::Regular).unwrap();
		File::open_vnode(vn, O_RDONLY).unwrap()
	}

	#[test]
	fn fd_lowest_free() {
		test_utils::init_kernel();
		let mut fds = FdTable::new();
		assert_eq!(fds.alloc(dummy_file(b"fd_a")).unwrap(), 0);
		assert_eq!(fds.alloc(dummy_file(b"fd_b")).unwrap(), 1);
		assert_eq!(fds.alloc(dummy_file(b"fd_c")).unwrap(), 2);
		fds.free(1).unwrap();
		assert_eq!(fds.alloc(dummy_file(b"fd_d")).unwrap(), 1);
	}

	#[test]
	fn fd_get_free() {
		test_utils::init_kernel();
		let mut fds = FdTable::new();
		let fd = fds.alloc(dummy_file(b"fd_e")).unwrap();
		assert!(fds.get(fd).is_ok());
		assert!(fds.get(fd + 1).is_err());
		assert!(fds.get(-1).is_err());
		fds.free(fd).unwrap();
		assert!(fds.get(fd).is_err());
		assert!(fds.free(fd).is_err());
	}

	#[test]
	fn fd_capacity() {
		test_utils::init_kernel();
		let mut fds = FdTable::new();
		let file = dummy_file(b"fd_full");
		for _ in 0..OPEN_MAX {
			fds.alloc(file.clone()).unwrap();
		}
		assert!(fds.alloc(file.clone()).is_err());
	}

	#[test]
	fn fd_clone_holds_references() {
		test_utils::init_kernel();
		let mut fds = FdTable::new();
		let file = dummy_file(b"fd_cl");
		let fd = fds.alloc(file.clone()).unwrap();
		let before = Arc::strong_count(&file);
		let clone = fds.duplicate();
		assert_eq!(Arc::strong_count(&file), before + 1);
		assert!(Arc::ptr_eq(&clone.get(fd).unwrap(), &file));
		drop(clone);
		// Destroying the clone leaves the original's references intact
		assert_eq!(Arc::strong_count(&file), before);
		assert!(fds.get(fd).is_ok());
	}
}
