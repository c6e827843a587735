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

//! The `open` system call.

use super::user_path;
use crate::{
	file::{vfs, vfs::node::VnodeType, File, O_CREAT, O_EXCL},
	memory::VirtAddr,
	process::Process,
};
use alloc::sync::Arc;
use utils::{errno, errno::EResult};

pub fn open(proc: &Arc<Process>, path: VirtAddr, flags: u32) -> EResult<usize> {
	let path = user_path(proc, path)?;
	let vnode = match vfs::lookup(&path) {
		Ok(vn) => {
			if flags & (O_CREAT | O_EXCL) == O_CREAT | O_EXCL {
				return Err(errno!(EEXIST));
			}
			vn
		}
		Err(e) if e == errno!(ENOENT) && flags & O_CREAT != 0 => {
			vfs::create(&path, VnodeType::Regular)?
		}
		Err(e) => return Err(e),
	};
	let file = File::open_vnode(vnode, flags)?;
	let fd = proc.fd_table.lock().alloc(file)?;
	Ok(fd as usize)
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::{
		file::{O_RDWR, O_TRUNC},
		memory::user,
		process::mem_space::segment::MapFlags,
		memory::vmem::Prot,
		test_utils,
	};
	use utils::limits::PAGE_SIZE;

	/// Creates a user process with the given nul-terminated string mapped in, and
	/// returns its user address.
	fn proc_with_string(s: &[u8]) -> (Arc<Process>, VirtAddr) {
		let proc = Process::create("open_test", true).unwrap();
		let addr = proc
			.addr_space
			.map(
				VirtAddr::default(),
				PAGE_SIZE,
				Prot::RW,
				MapFlags::PRIVATE | MapFlags::ANON,
				None,
				0,
			)
			.unwrap();
		let mut buf = s.to_vec();
		buf.push(0);
		user::copy_to_user(&proc.addr_space, addr, &buf).unwrap();
		(proc, addr)
	}

	#[test]
	fn open_creates_and_finds() {
		test_utils::init_kernel();
		let (proc, path) = proc_with_string(b"/sys_open_f");
		// Missing without O_CREAT
		assert!(open(&proc, path, O_RDWR).is_err());
		let fd = open(&proc, path, O_RDWR | O_CREAT).unwrap();
		assert_eq!(fd, 0);
		// O_CREAT | O_EXCL on an existing file
		assert_eq!(
			open(&proc, path, O_RDWR | O_CREAT | O_EXCL).unwrap_err(),
			errno!(EEXIST)
		);
		// Plain re-open takes the next descriptor
		let fd2 = open(&proc, path, O_RDWR).unwrap();
		assert_eq!(fd2, 1);
	}

	#[test]
	fn open_relative_to_cwd() {
		test_utils::init_kernel();
		vfs::mkdir(b"/open_cwd").unwrap();
		let (proc, path) = proc_with_string(b"rel_file");
		*proc.cwd.lock() = b"/open_cwd".to_vec();
		open(&proc, path, O_RDWR | O_CREAT).unwrap();
		assert!(vfs::lookup(b"/open_cwd/rel_file").is_ok());
	}

	#[test]
	fn open_trunc() {
		test_utils::init_kernel();
		let (proc, path) = proc_with_string(b"/sys_open_trunc");
		open(&proc, path, O_RDWR | O_CREAT).unwrap();
		let vn = vfs::lookup(b"/sys_open_trunc").unwrap();
		vfs::write(&vn, b"junk", 0).unwrap();
		open(&proc, path, O_RDWR | O_TRUNC).unwrap();
		assert_eq!(vn.size(), 0);
	}
}
