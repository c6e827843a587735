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

//! The `write` system call.

use crate::{
	file::uio::{Uio, UioBuf, UioDir, UioSpace},
	memory::VirtAddr,
	process::Process,
};
use alloc::sync::Arc;
use utils::errno::EResult;

pub fn write(proc: &Arc<Process>, fd: i32, buf: VirtAddr, count: usize) -> EResult<usize> {
	let file = proc.fd_table.lock().get(fd)?;
	let bufs = [UioBuf {
		base: buf,
		len: count,
	}];
	let mut uio = Uio::new(
		UioDir::Write,
		&bufs,
		file.offset(),
		UioSpace::User(&proc.addr_space),
	)?;
	file.write(&mut uio)
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::{
		file::{O_CREAT, O_RDWR, SEEK_SET},
		memory::user,
		memory::vmem::Prot,
		process::mem_space::segment::MapFlags,
		syscall::{open, read, seek},
		test_utils,
	};
	use utils::limits::PAGE_SIZE;

	#[test]
	fn write_read_through_fds() {
		test_utils::init_kernel();
		let proc = Process::create("rw_test", true).unwrap();
		let buf = proc
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
		user::copy_to_user(&proc.addr_space, buf, b"/sys_rw\0").unwrap();
		let fd = open::open(&proc, buf, O_RDWR | O_CREAT).unwrap() as i32;
		// Write advances the shared offset
		user::copy_to_user(&proc.addr_space, buf, b"payload!").unwrap();
		assert_eq!(write(&proc, fd, buf, 8).unwrap(), 8);
		// Rewind, then read it back into a different part of the buffer
		assert_eq!(seek::seek(&proc, fd, 0, SEEK_SET).unwrap(), 0);
		let dst = buf + 64;
		assert_eq!(read::read(&proc, fd, dst, 8).unwrap(), 8);
		let mut back = [0u8; 8];
		user::copy_from_user(&proc.addr_space, dst, &mut back).unwrap();
		assert_eq!(&back, b"payload!");
		// Reading at EOF returns zero bytes
		assert_eq!(read::read(&proc, fd, dst, 8).unwrap(), 0);
		// A bogus descriptor is rejected
		assert!(write(&proc, 99, buf, 1).is_err());
	}
}
