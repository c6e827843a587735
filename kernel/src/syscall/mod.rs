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

//! The system call boundary.
//!
//! Every call returns a `(value, errno)` pair; an errno of zero means success. The
//! architecture's entry stub collects the arguments and hands them to [`dispatch`].
//!
//! User-caused errors leave no side effects, except for write-style calls which may
//! report partial progress: once bytes are reported, they have been transferred.

mod chdir;
mod close;
mod debug_log;
mod exit;
mod fork;
mod getcwd;
mod getpid;
mod getppid;
mod gettid;
mod mkdir;
mod mmap;
mod open;
mod read;
mod rmdir;
mod seek;
mod sleep;
mod tcb_set;
mod write;

use crate::{
	arch::IntFrame,
	file::path,
	memory::{user, VirtAddr},
	process::{current_process, Process},
};
use alloc::{sync::Arc, vec::Vec};
use utils::{
	errno,
	errno::{EResult, Errno, EOK},
	limits::PATH_MAX,
};

/// The result of a system call, as returned to userspace.
#[derive(Clone, Copy, Debug)]
pub struct SysRet {
	/// The call's return value.
	pub value: usize,
	/// Zero on success.
	pub errno: Errno,
}

/// Reads a user path and resolves it against the process's working directory.
///
/// Returns a normalized absolute path.
pub(self) fn user_path(proc: &Arc<Process>, ptr: VirtAddr) -> EResult<Vec<u8>> {
	let raw = user::copy_string_from_user(&proc.addr_space, ptr, PATH_MAX)?;
	if raw.is_empty() {
		return Err(errno!(ENOENT));
	}
	let cwd = proc.cwd.lock().clone();
	Ok(path::normalize(&path::concat(&cwd, &raw)))
}

/// Executes the system call `id` with the given arguments for `proc`.
///
/// `frame` is the live entry frame of the calling thread; `fork` duplicates it for
/// the child.
fn do_syscall(proc: &Arc<Process>, id: usize, args: [usize; 6], frame: &IntFrame) -> EResult<usize> {
	match id {
		0x0 => debug_log::debug_log(proc, VirtAddr(args[0])),
		0x1 => open::open(proc, VirtAddr(args[0]), args[1] as u32),
		0x2 => close::close(proc, args[0] as i32),
		0x3 => read::read(proc, args[0] as i32, VirtAddr(args[1]), args[2]),
		0x4 => write::write(proc, args[0] as i32, VirtAddr(args[1]), args[2]),
		0x5 => seek::seek(proc, args[0] as i32, args[1] as i64, args[2] as u32),
		0x6 => mmap::mmap(
			proc,
			VirtAddr(args[0]),
			args[1],
			args[2] as u32,
			args[3] as u32,
			args[4] as i32,
			args[5] as u64,
		),
		0x7 => exit::exit(proc, args[0] as i32),
		0x8 => fork::fork(proc, frame),
		0x9 => getcwd::getcwd(proc, VirtAddr(args[0]), args[1]),
		0xa => getpid::getpid(proc),
		0xb => getppid::getppid(proc),
		0xc => gettid::gettid(proc),
		0xd => tcb_set::tcb_set(proc, args[0]),
		0xe => sleep::sleep(proc, args[0] as u64),
		0xf => chdir::chdir(proc, VirtAddr(args[0])),
		0x10 => mkdir::mkdir(proc, VirtAddr(args[0])),
		0x11 => rmdir::rmdir(proc, VirtAddr(args[0])),
		_ => Err(errno!(ENOSYS)),
	}
}

/// Entry point of the architecture's system call path.
///
/// The caller writes the returned pair into `frame`'s return registers afterwards.
pub fn dispatch(id: usize, args: [usize; 6], frame: &IntFrame) -> SysRet {
	let Some(proc) = current_process() else {
		return SysRet {
			value: 0,
			errno: errno!(ENOSYS),
		};
	};
	match do_syscall(&proc, id, args, frame) {
		Ok(value) => SysRet {
			value,
			errno: EOK,
		},
		Err(errno) => SysRet {
			value: 0,
			errno,
		},
	}
}
