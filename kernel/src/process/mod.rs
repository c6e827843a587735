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

//! Processes.
//!
//! A process bundles the resources its threads execute with: the address space, the
//! file descriptor table and the working directory. Ownership forms a DAG: the
//! process owns its threads, its address space and its fd table; threads refer back
//! to the process through a weak link.

pub mod mem_space;
pub mod pid;
pub mod scheduler;
pub mod thread;

use crate::{
	arch::IntFrame,
	file::fd::FdTable,
	memory::VirtAddr,
	sync::IntSpin,
};
use alloc::{string::String, sync::Arc, vec::Vec};
use alloc::collections::BTreeMap;
use core::fmt;
use mem_space::AddrSpace;
use pid::{Pid, PidHandle};
use thread::Thread;
use utils::errno::{EResult, EOK};

/// The states of a process.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProcStatus {
	/// Created, no thread enqueued yet.
	New,
	/// At least one live thread.
	Running,
	/// Every thread has exited.
	Terminated,
}

/// A process.
pub struct Process {
	/// The process identifier.
	pid: PidHandle,
	/// The parent's PID. A lookup key, not an owning link.
	pub ppid: Pid,
	/// The process name.
	pub name: String,
	/// Whether the process runs userspace code.
	pub user: bool,
	/// The process state.
	status: IntSpin<ProcStatus>,
	/// The address space.
	pub addr_space: Arc<AddrSpace>,
	/// The threads of the process.
	threads: IntSpin<Vec<Arc<Thread>>>,
	/// The file descriptor table.
	pub fd_table: IntSpin<FdTable>,
	/// The current working directory, as a normalized absolute path.
	pub cwd: IntSpin<Vec<u8>>,
	/// The exit code reported by the first thread to exit the whole process.
	pub exit_code: IntSpin<Option<i32>>,
}

/// Every live process, keyed by PID.
static PROCESSES: IntSpin<BTreeMap<Pid, Arc<Process>>> = IntSpin::new(BTreeMap::new());

impl Process {
	/// Creates a process.
	///
	/// A user process gets a fresh address space; a kernel process shares the kernel
	/// address space.
	pub fn create(name: &str, user: bool) -> EResult<Arc<Self>> {
		let addr_space = if user {
			AddrSpace::new()?
		} else {
			mem_space::kernel_space().clone()
		};
		let proc = Arc::new(Self {
			pid: PidHandle::unique()?,
			ppid: pid::KERNEL_PID,
			name: name.into(),
			user,
			status: IntSpin::new(ProcStatus::New),
			addr_space,
			threads: IntSpin::new(Vec::new()),
			fd_table: IntSpin::new(FdTable::new()),
			cwd: IntSpin::new(alloc::vec![b'/']),
			exit_code: IntSpin::new(None),
		});
		PROCESSES.lock().insert(*proc.pid, proc.clone());
		Ok(proc)
	}

	/// Returns the process with the given PID.
	pub fn get(pid: Pid) -> Option<Arc<Self>> {
		PROCESSES.lock().get(&pid).cloned()
	}

	/// The process identifier.
	#[inline]
	pub fn pid(&self) -> Pid {
		*self.pid
	}

	/// The process state.
	pub fn status(&self) -> ProcStatus {
		*self.status.lock()
	}

	/// Attaches `thread` to the process.
	pub(crate) fn add_thread(&self, thread: Arc<Thread>) {
		self.threads.lock().push(thread);
		let mut status = self.status.lock();
		if *status == ProcStatus::New {
			*status = ProcStatus::Running;
		}
	}

	/// Returns the threads of the process.
	pub fn threads(&self) -> Vec<Arc<Thread>> {
		self.threads.lock().clone()
	}

	/// Detaches `thread`; called by the reaper once the thread is off-CPU.
	///
	/// When the last thread goes, the process becomes [`ProcStatus::Terminated`] and
	/// leaves the process table.
	pub(crate) fn remove_thread(&self, tid: thread::Tid) {
		let mut threads = self.threads.lock();
		threads.retain(|t| t.tid != tid);
		if threads.is_empty() {
			*self.status.lock() = ProcStatus::Terminated;
			PROCESSES.lock().remove(&*self.pid);
		}
	}

	/// Forks the process: clones the address space copy-on-write, duplicates the fd
	/// table and every thread, and enqueues the duplicated threads.
	///
	/// `frame` is the live syscall entry frame of the calling thread: its duplicate
	/// resumes from a copy of it carrying a return value of zero. Duplicates of the
	/// other, suspended threads resume where their originals were suspended.
	///
	/// Returns the child.
	pub fn fork(self: &Arc<Self>, frame: &IntFrame) -> EResult<Arc<Self>> {
		let addr_space = self.addr_space.fork()?;
		let fd_table = self.fd_table.lock().duplicate();
		let child = Arc::new(Self {
			pid: PidHandle::unique()?,
			ppid: *self.pid,
			name: self.name.clone(),
			user: self.user,
			status: IntSpin::new(ProcStatus::New),
			addr_space,
			threads: IntSpin::new(Vec::new()),
			fd_table: IntSpin::new(fd_table),
			cwd: IntSpin::new(self.cwd.lock().clone()),
			exit_code: IntSpin::new(None),
		});
		PROCESSES.lock().insert(*child.pid, child.clone());
		// The child observes the syscall returning zero
		let mut child_frame = frame.clone();
		child_frame.set_syscall_return(0, EOK);
		let current = scheduler::try_current_thread();
		for thread in self.threads.lock().iter() {
			let calling = current
				.as_ref()
				.map(|c| Arc::ptr_eq(c, thread))
				.unwrap_or(false);
			let dup = if calling {
				thread.duplicate_fork(&child, &child_frame)?
			} else {
				thread.duplicate(&child)?
			};
			scheduler::enqueue(dup);
		}
		Ok(child)
	}
}

impl fmt::Debug for Process {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Process")
			.field("pid", &*self.pid)
			.field("name", &self.name)
			.field("status", &self.status())
			.finish()
	}
}

/// Returns the process owning the currently running thread.
pub fn current_process() -> Option<Arc<Process>> {
	scheduler::try_current_thread()?.owner.upgrade()
}

/// Terminates the current thread after an unresolvable userspace fault.
pub fn fault_exit(addr: VirtAddr) -> ! {
	let thread = scheduler::current_thread();
	log::error!(
		"segmentation fault at {addr:?} (tid: {tid})",
		tid = thread.tid,
	);
	scheduler::exit_current();
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::test_utils;

	#[test]
	fn create_and_fork() {
		test_utils::init_kernel();
		let proc = Process::create("forked", true).unwrap();
		assert_eq!(proc.status(), ProcStatus::New);
		proc.cwd.lock().extend_from_slice(b"tmp");
		let child = proc.fork(&IntFrame::default()).unwrap();
		assert_eq!(child.ppid, proc.pid());
		assert_ne!(child.pid(), proc.pid());
		assert_eq!(&*child.cwd.lock(), b"/tmp");
		assert!(Process::get(child.pid()).is_some());
		// Address spaces are distinct objects
		assert!(!Arc::ptr_eq(&proc.addr_space, &child.addr_space));
	}

	#[test]
	fn fork_duplicates_threads() {
		use crate::process::thread::{Thread, ThreadStatus};
		test_utils::init_kernel();
		extern "C" fn exits(_: usize) -> ! {
			scheduler::exit_current();
		}
		let _sched = test_utils::sched_lock();
		let proc = Process::create("threaded", false).unwrap();
		let t = Thread::new_kernel(&proc, exits, 0).unwrap();
		assert_eq!(t.status(), ThreadStatus::New);
		assert_eq!(proc.status(), ProcStatus::Running);
		let child = proc.fork(&IntFrame::default()).unwrap();
		let child_threads = child.threads();
		assert_eq!(child_threads.len(), 1);
		assert_ne!(child_threads[0].tid, t.tid);
		// The duplicate went to the ready queue
		assert_eq!(child_threads[0].status(), ThreadStatus::Ready);
	}
}
