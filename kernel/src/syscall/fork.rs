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

//! The `fork` system call.
//!
//! The child is a full clone: copy-on-write address space, duplicated descriptor
//! table, duplicated threads. The parent gets the child's PID; the duplicate of the
//! calling thread resumes from a copy of the entry frame whose return registers hold
//! `(0, EOK)`.

use crate::{arch::IntFrame, process::Process};
use alloc::sync::Arc;
use utils::errno::EResult;

pub fn fork(proc: &Arc<Process>, frame: &IntFrame) -> EResult<usize> {
	let child = proc.fork(frame)?;
	Ok(child.pid() as usize)
}

#[cfg(all(test, target_arch = "x86_64"))]
mod test {
	use super::*;
	use crate::{
		process::{scheduler, thread::Thread, thread::ThreadStatus},
		test_utils,
	};
	use core::sync::atomic::{AtomicUsize, Ordering::SeqCst};

	/// `1 + rax` as observed by the resumed child; zero while it has not run.
	static CHILD_SEEN: AtomicUsize = AtomicUsize::new(0);
	/// The argument register the child resumed with.
	static CHILD_TOKEN: AtomicUsize = AtomicUsize::new(0);
	/// The parent's fork return value.
	static PARENT_RET: AtomicUsize = AtomicUsize::new(0);

	// Where the child's frame points: capture the restored syscall return register
	// before compiled code can clobber it, then re-align the stack for the C ABI
	// (the hosted fork_return leaves it at a 16-byte boundary).
	core::arch::global_asm!(
		r#"
.global fork_landing_stub

fork_landing_stub:
	mov rsi, rax
	sub rsp, 8
	jmp fork_landing
"#
	);

	extern "C" {
		fn fork_landing_stub();
	}

	/// The child's resumed instruction stream: `token` arrives through the restored
	/// argument register, `ret` is the restored syscall return register.
	#[no_mangle]
	extern "C" fn fork_landing(token: usize, ret: usize) -> ! {
		CHILD_TOKEN.store(token, SeqCst);
		CHILD_SEEN.store(1 + ret, SeqCst);
		scheduler::exit_current();
	}

	/// The parent thread: performs the fork with a hand-built entry frame, the way
	/// the syscall stub would, then exits.
	extern "C" fn parent_body(token: usize) -> ! {
		let proc = scheduler::current_thread().owner.upgrade().unwrap();
		let mut frame = IntFrame::default();
		frame.rip = fork_landing_stub as usize as u64;
		frame.rdi = token as u64;
		let ret = fork(&proc, &frame).unwrap();
		PARENT_RET.store(ret, SeqCst);
		scheduler::exit_current();
	}

	#[test]
	fn forked_thread_resumes_with_zero() {
		test_utils::init_kernel();
		let _sched = test_utils::sched_lock();
		let proc = Process::create("fork_resume", false).unwrap();
		let t = Thread::new_kernel(&proc, parent_body, 0x5eed).unwrap();
		scheduler::enqueue(t);
		// Drive the chain: the parent forks and exits, then the scheduler switches
		// into the duplicate, which resumes at the frame's instruction pointer
		scheduler::yield_current(ThreadStatus::Ready);
		assert_eq!(CHILD_TOKEN.load(SeqCst), 0x5eed);
		// The child observed a return value of zero
		assert_eq!(CHILD_SEEN.load(SeqCst), 1);
		// The parent observed the child's PID
		assert_ne!(PARENT_RET.load(SeqCst), 0);
	}
}
