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

//! Threads.
//!
//! A thread is a register context plus a kernel stack. The stack is buddy-allocated
//! and reached through the HHDM; the context only holds what the switch code needs,
//! everything else lives on the stack.
//!
//! A thread never frees its own stack: terminated threads are kept on a reap list and
//! released by the scheduler after the switch away from them has completed.

use super::Process;
use crate::{
	arch::context,
	arch::context::Context,
	arch::IntFrame,
	memory::{
		buddy::FrameOrder,
		cache::RcFrame,
		VirtAddr,
	},
	sync::IntSpin,
};
use alloc::sync::{Arc, Weak};
use core::{
	cell::UnsafeCell,
	fmt,
	sync::atomic::{AtomicU32, Ordering::Relaxed},
};
use utils::errno::EResult;

/// A thread identifier.
pub type Tid = u32;

/// The order of a kernel stack allocation (16 KiB).
pub const KERNEL_STACK_ORDER: FrameOrder = 2;

/// The next TID to hand out.
static NEXT_TID: AtomicU32 = AtomicU32::new(0);

/// The states of a thread.
///
/// Transitions: `New -> Ready` on enqueue, `Ready <-> Running` by the scheduler,
/// `Running -> Sleeping` when a wakeup deadline is set, `Sleeping -> Ready` when it
/// passes, anything `-> Terminated` on exit.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ThreadStatus {
	New,
	Ready,
	Running,
	Sleeping,
	Terminated,
}

/// Scheduler-owned state of a thread.
#[derive(Debug)]
pub(crate) struct SchedInfo {
	/// The thread's state.
	pub status: ThreadStatus,
	/// Monotonic deadline (µs) before which a sleeping thread is not runnable.
	pub sleep_until: u64,
	/// The CPU the thread is assigned to.
	pub cpu: u32,
}

/// A thread of execution.
pub struct Thread {
	/// The thread's identifier.
	pub tid: Tid,
	/// The process owning the thread. Non-owning: the process owns its threads.
	pub owner: Weak<Process>,
	/// Scheduling priority. Higher runs earlier; unused while queues are FIFO.
	pub priority: u8,
	/// Scheduler bookkeeping.
	pub(crate) sched: IntSpin<SchedInfo>,
	/// The kernel stack.
	kernel_stack: RcFrame,
	/// The architecture register context. Only ever touched by the CPU the thread is
	/// assigned to, around context switches.
	context: UnsafeCell<Context>,
	/// Instruction and stack pointer of the initial userspace transition, for user
	/// threads.
	pub user_entry: Option<(usize, usize)>,
}

// The context is only accessed by the owning CPU with the thread suspended
unsafe impl Send for Thread {}
unsafe impl Sync for Thread {}

impl Thread {
	fn alloc() -> EResult<(RcFrame, Tid)> {
		let stack = RcFrame::new_zeroed(KERNEL_STACK_ORDER)?;
		let tid = NEXT_TID.fetch_add(1, Relaxed);
		Ok((stack, tid))
	}

	/// Creates a kernel thread entering `entry(arg)`, owned by `owner`.
	///
	/// The thread starts in state [`ThreadStatus::New`]; it runs once enqueued.
	pub fn new_kernel(
		owner: &Arc<Process>,
		entry: extern "C" fn(usize) -> !,
		arg: usize,
	) -> EResult<Arc<Self>> {
		let (kernel_stack, tid) = Self::alloc()?;
		let mut ctx = Context::default();
		unsafe {
			context::init(&mut ctx, Self::stack_top_of(&kernel_stack), entry, arg);
		}
		let thread = Arc::new(Self {
			tid,
			owner: Arc::downgrade(owner),
			priority: 0,
			sched: IntSpin::new(SchedInfo {
				status: ThreadStatus::New,
				sleep_until: 0,
				cpu: crate::arch::cpu_id(),
			}),
			kernel_stack,
			context: UnsafeCell::new(ctx),
			user_entry: None,
		});
		owner.add_thread(thread.clone());
		Ok(thread)
	}

	/// Creates a user thread, owned by `owner`.
	///
	/// The thread enters the kernel-to-user trampoline, which transitions to `ip`
	/// with the userspace stack `sp`.
	pub fn new_user(owner: &Arc<Process>, ip: usize, sp: usize) -> EResult<Arc<Self>> {
		let (kernel_stack, tid) = Self::alloc()?;
		let mut ctx = Context::default();
		unsafe {
			context::init(&mut ctx, Self::stack_top_of(&kernel_stack), user_thread_entry, 0);
		}
		let thread = Arc::new(Self {
			tid,
			owner: Arc::downgrade(owner),
			priority: 0,
			sched: IntSpin::new(SchedInfo {
				status: ThreadStatus::New,
				sleep_until: 0,
				cpu: crate::arch::cpu_id(),
			}),
			kernel_stack,
			context: UnsafeCell::new(ctx),
			user_entry: Some((ip, sp)),
		});
		owner.add_thread(thread.clone());
		Ok(thread)
	}

	/// Duplicates the calling thread into `owner`, for `fork`.
	///
	/// `frame` is the copy of the live syscall entry frame the child resumes from,
	/// with its return registers already set. The child gets a fresh kernel stack
	/// seeded with that frame: the first switch into it restores the frame and lands
	/// at its saved instruction pointer, as if returning from the syscall.
	pub fn duplicate_fork(&self, owner: &Arc<Process>, frame: &IntFrame) -> EResult<Arc<Self>> {
		let (kernel_stack, tid) = Self::alloc()?;
		let mut ctx = Context::default();
		unsafe {
			context::init_forked(&mut ctx, Self::stack_top_of(&kernel_stack), frame);
		}
		let thread = Arc::new(Self {
			tid,
			owner: Arc::downgrade(owner),
			priority: self.priority,
			sched: IntSpin::new(SchedInfo {
				status: ThreadStatus::New,
				sleep_until: 0,
				cpu: self.sched.lock().cpu,
			}),
			kernel_stack,
			context: UnsafeCell::new(ctx),
			user_entry: self.user_entry,
		});
		owner.add_thread(thread.clone());
		Ok(thread)
	}

	/// Duplicates a suspended thread into `owner`, for `fork`.
	///
	/// The kernel stack is copied wholesale and the saved stack pointer rebased, so
	/// the child carries the same saved switch frame and resumes where the parent
	/// was suspended.
	pub fn duplicate(&self, owner: &Arc<Process>) -> EResult<Arc<Self>> {
		let (kernel_stack, tid) = Self::alloc()?;
		unsafe {
			kernel_stack
				.slice_mut()
				.copy_from_slice(self.kernel_stack.slice());
		}
		// Rebase the saved stack pointer into the new stack
		let old = unsafe { &*self.context.get() };
		let mut ctx = Context::default();
		context::rebase(
			&mut ctx,
			old,
			self.kernel_stack.virt_addr(),
			kernel_stack.virt_addr(),
		);
		let thread = Arc::new(Self {
			tid,
			owner: Arc::downgrade(owner),
			priority: self.priority,
			sched: IntSpin::new(SchedInfo {
				status: ThreadStatus::New,
				sleep_until: 0,
				cpu: self.sched.lock().cpu,
			}),
			kernel_stack,
			context: UnsafeCell::new(ctx),
			user_entry: self.user_entry,
		});
		owner.add_thread(thread.clone());
		Ok(thread)
	}

	fn stack_top_of(stack: &RcFrame) -> VirtAddr {
		stack.virt_addr() + stack.len()
	}

	/// The top of the thread's kernel stack.
	pub fn stack_top(&self) -> VirtAddr {
		Self::stack_top_of(&self.kernel_stack)
	}

	/// The thread's current state.
	pub fn status(&self) -> ThreadStatus {
		self.sched.lock().status
	}

	/// The CPU the thread is assigned to.
	pub fn cpu(&self) -> u32 {
		self.sched.lock().cpu
	}

	/// Pointer to the register context, for the switch code.
	///
	/// # Safety
	///
	/// Only the scheduler of the assigned CPU may use it, with the thread suspended.
	pub(crate) unsafe fn context_ptr(&self) -> *mut Context {
		self.context.get()
	}
}

impl fmt::Debug for Thread {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Thread")
			.field("tid", &self.tid)
			.field("status", &self.status())
			.finish()
	}
}

/// First function of every user thread: leaves the kernel for the thread's entry
/// point.
extern "C" fn user_thread_entry(_arg: usize) -> ! {
	let thread = super::scheduler::current_thread();
	let (ip, sp) = thread.user_entry.expect("user thread without an entry point");
	unsafe {
		context::enter_user(ip, sp);
	}
}
