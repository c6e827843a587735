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

//! The scheduler.
//!
//! Each CPU runs its own scheduler over a FIFO ready queue: cooperative between
//! yield points, preempted by the one-shot timer. Sleeping threads sit on a separate
//! list and move back to the ready queue once their deadline passes, on the next
//! scheduling decision of their CPU.
//!
//! A thread that terminates cannot free its own stack: it parks on the reap list and
//! is released after the switch away from it has completed.

pub mod switch;

use super::{
	thread::{Thread, ThreadStatus},
	Process,
};
use crate::{
	arch,
	sync::{IntSpin, OnceInit},
	time::clock,
};
use alloc::{
	collections::VecDeque,
	sync::Arc,
	vec::Vec,
};
use utils::errno::EResult;

/// The preemption quantum, in microseconds.
pub const QUANTUM_US: u64 = 10_000;

/// Per-CPU scheduler state.
pub(crate) struct Cpu {
	/// The CPU identifier.
	#[allow(dead_code)]
	pub id: u32,
	/// The thread currently running on this CPU.
	pub current: Arc<Thread>,
	/// The idle thread, run when the ready queue is empty.
	pub idle: Arc<Thread>,
	/// Threads ready to run, in FIFO order.
	pub ready: VecDeque<Arc<Thread>>,
	/// Threads waiting for their deadline.
	pub sleeping: Vec<Arc<Thread>>,
	/// Terminated threads awaiting their final cleanup.
	pub reap: Vec<Arc<Thread>>,
}

impl Cpu {
	/// Moves expired sleepers to the back of the ready queue.
	pub fn wake_sleepers(&mut self, now: u64) {
		let mut i = 0;
		while i < self.sleeping.len() {
			let expired = self.sleeping[i].sched.lock().sleep_until <= now;
			if expired {
				let t = self.sleeping.swap_remove(i);
				t.sched.lock().status = ThreadStatus::Ready;
				self.ready.push_back(t);
			} else {
				i += 1;
			}
		}
	}

	/// Picks the next thread to run, falling back to the idle thread.
	pub fn pick_next(&mut self, now: u64) -> Arc<Thread> {
		self.wake_sleepers(now);
		self.ready.pop_front().unwrap_or_else(|| self.idle.clone())
	}
}

/// The per-CPU schedulers.
static CPUS: OnceInit<Vec<IntSpin<Cpu>>> = unsafe { OnceInit::new() };
/// Whether [`init`] has run.
static READY: core::sync::atomic::AtomicBool = core::sync::atomic::AtomicBool::new(false);

/// The idle loop.
extern "C" fn idle_entry(_: usize) -> ! {
	loop {
		arch::halt();
	}
}

/// Initializes the schedulers of `cpus` CPUs and registers the preemption timer.
pub(crate) fn init(cpus: u32) -> EResult<()> {
	let kernel_proc = Process::create("kernel", false)?;
	let mut v = Vec::new();
	for id in 0..cpus {
		let idle = Thread::new_kernel(&kernel_proc, idle_entry, 0)?;
		{
			let mut sched = idle.sched.lock();
			sched.status = ThreadStatus::Running;
			sched.cpu = id;
		}
		v.push(IntSpin::new(Cpu {
			id,
			current: idle.clone(),
			idle,
			ready: VecDeque::new(),
			sleeping: Vec::new(),
			reap: Vec::new(),
		}));
	}
	unsafe {
		OnceInit::init(&CPUS, v);
	}
	READY.store(true, core::sync::atomic::Ordering::Release);
	arch::timer_set_handler(preempt);
	#[cfg(target_os = "none")]
	arch::timer_one_shot(QUANTUM_US);
	Ok(())
}

/// Returns the scheduler of the current CPU.
fn cpu() -> &'static IntSpin<Cpu> {
	&CPUS[arch::cpu_id() as usize]
}

/// Returns the thread running on the current CPU, if the scheduler is up.
pub fn try_current_thread() -> Option<Arc<Thread>> {
	if !READY.load(core::sync::atomic::Ordering::Acquire) {
		return None;
	}
	CPUS.get(arch::cpu_id() as usize)
		.map(|c| c.lock().current.clone())
}

/// Returns the thread running on the current CPU.
pub fn current_thread() -> Arc<Thread> {
	cpu().lock().current.clone()
}

/// Enqueues `thread` on the ready queue of its assigned CPU.
pub fn enqueue(thread: Arc<Thread>) {
	let cpu_id = {
		let mut sched = thread.sched.lock();
		sched.status = ThreadStatus::Ready;
		sched.cpu
	};
	CPUS[cpu_id as usize].lock().ready.push_back(thread);
}

/// Releases the threads parked on the current CPU's reap list.
///
/// Runs on the stack of the thread that switched in, never on a reaped one.
fn reap() {
	let reaped = {
		let mut cpu = cpu().lock();
		core::mem::take(&mut cpu.reap)
	};
	for thread in reaped {
		if let Some(owner) = thread.owner.upgrade() {
			owner.remove_thread(thread.tid);
		}
		// The kernel stack goes away with the last reference
	}
}

/// Suspends the current thread with the given status and switches to the next ready
/// one.
///
/// - [`ThreadStatus::Ready`] re-enqueues the thread at the back of the queue
/// - [`ThreadStatus::Sleeping`] parks it until its deadline
/// - [`ThreadStatus::Terminated`] parks it for the reaper
pub fn yield_current(status: ThreadStatus) {
	let (prev, next) = {
		let mut cpu = cpu().lock();
		let prev = cpu.current.clone();
		{
			let mut sched = prev.sched.lock();
			sched.status = status;
		}
		match status {
			ThreadStatus::Ready if !Arc::ptr_eq(&prev, &cpu.idle) => {
				cpu.ready.push_back(prev.clone())
			}
			ThreadStatus::Sleeping => cpu.sleeping.push(prev.clone()),
			ThreadStatus::Terminated => cpu.reap.push(prev.clone()),
			_ => {}
		}
		let next = cpu.pick_next(clock::monotonic_us());
		next.sched.lock().status = ThreadStatus::Running;
		cpu.current = next.clone();
		(prev, next)
	};
	if !Arc::ptr_eq(&prev, &next) {
		// Load the next thread's address space before running on it
		if let Some(owner) = next.owner.upgrade() {
			owner.addr_space.load();
		}
		unsafe {
			switch::switch(&prev, &next);
		}
	}
	// Back on this CPU: clean up whatever terminated meanwhile
	reap();
}

/// Timer-interrupt path: re-arms the one-shot timer and preempts the current thread.
pub fn preempt() {
	arch::timer_one_shot(QUANTUM_US);
	yield_current(ThreadStatus::Ready);
}

/// Puts the current thread to sleep for at least `us` microseconds.
pub fn sleep_for(us: u64) {
	{
		let thread = current_thread();
		let mut sched = thread.sched.lock();
		sched.sleep_until = clock::monotonic_us().saturating_add(us);
	}
	yield_current(ThreadStatus::Sleeping);
}

/// Terminates the current thread. Never returns.
pub fn exit_current() -> ! {
	yield_current(ThreadStatus::Terminated);
	unreachable!("terminated thread was scheduled again");
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::test_utils;

	extern "C" fn noop(_: usize) -> ! {
		unreachable!();
	}

	fn test_cpu(n: usize) -> (Cpu, Vec<Arc<Thread>>, Arc<Process>) {
		let proc = Process::create("sched_test", false).unwrap();
		let idle = Thread::new_kernel(&proc, noop, 0).unwrap();
		idle.sched.lock().status = ThreadStatus::Running;
		let threads: Vec<_> = (0..n)
			.map(|_| Thread::new_kernel(&proc, noop, 0).unwrap())
			.collect();
		let cpu = Cpu {
			id: 0,
			current: idle.clone(),
			idle,
			ready: VecDeque::new(),
			sleeping: Vec::new(),
			reap: Vec::new(),
		};
		(cpu, threads, proc)
	}

	#[test]
	fn fifo_order() {
		test_utils::init_kernel();
		let (mut cpu, threads, _proc) = test_cpu(3);
		for t in &threads {
			t.sched.lock().status = ThreadStatus::Ready;
			cpu.ready.push_back(t.clone());
		}
		// FIFO: first enqueued runs first
		for t in &threads {
			let next = cpu.pick_next(0);
			assert!(Arc::ptr_eq(&next, t));
		}
		// Empty queue falls back to idle
		let next = cpu.pick_next(0);
		assert!(Arc::ptr_eq(&next, &cpu.idle));
	}

	#[test]
	fn sleepers_wake_in_time() {
		test_utils::init_kernel();
		let (mut cpu, threads, _proc) = test_cpu(2);
		threads[0].sched.lock().sleep_until = 100;
		threads[0].sched.lock().status = ThreadStatus::Sleeping;
		threads[1].sched.lock().sleep_until = 200;
		threads[1].sched.lock().status = ThreadStatus::Sleeping;
		cpu.sleeping.push(threads[0].clone());
		cpu.sleeping.push(threads[1].clone());
		// Nothing expired yet
		let next = cpu.pick_next(50);
		assert!(Arc::ptr_eq(&next, &cpu.idle));
		assert_eq!(cpu.sleeping.len(), 2);
		// First deadline passed
		let next = cpu.pick_next(150);
		assert!(Arc::ptr_eq(&next, &threads[0]));
		assert_eq!(next.status(), ThreadStatus::Ready);
		assert_eq!(cpu.sleeping.len(), 1);
		// Second one
		let next = cpu.pick_next(250);
		assert!(Arc::ptr_eq(&next, &threads[1]));
		assert!(cpu.sleeping.is_empty());
	}

	#[test]
	fn current_thread_is_tracked() {
		test_utils::init_kernel();
		// The boot CPU runs its idle thread
		let t = current_thread();
		assert_eq!(t.status(), ThreadStatus::Running);
	}

	#[test]
	#[cfg(target_arch = "x86_64")]
	fn switch_roundtrip() {
		use core::sync::atomic::{AtomicUsize, Ordering::SeqCst};
		static RAN: AtomicUsize = AtomicUsize::new(0);
		extern "C" fn body(arg: usize) -> ! {
			RAN.store(arg, SeqCst);
			exit_current();
		}
		test_utils::init_kernel();
		let _sched = test_utils::sched_lock();
		let proc = Process::create("switch_test", false).unwrap();
		let t = Thread::new_kernel(&proc, body, 42).unwrap();
		enqueue(t.clone());
		// A real switch into the thread and back: the yield returns once the ready
		// queue has drained to the idle thread
		yield_current(ThreadStatus::Ready);
		assert_eq!(RAN.load(SeqCst), 42);
		assert_eq!(t.status(), ThreadStatus::Terminated);
	}
}
