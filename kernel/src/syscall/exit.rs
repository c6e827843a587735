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

//! The `exit` system call.
//!
//! Terminates the calling thread. When the last thread of the process exits, the
//! process itself becomes terminated (handled by the reaper).

use crate::process::{scheduler, Process};
use alloc::sync::Arc;
use utils::errno::EResult;

pub fn exit(proc: &Arc<Process>, code: i32) -> EResult<usize> {
	proc.exit_code.lock().get_or_insert(code);
	log::debug!(
		"process {pid} thread exiting with code {code}",
		pid = proc.pid(),
	);
	scheduler::exit_current();
}
