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

//! System limits.

/// The size of a memory page in bytes.
pub const PAGE_SIZE: usize = 4096;

/// Maximum number of open file descriptors per process.
pub const OPEN_MAX: usize = 64;

/// Maximum length of a path.
pub const PATH_MAX: usize = 4096;

/// Maximum length of a filename.
pub const NAME_MAX: usize = 255;

/// Maximum number of elements in a vectored I/O operation.
pub const IOV_MAX: usize = 1024;
