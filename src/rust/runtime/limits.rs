// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

/// Maximum number of shepherds (OS-level workers) a scheduler tracks.
pub const MAX_SHEPHERDS: usize = 1024;

/// Maximum number of user-level threads hosted by a single shepherd.
pub const MAX_THREADS_PER_SHEPHERD: usize = 65536;
