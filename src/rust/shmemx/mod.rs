// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

pub mod bindings;
pub mod config;
