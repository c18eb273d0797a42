// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

mod runtime;

//======================================================================================================================
// Exports
//======================================================================================================================

#[allow(dead_code, unused_imports)]
pub use self::runtime::{
    SimulatedRuntime,
    YieldHook,
};
