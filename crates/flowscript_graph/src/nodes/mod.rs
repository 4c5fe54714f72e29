// SPDX-License-Identifier: MIT OR Apache-2.0
//! Builtin node library registered by the default factory.

pub mod function;
pub mod getset;
pub mod input;
pub mod logic;
pub mod loops;
pub mod subgraph;
