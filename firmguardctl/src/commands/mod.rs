// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Firmguard Authors

//! Command implementations for firmguardctl

pub mod baseline;
pub mod flash;
pub mod scan;
