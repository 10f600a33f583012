// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Graph interchange formats

pub mod json;

pub use json::{GraphDocument, ImportReport, InterchangeError};
