// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Service layer: bootstraps the engine from the data directory for the CLI.

pub mod data_dir;
pub mod engine_services;
