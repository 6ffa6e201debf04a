// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Service layer: wires the print engine together from the persisted config
// and runs the listeners.

pub mod app_services;
pub mod data_dir;
