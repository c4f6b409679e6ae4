// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF output: multi-page documents built from processed page images.

pub mod assembler;

pub use assembler::{AssembledDocument, DocumentAssembler};
