// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// qrswap-session — Stateful orchestration over the scan/replace pipeline.
//
// Owns the loaded artifact, the edit registry, and the handles of every
// binary handed out, and serializes operations so only one runs at a time.

pub mod artifact;
pub mod orchestrator;
pub mod registry;
pub mod resources;

pub use artifact::{ModifiedArtifact, SourceArtifact, fingerprint};
pub use orchestrator::{ReplaceView, ScanView, Session, SessionState};
pub use registry::{EditRecord, EditRegistry};
pub use resources::{Resource, ResourceHandle, ResourceKind, ResourceTable};
