// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! Tracks which pipeline each trace scope belongs to.
//!
//! Scope events form balanced begin/end pairs: pipelines are keyed by
//! their own id, while realizations and productions inherit the pipeline
//! of their parent scope and register their own id so that nested events
//! can resolve their pipeline context.

use std::collections::HashMap;

/// The pipeline context a scope id resolves to.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct PipelineInfo {
    pub name: String,
    pub id: u32,
}

/// Maps live scope ids to their enclosing pipeline.
#[derive(Default)]
pub struct PipelineTracker {
    active: HashMap<u32, PipelineInfo>,
}

impl PipelineTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A pipeline began: its own id resolves to itself.
    pub fn begin_pipeline(&mut self, id: u32, name: &str) {
        self.active.insert(
            id,
            PipelineInfo {
                name: String::from(name),
                id,
            },
        );
    }

    /// A pipeline ended; its id no longer resolves.
    pub fn end_pipeline(&mut self, id: u32) {
        self.active.remove(&id);
    }

    /// A realization or production began: the new scope inherits the
    /// pipeline of its parent.
    pub fn begin_realize(&mut self, id: u32, parent: u32) {
        let inherited = self.resolve(parent);
        self.active.insert(id, inherited);
    }

    /// A realization or consumption ended. Orphaned ends are tolerated.
    pub fn end_realize(&mut self, parent: u32) {
        self.active.remove(&parent);
    }

    /// The pipeline enclosing `parent`. Unknown scopes resolve to a
    /// default context with an empty name.
    #[must_use]
    pub fn resolve(&self, parent: u32) -> PipelineInfo {
        self.active.get(&parent).cloned().unwrap_or_default()
    }
}
