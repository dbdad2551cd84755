// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! Name resolution and bookkeeping for the Funcs being visualized.

use std::collections::{HashMap, HashSet};
use std::io::{self, Write};

use itertools::Itertools;
use log::warn;

use crate::func::{FuncConfig, FuncStats, Label};

/// One registered Func: how to draw it and what the trace showed.
pub struct FuncEntry {
    pub config: FuncConfig,
    pub stats: FuncStats,
}

/// All Funcs known to the renderer, keyed by the name they were registered
/// under — either bare (`brighten`) or pipeline-qualified
/// (`camera_pipe:brighten`).
#[derive(Default)]
pub struct Registry {
    funcs: HashMap<String, FuncEntry>,
    /// Registration order; breaks report-ordering ties.
    insertion: Vec<String>,
    /// Names already warned about, so each is reported once.
    unknown: HashSet<String>,
}

impl Registry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered Funcs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.funcs.len()
    }

    /// Whether no Funcs are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.funcs.is_empty()
    }

    /// Register a Func's rendering configuration, replacing any earlier
    /// registration under the same name but keeping its labels.
    pub fn insert(&mut self, name: &str, config: FuncConfig) {
        config.dump(name);
        match self.funcs.get_mut(name) {
            Some(entry) => {
                let labels = std::mem::take(&mut entry.config.labels);
                entry.config = config;
                entry.config.labels.extend(labels);
            }
            None => {
                self.insertion.push(String::from(name));
                self.funcs.insert(
                    String::from(name),
                    FuncEntry {
                        config,
                        stats: FuncStats::default(),
                    },
                );
            }
        }
    }

    /// Attach a label to a Func, registering a default configuration when
    /// the Func has not been seen yet so the label still renders.
    pub fn add_label(&mut self, name: &str, label: Label) {
        if !self.funcs.contains_key(name) {
            self.insertion.push(String::from(name));
            self.funcs.insert(
                String::from(name),
                FuncEntry {
                    config: FuncConfig::default(),
                    stats: FuncStats::default(),
                },
            );
        }
        self.funcs.get_mut(name).unwrap().config.labels.push(label);
    }

    /// Resolve the Func an event refers to.
    ///
    /// The pipeline-qualified name is preferred; the bare name is the
    /// fallback. Misses are warned about once per qualified name and the
    /// event is dropped. A hit lazily fills in the stats fields that
    /// depend on first contact.
    pub fn resolve(
        &mut self,
        pipeline_name: &str,
        func_name: &str,
        packet_idx: u64,
        clock_now: u64,
    ) -> Option<&mut FuncEntry> {
        let qualified = format!("{pipeline_name}:{func_name}");
        let key: &str = if self.funcs.contains_key(&qualified) {
            &qualified
        } else if self.funcs.contains_key(func_name) {
            func_name
        } else {
            if self.unknown.insert(qualified.clone()) {
                warn!("ignoring func {qualified}");
            }
            return None;
        };

        let entry = self.funcs.get_mut(key).unwrap();
        if entry.stats.first_packet_idx.is_none() {
            entry.stats.first_packet_idx = Some(packet_idx);
            entry.stats.qualified_name = qualified;
        }
        if entry.stats.first_draw_time.is_none() {
            entry.stats.first_draw_time = Some(clock_now);
        }
        Some(entry)
    }

    /// Write the end-of-trace report: one summary per Func, ordered by
    /// first packet contact, registration order breaking ties and covering
    /// Funcs the trace never touched.
    pub fn report<W: Write>(&self, out: &mut W) -> io::Result<()> {
        writeln!(out, "Total number of Funcs: {}", self.funcs.len())?;
        let ordered = self
            .insertion
            .iter()
            .enumerate()
            .sorted_by_key(|(order, name)| {
                let stats = &self.funcs[*name].stats;
                (stats.first_packet_idx.unwrap_or(0), *order)
            });
        for (_, name) in ordered {
            let entry = &self.funcs[name];
            let mut stats = entry.stats.clone();
            if stats.qualified_name.is_empty() {
                stats.qualified_name = name.clone();
            }
            stats.report_into(out)?;
        }
        Ok(())
    }
}
