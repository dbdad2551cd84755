// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! Per-Func rendering configuration and observed statistics.

use std::io::{self, Write};

use lantern_trace::Packet;
use log::debug;

/// Most trace dimensions a Func can carry.
pub const MAX_DIMS: usize = 16;

/// A text label that fades in over the Func it is attached to.
#[derive(Clone, Debug)]
pub struct Label {
    pub text: String,
    pub x: i64,
    pub y: i64,
    /// Frames the fade-in is spread over.
    pub fade_frames: u64,
}

/// How one Func is drawn. Fixed once the command line is parsed.
#[derive(Clone, Debug)]
pub struct FuncConfig {
    /// Value mapped to black.
    pub min: f64,
    /// Value mapped to white.
    pub max: f64,
    /// Which trace dimension selects the color channel; negative means
    /// grayscale.
    pub color_dim: i32,
    /// Blank the Func's region of the image when a realization ends.
    pub blank_on_end: bool,
    /// Screen pixels per Func coordinate step.
    pub zoom: i64,
    /// Trace-clock units one stored value costs.
    pub cost: u64,
    /// Screen position of the Func's (0, .., 0) coordinate.
    pub x: i64,
    pub y: i64,
    /// Trace dimensions given stride mappings.
    pub dims: usize,
    /// Per-dimension screen x offset per coordinate step.
    pub x_stride: [i64; MAX_DIMS],
    /// Per-dimension screen y offset per coordinate step.
    pub y_stride: [i64; MAX_DIMS],
    pub labels: Vec<Label>,
}

impl Default for FuncConfig {
    fn default() -> Self {
        Self {
            min: 0.0,
            max: 0.0,
            color_dim: -1,
            blank_on_end: false,
            zoom: 0,
            cost: 0,
            x: 0,
            y: 0,
            dims: 0,
            x_stride: [0; MAX_DIMS],
            y_stride: [0; MAX_DIMS],
            labels: Vec::new(),
        }
    }
}

impl FuncConfig {
    /// Log the parsed configuration, mirroring what the flags described.
    pub fn dump(&self, name: &str) {
        debug!(
            "Func {name}: min {} max {} color_dim {} blank {} zoom {} cost {} at ({}, {})",
            self.min, self.max, self.color_dim, self.blank_on_end, self.zoom, self.cost, self.x, self.y
        );
        for d in 0..self.dims {
            debug!(
                "  dim {d}: stride ({}, {})",
                self.x_stride[d], self.y_stride[d]
            );
        }
    }
}

/// What the trace revealed about one Func.
#[derive(Clone, Debug)]
pub struct FuncStats {
    /// Pipeline-qualified name, learned from the first resolved event.
    pub qualified_name: String,
    /// Trace-clock value when the Func was first drawn.
    pub first_draw_time: Option<u64>,
    /// Index of the first packet that touched the Func; orders the report.
    pub first_packet_idx: Option<u64>,
    pub min_value: f64,
    pub max_value: f64,
    /// Inclusive lower bounds of the touched domain, per dimension.
    pub min_coord: [i64; MAX_DIMS],
    /// Exclusive upper bounds of the touched domain, per dimension.
    pub max_coord: [i64; MAX_DIMS],
    pub num_realizations: u32,
    pub num_productions: u32,
    pub loads: u64,
    pub stores: u64,
}

impl Default for FuncStats {
    fn default() -> Self {
        Self {
            qualified_name: String::new(),
            first_draw_time: None,
            first_packet_idx: None,
            min_value: 0.0,
            max_value: 0.0,
            min_coord: [0; MAX_DIMS],
            max_coord: [0; MAX_DIMS],
            num_realizations: 0,
            num_productions: 0,
            loads: 0,
            stores: 0,
        }
    }
}

impl FuncStats {
    /// Fold a load event into the statistics.
    pub fn observe_load(&mut self, packet: &Packet) {
        self.observe_access(packet);
        self.loads += u64::from(packet.width);
    }

    /// Fold a store event into the statistics.
    pub fn observe_store(&mut self, packet: &Packet) {
        self.observe_access(packet);
        self.stores += u64::from(packet.width);
    }

    fn observe_access(&mut self, packet: &Packet) {
        let width = packet.width as usize;
        let untouched = self.loads + self.stores == 0;

        let dims = MAX_DIMS.min(packet.num_int_args as usize / width);
        for dim in 0..dims {
            for lane in 0..width {
                let coord = i64::from(packet.get_int_arg(dim * width + lane));
                if untouched && lane == 0 {
                    self.min_coord[dim] = coord;
                    self.max_coord[dim] = coord + 1;
                } else {
                    self.min_coord[dim] = self.min_coord[dim].min(coord);
                    self.max_coord[dim] = self.max_coord[dim].max(coord + 1);
                }
            }
        }

        for lane in 0..width {
            let value = packet.value_as_f64(lane);
            if untouched && lane == 0 {
                self.min_value = value;
                self.max_value = value;
            } else {
                self.min_value = self.min_value.min(value);
                self.max_value = self.max_value.max(value);
            }
        }
    }

    /// Write the per-Func summary lines of the end-of-trace report.
    pub fn report_into<W: Write>(&self, out: &mut W) -> io::Result<()> {
        writeln!(out, "Func {}:", self.qualified_name)?;
        write!(out, " bounds of domain: ")?;
        for dim in 0..MAX_DIMS {
            if self.min_coord[dim] == 0 && self.max_coord[dim] == 0 {
                break;
            }
            if dim > 0 {
                write!(out, " x ")?;
            }
            write!(out, "[{}, {})", self.min_coord[dim], self.max_coord[dim])?;
        }
        writeln!(out)?;
        writeln!(
            out,
            " range of values: [{:.6}, {:.6}]",
            self.min_value, self.max_value
        )?;
        writeln!(out, " number of realizations: {}", self.num_realizations)?;
        writeln!(out, " number of productions: {}", self.num_productions)?;
        writeln!(out, " number of loads: {}", self.loads)?;
        writeln!(out, " number of stores: {}", self.stores)?;
        Ok(())
    }
}
