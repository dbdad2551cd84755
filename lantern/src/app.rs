// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! The event loop: packets in, frames out.
//!
//! Packets are processed strictly in stream order. Before each packet the
//! frame pump drains every frame the virtual clock owes, so all pixel
//! effects of earlier events are visible in a frame before any effect of a
//! later one. After the stream ends the pump keeps the picture on screen
//! for the configured number of hold frames.

use std::io::{Read, Write};

use anyhow::{Context, Result};
use lantern_screen::font::draw_text;
use lantern_screen::{Screen, Surface};
use lantern_trace::{EventCode, Packet, TraceError};
use log::{debug, error};
use num_traits::FromPrimitive;

use crate::cli::Settings;
use crate::clock::FrameClock;
use crate::func::FuncConfig;
use crate::pipeline::{PipelineInfo, PipelineTracker};
use crate::registry::{FuncEntry, Registry};

/// Highlight painted over pixels a Func loads from.
const LOAD_HIGHLIGHT: u32 = 0xff44_ddff;

/// Highlight painted over pixels a Func stores to.
const STORE_HIGHLIGHT: u32 = 0xffff_dd44;

pub struct App {
    registry: Registry,
    pipelines: PipelineTracker,
    clock: FrameClock,
    screen: Screen,
    decay: u32,
    hold_frames: u64,
    packet_index: u64,
    frames_written: u64,
}

impl App {
    #[must_use]
    pub fn new(settings: &Settings, registry: Registry) -> Self {
        Self {
            registry,
            pipelines: PipelineTracker::new(),
            clock: FrameClock::new(settings.timestep),
            screen: Screen::new(settings.frame_width, settings.frame_height),
            decay: settings.decay,
            hold_frames: settings.hold_frames,
            packet_index: 0,
            frames_written: 0,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    /// Consume the trace on `input` and write frames to `output` until the
    /// stream and the hold period are exhausted.
    pub fn run<R: Read, W: Write>(&mut self, input: &mut R, output: &mut W) -> Result<()> {
        loop {
            self.pump(output)?;
            match Packet::read_from(input) {
                Ok(Some(packet)) => self.dispatch(&packet)?,
                Ok(None) => break,
                Err(TraceError::Io(err)) => {
                    return Err(err).context("failed reading trace stream");
                }
                Err(err) => {
                    // A damaged stream ends the trace but keeps the tail of
                    // the animation.
                    error!("{err}");
                    break;
                }
            }
        }

        self.pump(output)?;
        for _ in 0..self.hold_frames {
            self.clock.advance_hold();
            self.pump(output)?;
        }
        output.flush().context("could not write frame to stdout")?;
        Ok(())
    }

    /// Emit every frame the traced work has paid for.
    fn pump<W: Write>(&mut self, output: &mut W) -> Result<()> {
        while self.clock.frame_due() {
            self.screen
                .compose_frame(output)
                .context("could not write frame to stdout")?;
            self.clock.complete_frame();
            self.screen.decay_anim(self.decay);
            self.frames_written += 1;
        }
        Ok(())
    }

    fn dispatch(&mut self, packet: &Packet) -> Result<()> {
        self.packet_index += 1;
        let Some(event) = EventCode::from_u8(packet.event) else {
            return Err(TraceError::UnknownEvent(packet.event).into());
        };

        match event {
            EventCode::BeginPipeline => {
                self.pipelines.begin_pipeline(packet.id, &packet.name());
                return Ok(());
            }
            EventCode::EndPipeline => {
                self.pipelines.end_pipeline(packet.id);
                return Ok(());
            }
            _ => {}
        }

        let pipeline = self.pipelines.resolve(packet.parent);

        // Scope pairing holds even when the Func itself is not registered.
        match event {
            EventCode::BeginRealization | EventCode::Produce => {
                self.pipelines.begin_realize(packet.id, packet.parent);
            }
            EventCode::EndRealization | EventCode::EndConsume => {
                self.pipelines.end_realize(packet.parent);
            }
            _ => {}
        }

        let func_name = packet.name();
        let Some(entry) =
            self.registry
                .resolve(&pipeline.name, &func_name, self.packet_index, self.clock.now())
        else {
            return Ok(());
        };

        match event {
            EventCode::Load => {
                Self::paint_access(&mut self.screen, &mut self.clock, entry, packet, &pipeline, false);
            }
            EventCode::Store => {
                Self::paint_access(&mut self.screen, &mut self.clock, entry, packet, &pipeline, true);
            }
            EventCode::BeginRealization => entry.stats.num_realizations += 1,
            EventCode::EndRealization => {
                if entry.config.blank_on_end {
                    Self::blank_realization(&mut self.screen.image, &entry.config, packet);
                }
            }
            EventCode::Produce => entry.stats.num_productions += 1,
            EventCode::Update | EventCode::Consume | EventCode::EndConsume => {}
            EventCode::BeginPipeline | EventCode::EndPipeline => unreachable!(),
        }
        Ok(())
    }

    /// Draw one load or store: fading labels, the access highlight, and for
    /// stores (or loads from the pipeline's own inputs) the image itself.
    fn paint_access(
        screen: &mut Screen,
        clock: &mut FrameClock,
        entry: &mut FuncEntry,
        packet: &Packet,
        pipeline: &PipelineInfo,
        is_store: bool,
    ) {
        let config = &entry.config;
        let stats = &mut entry.stats;

        let first_draw = stats.first_draw_time.unwrap_or_else(|| clock.now());
        let frames_shown = clock.frames_since(first_draw);
        for label in &config.labels {
            if frames_shown <= label.fade_frames {
                let intensity = fade_intensity(frames_shown, label.fade_frames);
                draw_text(
                    &mut screen.text,
                    &label.text,
                    label.x,
                    label.y,
                    intensity * 0x0001_0101,
                );
            }
        }

        if is_store {
            // Stores take time proportional to the values stored.
            clock.add_cost(config.cost * u64::from(packet.width));
            stats.observe_store(packet);
        } else {
            stats.observe_load(packet);
        }

        let width = packet.width as usize;
        if (packet.num_int_args as usize) < config.dims * width {
            debug!(
                "access to {} carries fewer coordinates than its {} dimensions",
                stats.qualified_name, config.dims
            );
            return;
        }

        let highlight = if is_store { STORE_HIGHLIGHT } else { LOAD_HIGHLIGHT };
        // Loads whose parent is the pipeline itself read an input image;
        // those pixels belong on the image layer like stored ones do.
        let update_image = is_store || packet.parent == pipeline.id;

        for lane in 0..width {
            let mut x = config.x;
            let mut y = config.y;
            for dim in 0..config.dims {
                let coord = i64::from(packet.get_int_arg(dim * width + lane));
                x += config.zoom * config.x_stride[dim] * coord;
                y += config.zoom * config.y_stride[dim] * coord;
            }

            screen.anim.fill_rect(x, y, config.zoom, config.zoom, highlight);

            if update_image {
                let level = normalize(packet.value_as_f64(lane), config.min, config.max);
                let pixel = if config.color_dim < 0 {
                    0xff00_0000 | level * 0x0001_0101
                } else {
                    let channel =
                        packet.get_int_arg(config.color_dim as usize * width + lane) as u32;
                    let shift = (channel & 3) * 8;
                    let existing = screen.image.get(x, y).unwrap_or(0);
                    (existing & !(0xff << shift)) | (level << shift) | 0xff00_0000
                };
                screen.image.fill_rect(x, y, config.zoom, config.zoom, pixel);
            }
        }
    }

    /// Clear the image rectangle a finished realization covered.
    fn blank_realization(image: &mut Surface, config: &FuncConfig, packet: &Packet) {
        if (packet.num_int_args as usize) < 2 * config.dims {
            debug!("end of realization carries fewer extents than {} dimensions", config.dims);
            return;
        }

        let mut x_min = config.x;
        let mut y_min = config.y;
        let mut x_extent = 0i64;
        let mut y_extent = 0i64;
        for dim in 0..config.dims {
            let lo = i64::from(packet.get_int_arg(2 * dim));
            let extent = i64::from(packet.get_int_arg(2 * dim + 1));
            x_min += config.zoom * config.x_stride[dim] * lo;
            y_min += config.zoom * config.y_stride[dim] * lo;
            x_extent += config.zoom * config.x_stride[dim] * extent;
            y_extent += config.zoom * config.y_stride[dim] * extent;
        }
        // A dimension that never moves on screen still clears one block.
        if x_extent == 0 {
            x_extent = config.zoom;
        }
        if y_extent == 0 {
            y_extent = config.zoom;
        }
        image.fill_rect(x_min, y_min, x_extent, y_extent, 0);
    }
}

/// Map a stored value onto 0..=255 between the Func's min and max.
fn normalize(value: f64, min: f64, max: f64) -> u32 {
    let scaled = 255.0 * (value - min) / (max - min);
    scaled.clamp(0.0, 255.0) as u32
}

/// Label intensity after `frames_shown` frames of an `n`-frame fade.
fn fade_intensity(frames_shown: u64, fade_frames: u64) -> u32 {
    if fade_frames == 0 {
        return 255;
    }
    let ramp = ((frames_shown + 1) * 255 + fade_frames / 2) / fade_frames;
    ramp.min(255) as u32
}

#[cfg(test)]
mod tests {
    use lantern_trace::test_helpers::PacketBuilder;

    use super::*;
    use crate::func::Label;

    fn packet(builder: PacketBuilder) -> Packet {
        let bytes = builder.encode();
        let mut stream = bytes.as_slice();
        Packet::read_from(&mut stream).unwrap().unwrap()
    }

    fn single_func_app(settings: &Settings, name: &str, config: FuncConfig) -> App {
        let mut registry = Registry::new();
        registry.insert(name, config);
        App::new(settings, registry)
    }

    fn gray_config(zoom: i64, cost: u64) -> FuncConfig {
        FuncConfig {
            min: 0.0,
            max: 255.0,
            color_dim: -1,
            zoom,
            cost,
            dims: 2,
            x_stride: [1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0],
            y_stride: [0, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0],
            ..FuncConfig::default()
        }
    }

    #[test]
    fn store_cost_advances_the_clock_before_the_next_frame() {
        let settings = Settings {
            frame_width: 8,
            frame_height: 8,
            timestep: 10,
            ..Settings::default()
        };
        let mut app = single_func_app(&settings, "f", gray_config(1, 10));

        app.dispatch(&packet(
            PacketBuilder::new(EventCode::Store)
                .name("f")
                .value_u32(255)
                .int_args(&[0, 0]),
        ))
        .unwrap();
        assert_eq!(app.clock.now(), 10);
        assert!(app.clock.frame_due());
    }

    #[test]
    fn loads_highlight_but_cost_nothing() {
        let settings = Settings {
            frame_width: 8,
            frame_height: 8,
            timestep: 10,
            ..Settings::default()
        };
        let mut app = single_func_app(&settings, "f", gray_config(1, 10));

        app.dispatch(&packet(
            PacketBuilder::new(EventCode::BeginPipeline).id(1).name("p"),
        ))
        .unwrap();
        app.dispatch(&packet(
            PacketBuilder::new(EventCode::BeginRealization).id(2).parent(1).name("f"),
        ))
        .unwrap();
        app.dispatch(&packet(
            PacketBuilder::new(EventCode::Load)
                .parent(2)
                .name("f")
                .value_u32(7)
                .int_args(&[2, 3]),
        ))
        .unwrap();

        assert_eq!(app.clock.now(), 0);
        assert_eq!(app.screen.anim.get(2, 3), Some(LOAD_HIGHLIGHT));
        // A load from inside a realization is not an input-image read, so
        // the image layer is left alone.
        assert_eq!(app.screen.image.get(2, 3), Some(0));
    }

    #[test]
    fn input_image_loads_paint_the_image_layer() {
        let settings = Settings {
            frame_width: 8,
            frame_height: 8,
            timestep: 10,
            ..Settings::default()
        };
        let mut app = single_func_app(&settings, "input", gray_config(1, 0));

        app.dispatch(&packet(
            PacketBuilder::new(EventCode::BeginPipeline).id(1).name("p"),
        ))
        .unwrap();
        // The load's parent is the pipeline itself: an input image read.
        app.dispatch(&packet(
            PacketBuilder::new(EventCode::Load)
                .parent(1)
                .name("input")
                .value_u32(255)
                .int_args(&[4, 4]),
        ))
        .unwrap();

        assert_eq!(app.screen.anim.get(4, 4), Some(LOAD_HIGHLIGHT));
        assert_eq!(app.screen.image.get(4, 4), Some(0xffff_ffff));
    }

    #[test]
    fn highlight_alpha_traces_the_decay_curve() {
        // Two stores of cost 10 at one pixel, three frame boundaries apart.
        let settings = Settings {
            frame_width: 4,
            frame_height: 4,
            timestep: 5,
            decay: 2,
            hold_frames: 2,
            ..Settings::default()
        };
        let mut app = single_func_app(&settings, "f", gray_config(1, 10));
        let store = || {
            packet(
                PacketBuilder::new(EventCode::Store)
                    .name("f")
                    .value_u32(255)
                    .int_args(&[0, 0]),
            )
        };

        let mut sink = Vec::new();
        let mut alphas = Vec::new();
        let mut record_frames = |app: &mut App, sink: &mut Vec<u8>| {
            while app.clock.frame_due() {
                alphas.push(app.screen.anim.get(0, 0).unwrap() >> 24);
                app.screen.compose_frame(sink).unwrap();
                app.clock.complete_frame();
                app.screen.decay_anim(app.decay);
            }
        };

        app.dispatch(&store()).unwrap();
        record_frames(&mut app, &mut sink);
        app.dispatch(&store()).unwrap();
        record_frames(&mut app, &mut sink);
        for _ in 0..settings.hold_frames {
            app.clock.advance_hold();
            record_frames(&mut app, &mut sink);
        }

        assert_eq!(alphas, vec![0xff, 0x7f, 0xff, 0x7f, 0x3f, 0x1f]);
    }

    #[test]
    fn qualified_funcs_shadow_bare_ones() {
        let settings = Settings {
            frame_width: 8,
            frame_height: 8,
            ..Settings::default()
        };
        let mut registry = Registry::new();
        registry.insert("foo", gray_config(1, 1));
        registry.insert("p:foo", gray_config(1, 1));
        let mut app = App::new(&settings, registry);

        app.dispatch(&packet(
            PacketBuilder::new(EventCode::BeginPipeline).id(1).name("p"),
        ))
        .unwrap();
        app.dispatch(&packet(
            PacketBuilder::new(EventCode::BeginRealization).id(2).parent(1).name("foo"),
        ))
        .unwrap();
        app.dispatch(&packet(
            PacketBuilder::new(EventCode::Store)
                .parent(2)
                .name("foo")
                .value_u32(9)
                .int_args(&[0, 0]),
        ))
        .unwrap();

        let report = {
            let mut buffer = Vec::new();
            app.registry().report(&mut buffer).unwrap();
            String::from_utf8(buffer).unwrap()
        };
        assert!(report.contains("Func p:foo:"));
        let stores_of = |name: &str| {
            report
                .split("Func ")
                .find(|chunk| chunk.starts_with(name))
                .map(|chunk| chunk.contains("number of stores: 1"))
                .unwrap()
        };
        assert!(stores_of("p:foo:"));
        assert!(!stores_of("foo:"));
    }

    #[test]
    fn color_stores_replace_one_channel() {
        let settings = Settings {
            frame_width: 8,
            frame_height: 8,
            ..Settings::default()
        };
        let config = FuncConfig {
            min: 0.0,
            max: 255.0,
            color_dim: 2,
            zoom: 1,
            cost: 1,
            dims: 2,
            x_stride: [1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0],
            y_stride: [0, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0],
            ..FuncConfig::default()
        };
        let mut app = single_func_app(&settings, "f", config);

        // Same pixel, channel 0 then channel 1; num_int_args covers the
        // color dimension as well.
        app.dispatch(&packet(
            PacketBuilder::new(EventCode::Store)
                .name("f")
                .value_u32(0x40)
                .int_args(&[1, 1, 0]),
        ))
        .unwrap();
        app.dispatch(&packet(
            PacketBuilder::new(EventCode::Store)
                .name("f")
                .value_u32(0x80)
                .int_args(&[1, 1, 1]),
        ))
        .unwrap();

        let px = app.screen.image.get(1, 1).unwrap();
        assert_eq!(px & 0xff, 0x40);
        assert_eq!((px >> 8) & 0xff, 0x80);
        assert_eq!((px >> 16) & 0xff, 0x00);
        assert_eq!(px >> 24, 0xff);
    }

    #[test]
    fn labels_fade_in_one_step_per_frame() {
        let settings = Settings {
            frame_width: 64,
            frame_height: 64,
            timestep: 10,
            hold_frames: 0,
            ..Settings::default()
        };
        let mut registry = Registry::new();
        let mut config = gray_config(1, 10);
        config.labels.push(Label {
            text: String::from("f"),
            x: 0,
            y: 40,
            fade_frames: 4,
        });
        registry.insert("f", config);
        let mut app = App::new(&settings, registry);

        let store = || {
            packet(
                PacketBuilder::new(EventCode::Store)
                    .name("f")
                    .value_u32(1)
                    .int_args(&[0, 0]),
            )
        };
        let text_intensity = |app: &App| {
            app.screen
                .text
                .pixels()
                .iter()
                .find(|&&px| px >> 24 != 0)
                .map(|&px| px & 0xff)
                .unwrap()
        };

        let mut sink = Vec::new();
        let mut seen = Vec::new();
        // Each store costs one full frame, so the fade advances one step
        // per event.
        for _ in 0..7 {
            app.dispatch(&store()).unwrap();
            seen.push(text_intensity(&app));
            app.pump(&mut sink).unwrap();
        }

        assert_eq!(seen, vec![64, 128, 191, 255, 255, 255, 255]);
    }

    #[test]
    fn unknown_event_codes_are_fatal() {
        let settings = Settings {
            frame_width: 4,
            frame_height: 4,
            ..Settings::default()
        };
        let mut app = App::new(&settings, Registry::new());
        let result = app.dispatch(&packet(
            PacketBuilder::new(EventCode::Store).event_raw(77).name("f"),
        ));
        assert!(result.is_err());
    }

    #[test]
    fn blanking_clears_the_realized_rectangle() {
        let settings = Settings {
            frame_width: 32,
            frame_height: 4,
            ..Settings::default()
        };
        let config = FuncConfig {
            min: 0.0,
            max: 255.0,
            color_dim: -1,
            blank_on_end: true,
            zoom: 2,
            cost: 1,
            dims: 1,
            x_stride: [1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0],
            y_stride: [0; 16],
            ..FuncConfig::default()
        };
        let mut app = single_func_app(&settings, "f", config);

        app.dispatch(&packet(
            PacketBuilder::new(EventCode::BeginPipeline).id(1).name("p"),
        ))
        .unwrap();
        app.dispatch(&packet(
            PacketBuilder::new(EventCode::BeginRealization)
                .id(2)
                .parent(1)
                .name("f"),
        ))
        .unwrap();
        for coord in 0..8 {
            app.dispatch(&packet(
                PacketBuilder::new(EventCode::Store)
                    .parent(2)
                    .name("f")
                    .value_u32(200)
                    .int_args(&[coord]),
            ))
            .unwrap();
        }
        assert!(app.screen.image.get(0, 0).unwrap() != 0);
        assert!(app.screen.image.get(15, 1).unwrap() != 0);

        app.dispatch(&packet(
            PacketBuilder::new(EventCode::EndRealization)
                .id(2)
                .parent(2)
                .name("f")
                .int_args(&[0, 8]),
        ))
        .unwrap();

        for x in 0..16 {
            assert_eq!(app.screen.image.get(x, 0), Some(0), "column {x}");
            assert_eq!(app.screen.image.get(x, 1), Some(0), "column {x}");
        }
        assert_eq!(app.registry.resolve("p", "f", 99, 0).unwrap().stats.num_realizations, 1);
    }
}
