// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! Command-line surface of the renderer.
//!
//! Most flags are single-valued, but `-f` and `-l` take whole groups of
//! values per occurrence: a Func registration consumes its fixed fields
//! and then stride pairs until the next flag, and a label consumes five
//! fields. The groups arrive as raw strings and are checked here.

use std::fmt;

use clap::{ArgAction, Parser};
use log::LevelFilter;

use crate::func::{FuncConfig, Label, MAX_DIMS};

const FLAG_GUIDE: &str = "\
Trace packets are read from stdin and raw 8-bit RGBA frames are written to
stdout; pipe the output into a video encoder or player, e.g.

  run_traced_pipeline | lantern -s 1920 1080 -t 10000 <func args> | \\
    avconv -f rawvideo -pix_fmt bgr32 -s 1920x1080 -i /dev/stdin -c:v h264 out.avi

Each Func to visualize needs a -f registration:

  -f name min max color_dim blank zoom cost x y <x_stride y_stride>...

  name       Func or input image name. With several pipelines in one trace,
             names can be qualified as pipeline_name:func_name.
  min, max   Values mapped to black and to white respectively.
  color_dim  Which dimension indexes color channels (usually 2); -1 draws
             the Func as grayscale.
  blank      1 to blank the Func's region when a realization ends, 0 to
             leave the last stored values visible.
  zoom       Each value draws as a zoom x zoom block.
  cost       Trace-clock units one stored value accounts for, relative to
             the timestep.
  x, y       Screen position of the Func's zero coordinate.
  strides    One (x, y) pair per Func dimension mapping coordinate steps to
             screen offsets, e.g. 1 0 0 1 0 0 for a 2D Func whose third
             dimension does not move on screen.";

/// Command-line arguments.
#[derive(Parser)]
#[command(
    about = "Renders compiler memory-trace packets from stdin as raw video frames on stdout",
    disable_help_flag = true,
    after_long_help = FLAG_GUIDE
)]
pub struct Cli {
    /// Output frame size
    #[arg(
        short = 's',
        num_args = 2,
        value_names = ["WIDTH", "HEIGHT"],
        default_values_t = [1920, 1080]
    )]
    pub size: Vec<usize>,

    /// Trace-clock units covered by each output frame
    #[arg(short = 't', value_name = "TIMESTEP", default_value_t = 10_000)]
    pub timestep: u64,

    /// Divisor applied to the highlight alpha after each frame
    #[arg(short = 'd', value_name = "DIVISOR", default_value_t = 2)]
    pub decay: u32,

    /// Frames to keep emitting after the trace ends
    #[arg(short = 'h', value_name = "FRAMES", default_value_t = 250)]
    pub hold_frames: u64,

    /// Attach a label that fades in when its Func is first drawn
    #[arg(
        short = 'l',
        num_args = 5,
        value_names = ["FUNC", "TEXT", "X", "Y", "FRAMES"],
        allow_negative_numbers = true,
        action = ArgAction::Append
    )]
    pub label: Vec<Vec<String>>,

    /// Register a Func to draw (see the help epilogue for the fields)
    #[arg(
        short = 'f',
        num_args = 9..,
        value_name = "SPEC",
        allow_negative_numbers = true,
        action = ArgAction::Append
    )]
    pub func: Vec<Vec<String>>,

    /// Level of log messages written to stderr
    #[arg(long, value_name = "LEVEL", default_value = "Info")]
    pub log_level: LevelFilter,

    /// Print help
    #[arg(long, action = ArgAction::HelpLong)]
    help: Option<bool>,
}

/// A malformed flag group.
#[derive(Debug)]
pub struct UsageError(pub String);

impl fmt::Display for UsageError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for UsageError {}

/// Everything the renderer needs besides the Funcs themselves.
pub struct Settings {
    pub frame_width: usize,
    pub frame_height: usize,
    pub timestep: u64,
    pub decay: u32,
    pub hold_frames: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            frame_width: 1920,
            frame_height: 1080,
            timestep: 10_000,
            decay: 2,
            hold_frames: 250,
        }
    }
}

impl Settings {
    /// Lift the single-valued flags out of the parsed command line.
    pub fn from_cli(cli: &Cli) -> Result<Self, UsageError> {
        if cli.size.len() != 2 {
            return Err(UsageError(String::from(
                "-s takes exactly one WIDTH HEIGHT pair",
            )));
        }
        if cli.decay == 0 {
            return Err(UsageError(String::from("-d requires a divisor of at least 1")));
        }
        Ok(Self {
            frame_width: cli.size[0],
            frame_height: cli.size[1],
            timestep: cli.timestep.max(1),
            decay: cli.decay,
            hold_frames: cli.hold_frames,
        })
    }
}

fn field<T: std::str::FromStr>(token: &str, what: &str) -> Result<T, UsageError> {
    token
        .parse()
        .map_err(|_| UsageError(format!("invalid {what} '{token}'")))
}

/// Check and convert every `-f` group into a named [`FuncConfig`].
pub fn parse_funcs(groups: &[Vec<String>]) -> Result<Vec<(String, FuncConfig)>, UsageError> {
    let mut funcs = Vec::with_capacity(groups.len());
    for group in groups {
        let name = group[0].clone();
        let mut config = FuncConfig {
            min: field(&group[1], "min value")?,
            max: field(&group[2], "max value")?,
            color_dim: field(&group[3], "color dimension")?,
            blank_on_end: field::<i32>(&group[4], "blank flag")? != 0,
            zoom: field(&group[5], "zoom")?,
            cost: field(&group[6], "cost")?,
            x: field(&group[7], "x position")?,
            y: field(&group[8], "y position")?,
            ..FuncConfig::default()
        };

        let strides = &group[9..];
        if strides.len() % 2 != 0 {
            return Err(UsageError(format!(
                "-f {name} has an unpaired stride value"
            )));
        }
        let dims = strides.len() / 2;
        if dims > MAX_DIMS {
            return Err(UsageError(format!(
                "-f {name} has {dims} stride pairs; at most {MAX_DIMS} dimensions are drawable"
            )));
        }
        for d in 0..dims {
            config.x_stride[d] = field(&strides[2 * d], "x stride")?;
            config.y_stride[d] = field(&strides[2 * d + 1], "y stride")?;
        }
        config.dims = dims;

        funcs.push((name, config));
    }
    Ok(funcs)
}

/// Check and convert every `-l` group into a named [`Label`].
pub fn parse_labels(groups: &[Vec<String>]) -> Result<Vec<(String, Label)>, UsageError> {
    let mut labels = Vec::with_capacity(groups.len());
    for group in groups {
        labels.push((
            group[0].clone(),
            Label {
                text: group[1].clone(),
                x: field(&group[2], "label x position")?,
                y: field(&group[3], "label y position")?,
                fade_frames: field(&group[4], "label fade frame count")?,
            },
        ));
    }
    Ok(labels)
}
