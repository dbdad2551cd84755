// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! Renders compiler memory-trace packets from stdin as raw video frames on
//! stdout.
//!
//! For example, to watch a traced pipeline run:
//!   run_traced_pipeline | lantern -t 1000 \
//!     -f brighten 0 255 -1 0 4 1 32 32 1 0 0 1 | \
//!     mplayer -demuxer rawvideo \
//!       -rawvideo w=1920:h=1080:format=rgba:fps=30 -idle -fixed-vo -

use std::io::{self, BufWriter, Write};
use std::process;

use anyhow::Result;
use clap::Parser;
use lantern::App;
use lantern::cli::{self, Cli, Settings, UsageError};
use lantern::registry::Registry;
use log::{LevelFilter, debug, error};
use simplelog::{ConfigBuilder, WriteLogger};

fn init_logging(level: LevelFilter) {
    // Build up the logging configuration such that:
    let config = ConfigBuilder::new()
        .set_time_level(LevelFilter::Off) // No timestamps are printed
        .set_location_level(LevelFilter::Off) // No file locations are printed
        .set_thread_level(LevelFilter::Off) // No thread information is printed
        .set_target_level(LevelFilter::Off) // No target is printed
        .build();
    // Frames own stdout, so all log output goes to stderr.
    WriteLogger::init(level, config, io::stderr()).unwrap();
}

fn run(cli: &Cli) -> Result<()> {
    let settings = Settings::from_cli(cli)?;

    let mut registry = Registry::new();
    for (name, config) in cli::parse_funcs(&cli.func)? {
        registry.insert(&name, config);
    }
    for (name, label) in cli::parse_labels(&cli.label)? {
        debug!("adding label '{}' to func {name}", label.text);
        registry.add_label(&name, label);
    }

    let mut app = App::new(&settings, registry);

    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut output = BufWriter::new(stdout.lock());
    app.run(&mut stdin.lock(), &mut output)?;
    drop(output);

    let stderr = io::stderr();
    app.registry().report(&mut stderr.lock())?;
    Ok(())
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            // clap renders both --help output and usage errors.
            let _ = err.print();
            process::exit(if err.use_stderr() { -1 } else { 0 });
        }
    };
    init_logging(cli.log_level);

    if let Err(err) = run(&cli) {
        error!("{err:#}");
        if err.is::<UsageError>() {
            let _ = writeln!(io::stderr(), "run 'lantern --help' for the flag reference");
        }
        process::exit(-1);
    }
}
