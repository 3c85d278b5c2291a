// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! BlazeNet coordinator daemon entry point.
//!
//! Wires the components together in dependency order (transport → radio →
//! protocol handler → RPC server), then parks on the run loop until a quit
//! signal arrives. Teardown happens in the reverse order via drops.

use blazed::config::Config;
use blazed::confd::Confd;
use blazed::protocol::Handler;
use blazed::radio::Radio;
use blazed::rpc::server::RpcServer;
use blazed::runloop::{self, RunLoop};
use blazed::transport::{self, spidev::SpidevTransport, Transport};
use blazed::version;
use clap::Parser;
use std::cell::RefCell;
use std::path::PathBuf;
use std::process::ExitCode;
use std::rc::Rc;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// BlazeNet coordinator: drives the radio coprocessor and serves local RPC.
#[derive(Parser, Debug)]
#[command(name = "blazed")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the daemon config file
    #[arg(long)]
    config: PathBuf,

    /// Log verbosity, -3 (least) to 2 (most)
    #[arg(long, default_value = "0", allow_hyphen_values = true)]
    log_level: i8,

    /// Omit timestamps from log output (for systemd/syslog use)
    #[arg(long)]
    log_simple: bool,
}

fn init_logging(level: i8, simple: bool) -> Result<(), String> {
    let level = match level {
        2 => Level::TRACE,
        1 => Level::DEBUG,
        0 => Level::INFO,
        -1 => Level::WARN,
        -2 | -3 => Level::ERROR,
        other => return Err(format!("invalid log level {other} (must be [-3, 2])")),
    };

    // try_init also installs the bridge that forwards `log` records
    let builder = FmtSubscriber::builder().with_max_level(level);
    let result = if simple {
        builder.without_time().try_init()
    } else {
        builder.try_init()
    };
    result.map_err(|e| e.to_string())
}

fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(e) = init_logging(args.log_level, args.log_simple) {
        eprintln!("failed to set up logging: {e}");
        return ExitCode::FAILURE;
    }

    log::info!(
        "starting blazed version {} ({})",
        version::VERSION,
        version::BUILD_REV
    );

    let config = match Config::from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            log::error!("failed to parse config file: {e}");
            return ExitCode::FAILURE;
        }
    };

    match run(&config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("initialization failed: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let mut run_loop = RunLoop::new()?;
    let handle = run_loop.handle();
    runloop::watch_quit_signals(&handle)?;

    // runtime configuration daemon
    let runtime = Rc::new(Confd::connect(&config.confd.socket)?);

    // radio transport and the radio itself (this configures the hardware)
    let transport = transport::create(&config.radio.transport)?;
    SpidevTransport::watch_irq(&transport, &handle)?;

    let dyn_transport: Rc<RefCell<dyn Transport>> = transport;
    let radio = Radio::attach(dyn_transport, config, runtime.clone(), &handle)?;

    // protocol handling (brings up beaconing)
    let handler = Handler::new(radio.clone(), runtime)?;

    // lastly, the local RPC server
    let rpc = RpcServer::start(radio.clone(), handler.clone(), &config.rpc, &handle)?;

    run_loop.run()?;

    log::debug!("shutting down");
    // reverse construction order; dropping the handler disables beaconing
    drop(rpc);
    drop(handler);
    drop(radio);

    Ok(())
}
