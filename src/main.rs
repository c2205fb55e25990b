use anyhow::{Context, Result};
use clap::Parser;
use flexi_logger::{Logger, LoggerHandle};
use log::*;
use std::{ops::Deref, panic};

use bmubridge_lib::diagnostic::Diagnostic;
use bmubridge_lib::frame::CanFrame;
use bmubridge_lib::units::CellTemperature;

mod commandline;
mod daemon;
mod mqtt;

fn logging_init(loglevel: LevelFilter) -> LoggerHandle {
    let log_handle = Logger::try_with_env_or_str(loglevel.as_str())
        .expect("Cannot init logging")
        .start()
        .expect("Cannot start logging");

    panic::set_hook(Box::new(|panic_info| {
        let (filename, line, column) = panic_info
            .location()
            .map(|loc| (loc.file(), loc.line(), loc.column()))
            .unwrap_or(("<unknown>", 0, 0));
        let cause = panic_info
            .payload()
            .downcast_ref::<String>()
            .map(String::deref);
        let cause = cause.unwrap_or_else(|| {
            panic_info
                .payload()
                .downcast_ref::<&str>()
                .copied()
                .unwrap_or("<cause unknown>")
        });

        error!(
            "Thread '{}' panicked at {}:{}:{}: {}",
            std::thread::current().name().unwrap_or("<unknown>"),
            filename,
            line,
            column,
            cause
        );
    }));
    log_handle
}

fn main() -> Result<()> {
    let args = commandline::CliArgs::parse();

    let _log_handle = logging_init(args.verbose.log_level_filter());

    match args.command {
        commandline::CliCommands::Run {
            can_a,
            can_b,
            capacity,
            interval,
            output,
        } => daemon::run(&can_a, &can_b, capacity, interval, output)?,
        commandline::CliCommands::SendOverride {
            interface,
            min_temp,
            max_temp,
        } => {
            let command = CanFrame::new(
                Diagnostic::COMMAND_MESSAGE_ID,
                &[
                    Diagnostic::FUNCTION_SET_TEMPERATURE_OVERRIDE,
                    CellTemperature::from_celsius(min_temp).to_can_byte(),
                    CellTemperature::from_celsius(max_temp).to_can_byte(),
                ],
            );
            bmubridge_lib::socketcan::send_single(&interface, &command)
                .with_context(|| format!("Cannot send override command on '{interface}'"))?;
            info!(
                "Temperature override command sent on {interface}: min={min_temp} degC max={max_temp} degC"
            );
        }
    }

    Ok(())
}
