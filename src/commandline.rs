use crate::mqtt;
use clap::{Parser, Subcommand};
use clap_verbosity_flag::{InfoLevel, Verbosity};
use std::time::Duration;

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum CliCommands {
    /// Bridge frames between two CAN interfaces, overlaying the computed SoC
    Run {
        /// CAN interface of channel A, the BMU side (e.g. can0, vcan0)
        #[arg(long, default_value = "can0")]
        can_a: String,

        /// CAN interface of channel B, the vehicle side
        #[arg(long, default_value = "can1")]
        can_b: String,

        /// Battery pack capacity in amp-hours
        #[arg(long, default_value_t = 90.0)]
        capacity: f32,

        /// Interval between status reports (e.g. "10s", "1m")
        #[clap(long, short, value_parser = humantime::parse_duration, default_value = "10s")]
        interval: Duration,

        /// Status output destination
        #[command(subcommand)]
        output: RunOutput,
    },
    /// Send a set-temperature-override diagnostic command (function 1) on an
    /// interface. The override lasts 10 seconds of SoC frames and is subject
    /// to the bridge's safety gate.
    SendOverride {
        /// CAN interface to send the command on
        #[arg(long, default_value = "can0")]
        interface: String,

        /// Override minimum cell temperature in degrees Celsius
        min_temp: f32,

        /// Override maximum cell temperature in degrees Celsius
        max_temp: f32,
    },
}

#[derive(clap::ValueEnum, Debug, Clone, PartialEq)]
pub enum MqttFormat {
    Simple,
    Json,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum RunOutput {
    /// Periodically print the bridge status to the standard output (console).
    Console,
    /// Periodically publish the bridge status to an MQTT broker.
    Mqtt {
        /// The configuration file for the MQTT broker
        #[arg(long, default_value_t = mqtt::MqttConfig::DEFAULT_CONFIG_FILE.to_string())]
        config_file: String,
        /// Output format for MQTT messages
        #[arg(long, value_enum, default_value_t = MqttFormat::Simple)]
        format: MqttFormat,
    },
}

const fn about_text() -> &'static str {
    "EV battery CAN bridge command line tool"
}

#[derive(Parser, Debug)]
#[command(version, about=about_text(), long_about = None)]
pub struct CliArgs {
    #[command(flatten)]
    pub verbose: Verbosity<InfoLevel>,

    #[command(subcommand)]
    pub command: CliCommands,
}
