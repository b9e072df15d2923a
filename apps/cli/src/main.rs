#![allow(clippy::print_stdout)]

mod args;
mod commands;
mod config;

use crate::args::{Cli, Command, StoreCommand};
use crate::config::CliConfig;
use anyhow::Result;
use cachet_logger::Logger;
use cachet_store::{Connection, ConnectionOptions};
use clap::Parser;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = CliConfig::load(&cli)?;

    let _logger = Logger::builder(env!("CARGO_BIN_NAME")).settings(&config.log)?.init()?;

    let command = match cli.command {
        Command::CheckSegment { name } => {
            return commands::check_segment(&config.store.partition, &name);
        },
        Command::Store(command) => command,
    };

    let options = ConnectionOptions::try_from(config.store)?;
    let conn = Connection::new(options);
    conn.start().await?;

    let outcome = run(&conn, command).await;
    conn.stop();
    outcome
}

async fn run(conn: &Connection, command: StoreCommand) -> Result<()> {
    match command {
        StoreCommand::Ping => commands::ping(conn).await,
        StoreCommand::Get { segment, id } => commands::get(conn, segment, id).await,
        StoreCommand::Set { segment, id, value, ttl } => {
            commands::set(conn, segment, id, &value, ttl).await
        },
        StoreCommand::Drop { segment, id } => commands::drop(conn, segment, id).await,
        StoreCommand::Purge { segment } => commands::purge(conn, &segment).await,
    }
}
