// Copyright 2025 dentsusoken
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use clap::{Parser, Subcommand};
use pathmutex::commands::exec::{ExecCommand, ExecOptions};
use pathmutex::commands::identity::IdentityCommand;
use pathmutex::commands::purge::PurgeCommand;
use pathmutex::config::{LockingMode, new_pathmutex_config};
use pathmutex::error::{Result, format_error_with_color, get_exit_code};
use pathmutex::logging;
use std::io::IsTerminal;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "pathmutex")]
#[command(author, version, about = "Run commands under a lock named after a file path", long_about = None)]
struct Cli {
    /// Increase verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a command while holding the lock for PATH
    #[command(long_about = "Run a command while holding the lock for PATH

The child sees PATHMUTEX_CREATED_NEW=1 when this run created the lock object,
0 otherwise. pathmutex exits with the child's exit code.

Examples:
  pathmutex exec /var/cache/app/index.json -- ./rebuild-index.sh
  pathmutex exec --deadline 60 ./data.db -- sqlite3 data.db .dump")]
    Exec {
        /// Path whose lock to hold (need not exist)
        path: PathBuf,

        /// Seconds to wait before reopening the lock and trying again
        #[arg(long, value_name = "SECONDS")]
        wait_timeout: Option<String>,

        /// Give up after this many seconds, or "infinite"
        #[arg(long, value_name = "SECONDS|infinite")]
        deadline: Option<String>,

        /// Locking backend: auto, semaphore, advisory, in-process
        #[arg(long)]
        mode: Option<LockingMode>,

        /// Command and arguments to run
        #[arg(last = true, required = true, num_args = 1..)]
        command: Vec<String>,
    },

    /// Print the lock identity derived from PATH
    Identity {
        path: PathBuf,
    },

    /// Remove persisted lock objects left behind by crashed holders
    Purge {
        /// Paths whose lock objects to remove
        #[arg(required = true, num_args = 1..)]
        paths: Vec<PathBuf>,

        /// Locking backend to purge
        #[arg(long)]
        mode: Option<LockingMode>,
    },
}

fn report_error(error: &pathmutex::LockError) {
    let use_color = std::io::stderr().is_terminal();
    eprint!("{}", format_error_with_color(error, use_color));
}

fn main() {
    let cli = Cli::parse();

    logging::setup_logger(cli.verbose);

    let config = match new_pathmutex_config() {
        Ok(config) => config,
        Err(e) => {
            report_error(&e);
            std::process::exit(get_exit_code(&e));
        }
    };

    let result: Result<i32> = (|| match cli.command {
        Commands::Exec {
            path,
            wait_timeout,
            deadline,
            mode,
            command,
        } => {
            let exec = ExecCommand::new(&config)?;
            let options = ExecOptions {
                wait_timeout: wait_timeout.as_deref(),
                deadline: deadline.as_deref(),
                mode,
            };
            exec.execute(&path, &command, &options)
        }
        Commands::Identity { path } => {
            IdentityCommand::new()?.execute(&path)?;
            Ok(0)
        }
        Commands::Purge { paths, mode } => {
            PurgeCommand::new(&config)?.execute(&paths, mode)?;
            Ok(0)
        }
    })();

    match result {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            report_error(&e);
            std::process::exit(get_exit_code(&e));
        }
    }
}
