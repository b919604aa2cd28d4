use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, ValueEnum};

use touchd::config::{Config, Options};
use touchd::daemon;
use touchd::pidfile::{self, PidFile, PidFileError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Action {
    /// Run the daemon in the foreground.
    Start,
    /// Send SIGTERM to the running daemon.
    Stop,
    /// Report whether a daemon is running.
    Status,
    /// Remove a stale PID file, then start.
    Zombie,
}

/// An adaptive touch driver (e.g. for the ODROID VU7 Plus).
#[derive(Debug, Parser)]
#[command(name = "touchd", version)]
struct Args {
    #[arg(value_enum)]
    action: Action,

    /// Path to the device, e.g. /dev/hidraw0.
    #[arg(short, long, default_value = "/dev/hidraw0")]
    device: PathBuf,

    /// Enable debug output.
    #[arg(short = 'D', long)]
    debug: bool,

    /// Specify an alternative config file.
    #[arg(long, default_value = "touchd.ini")]
    config: PathBuf,

    /// Show configuration details.
    #[arg(long)]
    show_config: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let default_level = if args.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    let pid_path = Path::new(pidfile::DEFAULT_PATH);
    match args.action {
        Action::Stop => stop(pid_path),
        Action::Status => status(pid_path),
        Action::Zombie => {
            if pid_path.exists() {
                let _ = fs::remove_file(pid_path);
            }
            start(&args, pid_path)
        }
        Action::Start => start(&args, pid_path),
    }
}

fn stop(pid_path: &Path) -> ExitCode {
    match pidfile::read(pid_path) {
        Ok(Some(pid)) => {
            println!("Stopping daemon...");
            match send_sigterm(pid) {
                Ok(()) => ExitCode::SUCCESS,
                Err(err) => {
                    eprintln!("Could not signal pid {pid}: {err}");
                    ExitCode::from(1)
                }
            }
        }
        Ok(None) => {
            println!("No daemon running!");
            ExitCode::from(1)
        }
        Err(err) => {
            eprintln!("{err}");
            ExitCode::from(1)
        }
    }
}

fn status(pid_path: &Path) -> ExitCode {
    match pidfile::read(pid_path) {
        Ok(Some(pid)) => {
            println!("pidfile {} exists", pid_path.display());
            if pidfile::alive(pid) {
                println!("process with pid {pid} exists!");
            } else if is_root() {
                println!("process with pid {pid} does not exist, removing pidfile");
                let _ = fs::remove_file(pid_path);
            } else {
                println!("process with pid {pid} does not exist!");
            }
        }
        Ok(None) => println!("pidfile does not exist, the daemon is not running"),
        Err(err) => eprintln!("{err}"),
    }
    ExitCode::SUCCESS
}

fn start(args: &Args, pid_path: &Path) -> ExitCode {
    if !is_root() {
        eprintln!("Must be root!");
        return ExitCode::from(1);
    }

    let pidfile = match PidFile::create(pid_path) {
        Ok(pidfile) => pidfile,
        Err(PidFileError::AlreadyRunning(pid)) => {
            eprintln!("Daemon already running! (pid {pid})");
            return ExitCode::from(2);
        }
        Err(err) => {
            eprintln!("Could not create PID file: {err}");
            return ExitCode::from(3);
        }
    };

    let config = match Config::load(&args.config) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::from(1);
        }
    };
    let options = match Options::resolve(&config) {
        Ok(options) => options,
        Err(err) => {
            eprintln!("Invalid configuration: {err}");
            return ExitCode::from(1);
        }
    };
    if args.show_config {
        print!("{config}");
        println!("{options:#?}");
    }

    match daemon::run(&args.device, options, pidfile) {
        Ok(Some(reason)) => {
            println!("{reason}");
            println!("Good-bye.");
            ExitCode::SUCCESS
        }
        Ok(None) => {
            eprintln!("exiting with no recorded reason");
            ExitCode::from(255)
        }
        Err(err) => {
            eprintln!("{err}");
            ExitCode::from(1)
        }
    }
}

fn is_root() -> bool {
    rustix::process::geteuid().is_root()
}

fn send_sigterm(pid: u32) -> std::io::Result<()> {
    let pid = rustix::process::Pid::from_raw(pid as i32).ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "pid out of range")
    })?;
    rustix::process::kill_process(pid, rustix::process::Signal::TERM)?;
    Ok(())
}
