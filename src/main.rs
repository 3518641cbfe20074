use anyhow::{Result, bail};
use clap::Parser;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use rawdev::DeviceError;
use rawdev::application::{CopyDeviceUseCase, CopyFailure, EnumerateDevicesUseCase};
use rawdev::infrastructure::PlatformDevices;
use rawdev::presentation::cli::{
    Action, Cli, ProgressReporter, format_disk_listing, format_volume_listing, normalize_args,
};

const LOG_ENV: &str = "RAWDEV_LOG";

fn main() -> ExitCode {
    let cli = match Cli::try_parse_from(normalize_args(std::env::args_os())) {
        Ok(cli) => cli,
        Err(e) => {
            // Help and version land here too and are not failures.
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    init_tracing(cli.verbose);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from(exit_code(&e))
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();
}

fn run(cli: &Cli) -> Result<()> {
    let Some(action) = cli.action() else {
        bail!("no command given");
    };

    let devices = PlatformDevices::new();
    let catalog = EnumerateDevicesUseCase::default().execute(&devices)?;

    match action {
        Action::ListVolumes { include_all } => {
            print!("{}", format_volume_listing(&catalog, include_all));
        }
        Action::ListPartitions => {
            print!("{}", format_disk_listing(&catalog));
        }
        Action::Copy(options) => {
            let progress = ProgressReporter::stdout();
            let outcome = CopyDeviceUseCase::new(&catalog, &devices)
                .execute(&options, |gigabytes| progress.report(gigabytes));
            progress.finish();
            outcome?;
        }
    }

    Ok(())
}

/// The OS error code when it fits an exit status, else 1
fn exit_code(error: &anyhow::Error) -> u8 {
    let os_code = error.chain().find_map(|cause| {
        cause
            .downcast_ref::<CopyFailure>()
            .and_then(CopyFailure::os_code)
            .or_else(|| cause.downcast_ref::<DeviceError>().and_then(DeviceError::os_code))
    });

    os_code
        .and_then(|code| u8::try_from(code).ok())
        .filter(|&code| code != 0)
        .unwrap_or(1)
}
