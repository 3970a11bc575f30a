use clap::Parser;
use log::{error, info, LevelFilter};
use snafu::ErrorCompat;

mod args;
mod ingest;

fn main() {
    let args = args::Args::parse();

    if args.verbose {
        env_logger::Builder::from_default_env()
            .filter_level(LevelFilter::Debug)
            .init();
    } else {
        env_logger::init();
    }
    info!("args: {:?}", args);

    match ingest::run(&args, &chrono::Utc::now()) {
        Ok(output) => {
            // A refused submission is still a failed run.
            if output["status"] == "error" {
                std::process::exit(1);
            }
        }
        Err(e) => {
            error!("Error occured {:?}", e);
            eprintln!("An error occured: {}", e);
            if let Some(bt) = ErrorCompat::backtrace(&e) {
                eprintln!("trace: {}", bt);
            }
            std::process::exit(2);
        }
    }
}
