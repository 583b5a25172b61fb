mod args;
mod tally;

use clap::Parser;
use log::{info, LevelFilter};
use snafu::ErrorCompat;

fn main() {
    let args = args::Args::parse();

    if args.verbose {
        env_logger::Builder::new()
            .filter_level(LevelFilter::Debug)
            .init();
    } else {
        env_logger::init();
    }

    info!("args: {:?}", args);

    let res = match &args.strip_comments {
        Some(input) => tally::strip_comment_file(input, args.out.as_deref()).map(|p| {
            if let Some(p) = p {
                println!("{}", p.display());
            }
        }),
        None => tally::run_from_args(&args).map(|summary| {
            for (name, reason) in summary.skipped.iter() {
                eprintln!("skipped {}: {}", name, reason);
            }
            for p in summary.outputs.iter() {
                println!("{}", p.display());
            }
        }),
    };

    if let Err(e) = res {
        eprintln!("An error occured: {}", e);
        let mut source = std::error::Error::source(e.as_ref());
        while let Some(s) = source {
            eprintln!("  caused by: {}", s);
            source = s.source();
        }
        if let Some(bt) = ErrorCompat::backtrace(e.as_ref()) {
            eprintln!("{}", bt);
        }
        std::process::exit(1);
    }
}
