use clap::Parser;

mod cli;
mod webcam;

fn main() {
    if let Err(err) = run() {
        eprintln!("{err:?}");
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    cli::Cli::parse().dispatch()
}
