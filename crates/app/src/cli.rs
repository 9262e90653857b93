use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::webcam::{self, ServeArgs, WebcamConfig};

/// Webcam face recognition preview server.
#[derive(Parser, Debug)]
#[command(name = "facecam", version, about)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the camera control API and the annotated MJPEG stream.
    Serve(ServeArgs),
}

impl Cli {
    pub fn dispatch(self) -> Result<()> {
        match self.command {
            Command::Serve(args) => webcam::run(WebcamConfig::try_from(args)?),
        }
    }
}
