//! Streams synthetic frames to a processing server and prints the replies.
//!
//! Usage:
//!
//! ```text
//! cargo run --example stream_client -- <host> <port> <username> <password> [--debug] [--frames N]
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use framecast::{
    ConnectionManager, FrameEncoder, FrameFormat, FrameSequencer, MediaFrame, ResultConsumer,
};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

// ============================================================================
// Types
// ============================================================================

/// Command-line arguments.
#[derive(Debug, Clone)]
struct Args {
    host: String,
    port: u16,
    username: String,
    password: String,
    debug: bool,
    frames: u32,
}

impl Args {
    fn parse() -> anyhow::Result<Self> {
        let args: Vec<String> = std::env::args().skip(1).collect();
        let positional = positional_args(&args);

        if positional.len() < 4 {
            bail!("usage: stream_client <host> <port> <username> <password> [--debug] [--frames N]");
        }

        let frames = match args.iter().position(|a| a == "--frames") {
            Some(i) => args
                .get(i + 1)
                .context("--frames needs a value")?
                .parse()
                .context("--frames must be a number")?,
            None => 10,
        };

        Ok(Self {
            host: positional[0].to_string(),
            port: positional[1].parse().context("port must be a number")?,
            username: positional[2].to_string(),
            password: positional[3].to_string(),
            debug: args.iter().any(|a| a == "--debug"),
            frames,
        })
    }
}

/// Arguments that are neither flags nor a flag's value.
fn positional_args(args: &[String]) -> Vec<&str> {
    let mut positional = Vec::new();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--frames" => {
                iter.next();
            }
            flag if flag.starts_with("--") => {}
            value => positional.push(value),
        }
    }
    positional
}

/// Prints results and forwards the connection outcome.
struct PrintingConsumer {
    connected: mpsc::UnboundedSender<bool>,
}

impl ResultConsumer for PrintingConsumer {
    fn on_connected(&self, success: bool) {
        println!("[connected] {success}");
        let _ = self.connected.send(success);
    }

    fn display_response(&self, result: &str, is_gloss: bool) {
        println!("[response] {result} (gloss: {is_gloss})");
    }

    fn add_new_transcript(&self, transcript: &str) {
        println!("[transcript] {transcript}");
    }
}

// ============================================================================
// Functions
// ============================================================================

fn init_logging(debug: bool) {
    let filter = if debug {
        "framecast=debug"
    } else {
        "framecast=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .init();
}

/// A moving gradient, so consecutive frames differ.
fn synthetic_frame(width: u32, height: u32, tick: u32) -> Vec<u8> {
    (0..width * height)
        .flat_map(|i| {
            let v = ((i + tick * 7) % 256) as u8;
            [v, 128, 255 - v]
        })
        .collect()
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse()?;
    init_logging(args.debug);

    let (connected_tx, mut connected_rx) = mpsc::unbounded_channel();
    let (manager, dispatcher) = ConnectionManager::new();
    manager.register_consumer(Arc::new(PrintingConsumer {
        connected: connected_tx,
    }));

    manager.initialize(&args.username, &args.password, &args.host, args.port)?;
    manager.connect()?;
    let dispatch = tokio::spawn(dispatcher.run());

    let authenticated = tokio::time::timeout(Duration::from_secs(30), connected_rx.recv())
        .await
        .context("timed out waiting for authentication")?
        .unwrap_or(false);
    if !authenticated {
        manager.disconnect()?;
        bail!("authentication failed");
    }

    let encoder = FrameEncoder::new(FrameFormat::jpeg(80));
    let sequencer = FrameSequencer::new();
    let (width, height) = (320, 240);

    let still = encoder.image(width, height, &synthetic_frame(width, height, 0))?;
    manager.send_frame(still)?;

    for tick in 0..args.frames {
        let bytes = encoder.encode_rgb8(width, height, &synthetic_frame(width, height, tick))?;
        if let Err(e) = manager.send_frame(MediaFrame::video(bytes, sequencer.next())) {
            eprintln!("frame {tick} dropped: {e}");
        }
        tokio::time::sleep(Duration::from_millis(33)).await;
    }

    manager.start_transcript_processing()?;
    tokio::time::sleep(Duration::from_secs(2)).await;
    manager.check_transcript()?;
    manager.get_prediction()?;

    println!("Waiting for results, press Ctrl+C to exit");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        () = tokio::time::sleep(Duration::from_secs(10)) => {}
    }

    manager.disconnect()?;
    drop(manager);
    dispatch.abort();
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frames_value_is_not_positional() {
        let args: Vec<String> = ["--frames", "20", "h", "9000", "alice", "pw", "--debug"]
            .map(String::from)
            .to_vec();
        assert_eq!(positional_args(&args), ["h", "9000", "alice", "pw"]);
    }
}
