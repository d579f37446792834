use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use common::{Command, FetchRequest, Response, SourceSpec, WallpaperSet};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tokio::net::unix::OwnedReadHalf;

#[derive(Parser)]
#[command(name = "wfctl")]
#[command(about = "Wallpaper Fetch Daemon Control", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch a set of wallpapers and print them
    Fetch {
        /// Source(s) to fetch from; one is picked at random when several are given
        #[arg(default_value = "bing")]
        sources: Vec<String>,

        /// Image orientation (horizontal or vertical)
        #[arg(short, long, default_value = "horizontal")]
        orientation: String,

        /// Maximum number of images to return
        #[arg(short, long, default_value = "10")]
        max: usize,

        /// Update interval in milliseconds, drives cache freshness
        #[arg(short, long, default_value = "3600000")]
        interval: u64,

        /// Exclude NSFW posts
        #[arg(long)]
        sfw: bool,

        /// Search query for the pexels source
        #[arg(long)]
        pexels_search: Option<String>,

        /// API key for the pexels source
        #[arg(long, env = "PEXELS_API_KEY")]
        pexels_key: Option<String>,

        /// Seconds to wait for the fetch outcome
        #[arg(short, long, default_value = "60")]
        wait: u64,

        /// Print the raw JSON response
        #[arg(long)]
        json: bool,
    },

    /// Query daemon status and cache contents
    Query,

    /// Kill the daemon
    Kill,

    /// Ping the daemon
    Ping,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Fetch {
            mut sources,
            orientation,
            max,
            interval,
            sfw,
            pexels_search,
            pexels_key,
            wait,
            json,
        } => {
            let source = if sources.len() == 1 {
                SourceSpec::One(sources.remove(0))
            } else {
                SourceSpec::Many(sources)
            };

            let request = FetchRequest {
                source,
                orientation,
                maximum_entries: max,
                update_interval: interval,
                nsfw: !sfw,
                pexels_search,
                pexels_key,
            };

            fetch(request, Duration::from_secs(wait), json).await
        }
        Commands::Query => send_command(Command::Query).await.map(handle_response),
        Commands::Kill => send_command(Command::Kill).await.map(handle_response),
        Commands::Ping => send_command(Command::Ping).await.map(handle_response),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        eprintln!("\nIs the daemon running? Try starting it with: wallfetchd");
        std::process::exit(1);
    }

    Ok(())
}

async fn connect() -> Result<(OwnedReadHalf, tokio::net::unix::OwnedWriteHalf)> {
    let socket_path = common::get_socket_path();
    let stream = UnixStream::connect(&socket_path).await?;
    Ok(stream.into_split())
}

async fn write_command(
    writer: &mut tokio::net::unix::OwnedWriteHalf,
    command: &Command,
) -> Result<()> {
    let command_json = serde_json::to_string(command)?;
    writer.write_all(command_json.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}

async fn read_response(reader: &mut BufReader<OwnedReadHalf>) -> Result<Option<Response>> {
    let mut response_line = String::new();
    if reader.read_line(&mut response_line).await? == 0 {
        return Ok(None);
    }

    Ok(Some(serde_json::from_str(&response_line)?))
}

async fn send_command(command: Command) -> Result<Response> {
    let (reader, mut writer) = connect().await?;
    let mut reader = BufReader::new(reader);

    write_command(&mut writer, &command).await?;

    match read_response(&mut reader).await? {
        Some(response) => Ok(response),
        None => bail!("daemon closed the connection without replying"),
    }
}

/// Send a fetch and wait for its outcome.
///
/// A fetch that yields no images produces no reply at all, so the wait is
/// bounded.
async fn fetch(request: FetchRequest, wait: Duration, json: bool) -> Result<()> {
    let (reader, mut writer) = connect().await?;
    let mut reader = BufReader::new(reader);

    write_command(&mut writer, &Command::FetchWallpapers(request)).await?;

    match tokio::time::timeout(wait, read_response(&mut reader)).await {
        Ok(Ok(Some(response))) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&response)?);
            } else {
                handle_response(response);
            }
        }
        Ok(Ok(None)) => {
            println!("No wallpapers found");
        }
        Ok(Err(e)) => return Err(e),
        Err(_) => {
            println!("No wallpapers received within {}s", wait.as_secs());
        }
    }

    Ok(())
}

fn print_wallpapers(set: &WallpaperSet) {
    println!(
        "Wallpapers from {} ({}): {} image(s)",
        set.source,
        set.orientation,
        set.images.len()
    );
    for image in &set.images {
        match &image.caption {
            Some(caption) => println!("  {} - {}", image.url, caption),
            None => println!("  {}", image.url),
        }
        for variant in &image.variants {
            println!("      {}x{} {}", variant.width, variant.height, variant.url);
        }
    }
}

fn handle_response(response: Response) {
    match response {
        Response::Ok => {
            println!("✓ Success");
        }
        Response::Error(e) => {
            eprintln!("✗ Error: {}", e);
            std::process::exit(1);
        }
        Response::Status(status) => {
            println!("Daemon Status:");
            println!("  Version: {}", status.version);
            println!("  Uptime: {}s", status.uptime_secs);
            println!("  Cache:");
            if status.cache.is_empty() {
                println!("    (empty)");
            }
            for entry in status.cache {
                if entry.expires_in_ms == 0 {
                    println!("    {} -> {} image(s), stale", entry.key, entry.images);
                } else {
                    println!(
                        "    {} -> {} image(s), fresh for {}s",
                        entry.key,
                        entry.images,
                        entry.expires_in_ms / 1000
                    );
                }
            }
        }
        Response::Pong => {
            println!("✓ Daemon is running");
        }
        Response::Wallpapers(set) => print_wallpapers(&set),
        Response::FetchError { error } => {
            eprintln!("✗ Fetch failed: {}", error);
            std::process::exit(1);
        }
    }
}
