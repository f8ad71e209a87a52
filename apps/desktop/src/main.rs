use std::{path::PathBuf, sync::Arc};

use anyhow::{bail, Result};
use clap::Parser;
use client_core::{
    load_config, ChatClient, ChatError, ClientEvent, SessionHandle, SessionState,
    WebSocketConnector,
};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::broadcast,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod commands;
mod platform;
mod render;

use commands::{next_input, parse_command, Command, Input, HELP};
use platform::{default_downloads_dir, pick_file, DownloadDirOpener};

#[derive(Parser, Debug)]
struct Args {
    /// Chat server host or IP address.
    #[arg(long)]
    server: String,
    #[arg(long)]
    username: String,
    /// Optional TOML file with client settings.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Where `/download` saves files.
    #[arg(long)]
    downloads: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let args = Args::parse();

    let config = load_config(args.config.as_deref());
    let downloads = args.downloads.unwrap_or_else(default_downloads_dir);
    let http = reqwest::Client::builder()
        .timeout(config.request_timeout())
        .build()?;
    let client = ChatClient::new(
        config,
        Arc::new(WebSocketConnector),
        Arc::new(DownloadDirOpener::new(http, downloads.clone())),
    );
    let printer = tokio::spawn(print_events(client.subscribe_events()));

    let handle = client.connect(&args.username, &args.server)?;
    if handle.settled().await != SessionState::Connected {
        printer.abort();
        bail!("could not connect to {}", args.server);
    }
    info!(downloads = %downloads.display(), "desktop: ready");
    println!("connected as {}. {HELP}", handle.username());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let ended = handle.wait_for(|state| state == SessionState::Unconnected);
    tokio::pin!(ended);
    loop {
        let line = match next_input(&mut lines, ended.as_mut()).await? {
            Input::Line(line) => line,
            Input::Eof => break,
            Input::SessionEnded => {
                eprintln!("session ended");
                break;
            }
        };
        let command = match parse_command(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(err) => {
                eprintln!("{err}");
                continue;
            }
        };
        if command == Command::Quit {
            break;
        }
        if let Err(err) = run_command(&client, &handle, command).await {
            eprintln!("error: {err}");
        }
    }

    client.disconnect(&handle);
    printer.abort();
    Ok(())
}

async fn run_command(
    client: &ChatClient,
    handle: &SessionHandle,
    command: Command,
) -> Result<(), ChatError> {
    match command {
        Command::Send(text) => {
            let mut draft = text;
            client.send_message(handle, &mut draft)?;
        }
        Command::Upload(path) => {
            let result = client.upload(handle, pick_file(&path)).await?;
            println!("uploaded as {}", result.remote_filename);
        }
        Command::Download(position) => {
            let url = client.download_entry(handle, position).await?;
            println!("downloaded {url}");
        }
        Command::Select(position) => {
            if client.select(position) {
                println!("selected #{}", position + 1);
            } else {
                println!("no entry #{}", position + 1);
            }
        }
        Command::Delete => match client.delete_selected() {
            Some(entry) => println!("deleted: {}", entry.body()),
            None => println!("nothing selected; use /select <n> first"),
        },
        Command::Save => {
            client.persist_history(handle).await?;
            println!("chat saved");
        }
        Command::Load => {
            let len = client.retrieve_history(handle).await?;
            println!("loaded {len} entries");
            print_log(client);
        }
        Command::List => print_log(client),
        Command::Quit => {}
    }
    Ok(())
}

fn print_log(client: &ChatClient) {
    for (position, entry) in client.snapshot().iter().enumerate() {
        println!("{}", render::render_entry(position, entry));
    }
}

async fn print_events(mut events: broadcast::Receiver<ClientEvent>) {
    loop {
        match events.recv().await {
            Ok(ClientEvent::EntryAppended { position, entry }) => {
                println!("{}", render::render_entry(position, &entry));
            }
            Ok(ClientEvent::SessionStateChanged {
                state,
                reason: Some(reason),
                ..
            }) => eprintln!("session {state:?}: {reason}"),
            Ok(ClientEvent::Error(reason)) => eprintln!("error: {reason}"),
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "desktop: event printer lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
