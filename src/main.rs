use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use metatorrent::bencode::Bencode;
use metatorrent::torrent::scrape::report_to_json;
use metatorrent::torrent::{scrape, AnnounceList, BuildOptions, Metainfo, ScrapeConfig};
use metatorrent::Diagnostics;
use tracing::info;

mod cli;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = cli::Args::parse();
    info!("Command: {:?}", args.command);

    let mut diagnostics = Diagnostics::new();
    match args.command {
        cli::Command::Decode { path } => {
            let bytes = std::fs::read(&path).with_context(|| format!("reading {:?}", path))?;
            let value = Bencode::decode_with(&bytes, &mut diagnostics)?;
            report(&mut diagnostics);
            println!("{}", serde_json::to_string_pretty(&value.to_json())?);
        }
        cli::Command::Info { path, hashes } => {
            let metainfo = load(&path, &mut diagnostics)?;
            print!("{}", metainfo);
            if hashes {
                println!("Piece Hashes:");
                for hash in metainfo.info().piece_hashes() {
                    println!("{}", hex::encode(hash));
                }
            }
        }
        cli::Command::Create {
            source,
            announce,
            piece_length,
            exclude_hidden,
            comment,
            private,
            source_tag,
            output,
        } => {
            if source.is_file() && Metainfo::looks_like_torrent_file(&source) {
                return Err(anyhow!("{:?} already is a torrent file", source));
            }
            let options = BuildOptions {
                piece_length: piece_length.saturating_mul(1024),
                include_hidden: !exclude_hidden,
            };
            let announce: Vec<&str> = announce.iter().map(String::as_str).collect();
            let mut metainfo = Metainfo::create(&source, announce, &options, &mut diagnostics)
                .ok_or_else(|| first_error(&mut diagnostics))?;
            if let Some(comment) = comment {
                metainfo.set_comment(comment);
            }
            if private {
                metainfo.set_private(true);
            }
            if let Some(tag) = source_tag {
                metainfo.set_source(tag);
            }
            report(&mut diagnostics);
            let saved = metainfo.save(output.as_deref())?;
            println!("{}", saved.display());
            println!("Info Hash: {}", metainfo.info_hash_hex());
        }
        cli::Command::Magnet { path, html } => {
            let metainfo = load(&path, &mut diagnostics)?;
            println!("{}", metainfo.magnet().render(html));
        }
        cli::Command::Scrape {
            path,
            timeout,
            tracker,
        } => {
            let metainfo = load(&path, &mut diagnostics)?;
            let trackers = if tracker.is_empty() {
                metainfo.trackers()
            } else {
                AnnounceList::from(tracker)
            };
            let config = ScrapeConfig {
                timeout: Duration::from_secs(timeout),
            };
            let report = scrape(metainfo.info_hash(), &trackers, &config, &mut diagnostics).await?;
            println!("{}", serde_json::to_string_pretty(&report_to_json(&report))?);
        }
    }
    Ok(())
}

fn load(path: &Path, diagnostics: &mut Diagnostics) -> Result<Metainfo> {
    let metainfo = Metainfo::read(path, diagnostics).ok_or_else(|| first_error(diagnostics))?;
    report(diagnostics);
    Ok(metainfo)
}

fn first_error(diagnostics: &mut Diagnostics) -> anyhow::Error {
    diagnostics
        .drain()
        .into_iter()
        .find(|e| !e.is_advisory())
        .map(anyhow::Error::from)
        .unwrap_or_else(|| anyhow!("nothing could be read"))
}

/// Prints and clears what was recorded along the way.
fn report(diagnostics: &mut Diagnostics) {
    for error in diagnostics.drain().into_iter().rev() {
        eprintln!("warning: {}", error);
    }
}
