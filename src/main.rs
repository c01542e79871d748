use std::path::PathBuf;

use anyhow::{anyhow, Result};
use clap::Parser;
use comic_translator_rust::{BatchEvent, BatchHandle};

#[derive(Parser, Debug)]
#[command(
    name = "comic-translator-rust",
    version,
    about = "Translate and re-letter the speech bubbles of comic pages"
)]
struct Cli {
    /// Directory containing the pages to translate (png/jpg/jpeg/bmp/webp)
    #[arg(short = 'i', long = "input")]
    input: PathBuf,

    /// Directory receiving the translated pages
    #[arg(short = 'o', long = "output")]
    output: PathBuf,

    /// Source language of the pages (default from settings: ja)
    #[arg(short = 'L', long = "source-lang")]
    source_lang: Option<String>,

    /// Target language (default from settings: zh)
    #[arg(short = 'l', long = "lang")]
    lang: Option<String>,

    /// Translation providers in fallback order (e.g. baidu,google)
    #[arg(short = 'p', long = "providers", value_delimiter = ',')]
    providers: Vec<String>,

    /// Read extra settings from a local TOML file
    #[arg(short = 'r', long = "read-settings")]
    read_settings: Option<String>,

    /// Enable verbose logging
    #[arg(long = "verbose")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    comic_translator_rust::logging::init(cli.verbose)?;

    let handle = comic_translator_rust::start(comic_translator_rust::Config {
        input: cli.input,
        output: cli.output,
        source_lang: cli.source_lang,
        lang: cli.lang,
        providers: cli.providers,
        settings_path: cli.read_settings,
    })?;

    let cancel = handle.cancel_token();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("cancelling after the current file...");
            cancel.cancel();
        }
    });

    let summary = tokio::task::spawn_blocking(move || follow(handle))
        .await
        .map_err(|err| anyhow!("batch monitor failed: {}", err))??;
    ctrl_c.abort();

    println!("{}", summary);
    Ok(())
}

fn follow(handle: BatchHandle) -> Result<comic_translator_rust::BatchSummary> {
    for event in handle.events.iter() {
        match event {
            BatchEvent::Started { total } => println!("found {} image(s)", total),
            BatchEvent::Progress { .. } | BatchEvent::Finished { .. } => {}
            BatchEvent::Log { line } => println!("{}", line),
        }
    }
    handle.join()
}
