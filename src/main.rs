use anyhow::Result;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "ocr-translator-rust",
    version,
    about = "Translate the text in a Bengali image into English"
)]
struct Cli {
    /// Image to translate once (jpg/jpeg/png); without it the web UI is served
    #[arg(short = 'd', long = "data")]
    data: Option<String>,

    /// Write the translation to this file or directory (with --data)
    #[arg(short = 'o', long = "out", requires = "data")]
    out: Option<String>,

    /// Target language (default from settings: en)
    #[arg(short = 'l', long = "lang")]
    lang: Option<String>,

    /// Address for the web UI (default from settings)
    #[arg(short = 'a', long = "addr", conflicts_with = "data")]
    addr: Option<String>,

    /// Secrets file holding the service account key
    #[arg(short = 's', long = "secrets")]
    secrets: Option<String>,

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
    ocr_translator_rust::logging::init(cli.verbose)?;

    let serve = cli.data.is_none();
    let config = ocr_translator_rust::Config {
        data: cli.data,
        out: cli.out,
        lang: cli.lang,
        secrets_path: cli.secrets,
        settings_path: cli.read_settings,
        addr: cli.addr,
    };

    if serve {
        return ocr_translator_rust::serve(config).await;
    }

    let output = ocr_translator_rust::run(config).await?;
    if !output.is_empty() {
        println!("{}", output);
    }
    Ok(())
}
