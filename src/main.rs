use gx_httpd::{config, logger, server};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Config file path without extension; the file itself is optional
    let config_path = std::env::args().nth(1).unwrap_or_else(|| "config".to_string());
    let cfg = config::Config::load_from(&config_path)?;

    logger::init(&cfg)?;
    server::run(&cfg)
}
