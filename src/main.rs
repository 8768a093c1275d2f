use anyhow::Result;
use notify_relay::cli::CliApp;

fn main() -> Result<()> {
    CliApp::run()
}
