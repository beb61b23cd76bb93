use clap::Parser;
use quiz_sequencer::Options;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let options = Options::parse();
    quiz_sequencer::async_main(options).await
}
