use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;

	let args = rembed_worker::Args::parse();

	rembed_worker::run(args).await
}
