use clap::builder::{
	Styles,
	styling::{AnsiColor, Effects},
};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Help colors shared by every rembed binary.
pub fn styles() -> Styles {
	Styles::styled()
		.header(AnsiColor::Cyan.on_default() | Effects::BOLD)
		.usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
		.literal(AnsiColor::Yellow.on_default() | Effects::BOLD)
		.placeholder(AnsiColor::Green.on_default())
		.error(AnsiColor::Red.on_default() | Effects::BOLD)
}
