pub mod discord;
mod sink;

pub use discord::DiscordBot;
pub use sink::DiscordSink;
