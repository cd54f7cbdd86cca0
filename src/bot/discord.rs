use crate::{
    config::Config,
    media::{extract_url, Platform},
    queue::{DeliveryTarget, JobQueue, Tier, UserId},
    quota::{MemoryQuota, QuotaGate, QuotaLimits, Usage},
};
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{error, info, warn};
use twilight_gateway::{Event, EventTypeFlags, Intents, Shard, ShardId, StreamExt};
use twilight_http::Client as HttpClient;
use twilight_model::{
    application::{
        command::{Command, CommandType},
        interaction::{
            application_command::{CommandData, CommandOptionValue},
            Interaction, InteractionData, InteractionType,
        },
    },
    channel::message::MessageFlags,
    http::interaction::{InteractionResponse, InteractionResponseData, InteractionResponseType},
    id::{marker::ApplicationMarker, Id},
};
use twilight_util::builder::command::{CommandBuilder, StringBuilder, UserBuilder};

pub struct DiscordBot {
    http: Arc<HttpClient>,
    shard: Shard,
    application_id: Id<ApplicationMarker>,
    config: Config,
    queue: Arc<JobQueue>,
    quota: Arc<MemoryQuota>,
}

impl DiscordBot {
    pub async fn new(
        token: String,
        config: Config,
        queue: Arc<JobQueue>,
        quota: Arc<MemoryQuota>,
    ) -> Result<Self> {
        let http = Arc::new(HttpClient::new(token.clone()));

        // Slash commands only, no message content needed
        let shard = Shard::new(ShardId::ONE, token, Intents::GUILDS);

        let application_id = {
            let response = http
                .current_user_application()
                .await
                .context("Failed to fetch application info")?;
            response.model().await?.id
        };

        let bot = Self {
            http,
            shard,
            application_id,
            config,
            queue,
            quota,
        };

        bot.register_commands().await?;

        Ok(bot)
    }

    /// Client shared with the delivery sink.
    pub fn http(&self) -> Arc<HttpClient> {
        self.http.clone()
    }

    async fn register_commands(&self) -> Result<()> {
        info!("Registering Discord slash commands...");

        for command in commands() {
            self.http
                .interaction(self.application_id)
                .create_global_command()
                .chat_input(&command.name, &command.description)
                .command_options(&command.options)
                .await
                .with_context(|| format!("Failed to register /{}", command.name))?;
        }

        info!("Successfully registered slash commands");
        Ok(())
    }

    pub async fn run(mut self) -> Result<()> {
        info!("Discord bot starting...");

        loop {
            let event = match self.shard.next_event(EventTypeFlags::all()).await {
                Some(Ok(event)) => event,
                Some(Err(source)) => {
                    error!(?source, "Error receiving event");
                    continue;
                }
                None => {
                    info!("Shard stream ended");
                    return Ok(());
                }
            };

            match event {
                Event::InteractionCreate(interaction) => {
                    if let Err(e) = self.handle_interaction(&interaction).await {
                        error!("Failed to handle interaction: {:#}", e);
                    }
                }
                Event::Ready(_) => {
                    info!("Discord bot is ready!");
                }
                _ => {}
            }
        }
    }

    async fn handle_interaction(&self, interaction: &Interaction) -> Result<()> {
        if interaction.kind != InteractionType::ApplicationCommand {
            return Ok(());
        }
        let Some(InteractionData::ApplicationCommand(data)) = &interaction.data else {
            return Ok(());
        };
        let Some(user) = interaction.author_id().map(|id| UserId(id.get())) else {
            warn!("Interaction without an author");
            return Ok(());
        };

        match data.name.as_str() {
            "download" => self.handle_download(interaction, data, user).await,
            "profile" => {
                let usage = self.quota.usage(user).await;
                self.respond(interaction, &format_usage(&usage)).await
            }
            "premium" => {
                self.respond(interaction, &premium_text(&self.config.quota))
                    .await
            }
            "grant" => self.handle_grant(interaction, data, user).await,
            "about" => self.respond(interaction, &about_text()).await,
            other => {
                info!("Unknown command: {}", other);
                Ok(())
            }
        }
    }

    async fn handle_download(
        &self,
        interaction: &Interaction,
        data: &CommandData,
        user: UserId,
    ) -> Result<()> {
        let Some(url) = string_option(data, "url").and_then(extract_url) else {
            return self
                .respond(interaction, "Please provide a valid http(s) link.")
                .await;
        };

        let platform = Platform::classify(&url);
        if let Some(reason) = submission_rejection(platform) {
            info!(%user, %platform, "Rejected link at submission");
            return self.respond(interaction, &reason).await;
        }

        let Some(channel_id) = interaction.channel.as_ref().map(|channel| channel.id) else {
            error!("No channel information in interaction");
            return self
                .respond(interaction, "❌ Cannot determine where to send the media.")
                .await;
        };

        if !self.quota.can_consume(user).await {
            info!(%user, "Daily quota exhausted at submission");
            return self
                .respond(
                    interaction,
                    "❌ Daily download limit reached. Try again tomorrow or check /premium.",
                )
                .await;
        }

        let tier = self.quota.current_tier(user).await;
        let job_id = self.queue.submit(
            user,
            DeliveryTarget(channel_id.get()),
            url.as_str(),
            tier,
        );
        let position = self.queue.position(job_id).unwrap_or(1);

        let content = if tier.is_priority() {
            format!("⚡ Priority download queued (position {position}).")
        } else {
            format!("⏳ Download queued (position {position}).")
        };
        self.respond(interaction, &content).await
    }

    async fn handle_grant(
        &self,
        interaction: &Interaction,
        data: &CommandData,
        caller: UserId,
    ) -> Result<()> {
        if !self.config.is_admin(caller.0) {
            warn!(%caller, "Non-admin tried to use /grant");
            return self
                .respond(interaction, "❌ Only bot admins can grant tiers.")
                .await;
        }

        let target = data.options.iter().find_map(|opt| match &opt.value {
            CommandOptionValue::User(id) if opt.name == "user" => Some(UserId(id.get())),
            _ => None,
        });
        let tier = string_option(data, "tier").map(str::parse::<Tier>);

        match (target, tier) {
            (Some(target), Some(Ok(tier))) => {
                self.quota.grant(target, tier).await;
                self.respond(interaction, &format!("✅ <@{target}> is now {tier}."))
                    .await?;
                if let Err(e) = self.notify_grant(target, tier, caller).await {
                    warn!(%target, "Could not notify user about granted tier: {:#}", e);
                }
                Ok(())
            }
            (_, Some(Err(e))) => self.respond(interaction, &format!("❌ {e}")).await,
            _ => {
                self.respond(interaction, "❌ Both user and tier are required.")
                    .await
            }
        }
    }

    async fn notify_grant(&self, target: UserId, tier: Tier, admin: UserId) -> Result<()> {
        let recipient = Id::new_checked(target.0).context("invalid user id")?;
        let channel = self
            .http
            .create_private_channel(recipient)
            .await?
            .model()
            .await?;
        self.http
            .create_message(channel.id)
            .content(&grant_notice(tier, admin))
            .await?;
        Ok(())
    }

    async fn respond(&self, interaction: &Interaction, content: &str) -> Result<()> {
        let response = InteractionResponse {
            kind: InteractionResponseType::ChannelMessageWithSource,
            data: Some(InteractionResponseData {
                content: Some(content.to_string()),
                flags: Some(MessageFlags::EPHEMERAL),
                ..Default::default()
            }),
        };

        self.http
            .interaction(self.application_id)
            .create_response(interaction.id, &interaction.token, &response)
            .await?;

        Ok(())
    }
}

fn commands() -> Vec<Command> {
    let tiers = Tier::ALL.map(|tier| (tier.as_str(), tier.as_str()));

    vec![
        CommandBuilder::new(
            "download",
            "Download a TikTok or Instagram post",
            CommandType::ChatInput,
        )
        .option(StringBuilder::new("url", "Link to the post").required(true))
        .build(),
        CommandBuilder::new(
            "profile",
            "Show your tier and today's downloads",
            CommandType::ChatInput,
        )
        .build(),
        CommandBuilder::new("premium", "Compare subscription tiers", CommandType::ChatInput)
            .build(),
        CommandBuilder::new("grant", "Set a user's tier (admin)", CommandType::ChatInput)
            .option(UserBuilder::new("user", "User to update").required(true))
            .option(
                StringBuilder::new("tier", "New tier")
                    .required(true)
                    .choices(tiers),
            )
            .build(),
        CommandBuilder::new("about", "What this bot does", CommandType::ChatInput).build(),
    ]
}

/// Links that never enter the queue, with the reply explaining why.
fn submission_rejection(platform: Platform) -> Option<String> {
    match platform {
        Platform::TikTok | Platform::Instagram => None,
        Platform::YouTube => Some(format!("❌ {platform} links are not supported.")),
        Platform::Other => Some("❌ Only TikTok and Instagram links are supported.".to_string()),
    }
}

fn about_text() -> String {
    format!(
        "🤖 **snapgrab** v{}\n\
         Downloads TikTok videos and photo posts and Instagram media via /download.\n\
         Files are deleted right after they are sent.",
        env!("CARGO_PKG_VERSION")
    )
}

fn grant_notice(tier: Tier, admin: UserId) -> String {
    format!("💎 You were granted the **{tier}** tier by <@{admin}>.")
}

fn string_option<'a>(data: &'a CommandData, name: &str) -> Option<&'a str> {
    data.options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| match &opt.value {
            CommandOptionValue::String(s) => Some(s.as_str()),
            _ => None,
        })
}

fn limit_text(limit: Option<u32>) -> String {
    match limit {
        Some(limit) => format!("{limit} downloads/day"),
        None => "unlimited downloads".to_string(),
    }
}

fn format_usage(usage: &Usage) -> String {
    let used = match usage.limit {
        Some(limit) => format!(
            "{}/{} ({} left)",
            usage.downloads_today,
            limit,
            usage.remaining().unwrap_or(0)
        ),
        None => format!("{} (unlimited)", usage.downloads_today),
    };
    format!("👤 Tier: **{}**\n📥 Downloads today: {}", usage.tier, used)
}

fn premium_text(limits: &QuotaLimits) -> String {
    let mut lines = vec!["💎 **Tiers**".to_string()];
    for tier in Tier::ALL {
        let priority = if tier.is_priority() {
            ", skips the queue"
        } else {
            ""
        };
        lines.push(format!(
            "• **{}**: {}{}",
            tier,
            limit_text(limits.for_tier(tier)),
            priority
        ));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_usage() {
        let usage = Usage {
            tier: Tier::Gold,
            downloads_today: 3,
            limit: Some(10),
        };
        assert_eq!(
            format_usage(&usage),
            "👤 Tier: **gold**\n📥 Downloads today: 3/10 (7 left)"
        );

        let unlimited = Usage {
            tier: Tier::Diamond,
            downloads_today: 12,
            limit: None,
        };
        assert!(format_usage(&unlimited).ends_with("12 (unlimited)"));
    }

    #[test]
    fn test_premium_text_uses_configured_limits() {
        let limits = QuotaLimits {
            standard: Some(2),
            gold: Some(10),
            diamond: None,
        };
        let text = premium_text(&limits);
        assert!(text.contains("**standard**: 2 downloads/day"));
        assert!(text.contains("**gold**: 10 downloads/day"));
        assert!(text.contains("**diamond**: unlimited downloads, skips the queue"));
    }

    #[test]
    fn test_commands_registered() {
        let names: Vec<_> = commands().into_iter().map(|c| c.name).collect();
        assert_eq!(names, ["download", "profile", "premium", "grant", "about"]);
    }

    #[test]
    fn test_submission_rejection() {
        assert_eq!(submission_rejection(Platform::TikTok), None);
        assert_eq!(submission_rejection(Platform::Instagram), None);
        assert_eq!(
            submission_rejection(Platform::YouTube).as_deref(),
            Some("❌ YouTube links are not supported.")
        );
        assert_eq!(
            submission_rejection(Platform::Other).as_deref(),
            Some("❌ Only TikTok and Instagram links are supported.")
        );
    }

    #[test]
    fn test_other_links_never_reach_the_queue() {
        let url = extract_url("look https://example.com/video.mp4").unwrap();
        assert!(submission_rejection(Platform::classify(&url)).is_some());
    }

    #[test]
    fn test_about_text() {
        let text = about_text();
        assert!(text.contains(env!("CARGO_PKG_VERSION")));
        assert!(text.contains("TikTok"));
        assert!(text.contains("deleted"));
    }

    #[test]
    fn test_grant_notice() {
        assert_eq!(
            grant_notice(Tier::Gold, UserId(7)),
            "💎 You were granted the **gold** tier by <@7>."
        );
    }
}
