use dotenvy::dotenv;
use regex::Regex;
use sfb_bot::bot::handlers::{self, Command, SessionDialogue};
use sfb_bot::config::Settings;
use sfb_bot::content::{ContentFetcher, FetcherOptions, RateLimiter, TtlCache};
use sfb_bot::conversation::views::Links;
use sfb_bot::conversation::{ConversationEngine, EngineOptions, State};
use sfb_bot::vk::VkClient;
use std::io::{self, Write};
use std::sync::Arc;
use teloxide::dispatching::dialogue::InMemStorage;
use teloxide::dispatching::UpdateHandler;
use teloxide::prelude::*;
use teloxide::types::CallbackQuery;
use teloxide::utils::command::BotCommands;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{prelude::*, EnvFilter};

/// Regex patterns for redacting secrets from log output
struct RedactionPatterns {
    token1: Regex,
    token2: Regex,
    token3: Regex,
    vk_token: Regex,
}

impl RedactionPatterns {
    /// # Errors
    ///
    /// Returns an error if any regex pattern is invalid
    fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            token1: Regex::new(r"(https?://[^/]+/bot)([0-9]+:[A-Za-z0-9_-]+)(/['\s]*)")?,
            token2: Regex::new(r"([0-9]{8,10}:[A-Za-z0-9_-]{35})")?,
            token3: Regex::new(r"(bot[0-9]{8,10}:)[A-Za-z0-9_-]+")?,
            vk_token: Regex::new(r"(access_token=)[^\s&]+")?,
        })
    }

    fn redact(&self, input: &str) -> String {
        let mut output = input.to_string();
        output = self
            .token1
            .replace_all(&output, "$1[TELEGRAM_TOKEN]$3")
            .to_string();
        output = self
            .token2
            .replace_all(&output, "[TELEGRAM_TOKEN]")
            .to_string();
        output = self
            .token3
            .replace_all(&output, "$1[TELEGRAM_TOKEN]")
            .to_string();
        output = self
            .vk_token
            .replace_all(&output, "${1}[MASKED]")
            .to_string();
        output
    }
}

struct RedactingWriter<W: Write> {
    inner: W,
    patterns: Arc<RedactionPatterns>,
}

impl<W: Write> RedactingWriter<W> {
    const fn new(inner: W, patterns: Arc<RedactionPatterns>) -> Self {
        Self { inner, patterns }
    }
}

impl<W: Write> Write for RedactingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let s = String::from_utf8_lossy(buf);
        let redacted = self.patterns.redact(&s);
        self.inner.write_all(redacted.as_bytes())?;
        // The caller's buffer was consumed in full even if the redacted
        // text is shorter or longer.
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

struct RedactingMakeWriter<F> {
    make_inner: F,
    patterns: Arc<RedactionPatterns>,
}

impl<F> RedactingMakeWriter<F> {
    const fn new(make_inner: F, patterns: Arc<RedactionPatterns>) -> Self {
        Self {
            make_inner,
            patterns,
        }
    }
}

impl<'a, F, W> tracing_subscriber::fmt::MakeWriter<'a> for RedactingMakeWriter<F>
where
    F: Fn() -> W + 'static,
    W: Write,
{
    type Writer = RedactingWriter<W>;

    fn make_writer(&'a self) -> Self::Writer {
        RedactingWriter::new((self.make_inner)(), self.patterns.clone())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();

    let patterns = Arc::new(RedactionPatterns::new().map_err(|e| {
        eprintln!("Failed to compile regex patterns: {e}");
        e
    })?);
    init_logging(patterns);

    info!("Starting SFB bot...");

    let settings = init_settings();
    let fetcher = init_fetcher(&settings);
    let engine = Arc::new(ConversationEngine::new(
        fetcher.clone(),
        EngineOptions {
            max_items: settings.max_photos_per_page,
            links: Links {
                vk_group_url: settings.vk_group_url.clone(),
                tg_channel_url: settings.tg_channel_url.clone(),
                partner_topic_url: settings.vk_partner_topic_url.clone(),
                master_topic_url: settings.vk_master_topic_url.clone(),
            },
        },
    ));

    let shutdown = CancellationToken::new();
    let sweeper = fetcher
        .cache()
        .clone()
        .spawn_sweeper(settings.cache_sweep_interval(), shutdown.clone());
    let refresher = fetcher
        .clone()
        .spawn_refresher(settings.preload_interval(), shutdown.clone());
    info!(
        ttl_secs = settings.cache_ttl_secs,
        preload_secs = settings.preload_interval_secs,
        "Background cache tasks started"
    );

    let bot = Bot::new(settings.telegram_token.clone());
    if let Err(e) = bot.set_my_commands(Command::bot_commands()).await {
        warn!("Failed to register bot commands: {}", e);
    }

    let sessions = InMemStorage::<State>::new();
    let handler = setup_handler();

    info!("Bot is running...");

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![engine, settings, sessions])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    shutdown.cancel();
    let _ = tokio::join!(sweeper, refresher);
    info!("Bot stopped.");
    Ok(())
}

fn init_logging(patterns: Arc<RedactionPatterns>) {
    let make_writer = RedactingMakeWriter::new(io::stderr, patterns);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(make_writer))
        .init();
}

fn init_settings() -> Arc<Settings> {
    match Settings::new() {
        Ok(s) => {
            info!("Configuration loaded successfully.");
            Arc::new(s)
        }
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    }
}

fn init_fetcher(settings: &Settings) -> Arc<ContentFetcher> {
    let client = match VkClient::new(
        settings.vk_token.clone(),
        settings.vk_group_id,
        settings.vk_api_version.clone(),
    ) {
        Ok(c) => c,
        Err(e) => {
            error!("Failed to initialize VK client: {}", e);
            std::process::exit(1);
        }
    };
    info!(group_id = settings.vk_group_id, "VK client initialized.");

    let limiter = Arc::new(RateLimiter::new(
        settings.api_rate_limit,
        settings.api_rate_limit_interval(),
    ));
    Arc::new(ContentFetcher::new(
        Arc::new(client),
        Arc::new(TtlCache::new()),
        limiter,
        FetcherOptions {
            ttl: settings.cache_ttl(),
            category_sort: settings.category_sort,
            fallback_description: settings.welcome_message.clone(),
        },
    ))
}

fn setup_handler() -> UpdateHandler<teloxide::RequestError> {
    dptree::entry()
        .branch(
            Update::filter_callback_query()
                .enter_dialogue::<CallbackQuery, InMemStorage<State>, State>()
                .endpoint(handle_callback),
        )
        .branch(
            Update::filter_message()
                .enter_dialogue::<Message, InMemStorage<State>, State>()
                .branch(
                    dptree::entry()
                        .filter_command::<Command>()
                        .endpoint(handle_command),
                )
                .branch(
                    dptree::filter(|msg: Message| msg.text().is_some()).endpoint(handle_text),
                ),
        )
}

async fn handle_command(
    bot: Bot,
    msg: Message,
    cmd: Command,
    dialogue: SessionDialogue,
    engine: Arc<ConversationEngine>,
    settings: Arc<Settings>,
) -> Result<(), teloxide::RequestError> {
    let res = match cmd {
        Command::Start | Command::Help => handlers::start(bot, msg, dialogue, engine).await,
        Command::CacheStatus => handlers::cache_status(bot, msg, engine, settings).await,
        Command::UpdateCache => handlers::update_cache(bot, msg, engine, settings).await,
    };
    if let Err(e) = res {
        error!("Command error: {}", e);
    }
    respond(())
}

async fn handle_text(
    bot: Bot,
    msg: Message,
    dialogue: SessionDialogue,
    state: State,
    engine: Arc<ConversationEngine>,
) -> Result<(), teloxide::RequestError> {
    if let Err(e) = Box::pin(handlers::handle_text(bot, msg, dialogue, state, engine)).await {
        error!("Text handler error: {}", e);
    }
    respond(())
}

async fn handle_callback(
    bot: Bot,
    q: CallbackQuery,
    dialogue: SessionDialogue,
    state: State,
    engine: Arc<ConversationEngine>,
) -> Result<(), teloxide::RequestError> {
    if let Err(e) = Box::pin(handlers::handle_callback(bot, q, dialogue, state, engine)).await {
        error!("Callback handler error: {}", e);
    }
    respond(())
}
