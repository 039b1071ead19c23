//! Telegram update handlers: adapt updates to conversation turns.
//!
//! Teloxide handles the updates of one chat one after another, so a session
//! is never read and written by two turns at once.

use crate::bot::admin;
use crate::bot::delivery::{deliver, split_companion, Target};
use crate::bot::transport::{ChatTransport, TelegramTransport};
use crate::config::Settings;
use crate::conversation::{CallbackAction, ConversationEngine, Input, Reply, State, Turn};
use anyhow::Result;
use std::sync::Arc;
use teloxide::dispatching::dialogue::InMemStorage;
use teloxide::prelude::*;
use teloxide::types::{CallbackQuery, ChatId, MessageId};
use teloxide::utils::command::BotCommands;
use tracing::{debug, info};

pub type SessionDialogue = Dialogue<State, InMemStorage<State>>;

#[derive(BotCommands, Clone)]
#[command(rename_rule = "snake_case", description = "Команды бота:")]
pub enum Command {
    #[command(description = "главное меню")]
    Start,
    #[command(description = "главное меню")]
    Help,
    #[command(description = "состояние кэша (для администраторов)")]
    CacheStatus,
    #[command(description = "обновить кэш (для администраторов)")]
    UpdateCache,
}

const ADMIN_ONLY: &str = "⛔️ Команда доступна только администраторам.";

/// Safely extracts the sender's user ID, 0 for channel posts.
#[must_use]
pub fn get_user_id_safe(msg: &Message) -> i64 {
    msg.from.as_ref().map_or(0, |u| u.id.0.cast_signed())
}

/// Stores the next state, then renders the replies.
async fn finish_turn(
    transport: &dyn ChatTransport,
    dialogue: &SessionDialogue,
    target: Target,
    turn: Turn,
) -> Result<Option<String>> {
    dialogue.update(turn.next).await?;
    Ok(deliver(transport, target, turn.replies).await)
}

/// `/start` and `/help`: greeting, main menu, fresh session.
///
/// # Errors
///
/// Returns an error if the session cannot be stored.
pub async fn start(
    bot: Bot,
    msg: Message,
    dialogue: SessionDialogue,
    engine: Arc<ConversationEngine>,
) -> Result<()> {
    info!(user_id = get_user_id_safe(&msg), "Session started");
    let turn = engine.handle(State::Idle, Input::Start).await;
    let transport = TelegramTransport::new(bot);
    finish_turn(&transport, &dialogue, Target::chat(msg.chat.id), turn).await?;
    Ok(())
}

/// Free text and reply-keyboard buttons.
///
/// # Errors
///
/// Returns an error if the session cannot be stored.
pub async fn handle_text(
    bot: Bot,
    msg: Message,
    dialogue: SessionDialogue,
    state: State,
    engine: Arc<ConversationEngine>,
) -> Result<()> {
    let text = msg.text().unwrap_or_default().to_string();
    debug!(
        user_id = get_user_id_safe(&msg),
        state = state.name(),
        text = %text,
        "Text input"
    );
    let turn = engine.handle(state, Input::Text(text)).await;
    let transport = TelegramTransport::new(bot);
    finish_turn(&transport, &dialogue, Target::chat(msg.chat.id), turn).await?;
    Ok(())
}

/// What an inline button press refers to.
#[derive(Debug, PartialEq, Eq)]
pub enum Press {
    /// Data this bot does not produce.
    Unknown,
    /// Telegram sent the press without the message it belongs to.
    Orphaned,
    Turn(CallbackAction, Target),
}

impl Press {
    /// Reads callback data and the pressed message's `(chat, message)` ids.
    #[must_use]
    pub fn read(data: Option<&str>, message: Option<(ChatId, MessageId)>) -> Self {
        let (data, companion) = split_companion(data.unwrap_or_default());
        let Some(action) = CallbackAction::parse(data) else {
            return Self::Unknown;
        };
        match message {
            Some((chat_id, origin)) => {
                Self::Turn(action, Target::button(chat_id, origin).with_companion(companion))
            }
            None => Self::Orphaned,
        }
    }
}

async fn answer(bot: &Bot, q: &CallbackQuery, notice: Option<String>) {
    let mut request = bot.answer_callback_query(q.id.clone());
    request.text = notice;
    if let Err(e) = request.await {
        debug!(error = %e, "Callback answer failed");
    }
}

/// Inline buttons under carousel cards. Every press is answered, with the
/// turn's notice if it produced one.
///
/// # Errors
///
/// Returns an error if the callback has no message or the session cannot be
/// stored.
pub async fn handle_callback(
    bot: Bot,
    q: CallbackQuery,
    dialogue: SessionDialogue,
    state: State,
    engine: Arc<ConversationEngine>,
) -> Result<()> {
    let message = q.message.as_ref().map(|m| (m.chat().id, m.id()));
    let (action, target) = match Press::read(q.data.as_deref(), message) {
        Press::Turn(action, target) => (action, target),
        Press::Unknown => {
            debug!(data = ?q.data, "Unknown callback data");
            answer(&bot, &q, None).await;
            return Ok(());
        }
        Press::Orphaned => {
            answer(&bot, &q, None).await;
            return Err(anyhow::anyhow!("Callback message missing chat id"));
        }
    };

    debug!(
        user_id = q.from.id.0.cast_signed(),
        state = state.name(),
        data = %action.encode(),
        "Button pressed"
    );
    let turn = engine.handle(state, Input::Callback(action)).await;
    let transport = TelegramTransport::new(bot.clone());
    let result = finish_turn(&transport, &dialogue, target, turn).await;
    let notice = result.as_ref().ok().cloned().flatten();
    answer(&bot, &q, notice).await;
    result.map(|_| ())
}

async fn reply_admin(
    bot: Bot,
    msg: &Message,
    settings: &Settings,
    command: &str,
    text: impl std::future::Future<Output = String>,
) -> Result<()> {
    let transport = TelegramTransport::new(bot);
    let user_id = get_user_id_safe(msg);
    let reply = if settings.is_admin(user_id) {
        info!(user_id, command, "Admin command");
        text.await
    } else {
        info!(user_id, command, "⛔️ Admin command from a non-admin user");
        ADMIN_ONLY.to_string()
    };
    deliver(&transport, Target::chat(msg.chat.id), vec![Reply::plain(reply)]).await;
    Ok(())
}

/// `/cache_status`
///
/// # Errors
///
/// Never fails; delivery problems are logged.
pub async fn cache_status(
    bot: Bot,
    msg: Message,
    engine: Arc<ConversationEngine>,
    settings: Arc<Settings>,
) -> Result<()> {
    let fetcher = engine.fetcher();
    reply_admin(
        bot,
        &msg,
        &settings,
        "cache_status",
        admin::cache_status(fetcher),
    )
    .await
}

/// `/update_cache`
///
/// # Errors
///
/// Never fails; delivery problems are logged.
pub async fn update_cache(
    bot: Bot,
    msg: Message,
    engine: Arc<ConversationEngine>,
    settings: Arc<Settings>,
) -> Result<()> {
    let fetcher = engine.fetcher();
    reply_admin(
        bot,
        &msg,
        &settings,
        "update_cache",
        admin::update_cache(fetcher),
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_names() {
        assert!(matches!(
            Command::parse("/cache_status", "sfb_bot"),
            Ok(Command::CacheStatus)
        ));
        assert!(matches!(
            Command::parse("/update_cache", "sfb_bot"),
            Ok(Command::UpdateCache)
        ));
        assert!(matches!(Command::parse("/start", "sfb_bot"), Ok(Command::Start)));
        assert!(Command::parse("/unknown", "sfb_bot").is_err());
    }

    #[test]
    fn test_press_without_message_is_orphaned() {
        assert_eq!(Press::read(Some("item:next:5"), None), Press::Orphaned);
        assert_eq!(Press::read(Some("garbage"), None), Press::Unknown);
        assert_eq!(Press::read(None, Some((ChatId(1), MessageId(2)))), Press::Unknown);
    }

    #[test]
    fn test_press_carries_companion_photo() {
        let Press::Turn(action, target) =
            Press::read(Some("item:next:5|41"), Some((ChatId(1), MessageId(42))))
        else {
            panic!("a known action on a message must start a turn");
        };
        assert_eq!(action.item_id, 5);
        assert_eq!(target.origin, Some(MessageId(42)));
        assert_eq!(target.companion, Some(MessageId(41)));
    }
}
