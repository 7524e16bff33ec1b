use parley_core::directory::ChannelDirectory;
use parley_core::models::ChatMessage;
use parley_core::store::SqliteStore;
use parley_core::{db, ChatRoomSession, Config, RemoteMessageStore};
use std::sync::Arc;

#[tokio::main]
async fn main() {
    // Load .env if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "parley_core=info".into()),
        )
        .init();

    let config = Config::from_env();

    let (Some(channel_id), Some(viewer_id)) = (config.channel_id.clone(), config.viewer_id.clone())
    else {
        tracing::error!("CHANNEL_ID and VIEWER_ID must be set");
        std::process::exit(2);
    };

    // Initialize database
    let pool = db::init_pool(&config.database_path)
        .await
        .expect("Failed to initialize database");

    let store: Arc<dyn RemoteMessageStore> =
        Arc::new(SqliteStore::new(pool, config.transaction_max_retries));
    let directory = ChannelDirectory::new(store.clone(), config.channel_list_limit);

    let channel = match directory.get_channel(&channel_id).await {
        Ok(Some(channel)) => channel,
        Ok(None) => {
            tracing::error!("Channel {} not found", channel_id);
            std::process::exit(1);
        }
        Err(e) => {
            tracing::error!("Failed to load channel {}: {}", channel_id, e);
            std::process::exit(1);
        }
    };
    let title = channel.title(&viewer_id);

    let session = match ChatRoomSession::open(store, config, channel, viewer_id).await {
        Ok(session) => session,
        Err(e) => {
            tracing::error!("Failed to open {}: {}", channel_id, e);
            std::process::exit(1);
        }
    };

    // Page back to the first message before printing anything
    loop {
        match session.paginate_older().await {
            Ok(true) => break,
            Ok(false) => {}
            Err(e) => {
                tracing::warn!("Stopped paging back: {}", e);
                break;
            }
        }
    }

    println!("== {} ==", title);
    let mut messages = session.messages();
    let mut printed = messages.borrow_and_update().len();
    for message in messages.borrow().iter() {
        print_message(message);
    }

    loop {
        tokio::select! {
            changed = messages.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = messages.borrow_and_update().clone();
                for message in snapshot.iter().skip(printed) {
                    print_message(message);
                }
                printed = snapshot.len();
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    session.dispose().await;
    tracing::info!("Bye");
}

fn print_message(message: &ChatMessage) {
    let sender = message
        .sender
        .as_ref()
        .map(|user| user.username.as_str())
        .unwrap_or(message.sender_id.as_str());
    let time = message.timestamp.format("%Y-%m-%d %H:%M");

    if message.kind.is_admin() {
        println!("[{}] -- {} ({}) --", time, message.kind.wire_name(), sender);
        return;
    }

    let mut line = format!("[{}] {}: {}", time, sender, message.text);
    if message.kind.is_media() {
        line.push_str(&format!(" <{}>", message.kind.wire_name()));
    }
    if message.has_reactions() {
        let mut reactions: Vec<_> = message.reaction_counts.iter().collect();
        reactions.sort();
        for (emoji, count) in reactions {
            line.push_str(&format!(" {}{}", emoji, count));
        }
    }
    println!("{}", line);
}
