use super::*;
use listing_watch::bot::ChatBot;

fn chat_bot(app: &TestApp, updates: &Arc<ScriptedUpdates>) -> ChatBot {
    ChatBot::new(
        updates.clone(),
        app.handler.clone(),
        app.notifier.clone(),
        CancellationToken::new(),
    )
    .with_poll_timeout(0)
}

#[tokio::test]
async fn test_onboarding_over_chat() -> anyhow::Result<()> {
    let app = create_test_app(FakeSite::utrecht(2)).await?;
    let updates = Arc::new(ScriptedUpdates::default());
    let mut bot = chat_bot(&app, &updates);

    let set_query = format!("/set_search_query {}", SEARCH_URL);
    updates.push_texts(
        10,
        7,
        700,
        &["/start", &set_query, "/set_cities Utrecht", "/run", "/update_now"],
    );
    assert_eq!(bot.poll_once().await?, 5);

    let session = app.db.sessions().get(7).await?.unwrap();
    assert_eq!(session.chat_id, 700);
    assert!(session.is_active);
    assert_eq!(session.cities, vec!["Utrecht"]);
    assert_eq!(app.db.listings().count(7).await?, 2);

    let messages = app.notifier.messages();
    assert!(messages.iter().all(|m| m.chat_id == 700 && m.user_id == 7));
    assert!(messages[0].text.starts_with("Welcome"));
    assert_eq!(messages[2].text, "Cities set to: Utrecht");
    assert!(messages.iter().any(|m| m.text.contains("2 new, 0 removed")));
    assert_eq!(messages.last().unwrap().text, "Sync finished: 2 new, 0 removed.");

    // The next poll acknowledges the whole batch
    bot.poll_once().await?;
    assert_eq!(updates.offsets(), vec![0, 15]);
    Ok(())
}

#[tokio::test]
async fn test_bad_input_is_answered() -> anyhow::Result<()> {
    let app = create_test_app(FakeSite::utrecht(1)).await?;
    let updates = Arc::new(ScriptedUpdates::default());
    let mut bot = chat_bot(&app, &updates);

    updates.push_texts(1, 7, 700, &["/run", "hello", "/start", "/set_polling_interval soon", "/help"]);
    bot.poll_once().await?;

    let texts: Vec<String> = app.notifier.messages().into_iter().map(|m| m.text).collect();
    assert_eq!(texts.len(), 5);
    assert_eq!(texts[0], "You have no session yet, send /start first.");
    assert!(texts[1].starts_with("Invalid input: commands start with a slash"));
    assert!(texts[3].starts_with("Invalid input:"));
    assert!(texts[4].starts_with("Available commands:"));
    assert_eq!(
        app.db.sessions().get(7).await?.unwrap().polling_interval_secs,
        POLLING_INTERVAL_SECS
    );
    Ok(())
}

#[tokio::test]
async fn test_favorites_over_chat() -> anyhow::Result<()> {
    let app = create_test_app(FakeSite::utrecht(2)).await?;
    app.active_user(7).await?;
    app.handler.dispatch(7, Command::SyncNow).await?;

    let keep = FakeListing::new("utrecht/huis-1", "Utrecht", 301_000.0).url();
    let add = format!("/add_favorite {}", keep);
    let updates = Arc::new(ScriptedUpdates::default());
    let mut bot = chat_bot(&app, &updates);
    let synced = app.notifier.messages().len();

    updates.push_texts(
        1,
        7,
        700,
        &["/show_favorites", &add, &add, "/add_favorite https://www.funda.nl/koop/nergens/"],
    );
    bot.poll_once().await?;

    let replies: Vec<String> = app.notifier.messages()[synced..].iter().map(|m| m.text.clone()).collect();
    assert_eq!(replies[0], "No favorites yet.");
    assert_eq!(replies[1], "Saved to your favorites.");
    assert_eq!(replies[2], "Already in your favorites.");
    assert!(replies[3].starts_with("Not found: stored listing"));

    // The listing leaves the site, the favorite stays
    app.site.remove("utrecht/huis-1");
    app.handler.dispatch(7, Command::SyncNow).await?;
    assert_eq!(app.db.listings().count(7).await?, 1);

    updates.push_texts(5, 7, 700, &["/show_favorites"]);
    bot.poll_once().await?;

    let messages = app.notifier.messages();
    let favorites = messages.last().unwrap();
    assert!(favorites.rich_formatting);
    assert!(favorites.text.starts_with("*1 favorite\\(s\\)*"));
    assert!(favorites.text.contains("huis\\-1"));
    Ok(())
}

#[tokio::test]
async fn test_unauthorized_users_get_no_answer() -> anyhow::Result<()> {
    let mut config = get_test_config();
    config.notifications.telegram.authorized_users = vec![7];
    let app = create_test_app_with_config(FakeSite::utrecht(1), config).await?;
    let updates = Arc::new(ScriptedUpdates::default());
    let mut bot = chat_bot(&app, &updates);

    updates.push_texts(1, 8, 800, &["/start", "/help"]);
    updates.push_texts(3, 7, 700, &["/start"]);
    bot.poll_once().await?;
    bot.poll_once().await?;

    let messages = app.notifier.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].chat_id, 700);
    assert!(app.db.sessions().get(8).await?.is_none());
    Ok(())
}

#[tokio::test]
async fn test_non_message_updates_are_acknowledged() -> anyhow::Result<()> {
    let app = create_test_app(FakeSite::utrecht(1)).await?;
    let updates = Arc::new(ScriptedUpdates::default());
    let mut bot = chat_bot(&app, &updates);

    updates.push(vec![
        ChatUpdate { update_id: 30, message: None },
        ChatUpdate {
            update_id: 31,
            message: Some(IncomingMessage { chat_id: 700, user_id: 7, text: None }),
        },
    ]);
    assert_eq!(bot.poll_once().await?, 2);
    bot.poll_once().await?;

    assert!(app.notifier.messages().is_empty());
    assert_eq!(updates.offsets(), vec![0, 32]);
    Ok(())
}

#[tokio::test]
async fn test_bot_runs_until_cancelled() -> anyhow::Result<()> {
    let app = create_test_app(FakeSite::utrecht(1)).await?;
    let updates = Arc::new(ScriptedUpdates::default());
    let cancel = CancellationToken::new();
    let bot = ChatBot::new(updates.clone(), app.handler.clone(), app.notifier.clone(), cancel.clone())
        .with_poll_timeout(0);

    updates.push_texts(1, 7, 700, &["/start"]);
    let task = tokio::spawn(bot.run());

    let mut started = false;
    for _ in 0..50 {
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        if app.db.sessions().get(7).await?.is_some() {
            started = true;
            break;
        }
    }
    cancel.cancel();
    tokio::time::timeout(std::time::Duration::from_secs(5), task).await??;

    assert!(started, "bot never handled /start");
    Ok(())
}
