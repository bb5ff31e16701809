pub mod actions;
pub mod cli;
pub mod config;
pub mod markdown;
pub mod models;
pub mod storage;
pub mod transport;
pub mod widget;

use actions::{ ActionError, PageActionsClient };
use cli::{ parse_command, Args, Command, HELP };
use config::{ Variant, WidgetConfig };
use log::{ error, info, warn };
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{ AsyncBufReadExt, BufReader };
use widget::registry::WidgetRegistry;
use widget::view::TerminalView;
use widget::{ ChatWidget, IgnoreReason, SendOutcome, WidgetError };

/// Resolves the widget config from a JSON file or a variant preset, then applies CLI overrides.
pub fn build_config(args: &Args) -> Result<WidgetConfig, Box<dyn Error + Send + Sync>> {
    let mut config = match &args.config_path {
        Some(path) => WidgetConfig::from_file(path)?,
        None => {
            let variant: Variant = args.variant.parse()?;
            WidgetConfig::preset(variant, &args.base_url)?
        }
    };

    if args.csrf_token.is_some() {
        config.csrf_token = args.csrf_token.clone();
    }
    if args.user_email.is_some() {
        config.user_email = args.user_email.clone();
    }
    if let Some(max) = args.max_messages {
        config.max_messages = max;
    }
    config.request_timeout_secs = args.timeout_secs;
    config.features.persist_history |= args.persist_history;
    config.validate()?;
    Ok(config)
}

pub async fn run(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    info!("--- Widget Configuration ---");
    info!("Base URL: {}", args.base_url);
    info!("Variant: {}", args.variant);
    info!("Config Path: {}", args.config_path.as_deref().unwrap_or("-"));
    info!("Store Path: {}", args.store_path.as_deref().unwrap_or("(memory)"));
    info!("Persist History: {}", args.persist_history);
    info!("Request Timeout: {}s", args.timeout_secs);
    info!("----------------------------");

    let store = storage::open_store(args.store_path.as_deref())?;
    let config = build_config(&args)?;
    let view = Arc::new(TerminalView::new(config.title.clone()));

    let initial_recommendations = config.initial_recommendations;
    let registry = WidgetRegistry::new();
    let chat = registry.register(ChatWidget::connect(config, view, Arc::clone(&store))?)?;

    let mut actions = PageActionsClient::new(
        &args.base_url,
        store,
        Duration::from_secs(args.timeout_secs)
    )?.with_current_path(args.page_path.clone());
    if let Some(token) = &args.csrf_token {
        actions = actions.with_csrf_token(token.clone());
    }

    chat.open();
    if initial_recommendations > 0 {
        if let Err(e) = chat.load_recommendations(initial_recommendations).await {
            warn!("Could not load recommendations: {}", e);
        }
    }
    println!("Type a message, or /help for commands.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match parse_command(&line) {
            Command::Say(text) => report_send(&chat, chat.send_message(&text).await),
            Command::Quick(index) => report_send(&chat, chat.send_quick_reply(index).await),
            Command::Open => chat.open(),
            Command::Close => chat.close(),
            Command::Toggle => {
                chat.toggle();
            }
            Command::Theme => {
                chat.toggle_theme();
            }
            Command::Reset =>
                match chat.restart().await {
                    SendOutcome::Failed => println!("Could not restart, the conversation is unchanged"),
                    outcome => report_send(&chat, outcome),
                }
            Command::Guide => report_widget(chat.fetch_guide().await.map(|guide| serde_json::to_value(guide).unwrap_or_default())),
            Command::Validate =>
                report_widget(chat.validate_club_data().await.map(|v| serde_json::to_value(v).unwrap_or_default())),
            Command::Draft => println!("{}", serde_json::Value::Object(chat.club_data())),
            Command::Recommendations =>
                report_widget(chat.load_recommendations(5).await.map(|items| serde_json::Value::from(items.len()))),
            Command::Rate(id, rating) => report_action(&args, actions.rate_recommendation(id, rating).await),
            Command::FestivalJoin(festival, club) =>
                report_action(&args, actions.festival_join(festival, club).await),
            Command::Allies => report_action(&args, actions.to_searching_allies().await),
            Command::Register(fields) => {
                let fields: Vec<(&str, &str)> = fields
                    .iter()
                    .map(|(k, v)| (k.as_str(), v.as_str()))
                    .collect();
                match actions.register(&fields).await {
                    Ok(pending) => println!("Code sent to {}, confirm with /verify CODE", pending.email),
                    Err(e) => report_action(&args, Err(e)),
                }
            }
            Command::Verify(code) =>
                report_action(&args, actions.verify_email(&code).await.map(|_| serde_json::Value::Null)),
            Command::Club(id, action) => report_action(&args, actions.club_action(id, action).await),
            Command::Festival(id, decision) =>
                report_action(&args, actions.festival_request_action(id, decision).await),
            Command::Login(user, pass) =>
                report_action(&args, actions.login(&user, &pass).await.map(|_| serde_json::Value::Null)),
            Command::Help => println!("{}", HELP),
            Command::Quit => break,
            Command::Unknown(line) => println!("Unknown command: {} (try /help)", line),
        }
    }

    info!("Closing chat session {}", chat.session_id().unwrap_or_default());
    Ok(())
}

fn report_send(chat: &ChatWidget, outcome: SendOutcome) {
    match outcome {
        SendOutcome::Replied(reply) => {
            if let Some(progress) = reply.progress {
                println!("progress: {}%", progress);
            }
            for step in &reply.next_steps {
                println!("next: {}", step);
            }
            if !reply.recommendations.is_empty() {
                println!("{} recommendations available", reply.recommendations.len());
            }
            if chat.is_completed() {
                println!("conversation complete, /reset to start over");
            }
        }
        SendOutcome::Ignored(IgnoreReason::Busy) => println!("Still waiting for the last reply…"),
        SendOutcome::Ignored(IgnoreReason::NoSuchQuickReply) => {
            println!("No such quick reply ({} shown)", chat.quick_replies().len());
        }
        SendOutcome::Ignored(IgnoreReason::Empty)
        | SendOutcome::Canned
        | SendOutcome::Failed
        | SendOutcome::Cleared => {}
    }
}

fn report_widget(result: Result<serde_json::Value, WidgetError>) {
    match result {
        Ok(body) => println!("{}", body),
        Err(e) => {
            error!("Widget call failed: {}", e);
            println!("Failed: {}", e);
        }
    }
}

fn report_action(args: &Args, result: Result<serde_json::Value, ActionError>) {
    match result {
        Ok(serde_json::Value::Null) => println!("done"),
        Ok(body) => println!("done: {}", body),
        Err(ActionError::Unauthorized { login_url }) => {
            println!("Please sign in first: {}{}", args.base_url.trim_end_matches('/'), login_url);
        }
        Err(e) => {
            error!("Page action failed: {}", e);
            println!("Action failed: {}", e);
        }
    }
}
