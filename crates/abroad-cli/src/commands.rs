//! Command handlers

use crate::{ChatAction, Commands, ForumAction, MentorAction, ProfileAction, SessionAction};
use abroad_client::{token, AbroadClient, SessionState};
use abroad_core::{
    Credentials, Mentor, MentorFilter, MentorSearchQuery, NewPost, NewReply, ProfileUpdate,
    RegisterRequest, User,
};
use anyhow::{bail, Context};
use serde::Serialize;
use std::path::Path;

pub async fn run(client: &AbroadClient, command: Commands, json: bool) -> anyhow::Result<()> {
    match command {
        Commands::Login { username, password } => {
            let password = resolve_password(password)?;
            let credentials = Credentials::new(username, password);
            credentials.validate()?;
            let session = client.session().login(credentials).await?;
            println!("Logged in as {}", session.user.display_name());
        }
        Commands::Register {
            username,
            email,
            role,
            password,
        } => {
            let mut request = RegisterRequest::new(username, resolve_password(password)?);
            if let Some(email) = email {
                request = request.with_email(email);
            }
            if let Some(role) = role {
                request = request.with_role(role);
            }
            request.validate()?;
            let session = client.session().register(request).await?;
            println!("Registered and logged in as {}", session.user.username);
        }
        Commands::Logout => {
            client.session().logout();
            println!("Logged out");
        }
        Commands::Whoami => match client.session().user() {
            Some(user) => print_user(&user, json)?,
            None => bail!("Not logged in"),
        },
        Commands::Refresh => {
            let session = client.refresh_now().await?;
            println!("Token refreshed for {}", session.user.username);
            print_expiry(&session.token);
        }
        Commands::Session { action } => session(client, action, json).await?,
        Commands::Mentors { action } => mentors(client, action, json).await?,
        Commands::Forum { action } => forum(client, action, json).await?,
        Commands::Chat { action } => chat(client, action, json).await?,
        Commands::Profile { action } => profile(client, action, json).await?,
        Commands::Upload { path, mime } => {
            let data = std::fs::read(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let filename = path
                .file_name()
                .and_then(|n| n.to_str())
                .context("Path has no file name")?;
            let mime = mime.unwrap_or_else(|| guess_mime(&path).to_string());

            let uploaded = client.files().upload(filename, data, &mime).await?;
            if json {
                print_json(&uploaded)?;
            } else {
                println!(
                    "Uploaded {} ({} bytes) -> {}",
                    uploaded.filename, uploaded.size, uploaded.url
                );
            }
        }
    }

    Ok(())
}

async fn session(client: &AbroadClient, action: SessionAction, json: bool) -> anyhow::Result<()> {
    match action {
        SessionAction::Status => {
            let state = client.session().state();
            if json {
                print_json(&serde_json::json!({
                    "state": state.name(),
                    "user": state.user(),
                    "expires_in_secs": state
                        .token()
                        .and_then(token::time_until_expiry)
                        .map(|left| left.as_secs()),
                }))?;
                return Ok(());
            }

            println!("State: {}", state.name());
            if let Some(session) = state.session() {
                println!("User:  {} ({})", session.user.username, session.user.role);
                print_expiry(&session.token);
            }
        }
        SessionAction::Watch => {
            if client.monitor().is_none() {
                bail!("Refresh monitor is disabled in the configuration");
            }
            let mut changes = client.session().subscribe();
            println!("Watching session ({}), Ctrl-C to stop", changes.borrow().name());

            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => break,
                    changed = changes.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let state = changes.borrow_and_update().clone();
                        println!("{}: {}", chrono::Local::now().format("%H:%M:%S"), state.name());
                        if matches!(state, SessionState::Expired | SessionState::Anonymous) {
                            break;
                        }
                    }
                }
            }
        }
    }
    Ok(())
}

async fn mentors(client: &AbroadClient, action: MentorAction, json: bool) -> anyhow::Result<()> {
    match action {
        MentorAction::Search {
            major,
            university,
            language,
            min_price,
            max_price,
            text,
            sort,
            limit,
        } => {
            let mut filter = MentorFilter::new().price_range(min_price, max_price);
            if let Some(major) = major {
                filter = filter.major(major);
            }
            if let Some(university) = university {
                filter = filter.university(university);
            }
            if let Some(language) = language {
                filter = filter.language(language);
            }
            if let Some(text) = text {
                filter = filter.text(text);
            }

            let mut query = MentorSearchQuery::new(filter.clone());
            query.limit = limit;
            let found = client.mentors().search(&query).await?;
            let shown = filter.apply_sorted(&found, sort);

            if json {
                return print_json(&shown);
            }
            if shown.is_empty() {
                println!("No mentors match");
            }
            for mentor in shown {
                print_mentor_line(mentor);
            }
        }
        MentorAction::Show { id } => {
            let mentor = client.mentors().get(id).await?;
            if json {
                return print_json(&mentor);
            }
            print_mentor_line(&mentor);
            if let Some(bio) = &mentor.bio {
                println!("    {bio}");
            }
        }
    }
    Ok(())
}

async fn forum(client: &AbroadClient, action: ForumAction, json: bool) -> anyhow::Result<()> {
    let api = client.forum();
    match action {
        ForumAction::List { page } => {
            let posts = api.list_posts(page).await?;
            if json {
                return print_json(&posts);
            }
            for post in posts {
                println!(
                    "#{:<5} {} ({} replies, by {})",
                    post.id,
                    post.title,
                    post.reply_count,
                    post.author_name.as_deref().unwrap_or("unknown")
                );
            }
        }
        ForumAction::Show { id } => {
            let post = api.get_post(id).await?;
            let replies = api.list_replies(id).await?;
            if json {
                return print_json(&serde_json::json!({ "post": post, "replies": replies }));
            }
            println!("{}\n\n{}\n", post.title, post.content);
            for reply in replies {
                println!(
                    "  > {}: {}",
                    reply.author_name.as_deref().unwrap_or("unknown"),
                    reply.content
                );
            }
        }
        ForumAction::Post {
            title,
            content,
            category,
            tags,
        } => {
            let mut post = NewPost::new(title, content).with_tags(tags);
            if let Some(category) = category {
                post = post.with_category(category);
            }
            let created = api.create_post(&post).await?;
            println!("Created post #{}", created.id);
        }
        ForumAction::Reply { post_id, content } => {
            let reply = api.reply(post_id, &NewReply::new(content)).await?;
            println!("Replied to #{} (reply #{})", reply.post_id, reply.id);
        }
    }
    Ok(())
}

async fn chat(client: &AbroadClient, action: ChatAction, json: bool) -> anyhow::Result<()> {
    let api = client.chat();
    match action {
        ChatAction::Sessions => {
            let sessions = api.sessions().await;
            if json {
                return print_json(&sessions);
            }
            for session in sessions {
                println!(
                    "{}  {} ({} messages)",
                    session.session_id,
                    session.title.as_deref().unwrap_or("untitled"),
                    session.message_count
                );
            }
        }
        ChatAction::History { session_id } => {
            let messages = api.messages(session_id).await;
            if json {
                return print_json(&messages);
            }
            for message in messages {
                println!("[{:?}] {}", message.role, message.content);
            }
        }
        ChatAction::Send { message, session } => {
            let session_id = session.unwrap_or_else(|| api.new_session_id());
            let reply = api.send(session_id, &message).await?;
            if json {
                return print_json(&serde_json::json!({ "session_id": session_id, "reply": reply }));
            }
            println!("{}", reply.content);
            if session.is_none() {
                println!("\n(session {session_id})");
            }
        }
    }
    Ok(())
}

async fn profile(client: &AbroadClient, action: ProfileAction, json: bool) -> anyhow::Result<()> {
    let api = client.profile();
    match action {
        ProfileAction::Show => print_user(&api.me().await?, json)?,
        ProfileAction::Update {
            full_name,
            email,
            university,
            major,
            bio,
        } => {
            let update = ProfileUpdate {
                full_name,
                email,
                university,
                major,
                bio,
            };
            let user = api.update(&update).await?;
            print_user(&user, json)?;
        }
        ProfileAction::Stats => {
            let stats = api.statistics().await;
            if json {
                return print_json(&stats);
            }
            println!("Sessions completed: {}", stats.sessions_completed);
            println!("Upcoming sessions:  {}", stats.upcoming_sessions);
            println!("Forum posts:        {}", stats.forum_posts);
            println!("Chat sessions:      {}", stats.chat_sessions);
            println!("Hours mentored:     {:.1}", stats.hours_mentored);
        }
    }
    Ok(())
}

// ============================================================================
// Helpers
// ============================================================================

fn resolve_password(password: Option<String>) -> anyhow::Result<String> {
    if let Some(password) = password {
        return Ok(password);
    }
    if let Ok(password) = std::env::var("ABROAD_PASSWORD") {
        return Ok(password);
    }

    eprint!("Password: ");
    let mut line = String::new();
    std::io::stdin()
        .read_line(&mut line)
        .context("Failed to read password")?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

fn guess_mime(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase);
    match ext.as_deref() {
        Some("pdf") => "application/pdf",
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("txt") => "text/plain",
        Some("doc") => "application/msword",
        Some("docx") => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        _ => "application/octet-stream",
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_user(user: &User, json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(user);
    }
    println!("{} (id {}, {})", user.display_name(), user.id, user.role);
    if let Some(email) = &user.email {
        println!("Email:      {email}");
    }
    if let Some(university) = &user.university {
        println!("University: {university}");
    }
    if let Some(major) = &user.major {
        println!("Major:      {major}");
    }
    Ok(())
}

fn print_mentor_line(mentor: &Mentor) {
    println!(
        "#{:<4} {:<20} {:<28} {:<24} {:>7.2}/h  {:.1}★ ({})",
        mentor.id,
        mentor.name,
        mentor.university,
        mentor.major,
        mentor.hourly_rate,
        mentor.rating,
        mentor.review_count
    );
}

fn print_expiry(bearer: &str) {
    match token::time_until_expiry(bearer) {
        Some(left) if !left.is_zero() => println!("Token:  expires in {} min", left.as_secs() / 60),
        Some(_) => println!("Token:  expired"),
        None => println!("Token:  unreadable"),
    }
}
