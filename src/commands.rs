use crate::{ConversationAction, OutputMode, ProfileAction, emit_success};
use kundli_chat::config::{self, KundliConfig};
use kundli_chat::model::{ChatTurn, ConversationId, Profile, Role};
use kundli_chat::storage::{BackendKind, Store};
use kundli_chat::ui::{self, Icons, TableBuilder, banner, section, success};
use kundli_chat::Error;
use owo_colors::OwoColorize;
use std::path::Path;

pub fn run_version(output_mode: OutputMode) -> anyhow::Result<()> {
    if output_mode.is_human() {
        banner(
            &format!("{}", "Kundli".bold().style(ui::theme().header.clone())),
            &format!("Version {}", env!("CARGO_PKG_VERSION").bold()),
        );
    } else {
        let data = serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
        });
        emit_success(output_mode, "version", data)?;
    }
    Ok(())
}

pub fn run_init(output_mode: OutputMode, path: &Path, force: bool) -> anyhow::Result<()> {
    let database = config::default_database_path_in(Path::new("."));
    let settings = KundliConfig {
        database: Some(database.to_string_lossy().to_string()),
        ..KundliConfig::default()
    };
    config::write_config(path, &settings, force)?;

    if output_mode.is_human() {
        success(&format!("Wrote {}", path.display()));
        ui::info("Database", &database.display().to_string());
        println!(
            "  {}",
            ui::dim("Set KUNDLI_REMOTE_URL to use SurrealDB and KUNDLI_LLM_API_KEY to enable chat.")
        );
    } else {
        emit_success(output_mode, "init", serde_json::json!({ "path": path.display().to_string() }))?;
    }
    Ok(())
}

pub fn run_status(output_mode: OutputMode, store: &Store, settings: &KundliConfig) -> anyhow::Result<()> {
    let location = match store.kind() {
        BackendKind::Sqlite => settings.database_path().display().to_string(),
        BackendKind::Surreal => settings
            .remote
            .as_ref()
            .map(|r| format!("{} ({}/{})", r.url, r.namespace, r.database))
            .unwrap_or_default(),
    };

    if output_mode.is_human() {
        let icon = match store.kind() {
            BackendKind::Sqlite => Icons::DATABASE,
            BackendKind::Surreal => Icons::CLOUD,
        };
        ui::header("Kundli status");
        let mut table = TableBuilder::new();
        table.add_row("Backend", &format!("{} {}", icon, store.kind()));
        table.add_row("Location", &location);
        table.add_row("Chat", if settings.chat_enabled() { "enabled" } else { "disabled (no LLM key)" });
        println!("{}", table.build());
    } else {
        emit_success(
            output_mode,
            "status",
            serde_json::json!({
                "backend": store.kind().as_str(),
                "location": location,
                "chat_enabled": settings.chat_enabled(),
            }),
        )?;
    }
    Ok(())
}

pub async fn run_signup(output_mode: OutputMode, store: &Store, username: &str, password: &str) -> anyhow::Result<()> {
    if username.trim().is_empty() || password.is_empty() {
        anyhow::bail!("username and password must not be empty");
    }
    if !store.add_user(username, password).await? {
        anyhow::bail!("Username already exists");
    }

    if output_mode.is_human() {
        success(&format!("{} Account created for {}", Icons::PERSON, username));
    } else {
        emit_success(output_mode, "signup", serde_json::json!({ "username": username }))?;
    }
    Ok(())
}

pub async fn run_login(output_mode: OutputMode, store: &Store, username: &str, password: &str) -> anyhow::Result<()> {
    let Some(user) = store.login(username, password).await? else {
        anyhow::bail!("Invalid credentials");
    };

    if output_mode.is_human() {
        success(&format!("{} Signed in as {}", Icons::KEY, user.username));
    } else {
        emit_success(output_mode, "login", serde_json::json!({ "username": user.username }))?;
    }
    Ok(())
}

pub async fn run_profile(output_mode: OutputMode, store: &Store, action: ProfileAction) -> anyhow::Result<()> {
    match action {
        ProfileAction::Save { username, name, dob, tob, city } => {
            if city.trim().is_empty() {
                anyhow::bail!("Please enter a city.");
            }
            let profile = Profile::from_stored(name, &dob, &tob, city)?;
            store.save_profile(&username, &profile).await?;

            if output_mode.is_human() {
                success(&format!("Profile '{}' saved!", profile.name));
            } else {
                emit_success(output_mode, "profile.save", serde_json::to_value(&profile)?)?;
            }
        }
        ProfileAction::List { username } => {
            let profiles = store.list_profiles(&username).await?;

            if output_mode.is_human() {
                section(&format!(" Saved profiles of {} ", username));
                if profiles.is_empty() {
                    println!("{}", ui::dim("No saved profiles."));
                } else {
                    println!("{}", ui::profiles_table(&profiles));
                }
            } else {
                emit_success(output_mode, "profile.list", serde_json::to_value(&profiles)?)?;
            }
        }
    }
    Ok(())
}

pub async fn run_conversation(output_mode: OutputMode, store: &Store, action: ConversationAction) -> anyhow::Result<()> {
    match action {
        ConversationAction::New { username, title } => {
            let id = store.create_conversation(&username, title.as_deref()).await?;

            if output_mode.is_human() {
                success(&format!("{} Conversation {} created", Icons::CHAT, id));
            } else {
                emit_success(output_mode, "conversation.new", serde_json::json!({ "id": id }))?;
            }
        }
        ConversationAction::List { username } => {
            let conversations = store.list_conversations(&username).await?;

            if output_mode.is_human() {
                section(" Chat Sessions ");
                if conversations.is_empty() {
                    println!("{}", ui::dim("No history."));
                } else {
                    println!("{}", ui::conversations_table(&conversations));
                }
            } else {
                emit_success(output_mode, "conversation.list", serde_json::to_value(&conversations)?)?;
            }
        }
        ConversationAction::Delete { id } => {
            let id = ConversationId::new(id);
            store.delete_conversation(&id).await?;

            if output_mode.is_human() {
                success(&format!("{} Deleted!", Icons::DEL));
            } else {
                emit_success(output_mode, "conversation.delete", serde_json::json!({ "id": id }))?;
            }
        }
        ConversationAction::History { id } => {
            let turns = store.get_chat_history(&ConversationId::new(id.clone())).await?;

            if output_mode.is_human() {
                section(&format!(" {} Conversation {} ", Icons::SCROLL, id));
                print_transcript(&turns);
            } else {
                emit_success(output_mode, "conversation.history", serde_json::to_value(&turns)?)?;
            }
        }
    }
    Ok(())
}

fn print_transcript(turns: &[ChatTurn]) {
    if turns.is_empty() {
        println!("{}", ui::dim("Start a new conversation to ask questions!"));
        return;
    }
    println!("{}", ui::history_table(turns));
}

pub async fn run_chat(
    output_mode: OutputMode,
    store: &Store,
    username: &str,
    conversation: &str,
    role: &str,
    message: &str,
) -> anyhow::Result<()> {
    let role: Role = role.parse()?;
    let conversation = ConversationId::new(conversation);

    // Failed assistant replies are shown to the user but never stored.
    let saved = !(role == Role::Assistant && message.starts_with("Error"));
    if saved {
        store.save_chat(username, role, message, &conversation).await?;
    }

    if output_mode.is_human() {
        if saved {
            success(&format!("Saved {} turn to conversation {}", ui::role_label(role), conversation));
        } else {
            ui::warn("Assistant error replies are not saved");
        }
    } else {
        emit_success(output_mode, "chat", chat_envelope(&conversation, role, saved))?;
    }
    Ok(())
}

fn chat_envelope(conversation: &ConversationId, role: Role, saved: bool) -> serde_json::Value {
    serde_json::json!({ "conversation": conversation, "role": role, "saved": saved })
}

pub async fn run_clear(output_mode: OutputMode, store: &Store, username: &str) -> anyhow::Result<()> {
    match store.clear_chat_history(username).await {
        Ok(()) => {
            if output_mode.is_human() {
                success("Chat history cleared!");
            } else {
                emit_success(output_mode, "clear", serde_json::json!({ "username": username }))?;
            }
            Ok(())
        }
        Err(Error::Unsupported(op)) => {
            anyhow::bail!("{} is not supported by the {} backend yet", op, store.kind())
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_envelope_reports_dropped_turns() {
        let id = ConversationId::new("7");
        let dropped = chat_envelope(&id, Role::Assistant, false);
        assert_eq!(dropped["saved"], serde_json::json!(false));
        assert_eq!(dropped["role"], "assistant");
        assert_eq!(dropped["conversation"], "7");

        assert_eq!(chat_envelope(&id, Role::User, true)["saved"], serde_json::json!(true));
    }

    #[tokio::test]
    async fn test_dropped_error_reply_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::connect(&dir.path().join("kundli.db"), None).await.unwrap();
        let id = store.create_conversation("asha", None).await.unwrap();

        run_chat(OutputMode::Json, &store, "asha", id.as_str(), "assistant", "Error: quota exceeded")
            .await
            .unwrap();
        run_chat(OutputMode::Json, &store, "asha", id.as_str(), "user", "hello").await.unwrap();

        assert_eq!(store.get_chat_history(&id).await.unwrap(), vec![ChatTurn::user("hello")]);
    }
}
