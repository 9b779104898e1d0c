//! `switchyard run` — post a message and execute the run.

use switchyard_core::RunMode;
use switchyard_engine::PostMessage;

use super::{print_details, print_json};
use crate::RoutingArgs;
use crate::app::App;

const TITLE_CHARS: usize = 60;

/// First line of the message, clipped, as a session title.
fn session_title(message: &str) -> String {
    let title: String = message
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or_default()
        .chars()
        .take(TITLE_CHARS)
        .collect();
    if title.is_empty() {
        "Untitled".into()
    } else {
        title
    }
}

pub async fn run(
    app: &App,
    message: &str,
    mode: RunMode,
    session: Option<String>,
    routing: &RoutingArgs,
    json: bool,
) -> anyhow::Result<()> {
    let session_id = match session {
        Some(id) => id,
        None => app.sessions.create_session(&session_title(message)).await?.id,
    };

    let posted = app
        .sessions
        .create_message_and_run(
            &session_id,
            PostMessage {
                content: message.to_string(),
                mode,
                selected_models: routing.selected_models(),
                preferences: routing.preferences(),
                constraints: None,
            },
        )
        .await?;
    let details = app.executor.execute_run(&posted.run.id).await?;

    if json {
        return print_json(&details);
    }
    println!("Session {session_id}");
    print_details(&details);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_uses_first_non_empty_line() {
        assert_eq!(session_title("\n  Fix the build  \nmore"), "Fix the build");
        assert_eq!(session_title("   "), "Untitled");
        assert_eq!(session_title(&"x".repeat(100)).len(), 60);
    }
}
