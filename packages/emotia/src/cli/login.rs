use anyhow::{Result, anyhow};
use emotia_link::{ApiClient, LoginResponse, Role};
use tracing::info;

use crate::config::EmotiaConfig;

/// Log in and print the environment exports that make the session stick.
pub async fn login_command(config: &EmotiaConfig, email: &str, password: &str) -> Result<()> {
    let response = ApiClient::login(config.base_url(), email, password)
        .await
        .map_err(|e| anyhow!(e.notice()))?;

    info!(user = %response.user_id, role = %response.role, "logged in");
    for line in session_exports(&response) {
        println!("{line}");
    }
    eprintln!("[emotia: logged in as {} {}]", response.role, response.user_id);
    eprintln!("{}", next_step_hint(response.role));
    Ok(())
}

pub fn session_exports(response: &LoginResponse) -> Vec<String> {
    vec![
        format!("export EMOTIA_SESSION__USER_ID={}", response.user_id),
        format!("export EMOTIA_SESSION__TOKEN={}", response.access_token),
        format!("export EMOTIA_SESSION__ROLE={}", response.role),
    ]
}

/// Each role lands on its own screen.
pub fn next_step_hint(role: Role) -> &'static str {
    match role {
        Role::Patient => "Next: `emotia chat` talks to your assigned psychologist.",
        Role::Psychologist => "Next: `emotia contacts`, then `emotia chat --peer <id>`.",
        Role::Admin => "Admin tools are available in the web dashboard.",
    }
}
