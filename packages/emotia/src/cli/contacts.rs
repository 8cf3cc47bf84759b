use anyhow::{Context, Result};
use emotia_link::{ApiClient, Contact};

use crate::config::EmotiaConfig;

/// List the patients assigned to the logged-in psychologist.
pub async fn contacts_command(config: &EmotiaConfig) -> Result<()> {
    let session = config.session()?;
    let api = ApiClient::new(session.clone());
    let contacts = api
        .contacts(session.user_id)
        .await
        .context("Failed to load contacts")?;

    if contacts.is_empty() {
        eprintln!("No patients assigned.");
        return Ok(());
    }
    print!("{}", render_table(&contacts));
    Ok(())
}

pub fn render_table(contacts: &[Contact]) -> String {
    let name_width = contacts
        .iter()
        .map(|c| c.username.chars().count())
        .max()
        .unwrap_or(0)
        .max("NAME".len());

    let mut out = format!("{:<6}  {:<name_width$}  EMAIL\n", "ID", "NAME");
    for contact in contacts {
        out.push_str(&format!(
            "{:<6}  {:<name_width$}  {}\n",
            contact.id.to_string(),
            contact.username,
            contact.email
        ));
    }
    out
}
