//! Login and logout

use std::io::{self, BufRead, Write};

use colored::Colorize;

use crate::error::{ChatDroidError, Result};
use crate::repository::AuthRepository;

/// Sign in and persist the session
///
/// When no password is given it is read from stdin.
pub async fn login(auth: &AuthRepository, email: &str, password: Option<String>) -> Result<()> {
    let password = match password {
        Some(password) => password,
        None => prompt_password()?,
    };
    if password.is_empty() {
        return Err(ChatDroidError::Authentication("Password must not be empty".to_string()).into());
    }

    let session = auth.login(email, &password).await?;
    let who = session.name.as_deref().unwrap_or(&session.email);
    println!("{}", format!("Signed in as {}", who).green());
    Ok(())
}

fn prompt_password() -> Result<String> {
    print!("Password: ");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

pub fn logout(auth: &AuthRepository) -> Result<()> {
    auth.logout()?;
    println!("{}", "Signed out".green());
    Ok(())
}
