//! Interactive login that creates the session file

use dialoguer::{Confirm, Input, Password};
use grammers_client::SignInError;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::session::get_client_for_init;

pub async fn run(config: &Config) -> Result<()> {
    if config.api_id == 0 || config.api_hash.is_empty() {
        return Err(Error::InvalidArgument(
            "TELEGRAM_API_ID and TELEGRAM_API_HASH must be set (config.yml or .env)".into(),
        ));
    }

    let client = get_client_for_init(config).await?;
    if client.is_authorized().await? {
        println!("✅ Session {} is already authorized", config.session_file());
        return Ok(());
    }

    let phone = if config.phone.is_empty() {
        Input::<String>::new()
            .with_prompt("Phone number (international format)")
            .interact_text()?
    } else {
        config.phone.clone()
    };

    println!(
        r#"
⚠️  A new session will be created for {}.
   Telegram may log this session in as a new device.
"#,
        phone
    );
    if !Confirm::new()
        .with_prompt("Continue?")
        .default(false)
        .interact()?
    {
        println!("❌ Cancelled. No session file was created.");
        return Ok(());
    }

    let token = client
        .request_login_code(phone.trim(), &config.api_hash)
        .await
        .map_err(|e| Error::TelegramError(format!("Failed to request code: {}", e)))?;

    let code: String = Input::new().with_prompt("Code").interact_text()?;

    let user = match client.sign_in(&token, code.trim()).await {
        Ok(user) => user,
        Err(SignInError::PasswordRequired(password_token)) => {
            let password = Password::new()
                .with_prompt("Two-step verification password")
                .interact()?;
            client
                .check_password(password_token, password.trim())
                .await
                .map_err(|e| Error::TelegramError(format!("Failed to sign in: {}", e)))?
        }
        Err(e) => return Err(Error::TelegramError(format!("Failed to sign in: {}", e))),
    };

    println!(
        "✅ Signed in as {} (@{}). Session saved to {}",
        user.full_name(),
        user.username().unwrap_or("-"),
        config.session_file()
    );
    Ok(())
}
