//! Interactive command parsing and execution.

use anyhow::Result;
use authsync_core::{AuthContext, AuthState, InMemoryProvider};
use tracing::{debug, info};

use crate::config::CliConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    SignUp(Option<String>),
    SignIn(Option<String>),
    SignOut,
    Reset(Option<String>),
    Confirm(Option<String>),
    Refresh,
    WhoAmI,
    Help,
    Quit,
}

impl Command {
    /// Parse one input line. `None` for blank lines.
    pub fn parse(line: &str) -> Option<Result<Self, String>> {
        let mut parts = line.split_whitespace();
        let name = parts.next()?;
        let email = parts.next().map(str::to_string);

        let command = match name.to_lowercase().as_str() {
            "signup" | "sign-up" => Command::SignUp(email),
            "signin" | "sign-in" | "login" => Command::SignIn(email),
            "signout" | "sign-out" | "logout" => Command::SignOut,
            "reset" => Command::Reset(email),
            "confirm" => Command::Confirm(email),
            "refresh" => Command::Refresh,
            "whoami" | "status" => Command::WhoAmI,
            "help" | "?" => Command::Help,
            "quit" | "exit" | "q" => Command::Quit,
            other => return Some(Err(format!("Unknown command: {other} (try 'help')"))),
        };
        Some(Ok(command))
    }
}

pub const HELP: &str = "\
Commands:
  signup [email]   create an account
  signin [email]   sign in with a password
  signout          sign out
  reset [email]    request a password reset email
  confirm [email]  confirm a pending account's email
  refresh          rotate the current session's tokens
  whoami           show the current auth state
  quit             exit";

/// One line describing an auth state.
pub fn describe(state: &AuthState) -> String {
    if state.loading() {
        return "checking session...".to_string();
    }
    match (state.user(), state.session()) {
        (Some(user), Some(session)) => format!(
            "signed in as {} (session expires in {}m)",
            user.email,
            session.expires_in().num_minutes()
        ),
        _ => "signed out".to_string(),
    }
}

async fn prompt_password(prompt: &'static str) -> Result<String> {
    let password = tokio::task::spawn_blocking(move || rpassword::prompt_password(prompt)).await??;
    Ok(password)
}

pub struct Shell<'a> {
    pub ctx: AuthContext,
    pub provider: &'a InMemoryProvider,
    pub config: &'a mut CliConfig,
}

impl Shell<'_> {
    fn resolve_email(&self, email: Option<String>) -> Option<String> {
        email.or_else(|| self.config.default_email())
    }

    /// Execute a command. Returns `false` when the user asked to quit.
    ///
    /// Auth failures are printed, not returned: only I/O problems bubble up.
    pub async fn execute(&mut self, command: Command) -> Result<bool> {
        debug!(?command, "Executing command");
        match command {
            Command::SignUp(email) => {
                let Some(email) = self.resolve_email(email) else {
                    println!("usage: signup <email>");
                    return Ok(true);
                };
                let password = prompt_password("Password: ").await?;
                let confirm = prompt_password("Confirm password: ").await?;
                if password != confirm {
                    println!("error: Passwords do not match");
                    return Ok(true);
                }
                match self.ctx.sign_up(&email, &password).await {
                    Ok(()) => {
                        if self.config.auto_confirm_signups {
                            println!("Account created.");
                        } else {
                            println!("Check your email to confirm {email}, then sign in.");
                        }
                        self.config.last_email = Some(email);
                    }
                    Err(e) => println!("error: {}", e.message),
                }
            }
            Command::SignIn(email) => {
                let Some(email) = self.resolve_email(email) else {
                    println!("usage: signin <email>");
                    return Ok(true);
                };
                let password = prompt_password("Password: ").await?;
                match self.ctx.sign_in(&email, &password).await {
                    // The watcher reports the new state once the event lands.
                    Ok(()) => self.config.last_email = Some(email),
                    Err(e) => println!("error: {}", e.message),
                }
            }
            Command::SignOut => {
                if let Err(e) = self.ctx.sign_out().await {
                    println!("error: {}", e.message);
                }
            }
            Command::Reset(email) => {
                let Some(email) = self.resolve_email(email) else {
                    println!("usage: reset <email>");
                    return Ok(true);
                };
                match self.ctx.reset_password(&email).await {
                    Ok(()) => println!("If {email} has an account, a reset link is on its way."),
                    Err(e) => println!("error: {}", e.message),
                }
            }
            Command::Confirm(email) => {
                let Some(email) = self.resolve_email(email) else {
                    println!("usage: confirm <email>");
                    return Ok(true);
                };
                if self.provider.confirm_email(&email) {
                    info!(email = %email, "Email confirmed");
                    println!("Confirmed {email}.");
                } else {
                    println!("No account for {email}.");
                }
            }
            Command::Refresh => {
                if self.provider.refresh_session().is_none() {
                    println!("Not signed in.");
                }
            }
            Command::WhoAmI => println!("{}", describe(&self.ctx.state())),
            Command::Help => println!("{HELP}"),
            Command::Quit => return Ok(false),
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands_with_email() {
        assert_eq!(
            Command::parse("signin ada@example.com"),
            Some(Ok(Command::SignIn(Some("ada@example.com".to_string()))))
        );
        assert_eq!(Command::parse("  SIGNUP  "), Some(Ok(Command::SignUp(None))));
        assert_eq!(Command::parse("logout"), Some(Ok(Command::SignOut)));
        assert_eq!(Command::parse("q"), Some(Ok(Command::Quit)));
    }

    #[test]
    fn test_parse_blank_and_unknown() {
        assert_eq!(Command::parse("   "), None);
        assert_eq!(
            Command::parse("dance"),
            Some(Err("Unknown command: dance (try 'help')".to_string()))
        );
    }
}
