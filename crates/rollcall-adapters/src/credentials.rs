//! Sign-in credentials from the environment

use async_trait::async_trait;
use nix::sys::termios::{self, LocalFlags, SetArg};
use rollcall_adapter_api::{CredentialError, CredentialProvider, CredentialResult, Credentials};
use rollcall_config::CredentialsConfig;
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::token_from_env;

/// Asks the operator for a value the environment did not provide
pub trait Prompt: Send + Sync {
    /// Input for a `hidden` value is not echoed
    fn ask(&self, label: &str, hidden: bool) -> io::Result<String>;
}

/// Prompts on stderr and reads the answer from stdin
pub struct TerminalPrompt;

impl Prompt for TerminalPrompt {
    fn ask(&self, label: &str, hidden: bool) -> io::Result<String> {
        let mut stderr = io::stderr();
        write!(stderr, "Sign-in {}: ", label)?;
        stderr.flush()?;

        let line = if hidden { read_line_hidden()? } else { read_line()? };
        Ok(line.trim().to_string())
    }
}

fn read_line() -> io::Result<String> {
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line)
}

/// Read one line with terminal echo switched off. Input that is not a
/// terminal is read as is.
fn read_line_hidden() -> io::Result<String> {
    let stdin = io::stdin();
    let Ok(saved) = termios::tcgetattr(&stdin) else {
        return read_line();
    };

    let mut quiet = saved.clone();
    quiet.local_flags.remove(LocalFlags::ECHO);
    termios::tcsetattr(&stdin, SetArg::TCSANOW, &quiet)?;

    let line = read_line();
    let restored = termios::tcsetattr(&stdin, SetArg::TCSANOW, &saved);
    // The operator's newline was not echoed either
    eprintln!();
    restored?;
    line
}

/// Reads the account from environment variables, optionally asking on the
/// terminal for whatever is missing.
///
/// The account is resolved once and reused for every session, so the
/// operator is asked at most once per run.
pub struct EnvCredentials {
    email_env: String,
    password_env: String,
    interactive: bool,
    prompt: Arc<dyn Prompt>,
    resolved: OnceCell<Credentials>,
}

impl EnvCredentials {
    pub fn new(config: &CredentialsConfig) -> Self {
        Self::with_prompt(config, Arc::new(TerminalPrompt))
    }

    pub fn with_prompt(config: &CredentialsConfig, prompt: Arc<dyn Prompt>) -> Self {
        Self {
            email_env: config.email_env.clone(),
            password_env: config.password_env.clone(),
            interactive: config.interactive,
            prompt,
            resolved: OnceCell::new(),
        }
    }

    async fn value(&self, var: &str, label: &'static str, hidden: bool) -> CredentialResult<String> {
        if let Some(value) = token_from_env(var) {
            return Ok(value);
        }
        if !self.interactive {
            return Err(CredentialError::Missing(format!("{} is not set", var)));
        }

        debug!(var, "Prompting for missing credential");
        let prompt = self.prompt.clone();
        let answer = tokio::task::spawn_blocking(move || prompt.ask(label, hidden))
            .await
            .map_err(|e| CredentialError::Prompt(io::Error::other(e)))??;
        if answer.is_empty() {
            return Err(CredentialError::Missing(format!("no {} entered", label)));
        }
        Ok(answer)
    }

    async fn resolve(&self) -> CredentialResult<Credentials> {
        let email = self.value(&self.email_env, "email", false).await?;
        let password = self.value(&self.password_env, "password", true).await?;
        info!(email = %email, "Sign-in account resolved");
        Ok(Credentials::new(email, password))
    }
}

#[async_trait]
impl CredentialProvider for EnvCredentials {
    async fn credentials(&self) -> CredentialResult<Credentials> {
        let credentials = self.resolved.get_or_try_init(|| self.resolve()).await?;
        Ok(credentials.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    fn config(email_env: &str, password_env: &str) -> CredentialsConfig {
        CredentialsConfig {
            email_env: email_env.into(),
            password_env: password_env.into(),
            interactive: false,
        }
    }

    /// Answers prompts from a fixed script and records what was asked
    struct ScriptedPrompt {
        answers: Mutex<VecDeque<String>>,
        asked: Mutex<Vec<(String, bool)>>,
    }

    impl ScriptedPrompt {
        fn new(answers: &[&str]) -> Self {
            Self {
                answers: Mutex::new(answers.iter().map(|a| a.to_string()).collect()),
                asked: Mutex::new(Vec::new()),
            }
        }
    }

    impl Prompt for ScriptedPrompt {
        fn ask(&self, label: &str, hidden: bool) -> io::Result<String> {
            self.asked.lock().unwrap().push((label.to_string(), hidden));
            self.answers
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "no more input"))
        }
    }

    #[tokio::test]
    async fn reads_both_variables() {
        // SAFETY: variable names are unique to this test
        unsafe {
            std::env::set_var("ROLLCALL_TEST_CREDS_EMAIL", "bot@example.com");
            std::env::set_var("ROLLCALL_TEST_CREDS_PASSWORD", "hunter2");
        }
        let provider = EnvCredentials::new(&config(
            "ROLLCALL_TEST_CREDS_EMAIL",
            "ROLLCALL_TEST_CREDS_PASSWORD",
        ));

        let creds = provider.credentials().await.unwrap();
        assert_eq!(creds.email, "bot@example.com");
        assert_eq!(creds.password(), "hunter2");
    }

    #[tokio::test]
    async fn missing_variable_without_prompt_fails() {
        let provider = EnvCredentials::new(&config(
            "ROLLCALL_TEST_CREDS_EMAIL_UNSET",
            "ROLLCALL_TEST_CREDS_PASSWORD_UNSET",
        ));

        match provider.credentials().await {
            Err(CredentialError::Missing(message)) => {
                assert!(message.contains("ROLLCALL_TEST_CREDS_EMAIL_UNSET"))
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn interactive_account_is_asked_for_once() {
        let prompt = Arc::new(ScriptedPrompt::new(&[
            "alice@example.com",
            "hunter2",
            "bob@example.com",
            "letmein",
        ]));
        let mut config = config(
            "ROLLCALL_TEST_PROMPT_EMAIL_UNSET",
            "ROLLCALL_TEST_PROMPT_PASSWORD_UNSET",
        );
        config.interactive = true;
        let provider = EnvCredentials::with_prompt(&config, prompt.clone());

        let (first, second) = tokio::join!(provider.credentials(), provider.credentials());
        let third = provider.credentials().await.unwrap();

        let first = first.unwrap();
        assert_eq!(first.email, "alice@example.com");
        assert_eq!(first.password(), "hunter2");
        assert_eq!(second.unwrap(), first);
        assert_eq!(third, first);

        // Only the password is read without echo
        assert_eq!(
            *prompt.asked.lock().unwrap(),
            vec![("email".to_string(), false), ("password".to_string(), true)]
        );
    }

    #[tokio::test]
    async fn empty_answer_is_not_remembered() {
        let prompt = Arc::new(ScriptedPrompt::new(&["", "alice@example.com", "hunter2"]));
        let mut config = config(
            "ROLLCALL_TEST_PROMPT_RETRY_EMAIL_UNSET",
            "ROLLCALL_TEST_PROMPT_RETRY_PASSWORD_UNSET",
        );
        config.interactive = true;
        let provider = EnvCredentials::with_prompt(&config, prompt);

        assert!(matches!(
            provider.credentials().await,
            Err(CredentialError::Missing(_))
        ));
        let creds = provider.credentials().await.unwrap();
        assert_eq!(creds.email, "alice@example.com");
    }
}
