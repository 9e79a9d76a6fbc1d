//! Git authentication handling.

use std::path::PathBuf;

use secrecy::{ExposeSecret, SecretString};

use crate::gitops::error::{GitOpsError, Result};
use crate::gitops::resource::{GitAuthSettings, GitAuthType};

/// Escapes a value for safe use in single-quoted shell strings.
/// Replaces single quotes with '\'' (end quote, escaped quote, start quote).
pub fn shell_escape(value: &str) -> String {
    value.replace('\'', "'\\''")
}

/// Escapes a value for safe use in Windows batch scripts.
#[cfg(windows)]
fn escape_for_windows_batch(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len() * 2);
    for ch in value.chars() {
        match ch {
            '%' => escaped.push_str("%%"),
            '^' | '&' | '|' | '<' | '>' | '(' | ')' | '"' => {
                escaped.push('^');
                escaped.push(ch);
            }
            _ => escaped.push(ch),
        }
    }
    escaped
}

/// RAII guard for askpass script cleanup.
///
/// Deletes the askpass script when dropped so credentials are not left on disk,
/// including on error and cancellation paths.
#[derive(Debug)]
pub struct AskpassCleanup {
    path: Option<PathBuf>,
}

impl AskpassCleanup {
    pub(crate) fn new(path: PathBuf) -> Self {
        Self { path: Some(path) }
    }

    pub(crate) fn empty() -> Self {
        Self { path: None }
    }
}

impl Drop for AskpassCleanup {
    fn drop(&mut self) {
        if let Some(path) = self.path.take() {
            if let Err(e) = std::fs::remove_file(&path) {
                log::warn!("Failed to clean up askpass script: {}", e);
            }
        }
    }
}

/// Authentication environment for git commands.
#[derive(Debug)]
pub struct AuthEnv {
    /// Environment variables to set for the git command.
    pub env_vars: Vec<(String, String)>,
    /// Must outlive the git command to keep the askpass script alive.
    pub _cleanup: AskpassCleanup,
}

/// Builds the environment git needs to authenticate against the remote.
///
/// Interactive terminal prompts are always disabled, so a missing credential
/// fails the command instead of blocking it.
pub fn build_auth_env(auth: &GitAuthSettings) -> Result<AuthEnv> {
    let mut env = vec![("GIT_TERMINAL_PROMPT".to_string(), "0".to_string())];

    match auth.auth_type {
        GitAuthType::None => Ok(AuthEnv {
            env_vars: env,
            _cleanup: AskpassCleanup::empty(),
        }),
        GitAuthType::Basic => {
            let password = resolve_password(auth)?;
            let (askpass_path, cleanup) = write_askpass_script(&auth.username, &password)?;

            let askpass_path_str = askpass_path
                .to_str()
                .ok_or_else(|| {
                    GitOpsError::GitAuthFailed(
                        "Temp directory path contains non-UTF8 characters".to_string(),
                    )
                })?
                .to_string();

            env.push(("GIT_ASKPASS".to_string(), askpass_path_str));

            Ok(AuthEnv {
                env_vars: env,
                _cleanup: cleanup,
            })
        }
        GitAuthType::SshKey => {
            let key_path = ssh_key_path(&auth.ssh_key_path);

            if !key_path.exists() {
                return Err(GitOpsError::GitAuthFailed(format!(
                    "SSH key file not found: {}",
                    key_path.display()
                )));
            }

            let safe_path = {
                let escaped = shell_escape(&key_path.display().to_string());
                if escaped.starts_with('-') {
                    format!("'./{}'", escaped)
                } else {
                    format!("'{}'", escaped)
                }
            };

            // accept-new trusts unknown hosts but rejects changed keys
            env.push((
                "GIT_SSH_COMMAND".to_string(),
                format!("ssh -i {} -o StrictHostKeyChecking=accept-new", safe_path),
            ));

            Ok(AuthEnv {
                env_vars: env,
                _cleanup: AskpassCleanup::empty(),
            })
        }
    }
}

fn resolve_password(auth: &GitAuthSettings) -> Result<SecretString> {
    if auth.username.is_empty() {
        return Err(GitOpsError::GitAuthFailed(
            "Basic authentication requires a username".to_string(),
        ));
    }

    let env_var = if auth.password_env_var.is_empty() {
        None
    } else {
        Some(auth.password_env_var.as_str())
    };

    crate::secrets::resolve_secret(
        auth.password_insecure.as_deref(),
        auth.password_file.as_deref(),
        env_var,
    )
    .map_err(|e| {
        GitOpsError::GitAuthFailed(format!(
            "Failed to resolve git password: {}. Configure passwordInsecure, passwordFile, or passwordEnvVar.",
            e
        ))
    })
}

fn ssh_key_path(configured: &str) -> PathBuf {
    if configured.is_empty() {
        return dirs::home_dir()
            .map(|h| h.join(".ssh").join("id_ed25519"))
            .unwrap_or_else(|| PathBuf::from(".ssh/id_ed25519"));
    }
    PathBuf::from(crate::secrets::expand_home(configured))
}

/// Writes an askpass helper answering git's username and password prompts.
fn write_askpass_script(
    username: &str,
    password: &SecretString,
) -> Result<(PathBuf, AskpassCleanup)> {
    let temp_dir = std::env::temp_dir();
    let random_suffix = uuid::Uuid::new_v4().to_string();

    #[cfg(unix)]
    let (askpass_path, askpass_script) = {
        let path = temp_dir.join(format!(".fluxmc-askpass-{}.sh", random_suffix));
        let script = format!(
            "#!/bin/sh\ncase \"$1\" in\nUsername*) echo '{}' ;;\n*) echo '{}' ;;\nesac\n",
            shell_escape(username),
            shell_escape(password.expose_secret())
        );
        (path, script)
    };

    #[cfg(windows)]
    let (askpass_path, askpass_script) = {
        let path = temp_dir.join(format!(".fluxmc-askpass-{}.bat", random_suffix));
        let script = format!(
            "@echo off\r\necho %~1 | findstr /b /c:\"Username\" >nul && (echo {}) || (echo {})\r\n",
            escape_for_windows_batch(username),
            escape_for_windows_batch(password.expose_secret())
        );
        (path, script)
    };

    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(0o700)
            .open(&askpass_path)?;
        std::io::Write::write_all(&mut file, askpass_script.as_bytes())?;
    }

    #[cfg(not(unix))]
    {
        std::fs::write(&askpass_path, &askpass_script)?;
    }

    let cleanup = AskpassCleanup::new(askpass_path.clone());
    Ok((askpass_path, cleanup))
}
