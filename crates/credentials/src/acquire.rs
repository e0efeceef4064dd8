//! Flows that obtain a fresh session token for a slot.

use {
    async_trait::async_trait,
    secrecy::Secret,
    tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader},
    tracing::info,
};

use crate::error::{Error, Result};

/// Obtains a session token from outside the process.
#[async_trait]
pub trait CredentialAcquirer: Send + Sync {
    async fn obtain(&self, slot: usize) -> Result<Secret<String>>;
}

/// Reads `PARLEY_SESSION_TOKEN_<N>` (1-based) from the environment.
///
/// Useful for unattended deployments where no terminal is attached.
#[derive(Debug, Default, Clone)]
pub struct EnvAcquirer;

impl EnvAcquirer {
    pub fn var_name(slot: usize) -> String {
        format!("PARLEY_SESSION_TOKEN_{}", slot + 1)
    }
}

#[async_trait]
impl CredentialAcquirer for EnvAcquirer {
    async fn obtain(&self, slot: usize) -> Result<Secret<String>> {
        let name = Self::var_name(slot);
        match std::env::var(&name) {
            Ok(v) if !v.trim().is_empty() => {
                info!(slot, var = %name, "session token taken from environment");
                Ok(Secret::new(v.trim().to_string()))
            },
            _ => Err(Error::acquisition(slot, format!("{name} is not set"))),
        }
    }
}

/// Asks the operator to paste a session token on the terminal.
#[derive(Debug, Default, Clone)]
pub struct PromptAcquirer;

#[async_trait]
impl CredentialAcquirer for PromptAcquirer {
    async fn obtain(&self, slot: usize) -> Result<Secret<String>> {
        let mut stdin = BufReader::new(tokio::io::stdin());
        let mut stderr = tokio::io::stderr();
        prompt_for_token(slot, &mut stdin, &mut stderr).await
    }
}

/// Tries each acquirer in order, returning the first token obtained.
pub struct ChainAcquirer {
    acquirers: Vec<Box<dyn CredentialAcquirer>>,
}

impl ChainAcquirer {
    pub fn new(acquirers: Vec<Box<dyn CredentialAcquirer>>) -> Self {
        Self { acquirers }
    }
}

#[async_trait]
impl CredentialAcquirer for ChainAcquirer {
    async fn obtain(&self, slot: usize) -> Result<Secret<String>> {
        let mut last_err = Error::acquisition(slot, "no acquisition flow configured");
        for acquirer in &self.acquirers {
            match acquirer.obtain(slot).await {
                Ok(token) => return Ok(token),
                Err(e) => last_err = e,
            }
        }
        Err(last_err)
    }
}

async fn prompt_for_token<R, W>(slot: usize, input: &mut R, output: &mut W) -> Result<Secret<String>>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let banner = format!(
        "No session token stored for agent {n}.\n\
         Sign in to the upstream service in a browser, copy the value of the\n\
         `__Secure-next-auth.session-token` cookie and paste it below.\n\
         Session token for agent {n}: ",
        n = slot + 1
    );
    output.write_all(banner.as_bytes()).await?;
    output.flush().await?;

    let mut line = String::new();
    let read = input.read_line(&mut line).await?;
    if read == 0 {
        return Err(Error::acquisition(slot, "input closed before a token was entered"));
    }
    let token = line.trim();
    if token.is_empty() {
        return Err(Error::acquisition(slot, "empty token"));
    }
    Ok(Secret::new(token.to_string()))
}
