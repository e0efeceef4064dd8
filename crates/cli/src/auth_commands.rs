use std::path::Path;

use {
    anyhow::Result,
    clap::Subcommand,
    parley_config::ParleyConfig,
    parley_credentials::{CredentialAcquirer, CredentialStore, PromptAcquirer},
};

#[derive(Subcommand)]
pub enum AuthAction {
    /// Store a session token for an agent slot, replacing any existing one.
    Login {
        /// Agent slot, starting at 1.
        #[arg(long, value_parser = clap::value_parser!(u16).range(1..))]
        slot: u16,
    },
    /// Show which agent slots have a stored session token.
    Status,
    /// Remove the stored session token for an agent slot.
    Logout {
        /// Agent slot, starting at 1.
        #[arg(long, value_parser = clap::value_parser!(u16).range(1..))]
        slot: u16,
    },
}

pub async fn handle_auth(action: &AuthAction, config: &ParleyConfig, dir: &Path) -> Result<()> {
    let store = CredentialStore::new(dir);
    match action {
        AuthAction::Login { slot } => login(&store, index(*slot)).await,
        AuthAction::Status => {
            print!("{}", status_report(&store, config.agent_slots));
            Ok(())
        },
        AuthAction::Logout { slot } => {
            store.delete(index(*slot))?;
            println!("Removed session token for agent {slot}.");
            Ok(())
        },
    }
}

fn index(slot: u16) -> usize {
    usize::from(slot).saturating_sub(1)
}

async fn login(store: &CredentialStore, slot: usize) -> Result<()> {
    let token = PromptAcquirer.obtain(slot).await?;
    let credential = store.persist(slot, token)?;
    println!(
        "Saved session token for agent {} to {}",
        slot + 1,
        credential.path.display()
    );
    Ok(())
}

fn status_report(store: &CredentialStore, slots: usize) -> String {
    let mut report = format!("Credentials in {}\n", store.dir().display());
    for slot in 0..slots {
        let state = match store.load(slot) {
            Ok(Some(_)) => "stored".to_string(),
            Ok(None) => "missing".to_string(),
            Err(e) => format!("unreadable ({e})"),
        };
        report.push_str(&format!("  agent {}: {state}\n", slot + 1));
    }
    report
}
