//! Sample data loading.
//!
//! A seed run inserts a batch of accounts in a single transaction: either
//! every account is created or none is. Running the fixed sample batch twice
//! against the same store fails on the contact-address uniqueness rule and
//! leaves the store as it was.

use murmur_types::{Account, NewAccount};

use crate::db::repositories::AccountRepository;
use crate::db::StoreResult;

/// Placeholder credential stored for every sample account. The store never
/// hashes anything itself.
pub const SAMPLE_PASSWORD_HASH: &str = "$2b$10$examplehashedpassword";

/// The fixed set of demonstration accounts
pub fn sample_accounts() -> Vec<NewAccount> {
    let sample = |name: &str, username: &str, bio: &str, private: bool| NewAccount {
        name: name.to_string(),
        username: username.to_string(),
        password: SAMPLE_PASSWORD_HASH.to_string(),
        email: format!("{}@example.com", avatar_key(name)),
        bio: Some(bio.to_string()),
        avatar_url: Some(format!(
            "https://example.com/avatars/{}.jpg",
            avatar_key(name)
        )),
        is_private: Some(private),
    };

    vec![
        sample(
            "John Doe",
            "johndoe",
            "Software developer and tech enthusiast",
            false,
        ),
        sample(
            "Sarah Smith",
            "sarahsmith",
            "Digital artist and photographer",
            true,
        ),
        sample(
            "Mike Johnson",
            "mikej",
            "Travel blogger and adventurer",
            false,
        ),
    ]
}

// "Sarah Smith" -> "sarah"
fn avatar_key(name: &str) -> String {
    name.split_whitespace()
        .next()
        .unwrap_or(name)
        .to_lowercase()
}

/// Result of a seed run
#[derive(Debug, Clone)]
pub enum SeedOutcome {
    /// Rows were committed
    Seeded(Vec<Account>),
    /// The batch was checked and rolled back
    Checked(usize),
}

impl SeedOutcome {
    pub fn count(&self) -> usize {
        match self {
            SeedOutcome::Seeded(accounts) => accounts.len(),
            SeedOutcome::Checked(count) => *count,
        }
    }

    pub fn into_accounts(self) -> Vec<Account> {
        match self {
            SeedOutcome::Seeded(accounts) => accounts,
            SeedOutcome::Checked(_) => Vec::new(),
        }
    }
}

pub struct SeedPipeline {
    accounts: AccountRepository,
}

impl SeedPipeline {
    pub fn new(accounts: AccountRepository) -> Self {
        Self { accounts }
    }

    /// Insert `batch` atomically
    pub fn run(&self, batch: &[NewAccount]) -> StoreResult<SeedOutcome> {
        tracing::info!("Seeding {} accounts", batch.len());
        match self.accounts.insert_batch(batch) {
            Ok(created) => {
                tracing::info!("Seeded {} accounts", created.len());
                Ok(SeedOutcome::Seeded(created))
            }
            Err(e) => {
                tracing::debug!("Seed batch rolled back: {}", e);
                Err(e)
            }
        }
    }

    pub fn run_samples(&self) -> StoreResult<SeedOutcome> {
        self.run(&sample_accounts())
    }

    /// Validate and insert `batch` without committing anything
    pub fn dry_run(&self, batch: &[NewAccount]) -> StoreResult<SeedOutcome> {
        let count = self.accounts.check_batch(batch).map_err(|e| {
            tracing::debug!("Seed check rolled back: {}", e);
            e
        })?;
        tracing::info!("Seed check passed: {} accounts would be created", count);
        Ok(SeedOutcome::Checked(count))
    }
}
