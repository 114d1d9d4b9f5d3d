//! Caller registration.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as B64;
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use sha2::Sha256;
use tracing::info;

use crate::error::{LedgerError, LedgerResult};
use crate::model::{Counters, User};
use crate::store::Ledger;

const SALT_LEN: usize = 16;
const KEY_LEN: usize = 32;
const SCHEME: &str = "pbkdf2-sha256";

/// Sign-up details for a new caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub display_name: String,
    pub username: String,
    pub email: String,
    pub password: String,
}

/// Register a caller with zeroed counters.
///
/// The caller gets `user_number = <registered users> + 1`. Only the
/// password hash derived under `policy` is kept.
///
/// # Errors
///
/// [`LedgerError::InvalidInput`] for a blank field or a zero round count,
/// [`LedgerError::DuplicateUser`] when the email or username is taken.
pub fn register<L: Ledger>(
    ledger: &L,
    new_user: NewUser,
    policy: &PasswordPolicy,
) -> LedgerResult<User> {
    let NewUser {
        display_name,
        username,
        email,
        password,
    } = new_user;
    let display_name = required("display_name", &display_name)?;
    let username = required("username", &username)?;
    let email = required("email", &email)?;
    if password.is_empty() {
        return Err(LedgerError::InvalidInput {
            field: "password",
            reason: "must not be empty".to_string(),
        });
    }
    if policy.rounds == 0 {
        return Err(LedgerError::InvalidInput {
            field: "pbkdf2_rounds",
            reason: "must be at least 1".to_string(),
        });
    }
    let password_hash = policy.hash(&password);

    ledger.transact(&[email.as_str()], |tx| {
        if tx.get(&email)?.is_some() {
            return Err(LedgerError::DuplicateUser { key: email.clone() });
        }
        if tx.find_by_username(&username)?.is_some() {
            return Err(LedgerError::DuplicateUser {
                key: username.clone(),
            });
        }

        let existing = tx.list_users()?.len();
        let user_number = u32::try_from(existing + 1).map_err(|_| LedgerError::InvalidInput {
            field: "email",
            reason: "registry is full".to_string(),
        })?;
        let user = User {
            email: email.clone(),
            user_number,
            username: username.clone(),
            display_name: display_name.clone(),
            password_hash: password_hash.clone(),
            counters: Counters::default(),
        };
        tx.insert_user(&user)?;

        info!(email = %user.email, user_number, "registered user");
        Ok(user)
    })
}

fn required(field: &'static str, value: &str) -> LedgerResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(LedgerError::InvalidInput {
            field,
            reason: "must not be blank".to_string(),
        });
    }
    Ok(trimmed.to_string())
}

/// Key stretching applied to passwords at registration.
///
/// Stored hashes read `pbkdf2-sha256$<rounds>$<salt>$<key>` with salt and
/// key in standard base64.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PasswordPolicy {
    pub rounds: u32,
}

impl PasswordPolicy {
    pub const DEFAULT_ROUNDS: u32 = 210_000;

    #[must_use]
    pub const fn with_rounds(rounds: u32) -> Self {
        Self { rounds }
    }

    /// Derive a storable hash for `password` under a fresh random salt.
    #[must_use]
    pub fn hash(&self, password: &str) -> String {
        let mut salt = [0u8; SALT_LEN];
        rand::thread_rng().fill_bytes(&mut salt);
        let key = derive_key(password, &salt, self.rounds);
        format!(
            "{SCHEME}${}${}${}",
            self.rounds,
            B64.encode(salt),
            B64.encode(key)
        )
    }
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self::with_rounds(Self::DEFAULT_ROUNDS)
    }
}

fn derive_key(password: &str, salt: &[u8], rounds: u32) -> [u8; KEY_LEN] {
    let mut key = [0u8; KEY_LEN];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, rounds, &mut key);
    key
}
