//! Library user accounts and credential checks.

use crate::{Account, Error, Result, Role};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

const PASSWORD_SALT: &str = "shelf_salt";

/// Registered users
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Accounts {
    users: Vec<Account>,
    next_id: u64,
}

/// Salted SHA-256 of a password, hex encoded
pub fn hash_password(raw: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(PASSWORD_SALT.as_bytes());
    hasher.update(raw.as_bytes());
    hex::encode(hasher.finalize())
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

impl Accounts {
    pub fn new() -> Self {
        Self::default()
    }

    /// All accounts in registration order
    pub fn users(&self) -> &[Account] {
        &self.users
    }

    pub fn find_by_email(&self, email: &str) -> Option<&Account> {
        let email = normalize_email(email);
        self.users.iter().find(|u| u.email == email)
    }

    /// Number of accounts with the given role
    pub fn count_role(&self, role: Role) -> usize {
        self.users.iter().filter(|u| u.role == role).count()
    }

    /// Create a new account. Emails are unique regardless of case.
    pub fn register(
        &mut self,
        name: &str,
        email: &str,
        password: &str,
        role: Role,
        now: DateTime<Utc>,
    ) -> Result<Account> {
        let name = name.trim();
        if name.is_empty() || email.trim().is_empty() || password.is_empty() {
            return Err(Error::Account("name, email and password are required".into()));
        }
        if self.find_by_email(email).is_some() {
            return Err(Error::Account(format!(
                "email {} is already registered",
                normalize_email(email)
            )));
        }

        self.next_id += 1;
        let account = Account {
            id: self.next_id,
            name: name.to_string(),
            email: normalize_email(email),
            password_hash: hash_password(password),
            role,
            registered_at: now,
        };
        tracing::info!("Registered {:?} account {}", role, account.email);
        self.users.push(account.clone());
        Ok(account)
    }

    /// The account whose email and password both match, if any
    pub fn verify(&self, email: &str, password: &str) -> Option<&Account> {
        if password.is_empty() {
            return None;
        }
        let hashed = hash_password(password);
        self.find_by_email(email)
            .filter(|u| u.password_hash == hashed)
    }

    /// Create the admin account, or reset an existing account at that email
    /// to admin with the given name and password.
    pub fn ensure_admin(
        &mut self,
        email: &str,
        password: &str,
        name: &str,
        now: DateTime<Utc>,
    ) -> Result<Account> {
        let normalized = normalize_email(email);
        if let Some(user) = self.users.iter_mut().find(|u| u.email == normalized) {
            if password.is_empty() {
                return Err(Error::Account("admin password must not be empty".into()));
            }
            user.password_hash = hash_password(password);
            user.name = name.trim().to_string();
            user.role = Role::Admin;
            tracing::info!("Reset admin account {}", user.email);
            return Ok(user.clone());
        }
        self.register(name, email, password, Role::Admin, now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_verify() {
        let mut accounts = Accounts::new();
        accounts
            .register("Alice", "Alice@Example.com ", "s3cret", Role::User, Utc::now())
            .unwrap();

        let found = accounts.verify("alice@example.com", "s3cret").unwrap();
        assert_eq!(found.name, "Alice");
        assert_eq!(found.role, Role::User);
        assert!(accounts.verify("alice@example.com", "wrong").is_none());
        assert!(accounts.verify("nobody@example.com", "s3cret").is_none());
    }

    #[test]
    fn test_duplicate_email_rejected() {
        let mut accounts = Accounts::new();
        accounts
            .register("Alice", "alice@example.com", "pw", Role::User, Utc::now())
            .unwrap();
        let result = accounts.register("Other", "ALICE@example.com", "pw", Role::User, Utc::now());
        assert!(matches!(result, Err(Error::Account(_))));
        assert_eq!(accounts.users().len(), 1);
    }

    #[test]
    fn test_missing_fields_rejected() {
        let mut accounts = Accounts::new();
        let result = accounts.register("", "a@b.c", "pw", Role::User, Utc::now());
        assert!(matches!(result, Err(Error::Account(_))));
    }

    #[test]
    fn test_password_is_not_stored_in_clear() {
        let mut accounts = Accounts::new();
        let account = accounts
            .register("Alice", "alice@example.com", "s3cret", Role::User, Utc::now())
            .unwrap();
        assert_ne!(account.password_hash, "s3cret");
        assert_eq!(account.password_hash.len(), 64);
    }

    #[test]
    fn test_ensure_admin_creates_then_resets() {
        let mut accounts = Accounts::new();
        accounts
            .ensure_admin("admin@library.local", "first", "Admin", Utc::now())
            .unwrap();
        accounts
            .ensure_admin("admin@library.local", "second", "Head Librarian", Utc::now())
            .unwrap();

        assert_eq!(accounts.users().len(), 1);
        assert_eq!(accounts.count_role(Role::Admin), 1);
        assert!(accounts.verify("admin@library.local", "first").is_none());
        let admin = accounts.verify("admin@library.local", "second").unwrap();
        assert_eq!(admin.name, "Head Librarian");
    }

    #[test]
    fn test_ensure_admin_promotes_existing_user() {
        let mut accounts = Accounts::new();
        accounts
            .register("Bob", "bob@example.com", "pw", Role::User, Utc::now())
            .unwrap();
        accounts
            .ensure_admin("bob@example.com", "pw2", "Bob", Utc::now())
            .unwrap();
        assert_eq!(accounts.count_role(Role::User), 0);
        assert_eq!(accounts.count_role(Role::Admin), 1);
    }
}
