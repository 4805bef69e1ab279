use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, warn};

use super::password::{hash_password, verify_password};
use crate::{
    error::AuthError,
    users::{
        repo::UserStore,
        repo_types::{NewUser, User},
    },
};

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// Emails are matched case-insensitively and without surrounding spaces.
pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Looks up the account for `email` and checks `password` against its hash.
///
/// An unknown email and a wrong password produce the same
/// [`AuthError::InvalidCredentials`].
pub async fn verify_credentials(
    users: &dyn UserStore,
    email: &str,
    password: &str,
) -> Result<User, AuthError> {
    let email = normalize_email(email);

    let Some(user) = users.find_by_email(&email).await? else {
        warn!(email = %email, "login unknown email");
        return Err(AuthError::InvalidCredentials);
    };

    if !verify_password(password, &user.password_hash)? {
        warn!(user_id = %user.id, "login invalid password");
        return Err(AuthError::InvalidCredentials);
    }

    Ok(user)
}

/// Creates an account, storing only the hash of `password`.
///
/// The existence check runs first; the store's unique index also turns a
/// concurrent insert of the same email into [`AuthError::DuplicateIdentifier`].
pub async fn register(
    users: &dyn UserStore,
    name: &str,
    email: &str,
    password: &str,
) -> Result<User, AuthError> {
    let name = name.trim();
    let email = normalize_email(email);

    if name.is_empty() {
        return Err(AuthError::InvalidInput("Invalid User Data: name is required".into()));
    }
    if !is_valid_email(&email) {
        warn!(email = %email, "invalid email");
        return Err(AuthError::InvalidInput("Invalid User Data: invalid email".into()));
    }
    if password.is_empty() {
        return Err(AuthError::InvalidInput("Invalid User Data: password is required".into()));
    }

    if users.find_by_email(&email).await?.is_some() {
        warn!(email = %email, "email already registered");
        return Err(AuthError::DuplicateIdentifier);
    }

    let password_hash = hash_password(password)?;
    let user = users
        .create(NewUser {
            name,
            email: &email,
            password_hash: &password_hash,
        })
        .await?;

    info!(user_id = %user.id, "user registered");
    Ok(user)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::repo::memory::MemoryUserStore;

    #[test]
    fn email_validation() {
        assert!(is_valid_email("a@x.com"));
        assert!(!is_valid_email("a@x"));
        assert!(!is_valid_email("no at sign.com"));
        assert!(!is_valid_email(""));
    }

    #[tokio::test]
    async fn verify_accepts_registered_credentials() {
        let store = MemoryUserStore::default();
        let created = register(&store, "A", "a@x.com", "pw1").await.unwrap();
        let found = verify_credentials(&store, "a@x.com", "pw1").await.unwrap();
        assert_eq!(found.id, created.id);
        assert_eq!(found.name, "A");
    }

    #[tokio::test]
    async fn verify_normalizes_email() {
        let store = MemoryUserStore::default();
        register(&store, "A", "  A@X.com ", "pw1").await.unwrap();
        assert!(verify_credentials(&store, "a@x.COM", "pw1").await.is_ok());
    }

    #[tokio::test]
    async fn unknown_email_and_wrong_password_are_indistinguishable() {
        let store = MemoryUserStore::default();
        register(&store, "A", "a@x.com", "pw1").await.unwrap();

        let wrong = verify_credentials(&store, "a@x.com", "wrong").await.unwrap_err();
        let unknown = verify_credentials(&store, "b@x.com", "pw1").await.unwrap_err();

        assert!(matches!(wrong, AuthError::InvalidCredentials));
        assert!(matches!(unknown, AuthError::InvalidCredentials));
        assert_eq!(wrong.to_string(), unknown.to_string());
        assert_eq!(wrong.status_code(), unknown.status_code());
    }

    #[tokio::test]
    async fn register_stores_hash_not_plaintext() {
        let store = MemoryUserStore::default();
        let user = register(&store, "A", "a@x.com", "pw1").await.unwrap();
        assert_ne!(user.password_hash, "pw1");
        assert!(verify_password("pw1", &user.password_hash).unwrap());
    }

    #[tokio::test]
    async fn duplicate_registration_fails_without_write() {
        let store = MemoryUserStore::default();
        register(&store, "A", "a@x.com", "pw1").await.unwrap();
        let err = register(&store, "B", "a@x.com", "pw2").await.unwrap_err();
        assert!(matches!(err, AuthError::DuplicateIdentifier));
        assert_eq!(store.count(), 1);

        let still_a = verify_credentials(&store, "a@x.com", "pw1").await.unwrap();
        assert_eq!(still_a.name, "A");
    }

    #[tokio::test]
    async fn register_rejects_invalid_input() {
        let store = MemoryUserStore::default();
        for (name, email, password) in [
            ("", "a@x.com", "pw1"),
            ("A", "not-an-email", "pw1"),
            ("A", "a@x.com", ""),
        ] {
            let err = register(&store, name, email, password).await.unwrap_err();
            assert!(matches!(err, AuthError::InvalidInput(_)), "{name:?} {email:?}");
        }
        assert_eq!(store.count(), 0);
    }

    /// Store whose email lookup misses rows, like a check that ran before a
    /// concurrent insert committed.
    #[derive(Default)]
    struct StaleLookupStore {
        inner: MemoryUserStore,
        creates: std::sync::atomic::AtomicUsize,
    }

    #[async_trait::async_trait]
    impl UserStore for StaleLookupStore {
        async fn find_by_email(
            &self,
            _email: &str,
        ) -> Result<Option<User>, crate::users::repo::StoreError> {
            Ok(None)
        }
        async fn find_by_id(
            &self,
            id: uuid::Uuid,
        ) -> Result<Option<User>, crate::users::repo::StoreError> {
            self.inner.find_by_id(id).await
        }
        async fn create(&self, new: NewUser<'_>) -> Result<User, crate::users::repo::StoreError> {
            self.creates
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            self.inner.create(new).await
        }
        async fn update(&self, user: &User) -> Result<Option<User>, crate::users::repo::StoreError> {
            self.inner.update(user).await
        }
        async fn delete(&self, id: uuid::Uuid) -> Result<u64, crate::users::repo::StoreError> {
            self.inner.delete(id).await
        }
    }

    // Both registrations pass the existence check; the insert's uniqueness
    // rule rejects the second one.
    #[tokio::test]
    async fn racing_registration_is_rejected_by_insert() {
        let store = StaleLookupStore::default();
        let (a, b) = tokio::join!(
            register(&store, "A", "race@x.com", "pw1"),
            register(&store, "B", "race@x.com", "pw2"),
        );

        assert_eq!(store.creates.load(std::sync::atomic::Ordering::SeqCst), 2);
        assert_eq!([a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count(), 1);
        let err = a.err().or(b.err()).unwrap();
        assert!(matches!(err, AuthError::DuplicateIdentifier));
        assert_eq!(store.inner.count(), 1);
    }
}
