use chrono::{DateTime, Utc};
use serde::Serialize;

/// An organization member. The matric number is the short unique handle
/// members identify each other by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub name: String,
    pub matric: String,
    pub is_staff: bool,
    pub is_superuser: bool,
    pub is_active: bool,
    pub last_login: Option<DateTime<Utc>>,
    pub date_joined: DateTime<Utc>,
}

/// Fields needed to register a new user.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub name: String,
    pub matric: String,
    pub is_staff: bool,
    pub is_superuser: bool,
}

impl NewUser {
    pub fn member(email: impl Into<String>, name: impl Into<String>, matric: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            name: name.into(),
            matric: matric.into(),
            is_staff: false,
            is_superuser: false,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        validate_email(&self.email)?;
        validate_matric(&self.matric)?;
        if self.name.trim().is_empty() {
            return Err("Please enter a name".to_string());
        }
        Ok(())
    }
}

/// The user fields exposed through the API.
#[derive(Debug, Clone, Serialize)]
pub struct UserPayload {
    pub name: String,
    pub email: String,
    pub matric: String,
}

impl From<&User> for UserPayload {
    fn from(user: &User) -> Self {
        Self {
            name: user.name.clone(),
            email: user.email.clone(),
            matric: user.matric.clone(),
        }
    }
}

pub fn validate_email(email: &str) -> Result<(), String> {
    let email = email.trim();
    if email.is_empty() {
        return Err("Users must have an email address to sign up".to_string());
    }
    let Some((local, domain)) = email.split_once('@') else {
        return Err(format!("Invalid email address: '{}'", email));
    };
    if local.is_empty() || domain.is_empty() || !domain.contains('.') {
        return Err(format!("Invalid email address: '{}'", email));
    }
    Ok(())
}

/// Matric numbers are exactly nine alphanumeric characters.
pub fn validate_matric(matric: &str) -> Result<(), String> {
    let matric = matric.trim();
    if matric.len() != 9 || !matric.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(format!(
            "Invalid matric no. '{}': expected 9 letters or digits",
            matric
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_email() {
        assert!(validate_email("aina@example.com").is_ok());
        assert!(validate_email("").is_err());
        assert!(validate_email("no-at-sign").is_err());
        assert!(validate_email("@example.com").is_err());
        assert!(validate_email("aina@nodot").is_err());
    }

    #[test]
    fn test_validate_matric() {
        assert!(validate_matric("A17CS0123").is_ok());
        assert!(validate_matric("A17CS012").is_err());
        assert!(validate_matric("A17CS01234").is_err());
        assert!(validate_matric("A17CS-123").is_err());
        assert!(validate_matric("").is_err());
    }

    #[test]
    fn test_new_user_validation() {
        let user = NewUser::member("aina@example.com", "Aina", "A17CS0123");
        assert!(user.validate().is_ok());

        let nameless = NewUser::member("aina@example.com", "  ", "A17CS0123");
        assert!(nameless.validate().is_err());
    }
}
